use nalgebra::{DVector, Vector3};
use rand::rngs::SmallRng;
use rand::Rng;
use std::f64::consts::PI;

use crate::math::{self, EPS};
use crate::pools::VecPool;

pub const WAVELENGTH_MIN: f64 = 380.0;
pub const WAVELENGTH_MAX: f64 = 750.0;

/// Mirror reflection about `normal`, in place: d - 2(n.d)n, renormalized.
pub fn reflect(direction: &mut DVector<f64>, normal: &DVector<f64>) {
    let scale = 2.0 * normal.dot(direction);
    direction.axpy(-scale, normal, 1.0);
    math::normalize(direction);
}

/// Refraction with `eta` = incident index / transmitted index. `normal`
/// must face against the incident direction. Falls back to mirror
/// reflection on total internal reflection.
pub fn refract(direction: &mut DVector<f64>, normal: &DVector<f64>, eta: f64) {
    let cos_i = normal.dot(direction).abs();
    let sin2_t = eta * eta * (1.0 - cos_i * cos_i);
    if sin2_t > 1.0 {
        reflect(direction, normal);
        return;
    }
    let cos_t = (1.0 - sin2_t).sqrt();

    direction.scale_mut(eta);
    direction.axpy(eta * cos_i - cos_t, normal, 1.0);
    math::normalize(direction);
}

/// Cosine-weighted diffuse bounce about `normal`, in place. 3-D rays use a
/// tangent-frame construction; higher dimensions project a Gaussian draw
/// onto the tangent space of the normal.
pub fn diffuse_reflect(
    direction: &mut DVector<f64>,
    normal: &DVector<f64>,
    rng: &mut SmallRng,
    scratch: &mut VecPool,
) {
    if normal.len() != 3 {
        diffuse_reflect_nd(direction, normal, rng, scratch);
        return;
    }

    let angle = 2.0 * PI * rng.gen::<f64>();
    let r: f64 = rng.gen();

    let mut tangent = scratch.take();
    let mut u = scratch.take();
    let mut v = scratch.take();

    tangent.fill(0.0);
    if normal[0].abs() > EPS {
        tangent[1] = 1.0;
    } else {
        tangent[0] = 1.0;
    }

    math::cross3(&mut u, &tangent, normal);
    math::normalize(&mut u);
    math::cross3(&mut v, normal, &u);
    math::normalize(&mut v);

    direction.copy_from(normal);
    direction.scale_mut((1.0 - r).sqrt());
    direction.axpy(angle.cos() * r.sqrt(), &u, 1.0);
    direction.axpy(angle.sin() * r.sqrt(), &v, 1.0);
    math::normalize(direction);

    scratch.give(tangent);
    scratch.give(u);
    scratch.give(v);
}

fn diffuse_reflect_nd(
    direction: &mut DVector<f64>,
    normal: &DVector<f64>,
    rng: &mut SmallRng,
    scratch: &mut VecPool,
) {
    let r: f64 = rng.gen();

    let mut u = scratch.take();
    for i in 0..u.len() {
        u[i] = gaussian(rng);
    }
    math::normalize(&mut u);

    let dot = u.dot(normal);
    u.axpy(-dot, normal, 1.0);
    math::normalize(&mut u);

    direction.copy_from(normal);
    direction.scale_mut((1.0 - r).sqrt());
    direction.axpy(r.sqrt(), &u, 1.0);
    math::normalize(direction);
    scratch.give(u);
}

fn gaussian(rng: &mut SmallRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Cauchy model n(wavelength) = A + B / w^2 + C / w^4, wavelength in nm.
pub fn cauchy_dispersion(wavelength: f64, a: f64, b: f64, c: f64) -> f64 {
    let w2 = wavelength * wavelength;
    a + b / w2 + c / (w2 * w2)
}

/// RGB basis of a visible wavelength in nm, the piecewise-linear fit over
/// 380-750 nm with intensity falloff at both ends of the range.
pub fn wavelength_to_rgb(wavelength: f64) -> Vector3<f64> {
    let (r, g, b) = match wavelength {
        w if w < 380.0 => (0.0, 0.0, 0.0),
        w if w < 440.0 => (-(w - 440.0) / (440.0 - 380.0), 0.0, 1.0),
        w if w < 490.0 => (0.0, (w - 440.0) / (490.0 - 440.0), 1.0),
        w if w < 510.0 => (0.0, 1.0, -(w - 510.0) / (510.0 - 490.0)),
        w if w < 580.0 => ((w - 510.0) / (580.0 - 510.0), 1.0, 0.0),
        w if w < 645.0 => (1.0, -(w - 645.0) / (645.0 - 580.0), 0.0),
        w if w <= 750.0 => (1.0, 0.0, 0.0),
        _ => (0.0, 0.0, 0.0),
    };

    let factor = match wavelength {
        w if w < 380.0 => 0.0,
        w if w < 420.0 => 0.3 + 0.7 * (w - 380.0) / (420.0 - 380.0),
        w if w < 700.0 => 1.0,
        w if w <= 750.0 => 0.3 + 0.7 * (750.0 - w) / (750.0 - 700.0),
        _ => 0.0,
    };

    Vector3::new(r * factor, g * factor, b * factor)
}

/// Rec. 601 luma weights.
pub fn luminance(color: &Vector3<f64>) -> f64 {
    0.299 * color.x + 0.587 * color.y + 0.114 * color.z
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;
    use rand::SeedableRng;

    fn unit(v: &[f64]) -> DVector<f64> {
        let mut d = DVector::from_row_slice(v);
        math::normalize(&mut d);
        d
    }

    #[test]
    fn reflect_mirrors_about_normal() {
        let mut d = unit(&[1.0, -1.0, 0.0]);
        let n = dvector![0.0, 1.0, 0.0];
        reflect(&mut d, &n);
        let expected = unit(&[1.0, 1.0, 0.0]);
        assert!((d - expected).norm() < 1e-12);
    }

    #[test]
    fn refract_obeys_snell() {
        // 30 degrees into glass (eta = 1/1.5) comes out at asin(sin(30)/1.5).
        let theta_i = 30.0_f64.to_radians();
        let mut d = dvector![theta_i.sin(), -theta_i.cos(), 0.0];
        let n = dvector![0.0, 1.0, 0.0];
        refract(&mut d, &n, 1.0 / 1.5);

        assert!((d.norm() - 1.0).abs() < 1e-12);
        let theta_t = d[0].asin();
        let expected = (theta_i.sin() / 1.5).asin();
        assert!((theta_t - expected).abs() < 1e-10);
        assert!(d[1] < 0.0, "transmitted ray continues into the medium");
    }

    #[test]
    fn total_internal_reflection_mirrors() {
        // Steep exit from glass to vacuum: eta = 1.5 forces TIR.
        let theta_i = 80.0_f64.to_radians();
        let d0 = dvector![theta_i.sin(), -theta_i.cos(), 0.0];
        let n = dvector![0.0, 1.0, 0.0];

        let mut refracted = d0.clone();
        refract(&mut refracted, &n, 1.5);
        let mut reflected = d0;
        reflect(&mut reflected, &n);
        assert!((refracted - reflected).norm() < 1e-12);
    }

    #[test]
    fn diffuse_stays_in_hemisphere() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut scratch = VecPool::new(3);
        let n = dvector![0.0, 0.0, 1.0];
        let mut mean_cos = 0.0;
        let trials = 2000;
        for _ in 0..trials {
            let mut d = dvector![0.0, 0.0, -1.0];
            diffuse_reflect(&mut d, &n, &mut rng, &mut scratch);
            assert!((d.norm() - 1.0).abs() < 1e-10);
            let c = d.dot(&n);
            assert!(c >= 0.0);
            mean_cos += c;
        }
        // cosine-weighted sampling has E[cos] = 2/3
        mean_cos /= trials as f64;
        assert!((mean_cos - 2.0 / 3.0).abs() < 0.05, "mean cos {}", mean_cos);
    }

    #[test]
    fn diffuse_4d_stays_in_hemisphere() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut scratch = VecPool::new(4);
        let n = unit(&[1.0, 1.0, 0.0, 1.0]);
        for _ in 0..500 {
            let mut d = dvector![0.0, 0.0, 0.0, -1.0];
            diffuse_reflect(&mut d, &n, &mut rng, &mut scratch);
            assert!((d.norm() - 1.0).abs() < 1e-10);
            assert!(d.dot(&n) >= 0.0);
        }
    }

    #[test]
    fn cauchy_red_index_below_blue() {
        let a = 1.0;
        let b = 200000.0;
        let red = cauchy_dispersion(700.0, a, b, 0.0);
        let blue = cauchy_dispersion(440.0, a, b, 0.0);
        assert!(blue > red);
    }

    #[test]
    fn wavelength_rgb_in_range() {
        let mut w = WAVELENGTH_MIN;
        while w <= WAVELENGTH_MAX {
            let c = wavelength_to_rgb(w);
            for v in [c.x, c.y, c.z] {
                assert!((0.0..=1.0).contains(&v), "{} out of range at {}", v, w);
            }
            w += 1.0;
        }
        // pure hues at the anchors
        assert!(wavelength_to_rgb(700.0).x > 0.9);
        assert!(wavelength_to_rgb(540.0).y > 0.9);
        assert!(wavelength_to_rgb(460.0).z > 0.9);
    }
}
