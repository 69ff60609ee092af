use nalgebra::{DVector, Vector3};
use rand::rngs::SmallRng;
use rand::Rng;

use crate::optics;
use crate::pools::VecPool;
use crate::ray::Ray;

/// Refractive index of a medium: a constant, or the three Cauchy
/// coefficients of a dispersive one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefractiveIndex {
    Constant(f64),
    Cauchy { a: f64, b: f64, c: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionKind {
    Omni,
    /// Visible only along the surface normal; off-axis paths are killed.
    Directional,
}

pub type ColorFn = fn(&Ray, &DVector<f64>) -> Vector3<f64>;

pub struct Material {
    pub color: Vector3<f64>,
    pub color_fn: Option<ColorFn>,
    pub emissive: bool,
    pub emission: EmissionKind,
    pub reflectivity: f64,
    pub refractivity: f64,
    pub refractive_index: RefractiveIndex,
    pub diffuse_loss: f64,
    pub reflect_loss: f64,
    pub refract_loss: f64,
}

impl Material {
    pub fn new(color: Vector3<f64>) -> Self {
        Material {
            color,
            color_fn: None,
            emissive: false,
            emission: EmissionKind::Omni,
            reflectivity: 0.0,
            refractivity: 0.0,
            refractive_index: RefractiveIndex::Constant(1.0),
            diffuse_loss: 1.0,
            reflect_loss: 1.0,
            refract_loss: 1.0,
        }
    }

    pub fn diffuse_probability(&self) -> f64 {
        1.0 - self.reflectivity - self.refractivity
    }

    fn surface_color(&self, ray: &Ray, normal: &DVector<f64>) -> Vector3<f64> {
        match self.color_fn {
            Some(f) => f(ray, normal),
            None => self.color,
        }
    }

    /// One surface event. The normal must already face against the
    /// incident direction. Returns `true` when the path terminates.
    pub fn propagate(
        &self,
        ray: &mut Ray,
        normal: &DVector<f64>,
        rng: &mut SmallRng,
        scratch: &mut VecPool,
    ) -> bool {
        if self.emissive {
            self.light_source(ray, normal);
            return true;
        }

        let pick: f64 = rng.gen();
        if pick <= self.reflectivity {
            optics::reflect(&mut ray.direction, normal);
            ray.throughput *= self.reflect_loss;
        } else if pick <= self.reflectivity + self.refractivity {
            let target = self.refraction_index(ray, rng);
            let eta = ray.refractive_index / target;
            optics::refract(&mut ray.direction, normal, eta);
            ray.throughput *= self.refract_loss;
            ray.refractive_index = target;
        } else {
            optics::diffuse_reflect(&mut ray.direction, normal, rng, scratch);
            ray.throughput *= self.diffuse_loss;
        }

        let color = self.surface_color(ray, normal);
        ray.throughput.component_mul_assign(&color);
        false
    }

    /// Index the refracted ray enters. Dispersive media collapse the ray
    /// to a single wavelength on first contact; a ray already inside the
    /// medium exits back into vacuum.
    fn refraction_index(&self, ray: &mut Ray, rng: &mut SmallRng) -> f64 {
        let index = match self.refractive_index {
            RefractiveIndex::Constant(n) => n,
            RefractiveIndex::Cauchy { a, b, c } => {
                if ray.wavelength < optics::WAVELENGTH_MIN {
                    ray.convert_to_monochrome(rng);
                }
                optics::cauchy_dispersion(ray.wavelength, a, b, c)
            }
        };

        if ray.refractive_index == index {
            1.0
        } else {
            index
        }
    }

    fn light_source(&self, ray: &mut Ray, normal: &DVector<f64>) {
        let color = self.surface_color(ray, normal);
        match self.emission {
            EmissionKind::Omni => {
                ray.throughput.component_mul_assign(&color);
            }
            EmissionKind::Directional => {
                let d = normal.dot(&ray.direction);
                let v = d * d;
                if v < 0.98 {
                    ray.throughput.fill(0.0);
                } else {
                    ray.throughput.component_mul_assign(&(color * v));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;
    use rand::SeedableRng;

    fn setup() -> (Ray, DVector<f64>, SmallRng, VecPool) {
        let mut ray = Ray::new(3);
        ray.direction = dvector![0.0, 0.0, -1.0];
        let normal = dvector![0.0, 0.0, 1.0];
        (ray, normal, SmallRng::seed_from_u64(42), VecPool::new(3))
    }

    #[test]
    fn omni_emission_terminates_with_color() {
        let (mut ray, normal, mut rng, mut scratch) = setup();
        let mut mat = Material::new(Vector3::new(0.5, 0.25, 1.0));
        mat.emissive = true;

        let done = mat.propagate(&mut ray, &normal, &mut rng, &mut scratch);
        assert!(done);
        assert_eq!(ray.throughput, Vector3::new(0.5, 0.25, 1.0));
    }

    #[test]
    fn directional_emission_kills_off_axis_paths() {
        let (mut ray, normal, mut rng, mut scratch) = setup();
        ray.direction = dvector![0.8, 0.0, -0.6];
        let mut mat = Material::new(Vector3::new(1.0, 1.0, 1.0));
        mat.emissive = true;
        mat.emission = EmissionKind::Directional;

        let done = mat.propagate(&mut ray, &normal, &mut rng, &mut scratch);
        assert!(done);
        assert_eq!(ray.throughput, Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn directional_emission_passes_on_axis() {
        let (mut ray, normal, mut rng, mut scratch) = setup();
        let mut mat = Material::new(Vector3::new(1.0, 1.0, 1.0));
        mat.emissive = true;
        mat.emission = EmissionKind::Directional;

        mat.propagate(&mut ray, &normal, &mut rng, &mut scratch);
        assert!((ray.throughput.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mirror_keeps_direction_in_hemisphere() {
        let (mut ray, normal, mut rng, mut scratch) = setup();
        ray.direction = dvector![0.6, 0.0, -0.8];
        let mut mat = Material::new(Vector3::new(1.0, 1.0, 1.0));
        mat.reflectivity = 1.0;
        mat.reflect_loss = 0.9;

        let done = mat.propagate(&mut ray, &normal, &mut rng, &mut scratch);
        assert!(!done);
        assert!((ray.direction.norm() - 1.0).abs() < 1e-12);
        assert!(ray.direction.dot(&normal) > 0.0);
        assert!((ray.throughput.x - 0.9).abs() < 1e-12);
    }

    #[test]
    fn refraction_tracks_medium_index() {
        let (mut ray, normal, mut rng, mut scratch) = setup();
        let mut mat = Material::new(Vector3::new(1.0, 1.0, 1.0));
        mat.refractivity = 1.0;
        mat.refractive_index = RefractiveIndex::Constant(1.5);

        mat.propagate(&mut ray, &normal, &mut rng, &mut scratch);
        assert_eq!(ray.refractive_index, 1.5);

        // second interface of the same medium: the ray exits to vacuum
        let inward_normal = dvector![0.0, 0.0, 1.0];
        mat.propagate(&mut ray, &inward_normal, &mut rng, &mut scratch);
        assert_eq!(ray.refractive_index, 1.0);
    }

    #[test]
    fn dispersive_material_sets_wavelength_once() {
        let (mut ray, normal, mut rng, mut scratch) = setup();
        let mut mat = Material::new(Vector3::new(1.0, 1.0, 1.0));
        mat.refractivity = 1.0;
        mat.refractive_index = RefractiveIndex::Cauchy {
            a: 1.0,
            b: 200000.0,
            c: 0.0,
        };

        assert_eq!(ray.wavelength, 0.0);
        mat.propagate(&mut ray, &normal, &mut rng, &mut scratch);
        let chosen = ray.wavelength;
        assert!(chosen >= optics::WAVELENGTH_MIN);

        mat.propagate(&mut ray, &normal, &mut rng, &mut scratch);
        assert_eq!(ray.wavelength, chosen);
    }

    #[test]
    fn diffuse_applies_loss_and_color() {
        let (mut ray, normal, mut rng, mut scratch) = setup();
        let mut mat = Material::new(Vector3::new(0.5, 1.0, 1.0));
        mat.diffuse_loss = 0.8;

        let done = mat.propagate(&mut ray, &normal, &mut rng, &mut scratch);
        assert!(!done);
        assert!((ray.throughput.x - 0.4).abs() < 1e-12);
        assert!((ray.direction.norm() - 1.0).abs() < 1e-10);
        assert!(ray.direction.dot(&normal) >= 0.0);
    }
}
