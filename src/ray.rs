use nalgebra::{DVector, Vector3};
use rand::rngs::SmallRng;
use rand::Rng;

use crate::optics::{self, WAVELENGTH_MAX, WAVELENGTH_MIN};

/// Mutable per-path state. `direction` is unit after every mutation and the
/// throughput is componentwise non-negative.
#[derive(Debug, Clone)]
pub struct Ray {
    pub origin: DVector<f64>,
    pub direction: DVector<f64>,
    pub throughput: Vector3<f64>,
    pub wavelength: f64,
    pub refractive_index: f64,
    pub debug: bool,
}

impl Ray {
    pub fn new(dim: usize) -> Self {
        Ray {
            origin: DVector::zeros(dim),
            direction: DVector::zeros(dim),
            throughput: Vector3::new(1.0, 1.0, 1.0),
            wavelength: 0.0,
            refractive_index: 1.0,
            debug: false,
        }
    }

    /// Restores the sample-start state: white throughput, vacuum index,
    /// no wavelength selected.
    pub fn reset(&mut self, dim: usize) {
        if self.origin.len() != dim {
            self.origin = DVector::zeros(dim);
            self.direction = DVector::zeros(dim);
        } else {
            self.origin.fill(0.0);
            self.direction.fill(0.0);
        }
        self.throughput = Vector3::new(1.0, 1.0, 1.0);
        self.wavelength = 0.0;
        self.refractive_index = 1.0;
        self.debug = false;
    }

    /// Picks a uniform wavelength in the visible band and collapses the
    /// throughput to that wavelength's RGB basis, preserving the ray's
    /// current luminance. First dispersive refraction calls this once.
    pub fn convert_to_monochrome(&mut self, rng: &mut SmallRng) {
        self.wavelength = WAVELENGTH_MIN + rng.gen::<f64>() * (WAVELENGTH_MAX - WAVELENGTH_MIN);

        let base = optics::wavelength_to_rgb(self.wavelength);
        let original = optics::luminance(&self.throughput);
        let fresh = optics::luminance(&base).max(0.001);
        self.throughput = base * (original / fresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn monochrome_conversion_samples_visible_band() {
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..1000 {
            let mut ray = Ray::new(3);
            ray.convert_to_monochrome(&mut rng);
            assert!(ray.wavelength >= WAVELENGTH_MIN && ray.wavelength <= WAVELENGTH_MAX);
            for v in [ray.throughput.x, ray.throughput.y, ray.throughput.z] {
                assert!(v.is_finite() && v >= 0.0);
            }
        }
    }

    #[test]
    fn monochrome_conversion_preserves_luminance() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut ray = Ray::new(3);
        ray.throughput = Vector3::new(0.5, 0.25, 0.125);
        let before = optics::luminance(&ray.throughput);
        ray.convert_to_monochrome(&mut rng);
        let after = optics::luminance(&ray.throughput);
        // exact when the basis luminance is above the clamp floor
        assert!((after - before).abs() < 1e-9 || after <= before);
    }
}
