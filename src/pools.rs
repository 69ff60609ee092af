use nalgebra::DVector;

use crate::ray::Ray;

/// Scratch vectors reused across intersection and shading calls. Each
/// worker owns one pool, so no synchronization is involved.
pub struct VecPool {
    dim: usize,
    free: Vec<DVector<f64>>,
}

impl VecPool {
    pub fn new(dim: usize) -> Self {
        VecPool { dim, free: Vec::new() }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Contents of the returned vector are unspecified; callers overwrite.
    pub fn take(&mut self) -> DVector<f64> {
        self.free.pop().unwrap_or_else(|| DVector::zeros(self.dim))
    }

    pub fn give(&mut self, v: DVector<f64>) {
        if v.len() == self.dim {
            self.free.push(v);
        }
    }
}

/// Per-worker ray pool; one ray is taken per pixel sample and returned
/// after the sample is deposited.
pub struct RayPool {
    dim: usize,
    free: Vec<Ray>,
}

impl RayPool {
    pub fn new(dim: usize) -> Self {
        RayPool { dim, free: Vec::new() }
    }

    pub fn take(&mut self) -> Ray {
        let mut ray = self.free.pop().unwrap_or_else(|| Ray::new(self.dim));
        ray.reset(self.dim);
        ray
    }

    pub fn give(&mut self, ray: Ray) {
        if ray.origin.len() == self.dim {
            self.free.push(ray);
        }
    }
}
