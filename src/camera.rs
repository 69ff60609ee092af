use nalgebra::DVector;
use rand::rngs::SmallRng;
use rand::Rng;

use crate::error::RayError;
use crate::math;
use crate::ray::Ray;

/// Perspective / orthographic camera in 3-D space.
pub struct Camera3D {
    pub position: DVector<f64>,
    pub direction: DVector<f64>,
    pub up: DVector<f64>,
    pub width: usize,
    pub height: usize,
    pub fov_deg: f64,
    pub aspect_ratio: f64,
    pub ortho: bool,
}

impl Camera3D {
    pub fn new(
        position: DVector<f64>,
        direction: DVector<f64>,
        up: DVector<f64>,
        width: usize,
        height: usize,
        fov_deg: f64,
    ) -> Result<Camera3D, RayError> {
        if width == 0 || height == 0 {
            return Err(RayError::scene("camera resolution must be positive"));
        }
        if position.len() != 3 || direction.len() != 3 || up.len() != 3 {
            return Err(RayError::scene("3-d camera vectors must have three components"));
        }
        let mut direction = direction;
        let mut up = up;
        math::normalize(&mut direction);
        math::normalize(&mut up);
        if direction.norm() == 0.0 || up.norm() == 0.0 {
            return Err(RayError::scene("camera direction and up must be nonzero"));
        }
        let aspect_ratio = width as f64 / height as f64;
        Ok(Camera3D {
            position,
            direction,
            up,
            width,
            height,
            fov_deg,
            aspect_ratio,
            ortho: false,
        })
    }

    /// Re-aims the camera at a target point.
    pub fn look_at(mut self, target: &DVector<f64>) -> Camera3D {
        self.direction = target - &self.position;
        math::normalize(&mut self.direction);
        self
    }

    fn generate_ray(&self, ray: &mut Ray, index: &[usize], rng: &mut SmallRng) {
        let x = index[0];
        let y = index[1];
        let right = {
            let mut r = math::cross3_alloc(&self.direction, &self.up);
            math::normalize(&mut r);
            r
        };

        let u = 2.0 * (x as f64 + rng.gen::<f64>()) / self.width as f64 - 1.0;
        let v = 2.0 * (y as f64 + rng.gen::<f64>()) / self.height as f64 - 1.0;
        let half_height = (self.fov_deg.to_radians() / 2.0).tan();
        let half_width = self.aspect_ratio * half_height;

        if self.ortho {
            ray.origin.copy_from(&self.position);
            ray.origin.axpy(u * half_width, &right, 1.0);
            ray.origin.axpy(-v * half_height, &self.up, 1.0);
            ray.direction.copy_from(&self.direction);
        } else {
            ray.origin.copy_from(&self.position);
            ray.direction.copy_from(&self.direction);
            ray.direction.axpy(u * half_width, &right, 1.0);
            // row zero maps to the top of the image
            ray.direction.axpy(-v * half_height, &self.up, 1.0);
            math::normalize(&mut ray.direction);
        }
    }
}

/// Camera over an arbitrary-dimensional space. The first basis vector is
/// the forward axis; the remaining ones span the image axes. The basis is
/// orthonormalized once, at construction.
pub struct CameraNDim {
    pub position: DVector<f64>,
    basis: Vec<DVector<f64>>,
    pub width: Vec<usize>,
    pub fov_deg: Vec<f64>,
}

impl CameraNDim {
    pub fn new(
        position: DVector<f64>,
        basis: Vec<DVector<f64>>,
        width: Vec<usize>,
        fov_deg: Vec<f64>,
    ) -> Result<CameraNDim, RayError> {
        if basis.len() < 2 {
            return Err(RayError::scene(
                "n-dimensional camera needs a forward axis and at least one image axis",
            ));
        }
        if width.len() != basis.len() || fov_deg.len() != basis.len() {
            return Err(RayError::scene(
                "n-dimensional camera needs one width and fov per basis vector",
            ));
        }
        if width[1..].iter().any(|&w| w == 0) {
            return Err(RayError::scene("camera resolution must be positive"));
        }
        let basis = math::gram_schmidt(&basis);
        if basis.len() != width.len() {
            return Err(RayError::scene("camera basis is linearly dependent"));
        }
        Ok(CameraNDim {
            position,
            basis,
            width,
            fov_deg,
        })
    }

    pub fn basis(&self) -> &[DVector<f64>] {
        &self.basis
    }

    fn generate_ray(&self, ray: &mut Ray, index: &[usize], rng: &mut SmallRng) {
        ray.origin.copy_from(&self.position);
        ray.direction.copy_from(&self.basis[0]);
        for axis in 1..self.basis.len() {
            let u = 2.0 * (index[axis - 1] as f64 + rng.gen::<f64>()) / self.width[axis] as f64
                - 1.0;
            let spread = (self.fov_deg[axis].to_radians() / 2.0).tan();
            ray.direction.axpy(u * spread, &self.basis[axis], 1.0);
        }
        math::normalize(&mut ray.direction);
    }
}

pub enum Camera {
    ThreeD(Camera3D),
    NDim(CameraNDim),
}

impl Camera {
    /// Dimension of the space the camera shoots rays into.
    pub fn dim(&self) -> usize {
        match self {
            Camera::ThreeD(c) => c.position.len(),
            Camera::NDim(c) => c.position.len(),
        }
    }

    /// Shape of the film this camera renders onto.
    pub fn film_shape(&self) -> Vec<usize> {
        match self {
            Camera::ThreeD(c) => vec![c.width, c.height],
            Camera::NDim(c) => c.width[1..].to_vec(),
        }
    }

    /// Pure function of (pixel index, jitter): fills the ray's origin and
    /// unit direction.
    pub fn generate_ray(&self, ray: &mut Ray, index: &[usize], rng: &mut SmallRng) {
        match self {
            Camera::ThreeD(c) => c.generate_ray(ray, index, rng),
            Camera::NDim(c) => c.generate_ray(ray, index, rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;
    use rand::SeedableRng;

    fn pinhole() -> Camera {
        Camera::ThreeD(
            Camera3D::new(
                dvector![0.0, 0.0, 0.0],
                dvector![1.0, 0.0, 0.0],
                dvector![0.0, 0.0, 1.0],
                64,
                48,
                60.0,
            )
            .unwrap(),
        )
    }

    #[test]
    fn rays_are_unit_length() {
        let camera = pinhole();
        let mut rng = SmallRng::seed_from_u64(9);
        let mut ray = Ray::new(3);
        for x in (0..64).step_by(7) {
            for y in (0..48).step_by(5) {
                ray.reset(3);
                camera.generate_ray(&mut ray, &[x, y], &mut rng);
                assert!((ray.direction.norm() - 1.0).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn row_zero_is_top_of_image() {
        let camera = pinhole();
        let mut rng = SmallRng::seed_from_u64(9);
        let mut ray = Ray::new(3);

        camera.generate_ray(&mut ray, &[32, 0], &mut rng);
        assert!(ray.direction[2] > 0.0, "top row looks up");

        camera.generate_ray(&mut ray, &[32, 47], &mut rng);
        assert!(ray.direction[2] < 0.0, "bottom row looks down");
    }

    #[test]
    fn look_at_aims_the_camera() {
        let camera = Camera3D::new(
            dvector![1.0, 2.0, 3.0],
            dvector![1.0, 0.0, 0.0],
            dvector![0.0, 0.0, 1.0],
            8,
            8,
            45.0,
        )
        .unwrap()
        .look_at(&dvector![1.0, 10.0, 3.0]);
        assert!((camera.direction - dvector![0.0, 1.0, 0.0]).norm() < 1e-12);
    }

    #[test]
    fn ortho_moves_origin_not_direction() {
        let mut inner = Camera3D::new(
            dvector![0.0, 0.0, 0.0],
            dvector![1.0, 0.0, 0.0],
            dvector![0.0, 0.0, 1.0],
            16,
            16,
            60.0,
        )
        .unwrap();
        inner.ortho = true;
        let camera = Camera::ThreeD(inner);

        let mut rng = SmallRng::seed_from_u64(1);
        let mut ray = Ray::new(3);
        camera.generate_ray(&mut ray, &[0, 0], &mut rng);
        assert!((ray.direction - dvector![1.0, 0.0, 0.0]).norm() < 1e-12);
        assert!(ray.origin.norm() > 0.0);
    }

    #[test]
    fn ndim_basis_is_orthonormalized() {
        let camera = CameraNDim::new(
            dvector![0.0, 0.0, 0.0, 0.0],
            vec![
                dvector![1.0, 0.1, 0.0, 0.0],
                dvector![1.0, 1.0, 0.0, 0.0],
                dvector![0.0, 1.0, 1.0, 0.0],
                dvector![0.0, 0.0, 1.0, 1.0],
            ],
            vec![1, 16, 16, 16],
            vec![0.0, 60.0, 60.0, 60.0],
        )
        .unwrap();

        let basis = camera.basis();
        for i in 0..basis.len() {
            assert!((basis[i].norm() - 1.0).abs() < 1e-10);
            for j in 0..i {
                assert!(basis[i].dot(&basis[j]).abs() < 1e-10);
            }
        }

        let cam = Camera::NDim(camera);
        assert_eq!(cam.film_shape(), vec![16, 16, 16]);
        assert_eq!(cam.dim(), 4);

        let mut rng = SmallRng::seed_from_u64(2);
        let mut ray = Ray::new(4);
        cam.generate_ray(&mut ray, &[3, 8, 12], &mut rng);
        assert!((ray.direction.norm() - 1.0).abs() < 1e-10);
    }
}
