use nalgebra::{DMatrix, DVector};

use crate::error::RayError;
use crate::math::{self, EPS};
use crate::pools::VecPool;
use crate::tensor::Tensor;

/// Bound on unbounded implicit surfaces; large enough to contain any
/// practical scene, small enough to keep box arithmetic finite.
const UNBOUNDED: f64 = 1e30;

/// Candidate hit handed to an engraving predicate. Returning `true`
/// rejects the hit, carving a hole in the surface.
pub struct EngravingHit<'a> {
    pub ray_start: &'a DVector<f64>,
    pub ray_dir: &'a DVector<f64>,
    pub distance: f64,
    pub shape: &'a Shape,
}

pub type EngravingFn = fn(&EngravingHit<'_>) -> bool;

pub type ParametricFn = fn(f64, f64) -> DVector<f64>;
pub type ImplicitFn = fn(&DVector<f64>) -> f64;

#[derive(Clone)]
pub enum Surface {
    Cuboid {
        pmin: DVector<f64>,
        pmax: DVector<f64>,
    },
    Sphere {
        center: DVector<f64>,
        radius: f64,
    },
    Triangle {
        p1: DVector<f64>,
        p2: DVector<f64>,
        p3: DVector<f64>,
        edge1: DVector<f64>,
        edge2: DVector<f64>,
        normal: DVector<f64>,
    },
    /// a^T x + b = 0
    Plane { a: DVector<f64>, b: f64 },
    /// x^T A x + b^T x + c = 0
    Quadric {
        a: DMatrix<f64>,
        b: DVector<f64>,
        c: f64,
    },
    /// Degree-4 implicit surface; coefficient tensor over (1, x, y, z).
    Quartic { a: Tensor<f64> },
    Parametric {
        f: ParametricFn,
        u_range: [f64; 2],
        v_range: [f64; 2],
    },
    Implicit {
        f: ImplicitFn,
        pmin: DVector<f64>,
        pmax: DVector<f64>,
    },
}

pub struct Shape {
    pub surface: Surface,
    pub engraving: Option<EngravingFn>,
}

/// Slab test over all axes. Returns the entry parameter when it is beyond
/// EPS, the exit parameter when the start is inside, `f64::MAX` on a miss.
pub fn slab_intersect(
    pmin: &DVector<f64>,
    pmax: &DVector<f64>,
    ray_start: &DVector<f64>,
    ray_dir: &DVector<f64>,
) -> f64 {
    let (t0, t1) = match slab_interval(pmin, pmax, ray_start, ray_dir) {
        Some(bounds) => bounds,
        None => return f64::MAX,
    };
    if t0 > EPS {
        t0
    } else {
        t1
    }
}

fn slab_interval(
    pmin: &DVector<f64>,
    pmax: &DVector<f64>,
    ray_start: &DVector<f64>,
    ray_dir: &DVector<f64>,
) -> Option<(f64, f64)> {
    let mut t0 = -f64::MAX;
    let mut t1 = f64::MAX;

    for dim in 0..ray_start.len() {
        let start = ray_start[dim];
        let dir = ray_dir[dim];
        let lo = pmin[dim];
        let hi = pmax[dim];

        if dir.abs() < EPS {
            if start < lo || start > hi {
                return None;
            }
            continue;
        }

        let mut ta = (lo - start) / dir;
        let mut tb = (hi - start) / dir;
        if ta > tb {
            std::mem::swap(&mut ta, &mut tb);
        }
        t0 = t0.max(ta);
        t1 = t1.min(tb);
        if t0 > t1 || t1 < EPS {
            return None;
        }
    }
    Some((t0, t1))
}

impl Shape {
    pub fn cuboid(pmin: DVector<f64>, pmax: DVector<f64>) -> Result<Shape, RayError> {
        if pmin.len() != pmax.len() {
            return Err(RayError::scene("cuboid corner dimensions differ"));
        }
        for i in 0..pmin.len() {
            if pmin[i] >= pmax[i] {
                return Err(RayError::scene(format!(
                    "cuboid pmin must be below pmax on every axis (axis {})",
                    i
                )));
            }
        }
        Ok(Shape {
            surface: Surface::Cuboid { pmin, pmax },
            engraving: None,
        })
    }

    pub fn sphere(center: DVector<f64>, radius: f64) -> Result<Shape, RayError> {
        if radius <= 0.0 {
            return Err(RayError::scene("sphere radius must be positive"));
        }
        Ok(Shape {
            surface: Surface::Sphere { center, radius },
            engraving: None,
        })
    }

    pub fn triangle(
        p1: DVector<f64>,
        p2: DVector<f64>,
        p3: DVector<f64>,
    ) -> Result<Shape, RayError> {
        let edge1 = &p2 - &p1;
        let edge2 = &p3 - &p1;
        let mut normal = math::cross3_alloc(&edge1, &edge2);
        if normal.norm() < EPS {
            return Err(RayError::scene("degenerate triangle"));
        }
        math::normalize(&mut normal);
        Ok(Shape {
            surface: Surface::Triangle {
                p1,
                p2,
                p3,
                edge1,
                edge2,
                normal,
            },
            engraving: None,
        })
    }

    pub fn plane(a: DVector<f64>, b: f64) -> Result<Shape, RayError> {
        if a.norm() < EPS {
            return Err(RayError::scene("plane normal must be nonzero"));
        }
        Ok(Shape {
            surface: Surface::Plane { a, b },
            engraving: None,
        })
    }

    pub fn quadric(a: DMatrix<f64>, b: DVector<f64>, c: f64) -> Result<Shape, RayError> {
        if a.nrows() != a.ncols() || a.nrows() != b.len() {
            return Err(RayError::scene("quadric matrix/vector dimensions differ"));
        }
        Ok(Shape {
            surface: Surface::Quadric { a, b, c },
            engraving: None,
        })
    }

    /// 256 coefficients in row-major (i, j, k, l) order over (1, x, y, z).
    pub fn quartic(coefficients: &[f64]) -> Result<Shape, RayError> {
        if coefficients.len() != 256 {
            return Err(RayError::scene(
                "quartic surface expects a 4x4x4x4 coefficient tensor",
            ));
        }
        Ok(Shape {
            surface: Surface::Quartic {
                a: Tensor::from_slice(coefficients, &[4, 4, 4, 4]),
            },
            engraving: None,
        })
    }

    pub fn parametric(f: ParametricFn, u_range: [f64; 2], v_range: [f64; 2]) -> Shape {
        Shape {
            surface: Surface::Parametric { f, u_range, v_range },
            engraving: None,
        }
    }

    pub fn implicit(f: ImplicitFn, pmin: DVector<f64>, pmax: DVector<f64>) -> Result<Shape, RayError> {
        for i in 0..pmin.len() {
            if pmin[i] >= pmax[i] {
                return Err(RayError::scene("implicit surface box is empty"));
            }
        }
        Ok(Shape {
            surface: Surface::Implicit { f, pmin, pmax },
            engraving: None,
        })
    }

    pub fn with_engraving(mut self, f: EngravingFn) -> Shape {
        self.engraving = Some(f);
        self
    }

    pub fn name(&self) -> &'static str {
        match self.surface {
            Surface::Cuboid { .. } => "Cuboid",
            Surface::Sphere { .. } => "Sphere",
            Surface::Triangle { .. } => "Triangle",
            Surface::Plane { .. } => "Plane",
            Surface::Quadric { .. } => "Quadratic Equation",
            Surface::Quartic { .. } => "Four-Order Equation",
            Surface::Parametric { .. } => "Parametric Equation",
            Surface::Implicit { .. } => "Implicit Equation",
        }
    }

    pub fn dim(&self) -> usize {
        match &self.surface {
            Surface::Cuboid { pmin, .. } => pmin.len(),
            Surface::Sphere { center, .. } => center.len(),
            Surface::Triangle { p1, .. } => p1.len(),
            Surface::Plane { a, .. } => a.len(),
            Surface::Quadric { b, .. } => b.len(),
            Surface::Quartic { .. } => 3,
            Surface::Parametric { .. } => 3,
            Surface::Implicit { pmin, .. } => pmin.len(),
        }
    }

    /// Nearest hit distance beyond EPS, `f64::MAX` on a miss. An engraving
    /// predicate may veto an otherwise valid hit.
    pub fn intersect(
        &self,
        ray_start: &DVector<f64>,
        ray_dir: &DVector<f64>,
        scratch: &mut VecPool,
    ) -> f64 {
        let distance = self.intersect_pure(ray_start, ray_dir, scratch);
        if distance == f64::MAX {
            return distance;
        }
        if let Some(engraving) = self.engraving {
            let hit = EngravingHit {
                ray_start,
                ray_dir,
                distance,
                shape: self,
            };
            if engraving(&hit) {
                return f64::MAX;
            }
        }
        distance
    }

    pub fn intersect_pure(
        &self,
        ray_start: &DVector<f64>,
        ray_dir: &DVector<f64>,
        scratch: &mut VecPool,
    ) -> f64 {
        match &self.surface {
            Surface::Cuboid { pmin, pmax } => slab_intersect(pmin, pmax, ray_start, ray_dir),
            Surface::Sphere { center, radius } => {
                let mut oc = scratch.take();
                oc.copy_from(ray_start);
                oc.axpy(-1.0, center, 1.0);

                let a = ray_dir.dot(ray_dir);
                let b = 2.0 * ray_dir.dot(&oc);
                let c = oc.dot(&oc) - radius * radius;
                scratch.give(oc);

                let (r1, r2) = math::solve_quadratic_real(a, b, c);
                nearest_positive(&[r1, r2])
            }
            Surface::Triangle {
                p1, edge1, edge2, ..
            } => {
                let mut t = scratch.take();
                let mut p = scratch.take();
                let mut q = scratch.take();

                // P = D x E2, a = E1.P; fold the back face onto the front
                math::cross3(&mut p, ray_dir, edge2);
                let mut a = edge1.dot(&p);
                if a > 0.0 {
                    t.copy_from(ray_start);
                    t.axpy(-1.0, p1, 1.0);
                } else {
                    t.copy_from(p1);
                    t.axpy(-1.0, ray_start, 1.0);
                    a = -a;
                }

                let mut distance = f64::MAX;
                if a >= EPS {
                    math::cross3(&mut q, &t, edge1);
                    let u = t.dot(&p) / a;
                    let v = ray_dir.dot(&q) / a;
                    if (0.0..=1.0).contains(&u) && v >= 0.0 && u + v <= 1.0 {
                        let d = edge2.dot(&q) / a;
                        if d > EPS {
                            distance = d;
                        }
                    }
                }

                scratch.give(t);
                scratch.give(p);
                scratch.give(q);
                distance
            }
            Surface::Plane { a, b } => {
                let denom = a.dot(ray_dir);
                if denom.abs() < EPS {
                    return f64::MAX;
                }
                let d = -(a.dot(ray_start) + b) / denom;
                if d > EPS {
                    d
                } else {
                    f64::MAX
                }
            }
            Surface::Quadric { a, b, c } => {
                let mut t = scratch.take();

                // coefficients of |o + s d| substituted into the quadric
                t.gemv(1.0, a, ray_dir, 0.0);
                let qa = ray_dir.dot(&t);
                let qb = 2.0 * ray_start.dot(&t) + b.dot(ray_dir);
                t.gemv(1.0, a, ray_start, 0.0);
                let qc = ray_start.dot(&t) + b.dot(ray_start) + c;
                scratch.give(t);

                let (r1, r2) = math::solve_quadratic_real(qa, qb, qc);
                nearest_positive(&[r1, r2])
            }
            Surface::Quartic { a } => quartic_intersect(a, ray_start, ray_dir),
            Surface::Parametric { f, u_range, v_range } => {
                parametric_intersect(*f, *u_range, *v_range, ray_start, ray_dir)
            }
            Surface::Implicit { f, pmin, pmax } => {
                implicit_intersect(*f, pmin, pmax, ray_start, ray_dir, scratch)
            }
        }
    }

    /// Unit surface normal at a hit point, written into `res`. Orientation
    /// is the geometric one; the integrator flips it against the ray.
    pub fn normal_at(&self, point: &DVector<f64>, res: &mut DVector<f64>) {
        match &self.surface {
            Surface::Cuboid { pmin, pmax } => {
                res.fill(0.0);
                for i in 0..point.len() {
                    if (point[i] - pmin[i]).abs() < EPS {
                        res[i] = -1.0;
                        return;
                    }
                    if (point[i] - pmax[i]).abs() < EPS {
                        res[i] = 1.0;
                        return;
                    }
                }
            }
            Surface::Sphere { center, .. } => {
                res.copy_from(point);
                res.axpy(-1.0, center, 1.0);
                math::normalize(res);
            }
            Surface::Triangle { normal, .. } => {
                res.copy_from(normal);
            }
            Surface::Plane { a, .. } => {
                res.copy_from(a);
                math::normalize(res);
            }
            Surface::Quadric { a, b, .. } => {
                // gradient 2 A x + b
                res.gemv(2.0, a, point, 0.0);
                *res += b;
                math::normalize(res);
            }
            Surface::Quartic { a } => {
                quartic_gradient(a, point, res);
                math::normalize(res);
            }
            Surface::Parametric { f, u_range, v_range } => {
                parametric_normal(*f, *u_range, *v_range, point, res);
            }
            Surface::Implicit { f, .. } => {
                implicit_gradient(*f, point, res);
                math::normalize(res);
            }
        }
    }

    pub fn bounding_box(&self) -> (DVector<f64>, DVector<f64>) {
        match &self.surface {
            Surface::Cuboid { pmin, pmax } => (pmin.clone(), pmax.clone()),
            Surface::Sphere { center, radius } => {
                let offset = DVector::from_element(center.len(), *radius);
                (center - &offset, center + &offset)
            }
            Surface::Triangle { p1, p2, p3, .. } => {
                let mut pmin = p1.clone();
                let mut pmax = p1.clone();
                for p in [p2, p3] {
                    for i in 0..p.len() {
                        pmin[i] = pmin[i].min(p[i]);
                        pmax[i] = pmax[i].max(p[i]);
                    }
                }
                (pmin, pmax)
            }
            Surface::Plane { a, .. } => unbounded_box(a.len()),
            Surface::Quadric { b, .. } => unbounded_box(b.len()),
            Surface::Quartic { .. } => unbounded_box(3),
            Surface::Parametric { f, u_range, v_range } => {
                // sample a coarse grid; corner-only boxes under-cover
                let steps = 16;
                let mut pmin = f(u_range[0], v_range[0]);
                let mut pmax = pmin.clone();
                for i in 0..=steps {
                    for j in 0..=steps {
                        let u = u_range[0] + (u_range[1] - u_range[0]) * i as f64 / steps as f64;
                        let v = v_range[0] + (v_range[1] - v_range[0]) * j as f64 / steps as f64;
                        let p = f(u, v);
                        for k in 0..p.len() {
                            pmin[k] = pmin[k].min(p[k]);
                            pmax[k] = pmax[k].max(p[k]);
                        }
                    }
                }
                (pmin, pmax)
            }
            Surface::Implicit { pmin, pmax, .. } => (pmin.clone(), pmax.clone()),
        }
    }
}

fn unbounded_box(dim: usize) -> (DVector<f64>, DVector<f64>) {
    (
        DVector::from_element(dim, -UNBOUNDED),
        DVector::from_element(dim, UNBOUNDED),
    )
}

fn nearest_positive(roots: &[Option<f64>]) -> f64 {
    let mut best = f64::MAX;
    for root in roots.iter().flatten() {
        if *root > EPS && *root < best {
            best = *root;
        }
    }
    best
}

/// Expands the quartic coefficient tensor along the ray into a univariate
/// degree-4 polynomial in the ray parameter and takes its smallest real
/// positive root.
fn quartic_intersect(a: &Tensor<f64>, ray_start: &DVector<f64>, ray_dir: &DVector<f64>) -> f64 {
    let mut coeffs = [0.0_f64; 5];
    let factors = [
        [1.0, 0.0],
        [ray_start[0], ray_dir[0]],
        [ray_start[1], ray_dir[1]],
        [ray_start[2], ray_dir[2]],
    ];

    for i in 0..4 {
        for j in 0..4 {
            for k in 0..4 {
                for l in 0..4 {
                    let c = a.get(&[i, j, k, l]);
                    if c == 0.0 {
                        continue;
                    }

                    let mut poly = [1.0, 0.0, 0.0, 0.0, 0.0];
                    for idx in [i, j, k, l] {
                        let factor = factors[idx];
                        let mut next = [0.0; 5];
                        for (d1, coef1) in poly.iter().enumerate() {
                            for (d2, coef2) in factor.iter().enumerate() {
                                if d1 + d2 < 5 {
                                    next[d1 + d2] += coef1 * coef2;
                                }
                            }
                        }
                        poly = next;
                    }

                    for (d, coef) in poly.iter().enumerate() {
                        coeffs[d] += c * coef;
                    }
                }
            }
        }
    }

    let roots = math::solve_quartic(coeffs[4], coeffs[3], coeffs[2], coeffs[1], coeffs[0]);
    let mut best = f64::MAX;
    for root in roots {
        if root.im.abs() < EPS && root.re > EPS && root.re < best {
            best = root.re;
        }
    }
    best
}

fn quartic_gradient(a: &Tensor<f64>, point: &DVector<f64>, res: &mut DVector<f64>) {
    let factors = [1.0, point[0], point[1], point[2]];
    res.fill(0.0);

    for i in 0..4 {
        for j in 0..4 {
            for k in 0..4 {
                for l in 0..4 {
                    let c = a.get(&[i, j, k, l]);
                    if c == 0.0 {
                        continue;
                    }
                    let idx = [i, j, k, l];
                    for axis in 1..4 {
                        let mut d = 0.0;
                        for slot in 0..4 {
                            if idx[slot] == axis {
                                let mut prod = 1.0;
                                for other in 0..4 {
                                    if other != slot {
                                        prod *= factors[idx[other]];
                                    }
                                }
                                d += prod;
                            }
                        }
                        res[axis - 1] += c * d;
                    }
                }
            }
        }
    }
}

fn parametric_intersect(
    f: ParametricFn,
    u_range: [f64; 2],
    v_range: [f64; 2],
    ray_start: &DVector<f64>,
    ray_dir: &DVector<f64>,
) -> f64 {
    let equations = |x: &[f64]| {
        let (t, u, v) = (x[0], x[1], x[2]);
        let on_surface = f(u, v);
        (0..3)
            .map(|i| ray_start[i] + t * ray_dir[i] - on_surface[i])
            .collect()
    };

    let mut best = f64::MAX;
    for iu in 0..3 {
        for iv in 0..3 {
            let u0 = u_range[0] + (u_range[1] - u_range[0]) * iu as f64 / 2.0;
            let v0 = v_range[0] + (v_range[1] - v_range[0]) * iv as f64 / 2.0;
            if let Some(sol) = math::newton_raphson(&equations, &[0.0, u0, v0], 1e-9, 32) {
                let (t, u, v) = (sol[0], sol[1], sol[2]);
                if t > EPS
                    && t < best
                    && (u_range[0]..=u_range[1]).contains(&u)
                    && (v_range[0]..=v_range[1]).contains(&v)
                {
                    best = t;
                }
            }
        }
    }
    best
}

fn parametric_normal(
    f: ParametricFn,
    u_range: [f64; 2],
    v_range: [f64; 2],
    point: &DVector<f64>,
    res: &mut DVector<f64>,
) {
    // Recover (u, v) of the hit: stationary point of |f(u,v) - p|^2.
    let objective = |x: &[f64]| {
        let (u, v) = (x[0], x[1]);
        let h = 1e-6;
        let p0 = f(u, v);
        let du = (f(u + h, v) - f(u - h, v)) / (2.0 * h);
        let dv = (f(u, v + h) - f(u, v - h)) / (2.0 * h);
        let diff = &p0 - point;
        vec![diff.dot(&du), diff.dot(&dv)]
    };

    let mut best: Option<(f64, f64, f64)> = None;
    for iu in 0..3 {
        for iv in 0..3 {
            let u0 = u_range[0] + (u_range[1] - u_range[0]) * iu as f64 / 2.0;
            let v0 = v_range[0] + (v_range[1] - v_range[0]) * iv as f64 / 2.0;
            if let Some(sol) = math::newton_raphson(&objective, &[u0, v0], 1e-10, 32) {
                let dist = (f(sol[0], sol[1]) - point).norm();
                if best.map_or(true, |(d, _, _)| dist < d) {
                    best = Some((dist, sol[0], sol[1]));
                }
            }
        }
    }

    res.fill(0.0);
    if let Some((_, u, v)) = best {
        let h = 1e-6;
        let du = (f(u + h, v) - f(u - h, v)) / (2.0 * h);
        let dv = (f(u, v + h) - f(u, v - h)) / (2.0 * h);
        math::cross3(res, &du, &dv);
        math::normalize(res);
    }
}

fn implicit_intersect(
    f: ImplicitFn,
    pmin: &DVector<f64>,
    pmax: &DVector<f64>,
    ray_start: &DVector<f64>,
    ray_dir: &DVector<f64>,
    scratch: &mut VecPool,
) -> f64 {
    let (t0, t1) = match slab_interval(pmin, pmax, ray_start, ray_dir) {
        Some(bounds) => bounds,
        None => return f64::MAX,
    };
    let enter = t0.max(EPS);
    if t1 <= enter {
        return f64::MAX;
    }

    let mut point = scratch.take();
    let mut eval = |t: f64, point: &mut DVector<f64>| {
        point.copy_from(ray_start);
        point.axpy(t, ray_dir, 1.0);
        f(point)
    };

    // march the box interval for a sign change, then bisect
    let steps = 256;
    let dt = (t1 - enter) / steps as f64;
    let mut prev_t = enter;
    let mut prev_v = eval(prev_t, &mut point);
    let mut result = f64::MAX;

    for i in 1..=steps {
        let t = enter + dt * i as f64;
        let v = eval(t, &mut point);
        if prev_v == 0.0 {
            result = prev_t;
            break;
        }
        if prev_v * v < 0.0 {
            let (mut lo, mut hi) = (prev_t, t);
            let mut lo_v = prev_v;
            for _ in 0..64 {
                let mid = 0.5 * (lo + hi);
                let mid_v = eval(mid, &mut point);
                if lo_v * mid_v <= 0.0 {
                    hi = mid;
                } else {
                    lo = mid;
                    lo_v = mid_v;
                }
            }
            let t_hit = 0.5 * (lo + hi);
            if t_hit > EPS {
                result = t_hit;
            }
            break;
        }
        prev_t = t;
        prev_v = v;
    }

    scratch.give(point);
    result
}

fn implicit_gradient(f: ImplicitFn, point: &DVector<f64>, res: &mut DVector<f64>) {
    let h = 1e-6;
    let mut probe = point.clone();
    for i in 0..point.len() {
        probe[i] = point[i] + h;
        let fp = f(&probe);
        probe[i] = point[i] - h;
        let fm = f(&probe);
        probe[i] = point[i];
        res[i] = (fp - fm) / (2.0 * h);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    fn pool() -> VecPool {
        VecPool::new(3)
    }

    fn hit_point(start: &DVector<f64>, dir: &DVector<f64>, t: f64) -> DVector<f64> {
        start + dir * t
    }

    #[test]
    fn cuboid_constructor_validates_corners() {
        assert!(Shape::cuboid(dvector![0.0, 0.0, 0.0], dvector![1.0, 1.0, 1.0]).is_ok());
        assert!(Shape::cuboid(dvector![0.0, 2.0, 0.0], dvector![1.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn cuboid_hit_from_outside_and_inside() {
        let cube = Shape::cuboid(dvector![-1.0, -1.0, -1.0], dvector![1.0, 1.0, 1.0]).unwrap();
        let mut scratch = pool();

        let start = dvector![-3.0, 0.0, 0.0];
        let dir = dvector![1.0, 0.0, 0.0];
        let t = cube.intersect(&start, &dir, &mut scratch);
        assert!((t - 2.0).abs() < 1e-12);

        // from inside, the exit face is reported
        let start = dvector![0.0, 0.0, 0.0];
        let t = cube.intersect(&start, &dir, &mut scratch);
        assert!((t - 1.0).abs() < 1e-12);

        // axis-parallel ray sliding past
        let start = dvector![-3.0, 2.0, 0.0];
        let t = cube.intersect(&start, &dir, &mut scratch);
        assert_eq!(t, f64::MAX);
    }

    #[test]
    fn cuboid_grazing_edge_is_finite() {
        let cube = Shape::cuboid(dvector![-1.0, -1.0, -1.0], dvector![1.0, 1.0, 1.0]).unwrap();
        let mut scratch = pool();
        let start = dvector![-3.0, 1.0, 1.0];
        let dir = dvector![1.0, 0.0, 0.0];
        let t = cube.intersect(&start, &dir, &mut scratch);
        assert!(t.is_finite());
        assert!(!t.is_nan());
    }

    #[test]
    fn cuboid_normal_has_face_sign() {
        let cube = Shape::cuboid(dvector![-1.0, -1.0, -1.0], dvector![1.0, 1.0, 1.0]).unwrap();
        let mut n = DVector::zeros(3);
        cube.normal_at(&dvector![-1.0, 0.2, 0.3], &mut n);
        assert_eq!(n, dvector![-1.0, 0.0, 0.0]);
        cube.normal_at(&dvector![1.0, 0.2, 0.3], &mut n);
        assert_eq!(n, dvector![1.0, 0.0, 0.0]);
    }

    #[test]
    fn sphere_hit_and_normal() {
        let sphere = Shape::sphere(dvector![0.0, 0.0, 0.0], 1.0).unwrap();
        let mut scratch = pool();
        let start = dvector![-5.0, 0.0, 0.0];
        let dir = dvector![1.0, 0.0, 0.0];
        let t = sphere.intersect(&start, &dir, &mut scratch);
        assert!((t - 4.0).abs() < 1e-10);

        let p = hit_point(&start, &dir, t);
        let mut n = DVector::zeros(3);
        sphere.normal_at(&p, &mut n);
        assert!((n.norm() - 1.0).abs() < 1e-12);
        assert!((n[0] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn sphere_from_inside_reports_far_wall() {
        let sphere = Shape::sphere(dvector![0.0, 0.0, 0.0], 2.0).unwrap();
        let mut scratch = pool();
        let t = sphere.intersect(&dvector![0.0, 0.0, 0.0], &dvector![0.0, 1.0, 0.0], &mut scratch);
        assert!((t - 2.0).abs() < 1e-10);
    }

    #[test]
    fn sphere_rejects_bad_radius() {
        assert!(Shape::sphere(dvector![0.0, 0.0, 0.0], 0.0).is_err());
        assert!(Shape::sphere(dvector![0.0, 0.0, 0.0], -1.0).is_err());
    }

    #[test]
    fn triangle_two_sided_hit() {
        let tri = Shape::triangle(
            dvector![0.0, 0.0, 0.0],
            dvector![1.0, 0.0, 0.0],
            dvector![0.0, 1.0, 0.0],
        )
        .unwrap();
        let mut scratch = pool();

        let dir_down = dvector![0.0, 0.0, -1.0];
        let t = tri.intersect(&dvector![0.25, 0.25, 3.0], &dir_down, &mut scratch);
        assert!((t - 3.0).abs() < 1e-12);

        // the same triangle hit from behind
        let dir_up = dvector![0.0, 0.0, 1.0];
        let t = tri.intersect(&dvector![0.25, 0.25, -3.0], &dir_up, &mut scratch);
        assert!((t - 3.0).abs() < 1e-12);

        // outside the barycentric wedge
        let t = tri.intersect(&dvector![0.9, 0.9, 3.0], &dir_down, &mut scratch);
        assert_eq!(t, f64::MAX);
    }

    #[test]
    fn triangle_rejects_degenerate() {
        assert!(Shape::triangle(
            dvector![0.0, 0.0, 0.0],
            dvector![1.0, 1.0, 1.0],
            dvector![2.0, 2.0, 2.0],
        )
        .is_err());
    }

    #[test]
    fn plane_parallel_ray_misses() {
        let plane = Shape::plane(dvector![0.0, 0.0, 1.0], 0.0).unwrap();
        let mut scratch = pool();
        let t = plane.intersect(&dvector![0.0, 0.0, 1.0], &dvector![1.0, 0.0, 0.0], &mut scratch);
        assert_eq!(t, f64::MAX);

        let t = plane.intersect(&dvector![0.0, 0.0, 1.0], &dvector![0.0, 0.0, -1.0], &mut scratch);
        assert!((t - 1.0).abs() < 1e-12);
    }

    #[test]
    fn quadric_sphere_matches_sphere() {
        // x^2 + y^2 + z^2 - 1 = 0
        let quadric = Shape::quadric(
            DMatrix::identity(3, 3),
            DVector::zeros(3),
            -1.0,
        )
        .unwrap();
        let sphere = Shape::sphere(DVector::zeros(3), 1.0).unwrap();
        let mut scratch = pool();

        let start = dvector![-4.0, 0.3, 0.1];
        let mut dir = dvector![1.0, -0.05, 0.02];
        math::normalize(&mut dir);

        let tq = quadric.intersect(&start, &dir, &mut scratch);
        let ts = sphere.intersect(&start, &dir, &mut scratch);
        assert!((tq - ts).abs() < 1e-9);

        let p = hit_point(&start, &dir, tq);
        let mut n = DVector::zeros(3);
        quadric.normal_at(&p, &mut n);
        let mut expected = p.clone();
        math::normalize(&mut expected);
        assert!((n - expected).norm() < 1e-9);
    }

    #[test]
    fn quartic_encodes_unit_sphere() {
        // x^2 + y^2 + z^2 - 1 via the (1, x, y, z) tensor
        let mut coeffs = vec![0.0; 256];
        let at = |i: usize, j: usize, k: usize, l: usize| i * 64 + j * 16 + k * 4 + l;
        coeffs[at(1, 1, 0, 0)] = 1.0;
        coeffs[at(2, 2, 0, 0)] = 1.0;
        coeffs[at(3, 3, 0, 0)] = 1.0;
        coeffs[at(0, 0, 0, 0)] = -1.0;
        let quartic = Shape::quartic(&coeffs).unwrap();
        let mut scratch = pool();

        let start = dvector![-3.0, 0.0, 0.0];
        let dir = dvector![1.0, 0.0, 0.0];
        let t = quartic.intersect(&start, &dir, &mut scratch);
        assert!((t - 2.0).abs() < 1e-6);

        let p = hit_point(&start, &dir, t);
        let mut n = DVector::zeros(3);
        quartic.normal_at(&p, &mut n);
        assert!((n[0] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn implicit_sphere_intersection() {
        fn field(p: &DVector<f64>) -> f64 {
            p.dot(p) - 1.0
        }
        let shape = Shape::implicit(
            field,
            dvector![-1.5, -1.5, -1.5],
            dvector![1.5, 1.5, 1.5],
        )
        .unwrap();
        let mut scratch = pool();

        let start = dvector![-4.0, 0.0, 0.0];
        let dir = dvector![1.0, 0.0, 0.0];
        let t = shape.intersect(&start, &dir, &mut scratch);
        assert!((t - 3.0).abs() < 1e-6);

        let p = hit_point(&start, &dir, t);
        let mut n = DVector::zeros(3);
        shape.normal_at(&p, &mut n);
        assert!((n[0] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn parametric_sphere_intersection() {
        fn sphere_patch(u: f64, v: f64) -> DVector<f64> {
            dvector![u.cos() * v.sin(), u.sin() * v.sin(), v.cos()]
        }
        let shape = Shape::parametric(
            sphere_patch,
            [0.0, std::f64::consts::PI],
            [0.0, std::f64::consts::PI],
        );
        let mut scratch = pool();

        let start = dvector![0.0, 0.0, 4.0];
        let dir = dvector![0.0, 0.0, -1.0];
        let t = shape.intersect(&start, &dir, &mut scratch);
        assert!((t - 3.0).abs() < 1e-6, "t = {}", t);
    }

    #[test]
    fn engraving_rejects_everything() {
        fn always(_hit: &EngravingHit<'_>) -> bool {
            true
        }
        let sphere = Shape::sphere(dvector![0.0, 0.0, 0.0], 1.0)
            .unwrap()
            .with_engraving(always);
        let mut scratch = pool();
        let t = sphere.intersect(&dvector![-5.0, 0.0, 0.0], &dvector![1.0, 0.0, 0.0], &mut scratch);
        assert_eq!(t, f64::MAX);
    }

    #[test]
    fn hit_points_lie_on_surface() {
        let sphere = Shape::sphere(dvector![0.5, -0.25, 2.0], 1.5).unwrap();
        let mut scratch = pool();
        let start = dvector![-4.0, 1.0, 0.0];
        let mut dir = dvector![1.0, -0.3, 0.5];
        math::normalize(&mut dir);

        let t = sphere.intersect(&start, &dir, &mut scratch);
        assert!(t > EPS && t < f64::MAX);
        let p = hit_point(&start, &dir, t);
        let center_dist = (p - dvector![0.5, -0.25, 2.0]).norm();
        assert!((center_dist - 1.5).abs() < 1e-4 * t);
    }
}
