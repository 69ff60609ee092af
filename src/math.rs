use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

pub const EPS: f64 = 1e-6;

/// Normalizes in place; a zero vector is left unchanged.
pub fn normalize(v: &mut DVector<f64>) {
    let norm = v.norm();
    if norm == 0.0 {
        return;
    }
    v.scale_mut(1.0 / norm);
}

pub fn cross3(res: &mut DVector<f64>, u: &DVector<f64>, v: &DVector<f64>) {
    assert!(
        res.len() == 3 && u.len() == 3 && v.len() == 3,
        "cross product requires 3-dimensional vectors"
    );
    let (a, b) = (u, v);
    let x = a[1] * b[2] - a[2] * b[1];
    let y = a[2] * b[0] - a[0] * b[2];
    let z = a[0] * b[1] - a[1] * b[0];
    res[0] = x;
    res[1] = y;
    res[2] = z;
}

pub fn cross3_alloc(u: &DVector<f64>, v: &DVector<f64>) -> DVector<f64> {
    let mut res = DVector::zeros(3);
    cross3(&mut res, u, v);
    res
}

/// 4-D cross product of three vectors via the 4x4 minor expansion.
pub fn cross4(u: &DVector<f64>, v: &DVector<f64>, w: &DVector<f64>) -> DVector<f64> {
    assert!(
        u.len() == 4 && v.len() == 4 && w.len() == 4,
        "4-D cross product requires three 4-dimensional vectors"
    );
    let mut res = DVector::zeros(4);
    res[0] = u[1] * (v[2] * w[3] - v[3] * w[2]) - u[2] * (v[1] * w[3] - v[3] * w[1])
        + u[3] * (v[1] * w[2] - v[2] * w[1]);
    res[1] = -u[0] * (v[2] * w[3] - v[3] * w[2]) + u[2] * (v[0] * w[3] - v[3] * w[0])
        - u[3] * (v[0] * w[2] - v[2] * w[0]);
    res[2] = u[0] * (v[1] * w[3] - v[3] * w[1]) - u[1] * (v[0] * w[3] - v[3] * w[0])
        + u[3] * (v[0] * w[1] - v[1] * w[0]);
    res[3] = -u[0] * (v[1] * w[2] - v[2] * w[1]) + u[1] * (v[0] * w[2] - v[2] * w[0])
        - u[2] * (v[0] * w[1] - v[1] * w[0]);
    res
}

/// Gram-Schmidt orthonormalization. Vectors that collapse to (near) zero
/// after projection are dropped from the result.
pub fn gram_schmidt(vectors: &[DVector<f64>]) -> Vec<DVector<f64>> {
    let mut basis: Vec<DVector<f64>> = Vec::with_capacity(vectors.len());
    for v in vectors {
        let mut u = v.clone();
        for e in &basis {
            let coef = u.dot(e);
            u.axpy(-coef, e, 1.0);
        }
        let norm = u.norm();
        if norm < EPS {
            continue;
        }
        u.scale_mut(1.0 / norm);
        basis.push(u);
    }
    basis
}

/// ax + b = 0
pub fn solve_linear(a: f64, b: f64) -> Option<f64> {
    if a == 0.0 {
        return None;
    }
    Some(-b / a)
}

/// Real roots of ax^2 + bx + c = 0. Degenerates to the linear case when
/// a == 0; a non-positive discriminant yields one or zero roots.
pub fn solve_quadratic_real(a: f64, b: f64, c: f64) -> (Option<f64>, Option<f64>) {
    if a == 0.0 {
        return (solve_linear(b, c), None);
    }
    let delta = b * b - 4.0 * a * c;
    if delta < 0.0 {
        return (None, None);
    }
    if delta == 0.0 {
        return (Some(-b / (2.0 * a)), None);
    }
    let sqrt_delta = delta.sqrt();
    let denom = 2.0 * a;
    (Some((-b + sqrt_delta) / denom), Some((-b - sqrt_delta) / denom))
}

/// Complex roots of ax^2 + bx + c = 0.
pub fn solve_quadratic(a: f64, b: f64, c: f64) -> [Complex64; 2] {
    if a == 0.0 {
        let root = solve_linear(b, c).unwrap_or(f64::MAX);
        return [Complex64::new(root, 0.0), Complex64::new(f64::INFINITY, 0.0)];
    }
    let delta = Complex64::new(b * b - 4.0 * a * c, 0.0);
    let sqrt_delta = delta.sqrt();
    let denom = Complex64::new(2.0 * a, 0.0);
    let b = Complex64::new(b, 0.0);
    [(-b + sqrt_delta) / denom, (-b - sqrt_delta) / denom]
}

/// Complex roots of ax^3 + bx^2 + cx + d = 0 via Cardano.
pub fn solve_cubic(a: f64, b: f64, c: f64, d: f64) -> [Complex64; 3] {
    if a.abs() < EPS {
        let r = solve_quadratic(b, c, d);
        return [r[0], r[1], Complex64::new(f64::INFINITY, 0.0)];
    }

    let (b, c, d) = (b / a, c / a, d / a);
    let p = (3.0 * c - b * b) / 3.0;
    let q = (2.0 * b * b * b - 9.0 * b * c + 27.0 * d) / 27.0;
    let delta = Complex64::new(q / 2.0, 0.0).powu(2) + Complex64::new(p / 3.0, 0.0).powu(3);

    let half_q = Complex64::new(-q / 2.0, 0.0);
    let u = (half_q + delta.sqrt()).powf(1.0 / 3.0);
    let v = (half_q - delta.sqrt()).powf(1.0 / 3.0);
    let w = Complex64::new(-0.5, 3.0_f64.sqrt() / 2.0);

    let y0 = u + v;
    let y1 = w * u + w.conj() * v;
    let y2 = w.conj() * u + w * v;

    let offset = Complex64::new(-b / 3.0, 0.0);
    [y0 + offset, y1 + offset, y2 + offset]
}

/// Complex roots of ax^4 + bx^3 + cx^2 + dx + e = 0 (Ferrari, closed form).
/// A vanishing leading coefficient reduces the order.
pub fn solve_quartic(a: f64, b: f64, c: f64, d: f64, e: f64) -> [Complex64; 4] {
    if a.abs() < EPS {
        let r = solve_cubic(b, c, d, e);
        return [r[0], r[1], r[2], Complex64::new(f64::INFINITY, 0.0)];
    }

    let b = Complex64::new(b / a, 0.0);
    let c = Complex64::new(c / a, 0.0);
    let d = Complex64::new(d / a, 0.0);
    let e = Complex64::new(e / a, 0.0);

    let q1 = c * c - 3.0 * b * d + 12.0 * e;
    let q2 = 2.0 * c * c * c - 9.0 * b * c * d + 27.0 * d * d + 27.0 * b * b * e - 72.0 * c * e;
    let q3 = 8.0 * b * c - 16.0 * d - 2.0 * b * b * b;
    let q4 = 3.0 * b * b - 8.0 * c;

    let inner = (q2 * q2 / 4.0 - q1 * q1 * q1).sqrt();
    let q5 = (q2 / 2.0 + inner).powf(1.0 / 3.0);
    let q6 = (q1 / q5 + q5) / 3.0;
    let q7 = 2.0 * (q4 / 12.0 + q6).sqrt();

    let lower = (4.0 * q4 / 6.0 - 4.0 * q6 - q3 / q7).sqrt();
    let upper = (4.0 * q4 / 6.0 - 4.0 * q6 + q3 / q7).sqrt();
    [
        (-b - q7 - lower) / 4.0,
        (-b - q7 + lower) / 4.0,
        (-b + q7 - upper) / 4.0,
        (-b + q7 + upper) / 4.0,
    ]
}

/// Newton-Raphson for a square system f(x) = 0 with a forward-difference
/// Jacobian. Returns the solution when the residual drops below `tol`.
pub fn newton_raphson<F>(f: F, x0: &[f64], tol: f64, max_iter: usize) -> Option<Vec<f64>>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = x0.len();
    let mut x = x0.to_vec();
    let h = 1e-7;

    for _ in 0..max_iter {
        let fx = f(&x);
        let residual = fx.iter().map(|v| v * v).sum::<f64>().sqrt();
        if residual < tol {
            return Some(x);
        }

        let mut jac = DMatrix::zeros(n, n);
        for j in 0..n {
            let mut xh = x.clone();
            xh[j] += h;
            let fxh = f(&xh);
            for i in 0..n {
                jac[(i, j)] = (fxh[i] - fx[i]) / h;
            }
        }

        let rhs = DVector::from_iterator(n, fx.iter().map(|v| -v));
        let step = jac.lu().solve(&rhs)?;
        for i in 0..n {
            x[i] += step[i];
        }
        if !x.iter().all(|v| v.is_finite()) {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    #[test]
    fn normalize_keeps_zero_vector() {
        let mut v = DVector::zeros(3);
        normalize(&mut v);
        assert_eq!(v, DVector::zeros(3));

        let mut v = dvector![3.0, 4.0, 0.0];
        normalize(&mut v);
        assert!((v.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cross3_is_orthogonal() {
        let u = dvector![1.0, 2.0, 3.0];
        let v = dvector![-2.0, 0.5, 1.0];
        let c = cross3_alloc(&u, &v);
        assert!(c.dot(&u).abs() < 1e-12);
        assert!(c.dot(&v).abs() < 1e-12);
    }

    #[test]
    fn cross4_is_orthogonal_to_all_inputs() {
        let u = dvector![1.0, 0.0, 2.0, -1.0];
        let v = dvector![0.0, 1.0, 1.0, 3.0];
        let w = dvector![2.0, -1.0, 0.0, 1.0];
        let c = cross4(&u, &v, &w);
        assert!(c.dot(&u).abs() < 1e-10);
        assert!(c.dot(&v).abs() < 1e-10);
        assert!(c.dot(&w).abs() < 1e-10);
    }

    #[test]
    fn gram_schmidt_orthonormalizes() {
        let basis = gram_schmidt(&[
            dvector![1.0, 1.0, 0.0],
            dvector![1.0, 0.0, 1.0],
            dvector![0.0, 1.0, 1.0],
        ]);
        assert_eq!(basis.len(), 3);
        for i in 0..3 {
            assert!((basis[i].norm() - 1.0).abs() < 1e-10);
            for j in 0..i {
                assert!(basis[i].dot(&basis[j]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn gram_schmidt_drops_dependent_vectors() {
        let basis = gram_schmidt(&[dvector![1.0, 0.0, 0.0], dvector![2.0, 0.0, 0.0]]);
        assert_eq!(basis.len(), 1);
    }

    #[test]
    fn quadratic_real_degenerates_to_linear() {
        let (r1, r2) = solve_quadratic_real(0.0, 2.0, -4.0);
        assert_eq!(r1, Some(2.0));
        assert_eq!(r2, None);

        let (r1, r2) = solve_quadratic_real(0.0, 0.0, 1.0);
        assert_eq!(r1, None);
        assert_eq!(r2, None);
    }

    #[test]
    fn quadratic_real_roots() {
        let (r1, r2) = solve_quadratic_real(1.0, -5.0, 6.0);
        let mut roots = [r1.unwrap(), r2.unwrap()];
        roots.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((roots[0] - 2.0).abs() < 1e-12);
        assert!((roots[1] - 3.0).abs() < 1e-12);

        assert_eq!(solve_quadratic_real(1.0, 0.0, 1.0), (None, None));
    }

    #[test]
    fn cubic_roots() {
        // (t-1)(t-2)(t-3) = t^3 - 6t^2 + 11t - 6
        let roots = solve_cubic(1.0, -6.0, 11.0, -6.0);
        let mut reals: Vec<f64> = roots
            .iter()
            .filter(|r| r.im.abs() < 1e-8)
            .map(|r| r.re)
            .collect();
        reals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(reals.len(), 3);
        assert!((reals[0] - 1.0).abs() < 1e-8);
        assert!((reals[1] - 2.0).abs() < 1e-8);
        assert!((reals[2] - 3.0).abs() < 1e-8);
    }

    #[test]
    fn quartic_roots() {
        // (t-1)(t-2)(t-3)(t-4) = t^4 - 10t^3 + 35t^2 - 50t + 24
        let roots = solve_quartic(1.0, -10.0, 35.0, -50.0, 24.0);
        let mut reals: Vec<f64> = roots
            .iter()
            .filter(|r| r.im.abs() < 1e-6)
            .map(|r| r.re)
            .collect();
        reals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(reals.len(), 4);
        for (got, want) in reals.iter().zip([1.0, 2.0, 3.0, 4.0]) {
            assert!((got - want).abs() < 1e-6, "root {} vs {}", got, want);
        }
    }

    #[test]
    fn quartic_reduces_order() {
        // 0*t^4 + t^2 - 1
        let roots = solve_quartic(0.0, 0.0, 1.0, 0.0, -1.0);
        let reals: Vec<f64> = roots
            .iter()
            .filter(|r| r.im.abs() < 1e-8 && r.re.is_finite())
            .map(|r| r.re)
            .collect();
        assert!(reals.iter().any(|r| (r - 1.0).abs() < 1e-8));
        assert!(reals.iter().any(|r| (r + 1.0).abs() < 1e-8));
    }

    #[test]
    fn newton_raphson_solves_system() {
        // x^2 + y^2 = 4, x - y = 0, z = 1
        let f = |x: &[f64]| vec![x[0] * x[0] + x[1] * x[1] - 4.0, x[0] - x[1], x[2] - 1.0];
        let sol = newton_raphson(f, &[1.0, 0.5, 0.0], 1e-10, 50).unwrap();
        let expected = 2.0_f64.sqrt();
        assert!((sol[0] - expected).abs() < 1e-8);
        assert!((sol[1] - expected).abs() < 1e-8);
        assert!((sol[2] - 1.0).abs() < 1e-8);
    }
}
