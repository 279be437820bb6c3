//! Real Wigner D matrices and conversions between rotation parametrizations.
//!
//! Rotations are parametrized by Euler angles in the `Y-X-Y` convention:
//! `R(alpha, beta, gamma) = R_y(alpha) R_x(beta) R_y(gamma)`.

use ndarray::{Array1, Array2, Axis, array};
use num_complex::Complex64;

use super::{Irrep, Parity};

/// Euler angles `(alpha, beta, gamma)`.
pub type Angles = (f64, f64, f64);

fn su2_generators(l: u32) -> [Array2<Complex64>; 3] {
    let n = 2 * l as usize + 1;
    let j = l as f64;
    let mut raising = Array2::<Complex64>::zeros((n, n));
    let mut lowering = Array2::<Complex64>::zeros((n, n));
    let mut diagonal = Array2::<Complex64>::zeros((n, n));

    for i in 0..n {
        let m = i as f64 - j;
        diagonal[[i, i]] = Complex64::new(0.0, m);
        if i + 1 < n {
            raising[[i + 1, i]] = Complex64::from(-(j * (j + 1.0) - m * (m + 1.0)).sqrt());
            let m = m + 1.0;
            lowering[[i, i + 1]] = Complex64::from((j * (j + 1.0) - m * (m - 1.0)).sqrt());
        }
    }

    let half = Complex64::new(0.5, 0.0);
    let half_i = Complex64::new(0.0, -0.5);
    [
        (&raising + &lowering).mapv(|x| x * half),
        diagonal,
        (&raising - &lowering).mapv(|x| x * half_i),
    ]
}

/// Change of basis from real to complex spherical harmonics.
fn change_basis_real_to_complex(l: u32) -> Array2<Complex64> {
    let n = 2 * l as usize + 1;
    let l = l as i64;
    let s = std::f64::consts::FRAC_1_SQRT_2;
    let mut q = Array2::<Complex64>::zeros((n, n));

    for m in -l..0 {
        let row = (l + m) as usize;
        q[[row, (l - m) as usize]] = Complex64::new(s, 0.0);
        q[[row, (l + m) as usize]] = Complex64::new(0.0, -s);
    }
    q[[l as usize, l as usize]] = Complex64::new(1.0, 0.0);
    for m in 1..=l {
        let row = (l + m) as usize;
        let sign = if m % 2 == 0 { 1.0 } else { -1.0 };
        q[[row, (l + m) as usize]] = Complex64::new(sign * s, 0.0);
        q[[row, (l - m) as usize]] = Complex64::new(0.0, sign * s);
    }

    let phase = Complex64::new(0.0, -1.0).powu(l as u32);
    q.mapv_inplace(|x| x * phase);
    q
}

/// Generators of so(3) in the real basis of order `l`, about the `x`, `y` and `z` axes.
pub fn so3_generators(l: u32) -> [Array2<f64>; 3] {
    let q = change_basis_real_to_complex(l);
    let q_dagger = q.t().mapv(|x| x.conj());
    su2_generators(l).map(|x| q_dagger.dot(&x).dot(&q).mapv(|x| x.re))
}

/// Matrix exponential by scaling and squaring with a truncated Taylor series.
pub fn expm(a: &Array2<f64>) -> Array2<f64> {
    const TERMS: usize = 18;

    let n = a.nrows();
    let norm = a
        .axis_iter(Axis(0))
        .map(|row| row.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    let squarings = match norm > 0.5 {
        true => (norm / 0.5).log2().ceil() as i32,
        false => 0,
    };
    let a = a / 2.0f64.powi(squarings);

    let mut term = Array2::<f64>::eye(n);
    let mut sum = Array2::<f64>::eye(n);
    for k in 1..=TERMS {
        term = term.dot(&a) / k as f64;
        sum += &term;
    }
    for _ in 0..squarings {
        sum = sum.dot(&sum);
    }
    sum
}

/// The real Wigner D matrix of order `l` (no parity factor).
pub fn wigner_d(l: u32, alpha: f64, beta: f64, gamma: f64) -> Array2<f64> {
    let [x, y, _] = so3_generators(l);
    let a = expm(&(&y * alpha));
    let b = expm(&(&x * beta));
    let c = expm(&(&y * gamma));
    a.dot(&b).dot(&c)
}

impl Irrep {
    /// The representation matrix of the group element `(R(alpha, beta, gamma), -1^k)`.
    pub fn rotation_matrix(&self, alpha: f64, beta: f64, gamma: f64, k: i32) -> Array2<f64> {
        let sign = match (self.p, k.rem_euclid(2)) {
            (Parity::Odd, 1) => -1.0,
            _ => 1.0,
        };
        wigner_d(self.l, alpha, beta, gamma) * sign
    }
}

pub fn matrix_x(angle: f64) -> Array2<f64> {
    let (s, c) = angle.sin_cos();
    array![[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
}

pub fn matrix_y(angle: f64) -> Array2<f64> {
    let (s, c) = angle.sin_cos();
    array![[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

pub fn matrix_z(angle: f64) -> Array2<f64> {
    let (s, c) = angle.sin_cos();
    array![[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

pub fn angles_to_matrix(alpha: f64, beta: f64, gamma: f64) -> Array2<f64> {
    matrix_y(alpha).dot(&matrix_x(beta)).dot(&matrix_y(gamma))
}

/// The angles `(alpha, beta)` such that `R(alpha, beta, 0)` maps `y` onto `xyz`.
pub fn xyz_to_angles(xyz: [f64; 3]) -> (f64, f64) {
    let norm = xyz.iter().map(|x| x * x).sum::<f64>().sqrt();
    let [x, y, z] = match norm > 0.0 {
        true => xyz.map(|x| x / norm),
        false => [0.0, 1.0, 0.0],
    };
    let beta = y.clamp(-1.0, 1.0).acos();
    let alpha = x.atan2(z);
    (alpha, beta)
}

/// Inverts [`angles_to_matrix`] for a proper rotation.
pub fn matrix_to_angles(r: &Array2<f64>) -> Angles {
    let y = r.dot(&Array1::from(vec![0.0, 1.0, 0.0]));
    let (alpha, beta) = xyz_to_angles([y[0], y[1], y[2]]);
    let r = angles_to_matrix(alpha, beta, 0.0).t().dot(r);
    let gamma = r[[0, 2]].atan2(r[[0, 0]]);
    (alpha, beta, gamma)
}

/// Rotation matrix of a quaternion `[w, x, y, z]`. The quaternion is normalized first.
pub fn quaternion_to_matrix(q: [f64; 4]) -> Array2<f64> {
    let norm = q.iter().map(|x| x * x).sum::<f64>().sqrt();
    let [w, x, y, z] = q.map(|x| x / norm);
    array![
        [
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - z * w),
            2.0 * (x * z + y * w)
        ],
        [
            2.0 * (x * y + z * w),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - x * w)
        ],
        [
            2.0 * (x * z - y * w),
            2.0 * (y * z + x * w),
            1.0 - 2.0 * (x * x + y * y)
        ],
    ]
}

pub fn quaternion_to_angles(q: [f64; 4]) -> Angles {
    matrix_to_angles(&quaternion_to_matrix(q))
}

/// Right-handed rotation of `angle` about `axis`.
pub fn axis_angle_to_matrix(axis: [f64; 3], angle: f64) -> Array2<f64> {
    let (alpha, beta) = xyz_to_angles(axis);
    let r = angles_to_matrix(alpha, beta, 0.0);
    r.dot(&matrix_y(angle)).dot(&r.t())
}

pub fn axis_angle_to_angles(axis: [f64; 3], angle: f64) -> Angles {
    matrix_to_angles(&axis_angle_to_matrix(axis, angle))
}

/// Determinant of a 3×3 matrix.
pub fn det3(r: &Array2<f64>) -> f64 {
    r[[0, 0]] * (r[[1, 1]] * r[[2, 2]] - r[[1, 2]] * r[[2, 1]])
        - r[[0, 1]] * (r[[1, 0]] * r[[2, 2]] - r[[1, 2]] * r[[2, 0]])
        + r[[0, 2]] * (r[[1, 0]] * r[[2, 1]] - r[[1, 1]] * r[[2, 0]])
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    use super::*;
    use crate::irreps::Irrep;

    fn random_angles() -> Angles {
        let tau = std::f64::consts::TAU;
        (
            fastrand::f64() * tau,
            fastrand::f64() * std::f64::consts::PI,
            fastrand::f64() * tau,
        )
    }

    #[test]
    fn test_l1_is_rotation() -> Result<(), Box<dyn Error>> {
        let (a, b, c) = random_angles();
        let ir: Irrep = "1o".parse()?;
        let d = ir.rotation_matrix(a, b, c, 0);
        assert_abs_diff_eq!(d, angles_to_matrix(a, b, c), epsilon = 1e-9);

        let d = ir.rotation_matrix(a, b, c, 1);
        assert_abs_diff_eq!(d, -angles_to_matrix(a, b, c), epsilon = 1e-9);

        let ir: Irrep = "1e".parse()?;
        let d = ir.rotation_matrix(a, b, c, 1);
        assert_abs_diff_eq!(d, angles_to_matrix(a, b, c), epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_orthogonal() {
        for l in 0..5 {
            let (a, b, c) = random_angles();
            let d = wigner_d(l, a, b, c);
            let n = 2 * l as usize + 1;
            assert_abs_diff_eq!(d.dot(&d.t()), Array2::eye(n), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_composition() {
        let (a1, b1, c1) = random_angles();
        let (a2, b2, c2) = random_angles();
        let r = angles_to_matrix(a1, b1, c1).dot(&angles_to_matrix(a2, b2, c2));
        let (a, b, c) = matrix_to_angles(&r);
        for l in 0..4 {
            let d1 = wigner_d(l, a1, b1, c1);
            let d2 = wigner_d(l, a2, b2, c2);
            assert_abs_diff_eq!(d1.dot(&d2), wigner_d(l, a, b, c), epsilon = 1e-8);
        }
    }

    #[test]
    fn test_conversions() {
        let (a, b, c) = random_angles();
        let r = angles_to_matrix(a, b, c);
        let (a, b, c) = matrix_to_angles(&r);
        assert_abs_diff_eq!(angles_to_matrix(a, b, c), r, epsilon = 1e-9);
        assert_abs_diff_eq!(det3(&r), 1.0, epsilon = 1e-9);

        let angle = 0.7;
        let (s, c) = (angle / 2.0f64).sin_cos();
        let q = quaternion_to_matrix([c, 0.0, s, 0.0]);
        assert_abs_diff_eq!(q, matrix_y(angle), epsilon = 1e-12);
        assert_abs_diff_eq!(
            axis_angle_to_matrix([0.0, 0.0, 2.0], angle),
            matrix_z(angle),
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            quaternion_to_matrix([c, s, 0.0, 0.0]),
            axis_angle_to_matrix([1.0, 0.0, 0.0], angle),
            epsilon = 1e-9
        );
    }
}
