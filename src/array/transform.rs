use ndarray as nd;
use nd::{Array2, ArrayD};
use rustc_hash::FxHashMap as HashMap;

use super::{IrrepsArray, IrrepsArrayError};
use crate::{
    irreps::{
        Irrep,
        wigner::{self, Angles},
    },
    num::Float,
};

/// Applies `d` to the last axis of `x`: `y[..., i] = Σ_j d[i, j] x[..., j]`.
fn rotate<A: Float>(x: &ArrayD<A>, d: &Array2<A>) -> Result<ArrayD<A>, IrrepsArrayError> {
    let shape = x.shape().to_vec();
    let dim = d.nrows();
    let rows = x.len() / dim.max(1);
    let flat = x.to_shape((rows, dim))?;
    let rotated = flat.dot(&d.t());
    Ok(rotated.into_shape_with_order(shape)?)
}

impl<A: Float> IrrepsArray<A> {
    /// # Rotate by Euler Angles (`transform_by_angles`)
    /// Applies the group element `(R(alpha, beta, gamma), (-1)^k)` to every block.
    ///
    /// ## Arguments
    /// - `alpha`, `beta`, `gamma`: rotation angles in the `Y-X-Y` convention.
    /// - `k`: the number of inversions. Odd irreps flip sign when `k` is odd.
    pub fn transform_by_angles(
        &self,
        alpha: f64,
        beta: f64,
        gamma: f64,
        k: i32,
    ) -> Result<Self, IrrepsArrayError> {
        #[cfg(feature = "trace")]
        let _span = tracing::trace_span!("transform_by_angles").entered();

        let mut matrices: HashMap<Irrep, Array2<A>> = HashMap::default();
        let blocks = self.map_blocks(|mul_ir, x| {
            let d = matrices.entry(mul_ir.ir).or_insert_with(|| {
                log::trace!("computing rotation matrix of {}", mul_ir.ir);
                mul_ir
                    .ir
                    .rotation_matrix(alpha, beta, gamma, k)
                    .mapv(A::from_f64)
            });
            rotate(x, d)
        })?;
        Self::from_blocks(self.irreps.clone(), blocks, self.leading_shape())
    }

    #[inline]
    pub fn transform_by_euler(
        &self,
        (alpha, beta, gamma): Angles,
        k: i32,
    ) -> Result<Self, IrrepsArrayError> {
        self.transform_by_angles(alpha, beta, gamma, k)
    }

    /// Rotates by a quaternion `[w, x, y, z]`.
    pub fn transform_by_quaternion(&self, q: [f64; 4], k: i32) -> Result<Self, IrrepsArrayError> {
        self.transform_by_euler(wigner::quaternion_to_angles(q), k)
    }

    /// Rotates by `angle` about `axis`.
    pub fn transform_by_axis_angle(
        &self,
        axis: [f64; 3],
        angle: f64,
        k: i32,
    ) -> Result<Self, IrrepsArrayError> {
        self.transform_by_euler(wigner::axis_angle_to_angles(axis, angle), k)
    }

    /// Applies an orthogonal 3×3 matrix. An improper matrix is split into a rotation and an
    /// inversion.
    pub fn transform_by_matrix(&self, r: &Array2<f64>) -> Result<Self, IrrepsArrayError> {
        if r.dim() != (3, 3) {
            return Err(IrrepsArrayError::ShapeMismatch(format!(
                "expected a 3x3 matrix, got {:?}",
                r.shape()
            )));
        }
        let det = wigner::det3(r);
        let (r, k) = match det < 0.0 {
            true => (-r, 1),
            false => (r.clone(), 0),
        };
        self.transform_by_euler(wigner::matrix_to_angles(&r), k)
    }
}
