//! Reductions and concatenation of irreps arrays.

use itertools::Itertools;
use ndarray as nd;
use nd::{ArrayD, Axis};

use crate::{
    array::{IrrepsArray, IrrepsArrayError},
    irreps::{Irrep, Irreps, MulIrrep},
    num::{Float, Scalar},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduction {
    Sum,
    Mean,
}

impl Reduction {
    fn apply<A: Float>(self, x: &ArrayD<A>, axes: &[usize], keepdims: bool) -> ArrayD<A> {
        let mut y = x.clone();
        for &axis in axes.iter().rev() {
            y = y.sum_axis(Axis(axis));
        }
        if self == Self::Mean {
            let count: usize = axes.iter().map(|&axis| x.len_of(Axis(axis))).product();
            y = y / A::from_f64(count as f64);
        }
        if keepdims {
            for &axis in axes {
                y = y.insert_axis(Axis(axis));
            }
        }
        y
    }
}

/// Normalizes, sorts and deduplicates the axes. `None` selects every axis.
fn standardize_axes(axis: Option<&[isize]>, ndim: usize) -> Result<Vec<usize>, IrrepsArrayError> {
    let Some(axis) = axis else {
        return Ok((0..ndim).collect());
    };
    let n = ndim as isize;
    let axes: Vec<usize> = axis
        .iter()
        .map(|&x| match (-n..n).contains(&x) {
            true => Ok(x.rem_euclid(n) as usize),
            false => Err(IrrepsArrayError::ShapeMismatch(format!(
                "axis {x} is out of range for an array of {ndim} axes"
            ))),
        })
        .collect::<Result<_, _>>()?;
    Ok(axes.into_iter().sorted().dedup().collect())
}

fn reduce<A: Float>(
    array: &IrrepsArray<A>,
    axes: &[usize],
    keepdims: bool,
    reduction: Reduction,
) -> Result<IrrepsArray<A>, IrrepsArrayError> {
    let Some((&last, rest)) = axes.split_last() else {
        return Ok(array.clone());
    };

    if last < array.ndim() - 1 {
        let buffer = reduction.apply(array.array(), axes, keepdims);
        let blocks = array.map_cached_blocks(|_, x| {
            Ok::<_, IrrepsArrayError>(reduction.apply(x, axes, keepdims))
        })?;
        return Ok(IrrepsArray::assemble(array.irreps().clone(), buffer, blocks));
    }

    let inner = reduce(array, rest, keepdims, reduction)?;
    let irreps: Irreps = inner
        .irreps()
        .iter()
        .map(|mul_ir| MulIrrep::new(1, mul_ir.ir))
        .collect();
    let blocks = inner.map_blocks(|_, x| {
        Ok::<_, IrrepsArrayError>(reduction.apply(x, &[x.ndim() - 2], true))
    })?;
    IrrepsArray::from_blocks(irreps, blocks, inner.leading_shape())
}

/// # Sum (`sum`)
/// Sums over `axis` (every axis if `None`). Reducing the last axis sums the channels of each
/// entry, leaving one `1 x ir` per entry.
///
/// ## Errors
/// - [`IrrepsArrayError::ShapeMismatch`] if an axis is out of range.
pub fn sum<A: Float>(
    array: &IrrepsArray<A>,
    axis: Option<&[isize]>,
    keepdims: bool,
) -> Result<IrrepsArray<A>, IrrepsArrayError> {
    #[cfg(feature = "trace")]
    let _span = tracing::trace_span!("sum").entered();

    let axes = standardize_axes(axis, array.ndim())?;
    reduce(array, &axes, keepdims, Reduction::Sum)
}

/// Mean over `axis`, with the same rules as [`sum`].
pub fn mean<A: Float>(
    array: &IrrepsArray<A>,
    axis: Option<&[isize]>,
    keepdims: bool,
) -> Result<IrrepsArray<A>, IrrepsArrayError> {
    #[cfg(feature = "trace")]
    let _span = tracing::trace_span!("mean").entered();

    let axes = standardize_axes(axis, array.ndim())?;
    reduce(array, &axes, keepdims, Reduction::Mean)
}

/// Norm of every channel, giving `mul x 0e` per entry. Deterministic zeros stay zero.
pub fn norm<A: Float>(
    array: &IrrepsArray<A>,
    squared: bool,
) -> Result<IrrepsArray<A>, IrrepsArrayError> {
    #[cfg(feature = "trace")]
    let _span = tracing::trace_span!("norm").entered();

    let irreps: Irreps = array
        .irreps()
        .iter()
        .map(|mul_ir| MulIrrep::new(mul_ir.mul, Irrep::SCALAR))
        .collect();
    let blocks = array.map_blocks(|_, x| {
        let last = Axis(x.ndim() - 1);
        let y = x.mapv(|x| x * x).sum_axis(last).insert_axis(last);
        match squared {
            true => Ok::<_, IrrepsArrayError>(y),
            false => Ok(y.mapv(A::sqrt)),
        }
    })?;
    IrrepsArray::from_blocks(irreps, blocks, array.leading_shape())
}

/// # Concatenate (`concatenate`)
/// Joins arrays along `axis`. Along the last axis the irreps are concatenated too. Along any
/// other axis every array must carry the same irreps.
///
/// ## Errors
/// - [`IrrepsArrayError::ShapeMismatch`] if `arrays` is empty or the axis is out of range.
/// - [`IrrepsArrayError::Equivariance`] if the irreps differ along a leading axis.
pub fn concatenate<A: Scalar>(
    arrays: &[IrrepsArray<A>],
    axis: isize,
) -> Result<IrrepsArray<A>, IrrepsArrayError> {
    let Some(first) = arrays.first() else {
        return Err(IrrepsArrayError::ShapeMismatch(
            "cannot concatenate an empty list of arrays".into(),
        ));
    };
    let ndim = first.ndim();
    let n = ndim as isize;
    if !(-n..n).contains(&axis) {
        return Err(IrrepsArrayError::ShapeMismatch(format!(
            "axis {axis} is out of range for an array of {ndim} axes"
        )));
    }
    let axis = axis.rem_euclid(n) as usize;
    let mismatch = arrays.iter().find(|x| x.irreps() != first.irreps());
    if let (true, Some(x)) = (axis != ndim - 1, mismatch) {
        return Err(IrrepsArrayError::Equivariance(format!(
            "cannot concatenate {} and {} along axis {axis}",
            first.irreps(),
            x.irreps()
        )));
    }

    let views = arrays.iter().map(|x| x.array().view()).collect_vec();
    let buffer = nd::concatenate(Axis(axis), &views)?;
    let lazy = arrays.iter().all(|x| x.cached_blocks().is_none());

    if axis == ndim - 1 {
        let irreps = Irreps::concat(arrays.iter().map(IrrepsArray::irreps));
        let blocks = match lazy {
            true => None,
            false => Some(arrays.iter().flat_map(|x| x.blocks().to_vec()).collect()),
        };
        return Ok(IrrepsArray::assemble(irreps, buffer, blocks));
    }
    if lazy {
        return Ok(IrrepsArray::assemble(first.irreps().clone(), buffer, None));
    }

    let filled = arrays.iter().map(IrrepsArray::replace_none_with_zeros).collect_vec();
    let blocks = (0..first.irreps().len())
        .map(|index| {
            let views = filled
                .iter()
                .filter_map(|x| x.blocks()[index].as_ref())
                .map(|x| x.view())
                .collect_vec();
            nd::concatenate(Axis(axis), &views).map(Some)
        })
        .collect::<Result<_, _>>()?;
    Ok(IrrepsArray::assemble(first.irreps().clone(), buffer, Some(blocks)))
}
