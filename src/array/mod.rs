//! The [`IrrepsArray`] container.
//!
//! An [`IrrepsArray`] pairs a dense buffer whose last axis is laid out according to an [`Irreps`]
//! with a per-entry block view of the same data. Blocks are derived from the buffer on first use,
//! unless they were supplied at construction, in which case a missing block (`None`) stands for a
//! deterministic zero.

use std::{fmt, sync::OnceLock};

use itertools::Itertools;
use ndarray as nd;
use nd::{ArrayD, Axis, IxDyn};
use thiserror::Error;

use crate::{
    irreps::{IntoIrreps, Irreps, IrrepsError, MulIrrep, SortedIrreps},
    num::Scalar,
};

pub mod convert;
pub mod ops;
pub mod slice;
pub mod transform;

#[derive(Debug, Error)]
pub enum IrrepsArrayError {
    #[error("irreps array shape error: {0}")]
    ShapeMismatch(String),
    #[error("irreps array equivariance error: {0}")]
    Equivariance(String),
    #[error("irreps array index error: {0}")]
    UnsupportedIndex(String),
    #[error("irreps array division error: {0} contains deterministic zeros")]
    DivisionByZero(Irreps),
    #[error("irreps array configuration error: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Irreps(#[from] IrrepsError),
    #[error(transparent)]
    Ndarray(#[from] nd::ShapeError),
}

/// One entry of the block view. `None` is a deterministic zero.
pub type Block<A> = Option<ArrayD<A>>;

/// An array whose last axis is decomposed into irreps.
#[derive(Debug, Clone)]
pub struct IrrepsArray<A = f64> {
    irreps: Irreps,
    array: ArrayD<A>,
    blocks: OnceLock<Vec<Block<A>>>,
}

pub(crate) fn zeros<A: Scalar>(shape: &[usize]) -> ArrayD<A> {
    ArrayD::from_elem(IxDyn(shape), A::zero())
}

pub(crate) fn ones<A: Scalar>(shape: &[usize]) -> ArrayD<A> {
    ArrayD::from_elem(IxDyn(shape), A::one())
}

#[inline]
pub(crate) fn block_shape(leading: &[usize], mul: usize, dim: usize) -> Vec<usize> {
    [leading, &[mul, dim]].concat()
}

/// Reshapes in row-major order, copying only if the layout requires it.
pub(crate) fn reshape<A: Clone>(
    x: &ArrayD<A>,
    shape: &[usize],
) -> Result<ArrayD<A>, IrrepsArrayError> {
    Ok(x.to_shape(shape)?.into_owned())
}

/// Numpy-style broadcasting of two shapes.
pub(crate) fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>, IrrepsArrayError> {
    let n = a.len().max(b.len());
    let get = |x: &[usize], i: usize| match i + x.len() >= n {
        true => x[i + x.len() - n],
        false => 1,
    };
    (0..n)
        .map(|i| match (get(a, i), get(b, i)) {
            (x, y) if x == y => Ok(x),
            (1, y) => Ok(y),
            (x, 1) => Ok(x),
            _ => Err(IrrepsArrayError::ShapeMismatch(format!(
                "shapes {a:?} and {b:?} cannot be broadcast together"
            ))),
        })
        .collect()
}

fn gcd(a: usize, b: usize) -> usize {
    match b {
        0 => a,
        b => gcd(b, a % b),
    }
}

fn map_blocks_of<A, B, E>(
    irreps: &Irreps,
    blocks: &[Block<A>],
    mut f: impl FnMut(MulIrrep, &ArrayD<A>) -> Result<ArrayD<B>, E>,
) -> Result<Vec<Block<B>>, E> {
    irreps
        .iter()
        .zip_eq(blocks)
        .map(|(&mul_ir, x)| x.as_ref().map(|x| f(mul_ir, x)).transpose())
        .collect()
}

fn check_array<A>(irreps: &Irreps, array: &ArrayD<A>) -> Result<(), IrrepsArrayError> {
    match array.shape().last() {
        Some(&dim) if dim == irreps.dim() => Ok(()),
        Some(&dim) => Err(IrrepsArrayError::ShapeMismatch(format!(
            "last axis of size {dim} does not match irreps {irreps} of dimension {}",
            irreps.dim()
        ))),
        None => Err(IrrepsArrayError::ShapeMismatch(format!(
            "a 0-d array cannot carry irreps {irreps}"
        ))),
    }
}

fn check_blocks<A>(
    irreps: &Irreps,
    blocks: &[Block<A>],
    leading: &[usize],
) -> Result<(), IrrepsArrayError> {
    if blocks.len() != irreps.len() {
        return Err(IrrepsArrayError::ShapeMismatch(format!(
            "{} blocks given for irreps {irreps} with {} entries",
            blocks.len(),
            irreps.len()
        )));
    }
    for (mul_ir, x) in irreps.iter().zip_eq(blocks) {
        let Some(x) = x else { continue };
        let expected = block_shape(leading, mul_ir.mul, mul_ir.ir.dim());
        if x.shape() != expected.as_slice() {
            return Err(IrrepsArrayError::ShapeMismatch(format!(
                "block of {mul_ir} has shape {:?}, expected {expected:?}",
                x.shape()
            )));
        }
    }
    Ok(())
}

/// Resolves a leading shape that may hold one `-1` against the number of leading elements.
fn infer_leading(shape: &[isize], size: usize) -> Result<Vec<usize>, IrrepsArrayError> {
    let err = || IrrepsArrayError::ShapeMismatch(format!("cannot reshape {size} elements into {shape:?}"));
    let unknown = shape.iter().positions(|&x| x == -1).collect_vec();
    if unknown.len() > 1 || shape.iter().any(|&x| x < -1) {
        return Err(err());
    }
    let mut leading = shape.iter().map(|&x| x.max(0) as usize).collect_vec();
    let known: usize = shape.iter().filter(|&&x| x >= 0).map(|&x| x as usize).product();
    match unknown.first() {
        Some(_) if known == 0 || size % known != 0 => Err(err()),
        Some(&index) => {
            leading[index] = size / known;
            Ok(leading)
        }
        None if known != size => Err(err()),
        None => Ok(leading),
    }
}

impl<A: Scalar> IrrepsArray<A> {
    /// Builds an array without validation. Callers uphold the shape invariants.
    pub(crate) fn assemble(irreps: Irreps, array: ArrayD<A>, blocks: Option<Vec<Block<A>>>) -> Self {
        let blocks = blocks.map(OnceLock::from).unwrap_or_default();
        Self {
            irreps,
            array,
            blocks,
        }
    }

    /// # Create an Array (`new`)
    /// Wraps a buffer whose last axis has size `irreps.dim()`. Blocks are derived lazily.
    ///
    /// ## Errors
    /// - [`IrrepsArrayError::ShapeMismatch`] if the array is 0-d or its last axis does not match.
    pub fn new(irreps: impl IntoIrreps, array: ArrayD<A>) -> Result<Self, IrrepsArrayError> {
        let irreps = irreps.into_irreps()?;
        check_array(&irreps, &array)?;
        Ok(Self::assemble(irreps, array, None))
    }

    /// Wraps a buffer together with its block view. The blocks must agree with the buffer.
    pub fn with_blocks(
        irreps: impl IntoIrreps,
        array: ArrayD<A>,
        blocks: Vec<Block<A>>,
    ) -> Result<Self, IrrepsArrayError> {
        let irreps = irreps.into_irreps()?;
        check_array(&irreps, &array)?;
        check_blocks(&irreps, &blocks, &array.shape()[..array.ndim() - 1])?;
        Ok(Self::assemble(irreps, array, Some(blocks)))
    }

    /// # Create an Array from Blocks (`from_blocks`)
    /// Assembles the buffer from per-entry blocks of shape `leading + (mul, ir.dim)`.
    ///
    /// ## Arguments
    /// - `irreps`: the decomposition of the last axis.
    /// - `blocks`: one block per irreps entry. `None` is written to the buffer as zeros.
    /// - `leading`: the shape of all axes but the last.
    ///
    /// ## Errors
    /// - [`IrrepsArrayError::ShapeMismatch`] if the block count or any block shape is wrong.
    pub fn from_blocks(
        irreps: impl IntoIrreps,
        blocks: Vec<Block<A>>,
        leading: &[usize],
    ) -> Result<Self, IrrepsArrayError> {
        let irreps = irreps.into_irreps()?;
        check_blocks(&irreps, &blocks, leading)?;

        let last = Axis(leading.len());
        let parts: Vec<ArrayD<A>> = irreps
            .iter()
            .zip_eq(&blocks)
            .map(|(mul_ir, x)| {
                let shape = [leading, &[mul_ir.dim()]].concat();
                match x {
                    Some(x) => reshape(x, &shape),
                    None => Ok(zeros(&shape)),
                }
            })
            .collect::<Result<_, _>>()?;
        let array = match parts.is_empty() {
            true => zeros(&[leading, &[0]].concat()),
            false => {
                let views = parts.iter().map(|x| x.view()).collect_vec();
                nd::concatenate(last, &views)?
            }
        };
        Ok(Self::assemble(irreps, array, Some(blocks)))
    }

    /// Like [`IrrepsArray::from_blocks`], reading the leading shape off the first present block.
    pub fn from_blocks_inferred(
        irreps: impl IntoIrreps,
        blocks: Vec<Block<A>>,
    ) -> Result<Self, IrrepsArrayError> {
        let irreps = irreps.into_irreps()?;
        let Some(x) = blocks.iter().flatten().next() else {
            return Err(IrrepsArrayError::ShapeMismatch(format!(
                "cannot infer the leading shape of {irreps} without a present block"
            )));
        };
        let leading = x.shape()[..x.ndim().saturating_sub(2)].to_vec();
        Self::from_blocks(irreps, blocks, &leading)
    }

    /// An array of zeros where every block is a deterministic zero.
    pub fn zeros(irreps: impl IntoIrreps, leading: &[usize]) -> Result<Self, IrrepsArrayError> {
        let irreps = irreps.into_irreps()?;
        let array = zeros(&[leading, &[irreps.dim()]].concat());
        let blocks = vec![None; irreps.len()];
        Ok(Self::assemble(irreps, array, Some(blocks)))
    }

    pub fn ones(irreps: impl IntoIrreps, leading: &[usize]) -> Result<Self, IrrepsArrayError> {
        let irreps = irreps.into_irreps()?;
        let array = ones(&[leading, &[irreps.dim()]].concat());
        let blocks = irreps
            .iter()
            .map(|mul_ir| Some(ones(&block_shape(leading, mul_ir.mul, mul_ir.ir.dim()))))
            .collect();
        Ok(Self::assemble(irreps, array, Some(blocks)))
    }

    #[inline]
    pub fn irreps(&self) -> &Irreps {
        &self.irreps
    }

    #[inline]
    pub fn array(&self) -> &ArrayD<A> {
        &self.array
    }

    #[inline]
    pub fn into_array(self) -> ArrayD<A> {
        self.array
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.array.shape()
    }

    /// The shape of all axes but the last.
    #[inline]
    pub fn leading_shape(&self) -> &[usize] {
        &self.shape()[..self.ndim() - 1]
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.array.ndim()
    }

    /// The size of the first axis.
    #[inline]
    pub fn len(&self) -> usize {
        self.shape()[0]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The block view, one entry per irreps entry, each of shape `leading + (mul, ir.dim)`.
    pub fn blocks(&self) -> &[Block<A>] {
        self.blocks.get_or_init(|| {
            log::trace!("deriving blocks of {} from buffer", self.irreps);
            let leading = self.leading_shape();
            let last = Axis(self.ndim() - 1);
            self.irreps
                .iter()
                .zip_eq(self.irreps.slices())
                .map(|(mul_ir, range)| {
                    let x = self.array.slice_axis(last, range.into());
                    let shape = block_shape(leading, mul_ir.mul, mul_ir.ir.dim());
                    let x = x
                        .to_shape(shape)
                        .expect("block must hold exactly its slice of the buffer");
                    Some(x.into_owned())
                })
                .collect()
        })
    }

    /// Maps every present block, deriving the blocks first if needed.
    pub(crate) fn map_blocks<B, E>(
        &self,
        f: impl FnMut(MulIrrep, &ArrayD<A>) -> Result<ArrayD<B>, E>,
    ) -> Result<Vec<Block<B>>, E> {
        map_blocks_of(&self.irreps, self.blocks(), f)
    }

    /// Maps the present blocks only if they have been materialized.
    pub(crate) fn map_cached_blocks<B, E>(
        &self,
        f: impl FnMut(MulIrrep, &ArrayD<A>) -> Result<ArrayD<B>, E>,
    ) -> Result<Option<Vec<Block<B>>>, E> {
        self.blocks
            .get()
            .map(|blocks| map_blocks_of(&self.irreps, blocks, f))
            .transpose()
    }

    pub(crate) fn cached_blocks(&self) -> Option<&[Block<A>]> {
        self.blocks.get().map(Vec::as_slice)
    }

    /// Reshapes the leading axes. The last entry of `shape` must be the irreps dimension or `-1`,
    /// and one leading entry may be `-1`.
    pub fn reshape(&self, shape: &[isize]) -> Result<Self, IrrepsArrayError> {
        let dim = self.irreps.dim();
        let Some((&last, leading)) = shape.split_last() else {
            return Err(IrrepsArrayError::ShapeMismatch(
                "cannot reshape into an empty shape".into(),
            ));
        };
        if last != -1 && last != dim as isize {
            return Err(IrrepsArrayError::ShapeMismatch(format!(
                "last axis of {shape:?} must be {dim} or -1"
            )));
        }
        let size = self.leading_shape().iter().product();
        let leading = infer_leading(leading, size)?;

        let array = reshape(&self.array, &[leading.as_slice(), &[dim]].concat())?;
        let blocks = self.map_cached_blocks(|mul_ir, x| {
            reshape(x, &block_shape(&leading, mul_ir.mul, mul_ir.ir.dim()))
        })?;
        Ok(Self::assemble(self.irreps.clone(), array, blocks))
    }

    /// Broadcasts to `shape`, whose last entry must be the irreps dimension.
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self, IrrepsArrayError> {
        let dim = self.irreps.dim();
        let err = || {
            IrrepsArrayError::ShapeMismatch(format!(
                "cannot broadcast {:?} to {shape:?}",
                self.shape()
            ))
        };
        let Some((&last, leading)) = shape.split_last() else {
            return Err(err());
        };
        if last != dim {
            return Err(err());
        }

        let array = self.array.broadcast(shape).ok_or_else(err)?.to_owned();
        let blocks = self.map_cached_blocks(|mul_ir, x| {
            let shape = block_shape(leading, mul_ir.mul, mul_ir.ir.dim());
            x.broadcast(shape).map(|x| x.to_owned()).ok_or_else(err)
        })?;
        Ok(Self::assemble(self.irreps.clone(), array, blocks))
    }

    pub fn replace_none_with_zeros(&self) -> Self {
        let leading = self.leading_shape();
        let blocks = self
            .irreps
            .iter()
            .zip_eq(self.blocks())
            .map(|(mul_ir, x)| match x {
                Some(x) => Some(x.clone()),
                None => Some(zeros(&block_shape(leading, mul_ir.mul, mul_ir.ir.dim()))),
            })
            .collect();
        Self::assemble(self.irreps.clone(), self.array.clone(), Some(blocks))
    }

    /// Drops the entries whose block is a deterministic zero.
    pub fn remove_nones(&self) -> Result<Self, IrrepsArrayError> {
        let Some(blocks) = self.cached_blocks() else {
            return Ok(self.clone());
        };
        if blocks.iter().all(Option::is_some) {
            return Ok(self.clone());
        }

        let (irreps, blocks): (Vec<MulIrrep>, Vec<Block<A>>) = self
            .irreps
            .iter()
            .zip_eq(blocks)
            .filter(|(_, x)| x.is_some())
            .map(|(&mul_ir, x)| (mul_ir, x.clone()))
            .unzip();
        let irreps = Irreps::from(irreps);
        log::debug!("removed zero blocks: {} -> {irreps}", self.irreps);
        Self::from_blocks(irreps, blocks, self.leading_shape())
    }

    /// Merges adjacent entries of the same irrep.
    #[inline]
    pub fn simplify(&self) -> Result<Self, IrrepsArrayError> {
        self.convert(self.irreps.simplify())
    }

    /// Reorders the entries by irrep. The order of equal irreps is preserved.
    pub fn sorted(&self) -> Result<Self, IrrepsArrayError> {
        let SortedIrreps { irreps, inv, .. } = self.irreps.sort();
        log::debug!("sorting {} -> {irreps}", self.irreps);
        let blocks = self.blocks();
        let blocks = inv.iter().map(|&index| blocks[index].clone()).collect();
        Self::from_blocks(irreps, blocks, self.leading_shape())
    }

    /// Sorts, then simplifies.
    #[inline]
    pub fn regroup(&self) -> Result<Self, IrrepsArrayError> {
        self.sorted()?.simplify()
    }

    /// Iterates over the first axis.
    pub fn iter(&self) -> Result<impl Iterator<Item = Self> + '_, IrrepsArrayError> {
        if self.ndim() <= 1 {
            return Err(IrrepsArrayError::ShapeMismatch(format!(
                "cannot iterate over an array of shape {:?}",
                self.shape()
            )));
        }
        Ok((0..self.len()).map(move |index| {
            let array = self.array.index_axis(Axis(0), index).to_owned();
            let blocks = self.cached_blocks().map(|blocks| {
                blocks
                    .iter()
                    .map(|x| x.as_ref().map(|x| x.index_axis(Axis(0), index).to_owned()))
                    .collect()
            });
            Self::assemble(self.irreps.clone(), array, blocks)
        }))
    }

    /// Splits the last axis into several arrays.
    pub fn split(&self, indices: impl Into<SplitIndices>) -> Result<Vec<Self>, IrrepsArrayError> {
        let last = Axis(self.ndim() - 1);
        match indices.into() {
            SplitIndices::Entries(indices) => {
                let len = self.irreps.len();
                if !indices.iter().tuple_windows().all(|(a, b)| a <= b)
                    || indices.last().is_some_and(|&x| x > len)
                {
                    return Err(IrrepsArrayError::ShapeMismatch(format!(
                        "split indices {indices:?} must be increasing and at most {len}"
                    )));
                }
                log::debug!("splitting {} at entries {indices:?}", self.irreps);

                let offset = |index: usize| -> usize {
                    self.irreps[..index].iter().map(MulIrrep::dim).sum()
                };
                let bounds = std::iter::once(0).chain(indices).chain(std::iter::once(len));
                let parts = bounds
                    .tuple_windows()
                    .map(|(start, end)| {
                        let irreps = Irreps::new(self.irreps[start..end].iter().copied());
                        let range: std::ops::Range<usize> = offset(start)..offset(end);
                        let array = self.array.slice_axis(last, range.into()).to_owned();
                        let blocks = self.cached_blocks().map(|x| x[start..end].to_vec());
                        Self::assemble(irreps, array, blocks)
                    })
                    .collect();
                Ok(parts)
            }
            SplitIndices::Irreps(parts) => {
                let total = Irreps::concat(&parts);
                if total.simplify() != self.irreps.simplify() {
                    return Err(IrrepsArrayError::Equivariance(format!(
                        "cannot split {} into [{}]",
                        self.irreps,
                        parts.iter().format(", ")
                    )));
                }
                log::debug!("splitting {} into {total}", self.irreps);

                let mut start = 0;
                let parts = parts
                    .into_iter()
                    .map(|irreps| {
                        let end = start + irreps.dim();
                        let array = self.array.slice_axis(last, (start..end).into()).to_owned();
                        start = end;
                        Self::assemble(irreps, array, None)
                    })
                    .collect();
                Ok(parts)
            }
        }
    }

    /// Folds the second-to-last axis into the irreps: `(..., k, dim)` becomes
    /// `(..., k·dim)` with the irreps repeated `k` times.
    pub fn repeat_irreps_by_last_axis(&self) -> Result<Self, IrrepsArrayError> {
        let shape = self.shape();
        let n = shape.len();
        if n < 2 {
            return Err(IrrepsArrayError::ShapeMismatch(format!(
                "cannot repeat irreps of an array of shape {shape:?}"
            )));
        }
        let irreps = self.irreps.repeat(shape[n - 2]).simplify();
        let array = reshape(&self.array, &[&shape[..n - 2], &[irreps.dim()]].concat())?;
        Ok(Self::assemble(irreps, array, None))
    }

    /// Folds the second-to-last axis into the multiplicities: `k x (mul x ir)` becomes
    /// `(k·mul) x ir`.
    pub fn repeat_mul_by_last_axis(&self) -> Result<Self, IrrepsArrayError> {
        let shape = self.shape();
        let n = shape.len();
        if n < 2 {
            return Err(IrrepsArrayError::ShapeMismatch(format!(
                "cannot repeat multiplicities of an array of shape {shape:?}"
            )));
        }
        let k = shape[n - 2];
        let leading = &shape[..n - 2];
        let irreps: Irreps = self
            .irreps
            .iter()
            .map(|mul_ir| MulIrrep::new(k * mul_ir.mul, mul_ir.ir))
            .collect();
        let blocks = self.map_blocks(|mul_ir, x| {
            reshape(x, &block_shape(leading, k * mul_ir.mul, mul_ir.ir.dim()))
        })?;
        Self::from_blocks(irreps, blocks, leading)
    }

    /// Inverse of [`IrrepsArray::repeat_mul_by_last_axis`]: divides every multiplicity by `factor`
    /// and moves it into a new second-to-last axis. The factor defaults to the gcd of the
    /// multiplicities.
    pub fn factor_mul_to_last_axis(&self, factor: Option<usize>) -> Result<Self, IrrepsArrayError> {
        let factor = factor.unwrap_or_else(|| self.irreps.iter().fold(0, |acc, x| gcd(acc, x.mul)));
        if factor == 0 || self.irreps.iter().any(|x| x.mul % factor != 0) {
            return Err(IrrepsArrayError::InvalidConfiguration(format!(
                "factor {factor} does not divide all multiplicities of {}",
                self.irreps
            )));
        }

        let irreps: Irreps = self
            .irreps
            .iter()
            .map(|mul_ir| MulIrrep::new(mul_ir.mul / factor, mul_ir.ir))
            .collect();
        let leading = [self.leading_shape(), &[factor]].concat();
        let blocks = self.map_blocks(|mul_ir, x| {
            reshape(x, &block_shape(&leading, mul_ir.mul / factor, mul_ir.ir.dim()))
        })?;
        Self::from_blocks(irreps, blocks, &leading)
    }
}

impl<A: Scalar + fmt::Display> fmt::Display for IrrepsArray<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let array = self.array.to_string();
        match array.contains('\n') {
            true => write!(f, "{}\n{array}", self.irreps),
            false => write!(f, "{} {array}", self.irreps),
        }
    }
}

/// How [`IrrepsArray::split`] cuts the last axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitIndices {
    /// Boundaries between irreps entries.
    Entries(Vec<usize>),
    /// The irreps of every part.
    Irreps(Vec<Irreps>),
}

impl From<Vec<usize>> for SplitIndices {
    #[inline]
    fn from(value: Vec<usize>) -> Self {
        Self::Entries(value)
    }
}

impl<const N: usize> From<[usize; N]> for SplitIndices {
    #[inline]
    fn from(value: [usize; N]) -> Self {
        Self::Entries(value.to_vec())
    }
}

impl From<Vec<Irreps>> for SplitIndices {
    #[inline]
    fn from(value: Vec<Irreps>) -> Self {
        Self::Irreps(value)
    }
}

impl<const N: usize> From<[Irreps; N]> for SplitIndices {
    #[inline]
    fn from(value: [Irreps; N]) -> Self {
        Self::Irreps(value.to_vec())
    }
}
