use std::{fmt, sync::Arc};

use casey::snake;
use derive_more::{Deref, DerefMut, Display, From, Into};
use itertools::Itertools;
use ndarray as nd;
use nd::{ArrayViewD, Axis};

use super::{IrrepsArray, IrrepsArrayError};
use crate::{
    irreps::{Irreps, MulIrrep},
    num::Scalar,
};

/// Index along one axis.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub enum Index {
    /// The whole axis.
    #[default]
    Full,
    /// As many full axes as needed to cover the array.
    Ellipsis,
    /// A single position, removing the axis. Negative positions count from the end.
    One(isize),
    /// A strided range. Negative bounds count from the end and out-of-range bounds are clamped.
    Range {
        start: Option<isize>,
        end: Option<isize>,
        step: isize,
    },
    /// A single `mul x ir` entry of the last axis.
    Irreps(Irreps),
}

impl Index {
    #[inline]
    pub fn range(start: Option<isize>, end: Option<isize>, step: isize) -> Self {
        Self::Range { start, end, step }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |x: &Option<isize>| x.map(|x| x.to_string()).unwrap_or_default();
        match self {
            Index::Full => write!(f, ".."),
            Index::Ellipsis => write!(f, "..."),
            Index::One(index) => write!(f, "{index}"),
            Index::Range { start, end, step } => {
                write!(f, "{}..{};{step}", bound(start), bound(end))
            }
            Index::Irreps(irreps) => write!(f, "\"{irreps}\""),
        }
    }
}

impl From<std::ops::RangeFull> for Index {
    #[inline]
    fn from(_: std::ops::RangeFull) -> Self {
        Self::Full
    }
}

impl From<Irreps> for Index {
    #[inline]
    fn from(value: Irreps) -> Self {
        Self::Irreps(value)
    }
}

impl From<MulIrrep> for Index {
    #[inline]
    fn from(value: MulIrrep) -> Self {
        Self::Irreps(Irreps::new([value]))
    }
}

macro_rules! impl_index_from {
    ($($t:ty),+) => {
        $(
            impl From<$t> for Index {
                #[inline]
                fn from(value: $t) -> Self {
                    Self::One(value as isize)
                }
            }

            impl From<std::ops::Range<$t>> for Index {
                #[inline]
                fn from(value: std::ops::Range<$t>) -> Self {
                    Self::range(Some(value.start as isize), Some(value.end as isize), 1)
                }
            }

            impl From<std::ops::RangeFrom<$t>> for Index {
                #[inline]
                fn from(value: std::ops::RangeFrom<$t>) -> Self {
                    Self::range(Some(value.start as isize), None, 1)
                }
            }

            impl From<std::ops::RangeTo<$t>> for Index {
                #[inline]
                fn from(value: std::ops::RangeTo<$t>) -> Self {
                    Self::range(None, Some(value.end as isize), 1)
                }
            }
        )+
    };
}

impl_index_from!(i32, isize, usize);

/// An index into every axis of an [`IrrepsArray`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Deref, DerefMut, From, Into, Display)]
#[display("[{}]", _0.iter().format(", "))]
pub struct Slice(Arc<[Index]>);

impl From<Vec<Index>> for Slice {
    #[inline]
    fn from(value: Vec<Index>) -> Self {
        Self(value.into())
    }
}

macro_rules! impl_slice_from {
    ($t:ident) => {
        impl<$t: Into<Index>> From<$t> for Slice {
            #[inline]
            fn from(snake!($t): $t) -> Self {
                Self([snake!($t).into()].into())
            }
        }
    };
    ($($t:ident),+) => {
        impl<$($t),+> From<($($t),+)> for Slice
        where
            $($t: Into<Index>),+
        {
            #[inline]
            fn from(($(snake!($t)),+): ($($t),+)) -> Self {
                Self([$(snake!($t).into()),+].into())
            }
        }
    };
}

impl_slice_from!(T0);
impl_slice_from!(T0, T1);
impl_slice_from!(T0, T1, T2);
impl_slice_from!(T0, T1, T2, T3);
impl_slice_from!(T0, T1, T2, T3, T4);
impl_slice_from!(T0, T1, T2, T3, T4, T5);
impl_slice_from!(T0, T1, T2, T3, T4, T5, T6);
impl_slice_from!(T0, T1, T2, T3, T4, T5, T6, T7);

impl Slice {
    /// Returns `true` if the slice contains only full axes.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.iter().all(|index| matches!(index, Index::Full))
    }

    #[inline]
    fn has_ellipsis(&self) -> bool {
        self.contains(&Index::Ellipsis)
    }
}

fn unsupported(message: String) -> IrrepsArrayError {
    IrrepsArrayError::UnsupportedIndex(message)
}

/// Clamps range bounds on an axis of length `len` and converts them into an ndarray slice.
fn clamp_range(
    start: Option<isize>,
    end: Option<isize>,
    step: isize,
    len: usize,
) -> Result<nd::Slice, IrrepsArrayError> {
    let n = len as isize;
    match step {
        0 => Err(unsupported("slice step cannot be zero".into())),
        step if step > 0 => {
            let clamp = |x: isize| match x < 0 {
                true => (x + n).max(0),
                false => x.min(n),
            };
            let start = start.map_or(0, clamp);
            let end = end.map_or(n, clamp);
            Ok(nd::Slice::new(start, Some(end.max(start)), step))
        }
        step => {
            let clamp = |x: isize| match x < 0 {
                true => (x + n).max(-1),
                false => x.min(n - 1),
            };
            let start = start.map_or(n - 1, clamp);
            let end = end.map_or(-1, clamp);
            match start > end {
                true => Ok(nd::Slice::new(end + 1, Some(start + 1), step)),
                false => Ok(nd::Slice::new(0, Some(0), 1)),
            }
        }
    }
}

/// Applies leading indices to a view. Trailing axes of the view are left untouched.
fn apply<'a, A>(
    mut view: ArrayViewD<'a, A>,
    indices: &[Index],
) -> Result<ArrayViewD<'a, A>, IrrepsArrayError> {
    let mut axis = 0;
    for index in indices {
        match index {
            Index::Full => axis += 1,
            &Index::One(position) => {
                let len = view.len_of(Axis(axis));
                let resolved = match position < 0 {
                    true => position + len as isize,
                    false => position,
                };
                if resolved < 0 || resolved >= len as isize {
                    return Err(unsupported(format!(
                        "index {position} is out of bounds for axis {axis} of size {len}"
                    )));
                }
                view = view.index_axis_move(Axis(axis), resolved as usize);
            }
            &Index::Range { start, end, step } => {
                let slice = clamp_range(start, end, step, view.len_of(Axis(axis)))?;
                view.slice_axis_inplace(Axis(axis), slice);
                axis += 1;
            }
            Index::Ellipsis | Index::Irreps(_) => {
                return Err(unsupported(format!("unexpected index {index}")));
            }
        }
    }
    Ok(view)
}

impl<A: Scalar> IrrepsArray<A> {
    /// # Index the Array (`slice`)
    /// Indexes the leading axes. The last axis may only be left whole, or narrowed to a single
    /// `mul x ir` entry with a trailing [`Index::Irreps`].
    ///
    /// ## Errors
    /// - [`IrrepsArrayError::UnsupportedIndex`] if the index touches the last axis any other way,
    ///   is out of bounds, or has too many entries.
    pub fn slice(&self, index: impl Into<Slice>) -> Result<Self, IrrepsArrayError> {
        let index: Slice = index.into();
        let Some((last, leading)) = index.split_last() else {
            return Ok(self.clone());
        };
        if let Index::Irreps(irreps) = last {
            return self.slice_irreps(irreps, leading);
        }
        if index.iter().any(|x| matches!(x, Index::Irreps(_))) {
            return Err(unsupported(format!("irreps must be the last index in {index}")));
        }

        let ndim = self.ndim();
        let ellipses = index.iter().filter(|&x| *x == Index::Ellipsis).count();
        let explicit = index.len() - ellipses;
        if ellipses > 1 {
            return Err(unsupported(format!("more than one ellipsis in {index}")));
        }
        if explicit > ndim {
            return Err(unsupported(format!(
                "too many indices {index} for an array of {ndim} axes"
            )));
        }
        if (index.len() == ndim || index.has_ellipsis())
            && !matches!(last, Index::Full | Index::Ellipsis)
        {
            return Err(unsupported(format!(
                "the last axis of {} can only be indexed by irreps, got {index}",
                self.irreps
            )));
        }

        let mut indices = Vec::with_capacity(ndim);
        for x in index.iter() {
            match x {
                Index::Ellipsis => {
                    indices.extend(std::iter::repeat_n(Index::Full, ndim - explicit))
                }
                x => indices.push(x.clone()),
            }
        }
        indices.resize(ndim, Index::Full);
        if indices[ndim - 1] != Index::Full {
            return Err(unsupported(format!(
                "the last axis of {} can only be indexed by irreps, got {index}",
                self.irreps
            )));
        }
        let indices = &indices[..ndim - 1];

        let array = apply(self.array.view(), indices)?.to_owned();
        let blocks =
            self.map_cached_blocks(|_, x| apply(x.view(), indices).map(|x| x.to_owned()))?;
        Ok(Self::assemble(self.irreps.clone(), array, blocks))
    }

    fn slice_irreps(&self, irreps: &Irreps, leading: &[Index]) -> Result<Self, IrrepsArrayError> {
        if leading.iter().any(|x| matches!(x, Index::Irreps(_))) {
            return Err(unsupported("only one irreps index is supported".into()));
        }
        let has_ellipsis = leading.contains(&Index::Ellipsis);
        if !has_ellipsis && leading.len() + 1 != self.ndim() {
            return Err(unsupported(format!(
                "irreps index {irreps} must index the last axis"
            )));
        }
        let &[target] = irreps.as_slice() else {
            return Err(unsupported(format!(
                "only a single mul x ir can be indexed, got {irreps}"
            )));
        };
        let positions = self.irreps.iter().positions(|&x| x == target).collect_vec();
        let &[position] = positions.as_slice() else {
            return Err(unsupported(format!(
                "{target} does not appear exactly once in {}",
                self.irreps
            )));
        };

        let range = self.irreps.slices()[position].clone();
        let last = Axis(self.ndim() - 1);
        let array = self.array.slice_axis(last, range.into()).to_owned();
        let blocks = self.cached_blocks().map(|x| vec![x[position].clone()]);
        let array = Self::assemble(irreps.clone(), array, blocks);

        let index = leading.iter().cloned().chain([Index::Full]).collect_vec();
        match Slice::from(index) {
            index if index.is_full() => Ok(array),
            index => array.slice(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use ndarray::{ArrayD, IxDyn, array};

    use super::{Index, Slice};
    use crate::{
        array::{IrrepsArray, IrrepsArrayError},
        irreps::Irreps,
    };

    fn arange(shape: &[usize]) -> ArrayD<f64> {
        let size = shape.iter().product::<usize>();
        ArrayD::from_shape_vec(IxDyn(shape), (0..size).map(|x| x as f64).collect())
            .expect("shape matches data")
    }

    #[test]
    fn test_slice_from() {
        let slice = Slice::from((0, .., Index::Ellipsis));
        assert_eq!(slice.len(), 3);
        assert_eq!(slice.to_string(), "[0, .., ...]");
        assert!(Slice::from((.., ..)).is_full());
        assert_eq!(Slice::from(1..).to_string(), "[1..;1]");
    }

    #[test]
    fn test_leading() -> Result<(), Box<dyn Error>> {
        let x = IrrepsArray::new("0e + 1o", arange(&[2, 3, 4]))?;

        let y = x.slice(0)?;
        assert_eq!(y.shape(), &[3, 4]);
        assert_eq!(y.array(), &arange(&[3, 4]));

        let y = x.slice((-1, 1..))?;
        assert_eq!(y.shape(), &[2, 4]);
        assert_eq!(y.array()[[0, 0]], 16.0);

        let y = x.slice((Index::Ellipsis, ..))?;
        assert_eq!(y.shape(), &[2, 3, 4]);

        let y = x.slice((.., Index::range(None, None, -2), ..))?;
        assert_eq!(y.shape(), &[2, 2, 4]);
        assert_eq!(y.array()[[0, 0, 0]], 8.0);
        assert_eq!(y.array()[[0, 1, 0]], 0.0);

        let y = x.slice((.., 5..))?;
        assert_eq!(y.shape(), &[2, 0, 4]);
        Ok(())
    }

    #[test]
    fn test_irreps_index() -> Result<(), Box<dyn Error>> {
        let x = IrrepsArray::new("0e + 1o", arange(&[2, 4]))?;
        let vector: Irreps = "1o".parse()?;

        let y = x.slice((Index::Ellipsis, vector.clone()))?;
        assert_eq!(y.irreps().to_string(), "1x1o");
        assert_eq!(y.array(), &array![[1.0, 2.0, 3.0], [5.0, 6.0, 7.0]].into_dyn());

        let y = x.slice((1, vector.clone()))?;
        assert_eq!(y.array(), &array![5.0, 6.0, 7.0].into_dyn());

        assert!(matches!(x.slice(vector.clone()), Err(IrrepsArrayError::UnsupportedIndex(_))));
        let two: Irreps = "0e + 1o".parse()?;
        assert!(x.slice((.., two)).is_err());
        let y = IrrepsArray::new("1o + 1o", arange(&[6]))?;
        assert!(y.slice((Index::Ellipsis, vector)).is_err());
        Ok(())
    }

    #[test]
    fn test_invalid() -> Result<(), Box<dyn Error>> {
        let x = IrrepsArray::new("0e + 1o", arange(&[2, 4]))?;
        assert!(matches!(x.slice((.., 0)), Err(IrrepsArrayError::UnsupportedIndex(_))));
        assert!(x.slice((Index::Ellipsis, 1)).is_err());
        assert!(x.slice((0, 1, Index::Ellipsis)).is_err());
        assert!(x.slice((Index::Ellipsis, Index::Ellipsis)).is_err());
        assert!(x.slice((0, .., ..)).is_err());
        assert!(x.slice(2).is_err());
        assert!(x.slice(-3).is_err());
        assert!(x.slice(Index::range(None, None, 0)).is_err());
        Ok(())
    }

    #[test]
    fn test_blocks_follow() -> Result<(), Box<dyn Error>> {
        let blocks = vec![None, Some(arange(&[3, 1, 3]))];
        let x = IrrepsArray::from_blocks("0e + 1o", blocks, &[3])?;
        let y = x.slice(1..)?;
        assert_eq!(y.shape(), &[2, 4]);
        assert!(y.blocks()[0].is_none());
        assert_eq!(
            y.blocks()[1].as_ref().map(|x| x.shape().to_vec()),
            Some(vec![2, 1, 3])
        );
        Ok(())
    }
}
