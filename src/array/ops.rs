//! Arithmetic and comparison between irreps arrays and bare arrays.

use itertools::{Itertools, izip};
use ndarray as nd;
use nd::{ArrayD, Axis, Zip};

use super::{
    Block, IrrepsArray, IrrepsArrayError, block_shape, broadcast_shapes, check_array,
};
use crate::{
    irreps::{Irrep, Irreps, MulIrrep},
    num::{Float, Scalar},
};

/// Right-hand side of an arithmetic operation.
#[derive(Debug, Clone)]
pub enum Operand<A> {
    /// An array carrying irreps. Only equivariant combinations are allowed.
    Typed(IrrepsArray<A>),
    /// A plain array, broadcast against the whole buffer.
    Bare(ArrayD<A>),
}

impl<A> From<IrrepsArray<A>> for Operand<A> {
    #[inline]
    fn from(value: IrrepsArray<A>) -> Self {
        Self::Typed(value)
    }
}

impl<A: Clone> From<&IrrepsArray<A>> for Operand<A> {
    #[inline]
    fn from(value: &IrrepsArray<A>) -> Self {
        Self::Typed(value.clone())
    }
}

impl<A> From<ArrayD<A>> for Operand<A> {
    #[inline]
    fn from(value: ArrayD<A>) -> Self {
        Self::Bare(value)
    }
}

impl<A: Clone> From<&ArrayD<A>> for Operand<A> {
    #[inline]
    fn from(value: &ArrayD<A>) -> Self {
        Self::Bare(value.clone())
    }
}

impl From<f32> for Operand<f32> {
    #[inline]
    fn from(value: f32) -> Self {
        Self::Bare(nd::arr0(value).into_dyn())
    }
}

impl From<f64> for Operand<f64> {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Bare(nd::arr0(value).into_dyn())
    }
}

fn broadcast_block<A: Clone>(x: &ArrayD<A>, shape: &[usize]) -> Result<ArrayD<A>, IrrepsArrayError> {
    x.broadcast(shape).map(|x| x.to_owned()).ok_or_else(|| {
        IrrepsArrayError::ShapeMismatch(format!(
            "cannot broadcast block of shape {:?} to {shape:?}",
            x.shape()
        ))
    })
}

/// Returns `true` if a bare operand acts the same way on every channel of a leading element.
fn is_per_element<A>(x: &ArrayD<A>) -> bool {
    x.ndim() == 0 || x.shape().last() == Some(&1)
}

/// Splits entries so that both sides have the same multiplicities, position by position.
fn refine(left: &Irreps, right: &Irreps) -> (Irreps, Irreps) {
    let mut left = left.to_vec();
    let mut right = right.to_vec();
    let mut index = 0;
    while index < left.len() && index < right.len() {
        let (a, b) = (left[index], right[index]);
        if a.mul < b.mul {
            right[index].mul = a.mul;
            right.insert(index + 1, MulIrrep::new(b.mul - a.mul, b.ir));
        } else if b.mul < a.mul {
            left[index].mul = b.mul;
            left.insert(index + 1, MulIrrep::new(a.mul - b.mul, a.ir));
        }
        index += 1;
    }
    (left.into(), right.into())
}

/// Channel-wise equality of two blocks, reduced over the irrep axis.
fn all_equal<A: Scalar>(
    x: Option<&ArrayD<A>>,
    y: Option<&ArrayD<A>>,
    shape: &[usize],
) -> Result<ArrayD<bool>, IrrepsArrayError> {
    let zero = nd::arr0(A::zero()).into_dyn();
    let last = Axis(shape.len() - 1);
    let (x, y) = match (x, y) {
        (None, None) => return Ok(super::ones(&[&shape[..shape.len() - 1], &[1]].concat())),
        (x, y) => (x.unwrap_or(&zero), y.unwrap_or(&zero)),
    };
    let x = broadcast_block(x, shape)?;
    let y = broadcast_block(y, shape)?;
    let equal = Zip::from(&x).and(&y).map_collect(|a, b| a == b);
    let equal = equal.fold_axis(last, true, |&acc, &x| acc && x);
    Ok(equal.insert_axis(last))
}

impl<A: Float> IrrepsArray<A> {
    fn combine(
        &self,
        other: Operand<A>,
        op: &str,
        f: impl Fn(&ArrayD<A>, &ArrayD<A>) -> ArrayD<A>,
        alone: impl Fn(&ArrayD<A>) -> ArrayD<A>,
    ) -> Result<Self, IrrepsArrayError> {
        let other = match other {
            Operand::Typed(other) => other,
            Operand::Bare(other) => {
                if !self.irreps.is_scalar() {
                    return Err(IrrepsArrayError::Equivariance(format!(
                        "{} {op} a bare array is not equivariant",
                        self.irreps
                    )));
                }
                broadcast_shapes(self.shape(), other.shape())?;
                return Self::new(self.irreps.clone(), f(&self.array, &other));
            }
        };

        if self.irreps != other.irreps {
            return Err(IrrepsArrayError::Equivariance(format!(
                "{} {op} {} is not equivariant",
                self.irreps, other.irreps
            )));
        }
        let shape = broadcast_shapes(self.shape(), other.shape())?;
        let array = f(&self.array, &other.array);
        if self.cached_blocks().is_none() && other.cached_blocks().is_none() {
            return Ok(Self::assemble(self.irreps.clone(), array, None));
        }

        let leading = &shape[..shape.len() - 1];
        let blocks = izip!(self.irreps.iter(), self.blocks(), other.blocks())
            .map(|(mul_ir, x, y)| {
                let shape = block_shape(leading, mul_ir.mul, mul_ir.ir.dim());
                match (x, y) {
                    (None, None) => Ok(None),
                    (Some(x), None) => broadcast_block(x, &shape).map(Some),
                    (None, Some(y)) => broadcast_block(&alone(y), &shape).map(Some),
                    (Some(x), Some(y)) => Ok(Some(f(x, y))),
                }
            })
            .collect::<Result<_, IrrepsArrayError>>()?;
        Ok(Self::assemble(self.irreps.clone(), array, Some(blocks)))
    }

    /// Multiplies or divides by a bare array.
    fn scale(
        &self,
        other: &ArrayD<A>,
        op: &str,
        f: impl Fn(&ArrayD<A>, &ArrayD<A>) -> ArrayD<A>,
    ) -> Result<Self, IrrepsArrayError> {
        let per_element = is_per_element(other);
        if self.irreps.lmax() > 0 && !per_element {
            return Err(IrrepsArrayError::Equivariance(format!(
                "{} {op} a bare array of shape {:?} is not equivariant",
                self.irreps,
                other.shape()
            )));
        }
        broadcast_shapes(self.shape(), other.shape())?;
        let array = f(&self.array, other);
        check_array(&self.irreps, &array)?;

        let blocks = match per_element {
            true => {
                let factor = other.clone().insert_axis(Axis(other.ndim()));
                self.map_cached_blocks(|_, x| Ok::<_, IrrepsArrayError>(f(x, &factor)))?
            }
            false => None,
        };
        Ok(Self::assemble(self.irreps.clone(), array, blocks))
    }

    /// Channel-wise product where at least one side holds scalars only.
    fn product(&self, other: &Self) -> Result<Self, IrrepsArrayError> {
        if self.irreps.lmax() > 0 && other.irreps.lmax() > 0 {
            return Err(IrrepsArrayError::Equivariance(format!(
                "{} * {} with both sides non-scalar is ambiguous, use an explicit tensor product",
                self.irreps, other.irreps
            )));
        }
        if self.irreps.num_irreps() != other.irreps.num_irreps() {
            return Err(IrrepsArrayError::Equivariance(format!(
                "{} * {} needs the same number of irreps on both sides",
                self.irreps, other.irreps
            )));
        }
        let leading = broadcast_shapes(self.leading_shape(), other.leading_shape())?;

        let (left, right) = refine(&self.irreps.simplify(), &other.irreps.simplify());
        let x = self.convert(&left)?;
        let y = other.convert(&right)?;
        let irreps: Irreps = left
            .iter()
            .zip_eq(right.iter())
            .map(|(a, b)| {
                let ir: Irrep = a.ir.product(b.ir).exactly_one().map_err(|_| {
                    IrrepsArrayError::Equivariance(format!("{} * {} is not a single irrep", a.ir, b.ir))
                })?;
                Ok(MulIrrep::new(a.mul, ir))
            })
            .collect::<Result<_, IrrepsArrayError>>()?;

        let blocks: Vec<Block<A>> = x
            .blocks()
            .iter()
            .zip_eq(y.blocks())
            .map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) => Some(x * y),
                _ => None,
            })
            .collect();
        Self::from_blocks(irreps, blocks, &leading)
    }

    fn reciprocal(&self) -> Self {
        let one = A::from_f64(1.0);
        let array = self.array.mapv(|x| one / x);
        let blocks = self
            .cached_blocks()
            .map(|blocks| blocks.iter().map(|x| x.as_ref().map(|x| x.mapv(|x| one / x))).collect());
        Self::assemble(self.irreps.clone(), array, blocks)
    }

    fn has_nones(&self) -> bool {
        self.cached_blocks()
            .is_some_and(|blocks| blocks.iter().any(Option::is_none))
    }

    /// # Addition (`try_add`)
    /// Adds an array with identical irreps, or a bare array if every entry is `0e`.
    ///
    /// ## Errors
    /// - [`IrrepsArrayError::Equivariance`] if the sum would not be equivariant.
    /// - [`IrrepsArrayError::ShapeMismatch`] if the shapes do not broadcast.
    pub fn try_add(&self, other: impl Into<Operand<A>>) -> Result<Self, IrrepsArrayError> {
        self.combine(other.into(), "+", |x, y| x + y, |y| y.clone())
    }

    /// Subtraction, with the same rules as [`IrrepsArray::try_add`].
    pub fn try_sub(&self, other: impl Into<Operand<A>>) -> Result<Self, IrrepsArrayError> {
        self.combine(other.into(), "-", |x, y| x - y, |y| y.mapv(|v| -v))
    }

    /// # Multiplication (`try_mul`)
    /// Multiplies by a bare array, or channel by channel by another irreps array when at least
    /// one side holds only scalars. The resulting irreps are the products of the paired irreps.
    ///
    /// ## Errors
    /// - [`IrrepsArrayError::Equivariance`] if both sides are non-scalar, the number of irreps
    ///   differ, or a bare operand does not act per leading element on non-scalar irreps.
    pub fn try_mul(&self, other: impl Into<Operand<A>>) -> Result<Self, IrrepsArrayError> {
        match other.into() {
            Operand::Typed(other) => self.product(&other),
            Operand::Bare(other) => self.scale(&other, "*", |x, y| x * y),
        }
    }

    /// # Division (`try_div`)
    /// Divides by a bare array, or by an irreps array holding only scalars.
    ///
    /// ## Errors
    /// - [`IrrepsArrayError::Equivariance`] if the divisor is empty, non-scalar, or has a different
    ///   number of irreps.
    /// - [`IrrepsArrayError::DivisionByZero`] if the divisor has deterministic zeros.
    pub fn try_div(&self, other: impl Into<Operand<A>>) -> Result<Self, IrrepsArrayError> {
        match other.into() {
            Operand::Typed(other) => {
                if other.irreps.is_empty()
                    || other.irreps.lmax() > 0
                    || self.irreps.num_irreps() != other.irreps.num_irreps()
                {
                    return Err(IrrepsArrayError::Equivariance(format!(
                        "{} / {} is not equivariant",
                        self.irreps, other.irreps
                    )));
                }
                if other.has_nones() {
                    return Err(IrrepsArrayError::DivisionByZero(other.irreps.clone()));
                }
                self.product(&other.reciprocal())
            }
            Operand::Bare(other) => self.scale(&other, "/", |x, y| x / y),
        }
    }

    /// Divides `numerator` by this array, which must hold only scalars and no deterministic zeros.
    pub fn rdiv(&self, numerator: impl Into<Operand<A>>) -> Result<Self, IrrepsArrayError> {
        let numerator = match numerator.into() {
            Operand::Typed(numerator) => return numerator.try_div(self),
            Operand::Bare(numerator) => numerator,
        };
        if self.irreps.lmax() > 0 {
            return Err(IrrepsArrayError::Equivariance(format!(
                "a bare array divided by {} is not equivariant",
                self.irreps
            )));
        }
        if self.has_nones() {
            return Err(IrrepsArrayError::DivisionByZero(self.irreps.clone()));
        }
        broadcast_shapes(numerator.shape(), self.shape())?;
        let array = &numerator / &self.array;
        check_array(&self.irreps, &array)?;

        let blocks = match is_per_element(&numerator) {
            true => {
                let numerator = numerator.clone().insert_axis(Axis(numerator.ndim()));
                self.map_cached_blocks(|_, x| Ok::<_, IrrepsArrayError>(&numerator / x))?
            }
            false => None,
        };
        Ok(Self::assemble(self.irreps.clone(), array, blocks))
    }

    /// # Equality (`try_eq`)
    /// Compares against an array with identical irreps, giving one boolean per channel with irreps
    /// `mul x 0e` per entry, or against a bare array, giving one boolean per buffer element.
    pub fn try_eq(
        &self,
        other: impl Into<Operand<A>>,
    ) -> Result<IrrepsArray<bool>, IrrepsArrayError> {
        let other = match other.into() {
            Operand::Typed(other) => other,
            Operand::Bare(other) => {
                if self.irreps.lmax() > 0 || !is_per_element(&other) {
                    return Err(IrrepsArrayError::Equivariance(format!(
                        "{} == a bare array of shape {:?} is not equivariant",
                        self.irreps,
                        other.shape()
                    )));
                }
                let shape = broadcast_shapes(self.shape(), other.shape())?;
                let x = broadcast_block(&self.array, &shape)?;
                let y = broadcast_block(&other, &shape)?;
                let array = Zip::from(&x).and(&y).map_collect(|a, b| a == b);
                return IrrepsArray::new(self.irreps.clone(), array);
            }
        };

        if self.irreps != other.irreps {
            return Err(IrrepsArrayError::Equivariance(format!(
                "{} == {} is not equivariant",
                self.irreps, other.irreps
            )));
        }
        let leading = broadcast_shapes(self.leading_shape(), other.leading_shape())?;
        let blocks = izip!(self.irreps.iter(), self.blocks(), other.blocks())
            .map(|(mul_ir, x, y)| {
                let shape = block_shape(&leading, mul_ir.mul, mul_ir.ir.dim());
                all_equal(x.as_ref(), y.as_ref(), &shape).map(Some)
            })
            .collect::<Result<_, IrrepsArrayError>>()?;
        let irreps: Irreps = self
            .irreps
            .iter()
            .map(|mul_ir| MulIrrep::new(mul_ir.mul, Irrep::SCALAR))
            .collect();
        IrrepsArray::from_blocks(irreps, blocks, &leading)
    }
}

impl<A: Float> std::ops::Neg for &IrrepsArray<A> {
    type Output = IrrepsArray<A>;

    fn neg(self) -> Self::Output {
        let blocks = self
            .cached_blocks()
            .map(|blocks| blocks.iter().map(|x| x.as_ref().map(|x| x.mapv(|v| -v))).collect());
        IrrepsArray::assemble(self.irreps.clone(), self.array.mapv(|v| -v), blocks)
    }
}

impl<A: Float> std::ops::Neg for IrrepsArray<A> {
    type Output = IrrepsArray<A>;

    #[inline]
    fn neg(self) -> Self::Output {
        -&self
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $fn:ident, $try:ident) => {
        impl<A: Float, T: Into<Operand<A>>> std::ops::$trait<T> for IrrepsArray<A> {
            type Output = IrrepsArray<A>;

            fn $fn(self, rhs: T) -> Self::Output {
                self.$try(rhs).expect("irreps array operands must be compatible")
            }
        }

        impl<A: Float, T: Into<Operand<A>>> std::ops::$trait<T> for &IrrepsArray<A> {
            type Output = IrrepsArray<A>;

            fn $fn(self, rhs: T) -> Self::Output {
                self.$try(rhs).expect("irreps array operands must be compatible")
            }
        }
    };
}

impl_binary_op!(Add, add, try_add);
impl_binary_op!(Sub, sub, try_sub);
impl_binary_op!(Mul, mul, try_mul);
impl_binary_op!(Div, div, try_div);

macro_rules! impl_scalar_lhs {
    ($($t:ty),+) => {
        $(
            impl std::ops::Mul<IrrepsArray<$t>> for $t {
                type Output = IrrepsArray<$t>;

                fn mul(self, rhs: IrrepsArray<$t>) -> Self::Output {
                    rhs * self
                }
            }

            impl std::ops::Mul<&IrrepsArray<$t>> for $t {
                type Output = IrrepsArray<$t>;

                fn mul(self, rhs: &IrrepsArray<$t>) -> Self::Output {
                    rhs * self
                }
            }

            impl std::ops::Div<IrrepsArray<$t>> for $t {
                type Output = IrrepsArray<$t>;

                fn div(self, rhs: IrrepsArray<$t>) -> Self::Output {
                    rhs.rdiv(self).expect("irreps array operands must be compatible")
                }
            }

            impl std::ops::Div<&IrrepsArray<$t>> for $t {
                type Output = IrrepsArray<$t>;

                fn div(self, rhs: &IrrepsArray<$t>) -> Self::Output {
                    rhs.rdiv(self).expect("irreps array operands must be compatible")
                }
            }
        )+
    };
}

impl_scalar_lhs!(f32, f64);
