use std::{fmt::Debug, ops::Neg};

use ndarray::{LinalgScalar, ScalarOperand};

pub trait Zero {
    fn zero() -> Self;
}

impl Zero for f32 {
    fn zero() -> Self {
        0.0
    }
}

impl Zero for f64 {
    fn zero() -> Self {
        0.0
    }
}

impl Zero for bool {
    fn zero() -> Self {
        false
    }
}

pub trait One {
    fn one() -> Self;
}

impl One for f32 {
    fn one() -> Self {
        1.0
    }
}

impl One for f64 {
    fn one() -> Self {
        1.0
    }
}

impl One for bool {
    fn one() -> Self {
        true
    }
}

/// Element type of an [`IrrepsArray`](crate::IrrepsArray).
pub trait Scalar:
    Sized + Clone + Debug + PartialEq + Zero + One + Send + Sync + 'static + sealed::Sealed
{
}

/// Elements that support the numeric operations (norms, rotations, reductions).
///
/// Both [`Zero`] and `num_traits::Zero` (through [`LinalgScalar`]) are in scope for these types,
/// so generic code builds constants with [`Float::from_f64`].
pub trait Float: Scalar + Copy + PartialOrd + LinalgScalar + ScalarOperand + Neg<Output = Self> {
    fn from_f64(value: f64) -> Self;
    fn sqrt(self) -> Self;
}

impl Scalar for f32 {}

impl Scalar for f64 {}

impl Scalar for bool {}

impl Float for f32 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }
}

impl Float for f64 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for bool {}
}

#[cfg(test)]
mod tests {
    use super::{Float, One, Zero};

    #[test]
    fn test_zero_one() {
        assert_eq!(<f32 as Zero>::zero(), 0.0);
        assert_eq!(<f64 as One>::one(), 1.0);
        assert!(!bool::zero());
        assert!(bool::one());
        assert_eq!(Float::sqrt(4.0f64), 2.0);
        assert_eq!(<f32 as Float>::from_f64(0.5), 0.5f32);
    }
}
