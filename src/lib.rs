//! Arrays whose last axis is a direct sum of irreducible representations of O(3).

pub mod array;
pub mod irreps;
pub mod num;
pub mod random;
pub mod reduce;

pub use array::{
    Block, IrrepsArray, IrrepsArrayError, SplitIndices,
    ops::Operand,
    slice::{Index, Slice},
};
pub use irreps::{IntoIrreps, Irrep, Irreps, IrrepsError, MulIrrep, Parity};
pub use random::{Normalization, normal};
pub use reduce::{concatenate, mean, norm, sum};
