//! Irreducible representations of O(3) and their direct sums.
//!
//! An [`Irrep`] is labelled by its angular order `l` and a [`Parity`]. An [`Irreps`] is an
//! ordered direct sum of irreps, each repeated a multiplicity of times, written as
//! `"2x0e + 1x1o"`.

use std::{cmp::Ordering, fmt, ops::Range, str::FromStr};

use derive_more::{Deref, Display, From, Into};
use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod wigner;

#[derive(Debug, Error)]
pub enum IrrepsError {
    #[error("irreps parse error: unable to interpret {0:?} as an irrep")]
    Irrep(String),
    #[error("irreps parse error: unable to interpret {0:?} as a multiplicity")]
    Mul(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    /// The parity of the spherical harmonics of order `l`, i.e. `(-1)^l`.
    #[inline]
    pub const fn natural(l: u32) -> Self {
        match l % 2 {
            0 => Self::Even,
            _ => Self::Odd,
        }
    }

    #[inline]
    pub const fn value(self) -> i32 {
        match self {
            Self::Even => 1,
            Self::Odd => -1,
        }
    }
}

impl std::ops::Mul for Parity {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self::Output {
        match self == rhs {
            true => Self::Even,
            false => Self::Odd,
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Even => write!(f, "e"),
            Self::Odd => write!(f, "o"),
        }
    }
}

/// An irreducible representation of O(3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[display("{l}{p}")]
pub struct Irrep {
    pub l: u32,
    pub p: Parity,
}

impl Irrep {
    /// The even scalar `0e`.
    pub const SCALAR: Self = Self::new(0, Parity::Even);

    #[inline]
    pub const fn new(l: u32, p: Parity) -> Self {
        Self { l, p }
    }

    #[inline]
    pub const fn dim(&self) -> usize {
        2 * self.l as usize + 1
    }

    /// Returns `true` for `0e`.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        *self == Self::SCALAR
    }

    /// Irreps appearing in the tensor product of `self` and `other`.
    pub fn product(self, other: Irrep) -> impl Iterator<Item = Irrep> {
        let p = self.p * other.p;
        (self.l.abs_diff(other.l)..=self.l + other.l).map(move |l| Irrep::new(l, p))
    }

    fn sort_key(&self) -> (u32, i32) {
        let natural = Parity::natural(self.l).value();
        (self.l, -self.p.value() * natural)
    }
}

impl PartialOrd for Irrep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Irrep {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl FromStr for Irrep {
    type Err = IrrepsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || IrrepsError::Irrep(s.to_string());
        let Some(last) = s.chars().last() else {
            return Err(err());
        };
        let l: u32 = s[..s.len() - last.len_utf8()].parse().map_err(|_| err())?;
        let p = match last {
            'e' => Parity::Even,
            'o' => Parity::Odd,
            'y' => Parity::natural(l),
            _ => return Err(err()),
        };
        Ok(Self::new(l, p))
    }
}

/// An irrep together with its multiplicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[display("{mul}x{ir}")]
pub struct MulIrrep {
    pub mul: usize,
    pub ir: Irrep,
}

impl MulIrrep {
    #[inline]
    pub const fn new(mul: usize, ir: Irrep) -> Self {
        Self { mul, ir }
    }

    #[inline]
    pub const fn dim(&self) -> usize {
        self.mul * self.ir.dim()
    }
}

impl From<Irrep> for MulIrrep {
    #[inline]
    fn from(ir: Irrep) -> Self {
        Self::new(1, ir)
    }
}

impl From<(usize, Irrep)> for MulIrrep {
    #[inline]
    fn from((mul, ir): (usize, Irrep)) -> Self {
        Self::new(mul, ir)
    }
}

impl FromStr for MulIrrep {
    type Err = IrrepsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('x') {
            Some((mul, ir)) => {
                let mul = mul
                    .trim()
                    .parse()
                    .map_err(|_| IrrepsError::Mul(mul.to_string()))?;
                Ok(Self::new(mul, ir.parse()?))
            }
            None => Ok(Self::new(1, s.parse()?)),
        }
    }
}

/// Result of [`Irreps::sort`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedIrreps {
    pub irreps: Irreps,
    /// `p[old] = new`.
    pub p: Vec<usize>,
    /// `inv[new] = old`.
    pub inv: Vec<usize>,
}

/// A direct sum of irreps, each with a multiplicity.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Deref, From, Into)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Irreps(Vec<MulIrrep>);

impl Irreps {
    #[inline]
    pub fn new(irreps: impl IntoIterator<Item = impl Into<MulIrrep>>) -> Self {
        Self(irreps.into_iter().map(Into::into).collect())
    }

    /// The total dimension of the representation.
    #[inline]
    pub fn dim(&self) -> usize {
        self.iter().map(MulIrrep::dim).sum()
    }

    /// Total multiplicity, counting every copy of every irrep.
    #[inline]
    pub fn num_irreps(&self) -> usize {
        self.iter().map(|x| x.mul).sum()
    }

    /// The largest angular order, `0` for an empty sum.
    #[inline]
    pub fn lmax(&self) -> u32 {
        self.iter().map(|x| x.ir.l).max().unwrap_or(0)
    }

    /// Returns `true` if every entry is `0e`.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.iter().all(|x| x.ir.is_scalar())
    }

    /// Ranges of each entry in the flattened dimension.
    pub fn slices(&self) -> Vec<Range<usize>> {
        self.iter()
            .scan(0, |start, x| {
                let range = *start..*start + x.dim();
                *start = range.end;
                Some(range)
            })
            .collect()
    }

    /// Merge adjacent entries of the same irrep and drop zero multiplicities.
    pub fn simplify(&self) -> Self {
        let mut out: Vec<MulIrrep> = Vec::with_capacity(self.len());
        for &MulIrrep { mul, ir } in self.iter() {
            match out.last_mut() {
                Some(last) if last.ir == ir => last.mul += mul,
                _ if mul > 0 => out.push(MulIrrep::new(mul, ir)),
                _ => {}
            }
        }
        Self(out)
    }

    /// Stable sort of the entries by irrep.
    pub fn sort(&self) -> SortedIrreps {
        let inv = (0..self.len())
            .sorted_by_key(|&index| (self[index].ir, index))
            .collect_vec();
        let mut p = vec![0; inv.len()];
        for (new, &old) in inv.iter().enumerate() {
            p[old] = new;
        }
        let irreps = Self(inv.iter().map(|&index| self[index]).collect());
        SortedIrreps { irreps, p, inv }
    }

    /// Sort, then simplify.
    #[inline]
    pub fn regroup(&self) -> Self {
        self.sort().irreps.simplify()
    }

    /// Concatenate `n` copies of the irreps.
    pub fn repeat(&self, n: usize) -> Self {
        let len = self.len() * n;
        Self(self.iter().copied().cycle().take(len).collect())
    }

    pub fn concat<'a>(irreps: impl IntoIterator<Item = &'a Irreps>) -> Self {
        Self(irreps.into_iter().flat_map(|x| x.iter().copied()).collect())
    }
}

impl fmt::Display for Irreps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iter().format("+"))
    }
}

impl FromStr for Irreps {
    type Err = IrrepsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('+')
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

impl std::ops::Add<&Irreps> for &Irreps {
    type Output = Irreps;

    fn add(self, rhs: &Irreps) -> Self::Output {
        Irreps::concat([self, rhs])
    }
}

impl FromIterator<MulIrrep> for Irreps {
    fn from_iter<T: IntoIterator<Item = MulIrrep>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Irreps {
    type Item = &'a MulIrrep;
    type IntoIter = std::slice::Iter<'a, MulIrrep>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Anything that describes an [`Irreps`].
pub trait IntoIrreps {
    fn into_irreps(self) -> Result<Irreps, IrrepsError>;
}

impl IntoIrreps for Irreps {
    #[inline]
    fn into_irreps(self) -> Result<Irreps, IrrepsError> {
        Ok(self)
    }
}

impl IntoIrreps for &Irreps {
    #[inline]
    fn into_irreps(self) -> Result<Irreps, IrrepsError> {
        Ok(self.clone())
    }
}

impl IntoIrreps for &str {
    #[inline]
    fn into_irreps(self) -> Result<Irreps, IrrepsError> {
        self.parse()
    }
}

impl IntoIrreps for String {
    #[inline]
    fn into_irreps(self) -> Result<Irreps, IrrepsError> {
        self.parse()
    }
}

impl IntoIrreps for &String {
    #[inline]
    fn into_irreps(self) -> Result<Irreps, IrrepsError> {
        self.parse()
    }
}

impl IntoIrreps for Irrep {
    #[inline]
    fn into_irreps(self) -> Result<Irreps, IrrepsError> {
        Ok(Irreps::new([self]))
    }
}

impl IntoIrreps for MulIrrep {
    #[inline]
    fn into_irreps(self) -> Result<Irreps, IrrepsError> {
        Ok(Irreps::new([self]))
    }
}

impl IntoIrreps for Vec<MulIrrep> {
    #[inline]
    fn into_irreps(self) -> Result<Irreps, IrrepsError> {
        Ok(Irreps(self))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{Irrep, Irreps, MulIrrep, Parity};

    #[test]
    fn test_parse() -> Result<(), Box<dyn Error>> {
        let irreps: Irreps = "3x0e + 2x1o+1e".parse()?;
        assert_eq!(irreps.len(), 3);
        assert_eq!(irreps[0], MulIrrep::new(3, Irrep::new(0, Parity::Even)));
        assert_eq!(irreps[1], MulIrrep::new(2, Irrep::new(1, Parity::Odd)));
        assert_eq!(irreps[2], MulIrrep::new(1, Irrep::new(1, Parity::Even)));
        assert_eq!(irreps.to_string(), "3x0e+2x1o+1x1e");
        assert_eq!(irreps.dim(), 3 + 6 + 3);
        assert_eq!(irreps.num_irreps(), 6);
        assert_eq!(irreps.lmax(), 1);

        let y: Irreps = "2y + 3y".parse()?;
        assert_eq!(y.to_string(), "1x2e+1x3o");

        assert!("".parse::<Irreps>()?.is_empty());
        assert!("1x".parse::<Irreps>().is_err());
        assert!("ax1e".parse::<Irreps>().is_err());
        assert!("1q".parse::<Irreps>().is_err());
        Ok(())
    }

    #[test]
    fn test_slices() -> Result<(), Box<dyn Error>> {
        let irreps: Irreps = "2x0e + 0x1o + 1x2e".parse()?;
        assert_eq!(irreps.slices(), vec![0..2, 2..2, 2..7]);
        Ok(())
    }

    #[test]
    fn test_simplify() -> Result<(), Box<dyn Error>> {
        let irreps: Irreps = "1x0e + 2x0e + 0x1o + 1x1e + 1x0e".parse()?;
        assert_eq!(irreps.simplify().to_string(), "3x0e+1x1e+1x0e");

        let irreps: Irreps = "0x0e + 1x1e + 0x1e".parse()?;
        assert_eq!(irreps.simplify().to_string(), "1x1e");
        Ok(())
    }

    #[test]
    fn test_sort() -> Result<(), Box<dyn Error>> {
        let irreps: Irreps = "1e + 0o + 2x0e + 1o".parse()?;
        let sorted = irreps.sort();
        assert_eq!(sorted.irreps.to_string(), "2x0e+1x0o+1x1o+1x1e");
        assert_eq!(sorted.inv, vec![2, 1, 3, 0]);
        assert_eq!(sorted.p, vec![3, 1, 0, 2]);
        assert_eq!(irreps.regroup().to_string(), "2x0e+1x0o+1x1o+1x1e");

        let irreps: Irreps = "1e + 0e + 1e".parse()?;
        assert_eq!(irreps.regroup().to_string(), "1x0e+2x1e");
        Ok(())
    }

    #[test]
    fn test_repeat_and_concat() -> Result<(), Box<dyn Error>> {
        let irreps: Irreps = "0e + 1e".parse()?;
        assert_eq!(irreps.repeat(3).to_string(), "1x0e+1x1e+1x0e+1x1e+1x0e+1x1e");
        assert!(irreps.repeat(0).is_empty());

        let other: Irreps = "2x1o".parse()?;
        assert_eq!((&irreps + &other).to_string(), "1x0e+1x1e+2x1o");
        Ok(())
    }

    #[test]
    fn test_product() {
        let scalar = Irrep::new(0, Parity::Odd);
        let vector = Irrep::new(1, Parity::Odd);
        let product: Vec<_> = scalar.product(vector).collect();
        assert_eq!(product, vec![Irrep::new(1, Parity::Even)]);

        let product: Vec<_> = vector.product(vector).map(|x| x.to_string()).collect();
        assert_eq!(product, vec!["0e", "1e", "2e"]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde() -> Result<(), Box<dyn Error>> {
        let irreps: Irreps = "2x0e + 1o".parse()?;
        let json = serde_json::to_string(&irreps)?;
        let back: Irreps = serde_json::from_str(&json)?;
        assert_eq!(back, irreps);
        Ok(())
    }
}
