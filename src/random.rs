use std::str::FromStr;

use derive_more::Display;
use ndarray as nd;
use nd::{ArrayD, Axis, IxDyn};
use rand::Rng;
use rand_distr::StandardNormal;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    array::{IrrepsArray, IrrepsArrayError, block_shape},
    irreps::IntoIrreps,
    num::Float,
};

/// How [`normal`] scales its samples.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Normalization {
    /// Every coordinate is a standard normal sample.
    #[default]
    #[display("component")]
    Component,
    /// Every channel has unit norm.
    #[display("norm")]
    Norm,
}

impl FromStr for Normalization {
    type Err = IrrepsArrayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "component" => Ok(Self::Component),
            "norm" => Ok(Self::Norm),
            _ => Err(IrrepsArrayError::InvalidConfiguration(format!(
                "unknown normalization `{s}`"
            ))),
        }
    }
}

fn sample<A: Float, R: Rng + ?Sized>(rng: &mut R, shape: &[usize]) -> ArrayD<A> {
    ArrayD::from_shape_simple_fn(IxDyn(shape), || {
        A::from_f64(rng.sample::<f64, _>(StandardNormal))
    })
}

/// # Random Array (`normal`)
/// Draws an array of `irreps` with leading shape `leading` from a standard normal distribution.
///
/// ## Arguments
/// - `rng`: the source of randomness. Seeding it makes the draw reproducible.
/// - `normalization`: [`Normalization::Norm`] rescales each channel to unit norm.
pub fn normal<A: Float, R: Rng + ?Sized>(
    irreps: impl IntoIrreps,
    rng: &mut R,
    leading: &[usize],
    normalization: Normalization,
) -> Result<IrrepsArray<A>, IrrepsArrayError> {
    let irreps = irreps.into_irreps()?;
    match normalization {
        Normalization::Component => {
            let shape = [leading, &[irreps.dim()]].concat();
            IrrepsArray::new(irreps, sample(rng, &shape))
        }
        Normalization::Norm => {
            let blocks = irreps
                .iter()
                .map(|mul_ir| {
                    let x = sample::<A, _>(rng, &block_shape(leading, mul_ir.mul, mul_ir.ir.dim()));
                    let last = Axis(x.ndim() - 1);
                    let norm = x
                        .mapv(|x| x * x)
                        .sum_axis(last)
                        .insert_axis(last)
                        .mapv(A::sqrt);
                    Some(&x / &norm)
                })
                .collect();
            IrrepsArray::from_blocks(irreps, blocks, leading)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use approx::assert_abs_diff_eq;
    use rand::{SeedableRng, rngs::StdRng};

    use super::{Normalization, normal};
    use crate::{array::IrrepsArrayError, reduce};

    #[test]
    fn test_parse() -> Result<(), Box<dyn Error>> {
        assert_eq!("norm".parse::<Normalization>()?, Normalization::Norm);
        assert_eq!(Normalization::default().to_string(), "component");
        assert!(matches!(
            "integral".parse::<Normalization>(),
            Err(IrrepsArrayError::InvalidConfiguration(_))
        ));
        Ok(())
    }

    #[test]
    fn test_component() -> Result<(), Box<dyn Error>> {
        let mut rng = StdRng::seed_from_u64(42);
        let x = normal::<f64, _>("10x0e + 5x1o", &mut rng, &[200], Normalization::Component)?;
        assert_eq!(x.shape(), &[200, 25]);
        let mean = x.array().mean().ok_or("empty array")?;
        assert!(mean.abs() < 0.1);

        let mut rng = StdRng::seed_from_u64(42);
        let y = normal::<f64, _>("10x0e + 5x1o", &mut rng, &[200], Normalization::Component)?;
        assert_eq!(x.array(), y.array());
        Ok(())
    }

    #[test]
    fn test_norm() -> Result<(), Box<dyn Error>> {
        let mut rng = StdRng::seed_from_u64(7);
        let x = normal::<f64, _>("2x0e + 3x2e", &mut rng, &[4], Normalization::Norm)?;
        assert_eq!(x.shape(), &[4, 17]);
        let n = reduce::norm(&x, false)?;
        assert_abs_diff_eq!(n.array(), &ndarray::ArrayD::<f64>::ones(vec![4, 5]), epsilon = 1e-12);
        Ok(())
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde() -> Result<(), Box<dyn Error>> {
        let json = serde_json::to_string(&Normalization::Norm)?;
        assert_eq!(json, "\"norm\"");
        assert_eq!(serde_json::from_str::<Normalization>(&json)?, Normalization::Norm);
        Ok(())
    }
}
