use ndarray as nd;
use nd::{ArrayD, ArrayViewD, Axis};

use super::{Block, IrrepsArray, IrrepsArrayError, block_shape, zeros};
use crate::{
    irreps::{IntoIrreps, Irrep, MulIrrep},
    num::Scalar,
};

/// Collects the channels of one target entry.
enum Accumulator<A> {
    /// Only deterministic zeros so far, counted in channels.
    Empty(usize),
    Materialized(ArrayD<A>),
}

impl<A: Scalar> Accumulator<A> {
    fn push(
        self,
        count: usize,
        piece: Option<ArrayViewD<'_, A>>,
        leading: &[usize],
        dim: usize,
    ) -> Result<Self, IrrepsArrayError> {
        let axis = Axis(leading.len());
        let accumulator = match (self, piece) {
            (Self::Empty(n), None) => Self::Empty(n + count),
            (Self::Empty(n), Some(x)) => {
                log::trace!("promoting {n} zero channels before a concrete piece");
                let z = zeros::<A>(&block_shape(leading, n, dim));
                Self::Materialized(nd::concatenate(axis, &[z.view(), x.view()])?)
            }
            (Self::Materialized(a), None) => {
                let z = zeros::<A>(&block_shape(leading, count, dim));
                Self::Materialized(nd::concatenate(axis, &[a.view(), z.view()])?)
            }
            (Self::Materialized(a), Some(x)) => {
                Self::Materialized(nd::concatenate(axis, &[a.view(), x.view()])?)
            }
        };
        Ok(accumulator)
    }

    fn finish(self) -> Block<A> {
        match self {
            Self::Empty(_) => None,
            Self::Materialized(x) => Some(x),
        }
    }
}

/// Streams the non-empty source entries channel by channel.
struct Cursor<'a, A> {
    entries: Vec<(MulIrrep, Option<&'a ArrayD<A>>)>,
    index: usize,
    offset: usize,
}

impl<'a, A> Cursor<'a, A> {
    fn new(entries: impl IntoIterator<Item = (MulIrrep, Option<&'a ArrayD<A>>)>) -> Self {
        let entries = entries.into_iter().filter(|(x, _)| x.mul > 0).collect();
        Self {
            entries,
            index: 0,
            offset: 0,
        }
    }

    /// Takes up to `count` channels of `ir` from the current entry.
    fn take(&mut self, count: usize, ir: Irrep) -> (usize, Option<ArrayViewD<'a, A>>) {
        let (mul_ir, x) = self.entries[self.index];
        assert_eq!(mul_ir.ir, ir, "converted irreps must agree after simplification");

        let count = count.min(mul_ir.mul - self.offset);
        let range = self.offset..self.offset + count;
        let piece = x.map(|x| x.slice_axis(Axis(x.ndim() - 2), range.into()));

        self.offset += count;
        if self.offset == mul_ir.mul {
            self.index += 1;
            self.offset = 0;
        }
        (count, piece)
    }

    fn is_exhausted(&self) -> bool {
        self.index == self.entries.len()
    }
}

impl<A: Scalar> IrrepsArray<A> {
    /// # Convert the Layout (`convert`)
    /// Re-expresses the blocks in terms of `irreps`, which must simplify to the same irreps. The
    /// buffer is unchanged. Deterministic zeros survive wherever a target entry is covered by
    /// zero blocks only.
    ///
    /// ## Errors
    /// - [`IrrepsArrayError::Equivariance`] if the two irreps do not simplify to the same value.
    pub fn convert(&self, irreps: impl IntoIrreps) -> Result<Self, IrrepsArrayError> {
        #[cfg(feature = "trace")]
        let _span = tracing::trace_span!("convert").entered();

        let irreps = irreps.into_irreps()?;
        if self.irreps.simplify() != irreps.simplify() {
            return Err(IrrepsArrayError::Equivariance(format!(
                "cannot convert {} into {irreps}",
                self.irreps
            )));
        }

        let Some(blocks) = self.cached_blocks() else {
            return Ok(Self::assemble(irreps, self.array.clone(), None));
        };

        let leading = self.leading_shape();
        let sources = self.irreps.iter().copied();
        let mut cursor = Cursor::new(sources.zip(blocks.iter().map(Option::as_ref)));
        let mut converted = Vec::with_capacity(irreps.len());
        for &MulIrrep { mul, ir } in irreps.iter() {
            let mut accumulator = Accumulator::Empty(0);
            let mut needed = mul;
            while needed > 0 {
                let (count, piece) = cursor.take(needed, ir);
                accumulator = accumulator.push(count, piece, leading, ir.dim())?;
                needed -= count;
            }
            converted.push(accumulator.finish());
        }
        assert!(cursor.is_exhausted(), "source channels left over after conversion");

        Ok(Self::assemble(irreps, self.array.clone(), Some(converted)))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use ndarray::{ArrayD, IxDyn};

    use crate::array::{IrrepsArray, IrrepsArrayError};

    fn arange(shape: &[usize]) -> ArrayD<f64> {
        let size = shape.iter().product::<usize>();
        ArrayD::from_shape_vec(IxDyn(shape), (0..size).map(|x| x as f64).collect())
            .expect("shape matches data")
    }

    #[test]
    fn test_convert_lazy() -> Result<(), Box<dyn Error>> {
        let x = IrrepsArray::new("2x0e + 1x0e + 1o", arange(&[3, 6]))?;
        let y = x.convert("1x0e + 2x0e + 0x1e + 1o")?;
        assert_eq!(y.array(), x.array());
        assert_eq!(y.blocks().len(), 4);
        assert_eq!(
            y.blocks()[1].as_ref().map(|x| x.shape().to_vec()),
            Some(vec![3, 2, 1])
        );
        assert!(matches!(x.convert("3x0e"), Err(IrrepsArrayError::Equivariance(_))));
        Ok(())
    }

    #[test]
    fn test_convert_blocks() -> Result<(), Box<dyn Error>> {
        let a = arange(&[2, 1, 1]);
        let blocks = vec![None, Some(a.clone()), None, Some(arange(&[2, 1, 3]))];
        let x = IrrepsArray::from_blocks("2x0e + 1x0e + 1x0e + 1o", blocks, &[2])?;

        let y = x.convert("4x0e + 1o")?;
        let merged = y.blocks()[0].as_ref().ok_or("missing block")?;
        assert_eq!(merged.shape(), &[2, 4, 1]);
        assert_eq!(merged[[1, 2, 0]], 1.0);
        assert_eq!(merged[[1, 0, 0]], 0.0);

        let z = x.convert("2x0e + 2x0e + 0x1o + 1o")?;
        assert!(z.blocks()[0].is_none());
        assert!(z.blocks()[1].is_some());
        assert!(z.blocks()[2].is_none());

        let back = y.convert("2x0e + 1x0e + 1x0e + 1o")?;
        assert!(back.blocks().iter().all(Option::is_some));
        assert_eq!(back.array(), x.array());
        Ok(())
    }

    #[test]
    fn test_convert_zero_multiplicity() -> Result<(), Box<dyn Error>> {
        let blocks = vec![Some(arange(&[2, 1, 1])), Some(arange(&[2, 2, 1]))];
        let x = IrrepsArray::from_blocks("1x0e + 2x0e", blocks, &[2])?;

        let y = x.convert("0x0e + 1x0e + 0x0e + 2x0e + 0x0e")?;
        let shapes = y
            .blocks()
            .iter()
            .map(|x| x.as_ref().map(|x| x.shape().to_vec()))
            .collect::<Vec<_>>();
        assert_eq!(
            shapes,
            vec![None, Some(vec![2, 1, 1]), None, Some(vec![2, 2, 1]), None]
        );

        let back = y.convert(x.irreps())?;
        assert_eq!(back.array(), x.array());
        assert_eq!(back.blocks(), x.blocks());
        Ok(())
    }
}
