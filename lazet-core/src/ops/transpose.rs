use crate::{
    container::{Container, DynMatrix},
    error::LazetError,
    temporary::{FastUnaryTempOp, TemporaryUnaryExpr, UnaryTempOp},
    traits::{Expr, FastExpr},
};

use super::{check_rank, row_major, with_output};

/// Swap dimensions of a 2D operand
#[derive(Debug, Clone, Copy, Default)]
pub struct TransposeOp;

impl<A: Expr> UnaryTempOp<A> for TransposeOp {
    const FAST: bool = true;

    fn desc(&self) -> &'static str {
        "transpose"
    }

    fn check(&self, a: &A) -> Result<(), LazetError> {
        check_rank("transpose", a, 2, 2)
    }

    fn dimensions(&self, _: &A) -> usize {
        2
    }

    fn dim(&self, a: &A, d: usize) -> usize {
        a.dim(1 - d)
    }

    fn apply<C: Container<Elem = A::Elem>>(&self, a: &A, c: &C) -> Result<(), LazetError> {
        let (rows, cols) = (a.dim(0), a.dim(1));
        let input = row_major(a)?;
        with_output(c, &[cols, rows], |out| {
            for (i, row) in input.chunks(cols.max(1)).enumerate().take(rows) {
                for (j, &x) in row.iter().enumerate() {
                    out[j * rows + i] = x;
                }
            }
        })
    }
}

impl<A: FastExpr> FastUnaryTempOp<A> for TransposeOp {
    const DIMENSIONS: usize = 2;
    const SIZE: usize = A::SIZE;

    fn fast_dim(d: usize) -> usize {
        A::fast_dim(1 - d)
    }
}

/// Lazy transpose of 2D `a`
pub fn transpose<A: Expr>(a: A) -> Result<TemporaryUnaryExpr<A, TransposeOp, DynMatrix<A::Elem>>, LazetError> {
    TemporaryUnaryExpr::new(a, TransposeOp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Assign;

    #[test]
    fn swaps_dimensions() -> Result<(), LazetError> {
        let a = DynMatrix::from_vec([2, 3], vec![1, 2, 3, 4, 5, 6])?;
        let t = transpose(&a)?;
        assert_eq!(t.shape(), crate::shape::Shape::from([3, 2]));
        let c = DynMatrix::zeros([3, 2])?;
        c.assign(t)?;
        assert_eq!(c.to_vec()?, [1, 4, 2, 5, 3, 6]);
        Ok(())
    }

    #[test]
    fn rejects_vectors() -> Result<(), LazetError> {
        let a = DynMatrix::<f32>::zeros([4])?;
        assert!(transpose(&a).is_err());
        Ok(())
    }
}
