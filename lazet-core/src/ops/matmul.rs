#[cfg(feature = "parallel")]
use crate::config;
use crate::{
    container::{Container, DynMatrix, FastMatrix},
    error::LazetError,
    scalar::Scalar,
    shape::Sh2,
    temporary::{BinaryTempOp, FastBinaryTempOp, TemporaryBinaryExpr},
    traits::Expr,
};

use super::{check_rank, row_major, with_output};

/// Matrix product of two 2D operands
#[derive(Debug, Clone, Copy, Default)]
pub struct MatMulOp;

impl<A, B> BinaryTempOp<A, B> for MatMulOp
where
    A: Expr,
    B: Expr<Elem = A::Elem>,
{
    const FAST: bool = true;

    fn desc(&self) -> &'static str {
        "mm_mul"
    }

    fn check(&self, a: &A, b: &B) -> Result<(), LazetError> {
        check_rank("mm_mul", a, 2, 2)?;
        check_rank("mm_mul", b, 2, 2)?;
        if a.dim(1) != b.dim(0) {
            return Err(LazetError::shape_error(format!(
                "mm_mul of {} and {}",
                a.shape(),
                b.shape()
            )));
        }
        Ok(())
    }

    fn dimensions(&self, _: &A, _: &B) -> usize {
        2
    }

    fn dim(&self, a: &A, b: &B, d: usize) -> usize {
        if d == 0 {
            a.dim(0)
        } else {
            b.dim(1)
        }
    }

    fn apply<C: Container<Elem = A::Elem>>(&self, a: &A, b: &B, c: &C) -> Result<(), LazetError> {
        let (m, k, n) = (a.dim(0), a.dim(1), b.dim(1));
        let lhs = row_major(a)?;
        let rhs = row_major(b)?;
        with_output(c, &[m, n], |out| gemm(&lhs, &rhs, out, k, n))
    }
}

fn gemm<T: Scalar>(a: &[T], b: &[T], out: &mut [T], k: usize, n: usize) {
    if out.is_empty() {
        return;
    }
    let row = |(i, out_row): (usize, &mut [T])| {
        out_row.fill(T::zero());
        for (p, &x) in a[i * k..(i + 1) * k].iter().enumerate() {
            for (y, &w) in out_row.iter_mut().zip(&b[p * n..(p + 1) * n]) {
                *y = y.add(x.mul(w));
            }
        }
    };
    #[cfg(feature = "parallel")]
    {
        let config = config::current();
        if config.parallel && out.len() >= config.parallel_threshold {
            use rayon::prelude::*;
            out.par_chunks_mut(n).enumerate().for_each(row);
            return;
        }
    }
    out.chunks_mut(n).enumerate().for_each(row);
}

macro_rules! impl_fast_matmul {
    ($($lhs:ty, $rhs:ty);*) => {
        $(
            impl<'a, T: Scalar, const M: usize, const K: usize, const N: usize>
                FastBinaryTempOp<$lhs, $rhs> for MatMulOp
            {
                const DIMENSIONS: usize = 2;
                const SIZE: usize = M * N;

                fn fast_dim(d: usize) -> usize {
                    [M, N][d]
                }
            }
        )*
    };
}

impl_fast_matmul!(
    FastMatrix<T, Sh2<M, K>>, FastMatrix<T, Sh2<K, N>>;
    &'a FastMatrix<T, Sh2<M, K>>, &'a FastMatrix<T, Sh2<K, N>>
);

/// Lazy matrix product `a * b`, fails unless `a` is `m x k` and `b` is `k x n`
pub fn matmul<A, B>(
    a: A,
    b: B,
) -> Result<TemporaryBinaryExpr<A, B, MatMulOp, DynMatrix<A::Elem>>, LazetError>
where
    A: Expr,
    B: Expr<Elem = A::Elem>,
{
    TemporaryBinaryExpr::new(a, b, MatMulOp)
}
