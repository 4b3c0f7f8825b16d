//! Arithmetic operators on expressions.
//!
//! `+`, `-` and unary `-` build elementwise nodes, `*` builds a matrix product.
//! Operators can not return errors, a shape mismatch panics with the
//! [`ShapeError`](crate::error::LazetError::ShapeError) text.
//! Use [`add`](crate::binary::add), [`sub`](crate::binary::sub) and
//! [`matmul`](crate::ops::matmul) for fallible construction.

use crate::{
    binary::{self, BinaryExpr, Plus},
    broadcast::{DynRepeat, Repeat},
    container::{DynMatrix, FastMatrix},
    error::LazetError,
    ops::MatMulOp,
    scalar::Scalar,
    shape::{ConstShape, Sh2},
    temporary::{TemporaryBinaryExpr, TemporaryUnaryExpr},
    traits::Expr,
    unary::{Minus, UnaryExpr},
    view::SubView,
};

#[track_caller]
fn or_panic<X>(result: Result<X, LazetError>) -> X {
    match result {
        Ok(x) => x,
        Err(e) => panic!("{e}"),
    }
}

macro_rules! impl_elementwise_ops {
    ([$($g:tt)*] $ty:ty) => {
        impl<$($g)* Rhs> core::ops::Add<Rhs> for $ty
        where
            $ty: Expr,
            Rhs: Expr<Elem = <$ty as Expr>::Elem>,
        {
            type Output = BinaryExpr<$ty, Rhs, Plus>;

            #[track_caller]
            fn add(self, rhs: Rhs) -> Self::Output {
                or_panic(BinaryExpr::new(self, rhs))
            }
        }

        impl<$($g)* Rhs> core::ops::Sub<Rhs> for $ty
        where
            $ty: Expr,
            Rhs: Expr<Elem = <$ty as Expr>::Elem>,
        {
            type Output = BinaryExpr<$ty, Rhs, binary::Sub>;

            #[track_caller]
            fn sub(self, rhs: Rhs) -> Self::Output {
                or_panic(BinaryExpr::new(self, rhs))
            }
        }

        impl<$($g)*> core::ops::Neg for $ty
        where
            $ty: Expr,
        {
            type Output = UnaryExpr<$ty, Minus>;

            fn neg(self) -> Self::Output {
                UnaryExpr::new(self)
            }
        }
    };
}

macro_rules! impl_matmul_op {
    ([$($g:tt)*] $ty:ty) => {
        impl<$($g)* Rhs> core::ops::Mul<Rhs> for $ty
        where
            $ty: Expr,
            Rhs: Expr<Elem = <$ty as Expr>::Elem>,
        {
            type Output = TemporaryBinaryExpr<$ty, Rhs, MatMulOp, DynMatrix<<$ty as Expr>::Elem>>;

            #[track_caller]
            fn mul(self, rhs: Rhs) -> Self::Output {
                or_panic(TemporaryBinaryExpr::new(self, rhs, MatMulOp))
            }
        }
    };
}

macro_rules! impl_ops {
    ($([$($g:tt)*] $ty:ty;)*) => {
        $(
            impl_elementwise_ops!([$($g)*] $ty);
            impl_matmul_op!([$($g)*] $ty);
        )*
    };
}

impl_ops!(
    [T: Scalar,] DynMatrix<T>;
    ['a, T: Scalar,] &'a DynMatrix<T>;
    [E, Op,] UnaryExpr<E, Op>;
    [L, R, Op,] BinaryExpr<L, R, Op>;
    [A, Op, Res,] TemporaryUnaryExpr<A, Op, Res>;
    [A, B, Op, Res,] TemporaryBinaryExpr<A, B, Op, Res>;
    [E, Reps: ConstShape, O,] Repeat<E, Reps, O>;
    [E, O,] DynRepeat<E, O>;
    [E,] SubView<E>;
);

impl_elementwise_ops!([T: Scalar, S: ConstShape,] FastMatrix<T, S>);
impl_elementwise_ops!(['a, T: Scalar, S: ConstShape,] &'a FastMatrix<T, S>);

// Product of fast matrices has a fast result, inner extents are checked by the types
impl<T: Scalar, const M: usize, const K: usize, const N: usize> core::ops::Mul<FastMatrix<T, Sh2<K, N>>>
    for FastMatrix<T, Sh2<M, K>>
{
    type Output = TemporaryBinaryExpr<
        FastMatrix<T, Sh2<M, K>>,
        FastMatrix<T, Sh2<K, N>>,
        MatMulOp,
        FastMatrix<T, Sh2<M, N>>,
    >;

    #[track_caller]
    fn mul(self, rhs: FastMatrix<T, Sh2<K, N>>) -> Self::Output {
        or_panic(TemporaryBinaryExpr::new(self, rhs, MatMulOp))
    }
}

impl<'a, T: Scalar, const M: usize, const K: usize, const N: usize>
    core::ops::Mul<&'a FastMatrix<T, Sh2<K, N>>> for &'a FastMatrix<T, Sh2<M, K>>
{
    type Output = TemporaryBinaryExpr<
        &'a FastMatrix<T, Sh2<M, K>>,
        &'a FastMatrix<T, Sh2<K, N>>,
        MatMulOp,
        FastMatrix<T, Sh2<M, N>>,
    >;

    #[track_caller]
    fn mul(self, rhs: &'a FastMatrix<T, Sh2<K, N>>) -> Self::Output {
        or_panic(TemporaryBinaryExpr::new(self, rhs, MatMulOp))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        container::{Assign, DynMatrix, FastMatrix},
        error::LazetError,
        shape::Sh2,
        traits::{Expr, FastExpr},
    };

    #[test]
    fn elementwise() -> Result<(), LazetError> {
        let a = DynMatrix::from_vec([3], vec![1, 2, 3])?;
        let b = DynMatrix::from_vec([3], vec![10, 20, 30])?;
        let c = DynMatrix::zeros([3])?;
        c.assign(-(&a + &b) - &a)?;
        assert_eq!(c.to_vec()?, [-12, -24, -36]);
        Ok(())
    }

    #[test]
    fn product_of_sums() -> Result<(), LazetError> {
        let a = DynMatrix::from_vec([2, 2], vec![1., 0., 0., 1.])?;
        let b = DynMatrix::from_vec([2, 2], vec![1., 2., 3., 4.])?;
        let c = DynMatrix::zeros([2, 2])?;
        c.assign((&a + &a) * &b)?;
        assert_eq!(c.to_vec()?, [2., 4., 6., 8.]);
        Ok(())
    }

    fn is_fast<E: Expr>(_: &E) -> bool {
        E::TRAITS.is_fast
    }

    fn columns<E: FastExpr>(_: &E) -> usize {
        E::dim_of::<1>()
    }

    #[test]
    fn fast_product_is_fast() -> Result<(), LazetError> {
        let a = FastMatrix::<f32, Sh2<2, 3>>::filled(1.)?;
        let b = FastMatrix::<f32, Sh2<3, 4>>::filled(2.)?;
        let p = &a * &b;
        assert!(is_fast(&p));
        assert_eq!(columns(&p), 4);
        let c = FastMatrix::<f32, Sh2<2, 4>>::zeros()?;
        c.assign(p)?;
        assert_eq!(c.to_vec()?, [6.; 8]);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "mm_mul of [2, 3] and [2, 3]")]
    fn product_shape_mismatch_panics() {
        let a = DynMatrix::<f32>::zeros([2, 3]).unwrap();
        let _ = &a * &a;
    }
}
