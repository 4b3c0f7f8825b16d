use core::marker::PhantomData;

use crate::{
    config::VectorMode,
    error::LazetError,
    pack::Pack,
    scalar::Scalar,
    shape::{Order, Shape},
    storage::Region,
    traits::{Expr, FastExpr, Traits},
};

/// Elementwise unary operation
pub trait UnaryOp {
    /// Result at `i` depends only on input at `i`
    const LINEAR: bool;
    /// Has a vector form
    const VECTORIZABLE: bool;

    /// Name used when printing expressions
    fn desc() -> &'static str;

    /// Apply to one element
    fn apply<T: Scalar>(x: T) -> T;

    /// Apply to all lanes
    fn apply_pack<T: Scalar, const W: usize>(x: Pack<T, W>) -> Pack<T, W> {
        x.map(Self::apply)
    }
}

/// Negation
#[derive(Debug, Clone, Copy, Default)]
pub struct Minus;

impl UnaryOp for Minus {
    const LINEAR: bool = true;
    const VECTORIZABLE: bool = true;

    fn desc() -> &'static str {
        "-"
    }

    fn apply<T: Scalar>(x: T) -> T {
        x.neg()
    }
}

/// Absolute value
#[derive(Debug, Clone, Copy, Default)]
pub struct Abs;

impl UnaryOp for Abs {
    const LINEAR: bool = true;
    const VECTORIZABLE: bool = true;

    fn desc() -> &'static str {
        "abs"
    }

    fn apply<T: Scalar>(x: T) -> T {
        x.abs()
    }
}

/// Exponential
#[derive(Debug, Clone, Copy, Default)]
pub struct Exp;

impl UnaryOp for Exp {
    const LINEAR: bool = true;
    // no vector exp, lanes would be evaluated one by one anyway
    const VECTORIZABLE: bool = false;

    fn desc() -> &'static str {
        "exp"
    }

    fn apply<T: Scalar>(x: T) -> T {
        x.exp()
    }
}

/// Elementwise unary expression
#[derive(Debug, Clone)]
pub struct UnaryExpr<E, Op> {
    inner: E,
    op: PhantomData<Op>,
}

impl<E: Expr, Op: UnaryOp> UnaryExpr<E, Op> {
    /// Apply `Op` to every element of `inner`
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            op: PhantomData,
        }
    }
}

/// `-e`
pub fn minus<E: Expr>(e: E) -> UnaryExpr<E, Minus> {
    UnaryExpr::new(e)
}

/// `|e|`
pub fn abs<E: Expr>(e: E) -> UnaryExpr<E, Abs> {
    UnaryExpr::new(e)
}

/// `exp(e)`
pub fn exp<E: Expr>(e: E) -> UnaryExpr<E, Exp> {
    UnaryExpr::new(e)
}

impl<E: Expr, Op: UnaryOp> Expr for UnaryExpr<E, Op> {
    type Elem = E::Elem;
    const TRAITS: Traits = Traits {
        is_fast: E::TRAITS.is_fast,
        is_linear: E::TRAITS.is_linear && Op::LINEAR,
        is_generator: E::TRAITS.is_generator,
        needs_temporary_visitor: E::TRAITS.needs_temporary_visitor,
        ..Traits::NONE
    };

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn dim(&self, d: usize) -> usize {
        self.inner.dim(d)
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn shape(&self) -> Shape {
        self.inner.shape()
    }

    fn storage_order(&self) -> Order {
        self.inner.storage_order()
    }

    fn vectorizable(mode: VectorMode) -> bool {
        Op::VECTORIZABLE && E::vectorizable(mode)
    }

    fn read_flat(&self, i: usize) -> Self::Elem {
        Op::apply(self.inner.read_flat(i))
    }

    fn read_at(&self, index: &[usize]) -> Self::Elem {
        Op::apply(self.inner.read_at(index))
    }

    fn load<const W: usize>(&self, i: usize) -> Pack<Self::Elem, W> {
        Op::apply_pack(self.inner.load::<W>(i))
    }

    fn alias(&self, region: &Region) -> bool {
        self.inner.alias(region)
    }

    fn allocate_temporaries(&mut self) -> Result<(), LazetError> {
        self.inner.allocate_temporaries()
    }

    fn evaluate_temporaries(&mut self) -> Result<(), LazetError> {
        self.inner.evaluate_temporaries()
    }

    fn sync_host(&self) -> Result<(), LazetError> {
        self.inner.sync_host()
    }
}

impl<E: FastExpr, Op: UnaryOp> FastExpr for UnaryExpr<E, Op> {
    const DIMENSIONS: usize = E::DIMENSIONS;
    const SIZE: usize = E::SIZE;

    fn fast_dim(d: usize) -> usize {
        E::fast_dim(d)
    }
}

impl<E: core::fmt::Display, Op: UnaryOp> core::fmt::Display for UnaryExpr<E, Op> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{}({})", Op::desc(), self.inner))
    }
}
