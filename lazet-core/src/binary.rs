use core::marker::PhantomData;

use crate::{
    config::VectorMode,
    error::LazetError,
    pack::Pack,
    scalar::Scalar,
    shape::{self, Order, Shape},
    storage::Region,
    traits::{Expr, FastExpr, Traits},
};

/// Elementwise binary operation
pub trait BinaryOp {
    /// Has a vector form
    const VECTORIZABLE: bool;

    /// Name used when printing expressions
    fn desc() -> &'static str;

    /// Apply to one pair of elements
    fn apply<T: Scalar>(x: T, y: T) -> T;

    /// Apply to all lanes
    fn apply_pack<T: Scalar, const W: usize>(x: Pack<T, W>, y: Pack<T, W>) -> Pack<T, W> {
        x.zip(y, Self::apply)
    }
}

macro_rules! binary_op {
    ($name:ident, $desc:literal, $vec:literal, $f:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl BinaryOp for $name {
            const VECTORIZABLE: bool = $vec;

            fn desc() -> &'static str {
                $desc
            }

            fn apply<T: Scalar>(x: T, y: T) -> T {
                x.$f(y)
            }
        }
    };
}

binary_op!(Plus, "+", true, add, "Addition");
binary_op!(Sub, "-", true, sub, "Subtraction");
binary_op!(Times, "*", true, mul, "Elementwise multiplication");
binary_op!(Div, "/", true, div, "Division");

/// Elementwise binary expression.
///
/// Shape and storage order come from the operand that is not a generator.
#[derive(Debug, Clone)]
pub struct BinaryExpr<L, R, Op> {
    lhs: L,
    rhs: R,
    // operands laid out in different orders, flat reads go through coordinates
    mixed: bool,
    op: PhantomData<Op>,
}

impl<L, R, Op> BinaryExpr<L, R, Op>
where
    L: Expr,
    R: Expr<Elem = L::Elem>,
    Op: BinaryOp,
{
    /// Combine `lhs` and `rhs`, their shapes must be equal unless one is a generator
    pub fn new(lhs: L, rhs: R) -> Result<Self, LazetError> {
        let mut mixed = false;
        if !L::TRAITS.is_generator && !R::TRAITS.is_generator {
            let (ls, rs) = (lhs.shape(), rhs.shape());
            if ls != rs {
                return Err(LazetError::shape_error(format!(
                    "{} on shapes {ls} and {rs}",
                    Op::desc()
                )));
            }
            mixed = lhs.storage_order() != rhs.storage_order();
        }
        Ok(Self {
            lhs,
            rhs,
            mixed,
            op: PhantomData,
        })
    }
}

/// `a + b`
pub fn add<L: Expr, R: Expr<Elem = L::Elem>>(
    a: L,
    b: R,
) -> Result<BinaryExpr<L, R, Plus>, LazetError> {
    BinaryExpr::new(a, b)
}

/// `a - b`
pub fn sub<L: Expr, R: Expr<Elem = L::Elem>>(
    a: L,
    b: R,
) -> Result<BinaryExpr<L, R, Sub>, LazetError> {
    BinaryExpr::new(a, b)
}

/// Elementwise `a * b`
pub fn times<L: Expr, R: Expr<Elem = L::Elem>>(
    a: L,
    b: R,
) -> Result<BinaryExpr<L, R, Times>, LazetError> {
    BinaryExpr::new(a, b)
}

/// `a / b`
pub fn div<L: Expr, R: Expr<Elem = L::Elem>>(
    a: L,
    b: R,
) -> Result<BinaryExpr<L, R, Div>, LazetError> {
    BinaryExpr::new(a, b)
}

impl<L, R, Op> Expr for BinaryExpr<L, R, Op>
where
    L: Expr,
    R: Expr<Elem = L::Elem>,
    Op: BinaryOp,
{
    type Elem = L::Elem;
    const TRAITS: Traits = Traits {
        is_fast: L::TRAITS.is_fast && R::TRAITS.is_fast,
        is_linear: L::TRAITS.is_linear && R::TRAITS.is_linear,
        is_generator: L::TRAITS.is_generator && R::TRAITS.is_generator,
        needs_temporary_visitor: L::TRAITS.needs_temporary_visitor
            || R::TRAITS.needs_temporary_visitor,
        ..Traits::NONE
    };

    fn dimensions(&self) -> usize {
        if L::TRAITS.is_generator {
            self.rhs.dimensions()
        } else {
            self.lhs.dimensions()
        }
    }

    fn dim(&self, d: usize) -> usize {
        if L::TRAITS.is_generator {
            self.rhs.dim(d)
        } else {
            self.lhs.dim(d)
        }
    }

    fn size(&self) -> usize {
        if L::TRAITS.is_generator {
            self.rhs.size()
        } else {
            self.lhs.size()
        }
    }

    fn shape(&self) -> Shape {
        if L::TRAITS.is_generator {
            self.rhs.shape()
        } else {
            self.lhs.shape()
        }
    }

    fn storage_order(&self) -> Order {
        if L::TRAITS.is_generator {
            self.rhs.storage_order()
        } else {
            self.lhs.storage_order()
        }
    }

    fn vectorizable(mode: VectorMode) -> bool {
        Op::VECTORIZABLE && L::vectorizable(mode) && R::vectorizable(mode)
    }

    fn read_flat(&self, i: usize) -> Self::Elem {
        if self.mixed {
            let dims = self.lhs.shape();
            let mut index = vec![0; dims.rank()];
            shape::unravel(dims.as_slice(), i, self.lhs.storage_order(), &mut index);
            return self.read_at(&index);
        }
        Op::apply(self.lhs.read_flat(i), self.rhs.read_flat(i))
    }

    fn read_at(&self, index: &[usize]) -> Self::Elem {
        Op::apply(self.lhs.read_at(index), self.rhs.read_at(index))
    }

    fn load<const W: usize>(&self, i: usize) -> Pack<Self::Elem, W> {
        if self.mixed {
            Pack::from_fn(|k| self.read_flat(i + k))
        } else {
            Op::apply_pack(self.lhs.load::<W>(i), self.rhs.load::<W>(i))
        }
    }

    fn alias(&self, region: &Region) -> bool {
        self.lhs.alias(region) || self.rhs.alias(region)
    }

    fn allocate_temporaries(&mut self) -> Result<(), LazetError> {
        self.lhs.allocate_temporaries()?;
        self.rhs.allocate_temporaries()
    }

    fn evaluate_temporaries(&mut self) -> Result<(), LazetError> {
        self.lhs.evaluate_temporaries()?;
        self.rhs.evaluate_temporaries()
    }

    fn sync_host(&self) -> Result<(), LazetError> {
        self.lhs.sync_host()?;
        self.rhs.sync_host()
    }
}

impl<L, R, Op> FastExpr for BinaryExpr<L, R, Op>
where
    L: FastExpr,
    R: FastExpr<Elem = L::Elem>,
    Op: BinaryOp,
{
    const DIMENSIONS: usize = if L::TRAITS.is_generator {
        R::DIMENSIONS
    } else {
        L::DIMENSIONS
    };
    const SIZE: usize = if L::TRAITS.is_generator {
        R::SIZE
    } else {
        L::SIZE
    };

    fn fast_dim(d: usize) -> usize {
        if L::TRAITS.is_generator {
            R::fast_dim(d)
        } else {
            L::fast_dim(d)
        }
    }
}

impl<L, R, Op> core::fmt::Display for BinaryExpr<L, R, Op>
where
    L: core::fmt::Display,
    R: core::fmt::Display,
    Op: BinaryOp,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("({} {} {})", self.lhs, Op::desc(), self.rhs))
    }
}
