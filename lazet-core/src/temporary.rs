//! Temporary expressions.
//!
//! Operators whose output at one position depends on several input positions
//! (products, convolutions, pooling) are computed once into a result buffer.
//! Each node walks `UNALLOCATED -> ALLOCATED -> EVALUATED`:
//!
//! - [`allocate_temporary`](TemporaryBinaryExpr::allocate_temporary) provisions the
//!   result exactly once, a node forced into caller storage only records the transition,
//! - [`evaluate`](TemporaryBinaryExpr::evaluate) applies the operator into the result,
//!   repeated calls do nothing,
//! - [`result`](TemporaryBinaryExpr::result) reads it.
//!
//! Calling them out of order is a bug in the caller and panics.

use crate::{
    config::VectorMode,
    container::{Container, ResultBuffer},
    counters,
    error::LazetError,
    evaluate,
    pack::Pack,
    shape::{Order, Shape},
    storage::{Region, Storage},
    traits::{Expr, FastExpr, Traits},
};

/// Operator computing a result from one operand
pub trait UnaryTempOp<A: Expr> {
    /// Operator has [`FastUnaryTempOp`] form for fast operands
    const FAST: bool = false;

    /// Name used when printing expressions
    fn desc(&self) -> &'static str;

    /// Validate operand shape
    fn check(&self, a: &A) -> Result<(), LazetError> {
        let _ = a;
        Ok(())
    }

    /// Number of dimensions of result
    fn dimensions(&self, a: &A) -> usize;

    /// Extent of dimension `d` of result
    fn dim(&self, a: &A, d: usize) -> usize;

    /// Number of elements of result
    fn size(&self, a: &A) -> usize {
        (0..self.dimensions(a)).map(|d| self.dim(a, d)).product()
    }

    /// Shape of result
    fn shape(&self, a: &A) -> Shape {
        (0..self.dimensions(a)).map(|d| self.dim(a, d)).collect()
    }

    /// Provision correctly shaped result
    fn allocate<R: ResultBuffer<Elem = A::Elem>>(&self, a: &A, order: Order) -> Result<R, LazetError> {
        R::allocate(&self.shape(a), order)
    }

    /// Compute result into `c`
    fn apply<C: Container<Elem = A::Elem>>(&self, a: &A, c: &C) -> Result<(), LazetError>;
}

/// Operator computing a result from two operands
pub trait BinaryTempOp<A: Expr, B: Expr<Elem = A::Elem>> {
    /// Operator has [`FastBinaryTempOp`] form for fast operands
    const FAST: bool = false;

    /// Name used when printing expressions
    fn desc(&self) -> &'static str;

    /// Validate operand shapes
    fn check(&self, a: &A, b: &B) -> Result<(), LazetError> {
        let _ = (a, b);
        Ok(())
    }

    /// Number of dimensions of result
    fn dimensions(&self, a: &A, b: &B) -> usize;

    /// Extent of dimension `d` of result
    fn dim(&self, a: &A, b: &B, d: usize) -> usize;

    /// Number of elements of result
    fn size(&self, a: &A, b: &B) -> usize {
        (0..self.dimensions(a, b)).map(|d| self.dim(a, b, d)).product()
    }

    /// Shape of result
    fn shape(&self, a: &A, b: &B) -> Shape {
        (0..self.dimensions(a, b)).map(|d| self.dim(a, b, d)).collect()
    }

    /// Provision correctly shaped result
    fn allocate<R: ResultBuffer<Elem = A::Elem>>(
        &self,
        a: &A,
        b: &B,
        order: Order,
    ) -> Result<R, LazetError> {
        R::allocate(&self.shape(a, b), order)
    }

    /// Compute result into `c`
    fn apply<C: Container<Elem = A::Elem>>(&self, a: &A, b: &B, c: &C) -> Result<(), LazetError>;
}

/// Result shape of unary operator known at compile time
pub trait FastUnaryTempOp<A: FastExpr>: UnaryTempOp<A> {
    /// Number of dimensions of result
    const DIMENSIONS: usize;
    /// Number of elements of result
    const SIZE: usize;
    /// Extent of dimension `d` of result
    fn fast_dim(d: usize) -> usize;
}

/// Result shape of binary operator known at compile time
pub trait FastBinaryTempOp<A: FastExpr, B: FastExpr<Elem = A::Elem>>: BinaryTempOp<A, B> {
    /// Number of dimensions of result
    const DIMENSIONS: usize;
    /// Number of elements of result
    const SIZE: usize;
    /// Extent of dimension `d` of result
    fn fast_dim(d: usize) -> usize;
}

fn result_order<A: Expr>(a: &A) -> Order {
    if A::TRAITS.is_generator {
        Order::RowMajor
    } else {
        a.storage_order()
    }
}

/// Temporary computed from one operand into a buffer of type `R`
#[derive(Debug)]
pub struct TemporaryUnaryExpr<A, Op, R> {
    a: A,
    op: Op,
    result: Option<R>,
    forced: bool,
    allocated: bool,
    evaluated: bool,
}

impl<A, Op, R> Clone for TemporaryUnaryExpr<A, Op, R>
where
    A: Clone,
    Op: Clone,
    R: Clone,
{
    // shares result buffer, flags are preserved
    fn clone(&self) -> Self {
        Self {
            a: self.a.clone(),
            op: self.op.clone(),
            result: self.result.clone(),
            forced: self.forced,
            allocated: self.allocated,
            evaluated: self.evaluated,
        }
    }
}

impl<A, Op, R> TemporaryUnaryExpr<A, Op, R>
where
    A: Expr,
    Op: UnaryTempOp<A>,
    R: ResultBuffer<Elem = A::Elem>,
{
    /// Temporary owning its result, fails if `op` rejects operand shape
    pub fn new(a: A, op: Op) -> Result<Self, LazetError> {
        op.check(&a)?;
        Ok(Self {
            a,
            op,
            result: None,
            forced: false,
            allocated: false,
            evaluated: false,
        })
    }

    /// Temporary bound to caller storage `result`
    pub fn forced(a: A, op: Op, result: R) -> Result<Self, LazetError> {
        op.check(&a)?;
        let shape = op.shape(&a);
        if result.shape() != shape {
            return Err(LazetError::shape_error(format!(
                "{} result {shape} forced into {}",
                op.desc(),
                result.shape()
            )));
        }
        Ok(Self {
            a,
            op,
            result: Some(result),
            forced: true,
            allocated: false,
            evaluated: false,
        })
    }

    /// Result buffer exists
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Result is computed
    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    /// Result is bound to caller storage
    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// Provision result buffer, does nothing if it exists
    pub fn allocate_temporary(&mut self) -> Result<(), LazetError> {
        if self.result.is_none() {
            let order = result_order(&self.a);
            self.result = Some(self.op.allocate(&self.a, order)?);
            counters::increment("temporary:allocate");
            log::trace!("Allocated temporary {}{}", self.op.desc(), self.op.shape(&self.a));
        }
        self.allocated = true;
        Ok(())
    }

    /// Compute result, does nothing if already computed.
    ///
    /// # Panics
    /// Panics if result was not allocated.
    #[track_caller]
    pub fn evaluate(&mut self) -> Result<(), LazetError> {
        if self.evaluated {
            return Ok(());
        }
        let Some(result) = self.result.as_ref().filter(|_| self.allocated) else {
            panic!("{}: evaluate() called before allocate_temporary()", self.op.desc());
        };
        self.a.allocate_temporaries()?;
        self.a.evaluate_temporaries()?;
        if self.forced && self.a.alias(&result.region()) {
            log::debug!("{} operand aliases forced result, evaluating through a copy", self.op.desc());
            let fresh: R = self.op.allocate(&self.a, result_order(&self.a))?;
            self.op.apply(&self.a, &fresh)?;
            evaluate::assign(result, &fresh)?;
        } else {
            self.op.apply(&self.a, result)?;
        }
        self.evaluated = true;
        counters::increment("temporary:evaluate");
        log::trace!("Evaluated temporary {}", self.op.desc());
        Ok(())
    }

    /// Write result into `dest`.
    ///
    /// A forced node applies its operator straight into `dest` unless its operand
    /// reads `dest`, other nodes evaluate their own buffer and copy it.
    pub fn direct_evaluate<C: Container<Elem = A::Elem>>(&mut self, dest: &C) -> Result<(), LazetError> {
        if self.forced {
            self.a.allocate_temporaries()?;
            self.a.evaluate_temporaries()?;
            if self.a.alias(&dest.region()) {
                log::debug!("{} operand aliases destination, evaluating through a copy", self.op.desc());
                let fresh: R = self.op.allocate(&self.a, result_order(&self.a))?;
                self.op.apply(&self.a, &fresh)?;
                return evaluate::assign(dest, &fresh);
            }
            self.op.apply(&self.a, dest)
        } else {
            self.allocate_temporary()?;
            self.evaluate()?;
            let result = self.result();
            evaluate::assign(dest, result)
        }
    }

    /// Computed result.
    ///
    /// # Panics
    /// Panics if result was not evaluated.
    #[must_use]
    #[track_caller]
    pub fn result(&self) -> &R {
        match &self.result {
            Some(result) if self.evaluated => result,
            _ => panic!("{}: result() read before evaluate()", self.op.desc()),
        }
    }

    /// Move result and flags into a new node.
    ///
    /// Forced results are shared, owned results leave `self`, which goes back to unallocated.
    /// Either way `self` is no longer evaluated.
    #[must_use]
    pub fn take(&mut self) -> Self
    where
        A: Clone,
        Op: Clone,
        R: Clone,
    {
        let result = if self.forced {
            self.result.clone()
        } else {
            self.result.take()
        };
        let taken = Self {
            a: self.a.clone(),
            op: self.op.clone(),
            result,
            forced: self.forced,
            allocated: self.allocated,
            evaluated: self.evaluated,
        };
        self.evaluated = false;
        if !self.forced {
            self.allocated = false;
        }
        taken
    }
}

impl<A, Op, R> Expr for TemporaryUnaryExpr<A, Op, R>
where
    A: Expr,
    Op: UnaryTempOp<A>,
    R: ResultBuffer<Elem = A::Elem>,
{
    type Elem = A::Elem;
    const TRAITS: Traits = Traits {
        is_fast: A::TRAITS.is_fast && Op::FAST,
        is_linear: true,
        is_temporary: true,
        is_direct: true,
        needs_temporary_visitor: true,
        ..Traits::NONE
    };

    fn dimensions(&self) -> usize {
        self.op.dimensions(&self.a)
    }

    fn dim(&self, d: usize) -> usize {
        self.op.dim(&self.a, d)
    }

    fn size(&self) -> usize {
        self.op.size(&self.a)
    }

    fn storage_order(&self) -> Order {
        match &self.result {
            Some(result) => result.storage_order(),
            None => result_order(&self.a),
        }
    }

    fn vectorizable(mode: VectorMode) -> bool {
        R::vectorizable(mode)
    }

    fn read_flat(&self, i: usize) -> Self::Elem {
        self.result().read_flat(i)
    }

    fn read_at(&self, index: &[usize]) -> Self::Elem {
        self.result().read_at(index)
    }

    fn load<const W: usize>(&self, i: usize) -> Pack<Self::Elem, W> {
        self.result().load::<W>(i)
    }

    fn alias(&self, region: &Region) -> bool {
        self.a.alias(region)
    }

    fn direct(&self) -> Option<(&Storage<Self::Elem>, Region)> {
        match &self.result {
            Some(result) if self.evaluated => result.direct(),
            _ => None,
        }
    }

    fn allocate_temporaries(&mut self) -> Result<(), LazetError> {
        self.a.allocate_temporaries()?;
        self.allocate_temporary()
    }

    fn evaluate_temporaries(&mut self) -> Result<(), LazetError> {
        self.evaluate()
    }

    fn sync_host(&self) -> Result<(), LazetError> {
        match &self.result {
            Some(result) if self.evaluated => result.sync_host(),
            _ => self.a.sync_host(),
        }
    }

    fn evaluate_into<C: Container<Elem = Self::Elem>>(&mut self, dest: &C) -> Result<bool, LazetError> {
        if self.evaluated {
            evaluate::assign(dest, self.result())?;
        } else {
            self.a.allocate_temporaries()?;
            self.a.evaluate_temporaries()?;
            self.op.apply(&self.a, dest)?;
            counters::increment("temporary:evaluate");
        }
        Ok(true)
    }
}

impl<A, Op, R> FastExpr for TemporaryUnaryExpr<A, Op, R>
where
    A: FastExpr,
    Op: FastUnaryTempOp<A>,
    R: ResultBuffer<Elem = A::Elem>,
{
    const DIMENSIONS: usize = Op::DIMENSIONS;
    const SIZE: usize = Op::SIZE;

    fn fast_dim(d: usize) -> usize {
        Op::fast_dim(d)
    }
}

impl<A, Op, R> core::fmt::Display for TemporaryUnaryExpr<A, Op, R>
where
    A: Expr + core::fmt::Display,
    Op: UnaryTempOp<A>,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{}({})", self.op.desc(), self.a))
    }
}

/// Temporary computed from two operands into a buffer of type `R`
#[derive(Debug)]
pub struct TemporaryBinaryExpr<A, B, Op, R> {
    a: A,
    b: B,
    op: Op,
    result: Option<R>,
    forced: bool,
    allocated: bool,
    evaluated: bool,
}

impl<A, B, Op, R> Clone for TemporaryBinaryExpr<A, B, Op, R>
where
    A: Clone,
    B: Clone,
    Op: Clone,
    R: Clone,
{
    // shares result buffer, flags are preserved
    fn clone(&self) -> Self {
        Self {
            a: self.a.clone(),
            b: self.b.clone(),
            op: self.op.clone(),
            result: self.result.clone(),
            forced: self.forced,
            allocated: self.allocated,
            evaluated: self.evaluated,
        }
    }
}

impl<A, B, Op, R> TemporaryBinaryExpr<A, B, Op, R>
where
    A: Expr,
    B: Expr<Elem = A::Elem>,
    Op: BinaryTempOp<A, B>,
    R: ResultBuffer<Elem = A::Elem>,
{
    /// Temporary owning its result, fails if `op` rejects operand shapes
    pub fn new(a: A, b: B, op: Op) -> Result<Self, LazetError> {
        op.check(&a, &b)?;
        Ok(Self {
            a,
            b,
            op,
            result: None,
            forced: false,
            allocated: false,
            evaluated: false,
        })
    }

    /// Temporary bound to caller storage `result`
    pub fn forced(a: A, b: B, op: Op, result: R) -> Result<Self, LazetError> {
        op.check(&a, &b)?;
        let shape = op.shape(&a, &b);
        if result.shape() != shape {
            return Err(LazetError::shape_error(format!(
                "{} result {shape} forced into {}",
                op.desc(),
                result.shape()
            )));
        }
        Ok(Self {
            a,
            b,
            op,
            result: Some(result),
            forced: true,
            allocated: false,
            evaluated: false,
        })
    }

    /// Result buffer exists
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Result is computed
    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    /// Result is bound to caller storage
    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.forced
    }

    fn order(&self) -> Order {
        if A::TRAITS.is_generator {
            result_order(&self.b)
        } else {
            result_order(&self.a)
        }
    }

    /// Provision result buffer, does nothing if it exists
    pub fn allocate_temporary(&mut self) -> Result<(), LazetError> {
        if self.result.is_none() {
            self.result = Some(self.op.allocate(&self.a, &self.b, self.order())?);
            counters::increment("temporary:allocate");
            log::trace!(
                "Allocated temporary {}{}",
                self.op.desc(),
                self.op.shape(&self.a, &self.b)
            );
        }
        self.allocated = true;
        Ok(())
    }

    fn prepare_operands(&mut self) -> Result<(), LazetError> {
        self.a.allocate_temporaries()?;
        self.b.allocate_temporaries()?;
        self.a.evaluate_temporaries()?;
        self.b.evaluate_temporaries()
    }

    /// Compute result, does nothing if already computed.
    ///
    /// # Panics
    /// Panics if result was not allocated.
    #[track_caller]
    pub fn evaluate(&mut self) -> Result<(), LazetError> {
        if self.evaluated {
            return Ok(());
        }
        let Some(result) = self.result.as_ref().filter(|_| self.allocated) else {
            panic!("{}: evaluate() called before allocate_temporary()", self.op.desc());
        };
        self.a.allocate_temporaries()?;
        self.b.allocate_temporaries()?;
        self.a.evaluate_temporaries()?;
        self.b.evaluate_temporaries()?;
        let region = result.region();
        if self.forced && (self.a.alias(&region) || self.b.alias(&region)) {
            log::debug!("{} operands alias forced result, evaluating through a copy", self.op.desc());
            let fresh: R = self.op.allocate(&self.a, &self.b, self.order())?;
            self.op.apply(&self.a, &self.b, &fresh)?;
            evaluate::assign(result, &fresh)?;
        } else {
            self.op.apply(&self.a, &self.b, result)?;
        }
        self.evaluated = true;
        counters::increment("temporary:evaluate");
        log::trace!("Evaluated temporary {}", self.op.desc());
        Ok(())
    }

    /// Write result into `dest`.
    ///
    /// A forced node applies its operator straight into `dest`, without any
    /// intermediate buffer, unless an operand reads `dest`. Other nodes evaluate
    /// their own buffer and copy it.
    pub fn direct_evaluate<C: Container<Elem = A::Elem>>(&mut self, dest: &C) -> Result<(), LazetError> {
        if self.forced {
            self.prepare_operands()?;
            let region = dest.region();
            if self.a.alias(&region) || self.b.alias(&region) {
                log::debug!("{} operands alias destination, evaluating through a copy", self.op.desc());
                let fresh: R = self.op.allocate(&self.a, &self.b, self.order())?;
                self.op.apply(&self.a, &self.b, &fresh)?;
                return evaluate::assign(dest, &fresh);
            }
            self.op.apply(&self.a, &self.b, dest)
        } else {
            self.allocate_temporary()?;
            self.evaluate()?;
            let result = self.result();
            evaluate::assign(dest, result)
        }
    }

    /// Computed result.
    ///
    /// # Panics
    /// Panics if result was not evaluated.
    #[must_use]
    #[track_caller]
    pub fn result(&self) -> &R {
        match &self.result {
            Some(result) if self.evaluated => result,
            _ => panic!("{}: result() read before evaluate()", self.op.desc()),
        }
    }

    /// Move result and flags into a new node.
    ///
    /// Forced results are shared, owned results leave `self`, which goes back to unallocated.
    /// Either way `self` is no longer evaluated.
    #[must_use]
    pub fn take(&mut self) -> Self
    where
        A: Clone,
        B: Clone,
        Op: Clone,
        R: Clone,
    {
        let result = if self.forced {
            self.result.clone()
        } else {
            self.result.take()
        };
        let taken = Self {
            a: self.a.clone(),
            b: self.b.clone(),
            op: self.op.clone(),
            result,
            forced: self.forced,
            allocated: self.allocated,
            evaluated: self.evaluated,
        };
        self.evaluated = false;
        if !self.forced {
            self.allocated = false;
        }
        taken
    }
}

impl<A, B, Op, R> Expr for TemporaryBinaryExpr<A, B, Op, R>
where
    A: Expr,
    B: Expr<Elem = A::Elem>,
    Op: BinaryTempOp<A, B>,
    R: ResultBuffer<Elem = A::Elem>,
{
    type Elem = A::Elem;
    const TRAITS: Traits = Traits {
        is_fast: A::TRAITS.is_fast && B::TRAITS.is_fast && Op::FAST,
        is_linear: true,
        is_temporary: true,
        is_direct: true,
        needs_temporary_visitor: true,
        ..Traits::NONE
    };

    fn dimensions(&self) -> usize {
        self.op.dimensions(&self.a, &self.b)
    }

    fn dim(&self, d: usize) -> usize {
        self.op.dim(&self.a, &self.b, d)
    }

    fn size(&self) -> usize {
        self.op.size(&self.a, &self.b)
    }

    fn storage_order(&self) -> Order {
        match &self.result {
            Some(result) => result.storage_order(),
            None => self.order(),
        }
    }

    fn vectorizable(mode: VectorMode) -> bool {
        R::vectorizable(mode)
    }

    fn read_flat(&self, i: usize) -> Self::Elem {
        self.result().read_flat(i)
    }

    fn read_at(&self, index: &[usize]) -> Self::Elem {
        self.result().read_at(index)
    }

    fn load<const W: usize>(&self, i: usize) -> Pack<Self::Elem, W> {
        self.result().load::<W>(i)
    }

    fn alias(&self, region: &Region) -> bool {
        self.a.alias(region) || self.b.alias(region)
    }

    fn direct(&self) -> Option<(&Storage<Self::Elem>, Region)> {
        match &self.result {
            Some(result) if self.evaluated => result.direct(),
            _ => None,
        }
    }

    fn allocate_temporaries(&mut self) -> Result<(), LazetError> {
        self.a.allocate_temporaries()?;
        self.b.allocate_temporaries()?;
        self.allocate_temporary()
    }

    fn evaluate_temporaries(&mut self) -> Result<(), LazetError> {
        self.evaluate()
    }

    fn sync_host(&self) -> Result<(), LazetError> {
        match &self.result {
            Some(result) if self.evaluated => result.sync_host(),
            _ => {
                self.a.sync_host()?;
                self.b.sync_host()
            }
        }
    }

    fn evaluate_into<C: Container<Elem = Self::Elem>>(&mut self, dest: &C) -> Result<bool, LazetError> {
        if self.evaluated {
            evaluate::assign(dest, self.result())?;
        } else {
            self.prepare_operands()?;
            self.op.apply(&self.a, &self.b, dest)?;
            counters::increment("temporary:evaluate");
        }
        Ok(true)
    }
}

impl<A, B, Op, R> FastExpr for TemporaryBinaryExpr<A, B, Op, R>
where
    A: FastExpr,
    B: FastExpr<Elem = A::Elem>,
    Op: FastBinaryTempOp<A, B>,
    R: ResultBuffer<Elem = A::Elem>,
{
    const DIMENSIONS: usize = Op::DIMENSIONS;
    const SIZE: usize = Op::SIZE;

    fn fast_dim(d: usize) -> usize {
        Op::fast_dim(d)
    }
}

impl<A, B, Op, R> core::fmt::Display for TemporaryBinaryExpr<A, B, Op, R>
where
    A: Expr + core::fmt::Display,
    B: Expr<Elem = A::Elem> + core::fmt::Display,
    Op: BinaryTempOp<A, B>,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{}({}, {})", self.op.desc(), self.a, self.b))
    }
}
