//! Repeat transformers.
//!
//! A repeat presents its inner expression as a higher dimensional one by adding
//! dimensions before (prepend) or after (append) the inner ones. Nothing is copied,
//! flat reads are remapped with division or modulo by the repeat product.

use core::marker::PhantomData;

use crate::{
    config::VectorMode,
    error::LazetError,
    shape::{self, ConstShape, Order, Shape},
    storage::Region,
    traits::{Expr, FastExpr, Traits},
};

/// Where repeat dimensions go relative to inner dimensions
pub trait Orientation {
    /// Repeat dimensions follow inner dimensions
    const APPEND: bool;
    /// Name used when printing expressions
    const NAME: &'static str;
}

/// Repeat dimensions after inner dimensions, each inner element is repeated `m` times
#[derive(Debug, Clone, Copy, Default)]
pub struct Append;

/// Repeat dimensions before inner dimensions, the whole inner expression is repeated `m` times
#[derive(Debug, Clone, Copy, Default)]
pub struct Prepend;

impl Orientation for Append {
    const APPEND: bool = true;
    const NAME: &'static str = "rep_r";
}

impl Orientation for Prepend {
    const APPEND: bool = false;
    const NAME: &'static str = "rep_l";
}

// generators have no positions, the repeat counts alone give the shape
fn read_repeated<E: Expr, O: Orientation>(inner: &E, m: usize, i: usize) -> E::Elem {
    if E::TRAITS.is_generator {
        inner.read_flat(i)
    } else if O::APPEND {
        inner.read_flat(i / m)
    } else {
        inner.read_flat(i % inner.size())
    }
}

fn read_repeated_at<E: Expr, O: Orientation>(inner: &E, repeats: usize, index: &[usize]) -> E::Elem {
    if O::APPEND {
        inner.read_at(&index[..index.len() - repeats])
    } else {
        inner.read_at(&index[repeats..])
    }
}

fn repeated_dim<E: Expr, O: Orientation>(inner: &E, reps: &[usize], d: usize) -> usize {
    let n = inner.dimensions();
    if O::APPEND {
        if d < n {
            inner.dim(d)
        } else {
            reps[d - n]
        }
    } else if d < reps.len() {
        reps[d]
    } else {
        inner.dim(d - reps.len())
    }
}

/// Repeat with counts `R` known at compile time
#[derive(Debug, Clone)]
pub struct Repeat<E, R, O> {
    inner: E,
    counts: PhantomData<(R, O)>,
}

/// Append dimensions `R` after `e`'s dimensions
pub fn rep_append<R: ConstShape, E: Expr>(e: E) -> Repeat<E, R, Append> {
    Repeat {
        inner: e,
        counts: PhantomData,
    }
}

/// Prepend dimensions `R` before `e`'s dimensions
pub fn rep_prepend<R: ConstShape, E: Expr>(e: E) -> Repeat<E, R, Prepend> {
    Repeat {
        inner: e,
        counts: PhantomData,
    }
}

impl<E: Expr, R: ConstShape, O: Orientation> Repeat<E, R, O> {
    // flat reads of inner are only meaningful when they follow row major coordinates
    fn read_virtual(&self, i: usize) -> E::Elem {
        if self.inner.storage_order() == Order::RowMajor {
            read_repeated::<E, O>(&self.inner, R::NUMEL, i)
        } else {
            let dims = self.shape();
            let mut index = vec![0; dims.rank()];
            shape::unravel(dims.as_slice(), i, Order::RowMajor, &mut index);
            self.read_at(&index)
        }
    }
}

impl<E: Expr, R: ConstShape, O: Orientation> Expr for Repeat<E, R, O> {
    type Elem = E::Elem;
    const TRAITS: Traits = Traits {
        is_fast: E::TRAITS.is_fast,
        is_transformer: true,
        needs_temporary_visitor: E::TRAITS.needs_temporary_visitor,
        ..Traits::NONE
    };

    fn dimensions(&self) -> usize {
        self.inner.dimensions() + R::RANK
    }

    fn dim(&self, d: usize) -> usize {
        repeated_dim::<E, O>(&self.inner, R::DIMS, d)
    }

    fn vectorizable(_: VectorMode) -> bool {
        false
    }

    fn read_flat(&self, i: usize) -> Self::Elem {
        self.read_virtual(i)
    }

    fn read_at(&self, index: &[usize]) -> Self::Elem {
        read_repeated_at::<E, O>(&self.inner, R::RANK, index)
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

impl<E: FastExpr, R: ConstShape, O: Orientation> FastExpr for Repeat<E, R, O> {
    const DIMENSIONS: usize = E::DIMENSIONS + R::RANK;
    const SIZE: usize = if E::TRAITS.is_generator {
        R::NUMEL
    } else {
        E::SIZE * R::NUMEL
    };

    fn fast_dim(d: usize) -> usize {
        if O::APPEND {
            if d < E::DIMENSIONS {
                E::fast_dim(d)
            } else {
                R::DIMS[d - E::DIMENSIONS]
            }
        } else if d < R::RANK {
            R::DIMS[d]
        } else {
            E::fast_dim(d - R::RANK)
        }
    }
}

impl<E: core::fmt::Display, R: ConstShape, O: Orientation> core::fmt::Display for Repeat<E, R, O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!(
            "{}{}({})",
            O::NAME,
            Shape::from(R::DIMS),
            self.inner
        ))
    }
}

/// Repeat with counts known at runtime
#[derive(Debug, Clone)]
pub struct DynRepeat<E, O> {
    inner: E,
    reps: Shape,
    // product of reps
    m: usize,
    orientation: PhantomData<O>,
}

fn dyn_repeat<E: Expr, O: Orientation>(
    e: E,
    reps: impl Into<Shape>,
) -> Result<DynRepeat<E, O>, LazetError> {
    let reps = reps.into();
    let m = reps.checked_numel()?;
    m.checked_mul(e.size()).ok_or_else(|| {
        LazetError::overflow(format!("repeat {reps} of expression with {} elements", e.size()))
    })?;
    Ok(DynRepeat {
        inner: e,
        reps,
        m,
        orientation: PhantomData,
    })
}

/// Append dimensions `reps` after `e`'s dimensions.
///
/// Fails with [`LazetError::Overflow`] if the virtual size does not fit into `usize`.
pub fn rep_append_dyn<E: Expr>(
    e: E,
    reps: impl Into<Shape>,
) -> Result<DynRepeat<E, Append>, LazetError> {
    dyn_repeat(e, reps)
}

/// Prepend dimensions `reps` before `e`'s dimensions.
///
/// Fails with [`LazetError::Overflow`] if the virtual size does not fit into `usize`.
pub fn rep_prepend_dyn<E: Expr>(
    e: E,
    reps: impl Into<Shape>,
) -> Result<DynRepeat<E, Prepend>, LazetError> {
    dyn_repeat(e, reps)
}

impl<E: Expr, O: Orientation> DynRepeat<E, O> {
    /// Repeat counts
    #[must_use]
    pub fn repeats(&self) -> &Shape {
        &self.reps
    }
}

impl<E: Expr, O: Orientation> Expr for DynRepeat<E, O> {
    type Elem = E::Elem;
    const TRAITS: Traits = Traits {
        is_transformer: true,
        needs_temporary_visitor: E::TRAITS.needs_temporary_visitor,
        ..Traits::NONE
    };

    fn dimensions(&self) -> usize {
        self.inner.dimensions() + self.reps.rank()
    }

    fn dim(&self, d: usize) -> usize {
        repeated_dim::<E, O>(&self.inner, self.reps.as_slice(), d)
    }

    fn size(&self) -> usize {
        if E::TRAITS.is_generator {
            self.m
        } else {
            self.inner.size() * self.m
        }
    }

    fn vectorizable(_: VectorMode) -> bool {
        false
    }

    fn read_flat(&self, i: usize) -> Self::Elem {
        if self.inner.storage_order() == Order::RowMajor {
            read_repeated::<E, O>(&self.inner, self.m, i)
        } else {
            let dims = self.shape();
            let mut index = vec![0; dims.rank()];
            shape::unravel(dims.as_slice(), i, Order::RowMajor, &mut index);
            self.read_at(&index)
        }
    }

    fn read_at(&self, index: &[usize]) -> Self::Elem {
        read_repeated_at::<E, O>(&self.inner, self.reps.rank(), index)
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

impl<E: core::fmt::Display, O: Orientation> core::fmt::Display for DynRepeat<E, O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{}{}({})", O::NAME, self.reps, self.inner))
    }
}
