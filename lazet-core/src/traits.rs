//! Static description of expression nodes.
//!
//! Every node carries a [`Traits`] constant, computed from its children in const context,
//! and implements [`Expr`]. Nodes whose whole shape is known at compile time additionally
//! implement [`FastExpr`], so their extents can be queried without an instance.

use core::marker::PhantomData;

use crate::{
    config::VectorMode,
    container::Container,
    error::LazetError,
    pack::Pack,
    scalar::Scalar,
    shape::{Order, Shape},
    storage::{Region, Storage},
};

/// Flags describing how a node may be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Traits {
    /// All dimensions are compile time constants
    pub is_fast: bool,
    /// Value at flat index does not depend on the order of access
    pub is_linear: bool,
    /// Node owns storage
    pub is_value: bool,
    /// Values are computed on demand, node has no shape
    pub is_generator: bool,
    /// Node reads another node's storage through an index transform
    pub is_view: bool,
    /// Node remaps indices of its child without storage
    pub is_transformer: bool,
    /// Node materializes its result into a buffer before it can be read
    pub is_temporary: bool,
    /// Node can expose contiguous memory
    pub is_direct: bool,
    /// Some node in this tree has temporaries to allocate and evaluate
    pub needs_temporary_visitor: bool,
}

impl Traits {
    /// No flag set
    pub const NONE: Traits = Traits {
        is_fast: false,
        is_linear: false,
        is_value: false,
        is_generator: false,
        is_view: false,
        is_transformer: false,
        is_temporary: false,
        is_direct: false,
        needs_temporary_visitor: false,
    };

    /// Traits of containers with dynamic shape
    pub const VALUE: Traits = Traits {
        is_value: true,
        is_linear: true,
        is_direct: true,
        ..Traits::NONE
    };

    /// Traits of generators, they are not linear unless they say so
    pub const GENERATOR: Traits = Traits {
        is_generator: true,
        is_fast: true,
        ..Traits::NONE
    };

    /// Node must be materialized before any element is read
    #[must_use]
    pub const fn needs_temporary(&self) -> bool {
        self.is_temporary
    }
}

/// Lazily evaluated expression.
///
/// Reads take `&self`, containers are handles with interior mutability.
/// Visitor methods with `&mut self` walk the tree and materialize temporaries,
/// they are called by [`assign`](crate::evaluate::assign) before any element is read.
pub trait Expr {
    /// Element type
    type Elem: Scalar;
    /// Static flags
    const TRAITS: Traits;

    /// Number of dimensions
    fn dimensions(&self) -> usize;

    /// Extent of dimension `d`
    fn dim(&self, d: usize) -> usize;

    /// Number of elements
    fn size(&self) -> usize {
        (0..self.dimensions()).map(|d| self.dim(d)).product()
    }

    /// Runtime shape
    fn shape(&self) -> Shape {
        (0..self.dimensions()).map(|d| self.dim(d)).collect()
    }

    /// Order in which [`Expr::read_flat`] walks elements
    fn storage_order(&self) -> Order {
        Order::RowMajor
    }

    /// Whether [`Expr::load`] is supported for vectors of given mode
    fn vectorizable(mode: VectorMode) -> bool;

    /// Element at flat index `i`, in [storage order](Expr::storage_order)
    fn read_flat(&self, i: usize) -> Self::Elem;

    /// Element at coordinate `index`
    fn read_at(&self, index: &[usize]) -> Self::Elem;

    /// `W` consecutive elements starting at flat index `i`
    fn load<const W: usize>(&self, i: usize) -> Pack<Self::Elem, W> {
        Pack::from_fn(|k| self.read_flat(i + k))
    }

    /// Whether evaluating this expression reads memory of `region`
    fn alias(&self, region: &Region) -> bool;

    /// Contiguous memory holding this expression's values, in storage order
    fn direct(&self) -> Option<(&Storage<Self::Elem>, Region)> {
        None
    }

    /// Allocate result buffers of all temporaries in this tree
    fn allocate_temporaries(&mut self) -> Result<(), LazetError> {
        Ok(())
    }

    /// Evaluate all temporaries in this tree, children first
    fn evaluate_temporaries(&mut self) -> Result<(), LazetError> {
        Ok(())
    }

    /// Make host copies of all storages this tree reads up to date
    fn sync_host(&self) -> Result<(), LazetError> {
        Ok(())
    }

    /// Evaluate directly into `dest`, skipping the node's own buffer.
    /// Returns `false` if the node can not do it.
    fn evaluate_into<C: Container<Elem = Self::Elem>>(
        &mut self,
        dest: &C,
    ) -> Result<bool, LazetError> {
        let _ = dest;
        Ok(false)
    }
}

/// Shape known at compile time
pub trait FastExpr: Expr {
    /// Number of dimensions
    const DIMENSIONS: usize;
    /// Number of elements
    const SIZE: usize;

    /// Extent of dimension `d`
    fn fast_dim(d: usize) -> usize;

    /// Extent of dimension `K`, out of range `K` does not compile
    #[must_use]
    fn dim_of<const K: usize>() -> usize
    where
        Self: Sized,
    {
        let () = DimCheck::<Self, K>::OK;
        Self::fast_dim(K)
    }
}

struct DimCheck<E, const K: usize>(PhantomData<E>);

impl<E: FastExpr, const K: usize> DimCheck<E, K> {
    const OK: () = assert!(K < E::DIMENSIONS, "dimension index out of range");
}

// References are read-only, temporaries behind them must already be evaluated.
impl<'a, E: Expr> Expr for &'a E {
    type Elem = E::Elem;
    const TRAITS: Traits = Traits {
        needs_temporary_visitor: false,
        ..E::TRAITS
    };

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn dim(&self, d: usize) -> usize {
        (**self).dim(d)
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn shape(&self) -> Shape {
        (**self).shape()
    }

    fn storage_order(&self) -> Order {
        (**self).storage_order()
    }

    fn vectorizable(mode: VectorMode) -> bool {
        E::vectorizable(mode)
    }

    fn read_flat(&self, i: usize) -> Self::Elem {
        (**self).read_flat(i)
    }

    fn read_at(&self, index: &[usize]) -> Self::Elem {
        (**self).read_at(index)
    }

    fn load<const W: usize>(&self, i: usize) -> Pack<Self::Elem, W> {
        (**self).load::<W>(i)
    }

    fn alias(&self, region: &Region) -> bool {
        (**self).alias(region)
    }

    fn direct(&self) -> Option<(&Storage<Self::Elem>, Region)> {
        (**self).direct()
    }

    fn sync_host(&self) -> Result<(), LazetError> {
        (**self).sync_host()
    }
}

impl<'a, E: FastExpr> FastExpr for &'a E {
    const DIMENSIONS: usize = E::DIMENSIONS;
    const SIZE: usize = E::SIZE;

    fn fast_dim(d: usize) -> usize {
        E::fast_dim(d)
    }
}
