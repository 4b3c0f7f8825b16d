//! Dense value containers.
//!
//! Containers are handles, cloning one shares its storage.

use core::cell::RefMut;
use core::marker::PhantomData;

use crate::{
    config::VectorMode,
    error::LazetError,
    evaluate,
    pack::Pack,
    scalar::Scalar,
    shape::{self, ConstShape, Order, Shape},
    storage::{Region, Storage},
    traits::{Expr, FastExpr, Traits},
};

/// Expression backed by a region of storage that can be written to
pub trait Container: Expr {
    /// Storage holding the values
    fn storage(&self) -> &Storage<Self::Elem>;

    /// Memory this container occupies
    fn region(&self) -> Region;

    /// Borrow values for writing, in storage order
    fn write(&self) -> Result<RefMut<'_, [Self::Elem]>, LazetError> {
        let (storage, region) = self.direct().ok_or_else(|| {
            LazetError::shape_error(format!("destination {} is not contiguous", self.shape()))
        })?;
        storage.write_region(region)
    }
}

/// Container that temporaries can allocate as their result
pub trait ResultBuffer: Container + Sized {
    /// New zeroed buffer
    fn allocate(shape: &Shape, order: Order) -> Result<Self, LazetError>;
}

/// Evaluation of expressions into containers
pub trait Assign: Container + Sized {
    /// `self = expr`
    fn assign<E: Expr<Elem = Self::Elem>>(&self, expr: E) -> Result<(), LazetError> {
        evaluate::assign(self, expr)
    }

    /// `self += expr`
    fn assign_add<E: Expr<Elem = Self::Elem>>(&self, expr: E) -> Result<(), LazetError> {
        evaluate::assign_add(self, expr)
    }

    /// `self -= expr`
    fn assign_sub<E: Expr<Elem = Self::Elem>>(&self, expr: E) -> Result<(), LazetError> {
        evaluate::assign_sub(self, expr)
    }

    /// `self *= expr`, elementwise
    fn assign_mul<E: Expr<Elem = Self::Elem>>(&self, expr: E) -> Result<(), LazetError> {
        evaluate::assign_mul(self, expr)
    }

    /// `self *= value`
    fn assign_scale(&self, value: Self::Elem) -> Result<(), LazetError> {
        evaluate::assign_scale(self, value)
    }
}

impl<C: Container> Assign for C {}

/// Matrix of any rank with shape known at runtime
#[derive(Debug, Clone)]
pub struct DynMatrix<T> {
    storage: Storage<T>,
    shape: Shape,
    order: Order,
}

impl<T: Scalar> DynMatrix<T> {
    /// Zeroed row major matrix
    pub fn zeros(shape: impl Into<Shape>) -> Result<Self, LazetError> {
        Self::zeros_ordered(shape, Order::RowMajor)
    }

    /// Zeroed matrix with given storage order
    pub fn zeros_ordered(shape: impl Into<Shape>, order: Order) -> Result<Self, LazetError> {
        let shape = shape.into();
        let storage = Storage::zeroed(shape.checked_numel()?)?;
        Ok(Self {
            storage,
            shape,
            order,
        })
    }

    /// Row major matrix with all elements set to `value`
    pub fn filled(shape: impl Into<Shape>, value: T) -> Result<Self, LazetError> {
        let m = Self::zeros(shape)?;
        m.storage.write_region(m.storage.region())?.fill(value);
        Ok(m)
    }

    /// Row major matrix from `data`
    pub fn from_vec(shape: impl Into<Shape>, data: Vec<T>) -> Result<Self, LazetError> {
        Self::from_vec_ordered(shape, data, Order::RowMajor)
    }

    /// Matrix from `data` laid out in `order`
    pub fn from_vec_ordered(
        shape: impl Into<Shape>,
        data: Vec<T>,
        order: Order,
    ) -> Result<Self, LazetError> {
        let shape = shape.into();
        if shape.checked_numel()? != data.len() {
            return Err(LazetError::shape_error(format!(
                "{} elements do not fit shape {shape}",
                data.len()
            )));
        }
        Ok(Self {
            storage: Storage::from_vec(data),
            shape,
            order,
        })
    }

    /// Values in storage order
    pub fn to_vec(&self) -> Result<Vec<T>, LazetError> {
        self.storage.to_vec()
    }

    /// Element at `index`
    pub fn get(&self, index: &[usize]) -> Result<T, LazetError> {
        if index.len() != self.shape.rank() || index.iter().zip(&self.shape).any(|(i, d)| i >= d)
        {
            return Err(LazetError::shape_error(format!(
                "index {index:?} out of shape {}",
                self.shape
            )));
        }
        self.storage.ensure_host_up_to_date()?;
        Ok(self.read_at(index))
    }

    /// Copy with its own storage
    pub fn deep_clone(&self) -> Result<Self, LazetError> {
        Ok(Self {
            storage: Storage::from_vec(self.to_vec()?),
            shape: self.shape.clone(),
            order: self.order,
        })
    }
}

impl<T: Scalar> Expr for DynMatrix<T> {
    type Elem = T;
    const TRAITS: Traits = Traits::VALUE;

    fn dimensions(&self) -> usize {
        self.shape.rank()
    }

    fn dim(&self, d: usize) -> usize {
        self.shape[d]
    }

    fn size(&self) -> usize {
        self.storage.len()
    }

    fn shape(&self) -> Shape {
        self.shape.clone()
    }

    fn storage_order(&self) -> Order {
        self.order
    }

    fn vectorizable(_: VectorMode) -> bool {
        true
    }

    fn read_flat(&self, i: usize) -> T {
        self.storage.read()[i]
    }

    fn read_at(&self, index: &[usize]) -> T {
        self.storage.read()[self.shape.offset(index, self.order)]
    }

    fn load<const W: usize>(&self, i: usize) -> Pack<T, W> {
        Pack::load(&self.storage.read()[i..])
    }

    fn alias(&self, region: &Region) -> bool {
        self.storage.region().aliases(region)
    }

    fn direct(&self) -> Option<(&Storage<T>, Region)> {
        Some((&self.storage, self.storage.region()))
    }

    fn sync_host(&self) -> Result<(), LazetError> {
        self.storage.ensure_host_up_to_date()
    }
}

impl<T: Scalar> Container for DynMatrix<T> {
    fn storage(&self) -> &Storage<T> {
        &self.storage
    }

    fn region(&self) -> Region {
        self.storage.region()
    }
}

impl<T: Scalar> ResultBuffer for DynMatrix<T> {
    fn allocate(shape: &Shape, order: Order) -> Result<Self, LazetError> {
        Self::zeros_ordered(shape.clone(), order)
    }
}

impl<T: Scalar> core::fmt::Display for DynMatrix<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("dyn_matrix{}", self.shape))
    }
}

/// Matrix with shape `S` known at compile time
#[derive(Debug)]
pub struct FastMatrix<T, S> {
    storage: Storage<T>,
    order: Order,
    shape: PhantomData<S>,
}

impl<T, S> Clone for FastMatrix<T, S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            order: self.order,
            shape: PhantomData,
        }
    }
}

impl<T: Scalar, S: ConstShape> FastMatrix<T, S> {
    /// Zeroed row major matrix
    pub fn zeros() -> Result<Self, LazetError> {
        Self::zeros_ordered(Order::RowMajor)
    }

    /// Zeroed matrix with given storage order
    pub fn zeros_ordered(order: Order) -> Result<Self, LazetError> {
        Ok(Self {
            storage: Storage::zeroed(S::NUMEL)?,
            order,
            shape: PhantomData,
        })
    }

    /// Row major matrix with all elements set to `value`
    pub fn filled(value: T) -> Result<Self, LazetError> {
        let m = Self::zeros()?;
        m.storage.write_region(m.storage.region())?.fill(value);
        Ok(m)
    }

    /// Row major matrix from `data`
    pub fn from_vec(data: Vec<T>) -> Result<Self, LazetError> {
        if data.len() != S::NUMEL {
            return Err(LazetError::shape_error(format!(
                "{} elements do not fit shape {:?}",
                data.len(),
                S::DIMS
            )));
        }
        Ok(Self {
            storage: Storage::from_vec(data),
            order: Order::RowMajor,
            shape: PhantomData,
        })
    }

    /// Values in storage order
    pub fn to_vec(&self) -> Result<Vec<T>, LazetError> {
        self.storage.to_vec()
    }
}

impl<T: Scalar, S: ConstShape> Expr for FastMatrix<T, S> {
    type Elem = T;
    const TRAITS: Traits = Traits {
        is_fast: true,
        ..Traits::VALUE
    };

    fn dimensions(&self) -> usize {
        S::RANK
    }

    fn dim(&self, d: usize) -> usize {
        S::DIMS[d]
    }

    fn size(&self) -> usize {
        S::NUMEL
    }

    fn storage_order(&self) -> Order {
        self.order
    }

    fn vectorizable(_: VectorMode) -> bool {
        true
    }

    fn read_flat(&self, i: usize) -> T {
        self.storage.read()[i]
    }

    fn read_at(&self, index: &[usize]) -> T {
        self.storage.read()[shape::offset(S::DIMS, index, self.order)]
    }

    fn load<const W: usize>(&self, i: usize) -> Pack<T, W> {
        Pack::load(&self.storage.read()[i..])
    }

    fn alias(&self, region: &Region) -> bool {
        self.storage.region().aliases(region)
    }

    fn direct(&self) -> Option<(&Storage<T>, Region)> {
        Some((&self.storage, self.storage.region()))
    }

    fn sync_host(&self) -> Result<(), LazetError> {
        self.storage.ensure_host_up_to_date()
    }
}

impl<T: Scalar, S: ConstShape> FastExpr for FastMatrix<T, S> {
    const DIMENSIONS: usize = S::RANK;
    const SIZE: usize = S::NUMEL;

    fn fast_dim(d: usize) -> usize {
        S::DIMS[d]
    }
}

impl<T: Scalar, S: ConstShape> Container for FastMatrix<T, S> {
    fn storage(&self) -> &Storage<T> {
        &self.storage
    }

    fn region(&self) -> Region {
        self.storage.region()
    }
}

impl<T: Scalar, S: ConstShape> ResultBuffer for FastMatrix<T, S> {
    fn allocate(shape: &Shape, order: Order) -> Result<Self, LazetError> {
        if shape.as_slice() != S::DIMS {
            return Err(LazetError::shape_error(format!(
                "result of shape {shape} does not fit {:?}",
                S::DIMS
            )));
        }
        Self::zeros_ordered(order)
    }
}

impl<T: Scalar, S: ConstShape> core::fmt::Display for FastMatrix<T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("fast_matrix{:?}", S::DIMS))
    }
}
