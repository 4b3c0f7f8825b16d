use crate::error::LazetError;

/// Order in which elements of a container are laid out in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Last dimension is contiguous
    #[default]
    RowMajor,
    /// First dimension is contiguous
    ColumnMajor,
}

/// Memory offset of coordinate `index` in container with extents `dims`
#[must_use]
pub fn offset(dims: &[usize], index: &[usize], order: Order) -> usize {
    debug_assert_eq!(index.len(), dims.len(), "coordinate rank differs from shape {dims:?}");
    let mut offset = 0;
    match order {
        Order::RowMajor => {
            for (i, d) in index.iter().zip(dims) {
                offset = offset * d + i;
            }
        }
        Order::ColumnMajor => {
            for (i, d) in index.iter().zip(dims).rev() {
                offset = offset * d + i;
            }
        }
    }
    offset
}

/// Coordinate of memory offset `flat` in container with extents `dims`
pub fn unravel(dims: &[usize], mut flat: usize, order: Order, index: &mut [usize]) {
    match order {
        Order::RowMajor => {
            for (i, d) in index.iter_mut().zip(dims).rev() {
                *i = flat % d;
                flat /= d;
            }
        }
        Order::ColumnMajor => {
            for (i, d) in index.iter_mut().zip(dims) {
                *i = flat % d;
                flat /= d;
            }
        }
    }
}

/// Runtime shape, ordered extents of each dimension
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Shape(Box<[usize]>);

impl Shape {
    /// Get shape's rank
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.0.len()
    }

    /// Get number of elements in tensor with this shape
    /// (a product of it's dimensions).
    #[must_use]
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    /// Number of elements, or overflow error if it does not fit into usize
    pub fn checked_numel(&self) -> Result<usize, LazetError> {
        self.0
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(*d))
            .ok_or_else(|| LazetError::overflow(format!("numel of shape {self}")))
    }

    /// Iter
    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.into_iter()
    }

    /// Dimensions as slice
    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Get shape's strides for given storage order
    #[must_use]
    pub fn strides(&self, order: Order) -> Box<[usize]> {
        let mut strides = vec![0; self.rank()].into_boxed_slice();
        let mut a = 1;
        match order {
            Order::RowMajor => {
                for (s, d) in strides.iter_mut().zip(self.0.iter()).rev() {
                    *s = a;
                    a *= d;
                }
            }
            Order::ColumnMajor => {
                for (s, d) in strides.iter_mut().zip(self.0.iter()) {
                    *s = a;
                    a *= d;
                }
            }
        }
        strides
    }

    /// Memory offset of coordinate `index`
    #[must_use]
    pub fn offset(&self, index: &[usize], order: Order) -> usize {
        offset(&self.0, index, order)
    }

    /// Coordinate of memory offset `flat`, inverse of [`Shape::offset`]
    pub fn unravel(&self, flat: usize, order: Order, index: &mut [usize]) {
        unravel(&self.0, flat, order, index);
    }
}

impl core::ops::Index<usize> for Shape {
    type Output = usize;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(value: Vec<usize>) -> Self {
        Shape(value.into_boxed_slice())
    }
}

impl From<&[usize]> for Shape {
    fn from(value: &[usize]) -> Self {
        Shape(value.iter().copied().collect())
    }
}

impl From<usize> for Shape {
    fn from(value: usize) -> Self {
        Shape(Box::new([value]))
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(value: [usize; N]) -> Self {
        Shape(value.into_iter().collect())
    }
}

impl FromIterator<usize> for Shape {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Shape(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Shape {
    type IntoIter = <&'a [usize] as IntoIterator>::IntoIter;
    type Item = &'a usize;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl core::fmt::Display for Shape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{:?}", self.0))
    }
}

/// Shape known at compile time.
///
/// Implemented by [`Sh1`] to [`Sh4`], the extents are const generic parameters.
pub trait ConstShape: Copy + Default + core::fmt::Debug + 'static {
    /// Number of dimensions
    const RANK: usize;
    /// Number of elements
    const NUMEL: usize;
    /// Extents
    const DIMS: &'static [usize];

    /// Runtime copy of this shape
    #[must_use]
    fn shape() -> Shape {
        Shape::from(Self::DIMS)
    }
}

/// Compile time shape with one dimension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sh1<const D0: usize>;

/// Compile time shape with two dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sh2<const D0: usize, const D1: usize>;

/// Compile time shape with three dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sh3<const D0: usize, const D1: usize, const D2: usize>;

/// Compile time shape with four dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sh4<const D0: usize, const D1: usize, const D2: usize, const D3: usize>;

impl<const D0: usize> ConstShape for Sh1<D0> {
    const RANK: usize = 1;
    const NUMEL: usize = D0;
    const DIMS: &'static [usize] = &[D0];
}

impl<const D0: usize, const D1: usize> ConstShape for Sh2<D0, D1> {
    const RANK: usize = 2;
    const NUMEL: usize = D0 * D1;
    const DIMS: &'static [usize] = &[D0, D1];
}

impl<const D0: usize, const D1: usize, const D2: usize> ConstShape for Sh3<D0, D1, D2> {
    const RANK: usize = 3;
    const NUMEL: usize = D0 * D1 * D2;
    const DIMS: &'static [usize] = &[D0, D1, D2];
}

impl<const D0: usize, const D1: usize, const D2: usize, const D3: usize> ConstShape
    for Sh4<D0, D1, D2, D3>
{
    const RANK: usize = 4;
    const NUMEL: usize = D0 * D1 * D2 * D3;
    const DIMS: &'static [usize] = &[D0, D1, D2, D3];
}
