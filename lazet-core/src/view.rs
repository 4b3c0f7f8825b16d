use crate::{
    config::VectorMode,
    container::Container,
    error::LazetError,
    pack::Pack,
    shape::{self, Order, Shape},
    storage::{Region, Storage},
    traits::{Expr, Traits},
};

/// Slice `index` of the leading dimension of an expression
#[derive(Debug, Clone)]
pub struct SubView<E> {
    inner: E,
    index: usize,
    dims: Shape,
}

/// View of slice `i` of `e`'s leading dimension
pub fn sub<E: Expr>(e: E, i: usize) -> Result<SubView<E>, LazetError> {
    let shape = e.shape();
    if shape.rank() == 0 || i >= shape[0] {
        return Err(LazetError::shape_error(format!(
            "slice {i} of shape {shape}"
        )));
    }
    Ok(SubView {
        dims: shape.iter().skip(1).copied().collect(),
        inner: e,
        index: i,
    })
}

impl<E: Expr> SubView<E> {
    fn slice_size(&self) -> usize {
        self.dims.numel()
    }

    fn full_index(&self, index: &[usize]) -> Vec<usize> {
        let mut full = Vec::with_capacity(index.len() + 1);
        full.push(self.index);
        full.extend_from_slice(index);
        full
    }

    fn narrow(&self, region: Region) -> Region {
        let start = region.start + self.index * self.slice_size();
        Region {
            start,
            end: start + self.slice_size(),
            ..region
        }
    }
}

impl<E: Expr> Expr for SubView<E> {
    type Elem = E::Elem;
    const TRAITS: Traits = Traits {
        is_view: true,
        is_linear: E::TRAITS.is_linear,
        is_direct: E::TRAITS.is_direct,
        needs_temporary_visitor: E::TRAITS.needs_temporary_visitor,
        ..Traits::NONE
    };

    fn dimensions(&self) -> usize {
        self.dims.rank()
    }

    fn dim(&self, d: usize) -> usize {
        self.dims[d]
    }

    fn shape(&self) -> Shape {
        self.dims.clone()
    }

    fn storage_order(&self) -> Order {
        self.inner.storage_order()
    }

    fn vectorizable(mode: VectorMode) -> bool {
        E::vectorizable(mode)
    }

    fn read_flat(&self, i: usize) -> Self::Elem {
        match self.inner.storage_order() {
            Order::RowMajor => self.inner.read_flat(self.index * self.slice_size() + i),
            Order::ColumnMajor => {
                let mut index = vec![0; self.dims.rank()];
                shape::unravel(self.dims.as_slice(), i, Order::ColumnMajor, &mut index);
                self.inner.read_at(&self.full_index(&index))
            }
        }
    }

    fn read_at(&self, index: &[usize]) -> Self::Elem {
        self.inner.read_at(&self.full_index(index))
    }

    fn load<const W: usize>(&self, i: usize) -> Pack<Self::Elem, W> {
        match self.inner.storage_order() {
            Order::RowMajor => self.inner.load::<W>(self.index * self.slice_size() + i),
            Order::ColumnMajor => Pack::from_fn(|k| self.read_flat(i + k)),
        }
    }

    fn alias(&self, region: &Region) -> bool {
        self.inner.alias(region)
    }

    // Only row major slices are contiguous
    fn direct(&self) -> Option<(&Storage<Self::Elem>, Region)> {
        if self.inner.storage_order() != Order::RowMajor {
            return None;
        }
        self.inner
            .direct()
            .map(|(storage, region)| (storage, self.narrow(region)))
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

impl<C: Container> Container for SubView<C> {
    fn storage(&self) -> &Storage<Self::Elem> {
        self.inner.storage()
    }

    fn region(&self) -> Region {
        match self.inner.storage_order() {
            Order::RowMajor => self.narrow(self.inner.region()),
            Order::ColumnMajor => self.inner.region(),
        }
    }
}

impl<E: core::fmt::Display> core::fmt::Display for SubView<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("sub({}, {})", self.inner, self.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{container::DynMatrix, container::Assign, generator::scalar};

    #[test]
    fn rows_of_row_major() -> Result<(), LazetError> {
        let m = DynMatrix::from_vec([3, 2], vec![1, 2, 3, 4, 5, 6])?;
        let row = sub(&m, 1)?;
        assert_eq!(row.shape(), Shape::from([2]));
        assert_eq!(row.read_flat(1), 4);
        assert_eq!(row.direct().map(|(_, r)| (r.start, r.end)), Some((2, 4)));
        Ok(())
    }

    #[test]
    fn column_major_slice_is_not_direct() -> Result<(), LazetError> {
        let m = DynMatrix::from_vec_ordered([2, 3], vec![1, 4, 2, 5, 3, 6], Order::ColumnMajor)?;
        let row = sub(&m, 1)?;
        assert_eq!(row.read_flat(2), 6);
        assert!(row.direct().is_none());
        Ok(())
    }

    #[test]
    fn assign_into_row() -> Result<(), LazetError> {
        let m = DynMatrix::from_vec([2, 2], vec![1, 2, 3, 4])?;
        sub(m.clone(), 0)?.assign(scalar(9))?;
        assert_eq!(m.to_vec()?, [9, 9, 3, 4]);
        Ok(())
    }

    #[test]
    fn out_of_range_slice() -> Result<(), LazetError> {
        let m = DynMatrix::<f32>::zeros([2, 2])?;
        assert!(sub(&m, 2).is_err());
        Ok(())
    }
}
