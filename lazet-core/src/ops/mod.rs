//! Operators computed through temporaries.

use core::cell::Ref;

use crate::{
    container::Container,
    error::LazetError,
    gpu::kernels::Operand,
    scalar::Scalar,
    shape::{self, Order},
    traits::Expr,
};

mod conv;
mod matmul;
mod pooling;
mod transpose;

pub use conv::{conv_2d, conv_2d_valid, Conv2Op};
pub use matmul::{matmul, MatMulOp};
pub use pooling::{avg_pool_2d, max_pool_2d, pool_2d, PoolOp};
pub use transpose::{transpose, TransposeOp};

/// Host values of an operand in row major order
enum HostData<'a, T> {
    Borrowed(Ref<'a, [T]>),
    Owned(Vec<T>),
}

impl<T> core::ops::Deref for HostData<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            HostData::Borrowed(data) => data,
            HostData::Owned(data) => data,
        }
    }
}

/// Borrow contiguous row major operands, gather everything else
fn row_major<E: Expr>(e: &E) -> Result<HostData<'_, E::Elem>, LazetError> {
    e.sync_host()?;
    if e.storage_order() == Order::RowMajor {
        if let Some((storage, region)) = e.direct() {
            return Ok(HostData::Borrowed(Ref::map(storage.read(), |data| {
                &data[region.start..region.end]
            })));
        }
    }
    let dims = e.shape();
    let mut index = vec![0; dims.rank()];
    let mut values = Vec::with_capacity(dims.numel());
    for i in 0..dims.numel() {
        shape::unravel(dims.as_slice(), i, Order::RowMajor, &mut index);
        values.push(e.read_at(&index));
    }
    Ok(HostData::Owned(values))
}

/// Run `f` on a row major output buffer of shape `dims` and store it into `dest`
fn with_output<C: Container>(
    dest: &C,
    dims: &[usize],
    f: impl FnOnce(&mut [C::Elem]),
) -> Result<(), LazetError> {
    match dest.storage_order() {
        Order::RowMajor => {
            let mut out = dest.write()?;
            f(&mut out[..]);
        }
        Order::ColumnMajor => {
            let n = dims.iter().product::<usize>();
            let mut values = vec![<C::Elem as Scalar>::zero(); n];
            f(values.as_mut_slice());
            let mut out = dest.write()?;
            let mut index = vec![0; dims.len()];
            for (i, x) in values.into_iter().enumerate() {
                shape::unravel(dims, i, Order::RowMajor, &mut index);
                out[shape::offset(dims, &index, Order::ColumnMajor)] = x;
            }
        }
    }
    Ok(())
}

fn check_rank<E: Expr>(desc: &str, e: &E, min: usize, max: usize) -> Result<(), LazetError> {
    let rank = e.dimensions();
    if rank < min || rank > max {
        return Err(LazetError::shape_error(format!(
            "{desc} does not support operand of shape {}",
            e.shape()
        )));
    }
    Ok(())
}

/// Memory of `e` usable by device kernels, only contiguous row major operands qualify
fn device_operand<'a, E: Expr>(e: &'a E, dims: &'a [usize]) -> Option<Operand<'a, E::Elem>> {
    if e.storage_order() != Order::RowMajor {
        return None;
    }
    e.direct().map(|(storage, region)| Operand {
        storage,
        region,
        dims,
    })
}
