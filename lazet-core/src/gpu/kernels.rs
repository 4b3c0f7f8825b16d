//! Offloaded operator kernels.
//!
//! Each launch makes its inputs current on the device, provisions the output,
//! holds descriptors only around the call that needs them and marks the output
//! as written on device right after the launch, before any descriptor is released.

use alloc::rc::Rc;

use crate::{
    counters,
    error::LazetError,
    scalar::Scalar,
    storage::{Region, Storage},
};

use super::{
    descriptor::Descriptor, Accelerator, ConvolutionParams, DeviceBufferId, PoolingParams,
    TensorArg,
};

/// Row major operand backed by contiguous storage
pub(crate) struct Operand<'a, T> {
    pub(crate) storage: &'a Storage<T>,
    pub(crate) region: Region,
    pub(crate) dims: &'a [usize],
}

impl<T: Scalar> Operand<'_, T> {
    fn upload(&self, device: &Rc<dyn Accelerator>) -> Result<Slice<'_>, LazetError> {
        let buffer = self.storage.ensure_device_up_to_date(device)?;
        Ok(self.slice(buffer))
    }

    // Writes covering whole storage need no upload, partial ones keep the rest
    fn provision(&self, device: &Rc<dyn Accelerator>) -> Result<Slice<'_>, LazetError> {
        let buffer = if self.region == self.storage.region() {
            self.storage.ensure_device_allocated(device)?
        } else {
            self.storage.ensure_device_up_to_date(device)?
        };
        Ok(self.slice(buffer))
    }

    fn slice(&self, buffer: DeviceBufferId) -> Slice<'_> {
        Slice {
            buffer,
            offset: self.region.start * T::byte_size(),
            dims: self.dims,
        }
    }
}

#[derive(Clone, Copy)]
struct Slice<'a> {
    buffer: DeviceBufferId,
    offset: usize,
    dims: &'a [usize],
}

impl<'a> Slice<'a> {
    fn index(&self, i: usize, byte_size: usize) -> Slice<'a> {
        let inner = &self.dims[1..];
        Slice {
            buffer: self.buffer,
            offset: self.offset + i * inner.iter().product::<usize>() * byte_size,
            dims: inner,
        }
    }

    fn arg(&self, descriptor: &Descriptor<'_>) -> Result<TensorArg, LazetError> {
        Ok(TensorArg {
            descriptor: descriptor.get()?,
            buffer: self.buffer,
            offset: self.offset,
        })
    }
}

/// Pool `x` into `y` on `device`
pub(crate) fn pooling_forward<T: Scalar>(
    device: &Rc<dyn Accelerator>,
    params: &PoolingParams,
    x: &Operand<'_, T>,
    y: &Operand<'_, T>,
) -> Result<(), LazetError> {
    let xs = x.upload(device)?;
    let ys = y.provision(device)?;
    let pooling = Descriptor::pooling(&**device, params)?;
    pool_slices(&**device, &pooling, y.storage, xs, ys)?;
    pooling.release()?;
    Ok(())
}

// One launch per slice of leading dimension until rank fits a tensor descriptor.
// Output storage is marked device written as soon as any launch succeeds.
// TODO: batch slices into one launch once batched descriptor semantics are verified.
fn pool_slices<T: Scalar>(
    device: &dyn Accelerator,
    pooling: &Descriptor<'_>,
    output: &Storage<T>,
    x: Slice<'_>,
    y: Slice<'_>,
) -> Result<(), LazetError> {
    let dtype = T::dtype();
    if x.dims.len() > 4 {
        for i in 0..x.dims[0] {
            pool_slices(
                device,
                pooling,
                output,
                x.index(i, dtype.byte_size()),
                y.index(i, dtype.byte_size()),
            )?;
        }
        return Ok(());
    }
    let x_desc = Descriptor::tensor(device, dtype, x.dims)?;
    let y_desc = Descriptor::tensor(device, dtype, y.dims)?;
    log::debug!("Launching pooling {:?} -> {:?} on {}", x.dims, y.dims, device.name());
    device.pooling_forward(pooling.get()?, x.arg(&x_desc)?, y.arg(&y_desc)?)?;
    output.device_written();
    counters::increment("gpu:launch");
    x_desc.release()?;
    y_desc.release()?;
    Ok(())
}

/// Convolve every plane of `x` with 2D filter `w` into `y` on `device`.
/// Leading dimensions are folded into the batch.
pub(crate) fn convolution_forward<T: Scalar>(
    device: &Rc<dyn Accelerator>,
    params: &ConvolutionParams,
    x: &Operand<'_, T>,
    w: &Operand<'_, T>,
    y: &Operand<'_, T>,
) -> Result<(), LazetError> {
    let xs = x.upload(device)?;
    let ws = w.upload(device)?;
    let ys = y.provision(device)?;
    let dtype = T::dtype();
    let x_desc = Descriptor::tensor(&**device, dtype, &fold_batch(x.dims))?;
    let w_desc = Descriptor::filter(&**device, dtype, w.dims)?;
    let y_desc = Descriptor::tensor(&**device, dtype, &fold_batch(y.dims))?;
    log::debug!(
        "Launching convolution {:?} * {:?} -> {:?} on {}",
        x.dims,
        w.dims,
        y.dims,
        device.name()
    );
    device.convolution_forward(params, xs.arg(&x_desc)?, ws.arg(&w_desc)?, ys.arg(&y_desc)?)?;
    y.storage.device_written();
    counters::increment("gpu:launch");
    x_desc.release()?;
    w_desc.release()?;
    y_desc.release()?;
    Ok(())
}

fn fold_batch(dims: &[usize]) -> [usize; 4] {
    let (planes, rows, cols) = match *dims {
        [.., r, c] => (dims[..dims.len() - 2].iter().product::<usize>(), r, c),
        [c] => (1, 1, c),
        [] => (1, 1, 1),
    };
    [planes, 1, rows, cols]
}

#[cfg(test)]
mod tests {
    use super::fold_batch;

    #[test]
    fn leading_dims_fold_into_batch() {
        assert_eq!(fold_batch(&[5, 6]), [1, 1, 5, 6]);
        assert_eq!(fold_batch(&[2, 3, 5, 6]), [6, 1, 5, 6]);
        assert_eq!(fold_batch(&[2, 2, 2, 5, 6]), [8, 1, 5, 6]);
    }
}
