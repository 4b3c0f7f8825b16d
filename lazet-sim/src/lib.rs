//! # lazet-sim
//!
//! In-process accelerator implementing [`Accelerator`]. Device memory is plain
//! host memory owned by the simulator, kernels run on the calling thread.
//! It keeps statistics of every call, so tests can observe transfers, launches
//! and descriptor lifetimes, and can be told to fail the next launch.
//!
//! ```
//! use std::rc::Rc;
//! use lazet_core::{gpu, prelude::*};
//! use lazet_sim::SimDevice;
//!
//! let device = Rc::new(SimDevice::new(1 << 20));
//! gpu::set_device(Some(device.clone()));
//! let x = DynMatrix::from_vec([2, 2], vec![1f32, 2., 3., 4.])?;
//! let y = DynMatrix::zeros([1, 1])?;
//! y.assign(max_pool_2d(&x, [2, 2], [1, 1], [0, 0])?)?;
//! assert_eq!(y.to_vec()?, [4.]);
//! assert_eq!(device.stats().launches, 1);
//! gpu::set_device(None);
//! # Ok::<(), LazetError>(())
//! ```
#![forbid(unsafe_code)]
#![forbid(missing_docs)]
#![forbid(rustdoc::broken_intra_doc_links)]
#![forbid(rustdoc::missing_crate_level_docs)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use lazet_core::{
    dtype::DType,
    error::{BackendError, ErrorStatus},
    gpu::{
        Accelerator, ConvolutionParams, DescriptorId, DeviceBufferId, FilterLayout, PoolingMode,
        PoolingParams, TensorArg, TensorLayout,
    },
};
use nanoserde::DeJson;

/// Layout of `lazet/sim.json`
#[derive(Debug, Default, DeJson)]
pub struct SimConfig {
    /// Simulator can be used
    pub enabled: bool,
    /// Device memory, defaults to 1 GiB
    pub memory_bytes: Option<usize>,
}

/// Calls made to a [`SimDevice`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Buffers allocated
    pub allocations: usize,
    /// Buffers released
    pub deallocations: usize,
    /// Host to device copies
    pub h2d: usize,
    /// Device to host copies
    pub d2h: usize,
    /// Kernels run to completion
    pub launches: usize,
    /// Descriptors created
    pub descriptors_created: usize,
    /// Descriptors destroyed
    pub descriptors_destroyed: usize,
}

#[derive(Debug, Clone, Copy)]
enum DescriptorEntry {
    Tensor(TensorLayout),
    Filter(FilterLayout),
    Pooling(PoolingParams),
}

#[derive(Debug, Default)]
struct State {
    buffers: BTreeMap<DeviceBufferId, Vec<u8>>,
    descriptors: BTreeMap<DescriptorId, DescriptorEntry>,
    next_buffer: DeviceBufferId,
    next_descriptor: DescriptorId,
    free_bytes: usize,
    stats: SimStats,
}

/// Simulated accelerator
#[derive(Debug)]
pub struct SimDevice {
    state: RefCell<State>,
    fail_next_launch: Cell<bool>,
    fail_next_destroy: Cell<bool>,
}

impl SimDevice {
    /// Device with `memory_bytes` of memory
    #[must_use]
    pub fn new(memory_bytes: usize) -> SimDevice {
        SimDevice {
            state: RefCell::new(State {
                free_bytes: memory_bytes,
                ..State::default()
            }),
            fail_next_launch: Cell::new(false),
            fail_next_destroy: Cell::new(false),
        }
    }

    /// Device configured by `lazet/sim.json` in xdg config directories
    pub fn from_config() -> Result<SimDevice, BackendError> {
        let config = lazet_core::config::find_config_file("lazet/sim.json")
            .and_then(|file| {
                SimConfig::deserialize_json(&file)
                    .map_err(|e| log::info!("Failed to parse lazet/sim.json, {e}"))
                    .ok()
            })
            .unwrap_or_default();
        if !config.enabled {
            return Err(BackendError::new(ErrorStatus::Initialization, "Configured out."));
        }
        let memory_bytes = config.memory_bytes.unwrap_or(1024 * 1024 * 1024);
        log::debug!("Using simulated accelerator with {memory_bytes} bytes");
        Ok(SimDevice::new(memory_bytes))
    }

    /// Statistics so far
    #[must_use]
    pub fn stats(&self) -> SimStats {
        self.state.borrow().stats
    }

    /// Descriptors created and not yet destroyed
    #[must_use]
    pub fn live_descriptors(&self) -> usize {
        self.state.borrow().descriptors.len()
    }

    /// Buffers allocated and not yet released
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    /// Unallocated memory
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.state.borrow().free_bytes
    }

    /// Make the next kernel launch fail with [`ErrorStatus::KernelLaunch`]
    pub fn fail_next_launch(&self) {
        self.fail_next_launch.set(true);
    }

    /// Make the next descriptor destruction fail with [`ErrorStatus::DescriptorDestruction`].
    /// The descriptor stays live.
    pub fn fail_next_destroy(&self) {
        self.fail_next_destroy.set(true);
    }

    fn create_descriptor(&self, entry: DescriptorEntry) -> DescriptorId {
        let mut state = self.state.borrow_mut();
        let id = state.next_descriptor;
        state.next_descriptor += 1;
        state.descriptors.insert(id, entry);
        state.stats.descriptors_created += 1;
        id
    }

    fn launch(&self, name: &str) -> Result<(), BackendError> {
        if self.fail_next_launch.replace(false) {
            return Err(BackendError::new(
                ErrorStatus::KernelLaunch,
                format!("{name} launch failed"),
            ));
        }
        Ok(())
    }
}

#[track_caller]
fn incorrect_arg(context: String) -> BackendError {
    BackendError::new(ErrorStatus::IncorrectKernelArg, context)
}

impl State {
    fn tensor(&self, id: DescriptorId) -> Result<TensorLayout, BackendError> {
        match self.descriptors.get(&id) {
            Some(DescriptorEntry::Tensor(layout)) => Ok(*layout),
            other => Err(incorrect_arg(format!("descriptor {id} is {other:?}, not a tensor"))),
        }
    }

    fn filter(&self, id: DescriptorId) -> Result<FilterLayout, BackendError> {
        match self.descriptors.get(&id) {
            Some(DescriptorEntry::Filter(layout)) => Ok(*layout),
            other => Err(incorrect_arg(format!("descriptor {id} is {other:?}, not a filter"))),
        }
    }

    fn pooling(&self, id: DescriptorId) -> Result<PoolingParams, BackendError> {
        match self.descriptors.get(&id) {
            Some(DescriptorEntry::Pooling(params)) => Ok(*params),
            other => Err(incorrect_arg(format!("descriptor {id} is {other:?}, not pooling"))),
        }
    }

    // Bytes of `arg` holding `numel` elements of `dtype`
    fn span(&self, arg: TensorArg, dtype: DType, numel: usize) -> Result<core::ops::Range<usize>, BackendError> {
        let buffer = self
            .buffers
            .get(&arg.buffer)
            .ok_or_else(|| incorrect_arg(format!("buffer {} does not exist", arg.buffer)))?;
        let end = arg.offset + numel * dtype.byte_size();
        if end > buffer.len() {
            return Err(incorrect_arg(format!(
                "{numel} elements of {dtype} at byte {} overflow buffer {} of {} bytes",
                arg.offset,
                arg.buffer,
                buffer.len()
            )));
        }
        Ok(arg.offset..end)
    }

    fn load(&self, arg: TensorArg, dtype: DType, numel: usize) -> Result<Vec<f64>, BackendError> {
        let span = self.span(arg, dtype, numel)?;
        let bytes = &self.buffers[&arg.buffer][span];
        bytes
            .chunks_exact(dtype.byte_size())
            .map(|chunk| decode(dtype, chunk))
            .collect()
    }

    fn store(&mut self, arg: TensorArg, dtype: DType, values: &[f64]) -> Result<(), BackendError> {
        let span = self.span(arg, dtype, values.len())?;
        let bytes = self
            .buffers
            .get_mut(&arg.buffer)
            .ok_or_else(|| incorrect_arg(format!("buffer {} does not exist", arg.buffer)))?;
        for (chunk, &x) in bytes[span].chunks_exact_mut(dtype.byte_size()).zip(values) {
            encode(dtype, x, chunk)?;
        }
        Ok(())
    }
}

fn decode(dtype: DType, bytes: &[u8]) -> Result<f64, BackendError> {
    Ok(match dtype {
        DType::F32 => f64::from(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        DType::F64 => f64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]),
        DType::I32 => f64::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        _ => return Err(incorrect_arg(format!("dtype {dtype} is not supported"))),
    })
}

fn encode(dtype: DType, x: f64, dst: &mut [u8]) -> Result<(), BackendError> {
    match dtype {
        DType::F32 => dst.copy_from_slice(&(x as f32).to_le_bytes()),
        DType::F64 => dst.copy_from_slice(&x.to_le_bytes()),
        DType::I32 => dst.copy_from_slice(&(x as i32).to_le_bytes()),
        _ => return Err(incorrect_arg(format!("dtype {dtype} is not supported"))),
    }
    Ok(())
}

impl Accelerator for SimDevice {
    fn name(&self) -> &str {
        "sim"
    }

    fn allocate(&self, bytes: usize) -> Result<DeviceBufferId, BackendError> {
        let mut state = self.state.borrow_mut();
        if state.free_bytes < bytes {
            return Err(BackendError::new(
                ErrorStatus::MemoryAllocation,
                format!("OOM, {bytes} bytes requested, {} free", state.free_bytes),
            ));
        }
        state.free_bytes -= bytes;
        let id = state.next_buffer;
        state.next_buffer += 1;
        state.buffers.insert(id, vec![0; bytes]);
        state.stats.allocations += 1;
        Ok(id)
    }

    fn deallocate(&self, buffer: DeviceBufferId) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        let bytes = state.buffers.remove(&buffer).ok_or_else(|| {
            BackendError::new(
                ErrorStatus::MemoryDeallocation,
                format!("buffer {buffer} does not exist"),
            )
        })?;
        state.free_bytes += bytes.len();
        state.stats.deallocations += 1;
        Ok(())
    }

    fn host_to_device(&self, src: &[u8], dst: DeviceBufferId) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        let buffer = state
            .buffers
            .get_mut(&dst)
            .filter(|buffer| buffer.len() >= src.len())
            .ok_or_else(|| {
                BackendError::new(
                    ErrorStatus::MemoryCopyH2D,
                    format!("{} bytes do not fit buffer {dst}", src.len()),
                )
            })?;
        buffer[..src.len()].copy_from_slice(src);
        state.stats.h2d += 1;
        Ok(())
    }

    fn device_to_host(&self, src: DeviceBufferId, dst: &mut [u8]) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        let buffer = state
            .buffers
            .get(&src)
            .filter(|buffer| buffer.len() >= dst.len())
            .ok_or_else(|| {
                BackendError::new(
                    ErrorStatus::MemoryCopyD2H,
                    format!("buffer {src} does not hold {} bytes", dst.len()),
                )
            })?;
        dst.copy_from_slice(&buffer[..dst.len()]);
        state.stats.d2h += 1;
        Ok(())
    }

    fn create_tensor_descriptor(&self, layout: &TensorLayout) -> Result<DescriptorId, BackendError> {
        Ok(self.create_descriptor(DescriptorEntry::Tensor(*layout)))
    }

    fn create_filter_descriptor(&self, layout: &FilterLayout) -> Result<DescriptorId, BackendError> {
        Ok(self.create_descriptor(DescriptorEntry::Filter(*layout)))
    }

    fn create_pooling_descriptor(&self, params: &PoolingParams) -> Result<DescriptorId, BackendError> {
        if params.window.contains(&0) || params.stride.contains(&0) {
            return Err(BackendError::new(
                ErrorStatus::DescriptorCreation,
                format!("pooling window {:?} with stride {:?}", params.window, params.stride),
            ));
        }
        Ok(self.create_descriptor(DescriptorEntry::Pooling(*params)))
    }

    fn destroy_descriptor(&self, descriptor: DescriptorId) -> Result<(), BackendError> {
        if self.fail_next_destroy.replace(false) {
            return Err(BackendError::new(
                ErrorStatus::DescriptorDestruction,
                format!("descriptor {descriptor} could not be destroyed"),
            ));
        }
        let mut state = self.state.borrow_mut();
        if state.descriptors.remove(&descriptor).is_none() {
            return Err(BackendError::new(
                ErrorStatus::DescriptorDestruction,
                format!("descriptor {descriptor} does not exist"),
            ));
        }
        state.stats.descriptors_destroyed += 1;
        Ok(())
    }

    fn pooling_forward(&self, pooling: DescriptorId, x: TensorArg, y: TensorArg) -> Result<(), BackendError> {
        self.launch("pooling")?;
        let mut state = self.state.borrow_mut();
        let params = state.pooling(pooling)?;
        let xl = state.tensor(x.descriptor)?;
        let yl = state.tensor(y.descriptor)?;
        let [n, c, h, w] = xl.dims;
        let [yn, yc, oh, ow] = yl.dims;
        if (yn, yc) != (n, c) || xl.dtype != yl.dtype {
            return Err(incorrect_arg(format!("pooling {:?} into {:?}", xl, yl)));
        }
        let input = state.load(x, xl.dtype, n * c * h * w)?;
        let mut output = vec![0.; n * c * oh * ow];
        if h * w > 0 && oh * ow > 0 {
            for (plane, out) in input.chunks(h * w).zip(output.chunks_mut(oh * ow)) {
                pool(&params, plane, out, [h, w], ow);
            }
        }
        state.store(y, yl.dtype, &output)?;
        state.stats.launches += 1;
        log::debug!("sim pooling {:?} -> {:?}", xl.dims, yl.dims);
        Ok(())
    }

    fn convolution_forward(
        &self,
        params: &ConvolutionParams,
        x: TensorArg,
        w: TensorArg,
        y: TensorArg,
    ) -> Result<(), BackendError> {
        self.launch("convolution")?;
        let mut state = self.state.borrow_mut();
        let xl = state.tensor(x.descriptor)?;
        let wl = state.filter(w.descriptor)?;
        let yl = state.tensor(y.descriptor)?;
        let [n, c, h, iw] = xl.dims;
        let [k, wc, r, s] = wl.dims;
        let [yn, yk, oh, ow] = yl.dims;
        if c != 1 || k != 1 || wc != 1 || (yn, yk) != (n, 1) {
            return Err(incorrect_arg(format!(
                "convolution of {:?} with {:?} into {:?}, only single channel is supported",
                xl.dims, wl.dims, yl.dims
            )));
        }
        let input = state.load(x, xl.dtype, n * h * iw)?;
        let filter = state.load(w, wl.dtype, r * s)?;
        let mut output = vec![0.; n * oh * ow];
        if h * iw > 0 && oh * ow > 0 {
            for (plane, out) in input.chunks(h * iw).zip(output.chunks_mut(oh * ow)) {
                convolve(params, plane, &filter, out, [h, iw], [r, s], ow);
            }
        }
        state.store(y, yl.dtype, &output)?;
        state.stats.launches += 1;
        log::debug!("sim convolution {:?} * {:?} -> {:?}", xl.dims, wl.dims, yl.dims);
        Ok(())
    }
}

fn pool(params: &PoolingParams, x: &[f64], y: &mut [f64], [h, w]: [usize; 2], ow: usize) {
    let [wh, ww] = params.window;
    let [sh, sw] = params.stride;
    let [ph, pw] = params.padding;
    for (o, value) in y.iter_mut().enumerate() {
        let (oy, ox) = (o / ow, o % ow);
        let mut max = f64::NEG_INFINITY;
        let mut total = 0.;
        let mut count = 0usize;
        for iy in (oy * sh).max(ph)..(oy * sh + wh).min(h + ph) {
            for ix in (ox * sw).max(pw)..(ox * sw + ww).min(w + pw) {
                let v = x[(iy - ph) * w + (ix - pw)];
                max = max.max(v);
                total += v;
                count += 1;
            }
        }
        *value = match params.mode {
            _ if count == 0 => 0.,
            PoolingMode::Max => max,
            PoolingMode::Average => total / count as f64,
        };
    }
}

fn convolve(
    params: &ConvolutionParams,
    x: &[f64],
    filter: &[f64],
    y: &mut [f64],
    [h, w]: [usize; 2],
    [r, s]: [usize; 2],
    ow: usize,
) {
    let [sh, sw] = params.stride;
    let [ph, pw] = params.padding;
    for (o, value) in y.iter_mut().enumerate() {
        let (oy, ox) = (o / ow, o % ow);
        let mut acc = 0.;
        for i in 0..r {
            for j in 0..s {
                let (iy, ix) = (oy * sh + i, ox * sw + j);
                if iy < ph || ix < pw || iy - ph >= h || ix - pw >= w {
                    continue;
                }
                acc += x[(iy - ph) * w + (ix - pw)] * filter[(r - 1 - i) * s + (s - 1 - j)];
            }
        }
        *value = acc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_memory() {
        let device = SimDevice::new(16);
        let id = device.allocate(12).unwrap();
        let e = device.allocate(8).unwrap_err();
        assert_eq!(e.status, ErrorStatus::MemoryAllocation);
        device.deallocate(id).unwrap();
        assert_eq!(device.free_bytes(), 16);
        assert!(device.allocate(16).is_ok());
    }

    #[test]
    fn copies_round_trip() {
        let device = SimDevice::new(1024);
        let id = device.allocate(4).unwrap();
        device.host_to_device(&[1, 2, 3, 4], id).unwrap();
        let mut bytes = [0; 4];
        device.device_to_host(id, &mut bytes).unwrap();
        assert_eq!(bytes, [1, 2, 3, 4]);
        assert_eq!(device.stats().h2d, 1);
        assert_eq!(device.stats().d2h, 1);
    }

    #[test]
    fn descriptor_kinds_are_checked() {
        let device = SimDevice::new(1024);
        let id = device
            .create_filter_descriptor(&FilterLayout {
                dtype: DType::F32,
                dims: [1, 1, 2, 2],
            })
            .unwrap();
        let arg = TensorArg {
            descriptor: id,
            buffer: 0,
            offset: 0,
        };
        let e = device.pooling_forward(id, arg, arg).unwrap_err();
        assert_eq!(e.status, ErrorStatus::IncorrectKernelArg);
        device.destroy_descriptor(id).unwrap();
        assert!(device.destroy_descriptor(id).is_err());
        assert_eq!(device.live_descriptors(), 0);
    }

    #[test]
    fn missing_config_is_configured_out() {
        // no sim.json in test environments
        if lazet_core::config::find_config_file("lazet/sim.json").is_none() {
            let e = SimDevice::from_config().unwrap_err();
            assert_eq!(e.status, ErrorStatus::Initialization);
        }
    }
}
