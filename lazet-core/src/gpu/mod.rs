//! Accelerator service interface and the current device.
//!
//! The accelerator runtime is opaque. It allocates buffers, copies bytes, manages
//! descriptors and launches kernels keyed by them. All calls are blocking.

use alloc::rc::Rc;
use core::cell::RefCell;

use crate::{config, dtype::DType, error::BackendError};

/// See [Descriptor](descriptor::Descriptor)
pub mod descriptor;
pub(crate) mod kernels;
/// See [GpuMemory](memory::GpuMemory)
pub mod memory;

/// Id of buffer on device
pub type DeviceBufferId = u32;
/// Id of descriptor on device
pub type DescriptorId = u32;

/// Reduction applied by pooling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolingMode {
    /// Maximum of window
    Max,
    /// Average of window, padded elements are not counted
    Average,
}

/// Parameters of 2D pooling over the last two dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolingParams {
    /// Reduction
    pub mode: PoolingMode,
    /// Window extents
    pub window: [usize; 2],
    /// Step between windows
    pub stride: [usize; 2],
    /// Zero padding on each side
    pub padding: [usize; 2],
}

/// Parameters of 2D convolution over the last two dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvolutionParams {
    /// Step between kernel positions
    pub stride: [usize; 2],
    /// Zero padding on each side
    pub padding: [usize; 2],
}

impl Default for ConvolutionParams {
    fn default() -> Self {
        Self {
            stride: [1, 1],
            padding: [0, 0],
        }
    }
}

/// Tensor of rank 4 in NCHW layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorLayout {
    /// Element type
    pub dtype: DType,
    /// Batch, channels, height, width
    pub dims: [usize; 4],
}

/// Filter in KCRS layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterLayout {
    /// Element type
    pub dtype: DType,
    /// Output channels, input channels, rows, columns
    pub dims: [usize; 4],
}

/// Kernel argument, a described tensor at byte `offset` of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorArg {
    /// Tensor or filter descriptor
    pub descriptor: DescriptorId,
    /// Buffer holding the data
    pub buffer: DeviceBufferId,
    /// Start of data in bytes
    pub offset: usize,
}

/// Accelerator runtime.
///
/// Object safe, used as `Rc<dyn Accelerator>`. Methods take `&self`,
/// implementations keep their state behind interior mutability.
pub trait Accelerator {
    /// Name used in logs
    fn name(&self) -> &str;
    /// Allocate `bytes` of device memory
    fn allocate(&self, bytes: usize) -> Result<DeviceBufferId, BackendError>;
    /// Release device memory
    fn deallocate(&self, buffer: DeviceBufferId) -> Result<(), BackendError>;
    /// Copy `src` to start of `dst`
    fn host_to_device(&self, src: &[u8], dst: DeviceBufferId) -> Result<(), BackendError>;
    /// Copy start of `src` to `dst`
    fn device_to_host(&self, src: DeviceBufferId, dst: &mut [u8]) -> Result<(), BackendError>;
    /// Create tensor descriptor
    fn create_tensor_descriptor(&self, layout: &TensorLayout)
        -> Result<DescriptorId, BackendError>;
    /// Create filter descriptor
    fn create_filter_descriptor(&self, layout: &FilterLayout)
        -> Result<DescriptorId, BackendError>;
    /// Create pooling descriptor
    fn create_pooling_descriptor(
        &self,
        params: &PoolingParams,
    ) -> Result<DescriptorId, BackendError>;
    /// Destroy any descriptor
    fn destroy_descriptor(&self, descriptor: DescriptorId) -> Result<(), BackendError>;
    /// Pool `x` into `y`
    fn pooling_forward(
        &self,
        pooling: DescriptorId,
        x: TensorArg,
        y: TensorArg,
    ) -> Result<(), BackendError>;
    /// Convolve `x` with filter `w` into `y`
    fn convolution_forward(
        &self,
        params: &ConvolutionParams,
        x: TensorArg,
        w: TensorArg,
        y: TensorArg,
    ) -> Result<(), BackendError>;
}

thread_local! {
    static DEVICE: RefCell<Option<Rc<dyn Accelerator>>> = const { RefCell::new(None) };
}

/// Set accelerator used by this thread, `None` keeps everything on cpu
pub fn set_device(device: Option<Rc<dyn Accelerator>>) {
    if let Some(device) = &device {
        log::debug!("Using accelerator {}", device.name());
    }
    DEVICE.with(|d| *d.borrow_mut() = device);
}

/// Accelerator used by this thread
#[must_use]
pub fn device() -> Option<Rc<dyn Accelerator>> {
    DEVICE.with(|d| d.borrow().clone())
}

/// Device operators should offload to, if config allows it
pub(crate) fn offload_target() -> Option<Rc<dyn Accelerator>> {
    if config::current().gpu {
        device()
    } else {
        None
    }
}
