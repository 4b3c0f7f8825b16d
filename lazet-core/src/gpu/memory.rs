use alloc::rc::Rc;

use super::{Accelerator, DeviceBufferId};

/// Device allocation owned by one storage, released on drop
pub struct DeviceBuffer {
    device: Rc<dyn Accelerator>,
    id: DeviceBufferId,
    bytes: usize,
}

impl DeviceBuffer {
    pub(crate) fn new(device: Rc<dyn Accelerator>, id: DeviceBufferId, bytes: usize) -> Self {
        Self { device, id, bytes }
    }

    /// Device holding this buffer
    #[must_use]
    pub fn device(&self) -> &Rc<dyn Accelerator> {
        &self.device
    }

    /// Id of this buffer on its device
    #[must_use]
    pub fn id(&self) -> DeviceBufferId {
        self.id
    }

    /// Size in bytes
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl core::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!(
            "DeviceBuffer({} on {}, {} B)",
            self.id,
            self.device.name(),
            self.bytes
        ))
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.deallocate(self.id) {
            log::warn!("Failed to deallocate buffer {} on {}, {e}", self.id, self.device.name());
        }
    }
}

/// Coherence token of one storage.
///
/// At least one of host and device copy is valid at any time. Writing one side
/// invalidates the other, both are valid only after an explicit copy.
#[derive(Debug)]
pub struct GpuMemory {
    host_valid: bool,
    device_valid: bool,
    buffer: Option<DeviceBuffer>,
}

impl Default for GpuMemory {
    fn default() -> Self {
        Self {
            host_valid: true,
            device_valid: false,
            buffer: None,
        }
    }
}

impl GpuMemory {
    /// Host copy is up to date
    #[must_use]
    pub fn is_host_valid(&self) -> bool {
        self.host_valid
    }

    /// Device copy is up to date
    #[must_use]
    pub fn is_device_valid(&self) -> bool {
        self.device_valid
    }

    /// Device buffer, if one was allocated
    #[must_use]
    pub fn buffer(&self) -> Option<&DeviceBuffer> {
        self.buffer.as_ref()
    }

    /// Replace device buffer, contents of a fresh buffer are undefined
    pub(crate) fn attach(&mut self, buffer: DeviceBuffer) {
        assert!(self.host_valid, "device buffer replaced while host copy is stale");
        self.buffer = Some(buffer);
        self.device_valid = false;
    }

    pub(crate) fn host_written(&mut self) {
        self.host_valid = true;
        self.device_valid = false;
    }

    pub(crate) fn device_written(&mut self) {
        assert!(self.buffer.is_some(), "device write without device buffer");
        self.device_valid = true;
        self.host_valid = false;
    }

    pub(crate) fn host_synced(&mut self) {
        assert!(self.device_valid, "host synchronized from stale device copy");
        self.host_valid = true;
    }

    pub(crate) fn device_synced(&mut self) {
        assert!(
            self.host_valid && self.buffer.is_some(),
            "device synchronized from stale host copy"
        );
        self.device_valid = true;
    }
}
