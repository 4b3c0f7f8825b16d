//! Reference counted element buffers with host/device coherence.

use alloc::rc::Rc;
use core::cell::{Ref, RefCell, RefMut};
use core::sync::atomic::{AtomicU64, Ordering};

use crate::{
    counters,
    error::LazetError,
    gpu::{
        memory::{DeviceBuffer, GpuMemory},
        Accelerator, DeviceBufferId,
    },
    scalar::Scalar,
};

static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identity of a [`Storage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageId(u64);

impl core::fmt::Display for StorageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("s{}", self.0))
    }
}

/// Element range of a storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Storage the range belongs to
    pub storage: StorageId,
    /// First element
    pub start: usize,
    /// One past last element
    pub end: usize,
}

impl Region {
    /// Number of elements
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Region has no elements
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Conservative overlap test.
    ///
    /// Host buffers are borrowed whole while evaluating, so regions of one storage
    /// alias even when their ranges are disjoint.
    #[must_use]
    pub fn aliases(&self, other: &Region) -> bool {
        self.storage == other.storage
    }
}

struct StorageInner<T> {
    id: StorageId,
    host: RefCell<Box<[T]>>,
    memory: RefCell<GpuMemory>,
}

/// Shared element buffer.
///
/// Cloning shares the buffer. Host data and the optional device copy are kept
/// coherent through [`GpuMemory`].
pub struct Storage<T> {
    inner: Rc<StorageInner<T>>,
}

impl<T> Clone for Storage<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> core::fmt::Debug for Storage<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Storage")
            .field("id", &self.inner.id)
            .field("len", &self.inner.host.borrow().len())
            .field("memory", &*self.inner.memory.borrow())
            .finish()
    }
}

impl<T: Scalar> Storage<T> {
    /// Storage holding `data`
    #[must_use]
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            inner: Rc::new(StorageInner {
                id: StorageId(NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed)),
                host: RefCell::new(data.into_boxed_slice()),
                memory: RefCell::new(GpuMemory::default()),
            }),
        }
    }

    /// Storage of `len` zeros
    pub fn zeroed(len: usize) -> Result<Self, LazetError> {
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            LazetError::allocation_error(format!("{len} elements of {}, {e}", T::dtype()))
        })?;
        data.resize(len, T::zero());
        Ok(Self::from_vec(data))
    }

    /// Identity of this storage
    #[must_use]
    pub fn id(&self) -> StorageId {
        self.inner.id
    }

    /// Number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.host.borrow().len()
    }

    /// Storage has no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Region covering all elements
    #[must_use]
    pub fn region(&self) -> Region {
        Region {
            storage: self.inner.id,
            start: 0,
            end: self.len(),
        }
    }

    /// Borrow host data, which must be up to date
    #[must_use]
    pub fn read(&self) -> Ref<'_, [T]> {
        debug_assert!(
            self.is_host_valid(),
            "storage {} read on host while only device copy is valid",
            self.inner.id
        );
        Ref::map(self.inner.host.borrow(), |data| &**data)
    }

    /// Borrow `region` of host data for writing.
    ///
    /// The write invalidates the device copy. Partial writes first bring the host copy
    /// up to date so elements outside of `region` are preserved.
    pub fn write_region(&self, region: Region) -> Result<RefMut<'_, [T]>, LazetError> {
        debug_assert_eq!(region.storage, self.inner.id);
        if region.start != 0 || region.end != self.len() {
            self.ensure_host_up_to_date()?;
        }
        self.inner.memory.borrow_mut().host_written();
        Ok(RefMut::map(self.inner.host.borrow_mut(), |data| {
            &mut data[region.start..region.end]
        }))
    }

    /// Coherence token
    #[must_use]
    pub fn memory(&self) -> Ref<'_, GpuMemory> {
        self.inner.memory.borrow()
    }

    /// Host copy is up to date
    #[must_use]
    pub fn is_host_valid(&self) -> bool {
        self.inner.memory.borrow().is_host_valid()
    }

    /// Device copy is up to date
    #[must_use]
    pub fn is_device_valid(&self) -> bool {
        self.inner.memory.borrow().is_device_valid()
    }

    /// Copy device data to host if host copy is stale
    pub fn ensure_host_up_to_date(&self) -> Result<(), LazetError> {
        let mut memory = self.inner.memory.borrow_mut();
        if memory.is_host_valid() {
            return Ok(());
        }
        let buffer = memory.buffer().ok_or(LazetError::NoDevice)?;
        let byte_size = T::byte_size();
        let mut host = self.inner.host.borrow_mut();
        let mut bytes = vec![0u8; host.len() * byte_size];
        buffer.device().device_to_host(buffer.id(), &mut bytes)?;
        for (x, chunk) in host.iter_mut().zip(bytes.chunks_exact(byte_size)) {
            *x = T::read_le(chunk);
        }
        log::debug!(
            "Copied {} bytes of storage {} from {}",
            bytes.len(),
            self.inner.id,
            buffer.device().name()
        );
        memory.host_synced();
        counters::increment("gpu:d2h");
        Ok(())
    }

    /// Make sure `device` holds a buffer for this storage, without copying to it
    pub fn ensure_device_allocated(
        &self,
        device: &Rc<dyn Accelerator>,
    ) -> Result<DeviceBufferId, LazetError> {
        if let Some(buffer) = self.inner.memory.borrow().buffer() {
            if Rc::ptr_eq(buffer.device(), device) {
                return Ok(buffer.id());
            }
        }
        // Buffer on another device is dropped, its data must be on host first
        self.ensure_host_up_to_date()?;
        let bytes = self.len() * T::byte_size();
        let id = device.allocate(bytes)?;
        log::debug!(
            "Allocated {bytes} bytes for storage {} on {}",
            self.inner.id,
            device.name()
        );
        self.inner
            .memory
            .borrow_mut()
            .attach(DeviceBuffer::new(device.clone(), id, bytes));
        counters::increment("gpu:allocate");
        Ok(id)
    }

    /// Copy host data to `device` if device copy is stale
    pub fn ensure_device_up_to_date(
        &self,
        device: &Rc<dyn Accelerator>,
    ) -> Result<DeviceBufferId, LazetError> {
        let id = self.ensure_device_allocated(device)?;
        let mut memory = self.inner.memory.borrow_mut();
        if memory.is_device_valid() {
            return Ok(id);
        }
        let byte_size = T::byte_size();
        let host = self.inner.host.borrow();
        let mut bytes = vec![0u8; host.len() * byte_size];
        for (x, chunk) in host.iter().zip(bytes.chunks_exact_mut(byte_size)) {
            x.write_le(chunk);
        }
        device.host_to_device(&bytes, id)?;
        log::debug!(
            "Copied {} bytes of storage {} to {}",
            bytes.len(),
            self.inner.id,
            device.name()
        );
        memory.device_synced();
        counters::increment("gpu:h2d");
        Ok(id)
    }

    /// Record a device side write, host copy becomes stale
    pub fn device_written(&self) {
        self.inner.memory.borrow_mut().device_written();
    }

    /// Copy of all elements in memory order
    pub fn to_vec(&self) -> Result<Vec<T>, LazetError> {
        self.ensure_host_up_to_date()?;
        Ok(self.read().to_vec())
    }
}
