use crate::{
    dtype::DType,
    error::{BackendError, ErrorStatus, LazetError},
};

use super::{Accelerator, DescriptorId, FilterLayout, PoolingParams, TensorLayout};

/// What a descriptor describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// Tensor layout
    Tensor,
    /// Filter layout
    Filter,
    /// Pooling parameters
    Pooling,
}

/// Descriptor owned by this value and destroyed when it is dropped.
///
/// After [`Descriptor::take`] the source holds no id and dropping it does nothing.
pub struct Descriptor<'d> {
    device: &'d dyn Accelerator,
    id: Option<DescriptorId>,
    kind: DescriptorKind,
}

impl<'d> Descriptor<'d> {
    /// Describe tensor with `dims`, rank 1 to 4 is padded to NCHW with leading ones
    pub fn tensor(
        device: &'d dyn Accelerator,
        dtype: DType,
        dims: &[usize],
    ) -> Result<Self, LazetError> {
        let layout = TensorLayout {
            dtype,
            dims: pad_nchw(dims)?,
        };
        let id = device.create_tensor_descriptor(&layout)?;
        Ok(Self {
            device,
            id: Some(id),
            kind: DescriptorKind::Tensor,
        })
    }

    /// Describe filter of rank 2 (rows, columns) or rank 4 (KCRS)
    pub fn filter(
        device: &'d dyn Accelerator,
        dtype: DType,
        dims: &[usize],
    ) -> Result<Self, LazetError> {
        let dims = match *dims {
            [r, s] => [1, 1, r, s],
            [k, c, r, s] => [k, c, r, s],
            _ => {
                return Err(LazetError::shape_error(format!(
                    "filter must have rank 2 or 4, got {dims:?}"
                )))
            }
        };
        let id = device.create_filter_descriptor(&FilterLayout { dtype, dims })?;
        Ok(Self {
            device,
            id: Some(id),
            kind: DescriptorKind::Filter,
        })
    }

    /// Describe pooling
    pub fn pooling(device: &'d dyn Accelerator, params: &PoolingParams) -> Result<Self, LazetError> {
        let id = device.create_pooling_descriptor(params)?;
        Ok(Self {
            device,
            id: Some(id),
            kind: DescriptorKind::Pooling,
        })
    }

    /// Kind of this descriptor
    #[must_use]
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// Id, `None` after ownership was taken
    #[must_use]
    pub fn id(&self) -> Option<DescriptorId> {
        self.id
    }

    /// Live id for a kernel argument
    pub fn get(&self) -> Result<DescriptorId, BackendError> {
        self.id.ok_or_else(|| {
            BackendError::new(
                ErrorStatus::IncorrectKernelArg,
                format!("{:?} descriptor was already released", self.kind),
            )
        })
    }

    /// Move ownership out, leaving an empty descriptor behind
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            device: self.device,
            id: self.id.take(),
            kind: self.kind,
        }
    }

    /// Destroy now and report failure
    pub fn release(mut self) -> Result<(), BackendError> {
        match self.id.take() {
            Some(id) => self.device.destroy_descriptor(id),
            None => Ok(()),
        }
    }
}

impl core::fmt::Debug for Descriptor<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Descriptor")
            .field("device", &self.device.name())
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for Descriptor<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            if let Err(e) = self.device.destroy_descriptor(id) {
                log::warn!("Failed to destroy {:?} descriptor {id}, {e}", self.kind);
            }
        }
    }
}

fn pad_nchw(dims: &[usize]) -> Result<[usize; 4], LazetError> {
    if dims.is_empty() || dims.len() > 4 {
        return Err(LazetError::shape_error(format!(
            "tensor descriptor needs rank 1 to 4, got {dims:?}"
        )));
    }
    let mut nchw = [1; 4];
    nchw[4 - dims.len()..].copy_from_slice(dims);
    Ok(nchw)
}
