use thiserror::Error;

/// Errors that can occur while building or materializing expressions.
#[derive(Debug, Error)]
pub enum LazetError {
    /// Invalid shapes for operation
    #[error("{0}")]
    ShapeError(Box<str>),
    /// Extent or index product does not fit into usize
    #[error("Overflow {0}")]
    Overflow(Box<str>),
    /// Memory allocation error
    #[error("Allocation error {0}")]
    AllocationError(Box<str>),
    /// Operation requires an accelerator, but none is set
    #[error("No accelerator available")]
    NoDevice,
    /// Error returned by accelerator runtime
    #[error("Backend {0}")]
    BackendError(#[from] BackendError),
}

fn located(e: impl Into<String>, location: &std::panic::Location<'_>) -> Box<str> {
    format!(
        "{}, {}:{}:{}",
        e.into(),
        location.file(),
        location.line(),
        location.column()
    )
    .into()
}

impl LazetError {
    /// Shape error
    #[track_caller]
    pub fn shape_error(e: impl Into<String>) -> Self {
        Self::ShapeError(located(e, std::panic::Location::caller()))
    }

    /// Overflow error
    #[track_caller]
    pub fn overflow(e: impl Into<String>) -> Self {
        Self::Overflow(located(e, std::panic::Location::caller()))
    }

    /// Allocation error
    #[track_caller]
    pub fn allocation_error(e: impl Into<String>) -> Self {
        Self::AllocationError(located(e, std::panic::Location::caller()))
    }
}

/// Failure reported by an accelerator runtime, with its status and call site.
#[derive(Debug, Error)]
#[error("{status:?}: {context}")]
pub struct BackendError {
    /// What kind of call failed
    pub status: ErrorStatus,
    /// Details and location
    pub context: Box<str>,
}

impl BackendError {
    /// New backend error, the caller's location is appended to context
    #[track_caller]
    pub fn new(status: ErrorStatus, context: impl Into<String>) -> Self {
        Self {
            status,
            context: located(context, std::panic::Location::caller()),
        }
    }
}

/// Status of failed accelerator call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    /// Runtime initialization failure
    Initialization,
    /// Failed to allocate memory
    MemoryAllocation,
    /// Failed to deallocate memory
    MemoryDeallocation,
    /// Failed to copy memory to device
    MemoryCopyH2D,
    /// Failed to copy memory to host
    MemoryCopyD2H,
    /// Failed to create descriptor
    DescriptorCreation,
    /// Failed to destroy descriptor
    DescriptorDestruction,
    /// Kernel argument was not correct
    IncorrectKernelArg,
    /// Failed to launch kernel
    KernelLaunch,
}
