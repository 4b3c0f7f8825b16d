/// DType of tensor
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum DType {
    /// 16 bit floating point type
    #[cfg(feature = "half")]
    F16,
    /// 16 bit brain floating point type
    #[cfg(feature = "half")]
    BF16,
    /// 32 bit floating point type
    F32,
    /// 64 bit floating point type
    F64,
    /// 32 bit integer type
    I32,
}

impl DType {
    /// Get the size of DType in bytes
    #[must_use]
    pub const fn byte_size(self) -> usize {
        match self {
            #[cfg(feature = "half")]
            Self::F16 | Self::BF16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Check if self is floating point dtype
    #[must_use]
    pub const fn is_floating(self) -> bool {
        match self {
            #[cfg(feature = "half")]
            Self::F16 | Self::BF16 => true,
            Self::F32 | Self::F64 => true,
            Self::I32 => false,
        }
    }
}

impl core::fmt::Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self:?}"))
    }
}
