use crate::dtype::DType;

/// Scalar trait is implemented for all [dtypes](DType)
pub trait Scalar:
    Copy + PartialEq + PartialOrd + core::fmt::Debug + core::fmt::Display + Send + Sync + 'static
{
    /// Get dtype of Self
    fn dtype() -> DType;
    /// Get zero of Self
    fn zero() -> Self;
    /// Get one of Self
    fn one() -> Self;
    /// From f64
    fn from_f64(t: f64) -> Self;
    /// Convert self into f64
    fn into_f64(self) -> f64;
    /// Add
    fn add(self, rhs: Self) -> Self;
    /// Sub
    fn sub(self, rhs: Self) -> Self;
    /// Mul
    fn mul(self, rhs: Self) -> Self;
    /// Div
    fn div(self, rhs: Self) -> Self;
    /// Neg
    fn neg(self) -> Self;
    /// Absolute value
    fn abs(self) -> Self;
    /// Exp
    fn exp(self) -> Self;
    /// Max of two numbers
    fn max(self, rhs: Self) -> Self;
    /// Smallest representable value, the identity of max
    fn lowest() -> Self;
    /// Write self as little endian bytes, `dst` has [`Scalar::byte_size`] bytes
    fn write_le(self, dst: &mut [u8]);
    /// Read from little endian bytes
    fn read_le(src: &[u8]) -> Self;
    /// Comparison for scalars,
    /// if they are floats, this allows for rounding differences
    fn is_equal(self, rhs: Self) -> bool;

    /// Byte size of Self
    fn byte_size() -> usize {
        Self::dtype().byte_size()
    }
}

macro_rules! impl_float_scalar {
    ($t:ty, $dtype:ident, $bytes:literal) => {
        impl Scalar for $t {
            fn dtype() -> DType {
                DType::$dtype
            }

            fn zero() -> Self {
                0.
            }

            fn one() -> Self {
                1.
            }

            fn from_f64(t: f64) -> Self {
                t as $t
            }

            fn into_f64(self) -> f64 {
                self as f64
            }

            fn add(self, rhs: Self) -> Self {
                self + rhs
            }

            fn sub(self, rhs: Self) -> Self {
                self - rhs
            }

            fn mul(self, rhs: Self) -> Self {
                self * rhs
            }

            fn div(self, rhs: Self) -> Self {
                self / rhs
            }

            fn neg(self) -> Self {
                -self
            }

            fn abs(self) -> Self {
                <$t>::abs(self)
            }

            fn exp(self) -> Self {
                <$t>::exp(self)
            }

            fn max(self, rhs: Self) -> Self {
                <$t>::max(self, rhs)
            }

            fn lowest() -> Self {
                <$t>::NEG_INFINITY
            }

            fn write_le(self, dst: &mut [u8]) {
                dst[..$bytes].copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(src: &[u8]) -> Self {
                let mut bytes = [0; $bytes];
                bytes.copy_from_slice(&src[..$bytes]);
                <$t>::from_le_bytes(bytes)
            }

            fn is_equal(self, rhs: Self) -> bool {
                let scale = <$t>::max(1., <$t>::max(self.abs(), rhs.abs()));
                (self - rhs).abs() <= <$t>::EPSILON * 16. * scale
            }
        }
    };
}

impl_float_scalar!(f32, F32, 4);
impl_float_scalar!(f64, F64, 8);

impl Scalar for i32 {
    fn dtype() -> DType {
        DType::I32
    }

    fn zero() -> Self {
        0
    }

    fn one() -> Self {
        1
    }

    fn from_f64(t: f64) -> Self {
        t as i32
    }

    fn into_f64(self) -> f64 {
        self as f64
    }

    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    fn sub(self, rhs: Self) -> Self {
        self.wrapping_sub(rhs)
    }

    fn mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }

    fn div(self, rhs: Self) -> Self {
        self / rhs
    }

    fn neg(self) -> Self {
        self.wrapping_neg()
    }

    fn abs(self) -> Self {
        self.wrapping_abs()
    }

    fn exp(self) -> Self {
        (self as f64).exp() as i32
    }

    fn max(self, rhs: Self) -> Self {
        Ord::max(self, rhs)
    }

    fn lowest() -> Self {
        i32::MIN
    }

    fn write_le(self, dst: &mut [u8]) {
        dst[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn read_le(src: &[u8]) -> Self {
        i32::from_le_bytes([src[0], src[1], src[2], src[3]])
    }

    fn is_equal(self, rhs: Self) -> bool {
        self == rhs
    }
}

#[cfg(feature = "half")]
macro_rules! impl_half_scalar {
    ($t:ty, $dtype:ident) => {
        impl Scalar for $t {
            fn dtype() -> DType {
                DType::$dtype
            }

            fn zero() -> Self {
                <$t>::ZERO
            }

            fn one() -> Self {
                <$t>::ONE
            }

            fn from_f64(t: f64) -> Self {
                <$t>::from_f64(t)
            }

            fn into_f64(self) -> f64 {
                self.to_f64()
            }

            fn add(self, rhs: Self) -> Self {
                <$t>::from_f32(self.to_f32() + rhs.to_f32())
            }

            fn sub(self, rhs: Self) -> Self {
                <$t>::from_f32(self.to_f32() - rhs.to_f32())
            }

            fn mul(self, rhs: Self) -> Self {
                <$t>::from_f32(self.to_f32() * rhs.to_f32())
            }

            fn div(self, rhs: Self) -> Self {
                <$t>::from_f32(self.to_f32() / rhs.to_f32())
            }

            fn neg(self) -> Self {
                -self
            }

            fn abs(self) -> Self {
                <$t>::from_f32(self.to_f32().abs())
            }

            fn exp(self) -> Self {
                <$t>::from_f32(self.to_f32().exp())
            }

            fn max(self, rhs: Self) -> Self {
                if rhs > self {
                    rhs
                } else {
                    self
                }
            }

            fn lowest() -> Self {
                <$t>::NEG_INFINITY
            }

            fn write_le(self, dst: &mut [u8]) {
                dst[..2].copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(src: &[u8]) -> Self {
                <$t>::from_le_bytes([src[0], src[1]])
            }

            fn is_equal(self, rhs: Self) -> bool {
                let (a, b) = (self.to_f32(), rhs.to_f32());
                (a - b).abs() <= 1e-2 * f32::max(1., f32::max(a.abs(), b.abs()))
            }
        }
    };
}

#[cfg(feature = "half")]
impl_half_scalar!(half::f16, F16);
#[cfg(feature = "half")]
impl_half_scalar!(half::bf16, BF16);
