use crate::scalar::Scalar;

/// `W` contiguous elements loaded together.
///
/// This is the only vector abstraction expressions see. Lanes are processed
/// in lockstep, which the compiler lowers to the cpu's vector instructions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pack<T, const W: usize>(pub [T; W]);

impl<T: Scalar, const W: usize> Pack<T, W> {
    /// Pack where lane `k` is `f(k)`
    pub fn from_fn(f: impl FnMut(usize) -> T) -> Self {
        Self(core::array::from_fn(f))
    }

    /// All lanes set to `value`
    #[must_use]
    pub fn splat(value: T) -> Self {
        Self([value; W])
    }

    /// Load first `W` elements of `src`
    #[must_use]
    pub fn load(src: &[T]) -> Self {
        Self::from_fn(|k| src[k])
    }

    /// Store into first `W` elements of `dst`
    pub fn store(self, dst: &mut [T]) {
        dst[..W].copy_from_slice(&self.0);
    }

    /// Apply `f` to every lane
    #[must_use]
    pub fn map(self, f: impl Fn(T) -> T) -> Self {
        Self(self.0.map(f))
    }

    /// Combine lanes of `self` and `rhs` with `f`
    #[must_use]
    pub fn zip(self, rhs: Self, f: impl Fn(T, T) -> T) -> Self {
        Self::from_fn(|k| f(self.0[k], rhs.0[k]))
    }
}
