//! Generators compute values on demand and have no shape of their own.
//!
//! They take the shape of whatever they are assigned to or combined with.

use core::cell::{Cell, RefCell};

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    config::VectorMode,
    pack::Pack,
    scalar::Scalar,
    storage::Region,
    traits::{Expr, FastExpr, Traits},
};

/// Seed used by [`uniform`] and [`normal`] when none is given
pub const DEFAULT_SEED: u64 = 420_694_206_942_069;

macro_rules! impl_fast_generator {
    ($t:ident) => {
        impl<T: Scalar> FastExpr for $t<T> {
            const DIMENSIONS: usize = 0;
            const SIZE: usize = 0;

            fn fast_dim(_: usize) -> usize {
                0
            }
        }
    };
}

/// Same value everywhere
#[derive(Debug, Clone, Copy)]
pub struct ScalarExpr<T> {
    value: T,
}

/// Broadcast `value` to any shape
#[must_use]
pub fn scalar<T: Scalar>(value: T) -> ScalarExpr<T> {
    ScalarExpr { value }
}

impl<T: Scalar> Expr for ScalarExpr<T> {
    type Elem = T;
    const TRAITS: Traits = Traits {
        is_linear: true,
        ..Traits::GENERATOR
    };

    fn dimensions(&self) -> usize {
        0
    }

    fn dim(&self, _: usize) -> usize {
        0
    }

    fn size(&self) -> usize {
        0
    }

    fn vectorizable(_: VectorMode) -> bool {
        true
    }

    fn read_flat(&self, _: usize) -> T {
        self.value
    }

    fn read_at(&self, _: &[usize]) -> T {
        self.value
    }

    fn load<const W: usize>(&self, _: usize) -> Pack<T, W> {
        Pack::splat(self.value)
    }

    fn alias(&self, _: &Region) -> bool {
        false
    }
}

impl_fast_generator!(ScalarExpr);

impl<T: Scalar> core::fmt::Display for ScalarExpr<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{}", self.value))
    }
}

/// `start`, `start + step`, ... in order of reads
#[derive(Debug, Clone)]
pub struct SequenceGenerator<T: Copy> {
    start: T,
    step: T,
    current: Cell<T>,
}

/// Values increasing by `step` in order of evaluation
#[must_use]
pub fn sequence<T: Scalar>(start: T, step: T) -> SequenceGenerator<T> {
    SequenceGenerator {
        start,
        step,
        current: Cell::new(start),
    }
}

impl<T: Scalar> SequenceGenerator<T> {
    fn next(&self) -> T {
        let x = self.current.get();
        self.current.set(x.add(self.step));
        x
    }
}

impl<T: Scalar> Expr for SequenceGenerator<T> {
    type Elem = T;
    const TRAITS: Traits = Traits::GENERATOR;

    fn dimensions(&self) -> usize {
        0
    }

    fn dim(&self, _: usize) -> usize {
        0
    }

    fn size(&self) -> usize {
        0
    }

    fn vectorizable(_: VectorMode) -> bool {
        false
    }

    fn read_flat(&self, _: usize) -> T {
        self.next()
    }

    fn read_at(&self, _: &[usize]) -> T {
        self.next()
    }

    fn alias(&self, _: &Region) -> bool {
        false
    }
}

impl_fast_generator!(SequenceGenerator);

impl<T: Scalar> core::fmt::Display for SequenceGenerator<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("sequence({}, {})", self.start, self.step))
    }
}

/// Uniformly distributed values in `[low, high)`
#[derive(Debug, Clone)]
pub struct UniformGenerator<T> {
    low: T,
    high: T,
    rng: RefCell<SmallRng>,
}

/// Uniform random values in `[low, high)`, reproducible for given `seed`
#[must_use]
pub fn uniform<T: Scalar>(low: T, high: T, seed: Option<u64>) -> UniformGenerator<T> {
    UniformGenerator {
        low,
        high,
        rng: RefCell::new(SmallRng::seed_from_u64(seed.unwrap_or(DEFAULT_SEED))),
    }
}

impl<T: Scalar> UniformGenerator<T> {
    fn next(&self) -> T {
        let (low, high) = (self.low.into_f64(), self.high.into_f64());
        let x: f64 = self.rng.borrow_mut().gen();
        T::from_f64(low + (high - low) * x)
    }
}

impl<T: Scalar> Expr for UniformGenerator<T> {
    type Elem = T;
    const TRAITS: Traits = Traits::GENERATOR;

    fn dimensions(&self) -> usize {
        0
    }

    fn dim(&self, _: usize) -> usize {
        0
    }

    fn size(&self) -> usize {
        0
    }

    fn vectorizable(_: VectorMode) -> bool {
        false
    }

    fn read_flat(&self, _: usize) -> T {
        self.next()
    }

    fn read_at(&self, _: &[usize]) -> T {
        self.next()
    }

    fn alias(&self, _: &Region) -> bool {
        false
    }
}

impl_fast_generator!(UniformGenerator);

impl<T: Scalar> core::fmt::Display for UniformGenerator<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("uniform({}, {})", self.low, self.high))
    }
}

/// Normally distributed values
#[derive(Debug, Clone)]
pub struct NormalGenerator<T> {
    mean: T,
    stddev: T,
    rng: RefCell<SmallRng>,
}

/// Normal random values, reproducible for given `seed`
#[must_use]
pub fn normal<T: Scalar>(mean: T, stddev: T, seed: Option<u64>) -> NormalGenerator<T> {
    NormalGenerator {
        mean,
        stddev,
        rng: RefCell::new(SmallRng::seed_from_u64(seed.unwrap_or(DEFAULT_SEED))),
    }
}

impl<T: Scalar> NormalGenerator<T> {
    // Box-Muller
    fn next(&self) -> T {
        let mut rng = self.rng.borrow_mut();
        let u1: f64 = 1. - rng.gen::<f64>();
        let u2: f64 = rng.gen();
        let z = (-2. * u1.ln()).sqrt() * (2. * core::f64::consts::PI * u2).cos();
        T::from_f64(self.mean.into_f64() + self.stddev.into_f64() * z)
    }
}

impl<T: Scalar> Expr for NormalGenerator<T> {
    type Elem = T;
    const TRAITS: Traits = Traits::GENERATOR;

    fn dimensions(&self) -> usize {
        0
    }

    fn dim(&self, _: usize) -> usize {
        0
    }

    fn size(&self) -> usize {
        0
    }

    fn vectorizable(_: VectorMode) -> bool {
        false
    }

    fn read_flat(&self, _: usize) -> T {
        self.next()
    }

    fn read_at(&self, _: &[usize]) -> T {
        self.next()
    }

    fn alias(&self, _: &Region) -> bool {
        false
    }
}

impl_fast_generator!(NormalGenerator);

impl<T: Scalar> core::fmt::Display for NormalGenerator<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("normal({}, {})", self.mean, self.stddev))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_advances_per_read() {
        let s = sequence(1i32, 2);
        let values: Vec<i32> = (0..4).map(|i| s.read_flat(i)).collect();
        assert_eq!(values, [1, 3, 5, 7]);
    }

    #[test]
    fn uniform_is_seeded_and_bounded() {
        let a = uniform(-1f64, 1., Some(7));
        let b = uniform(-1f64, 1., Some(7));
        for i in 0..100 {
            let x = a.read_flat(i);
            assert_eq!(x, b.read_flat(i));
            assert!((-1. ..1.).contains(&x));
        }
    }

    #[test]
    fn normal_mean_is_close() {
        let n = normal(3f64, 0.5, None);
        let mean = (0..10_000).map(|i| n.read_flat(i)).sum::<f64>() / 10_000.;
        assert!((mean - 3.).abs() < 0.05);
    }

    #[test]
    fn generators_are_not_linear_except_scalar() {
        assert!(ScalarExpr::<f32>::TRAITS.is_linear);
        assert!(!SequenceGenerator::<f32>::TRAITS.is_linear);
        assert!(!UniformGenerator::<f32>::TRAITS.is_linear);
        assert!(!NormalGenerator::<f32>::TRAITS.is_linear);
        assert!(NormalGenerator::<f32>::TRAITS.is_generator);
    }
}
