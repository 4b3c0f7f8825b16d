#[cfg(feature = "parallel")]
use crate::config;
use crate::{
    container::{Container, DynMatrix},
    error::LazetError,
    gpu::{self, kernels, PoolingMode, PoolingParams},
    scalar::Scalar,
    shape::Shape,
    temporary::{TemporaryUnaryExpr, UnaryTempOp},
    traits::Expr,
};

use super::{check_rank, device_operand, row_major, with_output};

/// 2D pooling over the last two dimensions, leading dimensions are independent planes
#[derive(Debug, Clone, Copy)]
pub struct PoolOp {
    params: PoolingParams,
}

impl PoolOp {
    /// Pooling with `params`
    #[must_use]
    pub fn new(params: PoolingParams) -> PoolOp {
        PoolOp { params }
    }

    /// Pooling parameters
    #[must_use]
    pub fn params(&self) -> &PoolingParams {
        &self.params
    }

    fn pooled(&self, d: usize, k: usize) -> usize {
        let p = &self.params;
        (d + 2 * p.padding[k] - p.window[k]) / p.stride[k] + 1
    }
}

impl<A: Expr> UnaryTempOp<A> for PoolOp {
    fn desc(&self) -> &'static str {
        match self.params.mode {
            PoolingMode::Max => "max_pool_2d",
            PoolingMode::Average => "avg_pool_2d",
        }
    }

    fn check(&self, a: &A) -> Result<(), LazetError> {
        check_rank(UnaryTempOp::<A>::desc(self), a, 2, usize::MAX)?;
        let p = &self.params;
        let rank = a.dimensions();
        for k in 0..2 {
            let d = a.dim(rank - 2 + k);
            if p.window[k] == 0 || p.stride[k] == 0 || d + 2 * p.padding[k] < p.window[k] {
                return Err(LazetError::shape_error(format!(
                    "{} with window {:?}, stride {:?} and padding {:?} on {}",
                    UnaryTempOp::<A>::desc(self),
                    p.window,
                    p.stride,
                    p.padding,
                    a.shape()
                )));
            }
        }
        Ok(())
    }

    fn dimensions(&self, a: &A) -> usize {
        a.dimensions()
    }

    fn dim(&self, a: &A, d: usize) -> usize {
        let rank = a.dimensions();
        if d + 2 < rank {
            a.dim(d)
        } else {
            self.pooled(a.dim(d), d + 2 - rank)
        }
    }

    fn apply<C: Container<Elem = A::Elem>>(&self, a: &A, c: &C) -> Result<(), LazetError> {
        let x_dims = a.shape();
        let y_dims: Shape = UnaryTempOp::<A>::shape(self, a);
        if let Some(device) = gpu::offload_target() {
            if let (Some(x), Some(y)) = (
                device_operand(a, x_dims.as_slice()),
                device_operand(c, y_dims.as_slice()),
            ) {
                return kernels::pooling_forward(&device, &self.params, &x, &y);
            }
            log::debug!("{} operands are not contiguous, pooling on cpu", UnaryTempOp::<A>::desc(self));
        }
        let input = row_major(a)?;
        let rank = x_dims.rank();
        let (h, w) = (x_dims[rank - 2], x_dims[rank - 1]);
        let (oh, ow) = (y_dims[rank - 2], y_dims[rank - 1]);
        let params = self.params;
        with_output(c, y_dims.as_slice(), |out| {
            pool_planes(&params, &input, out, [h, w], [oh, ow]);
        })
    }
}

fn pool_planes<T: Scalar>(
    params: &PoolingParams,
    input: &[T],
    out: &mut [T],
    [h, w]: [usize; 2],
    [oh, ow]: [usize; 2],
) {
    // an empty input leaves only padding in every window
    if h * w == 0 {
        out.fill(T::zero());
        return;
    }
    if out.is_empty() {
        return;
    }
    let plane = |(x, y): (&[T], &mut [T])| pool_plane(params, x, y, [h, w], ow);
    #[cfg(feature = "parallel")]
    {
        let config = config::current();
        if config.parallel && out.len() >= config.parallel_threshold {
            use rayon::prelude::*;
            input
                .par_chunks(h * w)
                .zip(out.par_chunks_mut(oh * ow))
                .for_each(plane);
            return;
        }
    }
    input.chunks(h * w).zip(out.chunks_mut(oh * ow)).for_each(plane);
}

fn pool_plane<T: Scalar>(params: &PoolingParams, x: &[T], y: &mut [T], [h, w]: [usize; 2], ow: usize) {
    let [wh, ww] = params.window;
    let [sh, sw] = params.stride;
    let [ph, pw] = params.padding;
    for (o, value) in y.iter_mut().enumerate() {
        let (oy, ox) = (o / ow, o % ow);
        // window in padded coordinates, clipped to the input
        let (y0, x0) = (oy * sh, ox * sw);
        let rows = y0.max(ph)..(y0 + wh).min(h + ph);
        let cols = x0.max(pw)..(x0 + ww).min(w + pw);
        let mut acc = match params.mode {
            PoolingMode::Max => T::lowest(),
            PoolingMode::Average => T::zero(),
        };
        let mut count = 0usize;
        for iy in rows {
            for ix in cols.clone() {
                let v = x[(iy - ph) * w + (ix - pw)];
                acc = match params.mode {
                    PoolingMode::Max => acc.max(v),
                    PoolingMode::Average => acc.add(v),
                };
                count += 1;
            }
        }
        *value = match params.mode {
            _ if count == 0 => T::zero(),
            PoolingMode::Max => acc,
            PoolingMode::Average => acc.div(T::from_f64(count as f64)),
        };
    }
}

/// Lazy pooling of `a` with `params`
pub fn pool_2d<A: Expr>(
    a: A,
    params: PoolingParams,
) -> Result<TemporaryUnaryExpr<A, PoolOp, DynMatrix<A::Elem>>, LazetError> {
    TemporaryUnaryExpr::new(a, PoolOp::new(params))
}

/// Lazy max pooling of the last two dimensions of `a`
pub fn max_pool_2d<A: Expr>(
    a: A,
    window: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
) -> Result<TemporaryUnaryExpr<A, PoolOp, DynMatrix<A::Elem>>, LazetError> {
    pool_2d(
        a,
        PoolingParams {
            mode: PoolingMode::Max,
            window,
            stride,
            padding,
        },
    )
}

/// Lazy average pooling of the last two dimensions of `a`, padding is not counted.
///
/// Windows covering only padding produce zero, for max pooling as well.
pub fn avg_pool_2d<A: Expr>(
    a: A,
    window: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
) -> Result<TemporaryUnaryExpr<A, PoolOp, DynMatrix<A::Elem>>, LazetError> {
    pool_2d(
        a,
        PoolingParams {
            mode: PoolingMode::Average,
            window,
            stride,
            padding,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Assign;

    #[test]
    fn max_2x2() -> Result<(), LazetError> {
        let a = DynMatrix::from_vec(
            [4, 4],
            vec![
                1., 2., 3., 4., //
                5., 6., 7., 8., //
                9., 10., 11., 12., //
                13., 14., 15., 16.,
            ],
        )?;
        let p = max_pool_2d(&a, [2, 2], [2, 2], [0, 0])?;
        assert_eq!(p.shape(), Shape::from([2, 2]));
        let c = DynMatrix::zeros([2, 2])?;
        c.assign(p)?;
        assert_eq!(c.to_vec()?, [6., 8., 14., 16.]);
        Ok(())
    }

    #[test]
    fn average_excludes_padding() -> Result<(), LazetError> {
        let a = DynMatrix::from_vec([2, 2], vec![1., 2., 3., 4.])?;
        let p = avg_pool_2d(&a, [2, 2], [1, 1], [1, 1])?;
        assert_eq!(p.shape(), Shape::from([3, 3]));
        let c = DynMatrix::zeros([3, 3])?;
        c.assign(p)?;
        assert_eq!(c.to_vec()?, [1., 1.5, 2., 2., 2.5, 3., 3., 3.5, 4.]);
        Ok(())
    }

    #[test]
    fn leading_dims_are_planes() -> Result<(), LazetError> {
        let a = DynMatrix::from_vec([2, 2, 2], vec![1, 2, 3, 4, 8, 7, 6, 5])?;
        let c = DynMatrix::zeros([2, 1, 1])?;
        c.assign(max_pool_2d(&a, [2, 2], [1, 1], [0, 0])?)?;
        assert_eq!(c.to_vec()?, [4, 8]);
        Ok(())
    }

    #[test]
    fn padded_empty_input_pools_to_zero() -> Result<(), LazetError> {
        let a = DynMatrix::<f32>::zeros([0, 3])?;
        let p = max_pool_2d(&a, [2, 2], [1, 1], [1, 1])?;
        assert_eq!(p.shape(), Shape::from([1, 4]));
        let c = DynMatrix::filled([1, 4], 7f32)?;
        c.assign(p)?;
        assert_eq!(c.to_vec()?, [0.; 4]);
        c.assign(crate::generator::scalar(7f32))?;
        c.assign(avg_pool_2d(&a, [2, 2], [1, 1], [1, 1])?)?;
        assert_eq!(c.to_vec()?, [0.; 4]);
        Ok(())
    }

    #[test]
    fn window_larger_than_input() -> Result<(), LazetError> {
        let a = DynMatrix::<f32>::zeros([2, 2])?;
        assert!(max_pool_2d(&a, [3, 3], [1, 1], [0, 0]).is_err());
        assert!(max_pool_2d(&a, [2, 2], [0, 1], [0, 0]).is_err());
        Ok(())
    }
}
