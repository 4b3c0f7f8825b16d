use crate::{
    container::{Container, DynMatrix},
    error::LazetError,
    gpu::{self, kernels, ConvolutionParams},
    scalar::Scalar,
    shape::Shape,
    temporary::{BinaryTempOp, TemporaryBinaryExpr},
    traits::Expr,
};

use super::{check_rank, device_operand, row_major, with_output};

/// 2D convolution of the last two dimensions of `a` with 2D kernel `k`.
///
/// The kernel is flipped, as in the mathematical definition. Leading dimensions
/// of `a` are independent planes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conv2Op {
    params: ConvolutionParams,
}

impl Conv2Op {
    /// Convolution with `params`
    #[must_use]
    pub fn new(params: ConvolutionParams) -> Conv2Op {
        Conv2Op { params }
    }

    fn out_extent(&self, d: usize, k: usize, axis: usize) -> usize {
        let p = &self.params;
        (d + 2 * p.padding[axis] - k) / p.stride[axis] + 1
    }
}

impl<A, B> BinaryTempOp<A, B> for Conv2Op
where
    A: Expr,
    B: Expr<Elem = A::Elem>,
{
    fn desc(&self) -> &'static str {
        "conv_2d"
    }

    fn check(&self, a: &A, k: &B) -> Result<(), LazetError> {
        check_rank("conv_2d", a, 2, usize::MAX)?;
        check_rank("conv_2d", k, 2, 2)?;
        let rank = a.dimensions();
        for axis in 0..2 {
            let d = a.dim(rank - 2 + axis);
            if self.params.stride[axis] == 0
                || k.dim(axis) == 0
                || d + 2 * self.params.padding[axis] < k.dim(axis)
            {
                return Err(LazetError::shape_error(format!(
                    "conv_2d of {} with kernel {}, stride {:?} and padding {:?}",
                    a.shape(),
                    k.shape(),
                    self.params.stride,
                    self.params.padding
                )));
            }
        }
        Ok(())
    }

    fn dimensions(&self, a: &A, _: &B) -> usize {
        a.dimensions()
    }

    fn dim(&self, a: &A, k: &B, d: usize) -> usize {
        let rank = a.dimensions();
        if d + 2 < rank {
            a.dim(d)
        } else {
            let axis = d + 2 - rank;
            self.out_extent(a.dim(d), k.dim(axis), axis)
        }
    }

    fn apply<C: Container<Elem = A::Elem>>(&self, a: &A, k: &B, c: &C) -> Result<(), LazetError> {
        let x_dims = a.shape();
        let w_dims = k.shape();
        let y_dims: Shape = BinaryTempOp::<A, B>::shape(self, a, k);
        if let Some(device) = gpu::offload_target() {
            if let (Some(x), Some(w), Some(y)) = (
                device_operand(a, x_dims.as_slice()),
                device_operand(k, w_dims.as_slice()),
                device_operand(c, y_dims.as_slice()),
            ) {
                return kernels::convolution_forward(&device, &self.params, &x, &w, &y);
            }
            log::debug!("conv_2d operands are not contiguous, convolving on cpu");
        }
        let input = row_major(a)?;
        let kernel = row_major(k)?;
        let rank = x_dims.rank();
        let (h, w) = (x_dims[rank - 2], x_dims[rank - 1]);
        let ow = y_dims[rank - 1];
        let plane_out = y_dims[rank - 2] * ow;
        let kernel_dims = [w_dims[0], w_dims[1]];
        let params = self.params;
        with_output(c, y_dims.as_slice(), |out| {
            // an empty input leaves only padding under the kernel
            if h * w == 0 {
                out.fill(<A::Elem as Scalar>::zero());
                return;
            }
            if out.is_empty() {
                return;
            }
            for (x, y) in input.chunks(h * w).zip(out.chunks_mut(plane_out)) {
                convolve_plane(&params, x, &kernel, y, [h, w], kernel_dims, ow);
            }
        })
    }
}

fn convolve_plane<T: Scalar>(
    params: &ConvolutionParams,
    x: &[T],
    kernel: &[T],
    y: &mut [T],
    [h, w]: [usize; 2],
    [kh, kw]: [usize; 2],
    ow: usize,
) {
    let [sh, sw] = params.stride;
    let [ph, pw] = params.padding;
    for (o, value) in y.iter_mut().enumerate() {
        let (oy, ox) = (o / ow, o % ow);
        let mut acc = T::zero();
        for i in 0..kh {
            let iy = oy * sh + i;
            if iy < ph || iy - ph >= h {
                continue;
            }
            for j in 0..kw {
                let ix = ox * sw + j;
                if ix < pw || ix - pw >= w {
                    continue;
                }
                let weight = kernel[(kh - 1 - i) * kw + (kw - 1 - j)];
                acc = acc.add(x[(iy - ph) * w + (ix - pw)].mul(weight));
            }
        }
        *value = acc;
    }
}

/// Lazy convolution of `a` with kernel `k` without padding, output shrinks by kernel size minus one
pub fn conv_2d_valid<A, B>(
    a: A,
    k: B,
) -> Result<TemporaryBinaryExpr<A, B, Conv2Op, DynMatrix<A::Elem>>, LazetError>
where
    A: Expr,
    B: Expr<Elem = A::Elem>,
{
    TemporaryBinaryExpr::new(a, k, Conv2Op::default())
}

/// Lazy convolution of `a` with kernel `k`
pub fn conv_2d<A, B>(
    a: A,
    k: B,
    stride: [usize; 2],
    padding: [usize; 2],
) -> Result<TemporaryBinaryExpr<A, B, Conv2Op, DynMatrix<A::Elem>>, LazetError>
where
    A: Expr,
    B: Expr<Elem = A::Elem>,
{
    TemporaryBinaryExpr::new(a, k, Conv2Op::new(ConvolutionParams { stride, padding }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Assign;

    #[test]
    fn valid_convolution_flips_kernel() -> Result<(), LazetError> {
        let a = DynMatrix::from_vec([3, 3], vec![1, 2, 3, 4, 5, 6, 7, 8, 9])?;
        let k = DynMatrix::from_vec([2, 2], vec![1, 0, 0, 0])?;
        let c = DynMatrix::zeros([2, 2])?;
        c.assign(conv_2d_valid(&a, &k)?)?;
        // only the flipped corner weight hits, picking the bottom right of each window
        assert_eq!(c.to_vec()?, [5, 6, 8, 9]);
        Ok(())
    }

    #[test]
    fn padding_and_stride() -> Result<(), LazetError> {
        let a = DynMatrix::filled([3, 3], 1.)?;
        let k = DynMatrix::filled([3, 3], 1.)?;
        let e = conv_2d(&a, &k, [2, 2], [1, 1])?;
        assert_eq!(e.shape(), Shape::from([2, 2]));
        let c = DynMatrix::zeros([2, 2])?;
        c.assign(e)?;
        assert_eq!(c.to_vec()?, [4., 4., 4., 4.]);
        Ok(())
    }

    #[test]
    fn padded_empty_input_convolves_to_zero() -> Result<(), LazetError> {
        let a = DynMatrix::<f64>::zeros([2, 0, 2])?;
        let k = DynMatrix::filled([1, 1], 3.)?;
        let e = conv_2d(&a, &k, [1, 1], [1, 0])?;
        assert_eq!(e.shape(), Shape::from([2, 2, 2]));
        let c = DynMatrix::filled([2, 2, 2], -1.)?;
        c.assign(e)?;
        assert_eq!(c.to_vec()?, [0.; 8]);
        Ok(())
    }

    #[test]
    fn kernel_must_fit() -> Result<(), LazetError> {
        let a = DynMatrix::<f32>::zeros([2, 2])?;
        let k = DynMatrix::<f32>::zeros([3, 3])?;
        assert!(conv_2d_valid(&a, &k).is_err());
        Ok(())
    }
}
