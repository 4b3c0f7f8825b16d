//! Evaluation of expressions into containers.
//!
//! [`assign`] is the only place where elements are produced. It checks sizes,
//! routes aliased expressions through a fresh matrix, lets a temporary at the
//! top write straight into the destination and otherwise materializes all
//! temporaries before walking the destination in one of three ways:
//! by coordinate when storage orders differ, with vector loads when the whole
//! tree is linear and vectorizable, or element by element.

use crate::{
    config,
    container::{Container, DynMatrix},
    counters,
    error::LazetError,
    generator::scalar,
    scalar::Scalar,
    shape::{self, Order},
    traits::Expr,
};

fn check_sizes<C: Container, E: Expr<Elem = C::Elem>>(dest: &C, expr: &E) -> Result<(), LazetError> {
    // generators have no shape and fit anything
    if E::TRAITS.is_generator {
        return Ok(());
    }
    if expr.size() != dest.size() {
        return Err(LazetError::shape_error(format!(
            "can not assign expression of shape {} to {}",
            expr.shape(),
            dest.shape()
        )));
    }
    if expr.storage_order() != dest.storage_order() && expr.shape() != dest.shape() {
        return Err(LazetError::shape_error(format!(
            "can not assign expression of shape {} to {} with different storage order",
            expr.shape(),
            dest.shape()
        )));
    }
    Ok(())
}

fn by_coordinate<C: Container, E: Expr<Elem = C::Elem>>(dest: &C, expr: &E) -> bool {
    !E::TRAITS.is_generator && expr.storage_order() != dest.storage_order()
}

// Fresh matrix laid out like `dest` holding values of `expr`
fn evaluate_copy<C: Container, E: Expr<Elem = C::Elem>>(
    dest: &C,
    expr: E,
) -> Result<DynMatrix<C::Elem>, LazetError> {
    counters::increment("assign:alias_copy");
    log::debug!("Expression aliases destination {}, evaluating through a copy", dest.shape());
    let tmp = DynMatrix::zeros_ordered(dest.shape(), dest.storage_order())?;
    assign(&tmp, expr)?;
    Ok(tmp)
}

/// `dest = expr`
pub fn assign<C: Container, E: Expr<Elem = C::Elem>>(dest: &C, mut expr: E) -> Result<(), LazetError> {
    check_sizes(dest, &expr)?;
    if expr.alias(&dest.region()) {
        let tmp = evaluate_copy(dest, expr)?;
        return assign(dest, &tmp);
    }
    if E::TRAITS.is_temporary && expr.evaluate_into(dest)? {
        return Ok(());
    }
    expr.allocate_temporaries()?;
    expr.evaluate_temporaries()?;
    expr.sync_host()?;

    let config = config::current();
    let mut out = dest.write()?;
    if by_coordinate(dest, &expr) {
        let dims = dest.shape();
        let order = dest.storage_order();
        let mut index = vec![0; dims.rank()];
        for (i, x) in out.iter_mut().enumerate() {
            shape::unravel(dims.as_slice(), i, order, &mut index);
            *x = expr.read_at(&index);
        }
    } else if E::TRAITS.is_linear && config.vectorize && E::vectorizable(config.vector_mode) {
        match config.vector_mode.lanes(<C::Elem as Scalar>::byte_size()) {
            16.. => write_packed::<16, _>(&expr, &mut out),
            8.. => write_packed::<8, _>(&expr, &mut out),
            4.. => write_packed::<4, _>(&expr, &mut out),
            2.. => write_packed::<2, _>(&expr, &mut out),
            _ => write_flat(&expr, &mut out),
        }
    } else {
        write_flat(&expr, &mut out);
    }
    Ok(())
}

fn write_flat<E: Expr>(expr: &E, out: &mut [E::Elem]) {
    for (i, x) in out.iter_mut().enumerate() {
        *x = expr.read_flat(i);
    }
}

fn write_packed<const W: usize, E: Expr>(expr: &E, out: &mut [E::Elem]) {
    let body = out.len() - out.len() % W;
    for i in (0..body).step_by(W) {
        expr.load::<W>(i).store(&mut out[i..]);
    }
    for (i, x) in out.iter_mut().enumerate().skip(body) {
        *x = expr.read_flat(i);
    }
}

// dest[i] = f(dest[i], expr[i])
fn compound<C, E>(dest: &C, mut expr: E, f: impl Fn(C::Elem, C::Elem) -> C::Elem) -> Result<(), LazetError>
where
    C: Container,
    E: Expr<Elem = C::Elem>,
{
    check_sizes(dest, &expr)?;
    if expr.alias(&dest.region()) {
        let tmp = evaluate_copy(dest, expr)?;
        return compound(dest, &tmp, f);
    }
    expr.allocate_temporaries()?;
    expr.evaluate_temporaries()?;
    expr.sync_host()?;
    dest.storage().ensure_host_up_to_date()?;

    let mut out = dest.write()?;
    if by_coordinate(dest, &expr) {
        let dims = dest.shape();
        let order = dest.storage_order();
        let mut index = vec![0; dims.rank()];
        for (i, x) in out.iter_mut().enumerate() {
            shape::unravel(dims.as_slice(), i, order, &mut index);
            *x = f(*x, expr.read_at(&index));
        }
    } else {
        for (i, x) in out.iter_mut().enumerate() {
            *x = f(*x, expr.read_flat(i));
        }
    }
    Ok(())
}

/// `dest += expr`
pub fn assign_add<C: Container, E: Expr<Elem = C::Elem>>(dest: &C, expr: E) -> Result<(), LazetError> {
    compound(dest, expr, <C::Elem as Scalar>::add)
}

/// `dest -= expr`
pub fn assign_sub<C: Container, E: Expr<Elem = C::Elem>>(dest: &C, expr: E) -> Result<(), LazetError> {
    compound(dest, expr, <C::Elem as Scalar>::sub)
}

/// `dest *= expr`, elementwise
pub fn assign_mul<C: Container, E: Expr<Elem = C::Elem>>(dest: &C, expr: E) -> Result<(), LazetError> {
    compound(dest, expr, <C::Elem as Scalar>::mul)
}

/// `dest *= value`
pub fn assign_scale<C: Container>(dest: &C, value: C::Elem) -> Result<(), LazetError> {
    compound(dest, scalar(value), <C::Elem as Scalar>::mul)
}

/// Sum of all elements, zero for empty expressions and generators
pub fn sum<E: Expr>(mut expr: E) -> Result<E::Elem, LazetError> {
    expr.allocate_temporaries()?;
    expr.evaluate_temporaries()?;
    expr.sync_host()?;
    Ok((0..expr.size()).fold(<E::Elem as Scalar>::zero(), |acc, i| acc.add(expr.read_flat(i))))
}

/// Mean of all elements.
///
/// Fails with [`LazetError::ShapeError`] on expressions without elements.
pub fn mean<E: Expr>(expr: E) -> Result<E::Elem, LazetError> {
    let n = expr.size();
    if n == 0 {
        return Err(LazetError::shape_error(format!(
            "mean of expression of shape {}",
            expr.shape()
        )));
    }
    let total = sum(expr)?;
    Ok(total.div(<E::Elem as Scalar>::from_f64(n as f64)))
}

/// New matrix holding values of `expr`, laid out in its storage order
pub fn materialize<E: Expr>(expr: E) -> Result<DynMatrix<E::Elem>, LazetError> {
    let order = if E::TRAITS.is_generator {
        Order::RowMajor
    } else {
        expr.storage_order()
    };
    let m = DynMatrix::zeros_ordered(expr.shape(), order)?;
    assign(&m, expr)?;
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binary::{add, times},
        generator::sequence,
        ops::{matmul, transpose},
    };

    #[test]
    fn self_product_goes_through_copy() -> Result<(), LazetError> {
        counters::reset_counters();
        config::update(|c| c.counters = true);
        let a = DynMatrix::from_vec([2, 2], vec![1, 2, 3, 4])?;
        let b = DynMatrix::from_vec([2, 2], vec![0, 1, 1, 0])?;
        assign(&a, matmul(a.clone(), &b)?)?;
        assert_eq!(a.to_vec()?, [2, 1, 4, 3]);
        assert_eq!(counters::get("assign:alias_copy"), 1);
        Ok(())
    }

    #[test]
    fn self_transpose() -> Result<(), LazetError> {
        let a = DynMatrix::from_vec([2, 2], vec![1, 2, 3, 4])?;
        assign(&a, transpose(a.clone())?)?;
        assert_eq!(a.to_vec()?, [1, 3, 2, 4]);
        Ok(())
    }

    #[test]
    fn compound_with_alias() -> Result<(), LazetError> {
        let a = DynMatrix::from_vec([3], vec![1, 2, 3])?;
        assign_add(&a, times(&a, scalar(2))?)?;
        assert_eq!(a.to_vec()?, [3, 6, 9]);
        Ok(())
    }

    #[test]
    fn generator_fills_any_shape() -> Result<(), LazetError> {
        let a = DynMatrix::<i32>::zeros([2, 3])?;
        assign(&a, sequence(1, 2))?;
        assert_eq!(a.to_vec()?, [1, 3, 5, 7, 9, 11]);
        Ok(())
    }

    #[test]
    fn sizes_must_match() -> Result<(), LazetError> {
        let a = DynMatrix::<f32>::zeros([2, 3])?;
        let b = DynMatrix::<f32>::zeros([4])?;
        assert!(matches!(assign(&a, &b), Err(LazetError::ShapeError(_))));
        assert!(matches!(assign_add(&a, &b), Err(LazetError::ShapeError(_))));
        Ok(())
    }

    #[test]
    fn reductions() -> Result<(), LazetError> {
        let a = DynMatrix::from_vec([4], vec![1., 2., 3., 6.])?;
        assert_eq!(sum(&a)?, 12.);
        assert_eq!(mean(add(&a, scalar(1.))?)?, 4.);
        let empty = DynMatrix::<f64>::zeros([0])?;
        assert_eq!(sum(&empty)?, 0.);
        assert!(mean(&empty).is_err());
        Ok(())
    }

    #[test]
    fn materialize_keeps_order() -> Result<(), LazetError> {
        let a = DynMatrix::from_vec_ordered([2, 2], vec![1, 3, 2, 4], Order::ColumnMajor)?;
        let m = materialize(times(&a, scalar(10))?)?;
        assert_eq!(m.storage_order(), Order::ColumnMajor);
        assert_eq!(m.to_vec()?, [10, 30, 20, 40]);
        Ok(())
    }
}
