use itertools::{iproduct, Itertools};
use lazet_core::prelude::*;
use rstest::rstest;

#[test]
fn prepend_repeats_whole_vector() -> Result<(), LazetError> {
    let row = DynMatrix::from_vec([2], vec![1, 2])?;
    let out = DynMatrix::zeros([3, 2])?;
    out.assign(rep_prepend::<Sh1<3>, _>(&row))?;
    assert_eq!(out.to_vec()?, [1, 2, 1, 2, 1, 2]);

    out.assign(rep_prepend_dyn(&row, [3])?)?;
    assert_eq!(out.to_vec()?, [1, 2, 1, 2, 1, 2]);
    Ok(())
}

#[test]
fn append_repeats_each_element() -> Result<(), LazetError> {
    let column = DynMatrix::from_vec([2], vec![1, 2])?;
    let out = DynMatrix::zeros([2, 3])?;
    out.assign(rep_append::<Sh1<3>, _>(&column))?;
    assert_eq!(out.to_vec()?, [1, 1, 1, 2, 2, 2]);

    out.assign(rep_append_dyn(&column, [3])?)?;
    assert_eq!(out.to_vec()?, [1, 1, 1, 2, 2, 2]);
    Ok(())
}

#[test]
fn repeated_generators_take_repeat_shape() -> Result<(), LazetError> {
    let out = DynMatrix::<f64>::zeros([3])?;
    out.assign(rep_prepend::<Sh1<3>, _>(scalar(1.)))?;
    assert_eq!(out.to_vec()?, [1.; 3]);
    out.assign(rep_append::<Sh1<3>, _>(scalar(2.)))?;
    assert_eq!(out.to_vec()?, [2.; 3]);

    let r = rep_prepend_dyn(scalar(1.), [2, 3])?;
    assert_eq!(r.shape(), Shape::from([2, 3]));
    assert_eq!(r.size(), 6);
    let grid = DynMatrix::<f64>::zeros([2, 3])?;
    grid.assign(rep_append_dyn(sequence(0., 1.), [2, 3])?)?;
    assert_eq!(grid.to_vec()?, [0., 1., 2., 3., 4., 5.]);

    // shapes still have to match
    assert!(matches!(
        out.assign(rep_prepend::<Sh1<4>, _>(scalar(1.))),
        Err(LazetError::ShapeError(_))
    ));
    Ok(())
}

#[rstest]
fn flat_index_round_trip(
    #[values(1, 2, 3)] r: usize,
    #[values(1, 4)] c: usize,
    #[values(1, 2, 5)] k: usize,
) -> Result<(), LazetError> {
    let values = (0..r * c).map(|x| x as i32 * 7 - 3).collect_vec();
    let inner = DynMatrix::from_vec([r, c], values)?;

    let append = rep_append_dyn(&inner, [k])?;
    let prepend = rep_prepend_dyn(&inner, [k])?;
    assert_eq!(append.shape(), Shape::from([r, c, k]));
    assert_eq!(prepend.shape(), Shape::from([k, r, c]));

    for i in 0..r * c * k {
        assert_eq!(append.read_flat(i), inner.read_flat(i / k));
        assert_eq!(prepend.read_flat(i), inner.read_flat(i % (r * c)));
    }
    Ok(())
}

#[test]
fn coordinates_agree_with_flat_reads() -> Result<(), LazetError> {
    let inner = DynMatrix::from_vec([2, 3], (1..=6).collect_vec())?;
    let r = rep_prepend_dyn(&inner, [2, 2])?;
    let dims = r.shape();
    let coordinates = dims.iter().map(|&d| 0..d).multi_cartesian_product();
    for (i, index) in coordinates.enumerate() {
        assert_eq!(r.read_at(&index), r.read_flat(i), "at {index:?}");
    }
    Ok(())
}

#[test]
fn append_coordinates_ignore_repeat_axes() -> Result<(), LazetError> {
    let inner = DynMatrix::from_vec([2, 3], (1..=6).collect_vec())?;
    let r = rep_append_dyn(&inner, [4])?;
    for (i, j, k) in iproduct!(0..2, 0..3, 0..4) {
        assert_eq!(r.read_at(&[i, j, k]), inner.read_at(&[i, j]));
    }
    Ok(())
}

#[test]
fn column_major_inner() -> Result<(), LazetError> {
    // [[1, 2], [3, 4]] stored by columns
    let inner = DynMatrix::from_vec_ordered([2, 2], vec![1, 3, 2, 4], Order::ColumnMajor)?;
    let out = DynMatrix::zeros([2, 2, 2])?;
    out.assign(rep_append::<Sh1<2>, _>(&inner))?;
    assert_eq!(out.to_vec()?, [1, 1, 2, 2, 3, 3, 4, 4]);
    Ok(())
}

#[test]
fn broadcast_in_expression() -> Result<(), LazetError> {
    let bias = DynMatrix::from_vec([3], vec![1., 2., 3.])?;
    let x = DynMatrix::filled([2, 3], 10.)?;
    let out = DynMatrix::zeros([2, 3])?;
    out.assign(add(&x, rep_prepend::<Sh1<2>, _>(&bias))?)?;
    assert_eq!(out.to_vec()?, [11., 12., 13., 11., 12., 13.]);
    Ok(())
}

#[test]
fn repeat_count_overflow() -> Result<(), LazetError> {
    let a = DynMatrix::<f32>::zeros([4])?;
    assert!(matches!(
        rep_append_dyn(&a, [usize::MAX, 2]),
        Err(LazetError::Overflow(_))
    ));
    assert!(matches!(
        rep_prepend_dyn(&a, [usize::MAX / 2]),
        Err(LazetError::Overflow(_))
    ));
    assert!(rep_prepend_dyn(&a, [usize::MAX / 8]).is_ok());
    Ok(())
}

#[test]
fn display() -> Result<(), LazetError> {
    let a = DynMatrix::<f32>::zeros([2])?;
    assert_eq!(
        rep_prepend::<Sh2<3, 4>, _>(&a).to_string(),
        "rep_l[3, 4](dyn_matrix[2])"
    );
    Ok(())
}
