use lazet_core::{config, counters, prelude::*};

fn aliases<E: Expr, C: Container>(e: &E, c: &C) -> bool {
    e.alias(&c.region())
}

fn square(values: [f64; 4]) -> Result<DynMatrix<f64>, LazetError> {
    DynMatrix::from_vec([2, 2], values.to_vec())
}

#[test]
fn product_reads_its_operands() -> Result<(), LazetError> {
    let a = square([1., 2., 3., 4.])?;
    let b = square([0., 1., 1., 0.])?;
    let z = square([0.; 4])?;
    let product = &a * &b;
    assert!(aliases(&product, &a));
    assert!(aliases(&product, &b));
    assert!(!aliases(&product, &z));

    // handles share storage
    let a2 = a.clone();
    assert!(aliases(&product, &a2));
    assert!(!aliases(&product, &a.deep_clone()?));
    Ok(())
}

#[test]
fn generators_never_alias() -> Result<(), LazetError> {
    let a = square([1.; 4])?;
    assert!(!aliases(&scalar(1.), &a));
    assert!(!aliases(&uniform(0., 1., Some(7)), &a));
    assert!(!aliases(&sequence(0., 1.), &a));
    assert!(aliases(&add(&a, scalar(2.))?, &a));
    Ok(())
}

#[test]
fn rows_of_one_storage_alias() -> Result<(), LazetError> {
    let m = DynMatrix::from_vec([3, 2], vec![1., 2., 3., 4., 5., 6.])?;
    let other = DynMatrix::<f64>::zeros([3, 2])?;
    let row0 = slice(m.clone(), 0)?;
    let row2 = slice(m.clone(), 2)?;
    assert!(aliases(&row0, &m));
    // whole storage is borrowed while writing
    assert!(aliases(&row0, &row2));
    assert!(!aliases(&row0, &other));

    row0.assign(&row2)?;
    assert_eq!(m.to_vec()?, [5., 6., 3., 4., 5., 6.]);
    Ok(())
}

#[test]
fn assign_product_into_operand() -> Result<(), LazetError> {
    let _ = env_logger::builder().is_test(true).try_init();
    config::update(|c| c.counters = true);
    counters::reset_counters();

    let a = square([1., 2., 3., 4.])?;
    let b = square([2., 0., 1., 3.])?;
    let expected = materialize(&a * &b)?;
    a.assign(&a * &b)?;
    assert_eq!(a.to_vec()?, expected.to_vec()?);
    assert_eq!(a.to_vec()?, [4., 6., 10., 12.]);
    assert_eq!(counters::get("assign:alias_copy"), 1);

    // no copy without aliasing
    let c = square([0.; 4])?;
    c.assign(&a * &b)?;
    assert_eq!(counters::get("assign:alias_copy"), 1);
    Ok(())
}

#[test]
fn assign_transpose_into_operand() -> Result<(), LazetError> {
    let a = DynMatrix::from_vec([3, 3], (1..=9).map(f64::from).collect())?;
    a.assign(transpose(&a)?)?;
    assert_eq!(a.to_vec()?, [1., 4., 7., 2., 5., 8., 3., 6., 9.]);
    Ok(())
}

#[test]
fn elementwise_self_reference() -> Result<(), LazetError> {
    let a = square([1., 2., 3., 4.])?;
    // reads and writes the same position only
    a.assign(add(&a, &a)?)?;
    assert_eq!(a.to_vec()?, [2., 4., 6., 8.]);
    Ok(())
}

#[test]
fn compound_with_alias() -> Result<(), LazetError> {
    let a = square([1., 1., 0., 1.])?;
    a.assign_add(&a * &a)?;
    assert_eq!(a.to_vec()?, [2., 3., 0., 2.]);
    Ok(())
}
