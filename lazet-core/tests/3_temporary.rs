use lazet_core::{
    config, counters,
    ops::{MatMulOp, TransposeOp},
    prelude::*,
    temporary::{TemporaryBinaryExpr, TemporaryUnaryExpr},
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
    config::update(|c| c.counters = true);
    counters::reset_counters();
}

fn operands() -> Result<(DynMatrix<f64>, DynMatrix<f64>), LazetError> {
    let a = DynMatrix::from_vec([2, 3], vec![1., 2., 3., 4., 5., 6.])?;
    let b = DynMatrix::from_vec([3, 2], vec![0.5, -1., 2., 0.25, -3., 1.5])?;
    Ok((a, b))
}

#[test]
fn evaluate_is_idempotent() -> Result<(), LazetError> {
    init();
    let (a, b) = operands()?;
    let mut t = matmul(&a, &b)?;
    t.allocate_temporary()?;
    t.evaluate()?;
    let first = t.result().to_vec()?;
    t.evaluate()?;
    assert_eq!(t.result().to_vec()?, first);
    assert_eq!(counters::get("temporary:evaluate"), 1);
    assert_eq!(counters::get("temporary:allocate"), 1);
    Ok(())
}

#[test]
fn allocation_happens_once() -> Result<(), LazetError> {
    init();
    let (a, b) = operands()?;
    let mut t = matmul(&a, &b)?;
    assert!(!t.is_allocated());
    t.allocate_temporary()?;
    t.allocate_temporary()?;
    assert!(t.is_allocated() && !t.is_evaluated());
    assert_eq!(counters::get("temporary:allocate"), 1);
    Ok(())
}

#[test]
fn forced_product_writes_caller_storage() -> Result<(), LazetError> {
    init();
    let a = DynMatrix::filled([4, 4], 1.0)?;
    let b = DynMatrix::filled([4, 4], 1.0)?;
    let c = DynMatrix::zeros([4, 4])?;
    let mut t = TemporaryBinaryExpr::forced(&a, &b, MatMulOp, c.clone())?;
    assert!(t.is_forced());
    t.direct_evaluate(&c)?;
    assert_eq!(c.to_vec()?, vec![4.0; 16]);
    assert_eq!(counters::get("temporary:allocate"), 0);
    assert!(!t.is_allocated());
    Ok(())
}

#[test]
fn forced_result_must_have_result_shape() -> Result<(), LazetError> {
    let (a, b) = operands()?;
    let wrong = DynMatrix::zeros([3, 3])?;
    assert!(matches!(
        TemporaryBinaryExpr::forced(&a, &b, MatMulOp, wrong),
        Err(LazetError::ShapeError(_))
    ));
    Ok(())
}

#[test]
fn forced_product_into_other_destination() -> Result<(), LazetError> {
    init();
    let (a, b) = operands()?;
    let bound = DynMatrix::zeros([2, 2])?;
    let d = DynMatrix::zeros([2, 2])?;
    let mut t = TemporaryBinaryExpr::forced(&a, &b, MatMulOp, bound.clone())?;
    t.direct_evaluate(&d)?;
    assert_eq!(d.to_vec()?, [-4.5, 4., -6., 6.25]);
    assert_eq!(bound.to_vec()?, [0.; 4]);
    assert_eq!(counters::get("temporary:allocate"), 0);
    Ok(())
}

#[test]
fn forced_product_direct_into_operand() -> Result<(), LazetError> {
    init();
    let a = DynMatrix::from_vec([2, 2], vec![1., 2., 3., 4.])?;
    let b = DynMatrix::from_vec([2, 2], vec![2., 0., 1., 3.])?;
    let bound = DynMatrix::zeros([2, 2])?;
    let mut t = TemporaryBinaryExpr::forced(&a, &b, MatMulOp, bound)?;
    t.direct_evaluate(&a)?;
    assert_eq!(a.to_vec()?, [4., 6., 10., 12.]);

    let mut t = TemporaryBinaryExpr::forced(&b, &a, MatMulOp, b.clone())?;
    t.direct_evaluate(&b)?;
    assert_eq!(b.to_vec()?, [8., 12., 34., 42.]);
    Ok(())
}

#[test]
fn forced_transpose_direct_into_operand() -> Result<(), LazetError> {
    init();
    let a = DynMatrix::from_vec([2, 2], vec![1, 2, 3, 4])?;
    let mut t = TemporaryUnaryExpr::forced(&a, TransposeOp, DynMatrix::zeros([2, 2])?)?;
    t.direct_evaluate(&a)?;
    assert_eq!(a.to_vec()?, [1, 3, 2, 4]);
    Ok(())
}

#[test]
fn forced_into_operand_storage() -> Result<(), LazetError> {
    init();
    let a = DynMatrix::from_vec([2, 2], vec![1, 2, 3, 4])?;
    let mut t = TemporaryUnaryExpr::forced(a.clone(), TransposeOp, a.clone())?;
    t.allocate_temporary()?;
    t.evaluate()?;
    assert_eq!(a.to_vec()?, [1, 3, 2, 4]);
    assert_eq!(counters::get("temporary:allocate"), 0);
    Ok(())
}

#[test]
#[should_panic(expected = "evaluate() called before allocate_temporary()")]
fn evaluate_before_allocate() {
    let (a, b) = operands().unwrap();
    let mut t = matmul(&a, &b).unwrap();
    let _ = t.evaluate();
}

#[test]
#[should_panic(expected = "result() read before evaluate()")]
fn result_before_evaluate() {
    let (a, b) = operands().unwrap();
    let mut t = matmul(&a, &b).unwrap();
    t.allocate_temporary().unwrap();
    let _ = t.result();
}

#[test]
#[should_panic(expected = "result() read before evaluate()")]
fn reading_unevaluated_reference_panics() {
    let (a, b) = operands().unwrap();
    let t = matmul(&a, &b).unwrap();
    let c = DynMatrix::zeros([2, 2]).unwrap();
    let _ = c.assign(&t);
}

#[test]
fn clone_shares_result() -> Result<(), LazetError> {
    init();
    let (a, b) = operands()?;
    let mut t = matmul(&a, &b)?;
    t.allocate_temporary()?;
    t.evaluate()?;
    let copy = t.clone();
    assert!(copy.is_evaluated());
    assert_eq!(copy.result().to_vec()?, t.result().to_vec()?);
    let c = DynMatrix::zeros([2, 2])?;
    c.assign(&copy)?;
    assert_eq!(c.to_vec()?, t.result().to_vec()?);
    assert_eq!(counters::get("temporary:evaluate"), 1);
    Ok(())
}

#[test]
fn take_leaves_source_unevaluated() -> Result<(), LazetError> {
    let (a, b) = operands()?;
    let mut t = matmul(&a, &b)?;
    t.allocate_temporary()?;
    t.evaluate()?;
    let expected = t.result().to_vec()?;
    let taken = t.take();
    assert!(taken.is_evaluated());
    assert_eq!(taken.result().to_vec()?, expected);
    assert!(!t.is_evaluated());
    assert!(!t.is_allocated());
    // source can be evaluated again
    t.allocate_temporary()?;
    t.evaluate()?;
    assert_eq!(t.result().to_vec()?, expected);
    Ok(())
}

#[test]
fn top_level_temporary_skips_its_buffer() -> Result<(), LazetError> {
    init();
    let (a, b) = operands()?;
    let c = DynMatrix::zeros([2, 2])?;
    c.assign(matmul(&a, &b)?)?;
    assert_eq!(c.to_vec()?, [-4.5, 4., -6., 6.25]);
    assert_eq!(counters::get("temporary:allocate"), 0);
    assert_eq!(counters::get("temporary:evaluate"), 1);
    Ok(())
}

#[test]
fn nested_temporaries_are_allocated() -> Result<(), LazetError> {
    init();
    let (a, b) = operands()?;
    let c = DynMatrix::zeros([2, 2])?;
    c.assign(add(matmul(&a, &b)?, scalar(1.))?)?;
    assert_eq!(c.to_vec()?, [-3.5, 5., -5., 7.25]);
    assert_eq!(counters::get("temporary:allocate"), 1);

    let d = DynMatrix::zeros([3, 3])?;
    d.assign(transpose(matmul(&b, &a)?)?)?;
    let expected = materialize(transpose(materialize(matmul(&b, &a)?)?)?)?;
    assert_eq!(d.to_vec()?, expected.to_vec()?);
    Ok(())
}

#[test]
fn display() -> Result<(), LazetError> {
    let (a, b) = operands()?;
    assert_eq!(
        matmul(&a, &b)?.to_string(),
        "mm_mul(dyn_matrix[2, 3], dyn_matrix[3, 2])"
    );
    assert_eq!(transpose(&a)?.to_string(), "transpose(dyn_matrix[2, 3])");
    Ok(())
}
