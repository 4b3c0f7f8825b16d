use std::rc::Rc;

use lazet_core::{
    error::{BackendError, ErrorStatus},
    gpu,
    prelude::*,
};
use lazet_sim::SimDevice;
use rstest::rstest;

fn sim() -> Rc<SimDevice> {
    let _ = env_logger::builder().is_test(true).try_init();
    let sim = Rc::new(SimDevice::new(1 << 20));
    gpu::set_device(Some(sim.clone()));
    sim
}

fn values(dims: &[usize], seed: usize) -> Result<DynMatrix<f64>, LazetError> {
    let n = dims.iter().product::<usize>();
    DynMatrix::from_vec(dims, (0..n).map(|i| ((i * 13 + seed) % 17) as f64 - 8.).collect())
}

#[rstest]
#[case(&[5, 6], [3, 3], [1, 1], [0, 0])]
#[case(&[5, 6], [2, 3], [2, 1], [1, 1])]
#[case(&[2, 4, 4], [3, 3], [1, 1], [1, 1])]
#[case(&[2, 3, 7, 5], [1, 2], [3, 2], [0, 1])]
fn convolution_matches_cpu(
    #[case] dims: &[usize],
    #[case] kernel: [usize; 2],
    #[case] stride: [usize; 2],
    #[case] padding: [usize; 2],
) -> Result<(), LazetError> {
    let sim = sim();
    let x = values(dims, 1)?;
    let k = values(&kernel, 5)?;

    gpu::set_device(None);
    let expected = materialize(conv_2d(&x, &k, stride, padding)?)?;
    gpu::set_device(Some(sim.clone()));

    let y = materialize(conv_2d(&x, &k, stride, padding)?)?;
    assert_eq!(y.shape(), expected.shape());
    assert_eq!(y.to_vec()?, expected.to_vec()?);
    // leading dimensions fold into one batch
    assert_eq!(sim.stats().launches, 1);
    assert_eq!(sim.live_descriptors(), 0);
    assert_eq!(sim.stats().descriptors_created, 3);
    gpu::set_device(None);
    Ok(())
}

#[test]
fn convolution_into_row_of_larger_matrix() -> Result<(), LazetError> {
    let sim = sim();
    let x = DynMatrix::from_vec([3, 3], vec![1f32, 2., 3., 4., 5., 6., 7., 8., 9.])?;
    let k = DynMatrix::from_vec([2, 2], vec![1f32, 0., 0., 0.])?;
    let out = DynMatrix::filled([2, 2, 2], -1f32)?;
    slice(out.clone(), 1)?.assign(conv_2d_valid(&x, &k)?)?;
    assert_eq!(out.to_vec()?, [-1., -1., -1., -1., 5., 6., 8., 9.]);
    assert_eq!(sim.stats().launches, 1);
    gpu::set_device(None);
    Ok(())
}

#[test]
fn failed_convolution_releases_descriptors() -> Result<(), LazetError> {
    let sim = sim();
    let x = values(&[4, 4], 0)?;
    let k = values(&[2, 2], 0)?;
    sim.fail_next_launch();
    assert!(materialize(conv_2d_valid(&x, &k)?).is_err());
    assert_eq!(sim.live_descriptors(), 0);
    assert_eq!(sim.stats().descriptors_destroyed, 3);
    gpu::set_device(None);
    Ok(())
}

#[test]
fn expression_kernel_is_gathered_on_cpu() -> Result<(), LazetError> {
    let sim = sim();
    let x = values(&[4, 4], 2)?;
    let k = values(&[2, 2], 3)?;
    let y = materialize(conv_2d_valid(&x, minus(&k))?)?;
    assert_eq!(sim.stats().launches, 0);

    gpu::set_device(None);
    let negated = materialize(minus(&k))?;
    let expected = materialize(conv_2d_valid(&x, &negated)?)?;
    assert_eq!(y.to_vec()?, expected.to_vec()?);
    Ok(())
}

#[test]
fn output_is_device_current_when_release_fails() -> Result<(), LazetError> {
    let sim = sim();
    let x = values(&[2, 4, 4], 1)?;
    let k = values(&[2, 2], 4)?;
    gpu::set_device(None);
    let expected = materialize(conv_2d_valid(&x, &k)?)?;
    gpu::set_device(Some(sim.clone()));

    let y = DynMatrix::zeros([2, 3, 3])?;
    sim.fail_next_destroy();
    let e = y.assign(conv_2d_valid(&x, &k)?);
    assert!(matches!(
        e,
        Err(LazetError::BackendError(BackendError {
            status: ErrorStatus::DescriptorDestruction,
            ..
        }))
    ));
    assert_eq!(sim.stats().launches, 1);
    assert!(!y.storage().is_host_valid());
    assert_eq!(y.to_vec()?, expected.to_vec()?);
    assert_eq!(sim.live_descriptors(), 1);
    gpu::set_device(None);
    Ok(())
}
