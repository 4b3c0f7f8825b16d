use std::rc::Rc;

use lazet_core::{
    config, counters,
    error::{BackendError, ErrorStatus},
    gpu::{self, Accelerator},
    prelude::*,
};
use lazet_sim::{SimDevice, SimStats};

fn setup(memory: usize) -> (Rc<SimDevice>, Rc<dyn Accelerator>) {
    let _ = env_logger::builder().is_test(true).try_init();
    config::update(|c| c.counters = true);
    counters::reset_counters();
    let sim = Rc::new(SimDevice::new(memory));
    let device: Rc<dyn Accelerator> = sim.clone();
    (sim, device)
}

#[test]
fn upload_once_until_host_write() -> Result<(), LazetError> {
    let (sim, device) = setup(1 << 16);
    let x = DynMatrix::from_vec([4], vec![1f32, 2., 3., 4.])?;
    let storage = x.storage();
    assert!(storage.is_host_valid() && !storage.is_device_valid());

    storage.ensure_device_up_to_date(&device)?;
    assert!(storage.is_host_valid() && storage.is_device_valid());
    storage.ensure_device_up_to_date(&device)?;
    assert_eq!(sim.stats().h2d, 1);
    assert_eq!(sim.stats().allocations, 1);

    x.assign(scalar(2.))?;
    assert!(storage.is_host_valid() && !storage.is_device_valid());
    storage.ensure_device_up_to_date(&device)?;
    assert_eq!(sim.stats().h2d, 2);
    assert_eq!(sim.stats().allocations, 1);
    assert_eq!(counters::get("gpu:h2d"), 2);
    Ok(())
}

#[test]
fn device_write_makes_host_stale() -> Result<(), LazetError> {
    let (sim, device) = setup(1 << 16);
    gpu::set_device(Some(device));
    let x = DynMatrix::from_vec([2, 4], vec![1f32, 5., 2., 0., 3., 4., 8., 7.])?;
    let y = DynMatrix::zeros([1, 2])?;
    y.assign(max_pool_2d(&x, [2, 2], [2, 2], [0, 0])?)?;

    assert!(!y.storage().is_host_valid() && y.storage().is_device_valid());
    assert_eq!(sim.stats().d2h, 0);
    assert_eq!(y.to_vec()?, [5., 8.]);
    assert!(y.storage().is_host_valid() && y.storage().is_device_valid());
    assert_eq!(sim.stats().d2h, 1);
    assert_eq!(counters::get("gpu:d2h"), 1);

    // host is current, no second copy
    assert_eq!(y.get(&[0, 1])?, 8.);
    assert_eq!(sim.stats().d2h, 1);
    // input was only uploaded
    assert!(x.storage().is_host_valid() && x.storage().is_device_valid());
    gpu::set_device(None);
    Ok(())
}

#[test]
fn host_expressions_sync_device_results() -> Result<(), LazetError> {
    let (sim, device) = setup(1 << 16);
    gpu::set_device(Some(device));
    let x = DynMatrix::from_vec([2, 2], vec![1f32, 2., 3., 4.])?;
    let pooled = DynMatrix::zeros([1, 1])?;
    pooled.assign(avg_pool_2d(&x, [2, 2], [1, 1], [0, 0])?)?;

    // elementwise work runs on host and pulls the result back first
    let out = DynMatrix::zeros([1, 1])?;
    out.assign(add(&pooled, scalar(1.))?)?;
    assert_eq!(out.to_vec()?, [3.5]);
    assert_eq!(sim.stats().d2h, 1);

    pooled.assign_scale(2.)?;
    assert_eq!(pooled.to_vec()?, [5.]);
    assert!(!pooled.storage().is_device_valid());
    gpu::set_device(None);
    Ok(())
}

#[test]
fn partial_host_write_keeps_device_data() -> Result<(), LazetError> {
    let (_sim, device) = setup(1 << 16);
    gpu::set_device(Some(device));
    let x = DynMatrix::from_vec([2, 2], vec![4f32, 3., 2., 1.])?;
    let y = DynMatrix::zeros([2, 1, 1])?;
    y.assign(max_pool_2d(rep_prepend_dyn(&x, [2])?, [2, 2], [1, 1], [0, 0])?)?;
    // transformer operands are gathered on host
    assert!(y.storage().is_host_valid());

    let z = DynMatrix::zeros([2, 1, 1])?;
    slice(z.clone(), 0)?.assign(max_pool_2d(&x, [2, 2], [1, 1], [0, 0])?)?;
    assert!(!z.storage().is_host_valid());
    slice(z.clone(), 1)?.assign(scalar(-1.))?;
    assert_eq!(z.to_vec()?, [4., -1.]);
    assert_eq!(y.to_vec()?, [4., 4.]);
    gpu::set_device(None);
    Ok(())
}

#[test]
fn buffers_are_released_with_storage() -> Result<(), LazetError> {
    let (sim, device) = setup(1 << 16);
    let a = DynMatrix::<f64>::zeros([8])?;
    let b = a.clone();
    a.storage().ensure_device_allocated(&device)?;
    assert_eq!(sim.live_buffers(), 1);
    assert_eq!(sim.free_bytes(), (1 << 16) - 64);
    drop(a);
    assert_eq!(sim.live_buffers(), 1);
    drop(b);
    assert_eq!(sim.live_buffers(), 0);
    assert_eq!(sim.free_bytes(), 1 << 16);
    assert_eq!(sim.stats().deallocations, 1);
    Ok(())
}

#[test]
fn out_of_device_memory() -> Result<(), LazetError> {
    let (sim, device) = setup(16);
    gpu::set_device(Some(device));
    let x = DynMatrix::<f32>::zeros([4, 4])?;
    let y = DynMatrix::zeros([2, 2])?;
    let e = y.assign(max_pool_2d(&x, [2, 2], [2, 2], [0, 0])?);
    assert!(matches!(
        e,
        Err(LazetError::BackendError(BackendError {
            status: ErrorStatus::MemoryAllocation,
            ..
        }))
    ));
    assert_eq!(sim.live_buffers(), 0);
    assert_eq!(sim.live_descriptors(), 0);
    gpu::set_device(None);
    Ok(())
}

#[test]
fn gpu_can_be_configured_off() -> Result<(), LazetError> {
    let (sim, device) = setup(1 << 16);
    gpu::set_device(Some(device));
    config::update(|c| c.gpu = false);
    let x = DynMatrix::from_vec([2, 2], vec![1f32, 2., 3., 4.])?;
    let y = DynMatrix::zeros([1, 1])?;
    y.assign(max_pool_2d(&x, [2, 2], [1, 1], [0, 0])?)?;
    assert_eq!(y.to_vec()?, [4.]);
    assert_eq!(sim.stats(), SimStats::default());
    config::update(|c| c.gpu = true);
    gpu::set_device(None);
    Ok(())
}
