//! Native autograd through the binding.

use std::sync::Arc;

use ndbind::prelude::*;
use ndbind_ref::ReferenceLibrary;

#[test]
fn test_attach_grad_and_backward_image_batch() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let m = engine.new_base_manager();
    let shape = [1, 3, 32, 32];

    let x = m.ones(shape, DType::F32).unwrap();
    x.attach_grad_with(GradReq::Write, None).unwrap();
    let seed = m.ones(shape, DType::F32).unwrap();
    {
        let _collector = engine.new_gradient_collector().unwrap();
        let y = x.mul_scalar(2.0).unwrap();
        y.backward_with(Some(&seed), false, true).unwrap();
    }

    let grad = x.gradient().unwrap();
    assert!(!grad.handle().unwrap().is_null());
    assert_eq!(grad.shape().unwrap(), Shape::new(&shape));
    let values = grad.to_f32_vec().unwrap();
    assert_eq!(values.len(), 3 * 32 * 32);
    assert!(values.iter().all(|&v| v == 2.0));
}

#[test]
fn test_collector_backward_through_chain() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let m = engine.new_base_manager();
    let w = m.from_slice(&[0.5f64, -1.0, 2.0], [3]).unwrap();
    let x = m.from_slice(&[1.0f64, 2.0, 3.0], [3]).unwrap();
    w.attach_grad().unwrap();

    let collector = engine.new_gradient_collector().unwrap();
    // loss = mean(w * x + 1)
    let loss = w.mul(&x).unwrap().add_scalar(1.0).unwrap().mean().unwrap();
    collector.backward(&loss).unwrap();
    drop(collector);

    let grad = w.gradient().unwrap().to_f64_vec().unwrap();
    let expected = [1.0 / 3.0, 2.0 / 3.0, 1.0];
    for (g, e) in grad.iter().zip(expected) {
        assert!((g - e).abs() < 1e-12, "{g} vs {e}");
    }
}

#[test]
fn test_null_request_leaves_gradient() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let m = engine.new_base_manager();
    let x = m.ones([2], DType::F32).unwrap();
    x.attach_grad_with(GradReq::Null, None).unwrap();
    {
        let collector = engine.new_gradient_collector().unwrap();
        let y = x.mul_scalar(5.0).unwrap();
        collector.backward(&y).unwrap();
    }
    assert_eq!(x.gradient().unwrap().to_f32_vec().unwrap(), vec![0.0, 0.0]);
}

#[test]
fn test_retained_graph_runs_twice() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let m = engine.new_base_manager();
    let x = m.from_slice(&[1.0f32, 2.0], [2]).unwrap();
    x.attach_grad_with(GradReq::Add, None).unwrap();

    let collector = engine.new_gradient_collector().unwrap();
    let y = x.mul_scalar(3.0).unwrap().sum().unwrap();
    collector.backward_with(&y, None, true).unwrap();
    collector.backward(&y).unwrap();
    drop(collector);

    assert_eq!(x.gradient().unwrap().to_f32_vec().unwrap(), vec![6.0, 6.0]);
}

#[test]
fn test_not_recording_outside_collector() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let m = engine.new_base_manager();
    let x = m.ones([2], DType::F32).unwrap();
    x.attach_grad().unwrap();
    let y = x.mul_scalar(4.0).unwrap();
    y.backward().unwrap();
    // nothing was recorded, so the gradient keeps its initial zeros
    assert_eq!(x.gradient().unwrap().to_f32_vec().unwrap(), vec![0.0, 0.0]);
}

#[test]
fn test_collector_without_backward_keeps_no_tape() {
    let lib = Arc::new(ReferenceLibrary::new());
    let engine = Engine::with_library(lib.clone()).unwrap();
    let m = engine.new_base_manager();
    let x = m.ones([4], DType::F32).unwrap();
    x.attach_grad().unwrap();

    {
        let _collector = engine.new_gradient_collector().unwrap();
        let mut y = x.clone();
        for _ in 0..100 {
            y = y.mul_scalar(1.5).unwrap();
        }
        assert_eq!(lib.recorded_ops(), 100);
    }
    assert_eq!(lib.recorded_ops(), 0);

    m.close();
    assert_eq!(lib.live_handles(), 0);
}
