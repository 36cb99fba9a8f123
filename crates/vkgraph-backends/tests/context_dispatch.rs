//! Integration tests for recording and submitting dispatches through a Context

use vkgraph_backends::params::{BinaryParams, UnaryParams};
use vkgraph_backends::shader::{BINARY_MUL, UNARY_EXP, UNARY_SQRT};
use vkgraph_backends::{
    BackendError, Context, ContextConfig, DescriptorPoolConfig, DeviceBuffer, Hazard, MemoryAccess, PipelineBarrier,
    WorkgroupSize,
};

fn upload_f32(context: &Context, values: &[f32]) -> DeviceBuffer {
    let buffer = context.allocate_buffer(values.len() * 4).unwrap();
    context.copy_to_buffer(&buffer, bytemuck::cast_slice(values)).unwrap();
    buffer
}

fn download_f32(context: &Context, buffer: &DeviceBuffer) -> Vec<f32> {
    let mut bytes = vec![0u8; buffer.size()];
    context.copy_from_buffer(buffer, &mut bytes).unwrap();
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn upload_params<T: bytemuck::Pod>(context: &Context, params: &T) -> DeviceBuffer {
    let buffer = context.allocate_buffer(std::mem::size_of::<T>()).unwrap();
    context.copy_to_buffer(&buffer, bytemuck::bytes_of(params)).unwrap();
    buffer
}

#[test]
fn test_chained_dispatches_replay() -> vkgraph_backends::Result<()> {
    let context = Context::with_cpu_backend(ContextConfig::default());
    let mut pool = DescriptorPoolConfig::default();
    pool.record_shader(&BINARY_MUL);
    pool.record_shader(&UNARY_SQRT);
    context.ensure_descriptor_pool(pool);

    let a = upload_f32(&context, &[1.0, 2.0, 3.0, 4.0]);
    let b = upload_f32(&context, &[4.0, 2.0, 3.0, 4.0]);
    let prod = context.allocate_buffer(16)?;
    let root = context.allocate_buffer(16)?;
    let mul_params = upload_params(&context, &BinaryParams::new([1, 1, 1, 4], [1, 1, 1, 4], [1, 1, 1, 4], 1.0));
    let sqrt_params = upload_params(&context, &UnaryParams::new(4));
    let extent = WorkgroupSize::linear(4);

    {
        let mut recorder = context.dispatch_lock();

        let mut set = recorder.get_descriptor_set(&BINARY_MUL, extent)?;
        for (i, buffer) in [&prod, &a, &b, &mul_params].into_iter().enumerate() {
            set.bind(i as u32, buffer.handle())?;
        }
        recorder.register_shader_dispatch(set, PipelineBarrier::default(), &BINARY_MUL, extent)?;

        let mut barrier = PipelineBarrier::default();
        let hazard = barrier.record(prod.handle(), Some(MemoryAccess::Write), MemoryAccess::Read);
        assert_eq!(hazard, Some(Hazard::ReadAfterWrite));
        let mut set = recorder.get_descriptor_set(&UNARY_SQRT, extent)?;
        set.bind(0, root.handle())?;
        set.bind(1, prod.handle())?;
        set.bind(2, sqrt_params.handle())?;
        recorder.register_shader_dispatch(set, barrier, &UNARY_SQRT, extent)?;
    }

    let cmd = context.take_cmd();
    assert_eq!(cmd.len(), 2);
    assert_eq!(cmd.dispatches()[1].barrier().len(), 1);

    for _ in 0..3 {
        context.submit_cmd(&cmd)?;
        assert_eq!(download_f32(&context, &root), vec![2.0, 2.0, 3.0, 4.0]);
    }
    Ok(())
}

#[test]
fn test_descriptor_pool_exhaustion() {
    let context = Context::with_cpu_backend(ContextConfig::default());
    let mut pool = DescriptorPoolConfig::default();
    pool.record_shader(&UNARY_EXP);
    context.ensure_descriptor_pool(pool);

    let mut recorder = context.dispatch_lock();
    recorder.get_descriptor_set(&UNARY_EXP, WorkgroupSize::linear(1)).unwrap();
    let err = recorder
        .get_descriptor_set(&UNARY_EXP, WorkgroupSize::linear(1))
        .unwrap_err();
    assert!(err.is_resource_exhaustion());
    assert!(matches!(err, BackendError::DescriptorPoolExhausted { .. }));
}

#[test]
fn test_unbound_binding_rejected() {
    let context = Context::with_cpu_backend(ContextConfig::default());
    let mut pool = DescriptorPoolConfig::default();
    pool.record_shader(&UNARY_EXP);
    context.ensure_descriptor_pool(pool);

    let out = context.allocate_buffer(4).unwrap();
    let mut recorder = context.dispatch_lock();
    let mut set = recorder.get_descriptor_set(&UNARY_EXP, WorkgroupSize::linear(1)).unwrap();
    set.bind(0, out.handle()).unwrap();
    let err = recorder
        .register_shader_dispatch(set, PipelineBarrier::default(), &UNARY_EXP, WorkgroupSize::linear(1))
        .unwrap_err();
    assert!(matches!(err, BackendError::UnboundBinding { index: 1, .. }));
    assert_eq!(recorder.dispatch_count(), 0);
}

#[test]
fn test_buffers_freed_on_drop() {
    let context = Context::with_cpu_backend(ContextConfig::default());
    {
        let _a = context.allocate_buffer(64).unwrap();
        let _b = context.allocate_buffer(32).unwrap();
        assert_eq!(context.backend().live_buffer_count(), 2);
        assert_eq!(context.backend().allocated_bytes(), 96);
    }
    assert_eq!(context.backend().live_buffer_count(), 0);
    assert_eq!(context.backend().allocated_bytes(), 0);
}
