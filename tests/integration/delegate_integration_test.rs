//! Integration test for the vkgraph facade: blob serialization, init, execute, destroy

use std::sync::Arc;

use vkgraph::prelude::*;

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// (a - 2b) ^ 2 with b constant, then sqrt, cloned to a second output
fn pipeline_blob() -> Vec<u8> {
    let mut ir = VkGraph::new();
    let a = ir.add_value(VkValue::Tensor(VkTensor::memory(vec![4], 0)));
    let c = ir.add_constant(0, 16);
    let b = ir.add_value(VkValue::Tensor(VkTensor::constant(vec![4], c)));
    let two = ir.add_value(VkValue::Int(2));
    let diff = ir.add_value(VkValue::Tensor(VkTensor::memory(vec![4], 1)));
    let sq = ir.add_value(VkValue::Tensor(VkTensor::memory(vec![4], 2)));
    let root = ir.add_value(VkValue::Tensor(VkTensor::memory(vec![4], 1)));
    let copy = ir.add_value(VkValue::Tensor(VkTensor::memory(vec![4], 3)));
    let e = ir.add_constant(16, 16);
    let exponent = ir.add_value(VkValue::Tensor(VkTensor::constant(vec![4], e)));

    ir.input_ids.push(a);
    ir.add_operator("aten.sub.Tensor", vec![a as i32, b as i32, two as i32, diff as i32]);
    ir.add_operator("aten.pow.Tensor_Tensor", vec![diff as i32, exponent as i32, sq as i32]);
    ir.add_operator("aten.sqrt.default", vec![sq as i32, root as i32]);
    ir.add_operator("aten.clone.default", vec![root as i32, copy as i32]);
    ir.output_ids.push(root);
    ir.output_ids.push(copy);

    let mut constants = f32_bytes(&[1.0, 1.0, 1.0, 1.0]);
    constants.extend(f32_bytes(&[2.0; 4]));
    serialize_delegate_blob(&ir, &constants)
}

#[test]
fn test_pipeline_end_to_end() {
    vkgraph::tracing_config::init_test_tracing();

    let delegate = VulkanDelegate::new();
    let mut handle = delegate.init(pipeline_blob()).unwrap();
    assert_eq!(handle.num_outputs(), 2);
    assert_eq!(handle.output_sizes().unwrap(), vec![16, 16]);

    let input = f32_bytes(&[5.0, -1.0, 2.0, 2.0]);
    let mut root = vec![0u8; 16];
    let mut copy = vec![0u8; 16];
    delegate
        .execute(&mut handle, &[&input[..]], &mut [root.as_mut_slice(), copy.as_mut_slice()])
        .unwrap();

    assert_eq!(to_f32(&root), vec![3.0, 3.0, 0.0, 0.0]);
    assert_eq!(root, copy);
    delegate.destroy(handle);
}

#[test]
fn test_json_ir_matches_binary() {
    let blob = pipeline_blob();
    let header = vkgraph::engine::DelegateHeader::parse(&blob).unwrap();
    let ir = VkGraph::from_ir_section(&blob[header.ir_range()]).unwrap();
    let json = ir.to_json().unwrap();
    assert_eq!(VkGraph::from_json(&json).unwrap(), ir);
}

#[test]
fn test_graphs_share_one_backend() {
    let backend: Arc<dyn Backend> = Arc::new(CpuBackend::new());
    let delegate = VulkanDelegate::new().with_backend(Arc::clone(&backend));

    let mut first = delegate.init(pipeline_blob()).unwrap();
    let live_after_first = backend.live_buffer_count();
    let mut second = delegate.init(pipeline_blob()).unwrap();
    assert_eq!(backend.live_buffer_count(), live_after_first * 2);

    let run = |handle: &mut DelegateHandle, input: &[f32]| {
        let input = f32_bytes(input);
        let mut root = vec![0u8; 16];
        let mut copy = vec![0u8; 16];
        delegate
            .execute(handle, &[&input[..]], &mut [root.as_mut_slice(), copy.as_mut_slice()])
            .unwrap();
        assert_eq!(root, copy);
        to_f32(&root)
    };
    assert_eq!(run(&mut first, &[5.0, -1.0, 2.0, 2.0]), vec![3.0, 3.0, 0.0, 0.0]);
    assert_eq!(run(&mut second, &[7.0, 3.0, 0.0, 4.0]), vec![5.0, 1.0, 2.0, 2.0]);
    assert_eq!(run(&mut first, &[2.0, 2.0, 2.0, 2.0]), vec![0.0; 4]);

    delegate.destroy(first);
    delegate.destroy(second);
    assert_eq!(backend.live_buffer_count(), 0);
    assert_eq!(backend.allocated_bytes(), 0);
}

#[test]
fn test_error_kinds() {
    let delegate = VulkanDelegate::new();
    assert_eq!(delegate.init(vec![0u8; 8]).unwrap_err().kind(), ErrorKind::BadContainer);

    let mut ir = VkGraph::new();
    ir.add_operator("aten.relu.default", vec![0, 1]);
    let err = delegate.init(serialize_delegate_blob(&ir, &[])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadGraph);
}
