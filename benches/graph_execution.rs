//! Delegate benchmark suite
//!
//! Benchmarks the public delegate surface:
//! - init: header parse, IR decode, build and full prepare/encode
//! - execute: host copies plus one replay of the execute command buffer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vkgraph::prelude::*;

/// Chain of `depth` relu/add pairs over a tensor of `n` elements
fn chain_blob(n: u32, depth: usize) -> Vec<u8> {
    let mut ir = VkGraph::new();
    let x = ir.add_value(VkValue::Tensor(VkTensor::memory(vec![n], 0)));
    let alpha = ir.add_value(VkValue::Double(0.5));
    let c = ir.add_constant(0, u64::from(n) * 4);
    let bias = ir.add_value(VkValue::Tensor(VkTensor::constant(vec![n], c)));
    ir.input_ids.push(x);

    let mut current = x;
    for layer in 0..depth {
        let hidden = ir.add_value(VkValue::Tensor(VkTensor::memory(vec![n], 1 + (layer % 2) as i32)));
        ir.add_operator("aten.relu.default", vec![current as i32, hidden as i32]);
        let next = ir.add_value(VkValue::Tensor(VkTensor::memory(vec![n], 3 + (layer % 2) as i32)));
        ir.add_operator(
            "aten.add.Tensor",
            vec![hidden as i32, bias as i32, alpha as i32, next as i32],
        );
        current = next;
    }
    ir.output_ids.push(current);

    let constants: Vec<u8> = (0..n).flat_map(|i| (i as f32 * 0.01).to_le_bytes()).collect();
    serialize_delegate_blob(&ir, &constants)
}

fn bench_init(c: &mut Criterion) {
    let mut group = c.benchmark_group("delegate_init");
    let delegate = VulkanDelegate::new();

    for depth in [1usize, 8, 32] {
        let blob = chain_blob(1024, depth);
        group.bench_with_input(BenchmarkId::new("depth", depth), &blob, |bencher, blob| {
            bencher.iter(|| {
                let handle = delegate.init(blob.clone()).unwrap();
                delegate.destroy(black_box(handle));
            });
        });
    }

    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("delegate_execute");
    let delegate = VulkanDelegate::new();

    for n in [1024u32, 16384, 131072] {
        group.throughput(Throughput::Elements(u64::from(n)));

        group.bench_with_input(BenchmarkId::new("depth8", n), &n, |bencher, &n| {
            let mut handle = delegate.init(chain_blob(n, 8)).unwrap();
            let input: Vec<u8> = (0..n).flat_map(|i| (i as f32 - 8.0).to_le_bytes()).collect();
            let mut output = vec![0u8; input.len()];

            bencher.iter(|| {
                delegate
                    .execute(&mut handle, &[&input[..]], &mut [output.as_mut_slice()])
                    .unwrap();
                black_box(&output);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_init, bench_execute);
criterion_main!(benches);
