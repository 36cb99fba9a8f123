//! Helpers shared by the operator implementations

use vkgraph_backends::params::{CopyParams, Sizes4};
use vkgraph_backends::shader;

use crate::error::{Error, MalformedGraph, Result};
use crate::graph::ComputeGraph;
use crate::node::{ParamsBuffer, PrepackNode};
use crate::value::{Value, ValueRef};

/// Fail with `ArgumentCount` unless `args` has exactly `expected` entries
pub fn expect_args(operator: &'static str, args: &[ValueRef], expected: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(MalformedGraph::ArgumentCount {
            operator,
            expected,
            actual: args.len(),
        }
        .into())
    }
}

/// Convert a count to the `u32` a parameter block carries
pub fn to_u32(count: usize, what: &str) -> Result<u32> {
    u32::try_from(count).map_err(|_| Error::shapes(format!("{what} of {count} does not fit in 32 bits")))
}

/// Right-align `sizes` into `[N, C, H, W]`, padding leading dimensions with 1
pub fn to_sizes4(sizes: &[usize]) -> Result<Sizes4> {
    if sizes.len() > 4 {
        return Err(Error::shapes(format!("rank {} exceeds 4 dimensions", sizes.len())));
    }
    let mut out = [1u32; 4];
    let offset = 4 - sizes.len();
    for (i, &dim) in sizes.iter().enumerate() {
        out[offset + i] = to_u32(dim, "dimension")?;
    }
    Ok(out)
}

/// Every dimension of `input` must equal the output's or be 1
pub fn check_broadcastable(operator: &str, out: &Sizes4, input: &Sizes4) -> Result<()> {
    let compatible = out.iter().zip(input).all(|(&o, &i)| i == o || i == 1);
    if compatible {
        Ok(())
    } else {
        Err(Error::shapes(format!(
            "{operator}: input sizes {input:?} do not broadcast to output sizes {out:?}"
        )))
    }
}

/// Fail unless `a` and `b` hold the same number of elements
pub fn check_same_numel(operator: &str, graph: &ComputeGraph, a: ValueRef, b: ValueRef) -> Result<usize> {
    let numel_a: usize = graph.values().sizes(a)?.iter().product();
    let numel_b: usize = graph.values().sizes(b)?.iter().product();
    if numel_a == numel_b {
        Ok(numel_a)
    } else {
        Err(Error::shapes(format!(
            "{operator}: {a} has {numel_a} elements, {b} has {numel_b}"
        )))
    }
}

/// Operator outputs must be device tensors
pub fn check_output(graph: &ComputeGraph, out: ValueRef) -> Result<()> {
    graph.values().tensor(out).map(|_| ())
}

/// Return `value` itself if it is a tensor; for a tensor ref, add a device
/// tensor plus the prepack node that fills it and return that instead.
pub fn prepack_if_tensor_ref(graph: &mut ComputeGraph, value: ValueRef) -> Result<ValueRef> {
    let (numel, nbytes) = match graph.values().get(value)? {
        Value::Tensor(_) => return Ok(value),
        Value::TensorRef(tref) => (tref.numel(), tref.nbytes()),
        other => return Err(Error::unexpected_kind(value, "tensor", other.kind_name())),
    };

    let packed = graph.add_tensor_like(value)?;
    let (global, local) = graph.dispatch_extents(to_u32(numel, "constant numel")?);
    let params = ParamsBuffer::new(&CopyParams::new(to_u32(nbytes, "constant size")?));
    let node = PrepackNode::new(graph, shader::NCHW_TO_TENSOR, global, local, value, packed, params);
    graph.add_prepack_node(node)?;
    tracing::trace!(tref = %value, packed = %packed, nbytes, "prepack node added");
    Ok(packed)
}
