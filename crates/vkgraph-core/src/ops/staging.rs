//! Copies between host-visible staging buffers and device tensors

use vkgraph_backends::params::CopyParams;
use vkgraph_backends::shader;

use super::utils::to_u32;
use crate::error::Result;
use crate::graph::ComputeGraph;
use crate::node::{ArgGroup, ExecuteNode, ParamsBuffer};
use crate::value::ValueRef;

/// Add a staging buffer sized to `tensor` and a node copying it into `tensor`
pub fn add_staging_to_tensor_node(graph: &mut ComputeGraph, tensor: ValueRef) -> Result<ValueRef> {
    let (dtype, numel, nbytes) = {
        let t = graph.values().tensor(tensor)?;
        (t.dtype(), t.numel(), t.nbytes())
    };
    let staging = graph.add_staging(dtype, numel);
    let (global, local) = graph.dispatch_extents(to_u32(numel, "input numel")?);
    let params = ParamsBuffer::new(&CopyParams::new(to_u32(nbytes, "input size")?));
    let node = ExecuteNode::new(
        graph,
        shader::NCHW_TO_TENSOR,
        global,
        local,
        vec![ArgGroup::write(tensor), ArgGroup::read([staging])],
        params,
    );
    graph.add_execute_node(node)?;
    Ok(staging)
}

/// Add a staging buffer sized to `tensor` and a node copying `tensor` into it
pub fn add_tensor_to_staging_node(graph: &mut ComputeGraph, tensor: ValueRef) -> Result<ValueRef> {
    let (dtype, numel, nbytes) = {
        let t = graph.values().tensor(tensor)?;
        (t.dtype(), t.numel(), t.nbytes())
    };
    let staging = graph.add_staging(dtype, numel);
    let (global, local) = graph.dispatch_extents(to_u32(numel, "output numel")?);
    let params = ParamsBuffer::new(&CopyParams::new(to_u32(nbytes, "output size")?));
    let node = ExecuteNode::new(
        graph,
        shader::TENSOR_TO_NCHW,
        global,
        local,
        vec![ArgGroup::write(staging), ArgGroup::read([tensor])],
        params,
    );
    graph.add_execute_node(node)?;
    Ok(staging)
}
