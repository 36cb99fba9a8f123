//! `aten.clone.default(in, out)`: device-side tensor copy

use vkgraph_backends::params::CopyParams;
use vkgraph_backends::shader;

use super::utils::{check_output, check_same_numel, expect_args, prepack_if_tensor_ref, to_u32};
use crate::error::Result;
use crate::graph::ComputeGraph;
use crate::node::{ArgGroup, ExecuteNode, ParamsBuffer};
use crate::value::ValueRef;

pub const CLONE: &str = "aten.clone.default";

pub fn clone(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    expect_args(CLONE, args, 2)?;
    let (input, out) = (args[0], args[1]);
    check_output(graph, out)?;
    let numel = check_same_numel(CLONE, graph, input, out)?;
    let nbytes = graph.values().tensor(out)?.nbytes();

    let input = prepack_if_tensor_ref(graph, input)?;
    let (global, local) = graph.dispatch_extents(to_u32(numel, "numel")?);
    let node = ExecuteNode::new(
        graph,
        shader::COPY_TENSOR,
        global,
        local,
        vec![ArgGroup::write(out), ArgGroup::read([input])],
        ParamsBuffer::new(&CopyParams::new(to_u32(nbytes, "size")?)),
    );
    graph.add_execute_node(node)
}
