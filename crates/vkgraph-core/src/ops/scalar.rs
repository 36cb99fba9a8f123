//! `add_scalar(in, scalar, out)`: `out = in + scalar`

use vkgraph_backends::params::ScalarParams;
use vkgraph_backends::shader;

use super::utils::{check_output, check_same_numel, expect_args, prepack_if_tensor_ref, to_u32};
use crate::error::Result;
use crate::graph::ComputeGraph;
use crate::node::{ArgGroup, ExecuteNode, ParamsBuffer};
use crate::value::ValueRef;

pub const ADD_SCALAR: &str = "add_scalar";

pub fn add_scalar(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    expect_args(ADD_SCALAR, args, 3)?;
    let (input, scalar, out) = (args[0], args[1], args[2]);
    let scalar = graph.values().scalar(scalar)?.as_f32();
    check_output(graph, out)?;
    let numel = to_u32(check_same_numel(ADD_SCALAR, graph, input, out)?, "numel")?;

    let input = prepack_if_tensor_ref(graph, input)?;
    let (global, local) = graph.dispatch_extents(numel);
    let node = ExecuteNode::new(
        graph,
        shader::ADD_SCALAR,
        global,
        local,
        vec![ArgGroup::write(out), ArgGroup::read([input])],
        ParamsBuffer::new(&ScalarParams::new(numel, scalar)),
    );
    graph.add_execute_node(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::dtype::DataType;
    use crate::ops::tests::constant_f32;

    #[test]
    fn test_add_scalar_to_constant() {
        let mut graph = ComputeGraph::new(GraphConfig::default());
        let four = graph.add_scalar(4i64);
        let c = graph.add_tensorref(vec![4], DataType::Float32, constant_f32(&[1.0, 2.0, 3.0, 4.0]));
        let y = graph.add_tensor(vec![4], DataType::Float32, Some(0));
        add_scalar(&mut graph, &[c, four, y]).unwrap();
        graph.set_output_tensor(y).unwrap();
        graph.compile().unwrap();

        graph.execute().unwrap();
        let mut out = [0f32; 4];
        graph.copy_f32_from_staging(y, &mut out).unwrap();
        assert_eq!(out, [5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_scalar_argument_required() {
        let mut graph = ComputeGraph::new(GraphConfig::default());
        let x = graph.add_tensor(vec![4], DataType::Float32, None);
        let y = graph.add_tensor(vec![4], DataType::Float32, None);
        assert!(add_scalar(&mut graph, &[x, y, y]).is_err());
        assert!(graph.execute_nodes().is_empty());
    }
}
