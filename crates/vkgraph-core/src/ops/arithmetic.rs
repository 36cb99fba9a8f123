//! Broadcasting elementwise binary operators
//!
//! `add` and `sub` take `(in1, in2, alpha, out)` and compute `in1 ± alpha * in2`;
//! the rest take `(in1, in2, out)`. Inputs broadcast to the output over up to
//! four right-aligned dimensions.

use vkgraph_backends::params::BinaryParams;
use vkgraph_backends::{shader, ShaderInfo};

use super::utils::{check_broadcastable, check_output, expect_args, prepack_if_tensor_ref, to_sizes4, to_u32};
use crate::error::Result;
use crate::graph::ComputeGraph;
use crate::node::{ArgGroup, ExecuteNode, ParamsBuffer};
use crate::value::ValueRef;

pub const ADD: &str = "aten.add.Tensor";
pub const SUB: &str = "aten.sub.Tensor";
pub const MUL: &str = "aten.mul.Tensor";
pub const DIV: &str = "aten.div.Tensor";
pub const FLOOR_DIVIDE: &str = "aten.floor_divide.default";
pub const POW: &str = "aten.pow.Tensor_Tensor";

fn add_binary_op_node(
    graph: &mut ComputeGraph,
    operator: &'static str,
    shader: ShaderInfo,
    in1: ValueRef,
    in2: ValueRef,
    alpha: f32,
    out: ValueRef,
) -> Result<()> {
    check_output(graph, out)?;
    let out_sizes = to_sizes4(graph.values().sizes(out)?)?;
    let in1_sizes = to_sizes4(graph.values().sizes(in1)?)?;
    let in2_sizes = to_sizes4(graph.values().sizes(in2)?)?;
    check_broadcastable(operator, &out_sizes, &in1_sizes)?;
    check_broadcastable(operator, &out_sizes, &in2_sizes)?;

    let in1 = prepack_if_tensor_ref(graph, in1)?;
    let in2 = prepack_if_tensor_ref(graph, in2)?;

    let params = BinaryParams::new(out_sizes, in1_sizes, in2_sizes, alpha);
    let (global, local) = graph.dispatch_extents(to_u32(params.numel(), "output numel")?);
    let node = ExecuteNode::new(
        graph,
        shader,
        global,
        local,
        vec![ArgGroup::write(out), ArgGroup::read([in1, in2])],
        ParamsBuffer::new(&params),
    );
    graph.add_execute_node(node)
}

fn with_alpha(graph: &mut ComputeGraph, operator: &'static str, shader: ShaderInfo, args: &[ValueRef]) -> Result<()> {
    expect_args(operator, args, 4)?;
    let alpha = graph.values().scalar(args[2])?.as_f32();
    add_binary_op_node(graph, operator, shader, args[0], args[1], alpha, args[3])
}

fn plain(graph: &mut ComputeGraph, operator: &'static str, shader: ShaderInfo, args: &[ValueRef]) -> Result<()> {
    expect_args(operator, args, 3)?;
    add_binary_op_node(graph, operator, shader, args[0], args[1], 1.0, args[2])
}

pub fn add(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    with_alpha(graph, ADD, shader::BINARY_ADD, args)
}

pub fn sub(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    with_alpha(graph, SUB, shader::BINARY_SUB, args)
}

pub fn mul(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    plain(graph, MUL, shader::BINARY_MUL, args)
}

pub fn div(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    plain(graph, DIV, shader::BINARY_DIV, args)
}

pub fn floor_divide(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    plain(graph, FLOOR_DIVIDE, shader::BINARY_FLOOR_DIVIDE, args)
}

pub fn pow(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    plain(graph, POW, shader::BINARY_POW, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::dtype::DataType;
    use crate::error::{Error, ErrorKind, MalformedGraph};
    use crate::ops::tests::constant_f32;

    #[test]
    fn test_broadcast_add_with_constant() {
        let mut graph = ComputeGraph::new(GraphConfig::default());
        let x = graph.add_tensor(vec![2, 3], DataType::Float32, None);
        let bias = graph.add_tensorref(vec![3], DataType::Float32, constant_f32(&[10.0, 20.0, 30.0]));
        let alpha = graph.add_scalar(2.0f64);
        let y = graph.add_tensor(vec![2, 3], DataType::Float32, None);
        graph.set_input_tensor(x).unwrap();
        add(&mut graph, &[x, bias, alpha, y]).unwrap();
        graph.set_output_tensor(y).unwrap();
        graph.compile().unwrap();

        graph.copy_f32_into_staging(x, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        graph.execute().unwrap();
        let mut out = [0f32; 6];
        graph.copy_f32_from_staging(y, &mut out).unwrap();
        assert_eq!(out, [21.0, 42.0, 63.0, 24.0, 45.0, 66.0]);
    }

    #[test]
    fn test_column_broadcast_mul_and_div() {
        let mut graph = ComputeGraph::new(GraphConfig::default());
        let x = graph.add_tensor(vec![2, 2], DataType::Float32, None);
        let col = graph.add_tensorref(vec![2, 1], DataType::Float32, constant_f32(&[2.0, 4.0]));
        let prod = graph.add_tensor(vec![2, 2], DataType::Float32, None);
        let quot = graph.add_tensor(vec![2, 2], DataType::Float32, None);
        graph.set_input_tensor(x).unwrap();
        mul(&mut graph, &[x, col, prod]).unwrap();
        floor_divide(&mut graph, &[prod, col, quot]).unwrap();
        graph.set_output_tensor(prod).unwrap();
        graph.set_output_tensor(quot).unwrap();
        graph.compile().unwrap();

        graph.copy_f32_into_staging(x, &[1.5, 2.0, 3.0, 4.5]).unwrap();
        graph.execute().unwrap();
        let mut out = [0f32; 4];
        graph.copy_f32_from_staging(prod, &mut out).unwrap();
        assert_eq!(out, [3.0, 4.0, 12.0, 18.0]);
        graph.copy_f32_from_staging(quot, &mut out).unwrap();
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_incompatible_shapes_rejected() {
        let mut graph = ComputeGraph::new(GraphConfig::default());
        let a = graph.add_tensor(vec![2, 3], DataType::Float32, None);
        let b = graph.add_tensor(vec![2, 2], DataType::Float32, None);
        let out = graph.add_tensor(vec![2, 3], DataType::Float32, None);
        let err = pow(&mut graph, &[a, b, out]).unwrap_err();
        assert!(matches!(err, Error::Malformed(MalformedGraph::IncompatibleShapes(_))));
        assert_eq!(err.kind(), ErrorKind::BadGraph);
        assert!(graph.execute_nodes().is_empty());
    }

    #[test]
    fn test_argument_validation() {
        let mut graph = ComputeGraph::new(GraphConfig::default());
        let a = graph.add_tensor(vec![4], DataType::Float32, None);
        let s = graph.add_scalar(1i64);
        assert!(add(&mut graph, &[a, a, a]).is_err());
        assert!(sub(&mut graph, &[a, a, a, a]).is_err());
        assert!(mul(&mut graph, &[a, a, s]).is_err());
        assert!(div(&mut graph, &[a, a, a]).is_ok());
        assert_eq!(graph.execute_nodes().len(), 1);
    }
}
