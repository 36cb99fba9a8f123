//! Elementwise unary operators taking `(in, out)`

use vkgraph_backends::params::UnaryParams;
use vkgraph_backends::{shader, ShaderInfo};

use super::utils::{check_output, check_same_numel, expect_args, prepack_if_tensor_ref, to_u32};
use crate::error::Result;
use crate::graph::ComputeGraph;
use crate::node::{ArgGroup, ExecuteNode, ParamsBuffer};
use crate::value::ValueRef;

fn add_unary_op_node(graph: &mut ComputeGraph, operator: &'static str, shader: ShaderInfo, args: &[ValueRef]) -> Result<()> {
    expect_args(operator, args, 2)?;
    let (input, out) = (args[0], args[1]);
    check_output(graph, out)?;
    let numel = to_u32(check_same_numel(operator, graph, input, out)?, "numel")?;

    let input = prepack_if_tensor_ref(graph, input)?;
    let (global, local) = graph.dispatch_extents(numel);
    let node = ExecuteNode::new(
        graph,
        shader,
        global,
        local,
        vec![ArgGroup::write(out), ArgGroup::read([input])],
        ParamsBuffer::new(&UnaryParams::new(numel)),
    );
    graph.add_execute_node(node)
}

pub fn abs(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    add_unary_op_node(graph, "aten.abs.default", shader::UNARY_ABS, args)
}

pub fn cos(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    add_unary_op_node(graph, "aten.cos.default", shader::UNARY_COS, args)
}

pub fn sin(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    add_unary_op_node(graph, "aten.sin.default", shader::UNARY_SIN, args)
}

pub fn exp(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    add_unary_op_node(graph, "aten.exp.default", shader::UNARY_EXP, args)
}

pub fn sqrt(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    add_unary_op_node(graph, "aten.sqrt.default", shader::UNARY_SQRT, args)
}

pub fn tanh(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    add_unary_op_node(graph, "aten.tanh.default", shader::UNARY_TANH, args)
}

pub fn relu(graph: &mut ComputeGraph, args: &[ValueRef]) -> Result<()> {
    add_unary_op_node(graph, "aten.relu.default", shader::UNARY_RELU, args)
}
