//! Operator implementations
//!
//! Each operator validates its arguments, turns constant inputs into device
//! tensors with [`utils::prepack_if_tensor_ref`], and appends one execute node.
//! Arguments list inputs first and the output last.

pub mod arithmetic;
pub mod clone;
pub mod scalar;
pub mod staging;
pub mod unary;
pub mod utils;

use crate::registry::OperatorRegistry;

/// Register every operator in this module under its IR name
pub fn register_default_ops(registry: &mut OperatorRegistry) {
    registry.register(arithmetic::ADD, arithmetic::add);
    registry.register(arithmetic::SUB, arithmetic::sub);
    registry.register(arithmetic::MUL, arithmetic::mul);
    registry.register(arithmetic::DIV, arithmetic::div);
    registry.register(arithmetic::FLOOR_DIVIDE, arithmetic::floor_divide);
    registry.register(arithmetic::POW, arithmetic::pow);

    registry.register(scalar::ADD_SCALAR, scalar::add_scalar);
    registry.register(clone::CLONE, clone::clone);

    registry.register("aten.abs.default", unary::abs);
    registry.register("aten.cos.default", unary::cos);
    registry.register("aten.sin.default", unary::sin);
    registry.register("aten.exp.default", unary::exp);
    registry.register("aten.sqrt.default", unary::sqrt);
    registry.register("aten.tanh.default", unary::tanh);
    registry.register("aten.relu.default", unary::relu);
}
