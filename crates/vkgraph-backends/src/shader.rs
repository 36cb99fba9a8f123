//! Shader descriptors and the built-in shader catalogue
//!
//! A [`ShaderInfo`] names a compute kernel and lists the resource kinds its
//! bindings expect, in binding order. Every operator in the workspace binds
//! its output first, then its inputs, then one uniform parameter block last,
//! so the layouts below all end in [`DescriptorType::UniformBuffer`].

use std::fmt;

use crate::backend::DescriptorType;

/// Name and binding layout of a compute kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderInfo {
    name: &'static str,
    kernel_layout: &'static [DescriptorType],
}

impl ShaderInfo {
    pub const fn new(name: &'static str, kernel_layout: &'static [DescriptorType]) -> Self {
        Self { name, kernel_layout }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn kernel_layout(&self) -> &'static [DescriptorType] {
        self.kernel_layout
    }

    pub const fn binding_count(&self) -> usize {
        self.kernel_layout.len()
    }
}

impl fmt::Display for ShaderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

use DescriptorType::{StorageBuffer, UniformBuffer};

const COPY_LAYOUT: &[DescriptorType] = &[StorageBuffer, StorageBuffer, UniformBuffer];
const UNARY_LAYOUT: &[DescriptorType] = &[StorageBuffer, StorageBuffer, UniformBuffer];
const BINARY_LAYOUT: &[DescriptorType] = &[StorageBuffer, StorageBuffer, StorageBuffer, UniformBuffer];

/// Staging buffer (contiguous NCHW) into tensor storage. Also used for prepacking constants.
pub const NCHW_TO_TENSOR: ShaderInfo = ShaderInfo::new("nchw_to_tensor", COPY_LAYOUT);
/// Tensor storage into a staging buffer.
pub const TENSOR_TO_NCHW: ShaderInfo = ShaderInfo::new("tensor_to_nchw", COPY_LAYOUT);
/// Tensor to tensor copy.
pub const COPY_TENSOR: ShaderInfo = ShaderInfo::new("copy_tensor", COPY_LAYOUT);

pub const BINARY_ADD: ShaderInfo = ShaderInfo::new("binary_add", BINARY_LAYOUT);
pub const BINARY_SUB: ShaderInfo = ShaderInfo::new("binary_sub", BINARY_LAYOUT);
pub const BINARY_MUL: ShaderInfo = ShaderInfo::new("binary_mul", BINARY_LAYOUT);
pub const BINARY_DIV: ShaderInfo = ShaderInfo::new("binary_div", BINARY_LAYOUT);
pub const BINARY_FLOOR_DIVIDE: ShaderInfo = ShaderInfo::new("binary_floor_divide", BINARY_LAYOUT);
pub const BINARY_POW: ShaderInfo = ShaderInfo::new("binary_pow", BINARY_LAYOUT);

pub const ADD_SCALAR: ShaderInfo = ShaderInfo::new("add_scalar", UNARY_LAYOUT);

pub const UNARY_ABS: ShaderInfo = ShaderInfo::new("unary_abs", UNARY_LAYOUT);
pub const UNARY_COS: ShaderInfo = ShaderInfo::new("unary_cos", UNARY_LAYOUT);
pub const UNARY_SIN: ShaderInfo = ShaderInfo::new("unary_sin", UNARY_LAYOUT);
pub const UNARY_EXP: ShaderInfo = ShaderInfo::new("unary_exp", UNARY_LAYOUT);
pub const UNARY_SQRT: ShaderInfo = ShaderInfo::new("unary_sqrt", UNARY_LAYOUT);
pub const UNARY_TANH: ShaderInfo = ShaderInfo::new("unary_tanh", UNARY_LAYOUT);
pub const UNARY_RELU: ShaderInfo = ShaderInfo::new("unary_relu", UNARY_LAYOUT);

/// Every built-in shader
pub const CATALOGUE: &[ShaderInfo] = &[
    NCHW_TO_TENSOR,
    TENSOR_TO_NCHW,
    COPY_TENSOR,
    BINARY_ADD,
    BINARY_SUB,
    BINARY_MUL,
    BINARY_DIV,
    BINARY_FLOOR_DIVIDE,
    BINARY_POW,
    ADD_SCALAR,
    UNARY_ABS,
    UNARY_COS,
    UNARY_SIN,
    UNARY_EXP,
    UNARY_SQRT,
    UNARY_TANH,
    UNARY_RELU,
];

/// Find a built-in shader by name
pub fn lookup(name: &str) -> Option<ShaderInfo> {
    CATALOGUE.iter().copied().find(|shader| shader.name() == name)
}
