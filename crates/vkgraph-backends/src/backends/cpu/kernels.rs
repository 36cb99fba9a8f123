//! Reference kernels for the built-in shader catalogue
//!
//! Each dispatch runs on scratch copies of its bound buffers. Kernels read
//! inputs and parameters from the copies and mark the buffers they write, and
//! only marked buffers are copied back. An output aliased with an input is
//! therefore computed from the input's pre-dispatch contents.

use std::collections::HashMap;

use bytemuck::Pod;
use rayon::prelude::*;

use crate::backend::{BufferHandle, WorkgroupSize};
use crate::command::Dispatch;
use crate::error::{BackendError, Result};
use crate::params::{broadcast_index, numel, BinaryParams, CopyParams, ScalarParams, UnaryParams};
use crate::shader::{self, ShaderInfo};

use super::memory::MemoryManager;

/// Kernel entry point
pub type KernelFn = fn(&mut KernelInvocation) -> Result<()>;

struct Binding {
    handle: BufferHandle,
    bytes: Vec<u8>,
    dirty: bool,
}

/// Bound buffers and launch extents of one dispatch
pub struct KernelInvocation {
    shader: ShaderInfo,
    global: WorkgroupSize,
    bindings: Vec<Binding>,
}

impl KernelInvocation {
    pub(crate) fn gather(dispatch: &Dispatch, memory: &MemoryManager) -> Result<Self> {
        let bindings = dispatch
            .bindings()
            .iter()
            .map(|&handle| {
                Ok(Binding {
                    handle,
                    bytes: memory.buffer(handle)?.to_vec(),
                    dirty: false,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            shader: *dispatch.shader(),
            global: dispatch.global_workgroup(),
            bindings,
        })
    }

    pub(crate) fn scatter(self, memory: &mut MemoryManager) -> Result<()> {
        for binding in self.bindings.into_iter().filter(|b| b.dirty) {
            memory.copy_to_buffer(binding.handle, 0, &binding.bytes)?;
        }
        Ok(())
    }

    pub fn shader(&self) -> &ShaderInfo {
        &self.shader
    }

    pub fn global_workgroup(&self) -> WorkgroupSize {
        self.global
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    fn binding(&self, index: usize) -> Result<&Binding> {
        self.bindings
            .get(index)
            .ok_or_else(|| BackendError::kernel(self.shader.name(), format!("missing binding {index}")))
    }

    /// Decode the parameter block bound in the last slot
    pub fn params<T: Pod>(&self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let last = self.bindings.len().checked_sub(1).ok_or_else(|| {
            BackendError::kernel(self.shader.name(), "no parameter binding")
        })?;
        let bytes = &self.binding(last)?.bytes;
        if bytes.len() < size {
            return Err(BackendError::kernel(
                self.shader.name(),
                format!("parameter block is {} bytes, expected {size}", bytes.len()),
            ));
        }
        Ok(bytemuck::pod_read_unaligned(&bytes[..size]))
    }

    pub fn bytes(&self, index: usize) -> Result<&[u8]> {
        Ok(&self.binding(index)?.bytes)
    }

    /// Mutable view of a binding; the binding is written back after the kernel
    pub fn bytes_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        let shader = self.shader.name();
        let binding = self
            .bindings
            .get_mut(index)
            .ok_or_else(|| BackendError::kernel(shader, format!("missing binding {index}")))?;
        binding.dirty = true;
        Ok(&mut binding.bytes)
    }

    /// First `count` little-endian f32 values of a binding
    pub fn read_f32(&self, index: usize, count: usize) -> Result<Vec<f32>> {
        let bytes = self.bytes(index)?;
        if bytes.len() < count * 4 {
            return Err(BackendError::kernel(
                self.shader.name(),
                format!("binding {index} holds {} bytes, need {}", bytes.len(), count * 4),
            ));
        }
        Ok(bytes[..count * 4]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    pub fn write_f32(&mut self, index: usize, values: &[f32]) -> Result<()> {
        let shader = self.shader.name();
        let bytes = self.bytes_mut(index)?;
        if bytes.len() < values.len() * 4 {
            return Err(BackendError::kernel(
                shader,
                format!("binding {index} holds {} bytes, need {}", bytes.len(), values.len() * 4),
            ));
        }
        for (chunk, value) in bytes.chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }
}

/// Kernels for every entry of [`shader::CATALOGUE`]
pub fn default_kernels() -> HashMap<&'static str, KernelFn> {
    let entries: [(ShaderInfo, KernelFn); 17] = [
        (shader::NCHW_TO_TENSOR, copy_bytes),
        (shader::TENSOR_TO_NCHW, copy_bytes),
        (shader::COPY_TENSOR, copy_bytes),
        (shader::BINARY_ADD, |inv| binary(inv, |a, b, alpha| a + alpha * b)),
        (shader::BINARY_SUB, |inv| binary(inv, |a, b, alpha| a - alpha * b)),
        (shader::BINARY_MUL, |inv| binary(inv, |a, b, _| a * b)),
        (shader::BINARY_DIV, |inv| binary(inv, |a, b, _| a / b)),
        (shader::BINARY_FLOOR_DIVIDE, |inv| binary(inv, |a, b, _| (a / b).floor())),
        (shader::BINARY_POW, |inv| binary(inv, |a, b, _| a.powf(b))),
        (shader::ADD_SCALAR, add_scalar),
        (shader::UNARY_ABS, |inv| unary(inv, f32::abs)),
        (shader::UNARY_COS, |inv| unary(inv, f32::cos)),
        (shader::UNARY_SIN, |inv| unary(inv, f32::sin)),
        (shader::UNARY_EXP, |inv| unary(inv, f32::exp)),
        (shader::UNARY_SQRT, |inv| unary(inv, f32::sqrt)),
        (shader::UNARY_TANH, |inv| unary(inv, f32::tanh)),
        (shader::UNARY_RELU, |inv| unary(inv, |x| x.max(0.0))),
    ];
    entries.into_iter().map(|(shader, kernel)| (shader.name(), kernel)).collect()
}

fn copy_bytes(inv: &mut KernelInvocation) -> Result<()> {
    let params: CopyParams = inv.params()?;
    let len = params.num_bytes as usize;
    let src = inv.bytes(1)?;
    if src.len() < len {
        return Err(BackendError::kernel(inv.shader().name(), "source smaller than copy size"));
    }
    let src = src[..len].to_vec();
    let shader = inv.shader().name();
    let dst = inv.bytes_mut(0)?;
    if dst.len() < len {
        return Err(BackendError::kernel(shader, "destination smaller than copy size"));
    }
    dst[..len].copy_from_slice(&src);
    Ok(())
}

fn binary(inv: &mut KernelInvocation, op: impl Fn(f32, f32, f32) -> f32 + Sync) -> Result<()> {
    let params: BinaryParams = inv.params()?;
    let count = params.numel();
    let in1 = inv.read_f32(1, numel(&params.in1_sizes))?;
    let in2 = inv.read_f32(2, numel(&params.in2_sizes))?;

    let mut out = vec![0f32; count];
    out.par_iter_mut().enumerate().for_each(|(i, o)| {
        let a = in1[broadcast_index(i, &params.out_sizes, &params.in1_sizes)];
        let b = in2[broadcast_index(i, &params.out_sizes, &params.in2_sizes)];
        *o = op(a, b, params.alpha);
    });
    inv.write_f32(0, &out)
}

fn unary(inv: &mut KernelInvocation, op: impl Fn(f32) -> f32 + Sync) -> Result<()> {
    let params: UnaryParams = inv.params()?;
    let mut values = inv.read_f32(1, params.numel as usize)?;
    values.par_iter_mut().for_each(|x| *x = op(*x));
    inv.write_f32(0, &values)
}

fn add_scalar(inv: &mut KernelInvocation) -> Result<()> {
    let params: ScalarParams = inv.params()?;
    let mut values = inv.read_f32(1, params.numel as usize)?;
    values.par_iter_mut().for_each(|x| *x += params.scalar);
    inv.write_f32(0, &values)
}
