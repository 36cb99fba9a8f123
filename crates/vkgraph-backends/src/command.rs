//! Command recording
//!
//! [`CommandRecorder`] is the state behind [`crate::Context::dispatch_lock`]:
//! the active descriptor pool plus the command buffer being recorded. Nodes
//! hold the lock for the whole of one dispatch's encoding so that its
//! descriptor set allocation and registration are not interleaved with
//! another thread's.

use crate::backend::{BufferHandle, WorkgroupSize};
use crate::barrier::PipelineBarrier;
use crate::buffer::DeviceBuffer;
use crate::descriptor::{DescriptorPool, DescriptorSet};
use crate::error::{BackendError, Result};
use crate::shader::ShaderInfo;

/// One recorded compute dispatch
#[derive(Debug, Clone)]
pub struct Dispatch {
    shader: ShaderInfo,
    bindings: Vec<BufferHandle>,
    barrier: PipelineBarrier,
    global: WorkgroupSize,
    local: WorkgroupSize,
}

impl Dispatch {
    pub fn shader(&self) -> &ShaderInfo {
        &self.shader
    }

    /// Bound buffers in kernel layout order
    pub fn bindings(&self) -> &[BufferHandle] {
        &self.bindings
    }

    pub fn barrier(&self) -> &PipelineBarrier {
        &self.barrier
    }

    pub fn global_workgroup(&self) -> WorkgroupSize {
        self.global
    }

    pub fn local_workgroup(&self) -> WorkgroupSize {
        self.local
    }
}

/// An ordered list of dispatches that can be submitted any number of times
#[derive(Debug, Default)]
pub struct CommandBuffer {
    dispatches: Vec<Dispatch>,
    retained: Vec<DeviceBuffer>,
}

impl CommandBuffer {
    pub fn dispatches(&self) -> &[Dispatch] {
        &self.dispatches
    }

    pub fn len(&self) -> usize {
        self.dispatches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatches.is_empty()
    }

    /// Transient buffers kept alive for as long as this command buffer
    pub fn retained_buffers(&self) -> usize {
        self.retained.len()
    }
}

/// Descriptor pool and in-progress command buffer of a [`crate::Context`]
#[derive(Debug, Default)]
pub struct CommandRecorder {
    pub(crate) pool: Option<DescriptorPool>,
    pub(crate) cmd: CommandBuffer,
}

impl CommandRecorder {
    /// Allocate a descriptor set for `shader` from the context's pool
    pub fn get_descriptor_set(&mut self, shader: &ShaderInfo, local: WorkgroupSize) -> Result<DescriptorSet> {
        self.pool
            .as_mut()
            .ok_or(BackendError::DescriptorPoolUninitialized)?
            .allocate(shader, local)
    }

    /// Append a dispatch of `shader` using a fully bound `set`
    pub fn register_shader_dispatch(
        &mut self,
        set: DescriptorSet,
        barrier: PipelineBarrier,
        shader: &ShaderInfo,
        global: WorkgroupSize,
    ) -> Result<()> {
        if set.shader() != shader {
            return Err(BackendError::DescriptorSetMismatch {
                shader: shader.name(),
                set_shader: set.shader().name(),
            });
        }
        let bindings = set.resolve()?;
        let local = set.local_workgroup();

        tracing::trace!(
            shader = shader.name(),
            global = %global,
            local = %local,
            barriers = barrier.len(),
            "dispatch recorded"
        );

        self.cmd.dispatches.push(Dispatch {
            shader: *shader,
            bindings,
            barrier,
            global,
            local,
        });
        Ok(())
    }

    /// Keep `buffer` alive until the recorded command buffer is dropped
    pub fn retain(&mut self, buffer: DeviceBuffer) {
        self.cmd.retained.push(buffer);
    }

    pub fn dispatch_count(&self) -> usize {
        self.cmd.len()
    }

    pub fn descriptor_pool(&self) -> Option<&DescriptorPool> {
        self.pool.as_ref()
    }
}
