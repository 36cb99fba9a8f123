//! Recording context of one graph
//!
//! Several contexts may wrap the same backend. The descriptor pool and the
//! command buffer being recorded belong to a single context and are never
//! shared.
//!
//! ```text
//!   Context
//!   ├── backend: Arc<dyn Backend>        shared; allocation, host copies, submit
//!   ├── config:  ContextConfig
//!   └── recorder: Mutex<CommandRecorder>
//!         ├── descriptor pool            sized by ensure_descriptor_pool()
//!         └── command buffer             taken by take_cmd(), dropped by flush()
//! ```

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use vkgraph_tracing::performance::record_transfer;

use crate::backend::{Backend, WorkgroupSize};
use crate::backends::CpuBackend;
use crate::buffer::DeviceBuffer;
use crate::command::{CommandBuffer, CommandRecorder};
use crate::descriptor::{DescriptorPool, DescriptorPoolConfig};
use crate::error::Result;

/// Device-level settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// Total bytes the context may allocate; `None` is unlimited
    pub device_memory_limit: Option<usize>,
    /// Preferred local workgroup for elementwise dispatches
    pub default_local_workgroup: WorkgroupSize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            device_memory_limit: None,
            default_local_workgroup: WorkgroupSize::linear(64),
        }
    }
}

/// Backend handle plus the descriptor pool and command recording of one graph
pub struct Context {
    backend: Arc<dyn Backend>,
    config: ContextConfig,
    recorder: Mutex<CommandRecorder>,
}

impl Context {
    pub fn new(backend: Arc<dyn Backend>, config: ContextConfig) -> Self {
        Self {
            backend,
            config,
            recorder: Mutex::new(CommandRecorder::default()),
        }
    }

    /// Context over a fresh [`CpuBackend`] honouring `config.device_memory_limit`
    pub fn with_cpu_backend(config: ContextConfig) -> Self {
        let backend: Arc<dyn Backend> = Arc::new(CpuBackend::with_memory_limit(config.device_memory_limit));
        Self::new(backend, config)
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Exclusive access to the descriptor pool and the command buffer being recorded
    pub fn dispatch_lock(&self) -> MutexGuard<'_, CommandRecorder> {
        self.recorder.lock()
    }

    /// Make sure the pool can hold at least `config`.
    ///
    /// An existing pool that already covers `config` is kept; otherwise a pool
    /// with the field-wise maximum of both is created.
    pub fn ensure_descriptor_pool(&self, config: DescriptorPoolConfig) {
        let mut recorder = self.recorder.lock();
        let capacity = match &recorder.pool {
            Some(pool) if pool.capacity().covers(&config) => return,
            Some(pool) => pool.capacity().merge_max(&config),
            None => config,
        };
        recorder.pool = Some(DescriptorPool::new(capacity));
    }

    pub fn descriptor_pool_capacity(&self) -> Option<DescriptorPoolConfig> {
        self.recorder.lock().pool.as_ref().map(|pool| *pool.capacity())
    }

    /// Drop the in-progress recording and return all descriptor sets to the pool
    pub fn flush(&self) {
        let mut recorder = self.recorder.lock();
        recorder.cmd = CommandBuffer::default();
        if let Some(pool) = recorder.pool.as_mut() {
            pool.reset();
        }
    }

    /// Detach the recorded command buffer, leaving an empty one in its place
    pub fn take_cmd(&self) -> CommandBuffer {
        std::mem::take(&mut self.recorder.lock().cmd)
    }

    /// Execute `cmd` and wait for completion
    pub fn submit_cmd(&self, cmd: &CommandBuffer) -> Result<()> {
        self.backend.submit(cmd)
    }

    pub fn allocate_buffer(&self, size: usize) -> Result<DeviceBuffer> {
        DeviceBuffer::allocate(&self.backend, size)
    }

    pub fn copy_to_buffer(&self, buffer: &DeviceBuffer, data: &[u8]) -> Result<()> {
        let start = Instant::now();
        buffer.write(0, data)?;
        record_transfer(data.len(), "H2D", start.elapsed().as_micros() as u64);
        Ok(())
    }

    pub fn copy_from_buffer(&self, buffer: &DeviceBuffer, out: &mut [u8]) -> Result<()> {
        let start = Instant::now();
        buffer.read(0, out)?;
        record_transfer(out.len(), "D2H", start.elapsed().as_micros() as u64);
        Ok(())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::PipelineBarrier;
    use crate::params::ScalarParams;
    use crate::shader::ADD_SCALAR;

    fn pool_for(shader: &crate::shader::ShaderInfo, sets: u32) -> DescriptorPoolConfig {
        let mut config = DescriptorPoolConfig::default();
        for _ in 0..sets {
            config.record_shader(shader);
        }
        config
    }

    #[test]
    fn test_ensure_descriptor_pool_grows_only() {
        let context = Context::with_cpu_backend(ContextConfig::default());
        assert!(context.descriptor_pool_capacity().is_none());

        context.ensure_descriptor_pool(pool_for(&ADD_SCALAR, 2));
        context.ensure_descriptor_pool(pool_for(&ADD_SCALAR, 1));
        assert_eq!(context.descriptor_pool_capacity().unwrap().max_sets, 2);

        context.ensure_descriptor_pool(pool_for(&ADD_SCALAR, 5));
        assert_eq!(context.descriptor_pool_capacity().unwrap().max_sets, 5);
    }

    #[test]
    fn test_record_take_submit() {
        let context = Context::with_cpu_backend(ContextConfig::default());
        context.ensure_descriptor_pool(pool_for(&ADD_SCALAR, 1));

        let input = context.allocate_buffer(8).unwrap();
        let output = context.allocate_buffer(8).unwrap();
        let params = context.allocate_buffer(16).unwrap();
        context
            .copy_to_buffer(&input, bytemuck::cast_slice(&[1.0f32, 2.0]))
            .unwrap();
        context
            .copy_to_buffer(&params, bytemuck::bytes_of(&ScalarParams::new(2, 0.5)))
            .unwrap();

        {
            let mut recorder = context.dispatch_lock();
            let mut set = recorder.get_descriptor_set(&ADD_SCALAR, WorkgroupSize::linear(2)).unwrap();
            set.bind(0, output.handle()).unwrap();
            set.bind(1, input.handle()).unwrap();
            set.bind(2, params.handle()).unwrap();
            recorder
                .register_shader_dispatch(set, PipelineBarrier::default(), &ADD_SCALAR, WorkgroupSize::linear(2))
                .unwrap();
        }

        let cmd = context.take_cmd();
        assert_eq!(cmd.len(), 1);
        assert_eq!(context.dispatch_lock().dispatch_count(), 0);
        context.submit_cmd(&cmd).unwrap();

        let mut out = [0u8; 8];
        context.copy_from_buffer(&output, &mut out).unwrap();
        assert_eq!(f32::from_le_bytes([out[0], out[1], out[2], out[3]]), 1.5);
        assert_eq!(f32::from_le_bytes([out[4], out[5], out[6], out[7]]), 2.5);
    }

    #[test]
    fn test_flush_resets_pool_and_recording() {
        let context = Context::with_cpu_backend(ContextConfig::default());
        context.ensure_descriptor_pool(pool_for(&ADD_SCALAR, 1));
        {
            let mut recorder = context.dispatch_lock();
            recorder.get_descriptor_set(&ADD_SCALAR, WorkgroupSize::linear(1)).unwrap();
            assert!(recorder.get_descriptor_set(&ADD_SCALAR, WorkgroupSize::linear(1)).is_err());
        }
        context.flush();
        assert!(context
            .dispatch_lock()
            .get_descriptor_set(&ADD_SCALAR, WorkgroupSize::linear(1))
            .is_ok());
    }

    #[test]
    fn test_contexts_on_one_backend_record_independently() {
        let backend: Arc<dyn Backend> = Arc::new(CpuBackend::new());
        let first = Context::new(Arc::clone(&backend), ContextConfig::default());
        let second = Context::new(Arc::clone(&backend), ContextConfig::default());
        first.ensure_descriptor_pool(pool_for(&ADD_SCALAR, 1));
        second.ensure_descriptor_pool(pool_for(&ADD_SCALAR, 1));

        let buffers: Vec<_> = (0..3).map(|_| first.allocate_buffer(16).unwrap()).collect();
        {
            let mut recorder = first.dispatch_lock();
            let mut set = recorder.get_descriptor_set(&ADD_SCALAR, WorkgroupSize::linear(1)).unwrap();
            for (i, buffer) in buffers.iter().enumerate() {
                set.bind(i as u32, buffer.handle()).unwrap();
            }
            recorder
                .register_shader_dispatch(set, PipelineBarrier::default(), &ADD_SCALAR, WorkgroupSize::linear(1))
                .unwrap();
        }

        second.flush();
        assert!(second.take_cmd().is_empty());
        assert!(second
            .dispatch_lock()
            .get_descriptor_set(&ADD_SCALAR, WorkgroupSize::linear(1))
            .is_ok());
        assert_eq!(first.take_cmd().len(), 1);
        assert_eq!(backend.live_buffer_count(), 3);
    }

    #[test]
    fn test_memory_limit_from_config() {
        let context = Context::with_cpu_backend(ContextConfig {
            device_memory_limit: Some(16),
            ..ContextConfig::default()
        });
        let _held = context.allocate_buffer(16).unwrap();
        assert!(context.allocate_buffer(1).unwrap_err().is_resource_exhaustion());
    }
}
