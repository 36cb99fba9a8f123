//! CPU backend implementation
//!
//! Reference implementation of the [`Backend`] trait. Dispatches of a
//! submitted command buffer run one after another in recording order, which
//! satisfies every recorded pipeline barrier; inside a dispatch the kernels
//! use rayon to spread elements across threads.
//!
//! # Architecture
//!
//! ```text
//! CpuBackend
//! ├── MemoryManager  - HashMap<u64, Vec<u8>> buffers + optional byte limit
//! └── kernels        - shader name -> KernelFn (gather, run, scatter)
//! ```

mod kernels;
pub(crate) mod memory;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use vkgraph_tracing::perf_span;
use vkgraph_tracing::performance::{record_allocation, record_dispatch};

use crate::backend::{Backend, BufferHandle};
use crate::command::CommandBuffer;
use crate::error::{BackendError, Result};
use crate::shader::ShaderInfo;
pub use kernels::{KernelFn, KernelInvocation};
use memory::MemoryManager;

/// CPU backend executing recorded dispatches with the reference kernels
#[derive(Clone)]
pub struct CpuBackend {
    memory: Arc<RwLock<MemoryManager>>,
    kernels: HashMap<&'static str, KernelFn>,
}

impl CpuBackend {
    /// Create a backend with unlimited memory
    ///
    /// ```rust
    /// use vkgraph_backends::{Backend, CpuBackend};
    ///
    /// let backend = CpuBackend::new();
    /// assert_eq!(backend.live_buffer_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self::with_memory_limit(None)
    }

    /// Create a backend whose total allocations may not exceed `limit` bytes
    pub fn with_memory_limit(limit: Option<usize>) -> Self {
        Self {
            memory: Arc::new(RwLock::new(MemoryManager::new(limit))),
            kernels: kernels::default_kernels(),
        }
    }

    /// Add or replace the kernel executed for `shader`
    pub fn register_kernel(&mut self, shader: ShaderInfo, kernel: KernelFn) {
        self.kernels.insert(shader.name(), kernel);
    }

    pub fn has_kernel(&self, name: &str) -> bool {
        self.kernels.contains_key(name)
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn allocate_buffer(&self, size: usize) -> Result<BufferHandle> {
        let mut memory = self.memory.write();
        let handle = memory.allocate_buffer(size)?;
        record_allocation(size, memory.live_buffers(), memory.allocated_bytes());
        Ok(handle)
    }

    fn free_buffer(&self, handle: BufferHandle) -> Result<()> {
        self.memory.write().free_buffer(handle)
    }

    fn copy_to_buffer(&self, handle: BufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        self.memory.write().copy_to_buffer(handle, offset, data)
    }

    fn copy_from_buffer(&self, handle: BufferHandle, offset: usize, data: &mut [u8]) -> Result<()> {
        self.memory.read().copy_from_buffer(handle, offset, data)
    }

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        Ok(self.memory.read().buffer(handle)?.len())
    }

    #[tracing::instrument(skip(self, cmd), fields(dispatches = cmd.len()))]
    fn submit(&self, cmd: &CommandBuffer) -> Result<()> {
        let _span = perf_span!("cpu_submit", dispatches = cmd.len());

        for dispatch in cmd.dispatches() {
            let name = dispatch.shader().name();
            let kernel = self
                .kernels
                .get(name)
                .ok_or_else(|| BackendError::ShaderNotFound(name.to_string()))?;

            for barrier in dispatch.barrier().buffers() {
                tracing::trace!(
                    shader = name,
                    buffer = %barrier.buffer,
                    hazard = %barrier.hazard,
                    "pipeline barrier"
                );
            }

            let mut invocation = KernelInvocation::gather(dispatch, &self.memory.read())?;
            kernel(&mut invocation)?;
            invocation.scatter(&mut self.memory.write())?;

            record_dispatch(name, dispatch.global_workgroup().total(), dispatch.bindings().len());
        }
        Ok(())
    }

    fn live_buffer_count(&self) -> usize {
        self.memory.read().live_buffers()
    }

    fn allocated_bytes(&self) -> usize {
        self.memory.read().allocated_bytes()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
