//! Backend trait for device memory and command submission
//!
//! Backends own device memory and execute recorded command buffers. A
//! backend is shared between every [`crate::Context`] and [`crate::DeviceBuffer`]
//! that uses it, so all methods take `&self` and implementations synchronize
//! internally.

use std::any::Any;

use super::types::BufferHandle;
use crate::command::CommandBuffer;
use crate::error::Result;

/// Device abstraction executing recorded compute dispatches
///
/// # Architecture
///
/// ```text
/// ┌──────────────────────────────────────────────┐
/// │                Backend Trait                 │
/// │  - buffer management (allocate/free/copy)    │
/// │  - submit(&CommandBuffer)                    │
/// └───────────────────────┬──────────────────────┘
///                         │
///              ┌──────────┴──────────┐
///              ▼                     ▼
///        ┌───────────┐         ┌───────────┐
///        │    CPU    │         │  Vulkan   │
///        │ reference │         │  device   │
///        └───────────┘         └───────────┘
/// ```
///
/// # Usage
///
/// ```rust
/// use vkgraph_backends::{Backend, CpuBackend};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = CpuBackend::new();
/// let buffer = backend.allocate_buffer(16)?;
/// backend.copy_to_buffer(buffer, 0, bytemuck::cast_slice(&[1.0f32, 2.0, 3.0, 4.0]))?;
///
/// let mut out = [0u8; 16];
/// backend.copy_from_buffer(buffer, 0, &mut out)?;
/// backend.free_buffer(buffer)?;
/// # Ok(())
/// # }
/// ```
pub trait Backend: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Allocate a zero-initialized buffer of `size` bytes
    fn allocate_buffer(&self, size: usize) -> Result<BufferHandle>;

    fn free_buffer(&self, handle: BufferHandle) -> Result<()>;

    /// Copy `data` into the buffer starting at byte `offset`
    fn copy_to_buffer(&self, handle: BufferHandle, offset: usize, data: &[u8]) -> Result<()>;

    /// Fill `data` from the buffer starting at byte `offset`
    fn copy_from_buffer(&self, handle: BufferHandle, offset: usize, data: &mut [u8]) -> Result<()>;

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize>;

    /// Execute every dispatch of `cmd` in order and wait for completion
    fn submit(&self, cmd: &CommandBuffer) -> Result<()>;

    /// Number of buffers currently allocated
    fn live_buffer_count(&self) -> usize;

    /// Total bytes currently allocated
    fn allocated_bytes(&self) -> usize;

    /// Downcast support for backend-specific inspection
    fn as_any(&self) -> &dyn Any;
}
