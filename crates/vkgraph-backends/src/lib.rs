//! # vkgraph-backends
//!
//! Device layer underneath the vkgraph compute graph: memory, descriptor
//! pools, command recording and submission.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Context (one per device)                  │
//! │  dispatch_lock() ─► CommandRecorder                          │
//! │                       ├─ DescriptorPool ─► DescriptorSet     │
//! │                       └─ CommandBuffer  ◄─ Dispatch          │
//! │                          (shader, bindings, barrier, extents)│
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ submit(&CommandBuffer)
//!                                ▼
//!                      ┌───────────────────┐
//!                      │   Backend trait   │
//!                      └─────────┬─────────┘
//!                                ▼
//!                      ┌───────────────────┐
//!                      │    CpuBackend     │  reference kernels (rayon)
//!                      └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use vkgraph_backends::{Context, ContextConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let context = Context::with_cpu_backend(ContextConfig::default());
//! let buffer = context.allocate_buffer(16)?;
//! context.copy_to_buffer(&buffer, &[0u8; 16])?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod backends;
pub mod barrier;
pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod params;
pub mod shader;

pub use backend::{Backend, BufferHandle, DescriptorType, MemoryAccess, WorkgroupSize};
pub use backends::CpuBackend;
pub use barrier::{Hazard, PipelineBarrier};
pub use buffer::DeviceBuffer;
pub use command::{CommandBuffer, CommandRecorder, Dispatch};
pub use context::{Context, ContextConfig};
pub use descriptor::{DescriptorPool, DescriptorPoolConfig, DescriptorSet};
pub use error::{BackendError, Result};
pub use shader::ShaderInfo;
