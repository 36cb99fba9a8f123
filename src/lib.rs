//! # vkgraph
//!
//! Delegate runtime that compiles serialized operator graphs into recorded
//! compute dispatches and replays them.
//!
//! - [`engine`] - IR decoding, graph building, lifecycle, operators, delegate entry points
//! - [`backends`] - Device buffers, descriptor pools, command recording, CPU reference backend
//! - [`tracing_config`] - Subscriber setup and performance spans
//!
//! ```text
//! use vkgraph::prelude::*;
//!
//! vkgraph::tracing_config::init_global_tracing(&TracingConfig::from_env())?;
//! let delegate = VulkanDelegate::new();
//! let mut handle = delegate.init(blob)?;
//! delegate.execute(&mut handle, &[&input], &mut [&mut output])?;
//! delegate.destroy(handle);
//! ```

pub use vkgraph_backends as backends;
pub use vkgraph_core as engine;
pub use vkgraph_tracing as tracing_config;

pub use vkgraph_core::{Error, ErrorKind, Result};

/// Types needed to load and run a delegate blob
pub mod prelude {
    pub use vkgraph_backends::{Backend, Context, ContextConfig, CpuBackend};
    pub use vkgraph_core::{
        serialize_delegate_blob, ComputeGraph, DataType, DelegateHandle, Error, ErrorKind, GraphConfig,
        OperatorRegistry, Result, VkGraph, VkTensor, VkValue, VulkanDelegate,
    };
    pub use vkgraph_tracing::TracingConfig;
}
