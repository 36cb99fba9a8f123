//! # vkgraph-core - Compute Graph Engine
//!
//! Turns a serialized delegate blob into a compute graph and replays it on a
//! GPU-style context from `vkgraph-backends`.
//!
//! ## Architecture
//!
//! ```text
//!   delegate blob ──▶ DelegateHeader ──▶ VkGraph (IR) ──▶ GraphBuilder
//!                                                             │
//!                                   OperatorRegistry ─────────┤
//!                                                             ▼
//!   ComputeGraph: values + prepack nodes + execute nodes + inputs/outputs
//!        │ prepare()         descriptor pool, all device allocations
//!        │ encode_prepack()  constants into device tensors
//!        │ prepack()         submit once
//!        │ encode_execute()  record the execute command buffer
//!        ▼
//!   execute()                replay, any number of times
//! ```
//!
//! ### Key Principles
//!
//! 1. **Build allocates nothing**: every device buffer is created in `prepare()`
//! 2. **Encode once, replay many**: the execute command buffer is recorded once
//! 3. **No forward references**: operator arguments name values already added
//! 4. **Explicit registry**: the builder resolves operators through the registry it is given
//!
//! ## Example
//!
//! ```text
//! use vkgraph_core::{ComputeGraph, DataType, GraphConfig, ops};
//!
//! let mut graph = ComputeGraph::new(GraphConfig::default());
//! let x = graph.add_tensor(vec![4], DataType::Float32, Some(0));
//! let y = graph.add_tensor(vec![4], DataType::Float32, Some(1));
//! let four = graph.add_scalar(4i64);
//! graph.set_input_tensor(x)?;
//! ops::scalar::add_scalar(&mut graph, &[x, four, y])?;
//! graph.set_output_tensor(y)?;
//! graph.compile()?;
//!
//! graph.copy_f32_into_staging(x, &[1.0, 2.0, 3.0, 4.0])?;
//! graph.execute()?;
//! let mut out = [0f32; 4];
//! graph.copy_f32_from_staging(y, &mut out)?;
//! assert_eq!(out, [5.0, 6.0, 7.0, 8.0]);
//! ```
//!
//! ## Operation Modules
//!
//! - [`ops::arithmetic`] - Broadcasting add, sub, mul, div, floor_divide, pow
//! - [`ops::unary`] - abs, cos, sin, exp, sqrt, tanh, relu
//! - [`ops::scalar`] - add_scalar
//! - [`ops::clone`] - Tensor copy
//! - [`ops::staging`] - Host staging transfers for graph inputs and outputs

pub mod builder;
pub mod config;
pub mod delegate;
pub mod dtype;
pub mod error;
pub mod graph;
pub mod header;
pub mod node;
pub mod ops;
pub mod registry;
pub mod schema;
pub mod value;

// Re-export primary types
pub use builder::{ConstantSection, GraphBuilder};
pub use config::{GraphConfig, ENV_DESCRIPTOR_POOL_SAFETY_FACTOR};
pub use delegate::{DelegateHandle, VulkanDelegate};
pub use dtype::DataType;
pub use error::{Error, ErrorKind, HeaderError, MalformedGraph, Result};
pub use graph::{ComputeGraph, GraphState, IoValue, SharedObject};
pub use header::{serialize_delegate_blob, DelegateHeader};
pub use node::{ArgGroup, ExecuteNode, ParamsBuffer, PrepackNode};
pub use registry::{default_registry, OpFunction, OperatorRegistry};
pub use schema::{OperatorCall, VkBytes, VkGraph, VkTensor, VkValue};
pub use value::{ConstantData, Scalar, Value, ValueRef, ValueStore};
