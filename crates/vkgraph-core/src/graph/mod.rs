//! Compute graph
//!
//! ```text
//!   Building ──prepare()──▶ Prepared ──encode_prepack()──▶ PrepackEncoded
//!                                                              │ prepack()
//!   Ready ◀──encode_execute()── Prepacked ◀────────────────────┘
//!     │
//!     └── execute() / copy_into_staging() / copy_from_staging(), any number of times
//! ```
//!
//! Values and nodes are only added while `Building`. `prepare()` sizes the
//! descriptor pool and performs every device allocation the graph owns;
//! nothing before it touches the device.
//!
//! Each graph records through a [`Context`] of its own, so its descriptor pool
//! and in-flight command buffer are never seen by another graph. Graphs that
//! run on the same device share only the [`Backend`].

mod shared_object;

pub use shared_object::SharedObject;

use std::collections::BTreeMap;
use std::sync::Arc;

use vkgraph_backends::{Backend, CommandBuffer, Context, DescriptorPoolConfig, DeviceBuffer, ShaderInfo, WorkgroupSize};
use vkgraph_tracing::{perf_event, perf_span};

use crate::config::GraphConfig;
use crate::dtype::DataType;
use crate::error::{Error, MalformedGraph, Result};
use crate::node::{ExecuteNode, PrepackNode};
use crate::ops;
use crate::value::{ConstantData, Scalar, Staging, Tensor, TensorRef, Value, ValueRef, ValueStore};

/// Lifecycle position of a [`ComputeGraph`]; ordered by progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphState {
    Building,
    Prepared,
    PrepackEncoded,
    Prepacked,
    Ready,
}

/// A graph input or output: the IR tensor and the staging buffer the host sees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoValue {
    pub tensor: ValueRef,
    pub staging: ValueRef,
}

impl IoValue {
    fn matches(&self, value: ValueRef) -> bool {
        self.tensor == value || self.staging == value
    }
}

/// Values, nodes and recorded command buffers of one delegate graph
pub struct ComputeGraph {
    config: GraphConfig,
    context: Arc<Context>,
    values: ValueStore,
    shared_objects: BTreeMap<u32, SharedObject>,
    prepack_descriptor_counts: DescriptorPoolConfig,
    execute_descriptor_counts: DescriptorPoolConfig,
    prepack_nodes: Vec<PrepackNode>,
    execute_nodes: Vec<ExecuteNode>,
    inputs: Vec<IoValue>,
    outputs: Vec<IoValue>,
    execute_cmd: Option<CommandBuffer>,
    state: GraphState,
}

impl ComputeGraph {
    /// Graph over a fresh CPU backend
    pub fn new(config: GraphConfig) -> Self {
        Self::from_context(config, Context::with_cpu_backend(config.context))
    }

    /// Graph allocating and submitting on `backend`, which other graphs may share
    pub fn with_backend(config: GraphConfig, backend: Arc<dyn Backend>) -> Self {
        Self::from_context(config, Context::new(backend, config.context))
    }

    fn from_context(config: GraphConfig, context: Context) -> Self {
        Self {
            config,
            context: Arc::new(context),
            values: ValueStore::new(),
            shared_objects: BTreeMap::new(),
            prepack_descriptor_counts: DescriptorPoolConfig::default(),
            execute_descriptor_counts: DescriptorPoolConfig::default(),
            prepack_nodes: Vec::new(),
            execute_nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            execute_cmd: None,
            state: GraphState::Building,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Recording context private to this graph
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        self.context.backend()
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut ValueStore {
        &mut self.values
    }

    pub fn inputs(&self) -> &[IoValue] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[IoValue] {
        &self.outputs
    }

    pub fn execute_nodes(&self) -> &[ExecuteNode] {
        &self.execute_nodes
    }

    pub fn prepack_nodes(&self) -> &[PrepackNode] {
        &self.prepack_nodes
    }

    pub fn shared_objects(&self) -> &BTreeMap<u32, SharedObject> {
        &self.shared_objects
    }

    pub fn prepack_descriptor_counts(&self) -> &DescriptorPoolConfig {
        &self.prepack_descriptor_counts
    }

    pub fn execute_descriptor_counts(&self) -> &DescriptorPoolConfig {
        &self.execute_descriptor_counts
    }

    /// Command buffer replayed by [`ComputeGraph::execute`], once encoded
    pub fn execute_cmd(&self) -> Option<&CommandBuffer> {
        self.execute_cmd.as_ref()
    }

    fn expect_state(&self, operation: &'static str, expected: GraphState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                expected,
                actual: self.state,
            })
        }
    }

    // Values

    pub fn add_scalar(&mut self, scalar: impl Into<Scalar>) -> ValueRef {
        self.values.push(Value::Scalar(scalar.into()))
    }

    pub fn add_string(&mut self, string: impl Into<String>) -> ValueRef {
        self.values.push(Value::String(string.into()))
    }

    /// Device tensor; tensors with the same `mem_obj_id` share one allocation
    pub fn add_tensor(&mut self, sizes: Vec<usize>, dtype: DataType, mem_obj_id: Option<u32>) -> ValueRef {
        let tensor = Tensor::new(sizes, dtype, mem_obj_id);
        let nbytes = tensor.nbytes();
        let value = self.values.push(Value::Tensor(tensor));
        if let Some(id) = mem_obj_id {
            self.shared_objects.entry(id).or_default().add_user(value, nbytes);
        }
        value
    }

    /// Private tensor with the sizes and dtype of `like`
    pub fn add_tensor_like(&mut self, like: ValueRef) -> Result<ValueRef> {
        let (sizes, dtype) = match self.values.get(like)? {
            Value::Tensor(t) => (t.sizes().to_vec(), t.dtype()),
            Value::TensorRef(t) => (t.sizes().to_vec(), t.dtype()),
            other => return Err(Error::unexpected_kind(like, "tensor", other.kind_name())),
        };
        Ok(self.add_tensor(sizes, dtype, None))
    }

    pub fn add_tensorref(&mut self, sizes: Vec<usize>, dtype: DataType, data: ConstantData) -> ValueRef {
        self.values.push(Value::TensorRef(TensorRef::new(sizes, dtype, data)))
    }

    pub fn add_staging(&mut self, dtype: DataType, numel: usize) -> ValueRef {
        self.values.push(Value::Staging(Staging::new(dtype, numel)))
    }

    /// Mark `tensor` as a graph input, returning the staging buffer that feeds it
    pub fn set_input_tensor(&mut self, tensor: ValueRef) -> Result<ValueRef> {
        self.expect_state("set_input_tensor", GraphState::Building)?;
        if self.inputs.iter().any(|io| io.tensor == tensor) {
            return Err(MalformedGraph::DuplicateInput(tensor).into());
        }
        let staging = ops::staging::add_staging_to_tensor_node(self, tensor)?;
        self.inputs.push(IoValue { tensor, staging });
        Ok(staging)
    }

    /// Mark `tensor` as a graph output, returning the staging buffer that receives it
    pub fn set_output_tensor(&mut self, tensor: ValueRef) -> Result<ValueRef> {
        self.expect_state("set_output_tensor", GraphState::Building)?;
        if self.outputs.iter().any(|io| io.tensor == tensor) {
            return Err(MalformedGraph::DuplicateOutput(tensor).into());
        }
        let staging = ops::staging::add_tensor_to_staging_node(self, tensor)?;
        self.outputs.push(IoValue { tensor, staging });
        Ok(staging)
    }

    // Nodes

    /// Global and local workgroup for an elementwise dispatch over `numel` invocations
    pub fn dispatch_extents(&self, numel: u32) -> (WorkgroupSize, WorkgroupSize) {
        let global = WorkgroupSize::linear(numel.max(1));
        let local = self.context.config().default_local_workgroup.clamp_to(global);
        (global, local)
    }

    /// Count one descriptor set of `shader` toward the execute or prepack pool demand
    pub fn update_descriptor_counts(&mut self, shader: &ShaderInfo, execute: bool) {
        let counts = if execute {
            &mut self.execute_descriptor_counts
        } else {
            &mut self.prepack_descriptor_counts
        };
        counts.record_shader(shader);
    }

    pub fn add_execute_node(&mut self, node: ExecuteNode) -> Result<()> {
        self.expect_state("add_execute_node", GraphState::Building)?;
        self.execute_nodes.push(node);
        Ok(())
    }

    pub fn add_prepack_node(&mut self, node: PrepackNode) -> Result<()> {
        self.expect_state("add_prepack_node", GraphState::Building)?;
        self.prepack_nodes.push(node);
        Ok(())
    }

    // Lifecycle

    /// Size the descriptor pool and allocate every buffer the graph owns
    #[tracing::instrument(
        skip(self),
        fields(
            values = self.values.len(),
            execute_nodes = self.execute_nodes.len(),
            prepack_nodes = self.prepack_nodes.len()
        )
    )]
    pub fn prepare(&mut self) -> Result<()> {
        self.expect_state("prepare", GraphState::Building)?;
        let _span = perf_span!("graph_prepare", values = self.values.len());

        let pool = self
            .prepack_descriptor_counts
            .merge_max(&self.execute_descriptor_counts)
            .scaled(self.config.descriptor_pool_safety_factor);
        self.context.ensure_descriptor_pool(pool);
        perf_event!(
            "descriptor_pool_sized",
            max_sets = pool.max_sets,
            uniform_buffers = pool.uniform_buffer_count,
            storage_buffers = pool.storage_buffer_count
        );

        let context = Arc::clone(&self.context);
        for object in self.shared_objects.values_mut() {
            let storage = object.allocate(&context)?;
            for &user in object.users() {
                self.values.tensor_mut(user)?.bind_storage(Arc::clone(&storage));
            }
        }

        for (_, value) in self.values.iter_mut() {
            match value {
                Value::Tensor(tensor) if !tensor.is_allocated() => {
                    tensor.bind_storage(Arc::new(context.allocate_buffer(tensor.nbytes())?));
                }
                Value::Staging(staging) if staging.buffer().is_none() => {
                    staging.bind_buffer(context.allocate_buffer(staging.nbytes())?);
                }
                _ => {}
            }
        }

        for node in &mut self.prepack_nodes {
            node.params_mut().materialize(&context)?;
        }
        for node in &mut self.execute_nodes {
            node.params_mut().materialize(&context)?;
        }

        tracing::debug!(
            shared_objects = self.shared_objects.len(),
            live_buffers = context.backend().live_buffer_count(),
            allocated_bytes = context.backend().allocated_bytes(),
            "graph prepared"
        );
        self.state = GraphState::Prepared;
        Ok(())
    }

    /// Record every prepack node into the graph's command buffer
    #[tracing::instrument(skip(self), fields(nodes = self.prepack_nodes.len()))]
    pub fn encode_prepack(&mut self) -> Result<()> {
        self.expect_state("encode_prepack", GraphState::Prepared)?;
        let _span = perf_span!("graph_encode_prepack", nodes = self.prepack_nodes.len());

        let nodes = std::mem::take(&mut self.prepack_nodes);
        let result = nodes.iter().try_for_each(|node| node.encode(self));
        self.prepack_nodes = nodes;
        result?;

        self.state = GraphState::PrepackEncoded;
        Ok(())
    }

    /// Submit the prepack recording, wait for it, then reset the recorder
    #[tracing::instrument(skip(self))]
    pub fn prepack(&mut self) -> Result<()> {
        self.expect_state("prepack", GraphState::PrepackEncoded)?;
        let _span = perf_span!("graph_prepack");

        let cmd = self.context.take_cmd();
        let result = self.context.submit_cmd(&cmd);
        drop(cmd);
        self.context.flush();
        result?;

        self.state = GraphState::Prepacked;
        Ok(())
    }

    /// Record every execute node into a command buffer kept for `execute()`
    #[tracing::instrument(skip(self), fields(nodes = self.execute_nodes.len()))]
    pub fn encode_execute(&mut self) -> Result<()> {
        self.expect_state("encode_execute", GraphState::Prepacked)?;
        let _span = perf_span!("graph_encode_execute", nodes = self.execute_nodes.len());

        self.context.flush();
        let nodes = std::mem::take(&mut self.execute_nodes);
        let result = nodes.iter().try_for_each(|node| node.encode(self));
        self.execute_nodes = nodes;
        if let Err(err) = result {
            self.context.flush();
            return Err(err);
        }

        let cmd = self.context.take_cmd();
        tracing::debug!(dispatches = cmd.len(), "execute command buffer encoded");
        self.execute_cmd = Some(cmd);
        self.state = GraphState::Ready;
        Ok(())
    }

    /// Submit the encoded execute command buffer and wait for completion
    #[tracing::instrument(skip(self))]
    pub fn execute(&self) -> Result<()> {
        let cmd = match (&self.execute_cmd, self.state) {
            (Some(cmd), GraphState::Ready) => cmd,
            _ => {
                return Err(Error::InvalidState {
                    operation: "execute",
                    expected: GraphState::Ready,
                    actual: self.state,
                })
            }
        };
        let _span = perf_span!("graph_execute", dispatches = cmd.len());
        self.context.submit_cmd(cmd).map_err(Error::from)
    }

    /// Run the whole lifecycle from `Building` to `Ready`
    pub fn compile(&mut self) -> Result<()> {
        self.prepare()?;
        self.encode_prepack()?;
        self.prepack()?;
        self.encode_execute()
    }

    // Host transfers

    fn input_staging(&self, value: ValueRef) -> Result<ValueRef> {
        self.inputs
            .iter()
            .find(|io| io.matches(value))
            .map(|io| io.staging)
            .ok_or(Error::NotAnInput(value))
    }

    fn output_staging(&self, value: ValueRef) -> Result<ValueRef> {
        self.outputs
            .iter()
            .find(|io| io.matches(value))
            .map(|io| io.staging)
            .ok_or(Error::NotAnOutput(value))
    }

    /// Resolve the staging buffer for a transfer of `numel` elements, checking bounds
    fn staging_for_transfer(
        &self,
        operation: &'static str,
        value: ValueRef,
        staging: ValueRef,
        host_len: usize,
        numel: usize,
    ) -> Result<(&DeviceBuffer, usize)> {
        let staging = self.values.staging(staging)?;
        if numel > staging.numel() {
            return Err(Error::StagingBounds {
                value,
                requested: numel,
                capacity: staging.numel(),
            });
        }
        let nbytes = numel * staging.dtype().element_size();
        if host_len < nbytes {
            return Err(Error::BufferSizeMismatch {
                role: operation,
                index: value.index(),
                expected: nbytes,
                actual: host_len,
            });
        }
        let buffer = staging.buffer().ok_or(Error::InvalidState {
            operation,
            expected: GraphState::Prepared,
            actual: self.state,
        })?;
        Ok((buffer, nbytes))
    }

    /// Copy `numel` elements from `data` into the staging buffer of input `value`.
    ///
    /// `value` may be the input tensor or its staging handle. Bounds are checked
    /// before anything is written.
    pub fn copy_into_staging(&self, value: ValueRef, data: &[u8], numel: usize) -> Result<()> {
        let staging = self.input_staging(value)?;
        let (buffer, nbytes) = self.staging_for_transfer("copy_into_staging", value, staging, data.len(), numel)?;
        self.context.copy_to_buffer(buffer, &data[..nbytes]).map_err(Error::from)
    }

    /// Copy `numel` elements from the staging buffer of output `value` into `out`
    pub fn copy_from_staging(&self, value: ValueRef, out: &mut [u8], numel: usize) -> Result<()> {
        let staging = self.output_staging(value)?;
        let (buffer, nbytes) = self.staging_for_transfer("copy_from_staging", value, staging, out.len(), numel)?;
        self.context.copy_from_buffer(buffer, &mut out[..nbytes]).map_err(Error::from)
    }

    pub fn copy_f32_into_staging(&self, value: ValueRef, data: &[f32]) -> Result<()> {
        self.copy_into_staging(value, bytemuck::cast_slice(data), data.len())
    }

    pub fn copy_f32_from_staging(&self, value: ValueRef, out: &mut [f32]) -> Result<()> {
        let numel = out.len();
        self.copy_from_staging(value, bytemuck::cast_slice_mut(out), numel)
    }
}

impl std::fmt::Debug for ComputeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeGraph")
            .field("state", &self.state)
            .field("values", &self.values.len())
            .field("prepack_nodes", &self.prepack_nodes.len())
            .field("execute_nodes", &self.execute_nodes.len())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}
