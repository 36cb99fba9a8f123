//! Backend delegate entry points
//!
//! ```text
//!   init(blob)
//!     ├── DelegateHeader::parse        container magic, section bounds
//!     ├── VkGraph::from_ir_section     IR identifier, decode
//!     ├── GraphBuilder::build          values, inputs, operators, outputs
//!     └── ComputeGraph::prepare → encode_prepack → prepack → encode_execute
//!
//!   execute(handle, inputs, outputs)
//!     copy inputs into staging → submit execute cmd → copy staging into outputs
//! ```

use std::sync::Arc;

use vkgraph_backends::Backend;

use crate::builder::{ConstantSection, GraphBuilder};
use crate::config::GraphConfig;
use crate::error::{Error, Result};
use crate::graph::ComputeGraph;
use crate::header::DelegateHeader;
use crate::registry::{default_registry, OperatorRegistry};
use crate::schema::VkGraph;
use crate::value::ValueRef;

/// A compiled graph returned by [`VulkanDelegate::init`]
#[derive(Debug)]
pub struct DelegateHandle {
    graph: ComputeGraph,
}

impl DelegateHandle {
    pub fn graph(&self) -> &ComputeGraph {
        &self.graph
    }

    pub fn num_inputs(&self) -> usize {
        self.graph.inputs().len()
    }

    pub fn num_outputs(&self) -> usize {
        self.graph.outputs().len()
    }

    /// Byte size of each input's staging buffer, in input order
    pub fn input_sizes(&self) -> Result<Vec<usize>> {
        self.graph
            .inputs()
            .iter()
            .map(|io| Ok(self.graph.values().staging(io.staging)?.nbytes()))
            .collect()
    }

    /// Byte size of each output's staging buffer, in output order
    pub fn output_sizes(&self) -> Result<Vec<usize>> {
        self.graph
            .outputs()
            .iter()
            .map(|io| Ok(self.graph.values().staging(io.staging)?.nbytes()))
            .collect()
    }
}

/// Compiles delegate blobs into ready-to-run graphs and executes them
#[derive(Clone)]
pub struct VulkanDelegate {
    registry: Arc<OperatorRegistry>,
    backend: Option<Arc<dyn Backend>>,
    config: GraphConfig,
}

impl std::fmt::Debug for VulkanDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDelegate")
            .field("registry", &self.registry)
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("config", &self.config)
            .finish()
    }
}

impl Default for VulkanDelegate {
    fn default() -> Self {
        Self::new()
    }
}

impl VulkanDelegate {
    /// Default operators; each graph gets its own CPU backend
    pub fn new() -> Self {
        Self::with_registry(default_registry())
    }

    pub fn with_registry(registry: Arc<OperatorRegistry>) -> Self {
        Self {
            registry,
            backend: None,
            config: GraphConfig::default(),
        }
    }

    /// Run every graph on `backend`; each graph still records through its own context
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// The reference backend is always present
    pub fn is_available(&self) -> bool {
        true
    }

    /// Parse, build and fully prepare the graph in `blob`
    #[tracing::instrument(skip_all, fields(blob_len = tracing::field::Empty))]
    pub fn init(&self, blob: impl Into<Arc<[u8]>>) -> Result<DelegateHandle> {
        let blob: Arc<[u8]> = blob.into();
        tracing::Span::current().record("blob_len", blob.len());

        let header = DelegateHeader::parse(&blob)?;
        let ir = VkGraph::from_ir_section(&blob[header.ir_range()])?;
        let constants = ConstantSection::new(Arc::clone(&blob), header.constants_range());

        let mut graph = match &self.backend {
            Some(backend) => ComputeGraph::with_backend(self.config, Arc::clone(backend)),
            None => ComputeGraph::new(self.config),
        };
        GraphBuilder::new(&ir, &constants, &self.registry).build(&mut graph)?;
        graph.compile()?;

        tracing::info!(
            version = %ir.version,
            values = graph.values().len(),
            inputs = graph.inputs().len(),
            outputs = graph.outputs().len(),
            "delegate initialized"
        );
        Ok(DelegateHandle { graph })
    }

    /// Copy `inputs` in, run the graph once, and copy results into `outputs`.
    ///
    /// Buffers are raw element bytes in input/output order.
    #[tracing::instrument(skip_all, fields(inputs = inputs.len(), outputs = outputs.len()))]
    pub fn execute(&self, handle: &mut DelegateHandle, inputs: &[&[u8]], outputs: &mut [&mut [u8]]) -> Result<()> {
        let graph = &handle.graph;
        check_count("input", graph.inputs().len(), inputs.len())?;
        check_count("output", graph.outputs().len(), outputs.len())?;

        for (index, (io, data)) in graph.inputs().iter().zip(inputs).enumerate() {
            let numel = host_numel(graph, io.staging, "input", index, data.len())?;
            graph.copy_into_staging(io.staging, data, numel)?;
        }

        graph.execute()?;

        for (index, (io, out)) in graph.outputs().iter().zip(outputs.iter_mut()).enumerate() {
            let numel = host_numel(graph, io.staging, "output", index, out.len())?;
            graph.copy_from_staging(io.staging, out, numel)?;
        }
        Ok(())
    }

    /// Release every resource held by `handle`
    pub fn destroy(&self, handle: DelegateHandle) {
        tracing::debug!(values = handle.graph.values().len(), "delegate handle destroyed");
        drop(handle);
    }
}

fn check_count(role: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::BufferCount { role, expected, actual })
    }
}

/// Element count of a host buffer, which must hold whole elements
fn host_numel(graph: &ComputeGraph, staging: ValueRef, role: &'static str, index: usize, len: usize) -> Result<usize> {
    let element_size = graph.values().staging(staging)?.dtype().element_size();
    if len % element_size != 0 {
        return Err(Error::BufferSizeMismatch {
            role,
            index,
            expected: len.next_multiple_of(element_size),
            actual: len,
        });
    }
    Ok(len / element_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::header::serialize_delegate_blob;
    use crate::schema::{VkTensor, VkValue};
    use vkgraph_backends::CpuBackend;

    fn identity_blob() -> Vec<u8> {
        let mut ir = VkGraph::new();
        let x = ir.add_value(VkValue::Tensor(VkTensor::memory(vec![2, 2], 0)));
        ir.input_ids.push(x);
        ir.output_ids.push(x);
        serialize_delegate_blob(&ir, &[])
    }

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_identity_round_trip() {
        let delegate = VulkanDelegate::new();
        assert!(delegate.is_available());
        let mut handle = delegate.init(identity_blob()).unwrap();
        assert_eq!(handle.input_sizes().unwrap(), vec![16]);

        let input = f32_bytes(&[1.0, -2.0, 3.5, 0.0]);
        let mut output = vec![0u8; 16];
        delegate
            .execute(&mut handle, &[&input[..]], &mut [output.as_mut_slice()])
            .unwrap();
        assert_eq!(output, input);
        delegate.destroy(handle);
    }

    #[test]
    fn test_buffer_validation() {
        let delegate = VulkanDelegate::new();
        let mut handle = delegate.init(identity_blob()).unwrap();
        let input = vec![0u8; 16];
        let mut output = vec![0u8; 16];

        let err = delegate.execute(&mut handle, &[], &mut [output.as_mut_slice()]).unwrap_err();
        assert!(matches!(err, Error::BufferCount { role: "input", expected: 1, actual: 0 }));

        let big = vec![0u8; 20];
        let err = delegate
            .execute(&mut handle, &[&big[..]], &mut [output.as_mut_slice()])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Staging);

        let odd = vec![0u8; 6];
        let err = delegate
            .execute(&mut handle, &[&odd[..]], &mut [output.as_mut_slice()])
            .unwrap_err();
        assert!(matches!(err, Error::BufferSizeMismatch { expected: 8, actual: 6, .. }));

        delegate
            .execute(&mut handle, &[&input[..]], &mut [output.as_mut_slice()])
            .unwrap();
    }

    #[test]
    fn test_init_rejects_bad_containers() {
        let delegate = VulkanDelegate::new();

        let mut blob = identity_blob();
        blob[4] = b'X';
        assert_eq!(delegate.init(blob).unwrap_err().kind(), ErrorKind::BadContainer);

        let mut blob = identity_blob();
        let header = DelegateHeader::parse(&blob).unwrap();
        let id_start = header.ir_offset as usize + 4;
        blob[id_start..id_start + 4].copy_from_slice(b"VK99");
        assert!(matches!(
            delegate.init(blob).unwrap_err(),
            Error::IncompatibleFormatVersion { .. }
        ));
    }

    #[test]
    fn test_shared_backend() {
        let backend: Arc<dyn Backend> = Arc::new(CpuBackend::new());
        let delegate = VulkanDelegate::new().with_backend(Arc::clone(&backend));
        let first = delegate.init(identity_blob()).unwrap();
        let second = delegate.init(identity_blob()).unwrap();
        assert!(Arc::ptr_eq(first.graph().backend(), second.graph().backend()));
        assert!(!Arc::ptr_eq(first.graph().context(), second.graph().context()));
        assert!(backend.live_buffer_count() > 0);

        delegate.destroy(first);
        delegate.destroy(second);
        assert_eq!(backend.live_buffer_count(), 0);
    }
}
