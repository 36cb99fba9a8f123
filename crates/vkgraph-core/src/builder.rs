//! Graph builder
//!
//! Replays a decoded [`VkGraph`] into a [`ComputeGraph`]:
//!
//! ```text
//!   values      every IR value, in order        ref_mapping[ir index] = handle
//!   input_ids   set_input_tensor                staging + staging->tensor node
//!   chain       registry lookup, resolve args   operator appends nodes
//!   output_ids  set_output_tensor               tensor->staging node + staging
//! ```
//!
//! Building never touches the device; a graph that fails to build has
//! allocated nothing.

use std::ops::Range;
use std::sync::Arc;

use crate::error::{MalformedGraph, Result};
use crate::graph::ComputeGraph;
use crate::registry::OperatorRegistry;
use crate::schema::{VkBytes, VkGraph, VkTensor, VkValue};
use crate::value::{checked_numel, ConstantData, ValueRef};

/// Constant bytes of a delegate blob, addressed relative to the section start
#[derive(Clone)]
pub struct ConstantSection {
    blob: Arc<[u8]>,
    range: Range<usize>,
}

impl ConstantSection {
    /// `range` must lie within `blob`; out-of-range sections resolve no constants
    pub fn new(blob: Arc<[u8]>, range: Range<usize>) -> Self {
        Self { blob, range }
    }

    /// Section covering all of `bytes`
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        let blob: Arc<[u8]> = bytes.into();
        let range = 0..blob.len();
        Self { blob, range }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Bytes of constant `id`, bounds-checked against the section
    pub fn resolve(&self, id: i64, bytes: &VkBytes) -> Result<ConstantData> {
        let out_of_bounds = || MalformedGraph::ConstantOutOfBounds {
            constant_id: id,
            offset: bytes.offset,
            length: bytes.length,
            section_len: self.len(),
        };
        let offset = usize::try_from(bytes.offset).map_err(|_| out_of_bounds())?;
        let length = usize::try_from(bytes.length).map_err(|_| out_of_bounds())?;
        match offset.checked_add(length) {
            Some(end) if end <= self.len() && self.range.end <= self.blob.len() => {
                ConstantData::new(Arc::clone(&self.blob), self.range.start + offset, length)
                    .ok_or_else(|| out_of_bounds().into())
            }
            _ => Err(out_of_bounds().into()),
        }
    }
}

impl std::fmt::Debug for ConstantSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantSection").field("range", &self.range).finish()
    }
}

pub struct GraphBuilder<'a> {
    ir: &'a VkGraph,
    constants: &'a ConstantSection,
    registry: &'a OperatorRegistry,
    ref_mapping: Vec<Option<ValueRef>>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(ir: &'a VkGraph, constants: &'a ConstantSection, registry: &'a OperatorRegistry) -> Self {
        Self {
            ir,
            constants,
            registry,
            ref_mapping: vec![None; ir.values.len()],
        }
    }

    /// Add every IR value, input, operator and output to `graph`
    #[tracing::instrument(
        skip_all,
        fields(values = self.ir.values.len(), operators = self.ir.chain.len())
    )]
    pub fn build(mut self, graph: &mut ComputeGraph) -> Result<()> {
        for (index, value) in self.ir.values.iter().enumerate() {
            self.add_value(graph, index, value)?;
        }

        for &id in &self.ir.input_ids {
            let tensor = self.get_ref("<input>", i64::from(id))?;
            graph.set_input_tensor(tensor)?;
        }

        for call in &self.ir.chain {
            let Some(op) = self.registry.get(&call.name) else {
                return Err(MalformedGraph::UnknownOperator(call.name.clone()).into());
            };
            let args = call
                .args
                .iter()
                .map(|&arg| self.get_ref(&call.name, i64::from(arg)))
                .collect::<Result<Vec<_>>>()?;
            tracing::debug!(operator = %call.name, args = ?args, "adding operator");
            op(graph, &args)?;
        }

        for &id in &self.ir.output_ids {
            let tensor = self.get_ref("<output>", i64::from(id))?;
            graph.set_output_tensor(tensor)?;
        }
        Ok(())
    }

    /// Handle for IR value `index`, which must already have been added
    fn get_ref(&self, operator: &str, index: i64) -> Result<ValueRef> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.ref_mapping.get(i).copied().flatten())
            .ok_or_else(|| {
                MalformedGraph::UnresolvedReference {
                    operator: operator.to_string(),
                    index,
                    available: self.ref_mapping.iter().filter(|r| r.is_some()).count(),
                }
                .into()
            })
    }

    fn add_value(&mut self, graph: &mut ComputeGraph, index: usize, value: &VkValue) -> Result<()> {
        if self.ref_mapping[index].is_some() {
            return Err(MalformedGraph::DuplicateValue(index).into());
        }
        let handle = match value {
            VkValue::Int(v) => graph.add_scalar(*v),
            VkValue::Double(v) => graph.add_scalar(*v),
            VkValue::Bool(v) => graph.add_scalar(*v),
            VkValue::String(s) => graph.add_string(s.clone()),
            VkValue::Tensor(tensor) => self.add_tensor(graph, tensor)?,
        };
        self.ref_mapping[index] = Some(handle);
        Ok(())
    }

    fn add_tensor(&self, graph: &mut ComputeGraph, tensor: &VkTensor) -> Result<ValueRef> {
        let sizes: Vec<usize> = tensor.dims.iter().map(|&d| d as usize).collect();
        // Kernel parameter blocks carry element counts as u32
        let nbytes = checked_numel(&sizes)
            .filter(|&numel| u32::try_from(numel).is_ok())
            .and_then(|numel| numel.checked_mul(tensor.datatype.element_size()))
            .ok_or_else(|| MalformedGraph::IncompatibleShapes(format!("tensor {sizes:?} has too many elements")))?;

        if tensor.constant_id >= 0 {
            let id = i64::from(tensor.constant_id);
            let bytes = self.ir.constants.get(tensor.constant_id as usize).ok_or_else(|| {
                MalformedGraph::ConstantOutOfBounds {
                    constant_id: id,
                    offset: 0,
                    length: 0,
                    section_len: self.constants.len(),
                }
            })?;
            let data = self.constants.resolve(id, bytes)?;
            if data.len() < nbytes {
                return Err(MalformedGraph::IncompatibleShapes(format!(
                    "constant {id} holds {} bytes, tensor {sizes:?} needs {nbytes}",
                    data.len()
                ))
                .into());
            }
            return Ok(graph.add_tensorref(sizes, tensor.datatype, data));
        }

        let mem_obj_id = u32::try_from(tensor.mem_obj_id).ok();
        Ok(graph.add_tensor(sizes, tensor.datatype, mem_obj_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::error::{Error, ErrorKind};
    use proptest::prelude::*;

    fn constants(values: &[f32]) -> ConstantSection {
        ConstantSection::from_bytes(bytemuck::cast_slice::<f32, u8>(values).to_vec())
    }

    /// `[int 4, const [1,2,3,4], mem0 tensor]`, add_scalar(1, 0) -> 2
    fn scenario() -> VkGraph {
        let mut ir = VkGraph::new();
        ir.add_value(VkValue::Int(4));
        let c = ir.add_constant(0, 16);
        ir.add_value(VkValue::Tensor(VkTensor::constant(vec![4], c)));
        ir.add_value(VkValue::Tensor(VkTensor::memory(vec![4], 0)));
        ir.input_ids.push(2);
        ir.add_operator("add_scalar", vec![1, 0, 2]);
        ir.output_ids.push(2);
        ir
    }

    fn build(ir: &VkGraph, section: &ConstantSection) -> (ComputeGraph, Result<()>) {
        let registry = OperatorRegistry::with_default_ops();
        let mut graph = ComputeGraph::new(GraphConfig::default());
        let result = GraphBuilder::new(ir, section, &registry).build(&mut graph);
        (graph, result)
    }

    #[test]
    fn test_build_scenario() {
        let (graph, result) = build(&scenario(), &constants(&[1.0, 2.0, 3.0, 4.0]));
        result.unwrap();

        // IR values keep their indices; staging and the prepacked tensor follow
        assert_eq!(graph.values().scalar(ValueRef::new(0)).unwrap().as_f32(), 4.0);
        assert!(graph.values().tensor_ref(ValueRef::new(1)).is_ok());
        assert!(graph.values().tensor(ValueRef::new(2)).is_ok());
        assert_eq!(graph.inputs()[0].tensor, ValueRef::new(2));
        assert_eq!(graph.prepack_nodes().len(), 1);
        assert_eq!(graph.execute_nodes().len(), 3);
        assert_eq!(graph.context().backend().live_buffer_count(), 0);
    }

    #[test]
    fn test_unknown_operator() {
        let mut ir = scenario();
        ir.add_operator("aten.convolution.default", vec![2, 2]);
        let (graph, result) = build(&ir, &constants(&[1.0, 2.0, 3.0, 4.0]));
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
        assert_eq!(graph.context().backend().live_buffer_count(), 0);
    }

    #[test]
    fn test_scoped_registry_rejects_defaults() {
        let ir = scenario();
        let section = constants(&[1.0, 2.0, 3.0, 4.0]);
        let registry = OperatorRegistry::new();
        let mut graph = ComputeGraph::new(GraphConfig::default());
        let err = GraphBuilder::new(&ir, &section, &registry).build(&mut graph).unwrap_err();
        assert!(matches!(err, Error::Malformed(MalformedGraph::UnknownOperator(name)) if name == "add_scalar"));
    }

    #[test]
    fn test_constant_bounds() {
        let (_, result) = build(&scenario(), &constants(&[1.0, 2.0]));
        assert!(matches!(
            result,
            Err(Error::Malformed(MalformedGraph::ConstantOutOfBounds { constant_id: 0, .. }))
        ));

        let mut ir = scenario();
        ir.constants[0].length = 8;
        let (_, result) = build(&ir, &constants(&[1.0, 2.0, 3.0, 4.0]));
        assert!(matches!(result, Err(Error::Malformed(MalformedGraph::IncompatibleShapes(_)))));

        let mut ir = scenario();
        ir.values[1] = VkValue::Tensor(VkTensor::constant(vec![4], 3));
        let (_, result) = build(&ir, &constants(&[1.0, 2.0, 3.0, 4.0]));
        assert!(matches!(
            result,
            Err(Error::Malformed(MalformedGraph::ConstantOutOfBounds { constant_id: 3, .. }))
        ));
    }

    #[test]
    fn test_section_offset_is_relative() {
        let mut blob = vec![0xAAu8; 8];
        blob.extend_from_slice(bytemuck::cast_slice(&[1.0f32, 2.0, 3.0, 4.0]));
        let section = ConstantSection::new(Arc::from(blob), 8..24);
        let data = section.resolve(0, &VkBytes { offset: 4, length: 4 }).unwrap();
        assert_eq!(data.bytes(), &2.0f32.to_le_bytes());
        assert!(section.resolve(0, &VkBytes { offset: 12, length: 8 }).is_err());
        assert!(section.resolve(0, &VkBytes { offset: u64::MAX, length: 2 }).is_err());
    }

    #[test]
    fn test_unresolved_input_and_output() {
        let mut ir = scenario();
        ir.input_ids.push(9);
        let (_, result) = build(&ir, &constants(&[1.0, 2.0, 3.0, 4.0]));
        assert!(matches!(
            result,
            Err(Error::Malformed(MalformedGraph::UnresolvedReference { index: 9, available: 3, .. }))
        ));
    }

    #[test]
    fn test_oversized_tensor_rejected() {
        let mut ir = VkGraph::new();
        ir.add_value(VkValue::Int(1));
        ir.add_value(VkValue::Tensor(VkTensor::memory(vec![u32::MAX; 3], -1)));
        let (graph, result) = build(&ir, &constants(&[]));
        assert!(matches!(
            result,
            Err(Error::Malformed(MalformedGraph::IncompatibleShapes(_)))
        ));
        assert_eq!(graph.values().len(), 1);

        let mut ir = VkGraph::new();
        ir.add_value(VkValue::Tensor(VkTensor::memory(vec![65536, 65536], 0)));
        let (_, result) = build(&ir, &constants(&[]));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::BadGraph);
    }

    proptest! {
        #[test]
        fn prop_arguments_must_reference_added_values(
            args in proptest::collection::vec(-3i32..8, 3)
        ) {
            let mut ir = scenario();
            ir.chain.clear();
            ir.add_operator("add_scalar", args.clone());
            let (_, result) = build(&ir, &constants(&[1.0, 2.0, 3.0, 4.0]));

            let out_of_range = args.iter().any(|&a| a < 0 || a as usize >= ir.values.len());
            if out_of_range {
                let is_unresolved = matches!(
                    result,
                    Err(Error::Malformed(MalformedGraph::UnresolvedReference { .. }))
                );
                prop_assert!(is_unresolved);
            } else if args == vec![1, 0, 2] {
                prop_assert!(result.is_ok());
            }
        }
    }
}
