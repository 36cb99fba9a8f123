use std::sync::Arc;

use vkgraph_backends::{MemoryAccess, PipelineBarrier, ShaderInfo, WorkgroupSize};

use super::ParamsBuffer;
use crate::error::{Error, Result};
use crate::graph::ComputeGraph;
use crate::value::ValueRef;

/// Uploads a [`crate::value::TensorRef`]'s constant data into a device tensor.
///
/// The constant bytes go through a transient staging buffer that the prepack
/// command buffer keeps alive until it is dropped after submission.
#[derive(Debug)]
pub struct PrepackNode {
    shader: ShaderInfo,
    global: WorkgroupSize,
    local: WorkgroupSize,
    tref: ValueRef,
    packed: ValueRef,
    params: ParamsBuffer,
}

impl PrepackNode {
    /// Create the node and count its descriptors toward the prepack pool demand
    pub fn new(
        graph: &mut ComputeGraph,
        shader: ShaderInfo,
        global: WorkgroupSize,
        local: WorkgroupSize,
        tref: ValueRef,
        packed: ValueRef,
        params: ParamsBuffer,
    ) -> Self {
        graph.update_descriptor_counts(&shader, false);
        Self {
            shader,
            global,
            local,
            tref,
            packed,
            params,
        }
    }

    pub fn shader(&self) -> &ShaderInfo {
        &self.shader
    }

    pub fn tref(&self) -> ValueRef {
        self.tref
    }

    pub fn packed(&self) -> ValueRef {
        self.packed
    }

    pub(crate) fn params_mut(&mut self) -> &mut ParamsBuffer {
        &mut self.params
    }

    pub(crate) fn encode(&self, graph: &mut ComputeGraph) -> Result<()> {
        let context = Arc::clone(graph.context());

        let tref = graph.values().tensor_ref(self.tref)?;
        let nbytes = tref.nbytes();
        let data = tref.data().bytes().get(..nbytes).ok_or_else(|| {
            Error::shapes(format!(
                "constant for {} holds {} bytes, tensor needs {nbytes}",
                self.tref,
                tref.data().len()
            ))
        })?;
        let staging = context.allocate_buffer(nbytes)?;
        context.copy_to_buffer(&staging, data)?;

        let mut recorder = context.dispatch_lock();
        let mut set = recorder.get_descriptor_set(&self.shader, self.local)?;
        let mut barrier = PipelineBarrier::default();
        let packed = graph
            .values_mut()
            .tensor_mut(self.packed)?
            .record_access(self.packed, MemoryAccess::Write, &mut barrier)?;
        set.bind(0, packed)?;
        set.bind(1, staging.handle())?;
        set.bind(2, self.params.handle()?)?;

        recorder.register_shader_dispatch(set, barrier, &self.shader, self.global)?;
        recorder.retain(staging);
        Ok(())
    }
}
