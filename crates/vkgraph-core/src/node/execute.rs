use std::sync::Arc;

use vkgraph_backends::{PipelineBarrier, ShaderInfo, WorkgroupSize};

use super::{bind_values_to_descriptor_set, ArgGroup, ParamsBuffer};
use crate::error::Result;
use crate::graph::ComputeGraph;

/// One shader dispatch of the execute command buffer
#[derive(Debug)]
pub struct ExecuteNode {
    shader: ShaderInfo,
    global: WorkgroupSize,
    local: WorkgroupSize,
    args: Vec<ArgGroup>,
    params: ParamsBuffer,
}

impl ExecuteNode {
    /// Create the node and count its descriptors toward the execute pool demand
    pub fn new(
        graph: &mut ComputeGraph,
        shader: ShaderInfo,
        global: WorkgroupSize,
        local: WorkgroupSize,
        args: Vec<ArgGroup>,
        params: ParamsBuffer,
    ) -> Self {
        graph.update_descriptor_counts(&shader, true);
        Self {
            shader,
            global,
            local,
            args,
            params,
        }
    }

    pub fn shader(&self) -> &ShaderInfo {
        &self.shader
    }

    pub fn global_workgroup(&self) -> WorkgroupSize {
        self.global
    }

    pub fn local_workgroup(&self) -> WorkgroupSize {
        self.local
    }

    pub fn args(&self) -> &[ArgGroup] {
        &self.args
    }

    pub(crate) fn params_mut(&mut self) -> &mut ParamsBuffer {
        &mut self.params
    }

    /// Record this dispatch into the context's command buffer
    pub(crate) fn encode(&self, graph: &mut ComputeGraph) -> Result<()> {
        let context = Arc::clone(graph.context());
        let mut recorder = context.dispatch_lock();

        let mut set = recorder.get_descriptor_set(&self.shader, self.local)?;
        let mut barrier = PipelineBarrier::default();
        let params_index = bind_values_to_descriptor_set(graph.values_mut(), &self.args, &mut barrier, &mut set, 0)?;
        set.bind(params_index, self.params.handle()?)?;

        recorder.register_shader_dispatch(set, barrier, &self.shader, self.global)?;
        Ok(())
    }
}
