//! Descriptor pool sizing, allocation and descriptor sets
//!
//! ```text
//!  DescriptorPoolConfig (demand tally)  ──scaled()──►  DescriptorPool (capacity)
//!                                                          │ allocate(shader, local)
//!                                                          ▼
//!                                                   DescriptorSet ── bind(idx, buffer)
//!                                                          │ resolve()
//!                                                          ▼
//!                                                   Vec<BufferHandle> in layout order
//! ```

use crate::backend::{BufferHandle, DescriptorType, WorkgroupSize};
use crate::error::{BackendError, Result};
use crate::shader::ShaderInfo;

/// Counts of descriptor sets and of each descriptor kind
///
/// Used both as a demand tally (one `record_shader` per node) and as the
/// capacity of a [`DescriptorPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorPoolConfig {
    pub max_sets: u32,
    pub uniform_buffer_count: u32,
    pub storage_buffer_count: u32,
    pub combined_sampler_count: u32,
    pub storage_image_count: u32,
}

impl DescriptorPoolConfig {
    /// Add one set plus one descriptor per layout slot of `shader`
    pub fn record_shader(&mut self, shader: &ShaderInfo) {
        self.max_sets += 1;
        for &ty in shader.kernel_layout() {
            *self.count_mut(ty) += 1;
        }
    }

    pub fn count(&self, ty: DescriptorType) -> u32 {
        match ty {
            DescriptorType::UniformBuffer => self.uniform_buffer_count,
            DescriptorType::StorageBuffer => self.storage_buffer_count,
            DescriptorType::CombinedImageSampler => self.combined_sampler_count,
            DescriptorType::StorageImage => self.storage_image_count,
        }
    }

    fn count_mut(&mut self, ty: DescriptorType) -> &mut u32 {
        match ty {
            DescriptorType::UniformBuffer => &mut self.uniform_buffer_count,
            DescriptorType::StorageBuffer => &mut self.storage_buffer_count,
            DescriptorType::CombinedImageSampler => &mut self.combined_sampler_count,
            DescriptorType::StorageImage => &mut self.storage_image_count,
        }
    }

    /// Field-wise maximum
    pub fn merge_max(&self, other: &Self) -> Self {
        Self {
            max_sets: self.max_sets.max(other.max_sets),
            uniform_buffer_count: self.uniform_buffer_count.max(other.uniform_buffer_count),
            storage_buffer_count: self.storage_buffer_count.max(other.storage_buffer_count),
            combined_sampler_count: self.combined_sampler_count.max(other.combined_sampler_count),
            storage_image_count: self.storage_image_count.max(other.storage_image_count),
        }
    }

    /// Field-wise `ceil(count * factor)`
    pub fn scaled(&self, factor: f32) -> Self {
        let scale = |count: u32| (count as f64 * factor as f64).ceil() as u32;
        Self {
            max_sets: scale(self.max_sets),
            uniform_buffer_count: scale(self.uniform_buffer_count),
            storage_buffer_count: scale(self.storage_buffer_count),
            combined_sampler_count: scale(self.combined_sampler_count),
            storage_image_count: scale(self.storage_image_count),
        }
    }

    /// Whether every field of `self` is at least the matching field of `other`
    pub fn covers(&self, other: &Self) -> bool {
        self.merge_max(other) == *self
    }
}

/// Fixed-capacity pool handing out descriptor sets until [`DescriptorPool::reset`]
#[derive(Debug)]
pub struct DescriptorPool {
    capacity: DescriptorPoolConfig,
    allocated: DescriptorPoolConfig,
}

impl DescriptorPool {
    pub fn new(capacity: DescriptorPoolConfig) -> Self {
        tracing::debug!(
            max_sets = capacity.max_sets,
            uniform_buffers = capacity.uniform_buffer_count,
            storage_buffers = capacity.storage_buffer_count,
            "descriptor pool initialized"
        );
        Self {
            capacity,
            allocated: DescriptorPoolConfig::default(),
        }
    }

    pub fn capacity(&self) -> &DescriptorPoolConfig {
        &self.capacity
    }

    pub fn allocated(&self) -> &DescriptorPoolConfig {
        &self.allocated
    }

    /// Allocate a set for `shader`, failing without side effects when any count would overflow
    pub fn allocate(&mut self, shader: &ShaderInfo, local: WorkgroupSize) -> Result<DescriptorSet> {
        let mut next = self.allocated;
        next.record_shader(shader);

        if next.max_sets > self.capacity.max_sets {
            return Err(BackendError::DescriptorPoolExhausted {
                descriptor: "descriptor_set",
                requested: next.max_sets,
                capacity: self.capacity.max_sets,
            });
        }
        for &ty in shader.kernel_layout() {
            if next.count(ty) > self.capacity.count(ty) {
                return Err(BackendError::DescriptorPoolExhausted {
                    descriptor: ty.name(),
                    requested: next.count(ty),
                    capacity: self.capacity.count(ty),
                });
            }
        }

        self.allocated = next;
        Ok(DescriptorSet::new(*shader, local))
    }

    /// Return every allocation to the pool
    pub fn reset(&mut self) {
        self.allocated = DescriptorPoolConfig::default();
    }
}

/// Bindings for one dispatch of one shader
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    shader: ShaderInfo,
    local: WorkgroupSize,
    bindings: Vec<Option<BufferHandle>>,
}

impl DescriptorSet {
    fn new(shader: ShaderInfo, local: WorkgroupSize) -> Self {
        Self {
            shader,
            local,
            bindings: vec![None; shader.binding_count()],
        }
    }

    pub fn shader(&self) -> &ShaderInfo {
        &self.shader
    }

    pub fn local_workgroup(&self) -> WorkgroupSize {
        self.local
    }

    pub fn bind(&mut self, index: u32, buffer: BufferHandle) -> Result<()> {
        let layout_len = self.bindings.len();
        let slot = self
            .bindings
            .get_mut(index as usize)
            .ok_or(BackendError::BindingOutOfRange {
                shader: self.shader.name(),
                index,
                layout_len,
            })?;
        *slot = Some(buffer);
        Ok(())
    }

    pub fn binding(&self, index: u32) -> Option<BufferHandle> {
        self.bindings.get(index as usize).copied().flatten()
    }

    /// Every slot's buffer in layout order, failing on the first unbound slot
    pub fn resolve(&self) -> Result<Vec<BufferHandle>> {
        self.bindings
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or(BackendError::UnboundBinding {
                    shader: self.shader.name(),
                    index: index as u32,
                })
            })
            .collect()
    }
}
