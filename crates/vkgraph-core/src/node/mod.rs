//! Dispatch nodes
//!
//! ```text
//!   ExecuteNode   shader + [ArgGroup...] + params   encoded into the execute cmd
//!   PrepackNode   shader + TensorRef -> Tensor      encoded once into the prepack cmd
//! ```
//!
//! Both kinds bind their output first, then inputs, then the parameter block
//! as the last binding.

mod execute;
mod prepack;

pub use execute::ExecuteNode;
pub use prepack::PrepackNode;

use bytemuck::Pod;
use vkgraph_backends::{BackendError, BufferHandle, Context, DescriptorSet, DeviceBuffer, MemoryAccess, PipelineBarrier};

use crate::error::{Error, Result};
use crate::value::{Value, ValueRef, ValueStore};

/// Values bound with the same access mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgGroup {
    pub refs: Vec<ValueRef>,
    pub access: MemoryAccess,
}

impl ArgGroup {
    pub fn new(refs: Vec<ValueRef>, access: MemoryAccess) -> Self {
        Self { refs, access }
    }

    pub fn read(refs: impl IntoIterator<Item = ValueRef>) -> Self {
        Self::new(refs.into_iter().collect(), MemoryAccess::Read)
    }

    pub fn write(value: ValueRef) -> Self {
        Self::new(vec![value], MemoryAccess::Write)
    }
}

/// Parameter block of one node, uploaded to its own uniform buffer in `prepare()`
#[derive(Debug)]
pub struct ParamsBuffer {
    data: Vec<u8>,
    buffer: Option<DeviceBuffer>,
}

impl ParamsBuffer {
    pub fn new<T: Pod>(block: &T) -> Self {
        Self {
            data: bytemuck::bytes_of(block).to_vec(),
            buffer: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_materialized(&self) -> bool {
        self.buffer.is_some()
    }

    pub(crate) fn materialize(&mut self, context: &Context) -> Result<()> {
        if self.buffer.is_none() {
            let buffer = context.allocate_buffer(self.data.len())?;
            context.copy_to_buffer(&buffer, &self.data)?;
            self.buffer = Some(buffer);
        }
        Ok(())
    }

    pub(crate) fn handle(&self) -> Result<BufferHandle> {
        self.buffer
            .as_ref()
            .map(DeviceBuffer::handle)
            .ok_or_else(|| Error::Backend(BackendError::Other("parameter buffer not materialized".into())))
    }
}

/// Bind every value of `args` to consecutive slots of `set` starting at `first`.
///
/// Tensors record their access in `barrier`; staging buffers are bound as-is.
/// Returns the next free binding index.
pub(crate) fn bind_values_to_descriptor_set(
    values: &mut ValueStore,
    args: &[ArgGroup],
    barrier: &mut PipelineBarrier,
    set: &mut DescriptorSet,
    first: u32,
) -> Result<u32> {
    let mut index = first;
    for group in args {
        for &value in &group.refs {
            let handle = match values.get_mut(value)? {
                Value::Tensor(tensor) => tensor.record_access(value, group.access, barrier)?,
                Value::Staging(staging) => staging
                    .buffer()
                    .map(DeviceBuffer::handle)
                    .ok_or(Error::unexpected_kind(value, "allocated staging", "unallocated staging"))?,
                other => return Err(Error::unexpected_kind(value, "tensor or staging", other.kind_name())),
            };
            set.bind(index, handle)?;
            index += 1;
        }
    }
    Ok(index)
}
