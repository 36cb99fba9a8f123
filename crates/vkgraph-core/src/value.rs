//! Value store
//!
//! Values are appended and never removed. A [`ValueRef`] is the dense,
//! zero-based position of a value in its store; the builder inserts IR values
//! first so that for those, `ValueRef` index == IR index. Operators append
//! derived values (prepacked tensors, staging buffers) after them.

use std::fmt;
use std::sync::Arc;

use vkgraph_backends::{BufferHandle, DeviceBuffer, MemoryAccess, PipelineBarrier};

use crate::dtype::DataType;
use crate::error::{Error, Result};

/// Handle of a value in a [`ValueStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(usize);

impl ValueRef {
    pub(crate) const fn new(index: usize) -> Self {
        ValueRef(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl Scalar {
    /// Value as a kernel parameter
    pub fn as_f32(self) -> f32 {
        match self {
            Scalar::Int(v) => v as f32,
            Scalar::Double(v) => v as f32,
            Scalar::Bool(v) => f32::from(u8::from(v)),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Double(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

/// A byte range of a shared constant blob
#[derive(Clone)]
pub struct ConstantData {
    blob: Arc<[u8]>,
    offset: usize,
    len: usize,
}

impl ConstantData {
    /// `None` when `offset + len` falls outside `blob`
    pub fn new(blob: Arc<[u8]>, offset: usize, len: usize) -> Option<Self> {
        let end = offset.checked_add(len)?;
        (end <= blob.len()).then_some(Self { blob, offset, len })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.blob[self.offset..self.offset + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for ConstantData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantData")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

fn numel_of(sizes: &[usize]) -> usize {
    sizes.iter().product()
}

/// Element count of `sizes`, or `None` if it overflows `usize`
pub fn checked_numel(sizes: &[usize]) -> Option<usize> {
    sizes.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Tensor backed by constant data, uploaded to the device by a prepack node
#[derive(Debug, Clone)]
pub struct TensorRef {
    sizes: Vec<usize>,
    dtype: DataType,
    data: ConstantData,
}

impl TensorRef {
    pub fn new(sizes: Vec<usize>, dtype: DataType, data: ConstantData) -> Self {
        Self { sizes, dtype, data }
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn data(&self) -> &ConstantData {
        &self.data
    }

    pub fn numel(&self) -> usize {
        numel_of(&self.sizes)
    }

    pub fn nbytes(&self) -> usize {
        self.numel() * self.dtype.element_size()
    }
}

/// Device-resident tensor
///
/// Storage is bound in `prepare()`. Tensors sharing a memory object id share
/// one allocation.
#[derive(Debug)]
pub struct Tensor {
    sizes: Vec<usize>,
    dtype: DataType,
    mem_obj_id: Option<u32>,
    storage: Option<Arc<DeviceBuffer>>,
    last_access: Option<MemoryAccess>,
}

impl Tensor {
    pub fn new(sizes: Vec<usize>, dtype: DataType, mem_obj_id: Option<u32>) -> Self {
        Self {
            sizes,
            dtype,
            mem_obj_id,
            storage: None,
            last_access: None,
        }
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn mem_obj_id(&self) -> Option<u32> {
        self.mem_obj_id
    }

    pub fn numel(&self) -> usize {
        numel_of(&self.sizes)
    }

    pub fn nbytes(&self) -> usize {
        self.numel() * self.dtype.element_size()
    }

    pub fn storage(&self) -> Option<&Arc<DeviceBuffer>> {
        self.storage.as_ref()
    }

    pub fn is_allocated(&self) -> bool {
        self.storage.is_some()
    }

    pub(crate) fn bind_storage(&mut self, storage: Arc<DeviceBuffer>) {
        self.storage = Some(storage);
    }

    /// Record `access` for the next dispatch, adding a barrier entry on a hazard
    pub(crate) fn record_access(
        &mut self,
        value: ValueRef,
        access: MemoryAccess,
        barrier: &mut PipelineBarrier,
    ) -> Result<BufferHandle> {
        let handle = self
            .storage
            .as_ref()
            .map(|buffer| buffer.handle())
            .ok_or(Error::unexpected_kind(value, "allocated tensor", "unallocated tensor"))?;
        barrier.record(handle, self.last_access, access);
        self.last_access = Some(access);
        Ok(handle)
    }
}

/// Host-visible buffer used to move graph inputs and outputs
#[derive(Debug)]
pub struct Staging {
    dtype: DataType,
    numel: usize,
    buffer: Option<DeviceBuffer>,
}

impl Staging {
    pub fn new(dtype: DataType, numel: usize) -> Self {
        Self {
            dtype,
            numel,
            buffer: None,
        }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Capacity in elements
    pub fn numel(&self) -> usize {
        self.numel
    }

    pub fn nbytes(&self) -> usize {
        self.numel * self.dtype.element_size()
    }

    pub fn buffer(&self) -> Option<&DeviceBuffer> {
        self.buffer.as_ref()
    }

    pub(crate) fn bind_buffer(&mut self, buffer: DeviceBuffer) {
        self.buffer = Some(buffer);
    }
}

/// Entry of the value store
#[derive(Debug)]
pub enum Value {
    Scalar(Scalar),
    String(String),
    Tensor(Tensor),
    TensorRef(TensorRef),
    Staging(Staging),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::String(_) => "string",
            Value::Tensor(_) => "tensor",
            Value::TensorRef(_) => "tensor_ref",
            Value::Staging(_) => "staging",
        }
    }
}

/// Append-only table of values
#[derive(Debug, Default)]
pub struct ValueStore {
    values: Vec<Value>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Value) -> ValueRef {
        self.values.push(value);
        ValueRef::new(self.values.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The handle `index` would have, if that value exists
    pub fn resolve(&self, index: usize) -> Option<ValueRef> {
        (index < self.values.len()).then_some(ValueRef::new(index))
    }

    pub fn get(&self, value: ValueRef) -> Result<&Value> {
        self.values.get(value.0).ok_or(Error::UnknownValue(value))
    }

    pub fn get_mut(&mut self, value: ValueRef) -> Result<&mut Value> {
        self.values.get_mut(value.0).ok_or(Error::UnknownValue(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValueRef, &Value)> {
        self.values.iter().enumerate().map(|(i, v)| (ValueRef::new(i), v))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (ValueRef, &mut Value)> {
        self.values.iter_mut().enumerate().map(|(i, v)| (ValueRef::new(i), v))
    }

    pub fn scalar(&self, value: ValueRef) -> Result<Scalar> {
        match self.get(value)? {
            Value::Scalar(s) => Ok(*s),
            other => Err(Error::unexpected_kind(value, "scalar", other.kind_name())),
        }
    }

    pub fn tensor(&self, value: ValueRef) -> Result<&Tensor> {
        match self.get(value)? {
            Value::Tensor(t) => Ok(t),
            other => Err(Error::unexpected_kind(value, "tensor", other.kind_name())),
        }
    }

    pub fn tensor_mut(&mut self, value: ValueRef) -> Result<&mut Tensor> {
        match self.get_mut(value)? {
            Value::Tensor(t) => Ok(t),
            other => Err(Error::unexpected_kind(value, "tensor", other.kind_name())),
        }
    }

    pub fn tensor_ref(&self, value: ValueRef) -> Result<&TensorRef> {
        match self.get(value)? {
            Value::TensorRef(t) => Ok(t),
            other => Err(Error::unexpected_kind(value, "tensor_ref", other.kind_name())),
        }
    }

    pub fn staging(&self, value: ValueRef) -> Result<&Staging> {
        match self.get(value)? {
            Value::Staging(s) => Ok(s),
            other => Err(Error::unexpected_kind(value, "staging", other.kind_name())),
        }
    }

    /// Sizes of a tensor or tensor ref
    pub fn sizes(&self, value: ValueRef) -> Result<&[usize]> {
        match self.get(value)? {
            Value::Tensor(t) => Ok(t.sizes()),
            Value::TensorRef(t) => Ok(t.sizes()),
            other => Err(Error::unexpected_kind(value, "tensor", other.kind_name())),
        }
    }
}
