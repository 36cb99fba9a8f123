//! Serialized graph IR
//!
//! The IR is a flat value table plus an operator chain whose arguments are
//! indices into that table.
//!
//! # Formats
//!
//! - **Binary**: compact little-endian encoding embedded in delegate blobs.
//! - **JSON**: human-readable form for tooling and debugging.
//!
//! # IR section layout
//!
//! ```text
//! [root_offset: u32]        always 8
//! [identifier: [u8; 4]]     "VK00"
//! [payload]                 VkGraph::to_binary()
//! ```

use serde::{Deserialize, Serialize};

use crate::dtype::DataType;
use crate::error::{Error, Result};

/// Format identifier stored in every IR section
pub const IR_IDENTIFIER: [u8; 4] = *b"VK00";

const IR_ROOT_OFFSET: u32 = 8;

/// Tensor declaration
///
/// `constant_id >= 0` makes the tensor constant-backed. Otherwise
/// `mem_obj_id >= 0` groups it with other tensors sharing one allocation,
/// and `-1` gives it a private allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VkTensor {
    pub datatype: DataType,
    pub dims: Vec<u32>,
    pub constant_id: i32,
    pub mem_obj_id: i32,
}

impl VkTensor {
    pub fn constant(dims: Vec<u32>, constant_id: i32) -> Self {
        Self {
            datatype: DataType::Float32,
            dims,
            constant_id,
            mem_obj_id: -1,
        }
    }

    pub fn memory(dims: Vec<u32>, mem_obj_id: i32) -> Self {
        Self {
            datatype: DataType::Float32,
            dims,
            constant_id: -1,
            mem_obj_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VkValue {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    Tensor(VkTensor),
}

impl VkValue {
    const TAG_INT: u8 = 0;
    const TAG_DOUBLE: u8 = 1;
    const TAG_BOOL: u8 = 2;
    const TAG_STRING: u8 = 3;
    const TAG_TENSOR: u8 = 4;
}

/// One operator invocation; `args` index into [`VkGraph::values`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorCall {
    pub name: String,
    pub args: Vec<i32>,
}

/// Location of one constant inside the constant section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VkBytes {
    pub offset: u64,
    pub length: u64,
}

/// Root of the IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VkGraph {
    pub version: String,
    pub chain: Vec<OperatorCall>,
    pub values: Vec<VkValue>,
    pub input_ids: Vec<u32>,
    pub output_ids: Vec<u32>,
    pub constants: Vec<VkBytes>,
}

impl Default for VkGraph {
    fn default() -> Self {
        Self {
            version: "0".to_string(),
            chain: Vec::new(),
            values: Vec::new(),
            input_ids: Vec::new(),
            output_ids: Vec::new(),
            constants: Vec::new(),
        }
    }
}

impl VkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, returning its index
    pub fn add_value(&mut self, value: VkValue) -> u32 {
        self.values.push(value);
        (self.values.len() - 1) as u32
    }

    /// Append a constant table entry, returning its id
    pub fn add_constant(&mut self, offset: u64, length: u64) -> i32 {
        self.constants.push(VkBytes { offset, length });
        (self.constants.len() - 1) as i32
    }

    pub fn add_operator(&mut self, name: impl Into<String>, args: Vec<i32>) {
        self.chain.push(OperatorCall {
            name: name.into(),
            args,
        });
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::invalid_ir(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::invalid_ir(e.to_string()))
    }

    /// Serialize the payload
    ///
    /// # Binary Layout
    ///
    /// ```text
    /// [version: str]
    /// [value_count: u32]    [values: [tag: u8][payload]]
    /// [input_count: u32]    [input_ids: u32 ...]
    /// [output_count: u32]   [output_ids: u32 ...]
    /// [chain_count: u32]    [calls: [name: str][arg_count: u32][args: i32 ...]]
    /// [constant_count: u32] [constants: [offset: u64][length: u64]]
    ///
    /// str    = [len: u32][utf8 bytes]
    /// tensor = [dtype: u8][dim_count: u32][dims: u32 ...][constant_id: i32][mem_obj_id: i32]
    /// ```
    pub fn to_binary(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        write_str(&mut buffer, &self.version);

        write_len(&mut buffer, self.values.len());
        for value in &self.values {
            match value {
                VkValue::Int(v) => {
                    buffer.push(VkValue::TAG_INT);
                    buffer.extend_from_slice(&v.to_le_bytes());
                }
                VkValue::Double(v) => {
                    buffer.push(VkValue::TAG_DOUBLE);
                    buffer.extend_from_slice(&v.to_le_bytes());
                }
                VkValue::Bool(v) => {
                    buffer.push(VkValue::TAG_BOOL);
                    buffer.push(u8::from(*v));
                }
                VkValue::String(s) => {
                    buffer.push(VkValue::TAG_STRING);
                    write_str(&mut buffer, s);
                }
                VkValue::Tensor(t) => {
                    buffer.push(VkValue::TAG_TENSOR);
                    buffer.push(t.datatype.tag());
                    write_len(&mut buffer, t.dims.len());
                    for dim in &t.dims {
                        buffer.extend_from_slice(&dim.to_le_bytes());
                    }
                    buffer.extend_from_slice(&t.constant_id.to_le_bytes());
                    buffer.extend_from_slice(&t.mem_obj_id.to_le_bytes());
                }
            }
        }

        for ids in [&self.input_ids, &self.output_ids] {
            write_len(&mut buffer, ids.len());
            for id in ids {
                buffer.extend_from_slice(&id.to_le_bytes());
            }
        }

        write_len(&mut buffer, self.chain.len());
        for call in &self.chain {
            write_str(&mut buffer, &call.name);
            write_len(&mut buffer, call.args.len());
            for arg in &call.args {
                buffer.extend_from_slice(&arg.to_le_bytes());
            }
        }

        write_len(&mut buffer, self.constants.len());
        for constant in &self.constants {
            buffer.extend_from_slice(&constant.offset.to_le_bytes());
            buffer.extend_from_slice(&constant.length.to_le_bytes());
        }

        buffer
    }

    /// Deserialize a payload produced by [`VkGraph::to_binary`]
    pub fn from_binary(buffer: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(buffer);
        let version = reader.read_str()?;

        let value_count = reader.read_count()?;
        let mut values = Vec::with_capacity(value_count);
        for index in 0..value_count {
            let value = match reader.read_u8()? {
                VkValue::TAG_INT => VkValue::Int(i64::from_le_bytes(reader.read_array()?)),
                VkValue::TAG_DOUBLE => VkValue::Double(f64::from_le_bytes(reader.read_array()?)),
                VkValue::TAG_BOOL => VkValue::Bool(reader.read_u8()? != 0),
                VkValue::TAG_STRING => VkValue::String(reader.read_str()?),
                VkValue::TAG_TENSOR => {
                    let datatype = DataType::from_tag(reader.read_u8()?)?;
                    let dim_count = reader.read_count()?;
                    let dims = (0..dim_count).map(|_| reader.read_u32()).collect::<Result<Vec<_>>>()?;
                    let constant_id = i32::from_le_bytes(reader.read_array()?);
                    let mem_obj_id = i32::from_le_bytes(reader.read_array()?);
                    VkValue::Tensor(VkTensor {
                        datatype,
                        dims,
                        constant_id,
                        mem_obj_id,
                    })
                }
                tag => return Err(Error::invalid_ir(format!("value {index} has unknown tag {tag}"))),
            };
            values.push(value);
        }

        let input_count = reader.read_count()?;
        let input_ids = (0..input_count).map(|_| reader.read_u32()).collect::<Result<Vec<_>>>()?;
        let output_count = reader.read_count()?;
        let output_ids = (0..output_count).map(|_| reader.read_u32()).collect::<Result<Vec<_>>>()?;

        let chain_count = reader.read_count()?;
        let mut chain = Vec::with_capacity(chain_count);
        for _ in 0..chain_count {
            let name = reader.read_str()?;
            let arg_count = reader.read_count()?;
            let args = (0..arg_count)
                .map(|_| Ok(i32::from_le_bytes(reader.read_array()?)))
                .collect::<Result<Vec<_>>>()?;
            chain.push(OperatorCall { name, args });
        }

        let constant_count = reader.read_count()?;
        let mut constants = Vec::with_capacity(constant_count);
        for _ in 0..constant_count {
            let offset = u64::from_le_bytes(reader.read_array()?);
            let length = u64::from_le_bytes(reader.read_array()?);
            constants.push(VkBytes { offset, length });
        }

        if reader.remaining() != 0 {
            return Err(Error::invalid_ir(format!("{} trailing bytes", reader.remaining())));
        }

        Ok(Self {
            version,
            chain,
            values,
            input_ids,
            output_ids,
            constants,
        })
    }

    /// Payload wrapped with the root offset and format identifier
    pub fn to_ir_section(&self) -> Vec<u8> {
        let payload = self.to_binary();
        let mut section = Vec::with_capacity(IR_ROOT_OFFSET as usize + payload.len());
        section.extend_from_slice(&IR_ROOT_OFFSET.to_le_bytes());
        section.extend_from_slice(&IR_IDENTIFIER);
        section.extend_from_slice(&payload);
        section
    }

    /// Check the identifier of an IR section and decode its payload
    pub fn from_ir_section(section: &[u8]) -> Result<Self> {
        let found = ir_identifier(section)
            .ok_or_else(|| Error::invalid_ir(format!("IR section is {} bytes", section.len())))?;
        if found != IR_IDENTIFIER {
            return Err(Error::IncompatibleFormatVersion {
                found,
                expected: IR_IDENTIFIER,
            });
        }
        let root = u32::from_le_bytes([section[0], section[1], section[2], section[3]]) as usize;
        if root < IR_ROOT_OFFSET as usize || root > section.len() {
            return Err(Error::invalid_ir(format!("root offset {root} out of range")));
        }
        Self::from_binary(&section[root..])
    }
}

/// The 4-byte identifier of an IR section, if the section is long enough
pub fn ir_identifier(section: &[u8]) -> Option<[u8; 4]> {
    section.get(4..8)?.try_into().ok()
}

fn write_len(buffer: &mut Vec<u8>, len: usize) {
    buffer.extend_from_slice(&(len as u32).to_le_bytes());
}

fn write_str(buffer: &mut Vec<u8>, s: &str) {
    write_len(buffer, s.len());
    buffer.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::invalid_ir(format!(
                "unexpected end of IR at byte {}: need {len}, have {}",
                self.offset,
                self.remaining()
            )));
        }
        let bytes = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    // Every counted element occupies at least one byte, so a larger count is corrupt.
    fn read_count(&mut self) -> Result<usize> {
        let count = self.read_u32()? as usize;
        if count > self.remaining() {
            return Err(Error::invalid_ir(format!(
                "count {count} at byte {} exceeds remaining {} bytes",
                self.offset - 4,
                self.remaining()
            )));
        }
        Ok(count)
    }

    fn read_str(&mut self) -> Result<String> {
        let len = self.read_count()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::invalid_ir(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MalformedGraph;

    fn sample() -> VkGraph {
        let mut graph = VkGraph::new();
        let scalar = graph.add_value(VkValue::Int(4));
        let constant = graph.add_constant(0, 16);
        let weights = graph.add_value(VkValue::Tensor(VkTensor::constant(vec![4], constant)));
        let out = graph.add_value(VkValue::Tensor(VkTensor::memory(vec![4], 0)));
        graph.add_value(VkValue::Double(-0.5));
        graph.add_value(VkValue::Bool(true));
        graph.add_value(VkValue::String("alpha".into()));
        graph.input_ids.push(out);
        graph.add_operator("add_scalar", vec![weights as i32, scalar as i32, out as i32]);
        graph.output_ids.push(out);
        graph
    }

    #[test]
    fn test_binary_roundtrip() {
        let graph = sample();
        assert_eq!(VkGraph::from_binary(&graph.to_binary()).unwrap(), graph);
    }

    #[test]
    fn test_json_roundtrip() {
        let graph = sample();
        let json = graph.to_json().unwrap();
        assert!(json.contains("add_scalar"));
        assert_eq!(VkGraph::from_json(&json).unwrap(), graph);
    }

    #[test]
    fn test_ir_section_identifier() {
        let section = sample().to_ir_section();
        assert_eq!(ir_identifier(&section), Some(IR_IDENTIFIER));
        assert_eq!(VkGraph::from_ir_section(&section).unwrap(), sample());

        let mut wrong = section.clone();
        wrong[4..8].copy_from_slice(b"VK01");
        assert!(matches!(
            VkGraph::from_ir_section(&wrong),
            Err(Error::IncompatibleFormatVersion { found, .. }) if &found == b"VK01"
        ));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let bytes = sample().to_binary();
        for cut in [0, 3, bytes.len() / 2, bytes.len() - 1] {
            let err = VkGraph::from_binary(&bytes[..cut]).unwrap_err();
            assert!(matches!(err, Error::Malformed(MalformedGraph::InvalidIr(_))), "cut {cut}");
        }
    }

    #[test]
    fn test_unknown_tags_rejected() {
        let mut graph = VkGraph::new();
        graph.add_value(VkValue::Tensor(VkTensor::memory(vec![1], -1)));
        let mut bytes = graph.to_binary();
        // version "0" (4 + 1), value count (4), value tag (1), then dtype
        let dtype_at = 4 + 1 + 4 + 1;
        bytes[dtype_at] = 9;
        assert!(matches!(
            VkGraph::from_binary(&bytes),
            Err(Error::Malformed(MalformedGraph::UnsupportedDataType(9)))
        ));

        bytes[dtype_at - 1] = 42;
        assert!(matches!(
            VkGraph::from_binary(&bytes),
            Err(Error::Malformed(MalformedGraph::InvalidIr(_)))
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample().to_binary();
        bytes.push(0);
        assert!(VkGraph::from_binary(&bytes).is_err());
    }
}
