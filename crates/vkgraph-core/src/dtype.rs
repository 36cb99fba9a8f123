//! Tensor element types

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MalformedGraph, Result};

/// Element type of a tensor
///
/// Only `Float32` is emitted by the exporter today. Decoding any other tag
/// fails with [`MalformedGraph::UnsupportedDataType`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Float32,
}

impl DataType {
    pub const fn element_size(self) -> usize {
        match self {
            DataType::Float32 => 4,
        }
    }

    /// Wire tag used by the binary IR codec
    pub const fn tag(self) -> u8 {
        match self {
            DataType::Float32 => 0,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(DataType::Float32),
            other => Err(MalformedGraph::UnsupportedDataType(other).into()),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DataType::Float32 => "float32",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
