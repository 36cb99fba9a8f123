//! Delegate blob header
//!
//! ```text
//! offset  size  field
//!  0      4     reserved
//!  4      4     magic "VH00"
//!  8      2     header_size (u16, = 30)
//! 10      4     ir_offset (u32)
//! 14      4     ir_size (u32)
//! 18      4     constants_offset (u32)
//! 22      8     constants_size (u64)
//! ```
//!
//! All fields are little endian. The blob is `[header][IR section][constants]`
//! with both sections aligned to [`SECTION_ALIGNMENT`] by [`serialize_delegate_blob`].

use std::ops::Range;

use crate::error::HeaderError;
use crate::schema::VkGraph;

pub const HEADER_MAGIC: [u8; 4] = *b"VH00";
pub const HEADER_SIZE: usize = 30;
pub const SECTION_ALIGNMENT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegateHeader {
    pub ir_offset: u32,
    pub ir_size: u32,
    pub constants_offset: u32,
    pub constants_size: u64,
}

impl DelegateHeader {
    /// Parse the header at the start of `blob` and bounds-check both sections
    pub fn parse(blob: &[u8]) -> Result<Self, HeaderError> {
        if blob.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated {
                expected: HEADER_SIZE,
                actual: blob.len(),
            });
        }

        let magic = [blob[4], blob[5], blob[6], blob[7]];
        if magic != HEADER_MAGIC {
            return Err(HeaderError::BadMagic {
                found: magic,
                expected: HEADER_MAGIC,
            });
        }

        let header_size = u16::from_le_bytes([blob[8], blob[9]]);
        if header_size as usize != HEADER_SIZE {
            return Err(HeaderError::BadHeaderSize {
                found: header_size,
                expected: HEADER_SIZE as u16,
            });
        }

        let u32_at = |at: usize| u32::from_le_bytes([blob[at], blob[at + 1], blob[at + 2], blob[at + 3]]);
        let mut constants_size = [0u8; 8];
        constants_size.copy_from_slice(&blob[22..30]);

        let header = Self {
            ir_offset: u32_at(10),
            ir_size: u32_at(14),
            constants_offset: u32_at(18),
            constants_size: u64::from_le_bytes(constants_size),
        };
        header.check_section("ir", header.ir_offset as u64, header.ir_size as u64, blob.len())?;
        header.check_section(
            "constants",
            header.constants_offset as u64,
            header.constants_size,
            blob.len(),
        )?;
        Ok(header)
    }

    fn check_section(&self, section: &'static str, offset: u64, size: u64, blob_len: usize) -> Result<(), HeaderError> {
        match offset.checked_add(size) {
            Some(end) if offset >= HEADER_SIZE as u64 && end <= blob_len as u64 => Ok(()),
            _ => Err(HeaderError::SectionOutOfBounds {
                section,
                offset,
                size,
                blob_len,
            }),
        }
    }

    pub fn ir_range(&self) -> Range<usize> {
        let start = self.ir_offset as usize;
        start..start + self.ir_size as usize
    }

    pub fn constants_range(&self) -> Range<usize> {
        let start = self.constants_offset as usize;
        start..start + self.constants_size as usize
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[4..8].copy_from_slice(&HEADER_MAGIC);
        bytes[8..10].copy_from_slice(&(HEADER_SIZE as u16).to_le_bytes());
        bytes[10..14].copy_from_slice(&self.ir_offset.to_le_bytes());
        bytes[14..18].copy_from_slice(&self.ir_size.to_le_bytes());
        bytes[18..22].copy_from_slice(&self.constants_offset.to_le_bytes());
        bytes[22..30].copy_from_slice(&self.constants_size.to_le_bytes());
        bytes
    }
}

fn pad_to_alignment(blob: &mut Vec<u8>) {
    let padded = blob.len().next_multiple_of(SECTION_ALIGNMENT);
    blob.resize(padded, 0);
}

/// Build a complete delegate blob from an IR graph and its constant bytes
pub fn serialize_delegate_blob(graph: &VkGraph, constants: &[u8]) -> Vec<u8> {
    let section = graph.to_ir_section();

    let mut blob = vec![0u8; HEADER_SIZE];
    pad_to_alignment(&mut blob);
    let ir_offset = blob.len();
    blob.extend_from_slice(&section);
    pad_to_alignment(&mut blob);
    let constants_offset = blob.len();
    blob.extend_from_slice(constants);

    let header = DelegateHeader {
        ir_offset: ir_offset as u32,
        ir_size: section.len() as u32,
        constants_offset: constants_offset as u32,
        constants_size: constants.len() as u64,
    };
    blob[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    blob
}
