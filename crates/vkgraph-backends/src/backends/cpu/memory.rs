//! Memory manager for the CPU backend
//!
//! Buffers are heap `Vec<u8>`s keyed by handle id. An optional byte limit
//! stands in for a device heap size so that exhaustion paths can be tested.

use std::collections::HashMap;

use crate::backend::BufferHandle;
use crate::error::{BackendError, Result};

#[derive(Debug, Default)]
pub struct MemoryManager {
    buffers: HashMap<u64, Vec<u8>>,
    next_buffer_id: u64,
    allocated_bytes: usize,
    limit: Option<usize>,
}

impl MemoryManager {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            buffers: HashMap::new(),
            next_buffer_id: 1,
            allocated_bytes: 0,
            limit,
        }
    }

    pub fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        if let Some(limit) = self.limit {
            let available = limit.saturating_sub(self.allocated_bytes);
            if size > available {
                return Err(BackendError::OutOfDeviceMemory {
                    requested: size,
                    available,
                });
            }
        }

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, vec![0u8; size]);
        self.allocated_bytes += size;
        Ok(BufferHandle::new(id))
    }

    pub fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        let buffer = self
            .buffers
            .remove(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;
        self.allocated_bytes -= buffer.len();
        Ok(())
    }

    pub fn buffer(&self, handle: BufferHandle) -> Result<&[u8]> {
        self.buffers
            .get(&handle.id())
            .map(Vec::as_slice)
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    pub fn buffer_mut(&mut self, handle: BufferHandle) -> Result<&mut [u8]> {
        self.buffers
            .get_mut(&handle.id())
            .map(Vec::as_mut_slice)
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    pub fn copy_to_buffer(&mut self, handle: BufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        let buffer = self.buffer_mut(handle)?;
        let range = checked_range(offset, data.len(), buffer.len())?;
        buffer[range].copy_from_slice(data);
        Ok(())
    }

    pub fn copy_from_buffer(&self, handle: BufferHandle, offset: usize, data: &mut [u8]) -> Result<()> {
        let buffer = self.buffer(handle)?;
        let range = checked_range(offset, data.len(), buffer.len())?;
        data.copy_from_slice(&buffer[range]);
        Ok(())
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }
}

fn checked_range(offset: usize, size: usize, buffer_size: usize) -> Result<std::ops::Range<usize>> {
    match offset.checked_add(size) {
        Some(end) if end <= buffer_size => Ok(offset..end),
        _ => Err(BackendError::BufferOutOfBounds {
            offset,
            size,
            buffer_size,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let mut memory = MemoryManager::new(None);
        let a = memory.allocate_buffer(8).unwrap();
        let b = memory.allocate_buffer(4).unwrap();
        assert_ne!(a, b);
        assert_eq!(memory.allocated_bytes(), 12);

        memory.free_buffer(a).unwrap();
        assert_eq!(memory.live_buffers(), 1);
        assert_eq!(memory.allocated_bytes(), 4);
        assert!(matches!(memory.free_buffer(a), Err(BackendError::InvalidBufferHandle(_))));
    }

    #[test]
    fn test_limit_enforced() {
        let mut memory = MemoryManager::new(Some(10));
        memory.allocate_buffer(6).unwrap();
        let err = memory.allocate_buffer(6).unwrap_err();
        assert!(matches!(
            err,
            BackendError::OutOfDeviceMemory {
                requested: 6,
                available: 4
            }
        ));
        assert_eq!(memory.live_buffers(), 1);
    }

    #[test]
    fn test_out_of_bounds_copy() {
        let mut memory = MemoryManager::new(None);
        let handle = memory.allocate_buffer(4).unwrap();
        assert!(memory.copy_to_buffer(handle, 2, &[0; 3]).is_err());
        assert!(memory.copy_to_buffer(handle, usize::MAX, &[0; 1]).is_err());
        let mut out = [0u8; 5];
        assert!(memory.copy_from_buffer(handle, 0, &mut out).is_err());
    }
}
