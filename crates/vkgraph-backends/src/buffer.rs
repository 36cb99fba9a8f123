//! Owned device buffers

use std::fmt;
use std::sync::Arc;

use crate::backend::{Backend, BufferHandle};
use crate::error::Result;

/// A device allocation that is freed when dropped
pub struct DeviceBuffer {
    backend: Arc<dyn Backend>,
    handle: BufferHandle,
    size: usize,
}

impl DeviceBuffer {
    pub fn allocate(backend: &Arc<dyn Backend>, size: usize) -> Result<Self> {
        let handle = backend.allocate_buffer(size)?;
        Ok(Self {
            backend: Arc::clone(backend),
            handle,
            size,
        })
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.backend.copy_to_buffer(self.handle, offset, data)
    }

    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        self.backend.copy_from_buffer(self.handle, offset, out)
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("backend", &self.backend.name())
            .field("handle", &self.handle)
            .field("size", &self.size)
            .finish()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Err(err) = self.backend.free_buffer(self.handle) {
            tracing::warn!(handle = %self.handle, error = %err, "failed to free device buffer");
        }
    }
}
