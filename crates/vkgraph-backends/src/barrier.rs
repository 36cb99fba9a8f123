//! Pipeline barriers between dependent dispatches
//!
//! A barrier entry is recorded whenever a buffer's previous access and its
//! next access form a hazard. Read after read needs no synchronization.

use std::fmt;

use crate::backend::{BufferHandle, MemoryAccess};

/// Data hazard between two accesses of the same buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hazard {
    ReadAfterWrite,
    WriteAfterRead,
    WriteAfterWrite,
}

impl Hazard {
    /// Classify `next` following `prev`; `None` when both only read
    pub fn between(prev: MemoryAccess, next: MemoryAccess) -> Option<Self> {
        match (prev.writes(), next.writes()) {
            (false, false) => None,
            (true, false) => Some(Hazard::ReadAfterWrite),
            (false, true) => Some(Hazard::WriteAfterRead),
            (true, true) => Some(Hazard::WriteAfterWrite),
        }
    }
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Hazard::ReadAfterWrite => "RAW",
            Hazard::WriteAfterRead => "WAR",
            Hazard::WriteAfterWrite => "WAW",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub src_access: MemoryAccess,
    pub dst_access: MemoryAccess,
    pub hazard: Hazard,
}

/// Synchronization required before a dispatch may start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineBarrier {
    buffers: Vec<BufferBarrier>,
}

impl PipelineBarrier {
    /// Record `next` on `buffer`, adding an entry if it conflicts with `prev`.
    ///
    /// Returns the hazard that was recorded, if any.
    pub fn record(&mut self, buffer: BufferHandle, prev: Option<MemoryAccess>, next: MemoryAccess) -> Option<Hazard> {
        let prev = prev?;
        let hazard = Hazard::between(prev, next)?;
        self.buffers.push(BufferBarrier {
            buffer,
            src_access: prev,
            dst_access: next,
            hazard,
        });
        Some(hazard)
    }

    pub fn buffers(&self) -> &[BufferBarrier] {
        &self.buffers
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hazard_classification() {
        use MemoryAccess::*;
        assert_eq!(Hazard::between(Read, Read), None);
        assert_eq!(Hazard::between(Write, Read), Some(Hazard::ReadAfterWrite));
        assert_eq!(Hazard::between(Read, Write), Some(Hazard::WriteAfterRead));
        assert_eq!(Hazard::between(Write, Write), Some(Hazard::WriteAfterWrite));
        assert_eq!(Hazard::between(ReadWrite, Read), Some(Hazard::ReadAfterWrite));
    }

    #[test]
    fn test_first_access_needs_no_barrier() {
        let mut barrier = PipelineBarrier::default();
        assert_eq!(barrier.record(BufferHandle(1), None, MemoryAccess::Write), None);
        assert!(barrier.is_empty());
    }

    #[test]
    fn test_records_conflicting_access() {
        let mut barrier = PipelineBarrier::default();
        barrier.record(BufferHandle(1), Some(MemoryAccess::Read), MemoryAccess::Read);
        barrier.record(BufferHandle(2), Some(MemoryAccess::Write), MemoryAccess::Read);
        assert_eq!(barrier.len(), 1);
        assert_eq!(barrier.buffers()[0].buffer, BufferHandle(2));
        assert_eq!(barrier.buffers()[0].hazard.to_string(), "RAW");
    }
}
