//! Handles and small value types shared by every backend

use std::fmt;

/// Handle to an allocated device buffer
///
/// Buffers are opaque handles managed by the backend. Most callers hold a
/// [`crate::DeviceBuffer`], which frees the handle on drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    pub const fn new(id: u64) -> Self {
        BufferHandle(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

/// 3D workgroup extent, used for both global and local dispatch sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkgroupSize {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// 1D extent along `x`
    pub const fn linear(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    pub const fn total(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Clamp each axis of `self` to at most `global`, keeping every axis >= 1
    pub fn clamp_to(&self, global: WorkgroupSize) -> Self {
        Self {
            x: self.x.min(global.x).max(1),
            y: self.y.min(global.y).max(1),
            z: self.z.min(global.z).max(1),
        }
    }

    /// Number of local workgroups needed to cover `global`
    pub fn groups_for(&self, global: WorkgroupSize) -> WorkgroupSize {
        WorkgroupSize {
            x: global.x.div_ceil(self.x.max(1)),
            y: global.y.div_ceil(self.y.max(1)),
            z: global.z.div_ceil(self.z.max(1)),
        }
    }
}

impl Default for WorkgroupSize {
    fn default() -> Self {
        Self::linear(64)
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Kind of resource a kernel layout slot expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
    StorageImage,
}

impl DescriptorType {
    pub const fn name(self) -> &'static str {
        match self {
            DescriptorType::UniformBuffer => "uniform_buffer",
            DescriptorType::StorageBuffer => "storage_buffer",
            DescriptorType::CombinedImageSampler => "combined_image_sampler",
            DescriptorType::StorageImage => "storage_image",
        }
    }
}

/// How a dispatch touches a bound resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryAccess {
    Read,
    Write,
    ReadWrite,
}

impl MemoryAccess {
    pub const fn reads(self) -> bool {
        matches!(self, MemoryAccess::Read | MemoryAccess::ReadWrite)
    }

    pub const fn writes(self) -> bool {
        matches!(self, MemoryAccess::Write | MemoryAccess::ReadWrite)
    }
}

impl fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryAccess::Read => "read",
            MemoryAccess::Write => "write",
            MemoryAccess::ReadWrite => "read_write",
        };
        f.write_str(name)
    }
}
