//! Backend trait and shared handle types

mod traits;
mod types;

pub use traits::Backend;
pub use types::{BufferHandle, DescriptorType, MemoryAccess, WorkgroupSize};
