use std::sync::Arc;

use vkgraph_backends::{Context, DeviceBuffer};

use crate::error::Result;
use crate::value::ValueRef;

/// One device allocation reused by every tensor declaring the same memory object id.
///
/// Sized to the largest user; allocated once in `prepare()`.
#[derive(Debug, Default)]
pub struct SharedObject {
    nbytes: usize,
    users: Vec<ValueRef>,
    allocation: Option<Arc<DeviceBuffer>>,
}

impl SharedObject {
    pub(crate) fn add_user(&mut self, tensor: ValueRef, nbytes: usize) {
        self.nbytes = self.nbytes.max(nbytes);
        self.users.push(tensor);
    }

    pub fn nbytes(&self) -> usize {
        self.nbytes
    }

    pub fn users(&self) -> &[ValueRef] {
        &self.users
    }

    pub fn allocation(&self) -> Option<&Arc<DeviceBuffer>> {
        self.allocation.as_ref()
    }

    pub(crate) fn allocate(&mut self, context: &Context) -> Result<Arc<DeviceBuffer>> {
        if let Some(allocation) = &self.allocation {
            return Ok(Arc::clone(allocation));
        }
        let allocation = Arc::new(context.allocate_buffer(self.nbytes)?);
        self.allocation = Some(Arc::clone(&allocation));
        Ok(allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkgraph_backends::ContextConfig;

    #[test]
    fn test_sized_to_largest_user() {
        let context = Context::with_cpu_backend(ContextConfig::default());
        let mut object = SharedObject::default();
        object.add_user(ValueRef::new(0), 16);
        object.add_user(ValueRef::new(3), 64);
        object.add_user(ValueRef::new(5), 8);
        assert_eq!(object.nbytes(), 64);
        assert_eq!(object.users().len(), 3);

        let first = object.allocate(&context).unwrap();
        let second = object.allocate(&context).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.size(), 64);
        assert_eq!(context.backend().live_buffer_count(), 1);
    }
}
