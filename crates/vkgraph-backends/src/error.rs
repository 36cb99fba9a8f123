//! Error types for backend operations

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while allocating, recording or submitting device work
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Invalid buffer handle
    #[error("invalid buffer handle: {0}")]
    InvalidBufferHandle(u64),

    /// Buffer access out of bounds
    #[error("buffer access out of bounds: offset {offset} + size {size} > buffer size {buffer_size}")]
    BufferOutOfBounds {
        offset: usize,
        size: usize,
        buffer_size: usize,
    },

    /// Device memory limit reached
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfDeviceMemory { requested: usize, available: usize },

    /// Descriptor pool has no room for another set or descriptor
    #[error("descriptor pool exhausted: {descriptor} needs {requested}, capacity {capacity}")]
    DescriptorPoolExhausted {
        descriptor: &'static str,
        requested: u32,
        capacity: u32,
    },

    /// A descriptor set was requested before any pool was initialized
    #[error("descriptor pool has not been initialized")]
    DescriptorPoolUninitialized,

    /// A binding index outside the shader's kernel layout
    #[error("binding {index} out of range for shader {shader} with {layout_len} bindings")]
    BindingOutOfRange {
        shader: &'static str,
        index: u32,
        layout_len: usize,
    },

    /// A dispatch was registered with unbound layout slots
    #[error("shader {shader} dispatched with binding {index} unbound")]
    UnboundBinding { shader: &'static str, index: u32 },

    /// The descriptor set was allocated for a different shader
    #[error("descriptor set for {set_shader} used to dispatch {shader}")]
    DescriptorSetMismatch {
        shader: &'static str,
        set_shader: &'static str,
    },

    /// No kernel is registered for the shader name
    #[error("shader not found: {0}")]
    ShaderNotFound(String),

    /// Kernel rejected its bindings or parameters
    #[error("kernel {shader} failed: {reason}")]
    KernelFailed { shader: &'static str, reason: String },

    /// Type mismatch
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Generic backend error
    #[error("backend error: {0}")]
    Other(String),
}

impl BackendError {
    /// Whether the error reports exhaustion of device memory or descriptors.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            BackendError::OutOfDeviceMemory { .. } | BackendError::DescriptorPoolExhausted { .. }
        )
    }

    pub(crate) fn kernel(shader: &'static str, reason: impl Into<String>) -> Self {
        BackendError::KernelFailed {
            shader,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackendError::InvalidBufferHandle(42);
        assert_eq!(err.to_string(), "invalid buffer handle: 42");

        let err = BackendError::DescriptorPoolExhausted {
            descriptor: "storage_buffer",
            requested: 9,
            capacity: 8,
        };
        assert_eq!(
            err.to_string(),
            "descriptor pool exhausted: storage_buffer needs 9, capacity 8"
        );
    }

    #[test]
    fn test_resource_exhaustion_classification() {
        assert!(BackendError::OutOfDeviceMemory {
            requested: 10,
            available: 0
        }
        .is_resource_exhaustion());
        assert!(!BackendError::ShaderNotFound("x".into()).is_resource_exhaustion());
    }
}
