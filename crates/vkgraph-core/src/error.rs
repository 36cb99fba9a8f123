//! Error types for vkgraph-core operations

use vkgraph_backends::BackendError;

use crate::graph::GraphState;
use crate::value::ValueRef;

/// Result type for vkgraph-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Problems with the delegate container around the IR
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("blob is {actual} bytes, header needs {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("header magic {found:?} does not match {expected:?}")]
    BadMagic { found: [u8; 4], expected: [u8; 4] },

    #[error("header size {found} does not match {expected}")]
    BadHeaderSize { found: u16, expected: u16 },

    #[error("{section} section at offset {offset} with size {size} exceeds blob of {blob_len} bytes")]
    SectionOutOfBounds {
        section: &'static str,
        offset: u64,
        size: u64,
        blob_len: usize,
    },
}

/// Structural problems in a decoded graph
#[derive(Debug, thiserror::Error)]
pub enum MalformedGraph {
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("argument {index} of {operator} refers to a value that has not been added ({available} available)")]
    UnresolvedReference {
        operator: String,
        index: i64,
        available: usize,
    },

    #[error("value {0} added twice")]
    DuplicateValue(usize),

    #[error("value {0} listed twice as graph input")]
    DuplicateInput(ValueRef),

    #[error("value {0} listed twice as graph output")]
    DuplicateOutput(ValueRef),

    #[error("value {value} is a {actual}, expected {expected}")]
    UnexpectedValueKind {
        value: ValueRef,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{operator} takes {expected} arguments, got {actual}")]
    ArgumentCount {
        operator: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("constant {constant_id} at offset {offset} with length {length} exceeds constant section of {section_len} bytes")]
    ConstantOutOfBounds {
        constant_id: i64,
        offset: u64,
        length: u64,
        section_len: usize,
    },

    #[error("invalid IR: {0}")]
    InvalidIr(String),

    #[error("unsupported data type tag {0}")]
    UnsupportedDataType(u8),

    #[error("incompatible shapes: {0}")]
    IncompatibleShapes(String),
}

/// Errors that can occur while loading, preparing or running a graph
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Container header is malformed
    #[error("invalid header: {0}")]
    InvalidHeader(#[from] HeaderError),

    /// IR section identifier does not match the supported format version
    #[error("incompatible format version: found {found:?}, expected {expected:?}")]
    IncompatibleFormatVersion { found: [u8; 4], expected: [u8; 4] },

    /// Graph is structurally invalid
    #[error("malformed graph: {0}")]
    Malformed(#[from] MalformedGraph),

    /// Device memory or descriptors ran out
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(#[source] BackendError),

    /// Staging copy larger than the declared tensor
    #[error("staging copy of {requested} elements into {value} exceeds capacity {capacity}")]
    StagingBounds {
        value: ValueRef,
        requested: usize,
        capacity: usize,
    },

    /// Lifecycle operation called in the wrong state
    #[error("{operation} requires graph state {expected:?}, graph is {actual:?}")]
    InvalidState {
        operation: &'static str,
        expected: GraphState,
        actual: GraphState,
    },

    #[error("value {0} is not a graph input")]
    NotAnInput(ValueRef),

    #[error("value {0} is not a graph output")]
    NotAnOutput(ValueRef),

    /// Handle outside the value store
    #[error("no value at {0}")]
    UnknownValue(ValueRef),

    /// Wrong number of host buffers passed to execute
    #[error("expected {expected} {role} buffers, got {actual}")]
    BufferCount {
        role: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Host buffer length does not match the staging buffer
    #[error("{role} buffer {index} is {actual} bytes, expected {expected}")]
    BufferSizeMismatch {
        role: &'static str,
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// Other device failure
    #[error("backend error: {0}")]
    Backend(#[source] BackendError),
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        if err.is_resource_exhaustion() {
            Error::ResourceExhaustion(err)
        } else {
            Error::Backend(err)
        }
    }
}

/// Coarse classification of [`Error`] for callers of `init`/`execute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The container around the IR is malformed or the wrong version
    BadContainer,
    /// The IR decodes but describes an invalid graph
    BadGraph,
    /// The IR uses an operator this build does not provide
    UnsupportedOperator,
    /// Device memory or descriptors ran out, or the device failed
    Resource,
    /// A staging copy was rejected
    Staging,
    /// The API was used out of order or with wrong arguments
    Usage,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidHeader(_) | Error::IncompatibleFormatVersion { .. } => ErrorKind::BadContainer,
            Error::Malformed(MalformedGraph::UnknownOperator(_)) => ErrorKind::UnsupportedOperator,
            Error::Malformed(_) => ErrorKind::BadGraph,
            Error::ResourceExhaustion(_) | Error::Backend(_) => ErrorKind::Resource,
            Error::StagingBounds { .. } => ErrorKind::Staging,
            Error::InvalidState { .. }
            | Error::NotAnInput(_)
            | Error::NotAnOutput(_)
            | Error::UnknownValue(_)
            | Error::BufferCount { .. }
            | Error::BufferSizeMismatch { .. } => ErrorKind::Usage,
        }
    }

    pub(crate) fn unexpected_kind(value: ValueRef, expected: &'static str, actual: &'static str) -> Self {
        MalformedGraph::UnexpectedValueKind {
            value,
            expected,
            actual,
        }
        .into()
    }

    pub(crate) fn shapes(message: impl Into<String>) -> Self {
        MalformedGraph::IncompatibleShapes(message.into()).into()
    }

    pub(crate) fn invalid_ir(message: impl Into<String>) -> Self {
        MalformedGraph::InvalidIr(message.into()).into()
    }
}
