//! Graphics error types.

use std::fmt;

use crate::backend::BackendError;

/// Errors that can occur in the frame orchestration core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    FeatureNotSupported(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
    /// A pass needed more barriers than its fixed batch holds.
    BarrierCapacityExceeded {
        /// Barriers the pass would have emitted.
        required: usize,
        /// Size of the barrier batch.
        capacity: usize,
    },
    /// More instances than the TLAS or the packed instance id can address.
    InstanceCapacityExceeded {
        /// Number of instances requested.
        requested: usize,
        /// Largest supported instance count.
        capacity: usize,
    },
    /// A resource id did not refer to a live resource.
    InvalidHandle(String),
    /// Reading or writing a file failed.
    Io(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::BarrierCapacityExceeded { required, capacity } => write!(
                f,
                "barrier capacity exceeded: {required} barriers required, batch holds {capacity}"
            ),
            Self::InstanceCapacityExceeded {
                requested,
                capacity,
            } => write!(
                f,
                "instance capacity exceeded: {requested} instances requested, limit is {capacity}"
            ),
            Self::InvalidHandle(msg) => write!(f, "invalid handle: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}

impl From<BackendError> for GraphicsError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InitializationFailed(msg) => Self::InitializationFailed(msg),
            BackendError::ResourceCreationFailed(msg) => Self::ResourceCreationFailed(msg),
            BackendError::FeatureNotSupported(msg) => Self::FeatureNotSupported(msg),
            BackendError::OutOfMemory => Self::OutOfMemory,
            BackendError::DeviceLost => Self::DeviceLost,
            BackendError::InvalidParameter(msg) => Self::InvalidParameter(msg),
            BackendError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<std::io::Error> for GraphicsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type GraphicsResult<T> = Result<T, GraphicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::BarrierCapacityExceeded {
            required: 33,
            capacity: 32,
        };
        assert_eq!(
            err.to_string(),
            "barrier capacity exceeded: 33 barriers required, batch holds 32"
        );
    }

    #[test]
    fn test_backend_error_conversion() {
        let err: GraphicsError = BackendError::DeviceLost.into();
        assert_eq!(err, GraphicsError::DeviceLost);

        let err: GraphicsError = BackendError::Internal("queue".into()).into();
        assert_eq!(err, GraphicsError::Internal("queue".into()));
    }
}
