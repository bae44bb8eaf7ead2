//! Error taxonomy of the binding.

use crate::DType;

/// Errors surfaced by the binding and the native layer beneath it.
///
/// None of these are retried: native operations are too expensive to repeat
/// blindly and resource release must not run twice.
#[derive(Debug, thiserror::Error)]
pub enum NdError {
    /// No native entry point is registered under this operator name.
    #[error("unsupported operation: {op}")]
    UnsupportedOperation { op: String },

    /// Shape, type or size mismatch detected before any native call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Raw buffer extraction requested with the wrong element type.
    #[error("data type mismatch: required {expected}, actual {actual}")]
    TypeMismatch { expected: DType, actual: DType },

    /// The native layer reported a failure.
    #[error("native call {call} failed: {message}")]
    NativeExecution { call: String, message: String },

    /// The native library could not be discovered or loaded.
    #[error("failed to load native library '{path}': {message}")]
    LibraryLoad { path: String, message: String },

    /// Engine configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl NdError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        NdError::InvalidArgument(msg.into())
    }

    pub fn unsupported(op: impl Into<String>) -> Self {
        NdError::UnsupportedOperation { op: op.into() }
    }

    pub fn native(call: impl Into<String>, message: impl Into<String>) -> Self {
        NdError::NativeExecution {
            call: call.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let e = NdError::unsupported("fft");
        assert_eq!(e.to_string(), "unsupported operation: fft");

        let e = NdError::TypeMismatch {
            expected: DType::F32,
            actual: DType::I32,
        };
        assert_eq!(e.to_string(), "data type mismatch: required float32, actual int32");

        let e = NdError::native("MXNDArrayFree", "invalid handle");
        assert!(e.to_string().contains("MXNDArrayFree"));
    }
}
