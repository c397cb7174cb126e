use thiserror::Error;
use flutter_rust_bridge::frb;

/// Structured error type passed to Dart via FFI.
///
/// `Clone` so a single failed model load can be handed to every caller that
/// was waiting on it.
#[frb(dart_metadata=("freezed"))] // Generated as a sealed class in Dart.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RagError {
    /// Caller supplied malformed data (vector length mismatch, bad vocabulary, etc.).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failed to load embedding model. Loading is retried on the next call.
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    /// Inference engine failed or returned no usable output.
    #[error("Inference failed: {0}")]
    InferenceError(String),

    /// Database related error (potential for retry).
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// I/O error (file missing, permission issues, etc.).
    #[error("IO error: {0}")]
    IoError(String),

    /// Internal system error (poisoned lock, serialization, etc.).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<rusqlite::Error> for RagError {
    fn from(e: rusqlite::Error) -> Self {
        RagError::DatabaseError(e.to_string())
    }
}

impl From<r2d2::Error> for RagError {
    fn from(e: r2d2::Error) -> Self {
        RagError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(e: serde_json::Error) -> Self {
        RagError::InternalError(format!("JSON: {}", e))
    }
}

impl From<std::io::Error> for RagError {
    fn from(e: std::io::Error) -> Self {
        RagError::IoError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RagError::ModelLoadError("missing".to_string()).to_string(),
            "Failed to load model: missing"
        );
        assert_eq!(
            RagError::InvalidInput("len".to_string()).to_string(),
            "Invalid input: len"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "model.onnx");
        let err: RagError = io.into();
        assert!(matches!(err, RagError::IoError(_)));
    }
}
