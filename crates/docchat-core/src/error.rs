//! Error types for the docchat application.

use thiserror::Error;

/// A shared error type for the entire docchat application.
///
/// Provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait.
#[derive(Error, Debug, Clone)]
pub enum DocchatError {
    /// A remote assistant-store call failed (upload, create, delete, completion).
    #[error("Remote API error during {operation}: {message}")]
    RemoteApi { operation: String, message: String },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A human-input request was issued while another is still outstanding.
    #[error("An input request is already pending")]
    InputAlreadyPending,

    /// The remote store never listed an uploaded file within the poll budget.
    #[error("Uploaded file '{file_id}' not visible after {waited_secs}s")]
    UploadTimeout { file_id: String, waited_secs: u64 },

    /// A conversation session failed and was terminated.
    #[error("Session failed: {0}")]
    SessionFailed(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocchatError {
    /// Creates a RemoteApi error
    pub fn remote_api(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteApi {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Creates a SessionFailed error
    pub fn session_failed(message: impl Into<String>) -> Self {
        Self::SessionFailed(message.into())
    }

    /// Check if this is a RemoteApi error
    pub fn is_remote_api(&self) -> bool {
        matches!(self, Self::RemoteApi { .. })
    }

    /// Check if this is an UploadTimeout error
    pub fn is_upload_timeout(&self) -> bool {
        matches!(self, Self::UploadTimeout { .. })
    }

    /// Check if this is an InputAlreadyPending error
    pub fn is_input_already_pending(&self) -> bool {
        matches!(self, Self::InputAlreadyPending)
    }
}

impl From<std::io::Error> for DocchatError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for DocchatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for DocchatError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from anyhow::Error (transitional, for binary top levels)
impl From<anyhow::Error> for DocchatError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A type alias for `Result<T, DocchatError>`.
pub type Result<T> = std::result::Result<T, DocchatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_api_display() {
        let err = DocchatError::remote_api("upload_file", "503 service unavailable");
        assert_eq!(
            err.to_string(),
            "Remote API error during upload_file: 503 service unavailable"
        );
        assert!(err.is_remote_api());
    }

    #[test]
    fn test_upload_timeout_display() {
        let err = DocchatError::UploadTimeout {
            file_id: "file-abc".to_string(),
            waited_secs: 60,
        };
        assert_eq!(
            err.to_string(),
            "Uploaded file 'file-abc' not visible after 60s"
        );
        assert!(err.is_upload_timeout());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DocchatError = io_err.into();
        assert!(matches!(err, DocchatError::Io { .. }));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let err: DocchatError = json_err.into();
        match err {
            DocchatError::Serialization { format, .. } => assert_eq!(format, "JSON"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_input_already_pending_predicate() {
        assert!(DocchatError::InputAlreadyPending.is_input_already_pending());
        assert!(!DocchatError::internal("x").is_input_already_pending());
    }
}
