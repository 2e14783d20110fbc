use thiserror::Error;

pub type FvaultResult<T> = Result<T, FvaultError>;

#[derive(Debug, Error)]
pub enum FvaultError {
    #[error("invalid key: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("truncated stream: expected {expected} bytes, got {actual}")]
    TruncatedStream { expected: usize, actual: usize },

    #[error("corrupt chunk {index}: {reason}")]
    CorruptChunk { index: u64, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FvaultError {
    pub fn corrupt(index: u64, reason: impl Into<String>) -> Self {
        Self::CorruptChunk {
            index,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_invalid_key() {
        let err = FvaultError::InvalidKey {
            expected: 32,
            actual: 16,
        };
        let msg = err.to_string();
        assert!(msg.contains("32"));
        assert!(msg.contains("16"));
    }

    #[test]
    fn test_display_corrupt_chunk() {
        let err = FvaultError::corrupt(7, "bad padding");
        assert_eq!(err.to_string(), "corrupt chunk 7: bad padding");
    }

    #[test]
    fn test_io_from() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: FvaultError = io.into();
        assert!(matches!(err, FvaultError::Io(_)));
        assert!(err.to_string().contains("nope"));
    }
}
