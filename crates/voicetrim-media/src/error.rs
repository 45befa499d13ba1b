//! Error types for voicetrim-media.

use thiserror::Error;

/// Result type for voicetrim-media operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Failures raised by the container reader and writer.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The input could not be opened or is not a parseable container.
    #[error("unreadable container: {0}")]
    Unreadable(String),

    /// No track in the container carries an audio codec.
    #[error("container has no audio track")]
    NoAudioTrack,

    /// The caller-supplied buffer cannot hold the next sample.
    #[error("sample buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    /// The output container cannot host the given track format.
    #[error("unsupported track format: {0}")]
    UnsupportedFormat(String),

    /// An I/O error occurred while writing or finalizing the output.
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),
}

impl ContainerError {
    /// Create an unreadable-container error.
    pub fn unreadable(msg: impl Into<String>) -> Self {
        Self::Unreadable(msg.into())
    }

    /// Create an unsupported-format error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Map a read-side I/O error.
    pub(crate) fn read_io(err: std::io::Error) -> Self {
        Self::Unreadable(format!("I/O error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ContainerError::unreadable("missing moov");
        assert_eq!(err.to_string(), "unreadable container: missing moov");

        let err = ContainerError::BufferTooSmall { need: 10, have: 4 };
        assert_eq!(err.to_string(), "sample buffer too small: need 10 bytes, have 4");

        let err = ContainerError::NoAudioTrack;
        assert_eq!(err.to_string(), "container has no audio track");
    }

    #[test]
    fn test_read_io_maps_to_unreadable() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(ContainerError::read_io(io), ContainerError::Unreadable(_)));
    }
}
