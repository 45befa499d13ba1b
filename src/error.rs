//! Error types for voicetrim.

use std::path::PathBuf;
use voicetrim_media::ContainerError;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Step of a trim at which work is happening or a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimStage {
    Idle,
    /// Opening the input, selecting the track, seeking.
    Reading,
    /// Streaming samples into the staging file.
    Writing,
    /// Replacing the input with the staging file.
    Swapping,
    Done,
    Failed,
}

impl std::fmt::Display for TrimStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Reading => "reading",
            Self::Writing => "writing",
            Self::Swapping => "swapping",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by trim, plan and probe operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested time range is empty or inverted.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// The container layer failed; the error is passed through unchanged.
    #[error("{stage} failed: {source}")]
    Container {
        stage: TrimStage,
        #[source]
        source: ContainerError,
    },

    /// The staging file could not replace the original.
    #[error("could not replace {}: {source}", path.display())]
    SwapFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The caller abandoned the trim.
    #[error("trim cancelled")]
    Cancelled,

    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(String),
}

/// Flat classification of [`Error`] for callers that only report outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unreadable,
    NoAudioTrack,
    BufferTooSmall,
    UnsupportedFormat,
    WriteFailed,
    SwapFailed,
    InvalidRange,
    Cancelled,
    Config,
}

impl Error {
    /// Create an invalid-range error.
    pub fn invalid_range(msg: impl Into<String>) -> Self {
        Self::InvalidRange(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attach `stage` to a container error.
    pub fn at(stage: TrimStage) -> impl FnOnce(ContainerError) -> Self {
        move |source| Self::Container { stage, source }
    }

    /// The stage a container error occurred at, if any.
    pub fn stage(&self) -> Option<TrimStage> {
        match self {
            Self::Container { stage, .. } => Some(*stage),
            Self::SwapFailed { .. } => Some(TrimStage::Swapping),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRange(_) => ErrorKind::InvalidRange,
            Self::Container { source, .. } => match source {
                ContainerError::Unreadable(_) => ErrorKind::Unreadable,
                ContainerError::NoAudioTrack => ErrorKind::NoAudioTrack,
                ContainerError::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
                ContainerError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
                ContainerError::WriteFailed(_) => ErrorKind::WriteFailed,
            },
            Self::SwapFailed { .. } => ErrorKind::SwapFailed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_error_keeps_kind_and_stage() {
        let err = Error::at(TrimStage::Reading)(ContainerError::NoAudioTrack);
        assert_eq!(err.kind(), ErrorKind::NoAudioTrack);
        assert_eq!(err.stage(), Some(TrimStage::Reading));
        assert_eq!(err.to_string(), "reading failed: container has no audio track");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = Error::at(TrimStage::Writing)(ContainerError::WriteFailed(io));
        assert_eq!(err.kind(), ErrorKind::WriteFailed);
    }

    #[test]
    fn test_swap_failed_display() {
        let err = Error::SwapFailed {
            path: PathBuf::from("/tmp/memo.m4a"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.kind(), ErrorKind::SwapFailed);
        assert_eq!(err.stage(), Some(TrimStage::Swapping));
        assert_eq!(err.to_string(), "could not replace /tmp/memo.m4a: denied");
    }

    #[test]
    fn test_plain_kinds() {
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(Error::config("bad").kind(), ErrorKind::Config);
        assert_eq!(Error::invalid_range("empty").kind(), ErrorKind::InvalidRange);
        assert_eq!(Error::Cancelled.stage(), None);
    }
}
