use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum IngestError {
    #[error("Export is missing mandatory files: {}", missing.join(", "))]
    StructuralValidation { missing: Vec<String> },

    #[error("No recognized export data under {}", root.display())]
    EmptyExport { root: PathBuf },

    #[error("Malformed payload{}: {reason}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    MalformedPayload {
        path: Option<PathBuf>,
        reason: String,
    },

    #[error("IO error on {}: {message}", path.display())]
    TransientIo {
        path: PathBuf,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    ExhaustedRetry {
        attempts: u32,
        last: Box<IngestError>,
    },

    #[error("Job panicked: {0}")]
    JobPanicked(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification reported in the run manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    StructuralValidation,
    MalformedPayload,
    TransientIo,
    CacheBackend,
    ExhaustedRetry,
    Internal,
}

/// Whether repeating the failed operation can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retryable,
    Terminal,
}

impl IngestError {
    pub fn io(path: &Path, err: &io::Error) -> Self {
        IngestError::TransientIo {
            path: path.to_path_buf(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        IngestError::MalformedPayload {
            path: None,
            reason: reason.into(),
        }
    }

    /// Attach the source path to a payload error raised by a path-agnostic parser.
    pub fn with_path(self, at: &Path) -> Self {
        match self {
            IngestError::MalformedPayload { path: None, reason } => IngestError::MalformedPayload {
                path: Some(at.to_path_buf()),
                reason,
            },
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::StructuralValidation { .. } | IngestError::EmptyExport { .. } => {
                ErrorKind::StructuralValidation
            }
            IngestError::MalformedPayload { .. } => ErrorKind::MalformedPayload,
            IngestError::TransientIo { .. } => ErrorKind::TransientIo,
            IngestError::CacheBackend(_) => ErrorKind::CacheBackend,
            IngestError::ExhaustedRetry { .. } => ErrorKind::ExhaustedRetry,
            IngestError::JobPanicked(_)
            | IngestError::Serialization(_)
            | IngestError::Config(_) => ErrorKind::Internal,
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            IngestError::TransientIo { .. } | IngestError::CacheBackend(_) => {
                Disposition::Retryable
            }
            _ => Disposition::Terminal,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, IngestError::ExhaustedRetry { .. })
    }

    /// Tries spent before this error surfaced. Terminal errors stop the
    /// retry loop, so anything but an exhausted retry counts as one.
    pub fn attempts(&self) -> u32 {
        match self {
            IngestError::ExhaustedRetry { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

impl From<rocksdb::Error> for IngestError {
    fn from(err: rocksdb::Error) -> Self {
        IngestError::CacheBackend(err.to_string())
    }
}

impl From<bincode::Error> for IngestError {
    fn from(err: bincode::Error) -> Self {
        IngestError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for IngestError {
    fn from(err: config::ConfigError) -> Self {
        IngestError::Config(err.to_string())
    }
}
