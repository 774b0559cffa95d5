use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CorrError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("{benchmark} cannot be downloaded automatically; place it manually at {path}")]
    #[diagnostic(help("obtain the archive out-of-band and unpack it into the path above"))]
    ManualAcquisitionRequired { benchmark: String, path: PathBuf },

    #[error("download request failed: {0}")]
    Network(String),

    #[error("download endpoint returned status {status}: {message}")]
    NetworkStatus { status: u16, message: String },

    #[error("corrupt archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("dataset not found locally: {0}")]
    DatasetNotFound(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

/// Coarse classification used for exit codes and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    ManualAcquisition,
    Network,
    CorruptArchive,
    Other,
}

impl CorrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CorrError::Configuration(_)
            | CorrError::ConfigRead(_)
            | CorrError::ConfigParse(_) => ErrorKind::Configuration,
            CorrError::ManualAcquisitionRequired { .. } => ErrorKind::ManualAcquisition,
            CorrError::Network(_) | CorrError::NetworkStatus { .. } => ErrorKind::Network,
            CorrError::CorruptArchive { .. } => ErrorKind::CorruptArchive,
            CorrError::DatasetNotFound(_)
            | CorrError::Dataset(_)
            | CorrError::Filesystem(_) => ErrorKind::Other,
        }
    }
}
