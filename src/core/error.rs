/// Error taxonomy for backup and restore operations
///
/// Every variant maps to a stable code string that callers (CLI, HTTP API)
/// surface verbatim.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::native::ToolError;
use crate::core::store::StoreError;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("configuration missing: {0}")]
    ConfigMissing(&'static str),

    #[error("backup artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("invalid backup format: {0}")]
    InvalidFormat(String),

    #[error("invalid backup filename: {0}")]
    InvalidFilename(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("backup dump failed [{}]: {0}", .0.code())]
    DumpFailed(#[source] ToolError),

    #[error("dump tool produced no output file at {}", .0.display())]
    DumpOutputMissing(PathBuf),

    #[error("native dump restore is not available in a restricted environment; supply a JSON backup instead")]
    RestoreUnsupportedInRestrictedEnv,

    #[error("restore failed and was rolled back: {0}")]
    RestoreFailed(#[source] StoreError),

    #[error("another backup or restore operation is already in progress")]
    OperationInProgress,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data store error: {0}")]
    Store(#[from] StoreError),
}

impl BackupError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            BackupError::ConfigMissing(_) => "CONFIG_MISSING",
            BackupError::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            BackupError::InvalidFormat(_) => "INVALID_FORMAT",
            BackupError::InvalidFilename(_) => "INVALID_FILENAME",
            BackupError::Tool(e) => e.code(),
            BackupError::DumpFailed(_) | BackupError::DumpOutputMissing(_) => "DUMP_TOOL_ERROR",
            BackupError::RestoreUnsupportedInRestrictedEnv => "RESTORE_UNSUPPORTED_IN_RESTRICTED_ENV",
            BackupError::RestoreFailed(_) => "RESTORE_FAILED",
            BackupError::OperationInProgress => "OPERATION_IN_PROGRESS",
            BackupError::Io(_) => "IO_ERROR",
            BackupError::Store(_) => "STORE_ERROR",
        }
    }

    /// True when the error was raised before anything destructive happened.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BackupError::ConfigMissing(_)
                | BackupError::ArtifactNotFound(_)
                | BackupError::InvalidFormat(_)
                | BackupError::InvalidFilename(_)
                | BackupError::RestoreUnsupportedInRestrictedEnv
                | BackupError::OperationInProgress
        )
    }
}

pub type BackupResult<T> = std::result::Result<T, BackupError>;
