use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for one processing run.
///
/// Everything except `Setup` is caught at its loop level (per file or per
/// platform/package/month triple), reported, and skipped; only `Setup`
/// reaches the process exit code.
#[derive(Debug, Error)]
pub enum ProcError {
    #[error("no configuration revision for platform `{platform}` overlaps {month}")]
    ConfigNotFound { platform: String, month: String },

    #[error("package `{package}` is not configured on `{platform}` under revision {revision}")]
    PackageNotConfigured {
        platform: String,
        package: String,
        revision: String,
    },

    #[error("raw file is empty: {0}")]
    RawFileEmpty(PathBuf),

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("archive i/o failure at {path}: {reason}")]
    ArchiveIo { path: PathBuf, reason: String },

    #[error("setup failure: {0}")]
    Setup(String),
}

impl ProcError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigNotFound { .. } => "CONFIG_NOT_FOUND",
            Self::PackageNotConfigured { .. } => "PACKAGE_NOT_CONFIGURED",
            Self::RawFileEmpty(_) => "RAW_FILE_EMPTY",
            Self::Parse { .. } => "PARSE_FAILED",
            Self::ArchiveIo { .. } => "ARCHIVE_IO",
            Self::Setup(_) => "SETUP",
        }
    }
}
