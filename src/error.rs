//! Error types shared by the archive pipeline.
//!
//! Per-entry failures (`Collection`, `UnsafePath`) are logged and counted by
//! the loops that produce them; everything else aborts the operation and is
//! reported through [`crate::metadata::BackupResult`] or
//! [`crate::metadata::RestoreResult`].

use std::io;
use std::path::PathBuf;

use crate::metadata::format_size;

/// Unified result type for the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configured item or walked entry could not be read.
    #[error("cannot access {}: {source}", path.display())]
    Collection {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An archive entry name or symlink target failed validation.
    #[error("unsafe path in archive: {0}")]
    UnsafePath(String),

    /// A per-file or cumulative extraction ceiling was breached.
    #[error("{what} exceeds limit of {}", human_limit(.limit))]
    QuotaExceeded { what: String, limit: u64 },

    /// The external encryption tool failed or is misconfigured.
    #[error("{0}")]
    Encryption(String),

    /// The user declined the safety-backup prompt.
    #[error("restore cancelled by user")]
    Cancelled,

    /// Collection produced nothing to archive.
    #[error("no files to backup")]
    NoFiles,

    /// No archive was found or named.
    #[error("no backup found in {}", .0.display())]
    NoBackup(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot determine home directory")]
    NoHome,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("parsing config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn human_limit(limit: &u64) -> String {
    format_size(*limit)
}

impl Error {
    pub(crate) fn encryption(msg: impl Into<String>) -> Self {
        Error::Encryption(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_message_formats_limit() {
        let err = Error::QuotaExceeded {
            what: "total extracted size".to_string(),
            limit: 10 << 30,
        };
        assert_eq!(
            err.to_string(),
            "total extracted size exceeds limit of 10.00 GB"
        );
    }

    #[test]
    fn test_collection_message_includes_path() {
        let err = Error::Collection {
            path: PathBuf::from("/home/u/.zshrc"),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/home/u/.zshrc"));
        assert!(msg.contains("No such file"));
    }
}
