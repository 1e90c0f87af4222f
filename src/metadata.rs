//! Backup metadata sidecar files and the structured operation results.
//!
//! The sidecar is purely descriptive: `list` reads it to enrich its output,
//! restore never consults it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::Result;
use crate::collect::CollectionStats;
use crate::constants::ARCHIVE_PREFIX;
use crate::crypto::EncryptionMethod;

/// Timestamp layout embedded in archive file names.
pub const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Descriptive metadata written next to each archive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Metadata {
    pub timestamp: String,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os_version: String,
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_method: Option<EncryptionMethod>,
    pub stats: CollectionStats,
}

impl Metadata {
    /// Creates metadata stamped with the current time and host.
    pub fn new(method: EncryptionMethod, stats: CollectionStats) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            hostname: short_hostname(),
            os_version: os_version(),
            encrypted: method.is_encrypted(),
            encryption_method: method.is_encrypted().then_some(method),
            stats,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        write_private(path, data.as_bytes())?;
        Ok(())
    }
}

/// Result of a backup run, printed as JSON with `--json`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BackupResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_method: Option<EncryptionMethod>,
    pub stats: CollectionStats,
    /// Relative paths that a dry run would archive.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub planned: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a restore run, printed as JSON with `--json`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RestoreResult {
    pub success: bool,
    pub archive: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_backup: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    pub dry_run: bool,
    pub files_restored: usize,
    /// Entry names that a dry run would restore.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub planned: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One archive found in the backup directory.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackupInfo {
    pub archive: PathBuf,
    pub timestamp: String,
    pub size: u64,
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
}

/// Returns the sidecar path for an archive.
///
/// `dotfiles-X.tar.gz` and `dotfiles-X.tar.gz.age` both map to `dotfiles-X.json`.
pub fn metadata_path(archive: &Path) -> PathBuf {
    let name = archive.to_string_lossy();
    let mut base: &str = &name;
    for ext in [".age", ".gpg"] {
        if let Some(stripped) = base.strip_suffix(ext) {
            base = stripped;
            break;
        }
    }
    if let Some(stripped) = base.strip_suffix(".tar.gz") {
        base = stripped;
    } else if let Some(stripped) = base.strip_suffix(".tar") {
        base = stripped;
    }
    PathBuf::from(format!("{base}.json"))
}

/// Builds `<dir>/dotfiles-<YYYYMMDD_HHMMSS>.tar.gz[.<method>]`.
pub fn archive_path(dir: &Path, now: DateTime<Local>, method: EncryptionMethod) -> PathBuf {
    let mut name = format!(
        "{ARCHIVE_PREFIX}{}.tar.gz",
        now.format(NAME_TIMESTAMP_FORMAT)
    );
    if let Some(ext) = method.extension() {
        name.push('.');
        name.push_str(ext);
    }
    dir.join(name)
}

/// Whether a file name looks like an archive produced by a backup.
pub fn is_archive_name(name: &str) -> bool {
    name.starts_with(ARCHIVE_PREFIX)
        && (name.ends_with(".tar.gz") || name.ends_with(".tar.gz.age") || name.ends_with(".tar.gz.gpg"))
}

/// Turns `dotfiles-20240115_143022.tar.gz` into `2024-01-15 14:30:22`.
pub fn display_timestamp(name: &str) -> String {
    let Some(rest) = name.strip_prefix(ARCHIVE_PREFIX) else {
        return String::new();
    };
    let ts: String = rest.chars().take(15).collect();
    if ts.len() != 15 || !ts.is_ascii() {
        return ts;
    }
    format!(
        "{}-{}-{} {}:{}:{}",
        &ts[0..4],
        &ts[4..6],
        &ts[6..8],
        &ts[9..11],
        &ts[11..13],
        &ts[13..15]
    )
}

/// Formats a byte count for humans.
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match size {
        s if s >= GB => format!("{:.2} GB", s as f64 / GB as f64),
        s if s >= MB => format!("{:.2} MB", s as f64 / MB as f64),
        s if s >= KB => format!("{:.2} KB", s as f64 / KB as f64),
        s => format!("{s} bytes"),
    }
}

/// Host name without its domain part.
pub fn short_hostname() -> String {
    match System::host_name() {
        Some(name) if !name.is_empty() => name.split('.').next().unwrap_or_default().to_string(),
        _ => "unknown".to_string(),
    }
}

fn os_version() -> String {
    System::long_os_version().unwrap_or_default()
}

/// Writes a file readable only by the owner.
pub(crate) fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut file = private_options().open(path)?;
    file.write_all(data)?;
    file.flush()
}

/// Creates `path` and missing parents, owner-only where supported.
pub(crate) fn create_private_dir(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)
    }
}

/// Open options for create + truncate with mode 0600 where supported.
pub(crate) fn private_options() -> fs::OpenOptions {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}
