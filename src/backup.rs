//! The backup operation: collect, archive, describe, prune.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::archive::{create_archive, create_encrypted_archive};
use crate::collect::Collector;
use crate::config::Config;
use crate::constants::ARCHIVE_PREFIX;
use crate::crypto::{Encryption, EncryptionMethod};
use crate::metadata::{
    BackupResult, Metadata, archive_path, create_private_dir, format_size, metadata_path,
};
use crate::{Error, Result};

/// Per-run switches, mostly straight from the command line.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub dry_run: bool,
    /// Collect and report totals only.
    pub estimate: bool,
    /// Overrides the configured method.
    pub encryption: Option<EncryptionMethod>,
    pub no_encrypt: bool,
    /// Leave sensitive items out even when encrypting.
    pub no_secrets: bool,
    pub recipients: Option<PathBuf>,
    pub gpg_recipient: Option<String>,
}

pub struct Backup<'a> {
    config: &'a Config,
    options: BackupOptions,
    home: PathBuf,
}

impl<'a> Backup<'a> {
    pub fn new(config: &'a Config, options: BackupOptions, home: impl Into<PathBuf>) -> Self {
        Self {
            config,
            options,
            home: home.into(),
        }
    }

    /// Runs the backup. Failures are reported in the result, never panicked.
    pub fn run(&self) -> BackupResult {
        let mut result = BackupResult::default();
        match self.execute(&mut result) {
            Ok(()) => result.success = true,
            Err(e) => {
                result.success = false;
                result.error = Some(e.to_string());
            }
        }
        result
    }

    /// Picks the method from the options, then the config, and checks its
    /// settings.
    pub fn resolve_encryption(&self) -> Result<Encryption> {
        let method = if self.options.no_encrypt {
            EncryptionMethod::None
        } else {
            self.options
                .encryption
                .unwrap_or(self.config.backup.encryption)
        };

        let mut settings = self.config.encryption_settings();
        if let Some(recipients) = &self.options.recipients {
            settings.age_recipients = Some(recipients.clone());
        }
        if let Some(recipient) = &self.options.gpg_recipient {
            settings.gpg_recipient = Some(recipient.clone());
        }

        let encryption = Encryption::new(method, &settings);
        encryption.validate()?;
        Ok(encryption)
    }

    /// Like [`Backup::run`], but hands the error back instead of folding it
    /// into the result. `success` and `error` are left untouched.
    pub fn execute(&self, result: &mut BackupResult) -> Result<()> {
        let backup_dir = &self.config.backup.backup_dir;
        let encryption = self.resolve_encryption()?;
        let method = encryption.method();
        if !encryption.available() {
            return Err(Error::encryption(format!("{method} is not installed")));
        }
        result.encrypted = method.is_encrypted();
        result.encryption_method = method.is_encrypted().then_some(method);

        let include_sensitive = method.is_encrypted() && !self.options.no_secrets;
        if !method.is_encrypted() && !self.config.sensitive.is_empty() {
            debug!("sensitive items skipped without encryption");
        }

        info!("collecting files");
        let collector = Collector::new(&self.home, self.config.exclude_set());
        let (files, stats) = collector.collect(
            &self.config.backup_items(),
            &self.config.sensitive_items(),
            include_sensitive,
        );
        result.stats = stats;
        if files.is_empty() {
            return Err(Error::NoFiles);
        }
        info!("found {} files to backup", files.len());

        if self.options.estimate {
            info!(
                "estimate: {} files, {}",
                result.stats.files_backed_up,
                format_size(result.stats.total_size)
            );
            return Ok(());
        }
        if self.options.dry_run {
            result.planned = files.iter().map(|f| f.rel_path.clone()).collect();
            return Ok(());
        }

        create_private_dir(backup_dir)?;
        let path = archive_path(backup_dir, Local::now(), method);
        if method.is_encrypted() {
            info!("creating encrypted archive with {method}");
            create_encrypted_archive(&path, &files, &encryption)?;
        } else {
            info!("creating archive {}", path.display());
            create_archive(&path, &files)?;
        }
        result.archive = Some(path.clone());

        let metadata = Metadata::new(method, result.stats.clone());
        if let Err(e) = metadata.save(&metadata_path(&path)) {
            warn!("failed to save metadata: {e}");
        }

        match cleanup_old_backups(backup_dir, self.config.backup.max_backups) {
            Ok(removed) if removed > 0 => info!("removed {removed} old backups"),
            Ok(_) => {}
            Err(e) => warn!("cleanup of old backups failed: {e}"),
        }
        Ok(())
    }
}

/// Keeps the newest `max_backups` timestamp groups of `dotfiles-*` files.
///
/// An archive and its sidecar share a timestamp and are removed together.
/// Returns the number of groups removed; `max_backups == 0` keeps everything.
pub fn cleanup_old_backups(dir: &Path, max_backups: usize) -> Result<usize> {
    if max_backups == 0 {
        return Ok(0);
    }

    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(rest) = name.strip_prefix(ARCHIVE_PREFIX) else {
            continue;
        };
        let timestamp = rest.split('.').next().unwrap_or(rest).to_string();
        groups.entry(timestamp).or_default().push(entry.path());
    }

    let excess = groups.len().saturating_sub(max_backups);
    for (timestamp, paths) in groups.into_iter().take(excess) {
        debug!("removing backup {timestamp}");
        for path in paths {
            if let Err(e) = fs::remove_file(&path) {
                warn!("failed to remove {}: {e}", path.display());
            }
        }
    }
    Ok(excess)
}
