//! The restore operation and the read-only archive queries built on it.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::category::CategoryTable;
use crate::config::Config;
use crate::constants::PKG_NAME;
use crate::crypto::{Encryption, EncryptionMethod, EncryptionSettings};
use crate::extract::{DiffSummary, Extractor, Limits, diff, list_contents};
use crate::metadata::{
    BackupInfo, Metadata, RestoreResult, create_private_dir, display_timestamp, is_archive_name,
    metadata_path,
};
use crate::safety_backup::{SensitivePrompt, choose_encryption, create_safety_backup};
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    pub dry_run: bool,
    /// Skip the pre-restore safety backup.
    pub no_backup: bool,
    /// Restrict the restore to these categories. Empty means everything.
    pub categories: Vec<String>,
    pub limits: Limits,
}

pub struct Restore<'a> {
    config: &'a Config,
    options: RestoreOptions,
    home: PathBuf,
    categories: CategoryTable,
}

impl<'a> Restore<'a> {
    pub fn new(config: &'a Config, options: RestoreOptions, home: impl Into<PathBuf>) -> Self {
        Self {
            config,
            options,
            home: home.into(),
            categories: CategoryTable::builtin(),
        }
    }

    /// Replaces the built-in category table.
    pub fn with_categories(mut self, categories: CategoryTable) -> Self {
        self.categories = categories;
        self
    }

    /// Restores `archive` into the home directory.
    pub fn run(&self, archive: &Path, prompt: &mut dyn SensitivePrompt) -> RestoreResult {
        let mut result = RestoreResult {
            archive: archive.to_path_buf(),
            categories: self.options.categories.clone(),
            dry_run: self.options.dry_run,
            ..Default::default()
        };
        match self.execute(archive, prompt, &mut result) {
            Ok(()) => result.success = true,
            Err(e) => {
                result.success = false;
                result.error = Some(e.to_string());
            }
        }
        result
    }

    /// Like [`Restore::run`], but hands the error back.
    pub fn execute(
        &self,
        archive: &Path,
        prompt: &mut dyn SensitivePrompt,
        result: &mut RestoreResult,
    ) -> Result<()> {
        for name in &self.options.categories {
            if !self.categories.contains(name) {
                warn!("unknown category: {name}");
            }
        }

        let settings = self.config.encryption_settings();
        let plaintext = Plaintext::open(archive, &settings, &self.home)?;
        let extractor = Extractor::new(&self.home, self.categories.clone())
            .select(&self.options.categories)
            .dry_run(self.options.dry_run)
            .limits(self.options.limits);

        if !self.options.no_backup && !self.options.dry_run {
            let encryption =
                choose_encryption(EncryptionMethod::detect(archive), &settings);
            result.safety_backup = create_safety_backup(
                &extractor,
                plaintext.path(),
                &self.config.backup.backup_dir,
                &encryption,
                prompt,
            )?;
        }

        if self.options.dry_run {
            info!("dry run, nothing will be written");
        } else {
            info!("restoring files");
        }
        let report = extractor.extract(BufReader::new(File::open(plaintext.path())?))?;
        result.files_restored = report.count;
        result.planned = report.planned;
        Ok(())
    }
}

/// A plaintext `.tar.gz` view of an archive, decrypted into a private temp
/// file when needed. The temp file is removed on drop.
pub struct Plaintext {
    path: PathBuf,
    _temp: Option<NamedTempFile>,
}

impl Plaintext {
    pub fn open(archive: &Path, settings: &EncryptionSettings, home: &Path) -> Result<Self> {
        if !archive.exists() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("archive not found: {}", archive.display()),
            )));
        }
        let method = EncryptionMethod::detect(archive);
        if !method.is_encrypted() {
            return Ok(Self {
                path: archive.to_path_buf(),
                _temp: None,
            });
        }

        let dir = home.join(".cache").join(PKG_NAME).join("tmp");
        create_private_dir(&dir)?;
        let temp = tempfile::Builder::new()
            .prefix(&format!("{PKG_NAME}-decrypt-"))
            .suffix(".tar.gz")
            .tempfile_in(&dir)?;
        info!("decrypting {}", archive.display());
        Encryption::new(method, settings)
            .decrypt(archive, temp.path())
            .map_err(|e| Error::encryption(format!("decryption failed: {e}")))?;
        Ok(Self {
            path: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> Result<BufReader<File>> {
        Ok(BufReader::new(File::open(&self.path)?))
    }
}

/// Entry names and sizes of an archive, decrypting first when needed.
pub fn archive_contents(archive: &Path, config: &Config, home: &Path) -> Result<Vec<(String, u64)>> {
    let plaintext = Plaintext::open(archive, &config.encryption_settings(), home)?;
    list_contents(plaintext.reader()?)
}

/// Compares an archive with the current home directory.
pub fn archive_diff(archive: &Path, config: &Config, home: &Path) -> Result<DiffSummary> {
    let plaintext = Plaintext::open(archive, &config.encryption_settings(), home)?;
    diff(home, plaintext.reader()?)
}

/// Archives in `dir`, newest first, enriched from their sidecars.
pub fn list_backups(dir: &Path) -> Result<Vec<BackupInfo>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_archive_name(&name) {
            continue;
        }
        let path = entry.path();
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let method = EncryptionMethod::detect(&path);
        let mut info = BackupInfo {
            archive: path.clone(),
            timestamp: display_timestamp(&name),
            size,
            encrypted: method.is_encrypted(),
            encryption: method.is_encrypted().then_some(method),
            hostname: None,
            file_count: None,
        };
        match Metadata::load(&metadata_path(&path)) {
            Ok(meta) => {
                info.hostname = Some(meta.hostname);
                info.file_count = Some(meta.stats.files_backed_up);
            }
            Err(e) => debug!("no metadata for {name}: {e}"),
        }
        backups.push(info);
    }

    backups.sort_by(|a, b| b.archive.file_name().cmp(&a.archive.file_name()));
    Ok(backups)
}

/// The newest archive in `dir`.
pub fn find_latest_backup(dir: &Path) -> Result<PathBuf> {
    list_backups(dir)?
        .into_iter()
        .next()
        .map(|info| info.archive)
        .ok_or_else(|| Error::NoBackup(dir.to_path_buf()))
}
