//! Pre-restore safety backups of files a restore is about to overwrite.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::{debug, info, warn};

use crate::archive::{create_archive, create_encrypted_archive};
use crate::category::is_sensitive_path;
use crate::collect::describe;
use crate::constants::PRE_RESTORE_DIR;
use crate::crypto::{Encryption, EncryptionMethod, EncryptionSettings};
use crate::extract::Extractor;
use crate::metadata::{NAME_TIMESTAMP_FORMAT, create_private_dir};
use crate::safety::{is_safe_relative_path, is_within_base};
use crate::{Error, Result};

/// What to do with sensitive files when the safety backup cannot be encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitiveChoice {
    SaveUnencrypted,
    SkipSensitive,
    Cancel,
}

/// Asks the user how to handle sensitive files in an unencrypted safety backup.
pub trait SensitivePrompt {
    fn choose(&mut self, files: &[String]) -> Result<SensitiveChoice>;
}

/// Interactive prompt on stderr/stdin.
pub struct StdinPrompt;

impl SensitivePrompt for StdinPrompt {
    fn choose(&mut self, files: &[String]) -> Result<SensitiveChoice> {
        let mut err = io::stderr().lock();
        writeln!(
            err,
            "Safety backup contains sensitive files but no encryption is configured:"
        )?;
        for file in files.iter().filter(|f| is_sensitive_path(f)) {
            writeln!(err, "  {file}")?;
        }
        writeln!(err, "Options:")?;
        writeln!(err, "  1. Save without encryption")?;
        writeln!(err, "  2. Skip sensitive files")?;
        writeln!(err, "  3. Cancel restore")?;
        write!(err, "\nChoice [1/2/3]: ")?;
        err.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(SensitiveChoice::Cancel);
        }
        parse_choice(&line)
    }
}

/// A prompt that always answers the same, for non-interactive runs.
pub struct FixedChoice(pub SensitiveChoice);

impl SensitivePrompt for FixedChoice {
    fn choose(&mut self, _files: &[String]) -> Result<SensitiveChoice> {
        Ok(self.0)
    }
}

/// Parses an answer to the sensitive-files prompt. Empty input cancels.
pub fn parse_choice(input: &str) -> Result<SensitiveChoice> {
    match input.trim() {
        "1" => Ok(SensitiveChoice::SaveUnencrypted),
        "2" => Ok(SensitiveChoice::SkipSensitive),
        "3" | "" => Ok(SensitiveChoice::Cancel),
        other => Err(Error::Config(format!("invalid choice: {other}"))),
    }
}

/// Picks the encryption for a safety backup.
///
/// A plaintext archive gets a plaintext safety backup. For an encrypted one
/// the archive's method wins when it is configured and installed, then any
/// configured and installed method, otherwise none.
pub fn choose_encryption(original: EncryptionMethod, settings: &EncryptionSettings) -> Encryption {
    if !original.is_encrypted() {
        return Encryption::None;
    }
    let preferred = Encryption::new(original, settings);
    if preferred.usable() {
        return preferred;
    }
    [EncryptionMethod::Age, EncryptionMethod::Gpg]
        .into_iter()
        .map(|m| Encryption::new(m, settings))
        .find(Encryption::usable)
        .unwrap_or(Encryption::None)
}

/// Names of non-directory entries that a restore would write over.
pub fn find_files_to_backup<R: Read>(extractor: &Extractor, source: R) -> Result<Vec<String>> {
    let home = extractor.home();
    let mut archive = Archive::new(GzDecoder::new(source));
    let mut files = Vec::new();

    for entry in archive.entries()? {
        let entry = entry?;
        if entry.header().entry_type() == EntryType::Directory {
            continue;
        }
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        if name.is_empty() || !is_safe_relative_path(&name) || !extractor.wants(&name) {
            continue;
        }
        let target = home.join(&name);
        if !is_within_base(&target, home) {
            continue;
        }
        if target.symlink_metadata().is_ok() {
            files.push(name);
        }
    }

    Ok(files)
}

/// Writes the files `plaintext` would overwrite into
/// `<backup_dir>/pre-restore/pre-restore-<timestamp>.tar.gz[.method]`.
///
/// Returns `None` when nothing needs saving. [`Error::Cancelled`] when the
/// user cancels at the sensitive-files prompt.
pub fn create_safety_backup(
    extractor: &Extractor,
    plaintext: &Path,
    backup_dir: &Path,
    encryption: &Encryption,
    prompt: &mut dyn SensitivePrompt,
) -> Result<Option<PathBuf>> {
    let source = BufReader::new(File::open(plaintext)?);
    let mut names = find_files_to_backup(extractor, source)?;
    if names.is_empty() {
        debug!("no existing files to back up");
        return Ok(None);
    }

    if !encryption.method().is_encrypted() && names.iter().any(|n| is_sensitive_path(n)) {
        match prompt.choose(&names)? {
            SensitiveChoice::SaveUnencrypted => {
                warn!("saving sensitive files in an unencrypted safety backup")
            }
            SensitiveChoice::SkipSensitive => {
                info!("skipping sensitive files in safety backup");
                names.retain(|n| !is_sensitive_path(n));
            }
            SensitiveChoice::Cancel => return Err(Error::Cancelled),
        }
        if names.is_empty() {
            debug!("no files left to back up after filtering");
            return Ok(None);
        }
    }

    let home = extractor.home();
    let files = names
        .into_iter()
        .filter_map(|name| match describe(&home.join(&name), name, false) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("{e}");
                None
            }
        })
        .collect::<Vec<_>>();

    let dir = backup_dir.join(PRE_RESTORE_DIR);
    create_private_dir(&dir)?;
    let mut name = format!(
        "{PRE_RESTORE_DIR}-{}.tar.gz",
        Local::now().format(NAME_TIMESTAMP_FORMAT)
    );
    if let Some(ext) = encryption.method().extension() {
        name.push('.');
        name.push_str(ext);
    }
    let path = dir.join(name);

    if encryption.method().is_encrypted() {
        create_encrypted_archive(&path, &files, encryption)?;
    } else {
        create_archive(&path, &files)?;
    }
    info!("created safety backup {}", path.display());
    Ok(Some(path))
}
