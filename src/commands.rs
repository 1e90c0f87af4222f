//! Command-line interface definition for dotkeep.
//!
//! This module defines all CLI commands, their arguments, and the handlers
//! that drive backup, restore, listing and configuration management.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use dotkeep::backup::{Backup, BackupOptions};
use dotkeep::config::{self, Config};
use dotkeep::crypto::EncryptionMethod;
use dotkeep::extract::{self, DiffSummary};
use dotkeep::metadata::{BackupResult, RestoreResult, format_size};
use dotkeep::restore::{self, Restore, RestoreOptions};
use dotkeep::safety_backup::StdinPrompt;
use dotkeep::Error;
use serde::Serialize;

use crate::sysexits;

/// Command-line interface definition for dotkeep.
#[derive(Parser)]
#[command(name = "dk", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    pub commands: Option<Commands>,
}

/// Supported dotkeep commands.
#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Back up the configured dotfiles into a new archive.
    Backup {
        /// Show what would be archived without writing anything.
        #[arg(long)]
        dry_run: bool,
        /// Only report the number of files and their total size.
        #[arg(long, conflicts_with = "dry_run")]
        estimate: bool,
        /// Encryption method, overriding the configuration.
        #[arg(long, value_name = "METHOD", conflicts_with = "no_encrypt")]
        encrypt: Option<EncryptionMethod>,
        /// Disable encryption for this run.
        #[arg(long)]
        no_encrypt: bool,
        /// Leave sensitive items out even when encrypting.
        #[arg(long)]
        no_secrets: bool,
        /// age recipients file.
        #[arg(long, value_name = "FILE")]
        recipients: Option<PathBuf>,
        /// GnuPG recipient.
        #[arg(long, value_name = "ID")]
        gpg_recipient: Option<String>,
        /// Profile from the configuration file.
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// Restore an archive into the home directory.
    Restore {
        /// Archive to restore. Defaults to the latest backup.
        archive: Option<PathBuf>,
        /// Show what would be restored without writing anything.
        #[arg(long)]
        dry_run: bool,
        /// Do not ask for confirmation.
        #[arg(short, long)]
        force: bool,
        /// Skip the pre-restore safety backup.
        #[arg(long)]
        no_backup: bool,
        /// Only restore these categories (comma-separated, e.g. shell,git).
        #[arg(long, value_delimiter = ',', value_name = "CATEGORIES", value_parser = category_name)]
        only: Vec<String>,
    },
    /// List the archives in the backup directory.
    List,
    /// Show the entries of an archive.
    Contents {
        /// Archive to inspect.
        archive: PathBuf,
    },
    /// Compare an archive with the files currently on disk.
    Diff {
        /// Archive to compare. Defaults to the latest backup.
        archive: Option<PathBuf>,
    },
    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Print the configuration file location.
    Path,
    /// Write the default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Check the configuration file.
    Validate,
}

/// Global flags shared by every handler.
pub(crate) struct Globals {
    pub config: Option<PathBuf>,
    pub json: bool,
    pub verbose: u8,
}

impl Globals {
    fn config_path(&self) -> PathBuf {
        match &self.config {
            Some(path) => path.clone(),
            None => config::config_file().unwrap_or_else(|e| fail(&e)),
        }
    }

    /// Loads the configuration and the home directory, exiting on failure.
    fn load(&self, profile: Option<&str>) -> (Config, PathBuf) {
        let home = config::home_dir().unwrap_or_else(|e| fail(&e));
        let config =
            Config::load(&self.config_path(), profile, &home).unwrap_or_else(|e| fail(&e));
        (config, home)
    }
}

/// `--only "shell, git"` names the same categories as `--only shell,git`.
fn category_name(value: &str) -> std::result::Result<String, String> {
    Ok(value.trim().to_string())
}

/// Maps a library error to a sysexits code.
pub(crate) fn exit_code(err: &Error) -> i32 {
    match err {
        Error::Config(_) | Error::Toml(_) => sysexits::EX_CONFIG,
        Error::NoHome => sysexits::EX_UNAVAILABLE,
        Error::NoBackup(_) | Error::NoFiles => sysexits::EX_NOINPUT,
        Error::UnsafePath(_) | Error::QuotaExceeded { .. } | Error::Json(_) => {
            sysexits::EX_DATAERR
        }
        Error::Cancelled => sysexits::EX_TEMPFAIL,
        Error::Encryption(_) => sysexits::EX_UNAVAILABLE,
        Error::Collection { .. } | Error::Io(_) => sysexits::EX_IOERR,
        Error::Join(_) => sysexits::EX_SOFTWARE,
    }
}

/// Prints the error and exits with its sysexits code.
fn fail(err: &Error) -> ! {
    eprintln!("Error: {err}");
    process::exit(exit_code(err));
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{json}");
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Runs a backup.
///
/// # Arguments
/// * `globals` - Global command-line flags.
/// * `options` - Backup switches.
/// * `profile` - Optional profile name from the configuration.
///
/// Exits the process with an error code if the backup fails.
pub(crate) fn backup(globals: &Globals, options: BackupOptions, profile: Option<&str>) -> Result<()> {
    let (config, home) = globals.load(profile);
    let estimate = options.estimate;
    let dry_run = options.dry_run;

    let mut result = BackupResult::default();
    let outcome = Backup::new(&config, options, &home).execute(&mut result);
    if let Err(e) = &outcome {
        result.error = Some(e.to_string());
    }
    result.success = outcome.is_ok();

    if globals.json {
        print_json(&result)?;
    } else if outcome.is_ok() {
        print_backup_summary(&result, estimate, dry_run);
    }

    if let Err(e) = outcome {
        if !globals.json {
            eprintln!("Backup failed: {e}");
        }
        process::exit(exit_code(&e));
    }
    Ok(())
}

fn print_backup_summary(result: &BackupResult, estimate: bool, dry_run: bool) {
    let stats = &result.stats;
    if estimate {
        println!("Estimate:");
        println!("  Files: {}", stats.files_backed_up);
        println!("  Size: {}", format_size(stats.total_size));
        return;
    }
    if dry_run {
        println!("Dry run - would backup:");
        for path in &result.planned {
            println!("  {path}");
        }
        if let Some(method) = result.encryption_method {
            println!("\nWould encrypt with: {method}");
        }
        return;
    }
    if let Some(archive) = &result.archive {
        println!("Backup complete: {}", file_name(archive));
    }
    println!("  Files: {}", stats.files_backed_up);
    println!("  Size: {}", format_size(stats.total_size));
    println!("  Skipped: {}", stats.files_skipped);
    if stats.files_excluded > 0 {
        println!("  Excluded: {}", stats.files_excluded);
    }
    if stats.sensitive_files > 0 {
        println!("  Sensitive: {}", stats.sensitive_files);
    }
}

/// Restores an archive, the latest one when none is given.
///
/// Asks for confirmation unless `force`, a dry run or JSON output is requested.
///
/// Exits the process with an error code if the restore fails or is declined.
pub(crate) fn restore(
    globals: &Globals,
    archive: Option<PathBuf>,
    options: RestoreOptions,
    force: bool,
) -> Result<()> {
    let (config, home) = globals.load(None);
    let archive = match archive {
        Some(archive) => archive,
        None => restore::find_latest_backup(&config.backup.backup_dir).unwrap_or_else(|e| fail(&e)),
    };
    let dry_run = options.dry_run;

    if !force && !dry_run && !globals.json && !confirm(&archive, &home)? {
        println!("Restore cancelled.");
        process::exit(sysexits::EX_TEMPFAIL);
    }

    let mut result = RestoreResult {
        archive: archive.clone(),
        categories: options.categories.clone(),
        dry_run,
        ..Default::default()
    };
    let outcome =
        Restore::new(&config, options, &home).execute(&archive, &mut StdinPrompt, &mut result);
    if let Err(e) = &outcome {
        result.error = Some(e.to_string());
    }
    result.success = outcome.is_ok();

    if globals.json {
        print_json(&result)?;
    } else if outcome.is_ok() {
        if let Some(safety) = &result.safety_backup {
            println!("Created safety backup: {}", file_name(safety));
        }
        if dry_run {
            println!("Dry run - would restore:");
            for name in &result.planned {
                println!("  {name}");
            }
            println!("\nWould restore {} files", result.files_restored);
        } else {
            println!("Restored {} files from {}", result.files_restored, file_name(&archive));
        }
    }

    if let Err(e) = outcome {
        if !globals.json {
            eprintln!("Restore failed: {e}");
        }
        process::exit(exit_code(&e));
    }
    Ok(())
}

fn confirm(archive: &Path, home: &Path) -> Result<bool> {
    print!(
        "Restore {} into {}? Existing files will be overwritten. [y/N]: ",
        file_name(archive),
        home.display()
    );
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Lists the archives in the backup directory, newest first.
pub(crate) fn list(globals: &Globals) -> Result<()> {
    let (config, _) = globals.load(None);
    let backups = restore::list_backups(&config.backup.backup_dir).unwrap_or_else(|e| fail(&e));

    if globals.json {
        return print_json(&backups);
    }
    if backups.is_empty() {
        println!("No backups found in {}", config.backup.backup_dir.display());
        return Ok(());
    }
    for info in &backups {
        let encryption = info.encryption.map_or("-", |m| m.as_str());
        let files = info
            .file_count
            .map_or_else(String::new, |n| format!("{n} files"));
        println!(
            "{:<20} {:>10}  {:<4} {:<10} {}",
            info.timestamp,
            format_size(info.size),
            encryption,
            files,
            file_name(&info.archive)
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct ContentEntry {
    name: String,
    size: u64,
}

/// Prints the entries of an archive.
pub(crate) fn contents(globals: &Globals, archive: &Path) -> Result<()> {
    let (config, home) = globals.load(None);
    let entries = restore::archive_contents(archive, &config, &home).unwrap_or_else(|e| fail(&e));

    if globals.json {
        let entries: Vec<ContentEntry> = entries
            .into_iter()
            .map(|(name, size)| ContentEntry { name, size })
            .collect();
        return print_json(&entries);
    }
    println!("Archive contents:\n");
    for (name, size) in &entries {
        println!("  {name:<50} {:>10}", format_size(*size));
    }
    Ok(())
}

/// Compares an archive with the home directory.
pub(crate) fn diff(globals: &Globals, archive: Option<PathBuf>) -> Result<()> {
    let (config, home) = globals.load(None);
    let archive = match archive {
        Some(archive) => archive,
        None => restore::find_latest_backup(&config.backup.backup_dir).unwrap_or_else(|e| fail(&e)),
    };
    let summary = restore::archive_diff(&archive, &config, &home).unwrap_or_else(|e| fail(&e));

    if globals.json {
        return print_json(&summary);
    }
    if !summary.new.is_empty() {
        println!("\nNew files ({}):", summary.new.len());
        for name in &summary.new {
            println!("  + {name}");
        }
    }
    if !summary.modified.is_empty() {
        println!("\nModified files ({}):", summary.modified.len());
        for name in &summary.modified {
            println!("  ~ {name}");
            if globals.verbose > 0 {
                print_file_diff(&home, name, &summary);
            }
        }
    }
    println!(
        "\nSummary: {} new, {} modified, {} unchanged",
        summary.new.len(),
        summary.modified.len(),
        summary.unchanged.len()
    );
    Ok(())
}

/// Prints the changed lines of one modified file, when its content was compared.
fn print_file_diff(home: &Path, name: &str, summary: &DiffSummary) {
    let Some(archived) = summary.archived.get(name) else {
        return;
    };
    let Ok(current) = fs::read(home.join(name)) else {
        return;
    };
    for line in extract::line_diff(&current, archived) {
        println!("    {line}");
    }
}

/// Handles `config path|init|validate`.
pub(crate) fn config(globals: &Globals, action: ConfigAction) -> Result<()> {
    let path = globals.config_path();
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init { force } => {
            config::init_config(&path, force).unwrap_or_else(|e| fail(&e));
            println!("Created config file: {}", path.display());
        }
        ConfigAction::Validate => {
            if !path.exists() {
                eprintln!("No config file at {}, using defaults", path.display());
            }
            let (config, _) = globals.load(None);
            config.validate().unwrap_or_else(|e| fail(&e));
            println!("Configuration is valid");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_restore_only_trims_names() {
        let cli = Cli::parse_from(["dk", "restore", "--only", "shell, git", "-f"]);
        match cli.commands {
            Some(Commands::Restore { only, .. }) => assert_eq!(only, vec!["shell", "git"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_restore_only_is_comma_separated() {
        let cli = Cli::parse_from(["dk", "restore", "--only", "shell,git", "-f"]);
        match cli.commands {
            Some(Commands::Restore { only, force, .. }) => {
                assert_eq!(only, vec!["shell", "git"]);
                assert!(force);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["dk", "list", "--json", "-vv", "--config", "/tmp/c.toml"]);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_encrypt_conflicts_with_no_encrypt() {
        assert!(Cli::try_parse_from(["dk", "backup", "--encrypt", "age", "--no-encrypt"]).is_err());
        let cli = Cli::try_parse_from(["dk", "backup", "--encrypt", "gpg"]).unwrap();
        match cli.commands {
            Some(Commands::Backup { encrypt, .. }) => assert_eq!(encrypt, Some(EncryptionMethod::Gpg)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Error::Cancelled), sysexits::EX_TEMPFAIL);
        assert_eq!(exit_code(&Error::NoFiles), sysexits::EX_NOINPUT);
        assert_eq!(
            exit_code(&Error::Config("x".to_string())),
            sysexits::EX_CONFIG
        );
        assert_eq!(
            exit_code(&Error::QuotaExceeded {
                what: "x".to_string(),
                limit: 1
            }),
            sysexits::EX_DATAERR
        );
    }
}
