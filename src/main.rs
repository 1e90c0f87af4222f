mod commands;
mod sysexits;

use crate::commands::{Cli, Commands, Globals};
use anyhow::Result;
use clap::Parser;
use dotkeep::backup::BackupOptions;
use dotkeep::restore::RestoreOptions;
use std::process;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Entry point for the dk CLI application.
/// Parses command-line arguments and dispatches to the appropriate command handler.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let commands = match cli.commands {
        Some(commands) => commands,
        None => {
            eprintln!("dk requires at least one command to execute. See 'dk --help' for usage.");
            process::exit(sysexits::EX_KEYWORD);
        }
    };
    let globals = Globals {
        config: cli.config,
        json: cli.json,
        verbose: cli.verbose,
    };

    match commands {
        Commands::Backup {
            dry_run,
            estimate,
            encrypt,
            no_encrypt,
            no_secrets,
            recipients,
            gpg_recipient,
            profile,
        } => {
            let options = BackupOptions {
                dry_run,
                estimate,
                encryption: encrypt,
                no_encrypt,
                no_secrets,
                recipients,
                gpg_recipient,
            };
            commands::backup(&globals, options, profile.as_deref())?;
        }
        Commands::Restore {
            archive,
            dry_run,
            force,
            no_backup,
            only,
        } => {
            let options = RestoreOptions {
                dry_run,
                no_backup,
                categories: only.into_iter().filter(|c| !c.is_empty()).collect(),
                ..Default::default()
            };
            commands::restore(&globals, archive, options, force)?;
        }
        Commands::List => commands::list(&globals)?,
        Commands::Contents { archive } => commands::contents(&globals, &archive)?,
        Commands::Diff { archive } => commands::diff(&globals, archive)?,
        Commands::Config { action } => commands::config(&globals, action)?,
    }
    Ok(())
}

/// Logs go to stderr so that `--json` output on stdout stays parseable.
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
