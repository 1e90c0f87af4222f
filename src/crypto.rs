//! Encryption through the external `age` and `gpg` tools.
//!
//! Nothing in here implements cryptography. Plaintext is streamed into the
//! tool's stdin and the tool writes the ciphertext file itself.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metadata::private_options;
use crate::{Error, Result};

/// Encryption method of an archive.
#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMethod {
    /// Plain `.tar.gz`
    #[default]
    None,
    /// age, `.tar.gz.age`
    Age,
    /// GnuPG, `.tar.gz.gpg`
    Gpg,
}

impl EncryptionMethod {
    pub fn is_encrypted(self) -> bool {
        self != EncryptionMethod::None
    }

    /// File extension appended after `.tar.gz`.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            EncryptionMethod::None => None,
            EncryptionMethod::Age => Some("age"),
            EncryptionMethod::Gpg => Some("gpg"),
        }
    }

    /// Detects the method from a file name suffix.
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("age") => EncryptionMethod::Age,
            Some("gpg") => EncryptionMethod::Gpg,
            _ => EncryptionMethod::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionMethod::None => "none",
            EncryptionMethod::Age => "age",
            EncryptionMethod::Gpg => "gpg",
        }
    }

    /// Whether the external tool for this method is on `PATH`.
    pub fn is_installed(self) -> bool {
        match self.extension() {
            Some(tool) => which::which(tool).is_ok(),
            None => true,
        }
    }
}

impl fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key material locations for every method, taken from the configuration.
#[derive(Debug, Clone, Default)]
pub struct EncryptionSettings {
    pub age_recipients: Option<PathBuf>,
    pub age_identity_files: Vec<PathBuf>,
    pub gpg_recipient: Option<String>,
}

/// A resolved encryption backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Encryption {
    None,
    Age {
        recipients: Option<PathBuf>,
        identities: Vec<PathBuf>,
    },
    Gpg {
        recipient: Option<String>,
    },
}

impl Encryption {
    pub fn new(method: EncryptionMethod, settings: &EncryptionSettings) -> Self {
        match method {
            EncryptionMethod::None => Encryption::None,
            EncryptionMethod::Age => Encryption::Age {
                recipients: settings.age_recipients.clone(),
                identities: settings.age_identity_files.clone(),
            },
            EncryptionMethod::Gpg => Encryption::Gpg {
                recipient: settings.gpg_recipient.clone(),
            },
        }
    }

    pub fn method(&self) -> EncryptionMethod {
        match self {
            Encryption::None => EncryptionMethod::None,
            Encryption::Age { .. } => EncryptionMethod::Age,
            Encryption::Gpg { .. } => EncryptionMethod::Gpg,
        }
    }

    /// Whether the backing tool is installed.
    pub fn available(&self) -> bool {
        self.method().is_installed()
    }

    /// Checks that the settings needed to encrypt are present.
    pub fn validate(&self) -> Result<()> {
        match self {
            Encryption::None => Ok(()),
            Encryption::Age { recipients, .. } => {
                let recipients = recipients.as_ref().ok_or_else(|| {
                    Error::encryption("age encryption requested but no recipients file specified")
                })?;
                if !recipients.exists() {
                    return Err(Error::encryption(format!(
                        "age recipients file not found: {}",
                        recipients.display()
                    )));
                }
                Ok(())
            }
            Encryption::Gpg { recipient } => match recipient {
                Some(r) if !r.is_empty() => Ok(()),
                _ => Err(Error::encryption(
                    "gpg encryption requested but no recipient specified",
                )),
            },
        }
    }

    /// Configured and installed.
    pub fn usable(&self) -> bool {
        self.validate().is_ok() && self.available()
    }

    /// Encrypts everything read from `reader` into `output`.
    ///
    /// Returns once the tool has exited. The tool's stderr is carried in the
    /// error when it fails.
    pub fn encrypt_reader<R: Read>(&self, mut reader: R, output: &Path) -> Result<()> {
        match self {
            Encryption::None => {
                let mut file = private_options().open(output)?;
                io::copy(&mut reader, &mut file)?;
                Ok(())
            }
            Encryption::Age { recipients, .. } => {
                let recipients = recipients
                    .as_ref()
                    .ok_or_else(|| Error::encryption("age recipients file not specified"))?;
                if !recipients.exists() {
                    return Err(Error::encryption(format!(
                        "age recipients file not found: {}",
                        recipients.display()
                    )));
                }
                let mut cmd = Command::new("age");
                cmd.arg("-e").arg("-R").arg(recipients).arg("-o").arg(output);
                feed("age", cmd, reader)
            }
            Encryption::Gpg { recipient } => {
                let mut cmd = Command::new("gpg");
                cmd.args(["--batch", "--yes", "--encrypt", "--output"])
                    .arg(output);
                if let Some(r) = recipient.as_deref().filter(|r| !r.is_empty()) {
                    cmd.args(["--recipient", r]);
                }
                feed("gpg", cmd, reader)
            }
        }
    }

    /// Decrypts `input` into `output`, which may already exist.
    pub fn decrypt(&self, input: &Path, output: &Path) -> Result<()> {
        match self {
            Encryption::None => {
                fs::copy(input, output)?;
                Ok(())
            }
            Encryption::Age { identities, .. } => {
                let identity = find_identity(identities)?;
                let mut cmd = Command::new("age");
                cmd.arg("-d")
                    .arg("-i")
                    .arg(identity)
                    .arg("-o")
                    .arg(output)
                    .arg(input)
                    .stdin(Stdio::null());
                run("age", "decryption", cmd)
            }
            Encryption::Gpg { .. } => {
                let mut cmd = Command::new("gpg");
                cmd.args(["--yes", "--decrypt", "--output"])
                    .arg(output)
                    .arg(input)
                    // passphrase prompts
                    .stdin(Stdio::inherit());
                run("gpg", "decryption", cmd)
            }
        }
    }
}

fn find_identity(identities: &[PathBuf]) -> Result<&Path> {
    if identities.is_empty() {
        return Err(Error::encryption("no age identity files configured"));
    }
    identities
        .iter()
        .find(|p| p.exists())
        .map(PathBuf::as_path)
        .ok_or_else(|| {
            let list = identities
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Error::encryption(format!(
                "age identity file not found in configured locations: {list}"
            ))
        })
}

/// Streams `reader` into the tool's stdin and waits for it.
fn feed<R: Read>(tool: &str, mut cmd: Command, mut reader: R) -> Result<()> {
    debug!("running {cmd:?}");
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .map_err(|e| Error::encryption(format!("failed to start {tool}: {e}")))?;

    let copied = match child.stdin.take() {
        Some(mut stdin) => io::copy(&mut reader, &mut stdin).map(|_| ()),
        None => Ok(()),
    };

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(Error::encryption(format!(
            "{tool} encryption failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    match copied {
        // the tool exited early but successfully
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => Ok(other?),
    }
}

fn run(tool: &str, action: &str, mut cmd: Command) -> Result<()> {
    debug!("running {cmd:?}");
    let output = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::encryption(format!("failed to start {tool}: {e}")))?;
    if !output.status.success() {
        return Err(Error::encryption(format!(
            "{tool} {action} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
