//! User configuration.
//!
//! The configuration lives in `config.toml` under the platform config
//! directory. A missing file means the built-in defaults; a present file
//! replaces them entirely. Host sections are applied before the selected
//! profile.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{fs, io};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collect::BackupItem;
use crate::constants::{CONFIG_NAME, DEFAULT_MAX_BACKUPS, PKG_NAME};
use crate::crypto::{Encryption, EncryptionMethod, EncryptionSettings};
use crate::exclude::ExcludeSet;
use crate::metadata::short_hostname;
use crate::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backup: BackupSettings,
    pub items: Vec<String>,
    pub sensitive: Vec<String>,
    pub excludes: Excludes,
    #[serde(rename = "profile", skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(rename = "host", skip_serializing_if = "BTreeMap::is_empty")]
    pub hosts: BTreeMap<String, HostConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct BackupSettings {
    /// Where archives are written.
    pub backup_dir: PathBuf,
    /// Number of backups kept; 0 means the default.
    pub max_backups: usize,
    pub encryption: EncryptionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_recipients: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub age_identity_files: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpg_recipient: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Excludes {
    pub patterns: Vec<String>,
}

/// A named set of overrides chosen with `--profile`.
///
/// `items` and `sensitive` replace the base lists, the `extra_*` lists append.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Profile {
    pub items: Vec<String>,
    pub sensitive: Vec<String>,
    pub extra_items: Vec<String>,
    pub extra_sensitive: Vec<String>,
    pub excludes: Excludes,
}

/// Additions applied when the short hostname matches the section name.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub extra_items: Vec<String>,
    pub extra_sensitive: Vec<String>,
    pub excludes: Excludes,
}

const DEFAULT_ITEMS: &[&str] = &[
    // shell
    ".zshrc", ".bashrc", ".profile", ".zprofile", ".bash_profile", ".zsh",
    ".oh-my-zsh/custom", ".config/fish", ".p10k.zsh", ".zshenv",
    // git
    ".gitconfig", ".gitignore_global", ".config/git",
    // editors
    ".vimrc", ".config/nvim", ".emacs", ".emacs.d", ".config/helix", ".config/zed",
    // terminal
    ".tmux.conf", ".config/alacritty", ".config/kitty", ".config/wezterm",
    ".config/starship.toml", ".config/zellij",
    ".config/raycast",
    // node
    ".npmrc", ".nvmrc", ".yarnrc", ".config/yarn", ".bunfig.toml",
    // python
    ".config/pip", ".config/ruff", ".config/mypy", ".condarc", ".jupyter",
    // ruby
    ".gemrc", ".irbrc", ".pryrc",
    // java
    ".gradle", ".m2/settings.xml",
    // rust
    ".cargo/config.toml", ".rustup/settings.toml",
    // go
    ".config/go",
    // devops
    ".ansible", ".ansible.cfg", ".config/podman",
    // ai tools
    ".claude/settings.json", ".claude/projects", ".codex/config.toml", ".codex/skills",
];

const DEFAULT_SENSITIVE: &[&str] = &[
    ".ssh", ".gnupg",
    ".aws", ".config/gcloud", ".azure", ".kube", ".s3cfg", ".yandex",
    ".terraform.d", ".terraformrc",
    ".pypirc",
    ".docker",
    ".zsh_history", ".bash_history", ".lesshst",
    ".claude.json", ".codex/auth.json", ".ai",
];

const DEFAULT_EXCLUDES: &[&str] = &[
    ".git", ".idea", "*.log", "*.swp", "*.bak", ".DS_Store", "*.sock", "*.cache",
    // ci and dev artifacts
    ".circleci", ".github", ".travis.yml", ".gitlab-ci.yml", "Makefile", "Dockerfile",
    "*.md", "LICENSE*", "COPYING*", "Gemfile*", "*.spec", "*.rb", "test", "tests", "spec",
    ".editorconfig", ".gitignore", ".gitattributes", ".rspec", ".rubocop*", ".ruby-version",
    // python
    "*.pyc", "__pycache__", ".venv", "venv",
    "node_modules",
    ".gradle/caches", ".gradle/daemon", ".m2/repository",
    "*.tfstate", "*.tfstate.*",
    // gpg transient
    "S.gpg-agent*", "random_seed", "*.status",
    // docker transient
    ".token_seed*", "buildx/refs", "buildx/activity", "buildx/.lock",
    "known_hosts.old",
    "*.zwc",
    // emacs
    "*~", "#*#", ".emacs.d/elpa", ".emacs.d/eln-cache",
    ".config/nvim/lazy-lock.json",
    ".rbenv/versions", ".rvm/gems", ".rvm/rubies",
    // oh-my-zsh plugin artifacts
    "gitstatus/src", "gitstatus/deps", "gitstatus/usrbin",
    "*.png", "*.gif", "*.jpg", "*.svg", "test-data", "docs",
    "*.sh", "DESCRIPTION", "URL", "VERSION", "ZSH_VERSIONS", ".revision-hash", ".version",
];

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Built-in defaults with `~/` paths left unexpanded.
    pub fn defaults() -> Self {
        Self {
            backup: BackupSettings {
                backup_dir: PathBuf::from("~/backups/dotfiles"),
                max_backups: DEFAULT_MAX_BACKUPS,
                encryption: EncryptionMethod::None,
                age_recipients: None,
                age_identity_files: vec![],
                gpg_recipient: None,
            },
            items: strings(DEFAULT_ITEMS),
            sensitive: strings(DEFAULT_SENSITIVE),
            excludes: Excludes {
                patterns: strings(DEFAULT_EXCLUDES),
            },
            profiles: BTreeMap::new(),
            hosts: BTreeMap::new(),
        }
    }

    /// Parses a configuration document and expands `~/` against `home`.
    pub fn parse(toml_str: &str, home: &Path) -> Result<Self> {
        let mut config: Config = toml::from_str(toml_str)?;
        if config.backup.max_backups == 0 {
            config.backup.max_backups = DEFAULT_MAX_BACKUPS;
        }
        config.expand(home);
        Ok(config)
    }

    /// Loads `path`, falling back to the defaults when it does not exist,
    /// then applies the host section and `profile`.
    pub fn load(path: &Path, profile: Option<&str>, home: &Path) -> Result<Self> {
        let mut config = match fs::read_to_string(path) {
            Ok(toml_str) => Self::parse(&toml_str, home)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} not found, using defaults", path.display());
                let mut config = Self::defaults();
                config.expand(home);
                config
            }
            Err(e) => return Err(e.into()),
        };
        config.apply_host(&short_hostname());
        if let Some(name) = profile {
            config.apply_profile(name)?;
        }
        Ok(config)
    }

    fn expand(&mut self, home: &Path) {
        let backup = &mut self.backup;
        backup.backup_dir = expand_home(&backup.backup_dir, home);
        if let Some(recipients) = backup.age_recipients.take() {
            backup.age_recipients = Some(expand_home(&recipients, home));
        }
        backup.age_identity_files = backup
            .age_identity_files
            .iter()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| expand_home(p, home))
            .collect();
        if backup.gpg_recipient.as_deref() == Some("") {
            backup.gpg_recipient = None;
        }
    }

    /// Applies the `[host.<hostname>]` section when present.
    pub fn apply_host(&mut self, hostname: &str) {
        let Some(host) = self.hosts.get(hostname).cloned() else {
            return;
        };
        debug!("applying host config for {hostname}");
        self.items.extend(host.extra_items);
        self.sensitive.extend(host.extra_sensitive);
        self.excludes.patterns.extend(host.excludes.patterns);
    }

    /// Applies the `[profile.<name>]` section.
    ///
    /// # Errors
    /// Returns an error if no such profile exists.
    pub fn apply_profile(&mut self, name: &str) -> Result<()> {
        let profile = self
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Config(format!("profile not found: {name}")))?;
        if !profile.items.is_empty() {
            self.items = profile.items;
        }
        if !profile.sensitive.is_empty() {
            self.sensitive = profile.sensitive;
        }
        self.items.extend(profile.extra_items);
        self.sensitive.extend(profile.extra_sensitive);
        self.excludes.patterns.extend(profile.excludes.patterns);
        Ok(())
    }

    pub fn backup_items(&self) -> Vec<BackupItem> {
        self.items.iter().map(BackupItem::from).collect()
    }

    pub fn sensitive_items(&self) -> Vec<BackupItem> {
        self.sensitive.iter().map(BackupItem::from).collect()
    }

    pub fn exclude_set(&self) -> ExcludeSet {
        ExcludeSet::new(&self.excludes.patterns)
    }

    pub fn encryption_settings(&self) -> EncryptionSettings {
        EncryptionSettings {
            age_recipients: self.backup.age_recipients.clone(),
            age_identity_files: self.backup.age_identity_files.clone(),
            gpg_recipient: self.backup.gpg_recipient.clone(),
        }
    }

    /// Checks the settings a backup depends on.
    pub fn validate(&self) -> Result<()> {
        if self.backup.backup_dir.as_os_str().is_empty() {
            return Err(Error::Config("backup_dir is not set".to_string()));
        }
        Encryption::new(self.backup.encryption, &self.encryption_settings()).validate()
    }
}

/// Replaces a leading `~` or `$HOME` with `home`.
pub fn expand_home(path: &Path, home: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    for prefix in ["~", "$HOME"] {
        if s == prefix {
            return home.to_path_buf();
        }
        if let Some(rest) = s.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// The user's home directory.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(Error::NoHome)
}

/// Default location of the configuration file.
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_NAME))
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(not(target_os = "macos"))]
fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or(Error::NoHome)?;
    Ok(config_dir.join(PKG_NAME))
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(target_os = "macos")]
fn config_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".config").join(PKG_NAME))
}

/// Writes the default configuration to `path`.
///
/// Creates the parent directory if it does not exist.
///
/// # Errors
/// Returns an error if the file exists and `force` is false, or on I/O failure.
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(&Config::defaults())
        .map_err(|e| Error::Config(e.to_string()))?;
    fs::write(path, toml_str)?;
    Ok(())
}
