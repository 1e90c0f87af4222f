//! Named groups of path prefixes used for selective restore.

use std::collections::BTreeMap;

/// Path prefixes treated as sensitive when deciding how to store a safety backup.
pub const SENSITIVE_PREFIXES: &[&str] = &[
    ".ssh",
    ".gnupg",
    ".aws",
    ".config/gcloud",
    ".azure",
    ".kube",
    ".terraform",
    ".docker",
    ".pypirc",
];

/// Returns true when `path` starts with any sensitive prefix.
pub fn is_sensitive_path(path: &str) -> bool {
    SENSITIVE_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Immutable mapping from category name to path prefixes.
#[derive(Debug, Clone, Default)]
pub struct CategoryTable {
    categories: BTreeMap<String, Vec<String>>,
}

impl CategoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a category, replacing any existing prefixes under that name.
    pub fn with(mut self, name: &str, prefixes: &[&str]) -> Self {
        self.categories.insert(
            name.to_lowercase(),
            prefixes.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    /// The built-in categories.
    pub fn builtin() -> Self {
        Self::new()
            .with(
                "shell",
                &[
                    ".zshrc",
                    ".bashrc",
                    ".profile",
                    ".zprofile",
                    ".bash_profile",
                    ".zshenv",
                    ".config/fish",
                    ".oh-my-zsh",
                    ".p10k.zsh",
                ],
            )
            .with("git", &[".gitconfig", ".gitignore_global", ".config/git"])
            .with(
                "editor",
                &[
                    ".vimrc",
                    ".config/nvim",
                    ".config/helix",
                    ".config/zed",
                    ".emacs",
                    ".emacs.d",
                    ".config/Code",
                ],
            )
            .with("ssh", &[".ssh/"])
            .with("gpg", &[".gnupg/"])
            .with(
                "python",
                &[".config/pip", ".config/ruff", ".config/mypy", ".jupyter", ".condarc"],
            )
            .with("node", &[".npmrc", ".yarnrc", ".config/yarn", ".bunfig.toml"])
            .with("rust", &[".cargo/", ".rustup/settings.toml"])
            .with("go", &[".config/go/"])
            .with(
                "cloud",
                &[".aws/", ".config/gcloud", ".azure/", ".s3cfg", ".yandex"],
            )
            .with("docker", &[".docker/config.json", ".config/podman"])
            .with(
                "terminal",
                &[
                    ".tmux.conf",
                    ".config/wezterm",
                    ".config/alacritty",
                    ".config/kitty",
                    ".config/starship.toml",
                    ".config/zellij",
                ],
            )
            .with(
                "desktop",
                &[
                    "Library/Application Support",
                    "Library/Preferences",
                    ".local/share",
                    ".config",
                ],
            )
            .with("ai", &[".claude", ".claude.json", ".codex", ".ai"])
    }

    /// Category names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.categories.contains_key(&name.to_lowercase())
    }

    /// Returns true when `path` falls under any of the `selected` categories.
    ///
    /// Unknown category names contribute nothing. An empty selection matches
    /// nothing, so callers treat "no categories" as "no filter" themselves.
    pub fn matches<S: AsRef<str>>(&self, path: &str, selected: &[S]) -> bool {
        let path = path.strip_prefix("./").unwrap_or(path);
        let path = path.strip_prefix('/').unwrap_or(path);

        selected
            .iter()
            .filter_map(|name| self.categories.get(&name.as_ref().to_lowercase()))
            .flatten()
            .any(|prefix| path.starts_with(prefix.strip_prefix("./").unwrap_or(prefix)))
    }
}
