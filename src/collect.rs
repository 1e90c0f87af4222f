//! Walks the configured items under the home directory and produces the list
//! of files to archive.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::exclude::ExcludeSet;
use crate::safety::is_safe_relative_path;
use crate::{Error, Result};

/// A configured path relative to the home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupItem {
    path: String,
}

impl BackupItem {
    /// Normalizes `~/`, `./` and trailing `/` away.
    pub fn new(raw: &str) -> Self {
        let mut path = raw.trim();
        for prefix in ["~/", "./"] {
            while let Some(rest) = path.strip_prefix(prefix) {
                path = rest;
            }
        }
        Self {
            path: path.trim_end_matches('/').to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }
}

impl From<&str> for BackupItem {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<&String> for BackupItem {
    fn from(raw: &String) -> Self {
        Self::new(raw)
    }
}

/// Kind of filesystem object a [`FileEntry`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Symlink,
}

/// One file or symlink selected for the archive.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub full_path: PathBuf,
    /// Home-relative name with forward slashes.
    pub rel_path: String,
    pub kind: FileKind,
    pub size: u64,
    pub modified: SystemTime,
    pub sensitive: bool,
}

/// Counters for one collection pass.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub files_backed_up: usize,
    pub files_skipped: usize,
    pub files_excluded: usize,
    pub sensitive_files: usize,
    pub total_size: u64,
}

pub struct Collector {
    home: PathBuf,
    excludes: ExcludeSet,
}

impl Collector {
    pub fn new(home: impl Into<PathBuf>, excludes: ExcludeSet) -> Self {
        Self {
            home: home.into(),
            excludes,
        }
    }

    /// Collects every item, and the sensitive items when `include_sensitive`.
    ///
    /// Per-entry failures are logged and counted as skipped; the pass itself
    /// never fails.
    pub fn collect(
        &self,
        items: &[BackupItem],
        sensitive: &[BackupItem],
        include_sensitive: bool,
    ) -> (Vec<FileEntry>, CollectionStats) {
        let mut pass = Pass::default();

        for item in items {
            self.collect_item(item, false, &mut pass);
        }
        if include_sensitive {
            for item in sensitive {
                self.collect_item(item, true, &mut pass);
            }
        }

        let Pass {
            files, mut stats, ..
        } = pass;
        stats.files_backed_up = files.len();
        stats.total_size = files.iter().map(|f| f.size).sum();
        (files, stats)
    }

    fn collect_item(&self, item: &BackupItem, sensitive: bool, pass: &mut Pass) {
        let rel = item.as_str();
        if rel.is_empty() || !is_safe_relative_path(rel) {
            warn!("skipping unsafe item: {rel:?}");
            pass.stats.files_skipped += 1;
            return;
        }

        let root = self.home.join(rel);
        let meta = match fs::symlink_metadata(&root) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("item not found: {}", root.display());
                if !sensitive {
                    pass.stats.files_skipped += 1;
                }
                return;
            }
            Err(source) => {
                let err = Error::Collection { path: root, source };
                warn!("{err}");
                pass.stats.files_skipped += 1;
                return;
            }
        };

        if !meta.is_dir() {
            if self.excludes.is_excluded(rel) {
                pass.stats.files_excluded += 1;
                return;
            }
            self.record(&root, rel.to_string(), sensitive, pass);
            return;
        }

        let mut it = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        while let Some(next) = it.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("walk error under {}: {e}", root.display());
                    pass.stats.files_skipped += 1;
                    continue;
                }
            };
            let Some(rel) = self.relative(entry.path()) else {
                pass.stats.files_skipped += 1;
                if entry.file_type().is_dir() {
                    it.skip_current_dir();
                }
                continue;
            };
            if self.excludes.is_excluded(&rel) {
                debug!("excluded: {rel}");
                pass.stats.files_excluded += 1;
                if entry.file_type().is_dir() {
                    it.skip_current_dir();
                }
                continue;
            }
            if entry.file_type().is_dir() {
                continue;
            }
            self.record(entry.path(), rel, sensitive, pass);
        }
    }

    fn record(&self, path: &Path, rel: String, sensitive: bool, pass: &mut Pass) {
        if !pass.seen.insert(rel.clone()) {
            return;
        }
        match describe(path, rel, sensitive) {
            Ok(Some(entry)) => {
                debug!("collected: {}", entry.rel_path);
                if sensitive {
                    pass.stats.sensitive_files += 1;
                }
                pass.files.push(entry);
            }
            Ok(None) => {
                debug!("skipping special file: {}", path.display());
                pass.stats.files_skipped += 1;
            }
            Err(err) => {
                warn!("{err}");
                pass.stats.files_skipped += 1;
            }
        }
    }

    /// Home-relative, `/`-joined name of a walked path. Names that are not
    /// valid UTF-8 cannot be stored faithfully and are refused.
    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.home).ok()?;
        let Some(rel_str) = rel.to_str() else {
            warn!("skipping non-UTF-8 name: {}", path.display());
            return None;
        };
        let parts = Path::new(rel_str)
            .components()
            .map(|c| match c {
                Component::Normal(part) => part.to_str().map(str::to_string),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        let rel = parts.join("/");
        is_safe_relative_path(&rel).then_some(rel)
    }
}

#[derive(Default)]
struct Pass {
    files: Vec<FileEntry>,
    stats: CollectionStats,
    seen: HashSet<String>,
}

/// Describes a regular file or symlink; `None` for anything else.
pub(crate) fn describe(path: &Path, rel_path: String, sensitive: bool) -> Result<Option<FileEntry>> {
    let meta = fs::symlink_metadata(path).map_err(|source| Error::Collection {
        path: path.to_path_buf(),
        source,
    })?;
    let file_type = meta.file_type();
    let (kind, size) = if file_type.is_symlink() {
        (FileKind::Symlink, 0)
    } else if file_type.is_file() {
        (FileKind::File, meta.len())
    } else {
        return Ok(None);
    };

    Ok(Some(FileEntry {
        full_path: path.to_path_buf(),
        rel_path,
        kind,
        size,
        modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        sensitive,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(home: &Path, rel: &str, content: &str) {
        let path = home.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn items(list: &[&str]) -> Vec<BackupItem> {
        list.iter().map(|s| BackupItem::new(s)).collect()
    }

    fn names(files: &[FileEntry]) -> Vec<&str> {
        files.iter().map(|f| f.rel_path.as_str()).collect()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let home = tempfile::tempdir().unwrap();
        write(home.path(), ".config/app/ok.toml", "a");
        let bad = home.path().join(".config/app").join(OsStr::from_bytes(b"bad\xff.toml"));
        fs::write(&bad, "b").unwrap();
        let bad_dir = home.path().join(".config").join(OsStr::from_bytes(b"dir\xfe"));
        fs::create_dir(&bad_dir).unwrap();
        fs::write(bad_dir.join("inner"), "c").unwrap();

        let collector = Collector::new(home.path(), ExcludeSet::new::<&str>(&[]));
        let (files, stats) = collector.collect(&items(&[".config"]), &[], false);

        assert_eq!(names(&files), vec![".config/app/ok.toml"]);
        assert_eq!(stats.files_skipped, 2);
    }

    #[test]
    fn test_item_normalization() {
        assert_eq!(BackupItem::new("~/.zshrc").as_str(), ".zshrc");
        assert_eq!(BackupItem::new("./.config/nvim/").as_str(), ".config/nvim");
        assert_eq!(BackupItem::new(".ssh").as_str(), ".ssh");
    }

    #[test]
    fn test_single_file() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), ".zshrc", "export EDITOR=vim\n");

        let collector = Collector::new(home.path(), ExcludeSet::new::<&str>(&[]));
        let (files, stats) = collector.collect(&items(&[".zshrc"]), &[], false);

        assert_eq!(names(&files), vec![".zshrc"]);
        assert_eq!(files[0].kind, FileKind::File);
        assert_eq!(files[0].size, 18);
        assert_eq!(stats.files_backed_up, 1);
        assert_eq!(stats.total_size, 18);
    }

    #[test]
    fn test_directory_walk_is_sorted_and_excludes() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), ".config/app/config.json", "{}");
        write(home.path(), ".config/app/app.log", "log");
        write(home.path(), ".config/app/b.toml", "b");

        let collector = Collector::new(home.path(), ExcludeSet::new(&["*.log"]));
        let (files, stats) = collector.collect(&items(&[".config/app"]), &[], false);

        assert_eq!(
            names(&files),
            vec![".config/app/b.toml", ".config/app/config.json"]
        );
        assert_eq!(stats.files_excluded, 1);
        assert_eq!(stats.files_backed_up, 2);
    }

    #[test]
    fn test_excluded_directory_is_not_descended() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), ".oh-my-zsh/.git/objects/aa", "x");
        write(home.path(), ".oh-my-zsh/.git/objects/bb", "y");
        write(home.path(), ".oh-my-zsh/oh-my-zsh.sh", "z");

        let collector = Collector::new(home.path(), ExcludeSet::new(&[".git"]));
        let (files, stats) = collector.collect(&items(&[".oh-my-zsh"]), &[], false);

        assert_eq!(names(&files), vec![".oh-my-zsh/oh-my-zsh.sh"]);
        assert_eq!(stats.files_excluded, 1);
    }

    #[test]
    fn test_missing_and_unsafe_items_are_skipped() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), ".zshrc", "x");

        let collector = Collector::new(home.path(), ExcludeSet::new::<&str>(&[]));
        let (files, stats) =
            collector.collect(&items(&[".zshrc", ".missing", "../escape"]), &[], false);

        assert_eq!(names(&files), vec![".zshrc"]);
        assert_eq!(stats.files_skipped, 2);
    }

    #[test]
    fn test_sensitive_items_require_opt_in() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), ".zshrc", "x");
        write(home.path(), ".ssh/id_ed25519", "secret");

        let collector = Collector::new(home.path(), ExcludeSet::new::<&str>(&[]));
        let regular = items(&[".zshrc"]);
        let sensitive = items(&[".ssh", ".aws"]);

        let (files, stats) = collector.collect(&regular, &sensitive, false);
        assert_eq!(names(&files), vec![".zshrc"]);
        assert_eq!(stats.sensitive_files, 0);

        let (files, stats) = collector.collect(&regular, &sensitive, true);
        assert_eq!(names(&files), vec![".zshrc", ".ssh/id_ed25519"]);
        assert!(files[1].sensitive);
        assert_eq!(stats.sensitive_files, 1);
        assert_eq!(stats.files_skipped, 0);
        assert_eq!(stats.total_size, 7);
    }

    #[test]
    fn test_overlapping_items_are_collected_once() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), ".config/nvim/init.lua", "x");

        let collector = Collector::new(home.path(), ExcludeSet::new::<&str>(&[]));
        let (files, _) =
            collector.collect(&items(&[".config/nvim", ".config/nvim/init.lua"]), &[], false);
        assert_eq!(names(&files), vec![".config/nvim/init.lua"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_recorded_not_followed() {
        let home = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        write(outside.path(), "secret/file", "data");
        write(home.path(), ".config/real.toml", "x");
        std::os::unix::fs::symlink(outside.path().join("secret"), home.path().join(".config/linked"))
            .unwrap();
        std::os::unix::fs::symlink("real.toml", home.path().join(".config/alias.toml")).unwrap();

        let collector = Collector::new(home.path(), ExcludeSet::new::<&str>(&[]));
        let (files, _) = collector.collect(&items(&[".config"]), &[], false);

        assert_eq!(
            names(&files),
            vec![".config/alias.toml", ".config/linked", ".config/real.toml"]
        );
        assert_eq!(files[0].kind, FileKind::Symlink);
        assert_eq!(files[1].kind, FileKind::Symlink);
        assert_eq!(files[1].size, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_special_files_are_skipped() {
        use std::os::unix::net::UnixListener;

        let home = tempfile::tempdir().unwrap();
        write(home.path(), ".gnupg/pubring.kbx", "k");
        let _listener = UnixListener::bind(home.path().join(".gnupg/S.gpg-agent")).unwrap();

        let collector = Collector::new(home.path(), ExcludeSet::new::<&str>(&[]));
        let (files, stats) = collector.collect(&items(&[".gnupg"]), &[], false);

        assert_eq!(names(&files), vec![".gnupg/pubring.kbx"]);
        assert_eq!(stats.files_skipped, 1);
    }
}
