//! Reading archives back: extraction into the home directory, listing and
//! diffing against what is currently on disk.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use tar::{Archive, Entry, EntryType};
use tracing::{debug, info, warn};

use crate::category::CategoryTable;
use crate::safety::{is_safe_relative_path, is_within_base};
use crate::{Error, Result};

/// Archive contents larger than this are compared by size only.
const DIFF_CONTENT_LIMIT: u64 = 10 * 1024 * 1024;
/// Changed lines shown per file by [`line_diff`].
pub const MAX_DIFF_LINES: usize = 20;
/// Changed lines longer than this many characters are cut.
pub const MAX_DIFF_LINE_LENGTH: usize = 100;

/// Byte ceilings enforced while extracting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_file: u64,
    pub max_total: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file: 1 << 30,
            max_total: 10 << 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Regular files and symlinks written, or that a dry run would write.
    pub count: usize,
    /// Entry names seen by a dry run.
    pub planned: Vec<String>,
}

/// Result of comparing an archive with the home directory.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
    /// Archived content of modified files below the comparison limit.
    #[serde(skip)]
    pub archived: BTreeMap<String, Vec<u8>>,
}

pub struct Extractor {
    home: PathBuf,
    categories: CategoryTable,
    selected: Vec<String>,
    dry_run: bool,
    limits: Limits,
}

impl Extractor {
    pub fn new(home: impl Into<PathBuf>, categories: CategoryTable) -> Self {
        Self {
            home: home.into(),
            categories,
            selected: Vec::new(),
            dry_run: false,
            limits: Limits::default(),
        }
    }

    /// Restricts extraction to the named categories. Empty means everything.
    pub fn select(mut self, categories: &[String]) -> Self {
        self.selected = categories.to_vec();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Whether an entry name passes the category filter.
    pub fn wants(&self, name: &str) -> bool {
        self.selected.is_empty() || self.categories.matches(name, &self.selected)
    }

    /// Extracts a gzip-compressed tar stream into the home directory.
    ///
    /// Unsafe entries are skipped with a warning. Breaching either quota
    /// aborts immediately; files already written stay on disk.
    pub fn extract<R: Read>(&self, source: R) -> Result<ExtractReport> {
        let mut archive = Archive::new(GzDecoder::new(source));
        let mut report = ExtractReport::default();
        let mut total: u64 = 0;

        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry_name(&entry);

            if let Err(e) = check_name(&name) {
                warn!("skipping entry: {e}");
                continue;
            }
            if !self.wants(&name) {
                continue;
            }
            let target = match self.resolve(&name) {
                Ok(target) => target,
                Err(e) => {
                    warn!("skipping entry: {e}");
                    continue;
                }
            };

            if self.dry_run {
                info!("would restore {name}");
                report.planned.push(name);
                report.count += 1;
                continue;
            }

            let entry_type = entry.header().entry_type();
            let size = entry.size();
            if total.saturating_add(size) > self.limits.max_total {
                return Err(Error::QuotaExceeded {
                    what: "total extracted size".to_string(),
                    limit: self.limits.max_total,
                });
            }
            if entry_type == EntryType::Regular && size > self.limits.max_file {
                return Err(Error::QuotaExceeded {
                    what: format!("file {name}"),
                    limit: self.limits.max_file,
                });
            }

            if let Some(parent) = target.parent() {
                if let Err(e) = create_dirs(parent, 0o755) {
                    warn!("failed to create directory for {name}: {e}");
                    continue;
                }
            }

            match entry_type {
                EntryType::Directory => {
                    let mode = entry.header().mode().unwrap_or(0o755) & 0o777;
                    if let Err(e) = create_dirs(&target, mode) {
                        warn!("failed to create directory {name}: {e}");
                    }
                }
                EntryType::Regular => {
                    let mode = entry.header().mode().unwrap_or(0o644) & 0o777;
                    match write_file(&mut entry, &target, mode, self.limits.max_file) {
                        Ok(written) => {
                            debug!("restored {name}");
                            total += written;
                            report.count += 1;
                        }
                        Err(WriteError::TooLarge) => {
                            let _ = fs::remove_file(&target);
                            return Err(Error::QuotaExceeded {
                                what: format!("file {name}"),
                                limit: self.limits.max_file,
                            });
                        }
                        Err(WriteError::Io(e)) => warn!("failed to extract {name}: {e}"),
                    }
                }
                EntryType::Symlink => {
                    if self.restore_symlink(&entry, &name, &target) {
                        report.count += 1;
                    }
                }
                other => debug!("ignoring {name}: unsupported entry type {other:?}"),
            }
        }

        Ok(report)
    }

    /// Home path for an entry, refused when it resolves outside home.
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let target = self.home.join(name);
        if is_within_base(&target, &self.home) {
            Ok(target)
        } else {
            Err(Error::UnsafePath(format!("{name} (escapes home)")))
        }
    }

    /// A link target must be relative, free of `..` and stay inside home
    /// when resolved from the link's directory.
    fn check_link(&self, name: &str, link: &str, target: &Path) -> Result<()> {
        if link.is_empty() || !is_safe_relative_path(link) {
            return Err(Error::UnsafePath(format!("{name} -> {link:?}")));
        }
        let dir = target.parent().unwrap_or(&self.home);
        if !is_within_base(&dir.join(link), &self.home) {
            return Err(Error::UnsafePath(format!("{name} -> {link} (escapes home)")));
        }
        Ok(())
    }

    fn restore_symlink<R: Read>(&self, entry: &Entry<'_, R>, name: &str, target: &Path) -> bool {
        let link = entry
            .link_name_bytes()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        if let Err(e) = self.check_link(name, &link, target) {
            warn!("skipping symlink: {e}");
            return false;
        }

        if let Err(e) = fs::remove_file(target) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("failed to remove existing file for symlink {name}: {e}");
            }
        }
        match make_symlink(&link, target) {
            Ok(()) => {
                debug!("restored {name} -> {link}");
                true
            }
            Err(e) => {
                warn!("failed to create symlink {name}: {e}");
                false
            }
        }
    }
}

enum WriteError {
    TooLarge,
    Io(io::Error),
}

impl From<io::Error> for WriteError {
    fn from(e: io::Error) -> Self {
        WriteError::Io(e)
    }
}

/// Copies at most `max` bytes into `path` and fails if the entry holds more.
fn write_file<R: Read>(
    reader: &mut R,
    path: &Path,
    mode: u32,
    max: u64,
) -> std::result::Result<u64, WriteError> {
    // never write through a symlink planted at the target
    if fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(path)?;
    }

    let mut file = open_for_write(path, mode)?;
    let written = io::copy(&mut reader.by_ref().take(max), &mut file)?;
    if written == max {
        let mut extra = [0u8; 1];
        if reader.read(&mut extra)? > 0 {
            return Err(WriteError::TooLarge);
        }
    }
    drop(file);
    set_mode(path, mode)?;
    Ok(written)
}

#[cfg(unix)]
fn open_for_write(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn open_for_write(path: &Path, _mode: u32) -> io::Result<File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}

#[cfg(unix)]
fn create_dirs(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(mode).create(path)
}

#[cfg(not(unix))]
fn create_dirs(path: &Path, _mode: u32) -> io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(unix)]
fn make_symlink(link: &str, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn make_symlink(_link: &str, _target: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

fn check_name(name: &str) -> Result<()> {
    if is_safe_relative_path(name) {
        Ok(())
    } else {
        Err(Error::UnsafePath(name.to_string()))
    }
}

fn entry_name<R: Read>(entry: &Entry<'_, R>) -> String {
    String::from_utf8_lossy(&entry.path_bytes()).into_owned()
}

/// Lists every entry name with its size.
pub fn list_contents<R: Read>(source: R) -> Result<Vec<(String, u64)>> {
    let mut archive = Archive::new(GzDecoder::new(source));
    let mut contents = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        contents.push((entry_name(&entry), entry.size()));
    }
    Ok(contents)
}

/// Compares the regular files of an archive with the files under `home`.
pub fn diff<R: Read>(home: &Path, source: R) -> Result<DiffSummary> {
    let mut archive = Archive::new(GzDecoder::new(source));
    let mut summary = DiffSummary::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        let name = entry_name(&entry);
        if !is_safe_relative_path(&name) {
            debug!("ignoring unsafe path in diff: {name:?}");
            continue;
        }

        let current = home.join(&name);
        let meta = match fs::metadata(&current) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                summary.new.push(name);
                continue;
            }
            Err(_) => {
                summary.modified.push(name);
                continue;
            }
        };

        let size = entry.size();
        if size >= DIFF_CONTENT_LIMIT {
            if meta.len() != size {
                summary.modified.push(name);
            } else {
                summary.unchanged.push(name);
            }
            continue;
        }

        let mut archived = Vec::with_capacity(size as usize);
        entry.read_to_end(&mut archived)?;
        let modified = match fs::read(&current) {
            Ok(on_disk) => on_disk != archived,
            Err(_) => true,
        };
        if modified {
            summary.archived.insert(name.clone(), archived);
            summary.modified.push(name);
        } else {
            summary.unchanged.push(name);
        }
    }

    Ok(summary)
}

/// Lines that restoring `archived` over `current` would remove (`- `) and
/// add (`+ `).
///
/// At most [`MAX_DIFF_LINES`] changes are returned, followed by a
/// `... and N more changes` line when there are more.
pub fn line_diff(current: &[u8], archived: &[u8]) -> Vec<String> {
    let current = String::from_utf8_lossy(current);
    let archived = String::from_utf8_lossy(archived);
    let diff = TextDiff::from_lines(&*current, &*archived);

    let mut lines: Vec<String> = diff
        .iter_all_changes()
        .filter_map(|change| {
            let sign = match change.tag() {
                ChangeTag::Delete => '-',
                ChangeTag::Insert => '+',
                ChangeTag::Equal => return None,
            };
            let text = change.value().trim_end_matches(['\n', '\r']);
            Some(format!("{sign} {}", shorten(text)))
        })
        .collect();

    let total = lines.len();
    if total > MAX_DIFF_LINES {
        lines.truncate(MAX_DIFF_LINES);
        lines.push(format!("... and {} more changes", total - MAX_DIFF_LINES));
    }
    lines
}

fn shorten(text: &str) -> String {
    match text.char_indices().nth(MAX_DIFF_LINE_LENGTH) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::{Builder, Header};

    enum Item<'a> {
        File(&'a str, &'a [u8], u32),
        Dir(&'a str, u32),
        Link(&'a str, &'a str),
        /// Name written raw into the header, bypassing tar's own checks.
        Raw(&'a str, &'a [u8]),
    }

    fn build(items: &[Item<'_>]) -> Vec<u8> {
        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for item in items {
            match item {
                Item::File(name, data, mode) => {
                    let mut h = Header::new_gnu();
                    h.set_entry_type(EntryType::Regular);
                    h.set_mode(*mode);
                    h.set_size(data.len() as u64);
                    builder.append_data(&mut h, name, *data).unwrap();
                }
                Item::Dir(name, mode) => {
                    let mut h = Header::new_gnu();
                    h.set_entry_type(EntryType::Directory);
                    h.set_mode(*mode);
                    h.set_size(0);
                    builder.append_data(&mut h, name, io::empty()).unwrap();
                }
                Item::Link(name, target) => {
                    let mut h = Header::new_gnu();
                    h.set_entry_type(EntryType::Symlink);
                    h.set_mode(0o777);
                    h.set_size(0);
                    builder.append_link(&mut h, name, target).unwrap();
                }
                Item::Raw(name, data) => {
                    let mut h = Header::new_gnu();
                    h.set_entry_type(EntryType::Regular);
                    h.set_mode(0o644);
                    h.set_size(data.len() as u64);
                    let raw = &mut h.as_old_mut().name;
                    raw[..name.len()].copy_from_slice(name.as_bytes());
                    h.set_cksum();
                    builder.append(&h, *data).unwrap();
                }
            }
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn extractor(home: &Path) -> Extractor {
        Extractor::new(home, CategoryTable::builtin())
    }

    #[test]
    fn test_extract_files_and_dirs() {
        let home = tempfile::tempdir().unwrap();
        let archive = build(&[
            Item::Dir(".config/nvim/", 0o755),
            Item::File(".config/nvim/init.lua", b"set nu", 0o644),
            Item::File(".zshrc", b"export A=1", 0o600),
        ]);

        let report = extractor(home.path()).extract(&archive[..]).unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(
            fs::read(home.path().join(".config/nvim/init.lua")).unwrap(),
            b"set nu"
        );
        assert_eq!(fs::read(home.path().join(".zshrc")).unwrap(), b"export A=1");
    }

    #[cfg(unix)]
    #[test]
    fn test_modes_are_applied() {
        use std::os::unix::fs::PermissionsExt;

        let home = tempfile::tempdir().unwrap();
        fs::write(home.path().join("run.sh"), "old").unwrap();
        let archive = build(&[
            Item::File("run.sh", b"#!/bin/sh", 0o755),
            Item::File(".netrc", b"machine x", 0o4600),
        ]);

        extractor(home.path()).extract(&archive[..]).unwrap();
        let mode = |p: &str| fs::metadata(home.path().join(p)).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode("run.sh"), 0o755);
        assert_eq!(mode(".netrc"), 0o600);
    }

    #[test]
    fn test_traversal_entry_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let home = root.path().join("home");
        fs::create_dir_all(&home).unwrap();
        let archive = build(&[
            Item::Raw("../../etc/passwd", b"root::0:0"),
            Item::Raw("/abs/file", b"x"),
            Item::File(".bashrc", b"ok", 0o644),
        ]);

        let report = extractor(&home).extract(&archive[..]).unwrap();
        assert_eq!(report.count, 1);
        assert_eq!(fs::read(home.join(".bashrc")).unwrap(), b"ok");
        assert!(!root.path().join("etc/passwd").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_validated() {
        let home = tempfile::tempdir().unwrap();
        let archive = build(&[
            Item::File(".config/real.toml", b"x", 0o644),
            Item::Link(".config/alias.toml", "real.toml"),
            Item::Link(".evil", "../../etc/shadow"),
            Item::Link(".abs", "/etc/shadow"),
        ]);

        let report = extractor(home.path()).extract(&archive[..]).unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(
            fs::read_link(home.path().join(".config/alias.toml")).unwrap(),
            PathBuf::from("real.toml")
        );
        assert!(fs::symlink_metadata(home.path().join(".evil")).is_err());
        assert!(fs::symlink_metadata(home.path().join(".abs")).is_err());
    }

    #[test]
    fn test_rejected_names_and_links_are_unsafe_path_errors() {
        let home = tempfile::tempdir().unwrap();
        let ex = extractor(home.path());

        assert!(check_name(".config/ok").is_ok());
        let err = check_name("../x").unwrap_err();
        assert!(matches!(&err, Error::UnsafePath(name) if name == "../x"));
        assert_eq!(err.to_string(), "unsafe path in archive: ../x");

        let target = home.path().join(".config/alias");
        assert!(ex.check_link(".config/alias", "real", &target).is_ok());
        for link in ["", "/etc/shadow", "../../etc/shadow"] {
            let err = ex.check_link(".config/alias", link, &target).unwrap_err();
            assert!(matches!(err, Error::UnsafePath(_)), "{link}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_symlink_is_replaced_not_followed() {
        let home = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let victim = outside.path().join("victim");
        fs::write(&victim, "original").unwrap();
        std::os::unix::fs::symlink(&victim, home.path().join(".zshrc")).unwrap();

        let archive = build(&[Item::File(".zshrc", b"restored", 0o644)]);
        extractor(home.path()).extract(&archive[..]).unwrap();

        assert_eq!(fs::read(&victim).unwrap(), b"original");
        let meta = fs::symlink_metadata(home.path().join(".zshrc")).unwrap();
        assert!(meta.file_type().is_file());
        assert_eq!(fs::read(home.path().join(".zshrc")).unwrap(), b"restored");
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_under_symlinked_directory_is_skipped() {
        let home = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), home.path().join(".config")).unwrap();

        let archive = build(&[Item::File(".config/evil", b"x", 0o644)]);
        let report = extractor(home.path()).extract(&archive[..]).unwrap();

        assert_eq!(report.count, 0);
        assert!(!outside.path().join("evil").exists());
    }

    #[test]
    fn test_category_filter() {
        let home = tempfile::tempdir().unwrap();
        let archive = build(&[
            Item::File(".zshrc", b"z", 0o644),
            Item::File(".bashrc", b"b", 0o644),
            Item::File(".gitconfig", b"g", 0o644),
        ]);

        let report = extractor(home.path())
            .select(&["shell".to_string()])
            .extract(&archive[..])
            .unwrap();
        assert_eq!(report.count, 2);
        assert!(home.path().join(".zshrc").exists());
        assert!(home.path().join(".bashrc").exists());
        assert!(!home.path().join(".gitconfig").exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let home = tempfile::tempdir().unwrap();
        let archive = build(&[
            Item::File(".zshrc", b"z", 0o644),
            Item::Raw("../escape", b"x"),
        ]);

        let report = extractor(home.path())
            .dry_run(true)
            .extract(&archive[..])
            .unwrap();
        assert_eq!(report.count, 1);
        assert_eq!(report.planned, vec![".zshrc".to_string()]);
        assert!(!home.path().join(".zshrc").exists());
    }

    #[test]
    fn test_cumulative_quota_aborts_without_rollback() {
        let home = tempfile::tempdir().unwrap();
        let archive = build(&[
            Item::File("a", &[1u8; 60], 0o644),
            Item::File("b", &[2u8; 60], 0o644),
            Item::File("c", &[3u8; 10], 0o644),
        ]);

        let err = extractor(home.path())
            .limits(Limits {
                max_file: 100,
                max_total: 100,
            })
            .extract(&archive[..])
            .unwrap_err();

        assert!(matches!(err, Error::QuotaExceeded { limit: 100, .. }));
        assert!(err.to_string().starts_with("total extracted size exceeds limit"));
        assert!(home.path().join("a").exists());
        assert!(!home.path().join("b").exists());
        assert!(!home.path().join("c").exists());
    }

    #[test]
    fn test_per_file_quota_aborts() {
        let home = tempfile::tempdir().unwrap();
        let archive = build(&[
            Item::File("small", b"ok", 0o644),
            Item::File("huge", &[0u8; 64], 0o644),
        ]);

        let err = extractor(home.path())
            .limits(Limits {
                max_file: 32,
                max_total: 1 << 20,
            })
            .extract(&archive[..])
            .unwrap_err();

        assert!(matches!(err, Error::QuotaExceeded { limit: 32, .. }));
        assert!(home.path().join("small").exists());
        assert!(!home.path().join("huge").exists());
    }

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_file, 1024 * 1024 * 1024);
        assert_eq!(limits.max_total, 10 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_list_contents() {
        let archive = build(&[
            Item::File(".zshrc", b"12345", 0o644),
            Item::Link(".vimrc", ".config/nvim/init.vim"),
        ]);
        let contents = list_contents(&archive[..]).unwrap();
        assert_eq!(
            contents,
            vec![(".zshrc".to_string(), 5), (".vimrc".to_string(), 0)]
        );
    }

    #[test]
    fn test_diff_summary() {
        let home = tempfile::tempdir().unwrap();
        fs::write(home.path().join("same"), "same").unwrap();
        fs::write(home.path().join("resized"), "longer now").unwrap();
        fs::write(home.path().join("edited"), "abcd").unwrap();
        let archive = build(&[
            Item::File("same", b"same", 0o644),
            Item::File("resized", b"short", 0o644),
            Item::File("edited", b"wxyz", 0o644),
            Item::File("added", b"new", 0o644),
            Item::Dir("dir/", 0o755),
        ]);

        let summary = diff(home.path(), &archive[..]).unwrap();
        assert_eq!(summary.new, vec!["added".to_string()]);
        assert_eq!(
            summary.modified,
            vec!["resized".to_string(), "edited".to_string()]
        );
        assert_eq!(summary.unchanged, vec!["same".to_string()]);
        assert_eq!(summary.archived["edited"], b"wxyz");
        assert_eq!(summary.archived["resized"], b"short");
        assert!(!summary.archived.contains_key("same"));
    }

    #[test]
    fn test_line_diff_marks_removed_and_added_lines() {
        let lines = line_diff(b"alias ll='ls -l'\nexport A=1\n", b"alias ll='ls -l'\nexport A=2\n");
        assert_eq!(lines, vec!["- export A=1", "+ export A=2"]);
        assert!(line_diff(b"same\n", b"same\n").is_empty());
    }

    #[test]
    fn test_line_diff_limits_output() {
        let current: String = (0..30).map(|i| format!("old {i}\n")).collect();
        let lines = line_diff(current.as_bytes(), b"");
        assert_eq!(lines.len(), MAX_DIFF_LINES + 1);
        assert_eq!(lines[0], "- old 0");
        assert_eq!(lines[MAX_DIFF_LINES], "... and 10 more changes");

        let long = "x".repeat(150);
        let lines = line_diff(b"", long.as_bytes());
        assert_eq!(lines, vec![format!("+ {}...", "x".repeat(MAX_DIFF_LINE_LENGTH))]);
    }
}
