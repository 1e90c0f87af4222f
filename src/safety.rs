//! Validation of untrusted paths read from archives.
//!
//! Both checks are pure with respect to process state and must pass for every
//! entry name and every symlink target before anything touches the disk.

use std::env;
use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

use path_clean::PathClean;

/// Returns true when `path` is a harmless relative path.
///
/// Rejects NUL bytes, absolute paths, a leading `/` or `~`, and any `..`
/// component. The empty string and `.` are accepted as no-op entries.
pub fn is_safe_relative_path(path: &str) -> bool {
    if path.is_empty() {
        return true;
    }
    if path.contains('\0') {
        return false;
    }
    if path.starts_with('/') || path.starts_with('~') || Path::new(path).has_root() {
        return false;
    }
    if Path::new(path).is_absolute() {
        return false;
    }
    if path.split('/').any(|c| c == "..") || path.split(MAIN_SEPARATOR).any(|c| c == "..") {
        return false;
    }
    let cleaned = Path::new(path).clean();
    !matches!(cleaned.components().next(), Some(Component::ParentDir))
}

/// Returns true when `target` resolves to `base` or somewhere beneath it.
///
/// Both paths are made absolute and cleaned. Symlinks in the ancestors of
/// `target` that already exist on disk are resolved, so a safe-looking name
/// under a symlinked directory cannot escape `base`. The final component is
/// never followed.
pub fn is_within_base(target: &Path, base: &Path) -> bool {
    let Some(base) = resolve(base, true) else {
        return false;
    };
    let Some(target) = resolve(target, false) else {
        return false;
    };
    target.starts_with(&base)
}

fn absolute(path: &Path) -> Option<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().ok()?.join(path)
    };
    Some(path.clean())
}

/// Cleans `path` and canonicalizes its deepest existing ancestor.
fn resolve(path: &Path, include_last: bool) -> Option<PathBuf> {
    let path = absolute(path)?;
    let (dir, last) = if include_last {
        (path.as_path(), None)
    } else {
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => (parent, Some(name)),
            _ => (path.as_path(), None),
        }
    };

    let mut existing = dir;
    let mut rest = Vec::new();
    let resolved = loop {
        match existing.canonicalize() {
            Ok(canonical) => break canonical,
            Err(_) => {
                rest.push(existing.file_name()?);
                existing = existing.parent()?;
            }
        }
    };

    let mut out = resolved;
    for component in rest.iter().rev() {
        out.push(component);
    }
    if let Some(name) = last {
        out.push(name);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_safe_relative_paths() {
        for path in [
            "",
            ".",
            ".zshrc",
            ".config/nvim/init.lua",
            "dir/./file",
            "a..b",
            "..hidden",
            "dir/..file",
        ] {
            assert!(is_safe_relative_path(path), "{path:?} should be safe");
        }
    }

    #[test]
    fn test_unsafe_relative_paths() {
        for path in [
            "..",
            "../etc/passwd",
            "../../etc/passwd",
            "a/../../b",
            "a/b/..",
            "a/../b",
            "/etc/passwd",
            "/",
            "~/.ssh/id_rsa",
            "~root",
            "file\0.txt",
            "\0",
        ] {
            assert!(!is_safe_relative_path(path), "{path:?} should be unsafe");
        }
    }

    #[test]
    fn test_within_base_lexical() {
        let base = tempfile::tempdir().unwrap();
        let base = base.path();

        assert!(is_within_base(base, base));
        assert!(is_within_base(&base.join(".zshrc"), base));
        assert!(is_within_base(&base.join("new/dir/file"), base));
        assert!(is_within_base(&base.join("a/../b"), base));
        assert!(!is_within_base(&base.join("../outside"), base));
        assert!(!is_within_base(Path::new("/etc/passwd"), base));
    }

    #[test]
    fn test_within_base_rejects_sibling_with_common_prefix() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("home");
        let sibling = root.path().join("home-evil");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(&sibling).unwrap();

        assert!(!is_within_base(&sibling.join("file"), &base));
    }

    #[cfg(unix)]
    #[test]
    fn test_within_base_follows_symlinked_ancestor() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("home");
        let outside = root.path().join("outside");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, base.join("escape")).unwrap();

        assert!(is_safe_relative_path("escape/file"));
        assert!(!is_within_base(&base.join("escape/file"), &base));
        assert!(!is_within_base(&base.join("escape/deeper/file"), &base));
    }

    #[cfg(unix)]
    #[test]
    fn test_within_base_does_not_follow_final_component() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("home");
        fs::create_dir_all(&base).unwrap();
        std::os::unix::fs::symlink("/etc/passwd", base.join(".link")).unwrap();

        assert!(is_within_base(&base.join(".link"), &base));
    }

    #[cfg(unix)]
    #[test]
    fn test_within_base_with_symlinked_base() {
        let root = tempfile::tempdir().unwrap();
        let real = root.path().join("real-home");
        fs::create_dir_all(&real).unwrap();
        let alias = root.path().join("home");
        std::os::unix::fs::symlink(&real, &alias).unwrap();

        assert!(is_within_base(&alias.join(".zshrc"), &alias));
    }
}
