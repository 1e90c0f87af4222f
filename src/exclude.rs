//! Exclusion patterns applied while collecting files.
//!
//! A pattern excludes a path when any of these hold:
//! - it globs the base name (`*.log` excludes `logs/debug.log`)
//! - it globs the whole relative path (`.gradle/caches`)
//! - it equals the base name (`.git` excludes `.git` but not `.gitconfig`)
//! - it is a whole path component at the start, end or interior of the path
//!
//! The component rule is deliberately broad: `tests` excludes every directory
//! named `tests` at any depth.

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

struct Pattern {
    raw: String,
    glob: Option<GlobMatcher>,
}

/// A compiled set of exclusion patterns.
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| {
                let raw = p.as_ref().to_string();
                let glob = GlobBuilder::new(&raw)
                    .literal_separator(true)
                    .backslash_escape(true)
                    .build()
                    .map(|g| g.compile_matcher())
                    .map_err(|e| debug!("ignoring glob rules for pattern {raw:?}: {e}"))
                    .ok();
                Pattern { raw, glob }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns true when `rel_path` (forward slashes) matches any pattern.
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        let name = base_name(rel_path);
        self.patterns.iter().any(|p| p.matches(rel_path, name))
    }
}

impl Pattern {
    fn matches(&self, path: &str, name: &str) -> bool {
        let raw = self.raw.as_str();
        if let Some(glob) = &self.glob {
            if glob.is_match(name) || glob.is_match(path) {
                return true;
            }
        }
        if name == raw {
            return true;
        }
        if raw.is_empty() {
            return false;
        }
        path.strip_prefix(raw).is_some_and(|rest| rest.starts_with('/'))
            || path.strip_suffix(raw).is_some_and(|rest| rest.ends_with('/'))
            || path.contains(&format!("/{raw}/"))
    }
}

fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// One-shot form of [`ExcludeSet::is_excluded`].
pub fn is_excluded<S: AsRef<str>>(rel_path: &str, patterns: &[S]) -> bool {
    ExcludeSet::new(patterns).is_excluded(rel_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename_glob() {
        assert!(is_excluded("debug.log", &["*.log"]));
        assert!(is_excluded(".config/app/logs/debug.log", &["*.log"]));
        assert!(!is_excluded(".config/app/logs/debug.txt", &["*.log"]));
        assert!(is_excluded(".vim/.swp", &[".swp"]));
        assert!(is_excluded("a/b/file.pyc", &["*.pyc"]));
        assert!(is_excluded("notes.txt~", &["*~"]));
        assert!(is_excluded(".emacs.d/#scratch#", &["#*#"]));
    }

    #[test]
    fn test_question_mark_glob() {
        assert!(is_excluded("x/a.c", &["?.c"]));
        assert!(!is_excluded("x/ab.c", &["?.c"]));
    }

    #[test]
    fn test_full_path_glob_does_not_cross_separator() {
        assert!(is_excluded(".gradle/caches", &[".gradle/caches"]));
        assert!(is_excluded(".config/nvim/lazy-lock.json", &[".config/nvim/lazy-lock.json"]));
        assert!(is_excluded(".config/foo.tmp", &[".config/*.tmp"]));
        assert!(!is_excluded(".config/sub/foo.tmp", &[".config/*.tmp"]));
    }

    #[test]
    fn test_exact_basename_does_not_match_longer_names() {
        assert!(is_excluded(".git", &[".git"]));
        assert!(!is_excluded(".gitconfig", &[".git"]));
        assert!(!is_excluded(".config/git/.gitignore_global", &[".git"]));
    }

    #[test]
    fn test_component_boundaries() {
        // prefix
        assert!(is_excluded(".git/objects/ab", &[".git"]));
        // suffix
        assert!(is_excluded(".oh-my-zsh/.git", &[".git"]));
        // interior
        assert!(is_excluded("foo/.git/objects", &[".git"]));
        assert!(is_excluded(".m2/repository/org/x.jar", &[".m2/repository"]));
        assert!(is_excluded("a/gitstatus/src/file.c", &["gitstatus/src"]));
        assert!(!is_excluded("foo/.github-notes/file", &[".git"]));
    }

    #[test]
    fn test_broad_interior_match_is_preserved() {
        assert!(is_excluded(".config/nvim/tests/init.lua", &["tests"]));
        assert!(is_excluded(".local/share/docs", &["docs"]));
    }

    #[test]
    fn test_any_pattern_matches() {
        let set = ExcludeSet::new(&["*.bak", "node_modules", ".DS_Store"]);
        assert!(set.is_excluded("proj/node_modules/pkg/index.js"));
        assert!(set.is_excluded(".config/.DS_Store"));
        assert!(set.is_excluded("x.bak"));
        assert!(!set.is_excluded(".config/app.toml"));
        assert!(!set.is_empty());
    }

    #[test]
    fn test_invalid_glob_still_matches_literally() {
        let set = ExcludeSet::new(&["[broken"]);
        assert!(set.is_excluded("[broken"));
        assert!(set.is_excluded("dir/[broken/file"));
        assert!(!set.is_excluded("broken"));
    }

    #[test]
    fn test_empty_set_excludes_nothing() {
        let set = ExcludeSet::new::<&str>(&[]);
        assert!(set.is_empty());
        assert!(!set.is_excluded(".zshrc"));
    }
}
