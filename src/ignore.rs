//! Ignore-pattern matching for manifest generation.
//!
//! Patterns come from `.warrenignore` at the workspace root plus a built-in
//! default set. The matching contract: patterns are evaluated in order and
//! the **last matching pattern wins**; a leading `!` negates (re-includes); a
//! trailing `/` restricts the pattern to directories, and the walker prunes
//! matched directories without descending.

use std::fs;
use std::path::Path;

/// Patterns that are always ignored, before any `.warrenignore` content.
pub const DEFAULT_PATTERNS: &[&str] = &[
    ".warren/",
    ".git/",
    ".svn/",
    ".hg/",
    "node_modules/",
    "target/",
    "__pycache__/",
    ".DS_Store",
    "Thumbs.db",
    "*.pyc",
    "*.pyo",
    "*.class",
    "*.o",
    "*.obj",
    "*.exe",
    "*.dll",
    "*.so",
    "*.dylib",
];

/// Name of the per-workspace ignore file.
pub const IGNORE_FILE: &str = ".warrenignore";

/// Compiled ignore matcher.
#[derive(Debug, Default)]
pub struct Matcher {
    patterns: Vec<Pattern>,
}

#[derive(Debug)]
struct Pattern {
    negated: bool,
    dir_only: bool,
    kind: PatternKind,
}

#[derive(Debug)]
enum PatternKind {
    /// Wildcard pattern, matched against both the basename and the full
    /// relative path.
    Glob(glob::Pattern),
    /// Literal name or path segment match.
    Literal(String),
}

impl Matcher {
    /// Build a matcher from raw pattern lines. Unparsable wildcard patterns
    /// are dropped.
    #[must_use]
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut m = Self::default();
        for p in patterns {
            m.add_pattern(p.as_ref());
        }
        m
    }

    /// Load the matcher for a workspace root: defaults first, then the lines
    /// of `.warrenignore` (blank lines and `#` comments skipped). A missing
    /// ignore file yields the defaults alone.
    #[must_use]
    pub fn load_from_dir(root: &Path) -> Self {
        let mut lines: Vec<String> = DEFAULT_PATTERNS.iter().map(|p| (*p).to_owned()).collect();
        if let Ok(content) = fs::read_to_string(root.join(IGNORE_FILE)) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                lines.push(line.to_owned());
            }
        }
        Self::new(&lines)
    }

    fn add_pattern(&mut self, raw: &str) {
        let mut rest = raw;
        let negated = rest.starts_with('!');
        if negated {
            rest = &rest[1..];
        }
        let dir_only = rest.ends_with('/');
        if dir_only {
            rest = rest.trim_end_matches('/');
        }
        if rest.is_empty() {
            return;
        }

        let kind = if rest.contains(['*', '?', '[']) {
            match glob::Pattern::new(rest) {
                Ok(g) => PatternKind::Glob(g),
                Err(_) => return,
            }
        } else {
            PatternKind::Literal(rest.to_owned())
        };

        self.patterns.push(Pattern {
            negated,
            dir_only,
            kind,
        });
    }

    /// Returns true if `path` (relative, forward-slash) should be ignored.
    ///
    /// For directories the caller should prune the whole subtree on a match.
    #[must_use]
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);

        let mut ignored = false;
        for p in &self.patterns {
            if p.dir_only && !is_dir {
                continue;
            }
            if p.matches(path, name) {
                ignored = !p.negated;
            }
        }
        ignored
    }
}

impl Pattern {
    fn matches(&self, path: &str, name: &str) -> bool {
        match &self.kind {
            PatternKind::Glob(g) => g.matches(name) || g.matches(path),
            PatternKind::Literal(lit) => {
                name == lit
                    || path == lit
                    || path.starts_with(&format!("{lit}/"))
                    || path.contains(&format!("/{lit}/"))
                    || path.ends_with(&format!("/{lit}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_ignore_vcs_dirs() {
        let m = Matcher::new(DEFAULT_PATTERNS);
        assert!(m.is_ignored(".git", true));
        assert!(m.is_ignored(".warren", true));
        assert!(m.is_ignored("node_modules", true));
        assert!(!m.is_ignored("src", true));
    }

    #[test]
    fn suffix_glob_matches_nested_files() {
        let m = Matcher::new(&["*.pyc"]);
        assert!(m.is_ignored("mod.pyc", false));
        assert!(m.is_ignored("pkg/deep/mod.pyc", false));
        assert!(!m.is_ignored("mod.py", false));
    }

    #[test]
    fn dir_only_pattern_skips_files() {
        let m = Matcher::new(&["build/"]);
        assert!(m.is_ignored("build", true));
        assert!(!m.is_ignored("build", false));
    }

    #[test]
    fn literal_matches_path_components() {
        let m = Matcher::new(&["vendor"]);
        assert!(m.is_ignored("vendor", true));
        assert!(m.is_ignored("third_party/vendor", true));
        assert!(m.is_ignored("a/vendor/b.txt", false));
        assert!(!m.is_ignored("vendored.txt", false));
    }

    #[test]
    fn last_matching_pattern_wins() {
        // Ignore all logs, re-include one, then ignore it again.
        let m = Matcher::new(&["*.log", "!keep.log"]);
        assert!(m.is_ignored("debug.log", false));
        assert!(!m.is_ignored("keep.log", false));

        let m = Matcher::new(&["*.log", "!keep.log", "keep.log"]);
        assert!(m.is_ignored("keep.log", false));
    }

    #[test]
    fn negation_reincludes_inside_ignored_set() {
        let m = Matcher::new(&["dist/*", "!dist/README.md"]);
        assert!(m.is_ignored("dist/bundle.js", false));
        assert!(!m.is_ignored("dist/README.md", false));
    }

    #[test]
    fn comments_and_blanks_skipped_in_ignore_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(IGNORE_FILE),
            "# build output\n\nout/\n*.tmp\n",
        )
        .unwrap();
        let m = Matcher::load_from_dir(dir.path());
        assert!(m.is_ignored("out", true));
        assert!(m.is_ignored("scratch.tmp", false));
        assert!(!m.is_ignored("# build output", false));
    }

    #[test]
    fn missing_ignore_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let m = Matcher::load_from_dir(dir.path());
        assert!(m.is_ignored(".git", true));
        assert!(!m.is_ignored("main.rs", false));
    }
}
