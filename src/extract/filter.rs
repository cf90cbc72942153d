// extract/filter.rs
// Two ordered gates over relative paths: a built-in default-ignore set, then
// the user-supplied include/exclude glob pair. PHP template files are skipped
// here too so the PHP strategy never sees them.

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;

/// Directory names that are never descended into: version control, build
/// outputs, dependency trees, virtualenvs, IDE metadata, test trees.
const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "build",
    "dist",
    "out",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    ".idea",
    ".vscode",
    "vendor",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    "tests",
    "test",
    "__tests__",
    "testdata",
];

/// PHP template extensions that carry markup, not components.
const PHP_TEMPLATE_SUFFIXES: &[&str] = &[".blade.php", ".phtml", ".twig.php"];

/// Path fragments marking template trees.
const TEMPLATE_PATH_MARKERS: &[&str] = &["views/", "templates/", "resources/views/"];

/// Compiled file gates for one run.
pub struct FileFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl FileFilter {
    /// Compile the user-supplied glob pair. Invalid patterns are dropped with
    /// a warning rather than failing the run.
    pub fn new(include_patterns: &[String], exclude_patterns: &[String]) -> Self {
        Self {
            include: build_glob_set(include_patterns),
            exclude: build_glob_set(exclude_patterns),
        }
    }

    /// Whether a directory should be descended into at all.
    pub fn allows_dir(&self, dir_name: &str) -> bool {
        !DEFAULT_IGNORE_DIRS.contains(&dir_name)
    }

    /// Whether a file (by repository-relative path) passes both gates.
    pub fn allows_file(&self, relative_path: &str) -> bool {
        let normalized = relative_path.replace('\\', "/");

        if is_php_template(&normalized) {
            return false;
        }
        if let Some(include) = &self.include {
            if !include.is_match(&normalized) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(&normalized) {
                return false;
            }
        }
        true
    }
}

fn build_glob_set(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    let mut added = 0;
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
                added += 1;
            }
            Err(e) => warn!("ignoring invalid glob pattern '{}': {}", pattern, e),
        }
    }
    if added == 0 {
        return None;
    }
    builder.build().ok()
}

fn is_php_template(normalized: &str) -> bool {
    let lower = normalized.to_lowercase();
    if PHP_TEMPLATE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return true;
    }
    // Only template-engine trees are skipped for PHP sources.
    if lower.ends_with(".php") {
        return TEMPLATE_PATH_MARKERS.iter().any(|m| lower.contains(m));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ignores_block_common_dirs() {
        let filter = FileFilter::new(&[], &[]);
        assert!(!filter.allows_dir("node_modules"));
        assert!(!filter.allows_dir(".git"));
        assert!(!filter.allows_dir("tests"));
        assert!(filter.allows_dir("src"));
    }

    #[test]
    fn php_templates_are_skipped() {
        let filter = FileFilter::new(&[], &[]);
        assert!(!filter.allows_file("resources/views/home.blade.php"));
        assert!(!filter.allows_file("layout.phtml"));
        assert!(!filter.allows_file("pages/index.twig.php"));
        assert!(!filter.allows_file("app/views/page.php"));
        assert!(filter.allows_file("app/Models/User.php"));
    }

    #[test]
    fn include_exclude_gates_apply_in_order() {
        let filter = FileFilter::new(
            &["src/**/*.py".to_string()],
            &["src/legacy/**".to_string()],
        );
        assert!(filter.allows_file("src/app/main.py"));
        assert!(!filter.allows_file("lib/other.py"));
        assert!(!filter.allows_file("src/legacy/old.py"));
    }

    #[test]
    fn invalid_patterns_are_dropped_not_fatal() {
        let filter = FileFilter::new(&["[".to_string()], &[]);
        assert!(filter.allows_file("anything.py"));
    }
}
