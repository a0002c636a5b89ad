//! Exclude pattern matching for the watched project.
//!
//! Supports .gitignore-style patterns for excluding files from the manifest.
//! Patterns come from a built-in default set plus the project's ignore file.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::info;

/// Project file holding extra exclude patterns, one per line.
pub const IGNORE_FILENAME: &str = ".devcastignore";

/// Default patterns to exclude from the manifest.
///
/// Hidden entries (`.git`, `.DS_Store`, ...) need no patterns here: anything
/// whose basename starts with `.` is rejected before the patterns are
/// consulted.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    // Build artifacts
    "target",
    "target/**",
    "node_modules",
    "node_modules/**",
    "__pycache__",
    "__pycache__/**",
    "*.pyc",
    "*.pyo",
    // Editor droppings
    "*.swp",
    "*.swo",
    "*~",
    // Temporary files
    "*.tmp",
    "*.temp",
    "*.bak",
    "*.orig",
];

/// Pattern matching for file exclusion.
#[derive(Debug, Clone)]
pub struct ExcludePatterns {
    /// Compiled glob set for matching.
    glob_set: GlobSet,
    /// Raw pattern strings (for display/serialization).
    patterns: Vec<String>,
}

impl Default for ExcludePatterns {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ExcludePatterns {
    /// Create a new empty exclude pattern set.
    pub fn new() -> Self {
        Self {
            glob_set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Create with default exclude patterns.
    pub fn with_defaults() -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut patterns = Vec::new();

        for pattern in DEFAULT_EXCLUDES {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
                patterns.push(pattern.to_string());
            }
        }

        Self {
            glob_set: builder.build().unwrap_or_else(|_| GlobSet::empty()),
            patterns,
        }
    }

    /// Create from a list of patterns.
    pub fn from_patterns(patterns: &[&str]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut pattern_list = Vec::new();

        for pattern in patterns {
            let glob = Glob::new(pattern)
                .with_context(|| format!("bad exclude pattern {pattern:?}"))?;
            builder.add(glob);
            pattern_list.push(pattern.to_string());
        }

        Ok(Self {
            glob_set: builder.build()?,
            patterns: pattern_list,
        })
    }

    /// Build the pattern set for a project: defaults plus the project's
    /// ignore file, when one exists at the root.
    pub fn for_project(root: &Path) -> Result<Self> {
        let mut patterns: Vec<String> =
            DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();

        let ignore_path = root.join(IGNORE_FILENAME);
        if ignore_path.is_file() {
            let content = std::fs::read_to_string(&ignore_path)
                .with_context(|| format!("failed to read {}", ignore_path.display()))?;
            patterns.extend(parse_ignore_lines(&content));
            info!("loaded exclude patterns from {}", ignore_path.display());
        }

        Self::from_patterns(&patterns.iter().map(String::as_str).collect::<Vec<&str>>())
    }

    /// Check if a path should be excluded.
    pub fn is_excluded(&self, path: &str) -> bool {
        // Check against the path and also just the filename
        if self.glob_set.is_match(path) {
            return true;
        }

        // Also check just the filename for patterns like "*.swp"
        if let Some(filename) = Path::new(path).file_name() {
            if self.glob_set.is_match(filename.to_string_lossy().as_ref()) {
                return true;
            }
        }

        // Check each path component for directory patterns
        for component in Path::new(path).components() {
            if let std::path::Component::Normal(name) = component {
                if self.glob_set.is_match(name.to_string_lossy().as_ref()) {
                    return true;
                }
            }
        }

        false
    }

    /// Get the list of patterns.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Parse ignore-file content (one pattern per line, like .gitignore).
/// Negations are not supported and are skipped.
fn parse_ignore_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(str::to_string)
        .collect()
}
