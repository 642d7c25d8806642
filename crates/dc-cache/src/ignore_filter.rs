//! Ignore rules for change events.
//!
//! Patterns use `.gitignore` syntax and are compiled once, when the store is
//! opened. A changed ignore file takes effect only after a restart.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::events::{CacheEvent, CacheObserver};
use crate::options::ErrorReporting;

/// Compiled ignore rules, matched against paths relative to the cache directory.
#[derive(Clone, Debug)]
pub struct IgnoreFilter {
    rules: Gitignore,
}

impl IgnoreFilter {
    /// A filter that ignores nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: Gitignore::empty(),
        }
    }

    /// Read and compile the ignore file at `path`.
    ///
    /// Never fails: an unreadable file yields [`IgnoreFilter::empty`] and,
    /// unless `reporting.ignore_errors` is set, a
    /// [`CacheEvent::IgnoreFileUnreadable`]. Invalid lines are skipped and
    /// reported the same way.
    pub fn compile(
        root: &Path,
        path: &Path,
        reporting: ErrorReporting,
        observer: &dyn CacheObserver,
    ) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                if !reporting.ignore_errors {
                    observer.observe(&CacheEvent::IgnoreFileUnreadable {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    });
                }
                return Self::empty();
            }
        };
        Self::from_patterns(root, &content, reporting, observer)
    }

    /// Compile patterns from ignore-file text.
    pub fn from_patterns(
        root: &Path,
        content: &str,
        reporting: ErrorReporting,
        observer: &dyn CacheObserver,
    ) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        for line in content.lines() {
            if let Err(e) = builder.add_line(None, line) {
                if !reporting.ignore_errors {
                    observer.observe(&CacheEvent::IgnorePatternInvalid {
                        line: line.to_owned(),
                        message: e.to_string(),
                    });
                }
            }
        }
        match builder.build() {
            Ok(rules) => Self { rules },
            Err(e) => {
                if !reporting.ignore_errors {
                    observer.observe(&CacheEvent::IgnorePatternInvalid {
                        line: String::new(),
                        message: e.to_string(),
                    });
                }
                Self::empty()
            }
        }
    }

    /// Number of compiled patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if no patterns were compiled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `relative` (a file, relative to the cache directory) is ignored.
    ///
    /// Absolute paths outside the root never match.
    #[must_use]
    pub fn matches(&self, relative: &Path) -> bool {
        let relative = if relative.is_absolute() {
            match relative.strip_prefix(self.rules.path()) {
                Ok(stripped) => stripped,
                Err(_) => return false,
            }
        } else {
            relative
        };
        self.rules
            .matched_path_or_any_parents(relative, false)
            .is_ignore()
    }
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        Self::empty()
    }
}
