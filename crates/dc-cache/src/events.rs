//! Observability hook for cache activity.
//!
//! Failures that the cache absorbs instead of returning (unreadable ignore
//! file, unsupported rename events, failed background reloads) are reported
//! as [`CacheEvent`]s to the configured [`CacheObserver`]. The default
//! [`TracingObserver`] turns them into `tracing` records.

use std::path::PathBuf;

/// Something the cache wants to report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
    /// The ignore file could not be read; no paths will be ignored.
    IgnoreFileUnreadable {
        /// Resolved ignore file path.
        path: PathBuf,
        /// Error description.
        message: String,
    },
    /// A line in the ignore file is not a valid pattern and was skipped.
    IgnorePatternInvalid {
        /// Offending line.
        line: String,
        /// Error description.
        message: String,
    },
    /// A file was created, removed or renamed. Not handled until restart.
    RenameUnsupported {
        /// File name relative to the cache directory.
        file: PathBuf,
    },
    /// A relevant content change was seen for a page.
    ChangeDetected {
        /// Page name.
        name: String,
    },
    /// A change-triggered reload replaced the cached page.
    Reloaded {
        /// Page name.
        name: String,
    },
    /// A change-triggered reload failed; the previous entry stays.
    ReloadFailed {
        /// Page name.
        name: String,
        /// Error description.
        message: String,
    },
}

/// Receiver of [`CacheEvent`]s.
pub trait CacheObserver: Send + Sync {
    /// Handle one event. Called from whichever task produced it.
    fn observe(&self, event: &CacheEvent);
}

/// Observer that logs every event through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl CacheObserver for TracingObserver {
    fn observe(&self, event: &CacheEvent) {
        match event {
            CacheEvent::IgnoreFileUnreadable { path, message } => {
                tracing::warn!(path = %path.display(), error = %message, "Unable to read ignore file");
            }
            CacheEvent::IgnorePatternInvalid { line, message } => {
                tracing::warn!(line = %line, error = %message, "Skipping invalid ignore pattern");
            }
            CacheEvent::RenameUnsupported { file } => {
                tracing::warn!(
                    file = %file.display(),
                    "Renamed file will not be handled, restart to pick it up"
                );
            }
            CacheEvent::ChangeDetected { name } => {
                tracing::debug!(page = %name, "Change detected");
            }
            CacheEvent::Reloaded { name } => {
                tracing::info!(page = %name, "Reloaded page after change");
            }
            CacheEvent::ReloadFailed { name, message } => {
                tracing::warn!(page = %name, error = %message, "Reload after change failed");
            }
        }
    }
}
