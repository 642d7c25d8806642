//! Reading and parsing backing files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dc_dom::Document;

use crate::error::CacheError;

/// Maps page names to `<directory>/<name>.<extension>` and parses them.
///
/// This is the only place that touches raw file content. Every call returns a
/// freshly parsed tree.
#[derive(Clone, Debug)]
pub struct Loader {
    directory: PathBuf,
    extension: String,
}

impl Loader {
    /// Create a loader for files directly inside `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
        }
    }

    /// Directory holding the backing files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Backing file extension.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Backing file path for a page name.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidName`] for names that are empty, hidden, or
    /// would reach outside the directory.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, CacheError> {
        validate_name(name)?;
        Ok(self.directory.join(format!("{name}.{}", self.extension)))
    }

    /// Read and parse the backing file for `name`.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidName`] if the name is not a plain file stem
    /// - [`CacheError::NotFound`] if the file does not exist
    /// - [`CacheError::Io`] if the file cannot be read
    /// - [`CacheError::Parse`] if the content is not valid UTF-8 markup
    pub async fn load(&self, name: &str) -> Result<Document, CacheError> {
        let path = self.path_for(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::NotFound {
                    name: name.to_owned(),
                    path,
                });
            }
            Err(e) => return Err(CacheError::io(path, e)),
        };
        Document::parse_bytes(&bytes).map_err(|e| CacheError::parse(path, e))
    }
}

/// Reject names that do not map to a single file inside the directory.
fn validate_name(name: &str) -> Result<(), CacheError> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '\0']) {
        return Err(CacheError::InvalidName(name.to_owned()));
    }
    Ok(())
}
