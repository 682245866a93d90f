//! Model sources: where raw model descriptions come from.
//!
//! The downloader drops one description file per model into a folder;
//! [`DirectorySource`] reads from that folder by tag.

use crate::config::RepositoryConfig;
use crate::error::{BioGraphError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;
use walkdir::WalkDir;

/// Supplies raw descriptions keyed by tag.
pub trait ModelSource: Send + Sync {
    /// Raw bytes of the description for `tag`.
    ///
    /// Fails with [`BioGraphError::SourceNotFound`] when there is none.
    fn fetch(&self, tag: &str) -> Result<Vec<u8>>;

    /// Every tag this source can supply, sorted.
    fn available(&self) -> Result<Vec<String>>;
}

/// Reads `<folder>/<tag>` or `<folder>/<tag>.xml`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    folder: PathBuf,
}

impl DirectorySource {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Locate the file for `tag`, if present.
    pub fn path_for(&self, tag: &str) -> Option<PathBuf> {
        // Tags never address files outside the folder.
        if tag.is_empty() || tag.contains('/') || tag.contains('\\') || tag == ".." {
            return None;
        }

        let exact = self.folder.join(tag);
        if exact.is_file() {
            return Some(exact);
        }

        let with_extension = self
            .folder
            .join(format!("{}.{}", tag, RepositoryConfig::MODEL_FILE_EXTENSION));
        with_extension.is_file().then_some(with_extension)
    }
}

impl ModelSource for DirectorySource {
    fn fetch(&self, tag: &str) -> Result<Vec<u8>> {
        let path = self
            .path_for(tag)
            .ok_or_else(|| BioGraphError::SourceNotFound {
                tag: tag.to_string(),
            })?;

        debug!("Reading description for {} from {}", tag, path.display());
        std::fs::read(&path).map_err(|e| BioGraphError::io_with_path(e, &path))
    }

    fn available(&self) -> Result<Vec<String>> {
        if !self.folder.is_dir() {
            return Err(BioGraphError::io_with_path(
                std::io::Error::new(std::io::ErrorKind::NotFound, "model folder does not exist"),
                &self.folder,
            ));
        }

        let tags: BTreeSet<String> = WalkDir::new(&self.folder)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case(RepositoryConfig::MODEL_FILE_EXTENSION))
                    .unwrap_or(false)
            })
            .filter_map(|e| {
                e.path()
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
            })
            .collect();

        Ok(tags.into_iter().collect())
    }
}

/// Descriptions held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    descriptions: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the description for `tag`.
    pub fn insert(&self, tag: impl Into<String>, raw: impl Into<Vec<u8>>) {
        if let Ok(mut map) = self.descriptions.write() {
            map.insert(tag.into(), raw.into());
        }
    }

    /// Remove the description for `tag`.
    pub fn remove(&self, tag: &str) -> bool {
        self.descriptions
            .write()
            .map(|mut map| map.remove(tag).is_some())
            .unwrap_or(false)
    }
}

impl ModelSource for MemorySource {
    fn fetch(&self, tag: &str) -> Result<Vec<u8>> {
        let map = self
            .descriptions
            .read()
            .map_err(|e| BioGraphError::Other(format!("Failed to acquire source lock: {}", e)))?;
        map.get(tag)
            .cloned()
            .ok_or_else(|| BioGraphError::SourceNotFound {
                tag: tag.to_string(),
            })
    }

    fn available(&self) -> Result<Vec<String>> {
        let map = self
            .descriptions
            .read()
            .map_err(|e| BioGraphError::Other(format!("Failed to acquire source lock: {}", e)))?;
        Ok(map.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_source_resolves_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("BIOMD0000000001.xml"), b"<sbml/>").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();

        let source = DirectorySource::new(dir.path());
        assert_eq!(source.fetch("BIOMD0000000001").unwrap(), b"<sbml/>");
        assert_eq!(source.fetch("BIOMD0000000001.xml").unwrap(), b"<sbml/>");
        assert_eq!(source.available().unwrap(), vec!["BIOMD0000000001"]);
    }

    #[test]
    fn test_directory_source_missing_tag() {
        let dir = TempDir::new().unwrap();
        let source = DirectorySource::new(dir.path());

        let err = source.fetch("BIOMD0000000002").unwrap_err();
        assert!(matches!(err, BioGraphError::SourceNotFound { .. }));
    }

    #[test]
    fn test_directory_source_rejects_path_tags() {
        let dir = TempDir::new().unwrap();
        let source = DirectorySource::new(dir.path().join("models"));
        assert!(source.path_for("../secret").is_none());
        assert!(source.path_for("").is_none());
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new();
        source.insert("M1", "<sbml/>");

        assert_eq!(source.fetch("M1").unwrap(), b"<sbml/>");
        assert!(source.fetch("M2").is_err());
        assert!(source.remove("M1"));
        assert!(source.available().unwrap().is_empty());
    }
}
