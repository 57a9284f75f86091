//! Backup set definitions

use crate::exclude::{validate_patterns, PatternError};
use crate::util::{validate_name, PathError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors validating a backup set
#[derive(Error, Debug)]
pub enum SetError {
    #[error("Invalid set name: {0}")]
    Name(#[from] PathError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("A backup set needs at least one source directory")]
    NoSources,

    #[error("Source is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Source must be an absolute path: {0}")]
    RelativeSource(PathBuf),

    #[error("Source has no usable directory name: {0}")]
    NoLabel(PathBuf),

    #[error("Two sources share the directory name '{0}'")]
    DuplicateLabel(String),

    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A named group of source directories backed up together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSet {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable name, used in archive file names
    pub name: String,
    /// Absolute source directories
    pub sources: Vec<PathBuf>,
    /// Glob exclusion patterns
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Optional description
    pub description: Option<String>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last modified
    pub updated_at: DateTime<Utc>,
}

impl BackupSet {
    /// Create a new set; call [`BackupSet::validate`] before storing it
    #[must_use]
    pub fn new(name: String, sources: Vec<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            sources,
            excludes: Vec::new(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    /// Source roots paired with the label they get inside archives
    pub fn root_labels(&self) -> Result<Vec<(String, &Path)>, SetError> {
        self.sources
            .iter()
            .map(|source| Ok((root_label(source)?, source.as_path())))
            .collect()
    }

    /// Check the name, patterns and label uniqueness. Source existence is
    /// only checked by [`canonical_sources`], since a stored set may point at
    /// a directory that is temporarily unmounted.
    pub fn validate(&self) -> Result<(), SetError> {
        validate_name(&self.name)?;
        validate_patterns(&self.excludes)?;

        if self.sources.is_empty() {
            return Err(SetError::NoSources);
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !source.is_absolute() {
                return Err(SetError::RelativeSource(source.clone()));
            }
            let label = root_label(source)?;
            if !seen.insert(label.clone()) {
                return Err(SetError::DuplicateLabel(label));
            }
        }

        Ok(())
    }
}

/// Resolve user-supplied source paths into canonical, existing directories
pub fn canonical_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>, SetError> {
    paths
        .iter()
        .map(|path| {
            let canonical = path.canonicalize().map_err(|source| SetError::Io {
                path: path.clone(),
                source,
            })?;
            if !canonical.is_dir() {
                return Err(SetError::NotADirectory(canonical));
            }
            Ok(canonical)
        })
        .collect()
}

fn root_label(source: &Path) -> Result<String, SetError> {
    source
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| SetError::NoLabel(source.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_accepts_distinct_labels() {
        let set = BackupSet::new(
            "work".to_string(),
            vec![PathBuf::from("/home/me/docs"), PathBuf::from("/srv/photos")],
        );
        assert!(set.validate().is_ok());
        let labels: Vec<String> = set
            .root_labels()
            .unwrap()
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, vec!["docs", "photos"]);
    }

    #[test]
    fn test_validate_rejects_duplicate_labels() {
        let set = BackupSet::new(
            "work".to_string(),
            vec![PathBuf::from("/a/docs"), PathBuf::from("/b/docs")],
        );
        assert!(matches!(set.validate(), Err(SetError::DuplicateLabel(l)) if l == "docs"));
    }

    #[test]
    fn test_validate_rejects_root_and_relative() {
        let root = BackupSet::new("r".to_string(), vec![PathBuf::from("/")]);
        assert!(matches!(root.validate(), Err(SetError::NoLabel(_))));

        let relative = BackupSet::new("r".to_string(), vec![PathBuf::from("docs")]);
        assert!(matches!(relative.validate(), Err(SetError::RelativeSource(_))));
    }

    #[test]
    fn test_validate_rejects_bad_name_and_patterns() {
        let set = BackupSet::new("../x".to_string(), vec![PathBuf::from("/a/docs")]);
        assert!(matches!(set.validate(), Err(SetError::Name(_))));

        let set = BackupSet::new("x".to_string(), vec![PathBuf::from("/a/docs")])
            .with_excludes(vec![String::new()]);
        assert!(matches!(set.validate(), Err(SetError::Pattern(_))));

        let set = BackupSet::new("x".to_string(), vec![]);
        assert!(matches!(set.validate(), Err(SetError::NoSources)));
    }

    #[test]
    fn test_canonical_sources() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("data");
        fs::create_dir(&sub).unwrap();
        fs::write(dir.path().join("file"), "x").unwrap();

        let sources = canonical_sources(&[sub.join("..").join("data")]).unwrap();
        assert_eq!(sources, vec![sub.canonicalize().unwrap()]);

        assert!(matches!(
            canonical_sources(&[dir.path().join("file")]),
            Err(SetError::NotADirectory(_))
        ));
        assert!(matches!(
            canonical_sources(&[dir.path().join("missing")]),
            Err(SetError::Io { .. })
        ));
    }
}
