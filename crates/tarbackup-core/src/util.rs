//! Path, naming and hashing helpers

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors related to path validation
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Path traversal attempt detected: {0}")]
    TraversalAttempt(String),

    #[error("Path escapes root directory: {0}")]
    EscapesRoot(String),

    #[error("Invalid path component: {0}")]
    InvalidComponent(String),

    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8(String),
}

/// Join an untrusted relative path (e.g. a tar entry name) onto `root`,
/// refusing anything that would land outside of it.
///
/// # Errors
/// Returns an error if the path would escape the root directory
pub fn safe_join(root: &Path, untrusted_path: &Path) -> Result<PathBuf, PathError> {
    let normalized = normalize_path(untrusted_path)?;
    let joined = root.join(&normalized);

    // The destination usually does not exist yet, so canonicalize() is not an option
    verify_under_root(root, &joined)?;

    Ok(joined)
}

/// Resolve `.` and `..` lexically, rejecting absolute paths and any `..`
/// that would climb above the start
fn normalize_path(path: &Path) -> Result<PathBuf, PathError> {
    let mut normalized = PathBuf::new();
    let mut depth: i32 = 0;

    for component in path.components() {
        match component {
            Component::Normal(c) => {
                // NUL would truncate the name at the OS boundary
                if c.to_string_lossy().contains('\0') {
                    return Err(PathError::InvalidComponent(
                        "Null byte in path".to_string(),
                    ));
                }
                normalized.push(c);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    normalized.pop();
                    depth -= 1;
                } else {
                    return Err(PathError::TraversalAttempt(path.display().to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::InvalidComponent(
                    "Absolute path not allowed".to_string(),
                ));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(PathError::InvalidComponent("Empty path".to_string()));
    }

    Ok(normalized)
}

/// Check that `path` is under `root`
///
/// Only a path that already exists is resolved through symlinks. For one
/// that does not, this is a prefix check on the normalized path; callers
/// writing through directories they did not create must re-check after
/// creating them.
fn verify_under_root(root: &Path, path: &Path) -> Result<(), PathError> {
    if root.exists() && path.exists() {
        let canonical_root = root
            .canonicalize()
            .map_err(|_| PathError::EscapesRoot(path.display().to_string()))?;
        let canonical_path = path
            .canonicalize()
            .map_err(|_| PathError::EscapesRoot(path.display().to_string()))?;

        if !canonical_path.starts_with(&canonical_root) {
            return Err(PathError::EscapesRoot(path.display().to_string()));
        }
    } else if !path.starts_with(root) {
        return Err(PathError::EscapesRoot(path.display().to_string()));
    }

    Ok(())
}

/// Validate a backup set name for use in file and archive names
///
/// # Errors
/// Returns an error if the name is invalid
pub fn validate_name(name: &str) -> Result<(), PathError> {
    if name.is_empty() {
        return Err(PathError::InvalidComponent("Empty name".to_string()));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(PathError::TraversalAttempt(format!(
            "Name contains path separator: {name}"
        )));
    }

    if name.contains("..") {
        return Err(PathError::TraversalAttempt(format!(
            "Name contains parent directory reference: {name}"
        )));
    }

    // A leading dot would hide the set's archive directory
    if name.starts_with('.') {
        return Err(PathError::InvalidComponent(format!(
            "Name cannot start with dot: {name}"
        )));
    }

    if name.contains('\0') {
        return Err(PathError::InvalidComponent(
            "Name contains null byte".to_string(),
        ));
    }

    Ok(())
}

/// Convert a relative filesystem path into an archive path (`/` separated)
///
/// # Errors
/// Returns an error if a component is not valid UTF-8
pub fn to_archive_path(label: &str, relative: &Path) -> Result<String, PathError> {
    let mut out = String::from(label);
    for component in relative.components() {
        if let Component::Normal(c) = component {
            let part = c
                .to_str()
                .ok_or_else(|| PathError::NonUtf8(relative.display().to_string()))?;
            out.push('/');
            out.push_str(part);
        }
    }
    Ok(out)
}

/// Hex-encoded SHA256 of a byte slice
#[must_use]
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA256 of a file, streamed
///
/// # Errors
/// Returns an error if the file cannot be read
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut reader = HashingReader::new(File::open(path)?);
    io::copy(&mut reader, &mut io::sink())?;
    Ok(reader.finish().0)
}

/// Reader adapter that hashes and counts everything read through it
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    bytes: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    /// Bytes read so far
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    /// Consume the reader, returning the hex digest and byte count
    #[must_use]
    pub fn finish(self) -> (String, u64) {
        (hex::encode(self.hasher.finalize()), self.bytes)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

/// Format bytes as human-readable string
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}
