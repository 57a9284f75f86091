//! Archive creation

use super::ArchiveError;
use crate::manifest::{Manifest, MANIFEST_ENTRY};
use crate::scan::mtime_secs;
use crate::util::HashingReader;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};

/// What was written for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub size: u64,
    pub mtime: i64,
    pub mode: u32,
    pub sha256: String,
}

/// Streaming tar.gz writer for one snapshot
pub struct ArchiveWriter {
    builder: Builder<GzEncoder<BufWriter<File>>>,
    path: PathBuf,
    files: u64,
    bytes: u64,
}

impl ArchiveWriter {
    /// Create a new archive. Refuses to replace an existing file.
    pub fn create(path: &Path, compression_level: u32) -> Result<Self, ArchiveError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    ArchiveError::AlreadyExists(path.to_path_buf())
                } else {
                    ArchiveError::Io(e)
                }
            })?;

        let encoder = GzEncoder::new(BufWriter::new(file), Compression::new(compression_level));
        let mut builder = Builder::new(encoder);
        builder.mode(tar::HeaderMode::Complete);

        Ok(Self {
            builder,
            path: path.to_path_buf(),
            files: 0,
            bytes: 0,
        })
    }

    /// Path of the archive being written
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Files appended so far
    #[must_use]
    pub fn files(&self) -> u64 {
        self.files
    }

    /// Uncompressed bytes appended so far
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Stream a file into the archive, hashing exactly the bytes written
    pub fn append_file(
        &mut self,
        archive_path: &str,
        source: &Path,
    ) -> Result<StoredFile, ArchiveError> {
        let unreadable = |source_err| ArchiveError::SourceUnreadable {
            path: source.to_path_buf(),
            source: source_err,
        };
        let file = File::open(source).map_err(unreadable)?;
        let metadata = file.metadata().map_err(unreadable)?;
        let size = metadata.len();

        let mut header = Header::new_gnu();
        header.set_metadata_in_mode(&metadata, tar::HeaderMode::Complete);
        header.set_entry_type(EntryType::Regular);

        let sha256 = self.append_exact(&mut header, archive_path, file, size)?;

        Ok(StoredFile {
            size,
            mtime: mtime_secs(&metadata),
            mode: header.mode().unwrap_or(0o644),
            sha256,
        })
    }

    /// Append exactly `size` bytes of `data` under `archive_path`.
    /// Returns the SHA-256 of what went into the archive.
    fn append_exact<R: Read>(
        &mut self,
        header: &mut Header,
        archive_path: &str,
        data: R,
        size: u64,
    ) -> Result<String, ArchiveError> {
        header.set_size(size);

        // A file that grows is cut at `size`; one that shrinks leaves the
        // entry short, which tar pads silently, so count what was read
        let mut reader = HashingReader::new(data.take(size));
        self.builder.append_data(header, archive_path, &mut reader)?;

        if reader.bytes_read() != size {
            return Err(ArchiveError::FileChanged(archive_path.to_string()));
        }

        let (sha256, _) = reader.finish();
        self.files += 1;
        self.bytes += size;
        Ok(sha256)
    }

    /// Append the snapshot manifest; call once, after every file
    pub fn append_manifest(&mut self, manifest: &Manifest) -> Result<(), ArchiveError> {
        let json = serde_json::to_vec_pretty(manifest)?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(json.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(
            u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default(),
        );

        self.builder
            .append_data(&mut header, MANIFEST_ENTRY, json.as_slice())?;
        Ok(())
    }

    /// Finish the tar stream, flush compression and sync to disk.
    /// On failure the partial file is removed.
    pub fn finish(self) -> Result<PathBuf, ArchiveError> {
        let path = self.path;
        match finish_stream(self.builder) {
            Ok(()) => Ok(path),
            Err(e) => {
                remove_partial(&path);
                Err(e)
            }
        }
    }

    /// Drop a partially written archive
    pub fn abandon(self) {
        drop(self.builder);
        remove_partial(&self.path);
    }
}

fn finish_stream(builder: Builder<GzEncoder<BufWriter<File>>>) -> Result<(), ArchiveError> {
    let encoder = builder.into_inner()?;
    let mut buffered = encoder.finish()?;
    buffered.flush()?;
    let file = buffered.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial archive");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::for_each_entry;
    use tempfile::TempDir;

    #[test]
    fn test_short_source_is_file_changed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.tar.gz");
        let mut writer = ArchiveWriter::create(&path, 6).unwrap();

        // Metadata promised ten bytes but only three arrive
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        let result = writer.append_exact(&mut header, "home/shrunk.txt", &b"abc"[..], 10);

        assert!(matches!(result, Err(ArchiveError::FileChanged(p)) if p == "home/shrunk.txt"));
        assert_eq!(writer.files(), 0);

        writer.abandon();
        assert!(!path.exists());
    }

    #[test]
    fn test_growing_source_is_cut_at_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.tar.gz");
        let mut writer = ArchiveWriter::create(&path, 6).unwrap();

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        let sha = writer
            .append_exact(&mut header, "home/grown.txt", &b"abcdef"[..], 3)
            .unwrap();
        assert_eq!(sha, crate::util::hash_bytes(b"abc"));
        writer.finish().unwrap();

        let mut seen = Vec::new();
        for_each_entry(&path, |name, entry| -> Result<(), ArchiveError> {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            seen.push((name.to_string(), data));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![("home/grown.txt".to_string(), b"abc".to_vec())]);
    }
}
