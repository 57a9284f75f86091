//! Archive reading

use super::ArchiveError;
use crate::manifest::{Manifest, MANIFEST_ENTRY};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tar::{Archive, Entry};

/// Decompressing reader type every archive is opened with
pub type ArchiveStream = GzDecoder<BufReader<File>>;

/// Open an archive for sequential reading
pub fn open_archive(path: &Path) -> Result<Archive<ArchiveStream>, ArchiveError> {
    let file = File::open(path)?;
    Ok(Archive::new(GzDecoder::new(BufReader::new(file))))
}

/// Visit every entry in archive order. The manifest entry is included;
/// callers compare the name against [`MANIFEST_ENTRY`] to tell them apart.
pub fn for_each_entry<F, E>(path: &Path, mut visit: F) -> Result<(), E>
where
    F: FnMut(&str, &mut Entry<'_, ArchiveStream>) -> Result<(), E>,
    E: From<ArchiveError>,
{
    let mut archive = open_archive(path)?;
    let entries = archive.entries().map_err(ArchiveError::from)?;
    for entry in entries {
        let mut entry = entry.map_err(ArchiveError::from)?;
        let name = entry_name(&entry)?;
        visit(&name, &mut entry)?;
    }
    Ok(())
}

/// Read the manifest embedded in an archive
pub fn read_manifest(path: &Path) -> Result<Manifest, ArchiveError> {
    let mut manifest = None;
    for_each_entry(path, |name, entry| -> Result<(), ArchiveError> {
        if name == MANIFEST_ENTRY {
            let mut json = Vec::new();
            entry.read_to_end(&mut json)?;
            manifest = Some(serde_json::from_slice::<Manifest>(&json)?);
        }
        Ok(())
    })?;
    manifest.ok_or_else(|| ArchiveError::ManifestMissing(path.to_path_buf()))
}

fn entry_name<R: Read>(entry: &Entry<'_, R>) -> Result<String, ArchiveError> {
    let path = entry.path()?;
    path.to_str()
        .map(ToString::to_string)
        .ok_or_else(|| ArchiveError::InvalidEntryPath(path.display().to_string()))
}
