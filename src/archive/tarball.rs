use crate::runtime::Runtime;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

use super::ArchiveExtractor;

/// Compression wrapped around the tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
}

impl Compression {
    fn extensions(self) -> &'static [&'static str] {
        match self {
            Compression::Gzip => &[".tar.gz", ".tgz"],
            Compression::Zstd => &[".tar.zst", ".tzst"],
        }
    }
}

/// Extractor for compressed tar archives (CPython source tarballs, MSYS2 packages)
pub struct TarExtractor {
    compression: Compression,
}

impl TarExtractor {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    fn decoder(
        &self,
        reader: Box<dyn Read + Send>,
    ) -> Result<Box<dyn Read + Send>> {
        Ok(match self.compression {
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            Compression::Zstd => Box::new(
                zstd::stream::read::Decoder::new(reader)
                    .context("Failed to initialise zstd decoder")?,
            ),
        })
    }
}

impl ArchiveExtractor for TarExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        self.compression
            .extensions()
            .iter()
            .any(|ext| name.ends_with(ext))
    }

    fn extract<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!(
            "Extracting {:?} archive {:?} to {:?}...",
            self.compression, archive_path, extract_to
        );
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
        let mut archive = Archive::new(self.decoder(file)?);

        runtime.create_dir_all(extract_to)?;

        let mut count = 0usize;
        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?
        {
            let mut entry = entry.context("Failed to read archive entry")?;
            let raw_path = entry.path()?.into_owned();

            let Some(relative) = sanitize_entry_path(&raw_path) else {
                debug!("Skipping entry with unsafe path {:?}", raw_path);
                continue;
            };
            let dest = extract_to.join(&relative);

            match entry.header().entry_type() {
                EntryType::Directory => runtime.create_dir_all(&dest)?,
                EntryType::Regular | EntryType::Continuous => {
                    if let Some(parent) = dest.parent() {
                        runtime.create_dir_all(parent)?;
                    }
                    let mut out = runtime.create_file(&dest)?;
                    std::io::copy(&mut entry, &mut out)
                        .with_context(|| format!("Failed to extract file {:?}", dest))?;

                    if let Ok(mode) = entry.header().mode()
                        && let Err(e) = runtime.set_permissions(&dest, mode & 0o7777)
                    {
                        debug!("Failed to set permissions on {:?}: {}", dest, e);
                    }
                    count += 1;
                }
                other => {
                    debug!("Skipping {:?} entry {:?}", other, raw_path);
                }
            }
        }

        info!("Extracted {} file(s) into {}", count, extract_to.display());
        Ok(())
    }
}

/// Drops `.` components and rejects absolute paths or `..` escapes.
fn sanitize_entry_path(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}
