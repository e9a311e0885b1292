//! Payload sources for the packer
//!
//! A source is either bytes already in memory or a file on disk that is
//! streamed at append time. The inline/by-path decision is made by whoever
//! builds the sources (see [`SourceSpooler`]); the packer treats both alike.

use crate::stream::{copy_exact, DEFAULT_BUFFER_SIZE};
use crate::{PackError, PackResult};
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Size at which blobs are spooled to disk instead of held in memory (10 MiB)
pub const DEFAULT_INLINE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Bytes for one payload block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    /// Bytes held in memory
    Inline(Vec<u8>),
    /// File streamed from disk
    File(PathBuf),
}

impl PayloadSource {
    /// Length of the block in bytes
    pub fn len(&self) -> PackResult<u64> {
        match self {
            PayloadSource::Inline(data) => Ok(data.len() as u64),
            PayloadSource::File(path) => Ok(fs::metadata(path)?.len()),
        }
    }

    /// Check whether the block has no bytes
    pub fn is_empty(&self) -> PackResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Open the source for reading
    pub fn open(&self) -> PackResult<Box<dyn Read + '_>> {
        match self {
            PayloadSource::Inline(data) => Ok(Box::new(Cursor::new(data.as_slice()))),
            PayloadSource::File(path) => Ok(Box::new(File::open(path)?)),
        }
    }

    /// Path of a file-backed source
    pub fn path(&self) -> Option<&Path> {
        match self {
            PayloadSource::File(path) => Some(path),
            PayloadSource::Inline(_) => None,
        }
    }
}

impl From<Vec<u8>> for PayloadSource {
    fn from(data: Vec<u8>) -> Self {
        PayloadSource::Inline(data)
    }
}

impl From<PathBuf> for PayloadSource {
    fn from(path: PathBuf) -> Self {
        PayloadSource::File(path)
    }
}

/// A media file or button image with its identity
#[derive(Debug, Clone)]
pub struct NamedSource {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub source: PayloadSource,
}

impl NamedSource {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        source: impl Into<PayloadSource>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            source: source.into(),
        }
    }
}

/// Saves large blobs to temporary files so they can be passed by path
///
/// The spooled files belong to the spooler and are removed when it is
/// dropped, so it must outlive the pack call that reads them.
pub struct SourceSpooler {
    dir: TempDir,
    threshold: u64,
    counter: usize,
}

impl SourceSpooler {
    /// Create a spooler in the system temp directory
    pub fn new() -> PackResult<Self> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("tutorial-pack-").tempdir()?,
            threshold: DEFAULT_INLINE_THRESHOLD,
            counter: 0,
        })
    }

    /// Create a spooler under a specific directory
    pub fn new_in(parent: impl AsRef<Path>) -> PackResult<Self> {
        Ok(Self {
            dir: tempfile::Builder::new()
                .prefix("tutorial-pack-")
                .tempdir_in(parent)?,
            threshold: DEFAULT_INLINE_THRESHOLD,
            counter: 0,
        })
    }

    /// Set the inline threshold
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Directory holding spooled files
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Pick inline or spooled storage for `data` by size
    pub fn source_for(&mut self, data: Vec<u8>) -> PackResult<PayloadSource> {
        if (data.len() as u64) < self.threshold {
            Ok(PayloadSource::Inline(data))
        } else {
            self.spool(&data)
        }
    }

    /// Write `data` to a new temp file
    pub fn spool(&mut self, data: &[u8]) -> PackResult<PayloadSource> {
        let path = self.next_path();
        fs::write(&path, data)?;
        tracing::debug!("Spooled {} bytes to {}", data.len(), path.display());
        Ok(PayloadSource::File(path))
    }

    /// Stream `len` bytes from `reader` into a new temp file
    pub fn spool_reader<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
        len: u64,
    ) -> PackResult<PayloadSource> {
        let path = self.next_path();
        let mut file = File::create(&path)?;
        copy_exact(reader, &mut file, len, DEFAULT_BUFFER_SIZE, "spooled blob", |_| {})?;
        file.flush()?;
        tracing::debug!("Spooled {} streamed bytes to {}", len, path.display());
        Ok(PayloadSource::File(path))
    }

    fn next_path(&mut self) -> PathBuf {
        self.counter += 1;
        self.dir.path().join(format!("blob-{:04}.bin", self.counter))
    }
}

/// Reject payloads whose ids collide or whose files are missing
pub(crate) fn check_sources(media: &[NamedSource], buttons: &[NamedSource]) -> PackResult<()> {
    let mut seen = std::collections::HashSet::new();
    for item in media.iter().chain(buttons) {
        if !seen.insert(item.id.as_str()) {
            return Err(PackError::DuplicateId(item.id.clone()));
        }
        if let PayloadSource::File(path) = &item.source {
            if !path.is_file() {
                return Err(PackError::SourceNotFound(path.clone()));
            }
        }
    }
    Ok(())
}
