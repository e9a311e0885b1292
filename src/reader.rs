//! Reader for payloads embedded in a packed executable
//!
//! Detection runs once at start-up and yields an immutable snapshot of the
//! manifest. Block reads go back to the file on demand, so media that is never
//! shown is never loaded.

use crate::format::{decode_footer, FOOTER_LEN, MAX_MANIFEST_LEN};
use crate::manifest::{BlockRange, BuildManifest};
use crate::metrics::ReadMetrics;
use crate::stream::{copy_exact, read_exact_at, DEFAULT_BUFFER_SIZE};
use crate::{PackError, PackResult};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Outcome of probing a file for an embedded tutorial
#[derive(Debug, Clone)]
pub enum Detection {
    /// No footer: a standalone player or an unrelated file
    NotEmbedded,
    /// A valid footer and manifest were found
    Embedded(EmbeddedPayload),
}

impl Detection {
    pub fn is_embedded(&self) -> bool {
        matches!(self, Detection::Embedded(_))
    }

    pub fn payload(&self) -> Option<&EmbeddedPayload> {
        match self {
            Detection::Embedded(payload) => Some(payload),
            Detection::NotEmbedded => None,
        }
    }

    pub fn into_payload(self) -> Option<EmbeddedPayload> {
        match self {
            Detection::Embedded(payload) => Some(payload),
            Detection::NotEmbedded => None,
        }
    }
}

/// Probe `path` for an embedded tutorial
///
/// A file without the magic marker (including one shorter than the footer)
/// is [`Detection::NotEmbedded`]. A matching marker followed by a damaged or
/// inconsistent manifest is [`PackError::CorruptManifest`].
pub fn detect(path: &Path) -> PackResult<Detection> {
    detect_with_metrics(path, None)
}

/// [`detect`] with per-phase timings
pub fn detect_with_metrics(
    path: &Path,
    mut metrics: Option<&mut ReadMetrics>,
) -> PackResult<Detection> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();

    if file_len < FOOTER_LEN as u64 {
        tracing::debug!("{} is too short for a footer ({} bytes)", path.display(), file_len);
        return Ok(Detection::NotEmbedded);
    }

    let mut reader = BufReader::new(file);

    let footer_start = Instant::now();
    reader.seek(SeekFrom::End(-(FOOTER_LEN as i64)))?;
    let mut footer = [0u8; FOOTER_LEN];
    reader.read_exact(&mut footer)?;
    if let Some(ref mut m) = metrics {
        m.add_phase("footer", footer_start.elapsed());
    }

    let manifest_len = match decode_footer(&footer) {
        Some(len) => len,
        None => return Ok(Detection::NotEmbedded),
    };

    if manifest_len > MAX_MANIFEST_LEN {
        return Err(PackError::CorruptManifest(format!(
            "manifest length {} is over the {} byte limit",
            manifest_len, MAX_MANIFEST_LEN
        )));
    }
    let before_footer = file_len - FOOTER_LEN as u64;
    if manifest_len > before_footer {
        return Err(PackError::CorruptManifest(format!(
            "manifest length {} exceeds the {} bytes before the footer",
            manifest_len, before_footer
        )));
    }
    let manifest_offset = before_footer - manifest_len;

    let parse_start = Instant::now();
    let manifest_bytes = read_exact_at(&mut reader, manifest_offset, manifest_len, "manifest")?;
    let manifest = BuildManifest::decode(&manifest_bytes)?;
    manifest.validate(manifest_offset)?;
    if let Some(ref mut m) = metrics {
        m.add_phase("manifest_parse", parse_start.elapsed());
    }

    tracing::debug!(
        "Embedded tutorial: {} media, {} buttons, icon={}, manifest at {}",
        manifest.media.len(),
        manifest.buttons.len(),
        manifest.app_icon.is_some(),
        manifest_offset
    );

    Ok(Detection::Embedded(EmbeddedPayload {
        path: path.to_path_buf(),
        file_len,
        manifest_offset,
        manifest,
    }))
}

/// Validated manifest of one container, bound to its file
#[derive(Debug, Clone)]
pub struct EmbeddedPayload {
    path: PathBuf,
    file_len: u64,
    manifest_offset: u64,
    manifest: BuildManifest,
}

impl EmbeddedPayload {
    /// Container file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Container length at detection time
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Offset of the manifest JSON (end of the payload region)
    pub fn manifest_offset(&self) -> u64 {
        self.manifest_offset
    }

    /// The parsed manifest
    pub fn manifest(&self) -> &BuildManifest {
        &self.manifest
    }

    /// Length of the player executable before the payload region
    pub fn base_image_len(&self) -> u64 {
        self.manifest
            .items()
            .map(|e| e.offset)
            .chain(self.manifest.app_icon.map(|r| r.offset))
            .chain(std::iter::once(self.manifest.project_document.offset))
            .min()
            .unwrap_or(self.manifest_offset)
    }

    /// Read the serialized project document
    pub fn read_project_document(&self) -> PackResult<Vec<u8>> {
        read_range(&self.path, self.manifest.project_document, "project document")
    }

    /// Read a media item or button image by id
    pub fn read_item(&self, id: &str) -> PackResult<Vec<u8>> {
        read_item(&self.path, &self.manifest, id)
    }

    /// Read the app icon, if one was embedded
    pub fn read_icon(&self) -> PackResult<Option<Vec<u8>>> {
        read_icon(&self.path, &self.manifest)
    }

    /// [`read_item`](Self::read_item), recorded as a phase in `metrics`
    pub fn read_item_with_metrics(
        &self,
        id: &str,
        metrics: &mut ReadMetrics,
    ) -> PackResult<Vec<u8>> {
        metrics.time_phase(format!("item '{}'", id), || self.read_item(id))
    }

    /// [`read_project_document`](Self::read_project_document), recorded as a
    /// phase in `metrics`
    pub fn read_project_document_with_metrics(
        &self,
        metrics: &mut ReadMetrics,
    ) -> PackResult<Vec<u8>> {
        metrics.time_phase("project_document", || self.read_project_document())
    }

    /// Stream an item into `writer` without buffering it whole
    pub fn copy_item_to<W: Write + ?Sized>(&self, id: &str, writer: &mut W) -> PackResult<u64> {
        let entry = self
            .manifest
            .find_item(id)
            .ok_or_else(|| PackError::UnknownItem(id.to_string()))?;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(entry.offset))?;
        let what = format!("item '{}'", id);
        copy_exact(
            &mut file.take(entry.size),
            writer,
            entry.size,
            DEFAULT_BUFFER_SIZE,
            &what,
            |_| {},
        )
    }
}

/// Read the project document described by `manifest`
pub fn read_project_document(path: &Path, manifest: &BuildManifest) -> PackResult<Vec<u8>> {
    read_range(path, manifest.project_document, "project document")
}

/// Read a media item or button image by id
pub fn read_item(path: &Path, manifest: &BuildManifest, id: &str) -> PackResult<Vec<u8>> {
    let entry = manifest
        .find_item(id)
        .ok_or_else(|| PackError::UnknownItem(id.to_string()))?;
    read_range(path, entry.range(), &format!("item '{}'", id))
}

/// Read the app icon, returning `None` when none was embedded
pub fn read_icon(path: &Path, manifest: &BuildManifest) -> PackResult<Option<Vec<u8>>> {
    match manifest.app_icon {
        Some(range) => read_range(path, range, "app icon").map(Some),
        None => Ok(None),
    }
}

fn read_range(path: &Path, range: BlockRange, what: &str) -> PackResult<Vec<u8>> {
    let mut file = File::open(path)?;
    read_exact_at(&mut file, range.offset, range.size, what)
}

/// Start-up state of the running player
///
/// Computed once by [`EmbeddedState::probe`] and handed to whatever needs it.
#[derive(Debug, Clone)]
pub enum EmbeddedState {
    /// Plain player; open a tutorial file instead
    NotEmbedded,
    /// Packed tutorial with a valid manifest
    Embedded(Arc<EmbeddedPayload>),
    /// Packed tutorial that cannot be loaded
    Corrupt(Arc<PackError>),
}

impl EmbeddedState {
    /// Classify `path`
    pub fn probe(path: &Path) -> Self {
        match detect(path) {
            Ok(Detection::NotEmbedded) => EmbeddedState::NotEmbedded,
            Ok(Detection::Embedded(payload)) => EmbeddedState::Embedded(Arc::new(payload)),
            Err(e) => {
                tracing::warn!("Embedded tutorial in {} is unusable: {}", path.display(), e);
                EmbeddedState::Corrupt(Arc::new(e))
            }
        }
    }

    /// Classify the running executable
    pub fn probe_current_exe() -> Self {
        match std::env::current_exe() {
            Ok(path) => Self::probe(&path),
            Err(e) => EmbeddedState::Corrupt(Arc::new(e.into())),
        }
    }

    /// Payload, if the state allows reads
    pub fn payload(&self) -> Option<&Arc<EmbeddedPayload>> {
        match self {
            EmbeddedState::Embedded(payload) => Some(payload),
            _ => None,
        }
    }

    /// User-facing description of the state
    pub fn describe(&self) -> String {
        match self {
            EmbeddedState::NotEmbedded => {
                "Not a packaged tutorial; open a tutorial file instead".to_string()
            }
            EmbeddedState::Embedded(payload) => format!(
                "Packaged tutorial with {} media and {} buttons",
                payload.manifest().media.len(),
                payload.manifest().buttons.len()
            ),
            EmbeddedState::Corrupt(e) => format!("Packaged tutorial is damaged: {}", e),
        }
    }
}
