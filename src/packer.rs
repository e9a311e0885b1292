//! Main packer implementation
//!
//! The packer copies a player executable, optionally patches it, and appends
//! the tutorial payload, manifest and footer. Order matters: anything that
//! rewrites the executable (rcedit in particular) runs before the first
//! payload byte is written, and the payload start offset is read back from
//! disk after that step.

use crate::format::{encode_footer, MAX_MANIFEST_LEN};
use crate::manifest::{BlockRange, BuildManifest, ItemEntry};
use crate::progress::{ExportProgress, NoProgress, ProgressSink};
use crate::resource_editor::{IconPatch, ResourceEditor};
use crate::source::{check_sources, NamedSource, PayloadSource, SourceSpooler};
use crate::stream::{copy_exact, DEFAULT_BUFFER_SIZE};
use crate::{PackError, PackOptions, PackResult};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// A mutation of the copied executable that must happen before payload append
///
/// Implementations may change the file length arbitrarily.
pub trait ExecutablePatch {
    /// Short description for logs and errors
    fn name(&self) -> &str;

    /// Modify the executable at `exe_path` in place
    fn apply(&self, exe_path: &Path) -> PackResult<()>;
}

impl<F> ExecutablePatch for F
where
    F: Fn(&Path) -> PackResult<()>,
{
    fn name(&self) -> &str {
        "custom patch"
    }

    fn apply(&self, exe_path: &Path) -> PackResult<()> {
        self(exe_path)
    }
}

/// Everything needed to produce one tutorial executable
#[derive(Debug, Clone)]
pub struct PackRequest {
    /// Player executable to copy
    pub base_image: PathBuf,
    /// Destination path
    pub output: PathBuf,
    /// Serialized project document
    pub project_document: Vec<u8>,
    /// Page media
    pub media: Vec<NamedSource>,
    /// Button images
    pub buttons: Vec<NamedSource>,
    /// Optional application icon
    pub app_icon: Option<PayloadSource>,
}

impl PackRequest {
    pub fn new(
        base_image: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        project_document: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            base_image: base_image.into(),
            output: output.into(),
            project_document: project_document.into(),
            media: Vec::new(),
            buttons: Vec::new(),
            app_icon: None,
        }
    }

    /// Add a page media item
    pub fn with_media(mut self, source: NamedSource) -> Self {
        self.media.push(source);
        self
    }

    /// Add a button image
    pub fn with_button(mut self, source: NamedSource) -> Self {
        self.buttons.push(source);
        self
    }

    /// Set the application icon
    pub fn with_app_icon(mut self, source: impl Into<PayloadSource>) -> Self {
        self.app_icon = Some(source.into());
        self
    }

    /// Move inline blobs at or above the spooler's threshold into temp files
    ///
    /// Returns how many blobs were spooled. The spooler owns the files, so it
    /// must outlive the pack call.
    pub fn spool_large_sources(&mut self, spooler: &mut SourceSpooler) -> PackResult<usize> {
        let sources = self
            .media
            .iter_mut()
            .chain(self.buttons.iter_mut())
            .map(|item| &mut item.source)
            .chain(self.app_icon.as_mut());

        let mut spooled = 0;
        for source in sources {
            let data = match source {
                PayloadSource::Inline(data) => std::mem::take(data),
                PayloadSource::File(_) => continue,
            };
            *source = spooler.source_for(data)?;
            if source.path().is_some() {
                spooled += 1;
            }
        }
        Ok(spooled)
    }
}

/// One file in an [`ExportRequest`], carried inline or by path
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub data: Option<Vec<u8>>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

impl ExportFile {
    fn into_named_source(self) -> PackResult<NamedSource> {
        let source = match (self.data, self.file_path) {
            (Some(data), None) => PayloadSource::Inline(data),
            (None, Some(path)) => PayloadSource::File(path),
            (Some(_), Some(_)) => {
                return Err(PackError::Config(format!(
                    "'{}' has both inline data and a file path",
                    self.id
                )))
            }
            (None, None) => {
                return Err(PackError::Config(format!(
                    "'{}' has neither inline data nor a file path",
                    self.id
                )))
            }
        };
        Ok(NamedSource {
            id: self.id,
            name: self.name,
            mime_type: self.mime_type,
            source,
        })
    }
}

/// Export request as sent by the authoring tool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    pub project_json: String,
    #[serde(default)]
    pub media_files: Vec<ExportFile>,
    #[serde(default)]
    pub button_files: Vec<ExportFile>,
    #[serde(default)]
    pub app_icon: Option<Vec<u8>>,
    #[serde(default)]
    pub app_icon_path: Option<PathBuf>,
}

impl ExportRequest {
    /// Parse a JSON export request
    pub fn from_json(json: &str) -> PackResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Convert into a [`PackRequest`] using `base_image` as the player
    pub fn into_pack_request(self, base_image: impl Into<PathBuf>) -> PackResult<PackRequest> {
        let output = self
            .output_path
            .ok_or_else(|| PackError::Config("export request has no output path".to_string()))?;
        let app_icon = match (self.app_icon, self.app_icon_path) {
            (Some(data), None) => Some(PayloadSource::Inline(data)),
            (None, Some(path)) => Some(PayloadSource::File(path)),
            (None, None) => None,
            (Some(_), Some(_)) => {
                return Err(PackError::Config(
                    "app icon has both inline data and a file path".to_string(),
                ))
            }
        };

        Ok(PackRequest {
            base_image: base_image.into(),
            output,
            project_document: self.project_json.into_bytes(),
            media: self
                .media_files
                .into_iter()
                .map(ExportFile::into_named_source)
                .collect::<PackResult<_>>()?,
            buttons: self
                .button_files
                .into_iter()
                .map(ExportFile::into_named_source)
                .collect::<PackResult<_>>()?,
            app_icon,
        })
    }
}

/// Result of a pack operation
#[derive(Debug, Clone)]
pub struct PackOutput {
    /// Path to the generated executable
    pub executable: PathBuf,
    /// Size of the executable in bytes
    pub size: u64,
    /// Length of the (possibly patched) base image, where the payload starts
    pub base_len: u64,
    /// Manifest written into the container
    pub manifest: BuildManifest,
}

/// Packer for creating standalone tutorial executables
pub struct Packer {
    patch: Option<Box<dyn ExecutablePatch>>,
    buffer_size: usize,
}

impl Default for Packer {
    fn default() -> Self {
        Self::new()
    }
}

impl Packer {
    /// Create a packer with no patch step and the default copy buffer
    pub fn new() -> Self {
        Self {
            patch: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Create a packer using the streaming settings from `options`
    pub fn from_options(options: &PackOptions) -> Self {
        Self::new().with_buffer_size(options.streaming.buffer_size)
    }

    /// Run `patch` on the copied executable before payload append
    pub fn with_patch(mut self, patch: impl ExecutablePatch + 'static) -> Self {
        self.patch = Some(Box::new(patch));
        self
    }

    /// Set the copy buffer size for path-based sources
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Pack the tutorial into a standalone executable
    pub fn pack(&self, request: &PackRequest) -> PackResult<PackOutput> {
        self.pack_with_progress(request, &mut NoProgress)
    }

    /// Pack, reporting one progress event per appended block
    ///
    /// The output only appears at `request.output` once it is complete; on
    /// any failure the working file is removed.
    pub fn pack_with_progress(
        &self,
        request: &PackRequest,
        progress: &mut dyn ProgressSink,
    ) -> PackResult<PackOutput> {
        let unreadable = |source: io::Error| PackError::BaseImageUnreadable {
            path: request.base_image.clone(),
            source,
        };
        let mut base = File::open(&request.base_image).map_err(unreadable)?;
        if !base.metadata().map_err(unreadable)?.is_file() {
            return Err(unreadable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        check_sources(&request.media, &request.buttons)?;
        if let Some(PayloadSource::File(path)) = &request.app_icon {
            if !path.is_file() {
                return Err(PackError::SourceNotFound(path.clone()));
            }
        }

        tracing::info!("Packing to: {}", request.output.display());

        // Working copy next to the destination so the final rename is atomic
        let work = create_work_file(&request.output)?;
        let copied =
            copy_base(&mut base, work.as_file(), self.buffer_size).map_err(|e| match e {
                BaseCopyError::Read(source) => unreadable(source),
                BaseCopyError::Write(source) => PackError::Io(source),
            })?;
        work.as_file().sync_all()?;
        drop(base);
        tracing::debug!("Copied {} byte base image", copied);
        let work_path = work.into_temp_path();

        if let Some(patch) = &self.patch {
            tracing::info!("Applying {} before payload append", patch.name());
            patch
                .apply(&work_path)
                .map_err(|e| PackError::ExternalStep(format!("{}: {}", patch.name(), e)))?;
        }

        // Re-read from disk: the patch may have resized the executable
        let base_len = fs::metadata(&work_path)?.len();
        tracing::debug!("Payload region starts at {}", base_len);

        let file = fs::OpenOptions::new().append(true).open(&work_path)?;
        let mut writer = BufWriter::with_capacity(self.buffer_size, file);
        let mut appender = BlockAppender {
            writer: &mut writer,
            running: base_len,
            buffer_size: self.buffer_size,
            index: 0,
            total: request.media.len()
                + request.buttons.len()
                + usize::from(request.app_icon.is_some())
                + 1,
            progress,
        };

        let media = request
            .media
            .iter()
            .map(|item| appender.append_item(item, "media"))
            .collect::<PackResult<Vec<_>>>()?;
        let buttons = request
            .buttons
            .iter()
            .map(|item| appender.append_item(item, "button"))
            .collect::<PackResult<Vec<_>>>()?;
        let app_icon = match &request.app_icon {
            Some(source) => Some(appender.append(source, "app icon")?),
            None => None,
        };
        let project_document = appender.append(
            &PayloadSource::Inline(request.project_document.clone()),
            "project document",
        )?;
        let payload_end = appender.running;

        let manifest = BuildManifest {
            project_document,
            media,
            buttons,
            app_icon,
        };
        let manifest_bytes = manifest.encode()?;
        if manifest_bytes.len() as u64 > MAX_MANIFEST_LEN {
            return Err(PackError::Config(format!(
                "manifest is {} bytes, over the {} byte limit",
                manifest_bytes.len(),
                MAX_MANIFEST_LEN
            )));
        }
        writer.write_all(&manifest_bytes)?;
        writer.write_all(&encode_footer(manifest_bytes.len() as u64))?;
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| io::Error::other(e.to_string()))?;
        file.sync_all()?;
        drop(file);

        let size = fs::metadata(&work_path)?.len();
        let expected = payload_end + manifest_bytes.len() as u64 + crate::FOOTER_LEN as u64;
        if size != expected {
            return Err(PackError::Io(io::Error::other(format!(
                "container is {} bytes, expected {}",
                size, expected
            ))));
        }

        work_path
            .persist(&request.output)
            .map_err(|e| PackError::Io(e.error))?;

        tracing::info!(
            "Pack complete: {} ({:.2} MB, {} media, {} buttons, manifest {} bytes)",
            request.output.display(),
            size as f64 / (1024.0 * 1024.0),
            manifest.media.len(),
            manifest.buttons.len(),
            manifest_bytes.len()
        );

        Ok(PackOutput {
            executable: request.output.clone(),
            size,
            base_len,
            manifest,
        })
    }
}

/// Export an authoring-tool request using `options`
///
/// On Windows, when `options.icon.enabled` and the request carries an app
/// icon, the icon is patched into the player's resources before payload
/// append.
pub fn export(mut request: ExportRequest, options: &PackOptions) -> PackResult<PackOutput> {
    options.validate()?;
    if request.output_path.is_none() {
        request.output_path = options.pack.output.clone();
    }
    let mut request = request.into_pack_request(options.base_image()?)?;

    let mut spooler = SourceSpooler::new()?.with_threshold(options.streaming.inline_threshold);
    let spooled = request.spool_large_sources(&mut spooler)?;
    if spooled > 0 {
        tracing::debug!("Spooled {} large blobs to {}", spooled, spooler.dir().display());
    }

    let mut packer = Packer::from_options(options);

    if cfg!(target_os = "windows") && options.icon.enabled {
        if let Some(icon) = &request.app_icon {
            packer = packer.with_patch(icon_patch(icon, options)?);
        }
    }

    // The spooled files are read by `pack`, so the spooler lives until it returns
    let output = packer.pack(&request);
    drop(spooler);
    output
}

fn icon_patch(icon: &PayloadSource, options: &PackOptions) -> PackResult<IconPatch> {
    let prepare = || -> PackResult<IconPatch> {
        let icon_bytes = match icon {
            PayloadSource::Inline(data) => data.clone(),
            PayloadSource::File(path) => fs::read(path)?,
        };
        let editor = match &options.icon.rcedit {
            Some(path) => ResourceEditor::with_rcedit_path(path)?,
            None => ResourceEditor::new()?,
        };
        IconPatch::prepare(editor, &icon_bytes)
    };
    prepare().map_err(|e| PackError::ExternalStep(format!("icon patch: {}", e)))
}

enum BaseCopyError {
    Read(io::Error),
    Write(io::Error),
}

/// Copy the base image, keeping read failures apart from write failures
fn copy_base(
    base: &mut File,
    mut out: &File,
    buffer_size: usize,
) -> Result<u64, BaseCopyError> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut copied = 0u64;
    loop {
        let n = match base.read(&mut buffer) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BaseCopyError::Read(e)),
        };
        out.write_all(&buffer[..n]).map_err(BaseCopyError::Write)?;
        copied += n as u64;
    }
}

/// Appends blocks back-to-back, tracking the running file length
struct BlockAppender<'a, W: Write> {
    writer: &'a mut W,
    running: u64,
    buffer_size: usize,
    index: usize,
    total: usize,
    progress: &'a mut dyn ProgressSink,
}

impl<W: Write> BlockAppender<'_, W> {
    fn append(&mut self, source: &PayloadSource, what: &str) -> PackResult<BlockRange> {
        let size = source.len()?;
        let mut reader = source.open()?;
        let offset = self.running;

        copy_exact(
            &mut reader,
            &mut *self.writer,
            size,
            self.buffer_size,
            what,
            |_| {},
        )?;
        self.running += size;

        tracing::debug!("Appended {} at {} ({} bytes)", what, offset, size);

        self.progress.report(&ExportProgress {
            index: self.index,
            total: self.total,
            name: what.to_string(),
            percent: (self.index + 1) as f64 / self.total as f64 * 100.0,
        });
        self.index += 1;

        Ok(BlockRange::new(offset, size))
    }

    fn append_item(&mut self, item: &NamedSource, kind: &str) -> PackResult<ItemEntry> {
        let range = self.append(&item.source, &format!("{} '{}'", kind, item.name))?;
        Ok(ItemEntry {
            id: item.id.clone(),
            name: item.name.clone(),
            mime_type: item.mime_type.clone(),
            offset: range.offset,
            size: range.size,
        })
    }
}

fn create_work_file(output: &Path) -> PackResult<tempfile::NamedTempFile> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let unwritable = |source: io::Error| PackError::OutputUnwritable {
        path: output.to_path_buf(),
        source,
    };

    fs::create_dir_all(&dir).map_err(unwritable)?;

    // Keep the extension; resource editors may refuse files without `.exe`
    let suffix = output
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(".tutorial-pack-")
        .suffix(&suffix)
        .tempfile_in(&dir)
        .map_err(unwritable)
}
