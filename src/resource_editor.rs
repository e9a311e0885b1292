//! Windows executable icon patching
//!
//! rcedit (https://github.com/electron/rcedit) swaps the icon resource of the
//! copied player. It rewrites the PE file in place and may change its length,
//! so the packer runs it before appending any payload.

use crate::icon::IconFormat;
use crate::packer::ExecutablePatch;
use crate::{PackError, PackResult};
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

const RCEDIT_RELEASE: &str = "v2.0.0";
const RCEDIT_FILE: &str = "rcedit-x64.exe";

/// A complete rcedit-x64.exe is around 1.3 MB; anything far smaller is a
/// truncated download or an error page.
const RCEDIT_MIN_LEN: u64 = 500_000;

fn rcedit_url() -> String {
    format!(
        "https://github.com/electron/rcedit/releases/download/{}/{}",
        RCEDIT_RELEASE, RCEDIT_FILE
    )
}

fn tool_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tutorial-pack")
        .join("tools")
}

/// Handle to an rcedit executable
#[derive(Debug, Clone)]
pub struct ResourceEditor {
    rcedit_path: PathBuf,
}

impl ResourceEditor {
    /// Use the cached rcedit, downloading it on first use
    pub fn new() -> PackResult<Self> {
        let cache = tool_cache_dir();
        let rcedit_path = cache.join(RCEDIT_FILE);
        if !Self::is_usable(&rcedit_path) {
            Self::install(&cache, &rcedit_path)?;
        }
        Ok(Self { rcedit_path })
    }

    /// Use an rcedit binary that is already on disk
    pub fn with_rcedit_path(path: impl Into<PathBuf>) -> PackResult<Self> {
        let rcedit_path = path.into();
        if !rcedit_path.is_file() {
            return Err(PackError::ResourceEdit(format!(
                "rcedit not found at {}",
                rcedit_path.display()
            )));
        }
        Ok(Self { rcedit_path })
    }

    /// Path of the rcedit executable in use
    pub fn rcedit_path(&self) -> &Path {
        &self.rcedit_path
    }

    fn is_usable(path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(meta) if meta.len() >= RCEDIT_MIN_LEN => {
                tracing::debug!("Found cached rcedit at {}", path.display());
                true
            }
            Ok(meta) => {
                tracing::warn!(
                    "Ignoring cached rcedit at {} ({} bytes)",
                    path.display(),
                    meta.len()
                );
                false
            }
            Err(_) => false,
        }
    }

    fn install(cache: &Path, target: &Path) -> PackResult<()> {
        fs::create_dir_all(cache)?;
        tracing::info!("Fetching rcedit {} into {}", RCEDIT_RELEASE, cache.display());

        let bytes = fetch(&rcedit_url())?;
        if (bytes.len() as u64) < RCEDIT_MIN_LEN {
            return Err(PackError::ResourceEdit(format!(
                "downloaded rcedit is only {} bytes",
                bytes.len()
            )));
        }

        // Concurrent exports may race here; the rename keeps the cache whole
        let mut staged = tempfile::NamedTempFile::new_in(cache)?;
        staged.write_all(&bytes)?;
        staged.flush()?;
        staged
            .persist(target)
            .map_err(|e| PackError::ResourceEdit(format!("cannot cache rcedit: {}", e)))?;

        tracing::info!("Cached rcedit ({} bytes)", bytes.len());
        Ok(())
    }

    /// Replace the icon resource of `exe_path` with the `.ico` at `icon_path`
    pub fn set_icon(&self, exe_path: &Path, icon_path: &Path) -> PackResult<()> {
        let header = fs::read(icon_path).map_err(|e| {
            PackError::ResourceEdit(format!("cannot read icon {}: {}", icon_path.display(), e))
        })?;
        if IconFormat::from_bytes(&header) != Some(IconFormat::Ico) {
            return Err(PackError::ResourceEdit(format!(
                "{} is not an .ico file",
                icon_path.display()
            )));
        }

        tracing::info!("Patching icon of {}", exe_path.display());
        self.run([
            exe_path.as_os_str(),
            OsStr::new("--set-icon"),
            icon_path.as_os_str(),
        ])
    }

    fn run<'a>(&self, args: impl IntoIterator<Item = &'a OsStr>) -> PackResult<()> {
        let output = Command::new(&self.rcedit_path)
            .args(args)
            .output()
            .map_err(|e| {
                PackError::ResourceEdit(format!(
                    "cannot start {}: {}",
                    self.rcedit_path.display(),
                    e
                ))
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(PackError::ResourceEdit(format!(
                "rcedit exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[cfg(target_os = "windows")]
fn fetch(url: &str) -> PackResult<Vec<u8>> {
    let staged = tempfile::Builder::new()
        .prefix("rcedit-")
        .suffix(".exe")
        .tempfile()?
        .into_temp_path();
    let script = format!(
        "[Net.ServicePointManager]::SecurityProtocol = [Net.SecurityProtocolType]::Tls12; \
         Invoke-WebRequest -Uri '{}' -OutFile '{}' -UseBasicParsing",
        url,
        staged.display()
    );
    let output = Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", &script])
        .output()
        .map_err(|e| PackError::ResourceEdit(format!("cannot start PowerShell: {}", e)))?;
    if !output.status.success() {
        return Err(PackError::ResourceEdit(format!(
            "rcedit download failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(fs::read(&staged)?)
}

#[cfg(not(target_os = "windows"))]
fn fetch(url: &str) -> PackResult<Vec<u8>> {
    let output = Command::new("curl")
        .args(["--fail", "--silent", "--show-error", "--location", url])
        .output()
        .map_err(|e| PackError::ResourceEdit(format!("cannot start curl: {}", e)))?;
    if !output.status.success() {
        return Err(PackError::ResourceEdit(format!(
            "rcedit download failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

/// Icon step for [`crate::Packer`]
///
/// Holds the converted `.ico` in a temp file that is removed on drop.
pub struct IconPatch {
    editor: ResourceEditor,
    ico: tempfile::TempPath,
}

impl IconPatch {
    /// Convert `icon` (PNG, JPEG or ICO bytes) and prepare a patch step
    pub fn prepare(editor: ResourceEditor, icon: &[u8]) -> PackResult<Self> {
        let ico_bytes = crate::icon::convert_to_ico(icon)?;
        let mut file = tempfile::Builder::new()
            .prefix("tutorial-icon-")
            .suffix(".ico")
            .tempfile()?;
        file.write_all(&ico_bytes)?;
        file.flush()?;
        Ok(Self {
            editor,
            ico: file.into_temp_path(),
        })
    }

    /// Path of the converted `.ico`
    pub fn ico_path(&self) -> &Path {
        &self.ico
    }
}

impl ExecutablePatch for IconPatch {
    fn name(&self) -> &str {
        "rcedit icon patch"
    }

    fn apply(&self, exe_path: &Path) -> PackResult<()> {
        self.editor.set_icon(exe_path, &self.ico)
    }
}
