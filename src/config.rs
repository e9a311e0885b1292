//! Pack options file (`tutorial.pack.toml`)
//!
//! ```toml
//! [pack]
//! base_image = "./player.exe"    # defaults to the running executable
//! output = "./dist/tutorial.exe"
//!
//! [streaming]
//! inline_threshold = 10485760    # blobs at or above this are spooled to disk
//! buffer_size = 65536            # copy buffer for path-based sources
//!
//! [icon]
//! enabled = true
//! rcedit = "./tools/rcedit-x64.exe"
//! ```

use crate::source::DEFAULT_INLINE_THRESHOLD;
use crate::stream::DEFAULT_BUFFER_SIZE;
use crate::{PackError, PackResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Output locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackSection {
    /// Player executable to copy (defaults to the running executable)
    #[serde(default)]
    pub base_image: Option<PathBuf>,

    /// Destination of the packed tutorial
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// Streaming limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingSection {
    #[serde(default = "default_inline_threshold")]
    pub inline_threshold: u64,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for StreamingSection {
    fn default() -> Self {
        Self {
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

fn default_inline_threshold() -> u64 {
    DEFAULT_INLINE_THRESHOLD
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_true() -> bool {
    true
}

/// Executable icon patching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconSection {
    /// Patch the app icon into the executable resources (Windows only)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Explicit rcedit path; downloaded and cached when absent
    #[serde(default)]
    pub rcedit: Option<PathBuf>,
}

impl Default for IconSection {
    fn default() -> Self {
        Self {
            enabled: true,
            rcedit: None,
        }
    }
}

/// Options for exporting a tutorial executable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackOptions {
    #[serde(default)]
    pub pack: PackSection,

    #[serde(default)]
    pub streaming: StreamingSection,

    #[serde(default)]
    pub icon: IconSection,
}

impl PackOptions {
    /// Parse options from TOML text
    pub fn parse(content: &str) -> PackResult<Self> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a file, resolving relative paths against its directory
    pub fn from_file(path: impl AsRef<Path>) -> PackResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PackError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut options = Self::parse(&content)?;
        if let Some(base_dir) = path.parent() {
            options.resolve_paths(base_dir);
        }
        Ok(options)
    }

    /// Find an options file in a directory
    pub fn find_in_dir(dir: impl AsRef<Path>) -> Option<PathBuf> {
        let dir = dir.as_ref();
        ["tutorial.pack.toml", "pack.toml"]
            .into_iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Validate option values
    pub fn validate(&self) -> PackResult<()> {
        if self.streaming.buffer_size == 0 {
            return Err(PackError::Config(
                "streaming.buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.streaming.inline_threshold == 0 {
            return Err(PackError::Config(
                "streaming.inline_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Base image path, falling back to the running executable
    pub fn base_image(&self) -> PackResult<PathBuf> {
        match &self.pack.base_image {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_exe()?),
        }
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |p: &mut Option<PathBuf>| {
            if let Some(path) = p.as_mut() {
                if path.is_relative() {
                    *path = base_dir.join(&*path);
                }
            }
        };
        resolve(&mut self.pack.base_image);
        resolve(&mut self.pack.output);
        resolve(&mut self.icon.rcedit);
    }
}
