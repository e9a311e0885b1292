//! Tutorial Pack - Self-Extracting Tutorial Executables
//!
//! This crate packages an interactive touch-screen tutorial (project document,
//! page media, button images and an optional app icon) into a single
//! standalone executable, and reads that payload back at runtime.
//!
//! # Design
//!
//! The tutorial player is itself the packaging target:
//!
//! 1. During export, the player executable is copied
//! 2. Optional resource edits (the app icon) are applied to the copy
//! 3. Media, buttons, icon and project document are appended, followed by a
//!    manifest and a fixed-size footer
//! 4. On startup, the player checks its own file for the footer and either
//!    plays the embedded tutorial or falls back to opening a tutorial file
//!
//! # Quick Start
//!
//! ```no_run
//! use tutorial_pack::{detect, Detection, NamedSource, PackRequest, Packer};
//!
//! let request = PackRequest::new("player.exe", "dist/tutorial.exe", br#"{"pages":[]}"#.to_vec())
//!     .with_media(NamedSource::new("m1", "intro.mp4", "video/mp4", std::path::PathBuf::from("intro.mp4")));
//! let output = Packer::new().pack(&request)?;
//!
//! if let Detection::Embedded(payload) = detect(&output.executable)? {
//!     let video = payload.read_item("m1")?;
//!     # let _ = video;
//! }
//! # Ok::<(), tutorial_pack::PackError>(())
//! ```
//!
//! # Container Format
//!
//! ```text
//! [Player Executable]
//! [Payload Region]
//!   - Media blocks (in manifest order)
//!   - Button image blocks
//!   - App icon (optional)
//!   - Project document
//! [Manifest JSON]
//! [Footer]
//!   - Manifest Length: u64 LE (8 bytes)
//!   - Magic: "VISTUT_V1" (9 bytes)
//! ```
//!
//! Block offsets in the manifest are absolute positions in the final file.

mod config;
mod error;
pub mod format;
pub mod icon;
mod manifest;
mod metrics;
mod packer;
pub mod progress;
mod reader;
mod resource_editor;
mod source;
pub mod stream;

// Re-export public API
pub use config::{IconSection, PackOptions, PackSection, StreamingSection};
pub use error::{PackError, PackResult};
pub use format::{FOOTER_LEN, MAGIC, MAGIC_LEN, MAX_MANIFEST_LEN, SIZE_FIELD_LEN};
pub use icon::{convert_to_ico, IconFormat};
pub use manifest::{BlockRange, BuildManifest, ItemEntry};
pub use metrics::ReadMetrics;
pub use packer::{
    export, ExecutablePatch, ExportFile, ExportRequest, PackOutput, PackRequest, Packer,
};
pub use progress::{ExportProgress, NoProgress, ProgressSink, ProgressStyles};
pub use reader::{
    detect, detect_with_metrics, read_icon, read_item, read_project_document, Detection,
    EmbeddedPayload, EmbeddedState,
};
pub use resource_editor::{IconPatch, ResourceEditor};
pub use source::{NamedSource, PayloadSource, SourceSpooler, DEFAULT_INLINE_THRESHOLD};
pub use stream::DEFAULT_BUFFER_SIZE;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if the current executable carries a valid embedded tutorial
pub fn is_packed() -> bool {
    let exe_path = match std::env::current_exe() {
        Ok(p) => p,
        Err(_) => return false,
    };
    matches!(detect(&exe_path), Ok(Detection::Embedded(_)))
}

/// Detect an embedded tutorial in the current executable
pub fn detect_current() -> PackResult<Detection> {
    let exe_path = std::env::current_exe()?;
    detect(&exe_path)
}
