//! Container footer format
//!
//! A packed tutorial is the player executable with a payload region, a JSON
//! manifest and a fixed-size footer appended to it:
//!
//! ```text
//! [Base Executable]
//! [Payload Region]
//!   - media blocks, button blocks, app icon, project document
//! [Manifest JSON]
//! [Footer]
//!   - Manifest Length: u64 LE (8 bytes)
//!   - Magic: "VISTUT_V1" (9 bytes)
//! ```
//!
//! The footer is located by seeking backward from the end of the file, so the
//! manifest never has to record its own position.

/// Magic bytes identifying a packed tutorial, format version 1
pub const MAGIC: &[u8; 9] = b"VISTUT_V1";

/// Length of the magic marker in bytes
pub const MAGIC_LEN: usize = MAGIC.len();

/// Width of the manifest length field in bytes
pub const SIZE_FIELD_LEN: usize = 8;

/// Footer size in bytes (manifest length: 8 + magic: 9)
pub const FOOTER_LEN: usize = SIZE_FIELD_LEN + MAGIC_LEN;

/// Largest manifest the reader will load (16 MiB)
///
/// A damaged length field must not make detection allocate the whole file.
pub const MAX_MANIFEST_LEN: u64 = 16 * 1024 * 1024;

/// Encode the footer for a manifest of `manifest_len` bytes
pub fn encode_footer(manifest_len: u64) -> [u8; FOOTER_LEN] {
    let mut footer = [0u8; FOOTER_LEN];
    footer[..SIZE_FIELD_LEN].copy_from_slice(&manifest_len.to_le_bytes());
    footer[SIZE_FIELD_LEN..].copy_from_slice(MAGIC);
    footer
}

/// Decode a footer, returning the manifest length
///
/// Returns `None` when the trailing bytes are not the magic marker, which is
/// the normal shape of a standalone player executable.
pub fn decode_footer(footer: &[u8; FOOTER_LEN]) -> Option<u64> {
    if &footer[SIZE_FIELD_LEN..] != MAGIC {
        return None;
    }
    let mut size_bytes = [0u8; SIZE_FIELD_LEN];
    size_bytes.copy_from_slice(&footer[..SIZE_FIELD_LEN]);
    Some(u64::from_le_bytes(size_bytes))
}
