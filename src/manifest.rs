//! Build manifest describing every block in the payload region
//!
//! The manifest is stored as a small JSON envelope:
//!
//! ```json
//! {"manifest":{"projectDocument":{"offset":10,"size":12},...},"blake3":"<hex>"}
//! ```
//!
//! The BLAKE3 digest covers the exact bytes of the `manifest` value, so any
//! damage to the manifest region is reported as corruption instead of
//! yielding a manifest with silently different offsets.

use crate::{PackError, PackResult};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::HashSet;

/// Location of one contiguous block inside the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockRange {
    /// Absolute byte offset from the start of the file
    pub offset: u64,
    /// Block length in bytes
    pub size: u64,
}

impl BlockRange {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// One past the last byte, or `None` on overflow
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }

    /// Whether two non-empty ranges share at least one byte
    pub fn overlaps(&self, other: &BlockRange) -> bool {
        if self.size == 0 || other.size == 0 {
            return false;
        }
        match (self.end(), other.end()) {
            (Some(a_end), Some(b_end)) => self.offset < b_end && other.offset < a_end,
            _ => true,
        }
    }
}

/// A named media file or button image embedded in the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ItemEntry {
    /// Identifier the project document uses to reference this item
    pub id: String,
    /// Original file name
    pub name: String,
    /// MIME type (e.g. `video/mp4`, `image/png`)
    pub mime_type: String,
    pub offset: u64,
    pub size: u64,
}

impl ItemEntry {
    pub fn range(&self) -> BlockRange {
        BlockRange::new(self.offset, self.size)
    }
}

/// Manifest of a packed tutorial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BuildManifest {
    /// Serialized project document
    pub project_document: BlockRange,
    /// Page media, in append order
    pub media: Vec<ItemEntry>,
    /// Button images, in append order
    pub buttons: Vec<ItemEntry>,
    /// Optional application icon
    #[serde(default)]
    pub app_icon: Option<BlockRange>,
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    manifest: &'a RawValue,
    blake3: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvelopeIn<'a> {
    #[serde(borrow)]
    manifest: &'a RawValue,
    blake3: String,
}

impl BuildManifest {
    /// Media entries followed by button entries
    pub fn items(&self) -> impl Iterator<Item = &ItemEntry> {
        self.media.iter().chain(self.buttons.iter())
    }

    /// Look up a media or button entry by id
    pub fn find_item(&self, id: &str) -> Option<&ItemEntry> {
        self.items().find(|e| e.id == id)
    }

    /// Total number of payload blocks (items, icon and project document)
    pub fn block_count(&self) -> usize {
        self.media.len() + self.buttons.len() + usize::from(self.app_icon.is_some()) + 1
    }

    /// Serialize into the on-disk envelope
    pub fn encode(&self) -> PackResult<Vec<u8>> {
        let body = serde_json::to_string(self)?;
        let digest = blake3::hash(body.as_bytes()).to_hex().to_string();
        let raw = RawValue::from_string(body)?;
        let envelope = EnvelopeOut {
            manifest: &*raw,
            blake3: digest,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Parse the on-disk envelope, verifying its digest
    pub fn decode(bytes: &[u8]) -> PackResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| PackError::CorruptManifest(format!("invalid UTF-8: {}", e)))?;

        let envelope: EnvelopeIn<'_> = serde_json::from_str(text)
            .map_err(|e| PackError::CorruptManifest(format!("invalid envelope: {}", e)))?;

        let body = envelope.manifest.get();
        let actual = blake3::hash(body.as_bytes()).to_hex();
        if actual.as_str() != envelope.blake3 {
            return Err(PackError::CorruptManifest(format!(
                "digest mismatch: recorded {}, computed {}",
                envelope.blake3,
                actual.as_str()
            )));
        }

        serde_json::from_str(body)
            .map_err(|e| PackError::CorruptManifest(format!("invalid manifest: {}", e)))
    }

    /// Check internal consistency against the end of the payload region
    ///
    /// Every block must end at or before `payload_end` and no two non-empty
    /// blocks may overlap. Item ids must be unique across media and buttons.
    pub fn validate(&self, payload_end: u64) -> PackResult<()> {
        let mut seen = HashSet::new();
        for item in self.items() {
            if !seen.insert(item.id.as_str()) {
                return Err(PackError::CorruptManifest(format!(
                    "duplicate item id '{}'",
                    item.id
                )));
            }
        }

        let mut blocks: Vec<(String, BlockRange)> = Vec::with_capacity(self.block_count());
        blocks.push(("project document".to_string(), self.project_document));
        for item in self.items() {
            blocks.push((format!("item '{}'", item.id), item.range()));
        }
        if let Some(icon) = self.app_icon {
            blocks.push(("app icon".to_string(), icon));
        }

        for (label, range) in &blocks {
            match range.end() {
                Some(end) if end <= payload_end => {}
                _ => {
                    return Err(PackError::CorruptManifest(format!(
                        "{} at {}+{} exceeds payload end {}",
                        label, range.offset, range.size, payload_end
                    )))
                }
            }
        }

        blocks.retain(|(_, r)| r.size > 0);
        blocks.sort_by_key(|(_, r)| r.offset);
        for pair in blocks.windows(2) {
            let (a_label, a) = &pair[0];
            let (b_label, b) = &pair[1];
            if a.overlaps(b) {
                return Err(PackError::CorruptManifest(format!(
                    "{} overlaps {}",
                    a_label, b_label
                )));
            }
        }

        Ok(())
    }
}
