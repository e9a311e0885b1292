//! App icon conversion
//!
//! The authoring tool hands over the app icon as image bytes, usually PNG or
//! JPEG. Resource editors need a `.ico`, so anything the `image` crate can
//! decode is converted to a multi-resolution ICO before the executable is
//! patched.

use crate::error::{PackError, PackResult};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Icon sizes written into the `.ico`, largest first
const ICO_SIZES: [u32; 6] = [256, 128, 64, 48, 32, 16];

/// Icon formats recognised by signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconFormat {
    Png,
    Jpeg,
    Ico,
}

const SIGNATURES: [(&[u8], IconFormat); 3] = [
    (&[0x89, b'P', b'N', b'G'], IconFormat::Png),
    (&[0xFF, 0xD8, 0xFF], IconFormat::Jpeg),
    (&[0x00, 0x00, 0x01, 0x00], IconFormat::Ico),
];

impl IconFormat {
    /// Sniff the format from leading bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        SIGNATURES
            .iter()
            .find(|(magic, _)| data.starts_with(magic))
            .map(|&(_, format)| format)
    }
}

/// Turn app icon bytes into a multi-resolution `.ico`
///
/// ICO input is returned as is. Any other format the `image` crate decodes
/// (PNG, JPEG, BMP, GIF, WebP, ...) is resampled into the ICO frames.
pub fn convert_to_ico(data: &[u8]) -> PackResult<Vec<u8>> {
    if IconFormat::from_bytes(data) == Some(IconFormat::Ico) {
        return Ok(data.to_vec());
    }

    let format = image::guess_format(data)
        .map_err(|e| PackError::Icon(format!("unrecognised app icon: {}", e)))?;
    let img = image::load_from_memory_with_format(data, format)
        .map_err(|e| PackError::Icon(format!("cannot decode {:?} icon: {}", format, e)))?;
    encode_ico(&img)
}

fn encode_ico(img: &DynamicImage) -> PackResult<Vec<u8>> {
    let mut dir = ico::IconDir::new(ico::ResourceType::Icon);
    for size in ICO_SIZES {
        let rgba = img
            .resize_exact(size, size, image::imageops::FilterType::Lanczos3)
            .into_rgba8();
        let frame = ico::IconImage::from_rgba_data(size, size, rgba.into_raw());
        let entry = ico::IconDirEntry::encode(&frame)
            .map_err(|e| PackError::Icon(format!("cannot encode {}px frame: {}", size, e)))?;
        dir.add_entry(entry);
    }

    let mut out = Vec::new();
    dir.write(&mut out)
        .map_err(|e| PackError::Icon(format!("cannot write .ico: {}", e)))?;
    tracing::debug!("Encoded {}-frame .ico ({} bytes)", ICO_SIZES.len(), out.len());
    Ok(out)
}

/// Encode an image as PNG bytes
pub fn to_png(img: &DynamicImage) -> PackResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| PackError::Icon(format!("cannot encode PNG: {}", e)))?;
    Ok(out.into_inner())
}
