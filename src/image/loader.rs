//! Image decoding and path resolution.

use std::path::{Component, Path, PathBuf};

use image::DynamicImage;

use crate::error::{PreviewError, Result};

/// Decode an image file from disk.
///
/// # Errors
/// Returns [`PreviewError::Decode`] if the file cannot be opened or is not a
/// supported image.
pub fn decode_file(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|source| PreviewError::Decode {
        locator: path.display().to_string(),
        source,
    })
}

/// Decode downloaded bytes.
///
/// # Errors
/// Returns [`PreviewError::Decode`] if the bytes are not a supported image.
pub fn decode_bytes(locator: &str, bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|source| PreviewError::Decode {
        locator: locator.to_string(),
        source,
    })
}

/// Resolve a reference target against the document's base directory.
pub fn resolve_path(base_path: &Path, image_path: &str) -> PathBuf {
    let path = Path::new(image_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_path.join(path)
    }
}

/// Make a path absolute and drop `.`/`..` components lexically.
///
/// Symlinks are not resolved.
pub fn clean_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(component);
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

/// Whether the locator should be fetched rather than read from disk.
///
/// Single-letter schemes are Windows drive letters, not URLs.
pub fn is_network_locator(locator: &str) -> bool {
    url::Url::parse(locator).is_ok_and(|url| url.scheme().len() > 1)
}
