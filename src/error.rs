//! Error type shared by the preview engine.
//!
//! Nothing here is fatal to the engine: callers log these and degrade to
//! "no preview for this locator".

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("failed to decode image {locator}: {source}")]
    Decode {
        locator: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to fetch {locator}: {reason}")]
    Fetch { locator: String, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = PreviewError> = std::result::Result<T, E>;
