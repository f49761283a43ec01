//! Image decoding and locator helpers.
//!
//! A locator is either a local filesystem path (absolute once resolved) or a
//! URL. Local files are decoded synchronously; anything that parses as a URL
//! is left to the download path.

mod loader;

pub use loader::{clean_path, decode_bytes, decode_file, is_network_locator, resolve_path};
