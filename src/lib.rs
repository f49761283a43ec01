// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. preview::PreviewEvent)
    clippy::module_name_repetitions
)]

//! # Markless Preview
//!
//! Inline image previews for markdown editor buffers.
//!
//! For every line that references exactly one image (`![alt](target)`),
//! the engine keeps a placeholder line right after it, bound to the decoded
//! image, and re-converges those placeholders as the text changes:
//!
//! - Debounced passes, one per quiet interval of typing
//! - Local images decoded on demand, remote ones fetched in the background
//! - Self-healing of orphaned or corrupted placeholder lines
//! - The document's unsaved-changes flag is never touched by preview edits
//!
//! ## Modules
//!
//! - [`editor`]: Block buffer traits and the rope-backed [`editor::EditorBuffer`]
//! - [`preview`]: Extraction, classification, the reconciliation pass and
//!   the [`preview::PreviewController`]
//! - [`image`]: Image decoding and locator helpers
//! - [`config`]: Preview settings and saved CLI defaults
//! - [`watcher`]: Reload on file changes
//! - [`perf`]: Timing and debug-event logging

pub mod config;
pub mod editor;
pub mod error;
pub mod image;
pub mod perf;
pub mod preview;
pub mod watcher;

pub use error::PreviewError;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::PreviewConfig;
    pub use crate::editor::{BlockBuffer, EditorBuffer, PLACEHOLDER, ResourceStore};
    pub use crate::preview::{DownloadCoordinator, PreviewController, PreviewEvent};
}
