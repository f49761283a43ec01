//! Inline image preview synchronization.
//!
//! Keeps one placeholder block, bound to a decoded image, right after every
//! block that references exactly one image. The flow is:
//!
//! - buffer edits restart the [`DebounceScheduler`]
//! - when it fires, [`run_pass`] walks the buffer, classifying each block
//!   and inserting, rebinding or removing preview blocks
//! - unresolved remote images go to the [`DownloadCoordinator`]; their
//!   completion restarts the timer so a later pass can bind them
//!
//! [`PreviewController`] ties these together for one document.

mod cache;
mod classify;
mod controller;
mod debounce;
mod download;
mod extract;
mod reconcile;

pub use cache::{ImageCache, resource_name};
pub use classify::{
    bound_locator, is_corrupted, is_corrupted_text, is_preview_block, is_preview_text,
    is_valid_preview_block, strip_placeholders,
};
pub use controller::{PreviewController, PreviewEvent, PreviewHandle, PreviewPhase};
pub use debounce::DebounceScheduler;
pub use download::{DownloadCoordinator, Fetcher, FileUrlFetcher};
pub use extract::{LocatorResolver, extract_url};
pub use reconcile::{
    Deferred, PassContext, PassOutcome, PassSummary, ReconcilerState, clear_preview_blocks,
    run_pass,
};
