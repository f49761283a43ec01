//! Public surface of the previewer.
//!
//! The controller owns the cache, the debounce timer and the download
//! coordinator for one document. It is driven from the document's thread:
//! content changes and timer polling go through [`PreviewController::poll`],
//! which also applies finished downloads.

use std::rc::Rc;
use std::time::Instant;

use image::DynamicImage;
use tracing::{debug, trace};

use crate::config::PreviewConfig;
use crate::editor::{BlockBuffer, BlockId, ContentChange, ResourceStore};

use super::cache::ImageCache;
use super::classify;
use super::debounce::DebounceScheduler;
use super::download::DownloadCoordinator;
use super::extract::LocatorResolver;
use super::reconcile::{self, Deferred, PassContext, PassSummary, ReconcilerState};

/// Notification for the editor UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewEvent {
    /// Preview blocks may have changed; carries the edits that were made.
    StatusChanged(PassSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewPhase {
    Disabled,
    Idle,
    Debouncing,
    Scanning,
}

/// Cloneable view of the previewer's flags for collaborators that may run
/// while a pass is in progress.
#[derive(Debug, Clone)]
pub struct PreviewHandle {
    state: Rc<ReconcilerState>,
}

impl PreviewHandle {
    pub fn is_preview_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    pub fn is_scanning(&self) -> bool {
        self.state.is_scanning()
    }

    /// Disable from inside a running pass; preview blocks are cleared once
    /// the pass ends. Returns `false` when no pass is running, in which case
    /// use [`PreviewController::disable`].
    pub fn disable(&self) -> bool {
        self.state.request_clear()
    }

    /// Refresh from inside a running pass. Returns `false` when no pass is
    /// running, in which case use [`PreviewController::refresh`].
    pub fn refresh(&self) -> bool {
        self.state.request_refresh()
    }
}

#[derive(Debug)]
pub struct PreviewController {
    state: Rc<ReconcilerState>,
    config: PreviewConfig,
    resolver: LocatorResolver,
    cache: ImageCache,
    downloads: DownloadCoordinator,
    timer: DebounceScheduler,
    events: Vec<PreviewEvent>,
}

impl PreviewController {
    /// Create an enabled previewer. Nothing runs until the first content
    /// change or [`enable`](Self::enable).
    pub fn new(config: PreviewConfig, downloads: DownloadCoordinator) -> Self {
        Self {
            state: Rc::new(ReconcilerState::new(true)),
            resolver: LocatorResolver::new(config.base_dir.clone()),
            timer: DebounceScheduler::new(config.debounce),
            config,
            cache: ImageCache::new(),
            downloads,
            events: Vec::new(),
        }
    }

    pub fn handle(&self) -> PreviewHandle {
        PreviewHandle {
            state: Rc::clone(&self.state),
        }
    }

    pub fn is_preview_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    pub fn phase(&self) -> PreviewPhase {
        if self.state.is_scanning() {
            PreviewPhase::Scanning
        } else if !self.state.is_enabled() {
            PreviewPhase::Disabled
        } else if self.timer.is_pending() {
            PreviewPhase::Debouncing
        } else {
            PreviewPhase::Idle
        }
    }

    pub const fn config(&self) -> &PreviewConfig {
        &self.config
    }

    /// Flip the global "preview images" flag. It is read on each timer
    /// firing.
    pub const fn set_preview_images(&mut self, enabled: bool) {
        self.config.preview_images = enabled;
    }

    pub const fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub const fn downloads(&self) -> &DownloadCoordinator {
        &self.downloads
    }

    pub const fn timer(&self) -> &DebounceScheduler {
        &self.timer
    }

    /// Whether more work is scheduled: a pending timer or fetches that may
    /// still complete.
    pub fn is_busy(&self) -> bool {
        self.timer.is_pending() || self.downloads.is_busy()
    }

    pub fn take_events(&mut self) -> Vec<PreviewEvent> {
        std::mem::take(&mut self.events)
    }

    /// React to a buffer text change. Empty changes are ignored; anything
    /// else restarts the debounce timer.
    pub fn handle_content_change(&mut self, change: ContentChange, now: Instant) {
        if change.is_empty() {
            return;
        }
        self.timer.restart(now);
    }

    pub fn enable(&mut self, now: Instant) {
        self.state.set_enabled(true);
        if self.config.preview_images {
            self.timer.restart(now);
        }
    }

    /// Disable previews and remove every preview block. Deferred until the
    /// running pass ends when called mid-pass.
    pub fn disable<B>(&mut self, buffer: &mut B)
    where
        B: BlockBuffer + ?Sized,
    {
        if self.state.request_clear() {
            debug!("disable deferred until pass completes");
            return;
        }
        self.state.set_enabled(false);
        self.clear_all_preview_blocks(buffer);
    }

    /// Drop the cache and rebuild every preview from scratch.
    pub fn refresh<B>(&mut self, buffer: &mut B, now: Instant)
    where
        B: BlockBuffer + ?Sized,
    {
        if self.state.request_refresh() {
            debug!("refresh deferred until pass completes");
            return;
        }
        self.timer.stop();
        self.cache.clear();
        self.clear_all_preview_blocks(buffer);
        self.timer.restart(now);
    }

    /// Remove every preview block and repair corrupted blocks.
    pub fn clear_all_preview_blocks<B>(&mut self, buffer: &mut B)
    where
        B: BlockBuffer + ?Sized,
    {
        let summary = reconcile::clear_preview_blocks(buffer);
        debug!(?summary, "cleared preview blocks");
        self.events.push(PreviewEvent::StatusChanged(summary));
    }

    /// Drive the previewer: apply content changes, finished downloads, and
    /// fire the timer if due. Returns the summary of a pass if one ran.
    pub fn poll<B, I>(&mut self, buffer: &mut B, changes: I, now: Instant) -> Option<PassSummary>
    where
        B: BlockBuffer + ResourceStore + ?Sized,
        I: IntoIterator<Item = ContentChange>,
    {
        for change in changes {
            self.handle_content_change(change, now);
        }
        for (locator, bytes) in self.downloads.take_completed() {
            self.on_download_completed(buffer, &locator, &bytes, now);
        }
        if self.timer.take_ready(now) {
            return self.timer_timeout(buffer, now);
        }
        None
    }

    /// Timer firing: honor the global flag, then run a pass.
    pub fn timer_timeout<B>(&mut self, buffer: &mut B, now: Instant) -> Option<PassSummary>
    where
        B: BlockBuffer + ResourceStore + ?Sized,
    {
        if !self.config.preview_images {
            if self.state.is_enabled() {
                self.disable(buffer);
            }
            return None;
        }
        if !self.state.is_enabled() {
            return None;
        }
        self.preview_images(buffer, now)
    }

    /// Run one reconciliation pass now, then any action deferred during it.
    pub fn preview_images<B>(&mut self, buffer: &mut B, now: Instant) -> Option<PassSummary>
    where
        B: BlockBuffer + ResourceStore + ?Sized,
    {
        let outcome = {
            let mut ctx = PassContext::new(
                buffer,
                &self.resolver,
                &mut self.cache,
                &mut self.downloads,
            );
            reconcile::run_pass(&self.state, &mut ctx)?
        };
        debug!(summary = ?outcome.summary, "preview pass done");
        crate::perf::log_event("preview.pass", format!("{:?}", outcome.summary));

        for action in outcome.deferred {
            match action {
                Deferred::Clear => self.clear_all_preview_blocks(buffer),
                Deferred::Refresh => self.refresh(buffer, now),
            }
        }
        self.events.push(PreviewEvent::StatusChanged(outcome.summary));
        Some(outcome.summary)
    }

    /// Decode downloaded bytes into the cache and schedule a follow-up pass.
    /// Undecodable bytes are dropped silently.
    pub fn on_download_completed<B>(
        &mut self,
        buffer: &mut B,
        locator: &str,
        bytes: &[u8],
        now: Instant,
    ) where
        B: ResourceStore + ?Sized,
    {
        let image = match crate::image::decode_bytes(locator, bytes) {
            Ok(image) => image,
            Err(err) => {
                debug!(%err, "downloaded image discarded");
                return;
            }
        };
        if self.cache.insert_decoded(locator, image, buffer) {
            trace!(locator, "downloaded image cached");
        }
        self.timer.restart(now);
    }

    /// Decoded image shown by a preview block, if it is bound and cached.
    pub fn preview_image<'b, B>(&self, buffer: &'b B, block: BlockId) -> Option<&'b DynamicImage>
    where
        B: BlockBuffer + ResourceStore + ?Sized,
    {
        let locator = classify::bound_locator(buffer, block)?;
        let name = self.cache.get(&locator)?;
        buffer.resource(name)
    }
}
