//! The reconciliation pass.
//!
//! One front-to-back walk over the buffer that converges preview blocks onto
//! the image references of their predecessors: orphaned previews are
//! removed, corrupted blocks are repaired, missing previews are inserted and
//! stale bindings are replaced. Every structural edit is atomic and leaves
//! the buffer's modified flag as it found it.

use std::cell::Cell;
use std::ops::AddAssign;

use tracing::trace;

use crate::editor::{BlockBuffer, BlockId, ImageBinding, PLACEHOLDER, ResourceStore};

use super::cache::ImageCache;
use super::classify;
use super::download::DownloadCoordinator;
use super::extract::LocatorResolver;

/// Guard and deferred-request flags of the previewer.
///
/// `pending_clear` and `pending_refresh` are only latched while a pass is
/// running, and are consumed together when it finishes. Repeated requests
/// during one pass collapse into one.
#[derive(Debug)]
pub struct ReconcilerState {
    enabled: Cell<bool>,
    scanning: Cell<bool>,
    pending_clear: Cell<bool>,
    pending_refresh: Cell<bool>,
}

/// Action latched during a pass, to run once it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    Clear,
    Refresh,
}

impl ReconcilerState {
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled: Cell::new(enabled),
            scanning: Cell::new(false),
            pending_clear: Cell::new(false),
            pending_refresh: Cell::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.get()
    }

    pub fn has_pending(&self) -> bool {
        self.pending_clear.get() || self.pending_refresh.get()
    }

    /// Disable mid-pass. Returns `false`, changing nothing, when no pass is
    /// running.
    pub fn request_clear(&self) -> bool {
        if !self.scanning.get() {
            return false;
        }
        self.enabled.set(false);
        self.pending_clear.set(true);
        true
    }

    /// Refresh mid-pass. Returns `false`, changing nothing, when no pass is
    /// running.
    pub fn request_refresh(&self) -> bool {
        if !self.scanning.get() {
            return false;
        }
        self.pending_refresh.set(true);
        true
    }

    fn begin_scan(&self) -> bool {
        if self.scanning.get() {
            return false;
        }
        self.scanning.set(true);
        true
    }

    /// End the scan and hand back the latched requests in the order they
    /// must run: a clear before a refresh.
    fn finish_scan(&self) -> Vec<Deferred> {
        self.scanning.set(false);
        let mut deferred = Vec::new();
        if self.pending_clear.replace(false) {
            deferred.push(Deferred::Clear);
        }
        if self.pending_refresh.replace(false) {
            deferred.push(Deferred::Refresh);
        }
        deferred
    }
}

impl Default for ReconcilerState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Edits applied by one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub repaired: usize,
}

impl PassSummary {
    pub const fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.removed == 0 && self.repaired == 0
    }
}

impl AddAssign for PassSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.removed += rhs.removed;
        self.repaired += rhs.repaired;
    }
}

/// Result of a completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub summary: PassSummary,
    /// Requests latched during the pass, in execution order.
    pub deferred: Vec<Deferred>,
}

/// Everything a pass touches, borrowed for its duration.
pub struct PassContext<'a, B: ?Sized> {
    pub buffer: &'a mut B,
    pub resolver: &'a LocatorResolver,
    pub cache: &'a mut ImageCache,
    pub downloads: &'a mut DownloadCoordinator,
    summary: PassSummary,
}

/// Run `edit` as one atomic scope that preserves the modified flag.
fn shielded<B, R>(buffer: &mut B, edit: impl FnOnce(&mut B) -> R) -> R
where
    B: BlockBuffer + ?Sized,
{
    let modified = buffer.is_modified();
    buffer.begin_edit();
    let result = edit(buffer);
    buffer.end_edit();
    buffer.set_modified(modified);
    result
}

/// Walk the whole buffer once.
///
/// Returns `None` without touching anything if a pass is already running.
/// The walk stops early if the previewer gets disabled mid-pass.
pub fn run_pass<B>(state: &ReconcilerState, ctx: &mut PassContext<'_, B>) -> Option<PassOutcome>
where
    B: BlockBuffer + ResourceStore + ?Sized,
{
    if !state.begin_scan() {
        trace!("pass already running, skipped");
        return None;
    }
    let _scope = crate::perf::scope("preview.pass");

    let mut current = ctx.buffer.first_block();
    while let Some(block) = current {
        if !state.is_enabled() {
            break;
        }
        if classify::is_preview_block(&*ctx.buffer, block) {
            let next = ctx.buffer.next_block(block);
            if !classify::is_valid_preview_block(&*ctx.buffer, block, ctx.resolver) {
                ctx.remove_block(block);
            }
            current = next;
        } else {
            ctx.repair_corrupted(block);
            current = ctx.preview_one_block(block);
        }
    }

    let deferred = state.finish_scan();
    Some(PassOutcome {
        summary: ctx.take_summary(),
        deferred,
    })
}

/// Remove every preview block and repair corrupted blocks, as one atomic
/// edit that preserves the modified flag.
pub fn clear_preview_blocks<B>(buffer: &mut B) -> PassSummary
where
    B: BlockBuffer + ?Sized,
{
    shielded(buffer, |buffer| {
        let mut summary = PassSummary::default();
        let mut current = buffer.first_block();
        while let Some(block) = current {
            let next = buffer.next_block(block);
            if classify::is_preview_block(&*buffer, block) {
                if buffer.remove_block(block) {
                    summary.removed += 1;
                }
            } else if repair_block(buffer, block) {
                summary.repaired += 1;
            }
            current = next;
        }
        summary
    })
}

/// Strip placeholders from a corrupted block. Returns whether it was
/// corrupted.
fn repair_block<B: BlockBuffer + ?Sized>(buffer: &mut B, block: BlockId) -> bool {
    let Some(text) = buffer.block_text(block) else {
        return false;
    };
    if !classify::is_corrupted_text(&text) {
        return false;
    }
    let repaired = classify::strip_placeholders(&text);
    shielded(buffer, |buffer| buffer.set_block_text(block, &repaired))
}

impl<'a, B> PassContext<'a, B>
where
    B: BlockBuffer + ResourceStore + ?Sized,
{
    pub fn new(
        buffer: &'a mut B,
        resolver: &'a LocatorResolver,
        cache: &'a mut ImageCache,
        downloads: &'a mut DownloadCoordinator,
    ) -> Self {
        Self {
            buffer,
            resolver,
            cache,
            downloads,
            summary: PassSummary::default(),
        }
    }

    fn take_summary(&mut self) -> PassSummary {
        std::mem::take(&mut self.summary)
    }

    fn resolve(&mut self, locator: &str) -> Option<String> {
        self.cache
            .resolve(locator, &mut *self.buffer, &mut *self.downloads)
    }

    /// Converge the preview of one content block and return the block to
    /// continue from.
    fn preview_one_block(&mut self, block: BlockId) -> Option<BlockId> {
        let next = self.buffer.next_block(block);
        let Some(locator) = self
            .buffer
            .block_text(block)
            .and_then(|text| self.resolver.extract_locator(&text))
        else {
            return next;
        };
        trace!(block = block.raw(), %locator, "image reference");

        if let Some(preview) = next
            && classify::is_preview_block(&*self.buffer, preview)
        {
            let after = self.buffer.next_block(preview);
            self.update_binding(preview, &locator);
            return after;
        }

        match self.insert_preview_block(block, &locator) {
            Some(inserted) => self.buffer.next_block(inserted),
            None => next,
        }
    }

    /// Insert a bound placeholder block after `after`. Nothing is inserted
    /// while the locator does not resolve; a later pass retries.
    fn insert_preview_block(&mut self, after: BlockId, locator: &str) -> Option<BlockId> {
        let resource = self.resolve(locator)?;
        let binding = ImageBinding::new(locator, resource);
        let inserted = shielded(&mut *self.buffer, |buffer| {
            buffer.insert_block_after(after, &PLACEHOLDER.to_string(), Some(binding))
        });
        if inserted.is_some() {
            self.summary.inserted += 1;
        }
        inserted
    }

    /// Rebind an existing preview block, or drop it when the new locator
    /// does not resolve.
    fn update_binding(&mut self, preview: BlockId, locator: &str) {
        if classify::bound_locator(&*self.buffer, preview).as_deref() == Some(locator) {
            return;
        }
        let Some(resource) = self.resolve(locator) else {
            self.remove_block(preview);
            return;
        };
        let binding = ImageBinding::new(locator, resource);
        if shielded(&mut *self.buffer, |buffer| buffer.set_binding(preview, binding)) {
            self.summary.updated += 1;
        }
    }

    fn remove_block(&mut self, block: BlockId) {
        if shielded(&mut *self.buffer, |buffer| buffer.remove_block(block)) {
            self.summary.removed += 1;
        }
    }

    fn repair_corrupted(&mut self, block: BlockId) {
        if repair_block(&mut *self.buffer, block) {
            self.summary.repaired += 1;
        }
    }
}
