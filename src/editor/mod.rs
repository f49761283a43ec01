//! Block-oriented view of an editor buffer.
//!
//! The preview engine never owns the document text. It walks and mutates it
//! through [`BlockBuffer`], and registers decoded images through
//! [`ResourceStore`]. [`EditorBuffer`] is the rope-backed implementation used
//! by the CLI and the tests; any editor can back the traits with its own
//! structure.

mod buffer;

pub use buffer::{Cursor, EditorBuffer};

use image::DynamicImage;

/// Object replacement character. A preview block holds exactly one of these.
pub const PLACEHOLDER: char = '\u{FFFC}';

/// Stable identity of a block for as long as the block exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u64);

impl BlockId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Image attached to a block: the locator it came from and the name of the
/// registered resource that renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBinding {
    pub locator: String,
    pub resource: String,
}

impl ImageBinding {
    pub fn new(locator: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            resource: resource.into(),
        }
    }
}

/// A text mutation reported by the buffer, in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentChange {
    pub position: usize,
    pub chars_removed: usize,
    pub chars_added: usize,
}

impl ContentChange {
    pub const fn new(position: usize, chars_removed: usize, chars_added: usize) -> Self {
        Self {
            position,
            chars_removed,
            chars_added,
        }
    }

    /// A change that neither removed nor added text (format-only).
    pub const fn is_empty(&self) -> bool {
        self.chars_removed == 0 && self.chars_added == 0
    }
}

/// Ordered blocks of a document, as seen by the preview engine.
///
/// Mutations between [`begin_edit`](Self::begin_edit) and
/// [`end_edit`](Self::end_edit) must appear to other buffer consumers as one
/// edit. Scopes may nest; only the outermost `end_edit` publishes.
pub trait BlockBuffer {
    fn first_block(&self) -> Option<BlockId>;
    fn next_block(&self, block: BlockId) -> Option<BlockId>;
    fn previous_block(&self, block: BlockId) -> Option<BlockId>;

    /// Plain text of the block, without the line terminator.
    fn block_text(&self, block: BlockId) -> Option<String>;

    fn binding(&self, block: BlockId) -> Option<ImageBinding>;

    /// Attach (or replace) the image binding of a block. Returns `false` for
    /// an unknown block.
    fn set_binding(&mut self, block: BlockId, binding: ImageBinding) -> bool;

    /// Insert a new block right after `after`.
    fn insert_block_after(
        &mut self,
        after: BlockId,
        text: &str,
        binding: Option<ImageBinding>,
    ) -> Option<BlockId>;

    /// Remove a block together with its binding. Returns `false` for an
    /// unknown block.
    fn remove_block(&mut self, block: BlockId) -> bool;

    /// Replace the text of a block, keeping its identity and binding.
    fn set_block_text(&mut self, block: BlockId, text: &str) -> bool;

    fn begin_edit(&mut self);
    fn end_edit(&mut self);

    /// Document-level "has unsaved changes" indicator.
    fn is_modified(&self) -> bool;
    fn set_modified(&mut self, modified: bool);
}

/// Registry of decoded images addressable by resource name.
pub trait ResourceStore {
    fn add_resource(&mut self, name: &str, image: DynamicImage);
    fn resource(&self, name: &str) -> Option<&DynamicImage>;
}

/// Collect every block id in document order.
pub fn block_ids<B: BlockBuffer + ?Sized>(buffer: &B) -> Vec<BlockId> {
    let mut ids = Vec::new();
    let mut current = buffer.first_block();
    while let Some(id) = current {
        ids.push(id);
        current = buffer.next_block(id);
    }
    ids
}

/// Collect the text of every block in document order.
pub fn block_texts<B: BlockBuffer + ?Sized>(buffer: &B) -> Vec<String> {
    block_ids(buffer)
        .into_iter()
        .filter_map(|id| buffer.block_text(id))
        .collect()
}
