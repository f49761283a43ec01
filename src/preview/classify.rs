//! Block classification.
//!
//! Nothing is cached: every predicate is recomputed from the block's current
//! text and binding, so external edits are picked up on the next pass.

use crate::editor::{BlockBuffer, BlockId, PLACEHOLDER};

use super::extract::LocatorResolver;

/// Trimmed text is exactly one placeholder.
pub fn is_preview_text(text: &str) -> bool {
    let mut chars = text.trim().chars();
    chars.next() == Some(PLACEHOLDER) && chars.next().is_none()
}

/// A placeholder mixed into ordinary text.
pub fn is_corrupted_text(text: &str) -> bool {
    if is_preview_text(text) {
        return false;
    }
    let mut has_placeholder = false;
    let mut has_other = false;
    for ch in text.chars() {
        if ch == PLACEHOLDER {
            has_placeholder = true;
        } else if !ch.is_whitespace() {
            has_other = true;
        }
    }
    has_placeholder && has_other
}

pub fn strip_placeholders(text: &str) -> String {
    text.chars().filter(|ch| *ch != PLACEHOLDER).collect()
}

pub fn is_preview_block<B: BlockBuffer + ?Sized>(buffer: &B, block: BlockId) -> bool {
    buffer
        .block_text(block)
        .is_some_and(|text| is_preview_text(&text))
}

pub fn is_corrupted<B: BlockBuffer + ?Sized>(buffer: &B, block: BlockId) -> bool {
    buffer
        .block_text(block)
        .is_some_and(|text| is_corrupted_text(&text))
}

/// Locator carried by a block's binding.
pub fn bound_locator<B: BlockBuffer + ?Sized>(buffer: &B, block: BlockId) -> Option<String> {
    buffer.binding(block).map(|binding| binding.locator)
}

/// A preview block is valid when its predecessor references exactly one
/// image and that locator matches the one bound to the block. Anything else
/// is orphaned.
pub fn is_valid_preview_block<B: BlockBuffer + ?Sized>(
    buffer: &B,
    block: BlockId,
    resolver: &LocatorResolver,
) -> bool {
    if !is_preview_block(buffer, block) {
        return false;
    }
    let Some(prev) = buffer.previous_block(block) else {
        return false;
    };
    let Some(expected) = buffer
        .block_text(prev)
        .and_then(|text| resolver.extract_locator(&text))
    else {
        return false;
    };
    !expected.is_empty() && bound_locator(buffer, block).as_deref() == Some(expected.as_str())
}
