use std::cmp::Ordering;
use std::collections::HashMap;

use image::DynamicImage;
use ropey::Rope;

use super::{BlockBuffer, BlockId, ContentChange, ImageBinding, ResourceStore};

/// Cursor position in the editor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    /// Zero-based line index.
    pub line: usize,
    /// Zero-based column (byte offset within the line, on a char boundary).
    pub col: usize,
}

impl Cursor {
    /// Create a cursor at line 0, column 0.
    pub const fn new() -> Self {
        Self { line: 0, col: 0 }
    }

    /// Create a cursor at a specific position.
    pub const fn at(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

/// Largest char boundary of `line` not past `col`.
fn floor_char_boundary(line: &str, col: usize) -> usize {
    let mut col = col.min(line.len());
    while !line.is_char_boundary(col) {
        col -= 1;
    }
    col
}

/// A rope-backed text buffer where every line is a block.
///
/// Each line carries a stable [`BlockId`] that survives edits elsewhere in
/// the buffer, and optionally an [`ImageBinding`] kept in a side table.
/// Every text mutation is reported as a [`ContentChange`]; mutations inside
/// an edit scope are coalesced into one change published when the outermost
/// scope closes.
///
/// Structural edits keep the cursor on the text it was in: blocks inserted
/// or removed above it shift it along.
pub struct EditorBuffer {
    rope: Rope,
    ids: Vec<BlockId>,
    /// Line index of every live block.
    lines: HashMap<BlockId, usize>,
    bindings: HashMap<BlockId, ImageBinding>,
    resources: HashMap<String, DynamicImage>,
    next_id: u64,
    cursor: Cursor,
    dirty: bool,
    edit_depth: usize,
    pending_change: Option<ContentChange>,
    changes: Vec<ContentChange>,
}

impl EditorBuffer {
    /// Create a new buffer from a string.
    pub fn from_text(text: &str) -> Self {
        let mut buffer = Self {
            rope: Rope::from_str(text),
            ids: Vec::new(),
            lines: HashMap::new(),
            bindings: HashMap::new(),
            resources: HashMap::new(),
            next_id: 0,
            cursor: Cursor::new(),
            dirty: false,
            edit_depth: 0,
            pending_change: None,
            changes: Vec::new(),
        };
        buffer.reset_ids();
        buffer
    }

    /// Create an empty buffer.
    pub fn empty() -> Self {
        Self::from_text("")
    }

    /// The current cursor position.
    pub const fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Whether the buffer has been modified since creation or last save.
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the buffer as clean (e.g., after saving).
    pub const fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Total number of lines in the buffer.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Get the content of a line (without trailing newline).
    pub fn line_at(&self, line_idx: usize) -> Option<String> {
        if line_idx >= self.rope.len_lines() {
            return None;
        }
        let s = self.rope.line(line_idx).to_string();
        Some(s.trim_end_matches('\n').trim_end_matches('\r').to_string())
    }

    /// Length of a line in bytes (without trailing newline).
    pub fn line_len(&self, line_idx: usize) -> usize {
        self.line_at(line_idx).map_or(0, |s| s.len())
    }

    /// The full text content of the buffer.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Block id of the given line.
    pub fn block_at(&self, line_idx: usize) -> Option<BlockId> {
        self.ids.get(line_idx).copied()
    }

    /// Line index of the given block.
    pub fn line_of(&self, block: BlockId) -> Option<usize> {
        self.lines.get(&block).copied()
    }

    /// Drain the published content changes.
    pub fn take_changes(&mut self) -> Vec<ContentChange> {
        std::mem::take(&mut self.changes)
    }

    /// Replace the whole content, as when reloading from disk.
    ///
    /// All blocks get fresh identities and lose their bindings. The buffer
    /// is clean afterwards.
    pub fn reload(&mut self, text: &str) {
        let removed = self.rope.len_chars();
        self.rope = Rope::from_str(text);
        self.bindings.clear();
        self.reset_ids();
        self.cursor = Cursor::new();
        self.record_change(ContentChange::new(0, removed, self.rope.len_chars()));
        self.dirty = false;
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, ch: char) {
        if ch == '\n' {
            self.split_line();
            return;
        }
        let char_idx = self.cursor_char_idx();
        self.rope.insert_char(char_idx, ch);
        self.cursor.col += ch.len_utf8();
        self.record_change(ContentChange::new(char_idx, 0, 1));
        self.dirty = true;
    }

    /// Insert a string at the cursor position.
    pub fn insert_str(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        let char_idx = self.cursor_char_idx();
        self.rope.insert(char_idx, s);

        let lines: Vec<&str> = s.split('\n').collect();
        for offset in 1..lines.len() {
            let id = self.alloc_id();
            self.insert_id(self.cursor.line + offset, id);
        }
        if lines.len() > 1 {
            self.cursor.line += lines.len() - 1;
            self.cursor.col = lines.last().map_or(0, |l| l.len());
        } else {
            self.cursor.col += s.len();
        }
        self.record_change(ContentChange::new(char_idx, 0, s.chars().count()));
        self.dirty = true;
    }

    /// Split the current line at the cursor (Enter key).
    ///
    /// The text after the cursor becomes a new block; the binding stays with
    /// the first half.
    pub fn split_line(&mut self) {
        let char_idx = self.cursor_char_idx();
        self.rope.insert_char(char_idx, '\n');
        let id = self.alloc_id();
        self.insert_id(self.cursor.line + 1, id);
        self.cursor = Cursor::at(self.cursor.line + 1, 0);
        self.record_change(ContentChange::new(char_idx, 0, 1));
        self.dirty = true;
    }

    /// Delete the character before the cursor (Backspace).
    ///
    /// Returns `true` if a character was deleted.
    pub fn delete_back(&mut self) -> bool {
        if self.cursor.col == 0 && self.cursor.line == 0 {
            return false;
        }

        let char_idx = self.cursor_char_idx();
        if self.cursor.col == 0 {
            // Join with the previous line; the current block disappears.
            let prev_line_len = self.line_len(self.cursor.line - 1);
            self.rope.remove(char_idx - 1..char_idx);
            let joined = self.remove_id(self.cursor.line);
            self.bindings.remove(&joined);
            self.cursor = Cursor::at(self.cursor.line - 1, prev_line_len);
        } else {
            let line = self.line_at(self.cursor.line).unwrap_or_default();
            let col = floor_char_boundary(&line, self.cursor.col);
            let prev_char_len = line[..col].chars().next_back().map_or(1, char::len_utf8);
            self.rope.remove(char_idx - 1..char_idx);
            self.cursor.col = col - prev_char_len;
        }
        self.record_change(ContentChange::new(char_idx - 1, 1, 0));
        self.dirty = true;
        true
    }

    /// Delete the character at the cursor (Delete key).
    ///
    /// Returns `true` if a character was deleted.
    pub fn delete_forward(&mut self) -> bool {
        let line_len = self.line_len(self.cursor.line);

        if self.cursor.col >= line_len && self.cursor.line + 1 >= self.line_count() {
            return false;
        }

        let char_idx = self.cursor_char_idx();
        self.rope.remove(char_idx..=char_idx);
        if self.cursor.col >= line_len {
            let joined = self.remove_id(self.cursor.line + 1);
            self.bindings.remove(&joined);
        }
        self.record_change(ContentChange::new(char_idx, 1, 0));
        self.dirty = true;
        true
    }

    /// Move cursor to the end of the line (End).
    pub fn move_end(&mut self) {
        self.cursor.col = self.line_len(self.cursor.line);
    }

    /// Move cursor to a specific line and column.
    ///
    /// Out-of-range positions are clamped, and a column inside a multi-byte
    /// character snaps back to the start of that character.
    pub fn move_to(&mut self, line: usize, col: usize) {
        let max_line = self.line_count().saturating_sub(1);
        self.cursor.line = line.min(max_line);
        let text = self.line_at(self.cursor.line).unwrap_or_default();
        self.cursor.col = floor_char_boundary(&text, col);
    }

    // --- Private helpers ---

    const fn alloc_id(&mut self) -> BlockId {
        let id = BlockId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Give every rope line a fresh block id.
    fn reset_ids(&mut self) {
        let count = self.rope.len_lines();
        self.ids.clear();
        self.lines.clear();
        for idx in 0..count {
            let id = self.alloc_id();
            self.ids.push(id);
            self.lines.insert(id, idx);
        }
    }

    fn insert_id(&mut self, idx: usize, id: BlockId) {
        self.ids.insert(idx, id);
        self.reindex_from(idx);
    }

    fn remove_id(&mut self, idx: usize) -> BlockId {
        let id = self.ids.remove(idx);
        self.lines.remove(&id);
        self.reindex_from(idx);
        id
    }

    fn reindex_from(&mut self, start: usize) {
        for (idx, id) in self.ids.iter().enumerate().skip(start) {
            self.lines.insert(*id, idx);
        }
    }

    fn record_change(&mut self, change: ContentChange) {
        if self.edit_depth == 0 {
            self.changes.push(change);
            return;
        }
        self.pending_change = Some(match self.pending_change.take() {
            Some(prev) => ContentChange::new(
                prev.position.min(change.position),
                prev.chars_removed + change.chars_removed,
                prev.chars_added + change.chars_added,
            ),
            None => change,
        });
    }

    /// Char range of a line's content, excluding its terminator.
    fn line_span(&self, line_idx: usize) -> (usize, usize) {
        let start = self.rope.line_to_char(line_idx);
        let len = self
            .line_at(line_idx)
            .map_or(0, |text| text.chars().count());
        (start, start + len)
    }

    fn clamp_cursor(&mut self) {
        let max_line = self.line_count().saturating_sub(1);
        if self.cursor.line > max_line {
            self.cursor.line = max_line;
        }
        let text = self.line_at(self.cursor.line).unwrap_or_default();
        self.cursor.col = floor_char_boundary(&text, self.cursor.col);
    }

    /// Convert cursor position to a ropey char index.
    fn cursor_char_idx(&self) -> usize {
        let line_start = self.rope.line_to_char(self.cursor.line);
        let line_str = self.line_at(self.cursor.line).unwrap_or_default();
        let byte_col = floor_char_boundary(&line_str, self.cursor.col);
        line_start + line_str[..byte_col].chars().count()
    }
}

impl BlockBuffer for EditorBuffer {
    fn first_block(&self) -> Option<BlockId> {
        self.ids.first().copied()
    }

    fn next_block(&self, block: BlockId) -> Option<BlockId> {
        let idx = self.line_of(block)?;
        self.ids.get(idx + 1).copied()
    }

    fn previous_block(&self, block: BlockId) -> Option<BlockId> {
        let idx = self.line_of(block)?;
        idx.checked_sub(1).and_then(|prev| self.ids.get(prev).copied())
    }

    fn block_text(&self, block: BlockId) -> Option<String> {
        self.line_at(self.line_of(block)?)
    }

    fn binding(&self, block: BlockId) -> Option<ImageBinding> {
        self.bindings.get(&block).cloned()
    }

    fn set_binding(&mut self, block: BlockId, binding: ImageBinding) -> bool {
        let Some(idx) = self.line_of(block) else {
            return false;
        };
        let (start, end) = self.line_span(idx);
        self.bindings.insert(block, binding);
        // A format change is reported as the span being rewritten in place.
        self.record_change(ContentChange::new(start, end - start, end - start));
        self.dirty = true;
        true
    }

    fn insert_block_after(
        &mut self,
        after: BlockId,
        text: &str,
        binding: Option<ImageBinding>,
    ) -> Option<BlockId> {
        if text.contains('\n') {
            return None;
        }
        let idx = self.line_of(after)?;
        let (_, end) = self.line_span(idx);
        let inserted = format!("\n{text}");
        self.rope.insert(end, &inserted);
        let id = self.alloc_id();
        self.insert_id(idx + 1, id);
        if let Some(binding) = binding {
            self.bindings.insert(id, binding);
        }
        if idx < self.cursor.line {
            self.cursor.line += 1;
        }
        self.record_change(ContentChange::new(end, 0, inserted.chars().count()));
        self.dirty = true;
        Some(id)
    }

    fn remove_block(&mut self, block: BlockId) -> bool {
        let Some(idx) = self.line_of(block) else {
            return false;
        };
        let (start, end) = if self.ids.len() == 1 {
            // The buffer always keeps one line; empty it under a new identity.
            self.remove_id(0);
            let fresh = self.alloc_id();
            self.insert_id(0, fresh);
            self.line_span(0)
        } else if idx + 1 < self.ids.len() {
            let span = (self.rope.line_to_char(idx), self.rope.line_to_char(idx + 1));
            self.remove_id(idx);
            span
        } else {
            let span = (self.line_span(idx - 1).1, self.rope.len_chars());
            self.remove_id(idx);
            span
        };
        self.rope.remove(start..end);
        self.bindings.remove(&block);
        match idx.cmp(&self.cursor.line) {
            Ordering::Less => self.cursor.line -= 1,
            // The cursor's block is gone: continue at the start of the block
            // now in its place, or at the end of the new last line.
            Ordering::Equal if idx < self.line_count() => self.cursor.col = 0,
            Ordering::Equal => self.cursor = Cursor::at(idx.saturating_sub(1), usize::MAX),
            Ordering::Greater => {}
        }
        self.record_change(ContentChange::new(start, end - start, 0));
        self.clamp_cursor();
        self.dirty = true;
        true
    }

    fn set_block_text(&mut self, block: BlockId, text: &str) -> bool {
        if text.contains('\n') {
            return false;
        }
        let Some(idx) = self.line_of(block) else {
            return false;
        };
        let (start, end) = self.line_span(idx);
        self.rope.remove(start..end);
        self.rope.insert(start, text);
        self.record_change(ContentChange::new(
            start,
            end - start,
            text.chars().count(),
        ));
        self.clamp_cursor();
        self.dirty = true;
        true
    }

    fn begin_edit(&mut self) {
        self.edit_depth += 1;
    }

    fn end_edit(&mut self) {
        self.edit_depth = self.edit_depth.saturating_sub(1);
        if self.edit_depth == 0
            && let Some(change) = self.pending_change.take()
        {
            self.changes.push(change);
        }
    }

    fn is_modified(&self) -> bool {
        self.dirty
    }

    fn set_modified(&mut self, modified: bool) {
        self.dirty = modified;
    }
}

impl ResourceStore for EditorBuffer {
    fn add_resource(&mut self, name: &str, image: DynamicImage) {
        self.resources.insert(name.to_string(), image);
    }

    fn resource(&self, name: &str) -> Option<&DynamicImage> {
        self.resources.get(name)
    }
}

impl std::fmt::Debug for EditorBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorBuffer")
            .field(
                "rope",
                &format_args!("Rope({} lines)", self.rope.len_lines()),
            )
            .field("bindings", &self.bindings.len())
            .field("resources", &self.resources.len())
            .field("cursor", &self.cursor)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}
