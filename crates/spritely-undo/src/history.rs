//! Dual-stream undo/redo controller.
//!
//! `UndoHistory` owns the `undo` and `redo` streams and everything that
//! ties them together: recording entry points, group markers, label
//! propagation, the saved-state counters, and the memory budget that
//! evicts the oldest top-level groups.

use tracing::{debug, trace};

use spritely_raster::{Dirty, ObjectId};

use crate::chunk::ChunkKind;
use crate::chunks;
use crate::config::UndoConfig;
use crate::error::Result;
use crate::objects::ObjectsContainer;
use crate::stream::UndoStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

/// Linear, bidirectional edit timeline.
///
/// Recording pushes chunks on the `undo` stream and clears `redo`;
/// replaying pops one full top-level group from one stream while the
/// inverters push the opposite chunks on the other. The controller never
/// owns document objects; every call that touches live state borrows the
/// [`ObjectsContainer`] for its duration.
pub struct UndoHistory {
    undo: UndoStream,
    redo: UndoStream,
    label: Option<String>,
    enabled: bool,
    diff_count: i64,
    diff_saved: i64,
    size_limit: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoHistory {
    /// Create a history configured from the environment (falling back to
    /// the default 8 MiB size limit).
    pub fn new() -> Self {
        Self::with_config(UndoConfig::from_env())
    }

    /// Create a history with an explicit configuration.
    pub fn with_config(config: UndoConfig) -> Self {
        Self {
            undo: UndoStream::new(),
            redo: UndoStream::new(),
            label: None,
            enabled: true,
            diff_count: 0,
            diff_saved: 0,
            size_limit: config.size_limit_bytes(),
        }
    }

    // ── state queries ────────────────────────────────────────────────

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Bookkeeping flag for callers; recording entry points do not gate
    /// on it.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the document matches the last marked save point.
    pub fn is_saved_state(&self) -> bool {
        self.diff_count == self.diff_saved
    }

    /// Mark the current position as the saved state.
    pub fn mark_saved_state(&mut self) {
        self.diff_saved = self.diff_count;
    }

    /// Bytes held by the undo stream.
    pub fn undo_mem_size(&self) -> usize {
        self.undo.mem_size()
    }

    /// Bytes held by the redo stream.
    pub fn redo_mem_size(&self) -> usize {
        self.redo.mem_size()
    }

    /// The undo stream, head (newest) first.
    pub fn undo_stream(&self) -> &UndoStream {
        &self.undo
    }

    /// The redo stream, head (newest) first.
    pub fn redo_stream(&self) -> &UndoStream {
        &self.redo
    }

    /// Number of top-level groups on the undo stream.
    pub fn undo_group_count(&self) -> usize {
        count_groups(&self.undo)
    }

    /// Change the size limit at runtime.
    pub fn set_size_limit_mib(&mut self, mib: u32) {
        self.size_limit = (mib as usize) << 20;
    }

    // ── labels ───────────────────────────────────────────────────────

    /// Tag subsequent chunks with a user-visible label. The label is
    /// copied into every chunk recorded until it is replaced.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    /// Drop the label; subsequent chunks fall back to their kind name.
    pub fn clear_label(&mut self) {
        self.label = None;
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Label of the next group `undo` would apply.
    pub fn next_undo_label(&self) -> Option<&str> {
        self.undo.peek_head().map(|chunk| chunk.label.as_str())
    }

    /// Label of the next group `redo` would apply.
    pub fn next_redo_label(&self) -> Option<&str> {
        self.redo.peek_head().map(|chunk| chunk.label.as_str())
    }

    // ── group markers ────────────────────────────────────────────────

    /// Open a group: subsequent chunks undo as one user-visible step.
    pub fn open_group(&mut self) {
        chunks::open_new(&mut self.undo, self.label.as_deref());
        self.update_undo();
    }

    /// Close the innermost open group.
    pub fn close_group(&mut self) {
        chunks::close_new(&mut self.undo, self.label.as_deref());
        self.update_undo();
    }

    // ── recording entry points ───────────────────────────────────────

    /// Snapshot a window of an object's plain state block.
    pub fn record_data(
        &mut self,
        objects: &ObjectsContainer,
        id: ObjectId,
        offset: u32,
        len: u32,
    ) -> Result<()> {
        chunks::data_new(&mut self.undo, objects, self.label.as_deref(), id, offset, len)?;
        self.update_undo();
        Ok(())
    }

    /// Snapshot a pixel rectangle of an image.
    pub fn record_image(
        &mut self,
        objects: &ObjectsContainer,
        image_id: ObjectId,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
    ) -> Result<()> {
        chunks::image_new(
            &mut self.undo,
            objects,
            self.label.as_deref(),
            image_id,
            x,
            y,
            w,
            h,
        )?;
        self.update_undo();
        Ok(())
    }

    /// Record a region flip (`horizontal` mirrors columns, otherwise
    /// rows). Coordinates are inclusive.
    pub fn record_flip(
        &mut self,
        objects: &ObjectsContainer,
        image_id: ObjectId,
        x1: u16,
        y1: u16,
        x2: u16,
        y2: u16,
        horizontal: bool,
    ) -> Result<()> {
        chunks::flip_new(
            &mut self.undo,
            objects,
            self.label.as_deref(),
            image_id,
            x1,
            y1,
            x2,
            y2,
            horizontal,
        )?;
        self.update_undo();
        Ok(())
    }

    /// Record a sparse pixel diff against an image.
    pub fn record_dirty(
        &mut self,
        objects: &ObjectsContainer,
        image_id: ObjectId,
        dirty: &Dirty,
    ) -> Result<()> {
        chunks::dirty_new(&mut self.undo, objects, self.label.as_deref(), image_id, dirty)?;
        self.update_undo();
        Ok(())
    }

    /// Record that an image was added to a stock slot.
    pub fn record_add_image(
        &mut self,
        objects: &ObjectsContainer,
        stock_id: ObjectId,
        index: u16,
    ) -> Result<()> {
        chunks::add_image_new(&mut self.undo, objects, self.label.as_deref(), stock_id, index)?;
        self.update_undo();
        Ok(())
    }

    /// Record an image about to be removed from a stock slot.
    pub fn record_remove_image(
        &mut self,
        objects: &ObjectsContainer,
        stock_id: ObjectId,
        index: u16,
    ) -> Result<()> {
        chunks::remove_image_new(&mut self.undo, objects, self.label.as_deref(), stock_id, index)?;
        self.update_undo();
        Ok(())
    }

    /// Record an image about to be replaced in a stock slot.
    pub fn record_replace_image(
        &mut self,
        objects: &ObjectsContainer,
        stock_id: ObjectId,
        index: u16,
    ) -> Result<()> {
        chunks::replace_image_new(&mut self.undo, objects, self.label.as_deref(), stock_id, index)?;
        self.update_undo();
        Ok(())
    }

    /// Record that a cel was added to a layer.
    pub fn record_add_cel(
        &mut self,
        objects: &ObjectsContainer,
        layer_id: ObjectId,
        cel_id: ObjectId,
    ) -> Result<()> {
        chunks::add_cel_new(&mut self.undo, objects, self.label.as_deref(), layer_id, cel_id)?;
        self.update_undo();
        Ok(())
    }

    /// Record a cel about to be removed from a layer.
    pub fn record_remove_cel(
        &mut self,
        objects: &ObjectsContainer,
        layer_id: ObjectId,
        cel_id: ObjectId,
    ) -> Result<()> {
        chunks::remove_cel_new(&mut self.undo, objects, self.label.as_deref(), layer_id, cel_id)?;
        self.update_undo();
        Ok(())
    }

    /// Snapshot a layer's name.
    pub fn record_set_layer_name(
        &mut self,
        objects: &ObjectsContainer,
        layer_id: ObjectId,
    ) -> Result<()> {
        chunks::set_layer_name_new(&mut self.undo, objects, self.label.as_deref(), layer_id)?;
        self.update_undo();
        Ok(())
    }

    /// Record that a layer was added to a folder.
    pub fn record_add_layer(
        &mut self,
        objects: &ObjectsContainer,
        folder_id: ObjectId,
        layer_id: ObjectId,
    ) -> Result<()> {
        chunks::add_layer_new(
            &mut self.undo,
            objects,
            self.label.as_deref(),
            folder_id,
            layer_id,
        )?;
        self.update_undo();
        Ok(())
    }

    /// Record a layer subtree about to be removed.
    pub fn record_remove_layer(
        &mut self,
        objects: &ObjectsContainer,
        layer_id: ObjectId,
    ) -> Result<()> {
        chunks::remove_layer_new(&mut self.undo, objects, self.label.as_deref(), layer_id)?;
        self.update_undo();
        Ok(())
    }

    /// Snapshot a layer's position in the tree before a move.
    pub fn record_move_layer(
        &mut self,
        objects: &ObjectsContainer,
        layer_id: ObjectId,
    ) -> Result<()> {
        chunks::move_layer_new(&mut self.undo, objects, self.label.as_deref(), layer_id)?;
        self.update_undo();
        Ok(())
    }

    /// Snapshot the sprite's current layer selection.
    pub fn record_set_layer(
        &mut self,
        objects: &ObjectsContainer,
        sprite_id: ObjectId,
    ) -> Result<()> {
        chunks::set_layer_new(&mut self.undo, objects, self.label.as_deref(), sprite_id)?;
        self.update_undo();
        Ok(())
    }

    /// Record that a palette was added to a sprite.
    pub fn record_add_palette(
        &mut self,
        objects: &ObjectsContainer,
        sprite_id: ObjectId,
        palette_id: ObjectId,
    ) -> Result<()> {
        chunks::add_palette_new(
            &mut self.undo,
            objects,
            self.label.as_deref(),
            sprite_id,
            palette_id,
        )?;
        self.update_undo();
        Ok(())
    }

    /// Record a palette about to be removed from a sprite.
    pub fn record_remove_palette(
        &mut self,
        objects: &ObjectsContainer,
        sprite_id: ObjectId,
        palette_id: ObjectId,
    ) -> Result<()> {
        chunks::remove_palette_new(
            &mut self.undo,
            objects,
            self.label.as_deref(),
            sprite_id,
            palette_id,
        )?;
        self.update_undo();
        Ok(())
    }

    /// Snapshot a range of palette entries. The sprite's *current* frame
    /// is recorded with the range; inversion writes into whatever palette
    /// serves that frame at replay time.
    pub fn record_set_palette_colors(
        &mut self,
        objects: &ObjectsContainer,
        sprite_id: ObjectId,
        palette_id: ObjectId,
        from: u8,
        to: u8,
    ) -> Result<()> {
        chunks::set_palette_colors_new(
            &mut self.undo,
            objects,
            self.label.as_deref(),
            sprite_id,
            palette_id,
            from,
            to,
        )?;
        self.update_undo();
        Ok(())
    }

    /// Record a palette remap over a frame range. `mapping` must be a
    /// permutation of `0..256`.
    pub fn record_remap_palette(
        &mut self,
        objects: &ObjectsContainer,
        sprite_id: ObjectId,
        frame_from: u16,
        frame_to: u16,
        mapping: &[u8; 256],
    ) -> Result<()> {
        chunks::remap_palette_new(
            &mut self.undo,
            objects,
            self.label.as_deref(),
            sprite_id,
            frame_from,
            frame_to,
            mapping,
        )?;
        self.update_undo();
        Ok(())
    }

    /// Snapshot the document's selection mask.
    pub fn record_set_mask(
        &mut self,
        objects: &ObjectsContainer,
        document_id: ObjectId,
    ) -> Result<()> {
        chunks::set_mask_new(&mut self.undo, objects, self.label.as_deref(), document_id)?;
        self.update_undo();
        Ok(())
    }

    /// Snapshot the sprite's pixel format.
    pub fn record_set_format(
        &mut self,
        objects: &ObjectsContainer,
        sprite_id: ObjectId,
    ) -> Result<()> {
        chunks::set_format_new(&mut self.undo, objects, self.label.as_deref(), sprite_id)?;
        self.update_undo();
        Ok(())
    }

    /// Snapshot the sprite's canvas size.
    pub fn record_set_size(
        &mut self,
        objects: &ObjectsContainer,
        sprite_id: ObjectId,
    ) -> Result<()> {
        chunks::set_size_new(&mut self.undo, objects, self.label.as_deref(), sprite_id)?;
        self.update_undo();
        Ok(())
    }

    /// Snapshot the sprite's current frame.
    pub fn record_set_frame(
        &mut self,
        objects: &ObjectsContainer,
        sprite_id: ObjectId,
    ) -> Result<()> {
        chunks::set_frame_new(&mut self.undo, objects, self.label.as_deref(), sprite_id)?;
        self.update_undo();
        Ok(())
    }

    /// Snapshot the sprite's frame count.
    pub fn record_set_frames(
        &mut self,
        objects: &ObjectsContainer,
        sprite_id: ObjectId,
    ) -> Result<()> {
        chunks::set_frames_new(&mut self.undo, objects, self.label.as_deref(), sprite_id)?;
        self.update_undo();
        Ok(())
    }

    /// Snapshot one frame's duration.
    pub fn record_set_frame_duration(
        &mut self,
        objects: &ObjectsContainer,
        sprite_id: ObjectId,
        frame: u16,
    ) -> Result<()> {
        chunks::set_frame_duration_new(
            &mut self.undo,
            objects,
            self.label.as_deref(),
            sprite_id,
            frame,
        )?;
        self.update_undo();
        Ok(())
    }

    // ── replay ───────────────────────────────────────────────────────

    /// Apply one full top-level group from the undo stream, recording
    /// inverses on the redo stream.
    pub fn undo(&mut self, objects: &mut ObjectsContainer) -> Result<()> {
        self.run_replay(objects, Direction::Undo)
    }

    /// Apply one full top-level group from the redo stream, recording
    /// inverses on the undo stream.
    pub fn redo(&mut self, objects: &mut ObjectsContainer) -> Result<()> {
        self.run_replay(objects, Direction::Redo)
    }

    /// Drop all redoable chunks.
    pub fn clear_redo(&mut self) {
        if !self.redo.is_empty() {
            self.redo.clear();
        }
    }

    fn run_replay(&mut self, objects: &mut ObjectsContainer, direction: Direction) -> Result<()> {
        debug!(?direction, "replaying one group");
        let mut depth = 0i32;
        loop {
            let chunk = match direction {
                Direction::Undo => self.undo.pop_head(),
                Direction::Redo => self.redo.pop_head(),
            };
            let Some(chunk) = chunk else {
                break;
            };

            self.label = Some(chunk.label.clone());
            {
                let dst = match direction {
                    Direction::Undo => &mut self.redo,
                    Direction::Redo => &mut self.undo,
                };
                chunks::invert_chunk(dst, objects, &chunk)?;
            }

            match chunk.kind {
                ChunkKind::Open => depth += 1,
                ChunkKind::Close => depth -= 1,
                _ => {}
            }
            match direction {
                Direction::Undo => self.diff_count -= 1,
                Direction::Redo => self.diff_count += 1,
            }

            if depth == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Free the oldest top-level group without touching live state.
    fn discard_tail(&mut self) {
        let mut depth = 0i32;
        loop {
            let Some(chunk) = self.undo.pop_tail() else {
                break;
            };
            match chunk.kind {
                ChunkKind::Open => depth += 1,
                ChunkKind::Close => depth -= 1,
                _ => {}
            }
            if depth == 0 {
                break;
            }
        }
    }

    /// Post-recording bookkeeping: bump the diff counter, clear redo, and
    /// enforce the size limit at out-of-group boundaries.
    fn update_undo(&mut self) {
        self.diff_count += 1;
        self.clear_redo();

        trace!(
            diff_count = self.diff_count,
            mem_size = self.undo.mem_size(),
            "recorded chunk"
        );

        if out_of_group(&self.undo) {
            let mut groups = count_groups(&self.undo);
            while groups > 1 && self.undo.mem_size() > self.size_limit {
                debug!(
                    mem_size = self.undo.mem_size(),
                    limit = self.size_limit,
                    "discarding oldest undo group"
                );
                self.discard_tail();
                groups -= 1;
            }
        }
    }
}

/// Number of times the running group depth returns to zero walking head
/// to tail. For a well-formed stream this is the top-level entry count.
fn count_groups(stream: &UndoStream) -> usize {
    let mut groups = 0;
    let mut depth = 0i32;
    for chunk in stream.iter() {
        match chunk.kind {
            ChunkKind::Open => depth += 1,
            ChunkKind::Close => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            groups += 1;
        }
    }
    groups
}

/// Whether the stream's total group depth balances out, i.e. no group is
/// currently open.
fn out_of_group(stream: &UndoStream) -> bool {
    let mut depth = 0i32;
    for chunk in stream.iter() {
        match chunk.kind {
            ChunkKind::Open => depth += 1,
            ChunkKind::Close => depth -= 1,
            _ => {}
        }
    }
    depth == 0
}
