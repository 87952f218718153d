//! Per-kind chunk encoders and inverters.
//!
//! Every kind has an encoder (`*_new`) that reads *current* live state
//! into a chunk pushed on a stream, and an inverter (`*_invert`) that
//! re-encodes the symmetric chunk onto the destination stream and then
//! applies the stored payload to the live graph. Symmetric kinds snapshot
//! before overwriting, so round-trips stay correct even if live state
//! drifted between edits.
//!
//! Inverter tolerance: a chunk whose target object was deleted is a
//! silent no-op: nothing is emitted and nothing is mutated. Two
//! mismatches are fatal: an image region recorded under a different pixel
//! format, and palette colors recorded for a frame no palette serves.

use spritely_raster::{ObjectId, PixelFormat};

use crate::chunk::{Chunk, ChunkKind};
use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{Result, UndoError};
use crate::objects::{Object, ObjectsContainer};
use crate::raw;
use crate::stream::UndoStream;

fn push(dst: &mut UndoStream, kind: ChunkKind, label: Option<&str>, payload: Vec<u8>) {
    dst.push(Chunk::new(kind, label, payload));
}

/// Invert one chunk onto `dst`, mutating live state through `objects`.
pub(crate) fn invert_chunk(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    chunk: &Chunk,
) -> Result<()> {
    let label = Some(chunk.label.as_str());
    let mut r = ByteReader::new(&chunk.payload);
    match chunk.kind {
        ChunkKind::Open => {
            close_new(dst, label);
            Ok(())
        }
        ChunkKind::Close => {
            open_new(dst, label);
            Ok(())
        }
        ChunkKind::Data => data_invert(dst, objects, label, &mut r),
        ChunkKind::Image => image_invert(dst, objects, label, &mut r),
        ChunkKind::Flip => flip_invert(dst, objects, label, &mut r),
        ChunkKind::Dirty => dirty_invert(dst, objects, label, &mut r),
        ChunkKind::AddImage => add_image_invert(dst, objects, label, &mut r),
        ChunkKind::RemoveImage => remove_image_invert(dst, objects, label, &mut r),
        ChunkKind::ReplaceImage => replace_image_invert(dst, objects, label, &mut r),
        ChunkKind::AddCel => add_cel_invert(dst, objects, label, &mut r),
        ChunkKind::RemoveCel => remove_cel_invert(dst, objects, label, &mut r),
        ChunkKind::SetLayerName => set_layer_name_invert(dst, objects, label, &mut r),
        ChunkKind::AddLayer => add_layer_invert(dst, objects, label, &mut r),
        ChunkKind::RemoveLayer => remove_layer_invert(dst, objects, label, &mut r),
        ChunkKind::MoveLayer => move_layer_invert(dst, objects, label, &mut r),
        ChunkKind::SetLayer => set_layer_invert(dst, objects, label, &mut r),
        ChunkKind::AddPalette => add_palette_invert(dst, objects, label, &mut r),
        ChunkKind::RemovePalette => remove_palette_invert(dst, objects, label, &mut r),
        ChunkKind::SetPaletteColors => set_palette_colors_invert(dst, objects, label, &mut r),
        ChunkKind::RemapPalette => remap_palette_invert(dst, objects, label, &mut r),
        ChunkKind::SetMask => set_mask_invert(dst, objects, label, &mut r),
        ChunkKind::SetFormat => set_format_invert(dst, objects, label, &mut r),
        ChunkKind::SetSize => set_size_invert(dst, objects, label, &mut r),
        ChunkKind::SetFrame => set_frame_invert(dst, objects, label, &mut r),
        ChunkKind::SetFrames => set_frames_invert(dst, objects, label, &mut r),
        ChunkKind::SetFrameDuration => set_frame_duration_invert(dst, objects, label, &mut r),
    }
}

// ── open / close ─────────────────────────────────────────────────────

pub(crate) fn open_new(dst: &mut UndoStream, label: Option<&str>) {
    push(dst, ChunkKind::Open, label, Vec::new());
}

pub(crate) fn close_new(dst: &mut UndoStream, label: Option<&str>) {
    push(dst, ChunkKind::Close, label, Vec::new());
}

// ── data ─────────────────────────────────────────────────────────────
//
// Payload: u32 object id | u32 offset | u32 size | bytes.
//
// The offset addresses the object's plain state block:
//   cel:    u16 frame | u16 image | i16 x | i16 y | u16 opacity
//   sprite: u32 width | u32 height | u16 frames | u16 frame | u8 format

fn field_block(objects: &ObjectsContainer, id: ObjectId) -> Result<Vec<u8>> {
    let object = objects.get(id).ok_or(UndoError::MissingObject { id })?;
    let mut w = ByteWriter::new();
    match object {
        Object::Cel(cel) => {
            w.u16(cel.frame);
            w.u16(cel.image);
            w.i16(cel.x);
            w.i16(cel.y);
            w.u16(cel.opacity);
        }
        Object::Sprite(sprite) => {
            w.u32(sprite.width());
            w.u32(sprite.height());
            w.u16(sprite.total_frames());
            w.u16(sprite.current_frame());
            w.u8(sprite.format().as_u8());
        }
        _ => {
            return Err(UndoError::UnexpectedKind {
                id,
                expected: "cel or sprite",
            })
        }
    }
    Ok(w.into_inner())
}

fn apply_field_block(
    objects: &mut ObjectsContainer,
    id: ObjectId,
    offset: u32,
    bytes: &[u8],
) -> Result<()> {
    let mut block = field_block(objects, id)?;
    let start = offset as usize;
    let end = start + bytes.len();
    if end > block.len() {
        return Err(UndoError::InvalidFieldWindow {
            offset,
            len: bytes.len() as u32,
            block: block.len(),
        });
    }
    block[start..end].copy_from_slice(bytes);

    let mut r = ByteReader::new(&block);
    if let Some(cel) = objects.cel_mut(id) {
        cel.frame = r.u16()?;
        cel.image = r.u16()?;
        cel.x = r.i16()?;
        cel.y = r.i16()?;
        cel.opacity = r.u16()?;
        return Ok(());
    }
    if objects.sprite(id).is_some() {
        let width = r.u32()?;
        let height = r.u32()?;
        let frames = r.u16()?;
        let frame = r.u16()?;
        let tag = r.u8()?;
        let format = PixelFormat::from_u8(tag).ok_or(UndoError::UnknownTag {
            what: "pixel format",
            value: tag as u16,
        })?;
        if let Some(sprite) = objects.sprite_mut(id) {
            sprite.set_size(width, height);
            sprite.set_total_frames(frames);
            sprite.set_current_frame(frame);
            sprite.set_format(format);
        }
        return Ok(());
    }
    Err(UndoError::UnexpectedKind {
        id,
        expected: "cel or sprite",
    })
}

pub(crate) fn data_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    id: ObjectId,
    offset: u32,
    len: u32,
) -> Result<()> {
    let block = field_block(objects, id)?;
    let start = offset as usize;
    let end = start + len as usize;
    if len == 0 || end > block.len() {
        return Err(UndoError::InvalidFieldWindow {
            offset,
            len,
            block: block.len(),
        });
    }

    let mut w = ByteWriter::new();
    w.u32(id.0);
    w.u32(offset);
    w.u32(len);
    w.bytes(&block[start..end]);
    push(dst, ChunkKind::Data, label, w.into_inner());
    Ok(())
}

fn data_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let id = ObjectId(r.u32()?);
    let offset = r.u32()?;
    let len = r.u32()?;
    let bytes = r.bytes(len as usize)?;

    if !objects.contains(id) {
        return Ok(());
    }
    data_new(dst, objects, label, id, offset, len)?;
    apply_field_block(objects, id, offset, bytes)
}

// ── image ────────────────────────────────────────────────────────────
//
// Payload: u32 image id | u8 format | u16 x | u16 y | u16 w | u16 h |
// h rows of line_size(w) pixel bytes.

pub(crate) fn image_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    image_id: ObjectId,
    x: u16,
    y: u16,
    w: u16,
    h: u16,
) -> Result<()> {
    let image = objects
        .image(image_id)
        .ok_or(UndoError::MissingObject { id: image_id })?;
    if !image.contains_rect(x, y, w, h) {
        return Err(UndoError::RectOutOfBounds { x, y, w, h });
    }

    let mut wtr = ByteWriter::new();
    wtr.u32(image_id.0);
    wtr.u8(image.format().as_u8());
    wtr.u16(x);
    wtr.u16(y);
    wtr.u16(w);
    wtr.u16(h);
    for row in y..y + h {
        let Some(span) = image.span(x, row, w) else {
            return Err(UndoError::RectOutOfBounds { x, y, w, h });
        };
        wtr.bytes(span);
    }
    push(dst, ChunkKind::Image, label, wtr.into_inner());
    Ok(())
}

fn image_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let id = ObjectId(r.u32()?);
    let tag = r.u8()?;
    let x = r.u16()?;
    let y = r.u16()?;
    let w = r.u16()?;
    let h = r.u16()?;

    let Some(image) = objects.image(id) else {
        return Ok(());
    };
    let format = PixelFormat::from_u8(tag).ok_or(UndoError::UnknownTag {
        what: "pixel format",
        value: tag as u16,
    })?;
    if image.format() != format {
        return Err(UndoError::FormatMismatch {
            id,
            expected: format,
            actual: image.format(),
        });
    }

    // Snapshot the current pixels, then restore the recorded ones.
    image_new(dst, objects, label, id, x, y, w, h)?;

    let line = format.line_size(w);
    let Some(image) = objects.image_mut(id) else {
        return Ok(());
    };
    for row in y..y + h {
        let bytes = r.bytes(line)?;
        if let Some(span) = image.span_mut(x, row, w) {
            span.copy_from_slice(bytes);
        }
    }
    Ok(())
}

// ── flip ─────────────────────────────────────────────────────────────
//
// Payload: u32 image id | u8 format | u16 x1 | u16 y1 | u16 x2 | u16 y2 |
// u8 axis (1 = horizontal). Flipping is self-inverse for a fixed axis.

/// Whether the inclusive region `(x1, y1)..=(x2, y2)` lies inside the
/// image. Widths are computed in u32 so degenerate corner values cannot
/// wrap.
fn region_in_image(
    image: &spritely_raster::Image,
    x1: u16,
    y1: u16,
    x2: u16,
    y2: u16,
) -> bool {
    x1 <= x2
        && y1 <= y2
        && (x2 as u32 + 1) <= image.width() as u32
        && (y2 as u32 + 1) <= image.height() as u32
}

pub(crate) fn flip_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    image_id: ObjectId,
    x1: u16,
    y1: u16,
    x2: u16,
    y2: u16,
    horizontal: bool,
) -> Result<()> {
    let image = objects
        .image(image_id)
        .ok_or(UndoError::MissingObject { id: image_id })?;
    if !region_in_image(image, x1, y1, x2, y2) {
        return Err(UndoError::RectOutOfBounds {
            x: x1,
            y: y1,
            w: x2.wrapping_sub(x1).wrapping_add(1),
            h: y2.wrapping_sub(y1).wrapping_add(1),
        });
    }

    let mut w = ByteWriter::new();
    w.u32(image_id.0);
    w.u8(image.format().as_u8());
    w.u16(x1);
    w.u16(y1);
    w.u16(x2);
    w.u16(y2);
    w.u8(horizontal as u8);
    push(dst, ChunkKind::Flip, label, w.into_inner());
    Ok(())
}

fn flip_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let id = ObjectId(r.u32()?);
    let tag = r.u8()?;
    let x1 = r.u16()?;
    let y1 = r.u16()?;
    let x2 = r.u16()?;
    let y2 = r.u16()?;
    let horizontal = r.u8()? != 0;

    let Some(image) = objects.image(id) else {
        return Ok(());
    };
    let Some(format) = PixelFormat::from_u8(tag) else {
        return Err(UndoError::UnknownTag {
            what: "pixel format",
            value: tag as u16,
        });
    };
    if image.format() != format || !region_in_image(image, x1, y1, x2, y2) {
        return Ok(());
    }

    flip_new(dst, objects, label, id, x1, y1, x2, y2, horizontal)?;

    let (w, h) = (x2 - x1 + 1, y2 - y1 + 1);
    let Some(image) = objects.image_mut(id) else {
        return Ok(());
    };
    let mut area = Vec::with_capacity(w as usize * h as usize);
    for dy in 0..h {
        for dx in 0..w {
            area.push(image.pixel(x1 + dx, y1 + dy).unwrap_or(0));
        }
    }
    for dy in 0..h {
        for dx in 0..w {
            let value = area[dy as usize * w as usize + dx as usize];
            let tx = if horizontal { x2 - dx } else { x1 + dx };
            let ty = if horizontal { y1 + dy } else { y2 - dy };
            image.put_pixel(tx, ty, value);
        }
    }
    Ok(())
}

// ── dirty ────────────────────────────────────────────────────────────
//
// Payload: u32 image id | dirty blob. The inverter swaps the diff with
// the image, then re-encodes the swapped diff.

pub(crate) fn dirty_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    image_id: ObjectId,
    dirty: &spritely_raster::Dirty,
) -> Result<()> {
    if objects.image(image_id).is_none() {
        return Err(UndoError::MissingObject { id: image_id });
    }
    let mut w = ByteWriter::new();
    w.u32(image_id.0);
    raw::write_dirty(&mut w, dirty);
    push(dst, ChunkKind::Dirty, label, w.into_inner());
    Ok(())
}

fn dirty_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let id = ObjectId(r.u32()?);
    let mut dirty = raw::read_dirty(r)?;

    let Some(image) = objects.image_mut(id) else {
        return Ok(());
    };
    if image.format() != dirty.format() {
        return Ok(());
    }
    dirty.swap_image_pixels(image);
    dirty_new(dst, objects, label, id, &dirty)
}

// ── add_image / remove_image / replace_image ─────────────────────────
//
// Payload: u32 stock id | u32 slot index, plus an image blob for the
// remove/replace kinds.

pub(crate) fn add_image_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    stock_id: ObjectId,
    index: u16,
) -> Result<()> {
    if objects.stock(stock_id).is_none() {
        return Err(UndoError::MissingObject { id: stock_id });
    }
    let mut w = ByteWriter::new();
    w.u32(stock_id.0);
    w.u32(index as u32);
    push(dst, ChunkKind::AddImage, label, w.into_inner());
    Ok(())
}

fn add_image_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let stock_id = ObjectId(r.u32()?);
    let index = r.u32()? as u16;

    let Some(stock) = objects.stock(stock_id) else {
        return Ok(());
    };
    let Some(image_id) = stock.image(index) else {
        return Ok(());
    };

    remove_image_new(dst, objects, label, stock_id, index)?;
    if let Some(stock) = objects.stock_mut(stock_id) {
        stock.remove_image(index);
    }
    objects.remove(image_id);
    Ok(())
}

pub(crate) fn remove_image_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    stock_id: ObjectId,
    index: u16,
) -> Result<()> {
    let stock = objects
        .stock(stock_id)
        .ok_or(UndoError::MissingObject { id: stock_id })?;
    let image_id = stock
        .image(index)
        .ok_or(UndoError::EmptyStockSlot { index })?;
    let image = objects
        .image(image_id)
        .ok_or(UndoError::MissingObject { id: image_id })?;

    let mut w = ByteWriter::new();
    w.u32(stock_id.0);
    w.u32(index as u32);
    raw::write_image(&mut w, image_id, image);
    push(dst, ChunkKind::RemoveImage, label, w.into_inner());
    Ok(())
}

fn remove_image_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let stock_id = ObjectId(r.u32()?);
    let index = r.u32()? as u16;

    if objects.stock(stock_id).is_none() {
        return Ok(());
    }
    let image_id = raw::read_image(objects, r)?;
    if let Some(old) = objects
        .stock_mut(stock_id)
        .and_then(|stock| stock.replace_image(index, image_id))
    {
        if old != image_id {
            objects.remove(old);
        }
    }
    add_image_new(dst, objects, label, stock_id, index)
}

pub(crate) fn replace_image_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    stock_id: ObjectId,
    index: u16,
) -> Result<()> {
    let stock = objects
        .stock(stock_id)
        .ok_or(UndoError::MissingObject { id: stock_id })?;
    let image_id = stock
        .image(index)
        .ok_or(UndoError::EmptyStockSlot { index })?;
    let image = objects
        .image(image_id)
        .ok_or(UndoError::MissingObject { id: image_id })?;

    let mut w = ByteWriter::new();
    w.u32(stock_id.0);
    w.u32(index as u32);
    raw::write_image(&mut w, image_id, image);
    push(dst, ChunkKind::ReplaceImage, label, w.into_inner());
    Ok(())
}

fn replace_image_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let stock_id = ObjectId(r.u32()?);
    let index = r.u32()? as u16;

    let Some(stock) = objects.stock(stock_id) else {
        return Ok(());
    };
    let Some(old_id) = stock.image(index) else {
        return Ok(());
    };

    // Snapshot the current image, then swap in the recorded one.
    replace_image_new(dst, objects, label, stock_id, index)?;
    let new_id = raw::read_image(objects, r)?;
    if let Some(stock) = objects.stock_mut(stock_id) {
        stock.replace_image(index, new_id);
    }
    if old_id != new_id {
        objects.remove(old_id);
    }
    Ok(())
}

// ── add_cel / remove_cel ─────────────────────────────────────────────

pub(crate) fn add_cel_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    layer_id: ObjectId,
    cel_id: ObjectId,
) -> Result<()> {
    if objects.layer(layer_id).is_none() {
        return Err(UndoError::MissingObject { id: layer_id });
    }
    if objects.cel(cel_id).is_none() {
        return Err(UndoError::MissingObject { id: cel_id });
    }
    let mut w = ByteWriter::new();
    w.u32(layer_id.0);
    w.u32(cel_id.0);
    push(dst, ChunkKind::AddCel, label, w.into_inner());
    Ok(())
}

fn add_cel_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let layer_id = ObjectId(r.u32()?);
    let cel_id = ObjectId(r.u32()?);

    if objects.layer(layer_id).is_none() || objects.cel(cel_id).is_none() {
        return Ok(());
    }
    remove_cel_new(dst, objects, label, layer_id, cel_id)?;
    if let Some(cels) = objects.layer_mut(layer_id).and_then(|l| l.cels_mut()) {
        cels.retain(|&c| c != cel_id);
    }
    objects.remove(cel_id);
    Ok(())
}

pub(crate) fn remove_cel_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    layer_id: ObjectId,
    cel_id: ObjectId,
) -> Result<()> {
    let cel = objects
        .cel(cel_id)
        .ok_or(UndoError::MissingObject { id: cel_id })?;

    let mut w = ByteWriter::new();
    w.u32(layer_id.0);
    raw::write_cel(&mut w, cel_id, cel);
    push(dst, ChunkKind::RemoveCel, label, w.into_inner());
    Ok(())
}

/// Insert a cel into a layer keeping the cel list ordered by frame.
fn insert_cel_sorted(objects: &mut ObjectsContainer, layer_id: ObjectId, cel_id: ObjectId) {
    let Some(frame) = objects.cel(cel_id).map(|cel| cel.frame) else {
        return;
    };
    let pos = {
        let Some(cels) = objects.layer(layer_id).and_then(|l| l.cels()) else {
            return;
        };
        cels.iter()
            .position(|&c| objects.cel(c).is_some_and(|other| other.frame > frame))
            .unwrap_or(cels.len())
    };
    if let Some(cels) = objects.layer_mut(layer_id).and_then(|l| l.cels_mut()) {
        cels.insert(pos, cel_id);
    }
}

fn remove_cel_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let layer_id = ObjectId(r.u32()?);
    if objects.layer(layer_id).is_none() {
        return Ok(());
    }
    let cel_id = raw::read_cel(objects, r)?;
    add_cel_new(dst, objects, label, layer_id, cel_id)?;
    insert_cel_sorted(objects, layer_id, cel_id);
    Ok(())
}

// ── set_layer_name ───────────────────────────────────────────────────

pub(crate) fn set_layer_name_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    layer_id: ObjectId,
) -> Result<()> {
    let layer = objects
        .layer(layer_id)
        .ok_or(UndoError::MissingObject { id: layer_id })?;

    let mut w = ByteWriter::new();
    w.u32(layer_id.0);
    w.u16(layer.name().len() as u16);
    w.bytes(layer.name().as_bytes());
    push(dst, ChunkKind::SetLayerName, label, w.into_inner());
    Ok(())
}

fn set_layer_name_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let layer_id = ObjectId(r.u32()?);
    let len = r.u16()? as usize;
    let name = String::from_utf8_lossy(r.bytes(len)?).into_owned();

    if objects.layer(layer_id).is_none() {
        return Ok(());
    }
    set_layer_name_new(dst, objects, label, layer_id)?;
    if let Some(layer) = objects.layer_mut(layer_id) {
        layer.set_name(name);
    }
    Ok(())
}

// ── add_layer / remove_layer / move_layer ────────────────────────────

/// The sibling right before `layer_id` in its parent folder.
fn prev_sibling(objects: &ObjectsContainer, layer_id: ObjectId) -> ObjectId {
    let Some(parent_id) = objects.layer(layer_id).map(|l| l.parent) else {
        return ObjectId::NONE;
    };
    let Some(children) = objects.layer(parent_id).and_then(|l| l.children()) else {
        return ObjectId::NONE;
    };
    match children.iter().position(|&c| c == layer_id) {
        Some(0) | None => ObjectId::NONE,
        Some(i) => children[i - 1],
    }
}

/// Insert `layer_id` into `folder_id` right after `after_id` (or first).
fn insert_layer_after(
    objects: &mut ObjectsContainer,
    folder_id: ObjectId,
    layer_id: ObjectId,
    after_id: ObjectId,
) {
    let pos = objects
        .layer(folder_id)
        .and_then(|l| l.children())
        .and_then(|children| {
            if after_id.is_none() {
                Some(0)
            } else {
                children.iter().position(|&c| c == after_id).map(|i| i + 1)
            }
        })
        .unwrap_or(0);
    if let Some(children) = objects.layer_mut(folder_id).and_then(|l| l.children_mut()) {
        children.insert(pos, layer_id);
    }
    if let Some(layer) = objects.layer_mut(layer_id) {
        layer.parent = folder_id;
    }
}

/// Remove a layer and everything it owns (cels, child layers) from the
/// container. Stock image slots are left as they are.
fn remove_layer_tree(objects: &mut ObjectsContainer, layer_id: ObjectId) {
    let Some(Object::Layer(layer)) = objects.remove(layer_id) else {
        return;
    };
    if let Some(cels) = layer.cels() {
        for &cel_id in cels {
            objects.remove(cel_id);
        }
    }
    if let Some(children) = layer.children() {
        for &child_id in children {
            remove_layer_tree(objects, child_id);
        }
    }
}

pub(crate) fn add_layer_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    folder_id: ObjectId,
    layer_id: ObjectId,
) -> Result<()> {
    if objects.layer(folder_id).is_none() {
        return Err(UndoError::MissingObject { id: folder_id });
    }
    if objects.layer(layer_id).is_none() {
        return Err(UndoError::MissingObject { id: layer_id });
    }
    let mut w = ByteWriter::new();
    w.u32(folder_id.0);
    w.u32(layer_id.0);
    push(dst, ChunkKind::AddLayer, label, w.into_inner());
    Ok(())
}

fn add_layer_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let folder_id = ObjectId(r.u32()?);
    let layer_id = ObjectId(r.u32()?);

    if objects.layer(folder_id).is_none() || objects.layer(layer_id).is_none() {
        return Ok(());
    }
    remove_layer_new(dst, objects, label, layer_id)?;
    if let Some(children) = objects.layer_mut(folder_id).and_then(|l| l.children_mut()) {
        children.retain(|&c| c != layer_id);
    }
    remove_layer_tree(objects, layer_id);
    Ok(())
}

pub(crate) fn remove_layer_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    layer_id: ObjectId,
) -> Result<()> {
    let layer = objects
        .layer(layer_id)
        .ok_or(UndoError::MissingObject { id: layer_id })?;
    let folder_id = layer.parent;
    let after_id = prev_sibling(objects, layer_id);

    let mut w = ByteWriter::new();
    w.u32(folder_id.0);
    w.u32(after_id.0);
    raw::write_layer(objects, &mut w, layer_id)?;
    push(dst, ChunkKind::RemoveLayer, label, w.into_inner());
    Ok(())
}

fn remove_layer_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let folder_id = ObjectId(r.u32()?);
    let after_id = ObjectId(r.u32()?);

    if objects.layer(folder_id).is_none() {
        return Ok(());
    }
    let layer_id = raw::read_layer(objects, r)?;
    add_layer_new(dst, objects, label, folder_id, layer_id)?;
    insert_layer_after(objects, folder_id, layer_id, after_id);
    Ok(())
}

pub(crate) fn move_layer_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    layer_id: ObjectId,
) -> Result<()> {
    let layer = objects
        .layer(layer_id)
        .ok_or(UndoError::MissingObject { id: layer_id })?;
    let folder_id = layer.parent;
    let after_id = prev_sibling(objects, layer_id);

    let mut w = ByteWriter::new();
    w.u32(folder_id.0);
    w.u32(layer_id.0);
    w.u32(after_id.0);
    push(dst, ChunkKind::MoveLayer, label, w.into_inner());
    Ok(())
}

fn move_layer_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let folder_id = ObjectId(r.u32()?);
    let layer_id = ObjectId(r.u32()?);
    let after_id = ObjectId(r.u32()?);

    if objects.layer(folder_id).is_none() || objects.layer(layer_id).is_none() {
        return Ok(());
    }
    // Snapshot the current position first.
    move_layer_new(dst, objects, label, layer_id)?;

    let current_parent = objects.layer(layer_id).map(|l| l.parent);
    if let Some(parent_id) = current_parent {
        if let Some(children) = objects.layer_mut(parent_id).and_then(|l| l.children_mut()) {
            children.retain(|&c| c != layer_id);
        }
    }
    insert_layer_after(objects, folder_id, layer_id, after_id);
    Ok(())
}

// ── set_layer ────────────────────────────────────────────────────────

pub(crate) fn set_layer_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    sprite_id: ObjectId,
) -> Result<()> {
    let sprite = objects
        .sprite(sprite_id)
        .ok_or(UndoError::MissingObject { id: sprite_id })?;

    let mut w = ByteWriter::new();
    w.u32(sprite_id.0);
    w.u32(sprite.current_layer.0);
    push(dst, ChunkKind::SetLayer, label, w.into_inner());
    Ok(())
}

fn set_layer_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let sprite_id = ObjectId(r.u32()?);
    let layer_id = ObjectId(r.u32()?);

    if objects.sprite(sprite_id).is_none() {
        return Ok(());
    }
    set_layer_new(dst, objects, label, sprite_id)?;
    if let Some(sprite) = objects.sprite_mut(sprite_id) {
        sprite.current_layer = layer_id;
    }
    Ok(())
}

// ── add_palette / remove_palette ─────────────────────────────────────

pub(crate) fn add_palette_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    sprite_id: ObjectId,
    palette_id: ObjectId,
) -> Result<()> {
    if objects.sprite(sprite_id).is_none() {
        return Err(UndoError::MissingObject { id: sprite_id });
    }
    if objects.palette(palette_id).is_none() {
        return Err(UndoError::MissingObject { id: palette_id });
    }
    let mut w = ByteWriter::new();
    w.u32(sprite_id.0);
    w.u32(palette_id.0);
    push(dst, ChunkKind::AddPalette, label, w.into_inner());
    Ok(())
}

fn add_palette_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let sprite_id = ObjectId(r.u32()?);
    let palette_id = ObjectId(r.u32()?);

    if objects.sprite(sprite_id).is_none() || objects.palette(palette_id).is_none() {
        return Ok(());
    }
    remove_palette_new(dst, objects, label, sprite_id, palette_id)?;
    if let Some(sprite) = objects.sprite_mut(sprite_id) {
        sprite.remove_palette(palette_id);
    }
    objects.remove(palette_id);
    Ok(())
}

pub(crate) fn remove_palette_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    sprite_id: ObjectId,
    palette_id: ObjectId,
) -> Result<()> {
    let palette = objects
        .palette(palette_id)
        .ok_or(UndoError::MissingObject { id: palette_id })?;

    let mut w = ByteWriter::new();
    w.u32(sprite_id.0);
    raw::write_palette(&mut w, palette);
    push(dst, ChunkKind::RemovePalette, label, w.into_inner());
    Ok(())
}

fn remove_palette_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let sprite_id = ObjectId(r.u32()?);
    if objects.sprite(sprite_id).is_none() {
        return Ok(());
    }
    let palette = raw::read_palette(r)?;
    let frame = palette.frame();

    // Reuse the palette object already serving this exact frame, if any.
    let existing = objects
        .sprite(sprite_id)
        .and_then(|sprite| sprite.palette_at_exact_frame(frame))
        .filter(|&id| objects.palette(id).is_some());
    let palette_id = match existing {
        Some(id) => {
            if let Some(live) = objects.palette_mut(id) {
                *live = palette;
            }
            id
        }
        None => {
            let id = objects.add(Object::Palette(palette));
            if let Some(sprite) = objects.sprite_mut(sprite_id) {
                sprite.add_palette(frame, id);
            }
            id
        }
    };
    add_palette_new(dst, objects, label, sprite_id, palette_id)?;
    Ok(())
}

// ── set_palette_colors ───────────────────────────────────────────────
//
// Payload: u32 sprite id | u32 frame | u8 from | u8 to |
// (to - from + 1) x u32 rgba. The frame recorded is the sprite's
// *current* frame; inversion writes into whatever palette serves that
// frame at replay time.

pub(crate) fn set_palette_colors_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    sprite_id: ObjectId,
    palette_id: ObjectId,
    from: u8,
    to: u8,
) -> Result<()> {
    let sprite = objects
        .sprite(sprite_id)
        .ok_or(UndoError::MissingObject { id: sprite_id })?;
    let palette = objects
        .palette(palette_id)
        .ok_or(UndoError::MissingObject { id: palette_id })?;
    if from > to || to as u16 >= palette.size() {
        return Err(UndoError::InvalidColorRange {
            from,
            to,
            size: palette.size(),
        });
    }

    let mut w = ByteWriter::new();
    w.u32(sprite_id.0);
    w.u32(sprite.current_frame() as u32);
    w.u8(from);
    w.u8(to);
    for i in from..=to {
        w.u32(palette.entry(i as u16).unwrap_or(0));
    }
    push(dst, ChunkKind::SetPaletteColors, label, w.into_inner());
    Ok(())
}

fn set_palette_colors_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let sprite_id = ObjectId(r.u32()?);
    let frame = r.u32()? as u16;
    let from = r.u8()?;
    let to = r.u8()?;

    let Some(sprite) = objects.sprite(sprite_id) else {
        return Ok(());
    };
    let palette_id = sprite
        .palette_for_frame(frame)
        .filter(|&id| objects.palette(id).is_some())
        .ok_or(UndoError::PaletteNotFound { frame })?;

    set_palette_colors_new(dst, objects, label, sprite_id, palette_id, from, to)?;

    for i in from..=to {
        let color = r.u32()?;
        if let Some(palette) = objects.palette_mut(palette_id) {
            palette.set_entry(i as u16, color);
        }
    }
    Ok(())
}

// ── remap_palette ────────────────────────────────────────────────────
//
// Payload: u32 sprite id | u32 first frame | u32 last frame | 256-byte
// mapping. The mapping must be a permutation of 0..256; the inverter
// applies and records the inverse permutation.

fn check_permutation(mapping: &[u8; 256]) -> Result<()> {
    let mut seen = [false; 256];
    for &target in mapping {
        if seen[target as usize] {
            return Err(UndoError::NotAPermutation { duplicate: target });
        }
        seen[target as usize] = true;
    }
    Ok(())
}

/// Remap indexed cel images in the frame range and permute the palettes
/// that start inside it.
fn apply_remap(
    objects: &mut ObjectsContainer,
    sprite_id: ObjectId,
    frame_from: u16,
    frame_to: u16,
    mapping: &[u8; 256],
) {
    let Some(sprite) = objects.sprite(sprite_id) else {
        return;
    };
    let stock_id = sprite.stock;
    let root = sprite.root;
    let palette_ids: Vec<ObjectId> = sprite
        .palettes()
        .iter()
        .filter(|&&(frame, _)| frame >= frame_from && frame <= frame_to)
        .map(|&(_, id)| id)
        .collect();

    let mut image_ids = Vec::new();
    collect_cel_images(objects, root, stock_id, frame_from, frame_to, &mut image_ids);
    image_ids.sort_unstable();
    image_ids.dedup();

    for image_id in image_ids {
        if let Some(image) = objects.image_mut(image_id) {
            if image.format() == PixelFormat::Indexed {
                for byte in image.data_mut() {
                    *byte = mapping[*byte as usize];
                }
            }
        }
    }

    for palette_id in palette_ids {
        if let Some(palette) = objects.palette_mut(palette_id) {
            let old: Vec<u32> = palette.colors().to_vec();
            for (i, &color) in old.iter().enumerate().take(256) {
                let target = mapping[i] as u16;
                palette.set_entry(target, color);
            }
        }
    }
}

fn collect_cel_images(
    objects: &ObjectsContainer,
    layer_id: ObjectId,
    stock_id: ObjectId,
    frame_from: u16,
    frame_to: u16,
    out: &mut Vec<ObjectId>,
) {
    let Some(layer) = objects.layer(layer_id) else {
        return;
    };
    if let Some(cels) = layer.cels() {
        for &cel_id in cels {
            let Some(cel) = objects.cel(cel_id) else {
                continue;
            };
            if cel.frame < frame_from || cel.frame > frame_to {
                continue;
            }
            if let Some(image_id) = objects.stock(stock_id).and_then(|s| s.image(cel.image)) {
                out.push(image_id);
            }
        }
    }
    if let Some(children) = layer.children() {
        for &child_id in children {
            collect_cel_images(objects, child_id, stock_id, frame_from, frame_to, out);
        }
    }
}

pub(crate) fn remap_palette_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    sprite_id: ObjectId,
    frame_from: u16,
    frame_to: u16,
    mapping: &[u8; 256],
) -> Result<()> {
    if objects.sprite(sprite_id).is_none() {
        return Err(UndoError::MissingObject { id: sprite_id });
    }
    check_permutation(mapping)?;

    let mut w = ByteWriter::new();
    w.u32(sprite_id.0);
    w.u32(frame_from as u32);
    w.u32(frame_to as u32);
    w.bytes(mapping);
    push(dst, ChunkKind::RemapPalette, label, w.into_inner());
    Ok(())
}

fn remap_palette_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let sprite_id = ObjectId(r.u32()?);
    let frame_from = r.u32()? as u16;
    let frame_to = r.u32()? as u16;
    let mut mapping = [0u8; 256];
    mapping.copy_from_slice(r.bytes(256)?);

    if objects.sprite(sprite_id).is_none() {
        return Ok(());
    }
    check_permutation(&mapping)?;

    let mut inverse = [0u8; 256];
    for (i, &target) in mapping.iter().enumerate() {
        inverse[target as usize] = i as u8;
    }

    remap_palette_new(dst, objects, label, sprite_id, frame_from, frame_to, &inverse)?;
    apply_remap(objects, sprite_id, frame_from, frame_to, &inverse);
    Ok(())
}

// ── set_mask ─────────────────────────────────────────────────────────

pub(crate) fn set_mask_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    document_id: ObjectId,
) -> Result<()> {
    let document = objects
        .document(document_id)
        .ok_or(UndoError::MissingObject { id: document_id })?;

    let mut w = ByteWriter::new();
    w.u32(document_id.0);
    raw::write_mask(&mut w, &document.mask);
    push(dst, ChunkKind::SetMask, label, w.into_inner());
    Ok(())
}

fn set_mask_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let document_id = ObjectId(r.u32()?);
    if objects.document(document_id).is_none() {
        return Ok(());
    }
    let mask = raw::read_mask(r)?;
    set_mask_new(dst, objects, label, document_id)?;
    if let Some(document) = objects.document_mut(document_id) {
        document.mask = mask;
    }
    Ok(())
}

// ── sprite scalars ───────────────────────────────────────────────────

pub(crate) fn set_format_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    sprite_id: ObjectId,
) -> Result<()> {
    let sprite = objects
        .sprite(sprite_id)
        .ok_or(UndoError::MissingObject { id: sprite_id })?;

    let mut w = ByteWriter::new();
    w.u32(sprite_id.0);
    w.u32(sprite.format().as_u8() as u32);
    push(dst, ChunkKind::SetFormat, label, w.into_inner());
    Ok(())
}

fn set_format_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let sprite_id = ObjectId(r.u32()?);
    let tag = r.u32()?;

    if objects.sprite(sprite_id).is_none() {
        return Ok(());
    }
    let format = PixelFormat::from_u8(tag as u8).ok_or(UndoError::UnknownTag {
        what: "pixel format",
        value: tag as u16,
    })?;
    set_format_new(dst, objects, label, sprite_id)?;
    if let Some(sprite) = objects.sprite_mut(sprite_id) {
        sprite.set_format(format);
    }
    Ok(())
}

pub(crate) fn set_size_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    sprite_id: ObjectId,
) -> Result<()> {
    let sprite = objects
        .sprite(sprite_id)
        .ok_or(UndoError::MissingObject { id: sprite_id })?;

    let mut w = ByteWriter::new();
    w.u32(sprite_id.0);
    w.u32(sprite.width());
    w.u32(sprite.height());
    push(dst, ChunkKind::SetSize, label, w.into_inner());
    Ok(())
}

fn set_size_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let sprite_id = ObjectId(r.u32()?);
    let width = r.u32()?;
    let height = r.u32()?;

    if objects.sprite(sprite_id).is_none() {
        return Ok(());
    }
    set_size_new(dst, objects, label, sprite_id)?;
    if let Some(sprite) = objects.sprite_mut(sprite_id) {
        sprite.set_size(width, height);
    }
    Ok(())
}

pub(crate) fn set_frame_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    sprite_id: ObjectId,
) -> Result<()> {
    let sprite = objects
        .sprite(sprite_id)
        .ok_or(UndoError::MissingObject { id: sprite_id })?;

    let mut w = ByteWriter::new();
    w.u32(sprite_id.0);
    w.u32(sprite.current_frame() as u32);
    push(dst, ChunkKind::SetFrame, label, w.into_inner());
    Ok(())
}

fn set_frame_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let sprite_id = ObjectId(r.u32()?);
    let frame = r.u32()? as u16;

    if objects.sprite(sprite_id).is_none() {
        return Ok(());
    }
    set_frame_new(dst, objects, label, sprite_id)?;
    if let Some(sprite) = objects.sprite_mut(sprite_id) {
        sprite.set_current_frame(frame);
    }
    Ok(())
}

pub(crate) fn set_frames_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    sprite_id: ObjectId,
) -> Result<()> {
    let sprite = objects
        .sprite(sprite_id)
        .ok_or(UndoError::MissingObject { id: sprite_id })?;

    let mut w = ByteWriter::new();
    w.u32(sprite_id.0);
    w.u32(sprite.total_frames() as u32);
    push(dst, ChunkKind::SetFrames, label, w.into_inner());
    Ok(())
}

fn set_frames_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let sprite_id = ObjectId(r.u32()?);
    let frames = r.u32()? as u16;

    if objects.sprite(sprite_id).is_none() {
        return Ok(());
    }
    set_frames_new(dst, objects, label, sprite_id)?;
    if let Some(sprite) = objects.sprite_mut(sprite_id) {
        sprite.set_total_frames(frames);
    }
    Ok(())
}

pub(crate) fn set_frame_duration_new(
    dst: &mut UndoStream,
    objects: &ObjectsContainer,
    label: Option<&str>,
    sprite_id: ObjectId,
    frame: u16,
) -> Result<()> {
    let sprite = objects
        .sprite(sprite_id)
        .ok_or(UndoError::MissingObject { id: sprite_id })?;
    if frame >= sprite.total_frames() {
        return Err(UndoError::FrameOutOfRange {
            frame,
            total: sprite.total_frames(),
        });
    }

    let mut w = ByteWriter::new();
    w.u32(sprite_id.0);
    w.u32(frame as u32);
    w.u32(sprite.frame_duration(frame));
    push(dst, ChunkKind::SetFrameDuration, label, w.into_inner());
    Ok(())
}

fn set_frame_duration_invert(
    dst: &mut UndoStream,
    objects: &mut ObjectsContainer,
    label: Option<&str>,
    r: &mut ByteReader,
) -> Result<()> {
    let sprite_id = ObjectId(r.u32()?);
    let frame = r.u32()? as u16;
    let duration = r.u32()?;

    let Some(sprite) = objects.sprite(sprite_id) else {
        return Ok(());
    };
    if frame >= sprite.total_frames() {
        return Ok(());
    }
    set_frame_duration_new(dst, objects, label, sprite_id, frame)?;
    if let Some(sprite) = objects.sprite_mut(sprite_id) {
        sprite.set_frame_duration(frame, duration);
    }
    Ok(())
}
