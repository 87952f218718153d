//! Raw object blobs: the serialized forms embedded in chunk payloads.
//!
//! Each writer/reader pair shares one layout; blob-embedded ids are the
//! objects' permanent container ids, so a reader can reattach a
//! re-materialized object under the id the rest of the history refers to.
//!
//! Layouts (little-endian):
//!
//! ```text
//! image:   u32 id | u8 format | u16 w | u16 h | u32 mask_color | rows
//! cel:     u32 id | u16 frame | u16 image | i16 x | i16 y | u16 opacity
//! palette: u16 frame | u16 ncolors | ncolors x u32 rgba
//! mask:    u16 x | u16 y | u16 w | u16 h | h x ((w+7)/8) bytes (if w,h > 0)
//! dirty:   u8 format | u16 x1 | u16 y1 | u16 x2 | u16 y2 | u16 rows |
//!          rows x { u16 y | u16 cols | cols x { u16 x | u16 w | bytes } }
//! layer:   u32 id | u16 nameLen | name | u8 flags | u16 kind | u32 sprite |
//!          image: u16 cels | cels x { cel | u8 hasImage | [image] }
//!          folder: u16 children | children x layer
//! ```

use spritely_raster::{
    Cel, Dirty, Image, Layer, LayerFlags, LayerKind, Mask, ObjectId, Palette, PixelFormat,
};

use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{Result, UndoError};
use crate::objects::{Object, ObjectsContainer};

// ── Image ────────────────────────────────────────────────────────────

pub(crate) fn write_image(w: &mut ByteWriter, id: ObjectId, image: &Image) {
    w.u32(id.0);
    w.u8(image.format().as_u8());
    w.u16(image.width());
    w.u16(image.height());
    w.u32(image.mask_color);
    w.bytes(image.data());
}

/// Decode an image blob and reattach it under its embedded id.
pub(crate) fn read_image(objects: &mut ObjectsContainer, r: &mut ByteReader) -> Result<ObjectId> {
    let id = ObjectId(r.u32()?);
    if id.is_none() {
        return Err(UndoError::InvalidBlob { what: "image" });
    }
    let tag = r.u8()?;
    let format = PixelFormat::from_u8(tag).ok_or(UndoError::UnknownTag {
        what: "pixel format",
        value: tag as u16,
    })?;
    let width = r.u16()?;
    let height = r.u16()?;
    let mask_color = r.u32()?;

    let mut image = Image::new(format, width, height);
    let total = format.line_size(width) * height as usize;
    image.data_mut().copy_from_slice(r.bytes(total)?);
    image.mask_color = mask_color;

    objects.insert(id, Object::Image(image));
    Ok(id)
}

// ── Cel ──────────────────────────────────────────────────────────────

pub(crate) fn write_cel(w: &mut ByteWriter, id: ObjectId, cel: &Cel) {
    w.u32(id.0);
    w.u16(cel.frame);
    w.u16(cel.image);
    w.i16(cel.x);
    w.i16(cel.y);
    w.u16(cel.opacity);
}

/// Decode a cel blob and reattach it under its embedded id.
pub(crate) fn read_cel(objects: &mut ObjectsContainer, r: &mut ByteReader) -> Result<ObjectId> {
    let id = ObjectId(r.u32()?);
    if id.is_none() {
        return Err(UndoError::InvalidBlob { what: "cel" });
    }
    let mut cel = Cel::new(r.u16()?, r.u16()?);
    cel.x = r.i16()?;
    cel.y = r.i16()?;
    cel.opacity = r.u16()?;

    objects.insert(id, Object::Cel(cel));
    Ok(id)
}

// ── Palette ──────────────────────────────────────────────────────────

pub(crate) fn write_palette(w: &mut ByteWriter, palette: &Palette) {
    w.u16(palette.frame());
    w.u16(palette.size());
    for &color in palette.colors() {
        w.u32(color);
    }
}

pub(crate) fn read_palette(r: &mut ByteReader) -> Result<Palette> {
    let frame = r.u16()?;
    let ncolors = r.u16()?;
    let mut palette = Palette::new(frame, ncolors);
    for i in 0..ncolors {
        let color = r.u32()?;
        palette.set_entry(i, color);
    }
    Ok(palette)
}

// ── Mask ─────────────────────────────────────────────────────────────

pub(crate) fn write_mask(w: &mut ByteWriter, mask: &Mask) {
    w.u16(mask.x());
    w.u16(mask.y());
    w.u16(mask.w());
    w.u16(mask.h());
    w.bytes(mask.bitmap());
}

pub(crate) fn read_mask(r: &mut ByteReader) -> Result<Mask> {
    let x = r.u16()?;
    let y = r.u16()?;
    let width = r.u16()?;
    let height = r.u16()?;

    let mut mask = Mask::new();
    if width > 0 && height > 0 {
        mask.replace(x, y, width, height);
        let row_size = Mask::row_size(width);
        for row in 0..height {
            let bytes = r.bytes(row_size)?;
            if let Some(dst) = mask.row_mut(row) {
                dst.copy_from_slice(bytes);
            }
        }
    }
    Ok(mask)
}

// ── Dirty ────────────────────────────────────────────────────────────

pub(crate) fn write_dirty(w: &mut ByteWriter, dirty: &Dirty) {
    let (x1, y1, x2, y2) = dirty.bounds();
    w.u8(dirty.format().as_u8());
    w.u16(x1);
    w.u16(y1);
    w.u16(x2);
    w.u16(y2);
    w.u16(dirty.rows().len() as u16);
    for row in dirty.rows() {
        w.u16(row.y);
        w.u16(row.cols.len() as u16);
        for col in &row.cols {
            w.u16(col.x);
            w.u16(dirty.col_width(col));
            w.bytes(&col.data);
        }
    }
}

pub(crate) fn read_dirty(r: &mut ByteReader) -> Result<Dirty> {
    let tag = r.u8()?;
    let format = PixelFormat::from_u8(tag).ok_or(UndoError::UnknownTag {
        what: "pixel format",
        value: tag as u16,
    })?;
    let x1 = r.u16()?;
    let y1 = r.u16()?;
    let x2 = r.u16()?;
    let y2 = r.u16()?;

    let mut dirty = Dirty::new(format, x1, y1, x2, y2);
    let rows = r.u16()?;
    for _ in 0..rows {
        let y = r.u16()?;
        let cols = r.u16()?;
        for _ in 0..cols {
            let x = r.u16()?;
            let width = r.u16()?;
            let data = r.bytes(format.line_size(width))?.to_vec();
            dirty.push_span(y, x, data);
        }
    }
    Ok(dirty)
}

// ── Layer ────────────────────────────────────────────────────────────

/// Serialize the layer subtree rooted at `layer_id`, cels and pixel images
/// included.
pub(crate) fn write_layer(
    objects: &ObjectsContainer,
    w: &mut ByteWriter,
    layer_id: ObjectId,
) -> Result<()> {
    let layer = objects
        .layer(layer_id)
        .ok_or(UndoError::MissingObject { id: layer_id })?;

    w.u32(layer_id.0);
    w.u16(layer.name().len() as u16);
    w.bytes(layer.name().as_bytes());
    w.u8(layer.flags.bits());
    w.u16(layer.kind().code());
    w.u32(layer.sprite.0);

    match layer.kind() {
        LayerKind::Image { cels } => {
            w.u16(cels.len() as u16);
            for &cel_id in cels {
                let cel = objects
                    .cel(cel_id)
                    .ok_or(UndoError::MissingObject { id: cel_id })?;
                write_cel(w, cel_id, cel);

                let image_id = objects
                    .sprite(layer.sprite)
                    .and_then(|sprite| objects.stock(sprite.stock))
                    .and_then(|stock| stock.image(cel.image));
                match image_id {
                    Some(image_id) => {
                        let image = objects
                            .image(image_id)
                            .ok_or(UndoError::MissingObject { id: image_id })?;
                        w.u8(1);
                        write_image(w, image_id, image);
                    }
                    None => w.u8(0),
                }
            }
        }
        LayerKind::Folder { children } => {
            w.u16(children.len() as u16);
            for &child_id in children {
                write_layer(objects, w, child_id)?;
            }
        }
    }
    Ok(())
}

/// Decode a layer subtree, reattaching every layer, cel and image under
/// its embedded id and restoring stock slots.
pub(crate) fn read_layer(objects: &mut ObjectsContainer, r: &mut ByteReader) -> Result<ObjectId> {
    let id = ObjectId(r.u32()?);
    if id.is_none() {
        return Err(UndoError::InvalidBlob { what: "layer" });
    }
    let name_len = r.u16()? as usize;
    let name = String::from_utf8_lossy(r.bytes(name_len)?).into_owned();
    let flags = LayerFlags::from_bits_truncate(r.u8()?);
    let kind_code = r.u16()?;
    let sprite_id = ObjectId(r.u32()?);

    let mut layer = match kind_code {
        LayerKind::IMAGE_CODE => Layer::new_image(sprite_id),
        LayerKind::FOLDER_CODE => Layer::new_folder(sprite_id),
        other => {
            return Err(UndoError::UnknownTag {
                what: "layer kind",
                value: other,
            })
        }
    };
    layer.set_name(name);
    layer.flags = flags;

    match kind_code {
        LayerKind::IMAGE_CODE => {
            let cel_count = r.u16()?;
            for _ in 0..cel_count {
                let cel_id = read_cel(objects, r)?;
                if let Some(cels) = layer.cels_mut() {
                    cels.push(cel_id);
                }
                let has_image = r.u8()?;
                if has_image != 0 {
                    let image_id = read_image(objects, r)?;
                    let slot = objects.cel(cel_id).map(|cel| cel.image);
                    let stock_id = objects.sprite(sprite_id).map(|sprite| sprite.stock);
                    if let (Some(slot), Some(stock_id)) = (slot, stock_id) {
                        if let Some(stock) = objects.stock_mut(stock_id) {
                            if let Some(old) = stock.replace_image(slot, image_id) {
                                if old != image_id {
                                    objects.remove(old);
                                }
                            }
                        }
                    }
                }
            }
        }
        _ => {
            let child_count = r.u16()?;
            for _ in 0..child_count {
                let child_id = read_layer(objects, r)?;
                if let Some(child) = objects.layer_mut(child_id) {
                    child.parent = id;
                }
                if let Some(children) = layer.children_mut() {
                    children.push(child_id);
                }
            }
        }
    }

    objects.insert(id, Object::Layer(layer));
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spritely_raster::{Sprite, Stock};

    fn reader_roundtrip(w: ByteWriter) -> Vec<u8> {
        w.into_inner()
    }

    #[test]
    fn image_blob_roundtrip() {
        let mut objects = ObjectsContainer::new();
        let mut image = Image::new(PixelFormat::Grayscale, 3, 2);
        image.mask_color = 0xFF;
        image.put_pixel(1, 1, 0x0A0B);
        let id = objects.add(Object::Image(image.clone()));

        let mut w = ByteWriter::new();
        write_image(&mut w, id, &image);
        let buf = reader_roundtrip(w);
        // id(4) + format(1) + w(2) + h(2) + mask(4) + 3*2*2 pixels
        assert_eq!(buf.len(), 13 + 12);

        objects.remove(id);
        let mut r = ByteReader::new(&buf);
        let back = read_image(&mut objects, &mut r).unwrap();
        assert_eq!(back, id);
        assert_eq!(objects.image(id).unwrap(), &image);
        assert!(r.is_empty());
    }

    #[test]
    fn image_blob_zero_id_rejected() {
        let mut objects = ObjectsContainer::new();
        let buf = [0u8; 16];
        let mut r = ByteReader::new(&buf);
        assert!(matches!(
            read_image(&mut objects, &mut r),
            Err(UndoError::InvalidBlob { what: "image" })
        ));
    }

    #[test]
    fn cel_blob_roundtrip() {
        let mut objects = ObjectsContainer::new();
        let mut cel = Cel::new(4, 2);
        cel.x = -7;
        cel.y = 12;
        cel.opacity = 128;
        let id = objects.add(Object::Cel(cel));

        let mut w = ByteWriter::new();
        write_cel(&mut w, id, &cel);
        let buf = reader_roundtrip(w);
        assert_eq!(buf.len(), 14);

        objects.remove(id);
        let mut r = ByteReader::new(&buf);
        assert_eq!(read_cel(&mut objects, &mut r).unwrap(), id);
        assert_eq!(objects.cel(id).unwrap(), &cel);
    }

    #[test]
    fn palette_blob_roundtrip() {
        let mut palette = Palette::new(3, 4);
        palette.set_entry(0, 0x1122_3344);
        palette.set_entry(3, 0xAABB_CCDD);

        let mut w = ByteWriter::new();
        write_palette(&mut w, &palette);
        let buf = reader_roundtrip(w);
        assert_eq!(buf.len(), 4 + 16);

        let mut r = ByteReader::new(&buf);
        assert_eq!(read_palette(&mut r).unwrap(), palette);
    }

    #[test]
    fn mask_blob_roundtrip() {
        let mut mask = Mask::new();
        mask.replace(5, 6, 10, 3);
        mask.set_pixel(0, 0, true);
        mask.set_pixel(9, 2, true);

        let mut w = ByteWriter::new();
        write_mask(&mut w, &mask);
        let buf = reader_roundtrip(w);
        assert_eq!(buf.len(), 8 + 2 * 3);

        let mut r = ByteReader::new(&buf);
        assert_eq!(read_mask(&mut r).unwrap(), mask);
    }

    #[test]
    fn empty_mask_blob_has_no_body() {
        let mask = Mask::new();
        let mut w = ByteWriter::new();
        write_mask(&mut w, &mask);
        let buf = reader_roundtrip(w);
        assert_eq!(buf.len(), 8);

        let mut r = ByteReader::new(&buf);
        let back = read_mask(&mut r).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn dirty_blob_roundtrip() {
        let old = Image::new(PixelFormat::Indexed, 8, 4);
        let mut new = old.clone();
        new.put_pixel(1, 0, 3);
        new.put_pixel(6, 2, 4);
        let dirty = Dirty::from_diff(&old, &new).unwrap();

        let mut w = ByteWriter::new();
        write_dirty(&mut w, &dirty);
        let buf = reader_roundtrip(w);

        let mut r = ByteReader::new(&buf);
        assert_eq!(read_dirty(&mut r).unwrap(), dirty);
        assert!(r.is_empty());
    }

    fn build_sprite_with_layer(
        objects: &mut ObjectsContainer,
    ) -> (ObjectId, ObjectId, ObjectId, ObjectId) {
        let sprite_id = objects.add(Object::Sprite(Sprite::new(PixelFormat::Indexed, 16, 16)));
        let stock_id = objects.add(Object::Stock(Stock::new(PixelFormat::Indexed)));
        objects.sprite_mut(sprite_id).unwrap().stock = stock_id;

        let mut image = Image::new(PixelFormat::Indexed, 4, 4);
        image.put_pixel(2, 2, 9);
        let image_id = objects.add(Object::Image(image));
        let index = objects.stock_mut(stock_id).unwrap().add_image(image_id);

        let mut cel = Cel::new(0, index);
        cel.x = 3;
        let cel_id = objects.add(Object::Cel(cel));

        let mut layer = Layer::new_image(sprite_id);
        layer.set_name("Hero");
        layer.flags = LayerFlags::READABLE | LayerFlags::WRITABLE | LayerFlags::BACKGROUND;
        if let Some(cels) = layer.cels_mut() {
            cels.push(cel_id);
        }
        let layer_id = objects.add(Object::Layer(layer));

        (sprite_id, stock_id, layer_id, cel_id)
    }

    #[test]
    fn layer_blob_roundtrip_restores_subtree() {
        let mut objects = ObjectsContainer::new();
        let (sprite_id, stock_id, layer_id, cel_id) = build_sprite_with_layer(&mut objects);

        let mut w = ByteWriter::new();
        write_layer(&objects, &mut w, layer_id).unwrap();
        let buf = reader_roundtrip(w);

        let original = objects.layer(layer_id).unwrap().clone();
        let original_cel = *objects.cel(cel_id).unwrap();
        let image_id = objects.stock(stock_id).unwrap().image(0).unwrap();
        let original_image = objects.image(image_id).unwrap().clone();

        // Tear the subtree down, then re-read it.
        objects.remove(layer_id);
        objects.remove(cel_id);
        objects.stock_mut(stock_id).unwrap().remove_image(0);
        objects.remove(image_id);

        let mut r = ByteReader::new(&buf);
        let back = read_layer(&mut objects, &mut r).unwrap();
        assert_eq!(back, layer_id);
        assert!(r.is_empty());

        let restored = objects.layer(layer_id).unwrap();
        assert_eq!(restored.name(), original.name());
        assert_eq!(restored.flags, original.flags);
        assert_eq!(restored.sprite, sprite_id);
        assert_eq!(restored.cels().unwrap(), &[cel_id]);
        assert_eq!(objects.cel(cel_id).unwrap(), &original_cel);
        assert_eq!(
            objects.stock(stock_id).unwrap().image(0),
            Some(image_id)
        );
        assert_eq!(objects.image(image_id).unwrap(), &original_image);
    }

    #[test]
    fn folder_blob_roundtrip_sets_parents() {
        let mut objects = ObjectsContainer::new();
        let (sprite_id, _stock_id, layer_id, _cel_id) = build_sprite_with_layer(&mut objects);

        let mut folder = Layer::new_folder(sprite_id);
        folder.set_name("Group");
        if let Some(children) = folder.children_mut() {
            children.push(layer_id);
        }
        let folder_id = objects.add(Object::Layer(folder));
        objects.layer_mut(layer_id).unwrap().parent = folder_id;

        let mut w = ByteWriter::new();
        write_layer(&objects, &mut w, folder_id).unwrap();
        let buf = reader_roundtrip(w);

        objects.remove(folder_id);
        objects.remove(layer_id);

        let mut r = ByteReader::new(&buf);
        assert_eq!(read_layer(&mut objects, &mut r).unwrap(), folder_id);
        let folder = objects.layer(folder_id).unwrap();
        assert_eq!(folder.children().unwrap(), &[layer_id]);
        assert_eq!(objects.layer(layer_id).unwrap().parent, folder_id);
    }

    #[test]
    fn unknown_layer_kind_rejected() {
        let mut objects = ObjectsContainer::new();
        let mut w = ByteWriter::new();
        w.u32(9); // id
        w.u16(0); // empty name
        w.u8(0); // flags
        w.u16(99); // bogus kind
        w.u32(0); // sprite
        let buf = w.into_inner();
        let mut r = ByteReader::new(&buf);
        assert!(matches!(
            read_layer(&mut objects, &mut r),
            Err(UndoError::UnknownTag {
                what: "layer kind",
                ..
            })
        ));
    }
}
