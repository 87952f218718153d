//! Shared document fixture for integration tests.
//!
//! Each test target uses a subset of these helpers.
#![allow(dead_code)]

use spritely_raster::{
    Cel, Document, Image, Layer, LayerKind, ObjectId, Palette, PixelFormat, Sprite, Stock,
};
use spritely_undo::cursor::ByteWriter;
use spritely_undo::{Object, ObjectsContainer, UndoConfig, UndoHistory};

/// A minimal open document: sprite, root folder, stock, document object,
/// and a history with the default 8 MiB limit.
pub struct Fixture {
    pub objects: ObjectsContainer,
    pub history: UndoHistory,
    pub document: ObjectId,
    pub sprite: ObjectId,
    pub root: ObjectId,
    pub stock: ObjectId,
}

pub fn fixture(format: PixelFormat, width: u32, height: u32) -> Fixture {
    let mut objects = ObjectsContainer::new();

    let sprite = objects.add(Object::Sprite(Sprite::new(format, width, height)));
    let stock = objects.add(Object::Stock(Stock::new(format)));
    let mut root_layer = Layer::new_folder(sprite);
    root_layer.set_name("Root");
    let root = objects.add(Object::Layer(root_layer));
    {
        let s = objects.sprite_mut(sprite).unwrap();
        s.stock = stock;
        s.root = root;
    }
    let document = objects.add(Object::Document(Document::new(sprite)));

    Fixture {
        objects,
        history: UndoHistory::with_config(UndoConfig::default()),
        document,
        sprite,
        root,
        stock,
    }
}

impl Fixture {
    /// Add an image layer under the root folder.
    pub fn add_image_layer(&mut self, name: &str) -> ObjectId {
        self.add_image_layer_under(self.root, name)
    }

    /// Add an image layer under an arbitrary folder.
    pub fn add_image_layer_under(&mut self, folder: ObjectId, name: &str) -> ObjectId {
        let mut layer = Layer::new_image(self.sprite);
        layer.set_name(name);
        layer.parent = folder;
        let id = self.objects.add(Object::Layer(layer));
        if let Some(children) = self
            .objects
            .layer_mut(folder)
            .and_then(|l| l.children_mut())
        {
            children.push(id);
        }
        id
    }

    /// Add a folder layer under the root folder.
    pub fn add_folder_layer(&mut self, name: &str) -> ObjectId {
        let mut layer = Layer::new_folder(self.sprite);
        layer.set_name(name);
        layer.parent = self.root;
        let id = self.objects.add(Object::Layer(layer));
        if let Some(children) = self
            .objects
            .layer_mut(self.root)
            .and_then(|l| l.children_mut())
        {
            children.push(id);
        }
        id
    }

    /// Add an image to the stock, returning `(image id, slot index)`.
    pub fn add_stock_image(&mut self, width: u16, height: u16) -> (ObjectId, u16) {
        let format = self.objects.stock(self.stock).unwrap().format();
        let image = self.objects.add(Object::Image(Image::new(format, width, height)));
        let index = self
            .objects
            .stock_mut(self.stock)
            .unwrap()
            .add_image(image);
        (image, index)
    }

    /// Add a cel pointing at a stock slot to an image layer.
    pub fn add_cel(&mut self, layer: ObjectId, frame: u16, image_index: u16) -> ObjectId {
        let cel = self.objects.add(Object::Cel(Cel::new(frame, image_index)));
        if let Some(cels) = self.objects.layer_mut(layer).and_then(|l| l.cels_mut()) {
            cels.push(cel);
        }
        cel
    }

    /// Add a 256-color palette starting at `frame`.
    pub fn add_palette(&mut self, frame: u16) -> ObjectId {
        let mut palette = Palette::new(frame, 256);
        for i in 0..256u16 {
            palette.set_entry(i, 0xFF00_0000 | i as u32);
        }
        let id = self.objects.add(Object::Palette(palette));
        self.objects
            .sprite_mut(self.sprite)
            .unwrap()
            .add_palette(frame, id);
        id
    }

    /// Detach a layer subtree the way the editor deletes one: unhook it
    /// from its parent, then drop the layer, its cels and child layers
    /// from the container. Stock slots are left in place.
    pub fn delete_layer_tree(&mut self, layer: ObjectId) {
        let parent = self.objects.layer(layer).map(|l| l.parent);
        if let Some(parent) = parent {
            if let Some(children) = self
                .objects
                .layer_mut(parent)
                .and_then(|l| l.children_mut())
            {
                children.retain(|&c| c != layer);
            }
        }
        fn drop_tree(objects: &mut ObjectsContainer, layer: ObjectId) {
            let Some(Object::Layer(l)) = objects.remove(layer) else {
                return;
            };
            if let Some(cels) = l.cels() {
                for &c in cels {
                    objects.remove(c);
                }
            }
            if let Some(children) = l.children() {
                for &c in children {
                    drop_tree(objects, c);
                }
            }
        }
        drop_tree(&mut self.objects, layer);
    }

    /// Deterministic byte serialization of the whole document state.
    ///
    /// Palette object identities are excluded (re-materialized palettes
    /// may get fresh ids); everything else, ids included, participates.
    pub fn state_digest(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        let objects = &self.objects;

        let doc = objects.document(self.document).unwrap();
        w.u16(doc.mask.x());
        w.u16(doc.mask.y());
        w.u16(doc.mask.w());
        w.u16(doc.mask.h());
        w.bytes(doc.mask.bitmap());

        let sprite = objects.sprite(self.sprite).unwrap();
        w.u8(sprite.format().as_u8());
        w.u32(sprite.width());
        w.u32(sprite.height());
        w.u16(sprite.total_frames());
        for frame in 0..sprite.total_frames() {
            w.u32(sprite.frame_duration(frame));
        }
        w.u16(sprite.current_frame());
        w.u32(sprite.current_layer.0);

        w.u16(sprite.palettes().len() as u16);
        for &(frame, palette_id) in sprite.palettes() {
            w.u16(frame);
            let palette = objects.palette(palette_id).unwrap();
            w.u16(palette.size());
            for &color in palette.colors() {
                w.u32(color);
            }
        }

        fn digest_layer(objects: &ObjectsContainer, w: &mut ByteWriter, layer_id: ObjectId) {
            let layer = objects.layer(layer_id).unwrap();
            w.u32(layer_id.0);
            w.u16(layer.name().len() as u16);
            w.bytes(layer.name().as_bytes());
            w.u8(layer.flags.bits());
            w.u16(layer.kind().code());
            match layer.kind() {
                LayerKind::Image { cels } => {
                    w.u16(cels.len() as u16);
                    for &cel_id in cels {
                        let cel = objects.cel(cel_id).unwrap();
                        w.u32(cel_id.0);
                        w.u16(cel.frame);
                        w.u16(cel.image);
                        w.i16(cel.x);
                        w.i16(cel.y);
                        w.u16(cel.opacity);
                    }
                }
                LayerKind::Folder { children } => {
                    w.u16(children.len() as u16);
                    for &child in children {
                        digest_layer(objects, w, child);
                    }
                }
            }
        }
        digest_layer(objects, &mut w, sprite.root);

        let stock = objects.stock(self.stock).unwrap();
        w.u16(stock.len());
        for index in 0..stock.len() {
            match stock.image(index) {
                Some(image_id) => {
                    let image = objects.image(image_id).unwrap();
                    w.u8(1);
                    w.u32(image_id.0);
                    w.u8(image.format().as_u8());
                    w.u16(image.width());
                    w.u16(image.height());
                    w.u32(image.mask_color);
                    w.bytes(image.data());
                }
                None => w.u8(0),
            }
        }

        w.into_inner()
    }
}
