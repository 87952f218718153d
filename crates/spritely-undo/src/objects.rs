//! Object container: the arena behind every [`ObjectId`].
//!
//! The container owns all document objects and hands out `u32` ids that
//! stay valid for its lifetime. Ids are allocated monotonically and never
//! reused, so a stale id (an object deleted since a chunk recorded it)
//! simply fails to resolve, with no generation bits required.

use std::collections::HashMap;

use spritely_raster::{Cel, Document, Image, Layer, ObjectId, Palette, Sprite, Stock};

/// A document object owned by the container.
///
/// An enum rather than trait objects: every access site matches on the
/// kind it expects, and a wrong kind is observable instead of a downcast
/// failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Image(Image),
    Cel(Cel),
    Layer(Layer),
    Palette(Palette),
    Sprite(Sprite),
    Stock(Stock),
    Document(Document),
}

impl Object {
    /// Kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Cel(_) => "cel",
            Self::Layer(_) => "layer",
            Self::Palette(_) => "palette",
            Self::Sprite(_) => "sprite",
            Self::Stock(_) => "stock",
            Self::Document(_) => "document",
        }
    }
}

macro_rules! typed_accessors {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        /// Resolve an id to this kind, `None` when absent or another kind.
        pub fn $get(&self, id: ObjectId) -> Option<&$ty> {
            match self.objects.get(&id) {
                Some(Object::$variant(obj)) => Some(obj),
                _ => None,
            }
        }

        /// Mutable variant of the typed lookup.
        pub fn $get_mut(&mut self, id: ObjectId) -> Option<&mut $ty> {
            match self.objects.get_mut(&id) {
                Some(Object::$variant(obj)) => Some(obj),
                _ => None,
            }
        }
    };
}

/// Bidirectional map between live objects and stable numeric ids.
#[derive(Debug, Default)]
pub struct ObjectsContainer {
    objects: HashMap<ObjectId, Object>,
    next: u32,
}

impl ObjectsContainer {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            next: 1,
        }
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Register a new object, returning its freshly allocated id.
    pub fn add(&mut self, object: Object) -> ObjectId {
        let id = ObjectId(self.next);
        self.next += 1;
        self.objects.insert(id, object);
        id
    }

    /// Reattach an object under a known id.
    ///
    /// Used when a chunk re-materializes an object it previously removed;
    /// any object already under the id is replaced. Keeps future ids
    /// allocated past `id`.
    pub fn insert(&mut self, id: ObjectId, object: Object) {
        debug_assert!(id.is_some(), "cannot insert under the null id");
        self.next = self.next.max(id.0 + 1);
        self.objects.insert(id, object);
    }

    /// Detach and return the object under `id`.
    pub fn remove(&mut self, id: ObjectId) -> Option<Object> {
        self.objects.remove(&id)
    }

    /// Whether `id` currently resolves.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Untyped lookup.
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    typed_accessors!(image, image_mut, Image, Image);
    typed_accessors!(cel, cel_mut, Cel, Cel);
    typed_accessors!(layer, layer_mut, Layer, Layer);
    typed_accessors!(palette, palette_mut, Palette, Palette);
    typed_accessors!(sprite, sprite_mut, Sprite, Sprite);
    typed_accessors!(stock, stock_mut, Stock, Stock);
    typed_accessors!(document, document_mut, Document, Document);
}
