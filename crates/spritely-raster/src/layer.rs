//! Layers: the image/folder tree of a sprite.
//!
//! A layer is either an image layer carrying cels or a folder carrying
//! child layers. The two variants are a tagged sum matched on explicitly;
//! cross-references (owning sprite, parent folder, cels, children) are
//! [`ObjectId`] handles.

use bitflags::bitflags;

use crate::id::ObjectId;

bitflags! {
    /// Layer attribute flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LayerFlags: u8 {
        /// Layer is visible.
        const READABLE   = 1 << 0;
        /// Layer accepts edits.
        const WRITABLE   = 1 << 1;
        /// Layer cannot be moved.
        const LOCK_MOVE  = 1 << 2;
        /// Layer is the background.
        const BACKGROUND = 1 << 3;
    }
}

impl Default for LayerFlags {
    fn default() -> Self {
        LayerFlags::READABLE | LayerFlags::WRITABLE
    }
}

/// Variant payload of a [`Layer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerKind {
    /// Pixel layer: an ordered list of cel ids, sorted by frame.
    Image { cels: Vec<ObjectId> },
    /// Folder: an ordered list of child layer ids, bottom to top.
    Folder { children: Vec<ObjectId> },
}

impl LayerKind {
    /// Wire code for an image layer.
    pub const IMAGE_CODE: u16 = 1;
    /// Wire code for a folder layer.
    pub const FOLDER_CODE: u16 = 2;

    /// Wire code of this variant.
    pub fn code(&self) -> u16 {
        match self {
            Self::Image { .. } => Self::IMAGE_CODE,
            Self::Folder { .. } => Self::FOLDER_CODE,
        }
    }
}

/// One node of the layer tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    name: String,
    /// Attribute flags.
    pub flags: LayerFlags,
    /// Owning sprite.
    pub sprite: ObjectId,
    /// Parent folder, [`ObjectId::NONE`] for the root.
    pub parent: ObjectId,
    kind: LayerKind,
}

impl Layer {
    /// Create an image layer with no cels.
    pub fn new_image(sprite: ObjectId) -> Self {
        Self {
            name: String::from("Layer"),
            flags: LayerFlags::default(),
            sprite,
            parent: ObjectId::NONE,
            kind: LayerKind::Image { cels: Vec::new() },
        }
    }

    /// Create a folder layer with no children.
    pub fn new_folder(sprite: ObjectId) -> Self {
        Self {
            name: String::from("Folder"),
            flags: LayerFlags::default(),
            sprite,
            parent: ObjectId::NONE,
            kind: LayerKind::Folder {
                children: Vec::new(),
            },
        }
    }

    /// Layer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the layer name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Variant payload.
    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    /// Whether this is a folder layer.
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, LayerKind::Folder { .. })
    }

    /// Cel ids of an image layer, `None` for folders.
    pub fn cels(&self) -> Option<&[ObjectId]> {
        match &self.kind {
            LayerKind::Image { cels } => Some(cels),
            LayerKind::Folder { .. } => None,
        }
    }

    /// Mutable cel list of an image layer, `None` for folders.
    pub fn cels_mut(&mut self) -> Option<&mut Vec<ObjectId>> {
        match &mut self.kind {
            LayerKind::Image { cels } => Some(cels),
            LayerKind::Folder { .. } => None,
        }
    }

    /// Child layer ids of a folder, `None` for image layers.
    pub fn children(&self) -> Option<&[ObjectId]> {
        match &self.kind {
            LayerKind::Folder { children } => Some(children),
            LayerKind::Image { .. } => None,
        }
    }

    /// Mutable child list of a folder, `None` for image layers.
    pub fn children_mut(&mut self) -> Option<&mut Vec<ObjectId>> {
        match &mut self.kind {
            LayerKind::Folder { children } => Some(children),
            LayerKind::Image { .. } => None,
        }
    }
}
