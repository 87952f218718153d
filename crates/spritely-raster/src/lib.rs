#![forbid(unsafe_code)]

//! Raster document model: the object graph a sprite editor mutates.
//!
//! # Role in Spritely
//! `spritely-raster` owns the data types of a sprite document: pixel
//! images, cels, layers, palettes, masks, image stocks, sprites, and the
//! document itself. It knows nothing about editing history; the undo engine
//! (`spritely-undo`) drives these types through [`ObjectId`] handles.
//!
//! # Primary responsibilities
//! - **Image**: flat row-major pixel buffer with bounds-checked access.
//! - **Layer**: image/folder tagged sum forming the layer tree.
//! - **Dirty**: sparse rectangular pixel diff that is its own inverse after
//!   a swap with the image it was recorded against.
//! - **Sprite/Document**: frame bookkeeping, palettes by frame, selection
//!   mask.
//!
//! # How it fits in the system
//! Objects never reference each other by pointer. Every cross-reference is
//! an [`ObjectId`] resolved through the undo crate's object container, so a
//! recorded edit can outlive the objects it mentions.

pub mod cel;
pub mod dirty;
pub mod document;
pub mod format;
pub mod id;
pub mod image;
pub mod layer;
pub mod mask;
pub mod palette;
pub mod sprite;
pub mod stock;

pub use cel::Cel;
pub use dirty::{Dirty, DirtyCol, DirtyRow};
pub use document::Document;
pub use format::PixelFormat;
pub use id::ObjectId;
pub use image::Image;
pub use layer::{Layer, LayerFlags, LayerKind};
pub use mask::Mask;
pub use palette::Palette;
pub use sprite::Sprite;
pub use stock::Stock;
