//! Engine error model.
//!
//! One error type covers the three failure categories: encoder
//! precondition violations, live-object mismatches during inversion, and
//! payload truncation while decoding. Tolerable losses (an object deleted
//! between recording and inversion) are not errors; those chunks become
//! no-ops.

use std::fmt;

use spritely_raster::{ObjectId, PixelFormat};

/// Standard result type for engine APIs.
pub type Result<T> = std::result::Result<T, UndoError>;

/// Failure while recording or replaying a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoError {
    /// A required object is not in the container.
    MissingObject { id: ObjectId },
    /// The object exists but is not of the expected kind.
    UnexpectedKind {
        id: ObjectId,
        expected: &'static str,
    },
    /// A recorded image region no longer matches the image's pixel format.
    FormatMismatch {
        id: ObjectId,
        expected: PixelFormat,
        actual: PixelFormat,
    },
    /// A recorded rectangle is empty or falls outside the image.
    RectOutOfBounds { x: u16, y: u16, w: u16, h: u16 },
    /// A field window does not fit the object's state block.
    InvalidFieldWindow {
        offset: u32,
        len: u32,
        block: usize,
    },
    /// A palette color range exceeds the palette size.
    InvalidColorRange { from: u8, to: u8, size: u16 },
    /// No palette serves the recorded frame.
    PaletteNotFound { frame: u16 },
    /// A frame index exceeds the sprite's frame count.
    FrameOutOfRange { frame: u16, total: u16 },
    /// A remap table is not a permutation of 0..256.
    NotAPermutation { duplicate: u8 },
    /// A stock slot expected to hold an image is empty.
    EmptyStockSlot { index: u16 },
    /// A chunk payload ended before the expected data.
    Truncated { needed: usize, available: usize },
    /// A serialized tag byte or code is unknown.
    UnknownTag { what: &'static str, value: u16 },
    /// A serialized blob is internally inconsistent.
    InvalidBlob { what: &'static str },
}

impl fmt::Display for UndoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingObject { id } => write!(f, "no object with id {}", id.0),
            Self::UnexpectedKind { id, expected } => {
                write!(f, "object {} is not a {expected}", id.0)
            }
            Self::FormatMismatch {
                id,
                expected,
                actual,
            } => write!(
                f,
                "image {} has format {actual:?}, chunk recorded {expected:?}",
                id.0
            ),
            Self::RectOutOfBounds { x, y, w, h } => {
                write!(f, "rectangle ({x}, {y}) {w}x{h} out of bounds")
            }
            Self::InvalidFieldWindow { offset, len, block } => write!(
                f,
                "field window {offset}+{len} exceeds {block}-byte state block"
            ),
            Self::InvalidColorRange { from, to, size } => {
                write!(f, "color range {from}..={to} exceeds palette size {size}")
            }
            Self::PaletteNotFound { frame } => {
                write!(f, "no palette for frame {frame}")
            }
            Self::FrameOutOfRange { frame, total } => {
                write!(f, "frame {frame} out of range ({total} frames)")
            }
            Self::NotAPermutation { duplicate } => {
                write!(f, "remap table maps two indices to {duplicate}")
            }
            Self::EmptyStockSlot { index } => {
                write!(f, "stock slot {index} holds no image")
            }
            Self::Truncated { needed, available } => {
                write!(f, "payload truncated: need {needed} bytes, have {available}")
            }
            Self::UnknownTag { what, value } => {
                write!(f, "unknown {what}: {value}")
            }
            Self::InvalidBlob { what } => write!(f, "malformed {what} blob"),
        }
    }
}

impl std::error::Error for UndoError {}
