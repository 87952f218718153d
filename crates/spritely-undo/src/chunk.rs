//! Chunks: the atomic, invertible records of the history streams.

/// Action kind of a chunk. The `u16` value is the wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ChunkKind {
    // group markers
    Open = 0,
    Close = 1,

    // generic field snapshot
    Data = 2,

    // image pixels
    Image = 3,
    Flip = 4,
    Dirty = 5,

    // stock slots
    AddImage = 6,
    RemoveImage = 7,
    ReplaceImage = 8,

    // cels
    AddCel = 9,
    RemoveCel = 10,

    // layers
    SetLayerName = 11,
    AddLayer = 12,
    RemoveLayer = 13,
    MoveLayer = 14,
    SetLayer = 15,

    // palettes
    AddPalette = 16,
    RemovePalette = 17,
    SetPaletteColors = 18,
    RemapPalette = 19,

    // document / sprite scalars
    SetMask = 20,
    SetFormat = 21,
    SetSize = 22,
    SetFrame = 23,
    SetFrames = 24,
    SetFrameDuration = 25,
}

impl ChunkKind {
    /// Parse a wire tag, or `None` for unknown values.
    pub fn from_u16(value: u16) -> Option<Self> {
        use ChunkKind::*;
        Some(match value {
            0 => Open,
            1 => Close,
            2 => Data,
            3 => Image,
            4 => Flip,
            5 => Dirty,
            6 => AddImage,
            7 => RemoveImage,
            8 => ReplaceImage,
            9 => AddCel,
            10 => RemoveCel,
            11 => SetLayerName,
            12 => AddLayer,
            13 => RemoveLayer,
            14 => MoveLayer,
            15 => SetLayer,
            16 => AddPalette,
            17 => RemovePalette,
            18 => SetPaletteColors,
            19 => RemapPalette,
            20 => SetMask,
            21 => SetFormat,
            22 => SetSize,
            23 => SetFrame,
            24 => SetFrames,
            25 => SetFrameDuration,
            _ => return None,
        })
    }

    /// The wire tag for this kind.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Canonical display name, used as the label of chunks recorded while
    /// no user label is set.
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Close => "Close",
            Self::Data => "Data",
            Self::Image => "Image",
            Self::Flip => "Flip",
            Self::Dirty => "Dirty",
            Self::AddImage => "Add Image",
            Self::RemoveImage => "Remove Image",
            Self::ReplaceImage => "Replace Image",
            Self::AddCel => "Add Cel",
            Self::RemoveCel => "Remove Cel",
            Self::SetLayerName => "Set Layer Name",
            Self::AddLayer => "Add Layer",
            Self::RemoveLayer => "Remove Layer",
            Self::MoveLayer => "Move Layer",
            Self::SetLayer => "Set Layer",
            Self::AddPalette => "Add Palette",
            Self::RemovePalette => "Remove Palette",
            Self::SetPaletteColors => "Set Palette Colors",
            Self::RemapPalette => "Remap Palette",
            Self::SetMask => "Set Mask",
            Self::SetFormat => "Set Format",
            Self::SetSize => "Set Size",
            Self::SetFrame => "Set Frame",
            Self::SetFrames => "Set Frames",
            Self::SetFrameDuration => "Set Frame Duration",
        }
    }

    /// The kind the inverter of this kind emits.
    pub fn inverse(self) -> Self {
        match self {
            Self::Open => Self::Close,
            Self::Close => Self::Open,
            Self::AddImage => Self::RemoveImage,
            Self::RemoveImage => Self::AddImage,
            Self::AddCel => Self::RemoveCel,
            Self::RemoveCel => Self::AddCel,
            Self::AddLayer => Self::RemoveLayer,
            Self::RemoveLayer => Self::AddLayer,
            Self::AddPalette => Self::RemovePalette,
            Self::RemovePalette => Self::AddPalette,
            // The remaining kinds are symmetric.
            other => other,
        }
    }
}

/// One atomic record: a kind tag, the group label, and the encoded payload.
///
/// The label is copied into the chunk so it can outlive whatever buffer
/// the caller set it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub label: String,
    pub payload: Vec<u8>,
}

impl Chunk {
    /// Fixed header size: kind tag (2) + total size (4).
    pub const HEADER_LEN: usize = 6;

    /// Create a chunk, falling back to the kind's canonical name when no
    /// label is given.
    pub fn new(kind: ChunkKind, label: Option<&str>, payload: Vec<u8>) -> Self {
        Self {
            kind,
            label: label.unwrap_or(kind.name()).to_string(),
            payload,
        }
    }

    /// Total accounted size: header plus label plus payload.
    pub fn size(&self) -> usize {
        Self::HEADER_LEN + self.label.len() + self.payload.len()
    }
}
