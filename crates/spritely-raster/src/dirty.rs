//! Sparse rectangular pixel diff.
//!
//! A `Dirty` records which pixels of an image changed and carries one copy
//! of pixel data per changed span. Swapping the diff against the image both
//! restores the recorded pixels and captures the pixels they replaced, so
//! the same structure alternately represents either direction of an edit.
//!
//! # Structure
//!
//! A bounding box plus rows; each row holds column spans in ascending `x`
//! order. Spans separated by at most [`MERGE_GAP`] unchanged pixels are
//! merged when a diff is computed, trading a few carried-along pixels for
//! fewer spans.

use crate::format::PixelFormat;
use crate::image::Image;

/// Unchanged pixels allowed inside a merged span.
const MERGE_GAP: usize = 2;

/// A horizontal span of pixel bytes at column `x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyCol {
    /// Start column.
    pub x: u16,
    /// Pixel bytes of the span (`width * bytes_per_pixel`).
    pub data: Vec<u8>,
}

/// All spans of one image row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyRow {
    /// Image row.
    pub y: u16,
    /// Spans in ascending column order.
    pub cols: Vec<DirtyCol>,
}

/// Sparse diff of an image region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirty {
    format: PixelFormat,
    x1: u16,
    y1: u16,
    x2: u16,
    y2: u16,
    rows: Vec<DirtyRow>,
}

impl Dirty {
    /// Create an empty diff with the given inclusive bounds.
    pub fn new(format: PixelFormat, x1: u16, y1: u16, x2: u16, y2: u16) -> Self {
        Self {
            format,
            x1,
            y1,
            x2,
            y2,
            rows: Vec::new(),
        }
    }

    /// Pixel format the span data is stored in.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Inclusive bounding box `(x1, y1, x2, y2)`.
    pub fn bounds(&self) -> (u16, u16, u16, u16) {
        (self.x1, self.y1, self.x2, self.y2)
    }

    /// Rows with at least one span.
    pub fn rows(&self) -> &[DirtyRow] {
        &self.rows
    }

    /// Whether the diff carries no pixels.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Width of a span in pixels.
    pub fn col_width(&self, col: &DirtyCol) -> u16 {
        (col.data.len() / self.format.bytes_per_pixel()) as u16
    }

    /// Append a span. Rows and spans must be pushed in ascending order;
    /// the codecs and [`from_diff`](Self::from_diff) maintain this.
    pub fn push_span(&mut self, y: u16, x: u16, data: Vec<u8>) {
        match self.rows.last_mut() {
            Some(row) if row.y == y => row.cols.push(DirtyCol { x, data }),
            _ => self.rows.push(DirtyRow {
                y,
                cols: vec![DirtyCol { x, data }],
            }),
        }
    }

    /// Diff two equal-shaped images, capturing `old`'s pixels.
    ///
    /// Returns `None` when the images differ in shape or format, or when
    /// they are identical. The resulting diff, swapped against an image in
    /// `new`'s state, restores `old`.
    pub fn from_diff(old: &Image, new: &Image) -> Option<Self> {
        if old.format() != new.format()
            || old.width() != new.width()
            || old.height() != new.height()
        {
            return None;
        }

        let format = old.format();
        let bpp = format.bytes_per_pixel();
        let width = old.width() as usize;

        let mut rows: Vec<DirtyRow> = Vec::new();
        let (mut x1, mut y1, mut x2, mut y2) = (u16::MAX, u16::MAX, 0u16, 0u16);

        for y in 0..old.height() {
            let old_row = old.row(y)?;
            let new_row = new.row(y)?;
            if old_row == new_row {
                continue;
            }

            let mut cols: Vec<(usize, usize)> = Vec::new(); // (start px, end px)
            let mut x = 0;
            while x < width {
                if old_row[x * bpp..(x + 1) * bpp] == new_row[x * bpp..(x + 1) * bpp] {
                    x += 1;
                    continue;
                }
                let start = x;
                let mut end = x + 1;
                let mut gap = 0;
                let mut probe = end;
                while probe < width && gap <= MERGE_GAP {
                    if old_row[probe * bpp..(probe + 1) * bpp]
                        == new_row[probe * bpp..(probe + 1) * bpp]
                    {
                        gap += 1;
                    } else {
                        end = probe + 1;
                        gap = 0;
                    }
                    probe += 1;
                }
                cols.push((start, end));
                x = end;
            }

            let spans = cols
                .into_iter()
                .map(|(start, end)| DirtyCol {
                    x: start as u16,
                    data: old_row[start * bpp..end * bpp].to_vec(),
                })
                .collect::<Vec<_>>();

            if let (Some(first), Some(last)) = (spans.first(), spans.last()) {
                x1 = x1.min(first.x);
                let last_end = last.x + (last.data.len() / bpp) as u16 - 1;
                x2 = x2.max(last_end);
                if y1 == u16::MAX {
                    y1 = y;
                }
                y2 = y;
            }
            rows.push(DirtyRow { y, cols: spans });
        }

        if rows.is_empty() {
            return None;
        }
        Some(Self {
            format,
            x1,
            y1,
            x2,
            y2,
            rows,
        })
    }

    /// Exchange the diff's pixels with the image's.
    ///
    /// After the call the image holds the pixels the diff carried, and the
    /// diff carries the pixels the image held. Spans falling outside the
    /// image are left untouched.
    pub fn swap_image_pixels(&mut self, image: &mut Image) {
        if image.format() != self.format {
            return;
        }
        let bpp = self.format.bytes_per_pixel();
        for row in &mut self.rows {
            for col in &mut row.cols {
                let w = (col.data.len() / bpp) as u16;
                if let Some(span) = image.span_mut(col.x, row.y, w) {
                    span.swap_with_slice(&mut col.data);
                }
            }
        }
    }
}
