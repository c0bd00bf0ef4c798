//! Core types for shape frames

use crate::constants::{Compression, MAX_FRAME_WIDTH, TRANSPARENT_INDEX};
use crate::error::FlexError;
use serde::{Deserialize, Serialize};

/// Fixed 18-byte frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Index of the owning shape (cross-reference only)
    pub shape_id: u16,

    /// Index of this frame within the shape (cross-reference only)
    pub frame_id: u16,

    /// Reserved word, preserved as read
    pub reserved: u32,

    /// Row stream compression mode
    pub compression: Compression,

    /// Width in pixels
    pub width: u16,

    /// Height in pixels
    pub height: u16,

    /// Anchor x used to place the frame
    pub hotspot_x: i16,

    /// Anchor y used to place the frame
    pub hotspot_y: i16,
}

impl FrameHeader {
    /// Create a header with packed compression and zeroed identifiers
    pub fn new(width: u16, height: u16, hotspot_x: i16, hotspot_y: i16) -> Self {
        Self {
            shape_id: 0,
            frame_id: 0,
            reserved: 0,
            compression: Compression::Packed,
            width,
            height,
            hotspot_x,
            hotspot_y,
        }
    }

    /// Return a copy carrying the given identifiers
    pub fn with_ids(mut self, shape_id: u16, frame_id: u16) -> Self {
        self.shape_id = shape_id;
        self.frame_id = frame_id;
        self
    }

    /// True when the frame has no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check the geometry against encoder limits
    pub fn validate(&self) -> Result<(), FlexError> {
        if self.width > MAX_FRAME_WIDTH {
            return Err(FlexError::WidthTooLarge(self.width, MAX_FRAME_WIDTH));
        }
        Ok(())
    }
}

/// Row-major grid of palette indices
///
/// Index 255 is the transparent sentinel and is never written as an opaque
/// color.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PixelGrid {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl PixelGrid {
    /// Fully transparent grid
    pub fn transparent(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![TRANSPARENT_INDEX; width * height],
        }
    }

    /// Wrap an existing row-major pixel buffer
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self, FlexError> {
        let expected = width * height;
        if pixels.len() != expected {
            return Err(FlexError::GridSizeMismatch {
                width: width.min(u16::MAX as usize) as u16,
                height: height.min(u16::MAX as usize) as u16,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build from nested rows; every row must have the same length
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R]) -> Result<Self, FlexError> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.as_ref().len());
        if rows.iter().any(|r| r.as_ref().len() != width) {
            return Err(FlexError::GridSizeMismatch {
                width: width.min(u16::MAX as usize) as u16,
                height: height.min(u16::MAX as usize) as u16,
                expected: width * height,
                actual: rows.iter().map(|r| r.as_ref().len()).sum(),
            });
        }
        let mut pixels = Vec::with_capacity(width * height);
        for row in rows {
            pixels.extend_from_slice(row.as_ref());
        }
        Self::from_pixels(width, height, pixels)
    }

    /// Width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw row-major pixels
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at `(x, y)`, `None` outside the grid
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    /// Set a pixel; writes outside the grid are dropped
    pub fn set(&mut self, x: usize, y: usize, index: u8) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = index;
        }
    }

    /// One row of pixels
    pub fn row(&self, y: usize) -> &[u8] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    /// Iterate rows top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        // chunks_exact panics on zero
        let width = self.width.max(1);
        let take = if self.width == 0 { 0 } else { self.height };
        self.pixels.chunks_exact(width).take(take)
    }

    /// Whether `(x, y)` holds the transparent sentinel
    pub fn is_transparent(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == Some(TRANSPARENT_INDEX)
    }

    /// Number of non-transparent pixels
    pub fn opaque_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p != TRANSPARENT_INDEX).count()
    }
}

/// A decoded shape frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,

    /// Decoded pixels (`header.width × header.height`)
    pub pixels: PixelGrid,
}

impl Frame {
    /// Create a frame, checking that the grid matches the header geometry
    pub fn new(header: FrameHeader, pixels: PixelGrid) -> Result<Self, FlexError> {
        let (w, h) = (header.width as usize, header.height as usize);
        let matches = if header.is_empty() {
            pixels.pixels().is_empty()
        } else {
            pixels.width() == w && pixels.height() == h
        };
        if !matches {
            return Err(FlexError::GridSizeMismatch {
                width: header.width,
                height: header.height,
                expected: w * h,
                actual: pixels.pixels().len(),
            });
        }
        Ok(Self { header, pixels })
    }

    /// Create a packed frame from a pixel grid
    pub fn from_grid(pixels: PixelGrid, hotspot_x: i16, hotspot_y: i16) -> Result<Self, FlexError> {
        let width = u16::try_from(pixels.width())
            .map_err(|_| FlexError::overflow("width", pixels.width() as u64, u16::MAX))?;
        let height = u16::try_from(pixels.height())
            .map_err(|_| FlexError::overflow("height", pixels.height() as u64, u16::MAX))?;
        Self::new(FrameHeader::new(width, height, hotspot_x, hotspot_y), pixels)
    }

    /// Frame width
    pub fn width(&self) -> u16 {
        self.header.width
    }

    /// Frame height
    pub fn height(&self) -> u16 {
        self.header.height
    }
}

/// One entry of a frame's row-offset table
///
/// The stored value is relative to the position of the word itself, so
/// relocating a frame never changes its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOffset {
    /// Position of the 16-bit word
    pub word_start: usize,

    /// Stored value
    pub value: u16,
}

impl RowOffset {
    /// Absolute position of the row's first byte
    pub fn row_start(&self) -> usize {
        resolve_row_start(self.word_start, self.value)
    }
}

/// Resolve a self-relative row offset to an absolute position
pub const fn resolve_row_start(word_start: usize, value: u16) -> usize {
    word_start + value as usize
}

/// Stored value for a row with `words_remaining` table words from its own
/// word to the end of the table and `bytes_before` bytes of earlier rows
pub(crate) fn row_offset_value(words_remaining: usize, bytes_before: usize) -> usize {
    words_remaining * crate::constants::ROW_OFFSET_SIZE + bytes_before
}
