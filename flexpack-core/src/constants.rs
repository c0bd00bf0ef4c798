//! Constants and limits for the flex container and shape frame formats

use serde::{Deserialize, Serialize};

/// Size of the fixed container header; the record table starts here
pub const HEADER_SIZE: usize = 0x80;

/// Offset of the record count field in the container header
pub const RECORD_COUNT_OFFSET: usize = 0x54;

/// Offset of the constant flag word written into fresh headers
pub const HEADER_FLAG_OFFSET: usize = 0x58;

/// Offset of the total file size field in the container header
pub const FILE_SIZE_OFFSET: usize = 0x5C;

/// Offset of the record table
pub const RECORD_TABLE_OFFSET: usize = HEADER_SIZE;

/// Size of one record table entry (offset u32 + size u32)
pub const RECORD_ENTRY_SIZE: usize = 8;

/// Filler byte used for the first 0x50 bytes of a fresh header
pub const HEADER_FILL_BYTE: u8 = 0x1A;

/// Word written at 0x50 in a fresh header
pub const HEADER_FILL_TAIL: u32 = 0x0000_1A1A;

/// Flag word written at 0x58. Every known archive carries this value.
pub const HEADER_FLAG: u32 = 0x0000_0001;

/// Size of the shape record head (4 reserved bytes + u16 frame count)
pub const SHAPE_HEAD_SIZE: usize = 6;

/// Size of one frame table entry (u24 offset + reserved u8 + u16 size)
pub const FRAME_ENTRY_SIZE: usize = 6;

/// Largest relative frame offset a frame table entry can hold
pub const MAX_FRAME_OFFSET: u32 = 0x00FF_FFFF;

/// Size of the fixed frame header
pub const FRAME_HEADER_SIZE: usize = 18;

/// Size of one row-offset word
pub const ROW_OFFSET_SIZE: usize = 2;

/// Palette index reserved for transparent pixels
pub const TRANSPARENT_INDEX: u8 = 255;

/// Widest frame whose rows can be addressed with single-byte skip fields
pub const MAX_FRAME_WIDTH: u16 = 255;

/// Longest run a compression mode 1 run code can describe (7 bits)
pub const MAX_PACKED_RUN: usize = 127;

/// Longest run a compression mode 0 run code can describe (8 bits)
pub const MAX_LITERAL_RUN: usize = 255;

/// Row stream compression mode stored in the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compression {
    /// Every run code is a plain literal length
    Literal,
    /// Bit 0 of each run code selects repeat or literal, bits 1..8 the length
    Packed,
}

impl Compression {
    /// Raw value stored in the frame header
    pub const fn as_u16(&self) -> u16 {
        match self {
            Compression::Literal => 0,
            Compression::Packed => 1,
        }
    }

    /// Parse the raw header value
    pub const fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Compression::Literal),
            1 => Some(Compression::Packed),
            _ => None,
        }
    }

    /// Longest run a single run code can describe in this mode
    pub const fn max_run(&self) -> usize {
        match self {
            Compression::Literal => MAX_LITERAL_RUN,
            Compression::Packed => MAX_PACKED_RUN,
        }
    }
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Packed
    }
}

/// Width of the record count field at 0x54
///
/// Archives in the wild store the count either as a u16 followed by two
/// zero bytes or as a full u32. The table stride is 8 bytes either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CountField {
    /// Read the count as u16
    #[default]
    U16,
    /// Read the count as u32
    U32,
}

impl CountField {
    /// Largest record count the field can hold
    pub const fn max_count(&self) -> u64 {
        match self {
            CountField::U16 => u16::MAX as u64,
            CountField::U32 => u32::MAX as u64,
        }
    }
}
