//! Error types for flex archive and shape frame operations

/// Broad class of a [`FlexError`]
///
/// Format errors are tolerated on the read path (skip the record, keep
/// going). Index errors are always a caller bug. Encode errors mean the
/// data cannot be represented and nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or truncated input data
    Format,
    /// Index outside a table's bounds
    Index,
    /// Geometry or sizes exceed what the format can store
    Encode,
    /// Filesystem or serialization failure
    Io,
}

/// Errors that can occur during flex archive operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlexError {
    /// Buffer is shorter than the fixed container header
    #[error("Container header too short: expected {expected} bytes, got {actual}")]
    HeaderTooShort {
        /// The number of bytes expected.
        expected: usize,
        /// The number of bytes actually found.
        actual: usize,
    },

    /// A record slot points past the end of the buffer
    #[error("Record {index} at offset {offset} (size {size}) extends past buffer end {buffer_len}")]
    RecordOutOfBounds {
        /// Record index
        index: usize,
        /// Stored offset
        offset: u32,
        /// Stored size
        size: u32,
        /// Length of the backing buffer
        buffer_len: usize,
    },

    /// A record starts before the previous one ends
    #[error("Record {index} at offset {offset} overlaps previous record ending at {previous_end}")]
    RecordOverlap {
        /// Record index
        index: usize,
        /// Stored offset
        offset: u32,
        /// End of the previous present record
        previous_end: u64,
    },

    /// Shape record too short to hold its own head
    #[error("Shape record too short: expected at least {expected} bytes, got {actual}")]
    ShapeTooShort {
        /// The number of bytes expected.
        expected: usize,
        /// The number of bytes actually found.
        actual: usize,
    },

    /// Frame table does not fit inside its shape record
    #[error("Frame table overrun: {expected_frames} frames need {needed} bytes, only {available} available")]
    FrameTableOverrun {
        /// Frame count stored in the record
        expected_frames: u16,
        /// Bytes the frame table needs
        needed: usize,
        /// Bytes remaining after the shape head
        available: usize,
    },

    /// Read past the end of the data
    #[error("Unexpected end of data at offset {offset}")]
    UnexpectedEnd {
        /// Position of the failed read
        offset: usize,
    },

    /// Frame header names a compression mode other than 0 or 1
    #[error("Unsupported compression mode: {0}")]
    UnsupportedCompression(u16),

    /// Rebuilt container would not fit 32-bit offsets
    #[error("Container of {0} bytes exceeds the 32-bit offset range")]
    ArchiveTooLarge(usize),

    /// Index outside a table
    #[error("{table} index {index} out of range (len {len})")]
    IndexOutOfRange {
        /// Which table was indexed
        table: &'static str,
        /// The requested index
        index: usize,
        /// Number of entries in the table
        len: usize,
    },

    /// Frame is wider than single-byte row fields can address
    #[error("Frame width {0} exceeds maximum {1}")]
    WidthTooLarge(u16, u16),

    /// Pixel buffer does not match the frame geometry
    #[error("Pixel grid holds {actual} pixels, {width}x{height} needs {expected}")]
    GridSizeMismatch {
        /// Frame width
        width: u16,
        /// Frame height
        height: u16,
        /// Pixels required by the geometry
        expected: usize,
        /// Pixels present
        actual: usize,
    },

    /// A chunk does not fit in its run code
    #[error("Run of {len} pixels exceeds maximum {max}")]
    RunTooLong {
        /// Chunk length
        len: usize,
        /// Largest length the run code can hold
        max: usize,
    },

    /// A value does not fit its on-disk field
    #[error("{field} value {value} exceeds maximum {max}")]
    FieldOverflow {
        /// Field name
        field: &'static str,
        /// Value that was to be written
        value: u64,
        /// Largest storable value
        max: u64,
    },

    /// IO error during read/write
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FlexError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlexError::HeaderTooShort { .. }
            | FlexError::RecordOutOfBounds { .. }
            | FlexError::RecordOverlap { .. }
            | FlexError::ShapeTooShort { .. }
            | FlexError::FrameTableOverrun { .. }
            | FlexError::UnexpectedEnd { .. }
            | FlexError::UnsupportedCompression(_)
            | FlexError::ArchiveTooLarge(_) => ErrorKind::Format,
            FlexError::IndexOutOfRange { .. } => ErrorKind::Index,
            FlexError::WidthTooLarge(..)
            | FlexError::GridSizeMismatch { .. }
            | FlexError::RunTooLong { .. }
            | FlexError::FieldOverflow { .. } => ErrorKind::Encode,
            FlexError::Io(_) | FlexError::Serialization(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn index(table: &'static str, index: usize, len: usize) -> Self {
        FlexError::IndexOutOfRange { table, index, len }
    }

    pub(crate) fn overflow(field: &'static str, value: impl Into<u64>, max: impl Into<u64>) -> Self {
        FlexError::FieldOverflow {
            field,
            value: value.into(),
            max: max.into(),
        }
    }
}

impl From<std::io::Error> for FlexError {
    fn from(err: std::io::Error) -> Self {
        FlexError::Io(err.to_string())
    }
}
