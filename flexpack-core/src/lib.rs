//! # Flexpack Core
//!
//! Reading and editing flex archives: a fixed header, a table of
//! `{offset, size}` record slots and back-to-back records. Shape records
//! carry a frame table and run-length encoded palette-indexed frames.
//!
//! ## Modules
//!
//! - `constants`: Container and frame format constants
//! - `types`: Frame header, pixel grid and row offsets
//! - `encoder`: Frame encoding
//! - `decoder`: Frame decoding
//! - `shape`: Shape record frame tables
//! - `archive`: Container parsing, record access and frame caches
//! - `mutator`: In-place writes and container rebuilds
//! - `palette`: Color lookup and RGBA quantization
//! - `catalog`: Metadata export of shapes and frames

#![warn(missing_docs)]

pub mod archive;
pub mod catalog;
pub mod constants;
mod cursor;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod mutator;
pub mod palette;
pub mod shape;
pub mod types;

// Re-export commonly used types
pub use archive::{Archive, ArchiveOptions, RecordSlot};
pub use error::{ErrorKind, FlexError};
pub use shape::{FrameSlot, ShapeRecord};
pub use types::{Frame, FrameHeader, PixelGrid, RowOffset};

/// Result type alias for flexpack operations
pub type Result<T> = core::result::Result<T, FlexError>;
