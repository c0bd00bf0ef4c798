//! Metadata export of every shape and frame in an archive

use crate::archive::Archive;
use crate::decoder::decode_header;
use crate::error::FlexError;
use crate::shape::ShapeRecord;
use serde::Serialize;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Metadata of one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameEntry {
    /// Frame index within its shape
    pub index: usize,
    /// Absolute offset of the frame in the container
    pub offset: usize,
    /// Encoded size in bytes
    pub size: usize,
    /// Frame width
    pub width: u16,
    /// Frame height
    pub height: u16,
    /// Hotspot x
    pub hotspot_x: i16,
    /// Hotspot y
    pub hotspot_y: i16,
    /// Raw compression field
    pub compression: u16,
}

/// Metadata of one shape record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeEntry {
    /// Record index
    pub index: usize,
    /// Absolute offset of the record
    pub offset: u32,
    /// Record size in bytes
    pub size: u32,
    /// Frames whose headers could be read
    pub frames: Vec<FrameEntry>,
}

/// A record or frame that could not be catalogued
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    /// Record index
    pub index: usize,
    /// Frame index, when the failure was inside one frame
    pub frame: Option<usize>,
    /// Why it was skipped
    pub reason: String,
}

/// Metadata of every present shape in an archive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    /// Readable records in the archive, absent ones included
    pub record_count: usize,
    /// Parsed shapes in record order
    pub shapes: Vec<ShapeEntry>,
    /// Records and frames that failed to parse
    pub skipped: Vec<SkippedRecord>,
}

impl Catalog {
    /// Walk every record of `archive`
    ///
    /// Absent records are left out. A record or frame that fails to parse
    /// is listed under `skipped` and the walk continues.
    pub fn build(archive: &Archive) -> Self {
        let mut shapes = Vec::new();
        let mut skipped = Vec::new();

        for (index, slot) in archive.slots().iter().enumerate() {
            if !slot.is_present() {
                continue;
            }

            let parsed = archive
                .get_record(index)
                .and_then(|record| ShapeRecord::parse(record).map(|shape| (record, shape)));
            let (record, shape) = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    #[cfg(feature = "logging")]
                    warn!("Skipping record {}: {}", index, e);
                    skipped.push(SkippedRecord {
                        index,
                        frame: None,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let mut frames = Vec::with_capacity(shape.frame_count());
            for (frame_index, frame) in shape.frames.iter().enumerate() {
                match decode_header(record, frame.relative_offset as usize) {
                    Ok(header) => frames.push(FrameEntry {
                        index: frame_index,
                        offset: slot.offset as usize + frame.relative_offset as usize,
                        size: frame.size as usize,
                        width: header.width,
                        height: header.height,
                        hotspot_x: header.hotspot_x,
                        hotspot_y: header.hotspot_y,
                        compression: header.compression.as_u16(),
                    }),
                    Err(e) => {
                        #[cfg(feature = "logging")]
                        warn!("Skipping frame {} of record {}: {}", frame_index, index, e);
                        skipped.push(SkippedRecord {
                            index,
                            frame: Some(frame_index),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            shapes.push(ShapeEntry {
                index,
                offset: slot.offset,
                size: slot.size,
                frames,
            });
        }

        #[cfg(feature = "logging")]
        debug!(
            "Catalogued {} shapes, skipped {}",
            shapes.len(),
            skipped.len()
        );

        Self {
            record_count: archive.record_count(),
            shapes,
            skipped,
        }
    }

    /// Total number of catalogued frames
    pub fn frame_count(&self) -> usize {
        self.shapes.iter().map(|s| s.frames.len()).sum()
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, FlexError> {
        serde_json::to_string_pretty(self).map_err(|e| FlexError::Serialization(e.to_string()))
    }
}
