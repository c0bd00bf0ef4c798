//! Shape records: the frame table stored at the start of a shape record
//!
//! A shape record is a 6-byte head (4 reserved bytes, u16 frame count)
//! followed by one 6-byte entry per frame and then the packed frame
//! payloads. Entry offsets are relative to the start of the record.

use crate::constants::{FRAME_ENTRY_SIZE, MAX_FRAME_OFFSET, SHAPE_HEAD_SIZE};
use crate::cursor::Cursor;
use crate::error::FlexError;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// One entry of a shape's frame table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSlot {
    /// Offset of the frame from the start of the shape record (24 bits)
    pub relative_offset: u32,

    /// Reserved byte, preserved across rebuilds
    pub reserved: u8,

    /// Size of the frame in bytes
    pub size: u16,
}

/// Parsed head and frame table of a shape record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRecord {
    /// Reserved head bytes, preserved across rebuilds
    pub reserved: [u8; 4],

    /// Frame table in stored order
    pub frames: Vec<FrameSlot>,
}

impl ShapeRecord {
    /// Parse the head and frame table of a shape record
    ///
    /// Fails if the record cannot hold its head or if the declared frame
    /// count needs more table bytes than the record has.
    pub fn parse(record: &[u8]) -> Result<Self, FlexError> {
        if record.len() < SHAPE_HEAD_SIZE {
            return Err(FlexError::ShapeTooShort {
                expected: SHAPE_HEAD_SIZE,
                actual: record.len(),
            });
        }

        let mut cur = Cursor::at(record, 0);
        let head = cur.take(4)?;
        let reserved = [head[0], head[1], head[2], head[3]];
        let frame_count = cur.read_u16()?;

        let needed = frame_count as usize * FRAME_ENTRY_SIZE;
        let available = record.len() - SHAPE_HEAD_SIZE;
        if needed > available {
            return Err(FlexError::FrameTableOverrun {
                expected_frames: frame_count,
                needed,
                available,
            });
        }

        let mut frames = Vec::with_capacity(frame_count as usize);
        for _ in 0..frame_count {
            frames.push(FrameSlot {
                relative_offset: cur.read_u24()?,
                reserved: cur.read_u8()?,
                size: cur.read_u16()?,
            });
        }

        Ok(Self { reserved, frames })
    }

    /// Number of frames
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Frame table entry at `frame_index`
    pub fn frame(&self, frame_index: usize) -> Result<&FrameSlot, FlexError> {
        self.frames
            .get(frame_index)
            .ok_or_else(|| FlexError::index("frame", frame_index, self.frames.len()))
    }

    /// Absolute offset and size of a frame, given where the record starts
    pub fn frame_byte_range(
        &self,
        record_offset: usize,
        frame_index: usize,
    ) -> Result<(usize, usize), FlexError> {
        let slot = self.frame(frame_index)?;
        Ok((
            record_offset + slot.relative_offset as usize,
            slot.size as usize,
        ))
    }

    /// Payload bytes of one frame, sliced out of the record
    pub fn frame_payload<'a>(&self, record: &'a [u8], frame_index: usize) -> Result<&'a [u8], FlexError> {
        let (start, size) = self.frame_byte_range(0, frame_index)?;
        record
            .get(start..start + size)
            .ok_or(FlexError::UnexpectedEnd { offset: start })
    }

    /// Offset of the first payload byte for a table of `frame_count` entries
    pub fn payload_start(frame_count: usize) -> usize {
        SHAPE_HEAD_SIZE + frame_count * FRAME_ENTRY_SIZE
    }

    /// Build a complete record from frame payloads in table order
    ///
    /// Every relative offset is recomputed as a running sum starting right
    /// after the frame table, because payloads are packed back to back and
    /// any size change shifts everything after it. Reserved bytes are kept
    /// for existing entries; appended entries get zero.
    pub fn rebuild<P: AsRef<[u8]>>(&self, payloads: &[P]) -> Result<Bytes, FlexError> {
        let frame_count = u16::try_from(payloads.len())
            .map_err(|_| FlexError::overflow("frame count", payloads.len() as u64, u16::MAX))?;

        // Validate every entry before producing output
        let mut entries = Vec::with_capacity(payloads.len());
        let mut cursor = Self::payload_start(payloads.len());
        for (i, payload) in payloads.iter().enumerate() {
            let len = payload.as_ref().len();
            let size = u16::try_from(len)
                .map_err(|_| FlexError::overflow("frame size", len as u64, u16::MAX))?;
            if cursor as u64 > MAX_FRAME_OFFSET as u64 {
                return Err(FlexError::overflow(
                    "frame offset",
                    cursor as u64,
                    MAX_FRAME_OFFSET,
                ));
            }
            entries.push(FrameSlot {
                relative_offset: cursor as u32,
                reserved: self.frames.get(i).map_or(0, |f| f.reserved),
                size,
            });
            cursor += len;
        }

        let mut buf = BytesMut::with_capacity(cursor);
        buf.put_slice(&self.reserved);
        buf.put_u16_le(frame_count);
        for entry in &entries {
            let offset = entry.relative_offset.to_le_bytes();
            buf.put_slice(&offset[..3]);
            buf.put_u8(entry.reserved);
            buf.put_u16_le(entry.size);
        }
        for payload in payloads {
            buf.put_slice(payload.as_ref());
        }

        Ok(buf.freeze())
    }
}

impl Default for ShapeRecord {
    fn default() -> Self {
        Self {
            reserved: [0; 4],
            frames: Vec::new(),
        }
    }
}
