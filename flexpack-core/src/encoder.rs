//! Frame encoding

use crate::constants::{Compression, FRAME_HEADER_SIZE, ROW_OFFSET_SIZE, TRANSPARENT_INDEX};
use crate::error::FlexError;
use crate::types::{row_offset_value, Frame, FrameHeader, PixelGrid};
use bytes::{BufMut, Bytes, BytesMut};

/// Encode a frame into bytes
///
/// Layout:
/// 1. Header (18 bytes): shape id, frame id, reserved, compression, width,
///    height, hotspot x, hotspot y
/// 2. Row-offset table: one u16 per row, relative to the word's own position
/// 3. Row streams: leading skip byte, then runs separated by gap bytes
///
/// The identifier fields are written as found in the header; callers that
/// place the frame in a shape overwrite them with [`patch_identifiers`].
pub fn encode_frame(frame: &Frame) -> Result<Bytes, FlexError> {
    let header = &frame.header;
    header.validate()?;

    let (width, height) = (header.width as usize, header.height as usize);
    let grid_matches = if header.is_empty() {
        frame.pixels.pixels().is_empty()
    } else {
        frame.pixels.width() == width && frame.pixels.height() == height
    };
    if !grid_matches {
        return Err(FlexError::GridSizeMismatch {
            width: header.width,
            height: header.height,
            expected: width * height,
            actual: frame.pixels.pixels().len(),
        });
    }

    if header.is_empty() {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE);
        put_header(&mut buf, header);
        return Ok(buf.freeze());
    }

    let mut offsets = Vec::with_capacity(height);
    let mut rows = BytesMut::new();
    for y in 0..height {
        let value = row_offset_value(height - y, rows.len());
        let value = u16::try_from(value)
            .map_err(|_| FlexError::overflow("row offset", value as u64, u16::MAX))?;
        offsets.push(value);
        encode_row(frame.pixels.row(y), header.compression, &mut rows)?;
    }

    let mut buf =
        BytesMut::with_capacity(FRAME_HEADER_SIZE + height * ROW_OFFSET_SIZE + rows.len());
    put_header(&mut buf, header);
    for value in offsets {
        buf.put_u16_le(value);
    }
    buf.put_slice(&rows);

    Ok(buf.freeze())
}

/// Encode a frame, stamping it with its shape and frame index
pub fn encode_frame_with_ids(frame: &Frame, shape_id: u16, frame_id: u16) -> Result<Bytes, FlexError> {
    let mut buf = BytesMut::from(&encode_frame(frame)?[..]);
    patch_identifiers(&mut buf, shape_id, frame_id);
    Ok(buf.freeze())
}

/// Overwrite the two leading identifier words of an encoded frame
///
/// Buffers shorter than the identifier fields are left untouched.
pub fn patch_identifiers(frame_bytes: &mut [u8], shape_id: u16, frame_id: u16) {
    if frame_bytes.len() >= 4 {
        frame_bytes[0..2].copy_from_slice(&shape_id.to_le_bytes());
        frame_bytes[2..4].copy_from_slice(&frame_id.to_le_bytes());
    }
}

fn put_header(buf: &mut BytesMut, header: &FrameHeader) {
    buf.put_u16_le(header.shape_id);
    buf.put_u16_le(header.frame_id);
    buf.put_u32_le(header.reserved);
    buf.put_u16_le(header.compression.as_u16());
    buf.put_u16_le(header.width);
    buf.put_u16_le(header.height);
    buf.put_i16_le(header.hotspot_x);
    buf.put_i16_le(header.hotspot_y);
}

/// Encode one row; the caller guarantees `row.len() <= 255`
fn encode_row(row: &[u8], compression: Compression, out: &mut BytesMut) -> Result<(), FlexError> {
    let width = row.len();
    let mut x = transparent_run(row, 0);
    out.put_u8(x as u8);

    while x < width {
        let end = x + row[x..].iter().take_while(|&&p| p != TRANSPARENT_INDEX).count();

        // Each chunk is its own run, so the decoder expects a gap byte
        // between chunks of one opaque span.
        for (i, chunk) in row[x..end].chunks(compression.max_run()).enumerate() {
            if i > 0 {
                out.put_u8(0);
            }
            put_run(chunk, compression, out)?;
        }
        x = end;

        if x < width {
            let gap = transparent_run(row, x);
            out.put_u8(gap as u8);
            x += gap;
        }
    }

    Ok(())
}

fn transparent_run(row: &[u8], from: usize) -> usize {
    row[from..]
        .iter()
        .take_while(|&&p| p == TRANSPARENT_INDEX)
        .count()
}

fn put_run(chunk: &[u8], compression: Compression, out: &mut BytesMut) -> Result<(), FlexError> {
    let len = chunk.len();
    let max = compression.max_run();
    if len == 0 || len > max {
        return Err(FlexError::RunTooLong { len, max });
    }

    match compression {
        Compression::Literal => {
            out.put_u8(len as u8);
            out.put_slice(chunk);
        }
        Compression::Packed => {
            let color = chunk[0];
            if chunk.iter().all(|&p| p == color) {
                out.put_u8(((len << 1) | 1) as u8);
                out.put_u8(color);
            } else {
                out.put_u8((len << 1) as u8);
                out.put_slice(chunk);
            }
        }
    }
    Ok(())
}

/// Builder for constructing frames from a pixel grid
pub struct FrameBuilder {
    pixels: PixelGrid,
    hotspot: (i16, i16),
    ids: (u16, u16),
    reserved: u32,
    compression: Compression,
}

impl FrameBuilder {
    /// Create a new frame builder
    pub fn new(pixels: PixelGrid) -> Self {
        Self {
            pixels,
            hotspot: (0, 0),
            ids: (0, 0),
            reserved: 0,
            compression: Compression::Packed,
        }
    }

    /// Set the hotspot
    pub fn hotspot(mut self, x: i16, y: i16) -> Self {
        self.hotspot = (x, y);
        self
    }

    /// Set the shape and frame identifiers
    pub fn ids(mut self, shape_id: u16, frame_id: u16) -> Self {
        self.ids = (shape_id, frame_id);
        self
    }

    /// Set the reserved header word
    pub fn reserved(mut self, reserved: u32) -> Self {
        self.reserved = reserved;
        self
    }

    /// Use literal-only run codes
    pub fn literal(mut self) -> Self {
        self.compression = Compression::Literal;
        self
    }

    /// Build the frame struct without encoding
    pub fn build_struct(self) -> Result<Frame, FlexError> {
        let mut frame = Frame::from_grid(self.pixels, self.hotspot.0, self.hotspot.1)?;
        frame.header = frame.header.with_ids(self.ids.0, self.ids.1);
        frame.header.reserved = self.reserved;
        frame.header.compression = self.compression;
        frame.header.validate()?;
        Ok(frame)
    }

    /// Build and encode the frame
    pub fn build(self) -> Result<Bytes, FlexError> {
        encode_frame(&self.build_struct()?)
    }
}
