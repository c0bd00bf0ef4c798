//! Frame decoding
//!
//! Decoding is total over any readable header: pixel writes that land
//! outside the frame are dropped, and running off the end of the buffer is
//! reported as an error instead of a panic.

use crate::constants::Compression;
use crate::cursor::Cursor;
use crate::error::FlexError;
use crate::types::{Frame, FrameHeader, PixelGrid, RowOffset};

#[cfg(feature = "logging")]
use tracing::trace;

/// Read the 18-byte frame header at `frame_offset`
pub fn decode_header(data: &[u8], frame_offset: usize) -> Result<FrameHeader, FlexError> {
    let mut cur = Cursor::at(data, frame_offset);
    read_header(&mut cur)
}

fn read_header(cur: &mut Cursor<'_>) -> Result<FrameHeader, FlexError> {
    let shape_id = cur.read_u16()?;
    let frame_id = cur.read_u16()?;
    let reserved = cur.read_u32()?;
    let raw_compression = cur.read_u16()?;
    let compression = Compression::from_u16(raw_compression)
        .ok_or(FlexError::UnsupportedCompression(raw_compression))?;

    Ok(FrameHeader {
        shape_id,
        frame_id,
        reserved,
        compression,
        width: cur.read_u16()?,
        height: cur.read_u16()?,
        hotspot_x: cur.read_i16()?,
        hotspot_y: cur.read_i16()?,
    })
}

/// Read the row-offset table of the frame at `frame_offset`
///
/// Empty frames have no table.
pub fn decode_row_offsets(data: &[u8], frame_offset: usize) -> Result<Vec<RowOffset>, FlexError> {
    let mut cur = Cursor::at(data, frame_offset);
    let header = read_header(&mut cur)?;
    if header.is_empty() {
        return Ok(Vec::new());
    }
    read_row_offsets(&mut cur, header.height)
}

fn read_row_offsets(cur: &mut Cursor<'_>, height: u16) -> Result<Vec<RowOffset>, FlexError> {
    let mut rows = Vec::with_capacity(height as usize);
    for _ in 0..height {
        let word_start = cur.position();
        let value = cur.read_u16()?;
        rows.push(RowOffset { word_start, value });
    }
    Ok(rows)
}

/// Decode the frame whose header starts at `frame_offset` in `data`
///
/// `data` may be a whole archive or just the frame's bytes; row offsets
/// only depend on positions relative to the frame.
pub fn decode_frame(data: &[u8], frame_offset: usize) -> Result<Frame, FlexError> {
    let mut cur = Cursor::at(data, frame_offset);
    let header = read_header(&mut cur)?;
    let (width, height) = (header.width as usize, header.height as usize);

    #[cfg(feature = "logging")]
    trace!(
        "Decoding {}x{} frame at offset {} (compression {:?})",
        width,
        height,
        frame_offset,
        header.compression
    );

    if header.is_empty() {
        let pixels = PixelGrid::transparent(width, height);
        return Ok(Frame { header, pixels });
    }

    // Table first, so a bogus height fails before the grid is allocated
    let rows = read_row_offsets(&mut cur, header.height)?;

    // Every row needs at least one byte per 255 columns it advances
    let min_row_bytes = width.div_ceil(u8::MAX as usize);
    let remaining = data.len().saturating_sub(cur.position());
    if height * min_row_bytes > remaining {
        return Err(FlexError::UnexpectedEnd { offset: data.len() });
    }

    let mut pixels = PixelGrid::transparent(width, height);
    for (y, row) in rows.iter().enumerate() {
        cur.seek(row.row_start());
        decode_row(&mut cur, header.compression, y, &mut pixels)?;
    }

    Ok(Frame { header, pixels })
}

/// Decode a frame from a slice that starts with its header
pub fn decode_frame_from_bytes(data: &[u8]) -> Result<Frame, FlexError> {
    decode_frame(data, 0)
}

fn decode_row(
    cur: &mut Cursor<'_>,
    compression: Compression,
    y: usize,
    pixels: &mut PixelGrid,
) -> Result<(), FlexError> {
    let width = pixels.width();
    let mut column = cur.read_u8()? as usize;

    while column < width {
        let run_code = cur.read_u8()?;
        let count = match compression {
            Compression::Literal => {
                let count = run_code as usize;
                write_literal(cur, count, column, y, pixels)?;
                count
            }
            Compression::Packed => {
                let count = (run_code >> 1) as usize;
                if run_code & 1 == 1 {
                    let color = cur.read_u8()?;
                    for x in column..column + count {
                        pixels.set(x, y, color);
                    }
                } else {
                    write_literal(cur, count, column, y, pixels)?;
                }
                count
            }
        };
        column += count;

        if column < width {
            column += cur.read_u8()? as usize;
        }
    }

    Ok(())
}

fn write_literal(
    cur: &mut Cursor<'_>,
    count: usize,
    column: usize,
    y: usize,
    pixels: &mut PixelGrid,
) -> Result<(), FlexError> {
    let colors = cur.take(count)?;
    for (i, &color) in colors.iter().enumerate() {
        pixels.set(column + i, y, color);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TRANSPARENT_INDEX;

    const T: u8 = TRANSPARENT_INDEX;

    /// Frame bytes with row streams laid out right after the row table
    fn frame_bytes(compression: u16, width: u16, rows: &[&[u8]]) -> Vec<u8> {
        let height = rows.len() as u16;
        let mut out = Vec::new();
        out.extend_from_slice(&3u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&compression.to_le_bytes());
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&(-2i16).to_le_bytes());
        out.extend_from_slice(&5i16.to_le_bytes());
        let mut before = 0usize;
        for (y, row) in rows.iter().enumerate() {
            let words_remaining = rows.len() - y;
            out.extend_from_slice(&((words_remaining * 2 + before) as u16).to_le_bytes());
            before += row.len();
        }
        for row in rows {
            out.extend_from_slice(row);
        }
        out
    }

    #[test]
    fn test_decode_header_fields() {
        let data = frame_bytes(1, 4, &[&[4]]);
        let header = decode_header(&data, 0).unwrap();
        assert_eq!(header.shape_id, 3);
        assert_eq!(header.frame_id, 4);
        assert_eq!(header.compression, Compression::Packed);
        assert_eq!(header.width, 4);
        assert_eq!(header.height, 1);
        assert_eq!(header.hotspot_x, -2);
        assert_eq!(header.hotspot_y, 5);
    }

    #[test]
    fn test_decode_mixed_row() {
        let row: &[u8] = &[2, (3 << 1) | 1, 7, 1, 2 << 1, 9, 5];
        let data = frame_bytes(1, 8, &[row]);
        let frame = decode_frame_from_bytes(&data).unwrap();
        assert_eq!(frame.pixels.row(0), &[T, T, 7, 7, 7, T, 9, 5]);
    }

    #[test]
    fn test_decode_all_transparent_row() {
        // Second row starts right after the single byte of the first
        let data = frame_bytes(1, 6, &[&[6], &[0, (6 << 1) | 1, 3]]);
        let frame = decode_frame_from_bytes(&data).unwrap();
        assert_eq!(frame.pixels.row(0), &[T; 6]);
        assert_eq!(frame.pixels.row(1), &[3; 6]);
    }

    #[test]
    fn test_decode_literal_mode() {
        let data = frame_bytes(0, 5, &[&[1, 2, 8, 9, 2, 4]]);
        let frame = decode_frame_from_bytes(&data).unwrap();
        assert_eq!(frame.header.compression, Compression::Literal);
        assert_eq!(frame.pixels.row(0), &[T, 8, 9, T, T]);
    }

    #[test]
    fn test_decode_empty_frame_reads_no_table() {
        // Header only: any row-word read would run off the end
        let mut data = frame_bytes(1, 0, &[]);
        data[12] = 7;
        let frame = decode_frame_from_bytes(&data).unwrap();
        assert_eq!(frame.header.height, 7);
        assert!(frame.pixels.pixels().is_empty());
    }

    #[test]
    fn test_decode_drops_overrun() {
        // Repeat run of 5 starting at column 2 in a 4-wide frame
        let data = frame_bytes(1, 4, &[&[2, (5 << 1) | 1, 6]]);
        let frame = decode_frame_from_bytes(&data).unwrap();
        assert_eq!(frame.pixels.row(0), &[T, T, 6, 6]);
    }

    #[test]
    fn test_decode_at_offset() {
        let frame_data = frame_bytes(1, 2, &[&[0, (2 << 1) | 1, 1]]);
        let mut data = vec![0xEE; 33];
        data.extend_from_slice(&frame_data);
        let frame = decode_frame(&data, 33).unwrap();
        assert_eq!(frame.pixels.row(0), &[1, 1]);
        let rows = decode_row_offsets(&data, 33).unwrap();
        assert_eq!(rows[0].word_start, 33 + 18);
        assert_eq!(rows[0].value, 2);
        assert_eq!(rows[0].row_start(), 33 + 20);
    }

    #[test]
    fn test_decode_truncated_row() {
        let data = frame_bytes(1, 8, &[&[0, 8 << 1, 1, 2]]);
        assert!(matches!(
            decode_frame_from_bytes(&data),
            Err(FlexError::UnexpectedEnd { .. })
        ));
    }

    /// Header claiming `width x height` followed by zero bytes up to `len`
    fn oversized_frame(width: u16, height: u16, len: usize) -> Vec<u8> {
        let mut data = frame_bytes(1, width, &[]);
        data[12..14].copy_from_slice(&height.to_le_bytes());
        data.resize(len, 0);
        data
    }

    #[test]
    fn test_decode_huge_header_fails_without_allocating() {
        let data = oversized_frame(u16::MAX, 32768, 64 * 1024);
        assert!(matches!(
            decode_frame_from_bytes(&data),
            Err(FlexError::UnexpectedEnd { .. })
        ));

        // Table fits, but 1000 rows of 65535 columns cannot fit in 1000 bytes
        let data = oversized_frame(u16::MAX, 1000, 18 + 2000 + 1000);
        assert_eq!(
            decode_frame_from_bytes(&data),
            Err(FlexError::UnexpectedEnd { offset: data.len() })
        );
    }

    #[test]
    fn test_decode_wide_row_within_bound() {
        // 300 columns take at least two bytes; three are present
        let data = frame_bytes(1, 300, &[&[255, (45 << 1) | 1, 7]]);
        let frame = decode_frame_from_bytes(&data).unwrap();
        assert!(frame.pixels.row(0)[..255].iter().all(|&p| p == T));
        assert!(frame.pixels.row(0)[255..].iter().all(|&p| p == 7));
    }

    #[test]
    fn test_decode_bad_compression() {
        let data = frame_bytes(4, 1, &[&[1]]);
        assert_eq!(
            decode_frame_from_bytes(&data),
            Err(FlexError::UnsupportedCompression(4))
        );
    }
}
