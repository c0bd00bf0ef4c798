//! High-level [`Archive`] API over an in-memory flex container
//!
//! ```no_run
//! use flexpack_core::archive::Archive;
//!
//! let mut archive = Archive::open_file("SHAPES.FLX")?;
//! let frame = archive.frame(523, 0)?.clone();
//! archive.put_frames(523, vec![(0, frame)])?;
//! archive.save_with_backup("SHAPES.FLX")?;
//! # Ok::<(), flexpack_core::FlexError>(())
//! ```

use crate::constants::{
    CountField, HEADER_SIZE, RECORD_COUNT_OFFSET, RECORD_ENTRY_SIZE, RECORD_TABLE_OFFSET,
};
use crate::cursor::Cursor;
use crate::decoder::{decode_frame, decode_row_offsets};
use crate::encoder::encode_frame_with_ids;
use crate::error::FlexError;
use crate::mutator::{self, plan_write, WriteOutcome, WritePlan};
use crate::shape::ShapeRecord;
use crate::types::{Frame, RowOffset};
use bytes::{Bytes, BytesMut};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// One entry of the container's record table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordSlot {
    /// Absolute offset of the record
    pub offset: u32,

    /// Size of the record in bytes
    pub size: u32,
}

impl RecordSlot {
    /// Slot of an absent record
    pub const ABSENT: RecordSlot = RecordSlot { offset: 0, size: 0 };

    /// A record is absent when either field is zero
    pub fn is_present(&self) -> bool {
        self.offset != 0 && self.size != 0
    }

    /// One past the last byte of the record
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.size as u64
    }

    /// The record's bytes within `buffer`; empty for absent slots
    pub fn bytes<'a>(&self, buffer: &'a [u8], index: usize) -> Result<&'a [u8], FlexError> {
        if !self.is_present() {
            return Ok(&[]);
        }
        if self.end() > buffer.len() as u64 {
            return Err(FlexError::RecordOutOfBounds {
                index,
                offset: self.offset,
                size: self.size,
                buffer_len: buffer.len(),
            });
        }
        Ok(&buffer[self.offset as usize..self.end() as usize])
    }
}

/// Configuration for opening and creating archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArchiveOptions {
    /// Width of the record count field at 0x54
    pub count_field: CountField,
}

/// Record table that ran past the end of the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTruncation {
    /// Record count stored in the header
    pub declared: u32,

    /// Entries that were fully readable
    pub readable: usize,
}

/// An in-memory flex archive
///
/// Shape records and decoded frames are cached on first access; the
/// entries for a record are dropped whenever that record is rewritten.
#[derive(Debug, Clone)]
pub struct Archive {
    buffer: BytesMut,
    slots: Vec<RecordSlot>,
    options: ArchiveOptions,
    truncation: Option<TableTruncation>,
    shapes: HashMap<usize, ShapeRecord>,
    frames: HashMap<(usize, usize), Frame>,
}

impl Archive {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Parse an archive from bytes with default options
    pub fn open(data: &[u8]) -> Result<Self, FlexError> {
        Self::open_with(data, ArchiveOptions::default())
    }

    /// Parse an archive from bytes
    ///
    /// A buffer shorter than the fixed header is rejected. A record table
    /// that runs past the end of the buffer is cut at the last complete
    /// entry; see [`Archive::truncation`].
    pub fn open_with(data: &[u8], options: ArchiveOptions) -> Result<Self, FlexError> {
        if data.len() < HEADER_SIZE {
            return Err(FlexError::HeaderTooShort {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut cur = Cursor::at(data, RECORD_COUNT_OFFSET);
        let declared = match options.count_field {
            CountField::U16 => cur.read_u16()? as u32,
            CountField::U32 => cur.read_u32()?,
        };

        let readable = ((data.len() - RECORD_TABLE_OFFSET) / RECORD_ENTRY_SIZE).min(declared as usize);
        let truncation = if readable < declared as usize {
            #[cfg(feature = "logging")]
            warn!(
                "Record table declares {} entries but only {} fit in {} bytes",
                declared,
                readable,
                data.len()
            );
            Some(TableTruncation { declared, readable })
        } else {
            None
        };

        cur.seek(RECORD_TABLE_OFFSET);
        let mut slots = Vec::with_capacity(readable);
        for _ in 0..readable {
            slots.push(RecordSlot {
                offset: cur.read_u32()?,
                size: cur.read_u32()?,
            });
        }

        #[cfg(feature = "logging")]
        debug!("Opened archive: {} bytes, {} records", data.len(), slots.len());

        Ok(Self {
            buffer: BytesMut::from(data),
            slots,
            options,
            truncation,
            shapes: HashMap::new(),
            frames: HashMap::new(),
        })
    }

    /// Read and parse an archive file
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self, FlexError> {
        Self::open_file_with(path, ArchiveOptions::default())
    }

    /// Read and parse an archive file with explicit options
    pub fn open_file_with<P: AsRef<Path>>(path: P, options: ArchiveOptions) -> Result<Self, FlexError> {
        let data = fs::read(path)?;
        Self::open_with(&data, options)
    }

    /// Create a new archive holding `records` in order
    ///
    /// Empty records become absent slots.
    pub fn from_records<R: AsRef<[u8]>>(records: &[R]) -> Result<Self, FlexError> {
        Self::from_records_with(records, ArchiveOptions::default())
    }

    /// Create a new archive with explicit options
    pub fn from_records_with<R: AsRef<[u8]>>(
        records: &[R],
        options: ArchiveOptions,
    ) -> Result<Self, FlexError> {
        let records: Vec<&[u8]> = records.iter().map(|r| r.as_ref()).collect();
        let (buffer, slots) = mutator::layout(mutator::fresh_header(), &records, options.count_field)?;
        Ok(Self {
            buffer,
            slots,
            options,
            truncation: None,
            shapes: HashMap::new(),
            frames: HashMap::new(),
        })
    }

    // ── Records ──────────────────────────────────────────────────────────────

    /// Number of readable records
    pub fn record_count(&self) -> usize {
        self.slots.len()
    }

    /// All record slots in table order
    pub fn slots(&self) -> &[RecordSlot] {
        &self.slots
    }

    /// Slot of one record
    pub fn slot(&self, index: usize) -> Result<RecordSlot, FlexError> {
        self.slots
            .get(index)
            .copied()
            .ok_or_else(|| FlexError::index("record", index, self.slots.len()))
    }

    /// Set when the record table was cut short on open
    pub fn truncation(&self) -> Option<TableTruncation> {
        self.truncation
    }

    /// Options the archive was opened or created with
    pub fn options(&self) -> ArchiveOptions {
        self.options
    }

    /// Bytes of one record; empty for absent records
    pub fn get_record(&self, index: usize) -> Result<&[u8], FlexError> {
        self.slot(index)?.bytes(&self.buffer, index)
    }

    /// Replace one record
    ///
    /// Writes in place when the new bytes fit the existing slot, otherwise
    /// rebuilds the whole container. An in-place write into a slot that
    /// overlaps the record table or another record fails with
    /// [`FlexError::RecordOverlap`]. Nothing is modified on error.
    pub fn put_record(&mut self, index: usize, data: &[u8]) -> Result<WriteOutcome, FlexError> {
        let slot = self.slot(index)?;
        match plan_write(&slot, data.len(), self.buffer.len()) {
            WritePlan::InPlace => {
                mutator::write_in_place(&mut self.buffer, &mut self.slots, index, data)?;
                self.invalidate(index);
                Ok(WriteOutcome::InPlace)
            }
            WritePlan::Rebuild => self.rebuild_record(index, data),
        }
    }

    /// Replace one record through a full rebuild, regardless of size
    pub fn rebuild_record(&mut self, index: usize, data: &[u8]) -> Result<WriteOutcome, FlexError> {
        self.slot(index)?;
        let (buffer, slots) =
            mutator::rebuild(&self.buffer, &self.slots, index, data, self.options.count_field)?;
        self.buffer = buffer;
        self.slots = slots;
        self.truncation = None;
        self.invalidate(index);
        Ok(WriteOutcome::Rebuilt)
    }

    /// Build a complete fresh container from the current records
    pub fn serialize(&self) -> Result<Bytes, FlexError> {
        let records = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, slot)| slot.bytes(&self.buffer, i))
            .collect::<Result<Vec<_>, _>>()?;
        let (buffer, _) = mutator::layout(mutator::fresh_header(), &records, self.options.count_field)?;
        Ok(buffer.freeze())
    }

    /// Check that every present record lies inside the buffer, after the
    /// table, and after the previous present record
    pub fn check_layout(&self) -> Result<(), FlexError> {
        let table_end = (RECORD_TABLE_OFFSET + self.slots.len() * RECORD_ENTRY_SIZE) as u64;
        let mut previous_end = table_end;
        for (index, slot) in self.slots.iter().enumerate() {
            if !slot.is_present() {
                continue;
            }
            slot.bytes(&self.buffer, index)?;
            if (slot.offset as u64) < previous_end {
                return Err(FlexError::RecordOverlap {
                    index,
                    offset: slot.offset,
                    previous_end,
                });
            }
            previous_end = slot.end();
        }
        Ok(())
    }

    /// Current container bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the archive, returning its bytes
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }

    /// Write the container to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), FlexError> {
        fs::write(path, &self.buffer)?;
        Ok(())
    }

    /// Write the container to `path`, first copying an existing file there
    /// to `<path>.bak` unless a backup already exists
    ///
    /// Returns the backup path when one was created.
    pub fn save_with_backup<P: AsRef<Path>>(&self, path: P) -> Result<Option<PathBuf>, FlexError> {
        let path = path.as_ref();
        let mut backup = path.as_os_str().to_owned();
        backup.push(".bak");
        let backup = PathBuf::from(backup);

        let created = if path.exists() && !backup.exists() {
            fs::copy(path, &backup)?;
            #[cfg(feature = "logging")]
            debug!("Backed up {} to {}", path.display(), backup.display());
            Some(backup)
        } else {
            None
        };

        self.save(path)?;
        Ok(created)
    }

    // ── Shapes and frames ────────────────────────────────────────────────────

    /// Frame table of a shape record, parsed on first access
    pub fn shape(&mut self, index: usize) -> Result<&ShapeRecord, FlexError> {
        if !self.shapes.contains_key(&index) {
            let shape = ShapeRecord::parse(self.get_record(index)?)?;
            self.shapes.insert(index, shape);
        }
        Ok(&self.shapes[&index])
    }

    /// Absolute offset and size of a frame within the container
    pub fn frame_byte_range(
        &mut self,
        shape_index: usize,
        frame_index: usize,
    ) -> Result<(usize, usize), FlexError> {
        let record_offset = self.slot(shape_index)?.offset as usize;
        self.shape(shape_index)?
            .frame_byte_range(record_offset, frame_index)
    }

    /// Decoded frame, decoded on first access
    pub fn frame(&mut self, shape_index: usize, frame_index: usize) -> Result<&Frame, FlexError> {
        let key = (shape_index, frame_index);
        if !self.frames.contains_key(&key) {
            let relative = self.shape(shape_index)?.frame(frame_index)?.relative_offset as usize;
            let frame = decode_frame(self.get_record(shape_index)?, relative)?;
            self.frames.insert(key, frame);
        }
        Ok(&self.frames[&key])
    }

    /// Row-offset table of a frame, with absolute positions
    pub fn row_offsets(
        &mut self,
        shape_index: usize,
        frame_index: usize,
    ) -> Result<Vec<RowOffset>, FlexError> {
        let (offset, _) = self.frame_byte_range(shape_index, frame_index)?;
        decode_row_offsets(&self.buffer, offset)
    }

    /// Replace frames of one shape and write the shape record back
    ///
    /// Each replacement is encoded with its identifier fields set to
    /// `(shape_index, frame_index)`. The frame table is rebuilt around the
    /// new payloads and the record goes through [`Archive::put_record`].
    /// All frames are encoded before anything is written.
    pub fn put_frames<I>(&mut self, shape_index: usize, replacements: I) -> Result<WriteOutcome, FlexError>
    where
        I: IntoIterator<Item = (usize, Frame)>,
    {
        let shape_id = u16::try_from(shape_index)
            .map_err(|_| FlexError::overflow("shape id", shape_index as u64, u16::MAX))?;
        let shape = self.shape(shape_index)?.clone();
        let record = self.get_record(shape_index)?;

        let mut payloads = (0..shape.frame_count())
            .map(|i| shape.frame_payload(record, i).map(Bytes::copy_from_slice))
            .collect::<Result<Vec<_>, _>>()?;

        for (frame_index, frame) in replacements {
            let count = payloads.len();
            let payload = payloads
                .get_mut(frame_index)
                .ok_or_else(|| FlexError::index("frame", frame_index, count))?;
            *payload = encode_frame_with_ids(&frame, shape_id, frame_index as u16)?;
        }

        let new_record = shape.rebuild(&payloads)?;

        #[cfg(feature = "logging")]
        debug!(
            "Replacing frames of shape {}: record {} -> {} bytes",
            shape_index,
            record.len(),
            new_record.len()
        );

        self.put_record(shape_index, &new_record)
    }

    fn invalidate(&mut self, index: usize) {
        self.shapes.remove(&index);
        self.frames.retain(|&(shape, _), _| shape != index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::FrameBuilder;
    use crate::types::PixelGrid;

    fn two_record_archive() -> Archive {
        Archive::from_records(&[&b"first record"[..], &b"second"[..]]).unwrap()
    }

    #[test]
    fn test_open_round_trip() {
        let archive = two_record_archive();
        let reopened = Archive::open(archive.as_bytes()).unwrap();
        assert_eq!(reopened.record_count(), 2);
        assert_eq!(reopened.get_record(0).unwrap(), b"first record");
        assert_eq!(reopened.get_record(1).unwrap(), b"second");
        assert!(reopened.truncation().is_none());
    }

    #[test]
    fn test_put_record_refuses_slot_inside_table() {
        let archive = Archive::from_records(&[&[0x11u8; 16][..], &b"second"[..]]).unwrap();
        let mut data = archive.as_bytes().to_vec();
        // Point record 0 at the record table itself
        data[0x80..0x84].copy_from_slice(&0x80u32.to_le_bytes());

        let mut archive = Archive::open(&data).unwrap();
        assert!(matches!(
            archive.put_record(0, &[0xAA; 12]),
            Err(FlexError::RecordOverlap { index: 0, offset: 0x80, .. })
        ));
        assert_eq!(archive.as_bytes(), &data[..]);
        assert_eq!(archive.get_record(1).unwrap(), b"second");
    }

    #[test]
    fn test_open_too_short() {
        assert_eq!(
            Archive::open(&[0u8; 100]).unwrap_err(),
            FlexError::HeaderTooShort {
                expected: 128,
                actual: 100
            }
        );
    }

    #[test]
    fn test_open_truncates_table() {
        let mut data = vec![0u8; HEADER_SIZE + 8 + 4];
        data[RECORD_COUNT_OFFSET] = 5;
        let archive = Archive::open(&data).unwrap();
        assert_eq!(archive.record_count(), 1);
        assert_eq!(
            archive.truncation(),
            Some(TableTruncation {
                declared: 5,
                readable: 1
            })
        );
    }

    #[test]
    fn test_get_record_index_error() {
        let archive = two_record_archive();
        assert!(matches!(
            archive.get_record(2),
            Err(FlexError::IndexOutOfRange {
                table: "record",
                index: 2,
                len: 2
            })
        ));
    }

    #[test]
    fn test_absent_record_is_empty() {
        let archive = Archive::from_records(&[&b""[..], &b"x"[..]]).unwrap();
        assert_eq!(archive.slot(0).unwrap(), RecordSlot::ABSENT);
        assert!(archive.get_record(0).unwrap().is_empty());
    }

    #[test]
    fn test_put_record_in_place_and_rebuild() {
        let mut archive = two_record_archive();
        let second_offset = archive.slot(1).unwrap().offset;

        assert_eq!(archive.put_record(0, b"short").unwrap(), WriteOutcome::InPlace);
        assert_eq!(archive.get_record(0).unwrap(), b"short");
        assert_eq!(archive.slot(1).unwrap().offset, second_offset);

        assert_eq!(
            archive.put_record(0, b"a much longer first record").unwrap(),
            WriteOutcome::Rebuilt
        );
        assert_eq!(archive.get_record(0).unwrap(), b"a much longer first record");
        assert_eq!(archive.get_record(1).unwrap(), b"second");
        archive.check_layout().unwrap();
    }

    #[test]
    fn test_put_record_index_error_leaves_buffer() {
        let mut archive = two_record_archive();
        let before = archive.as_bytes().to_vec();
        assert!(archive.put_record(7, b"data").is_err());
        assert_eq!(archive.as_bytes(), &before[..]);
    }

    #[test]
    fn test_serialize_uses_fresh_header() {
        let mut data = two_record_archive().as_bytes().to_vec();
        data[0] = 0x00;
        let archive = Archive::open(&data).unwrap();
        let fresh = archive.serialize().unwrap();
        assert_eq!(fresh[0], 0x1A);
        assert_eq!(&fresh[HEADER_SIZE..], &data[HEADER_SIZE..]);
    }

    #[test]
    fn test_check_layout_detects_overlap() {
        let mut data = two_record_archive().as_bytes().to_vec();
        // Point record 1 at record 0's start
        let first = data[RECORD_TABLE_OFFSET..RECORD_TABLE_OFFSET + 4].to_vec();
        data[RECORD_TABLE_OFFSET + 8..RECORD_TABLE_OFFSET + 12].copy_from_slice(&first);
        let archive = Archive::open(&data).unwrap();
        assert!(matches!(
            archive.check_layout(),
            Err(FlexError::RecordOverlap { index: 1, .. })
        ));
    }

    #[test]
    fn test_frames_are_cached_and_invalidated() {
        let grid = PixelGrid::from_rows(&[[1u8, 2, 255], [255, 3, 3]]).unwrap();
        let frame = FrameBuilder::new(grid).hotspot(1, 1).build().unwrap();
        let record = ShapeRecord::default().rebuild(&[frame]).unwrap();
        let mut archive = Archive::from_records(&[record]).unwrap();

        let decoded = archive.frame(0, 0).unwrap().clone();
        assert_eq!(decoded.pixels.row(1), &[255, 3, 3]);

        let replacement = FrameBuilder::new(PixelGrid::transparent(2, 2))
            .build_struct()
            .unwrap();
        archive.put_frames(0, vec![(0, replacement)]).unwrap();

        let redecoded = archive.frame(0, 0).unwrap();
        assert_eq!(redecoded.pixels, PixelGrid::transparent(2, 2));
        assert_eq!(redecoded.header.shape_id, 0);
        assert_eq!(redecoded.header.frame_id, 0);
    }
}
