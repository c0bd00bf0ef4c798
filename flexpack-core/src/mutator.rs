//! Record writes: in-place overwrite or full container rebuild
//!
//! Records are stored back to back with absolute offsets in the table, so
//! growing one record moves every record after it. A write that fits in
//! the existing slot is done in place; anything larger relocates every
//! record through a rebuild.

use crate::archive::RecordSlot;
use crate::constants::{
    CountField, FILE_SIZE_OFFSET, HEADER_FILL_BYTE, HEADER_FILL_TAIL, HEADER_FLAG,
    HEADER_FLAG_OFFSET, HEADER_SIZE, RECORD_COUNT_OFFSET, RECORD_ENTRY_SIZE, RECORD_TABLE_OFFSET,
};
use crate::error::FlexError;
use bytes::{BufMut, BytesMut};

#[cfg(feature = "logging")]
use tracing::debug;

/// How a record write will be carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePlan {
    /// New bytes fit in the existing slot
    InPlace,
    /// The whole container must be laid out again
    Rebuild,
}

/// Result of a successful record write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written into the existing slot; no other record moved
    InPlace,
    /// Container rebuilt; later records may have moved
    Rebuilt,
}

/// Decide how a write of `new_len` bytes into `slot` must happen
///
/// In-place is only possible for a present slot that lies inside the
/// buffer and is at least `new_len` bytes long. An empty write always fits.
pub fn plan_write(slot: &RecordSlot, new_len: usize, buffer_len: usize) -> WritePlan {
    if new_len == 0 {
        return WritePlan::InPlace;
    }
    if slot.is_present() && slot.end() <= buffer_len as u64 && new_len <= slot.size as usize {
        WritePlan::InPlace
    } else {
        WritePlan::Rebuild
    }
}

/// Overwrite a record inside its slot
///
/// The bytes after the new data up to the old end are zeroed and the
/// table's size field is set to the new length. The offset and every other
/// table entry are left alone.
pub(crate) fn write_in_place(
    buffer: &mut [u8],
    slots: &mut [RecordSlot],
    index: usize,
    data: &[u8],
) -> Result<(), FlexError> {
    let len = slots.len();
    if slots.get(index).is_some_and(RecordSlot::is_present) {
        check_slot_clear(slots, index)?;
    }
    let slot = slots
        .get_mut(index)
        .ok_or_else(|| FlexError::index("record", index, len))?;

    if !data.is_empty() {
        debug_assert!(data.len() <= slot.size as usize);
        let start = slot.offset as usize;
        let old_end = start + slot.size as usize;
        let new_end = start + data.len();
        buffer[start..new_end].copy_from_slice(data);
        buffer[new_end..old_end].fill(0);
    } else if slot.is_present() && slot.end() <= buffer.len() as u64 {
        let start = slot.offset as usize;
        buffer[start..start + slot.size as usize].fill(0);
    }

    slot.size = data.len() as u32;
    let entry = RECORD_TABLE_OFFSET + index * RECORD_ENTRY_SIZE;
    buffer[entry + 4..entry + 8].copy_from_slice(&slot.size.to_le_bytes());

    #[cfg(feature = "logging")]
    debug!(
        "Wrote record {} in place at offset {} ({} bytes)",
        index,
        slot.offset,
        data.len()
    );

    Ok(())
}

/// Check that present slot `index` starts after the record table and shares
/// no bytes with another present slot
pub(crate) fn check_slot_clear(slots: &[RecordSlot], index: usize) -> Result<(), FlexError> {
    let slot = slots[index];
    let table_end = (RECORD_TABLE_OFFSET + slots.len() * RECORD_ENTRY_SIZE) as u64;
    if (slot.offset as u64) < table_end {
        return Err(FlexError::RecordOverlap {
            index,
            offset: slot.offset,
            previous_end: table_end,
        });
    }

    let sibling = slots.iter().enumerate().find(|&(i, other)| {
        i != index
            && other.is_present()
            && (other.offset as u64) < slot.end()
            && (slot.offset as u64) < other.end()
    });
    match sibling {
        Some((_, other)) => Err(FlexError::RecordOverlap {
            index,
            offset: slot.offset,
            previous_end: other.end(),
        }),
        None => Ok(()),
    }
}

/// Rebuild the container with `data` substituted for record `index`
///
/// Every sibling record is read back from `buffer` first; if any is out of
/// bounds the rebuild is refused before anything is produced. The existing
/// header bytes are kept, with the record count and total size patched.
pub(crate) fn rebuild(
    buffer: &[u8],
    slots: &[RecordSlot],
    index: usize,
    data: &[u8],
    count_field: CountField,
) -> Result<(BytesMut, Vec<RecordSlot>), FlexError> {
    if index >= slots.len() {
        return Err(FlexError::index("record", index, slots.len()));
    }

    let mut records: Vec<&[u8]> = Vec::with_capacity(slots.len());
    for (i, slot) in slots.iter().enumerate() {
        if i == index {
            records.push(data);
        } else {
            records.push(slot.bytes(buffer, i)?);
        }
    }

    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&buffer[..HEADER_SIZE]);

    #[cfg(feature = "logging")]
    debug!(
        "Rebuilding container of {} records for record {} ({} bytes)",
        slots.len(),
        index,
        data.len()
    );

    layout(header, &records, count_field)
}

/// Lay out a complete container from a header and records in table order
///
/// Offsets are assigned by a running cursor from the end of the record
/// table. Empty records get a `{0, 0}` entry and take no space.
pub(crate) fn layout(
    mut header: [u8; HEADER_SIZE],
    records: &[&[u8]],
    count_field: CountField,
) -> Result<(BytesMut, Vec<RecordSlot>), FlexError> {
    let count = records.len();
    if count as u64 > count_field.max_count() {
        return Err(FlexError::overflow(
            "record count",
            count as u64,
            count_field.max_count(),
        ));
    }

    let table_end = RECORD_TABLE_OFFSET + count * RECORD_ENTRY_SIZE;
    let total = table_end + records.iter().map(|r| r.len()).sum::<usize>();
    if total > u32::MAX as usize {
        return Err(FlexError::ArchiveTooLarge(total));
    }

    match count_field {
        CountField::U16 => header[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 2]
            .copy_from_slice(&(count as u16).to_le_bytes()),
        CountField::U32 => header[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&(count as u32).to_le_bytes()),
    }
    header[FILE_SIZE_OFFSET..FILE_SIZE_OFFSET + 4].copy_from_slice(&(total as u32).to_le_bytes());

    let mut buf = BytesMut::with_capacity(total);
    buf.put_slice(&header);

    let mut slots = Vec::with_capacity(count);
    let mut cursor = table_end;
    for record in records {
        let slot = if record.is_empty() {
            RecordSlot::ABSENT
        } else {
            let slot = RecordSlot {
                offset: cursor as u32,
                size: record.len() as u32,
            };
            cursor += record.len();
            slot
        };
        buf.put_u32_le(slot.offset);
        buf.put_u32_le(slot.size);
        slots.push(slot);
    }

    for record in records {
        buf.put_slice(record);
    }

    Ok((buf, slots))
}

/// Header for a newly created container
///
/// The first 0x50 bytes are filler, followed by the filler tail word, the
/// record count (patched by [`layout`]), the constant flag word, the total
/// size (patched by [`layout`]) and zeros up to the record table.
pub fn fresh_header() -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..0x50].fill(HEADER_FILL_BYTE);
    header[0x50..0x54].copy_from_slice(&HEADER_FILL_TAIL.to_le_bytes());
    header[HEADER_FLAG_OFFSET..HEADER_FLAG_OFFSET + 4].copy_from_slice(&HEADER_FLAG.to_le_bytes());
    header
}
