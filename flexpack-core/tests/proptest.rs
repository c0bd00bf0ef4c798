//! Property-based tests using proptest

use flexpack_core::{
    archive::Archive,
    constants::TRANSPARENT_INDEX,
    decoder::decode_frame_from_bytes,
    encoder::{encode_frame, FrameBuilder},
    shape::ShapeRecord,
    types::PixelGrid,
};
use proptest::prelude::*;

/// Pixels biased toward transparency and a few colors, so rows mix
/// transparent gaps, long repeats and literal stretches
fn pixel() -> impl Strategy<Value = u8> {
    prop_oneof![
        3 => Just(TRANSPARENT_INDEX),
        3 => 0u8..4,
        1 => any::<u8>(),
    ]
}

fn grid(max_width: usize, max_height: usize) -> impl Strategy<Value = PixelGrid> {
    (1..=max_width, 1..=max_height).prop_flat_map(|(w, h)| {
        prop::collection::vec(pixel(), w * h)
            .prop_map(move |pixels| PixelGrid::from_pixels(w, h, pixels).unwrap())
    })
}

/// A well-formed frame header followed by arbitrary row bytes
fn raw_frame() -> impl Strategy<Value = Vec<u8>> {
    (
        any::<(u16, u16, u32)>(),
        0u16..=1,
        0u16..=16,
        0u16..=6,
        any::<(i16, i16)>(),
        prop::collection::vec(any::<u8>(), 0..256),
    )
        .prop_map(|((shape, frame, reserved), compression, width, height, (hx, hy), tail)| {
            let mut out = Vec::with_capacity(18 + tail.len());
            out.extend_from_slice(&shape.to_le_bytes());
            out.extend_from_slice(&frame.to_le_bytes());
            out.extend_from_slice(&reserved.to_le_bytes());
            out.extend_from_slice(&compression.to_le_bytes());
            out.extend_from_slice(&width.to_le_bytes());
            out.extend_from_slice(&height.to_le_bytes());
            out.extend_from_slice(&hx.to_le_bytes());
            out.extend_from_slice(&hy.to_le_bytes());
            out.extend_from_slice(&tail);
            out
        })
}

fn records() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8)
}

proptest! {
    #[test]
    fn prop_round_trip_encode_decode(
        grid in grid(255, 8),
        hx in any::<i16>(),
        hy in any::<i16>(),
        literal in any::<bool>(),
    ) {
        let mut builder = FrameBuilder::new(grid.clone()).hotspot(hx, hy);
        if literal {
            builder = builder.literal();
        }
        let encoded = builder.build().unwrap();
        let decoded = decode_frame_from_bytes(&encoded).unwrap();

        prop_assert_eq!(decoded.pixels, grid);
        prop_assert_eq!((decoded.header.hotspot_x, decoded.header.hotspot_y), (hx, hy));
    }

    #[test]
    fn prop_decode_encode_idempotent(grid in grid(64, 16)) {
        let stored = FrameBuilder::new(grid).build().unwrap();
        let first = decode_frame_from_bytes(&stored).unwrap();
        let second = decode_frame_from_bytes(&encode_frame(&first).unwrap()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_decode_encode_idempotent_on_raw_bytes(data in raw_frame()) {
        // Any frame the decoder accepts re-encodes to the same frame
        if let Ok(first) = decode_frame_from_bytes(&data) {
            let encoded = encode_frame(&first).unwrap();
            let second = decode_frame_from_bytes(&encoded).unwrap();
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn prop_in_place_matches_rebuild(
        records in records(),
        pick in any::<prop::sample::Index>(),
        shrink in any::<prop::sample::Index>(),
        fill in any::<u8>(),
    ) {
        let index = pick.index(records.len());
        let new_len = shrink.index(records[index].len() + 1);
        let payload = vec![fill; new_len];

        let mut in_place = Archive::from_records(&records).unwrap();
        let mut rebuilt = in_place.clone();
        in_place.put_record(index, &payload).unwrap();
        rebuilt.rebuild_record(index, &payload).unwrap();

        let a = Archive::open(in_place.as_bytes()).unwrap();
        let b = Archive::open(rebuilt.as_bytes()).unwrap();
        prop_assert_eq!(a.record_count(), b.record_count());
        for i in 0..a.record_count() {
            prop_assert_eq!(a.get_record(i).unwrap(), b.get_record(i).unwrap());
        }
    }

    #[test]
    fn prop_rebuild_keeps_offsets_monotonic(
        records in records(),
        pick in any::<prop::sample::Index>(),
        payload in prop::collection::vec(any::<u8>(), 0..200),
    ) {
        let index = pick.index(records.len());
        let mut archive = Archive::from_records(&records).unwrap();
        archive.put_record(index, &payload).unwrap();

        let present: Vec<_> = archive.slots().iter().filter(|s| s.is_present()).collect();
        for pair in present.windows(2) {
            prop_assert!(pair[0].end() <= pair[1].offset as u64);
        }
        prop_assert!(archive.check_layout().is_ok());
        prop_assert_eq!(archive.get_record(index).unwrap(), &payload[..]);
    }

    #[test]
    fn prop_shape_rebuild_round_trip(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..10),
    ) {
        let record = ShapeRecord::default().rebuild(&payloads).unwrap();
        let shape = ShapeRecord::parse(&record).unwrap();
        prop_assert_eq!(shape.frame_count(), payloads.len());
        for (i, payload) in payloads.iter().enumerate() {
            prop_assert_eq!(shape.frame_payload(&record, i).unwrap(), &payload[..]);
        }
    }

    #[test]
    fn prop_decode_never_panics(
        data in prop::collection::vec(any::<u8>(), 0..4096)
    ) {
        // Should never panic, even on random data
        let result = decode_frame_from_bytes(&data);
        prop_assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn prop_open_never_panics(
        data in prop::collection::vec(any::<u8>(), 0..2048)
    ) {
        if let Ok(archive) = Archive::open(&data) {
            for i in 0..archive.record_count() {
                let _ = archive.get_record(i);
            }
            let _ = archive.check_layout();
        }
    }

    #[test]
    fn prop_width_over_255_rejected(width in 256usize..400) {
        let grid = PixelGrid::from_pixels(width, 1, vec![1; width]).unwrap();
        prop_assert!(FrameBuilder::new(grid).build().is_err());
    }
}
