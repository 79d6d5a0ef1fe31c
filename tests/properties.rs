mod support;

use std::collections::VecDeque;

use bytes::Bytes;
use mp4remux::nalu::{H264Nalu, NalUnit, extract_nal_units};
use mp4remux::remuxer::{AacRemuxer, FrameAssembler, Remuxer};
use mp4remux::util::BitReader;
use proptest::prelude::*;

/// Bit-level writer for Exp-Golomb codes.
#[derive(Default)]
struct BitWriter {
    bits: Vec<bool>,
}

impl BitWriter {
    fn write_bits(&mut self, value: u64, count: u32) {
        for i in (0..count).rev() {
            self.bits.push((value >> i) & 1 == 1);
        }
    }

    fn write_ue(&mut self, value: u32) {
        let code = value as u64 + 1;
        let len = 64 - code.leading_zeros();
        self.write_bits(0, len - 1);
        self.write_bits(code, len);
    }

    fn write_se(&mut self, value: i32) {
        let code = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.write_ue(code);
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bits
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |byte, (i, &bit)| byte | ((bit as u8) << (7 - i)))
            })
            .collect()
    }
}

fn nal_units() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(1u8..=255, 1..24), 1..12)
}

proptest! {
    #[test]
    fn exp_golomb_round_trips(
        unsigned in prop::collection::vec(0u32..(1 << 31), 1..16),
        signed in prop::collection::vec(-(1i32 << 20)..(1i32 << 20), 1..16),
    ) {
        let mut writer = BitWriter::default();
        for &value in &unsigned {
            writer.write_ue(value);
        }
        for &value in &signed {
            writer.write_se(value);
        }
        let data = writer.into_bytes();

        let mut reader = BitReader::new(&data);
        for &value in &unsigned {
            prop_assert_eq!(reader.read_unsigned_exp_golomb(), value);
        }
        for &value in &signed {
            prop_assert_eq!(reader.read_signed_exp_golomb(), value);
        }
    }

    #[test]
    fn annex_b_split_points_do_not_change_units(
        units in nal_units(),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let refs: Vec<&[u8]> = units.iter().map(Vec::as_slice).collect();
        let stream = support::annex_b(&refs);

        let (whole, remainder) = extract_nal_units(&stream);
        prop_assert!(remainder.is_none());
        prop_assert_eq!(&whole, &refs);

        let mut offsets: Vec<usize> = cuts.iter().map(|cut| cut.index(stream.len())).collect();
        offsets.push(stream.len());
        offsets.sort_unstable();

        let mut assembler = FrameAssembler::<H264Nalu>::new(33, 1000);
        let mut split = Vec::new();
        let mut start = 0;
        for end in offsets {
            for unit in assembler.extract_units(&stream[start..end]) {
                split.push(unit.data().to_vec());
            }
            start = end;
        }
        prop_assert_eq!(split, units);
    }

    #[test]
    fn chunk_duration_is_spread_over_frames(frames in 1usize..40, total in 0u32..100_000) {
        let slice = Bytes::from_static(&[0x41, 0x9a, 0x02]);
        let units = vec![H264Nalu::new(slice); frames];
        let mut assembler = FrameAssembler::<H264Nalu>::new(33, 1000);
        let mut events = VecDeque::new();

        let assembled = assembler.assemble(units, Some(total), 0, &mut events);
        prop_assert_eq!(assembled.len(), frames);
        let durations: Vec<u32> = assembled.iter().map(|frame| frame.duration).collect();
        prop_assert_eq!(durations.iter().sum::<u32>(), total);
        let min = durations.iter().copied().min().unwrap_or(0);
        let max = durations.iter().copied().max().unwrap_or(0);
        prop_assert!(max - min <= 1);
        prop_assert!(durations.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn adts_split_points_do_not_change_payload(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..8),
        cut in any::<prop::sample::Index>(),
    ) {
        let stream: Vec<u8> = payloads.iter().flat_map(|p| support::adts_frame(p)).collect();
        let (head, tail) = stream.split_at(cut.index(stream.len()));

        let mut remuxer = AacRemuxer::new(1, 0);
        let mut events = VecDeque::new();
        remuxer.feed(head, Some(100), 0, &mut events);
        remuxer.feed(tail, Some(100), 0, &mut events);

        let payload = remuxer.get_payload().expect("payload");
        prop_assert_eq!(payload.to_vec(), payloads.concat());
        prop_assert_eq!(remuxer.track().samples.len(), payloads.len());
    }
}
