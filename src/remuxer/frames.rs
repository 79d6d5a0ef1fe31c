//! Grouping of Annex-B NAL units into access units.

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::trace;

use crate::event::RemuxEvent;
use crate::nalu::{NalUnit, extract_nal_units};

/// One access unit and its timing.
#[derive(Debug, Clone)]
pub struct Frame<U> {
    pub units: Vec<U>,
    pub keyframe: bool,
    pub duration: u32,
    pub composition_time_offset: i32,
}

impl<U> Frame<U> {
    fn new(units: Vec<U>, keyframe: bool) -> Self {
        Self {
            units,
            keyframe,
            duration: 0,
            composition_time_offset: 0,
        }
    }
}

/// Units of an access unit whose end has not been seen yet.
#[derive(Debug)]
struct PendingUnits<U> {
    units: Vec<U>,
    keyframe: bool,
    vcl: bool,
}

/// Resumable frame splitter shared by the H.264 and H.265 remuxers.
#[derive(Debug)]
pub struct FrameAssembler<U> {
    /// Bytes after the last start code of the previous chunk.
    remainder: Vec<u8>,
    pending: Option<PendingUnits<U>>,
    frame_duration: u32,
    timescale: u32,
    frame_count: u64,
}

impl<U: NalUnit + From<Bytes>> FrameAssembler<U> {
    pub fn new(frame_duration: u32, timescale: u32) -> Self {
        Self {
            remainder: Vec::new(),
            pending: None,
            frame_duration,
            timescale,
            frame_count: 0,
        }
    }

    pub fn frame_duration(&self) -> u32 {
        self.frame_duration
    }

    pub fn set_frame_duration(&mut self, frame_duration: u32) {
        self.frame_duration = frame_duration.max(1);
    }

    /// Splits `data`, prefixed by the previous remainder, into NAL units.
    pub fn extract_units(&mut self, data: &[u8]) -> Vec<U> {
        let mut buffer = std::mem::take(&mut self.remainder);
        buffer.extend_from_slice(data);
        let buffer = Bytes::from(buffer);
        let (units, remainder) = extract_nal_units(&buffer);
        self.remainder = remainder.map(<[u8]>::to_vec).unwrap_or_default();
        units
            .into_iter()
            .map(|unit| U::from(buffer.slice_ref(unit)))
            .collect()
    }

    /// Groups `units` into frames.
    ///
    /// Without a duration the trailing group is held back, since the next
    /// chunk may continue it. With one, `duration` is split evenly across
    /// the frames, the remainder going one tick at a time to the first
    /// frames.
    pub fn assemble(
        &mut self,
        units: Vec<U>,
        duration: Option<u32>,
        composition_time_offset: i32,
        events: &mut VecDeque<RemuxEvent>,
    ) -> Vec<Frame<U>> {
        let tail = if duration.is_some() {
            Tail::Close
        } else {
            Tail::Hold
        };
        let frames = self.group(units, tail);
        self.apply_timing(frames, duration, composition_time_offset, events)
    }

    /// Releases the remainder and any held-back units as final frames.
    pub fn finish(&mut self, events: &mut VecDeque<RemuxEvent>) -> Vec<Frame<U>> {
        let remainder = std::mem::take(&mut self.remainder);
        let units = if remainder.is_empty() {
            Vec::new()
        } else {
            vec![U::from(Bytes::from(remainder))]
        };
        let frames = self.group(units, Tail::Final);
        self.apply_timing(frames, None, 0, events)
    }

    fn apply_timing(
        &mut self,
        mut frames: Vec<Frame<U>>,
        duration: Option<u32>,
        composition_time_offset: i32,
        events: &mut VecDeque<RemuxEvent>,
    ) -> Vec<Frame<U>> {
        if frames.is_empty() {
            return frames;
        }
        let count = frames.len() as u32;
        let (frame_duration, mut extra) = match duration {
            Some(total) => (total / count, total % count),
            None => (self.frame_duration, 0),
        };
        for frame in frames.iter_mut() {
            frame.duration = frame_duration;
            if extra > 0 {
                frame.duration += 1;
                extra -= 1;
            }
            frame.composition_time_offset = composition_time_offset;
            self.frame_count += 1;
            if frame.keyframe {
                let position =
                    self.frame_count as f64 * frame_duration as f64 / self.timescale as f64;
                events.push_back(RemuxEvent::KeyframePosition(position));
            }
        }
        trace!(frames = frames.len(), frame_duration, "assembled frames");
        frames
    }

    pub fn reset(&mut self) {
        self.remainder.clear();
        self.pending = None;
        self.frame_count = 0;
    }

    fn group(&mut self, nalus: Vec<U>, tail: Tail) -> Vec<Frame<U>> {
        let (mut units, mut keyframe, mut vcl) = match self.pending.take() {
            Some(pending) => (pending.units, pending.keyframe, pending.vcl),
            None => (Vec::new(), false, false),
        };
        let mut frames = Vec::new();

        for unit in nalus {
            if !units.is_empty() && vcl && (unit.is_first_slice() || !unit.is_vcl()) {
                frames.push(Frame::new(std::mem::take(&mut units), keyframe));
                keyframe = false;
                vcl = false;
            }
            keyframe |= unit.is_keyframe();
            vcl |= unit.is_vcl();
            units.push(unit);
        }

        if units.is_empty() {
            return frames;
        }
        if tail == Tail::Hold {
            self.pending = Some(PendingUnits {
                units,
                keyframe,
                vcl,
            });
        } else if vcl {
            frames.push(Frame::new(units, keyframe));
        } else if let Some(last) = frames.last_mut() {
            last.units.extend(units);
        } else if tail == Tail::Close {
            // Parameter sets alone: keep them for the next picture.
            self.pending = Some(PendingUnits {
                units,
                keyframe,
                vcl,
            });
        } else {
            trace!(units = units.len(), "dropping trailing non-VCL units");
        }
        frames
    }
}

/// What happens to the units after the last frame boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    /// The picture may continue in the next chunk.
    Hold,
    /// The chunk ends on a picture boundary.
    Close,
    /// End of stream.
    Final,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nalu::H264Nalu;

    const SPS: &[u8] = &[0x67, 0x42, 0xc0, 0x1e];
    const PPS: &[u8] = &[0x68, 0xce, 0x3c, 0x80];
    // first_mb_in_slice = 0
    const IDR: &[u8] = &[0x65, 0x88, 0x84];
    const P: &[u8] = &[0x41, 0x9a, 0x02];
    // first_mb_in_slice = 1, continues the previous picture
    const P_SECOND_SLICE: &[u8] = &[0x41, 0x40, 0x02];

    fn annex_b(units: &[&[u8]]) -> Vec<u8> {
        units
            .iter()
            .flat_map(|unit| [&[0u8, 0, 0, 1][..], *unit].concat())
            .collect()
    }

    fn units(data: &[&[u8]]) -> Vec<H264Nalu> {
        data.iter()
            .map(|unit| H264Nalu::new(Bytes::copy_from_slice(unit)))
            .collect()
    }

    #[test]
    fn splits_on_first_slice_and_non_vcl() {
        let mut assembler = FrameAssembler::<H264Nalu>::new(33, 1000);
        let mut events = VecDeque::new();
        let frames = assembler.assemble(
            units(&[SPS, PPS, IDR, P, P_SECOND_SLICE, P]),
            Some(90),
            0,
            &mut events,
        );
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].units.len(), 3);
        assert!(frames[0].keyframe);
        assert_eq!(frames[1].units.len(), 2);
        assert!(!frames[1].keyframe);
        assert_eq!(
            frames.iter().map(|f| f.duration).collect::<Vec<_>>(),
            vec![30, 30, 30]
        );
        assert_eq!(events, VecDeque::from(vec![RemuxEvent::KeyframePosition(0.03)]));
    }

    #[test]
    fn distributes_remainder_to_first_frames() {
        let mut assembler = FrameAssembler::<H264Nalu>::new(33, 1000);
        let mut events = VecDeque::new();
        let frames = assembler.assemble(units(&[P, P, P]), Some(100), 5, &mut events);
        assert_eq!(
            frames.iter().map(|f| f.duration).collect::<Vec<_>>(),
            vec![34, 33, 33]
        );
        assert!(frames.iter().all(|f| f.composition_time_offset == 5));
        assert!(events.is_empty());
    }

    #[test]
    fn holds_last_frame_without_duration() {
        let mut assembler = FrameAssembler::<H264Nalu>::new(33, 1000);
        let mut events = VecDeque::new();
        let frames = assembler.assemble(units(&[IDR, P]), None, 0, &mut events);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].duration, 33);

        let frames = assembler.assemble(units(&[P]), None, 0, &mut events);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].units[0].data().as_ref(), P);

        let frames = assembler.finish(&mut events);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].duration, 33);
    }

    #[test]
    fn parameter_sets_alone_wait_for_a_picture() {
        let mut assembler = FrameAssembler::<H264Nalu>::new(33, 1000);
        let mut events = VecDeque::new();
        assert!(
            assembler
                .assemble(units(&[SPS, PPS]), Some(33), 0, &mut events)
                .is_empty()
        );
        let frames = assembler.assemble(units(&[IDR]), Some(33), 0, &mut events);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].units.len(), 3);
    }

    #[test]
    fn carries_remainder_between_chunks() {
        let mut assembler = FrameAssembler::<H264Nalu>::new(33, 1000);
        let stream = annex_b(&[SPS, PPS, IDR]);
        let (head, tail) = stream.split_at(12);

        let first = assembler.extract_units(head);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].data().as_ref(), SPS);

        let second = assembler.extract_units(tail);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].data().as_ref(), PPS);

        let mut events = VecDeque::new();
        let frames = assembler.finish(&mut events);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].units[0].data().as_ref(), IDR);
        assert!(frames[0].keyframe);
    }
}
