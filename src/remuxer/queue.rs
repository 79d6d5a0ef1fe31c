//! Samples waiting for the next fragment.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::types::{Mp4Track, SampleFlags, SampleInfo};

#[derive(Debug, Clone)]
pub struct QueuedSample {
    /// NAL units or a raw AAC frame, without framing.
    pub units: Vec<Bytes>,
    /// Bytes the sample occupies in `mdat`.
    pub size: usize,
    pub duration: u32,
    pub cts: i32,
    pub flags: SampleFlags,
}

/// FIFO of remuxed samples and the decode clock of the track.
#[derive(Debug)]
pub struct SampleQueue {
    samples: VecDeque<QueuedSample>,
    /// Prefix each unit with its 4-byte big-endian length.
    length_prefixed: bool,
    len: usize,
    dts: u64,
    next_dts: u64,
}

impl SampleQueue {
    pub fn new(length_prefixed: bool) -> Self {
        Self {
            samples: VecDeque::new(),
            length_prefixed,
            len: 0,
            dts: 0,
            next_dts: 0,
        }
    }

    pub fn push(&mut self, sample: QueuedSample) {
        self.len += sample.size;
        self.samples.push_back(sample);
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Bytes the queued samples will occupy in `mdat`.
    pub fn pending_bytes(&self) -> usize {
        self.len
    }

    /// Decode time of the first sample of the last payload.
    pub fn dts(&self) -> u64 {
        self.dts
    }

    /// Decode time the next payload will start at.
    pub fn next_dts(&self) -> u64 {
        self.next_dts
    }

    /// Drains every queued sample into one `mdat` payload and records the
    /// matching [`SampleInfo`] entries on `track`.
    ///
    /// Samples without duration are dropped. Returns `None` when nothing
    /// remains.
    pub fn take_payload(&mut self, track: &mut Mp4Track) -> Option<Bytes> {
        if self.samples.is_empty() {
            return None;
        }
        let mut payload = BytesMut::with_capacity(self.len);
        self.dts = self.next_dts;

        while let Some(sample) = self.samples.pop_front() {
            self.len -= sample.size;
            if sample.duration == 0 {
                warn!(
                    dts = self.next_dts,
                    duration = sample.duration,
                    "invalid sample duration, dropping sample"
                );
                continue;
            }
            self.next_dts += sample.duration as u64;
            for unit in &sample.units {
                if self.length_prefixed {
                    payload.put_u32(unit.len() as u32);
                }
                payload.extend_from_slice(unit);
            }
            track.samples.push(SampleInfo {
                size: sample.size as u32,
                duration: sample.duration,
                cts: sample.cts,
                flags: sample.flags,
            });
        }

        if track.samples.is_empty() {
            return None;
        }
        Some(payload.freeze())
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.len = 0;
        self.dts = 0;
        self.next_dts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Codec, TIMESCALE};

    fn sample(units: &[&'static [u8]], duration: u32, keyframe: bool) -> QueuedSample {
        let units: Vec<Bytes> = units.iter().map(|u| Bytes::from_static(u)).collect();
        QueuedSample {
            size: units.iter().map(|u| 4 + u.len()).sum(),
            units,
            duration,
            cts: 0,
            flags: if keyframe {
                SampleFlags::keyframe()
            } else {
                SampleFlags::delta()
            },
        }
    }

    #[test]
    fn serializes_length_prefixed_units() {
        let mut track = Mp4Track::new(1, Codec::AVC, TIMESCALE, 0);
        let mut queue = SampleQueue::new(true);
        queue.push(sample(&[&[0x65, 0x88], &[0x65, 0x99, 0x01]], 40, true));
        queue.push(sample(&[&[0x41, 0x9a]], 40, false));
        assert_eq!(queue.pending_bytes(), 6 + 7 + 6);

        let payload = queue.take_payload(&mut track).unwrap();
        assert_eq!(
            payload.as_ref(),
            &[0, 0, 0, 2, 0x65, 0x88, 0, 0, 0, 3, 0x65, 0x99, 0x01, 0, 0, 0, 2, 0x41, 0x9a]
        );
        assert_eq!(track.samples.len(), 2);
        assert_eq!(track.samples[0].size, 13);
        assert_eq!(queue.dts(), 0);
        assert_eq!(queue.next_dts(), 80);
        assert_eq!(queue.pending_bytes(), 0);
    }

    #[test]
    fn drops_zero_duration_samples() {
        let mut track = Mp4Track::new(1, Codec::AVC, TIMESCALE, 0);
        let mut queue = SampleQueue::new(true);
        queue.push(sample(&[&[0x65]], 0, true));
        assert!(queue.take_payload(&mut track).is_none());
        assert!(track.samples.is_empty());

        queue.push(sample(&[&[0x65]], 33, true));
        queue.push(sample(&[&[0x41]], 0, false));
        let payload = queue.take_payload(&mut track).unwrap();
        assert_eq!(payload.len(), 5);
        assert_eq!(track.samples.len(), 1);
        assert_eq!(queue.next_dts(), 33);
    }

    #[test]
    fn audio_frames_are_not_prefixed() {
        let mut track = Mp4Track::new(2, Codec::AAC, TIMESCALE, 0);
        let mut queue = SampleQueue::new(false);
        queue.push(QueuedSample {
            units: vec![Bytes::from_static(&[1, 2, 3])],
            size: 3,
            duration: 23,
            cts: 0,
            flags: SampleFlags::audio(),
        });
        assert_eq!(queue.take_payload(&mut track).unwrap().as_ref(), &[1, 2, 3]);
    }
}
