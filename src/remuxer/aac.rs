use std::collections::VecDeque;

use bytes::Bytes;
use tracing::{debug, error, trace};

use super::Remuxer;
use super::queue::{QueuedSample, SampleQueue};
use crate::event::RemuxEvent;
use crate::parser::aac::{self, AdtsHeader};
use crate::types::{Codec, Mp4Track, SampleFlags, TIMESCALE};

/// Samples per AAC frame.
const AAC_FRAME_SAMPLES: u32 = 1024;

/// ADTS AAC remuxer: the first header configures `mp4a`, every frame
/// becomes one sample.
#[derive(Debug)]
pub struct AacRemuxer {
    track: Mp4Track,
    queue: SampleQueue,
    /// Incomplete ADTS frame from the previous chunk.
    remainder: Vec<u8>,
    ready: bool,
}

impl AacRemuxer {
    pub fn new(track_id: u32, duration: u32) -> Self {
        Self {
            track: Mp4Track::new(track_id, Codec::AAC, TIMESCALE, duration),
            queue: SampleQueue::new(false),
            remainder: Vec::new(),
            ready: false,
        }
    }

    fn configure(&mut self, header: &AdtsHeader) {
        self.track.sample_rate = header.sample_rate();
        self.track.channel_count = header.channel_configuration as u32;
        self.track.dsi = Some(header.audio_specific_config());
        self.track.codec_string = header.codec_string();
        self.ready = true;
        debug!(
            codec = %self.track.codec_string,
            sample_rate = self.track.sample_rate,
            channels = self.track.channel_count,
            "audio track configured"
        );
    }

    /// One AAC frame in ticks, used when a chunk carries no duration.
    pub fn frame_duration(&self) -> u32 {
        match self.track.sample_rate {
            0 => 1,
            rate => (AAC_FRAME_SAMPLES * TIMESCALE / rate).max(1),
        }
    }

    fn remux(&mut self, frames: Vec<Bytes>, duration: Option<u32>) {
        let count = frames.len() as u32;
        let (frame_duration, mut extra) = match duration {
            Some(total) if count > 0 => (total / count, total % count),
            _ => (self.frame_duration(), 0),
        };
        for frame in frames {
            let mut duration = frame_duration;
            if extra > 0 {
                duration += 1;
                extra -= 1;
            }
            self.queue.push(QueuedSample {
                size: frame.len(),
                units: vec![frame],
                duration,
                cts: 0,
                flags: SampleFlags::audio(),
            });
        }
    }
}

impl Remuxer for AacRemuxer {
    fn track(&self) -> &Mp4Track {
        &self.track
    }

    fn feed(
        &mut self,
        data: &[u8],
        duration: Option<u32>,
        _composition_time_offset: i32,
        events: &mut VecDeque<RemuxEvent>,
    ) -> bool {
        let mut buffer = std::mem::take(&mut self.remainder);
        buffer.extend_from_slice(data);
        if buffer.len() < aac::ADTS_HEADER_LENGTH {
            if aac::is_partial_header(&buffer) {
                trace!(pending = buffer.len(), "ADTS header incomplete");
                self.remainder = buffer;
            } else {
                error!(len = buffer.len(), "invalid ADTS audio format");
            }
            events.push_back(RemuxEvent::MissingAudioFrames);
            return false;
        }
        let buffer = Bytes::from(buffer);

        let Some(adts) = aac::extract_aac(&buffer) else {
            error!(len = buffer.len(), "invalid ADTS audio format");
            events.push_back(RemuxEvent::MissingAudioFrames);
            return false;
        };
        self.remainder = adts.remainder.map(<[u8]>::to_vec).unwrap_or_default();
        if adts.frames.is_empty() {
            trace!(pending = self.remainder.len(), "no complete ADTS frame yet");
            events.push_back(RemuxEvent::MissingAudioFrames);
            return false;
        }
        if !self.ready {
            self.configure(&adts.header);
        }
        let frames = adts
            .frames
            .iter()
            .map(|frame| buffer.slice_ref(frame))
            .collect();
        self.remux(frames, duration);
        true
    }

    fn finish(&mut self, _events: &mut VecDeque<RemuxEvent>) {
        if !self.remainder.is_empty() {
            debug!(len = self.remainder.len(), "dropping incomplete ADTS frame");
            self.remainder.clear();
        }
    }

    fn get_payload(&mut self) -> Option<Bytes> {
        if !self.ready || self.queue.is_empty() {
            return None;
        }
        self.queue.take_payload(&mut self.track)
    }

    fn dts(&self) -> u64 {
        self.queue.dts()
    }

    fn flush(&mut self) {
        self.track.samples.clear();
    }

    fn reset(&mut self) {
        self.track.clear_config();
        self.queue.clear();
        self.remainder.clear();
        self.ready = false;
    }

    fn is_ready_to_decode(&self) -> bool {
        self.ready
    }

    fn has_samples(&self) -> bool {
        !self.queue.is_empty()
    }
}
