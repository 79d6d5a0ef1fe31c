use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use tracing::{debug, error};

use super::Remuxer;
use super::frames::{Frame, FrameAssembler};
use super::queue::{QueuedSample, SampleQueue};
use crate::event::RemuxEvent;
use crate::nalu::NalUnit;
use crate::types::{Codec, Mp4Track, SampleFlags, TIMESCALE};

/// Codec-specific handling of non-VCL units.
pub trait NalHandler: fmt::Debug + Send + 'static {
    type Unit: NalUnit + From<Bytes> + fmt::Debug + Send;

    const CODEC: Codec;

    /// Records parameter sets on `track`; other non-VCL units are ignored.
    fn handle_unit(unit: &Self::Unit, track: &mut Mp4Track);

    /// Every parameter set needed for the sample entry is known.
    fn is_configured(track: &Mp4Track) -> bool;
}

/// Annex-B video remuxer, generic over the codec.
#[derive(Debug)]
pub struct VideoRemuxer<H: NalHandler> {
    track: Mp4Track,
    assembler: FrameAssembler<H::Unit>,
    queue: SampleQueue,
    ready: bool,
    fallback_fps: f64,
    read_fps_from_track: bool,
    _handler: PhantomData<H>,
}

impl<H: NalHandler> VideoRemuxer<H> {
    pub fn new(track_id: u32, duration: u32, fallback_fps: f64, read_fps_from_track: bool) -> Self {
        Self {
            track: Mp4Track::new(track_id, H::CODEC, TIMESCALE, duration),
            assembler: FrameAssembler::new(Self::frame_duration_for(fallback_fps), TIMESCALE),
            queue: SampleQueue::new(true),
            ready: false,
            fallback_fps,
            read_fps_from_track,
            _handler: PhantomData,
        }
    }

    fn frame_duration_for(fps: f64) -> u32 {
        ((TIMESCALE as f64 / fps) as u32).max(1)
    }

    /// Fallback duration currently applied to frames without timing.
    pub fn frame_duration(&self) -> u32 {
        self.assembler.frame_duration()
    }

    /// `true` keeps the unit as sample data.
    fn parse_nal(&mut self, unit: &H::Unit) -> bool {
        if unit.is_vcl() {
            return true;
        }
        H::handle_unit(unit, &mut self.track);
        if !self.ready && H::is_configured(&self.track) {
            self.ready = true;
            match self.track.fps {
                Some(fps) if self.read_fps_from_track && fps > 0.0 => {
                    let frame_duration = (TIMESCALE as f64 / fps).ceil() as u32;
                    self.assembler.set_frame_duration(frame_duration);
                    debug!(fps, frame_duration, "using frame rate from SPS");
                }
                Some(_) => {}
                None => self.track.fps = Some(self.fallback_fps),
            }
            debug!(
                codec = %self.track.codec_string,
                width = self.track.width,
                height = self.track.height,
                "video track configured"
            );
        }
        false
    }

    fn remux(&mut self, frames: Vec<Frame<H::Unit>>) {
        for frame in frames {
            let mut units = Vec::with_capacity(frame.units.len());
            let mut size = 0;
            for unit in &frame.units {
                if self.parse_nal(unit) {
                    size += unit.size();
                    units.push(unit.data().clone());
                }
            }
            if !units.is_empty() && self.ready {
                self.queue.push(QueuedSample {
                    units,
                    size,
                    duration: frame.duration,
                    cts: frame.composition_time_offset,
                    flags: if frame.keyframe {
                        SampleFlags::keyframe()
                    } else {
                        SampleFlags::delta()
                    },
                });
            }
        }
    }
}

impl<H: NalHandler> Remuxer for VideoRemuxer<H> {
    fn track(&self) -> &Mp4Track {
        &self.track
    }

    fn feed(
        &mut self,
        data: &[u8],
        duration: Option<u32>,
        composition_time_offset: i32,
        events: &mut VecDeque<RemuxEvent>,
    ) -> bool {
        let units = self.assembler.extract_units(data);
        if units.is_empty() {
            error!(len = data.len(), "failed to extract any NAL units from video data");
            events.push_back(RemuxEvent::MissingVideoFrames);
            return false;
        }
        let frames = self
            .assembler
            .assemble(units, duration, composition_time_offset, events);
        self.remux(frames);
        true
    }

    fn finish(&mut self, events: &mut VecDeque<RemuxEvent>) {
        let frames = self.assembler.finish(events);
        self.remux(frames);
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
        self.assembler.reset();
        self.assembler
            .set_frame_duration(Self::frame_duration_for(self.fallback_fps));
        self.queue.clear();
        self.ready = false;
    }

    fn is_ready_to_decode(&self) -> bool {
        self.ready
    }

    fn has_samples(&self) -> bool {
        !self.queue.is_empty()
    }
}
