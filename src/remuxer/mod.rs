//! Per-track remuxers: elementary stream bytes in, `mdat` payloads out.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use crate::event::RemuxEvent;
use crate::types::Mp4Track;

mod aac;
mod frames;
mod h264;
mod h265;
mod queue;
mod video;

pub use aac::AacRemuxer;
pub use frames::{Frame, FrameAssembler};
pub use h264::{H264Handler, H264Remuxer};
pub use h265::{H265Handler, H265Remuxer};
pub use queue::{QueuedSample, SampleQueue};
pub use video::{NalHandler, VideoRemuxer};

/// Contract shared by the video and audio remuxers.
pub trait Remuxer: fmt::Debug + Send {
    fn track(&self) -> &Mp4Track;

    /// Remuxes one chunk. Returns `false` when the chunk yielded nothing,
    /// after pushing the matching missing-frames event.
    ///
    /// `composition_time_offset` only applies to video; audio samples are
    /// always presented at their decode time.
    fn feed(
        &mut self,
        data: &[u8],
        duration: Option<u32>,
        composition_time_offset: i32,
        events: &mut VecDeque<RemuxEvent>,
    ) -> bool;

    /// Treats buffered partial input as complete, end of stream.
    fn finish(&mut self, events: &mut VecDeque<RemuxEvent>);

    /// Serializes queued samples into an `mdat` payload, filling the
    /// track's sample list. `None` until the track is configured.
    fn get_payload(&mut self) -> Option<Bytes>;

    /// Decode time of the last payload.
    fn dts(&self) -> u64;

    /// Forgets the sample list of the fragment just emitted.
    fn flush(&mut self);

    /// Back to the unconfigured state, decode clock at zero.
    fn reset(&mut self);

    /// Codec configuration known.
    fn is_ready_to_decode(&self) -> bool;

    fn has_samples(&self) -> bool;

    fn is_ready(&self) -> bool {
        self.is_ready_to_decode() && self.has_samples()
    }
}
