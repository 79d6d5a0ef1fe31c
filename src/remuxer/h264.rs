use tracing::{debug, trace};

use super::video::{NalHandler, VideoRemuxer};
use crate::nalu::{
    AVC_NALU_TYPE_AUD, AVC_NALU_TYPE_PPS, AVC_NALU_TYPE_SEI, AVC_NALU_TYPE_SPS, H264Nalu, NalUnit,
};
use crate::parser::h264;
use crate::types::{Codec, Mp4Track};

/// H.264 remuxer: SPS and PPS configure `avc1`, slices become samples.
pub type H264Remuxer = VideoRemuxer<H264Handler>;

#[derive(Debug, Clone, Copy, Default)]
pub struct H264Handler;

impl NalHandler for H264Handler {
    type Unit = H264Nalu;

    const CODEC: Codec = Codec::AVC;

    fn handle_unit(unit: &H264Nalu, track: &mut Mp4Track) {
        match unit.nal_type() {
            AVC_NALU_TYPE_SPS => {
                if track.sps.is_some() {
                    return;
                }
                let sps = h264::read_sps(unit.data());
                track.width = sps.width();
                track.height = sps.height();
                track.fps = sps.fps;
                track.codec_string = sps.codec_string();
                track.sps = Some(unit.data().clone());
                debug!(
                    width = track.width,
                    height = track.height,
                    codec = %track.codec_string,
                    "parsed SPS"
                );
            }
            AVC_NALU_TYPE_PPS => {
                if track.pps.is_none() {
                    track.pps = Some(unit.data().clone());
                }
            }
            AVC_NALU_TYPE_AUD => trace!("AUD - ignoring"),
            AVC_NALU_TYPE_SEI => trace!("SEI - ignoring"),
            _ => trace!(nal = %unit, "ignoring NAL unit"),
        }
    }

    fn is_configured(track: &Mp4Track) -> bool {
        track.sps.is_some() && track.pps.is_some()
    }
}
