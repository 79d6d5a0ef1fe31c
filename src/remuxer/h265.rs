use tracing::{debug, trace};

use super::video::{NalHandler, VideoRemuxer};
use crate::nalu::{
    H265Nalu, HEVC_NALU_TYPE_AUD, HEVC_NALU_TYPE_PPS, HEVC_NALU_TYPE_SEI_PREFIX,
    HEVC_NALU_TYPE_SEI_SUFFIX, HEVC_NALU_TYPE_SPS, HEVC_NALU_TYPE_VPS, NalUnit,
};
use crate::parser::h265;
use crate::types::{Codec, Mp4Track};

/// H.265 remuxer: VPS, SPS and PPS configure `hvc1`, slices become samples.
pub type H265Remuxer = VideoRemuxer<H265Handler>;

#[derive(Debug, Clone, Copy, Default)]
pub struct H265Handler;

impl NalHandler for H265Handler {
    type Unit = H265Nalu;

    const CODEC: Codec = Codec::HEVC;

    fn handle_unit(unit: &H265Nalu, track: &mut Mp4Track) {
        match unit.nal_type() {
            HEVC_NALU_TYPE_VPS => {
                if track.vps.is_none() {
                    track.vps = Some(unit.data().clone());
                }
            }
            HEVC_NALU_TYPE_SPS => {
                if track.sps.is_some() {
                    return;
                }
                let sps = h265::read_sps(unit.data());
                track.width = sps.width;
                track.height = sps.height;
                track.fps = sps.fps;
                track.codec_string = sps.codec_string();
                debug!(
                    width = track.width,
                    height = track.height,
                    codec = %track.codec_string,
                    sub_layers = sps.max_sub_layers,
                    "parsed SPS"
                );
                track.hevc = Some(sps);
                track.sps = Some(unit.data().clone());
            }
            HEVC_NALU_TYPE_PPS => {
                if track.pps.is_none() {
                    track.pps = Some(unit.data().clone());
                }
            }
            HEVC_NALU_TYPE_AUD => trace!("AUD - ignoring"),
            HEVC_NALU_TYPE_SEI_PREFIX | HEVC_NALU_TYPE_SEI_SUFFIX => trace!("SEI - ignoring"),
            _ => trace!(nal = %unit, "ignoring NAL unit"),
        }
    }

    fn is_configured(track: &Mp4Track) -> bool {
        track.vps.is_some() && track.sps.is_some() && track.pps.is_some()
    }
}
