//! H.265 sequence parameter set reader (ITU-T H.265 7.3.2.2).

use crate::util::{BitReader, remove_emulation_prevention};

/// Sub-layers are bounded by `sps_max_sub_layers_minus1` (3 bits).
const MAX_SUB_LAYERS: usize = 8;

/// `num_short_term_ref_pic_sets` is at most 64.
const MAX_SHORT_TERM_REF_PIC_SETS: u32 = 64;

/// `general_profile_tier_level` fields, also carried in `hvcC`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HevcProfile {
    pub profile_space: u8,
    pub tier_flag: bool,
    pub profile_idc: u8,
    pub profile_compatibility_flags: u32,
    /// progressive/interlaced/non-packed/frame-only flags and the 44
    /// reserved bits that follow them.
    pub constraint_indicator_flags: [u8; 6],
    pub level_idc: u8,
}

impl HevcProfile {
    /// RFC 6381 codec string (ISO/IEC 14496-15 E.3), e.g. `hvc1.1.6.L93.b0`.
    pub fn codec_string(&self) -> String {
        let space = match self.profile_space {
            1 => "A",
            2 => "B",
            3 => "C",
            _ => "",
        };
        let mut codec = format!(
            "hvc1.{space}{}.{:x}.{}{}",
            self.profile_idc,
            self.profile_compatibility_flags.reverse_bits(),
            if self.tier_flag { 'H' } else { 'L' },
            self.level_idc
        );
        let significant = self
            .constraint_indicator_flags
            .iter()
            .rposition(|&byte| byte != 0)
            .map_or(0, |last| last + 1);
        for byte in &self.constraint_indicator_flags[..significant] {
            codec.push_str(&format!(".{byte:x}"));
        }
        codec
    }
}

/// Fields of an H.265 SPS that matter for remuxing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct H265Sps {
    pub profile: HevcProfile,
    pub max_sub_layers: u8,
    pub temporal_id_nesting: bool,
    pub chroma_format_idc: u32,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    /// Luma width after the conformance window.
    pub width: u32,
    pub height: u32,
    /// `time_scale / num_units_in_tick` when VUI timing is present.
    pub fps: Option<f64>,
}

impl H265Sps {
    pub fn codec_string(&self) -> String {
        self.profile.codec_string()
    }
}

/// Parses an SPS NAL unit, 2-byte header included.
///
/// Truncated input never fails; missing fields read as zero.
pub fn read_sps(nal: &[u8]) -> H265Sps {
    let rbsp = remove_emulation_prevention(nal.get(2..).unwrap_or(&[]));
    let mut reader = BitReader::new(&rbsp);

    // sps_video_parameter_set_id
    reader.skip_bits(4);
    let max_sub_layers_minus1 = reader.read_bits(3) as usize;
    let temporal_id_nesting = reader.read_bool();
    let profile = read_profile_tier_level(&mut reader, max_sub_layers_minus1);

    // sps_seq_parameter_set_id
    reader.skip_unsigned_exp_golomb();
    let chroma_format_idc = reader.read_unsigned_exp_golomb();
    if chroma_format_idc == 3 {
        // separate_colour_plane_flag
        reader.skip_bits(1);
    }
    let pic_width = reader.read_unsigned_exp_golomb() as u64;
    let pic_height = reader.read_unsigned_exp_golomb() as u64;

    let (mut conf_left, mut conf_right, mut conf_top, mut conf_bottom) = (0u64, 0u64, 0u64, 0u64);
    if reader.read_bool() {
        conf_left = reader.read_unsigned_exp_golomb() as u64;
        conf_right = reader.read_unsigned_exp_golomb() as u64;
        conf_top = reader.read_unsigned_exp_golomb() as u64;
        conf_bottom = reader.read_unsigned_exp_golomb() as u64;
    }
    let bit_depth_luma = 8 + reader.read_unsigned_exp_golomb().min(8) as u8;
    let bit_depth_chroma = 8 + reader.read_unsigned_exp_golomb().min(8) as u8;
    let log2_max_pic_order_cnt_lsb =
        reader.read_unsigned_exp_golomb().saturating_add(4).min(16) as usize;

    let sub_layer_ordering_info_present = reader.read_bool();
    let first = if sub_layer_ordering_info_present {
        0
    } else {
        max_sub_layers_minus1
    };
    for _ in first..=max_sub_layers_minus1 {
        // max_dec_pic_buffering_minus1, max_num_reorder_pics, max_latency_increase_plus1
        reader.skip_unsigned_exp_golomb();
        reader.skip_unsigned_exp_golomb();
        reader.skip_unsigned_exp_golomb();
    }

    // log2_min_luma_coding_block_size_minus3 .. max_transform_hierarchy_depth_intra
    for _ in 0..6 {
        reader.skip_unsigned_exp_golomb();
    }

    // scaling_list_enabled_flag, sps_scaling_list_data_present_flag
    if reader.read_bool() && reader.read_bool() {
        skip_scaling_list_data(&mut reader);
    }

    // amp_enabled_flag, sample_adaptive_offset_enabled_flag
    reader.skip_bits(2);
    // pcm_enabled_flag
    if reader.read_bool() {
        // pcm sample bit depths
        reader.skip_bits(8);
        reader.skip_unsigned_exp_golomb();
        reader.skip_unsigned_exp_golomb();
        // pcm_loop_filter_disabled_flag
        reader.skip_bits(1);
    }

    let num_short_term_ref_pic_sets = reader
        .read_unsigned_exp_golomb()
        .min(MAX_SHORT_TERM_REF_PIC_SETS);
    let mut num_delta_pocs: Vec<u32> = Vec::with_capacity(num_short_term_ref_pic_sets as usize);
    for idx in 0..num_short_term_ref_pic_sets as usize {
        let count = read_short_term_ref_pic_set(&mut reader, idx, &num_delta_pocs);
        num_delta_pocs.push(count);
    }

    // long_term_ref_pics_present_flag
    if reader.read_bool() {
        let num_long_term_ref_pics = reader.read_unsigned_exp_golomb().min(32);
        for _ in 0..num_long_term_ref_pics {
            // lt_ref_pic_poc_lsb_sps, used_by_curr_pic_lt_sps_flag
            reader.skip_bits(log2_max_pic_order_cnt_lsb);
            reader.skip_bits(1);
        }
    }
    // sps_temporal_mvp_enabled_flag, strong_intra_smoothing_enabled_flag
    reader.skip_bits(2);

    let mut fps = None;
    // vui_parameters_present_flag
    if reader.read_bool() {
        fps = read_vui_frame_rate(&mut reader);
    }

    let (sub_width_c, sub_height_c) = match chroma_format_idc {
        1 => (2, 2),
        2 => (2, 1),
        _ => (1, 1),
    };
    let width = pic_width.saturating_sub(sub_width_c * (conf_left + conf_right));
    let height = pic_height.saturating_sub(sub_height_c * (conf_top + conf_bottom));

    H265Sps {
        profile,
        max_sub_layers: max_sub_layers_minus1 as u8 + 1,
        temporal_id_nesting,
        chroma_format_idc,
        bit_depth_luma,
        bit_depth_chroma,
        width: width.min(u32::MAX as u64) as u32,
        height: height.min(u32::MAX as u64) as u32,
        fps,
    }
}

/// 7.3.3 with `profilePresentFlag` set.
fn read_profile_tier_level(reader: &mut BitReader, max_sub_layers_minus1: usize) -> HevcProfile {
    let profile_space = reader.read_bits(2) as u8;
    let tier_flag = reader.read_bool();
    let profile_idc = reader.read_bits(5) as u8;
    let profile_compatibility_flags = reader.read_u32();
    let mut constraint_indicator_flags = [0u8; 6];
    for byte in constraint_indicator_flags.iter_mut() {
        *byte = reader.read_u8();
    }
    let level_idc = reader.read_u8();

    let mut sub_layer_profile_present = [false; MAX_SUB_LAYERS];
    let mut sub_layer_level_present = [false; MAX_SUB_LAYERS];
    for i in 0..max_sub_layers_minus1 {
        sub_layer_profile_present[i] = reader.read_bool();
        sub_layer_level_present[i] = reader.read_bool();
    }
    if max_sub_layers_minus1 > 0 {
        // reserved_zero_2bits
        reader.skip_bits(2 * (MAX_SUB_LAYERS - max_sub_layers_minus1));
    }
    for i in 0..max_sub_layers_minus1 {
        if sub_layer_profile_present[i] {
            // profile space .. sub_layer_inbld_flag
            reader.skip_bits(88);
        }
        if sub_layer_level_present[i] {
            reader.skip_bits(8);
        }
    }

    HevcProfile {
        profile_space,
        tier_flag,
        profile_idc,
        profile_compatibility_flags,
        constraint_indicator_flags,
        level_idc,
    }
}

/// 7.3.4
fn skip_scaling_list_data(reader: &mut BitReader) {
    for size_id in 0..4 {
        let step = if size_id == 3 { 3 } else { 1 };
        for _ in (0..6).step_by(step) {
            // scaling_list_pred_mode_flag
            if !reader.read_bool() {
                // scaling_list_pred_matrix_id_delta
                reader.skip_unsigned_exp_golomb();
            } else {
                let coef_num = (1usize << (4 + (size_id << 1))).min(64);
                if size_id > 1 {
                    // scaling_list_dc_coef_minus8
                    reader.skip_unsigned_exp_golomb();
                }
                for _ in 0..coef_num {
                    // scaling_list_delta_coef
                    reader.skip_unsigned_exp_golomb();
                }
            }
        }
    }
}

/// 7.3.7, returning `NumDeltaPocs` of the parsed set.
fn read_short_term_ref_pic_set(reader: &mut BitReader, idx: usize, num_delta_pocs: &[u32]) -> u32 {
    let inter_ref_pic_set_prediction = idx != 0 && reader.read_bool();
    if inter_ref_pic_set_prediction {
        // delta_rps_sign, abs_delta_rps_minus1
        reader.skip_bits(1);
        reader.skip_unsigned_exp_golomb();
        // delta_idx_minus1 is only coded in slice headers, so RefRpsIdx is idx - 1.
        let reference = num_delta_pocs.get(idx - 1).copied().unwrap_or(0);
        let mut count = 0;
        for _ in 0..=reference {
            let used_by_curr_pic = reader.read_bool();
            let use_delta = used_by_curr_pic || reader.read_bool();
            if use_delta {
                count += 1;
            }
        }
        count
    } else {
        let num_negative_pics = reader.read_unsigned_exp_golomb().min(16);
        let num_positive_pics = reader.read_unsigned_exp_golomb().min(16);
        for _ in 0..num_negative_pics + num_positive_pics {
            // delta_poc_minus1, used_by_curr_pic_flag
            reader.skip_unsigned_exp_golomb();
            reader.skip_bits(1);
        }
        num_negative_pics + num_positive_pics
    }
}

/// E.2.1 up to the timing info; everything after it is irrelevant.
fn read_vui_frame_rate(reader: &mut BitReader) -> Option<f64> {
    // aspect_ratio_info_present_flag
    if reader.read_bool() && reader.read_u8() == 255 {
        // sar_width, sar_height
        reader.skip_bits(32);
    }
    // overscan_info_present_flag
    if reader.read_bool() {
        reader.skip_bits(1);
    }
    // video_signal_type_present_flag
    if reader.read_bool() {
        reader.skip_bits(4);
        if reader.read_bool() {
            reader.skip_bits(24);
        }
    }
    // chroma_loc_info_present_flag
    if reader.read_bool() {
        reader.skip_unsigned_exp_golomb();
        reader.skip_unsigned_exp_golomb();
    }
    // neutral_chroma_indication_flag, field_seq_flag, frame_field_info_present_flag
    reader.skip_bits(3);
    // default_display_window_flag
    if reader.read_bool() {
        for _ in 0..4 {
            reader.skip_unsigned_exp_golomb();
        }
    }
    // vui_timing_info_present_flag
    if !reader.read_bool() {
        return None;
    }
    let num_units_in_tick = reader.read_u32();
    let time_scale = reader.read_u32();
    (num_units_in_tick > 0 && time_scale > 0)
        .then(|| time_scale as f64 / num_units_in_tick as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Main profile, level 4.0, two sub-layers, 1920x1088 cropped to 1080,
    // scaling lists, inter-predicted short-term RPS, long-term refs and
    // 60000/1001 VUI timing.
    const MAIN_SPS: [u8; 108] = [
        66, 1, 3, 1, 96, 0, 0, 3, 0, 144, 0, 0, 3, 0, 0, 3, 0, 120, 192, 0, 0, 3, 0, 0, 3, 0, 0, 3,
        0, 0, 3, 0, 0, 3, 0, 0, 90, 160, 3, 192, 128, 17, 7, 203, 150, 92, 188, 146, 122, 170,
        211, 77, 52, 211, 77, 52, 211, 77, 52, 211, 77, 52, 211, 77, 52, 211, 77, 52, 211, 77, 52,
        211, 77, 52, 213, 88, 67, 255, 255, 255, 255, 255, 255, 255, 253, 85, 84, 71, 214, 253,
        39, 64, 191, 1, 106, 2, 2, 2, 8, 0, 0, 31, 72, 0, 7, 83, 0, 64,
    ];

    #[test]
    fn main_profile_sps() {
        let sps = read_sps(&MAIN_SPS);
        assert_eq!(sps.profile.profile_space, 0);
        assert!(!sps.profile.tier_flag);
        assert_eq!(sps.profile.profile_idc, 1);
        assert_eq!(sps.profile.profile_compatibility_flags, 0x6000_0000);
        assert_eq!(sps.profile.constraint_indicator_flags, [0x90, 0, 0, 0, 0, 0]);
        assert_eq!(sps.profile.level_idc, 120);
        assert_eq!(sps.max_sub_layers, 2);
        assert!(sps.temporal_id_nesting);
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!(sps.bit_depth_luma, 8);
        assert_eq!(sps.bit_depth_chroma, 8);
        assert_eq!(sps.width, 1920);
        assert_eq!(sps.height, 1080);
        let fps = sps.fps.unwrap_or_default();
        assert!((fps - 59.94).abs() < 0.01, "fps {fps}");
    }

    #[test]
    fn codec_strings() {
        let sps = read_sps(&MAIN_SPS);
        assert_eq!(sps.codec_string(), "hvc1.1.6.L120.90");

        let main10_high_tier = HevcProfile {
            profile_space: 0,
            tier_flag: true,
            profile_idc: 2,
            profile_compatibility_flags: 0x2000_0000,
            constraint_indicator_flags: [0xb0, 0, 0, 0, 0, 0],
            level_idc: 153,
        };
        assert_eq!(main10_high_tier.codec_string(), "hvc1.2.4.H153.b0");

        let bare = HevcProfile {
            profile_idc: 1,
            level_idc: 93,
            ..Default::default()
        };
        assert_eq!(bare.codec_string(), "hvc1.1.0.L93");
    }

    #[test]
    fn truncated_sps_does_not_panic() {
        for len in 0..MAIN_SPS.len() {
            let sps = read_sps(&MAIN_SPS[..len]);
            if len > 18 {
                assert_eq!(sps.profile.level_idc, 120);
            }
        }
    }
}
