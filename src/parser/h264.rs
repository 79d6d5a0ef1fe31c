//! H.264 sequence parameter set reader (ITU-T H.264 7.3.2.1.1).

use crate::util::{BitReader, remove_emulation_prevention};

/// Profiles that carry chroma format, bit depth and scaling matrices.
const HIGH_PROFILES: [u8; 9] = [100, 110, 122, 244, 44, 83, 86, 118, 128];

/// Sample aspect ratios for `aspect_ratio_idc` 1..=16 (Table E-1).
const SAR_TABLE: [(u16, u16); 16] = [
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

const EXTENDED_SAR: u8 = 255;

/// Fields of an H.264 SPS that matter for remuxing.
#[derive(Debug, Clone, PartialEq)]
pub struct H264Sps {
    pub profile_idc: u8,
    /// `constraint_set0..5_flag` and the two reserved bits, as in byte 2
    /// of the NAL unit.
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    pub chroma_format_idc: u32,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    pub pic_order_cnt_type: u32,
    pub max_num_ref_frames: u32,
    pub frame_mbs_only: bool,
    /// Cropped luma width, before aspect-ratio scaling.
    pub coded_width: u32,
    pub coded_height: u32,
    pub sar: Option<(u16, u16)>,
    /// `time_scale / (2 * num_units_in_tick)` when VUI timing is present.
    pub fps: Option<f64>,
}

impl H264Sps {
    /// Display width: the cropped width stretched by the sample aspect ratio.
    pub fn width(&self) -> u32 {
        match self.sar {
            Some((num, den)) if num > 0 && den > 0 => {
                (self.coded_width as f64 * num as f64 / den as f64).ceil() as u32
            }
            _ => self.coded_width,
        }
    }

    pub fn height(&self) -> u32 {
        self.coded_height
    }

    /// RFC 6381 codec string, e.g. `avc1.42c01e`.
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02x}{:02x}{:02x}",
            self.profile_idc, self.constraint_flags, self.level_idc
        )
    }
}

/// Parses an SPS NAL unit, header byte included.
///
/// Truncated input never fails; missing fields read as zero.
pub fn read_sps(nal: &[u8]) -> H264Sps {
    let rbsp = remove_emulation_prevention(nal.get(1..).unwrap_or(&[]));
    let mut reader = BitReader::new(&rbsp);

    let profile_idc = reader.read_u8();
    let constraint_flags = reader.read_u8();
    let level_idc = reader.read_u8();
    let seq_parameter_set_id = reader.read_unsigned_exp_golomb();

    let mut chroma_format_idc = 1;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;
    if HIGH_PROFILES.contains(&profile_idc) {
        chroma_format_idc = reader.read_unsigned_exp_golomb();
        if chroma_format_idc == 3 {
            // separate_colour_plane_flag
            reader.skip_bits(1);
        }
        bit_depth_luma = 8 + reader.read_unsigned_exp_golomb().min(8) as u8;
        bit_depth_chroma = 8 + reader.read_unsigned_exp_golomb().min(8) as u8;
        // qpprime_y_zero_transform_bypass_flag
        reader.skip_bits(1);
        if reader.read_bool() {
            let list_count = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..list_count {
                if reader.read_bool() {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 });
                }
            }
        }
    }

    // log2_max_frame_num_minus4
    reader.skip_unsigned_exp_golomb();
    let pic_order_cnt_type = reader.read_unsigned_exp_golomb();
    if pic_order_cnt_type == 0 {
        // log2_max_pic_order_cnt_lsb_minus4
        reader.skip_unsigned_exp_golomb();
    } else if pic_order_cnt_type == 1 {
        // delta_pic_order_always_zero_flag
        reader.skip_bits(1);
        // offset_for_non_ref_pic, offset_for_top_to_bottom_field
        reader.skip_unsigned_exp_golomb();
        reader.skip_unsigned_exp_golomb();
        let cycle = reader.read_unsigned_exp_golomb();
        for _ in 0..cycle.min(255) {
            reader.skip_unsigned_exp_golomb();
        }
    }
    let max_num_ref_frames = reader.read_unsigned_exp_golomb();
    // gaps_in_frame_num_value_allowed_flag
    reader.skip_bits(1);

    let pic_width_in_mbs = reader.read_unsigned_exp_golomb() as u64 + 1;
    let pic_height_in_map_units = reader.read_unsigned_exp_golomb() as u64 + 1;
    let frame_mbs_only = reader.read_bool();
    if !frame_mbs_only {
        // mb_adaptive_frame_field_flag
        reader.skip_bits(1);
    }
    // direct_8x8_inference_flag
    reader.skip_bits(1);

    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0u64, 0u64, 0u64, 0u64);
    if reader.read_bool() {
        crop_left = reader.read_unsigned_exp_golomb() as u64;
        crop_right = reader.read_unsigned_exp_golomb() as u64;
        crop_top = reader.read_unsigned_exp_golomb() as u64;
        crop_bottom = reader.read_unsigned_exp_golomb() as u64;
    }

    let mut sar = None;
    let mut fps = None;
    if reader.read_bool() {
        read_vui(&mut reader, &mut sar, &mut fps);
    }

    // CropUnitX / CropUnitY (7-19, 7-20)
    let (sub_width_c, sub_height_c) = match chroma_format_idc {
        1 => (2, 2),
        2 => (2, 1),
        _ => (1, 1),
    };
    let (crop_unit_x, crop_unit_y) = if chroma_format_idc == 0 {
        (1, 2 - frame_mbs_only as u64)
    } else {
        (sub_width_c, sub_height_c * (2 - frame_mbs_only as u64))
    };
    let width = (pic_width_in_mbs * 16).saturating_sub(crop_unit_x * (crop_left + crop_right));
    let height = ((2 - frame_mbs_only as u64) * pic_height_in_map_units * 16)
        .saturating_sub(crop_unit_y * (crop_top + crop_bottom));

    H264Sps {
        profile_idc,
        constraint_flags,
        level_idc,
        seq_parameter_set_id,
        chroma_format_idc,
        bit_depth_luma,
        bit_depth_chroma,
        pic_order_cnt_type,
        max_num_ref_frames,
        frame_mbs_only,
        coded_width: width.min(u32::MAX as u64) as u32,
        coded_height: height.min(u32::MAX as u64) as u32,
        sar,
        fps,
    }
}

fn read_vui(reader: &mut BitReader, sar: &mut Option<(u16, u16)>, fps: &mut Option<f64>) {
    // aspect_ratio_info_present_flag
    if reader.read_bool() {
        let aspect_ratio_idc = reader.read_u8();
        *sar = match aspect_ratio_idc {
            1..=16 => Some(SAR_TABLE[aspect_ratio_idc as usize - 1]),
            EXTENDED_SAR => Some((reader.read_u16(), reader.read_u16())),
            _ => None,
        };
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
    // timing_info_present_flag
    if reader.read_bool() {
        let num_units_in_tick = reader.read_u32();
        let time_scale = reader.read_u32();
        // fixed_frame_rate_flag
        reader.skip_bits(1);
        if num_units_in_tick > 0 && time_scale > 0 {
            *fps = Some(time_scale as f64 / (2.0 * num_units_in_tick as f64));
        }
    }
}

/// 7.3.2.1.1.1; the values are irrelevant for remuxing.
fn skip_scaling_list(reader: &mut BitReader, count: usize) {
    let mut last_scale: i32 = 8;
    let mut next_scale: i32 = 8;
    for _ in 0..count {
        if next_scale != 0 {
            let delta_scale = reader.read_signed_exp_golomb();
            next_scale = (last_scale + delta_scale + 256).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
}
