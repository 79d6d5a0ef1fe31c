use bytes::Bytes;
use std::fmt;

use crate::util::{BitReader, remove_emulation_prevention};

/// AVC NALU types
pub const AVC_NALU_TYPE_NDR: u8 = 1;
pub const AVC_NALU_TYPE_PARTITION_A: u8 = 2;
pub const AVC_NALU_TYPE_IDR: u8 = 5;
pub const AVC_NALU_TYPE_SEI: u8 = 6;
pub const AVC_NALU_TYPE_SPS: u8 = 7;
pub const AVC_NALU_TYPE_PPS: u8 = 8;
pub const AVC_NALU_TYPE_AUD: u8 = 9;

/// HEVC NALU types
pub const HEVC_NALU_TYPE_IDR_W_RADL: u8 = 19;
pub const HEVC_NALU_TYPE_IDR_N_LP: u8 = 20;
pub const HEVC_NALU_TYPE_CRA: u8 = 21;
pub const HEVC_NALU_TYPE_VPS: u8 = 32;
pub const HEVC_NALU_TYPE_SPS: u8 = 33;
pub const HEVC_NALU_TYPE_PPS: u8 = 34;
pub const HEVC_NALU_TYPE_AUD: u8 = 35;
pub const HEVC_NALU_TYPE_SEI_PREFIX: u8 = 39;
pub const HEVC_NALU_TYPE_SEI_SUFFIX: u8 = 40;

/// Slice headers only need their first few fields.
const SLICE_HEADER_PREFIX: usize = 16;

/// Splits an Annex-B buffer into NAL units.
///
/// Returns every unit that is terminated by a start code, without the start
/// code, and the bytes after the last start code as the remainder. The
/// remainder has to be prepended to the next chunk before scanning it: a
/// unit is only known to be complete once the next start code shows up.
/// A start code at the very end of the buffer leaves no remainder.
///
/// # Examples
///
/// ```
/// use mp4remux::nalu::extract_nal_units;
///
/// let data = [0, 0, 0, 1, 10, 20, 30, 0, 0, 1, 40, 50, 0, 0, 0, 1, 60, 70];
/// let (units, remainder) = extract_nal_units(&data);
/// assert_eq!(units, vec![&[10, 20, 30][..], &[40, 50][..]]);
/// assert_eq!(remainder, Some(&[60, 70][..]));
/// ```
pub fn extract_nal_units(buffer: &[u8]) -> (Vec<&[u8]>, Option<&[u8]>) {
    let mut units = Vec::new();
    let mut last_index = 0;
    let mut zero_count = 0;

    for (i, &value) in buffer.iter().enumerate() {
        if value == 0 {
            zero_count += 1;
        } else if value == 1 && zero_count >= 2 {
            let start_code_begin = i - zero_count;
            if start_code_begin > last_index {
                units.push(&buffer[last_index..start_code_begin]);
            }
            last_index = i + 1;
            zero_count = 0;
        } else {
            zero_count = 0;
        }
    }

    let remainder = (last_index < buffer.len()).then(|| &buffer[last_index..]);
    (units, remainder)
}

/// Common view over H.264 and H.265 units used by frame assembly.
pub trait NalUnit: fmt::Display {
    /// Payload without start code, header included.
    fn data(&self) -> &Bytes;

    fn nal_type(&self) -> u8;

    /// Coded-slice unit.
    fn is_vcl(&self) -> bool;

    fn is_keyframe(&self) -> bool;

    /// First slice of a new picture. Always `false` for non-VCL units.
    fn is_first_slice(&self) -> bool;

    /// Size once rewritten with a 4-byte length prefix.
    fn size(&self) -> usize {
        4 + self.data().len()
    }
}

/// Leading fields of an H.264 slice header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H264SliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: u32,
}

/// H.264 NAL unit with its header fields decoded at construction.
#[derive(Debug, Clone)]
pub struct H264Nalu {
    data: Bytes,
    nal_ref_idc: u8,
    nal_unit_type: u8,
    slice_header: Option<H264SliceHeader>,
}

impl H264Nalu {
    pub fn new(data: Bytes) -> Self {
        let header = data.first().copied().unwrap_or(0);
        let nal_unit_type = header & 0x1f;
        let slice_header = matches!(
            nal_unit_type,
            AVC_NALU_TYPE_NDR | AVC_NALU_TYPE_PARTITION_A | AVC_NALU_TYPE_IDR
        )
        .then(|| {
            let end = data.len().min(1 + SLICE_HEADER_PREFIX);
            let rbsp = remove_emulation_prevention(data.get(1..end).unwrap_or(&[]));
            let mut reader = BitReader::new(&rbsp);
            H264SliceHeader {
                first_mb_in_slice: reader.read_unsigned_exp_golomb(),
                slice_type: reader.read_unsigned_exp_golomb(),
            }
        });
        Self {
            nal_ref_idc: (header & 0x60) >> 5,
            nal_unit_type,
            slice_header,
            data,
        }
    }

    pub fn nal_ref_idc(&self) -> u8 {
        self.nal_ref_idc
    }

    pub fn slice_header(&self) -> Option<&H264SliceHeader> {
        self.slice_header.as_ref()
    }
}

impl From<Bytes> for H264Nalu {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl NalUnit for H264Nalu {
    fn data(&self) -> &Bytes {
        &self.data
    }

    fn nal_type(&self) -> u8 {
        self.nal_unit_type
    }

    fn is_vcl(&self) -> bool {
        (AVC_NALU_TYPE_NDR..=AVC_NALU_TYPE_IDR).contains(&self.nal_unit_type)
    }

    fn is_keyframe(&self) -> bool {
        self.nal_unit_type == AVC_NALU_TYPE_IDR
    }

    fn is_first_slice(&self) -> bool {
        self.slice_header
            .is_some_and(|header| header.first_mb_in_slice == 0)
    }
}

impl fmt::Display for H264Nalu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.nal_unit_type {
            AVC_NALU_TYPE_NDR => "NDR",
            AVC_NALU_TYPE_IDR => "IDR",
            AVC_NALU_TYPE_SEI => "SEI",
            AVC_NALU_TYPE_SPS => "SPS",
            AVC_NALU_TYPE_PPS => "PPS",
            AVC_NALU_TYPE_AUD => "AUD",
            _ => "UNKNOWN",
        };
        write!(f, "{name}: NRI: {}", self.nal_ref_idc)
    }
}

/// Leading fields of an H.265 slice segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H265SliceHeader {
    pub first_slice_segment_in_pic: bool,
    pub pps_id: u32,
}

/// H.265 NAL unit with its 2-byte header decoded at construction.
#[derive(Debug, Clone)]
pub struct H265Nalu {
    data: Bytes,
    nal_unit_type: u8,
    nuh_layer_id: u8,
    nuh_temporal_id_plus1: u8,
    slice_header: Option<H265SliceHeader>,
}

impl H265Nalu {
    pub fn new(data: Bytes) -> Self {
        let b0 = data.first().copied().unwrap_or(0);
        let b1 = data.get(1).copied().unwrap_or(0);
        let nal_unit_type = (b0 >> 1) & 0x3f;
        let slice_header = (nal_unit_type <= 31).then(|| {
            let end = data.len().min(2 + SLICE_HEADER_PREFIX);
            let rbsp = remove_emulation_prevention(data.get(2..end).unwrap_or(&[]));
            let mut reader = BitReader::new(&rbsp);
            let first_slice_segment_in_pic = reader.read_bool();
            if (16..=23).contains(&nal_unit_type) {
                // no_output_of_prior_pics_flag
                reader.skip_bits(1);
            }
            H265SliceHeader {
                first_slice_segment_in_pic,
                pps_id: reader.read_unsigned_exp_golomb(),
            }
        });
        Self {
            nal_unit_type,
            nuh_layer_id: ((b0 & 0x01) << 5) | (b1 >> 3),
            nuh_temporal_id_plus1: b1 & 0x07,
            slice_header,
            data,
        }
    }

    pub fn nuh_layer_id(&self) -> u8 {
        self.nuh_layer_id
    }

    pub fn nuh_temporal_id_plus1(&self) -> u8 {
        self.nuh_temporal_id_plus1
    }

    pub fn slice_header(&self) -> Option<&H265SliceHeader> {
        self.slice_header.as_ref()
    }
}

impl From<Bytes> for H265Nalu {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl NalUnit for H265Nalu {
    fn data(&self) -> &Bytes {
        &self.data
    }

    fn nal_type(&self) -> u8 {
        self.nal_unit_type
    }

    fn is_vcl(&self) -> bool {
        self.nal_unit_type <= 31
    }

    fn is_keyframe(&self) -> bool {
        matches!(
            self.nal_unit_type,
            HEVC_NALU_TYPE_IDR_W_RADL | HEVC_NALU_TYPE_IDR_N_LP | HEVC_NALU_TYPE_CRA
        )
    }

    fn is_first_slice(&self) -> bool {
        self.slice_header
            .is_some_and(|header| header.first_slice_segment_in_pic)
    }
}

impl fmt::Display for H265Nalu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.nal_unit_type {
            0..=9 => "TRAIL/TSA/STSA/RADL/RASL",
            16..=18 => "BLA",
            HEVC_NALU_TYPE_IDR_W_RADL | HEVC_NALU_TYPE_IDR_N_LP => "IDR",
            HEVC_NALU_TYPE_CRA => "CRA",
            HEVC_NALU_TYPE_VPS => "VPS",
            HEVC_NALU_TYPE_SPS => "SPS",
            HEVC_NALU_TYPE_PPS => "PPS",
            HEVC_NALU_TYPE_AUD => "AUD",
            HEVC_NALU_TYPE_SEI_PREFIX | HEVC_NALU_TYPE_SEI_SUFFIX => "SEI",
            _ => "UNKNOWN",
        };
        write!(
            f,
            "{name} ({}): Layer: {}, Temporal Id: {}",
            self.nal_unit_type, self.nuh_layer_id, self.nuh_temporal_id_plus1
        )
    }
}
