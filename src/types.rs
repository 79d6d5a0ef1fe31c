use bytes::Bytes;

use crate::parser::h265::H265Sps;

/// Ticks per second used by every track.
pub const TIMESCALE: u32 = 1000;

/// Codec types supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Codec {
    /// H.264/AVC video coding NALU
    AVC,
    /// H.265/HEVC video coding NALU
    HEVC,
    /// AAC audio in ADTS framing
    AAC,
}

/// Track type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackType {
    /// Video track
    Video,
    /// Audio track
    Audio,
}

/// ISO BMFF `sample_flags` (14496-12 8.8.3.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleFlags {
    pub is_leading: u8,
    /// 2 when the sample depends on no other sample, 1 when it does.
    pub depends_on: u8,
    pub is_depended_on: u8,
    pub has_redundancy: u8,
    pub padding_value: u8,
    pub is_non_sync: bool,
    pub degradation_priority: u16,
}

impl SampleFlags {
    /// Sync sample: decodable on its own.
    pub fn keyframe() -> Self {
        Self {
            depends_on: 2,
            ..Default::default()
        }
    }

    /// Non-sync sample predicted from other samples.
    pub fn delta() -> Self {
        Self {
            depends_on: 1,
            is_non_sync: true,
            ..Default::default()
        }
    }

    pub fn audio() -> Self {
        Self {
            depends_on: 1,
            ..Default::default()
        }
    }

    /// `trun` encoding.
    pub fn to_u32(&self) -> u32 {
        ((self.is_leading as u32 & 0x03) << 26)
            | ((self.depends_on as u32 & 0x03) << 24)
            | ((self.is_depended_on as u32 & 0x03) << 22)
            | ((self.has_redundancy as u32 & 0x03) << 20)
            | ((self.padding_value as u32 & 0x07) << 17)
            | ((self.is_non_sync as u32) << 16)
            | self.degradation_priority as u32
    }

    /// `sdtp` encoding.
    pub fn to_sdtp(&self) -> u8 {
        ((self.is_leading & 0x03) << 6)
            | ((self.depends_on & 0x03) << 4)
            | ((self.is_depended_on & 0x03) << 2)
            | (self.has_redundancy & 0x03)
    }
}

/// Sample information structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    /// Size of the sample in the mdat payload
    pub size: u32,
    /// Duration of the sample
    pub duration: u32,
    /// Composition time offset
    pub cts: i32,
    pub flags: SampleFlags,
}

/// Track information structure
#[derive(Debug, Clone)]
pub struct Mp4Track {
    /// Track ID
    pub id: u32,
    /// Track type
    pub track_type: TrackType,
    /// Codec type
    pub codec: Codec,
    /// RFC 6381 codec string, empty until the track is configured
    pub codec_string: String,
    /// Time scale
    pub timescale: u32,
    /// Total duration of the track
    pub duration: u32,
    /// Width (video)
    pub width: u32,
    /// Height (video)
    pub height: u32,
    /// Frame rate (video)
    pub fps: Option<f64>,
    /// Sample rate (audio)
    pub sample_rate: u32,
    /// Number of channels (audio)
    pub channel_count: u32,
    /// VPS data (HEVC video)
    pub vps: Option<Bytes>,
    /// SPS data (video)
    pub sps: Option<Bytes>,
    /// PPS data (video)
    pub pps: Option<Bytes>,
    /// Parsed SPS fields used by `hvcC` (HEVC video)
    pub hevc: Option<H265Sps>,
    /// Audio specific configuration information
    pub dsi: Option<[u8; 2]>,
    /// Samples of the fragment being built
    pub samples: Vec<SampleInfo>,
}

impl Mp4Track {
    pub fn new(id: u32, codec: Codec, timescale: u32, duration: u32) -> Self {
        let track_type = match codec {
            Codec::AVC | Codec::HEVC => TrackType::Video,
            Codec::AAC => TrackType::Audio,
        };
        Self {
            id,
            track_type,
            codec,
            codec_string: String::new(),
            timescale,
            duration,
            width: 0,
            height: 0,
            fps: None,
            sample_rate: 0,
            channel_count: 0,
            vps: None,
            sps: None,
            pps: None,
            hevc: None,
            dsi: None,
            samples: Vec::new(),
        }
    }

    /// Forgets everything learnt from parameter sets and headers.
    pub fn clear_config(&mut self) {
        let fresh = Self::new(self.id, self.codec, self.timescale, self.duration);
        *self = fresh;
    }

    /// `tkhd` volume in 8.8 fixed point.
    pub fn volume(&self) -> u16 {
        match self.track_type {
            TrackType::Video => 0,
            TrackType::Audio => 0x0100,
        }
    }
}
