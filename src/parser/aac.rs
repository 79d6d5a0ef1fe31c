//! ADTS framing for raw AAC streams.

use crate::util::sample_rate_from_index;

/// Header size without CRC.
pub const ADTS_HEADER_LENGTH: usize = 7;

/// Header size with CRC.
pub const ADTS_HEADER_LENGTH_CRC: usize = 9;

/// Syncword `0xFFF` with layer bits `00`.
pub fn is_aac_pattern(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xff && (data[1] & 0xf0) == 0xf0 && (data[1] & 0x06) == 0x00
}

/// 7 when `protection_absent` is set, 9 otherwise.
pub fn header_length(data: &[u8]) -> usize {
    if data.get(1).is_some_and(|b| b & 0x01 == 0x01) {
        ADTS_HEADER_LENGTH
    } else {
        ADTS_HEADER_LENGTH_CRC
    }
}

/// 13-bit `aac_frame_length`, header included.
pub fn frame_length(data: &[u8]) -> usize {
    if data.len() < 6 {
        return 0;
    }
    (((data[3] & 0x03) as usize) << 11)
        | ((data[4] as usize) << 3)
        | ((data[5] & 0xe0) as usize >> 5)
}

/// `data` is short of a full header but matches the sync bits it has.
pub fn is_partial_header(data: &[u8]) -> bool {
    match data.len() {
        0 => false,
        1 => data[0] == 0xff,
        _ => is_aac_pattern(data),
    }
}

/// Stream parameters carried by every ADTS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// MPEG-4 audio object type (`profile + 1`).
    pub object_type: u8,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
}

impl AdtsHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if !is_aac_pattern(data) || data.len() < 4 {
            return None;
        }
        Some(Self {
            object_type: ((data[2] & 0xc0) >> 6) + 1,
            sampling_frequency_index: (data[2] & 0x3c) >> 2,
            channel_configuration: ((data[2] & 0x01) << 2) | ((data[3] & 0xc0) >> 6),
        })
    }

    /// Sample rate in Hz, 0 for reserved indexes.
    pub fn sample_rate(&self) -> u32 {
        sample_rate_from_index(self.sampling_frequency_index).unwrap_or(0)
    }

    /// 2-byte AudioSpecificConfig for `esds`.
    pub fn audio_specific_config(&self) -> [u8; 2] {
        [
            (self.object_type << 3) | ((self.sampling_frequency_index & 0x0e) >> 1),
            ((self.sampling_frequency_index & 0x01) << 7) | (self.channel_configuration << 3),
        ]
    }

    pub fn codec_string(&self) -> String {
        format!("mp4a.40.{}", self.object_type)
    }
}

/// Result of splitting an ADTS buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdtsFrames<'a> {
    /// Header of the first frame.
    pub header: AdtsHeader,
    /// Raw AAC payloads, headers stripped.
    pub frames: Vec<&'a [u8]>,
    /// Trailing incomplete frame, to be prepended to the next chunk.
    pub remainder: Option<&'a [u8]>,
}

/// Splits a buffer of back-to-back ADTS frames.
///
/// Returns `None` when the buffer does not start with an ADTS header. A
/// frame cut off at the end of the buffer becomes the remainder; a broken
/// header in the middle ends the scan.
pub fn extract_aac(buffer: &[u8]) -> Option<AdtsFrames<'_>> {
    let header = AdtsHeader::parse(buffer)?;
    let mut frames = Vec::new();
    let mut remainder = None;
    let mut offset = 0;

    while offset < buffer.len() {
        let rest = &buffer[offset..];
        if rest.len() < ADTS_HEADER_LENGTH {
            remainder = Some(rest);
            break;
        }
        if !is_aac_pattern(rest) {
            tracing::warn!(offset, "lost ADTS sync, dropping the rest of the chunk");
            break;
        }
        let header_len = header_length(rest);
        let frame_len = frame_length(rest);
        if frame_len < header_len {
            tracing::warn!(offset, frame_len, "invalid ADTS frame length");
            break;
        }
        if frame_len > rest.len() {
            remainder = Some(rest);
            break;
        }
        frames.push(&rest[header_len..frame_len]);
        offset += frame_len;
    }

    Some(AdtsFrames {
        header,
        frames,
        remainder,
    })
}
