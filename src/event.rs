//! Controller input and output types.

use bytes::Bytes;
use std::fmt;

/// Which source buffer a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BufferKind {
    Video,
    Audio,
    /// Combined init segment describing every track.
    All,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BufferKind::Video => "video",
            BufferKind::Audio => "audio",
            BufferKind::All => "all",
        })
    }
}

/// A complete box tree: an init segment or a `moof` + `mdat` fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferEvent {
    pub kind: BufferKind,
    pub payload: Bytes,
    /// Decode time of the first sample, in track ticks. 0 for init segments.
    pub dts: u64,
    /// Frame rate of the video track.
    pub fps: Option<f64>,
}

/// Notifications produced while remuxing, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum RemuxEvent {
    /// Every track is configured; init segments follow.
    Ready,
    Buffer(BufferEvent),
    /// Presentation position of a keyframe, in seconds.
    KeyframePosition(f64),
    /// A video chunk yielded no NAL units.
    MissingVideoFrames,
    /// An audio chunk yielded no ADTS frames.
    MissingAudioFrames,
}

/// One call's worth of elementary stream data.
///
/// ```
/// use mp4remux::FeedInput;
///
/// let input = FeedInput::video(&[0, 0, 0, 1, 0x09, 0xf0]).with_duration(40);
/// assert_eq!(input.duration, Some(40));
/// assert!(input.audio.is_none());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedInput<'a> {
    /// Annex-B H.264 or H.265 bytes.
    pub video: Option<&'a [u8]>,
    /// ADTS AAC bytes.
    pub audio: Option<&'a [u8]>,
    /// Total duration of the chunk in ticks, split across its frames.
    pub duration: Option<u32>,
    pub composition_time_offset: i32,
}

impl<'a> FeedInput<'a> {
    pub fn video(data: &'a [u8]) -> Self {
        Self {
            video: Some(data),
            ..Default::default()
        }
    }

    pub fn audio(data: &'a [u8]) -> Self {
        Self {
            audio: Some(data),
            ..Default::default()
        }
    }

    pub fn with_video(mut self, data: &'a [u8]) -> Self {
        self.video = Some(data);
        self
    }

    pub fn with_audio(mut self, data: &'a [u8]) -> Self {
        self.audio = Some(data);
        self
    }

    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_composition_time_offset(mut self, offset: i32) -> Self {
        self.composition_time_offset = offset;
        self
    }
}
