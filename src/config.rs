use crate::error::Error;
use crate::types::TIMESCALE;
use std::fmt;

const DEFAULT_FPS: f64 = 30.0;

/// Which tracks the controller creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TrackMode {
    Video,
    Audio,
    #[default]
    Both,
}

impl TrackMode {
    pub fn has_video(self) -> bool {
        matches!(self, TrackMode::Video | TrackMode::Both)
    }

    pub fn has_audio(self) -> bool {
        matches!(self, TrackMode::Audio | TrackMode::Both)
    }
}

impl fmt::Display for TrackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackMode::Video => write!(f, "video"),
            TrackMode::Audio => write!(f, "audio"),
            TrackMode::Both => write!(f, "both"),
        }
    }
}

impl std::str::FromStr for TrackMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" => Ok(TrackMode::Video),
            "audio" => Ok(TrackMode::Audio),
            "both" => Ok(TrackMode::Both),
            _ => Err(Error::invalid_config(format!("unknown track mode: {s}"))),
        }
    }
}

/// Elementary video stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum VideoCodec {
    /// Annex-B H.264/AVC.
    #[default]
    H264,
    /// Annex-B H.265/HEVC.
    H265,
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "H264"),
            VideoCodec::H265 => write!(f, "H265"),
        }
    }
}

impl std::str::FromStr for VideoCodec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "h264" | "h.264" | "avc" => Ok(VideoCodec::H264),
            "h265" | "h.265" | "hevc" => Ok(VideoCodec::H265),
            _ => Err(Error::invalid_config(format!("unknown video codec: {s}"))),
        }
    }
}

/// How init segments are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum SinkLayout {
    /// One `ftyp` + `moov` describing every track.
    #[default]
    Combined,
    /// One init segment per track, as separate source buffers expect.
    PerTrack,
}

/// Controller settings.
///
/// ```
/// use mp4remux::{RemuxConfig, VideoCodec};
///
/// let config = RemuxConfig::default()
///     .with_video_codec("h265".parse().unwrap())
///     .with_fps(25.0);
/// assert_eq!(config.video_codec, VideoCodec::H265);
/// assert_eq!(config.frame_duration(), 40);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct RemuxConfig {
    pub mode: TrackMode,
    pub video_codec: VideoCodec,
    /// Fallback frame rate when a chunk carries no duration.
    pub fps: f64,
    /// Unbounded media duration for live streams.
    pub live: bool,
    pub sink: SinkLayout,
    /// Prefer the SPS frame rate over `fps` once known.
    pub read_fps_from_track: bool,
}

impl Default for RemuxConfig {
    fn default() -> Self {
        Self {
            mode: TrackMode::Both,
            video_codec: VideoCodec::H264,
            fps: DEFAULT_FPS,
            live: false,
            sink: SinkLayout::Combined,
            read_fps_from_track: false,
        }
    }
}

impl RemuxConfig {
    pub fn with_mode(mut self, mode: TrackMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_video_codec(mut self, video_codec: VideoCodec) -> Self {
        self.video_codec = video_codec;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    pub fn with_sink(mut self, sink: SinkLayout) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_read_fps_from_track(mut self, read_fps_from_track: bool) -> Self {
        self.read_fps_from_track = read_fps_from_track;
        self
    }

    /// Configured frame rate, non-positive and non-finite values replaced by 30.
    pub fn effective_fps(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            DEFAULT_FPS
        }
    }

    /// Fallback duration of one video frame in ticks.
    pub fn frame_duration(&self) -> u32 {
        ((TIMESCALE as f64 / self.effective_fps()) as u32).max(1)
    }

    /// Duration written to `mvhd`/`mdhd`.
    pub fn media_duration(&self) -> u32 {
        if self.live { 0xffff_ffff } else { 0 }
    }
}
