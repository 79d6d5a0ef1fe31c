//! Orchestration of the per-track remuxers into an fMP4 stream.

use std::collections::VecDeque;

use tracing::{debug, error, trace};

use crate::boxes;
use crate::config::{RemuxConfig, SinkLayout, TrackMode, VideoCodec};
use crate::error::Result;
use crate::event::{BufferEvent, BufferKind, FeedInput, RemuxEvent};
use crate::remuxer::{AacRemuxer, H264Remuxer, H265Remuxer, Remuxer};
use crate::types::{Mp4Track, TIMESCALE};
use crate::util::sec_to_time;

/// Hands out track IDs, starting at 1, never reusing one.
#[derive(Debug, Clone)]
pub struct TrackIdAllocator {
    next: u32,
}

impl Default for TrackIdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl TrackIdAllocator {
    pub fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Feeds elementary streams to the track remuxers and turns their output
/// into init segments and `moof` + `mdat` fragments.
///
/// Output is queued as [`RemuxEvent`]s and drained with
/// [`poll_event`](Self::poll_event) or [`drain_events`](Self::drain_events).
///
/// ```
/// use mp4remux::{FeedInput, RemuxConfig, RemuxController, RemuxEvent, TrackMode};
///
/// let config = RemuxConfig::default().with_mode(TrackMode::Video);
/// let mut controller = RemuxController::with_tracks(config);
///
/// // No parameter sets yet: nothing is ready.
/// let idr = [0, 0, 0, 1, 0x65, 0x88, 0x84, 0, 0, 0, 1];
/// controller.feed(FeedInput::video(&idr).with_duration(33))?;
/// assert!(!controller.is_initialized());
/// assert!(controller.drain_events().all(|event| !matches!(event, RemuxEvent::Buffer(_))));
/// # Ok::<(), mp4remux::Error>(())
/// ```
#[derive(Debug)]
pub struct RemuxController {
    config: RemuxConfig,
    video: Option<Box<dyn Remuxer>>,
    audio: Option<Box<dyn Remuxer>>,
    track_ids: TrackIdAllocator,
    initialized: bool,
    sequence_number: u32,
    media_duration: u32,
    events: VecDeque<RemuxEvent>,
}

impl RemuxController {
    pub fn new(config: RemuxConfig) -> Self {
        let media_duration = config.media_duration();
        Self {
            config,
            video: None,
            audio: None,
            track_ids: TrackIdAllocator::default(),
            initialized: false,
            sequence_number: 1,
            media_duration,
            events: VecDeque::new(),
        }
    }

    /// Controller with one track per stream named by `config.mode`.
    pub fn with_tracks(config: RemuxConfig) -> Self {
        let mode = config.mode;
        let mut controller = Self::new(config);
        controller.add_track(mode);
        controller
    }

    pub fn config(&self) -> &RemuxConfig {
        &self.config
    }

    /// Creates the remuxers `mode` names, replacing existing ones.
    pub fn add_track(&mut self, mode: TrackMode) {
        if mode.has_video() {
            let id = self.track_ids.allocate();
            let fps = self.config.effective_fps();
            let read_fps = self.config.read_fps_from_track;
            let remuxer: Box<dyn Remuxer> = match self.config.video_codec {
                VideoCodec::H264 => {
                    Box::new(H264Remuxer::new(id, self.media_duration, fps, read_fps))
                }
                VideoCodec::H265 => {
                    Box::new(H265Remuxer::new(id, self.media_duration, fps, read_fps))
                }
            };
            debug!(id, codec = %self.config.video_codec, "added video track");
            self.video = Some(remuxer);
        }
        if mode.has_audio() {
            let id = self.track_ids.allocate();
            debug!(id, "added audio track");
            self.audio = Some(Box::new(AacRemuxer::new(id, self.media_duration)));
        }
    }

    pub fn video_track(&self) -> Option<&Mp4Track> {
        self.video.as_deref().map(|remuxer| remuxer.track())
    }

    pub fn audio_track(&self) -> Option<&Mp4Track> {
        self.audio.as_deref().map(|remuxer| remuxer.track())
    }

    /// Remuxes one chunk of video and/or audio, then flushes.
    ///
    /// Audio is withheld while a video track exists that has not seen its
    /// parameter sets, so both tracks start together.
    pub fn feed(&mut self, input: FeedInput<'_>) -> Result<()> {
        let duration = input.duration.filter(|&duration| duration > 0);
        let cts = input.composition_time_offset;
        let mut remuxed = false;
        let mut withheld = false;

        if let (Some(data), Some(video)) = (input.video, self.video.as_mut()) {
            remuxed |= video.feed(data, duration, cts, &mut self.events);
        }
        if let (Some(data), Some(audio)) = (input.audio, self.audio.as_mut()) {
            let video_pending = self
                .video
                .as_ref()
                .is_some_and(|video| !video.is_ready_to_decode());
            if video_pending {
                trace!(len = data.len(), "withholding audio until video is configured");
                withheld = true;
            } else {
                remuxed |= audio.feed(data, duration, cts, &mut self.events);
            }
        }

        if !remuxed {
            if withheld {
                debug!("no video configured yet, nothing to flush");
            } else {
                error!("input must have video and/or audio data");
            }
            return Ok(());
        }
        self.flush()
    }

    /// Emits the init segment once every track is ready, then one fragment
    /// per track with pending samples.
    pub fn flush(&mut self) -> Result<()> {
        if !self.initialized {
            if !self.is_ready() {
                return Ok(());
            }
            self.events.push_back(RemuxEvent::Ready);
            self.emit_init_segments()?;
            self.initialized = true;
        }

        if let Some(video) = self.video.as_deref_mut() {
            Self::emit_fragment(
                BufferKind::Video,
                video,
                &mut self.sequence_number,
                &mut self.events,
            )?;
        }
        if let Some(audio) = self.audio.as_deref_mut() {
            Self::emit_fragment(
                BufferKind::Audio,
                audio,
                &mut self.sequence_number,
                &mut self.events,
            )?;
        }
        Ok(())
    }

    /// End of stream: buffered partial input is treated as complete and
    /// flushed.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(video) = self.video.as_deref_mut() {
            video.finish(&mut self.events);
        }
        if let Some(audio) = self.audio.as_deref_mut() {
            audio.finish(&mut self.events);
        }
        self.flush()
    }

    /// Back to the unconfigured state; the next ready flush emits a fresh
    /// init segment.
    pub fn reset(&mut self) {
        for remuxer in [self.video.as_deref_mut(), self.audio.as_deref_mut()]
            .into_iter()
            .flatten()
        {
            remuxer.reset();
        }
        self.initialized = false;
        debug!("controller reset");
    }

    /// Drops every track and queued event.
    pub fn destroy(&mut self) {
        self.video = None;
        self.audio = None;
        self.events.clear();
        self.initialized = false;
    }

    /// At least one track, and every track configured with samples queued.
    pub fn is_ready(&self) -> bool {
        let mut tracks = [self.video.as_deref(), self.audio.as_deref()]
            .into_iter()
            .flatten()
            .peekable();
        tracks.peek().is_some() && tracks.all(|remuxer| remuxer.is_ready())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn poll_event(&mut self) -> Option<RemuxEvent> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = RemuxEvent> + '_ {
        self.events.drain(..)
    }

    fn emit_init_segments(&mut self) -> Result<()> {
        let tracks: Vec<(BufferKind, &Mp4Track)> = [
            (BufferKind::Video, self.video.as_deref()),
            (BufferKind::Audio, self.audio.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, remuxer)| remuxer.map(|remuxer| (kind, remuxer.track())))
        .collect();

        let mut segments = Vec::with_capacity(tracks.len());
        match self.config.sink {
            SinkLayout::Combined => {
                let all: Vec<&Mp4Track> = tracks.iter().map(|(_, track)| *track).collect();
                let payload = boxes::init_segment(&all, TIMESCALE, self.media_duration)?;
                segments.push((BufferKind::All, payload));
            }
            SinkLayout::PerTrack => {
                for (kind, track) in &tracks {
                    let payload = boxes::init_segment(&[*track], TIMESCALE, self.media_duration)?;
                    segments.push((*kind, payload));
                }
            }
        }
        for (kind, payload) in segments {
            debug!(%kind, len = payload.len(), "initial segment generated");
            self.events.push_back(RemuxEvent::Buffer(BufferEvent {
                kind,
                payload,
                dts: 0,
                fps: None,
            }));
        }
        Ok(())
    }

    fn emit_fragment(
        kind: BufferKind,
        remuxer: &mut dyn Remuxer,
        sequence_number: &mut u32,
        events: &mut VecDeque<RemuxEvent>,
    ) -> Result<()> {
        let Some(payload) = remuxer.get_payload() else {
            return Ok(());
        };
        let dts = remuxer.dts();
        let track = remuxer.track();
        let fragment = boxes::fragment(*sequence_number, dts, track, &payload)?;
        debug!(
            %kind,
            sequence = *sequence_number,
            dts,
            samples = track.samples.len(),
            position = %sec_to_time(dts as f64 / track.timescale as f64),
            "put segment"
        );
        let fps = match kind {
            BufferKind::Video => track.fps,
            _ => None,
        };
        events.push_back(RemuxEvent::Buffer(BufferEvent {
            kind,
            payload: fragment,
            dts,
            fps,
        }));
        remuxer.flush();
        *sequence_number += 1;
        Ok(())
    }
}
