//! # mp4remux
//!
#![doc = include_str!("../README.md")]

mod boxes;
mod config;
mod controller;
mod error;
mod event;
pub mod nalu;
pub mod parser;
pub mod remuxer;
mod types;
pub mod util;

pub use boxes::{fragment, init_segment, mdat, moof};
pub use config::{RemuxConfig, SinkLayout, TrackMode, VideoCodec};
pub use controller::{RemuxController, TrackIdAllocator};
pub use error::{Error, Result};
pub use event::{BufferEvent, BufferKind, FeedInput, RemuxEvent};
pub use types::{Codec, Mp4Track, SampleFlags, SampleInfo, TIMESCALE, TrackType};
