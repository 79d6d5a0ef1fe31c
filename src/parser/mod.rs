//! Bitstream parsers for parameter sets and audio framing.

pub mod aac;
pub mod h264;
pub mod h265;
