//! ISO BMFF box builder for fragmented MP4 (ISO/IEC 14496-12).

use crate::parser::h265::H265Sps;
use crate::types::{Codec, Mp4Track, SampleInfo, TrackType};
use bytes::Bytes;
use std::io::{Cursor, Error, Seek, SeekFrom, Write};

macro_rules! mp4_box {
    ($cursor:expr, $box_name:expr, $body:block) => {{
        let mp4_box_start_pos = ($cursor.seek(SeekFrom::Current(4))? - 4);
        $cursor.write_all($box_name)?;
        $body
        let end_pos = $cursor.stream_position()?;
        let mp4_box_size = (end_pos - mp4_box_start_pos) as u32;
        $cursor.seek(SeekFrom::Start(mp4_box_start_pos))?;
        $cursor.write_all(&mp4_box_size.to_be_bytes())?;
        $cursor.seek(SeekFrom::Start(end_pos))?;
        Ok(())
    }};
}

const BOX_HEADER_SIZE: usize = 8;
const MFHD_SIZE: usize = 16;
const TFHD_SIZE: usize = 16;
const TRUN_HEADER_SIZE: usize = 20;
const TRUN_ENTRY_SIZE: usize = 16;

/// duration, size, flags and composition time offset present, plus data offset.
const TRUN_FLAGS: u32 = 0x000f01;

/// `sample_depends_on = 1`, `sample_is_non_sync_sample = 1`.
const TREX_DEFAULT_SAMPLE_FLAGS: u32 = 0x0001_0001;

/// ISO-639-2/T code packed as three 5-bit letters.
fn language_code(language: &[u8; 3]) -> u16 {
    let code: u32 = (language[0] as u32 & 31) << 10
        | (language[1] as u32 & 31) << 5
        | (language[2] as u32 & 31);
    code as u16
}

fn write_ftyp<Writer>(cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"ftyp", {
        // major brand
        cursor.write_all(b"isom")?;
        // minor version
        cursor.write_all(&1u32.to_be_bytes())?;
        // compatible brands
        cursor.write_all(b"isom")?;
        cursor.write_all(b"avc1")?;
    })
}

fn write_hdlr<Writer>(video: bool, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"hdlr", {
        // version & flag
        cursor.write_all(&[0x00; 4])?;
        // pre_defined
        cursor.write_all(&[0x00; 4])?;
        if video {
            cursor.write_all(b"vide")?;
            // reserved
            cursor.write_all(&[0x00; 12])?;
            cursor.write_all(b"VideoHandler\x00")?;
        } else {
            cursor.write_all(b"soun")?;
            // reserved
            cursor.write_all(&[0x00; 12])?;
            cursor.write_all(b"SoundHandler\x00")?;
        }
    })
}

fn write_vmhd<Writer>(cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"vmhd", {
        cursor.write_all(&[0, 0, 0, 1])?;
        // graphicsmode, opcolor
        cursor.write_all(&[0x00; 8])?;
    })
}

fn write_smhd<Writer>(cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"smhd", {
        // version & flag
        cursor.write_all(&[0x00; 4])?;
        // balance, reserved
        cursor.write_all(&[0x00; 4])?;
    })
}

fn write_url<Writer>(cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"url ", {
        // self-contained
        cursor.write_all(&[0, 0, 0, 1])?;
    })
}

fn write_dref<Writer>(cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"dref", {
        // version & flag
        cursor.write_all(&[0x00; 4])?;
        cursor.write_all(&1u32.to_be_bytes())?;
        write_url(cursor)?;
    })
}

fn write_dinf<Writer>(cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"dinf", {
        write_dref(cursor)?;
    })
}

/// Sample tables stay empty in a fragmented file; `trun` carries the samples.
fn write_empty_table<Writer>(name: &[u8; 4], cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, name, {
        // version & flag
        cursor.write_all(&[0x00; 4])?;
        if name == b"stsz" {
            // sample_size
            cursor.write_all(&[0x00; 4])?;
        }
        // entry / sample count
        cursor.write_all(&[0x00; 4])?;
    })
}

fn write_mdhd<Writer>(
    timescale: u32,
    duration: u32,
    language: &[u8; 3],
    cursor: &mut Writer,
) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"mdhd", {
        // version & flag
        cursor.write_all(&[0x00; 4])?;
        // create_time
        cursor.write_all(&[0x00; 4])?;
        // modify_time
        cursor.write_all(&[0x00; 4])?;
        cursor.write_all(&timescale.to_be_bytes())?;
        cursor.write_all(&duration.to_be_bytes())?;
        cursor.write_all(&language_code(language).to_be_bytes())?;
        // pre_defined
        cursor.write_all(&[0, 0])?;
    })
}

fn write_trex<Writer>(track_id: u32, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"trex", {
        cursor.write_all(&[0x00; 4])?;
        cursor.write_all(&track_id.to_be_bytes())?;
        // default_sample_description_index
        cursor.write_all(&1u32.to_be_bytes())?;
        // default_sample_duration, default_sample_size
        cursor.write_all(&[0x00; 8])?;
        cursor.write_all(&TREX_DEFAULT_SAMPLE_FLAGS.to_be_bytes())?;
    })
}

fn write_descriptor_header<Writer>(tag: u8, size: usize, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write,
{
    cursor.write_all(&[tag, size as u8])
}

fn write_esds<Writer>(dsi: &[u8], cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"esds", {
        cursor.write_all(&[0x00; 4])?;
        // DecoderSpecificInfo, DecoderConfigDescriptor and SLConfigDescriptor sizes
        let dsi_bytes = dsi.len();
        let dcd_bytes = 13 + 2 + dsi_bytes;
        let esd_bytes = 3 + 2 + dcd_bytes + 3;

        // ES_Descriptor: ES_ID 1, no flags
        write_descriptor_header(0x03, esd_bytes, cursor)?;
        cursor.write_all(&[0x00, 0x01, 0x00])?;
        // DecoderConfigDescriptor: MPEG-4 audio, AudioStream
        write_descriptor_header(0x04, dcd_bytes, cursor)?;
        cursor.write_all(&[0x40, (0x05 << 2) | 0x01])?;
        // bufferSizeDB, maxBitrate, avgBitrate
        cursor.write_all(&[0x00; 11])?;
        write_descriptor_header(0x05, dsi_bytes, cursor)?;
        cursor.write_all(dsi)?;
        // SLConfigDescriptor: predefined MP4
        write_descriptor_header(0x06, 1, cursor)?;
        cursor.write_all(&[0x02])?;
    })
}

fn write_mp4a<Writer>(track: &Mp4Track, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"mp4a", {
        // reserved, data_reference_index
        cursor.write_all(&[0x00; 6])?;
        cursor.write_all(&[0x00, 0x01])?;

        cursor.write_all(&[0x00; 8])?;
        cursor.write_all(&(track.channel_count as u16).to_be_bytes())?;
        cursor.write_all(&[0x00, 0x10])?; //16 bits per sample
        cursor.write_all(&[0x00; 4])?;
        cursor.write_all(&sample_rate_fixed(track.sample_rate).to_be_bytes())?;
        write_esds(track.dsi.as_ref().map_or(&[][..], |dsi| &dsi[..]), cursor)?;
    })
}

/// 16.16 `samplerate`; rates above 65535 Hz do not fit and are written as
/// 0, leaving the real rate to the AudioSpecificConfig in `esds`.
fn sample_rate_fixed(sample_rate: u32) -> u32 {
    if sample_rate > u16::MAX as u32 {
        0
    } else {
        sample_rate << 16
    }
}

fn write_btrt<Writer>(cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"btrt", {
        // bufferSizeDB
        cursor.write_all(&0x001c_9c80u32.to_be_bytes())?;
        // maxBitrate
        cursor.write_all(&0x002d_c6c0u32.to_be_bytes())?;
        // avgBitrate
        cursor.write_all(&0x002d_c6c0u32.to_be_bytes())?;
    })
}

fn write_avcc<Writer>(
    sps: Option<&Bytes>,
    pps: Option<&Bytes>,
    cursor: &mut Writer,
) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"avcC", {
        // configurationVersion
        cursor.write_all(&[0x01])?;
        // profile, compatibility, level
        let profile = sps.and_then(|sps| sps.get(1..4)).unwrap_or(&[0, 0, 0]);
        cursor.write_all(profile)?;
        // lengthSizeMinusOne = 3
        cursor.write_all(&[0xff])?;
        cursor.write_all(&[0xe0 | sps.is_some() as u8])?;
        if let Some(sps) = sps {
            cursor.write_all(&(sps.len() as u16).to_be_bytes())?;
            cursor.write_all(sps)?;
        }
        cursor.write_all(&[pps.is_some() as u8])?;
        if let Some(pps) = pps {
            cursor.write_all(&(pps.len() as u16).to_be_bytes())?;
            cursor.write_all(pps)?;
        }
    })
}

fn write_visual_sample_entry<Writer>(track: &Mp4Track, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    // reserved, data_reference_index
    cursor.write_all(&[0x00; 6])?;
    cursor.write_all(&[0x00, 0x01])?;
    // pre_defined, reserved
    cursor.write_all(&[0x00; 16])?;
    cursor.write_all(&(track.width as u16).to_be_bytes())?;
    cursor.write_all(&(track.height as u16).to_be_bytes())?;
    // 72 dpi
    cursor.write_all(&0x00480000u32.to_be_bytes())?;
    cursor.write_all(&0x00480000u32.to_be_bytes())?;
    cursor.write_all(&[0x00; 4])?;
    // frame_count
    cursor.write_all(&[0x00, 0x01])?;
    // compressorname
    cursor.write_all(&[0x00; 32])?;
    // depth
    cursor.write_all(&[0x00, 0x18])?;
    cursor.write_all(&(-1i16).to_be_bytes())?;
    Ok(())
}

fn write_avc1<Writer>(track: &Mp4Track, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"avc1", {
        write_visual_sample_entry(track, cursor)?;
        write_avcc(track.sps.as_ref(), track.pps.as_ref(), cursor)?;
        write_btrt(cursor)?;
    })
}

fn write_hvcc<Writer>(track: &Mp4Track, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    let fallback;
    let sps_info = match track.hevc.as_ref() {
        Some(info) => info,
        None => {
            fallback = H265Sps::default();
            &fallback
        }
    };
    let profile = &sps_info.profile;
    mp4_box!(cursor, b"hvcC", {
        // configurationVersion
        cursor.write_all(&[0x01])?;
        // profile space (2), tier (1), profile (5)
        cursor.write_all(&[(profile.profile_space << 6)
            | ((profile.tier_flag as u8) << 5)
            | (profile.profile_idc & 0x1f)])?;
        cursor.write_all(&profile.profile_compatibility_flags.to_be_bytes())?;
        cursor.write_all(&profile.constraint_indicator_flags)?;
        cursor.write_all(&[profile.level_idc])?;
        // min_spatial_segmentation_idc
        cursor.write_all(&0xf000u16.to_be_bytes())?;
        // parallelismType
        cursor.write_all(&[0xfc])?;
        cursor.write_all(&[0xfc | (sps_info.chroma_format_idc as u8 & 0x03)])?;
        cursor.write_all(&[0xf8 | (sps_info.bit_depth_luma.saturating_sub(8) & 0x07)])?;
        cursor.write_all(&[0xf8 | (sps_info.bit_depth_chroma.saturating_sub(8) & 0x07)])?;
        // avgFrameRate
        cursor.write_all(&[0; 2])?;
        // constantFrameRate (2), numTemporalLayers (3), temporalIdNested (1),
        // lengthSizeMinusOne (2)
        cursor.write_all(&[((sps_info.max_sub_layers & 0x07) << 3)
            | ((sps_info.temporal_id_nesting as u8) << 2)
            | 0x03])?;
        let arrays = [(32u8, &track.vps), (33, &track.sps), (34, &track.pps)];
        let present = arrays.iter().filter(|(_, nal)| nal.is_some()).count();
        cursor.write_all(&[present as u8])?;
        for (nal_type, nal) in arrays {
            if let Some(nal) = nal {
                // array_completeness = 1
                cursor.write_all(&[(1 << 7) | (nal_type & 0x3f)])?;
                cursor.write_all(&1u16.to_be_bytes())?;
                cursor.write_all(&(nal.len() as u16).to_be_bytes())?;
                cursor.write_all(nal)?;
            }
        }
    })
}

fn write_hvc1<Writer>(track: &Mp4Track, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"hvc1", {
        write_visual_sample_entry(track, cursor)?;
        write_hvcc(track, cursor)?;
        write_btrt(cursor)?;
    })
}

fn write_stsd<Writer>(track: &Mp4Track, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"stsd", {
        cursor.write_all(&[0x00; 4])?;
        cursor.write_all(&1u32.to_be_bytes())?;
        match track.codec {
            Codec::AVC => write_avc1(track, cursor)?,
            Codec::HEVC => write_hvc1(track, cursor)?,
            Codec::AAC => write_mp4a(track, cursor)?,
        }
    })
}

fn write_stbl<Writer>(track: &Mp4Track, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"stbl", {
        write_stsd(track, cursor)?;
        write_empty_table(b"stts", cursor)?;
        write_empty_table(b"stsc", cursor)?;
        write_empty_table(b"stsz", cursor)?;
        write_empty_table(b"stco", cursor)?;
    })
}

fn write_minf<Writer>(track: &Mp4Track, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"minf", {
        match track.track_type {
            TrackType::Video => write_vmhd(cursor)?,
            TrackType::Audio => write_smhd(cursor)?,
        }
        write_dinf(cursor)?;
        write_stbl(track, cursor)?;
    })
}

fn write_tkhd<Writer>(track: &Mp4Track, duration: u32, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"tkhd", {
        // version 0, flags: enabled, in movie, in preview
        cursor.write_all(&7u32.to_be_bytes())?;
        // create_time
        cursor.write_all(&[0x00; 4])?;
        // modify_time
        cursor.write_all(&[0x00; 4])?;
        cursor.write_all(&track.id.to_be_bytes())?;
        // reserved
        cursor.write_all(&[0x00; 4])?;
        cursor.write_all(&duration.to_be_bytes())?;
        // reserved, layer, alternate_group
        cursor.write_all(&[0; 12])?;
        cursor.write_all(&track.volume().to_be_bytes())?;
        // reserved
        cursor.write_all(&[0x00; 2])?;
        // matrix
        cursor.write_all(&0x00010000u32.to_be_bytes())?;
        cursor.write_all(&[0x00; 12])?;
        cursor.write_all(&0x00010000u32.to_be_bytes())?;
        cursor.write_all(&[0x00; 12])?;
        cursor.write_all(&0x40000000u32.to_be_bytes())?;
        cursor.write_all(&(track.width << 16).to_be_bytes())?;
        cursor.write_all(&(track.height << 16).to_be_bytes())?;
    })
}

fn write_mdia<Writer>(
    track: &Mp4Track,
    duration: u32,
    language: &[u8; 3],
    cursor: &mut Writer,
) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"mdia", {
        write_mdhd(track.timescale, duration, language, cursor)?;
        write_hdlr(matches!(track.track_type, TrackType::Video), cursor)?;
        write_minf(track, cursor)?;
    })
}

fn write_mvhd<Writer>(timescale: u32, duration: u32, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"mvhd", {
        // version & flag
        cursor.write_all(&[0x00; 4])?;
        // create_time
        cursor.write_all(&[0x00; 4])?;
        // modify_time
        cursor.write_all(&[0x00; 4])?;
        cursor.write_all(&timescale.to_be_bytes())?;
        cursor.write_all(&duration.to_be_bytes())?;
        // Write playback rate (0x00010000 = 1.0, normal speed)
        const RATE: u32 = 0x00010000;
        cursor.write_all(&RATE.to_be_bytes())?;
        // Write playback volume (0x0100 = 1.0, full volume)
        const VOLUME: u16 = 0x0100;
        cursor.write_all(&VOLUME.to_be_bytes())?;
        // reserved
        cursor.write_all(&[0x00; 10])?;
        // Write unity matrix for video transform
        cursor.write_all(&0x00010000u32.to_be_bytes())?;
        cursor.write_all(&[0x00; 12])?;
        cursor.write_all(&0x00010000u32.to_be_bytes())?;
        cursor.write_all(&[0x00; 12])?;
        cursor.write_all(&0x40000000u32.to_be_bytes())?;
        // pre_defined
        cursor.write_all(&[0x00; 24])?;
        // next_track_ID
        cursor.write_all(&0xffff_ffffu32.to_be_bytes())?;
    })
}

fn write_trak<Writer>(track: &Mp4Track, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    // Unknown duration is written as all ones.
    let duration = if track.duration == 0 {
        0xffff_ffff
    } else {
        track.duration
    };
    mp4_box!(cursor, b"trak", {
        write_tkhd(track, duration, cursor)?;
        write_mdia(track, duration, b"und", cursor)?;
    })
}

fn write_mvex<Writer>(tracks: &[&Mp4Track], cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"mvex", {
        for track in tracks {
            write_trex(track.id, cursor)?;
        }
    })
}

pub fn write_moov<Writer>(
    tracks: &[&Mp4Track],
    timescale: u32,
    duration: u32,
    cursor: &mut Writer,
) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"moov", {
        write_mvhd(timescale, duration, cursor)?;
        for track in tracks {
            write_trak(track, cursor)?;
        }
        write_mvex(tracks, cursor)?;
    })
}

fn write_mfhd<Writer>(sequence_number: u32, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"mfhd", {
        cursor.write_all(&[0x00; 4])?;
        cursor.write_all(&sequence_number.to_be_bytes())?;
    })
}

fn write_tfhd<Writer>(track_id: u32, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"tfhd", {
        // version & flags: all defaults come from trex
        cursor.write_all(&[0x00; 4])?;
        cursor.write_all(&track_id.to_be_bytes())?;
    })
}

fn tfdt_size(base_media_decode_time: u64) -> usize {
    if base_media_decode_time > u32::MAX as u64 {
        20
    } else {
        16
    }
}

fn write_tfdt<Writer>(base_media_decode_time: u64, cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"tfdt", {
        if base_media_decode_time > u32::MAX as u64 {
            cursor.write_all(&[0x01, 0x00, 0x00, 0x00])?;
            cursor.write_all(&base_media_decode_time.to_be_bytes())?;
        } else {
            cursor.write_all(&[0x00; 4])?;
            cursor.write_all(&(base_media_decode_time as u32).to_be_bytes())?;
        }
    })
}

fn write_trun<Writer>(
    samples: &[SampleInfo],
    data_offset: u32,
    cursor: &mut Writer,
) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"trun", {
        cursor.write_all(&TRUN_FLAGS.to_be_bytes())?;
        cursor.write_all(&(samples.len() as u32).to_be_bytes())?;
        cursor.write_all(&data_offset.to_be_bytes())?;
        for sample in samples {
            cursor.write_all(&sample.duration.to_be_bytes())?;
            cursor.write_all(&sample.size.to_be_bytes())?;
            cursor.write_all(&sample.flags.to_u32().to_be_bytes())?;
            cursor.write_all(&sample.cts.to_be_bytes())?;
        }
    })
}

fn write_sdtp<Writer>(samples: &[SampleInfo], cursor: &mut Writer) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"sdtp", {
        cursor.write_all(&[0x00; 4])?;
        for sample in samples {
            cursor.write_all(&[sample.flags.to_sdtp()])?;
        }
    })
}

/// Offset from the first byte of `moof` to the first sample byte of the
/// `mdat` that follows it.
fn data_offset(samples: usize, base_media_decode_time: u64) -> u32 {
    let sdtp = BOX_HEADER_SIZE + 4 + samples;
    let trun = TRUN_HEADER_SIZE + TRUN_ENTRY_SIZE * samples;
    let traf = BOX_HEADER_SIZE + TFHD_SIZE + tfdt_size(base_media_decode_time) + trun + sdtp;
    let moof = BOX_HEADER_SIZE + MFHD_SIZE + traf;
    (moof + BOX_HEADER_SIZE) as u32
}

pub fn write_moof<Writer>(
    sequence_number: u32,
    base_media_decode_time: u64,
    track: &Mp4Track,
    cursor: &mut Writer,
) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    let data_offset = data_offset(track.samples.len(), base_media_decode_time);
    mp4_box!(cursor, b"moof", {
        write_mfhd(sequence_number, cursor)?;
        write_traf(track, base_media_decode_time, data_offset, cursor)?;
    })
}

fn write_traf<Writer>(
    track: &Mp4Track,
    base_media_decode_time: u64,
    data_offset: u32,
    cursor: &mut Writer,
) -> Result<(), Error>
where
    Writer: Write + Seek,
{
    mp4_box!(cursor, b"traf", {
        write_tfhd(track.id, cursor)?;
        write_tfdt(base_media_decode_time, cursor)?;
        write_trun(&track.samples, data_offset, cursor)?;
        write_sdtp(&track.samples, cursor)?;
    })
}

pub fn write_mdat<Writer>(payload: &[u8], writer: &mut Writer) -> Result<u64, Error>
where
    Writer: Write,
{
    let box_size = payload.len() as u32 + BOX_HEADER_SIZE as u32;
    writer.write_all(&box_size.to_be_bytes())?;
    writer.write_all(b"mdat")?;
    writer.write_all(payload)?;
    Ok(box_size as u64)
}

/// `ftyp` + `moov` describing `tracks`, in the given order.
pub fn init_segment(tracks: &[&Mp4Track], timescale: u32, duration: u32) -> Result<Bytes, Error> {
    let mut cursor = Cursor::new(Vec::new());
    write_ftyp(&mut cursor)?;
    write_moov(tracks, timescale, duration, &mut cursor)?;
    Ok(Bytes::from(cursor.into_inner()))
}

/// `moof` describing the track's pending sample list.
pub fn moof(
    sequence_number: u32,
    base_media_decode_time: u64,
    track: &Mp4Track,
) -> Result<Bytes, Error> {
    let mut cursor = Cursor::new(Vec::new());
    write_moof(sequence_number, base_media_decode_time, track, &mut cursor)?;
    Ok(Bytes::from(cursor.into_inner()))
}

pub fn mdat(payload: &[u8]) -> Result<Bytes, Error> {
    let mut buf = Vec::with_capacity(payload.len() + BOX_HEADER_SIZE);
    write_mdat(payload, &mut buf)?;
    Ok(Bytes::from(buf))
}

/// `moof` + `mdat`, ready to append to a source buffer.
pub fn fragment(
    sequence_number: u32,
    base_media_decode_time: u64,
    track: &Mp4Track,
    payload: &[u8],
) -> Result<Bytes, Error> {
    let mut cursor = Cursor::new(Vec::with_capacity(payload.len() + 256));
    write_moof(sequence_number, base_media_decode_time, track, &mut cursor)?;
    write_mdat(payload, &mut cursor)?;
    Ok(Bytes::from(cursor.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SampleFlags, TIMESCALE};

    fn child<'a>(data: &'a [u8], name: &[u8; 4]) -> Option<&'a [u8]> {
        let mut offset = 0;
        while offset + 8 <= data.len() {
            let size = u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
            if &data[offset + 4..offset + 8] == name {
                return Some(&data[offset..offset + size]);
            }
            offset += size;
        }
        None
    }

    fn video_track() -> Mp4Track {
        let mut track = Mp4Track::new(1, Codec::AVC, TIMESCALE, 0);
        track.width = 640;
        track.height = 360;
        track.sps = Some(Bytes::from_static(&[0x67, 0x42, 0xc0, 0x1e, 0xda]));
        track.pps = Some(Bytes::from_static(&[0x68, 0xce, 0x3c, 0x80]));
        track
    }

    #[test]
    fn init_segment_layout() {
        let track = video_track();
        let init = init_segment(&[&track], TIMESCALE, 0).unwrap();

        assert_eq!(
            &init[..24],
            b"\x00\x00\x00\x18ftypisom\x00\x00\x00\x01isomavc1"
        );
        let moov = child(&init, b"moov").unwrap();
        let mvhd = child(&moov[8..], b"mvhd").unwrap();
        assert_eq!(mvhd.len(), 108);
        assert_eq!(&mvhd[20..24], &TIMESCALE.to_be_bytes());
        assert_eq!(&mvhd[104..108], &[0xff; 4]);

        let trak = child(&moov[8..], b"trak").unwrap();
        let tkhd = child(&trak[8..], b"tkhd").unwrap();
        assert_eq!(&tkhd[8..12], &[0, 0, 0, 7]);
        assert_eq!(&tkhd[28..32], &[0xff; 4]);
        assert_eq!(&tkhd[84..88], &(640u32 << 16).to_be_bytes());
        assert_eq!(&tkhd[88..92], &(360u32 << 16).to_be_bytes());

        let mvex = child(&moov[8..], b"mvex").unwrap();
        let trex = child(&mvex[8..], b"trex").unwrap();
        assert_eq!(&trex[12..16], &1u32.to_be_bytes());
        assert_eq!(&trex[28..32], &[0x00, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn avcc_record() {
        let track = video_track();
        let mut cursor = Cursor::new(Vec::new());
        write_avcc(track.sps.as_ref(), track.pps.as_ref(), &mut cursor).unwrap();
        assert_eq!(
            cursor.into_inner(),
            vec![
                0, 0, 0, 28, b'a', b'v', b'c', b'C', 1, 0x42, 0xc0, 0x1e, 0xff, 0xe1, 0, 5, 0x67,
                0x42, 0xc0, 0x1e, 0xda, 1, 0, 4, 0x68, 0xce, 0x3c, 0x80
            ]
        );
    }

    #[test]
    fn mp4a_sample_rate_field() {
        let mut track = Mp4Track::new(2, Codec::AAC, TIMESCALE, 0);
        track.channel_count = 2;
        track.sample_rate = 48000;
        track.dsi = Some([0x11, 0x90]);
        let mut cursor = Cursor::new(Vec::new());
        write_mp4a(&track, &mut cursor).unwrap();
        let mp4a = cursor.into_inner();
        assert_eq!(&mp4a[24..26], &[0, 2]);
        assert_eq!(&mp4a[32..36], &(48000u32 << 16).to_be_bytes());

        track.sample_rate = 96000;
        let mut cursor = Cursor::new(Vec::new());
        write_mp4a(&track, &mut cursor).unwrap();
        assert_eq!(&cursor.into_inner()[32..36], &[0; 4]);
    }

    #[test]
    fn esds_carries_audio_specific_config() {
        let mut cursor = Cursor::new(Vec::new());
        write_esds(&[0x12, 0x10], &mut cursor).unwrap();
        assert_eq!(
            cursor.into_inner(),
            vec![
                0, 0, 0, 39, b'e', b's', b'd', b's', 0, 0, 0, 0, 0x03, 0x19, 0x00, 0x01, 0x00,
                0x04, 0x11, 0x40, 0x15, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x05, 0x02, 0x12, 0x10,
                0x06, 0x01, 0x02
            ]
        );
    }

    #[test]
    fn data_offset_points_past_mdat_header() {
        let mut track = video_track();
        for i in 0..3 {
            track.samples.push(SampleInfo {
                size: 100 + i,
                duration: 33,
                cts: 0,
                flags: if i == 0 {
                    SampleFlags::keyframe()
                } else {
                    SampleFlags::delta()
                },
            });
        }
        for dts in [0, 1 << 40] {
            let out = fragment(7, dts, &track, &[0u8; 303]).unwrap();
            let moof_len = u32::from_be_bytes(out[..4].try_into().unwrap()) as usize;
            let traf = child(&out[16 + 8..moof_len], b"traf").unwrap();
            let trun = child(&traf[8..], b"trun").unwrap();
            let offset = u32::from_be_bytes(trun[16..20].try_into().unwrap()) as usize;
            assert_eq!(offset, moof_len + 8);
            assert_eq!(&out[moof_len + 4..moof_len + 8], b"mdat");
            assert_eq!(&trun[8..12], &[0x00, 0x00, 0x0f, 0x01]);
            assert_eq!(&trun[28..32], &[0x02, 0x00, 0x00, 0x00]);
            assert_eq!(&trun[44..48], &[0x01, 0x01, 0x00, 0x00]);
            let sdtp = child(&traf[8..], b"sdtp").unwrap();
            assert_eq!(&sdtp[12..], &[0x20, 0x10, 0x10]);
        }
    }

    #[test]
    fn mfhd_and_tfdt() {
        let track = video_track();
        let out = moof(42, 1234, &track).unwrap();
        assert_eq!(&out[8..24], b"\x00\x00\x00\x10mfhd\x00\x00\x00\x00\x00\x00\x00\x2a");
        let traf = child(&out[24..], b"traf").unwrap();
        let tfhd = child(&traf[8..], b"tfhd").unwrap();
        assert_eq!(tfhd, b"\x00\x00\x00\x10tfhd\x00\x00\x00\x00\x00\x00\x00\x01");
        let tfdt = child(&traf[8..], b"tfdt").unwrap();
        assert_eq!(&tfdt[8..], &[0, 0, 0, 0, 0, 0, 0x04, 0xd2]);
    }

    #[test]
    fn mdat_wraps_payload() {
        assert_eq!(mdat(&[1, 2, 3]).unwrap().as_ref(), b"\x00\x00\x00\x0bmdat\x01\x02\x03");
    }
}
