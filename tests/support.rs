#![allow(dead_code)]

/// Light-weight representation of an MP4 box used for parsing tests.
#[derive(Debug, Clone, Copy)]
pub struct Mp4Box {
    pub typ: [u8; 4],
    pub size: usize,
    pub offset: usize,
}

impl Mp4Box {
    /// The whole box, header included.
    pub fn bytes<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.size]
    }

    /// Return the payload that immediately follows the box header.
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset + 8..self.offset + self.size]
    }
}

/// Parses sibling boxes laid out back to back in `data`.
pub fn parse_boxes(data: &[u8]) -> Vec<Mp4Box> {
    let mut boxes = Vec::new();
    let mut cursor = 0;

    while cursor + 8 <= data.len() {
        let size = u32::from_be_bytes(data[cursor..cursor + 4].try_into().unwrap()) as usize;
        if size < 8 || cursor + size > data.len() {
            break;
        }
        let typ = data[cursor + 4..cursor + 8].try_into().unwrap();
        boxes.push(Mp4Box {
            typ,
            size,
            offset: cursor,
        });
        cursor += size;
    }

    boxes
}

/// Follows `path` through nested container boxes and returns the last
/// box, header included.
pub fn find_box<'a>(data: &'a [u8], path: &[&[u8; 4]]) -> Option<&'a [u8]> {
    let (first, rest) = path.split_first()?;
    let found = parse_boxes(data)
        .into_iter()
        .find(|b| &b.typ == *first)?;
    if rest.is_empty() {
        Some(found.bytes(data))
    } else {
        find_box(found.payload(data), rest)
    }
}

/// Offset of the first occurrence of a four-character code.
pub fn fourcc_position(data: &[u8], fourcc: &[u8; 4]) -> Option<usize> {
    data.windows(4).position(|w| w == fourcc)
}

pub fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap())
}

/// Baseline 640x360, 30 fps.
pub const H264_SPS: [u8; 27] = [
    103, 66, 192, 30, 218, 2, 128, 191, 229, 192, 90, 128, 128, 131, 32, 0, 0, 3, 0, 32, 0, 0, 7,
    129, 226, 197, 212,
];
pub const H264_PPS: [u8; 4] = [0x68, 0xce, 0x3c, 0x80];
pub const H264_IDR: [u8; 4] = [0x65, 0x88, 0x84, 0x80];
pub const H264_P: [u8; 3] = [0x41, 0x9a, 0x02];

/// Main profile 1920x1080, two temporal sub-layers.
pub const H265_VPS: [u8; 6] = [0x40, 0x01, 0x0c, 0x01, 0xff, 0xff];
pub const H265_SPS: [u8; 108] = [
    66, 1, 3, 1, 96, 0, 0, 3, 0, 144, 0, 0, 3, 0, 0, 3, 0, 120, 192, 0, 0, 3, 0, 0, 3, 0, 0, 3, 0,
    0, 3, 0, 0, 3, 0, 0, 90, 160, 3, 192, 128, 17, 7, 203, 150, 92, 188, 146, 122, 170, 211, 77,
    52, 211, 77, 52, 211, 77, 52, 211, 77, 52, 211, 77, 52, 211, 77, 52, 211, 77, 52, 211, 77, 52,
    213, 88, 67, 255, 255, 255, 255, 255, 255, 255, 253, 85, 84, 71, 214, 253, 39, 64, 191, 1,
    106, 2, 2, 2, 8, 0, 0, 31, 72, 0, 7, 83, 0, 64,
];
pub const H265_PPS: [u8; 4] = [0x44, 0x01, 0xc1, 0x72];
pub const H265_IDR: [u8; 4] = [0x26, 0x01, 0xaf, 0x1d];
pub const H265_TRAIL: [u8; 4] = [0x02, 0x01, 0xd0, 0x2a];

/// Start code before every unit and after the last one, so every unit is
/// complete within the chunk.
pub fn annex_b(units: &[&[u8]]) -> Vec<u8> {
    let mut data = Vec::new();
    for unit in units {
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(unit);
    }
    data.extend_from_slice(&[0, 0, 0, 1]);
    data
}

/// AAC-LC, 44.1 kHz, stereo ADTS frame without CRC.
pub fn adts_frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() + 7;
    let mut frame = vec![
        0xff,
        0xf1,
        0x50,
        0x80 | ((len >> 11) & 0x03) as u8,
        ((len >> 3) & 0xff) as u8,
        (((len & 0x07) << 5) as u8) | 0x1f,
        0xfc,
    ];
    frame.extend_from_slice(payload);
    frame
}

/// Collects formatted `tracing` output for assertions on log levels.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let capture = self.clone();
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || capture.clone())
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
