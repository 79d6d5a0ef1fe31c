/// Bit-level cursor over an RBSP buffer with exponential-Golomb decoding.
///
/// Reads past the end of the buffer never fail: they yield `0`/`false` and
/// leave the cursor where it was, so parameter-set parsing degrades to
/// best-effort values on truncated input.
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of unread bits.
    pub fn bits_available(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.pos)
    }

    /// Reads `n` bits (at most 32) MSB first. Returns 0 without advancing if
    /// fewer than `n` bits remain.
    pub fn read_bits(&mut self, n: usize) -> u32 {
        let value = self.peek_bits(n);
        if n <= self.bits_available() {
            self.pos += n;
        }
        value
    }

    /// Same as [`read_bits`](Self::read_bits) without moving the cursor.
    pub fn peek_bits(&self, n: usize) -> u32 {
        if n == 0 || n > 32 || n > self.bits_available() {
            return 0;
        }
        let mut value: u32 = 0;
        for i in 0..n {
            value = (value << 1) | self.bit_at(self.pos + i);
        }
        value
    }

    /// Skips `n` bits, or nothing at all if fewer than `n` remain.
    pub fn skip_bits(&mut self, n: usize) {
        if n <= self.bits_available() {
            self.pos += n;
        }
    }

    /// Counts zero bits up to the next set bit. The set bit itself is not
    /// consumed.
    pub fn skip_leading_zeros(&mut self) -> usize {
        let available = self.bits_available();
        for count in 0..available {
            if self.bit_at(self.pos + count) != 0 {
                self.pos += count;
                return count;
            }
        }
        available
    }

    /// `ue(v)`
    pub fn read_unsigned_exp_golomb(&mut self) -> u32 {
        let leading_zeros = self.skip_leading_zeros();
        if leading_zeros >= 32 {
            return 0;
        }
        self.read_bits(leading_zeros + 1).saturating_sub(1)
    }

    /// `se(v)`: odd code numbers map to positive values, even to negative.
    pub fn read_signed_exp_golomb(&mut self) -> i32 {
        let value = self.read_unsigned_exp_golomb();
        if value & 1 == 1 {
            ((value as i64 + 1) >> 1) as i32
        } else {
            -((value >> 1) as i32)
        }
    }

    pub fn skip_unsigned_exp_golomb(&mut self) {
        let leading_zeros = self.skip_leading_zeros();
        self.skip_bits(leading_zeros + 1);
    }

    pub fn read_bool(&mut self) -> bool {
        self.read_bits(1) == 1
    }

    pub fn read_u8(&mut self) -> u8 {
        self.read_bits(8) as u8
    }

    pub fn read_u16(&mut self) -> u16 {
        self.read_bits(16) as u16
    }

    pub fn read_u32(&mut self) -> u32 {
        self.read_bits(32)
    }

    fn bit_at(&self, pos: usize) -> u32 {
        let byte_index = pos / 8;
        let bit_index = 7 - (pos % 8); // MSB first
        ((self.data[byte_index] >> bit_index) & 1) as u32
    }
}

/// Strips emulation-prevention bytes (`00 00 03` -> `00 00`) from a NAL
/// payload, producing the RBSP.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        rbsp.push(byte);
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }
    rbsp
}

/// Sample rate array containing standard AAC sample rates
pub const SAMPLE_RATE_ARRAY: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Looks up a sampling-frequency index from an ADTS header or
/// AudioSpecificConfig. Reserved indexes yield `None`.
pub fn sample_rate_from_index(index: u8) -> Option<u32> {
    SAMPLE_RATE_ARRAY.get(index as usize).copied()
}

/// Formats seconds as `mm:ss`, or `hh:mm:ss` once an hour has passed.
pub fn sec_to_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fixed_width_fields() {
        let data = [0b1010_1100, 0xff, 0x12, 0x34];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.peek_bits(4), 0b1010);
        assert_eq!(reader.read_bits(4), 0b1010);
        assert!(reader.read_bool());
        assert!(reader.read_bool());
        assert_eq!(reader.read_bits(2), 0);
        assert_eq!(reader.read_u8(), 0xff);
        assert_eq!(reader.read_u16(), 0x1234);
        assert_eq!(reader.bits_available(), 0);
    }

    #[test]
    fn underflow_reads_zero_and_keeps_position() {
        let data = [0xff];
        let mut reader = BitReader::new(&data);
        reader.skip_bits(4);
        assert_eq!(reader.read_bits(8), 0);
        assert_eq!(reader.bits_available(), 4);
        assert_eq!(reader.read_u32(), 0);
        reader.skip_bits(5);
        assert_eq!(reader.bits_available(), 4);
        assert_eq!(reader.read_bits(4), 0xf);
        assert!(!reader.read_bool());
        assert_eq!(reader.read_unsigned_exp_golomb(), 0);
        assert_eq!(reader.read_signed_exp_golomb(), 0);
    }

    #[test]
    fn exp_golomb_codes() {
        // 1 | 010 | 011 | 00100 | 00101 | 0001000
        let data = [0b1010_0110, 0b0100_0010, 0b1000_1000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_unsigned_exp_golomb(), 0);
        assert_eq!(reader.read_unsigned_exp_golomb(), 1);
        assert_eq!(reader.read_signed_exp_golomb(), -1);
        assert_eq!(reader.read_signed_exp_golomb(), 2);
        assert_eq!(reader.read_signed_exp_golomb(), -2);
        assert_eq!(reader.read_unsigned_exp_golomb(), 7);
    }

    #[test]
    fn leading_zeros_do_not_consume_marker() {
        let data = [0b0001_0000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.skip_leading_zeros(), 3);
        assert!(reader.read_bool());
        assert_eq!(reader.skip_leading_zeros(), 4);
    }

    #[test]
    fn emulation_prevention_is_removed() {
        let data = [0x67, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x03];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x67, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x03]
        );
    }

    #[test]
    fn sample_rate_table() {
        assert_eq!(sample_rate_from_index(3), Some(48000));
        assert_eq!(sample_rate_from_index(4), Some(44100));
        assert_eq!(sample_rate_from_index(13), None);
    }

    #[test]
    fn formats_positions() {
        assert_eq!(sec_to_time(0.0), "00:00");
        assert_eq!(sec_to_time(75.4), "01:15");
        assert_eq!(sec_to_time(3725.0), "01:02:05");
    }
}
