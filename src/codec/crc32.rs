//! CRC-32/ISO-HDLC (the zlib/zip variant) used to verify firmware images.
//!
//! The device recomputes the checksum over the received image when the update
//! is finished; the host value only catches mistakes early.

const POLYNOMIAL: u32 = 0xEDB8_8320;
const INITIAL: u32 = 0xFFFF_FFFF;
const FINAL_XOR: u32 = 0xFFFF_FFFF;

/// Byte-wise remainder table for the reflected polynomial.
pub const CRC32_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut index = 0usize;
    while index < table.len() {
        let mut crc = index as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
}

/// Incremental CRC-32 hasher.
///
/// ```
/// use crispy_upload::codec::crc32::Crc32;
///
/// let mut hasher = Crc32::new();
/// hasher.update(b"12345");
/// hasher.update(b"6789");
/// assert_eq!(0xCBF4_3926, hasher.finalize());
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    /// Creates a hasher with the initial register value.
    #[must_use]
    pub const fn new() -> Self {
        Self { state: INITIAL }
    }

    /// Feeds more bytes into the running checksum.
    pub fn update(&mut self, bytes: &[u8]) {
        let mut state = self.state;
        for &byte in bytes {
            let index = usize::from((state as u8) ^ byte);
            state = CRC32_TABLE[index] ^ (state >> 8);
        }
        self.state = state;
    }

    /// Returns the checksum of all bytes fed so far.
    #[must_use]
    pub const fn finalize(self) -> u32 {
        self.state ^ FINAL_XOR
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the CRC-32 of `bytes` in one call.
///
/// ```
/// use crispy_upload::codec::crc32::checksum;
///
/// assert_eq!(0xCBF4_3926, checksum(b"123456789"));
/// assert_eq!(0, checksum(b""));
/// ```
#[must_use]
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty(b"".as_slice(), 0x0000_0000)]
    #[case::check_value(b"123456789".as_slice(), 0xCBF4_3926)]
    #[case::single_byte(b"a".as_slice(), 0xE8B7_BE43)]
    #[case::short_text(b"abc".as_slice(), 0x3524_41C2)]
    #[case::pangram(b"The quick brown fox jumps over the lazy dog".as_slice(), 0x414F_A339)]
    fn checksum_matches_known_vectors(#[case] input: &[u8], #[case] expected: u32) {
        assert_eq!(expected, checksum(input));
    }

    #[test]
    fn table_has_expected_anchor_entries() {
        assert_eq!(0x0000_0000, CRC32_TABLE[0]);
        assert_eq!(0x7707_3096, CRC32_TABLE[1]);
        assert_eq!(0x2D02_EF8D, CRC32_TABLE[255]);
    }

    #[test]
    fn checksum_matches_crc32fast_on_firmware_sized_input() {
        let image: Vec<u8> = (0..70_000u32).map(|value| (value * 31 % 251) as u8).collect();
        assert_eq!(crc32fast::hash(&image), checksum(&image));
    }

    #[test]
    fn incremental_updates_match_one_shot() {
        let image: Vec<u8> = (0..4096u32).map(|value| value as u8).collect();
        let mut hasher = Crc32::default();
        for chunk in image.chunks(1000) {
            hasher.update(chunk);
        }
        assert_eq!(checksum(&image), hasher.finalize());
    }

    #[test]
    fn byte_order_changes_checksum() {
        assert_ne!(checksum(&[0x01, 0x02]), checksum(&[0x02, 0x01]));
    }
}
