//! Unsigned LEB128 variable-length integers.
//!
//! Seven data bits per byte, least significant group first. The high bit is
//! set on every byte except the last.

use thiserror::Error;

const CONTINUATION: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7F;
const MAX_SHIFT: u32 = 63;
// Only the lowest bit of the tenth group still fits in a u64.
const LAST_GROUP_MAX: u8 = 0x01;

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Errors returned by [`decode_varint`].
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum VarintError {
    /// The buffer ended before a byte without the continuation bit.
    #[error("varint starting at offset {offset} is truncated")]
    Truncated { offset: usize },
    /// The encoded value needs more than 64 bits.
    #[error("varint starting at offset {offset} overflows 64 bits")]
    Overflow { offset: usize },
}

/// Appends the encoding of `value` to `out`.
pub fn encode_varint_into(mut value: u64, out: &mut Vec<u8>) {
    while value >= u64::from(CONTINUATION) {
        out.push((value as u8 & PAYLOAD_MASK) | CONTINUATION);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Encodes `value` into a fresh buffer.
///
/// ```
/// use crispy_upload::codec::varint::encode_varint;
///
/// assert_eq!(vec![0x7F], encode_varint(127));
/// assert_eq!(vec![0x80, 0x01], encode_varint(128));
/// ```
#[must_use]
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_VARINT_LEN);
    encode_varint_into(value, &mut out);
    out
}

/// Decodes one varint from `data` starting at `offset`.
///
/// Returns the value and the offset of the first byte after it.
///
/// # Errors
///
/// Returns [`VarintError::Truncated`] if `data` ends mid-varint and
/// [`VarintError::Overflow`] if the encoding runs past 64 bits.
///
/// ```
/// use crispy_upload::codec::varint::decode_varint;
///
/// let (value, next) = decode_varint(&[0xAA, 0xAC, 0x02, 0x55], 1)?;
/// assert_eq!(0x962C, value);
/// assert_eq!(3, next);
/// # Ok::<(), crispy_upload::codec::varint::VarintError>(())
/// ```
pub fn decode_varint(data: &[u8], offset: usize) -> Result<(u64, usize), VarintError> {
    let start = offset;
    let mut position = offset;
    let mut value = 0u64;
    let mut shift = 0u32;

    loop {
        let Some(&byte) = data.get(position) else {
            return Err(VarintError::Truncated { offset: start });
        };
        position += 1;
        let group = byte & PAYLOAD_MASK;
        if shift == MAX_SHIFT && group > LAST_GROUP_MAX {
            return Err(VarintError::Overflow { offset: start });
        }
        value |= u64::from(group) << shift;

        if byte & CONTINUATION == 0 {
            return Ok((value, position));
        }

        shift += 7;
        if shift > MAX_SHIFT {
            return Err(VarintError::Overflow { offset: start });
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(127)]
    #[case(128)]
    #[case(255)]
    #[case(256)]
    #[case(16_383)]
    #[case(16_384)]
    #[case(2_097_151)]
    #[case(2_097_152)]
    #[case(0xFFFF_FFFF)]
    #[case(u64::MAX)]
    fn decode_inverts_encode(#[case] value: u64) {
        let encoded = encode_varint(value);
        assert_eq!((value, encoded.len()), decode_varint(&encoded, 0).expect("should decode"));
    }

    #[rstest]
    #[case(0, vec![0x00])]
    #[case(127, vec![0x7F])]
    #[case(128, vec![0x80, 0x01])]
    #[case(300, vec![0xAC, 0x02])]
    #[case(16_384, vec![0x80, 0x80, 0x01])]
    #[case(0xFFFF_FFFF, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F])]
    fn encode_matches_reference_bytes(#[case] value: u64, #[case] expected: Vec<u8>) {
        assert_eq!(expected, encode_varint(value));
    }

    #[test]
    fn u64_max_uses_ten_bytes() {
        assert_eq!(MAX_VARINT_LEN, encode_varint(u64::MAX).len());
    }

    #[test]
    fn decode_rejects_ten_continuation_bytes() {
        let result = decode_varint(&[0xFF; 10], 0);
        assert_matches!(result, Err(VarintError::Overflow { offset: 0 }));
    }

    #[rstest]
    #[case::bit_64_set([vec![0x80; 9], vec![0x02]].concat())]
    #[case::all_high_bits([vec![0xFF; 9], vec![0x7F]].concat())]
    #[case::continued_tenth_group([vec![0xFF; 9], vec![0x81, 0x00]].concat())]
    fn decode_rejects_values_above_u64(#[case] data: Vec<u8>) {
        assert_eq!(Err(VarintError::Overflow { offset: 0 }), decode_varint(&data, 0));
    }

    #[test]
    fn decode_accepts_u64_max_in_ten_bytes() {
        let data = [vec![0xFF; 9], vec![0x01]].concat();
        assert_eq!(Ok((u64::MAX, 10)), decode_varint(&data, 0));
    }

    #[rstest]
    #[case::empty(vec![], 0)]
    #[case::mid_continuation(vec![0x80, 0x80], 0)]
    #[case::offset_past_end(vec![0x01], 1)]
    fn decode_rejects_truncated_input(#[case] data: Vec<u8>, #[case] offset: usize) {
        let result = decode_varint(&data, offset);
        assert_matches!(result, Err(VarintError::Truncated { offset: reported }) if reported == offset);
    }

    #[test]
    fn decode_reads_consecutive_values() {
        let mut buffer = Vec::new();
        encode_varint_into(1, &mut buffer);
        encode_varint_into(70_000, &mut buffer);

        let (first, next) = decode_varint(&buffer, 0).expect("first varint should decode");
        let (second, end) = decode_varint(&buffer, next).expect("second varint should decode");
        assert_eq!((1, 70_000, buffer.len()), (first, second, end));
    }
}
