//! Consistent Overhead Byte Stuffing.
//!
//! Stuffed output never contains `0x00`, so a single zero byte can delimit
//! frames on the wire. Each block starts with a code byte holding the distance
//! to the next (implied) zero; code `0xFF` marks a full 254-byte run with no
//! zero after it.

use thiserror::Error;

const MAX_CODE: u8 = 0xFF;
const MAX_RUN_LEN: usize = MAX_CODE as usize - 1;

/// Errors returned while unstuffing a COBS frame.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FramingError {
    /// A code byte claims more literal bytes than remain in the buffer.
    #[error(
        "malformed COBS frame: code byte at position {position} claims {claimed} literal bytes but only {available} remain"
    )]
    TruncatedRun {
        position: usize,
        claimed: usize,
        available: usize,
    },
}

/// Returns the worst-case stuffed length for `len` input bytes.
///
/// ```
/// use crispy_upload::codec::cobs::max_stuffed_len;
///
/// assert_eq!(1, max_stuffed_len(0));
/// assert_eq!(256, max_stuffed_len(254));
/// ```
#[must_use]
pub const fn max_stuffed_len(len: usize) -> usize {
    len + len.div_ceil(MAX_RUN_LEN) + 1
}

/// Stuffs `data` so the result contains no zero byte.
///
/// The trailing frame delimiter is not appended.
///
/// ```
/// use crispy_upload::codec::cobs::stuff;
///
/// assert_eq!(vec![0x03, 0x11, 0x22, 0x02, 0x33], stuff(&[0x11, 0x22, 0x00, 0x33]));
/// ```
#[must_use]
pub fn stuff(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(max_stuffed_len(data.len()));
    let mut code_index = 0usize;
    let mut code = 1u8;
    output.push(0);

    for &byte in data {
        if byte == 0 {
            output[code_index] = code;
            code_index = output.len();
            output.push(0);
            code = 1;
            continue;
        }

        output.push(byte);
        code += 1;
        if code == MAX_CODE {
            output[code_index] = code;
            code_index = output.len();
            output.push(0);
            code = 1;
        }
    }

    output[code_index] = code;
    output
}

/// Reverses [`stuff`].
///
/// Decoding stops at the first zero code byte; anything after it is ignored.
///
/// # Errors
///
/// Returns [`FramingError::TruncatedRun`] when a code byte points past the end
/// of `data`.
///
/// ```
/// use crispy_upload::codec::cobs::unstuff;
///
/// let decoded = unstuff(&[0x03, 0x11, 0x22, 0x02, 0x33, 0x00])?;
/// assert_eq!(vec![0x11, 0x22, 0x00, 0x33], decoded);
/// # Ok::<(), crispy_upload::codec::cobs::FramingError>(())
/// ```
pub fn unstuff(data: &[u8]) -> Result<Vec<u8>, FramingError> {
    let mut output = Vec::with_capacity(data.len());
    let mut index = 0usize;

    while index < data.len() {
        let code = data[index];
        if code == 0 {
            break;
        }

        let literal_len = usize::from(code) - 1;
        let start = index + 1;
        let end = start + literal_len;
        if end > data.len() {
            return Err(FramingError::TruncatedRun {
                position: index,
                claimed: literal_len,
                available: data.len() - start,
            });
        }

        output.extend_from_slice(&data[start..end]);
        index = end;

        if code < MAX_CODE && index < data.len() && data[index] != 0 {
            output.push(0);
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty(vec![], vec![0x01])]
    #[case::single_zero(vec![0x00], vec![0x01, 0x01])]
    #[case::two_zeros(vec![0x00, 0x00], vec![0x01, 0x01, 0x01])]
    #[case::zero_in_middle(vec![0x11, 0x22, 0x00, 0x33], vec![0x03, 0x11, 0x22, 0x02, 0x33])]
    #[case::no_zeros(vec![0x11, 0x22, 0x33, 0x44], vec![0x05, 0x11, 0x22, 0x33, 0x44])]
    #[case::trailing_zeros(vec![0x11, 0x00, 0x00, 0x00], vec![0x02, 0x11, 0x01, 0x01, 0x01])]
    fn stuff_matches_reference_vectors(#[case] input: Vec<u8>, #[case] expected: Vec<u8>) {
        assert_eq!(expected, stuff(&input));
        assert_eq!(input, unstuff(&expected).expect("reference vector should unstuff"));
    }

    #[test]
    fn full_run_uses_rollover_code() {
        let input: Vec<u8> = (1..=254).map(|value| value as u8).collect();
        let stuffed = stuff(&input);

        assert_eq!(0xFF, stuffed[0]);
        assert_eq!(256, stuffed.len());
        assert_eq!(0x01, stuffed[255]);
        assert_eq!(input, unstuff(&stuffed).expect("full run should unstuff"));
    }

    #[test]
    fn run_longer_than_254_bytes_splits_into_blocks() {
        let input = vec![0xAB; 300];
        let stuffed = stuff(&input);

        assert_eq!(0xFF, stuffed[0]);
        assert_eq!(47, stuffed[255]);
        assert_eq!(input, unstuff(&stuffed).expect("split run should unstuff"));
    }

    #[rstest]
    #[case::empty(0)]
    #[case::short(7)]
    #[case::one_block(254)]
    #[case::one_block_plus_one(255)]
    #[case::data_block(1024)]
    #[case::large(5000)]
    fn stuffed_output_has_no_zero_and_respects_bound(#[case] len: usize) {
        let input: Vec<u8> = (0..len).map(|index| (index % 7) as u8).collect();
        let stuffed = stuff(&input);

        assert!(stuffed.iter().all(|&byte| byte != 0));
        assert!(stuffed.len() <= max_stuffed_len(len));
        assert_eq!(input, unstuff(&stuffed).expect("stuffed input should unstuff"));
    }

    #[test]
    fn all_zero_and_all_nonzero_inputs_round_trip() {
        for len in [1usize, 253, 254, 255, 508, 509] {
            let zeros = vec![0x00; len];
            assert_eq!(zeros, unstuff(&stuff(&zeros)).expect("zeros should round trip"));

            let ones = vec![0x01; len];
            assert_eq!(ones, unstuff(&stuff(&ones)).expect("ones should round trip"));
        }
    }

    #[test]
    fn unstuff_stops_at_delimiter() {
        let decoded = unstuff(&[0x02, 0x11, 0x00, 0x03, 0x22, 0x33])
            .expect("bytes after the delimiter should be ignored");
        assert_eq!(vec![0x11], decoded);
    }

    #[test]
    fn unstuff_accepts_empty_and_bare_delimiter() {
        assert_eq!(Vec::<u8>::new(), unstuff(&[]).expect("empty input is an empty frame"));
        assert_eq!(Vec::<u8>::new(), unstuff(&[0x00]).expect("bare delimiter is an empty frame"));
    }

    #[test]
    fn unstuff_rejects_truncated_run() {
        let result = unstuff(&[0x05, 0x01]);
        assert_matches!(
            result,
            Err(FramingError::TruncatedRun {
                position: 0,
                claimed: 4,
                available: 1,
            })
        );
    }
}
