use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crispy_upload::codec::cobs::{FramingError, max_stuffed_len, stuff, unstuff};
use crispy_upload::codec::crc32::{Crc32, checksum};
use crispy_upload::codec::varint::{VarintError, decode_varint, encode_varint};
use crispy_upload::{
    AckStatus, BootState, Command, DeviceStatus, FRAME_DELIMITER, MAX_DATA_BLOCK_SIZE,
    MessageError, Response, decode_command, decode_response, encode_command, encode_response,
};

fn pseudo_random_bytes(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

#[rstest]
#[case::empty(Vec::new())]
#[case::all_zeros(vec![0; 600])]
#[case::no_zeros(vec![0x11; 600])]
#[case::exact_run(vec![0x22; 254])]
#[case::run_plus_zero([vec![0x33; 254], vec![0]].concat())]
#[case::noise(pseudo_random_bytes(4096, 7))]
fn stuffed_bytes_contain_no_delimiter_and_respect_bound(#[case] data: Vec<u8>) {
    let stuffed = stuff(&data);

    assert!(!stuffed.contains(&FRAME_DELIMITER));
    assert!(stuffed.len() <= max_stuffed_len(data.len()));
    assert_eq!(data, unstuff(&stuffed).expect("stuffed data should unstuff"));
}

#[test]
fn truncated_literal_run_is_a_framing_error() {
    assert_matches!(
        unstuff(&[0x05, 0x01, 0x02]),
        Err(FramingError::TruncatedRun { position: 0, claimed: 4, available: 2 })
    );
}

#[rstest]
#[case::one_block(pseudo_random_bytes(1024, 1))]
#[case::uneven(pseudo_random_bytes(3001, 2))]
#[case::image_sized(pseudo_random_bytes(64 * 1024, 3))]
fn checksum_matches_reference_crc(#[case] data: Vec<u8>) {
    assert_eq!(crc32fast::hash(&data), checksum(&data));
}

#[test]
fn streaming_checksum_matches_one_shot() {
    let data = pseudo_random_bytes(5000, 11);
    let mut hasher = Crc32::new();
    for chunk in data.chunks(MAX_DATA_BLOCK_SIZE) {
        hasher.update(chunk);
    }

    assert_eq!(checksum(&data), hasher.finalize());
}

#[rstest]
#[case::zero(0, &[0x00])]
#[case::one_byte_max(127, &[0x7F])]
#[case::two_bytes(128, &[0x80, 0x01])]
#[case::block_size(1024, &[0x80, 0x08])]
#[case::u32_max(u64::from(u32::MAX), &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F])]
fn varint_boundaries_encode_as_leb128(#[case] value: u64, #[case] expected: &[u8]) {
    assert_eq!(expected, encode_varint(value).as_slice());
    assert_eq!(Ok((value, expected.len())), decode_varint(expected, 0));
}

#[rstest]
#[case::empty(&[], VarintError::Truncated { offset: 0 })]
#[case::dangling_continuation(&[0x80, 0x80], VarintError::Truncated { offset: 0 })]
#[case::eleven_bytes(&[0xFF; 11], VarintError::Overflow { offset: 0 })]
#[case::bit_64_set(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x02], VarintError::Overflow { offset: 0 })]
fn malformed_varints_are_rejected(#[case] bytes: &[u8], #[case] expected: VarintError) {
    assert_eq!(Err(expected), decode_varint(bytes, 0));
}

#[test]
fn start_update_frame_has_expected_bytes() {
    let frame = encode_command(&Command::StartUpdate {
        bank: 1,
        size: 2048,
        crc32: 0x0000_0001,
        version: 42,
    });

    // code byte, opcode, bank, varint(2048), varint(1), varint(42), delimiter
    assert_eq!("0701018010012a00", hex::encode(frame.as_bytes()));
}

#[test]
fn every_command_frame_ends_with_its_only_delimiter() {
    let commands = [
        Command::GetStatus,
        Command::StartUpdate {
            bank: 0,
            size: 300,
            crc32: 0xDEAD_BEEF,
            version: 0,
        },
        Command::DataBlock {
            offset: 1024,
            data: pseudo_random_bytes(MAX_DATA_BLOCK_SIZE, 5),
        },
        Command::FinishUpdate,
        Command::Reboot,
        Command::SetActiveBank { bank: 0 },
        Command::WipeAll,
    ];

    for command in commands {
        let frame = encode_command(&command);
        let (last, body) = frame
            .as_bytes()
            .split_last()
            .expect("frames are never empty");
        assert_eq!(FRAME_DELIMITER, *last);
        assert!(!body.contains(&FRAME_DELIMITER), "{command:?}");
        assert_eq!(command, decode_command(frame.as_bytes()).expect("frame should decode"));
    }
}

#[rstest]
#[case::ack_ok(&[0x01, 0x01, 0x01, 0x00], Response::Ack { status: AckStatus::Ok })]
#[case::ack_crc_error(&[0x01, 0x02, 0x01], Response::Ack { status: AckStatus::CrcError })]
#[case::status(
    &[0x06, 0x01, 0x01, 0x03, 0x04, 0x02, 0x00],
    Response::Status(DeviceStatus::new(1, 3, 4, BootState::Receiving))
)]
fn known_response_frames_decode(#[case] frame: &[u8], #[case] expected: Response) {
    assert_eq!(Ok(expected), decode_response(frame));
}

#[rstest]
#[case::lone_delimiter(&[0x00], MessageError::EmptyResponse)]
#[case::ack_without_status(&[0x01, 0x01, 0x00], MessageError::TruncatedResponse { field: "status" })]
#[case::status_without_state(
    &[0x05, 0x01, 0x01, 0x03, 0x04, 0x00],
    MessageError::TruncatedResponse { field: "state" }
)]
#[case::unknown_kind(&[0x02, 0x07, 0x00], MessageError::UnknownResponseKind { kind: 7 })]
#[case::unknown_status(&[0x01, 0x02, 0x09, 0x00], MessageError::UnknownAckStatus { value: 9 })]
#[case::unknown_state(
    &[0x06, 0x01, 0x01, 0x03, 0x04, 0x03, 0x00],
    MessageError::UnknownBootState { value: 3 }
)]
fn malformed_response_frames_are_rejected(#[case] frame: &[u8], #[case] expected: MessageError) {
    assert_eq!(Err(expected), decode_response(frame));
}

#[test]
fn status_versions_above_u32_are_out_of_range() {
    let mut payload = vec![0x01, 0x00];
    payload.extend(encode_varint(u64::from(u32::MAX) + 1));
    payload.extend([0x00, 0x00]);
    let frame = crispy_upload::Frame::from_payload(&payload);

    assert_eq!(
        Err(MessageError::FieldOutOfRange {
            field: "version_a",
            value: u64::from(u32::MAX) + 1,
        }),
        decode_response(frame.as_bytes())
    );
}

#[test]
fn status_version_wider_than_u64_is_an_overflow() {
    let mut payload = vec![0x01, 0x00];
    payload.extend([0x80; 9]);
    payload.extend([0x02, 0x05, 0x00]);
    let frame = crispy_upload::Frame::from_payload(&payload);

    assert_eq!(
        Err(MessageError::Varint(VarintError::Overflow { offset: 2 })),
        decode_response(frame.as_bytes())
    );
}

#[test]
fn encoded_status_response_decodes_on_the_host() {
    let status = DeviceStatus::new(0, 300, 70_000, BootState::UpdateMode);
    let frame = encode_response(&Response::Status(status));

    assert_eq!(Ok(Response::Status(status)), decode_response(frame.as_bytes()));
}
