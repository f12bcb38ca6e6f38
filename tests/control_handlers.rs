use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crispy_upload::{
    AckStatus, BankHandler, BootState, ChannelError, Command, CommandError, DeviceSession,
    DeviceStatus, ExchangeError, FakeChannel, FakeDeviceConfig, FakeDeviceHandle, Opcode,
    RebootHandler, ScriptedChannel, ScriptedResponses, StatusHandler, UploadHandler,
    UploadRequest, WipeHandler,
};

fn fake_session(config: &FakeDeviceConfig) -> (DeviceSession, FakeDeviceHandle) {
    let channel = FakeChannel::new(config);
    let handle = channel.handle();
    (DeviceSession::new(Box::new(channel)), handle)
}

#[test]
fn status_reports_preloaded_banks() {
    let config = FakeDeviceConfig::builder()
        .active_bank(1)
        .version_a(3)
        .version_b(4)
        .build();
    let (mut session, _handle) = fake_session(&config);

    let status = StatusHandler::get_status(&mut session).expect("status should be answered");

    assert_eq!(DeviceStatus::new(1, 3, 4, BootState::UpdateMode), status);
    assert_eq!(4, status.active_version());
}

#[test]
fn status_reports_receiving_mid_update() {
    let (mut session, _handle) = fake_session(&FakeDeviceConfig::default());
    session
        .expect_ack(
            &Command::StartUpdate {
                bank: 1,
                size: 16,
                crc32: 0,
                version: 1,
            },
            Duration::from_secs(1),
        )
        .expect("start should be acknowledged");

    let status = StatusHandler::get_status(&mut session).expect("status should be answered");

    assert_eq!(BootState::Receiving, status.state());
}

#[test]
fn set_active_bank_switches_to_a_valid_bank() {
    let config = FakeDeviceConfig::builder().version_a(1).version_b(2).build();
    let (mut session, handle) = fake_session(&config);

    BankHandler::set_active_bank(&mut session, 1).expect("bank B holds a valid image");

    assert_eq!(1, handle.status().active_bank());
    assert_eq!(
        vec![Command::SetActiveBank { bank: 1 }],
        handle.received_commands()
    );
}

#[rstest]
#[case::empty_bank(1, AckStatus::BankInvalid)]
#[case::out_of_range(2, AckStatus::BankInvalid)]
fn set_active_bank_rejections_carry_the_status(#[case] bank: u8, #[case] expected: AckStatus) {
    let (mut session, handle) = fake_session(&FakeDeviceConfig::builder().version_a(1).build());

    let result = BankHandler::set_active_bank(&mut session, bank);

    assert_matches!(
        result,
        Err(CommandError::Rejected { opcode: Opcode::SetActiveBank, status }) if status == expected
    );
    assert_eq!(0, handle.status().active_bank());
}

#[test]
fn set_active_bank_on_an_erased_bank_fails_verification() {
    let config = FakeDeviceConfig::builder().version_a(1).version_b(2).build();
    let (mut session, _handle) = fake_session(&config);
    session
        .expect_ack(
            &Command::StartUpdate {
                bank: 1,
                size: 4,
                crc32: 0,
                version: 3,
            },
            Duration::from_secs(1),
        )
        .expect("start should be acknowledged");
    session
        .expect_ack(&Command::Reboot, Duration::from_secs(1))
        .expect("reboot should abandon the update");

    let result = BankHandler::set_active_bank(&mut session, 1);

    assert_matches!(
        result,
        Err(CommandError::Rejected {
            opcode: Opcode::SetActiveBank,
            status: AckStatus::CrcError,
        })
    );
}

#[test]
fn wipe_clears_both_banks() {
    let config = FakeDeviceConfig::builder()
        .active_bank(1)
        .version_a(1)
        .version_b(2)
        .build();
    let (mut session, handle) = fake_session(&config);

    WipeHandler::wipe_all(&mut session).expect("idle device should accept wipe");

    assert_eq!(
        DeviceStatus::new(0, 0, 0, BootState::UpdateMode),
        handle.status()
    );
    assert_eq!(None, handle.bank_image(0));
    assert_eq!(None, handle.bank_image(1));
}

#[test]
fn wipe_is_refused_while_receiving() {
    let (mut session, _handle) = fake_session(&FakeDeviceConfig::default());
    session
        .expect_ack(
            &Command::StartUpdate {
                bank: 0,
                size: 8,
                crc32: 0,
                version: 1,
            },
            Duration::from_secs(1),
        )
        .expect("start should be acknowledged");

    assert_matches!(
        WipeHandler::wipe_all(&mut session),
        Err(CommandError::Rejected {
            opcode: Opcode::WipeAll,
            status: AckStatus::BadState,
        })
    );
}

#[test]
fn reboot_is_acknowledged_and_counted() {
    let (mut session, handle) = fake_session(&FakeDeviceConfig::default());

    RebootHandler::reboot(&mut session).expect("reboot should be acknowledged");

    assert_eq!(1, handle.reboot_count());
}

#[test]
fn reboot_after_upload_keeps_the_new_image() {
    let (mut session, handle) = fake_session(&FakeDeviceConfig::default());
    let image = vec![0xC3; 1500];

    UploadHandler::upload(&mut session, UploadRequest::new(0, 8, image.clone()))
        .expect("upload should succeed");
    RebootHandler::reboot(&mut session).expect("reboot should be acknowledged");

    assert_eq!(Some(image), handle.bank_image(0));
    assert_eq!(8, handle.status().active_version());
}

#[test]
fn silent_device_surfaces_the_exchange_timeout() {
    let channel = ScriptedChannel::new(ScriptedResponses::default());
    let mut session =
        DeviceSession::new(Box::new(channel)).with_response_timeout(Duration::from_millis(25));

    assert_matches!(
        RebootHandler::reboot(&mut session),
        Err(CommandError::Exchange {
            opcode: Opcode::Reboot,
            source: ExchangeError::Channel(ChannelError::Timeout { timeout_ms: 25 }),
        })
    );
}
