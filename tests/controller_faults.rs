//! Controller contract: bounds checks, connection preconditions, and fault mapping.

use starlight_daq::adapters::{LinkFault, MockAdapter, MockCall};
use starlight_daq::error::{DeviceError, FaultKind, Operation};
use starlight_daq::instrument::DeviceController;
use starlight_daq::types::{ConnectionState, DetectorReading, DeviceIdentity, LineFrequency};

async fn connected(serial: &str) -> (DeviceController, MockAdapter) {
    let link = MockAdapter::new(serial);
    let mut device = DeviceController::new("under test", Box::new(link.clone()));
    assert!(device.connect().await, "mock device should connect");
    link.clear_log();
    (device, link)
}

#[tokio::test]
async fn test_out_of_range_channel_never_reaches_link() {
    let (mut device, link) = connected("0105").await;
    for channel in [5u8, 6, 42, u8::MAX] {
        let err = device
            .set_light_source_current(channel, 0.5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FaultKind::InvalidArgument);
        assert!(err.to_string().contains("channel"), "{err}");
    }
    assert_eq!(link.command_count(), 0);
}

#[tokio::test]
async fn test_out_of_range_current_never_reaches_link() {
    let (mut device, link) = connected("0105").await;
    for current in [-0.001, 1.0001, 5.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let err = device.set_light_source_current(2, current).await.unwrap_err();
        match err {
            DeviceError::InvalidArgument { parameter, .. } => {
                assert_eq!(parameter, "current_amps")
            }
            other => panic!("expected InvalidArgument for {current}, got {other:?}"),
        }
    }
    assert_eq!(link.command_count(), 0);
}

#[tokio::test]
async fn test_current_bounds_are_inclusive() {
    let (mut device, link) = connected("0105").await;
    device.set_light_source_current(0, 0.0).await.unwrap();
    device.set_light_source_current(4, 1.0).await.unwrap();
    assert_eq!(
        link.calls(),
        vec![
            MockCall::TurnOnChannel {
                channel: 0,
                amps: 0.0
            },
            MockCall::TurnOnChannel {
                channel: 4,
                amps: 1.0
            },
        ]
    );
}

#[tokio::test]
async fn test_out_of_range_gain_never_reaches_link() {
    let (mut device, link) = connected("0105").await;
    for gain in [6u8, 10, u8::MAX] {
        let err = device.set_detector_manual_gain(gain).await.unwrap_err();
        assert_eq!(err.kind(), FaultKind::InvalidArgument);
    }
    assert_eq!(link.command_count(), 0);

    for gain in 0..=5u8 {
        device.set_detector_manual_gain(gain).await.unwrap();
    }
    assert_eq!(link.command_count(), 6);
}

#[tokio::test]
async fn test_every_operation_requires_connection() {
    let link = MockAdapter::new("0105");
    let mut device = DeviceController::new("idle", Box::new(link.clone()));

    let results = [
        device.set_light_source_current(1, 0.1).await.unwrap_err(),
        device.turn_off_light_source(1).await.unwrap_err(),
        device.turn_off_all_light_sources().await.unwrap_err(),
        device.read_detector_value().await.unwrap_err(),
        device.zero_detector().await.unwrap_err(),
        device.set_detector_auto_gain().await.unwrap_err(),
        device.set_detector_manual_gain(2).await.unwrap_err(),
        device
            .set_detector_line_frequency(LineFrequency::Hz60)
            .await
            .unwrap_err(),
    ];
    for err in results {
        assert_eq!(err.kind(), FaultKind::NotConnected, "{err}");
    }
    assert_eq!(link.call_count(), 0);
}

#[tokio::test]
async fn test_not_connected_wins_over_bad_arguments() {
    let link = MockAdapter::new("0105");
    let mut device = DeviceController::new("idle", Box::new(link));
    let err = device.set_light_source_current(9, 3.0).await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::NotConnected);
}

#[tokio::test]
async fn test_device_not_connected_resets_state_for_any_operation() {
    let (mut device, link) = connected("1266").await;
    link.inject_next_failure(LinkFault::DeviceNotConnected);
    let err = device
        .set_detector_line_frequency(LineFrequency::Hz50)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DeviceError::ConnectionLost {
            operation: Operation::SetDetectorLineFrequency {
                frequency: LineFrequency::Hz50
            }
        }
    );
    assert_eq!(device.state(), ConnectionState::Disconnected);
    assert_eq!(device.identity(), &DeviceIdentity::Disconnected);

    // Further commands are refused locally
    let err = device.zero_detector().await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::NotConnected);
}

/// Issue command `index` of every command that reaches the link.
async fn run_command(device: &mut DeviceController, index: usize) -> Result<(), DeviceError> {
    match index {
        0 => device.set_light_source_current(2, 0.3).await,
        1 => device.turn_off_light_source(2).await,
        2 => device.turn_off_all_light_sources().await,
        3 => device.read_detector_value().await.map(|_| ()),
        4 => device.zero_detector().await,
        5 => device.set_detector_auto_gain().await,
        6 => device.set_detector_manual_gain(3).await,
        7 => {
            device
                .set_detector_line_frequency(LineFrequency::Hz60)
                .await
        }
        _ => unreachable!("no command {index}"),
    }
}

const COMMAND_COUNT: usize = 8;

#[tokio::test]
async fn test_connection_lost_from_every_command() {
    for index in 0..COMMAND_COUNT {
        let (mut device, link) = connected("0105").await;
        run_command(&mut device, index).await.unwrap();

        link.inject_next_failure(LinkFault::DeviceNotConnected);
        let err = run_command(&mut device, index).await.unwrap_err();
        assert_eq!(err.kind(), FaultKind::ConnectionLost, "command {index}: {err}");
        assert_eq!(device.state(), ConnectionState::Disconnected, "command {index}");
        assert_eq!(device.identity(), &DeviceIdentity::Disconnected, "command {index}");
        assert_eq!(device.serial_number(), None);

        // Nothing else reaches the link until a new connect
        let sent = link.command_count();
        assert_eq!(
            run_command(&mut device, index).await.unwrap_err().kind(),
            FaultKind::NotConnected
        );
        assert_eq!(link.command_count(), sent);

        assert!(device.connect().await, "command {index}");
        run_command(&mut device, index).await.unwrap();
    }
}

#[tokio::test]
async fn test_reconnect_after_connection_lost() {
    let (mut device, link) = connected("1266").await;
    link.set_device_gone(true);
    assert_eq!(
        device.read_detector_value().await.unwrap_err().kind(),
        FaultKind::ConnectionLost
    );
    assert!(!device.connect().await);

    link.set_device_gone(false);
    assert!(device.connect().await);
    assert_eq!(device.serial_number(), Some("1266"));
}

#[tokio::test]
async fn test_read_returns_value_and_gain_exactly() {
    let (mut device, link) = connected("0105").await;
    link.set_reading(12.5, 3);
    let reading = device.read_detector_value().await.unwrap();
    assert_eq!(
        reading,
        DetectorReading {
            value: 12.5,
            gain: 3
        }
    );
    assert_eq!(reading.to_string(), "Value: 12.5, Gain: 3");
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let link = MockAdapter::new("0105");
    let mut device = DeviceController::new("twice", Box::new(link.clone()));
    assert!(device.connect().await);
    assert!(device.connect().await);
    assert_eq!(link.connect_count(), 1);
    assert_eq!(device.serial_number(), Some("0105"));
}

#[tokio::test]
async fn test_transport_faults_keep_connection() {
    let (mut device, link) = connected("0105").await;
    link.inject_next_failure(LinkFault::SerialComError);
    link.inject_next_failure(LinkFault::WrongResponse);

    assert_eq!(
        device.read_detector_value().await.unwrap_err().kind(),
        FaultKind::Transport
    );
    assert_eq!(
        device.set_detector_auto_gain().await.unwrap_err().kind(),
        FaultKind::Protocol
    );
    assert!(device.is_connected());
    // No automatic retry
    assert_eq!(link.command_count(), 2);
}
