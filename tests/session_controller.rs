use std::time::Duration;

use assert_matches::assert_matches;
use blecargo::{
    CargoField, CargoForm, DEFAULT_PROFILE_ID, DeviceProfile, DeviceRegistry, FakeArgs,
    FakeTransportProbe, FieldViolation, InteractionError, ReadOutcome, RegistryError,
    SessionController, SessionError, SessionPolicy, SessionState, ViolationReason,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use uuid::uuid;

const SAMPLE_RECORD: &str = r#"{"CargoID":7,"Longitude":10.5,"Latitude":-3.2,"Address":"A","FullName":"B","Price":1.0,"Weight":2.0,"Description":"C"}"#;
const ESP32_FIXTURE: &str = "hci0|11:22:33|Speaker|-70;hci0|AA:BB:CC|ESP32_BLE|-43";

fn registry() -> DeviceRegistry {
    DeviceRegistry::from_profiles([
        DeviceRegistry::builtin()
            .get(DEFAULT_PROFILE_ID)
            .expect("built-in profile should exist")
            .clone(),
        DeviceProfile::new(
            "00002",
            "TRUCK_7",
            uuid!("0000180f-0000-1000-8000-00805f9b34fb"),
            uuid!("00002a19-0000-1000-8000-00805f9b34fb"),
            uuid!("00002a1a-0000-1000-8000-00805f9b34fb"),
        ),
    ])
}

fn fake_args(probe: &FakeTransportProbe) -> FakeArgs {
    FakeArgs::builder()
        .scan_fixture(ESP32_FIXTURE)
        .expect("fixture should parse")
        .probe(probe.clone())
        .build()
}

fn controller(fake: FakeArgs) -> SessionController {
    SessionController::new(
        blecargo::fake_hardware_client(fake),
        registry(),
        SessionPolicy::default(),
    )
}

async fn connected_controller(probe: &FakeTransportProbe) -> SessionController {
    let controller = controller(fake_args(probe));
    controller
        .select_profile(DEFAULT_PROFILE_ID)
        .await
        .expect("default profile should be selectable");
    controller.connect().await.expect("fake connect should succeed");
    controller
}

fn valid_form() -> CargoForm {
    CargoForm::default()
        .with_field(CargoField::CargoId, "42")
        .with_field(CargoField::Longitude, "10")
        .with_field(CargoField::Latitude, "20")
        .with_field(CargoField::Address, "X")
        .with_field(CargoField::FullName, "Y")
        .with_field(CargoField::Price, "1.5")
        .with_field(CargoField::Weight, "2.5")
        .with_field(CargoField::Description, "Z")
}

#[rstest]
#[case::builtin(DEFAULT_PROFILE_ID)]
#[case::configured("00002")]
#[tokio::test]
async fn select_profile_exposes_exactly_that_profile(#[case] id: &str) {
    let controller = controller(fake_args(&FakeTransportProbe::default()));
    let expected = registry().get(id).expect("profile should exist").clone();

    let selected = controller
        .select_profile(id)
        .await
        .expect("known profile should be selectable");

    assert_eq!(expected, selected);
    assert_eq!(Some(&expected), controller.snapshot().profile());
}

#[tokio::test]
async fn select_unknown_profile_keeps_previous_selection() {
    let controller = controller(fake_args(&FakeTransportProbe::default()));
    controller
        .select_profile("00002")
        .await
        .expect("known profile should be selectable");

    let result = controller.select_profile("99999").await;

    assert_matches!(
        result,
        Err(SessionError::Registry(RegistryError::NotFound { id })) if id == "99999"
    );
    assert_eq!(
        Some("00002"),
        controller.snapshot().profile().map(DeviceProfile::id)
    );
}

#[tokio::test(start_paused = true)]
async fn selecting_a_profile_while_connected_disconnects_first() {
    let probe = FakeTransportProbe::default();
    let controller = connected_controller(&probe).await;

    controller
        .select_profile("00002")
        .await
        .expect("known profile should be selectable");

    assert_eq!(0, probe.open_connections());
    assert_eq!(SessionState::Disconnected, controller.state());
    assert_eq!(None, controller.snapshot().device_name());
}

#[tokio::test(start_paused = true)]
async fn connecting_twice_tears_down_the_first_session() {
    let probe = FakeTransportProbe::default();
    let controller = connected_controller(&probe).await;

    controller.connect().await.expect("second connect should succeed");

    assert_eq!(2, probe.connect_count());
    assert_eq!(1, probe.open_connections());
    assert_eq!(SessionState::Connected, controller.state());
    assert_eq!(Some("ESP32_BLE"), controller.snapshot().device_name());
}

#[tokio::test(start_paused = true)]
async fn connect_reports_missing_device_with_suggestion() {
    let probe = FakeTransportProbe::default();
    let controller = controller(
        FakeArgs::builder()
            .scan_fixture("hci0|11:22:33|Speaker|-70")
            .expect("fixture should parse")
            .probe(probe.clone())
            .build(),
    );
    controller
        .select_profile(DEFAULT_PROFILE_ID)
        .await
        .expect("default profile should be selectable");

    let error = controller
        .connect()
        .await
        .expect_err("device is not advertising");

    assert_matches!(&error, SessionError::DeviceNotFound { name } if name == "ESP32_BLE");
    assert_eq!(
        Some("Ensure the device is powered on and advertising"),
        error.suggestion()
    );
    assert_eq!(SessionState::Disconnected, controller.state());
}

#[tokio::test(start_paused = true)]
async fn connect_times_out_after_policy_bound() {
    let probe = FakeTransportProbe::default();
    let controller = SessionController::new(
        blecargo::fake_hardware_client(
            FakeArgs::builder()
                .scan_fixture(ESP32_FIXTURE)
                .expect("fixture should parse")
                .connect_delay(Duration::from_secs(30))
                .probe(probe.clone())
                .build(),
        ),
        registry(),
        SessionPolicy::builder()
            .connect_timeout(Duration::from_secs(10))
            .build(),
    );
    controller
        .select_profile(DEFAULT_PROFILE_ID)
        .await
        .expect("default profile should be selectable");

    let started = tokio::time::Instant::now();
    let result = controller.connect().await;

    assert_matches!(
        result,
        Err(SessionError::ConnectTimeout { name, timeout_ms: 10_000 }) if name == "ESP32_BLE"
    );
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(0, probe.open_connections());
    assert_eq!(SessionState::Disconnected, controller.state());
}

#[tokio::test(start_paused = true)]
async fn connect_failure_leaves_session_cleared() {
    let probe = FakeTransportProbe::default();
    let controller = controller(
        FakeArgs::builder()
            .scan_fixture(ESP32_FIXTURE)
            .expect("fixture should parse")
            .connect_failure("pairing rejected")
            .probe(probe.clone())
            .build(),
    );
    controller
        .select_profile(DEFAULT_PROFILE_ID)
        .await
        .expect("default profile should be selectable");

    let error = controller.connect().await.expect_err("connect should fail");

    assert_matches!(error, SessionError::Connect { .. });
    assert_eq!(SessionState::Disconnected, controller.state());
    assert_eq!(None, controller.snapshot().device_name());
    assert_matches!(controller.read().await, Err(SessionError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn read_requires_connection() {
    let controller = controller(fake_args(&FakeTransportProbe::default()));

    assert_matches!(controller.read().await, Err(SessionError::NotConnected));
    assert_matches!(controller.write().await, Err(SessionError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn read_sends_request_then_populates_every_field() {
    let probe = FakeTransportProbe::default();
    let controller = connected_controller(&probe).await;
    probe.set_read_payload(Some(SAMPLE_RECORD));

    let started = tokio::time::Instant::now();
    let outcome = controller.read().await.expect("read should succeed");

    assert!(started.elapsed() >= Duration::from_secs(1));
    let ReadOutcome::Record { form, raw } = outcome else {
        panic!("expected a record, got {outcome:?}");
    };
    assert_eq!(SAMPLE_RECORD, raw);
    assert_eq!(
        vec!["7", "10.5", "-3.2", "A", "B", "1.0", "2.0", "C"],
        form.fields().map(|(_field, value)| value).collect::<Vec<_>>()
    );
    assert_eq!(&form, controller.snapshot().form());

    let writes = probe.writes();
    assert_eq!(1, writes.len());
    assert_eq!(
        uuid!("c0de1234-5678-9abc-def0-123456789abc"),
        writes[0].uuid()
    );
    assert_eq!(b"get", writes[0].payload());
}

#[rstest]
#[case::empty("")]
#[case::whitespace("  \n ")]
#[tokio::test(start_paused = true)]
async fn empty_read_reports_no_data_and_keeps_form(#[case] payload: &str) {
    let probe = FakeTransportProbe::default();
    let controller = connected_controller(&probe).await;
    controller
        .replace_form(valid_form())
        .expect("no operation should be running");
    probe.set_read_payload(Some(payload));

    let outcome = controller.read().await.expect("empty payload is not an error");

    assert_eq!(ReadOutcome::NoData, outcome);
    assert_eq!(&valid_form(), controller.snapshot().form());
}

#[tokio::test(start_paused = true)]
async fn write_with_out_of_range_longitude_sends_nothing() {
    let probe = FakeTransportProbe::default();
    let controller = connected_controller(&probe).await;
    controller
        .replace_form(valid_form().with_field(CargoField::Longitude, "200"))
        .expect("no operation should be running");

    let error = controller.write().await.expect_err("longitude is out of range");

    let SessionError::Validation(violations) = error else {
        panic!("expected a validation error, got {error:?}");
    };
    assert_eq!(1, violations.len());
    assert_eq!(CargoField::Longitude, violations[0].field());
    assert_eq!(
        &ViolationReason::OutOfRange {
            min: -180.0,
            max: 180.0
        },
        violations[0].reason()
    );
    assert!(probe.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn write_sends_every_value_as_a_string() {
    let probe = FakeTransportProbe::default();
    let controller = connected_controller(&probe).await;
    controller
        .replace_form(valid_form())
        .expect("no operation should be running");

    let sent = controller.write().await.expect("valid record should be sent");

    let writes = probe.writes();
    assert_eq!(1, writes.len());
    assert_eq!(
        uuid!("beb5483e-36e1-4688-b7f5-ea07361b26a8"),
        writes[0].uuid()
    );
    assert_eq!(sent, writes[0].payload_text());
    let payload: serde_json::Value =
        serde_json::from_str(&sent).expect("sent payload should be JSON");
    assert_eq!("42", payload["CargoID"]);
    assert_eq!("10.0", payload["Longitude"]);
    assert_eq!("20.0", payload["Latitude"]);
    assert_eq!("1.5", payload["Price"]);
}

#[tokio::test(start_paused = true)]
async fn write_transport_failure_is_reported() {
    let probe = FakeTransportProbe::default();
    let controller = controller(
        FakeArgs::builder()
            .scan_fixture(ESP32_FIXTURE)
            .expect("fixture should parse")
            .write_failure("link lost")
            .probe(probe.clone())
            .build(),
    );
    controller
        .select_profile(DEFAULT_PROFILE_ID)
        .await
        .expect("default profile should be selectable");
    controller.connect().await.expect("fake connect should succeed");
    controller
        .replace_form(valid_form())
        .expect("no operation should be running");

    assert_matches!(controller.write().await, Err(SessionError::Write { .. }));
    assert_eq!(SessionState::Connected, controller.state());
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_a_no_op_when_not_connected() {
    let probe = FakeTransportProbe::default();
    let controller = connected_controller(&probe).await;

    let first = controller.disconnect().await.expect("disconnect");
    let second = controller.disconnect().await.expect("disconnect");

    assert_eq!(Some("ESP32_BLE".to_string()), first);
    assert_eq!(None, second);
    assert_eq!(0, probe.open_connections());
}

#[tokio::test(start_paused = true)]
async fn scan_overrunning_its_window_fails_with_deadline() {
    let probe = FakeTransportProbe::default();
    let controller = SessionController::new(
        blecargo::fake_hardware_client(
            FakeArgs::builder()
                .scan_fixture(ESP32_FIXTURE)
                .expect("fixture should parse")
                .discovery_delay(Duration::from_secs(30))
                .probe(probe.clone())
                .build(),
        ),
        registry(),
        SessionPolicy::builder()
            .scan_window(Duration::from_secs(5))
            .build(),
    );
    controller
        .select_profile(DEFAULT_PROFILE_ID)
        .await
        .expect("default profile should be selectable");

    let started = tokio::time::Instant::now();
    let result = controller.connect().await;

    assert_matches!(
        result,
        Err(SessionError::Scan {
            source: InteractionError::ScanDeadlineExceeded { window_ms: 5_000 },
            ..
        })
    );
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(0, probe.connect_count());
    assert_eq!(SessionState::Disconnected, controller.state());
}

#[tokio::test(start_paused = true)]
async fn stale_cached_device_surfaces_as_connect_failure() {
    let probe = FakeTransportProbe::default();
    let controller = connected_controller(&probe).await;
    controller.disconnect().await.expect("disconnect");
    probe.set_unreachable(true);

    let error = controller
        .connect()
        .await
        .expect_err("device went out of range");

    assert_matches!(error, SessionError::Connect { .. });
    assert_eq!(1, probe.scan_count());
    assert_eq!(0, probe.open_connections());
    assert_eq!(SessionState::Disconnected, controller.state());
    assert_eq!(None, controller.snapshot().device_name());
}

#[tokio::test(start_paused = true)]
async fn disconnect_swallows_close_failure_and_clears_session() {
    let controller = controller(
        FakeArgs::builder()
            .scan_fixture(ESP32_FIXTURE)
            .expect("fixture should parse")
            .close_failure("link dropped")
            .build(),
    );
    controller
        .select_profile(DEFAULT_PROFILE_ID)
        .await
        .expect("default profile should be selectable");
    controller.connect().await.expect("fake connect should succeed");

    let disconnected = controller
        .disconnect()
        .await
        .expect("close failures are not raised");

    assert_eq!(Some("ESP32_BLE".to_string()), disconnected);
    assert_eq!(SessionState::Disconnected, controller.state());
    assert_eq!(None, controller.snapshot().device_name());
    assert_matches!(controller.read().await, Err(SessionError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn write_rejects_text_fields_the_device_never_sent() {
    let probe = FakeTransportProbe::default();
    let controller = connected_controller(&probe).await;
    probe.set_read_payload(Some(
        r#"{"CargoID":7,"Longitude":1,"Latitude":2,"Price":1,"Weight":2}"#,
    ));
    controller.read().await.expect("partial record should be read");

    let error = controller
        .write()
        .await
        .expect_err("absent fields should not be sent");

    let SessionError::Validation(violations) = error else {
        panic!("expected a validation error, got {error:?}");
    };
    assert_eq!(
        vec![CargoField::Address, CargoField::FullName, CargoField::Description],
        violations.iter().map(FieldViolation::field).collect::<Vec<_>>()
    );
    assert!(
        violations
            .iter()
            .all(|violation| violation.reason() == &ViolationReason::Missing)
    );
    let writes = probe.writes();
    assert_eq!(1, writes.len());
    assert_eq!(b"get", writes[0].payload());
}
