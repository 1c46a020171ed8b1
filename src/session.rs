use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bon::Builder;
use serde::Serialize;
use serde_with::SerializeDisplay;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_stream::wrappers::WatchStream;
use tracing::field::Empty;
use tracing::{Span, debug, info, instrument, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::error::{InteractionError, SessionError};
use crate::hw::{DeviceSession, DiscoveredDevice, HardwareClient};
use crate::record::CargoForm;
use crate::registry::{DeviceProfile, DeviceRegistry};

const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
/// Extra time a transport gets to return results after its scan window.
const SCAN_GRACE: Duration = Duration::from_secs(2);
const REQUEST_COMMAND: &[u8] = b"get";

/// Timing bounds applied by the session controller.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Builder)]
pub struct SessionPolicy {
    #[builder(default = DEFAULT_SCAN_WINDOW)]
    scan_window: Duration,
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    connect_timeout: Duration,
    /// Pause between the `get` request and reading the data characteristic.
    ///
    /// The device has no ready signal, so this is a fixed wait.
    #[builder(default = DEFAULT_SETTLE_DELAY)]
    settle_delay: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SessionPolicy {
    #[must_use]
    pub fn scan_window(&self) -> Duration {
        self.scan_window
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }
}

/// Lifecycle of the single managed connection.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, SerializeDisplay)]
pub enum SessionState {
    #[display("disconnected")]
    Disconnected,
    #[display("connecting")]
    Connecting,
    #[display("connected")]
    Connected,
    #[display("disconnecting")]
    Disconnecting,
}

/// Result of a successful read exchange.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ReadOutcome {
    /// The device answered with an empty payload; the form was left alone.
    NoData,
    /// The form was replaced with the values parsed from `raw`.
    Record { form: CargoForm, raw: String },
}

/// Consistent view of the controller at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    state: SessionState,
    profile: Option<DeviceProfile>,
    device_name: Option<String>,
    form: CargoForm,
}

impl SessionSnapshot {
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the selected profile, if any.
    #[must_use]
    pub fn profile(&self) -> Option<&DeviceProfile> {
        self.profile.as_ref()
    }

    /// Returns the name of the connected device, if connected.
    #[must_use]
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    #[must_use]
    pub fn form(&self) -> &CargoForm {
        &self.form
    }
}

/// Connection resources, only touched by the operation holding the claim.
#[derive(Debug, Default)]
struct Link {
    discovered: HashMap<String, DiscoveredDevice>,
    session: Option<ActiveSession>,
}

#[derive(Debug)]
struct ActiveSession {
    connection: DeviceSession,
    device_name: String,
}

/// Values shown to the user; readable while an operation is running.
#[derive(Debug, Default)]
struct View {
    profile: Option<DeviceProfile>,
    device_name: Option<String>,
    form: CargoForm,
}

/// Moves the observable state to `settled` when dropped, including when the
/// owning operation is cancelled.
struct Transition<'a> {
    state: &'a watch::Sender<SessionState>,
    settled: SessionState,
}

impl<'a> Transition<'a> {
    fn begin(
        state: &'a watch::Sender<SessionState>,
        during: SessionState,
        fallback: SessionState,
    ) -> Self {
        state.send_replace(during);
        Self {
            state,
            settled: fallback,
        }
    }

    fn settle(mut self, settled: SessionState) {
        self.settled = settled;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        self.state.send_replace(self.settled);
    }
}

/// Owns the lifecycle of one BLE connection and the record form shown to
/// the user.
///
/// Every operation takes an exclusive claim on the controller. A call made
/// while another operation holds the claim fails with [`SessionError::Busy`]
/// instead of waiting.
#[derive(Debug)]
pub struct SessionController {
    transport: Box<dyn HardwareClient>,
    registry: DeviceRegistry,
    policy: SessionPolicy,
    link: tokio::sync::Mutex<Link>,
    view: Mutex<View>,
    state: watch::Sender<SessionState>,
}

impl SessionController {
    /// Creates a disconnected controller with no profile selected.
    #[must_use]
    pub fn new(
        transport: Box<dyn HardwareClient>,
        registry: DeviceRegistry,
        policy: SessionPolicy,
    ) -> Self {
        let (state, _receiver) = watch::channel(SessionState::Disconnected);
        Self {
            transport,
            registry,
            policy,
            link: tokio::sync::Mutex::new(Link::default()),
            view: Mutex::new(View::default()),
            state,
        }
    }

    /// Returns the registry the controller selects profiles from.
    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Streams the current state followed by every later change.
    ///
    /// Rapid successive transitions may be coalesced into the latest one.
    #[must_use]
    pub fn state_changes(&self) -> WatchStream<SessionState> {
        WatchStream::new(self.state.subscribe())
    }

    /// Reads the state, selected profile, connected device and form together.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let view = self.view();
        SessionSnapshot {
            state: self.state(),
            profile: view.profile.clone(),
            device_name: view.device_name.clone(),
            form: view.form.clone(),
        }
    }

    /// Replaces the edited form in one step.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] while another operation is running.
    pub fn replace_form(&self, form: CargoForm) -> Result<(), SessionError> {
        let _link = self.claim()?;
        self.view().form = form;
        Ok(())
    }

    /// Selects the profile used by later connects.
    ///
    /// An open connection is closed before the new profile takes effect.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Registry`] for unknown identifiers, leaving
    /// the current selection untouched.
    #[instrument(skip(self), level = "info")]
    pub async fn select_profile(&self, id: &str) -> Result<DeviceProfile, SessionError> {
        let mut link = self.claim()?;
        let profile = self.registry.get(id)?.clone();

        self.teardown(&mut link).await;
        self.view().profile = Some(profile.clone());
        info!(name = profile.name(), "profile selected");
        Ok(profile)
    }

    /// Connects to the device named by the selected profile and returns the
    /// connected device name.
    ///
    /// A device seen in an earlier scan is reused; otherwise a bounded scan
    /// runs first. Any existing connection is closed beforehand.
    ///
    /// # Errors
    ///
    /// Returns an error if no profile is selected, the device cannot be
    /// found, or the connection fails or times out. The controller is left
    /// disconnected in every failure case.
    #[instrument(
        skip(self),
        level = "info",
        fields(profile_id = Empty, device_name = Empty)
    )]
    pub async fn connect(&self) -> Result<String, SessionError> {
        let mut link = self.claim()?;
        let profile = self
            .view()
            .profile
            .clone()
            .ok_or(SessionError::NoProfileSelected)?;
        let span = Span::current();
        span.record("profile_id", profile.id());
        span.record("device_name", profile.name());

        self.teardown(&mut link).await;

        let transition = Transition::begin(
            &self.state,
            SessionState::Connecting,
            SessionState::Disconnected,
        );
        let device = self.resolve_device(&mut link, profile.name()).await?;

        span.pb_set_message(&format!("Connecting to {}", profile.name()));
        let connect_timeout = self.policy.connect_timeout;
        let connection = match timeout(connect_timeout, self.transport.connect(&device)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(source)) => {
                return Err(SessionError::Connect {
                    name: profile.name().to_string(),
                    source,
                });
            }
            Err(_elapsed) => {
                return Err(SessionError::ConnectTimeout {
                    name: profile.name().to_string(),
                    timeout_ms: connect_timeout.as_millis(),
                });
            }
        };

        let device_name = device
            .local_name()
            .unwrap_or(profile.name())
            .to_string();
        link.session = Some(ActiveSession {
            connection,
            device_name: device_name.clone(),
        });
        self.view().device_name = Some(device_name.clone());
        transition.settle(SessionState::Connected);
        info!(device_id = device.device_id(), "connected");
        Ok(device_name)
    }

    /// Closes the open connection, returning the disconnected device name.
    ///
    /// Returns `Ok(None)` when there was nothing to close. Failures while
    /// closing are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] while another operation is running.
    #[instrument(skip(self), level = "info")]
    pub async fn disconnect(&self) -> Result<Option<String>, SessionError> {
        let mut link = self.claim()?;
        Ok(self.teardown(&mut link).await)
    }

    /// Requests the record from the device and publishes it as the form.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected, the exchange fails, or the payload
    /// is not a UTF-8 JSON object. The form is unchanged on error.
    #[instrument(skip(self), level = "info", fields(payload_len = Empty))]
    pub async fn read(&self) -> Result<ReadOutcome, SessionError> {
        let link = self.claim()?;
        let session = link.session.as_ref().ok_or(SessionError::NotConnected)?;
        let profile = self.selected_profile()?;

        session
            .connection
            .write_characteristic(profile.request_characteristic_uuid(), REQUEST_COMMAND)
            .await
            .map_err(|source| SessionError::Read { source })?;
        sleep(self.policy.settle_delay).await;
        let payload = session
            .connection
            .read_characteristic(profile.data_characteristic_uuid())
            .await
            .map_err(|source| SessionError::Read { source })?;
        Span::current().record("payload_len", payload.len());

        let text = String::from_utf8(payload).map_err(|error| SessionError::MalformedRecord {
            reason: "payload is not valid UTF-8".to_string(),
            payload: String::from_utf8_lossy(error.as_bytes()).into_owned(),
        })?;
        let raw = text.trim();
        if raw.is_empty() {
            debug!("device returned an empty payload");
            return Ok(ReadOutcome::NoData);
        }

        let form = CargoForm::from_json(raw).map_err(|error| SessionError::MalformedRecord {
            reason: error.to_string(),
            payload: raw.to_string(),
        })?;
        self.view().form = form.clone();
        Ok(ReadOutcome::Record {
            form,
            raw: raw.to_string(),
        })
    }

    /// Validates the form and writes it to the data characteristic,
    /// returning the JSON text sent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] with every violation found, in
    /// which case nothing is sent. Also fails when not connected or when the
    /// write itself fails.
    #[instrument(skip(self), level = "info", fields(payload_len = Empty))]
    pub async fn write(&self) -> Result<String, SessionError> {
        let link = self.claim()?;
        let session = link.session.as_ref().ok_or(SessionError::NotConnected)?;
        let profile = self.selected_profile()?;

        let form = self.view().form.clone();
        let record = form.validate().map_err(SessionError::Validation)?;
        let json = record
            .to_wire_json()
            .map_err(|source| SessionError::Encode { source })?;
        Span::current().record("payload_len", json.len());

        session
            .connection
            .write_characteristic(profile.data_characteristic_uuid(), json.as_bytes())
            .await
            .map_err(|source| SessionError::Write { source })?;
        info!("record written");
        Ok(json)
    }

    fn claim(&self) -> Result<tokio::sync::MutexGuard<'_, Link>, SessionError> {
        self.link.try_lock().map_err(|_locked| SessionError::Busy)
    }

    fn view(&self) -> MutexGuard<'_, View> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn selected_profile(&self) -> Result<DeviceProfile, SessionError> {
        self.view()
            .profile
            .clone()
            .ok_or(SessionError::NoProfileSelected)
    }

    async fn teardown(&self, link: &mut Link) -> Option<String> {
        let active = link.session.take()?;
        let _transition = Transition::begin(
            &self.state,
            SessionState::Disconnecting,
            SessionState::Disconnected,
        );
        self.view().device_name = None;

        if let Err(error) = active.connection.close().await {
            warn!(?error, device_name = %active.device_name, "failed to close connection cleanly");
        }
        info!(device_name = %active.device_name, "disconnected");
        Some(active.device_name)
    }

    async fn resolve_device(
        &self,
        link: &mut Link,
        name: &str,
    ) -> Result<DiscoveredDevice, SessionError> {
        if let Some(device) = link.discovered.get(name) {
            info!(device_id = device.device_id(), "using previously discovered device");
            return Ok(device.clone());
        }

        Span::current().pb_set_message(&format!("Scanning for {name}"));
        let window = self.policy.scan_window;
        let devices = match timeout(window + SCAN_GRACE, self.transport.scan(window)).await {
            Ok(Ok(devices)) => devices,
            Ok(Err(source)) => {
                return Err(SessionError::Scan {
                    name: name.to_string(),
                    source,
                });
            }
            Err(_elapsed) => {
                return Err(SessionError::Scan {
                    name: name.to_string(),
                    source: InteractionError::ScanDeadlineExceeded {
                        window_ms: window.as_millis(),
                    },
                });
            }
        };

        let mut found = None;
        for device in devices {
            let Some(local_name) = device.local_name().map(str::to_string) else {
                continue;
            };
            if found.is_none() && local_name == name {
                found = Some(device.clone());
            }
            link.discovered.insert(local_name, device);
        }
        let mut names: Vec<&str> = link.discovered.keys().map(String::as_str).collect();
        names.sort_unstable();
        info!(devices = %names.join(", "), "discovered devices");

        found.ok_or_else(|| SessionError::DeviceNotFound {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tokio_stream::StreamExt as _;

    use super::*;
    use crate::hw::{FakeBackendConfig, FakeTransportProbe, fake_hardware_client};
    use crate::record::CargoField;
    use crate::registry::DEFAULT_PROFILE_ID;

    fn controller(config: FakeBackendConfig) -> SessionController {
        let registry = DeviceRegistry::builtin();
        SessionController::new(
            fake_hardware_client(config),
            registry,
            SessionPolicy::default(),
        )
    }

    fn fake_config(probe: &FakeTransportProbe) -> FakeBackendConfig {
        FakeBackendConfig::builder()
            .scan_fixture(
                "hci0|11:22|Speaker|-70;hci0|AA:BB|ESP32_BLE|-43"
                    .parse()
                    .expect("fixture should parse"),
            )
            .probe(probe.clone())
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn connect_requires_selected_profile() {
        let probe = FakeTransportProbe::default();
        let controller = controller(fake_config(&probe));

        let result = controller.connect().await;
        assert_matches!(result, Err(SessionError::NoProfileSelected));
        assert_eq!(0, probe.scan_count());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_reuses_cached_device_after_first_scan() {
        let probe = FakeTransportProbe::default();
        let controller = controller(fake_config(&probe));
        controller
            .select_profile(DEFAULT_PROFILE_ID)
            .await
            .expect("default profile should exist");

        let name = controller.connect().await.expect("first connect");
        assert_eq!("ESP32_BLE", name);
        controller.disconnect().await.expect("disconnect");
        controller.connect().await.expect("second connect");

        assert_eq!(1, probe.scan_count());
        assert_eq!(2, probe.connect_count());
        assert_eq!(1, probe.open_connections());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_connect_settles_back_to_disconnected() {
        let probe = FakeTransportProbe::default();
        let controller = controller(
            FakeBackendConfig::builder()
                .scan_fixture("hci0|AA:BB|ESP32_BLE|-43".parse().expect("fixture"))
                .probe(probe.clone())
                .connect_delay(Duration::from_secs(3))
                .build(),
        );
        controller
            .select_profile(DEFAULT_PROFILE_ID)
            .await
            .expect("default profile should exist");

        let attempt = timeout(Duration::from_secs(1), controller.connect()).await;
        assert_matches!(attempt, Err(_elapsed));
        assert_eq!(SessionState::Disconnected, controller.state());
        assert_eq!(None, controller.snapshot().device_name());
        assert_eq!(0, probe.open_connections());
    }

    #[tokio::test(start_paused = true)]
    async fn operations_are_rejected_while_connect_is_in_flight() {
        let probe = FakeTransportProbe::default();
        let controller = Arc::new(controller(
            FakeBackendConfig::builder()
                .scan_fixture("hci0|AA:BB|ESP32_BLE|-43".parse().expect("fixture"))
                .probe(probe.clone())
                .connect_delay(Duration::from_secs(3))
                .build(),
        ));
        controller
            .select_profile(DEFAULT_PROFILE_ID)
            .await
            .expect("default profile should exist");

        let mut states = controller.state_changes();
        let connecting = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.connect().await }
        });
        while let Some(state) = states.next().await {
            if state == SessionState::Connecting {
                break;
            }
        }

        assert_matches!(controller.read().await, Err(SessionError::Busy));
        assert_matches!(controller.disconnect().await, Err(SessionError::Busy));

        let connected = connecting.await.expect("connect task should not panic");
        assert_matches!(connected, Ok(name) if name == "ESP32_BLE");
        assert_eq!(SessionState::Connected, controller.state());
    }

    #[tokio::test(start_paused = true)]
    async fn read_rejects_non_object_payload_without_touching_form() {
        let probe = FakeTransportProbe::default();
        let controller = controller(fake_config(&probe));
        controller
            .select_profile(DEFAULT_PROFILE_ID)
            .await
            .expect("default profile should exist");
        controller.connect().await.expect("connect");
        let seeded = CargoForm::default()
            .with_field(CargoField::CargoId, "42")
            .with_field(CargoField::Address, "Dock 4");
        controller
            .replace_form(seeded.clone())
            .expect("no operation should be running");
        probe.set_read_payload(Some("[1, 2, 3]"));

        let result = controller.read().await;
        assert_matches!(result, Err(SessionError::MalformedRecord { payload, .. }) if payload == "[1, 2, 3]");
        assert_eq!(&seeded, controller.snapshot().form());
    }
}
