use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use super::hardware::{ConnectedBleSession, DeviceSession, HardwareClient};
use super::model::{CharacteristicWrite, DiscoveredDevice, PeripheralHandle};
use crate::error::{FixtureError, InteractionError};

/// Parsed fake scan fixture records.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct ScanFixture {
    devices: Vec<DiscoveredDevice>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let devices = parse_scan_fixture(value)?;
        Ok(Self { devices })
    }
}

/// Settings for constructing a fake hardware backend.
#[derive(Debug, Builder)]
pub(crate) struct FakeBackendConfig {
    scan_fixture: ScanFixture,
    probe: FakeTransportProbe,
    #[builder(default)]
    discovery_delay: Duration,
    #[builder(default)]
    connect_delay: Duration,
    connect_failure: Option<String>,
    write_failure: Option<String>,
    close_failure: Option<String>,
}

/// Shared view into the fake transport, used to script reads and observe
/// what the controller did.
#[derive(Debug, Clone, Default)]
pub struct FakeTransportProbe {
    state: Arc<ProbeState>,
}

#[derive(Debug, Default)]
struct ProbeState {
    read_payload: Mutex<Option<String>>,
    writes: Mutex<Vec<CharacteristicWrite>>,
    scans: AtomicUsize,
    connects: AtomicUsize,
    open_connections: AtomicUsize,
    unreachable: AtomicBool,
}

impl FakeTransportProbe {
    /// Sets the text returned by the next data-characteristic reads.
    ///
    /// `None` makes reads return an empty payload.
    pub fn set_read_payload(&self, payload: Option<&str>) {
        *lock(&self.state.read_payload) = payload.map(str::to_string);
    }

    /// Marks every fixture device as out of range, so connects fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Returns every characteristic write issued so far.
    #[must_use]
    pub fn writes(&self) -> Vec<CharacteristicWrite> {
        lock(&self.state.writes).clone()
    }

    /// Returns how many scans were started.
    #[must_use]
    pub fn scan_count(&self) -> usize {
        self.state.scans.load(Ordering::SeqCst)
    }

    /// Returns how many connections were opened.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Returns how many connections are open and not yet closed.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state.open_connections.load(Ordering::SeqCst)
    }

    fn read_payload(&self) -> Vec<u8> {
        lock(&self.state.read_payload)
            .as_deref()
            .map(|payload| payload.as_bytes().to_vec())
            .unwrap_or_default()
    }

    fn record_write(&self, uuid: Uuid, payload: &[u8]) {
        lock(&self.state.writes).push(CharacteristicWrite::new(uuid, payload.to_vec()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Fake backend used in tests and non-hardware environments.
#[derive(Debug)]
pub(crate) struct FakeBackend {
    devices: Vec<DiscoveredDevice>,
    probe: FakeTransportProbe,
    discovery_delay: Duration,
    connect_delay: Duration,
    connect_failure: Option<String>,
    write_failure: Option<String>,
    close_failure: Option<String>,
}

impl FakeBackend {
    /// Creates a fake backend from explicit settings.
    pub(crate) fn new(config: FakeBackendConfig) -> Self {
        info!("using fake BLE backend");
        Self {
            devices: config.scan_fixture.into(),
            probe: config.probe,
            discovery_delay: config.discovery_delay,
            connect_delay: config.connect_delay,
            connect_failure: config.connect_failure,
            write_failure: config.write_failure,
            close_failure: config.close_failure,
        }
    }
}

#[async_trait]
impl HardwareClient for FakeBackend {
    async fn scan(&self, window: Duration) -> Result<Vec<DiscoveredDevice>, InteractionError> {
        self.probe.state.scans.fetch_add(1, Ordering::SeqCst);
        debug!(window_ms = window.as_millis(), "fake scan started");
        if !self.discovery_delay.is_zero() {
            sleep(self.discovery_delay).await;
        }
        Ok(self.devices.clone())
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<DeviceSession, InteractionError> {
        if !matches!(device.handle(), PeripheralHandle::Fake) {
            return Err(InteractionError::ForeignDeviceHandle);
        }
        if !self.connect_delay.is_zero() {
            sleep(self.connect_delay).await;
        }
        if let Some(reason) = &self.connect_failure {
            return Err(InteractionError::InjectedFailure {
                reason: reason.clone(),
            });
        }
        if self.probe.state.unreachable.load(Ordering::SeqCst) {
            return Err(InteractionError::InjectedFailure {
                reason: "device out of range".to_string(),
            });
        }

        self.probe.state.connects.fetch_add(1, Ordering::SeqCst);
        self.probe
            .state
            .open_connections
            .fetch_add(1, Ordering::SeqCst);
        Ok(DeviceSession::new(Box::new(FakeDeviceSession {
            device: device.clone(),
            probe: self.probe.clone(),
            write_failure: self.write_failure.clone(),
            close_failure: self.close_failure.clone(),
        })))
    }
}

/// A connected fake session.
#[derive(Debug)]
struct FakeDeviceSession {
    device: DiscoveredDevice,
    probe: FakeTransportProbe,
    write_failure: Option<String>,
    close_failure: Option<String>,
}

#[async_trait]
impl ConnectedBleSession for FakeDeviceSession {
    fn device(&self) -> &DiscoveredDevice {
        &self.device
    }

    async fn write_characteristic(
        &self,
        uuid: Uuid,
        payload: &[u8],
    ) -> Result<(), InteractionError> {
        if let Some(reason) = &self.write_failure {
            return Err(InteractionError::InjectedFailure {
                reason: reason.clone(),
            });
        }
        self.probe.record_write(uuid, payload);
        Ok(())
    }

    async fn read_characteristic(&self, _uuid: Uuid) -> Result<Vec<u8>, InteractionError> {
        Ok(self.probe.read_payload())
    }

    async fn close(self: Box<Self>) -> Result<(), InteractionError> {
        if let Some(reason) = &self.close_failure {
            return Err(InteractionError::InjectedFailure {
                reason: reason.clone(),
            });
        }
        self.probe
            .state
            .open_connections
            .fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<DiscoveredDevice>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    raw_fixture
        .split(';')
        .map(parse_scan_record)
        .collect::<Result<Vec<_>, _>>()
}

fn parse_scan_record(raw_record: &str) -> Result<DiscoveredDevice, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(FixtureError::InvalidRecordFieldCount);
    }
    if fields.iter().any(|field| field.is_empty()) {
        return Err(FixtureError::EmptyRecordField);
    }

    let local_name = if fields[2] == "-" {
        None
    } else {
        Some(fields[2].to_string())
    };
    let rssi = if fields[3] == "-" {
        None
    } else {
        Some(fields[3].parse::<i16>()?)
    };

    Ok(DiscoveredDevice::new(
        fields[0].to_string(),
        fields[1].to_string(),
        local_name,
        rssi,
        PeripheralHandle::Fake,
    ))
}
