use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::btleplug_backend::BtleplugBackend;
use super::fake_backend::{FakeBackend, FakeBackendConfig};
use super::model::DiscoveredDevice;
use crate::error::InteractionError;

/// Builds a hardware client backed by the real BLE stack.
pub(crate) fn real_hardware_client() -> Box<dyn HardwareClient> {
    Box::new(BtleplugBackend::new())
}

/// Builds a hardware client backed by fixtures.
pub(crate) fn fake_hardware_client(config: FakeBackendConfig) -> Box<dyn HardwareClient> {
    Box::new(FakeBackend::new(config))
}

/// Transport capabilities the session controller relies on.
#[async_trait]
pub trait HardwareClient: Debug + Send + Sync {
    /// Collects peripherals advertising during the scan window.
    async fn scan(&self, window: Duration) -> Result<Vec<DiscoveredDevice>, InteractionError>;

    /// Opens a GATT connection to a previously discovered peripheral.
    async fn connect(&self, device: &DiscoveredDevice) -> Result<DeviceSession, InteractionError>;
}

/// Operations on one open connection.
#[async_trait]
pub(crate) trait ConnectedBleSession: Debug + Send + Sync {
    fn device(&self) -> &DiscoveredDevice;

    async fn write_characteristic(
        &self,
        uuid: Uuid,
        payload: &[u8],
    ) -> Result<(), InteractionError>;

    async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>, InteractionError>;

    async fn close(self: Box<Self>) -> Result<(), InteractionError>;
}

/// An open connection to one peripheral.
#[derive(Debug)]
pub struct DeviceSession {
    inner: Box<dyn ConnectedBleSession>,
}

impl DeviceSession {
    pub(crate) fn new(inner: Box<dyn ConnectedBleSession>) -> Self {
        Self { inner }
    }

    /// Returns the connected peripheral.
    #[must_use]
    pub fn device(&self) -> &DiscoveredDevice {
        self.inner.device()
    }

    /// Writes raw bytes to a characteristic.
    ///
    /// # Errors
    ///
    /// Returns an error if the characteristic is missing or the write fails.
    pub async fn write_characteristic(
        &self,
        uuid: Uuid,
        payload: &[u8],
    ) -> Result<(), InteractionError> {
        self.inner.write_characteristic(uuid, payload).await
    }

    /// Reads the current value of a characteristic.
    ///
    /// # Errors
    ///
    /// Returns an error if the characteristic is missing or the read fails.
    pub async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>, InteractionError> {
        self.inner.read_characteristic(uuid).await
    }

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to disconnect.
    pub async fn close(self) -> Result<(), InteractionError> {
        self.inner.close().await
    }
}
