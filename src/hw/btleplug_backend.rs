use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::OnceCell;
use tokio::time::sleep;
use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

use super::hardware::{ConnectedBleSession, DeviceSession, HardwareClient};
use super::model::{DiscoveredDevice, PeripheralHandle};
use crate::error::InteractionError;

/// Hardware backend backed by `btleplug`.
#[derive(Debug, Default)]
pub(crate) struct BtleplugBackend {
    manager: OnceCell<Manager>,
}

impl BtleplugBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    async fn manager(&self) -> Result<&Manager, InteractionError> {
        self.manager
            .get_or_try_init(|| async { Manager::new().await.map_err(InteractionError::from) })
            .await
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<AdapterHandle>, InteractionError> {
        let adapters = self.manager().await?.adapters().await?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let name = adapter.adapter_info().await?;
            handles.push(AdapterHandle { adapter, name });
        }
        Ok(handles)
    }
}

#[async_trait]
impl HardwareClient for BtleplugBackend {
    #[instrument(skip(self), level = "debug", fields(window_ms = window.as_millis()))]
    async fn scan(&self, window: Duration) -> Result<Vec<DiscoveredDevice>, InteractionError> {
        let adapters = self.adapters().await?;
        info!(adapter_count = adapters.len(), "starting bounded BLE scan");

        for handle in &adapters {
            handle.adapter.start_scan(ScanFilter::default()).await?;
        }
        sleep(window).await;

        let mut devices = Vec::new();
        for handle in &adapters {
            for peripheral in handle.adapter.peripherals().await? {
                let Some(properties) = peripheral.properties().await? else {
                    continue;
                };
                devices.push(DiscoveredDevice::new(
                    handle.name.clone(),
                    peripheral.id().to_string(),
                    properties.local_name,
                    properties.rssi,
                    PeripheralHandle::Btleplug(peripheral),
                ));
            }
        }

        for handle in &adapters {
            if let Err(error) = handle.adapter.stop_scan().await {
                debug!(?error, "failed to stop adapter scan cleanly");
            }
        }

        debug!(device_count = devices.len(), "scan finished");
        Ok(devices)
    }

    #[instrument(skip(self, device), level = "debug", fields(device_id = device.device_id()))]
    async fn connect(&self, device: &DiscoveredDevice) -> Result<DeviceSession, InteractionError> {
        let PeripheralHandle::Btleplug(peripheral) = device.handle() else {
            return Err(InteractionError::ForeignDeviceHandle);
        };
        let peripheral = peripheral.clone();

        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        if let Err(error) = peripheral.discover_services().await {
            if let Err(disconnect_error) = peripheral.disconnect().await {
                debug!(
                    ?disconnect_error,
                    "failed to disconnect after service discovery error"
                );
            }
            return Err(error.into());
        }

        let characteristics = characteristics_by_uuid(&peripheral);
        info!(
            characteristic_count = characteristics.len(),
            "connected to peripheral"
        );
        Ok(DeviceSession::new(Box::new(RealDeviceSession {
            device: device.clone(),
            characteristics,
            peripheral,
        })))
    }
}

/// Active session bound to a real peripheral.
#[derive(Debug)]
struct RealDeviceSession {
    device: DiscoveredDevice,
    characteristics: HashMap<Uuid, Characteristic>,
    peripheral: Peripheral,
}

impl RealDeviceSession {
    fn characteristic_for(&self, uuid: Uuid) -> Result<&Characteristic, InteractionError> {
        self.characteristics
            .get(&uuid)
            .ok_or(InteractionError::MissingCharacteristic { uuid })
    }
}

#[async_trait]
impl ConnectedBleSession for RealDeviceSession {
    fn device(&self) -> &DiscoveredDevice {
        &self.device
    }

    #[instrument(skip(self, payload), level = "trace", fields(%uuid, payload_len = payload.len()))]
    async fn write_characteristic(
        &self,
        uuid: Uuid,
        payload: &[u8],
    ) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(uuid)?;
        let write_type = write_type_for(characteristic.properties).ok_or(
            InteractionError::UnsupportedOperation {
                uuid,
                operation: "write",
            },
        )?;
        trace!(?write_type, "writing characteristic");
        self.peripheral
            .write(characteristic, payload, write_type)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "trace", fields(%uuid))]
    async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>, InteractionError> {
        let characteristic = self.characteristic_for(uuid)?;
        if !characteristic.properties.contains(CharPropFlags::READ) {
            return Err(InteractionError::UnsupportedOperation {
                uuid,
                operation: "read",
            });
        }
        Ok(self.peripheral.read(characteristic).await?)
    }

    #[instrument(skip(self), level = "debug")]
    async fn close(self: Box<Self>) -> Result<(), InteractionError> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AdapterHandle {
    adapter: Adapter,
    name: String,
}

fn characteristics_by_uuid(peripheral: &Peripheral) -> HashMap<Uuid, Characteristic> {
    let mut characteristics = HashMap::new();
    for service in peripheral.services() {
        for characteristic in service.characteristics {
            characteristics
                .entry(characteristic.uuid)
                .or_insert(characteristic);
        }
    }
    characteristics
}

/// Acknowledged writes are preferred so transport failures surface to the caller.
fn write_type_for(properties: CharPropFlags) -> Option<WriteType> {
    if properties.contains(CharPropFlags::WRITE) {
        Some(WriteType::WithResponse)
    } else if properties.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
        Some(WriteType::WithoutResponse)
    } else {
        None
    }
}
