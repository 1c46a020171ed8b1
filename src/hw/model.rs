use btleplug::platform::Peripheral;
use serde::Serialize;
use uuid::Uuid;

/// Backend-specific handle to a discovered peripheral.
#[derive(Debug, Clone)]
pub(crate) enum PeripheralHandle {
    Btleplug(Peripheral),
    Fake,
}

/// A BLE peripheral seen during a scan.
///
/// The handle stays valid for as long as the platform keeps the peripheral
/// around; a peripheral that went out of range only shows up as a failed
/// connect.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    adapter_name: String,
    device_id: String,
    local_name: Option<String>,
    rssi: Option<i16>,
    #[serde(skip)]
    handle: PeripheralHandle,
}

impl DiscoveredDevice {
    pub(crate) fn new(
        adapter_name: String,
        device_id: String,
        local_name: Option<String>,
        rssi: Option<i16>,
        handle: PeripheralHandle,
    ) -> Self {
        Self {
            adapter_name,
            device_id,
            local_name,
            rssi,
            handle,
        }
    }

    /// Returns the adapter name used to discover this device.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Returns the backend-specific device identifier.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the advertised local name, if it is present and non-empty.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Returns the RSSI observed during the scan, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    pub(crate) fn handle(&self) -> &PeripheralHandle {
        &self.handle
    }
}

/// One characteristic write observed by the fake transport.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CharacteristicWrite {
    uuid: Uuid,
    payload: Vec<u8>,
}

impl CharacteristicWrite {
    pub(crate) fn new(uuid: Uuid, payload: Vec<u8>) -> Self {
        Self { uuid, payload }
    }

    /// Returns the characteristic written to.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the bytes written.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the payload decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
