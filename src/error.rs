use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::record::FieldViolation;

/// Errors returned by BLE transport operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("scan did not finish within {window_ms} ms")]
    ScanDeadlineExceeded { window_ms: u128 },
    #[error("characteristic `{uuid}` was not found on the connected device")]
    MissingCharacteristic { uuid: Uuid },
    #[error("characteristic `{uuid}` does not support {operation}")]
    UnsupportedOperation { uuid: Uuid, operation: &'static str },
    #[error("the discovered device handle does not belong to this backend")]
    ForeignDeviceHandle,
    #[error("fake transport failure: {reason}")]
    InjectedFailure { reason: String },
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Errors returned when parsing fake transport fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
}

/// Errors returned by the device registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read or write device configuration `{path}`")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("device configuration `{path}` is not valid")]
    ConfigFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("no device profile with id `{id}` is configured")]
    NotFound { id: String },
}

/// Errors returned by session controller operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("another session operation is already in progress")]
    Busy,
    #[error("no device profile is selected")]
    NoProfileSelected,
    #[error("not connected to any device")]
    NotConnected,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("scanning for `{name}` failed")]
    Scan {
        name: String,
        source: InteractionError,
    },
    #[error("`{name}` not found")]
    DeviceNotFound { name: String },
    #[error("connection attempt to `{name}` timed out after {timeout_ms} ms")]
    ConnectTimeout { name: String, timeout_ms: u128 },
    #[error("failed to connect to `{name}`")]
    Connect {
        name: String,
        source: InteractionError,
    },
    #[error("failed to exchange the record request with the device")]
    Read { source: InteractionError },
    #[error("received record is malformed: {reason}")]
    MalformedRecord { reason: String, payload: String },
    #[error("record has {} invalid field(s)", .0.len())]
    Validation(Vec<FieldViolation>),
    #[error("failed to encode the record")]
    Encode { source: serde_json::Error },
    #[error("failed to write the record to the device")]
    Write { source: InteractionError },
}

impl SessionError {
    /// Returns a troubleshooting hint for connection-family failures.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ConnectTimeout { .. } => Some("Check if the device is powered on and in range"),
            Self::DeviceNotFound { .. } => Some("Ensure the device is powered on and advertising"),
            Self::Connect { .. } | Self::Scan { .. } => {
                Some("Check Bluetooth settings and device compatibility")
            }
            _ => None,
        }
    }
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
}

/// Errors returned when parsing an interactive shell line.
#[derive(Debug, Error, PartialEq)]
pub(crate) enum ShellCommandError {
    #[error("unknown command `{0}`; type `help` for the list of commands")]
    UnknownCommand(String),
    #[error("`{command}` needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("unknown field `{0}`")]
    UnknownField(String),
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::timeout(
        SessionError::ConnectTimeout { name: "ESP32_BLE".into(), timeout_ms: 10_000 },
        Some("Check if the device is powered on and in range")
    )]
    #[case::not_found(
        SessionError::DeviceNotFound { name: "ESP32_BLE".into() },
        Some("Ensure the device is powered on and advertising")
    )]
    #[case::not_connected(SessionError::NotConnected, None)]
    fn suggestion_matches_failure_kind(
        #[case] error: SessionError,
        #[case] expected: Option<&'static str>,
    ) {
        assert_eq!(expected, error.suggestion());
    }

    #[test]
    fn connect_timeout_message_names_device_and_bound() {
        let error = SessionError::ConnectTimeout {
            name: "ESP32_BLE".into(),
            timeout_ms: 10_000,
        };
        assert_eq!(
            "connection attempt to `ESP32_BLE` timed out after 10000 ms",
            error.to_string()
        );
    }
}
