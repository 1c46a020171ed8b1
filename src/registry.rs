use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::{Uuid, uuid};

use crate::error::RegistryError;

const CONFIG_FILE_NAME: &str = "devices.json";

/// Identifier of the profile seeded into a fresh configuration file.
pub const DEFAULT_PROFILE_ID: &str = "00001";
const DEFAULT_DEVICE_NAME: &str = "ESP32_BLE";
const DEFAULT_SERVICE_UUID: Uuid = uuid!("4fafc201-1fb5-459e-8fcc-c5c9c331914b");
const DEFAULT_DATA_CHARACTERISTIC_UUID: Uuid = uuid!("beb5483e-36e1-4688-b7f5-ea07361b26a8");
const DEFAULT_REQUEST_CHARACTERISTIC_UUID: Uuid = uuid!("c0de1234-5678-9abc-def0-123456789abc");

/// BLE identifiers describing one target peripheral.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeviceProfile {
    id: String,
    name: String,
    service_uuid: Uuid,
    data_characteristic_uuid: Uuid,
    request_characteristic_uuid: Uuid,
}

impl DeviceProfile {
    /// Creates a device profile.
    ///
    /// ```
    /// use uuid::Uuid;
    ///
    /// let profile = blecargo::DeviceProfile::new(
    ///     "00002",
    ///     "CARGO_TAG",
    ///     Uuid::nil(),
    ///     Uuid::nil(),
    ///     Uuid::nil(),
    /// );
    /// assert_eq!("CARGO_TAG", profile.name());
    /// ```
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        service_uuid: Uuid,
        data_characteristic_uuid: Uuid,
        request_characteristic_uuid: Uuid,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            service_uuid,
            data_characteristic_uuid,
            request_characteristic_uuid,
        }
    }

    /// Returns the registry key.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the advertised name used to find the peripheral.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn service_uuid(&self) -> Uuid {
        self.service_uuid
    }

    /// Returns the characteristic carrying the JSON record.
    #[must_use]
    pub fn data_characteristic_uuid(&self) -> Uuid {
        self.data_characteristic_uuid
    }

    /// Returns the characteristic that receives the `get` command.
    #[must_use]
    pub fn request_characteristic_uuid(&self) -> Uuid {
        self.request_characteristic_uuid
    }

    fn default_profile() -> Self {
        Self::new(
            DEFAULT_PROFILE_ID,
            DEFAULT_DEVICE_NAME,
            DEFAULT_SERVICE_UUID,
            DEFAULT_DATA_CHARACTERISTIC_UUID,
            DEFAULT_REQUEST_CHARACTERISTIC_UUID,
        )
    }
}

/// On-disk shape of one profile entry.
#[derive(Debug, Serialize, Deserialize)]
struct ProfileEntry {
    name: String,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
    request_uuid: Uuid,
}

/// Device profiles keyed by identifier, loaded from the configuration file.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    path: Option<PathBuf>,
    profiles: BTreeMap<String, DeviceProfile>,
}

impl DeviceRegistry {
    /// Builds an in-memory registry that is never persisted.
    #[must_use]
    pub fn from_profiles(profiles: impl IntoIterator<Item = DeviceProfile>) -> Self {
        Self {
            path: None,
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.id.clone(), profile))
                .collect(),
        }
    }

    /// Builds an in-memory registry holding only the built-in default profile.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_profiles([DeviceProfile::default_profile()])
    }

    /// Loads the registry, seeding the file with the default profile if it
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written, or if it exists
    /// but does not hold a valid profile map.
    #[instrument(level = "debug", skip(path), fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            let registry = Self {
                path: Some(path.to_path_buf()),
                ..Self::builtin()
            };
            registry.save()?;
            info!("seeded device configuration with the default profile");
            return Ok(registry);
        }

        let raw = fs::read_to_string(path).map_err(|source| RegistryError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: BTreeMap<String, ProfileEntry> =
            serde_json::from_str(&raw).map_err(|source| RegistryError::ConfigFormat {
                path: path.to_path_buf(),
                source,
            })?;
        let profiles = entries
            .into_iter()
            .map(|(id, entry)| {
                let profile = DeviceProfile::new(
                    id.clone(),
                    entry.name,
                    entry.service_uuid,
                    entry.characteristic_uuid,
                    entry.request_uuid,
                );
                (id, profile)
            })
            .collect();

        Ok(Self {
            path: Some(path.to_path_buf()),
            profiles,
        })
    }

    /// Returns the per-user configuration file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        match ProjectDirs::from("dev", "blecargo", "blecargo") {
            Some(project_dirs) => project_dirs.config_dir().join(CONFIG_FILE_NAME),
            None => std::env::temp_dir()
                .join("blecargo")
                .join(CONFIG_FILE_NAME),
        }
    }

    /// Returns the file backing this registry, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Looks up a profile by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown identifiers.
    pub fn get(&self, id: &str) -> Result<&DeviceProfile, RegistryError> {
        self.profiles.get(id).ok_or_else(|| RegistryError::NotFound {
            id: id.to_string(),
        })
    }

    /// Returns the known identifiers in ascending order.
    pub fn list_ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Returns every profile in identifier order.
    pub fn profiles(&self) -> impl Iterator<Item = &DeviceProfile> {
        self.profiles.values()
    }

    fn save(&self) -> Result<(), RegistryError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let io_error = |source| RegistryError::ConfigIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let entries: BTreeMap<&str, ProfileEntry> = self
            .profiles
            .values()
            .map(|profile| {
                (
                    profile.id(),
                    ProfileEntry {
                        name: profile.name.clone(),
                        service_uuid: profile.service_uuid,
                        characteristic_uuid: profile.data_characteristic_uuid,
                        request_uuid: profile.request_characteristic_uuid,
                    },
                )
            })
            .collect();

        let mut serialised = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut serialised, formatter);
        entries
            .serialize(&mut serializer)
            .map_err(|source| RegistryError::ConfigFormat {
                path: path.to_path_buf(),
                source,
            })?;

        fs::write(path, serialised).map_err(io_error)?;
        Ok(())
    }
}
