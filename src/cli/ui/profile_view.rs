use std::fmt::{self, Display, Formatter};

use crate::registry::DeviceProfile;

use super::painter::Painter;
use super::table::Table;

/// Renders one profile's identifiers as a key-value table.
pub(crate) struct ProfileView<'a> {
    profile: &'a DeviceProfile,
    painter: &'a Painter,
}

impl<'a> ProfileView<'a> {
    pub(crate) fn new(profile: &'a DeviceProfile, painter: &'a Painter) -> Self {
        Self { profile, painter }
    }
}

impl Display for ProfileView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let table = Table::key_value(
            self.painter,
            vec![
                ("id", self.painter.value(self.profile.id())),
                ("name", self.painter.value(self.profile.name())),
                (
                    "service_uuid",
                    self.profile.service_uuid().to_string(),
                ),
                (
                    "characteristic_uuid",
                    self.profile.data_characteristic_uuid().to_string(),
                ),
                (
                    "request_uuid",
                    self.profile.request_characteristic_uuid().to_string(),
                ),
            ],
        );
        write!(f, "{table}")
    }
}

/// Renders every configured profile, one row each.
pub(crate) struct ProfileListView<'a> {
    profiles: Vec<&'a DeviceProfile>,
    painter: &'a Painter,
}

impl<'a> ProfileListView<'a> {
    pub(crate) fn new(
        profiles: impl IntoIterator<Item = &'a DeviceProfile>,
        painter: &'a Painter,
    ) -> Self {
        Self {
            profiles: profiles.into_iter().collect(),
            painter,
        }
    }
}

impl Display for ProfileListView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.profiles.is_empty() {
            return write!(f, "{}", self.painter.warning("no device profiles configured"));
        }

        let rows = self
            .profiles
            .iter()
            .map(|profile| {
                vec![
                    self.painter.value(profile.id()),
                    profile.name().to_string(),
                    profile.service_uuid().to_string(),
                ]
            })
            .collect();
        write!(f, "{}", Table::grid(["id", "name", "service_uuid"], rows))
    }
}
