use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use serde_json::{Map, Value};
use serde_with::SerializeDisplay;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// Display value used for fields a device payload did not include.
pub const MISSING_FIELD_SENTINEL: &str = "N/A";

/// Maximum length, in characters, of the free-text record fields.
pub const MAX_TEXT_FIELD_CHARS: usize = 128;

const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);
const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);

/// The eight fields exchanged with the device, named by their wire keys.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, EnumString, Display, SerializeDisplay,
)]
#[strum(ascii_case_insensitive)]
pub enum CargoField {
    #[strum(to_string = "CargoID", serialize = "cargo_id", serialize = "cargo-id")]
    CargoId,
    #[strum(to_string = "Longitude")]
    Longitude,
    #[strum(to_string = "Latitude")]
    Latitude,
    #[strum(to_string = "Address")]
    Address,
    #[strum(to_string = "FullName", serialize = "full_name", serialize = "full-name")]
    FullName,
    #[strum(to_string = "Price")]
    Price,
    #[strum(to_string = "Weight")]
    Weight,
    #[strum(to_string = "Description")]
    Description,
}

impl CargoField {
    /// Human-readable label used in listings and validation messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::CargoId => "Cargo ID",
            Self::Longitude => "Longitude",
            Self::Latitude => "Latitude",
            Self::Address => "Address",
            Self::FullName => "Full Name",
            Self::Price => "Price",
            Self::Weight => "Weight",
            Self::Description => "Description",
        }
    }
}

/// Why a single form field failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationReason {
    Empty,
    /// The device record did not carry this field.
    Missing,
    NotAnInteger,
    IntegerOverflow,
    NotANumber,
    NotFinite,
    OutOfRange { min: f64, max: f64 },
    TooLong { max_chars: usize, actual_chars: usize },
}

impl Display for ViolationReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "cannot be empty"),
            Self::Missing => write!(f, "was not supplied by the device"),
            Self::NotAnInteger => write!(f, "must be a non-negative whole number"),
            Self::IntegerOverflow => write!(f, "is too large"),
            Self::NotANumber => write!(f, "must be a valid number"),
            Self::NotFinite => write!(f, "must be a finite number"),
            Self::OutOfRange { min, max } => write!(f, "must be between {min} and {max}"),
            Self::TooLong {
                max_chars,
                actual_chars,
            } => write!(
                f,
                "exceeds {max_chars} characters ({actual_chars} given)"
            ),
        }
    }
}

/// One invalid field found while validating a form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    field: CargoField,
    reason: ViolationReason,
}

impl FieldViolation {
    fn new(field: CargoField, reason: ViolationReason) -> Self {
        Self { field, reason }
    }

    /// Returns the offending field.
    #[must_use]
    pub fn field(&self) -> CargoField {
        self.field
    }

    /// Returns the violated constraint.
    #[must_use]
    pub fn reason(&self) -> &ViolationReason {
        &self.reason
    }
}

impl Display for FieldViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.label(), self.reason)
    }
}

/// Editable text state of the eight record fields.
///
/// A form holds whatever the user or the device supplied, including the
/// [`MISSING_FIELD_SENTINEL`]. It only becomes a [`CargoRecord`] through
/// [`CargoForm::validate`].
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct CargoForm {
    #[serde(rename = "CargoID")]
    cargo_id: String,
    #[serde(rename = "Longitude")]
    longitude: String,
    #[serde(rename = "Latitude")]
    latitude: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "FullName")]
    full_name: String,
    #[serde(rename = "Price")]
    price: String,
    #[serde(rename = "Weight")]
    weight: String,
    #[serde(rename = "Description")]
    description: String,
}

impl CargoForm {
    /// Parses a device payload into display values.
    ///
    /// Numbers keep their JSON text, strings are taken verbatim and absent or
    /// `null` fields become [`MISSING_FIELD_SENTINEL`].
    ///
    /// ```
    /// use blecargo::{CargoField, CargoForm};
    ///
    /// let form = CargoForm::from_json(r#"{"CargoID":7,"Address":"Dock 4"}"#)?;
    /// assert_eq!("7", form.get(CargoField::CargoId));
    /// assert_eq!("N/A", form.get(CargoField::Weight));
    /// # Ok::<(), serde_json::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is not a JSON object.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        let object: Map<String, Value> = serde_json::from_str(payload)?;
        Ok(CargoField::iter().fold(Self::default(), |form, field| {
            let value = display_value(object.get(&field.to_string()));
            form.with_field(field, value)
        }))
    }

    /// Returns a copy of the form with one field replaced.
    #[must_use]
    pub fn with_field(mut self, field: CargoField, value: impl Into<String>) -> Self {
        *self.slot_mut(field) = value.into();
        self
    }

    /// Returns the current text of a field.
    #[must_use]
    pub fn get(&self, field: CargoField) -> &str {
        match field {
            CargoField::CargoId => &self.cargo_id,
            CargoField::Longitude => &self.longitude,
            CargoField::Latitude => &self.latitude,
            CargoField::Address => &self.address,
            CargoField::FullName => &self.full_name,
            CargoField::Price => &self.price,
            CargoField::Weight => &self.weight,
            CargoField::Description => &self.description,
        }
    }

    /// Iterates all fields in wire order.
    pub fn fields(&self) -> impl Iterator<Item = (CargoField, &str)> {
        CargoField::iter().map(move |field| (field, self.get(field)))
    }

    /// Validates every field and builds a typed record.
    ///
    /// All violations are collected; validation never stops at the first
    /// invalid field.
    ///
    /// # Errors
    ///
    /// Returns every field violation found.
    pub fn validate(&self) -> Result<CargoRecord, Vec<FieldViolation>> {
        let mut violations = Vec::new();

        let cargo_id = parse_cargo_id(self.get(CargoField::CargoId));
        note_violation(&mut violations, CargoField::CargoId, &cargo_id);
        let longitude = parse_bounded(self.get(CargoField::Longitude), LONGITUDE_RANGE);
        note_violation(&mut violations, CargoField::Longitude, &longitude);
        let latitude = parse_bounded(self.get(CargoField::Latitude), LATITUDE_RANGE);
        note_violation(&mut violations, CargoField::Latitude, &latitude);
        let address = parse_text(self.get(CargoField::Address));
        note_violation(&mut violations, CargoField::Address, &address);
        let full_name = parse_text(self.get(CargoField::FullName));
        note_violation(&mut violations, CargoField::FullName, &full_name);
        let price = parse_finite(self.get(CargoField::Price));
        note_violation(&mut violations, CargoField::Price, &price);
        let weight = parse_finite(self.get(CargoField::Weight));
        note_violation(&mut violations, CargoField::Weight, &weight);
        let description = parse_text(self.get(CargoField::Description));
        note_violation(&mut violations, CargoField::Description, &description);

        let (
            Ok(cargo_id),
            Ok(longitude),
            Ok(latitude),
            Ok(address),
            Ok(full_name),
            Ok(price),
            Ok(weight),
            Ok(description),
        ) = (
            cargo_id, longitude, latitude, address, full_name, price, weight, description,
        )
        else {
            return Err(violations);
        };

        Ok(CargoRecord {
            cargo_id,
            longitude,
            latitude,
            address,
            full_name,
            price,
            weight,
            description,
        })
    }

    fn slot_mut(&mut self, field: CargoField) -> &mut String {
        match field {
            CargoField::CargoId => &mut self.cargo_id,
            CargoField::Longitude => &mut self.longitude,
            CargoField::Latitude => &mut self.latitude,
            CargoField::Address => &mut self.address,
            CargoField::FullName => &mut self.full_name,
            CargoField::Price => &mut self.price,
            CargoField::Weight => &mut self.weight,
            CargoField::Description => &mut self.description,
        }
    }
}

impl From<&CargoRecord> for CargoForm {
    fn from(record: &CargoRecord) -> Self {
        let wire = WireRecord::from(record);
        Self {
            cargo_id: wire.cargo_id,
            longitude: wire.longitude,
            latitude: wire.latitude,
            address: wire.address,
            full_name: wire.full_name,
            price: wire.price,
            weight: wire.weight,
            description: wire.description,
        }
    }
}

/// A validated cargo record, ready to be written to the device.
#[derive(Debug, Clone, PartialEq)]
pub struct CargoRecord {
    cargo_id: u64,
    longitude: f64,
    latitude: f64,
    address: String,
    full_name: String,
    price: f64,
    weight: f64,
    description: String,
}

impl CargoRecord {
    #[must_use]
    pub fn cargo_id(&self) -> u64 {
        self.cargo_id
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    #[must_use]
    pub fn price(&self) -> f64 {
        self.price
    }

    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Serialises the record as the JSON text the device expects.
    ///
    /// Every value is sent as a string; floats always carry a fractional part.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialisation fails.
    pub fn to_wire_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireRecord::from(self))
    }
}

/// Wire shape of a record written to the device.
#[derive(Debug, Serialize)]
struct WireRecord {
    #[serde(rename = "CargoID")]
    cargo_id: String,
    #[serde(rename = "Longitude")]
    longitude: String,
    #[serde(rename = "Latitude")]
    latitude: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "FullName")]
    full_name: String,
    #[serde(rename = "Price")]
    price: String,
    #[serde(rename = "Weight")]
    weight: String,
    #[serde(rename = "Description")]
    description: String,
}

impl From<&CargoRecord> for WireRecord {
    fn from(record: &CargoRecord) -> Self {
        Self {
            cargo_id: record.cargo_id.to_string(),
            longitude: decimal_text(record.longitude),
            latitude: decimal_text(record.latitude),
            address: record.address.clone(),
            full_name: record.full_name.clone(),
            price: decimal_text(record.price),
            weight: decimal_text(record.weight),
            description: record.description.clone(),
        }
    }
}

/// Shortest round-trip decimal text, always with a fractional part.
fn decimal_text(value: f64) -> String {
    format!("{value:?}")
}

fn note_violation<T>(
    violations: &mut Vec<FieldViolation>,
    field: CargoField,
    outcome: &Result<T, ViolationReason>,
) {
    if let Err(reason) = outcome {
        violations.push(FieldViolation::new(field, reason.clone()));
    }
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => MISSING_FIELD_SENTINEL.to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Trims `raw`, rejecting blank input and the missing-field sentinel.
fn present(raw: &str) -> Result<&str, ViolationReason> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ViolationReason::Empty);
    }
    if value == MISSING_FIELD_SENTINEL {
        return Err(ViolationReason::Missing);
    }
    Ok(value)
}

fn parse_cargo_id(raw: &str) -> Result<u64, ViolationReason> {
    let value = present(raw)?;
    if !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(ViolationReason::NotAnInteger);
    }
    value
        .parse::<u64>()
        .map_err(|_error| ViolationReason::IntegerOverflow)
}

fn parse_number(raw: &str) -> Result<f64, ViolationReason> {
    present(raw)?
        .parse::<f64>()
        .map_err(|_error| ViolationReason::NotANumber)
}

fn parse_bounded(raw: &str, (min, max): (f64, f64)) -> Result<f64, ViolationReason> {
    let value = parse_number(raw)?;
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ViolationReason::OutOfRange { min, max })
    }
}

fn parse_finite(raw: &str) -> Result<f64, ViolationReason> {
    let value = parse_number(raw)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ViolationReason::NotFinite)
    }
}

fn parse_text(raw: &str) -> Result<String, ViolationReason> {
    let value = present(raw)?;
    let actual_chars = value.chars().count();
    if actual_chars > MAX_TEXT_FIELD_CHARS {
        return Err(ViolationReason::TooLong {
            max_chars: MAX_TEXT_FIELD_CHARS,
            actual_chars,
        });
    }
    Ok(value.to_string())
}
