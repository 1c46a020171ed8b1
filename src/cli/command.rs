use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::error::{CliConfigError, FixtureError};
use crate::hw::{FakeBackendConfig, FakeTransportProbe, ScanFixture};
use crate::record::{CargoField, CargoForm};
use crate::registry::DEFAULT_PROFILE_ID;
use crate::session::SessionPolicy;

/// Command-line options for the cargo record tool.
#[derive(Debug, Parser)]
#[command(
    name = "blecargo",
    about = "Read and write cargo records on BLE devices."
)]
pub struct Args {
    /// Device configuration file. Defaults to the per-user configuration directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level, overriding `RUST_LOG`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format. Defaults to `pretty` on terminals and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// How long to scan for the device (e.g. `5s`).
    #[arg(long, global = true, value_parser = parse_duration)]
    scan_timeout: Option<Duration>,
    /// Upper bound for one connection attempt (e.g. `10s`).
    #[arg(long, global = true, value_parser = parse_duration)]
    connect_timeout: Option<Duration>,
    /// Wait between the `get` request and reading the record (e.g. `1s`).
    #[arg(long, global = true, value_parser = parse_duration)]
    settle_delay: Option<Duration>,
    /// Uses the fake BLE backend with fixture-driven discovery and payloads.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `adapter|device_id|local_name|rssi;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Text returned by fake reads of the data characteristic.
    #[arg(long, global = true, requires = "fake")]
    fake_read: Option<String>,
    /// Artificial fake scan delay (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_discovery_delay: Option<Duration>,
    /// Artificial fake connect delay (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_connect_delay: Option<Duration>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use blecargo::{Args, Command};
    ///
    /// let args = Args::new(Command::Devices);
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            config: None,
            log_level: None,
            output: None,
            scan_timeout: None,
            connect_timeout: None,
            settle_delay: None,
            fake: false,
            fake_scan: None,
            fake_read: None,
            fake_discovery_delay: None,
            fake_connect_delay: None,
            command,
        }
    }

    /// Returns the explicit log-level override, if any.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the explicitly requested output format, if any.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Returns the configuration file override, if any.
    #[must_use]
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    /// Builds the session timing policy, falling back to defaults for
    /// anything not given on the command line.
    #[must_use]
    pub fn session_policy(&self) -> SessionPolicy {
        let defaults = SessionPolicy::default();
        SessionPolicy::builder()
            .scan_window(self.scan_timeout.unwrap_or(defaults.scan_window()))
            .connect_timeout(self.connect_timeout.unwrap_or(defaults.connect_timeout()))
            .settle_delay(self.settle_delay.unwrap_or(defaults.settle_delay()))
            .build()
    }

    /// Resolves the settings shared by every command.
    ///
    /// Without an explicit `--output`, terminals get tables and everything
    /// else gets JSON.
    #[must_use]
    pub fn run_options(&self, stdout_is_terminal: bool) -> RunOptions {
        let default_format = if stdout_is_terminal {
            OutputFormat::Pretty
        } else {
            OutputFormat::Json
        };
        RunOptions::builder()
            .maybe_config_path(self.config.clone())
            .output_format(self.output.unwrap_or(default_format))
            .maybe_log_level(self.log_level)
            .policy(self.session_policy())
            .build()
    }

    /// Splits parsed CLI arguments into command and optional fake-client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_scan,
            fake_read,
            fake_discovery_delay,
            fake_connect_delay,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan_fixture,
                read_payload: fake_read,
                discovery_delay: fake_discovery_delay.unwrap_or(Duration::ZERO),
                connect_delay: fake_connect_delay.unwrap_or(Duration::ZERO),
                connect_failure: None,
                write_failure: None,
                close_failure: None,
                probe: FakeTransportProbe::default(),
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Settings shared by every command run.
#[derive(Debug, Clone, Builder)]
pub struct RunOptions {
    /// Overrides the per-user device configuration file.
    #[builder(into)]
    config_path: Option<PathBuf>,
    #[builder(default = OutputFormat::Pretty)]
    output_format: OutputFormat,
    log_level: Option<LogLevel>,
    #[builder(default)]
    policy: SessionPolicy,
}

impl RunOptions {
    pub(crate) fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub(crate) fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub(crate) fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    pub(crate) fn policy(&self) -> SessionPolicy {
        self.policy
    }
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan_fixture: ScanFixture,
    #[builder(into)]
    read_payload: Option<String>,
    #[builder(default)]
    discovery_delay: Duration,
    #[builder(default)]
    connect_delay: Duration,
    /// Makes every connection attempt fail with this reason.
    #[builder(into)]
    connect_failure: Option<String>,
    /// Makes every characteristic write fail with this reason.
    #[builder(into)]
    write_failure: Option<String>,
    /// Makes closing a connection fail with this reason.
    #[builder(into)]
    close_failure: Option<String>,
    /// Shared handle for scripting reads and inspecting writes.
    #[builder(default)]
    probe: FakeTransportProbe,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            scan_fixture,
            read_payload,
            discovery_delay,
            connect_delay,
            connect_failure,
            write_failure,
            close_failure,
            probe,
        } = self;

        if read_payload.is_some() {
            probe.set_read_payload(read_payload.as_deref());
        }
        FakeBackendConfig::builder()
            .scan_fixture(scan_fixture)
            .probe(probe)
            .discovery_delay(discovery_delay)
            .connect_delay(connect_delay)
            .maybe_connect_failure(connect_failure)
            .maybe_write_failure(write_failure)
            .maybe_close_failure(close_failure)
            .build()
    }
}

/// Output formats for command results.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables.
    Pretty,
    /// Machine-readable JSON.
    Json,
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the configured device profiles.
    Devices,
    /// Show the BLE identifiers of one device profile.
    Profile(ProfileArgs),
    /// Connect, request the cargo record, print it, then disconnect.
    Read(ReadArgs),
    /// Validate a cargo record, then connect, write it and disconnect.
    Write(WriteArgs),
    /// Interactive session driven by commands on standard input.
    Shell,
}

/// Arguments for the `profile` command.
#[derive(Debug, clap::Args)]
pub struct ProfileArgs {
    /// Profile identifier, e.g. `00001`.
    id: String,
}

impl ProfileArgs {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }
}

/// Arguments for the `read` command.
#[derive(Debug, clap::Args)]
pub struct ReadArgs {
    /// Profile identifier of the device to read from.
    #[arg(long, default_value = DEFAULT_PROFILE_ID)]
    device: String,
}

impl ReadArgs {
    #[must_use]
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub(crate) fn device(&self) -> &str {
        &self.device
    }
}

/// Arguments for the `write` command.
#[derive(Debug, Clone, clap::Args, Builder)]
#[builder(on(String, into))]
pub struct WriteArgs {
    /// Profile identifier of the device to write to.
    #[arg(long, default_value = DEFAULT_PROFILE_ID)]
    #[builder(default = DEFAULT_PROFILE_ID.to_string())]
    device: String,
    #[arg(long)]
    cargo_id: String,
    #[arg(long, allow_hyphen_values = true)]
    longitude: String,
    #[arg(long, allow_hyphen_values = true)]
    latitude: String,
    #[arg(long)]
    address: String,
    #[arg(long)]
    full_name: String,
    #[arg(long, allow_hyphen_values = true)]
    price: String,
    #[arg(long, allow_hyphen_values = true)]
    weight: String,
    #[arg(long)]
    description: String,
}

impl WriteArgs {
    pub(crate) fn device(&self) -> &str {
        &self.device
    }

    /// Collects the field arguments into an editable form.
    pub(crate) fn form(&self) -> CargoForm {
        CargoForm::default()
            .with_field(CargoField::CargoId, self.cargo_id.as_str())
            .with_field(CargoField::Longitude, self.longitude.as_str())
            .with_field(CargoField::Latitude, self.latitude.as_str())
            .with_field(CargoField::Address, self.address.as_str())
            .with_field(CargoField::FullName, self.full_name.as_str())
            .with_field(CargoField::Price, self.price.as_str())
            .with_field(CargoField::Weight, self.weight.as_str())
            .with_field(CargoField::Description, self.description.as_str())
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
