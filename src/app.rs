use std::io;

use anyhow::Result;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::instrument;

use crate::cli::ui::Painter;
use crate::cli::{Command, FakeArgs, LogLevel, RunOptions};
use crate::hw::{
    HardwareClient, fake_hardware_client as build_fake_hardware_client,
    real_hardware_client as build_real_hardware_client,
};
use crate::registry::DeviceRegistry;
use crate::session::SessionController;
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a hardware client backed by the real BLE transport.
#[must_use]
pub fn real_hardware_client() -> Box<dyn HardwareClient> {
    build_real_hardware_client()
}

/// Creates a hardware client backed by fake BLE fixtures.
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Box<dyn HardwareClient> {
    build_fake_hardware_client(fake_args.into_backend_config())
}

/// Runs the CLI command against the process's standard streams.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = blecargo::Args::try_parse_from([
///     "blecargo",
///     "--config",
///     "/tmp/blecargo-doc/devices.json",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|ESP32_BLE|-43",
///     "devices",
/// ])?;
/// let options = args.run_options(false);
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => blecargo::fake_hardware_client(fake_args),
///     None => blecargo::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// blecargo::run(command, &options, &mut out, hardware_client).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device
/// configuration cannot be loaded, the command fails, or output writing
/// fails.
pub async fn run<W>(
    command: Command,
    options: &RunOptions,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(
        command,
        options,
        BufReader::new(tokio::io::stdin()),
        out,
        &SystemTerminalClient,
        hardware_client,
    )
    .await
}

/// Runs the CLI command with injected input, terminal and hardware clients.
///
/// `input` is only consumed by the `shell` command.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device
/// configuration cannot be loaded, the command fails, or output writing
/// fails.
#[instrument(
    skip(options, input, out, terminal_client, hardware_client),
    level = "debug",
    fields(command = command_name(&command))
)]
pub async fn run_with_clients<R, W>(
    command: Command,
    options: &RunOptions,
    input: R,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: io::Write,
{
    telemetry::initialise_tracing(
        "blecargo",
        terminal_client.stderr_is_terminal(),
        options.log_level().map(LogLevel::as_level_filter),
    )?;

    let registry = match options.config_path() {
        Some(path) => DeviceRegistry::load(path)?,
        None => DeviceRegistry::load(&DeviceRegistry::default_path())?,
    };
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let output_format = options.output_format();

    match command {
        Command::Devices => crate::cli::devices::run(&registry, out, &painter, output_format),
        Command::Profile(args) => {
            crate::cli::profile::run(&registry, &args, out, &painter, output_format)
        }
        Command::Read(args) => {
            let controller = SessionController::new(hardware_client, registry, options.policy());
            crate::cli::read::run(&controller, &args, out, &painter, output_format).await
        }
        Command::Write(args) => {
            let controller = SessionController::new(hardware_client, registry, options.policy());
            crate::cli::write::run(&controller, &args, out, &painter, output_format).await
        }
        Command::Shell => {
            let controller = SessionController::new(hardware_client, registry, options.policy());
            crate::cli::shell::run(&controller, input, out, &painter).await
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Devices => "devices",
        Command::Profile(_args) => "profile",
        Command::Read(_args) => "read",
        Command::Write(_args) => "write",
        Command::Shell => "shell",
    }
}
