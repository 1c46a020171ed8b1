pub(crate) mod command;
pub(crate) mod devices;
pub(crate) mod profile;
pub(crate) mod read;
pub(crate) mod shell;
pub(crate) mod ui;
pub(crate) mod write;

use std::error::Error;
use std::io;

use anyhow::Result;
use tracing::warn;

use crate::error::SessionError;
use crate::session::SessionController;

use self::ui::Painter;

pub use self::command::{
    Args, Command, FakeArgs, LogLevel, OutputFormat, ProfileArgs, ReadArgs, RunOptions, WriteArgs,
};

/// Connects, printing the troubleshooting hint for connect-family failures.
pub(crate) async fn connect_with_hint<W>(
    controller: &SessionController,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<String>
where
    W: io::Write,
{
    match controller.connect().await {
        Ok(device_name) => Ok(device_name),
        Err(error) => {
            if let Some(suggestion) = error.suggestion() {
                match output_format {
                    OutputFormat::Pretty => {
                        writeln!(out, "{}", painter.warning(format!("Suggestion: {suggestion}")))?;
                    }
                    OutputFormat::Json => warn!(suggestion, "connect failed"),
                }
            }
            Err(error.into())
        }
    }
}

/// Disconnects at the end of a one-shot command; failures are only logged.
pub(crate) async fn disconnect_quietly(controller: &SessionController) {
    if let Err(error) = controller.disconnect().await {
        warn!(?error, "failed to disconnect after command");
    }
}

/// Renders an error followed by each of its sources.
pub(crate) fn describe(error: &SessionError) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
