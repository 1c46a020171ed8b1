use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::{OutputFormat, ProfileArgs};
use crate::registry::DeviceRegistry;

use super::ui::{Painter, ProfileView};

/// Executes the `profile` command.
#[instrument(skip(registry, out, painter), level = "debug", fields(%output_format))]
pub(crate) fn run<W>(
    registry: &DeviceRegistry,
    args: &ProfileArgs,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let profile = registry.get(args.id())?;
    match output_format {
        OutputFormat::Pretty => writeln!(out, "{}", ProfileView::new(profile, painter))?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, profile)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
