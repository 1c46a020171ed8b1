use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::OutputFormat;
use crate::registry::{DeviceProfile, DeviceRegistry};

use super::ui::{Painter, ProfileListView};

/// Executes the `devices` command.
#[instrument(skip(registry, out, painter), level = "debug", fields(%output_format))]
pub(crate) fn run<W>(
    registry: &DeviceRegistry,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    match output_format {
        OutputFormat::Pretty => {
            writeln!(out, "{}", ProfileListView::new(registry.profiles(), painter))?;
        }
        OutputFormat::Json => {
            let profiles: Vec<&DeviceProfile> = registry.profiles().collect();
            serde_json::to_writer_pretty(&mut *out, &profiles)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
