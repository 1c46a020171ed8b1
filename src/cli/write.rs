use std::io;

use anyhow::Result;
use serde::Serialize;
use tracing::instrument;

use crate::cli::{OutputFormat, WriteArgs, connect_with_hint, disconnect_quietly};
use crate::error::SessionError;
use crate::record::FieldViolation;
use crate::session::SessionController;

use super::ui::{Painter, ViolationsView};

#[derive(Debug, Serialize)]
struct WriteReport<'a> {
    profile_id: &'a str,
    device_name: &'a str,
    sent: &'a str,
}

#[derive(Debug, Serialize)]
struct RejectedReport<'a> {
    violations: &'a [FieldViolation],
}

/// Executes the `write` command.
///
/// The record is validated before any BLE activity, so an invalid record
/// never causes a connection.
#[instrument(skip(controller, out, painter), level = "debug", fields(%output_format))]
pub(crate) async fn run<W>(
    controller: &SessionController,
    args: &WriteArgs,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let form = args.form();
    if let Err(violations) = form.validate() {
        match output_format {
            OutputFormat::Pretty => writeln!(out, "{}", ViolationsView::new(&violations, painter))?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(
                    &mut *out,
                    &RejectedReport {
                        violations: &violations,
                    },
                )?;
                writeln!(out)?;
            }
        }
        return Err(SessionError::Validation(violations).into());
    }

    controller.select_profile(args.device()).await?;
    controller.replace_form(form)?;
    let device_name = connect_with_hint(controller, out, painter, output_format).await?;
    let sent = controller.write().await;
    disconnect_quietly(controller).await;
    let sent = sent?;

    match output_format {
        OutputFormat::Pretty => {
            writeln!(
                out,
                "{} {}",
                painter.success(format!("Sent to {device_name}:")),
                sent
            )?;
        }
        OutputFormat::Json => {
            let report = WriteReport {
                profile_id: args.device(),
                device_name: &device_name,
                sent: &sent,
            };
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
