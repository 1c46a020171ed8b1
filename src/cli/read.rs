use std::io;

use anyhow::Result;
use serde::Serialize;
use tracing::instrument;

use crate::cli::{OutputFormat, ReadArgs, connect_with_hint, disconnect_quietly};
use crate::record::CargoForm;
use crate::session::{ReadOutcome, SessionController};

use super::ui::{Painter, RecordView};

#[derive(Debug, Serialize)]
struct ReadReport<'a> {
    profile_id: &'a str,
    device_name: &'a str,
    record: Option<&'a CargoForm>,
    raw: Option<&'a str>,
}

/// Executes the `read` command.
#[instrument(skip(controller, out, painter), level = "debug", fields(%output_format))]
pub(crate) async fn run<W>(
    controller: &SessionController,
    args: &ReadArgs,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    controller.select_profile(args.device()).await?;
    let device_name = connect_with_hint(controller, out, painter, output_format).await?;
    let outcome = controller.read().await;
    disconnect_quietly(controller).await;
    let outcome = outcome?;

    let (record, raw) = match &outcome {
        ReadOutcome::NoData => (None, None),
        ReadOutcome::Record { form, raw } => (Some(form), Some(raw.as_str())),
    };

    match output_format {
        OutputFormat::Pretty => match record {
            Some(form) => {
                writeln!(
                    out,
                    "{}",
                    painter.heading(format!("Record from {device_name}"))
                )?;
                writeln!(out, "{}", RecordView::new(form, painter))?;
            }
            None => writeln!(
                out,
                "{}",
                painter.warning(format!("No data received from {device_name}"))
            )?,
        },
        OutputFormat::Json => {
            let report = ReadReport {
                profile_id: args.device(),
                device_name: &device_name,
                record,
                raw,
            };
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
