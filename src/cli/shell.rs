use std::io;
use std::str::FromStr;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, instrument};

use crate::error::{SessionError, ShellCommandError};
use crate::record::CargoField;
use crate::session::{ReadOutcome, SessionController, SessionState};

use super::describe;
use super::ui::{LogLine, Painter, RecordView};

const HELP: &[(&str, &str)] = &[
    ("select <id>", "select a device profile"),
    ("connect", "find and connect to the selected device"),
    ("read", "request the record from the device"),
    ("write", "validate the form and send it to the device"),
    ("disconnect", "close the connection"),
    ("set <field> <value>", "edit one form field"),
    ("show", "print the form"),
    ("status", "print the session state"),
    ("help", "print this list"),
    ("quit", "disconnect and leave"),
];

/// One line of shell input.
#[derive(Debug, Clone, PartialEq)]
enum ShellCommand {
    Blank,
    Select(String),
    Connect,
    Read,
    Write,
    Disconnect,
    Set(CargoField, String),
    Show,
    Status,
    Help,
    Quit,
}

impl FromStr for ShellCommand {
    type Err = ShellCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

        let command = match verb.to_ascii_lowercase().as_str() {
            "" => Self::Blank,
            "select" => {
                if rest.is_empty() {
                    return Err(ShellCommandError::MissingArgument {
                        command: "select",
                        argument: "a profile id",
                    });
                }
                Self::Select(rest.to_string())
            }
            "connect" => Self::Connect,
            "read" => Self::Read,
            "write" => Self::Write,
            "disconnect" => Self::Disconnect,
            "set" => {
                let (field, value) = rest
                    .split_once(char::is_whitespace)
                    .map_or((rest, ""), |(field, value)| (field, value.trim()));
                if field.is_empty() {
                    return Err(ShellCommandError::MissingArgument {
                        command: "set",
                        argument: "a field name",
                    });
                }
                let field = CargoField::from_str(field)
                    .map_err(|_error| ShellCommandError::UnknownField(field.to_string()))?;
                Self::Set(field, value.to_string())
            }
            "show" => Self::Show,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(ShellCommandError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

/// Runs the interactive session until `quit`, end of input or Ctrl+C.
///
/// Failed actions are reported in the activity log and never end the
/// session.
#[instrument(skip_all, level = "debug")]
pub(crate) async fn run<R, W>(
    controller: &SessionController,
    input: R,
    out: &mut W,
    painter: &Painter,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: io::Write,
{
    let mut shell = Shell {
        controller,
        out,
        painter,
    };
    shell.log("Session started; type `help` for the list of commands")?;

    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            Ok(()) = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match line.parse::<ShellCommand>() {
            Ok(ShellCommand::Quit) => break,
            Ok(command) => shell.execute(command).await?,
            Err(error) => shell.log(&error.to_string())?,
        }
    }

    shell.disconnect().await?;
    shell.log("Session closed")?;
    Ok(())
}

struct Shell<'a, W> {
    controller: &'a SessionController,
    out: &'a mut W,
    painter: &'a Painter,
}

impl<W: io::Write> Shell<'_, W> {
    async fn execute(&mut self, command: ShellCommand) -> io::Result<()> {
        debug!(?command, "shell command");
        match command {
            ShellCommand::Blank | ShellCommand::Quit => Ok(()),
            ShellCommand::Select(id) => self.select(&id).await,
            ShellCommand::Connect => self.connect().await,
            ShellCommand::Read => self.read().await,
            ShellCommand::Write => self.write().await,
            ShellCommand::Disconnect => self.disconnect().await,
            ShellCommand::Set(field, value) => self.set(field, value),
            ShellCommand::Show => self.show(),
            ShellCommand::Status => self.status(),
            ShellCommand::Help => self.help(),
        }
    }

    async fn select(&mut self, id: &str) -> io::Result<()> {
        match self.controller.select_profile(id).await {
            Ok(profile) => {
                self.log(&format!("Selected device: {} ({})", profile.id(), profile.name()))?;
                self.log(&format!("Service UUID: {}", profile.service_uuid()))?;
                self.log(&format!(
                    "Characteristic UUID: {}",
                    profile.data_characteristic_uuid()
                ))?;
                self.log(&format!(
                    "Request UUID: {}",
                    profile.request_characteristic_uuid()
                ))
            }
            Err(error) => self.report("Selection failed", &error),
        }
    }

    async fn connect(&mut self) -> io::Result<()> {
        if let Some(profile) = self.controller.snapshot().profile() {
            self.log(&format!("Searching for {}...", profile.name()))?;
        }
        match self.controller.connect().await {
            Ok(device_name) => {
                self.log(&format!("Connected to {device_name}"))?;
                self.status_line(&format!("Connected to {device_name}"))
            }
            Err(error) => {
                self.report("Connection failed", &error)?;
                if let Some(suggestion) = error.suggestion() {
                    self.log(&format!("Suggestion: {suggestion}"))?;
                }
                Ok(())
            }
        }
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        match self.controller.disconnect().await {
            Ok(Some(device_name)) => {
                self.log(&format!("Disconnected from {device_name}"))?;
                self.status_line(&format!("Disconnected from {device_name}"))
            }
            Ok(None) => Ok(()),
            Err(error) => self.report("Disconnect failed", &error),
        }
    }

    async fn read(&mut self) -> io::Result<()> {
        match self.controller.read().await {
            Ok(ReadOutcome::NoData) => self.log("No data received from device"),
            Ok(ReadOutcome::Record { form, raw }) => {
                self.log(&format!("Raw received data: {raw}"))?;
                self.log("Processed data:")?;
                for (field, value) in form.fields() {
                    self.log(&format!("{}: {value}", field.label()))?;
                }
                Ok(())
            }
            Err(error) => self.report("Error in read", &error),
        }
    }

    async fn write(&mut self) -> io::Result<()> {
        match self.controller.write().await {
            Ok(sent) => self.log(&format!("Sent: {sent}")),
            Err(SessionError::Validation(violations)) => {
                for violation in &violations {
                    self.log(&format!("Invalid {violation}"))?;
                }
                self.status_line(&format!(
                    "Record not sent: {} invalid field(s)",
                    violations.len()
                ))
            }
            Err(error) => self.report("Error writing", &error),
        }
    }

    fn set(&mut self, field: CargoField, value: String) -> io::Result<()> {
        let form = self
            .controller
            .snapshot()
            .form()
            .clone()
            .with_field(field, value.as_str());
        match self.controller.replace_form(form) {
            Ok(()) => self.log(&format!("{} set to {value:?}", field.label())),
            Err(error) => self.report("Edit failed", &error),
        }
    }

    fn show(&mut self) -> io::Result<()> {
        let snapshot = self.controller.snapshot();
        writeln!(self.out, "{}", RecordView::new(snapshot.form(), self.painter))
    }

    fn status(&mut self) -> io::Result<()> {
        let snapshot = self.controller.snapshot();
        let profile = snapshot
            .profile()
            .map_or_else(|| "none".to_string(), |profile| {
                format!("{} ({})", profile.id(), profile.name())
            });
        let line = match (snapshot.state(), snapshot.device_name()) {
            (SessionState::Connected, Some(device_name)) => {
                format!("Connected to {device_name}; profile {profile}")
            }
            (state, _) => format!("{}; profile {profile}", capitalise(&state.to_string())),
        };
        self.status_line(&line)
    }

    fn help(&mut self) -> io::Result<()> {
        for (usage, summary) in HELP {
            writeln!(
                self.out,
                "  {:<20} {}",
                self.painter.value(usage),
                self.painter.muted(summary)
            )?;
        }
        Ok(())
    }

    fn report(&mut self, action: &str, error: &SessionError) -> io::Result<()> {
        let message = format!("{action}: {}", describe(error));
        self.log(&message)?;
        writeln!(self.out, "{}", self.painter.failure(format!("Status: {message}")))
    }

    fn status_line(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "{}", self.painter.success(format!("Status: {message}")))
    }

    fn log(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "{}", LogLine::now(message))
    }
}

fn capitalise(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("", ShellCommand::Blank)]
    #[case("  CONNECT ", ShellCommand::Connect)]
    #[case("select 00002", ShellCommand::Select("00002".into()))]
    #[case("set address Pier 4, Berth 2", ShellCommand::Set(CargoField::Address, "Pier 4, Berth 2".into()))]
    #[case("set full_name", ShellCommand::Set(CargoField::FullName, String::new()))]
    #[case("set longitude -73.9", ShellCommand::Set(CargoField::Longitude, "-73.9".into()))]
    #[case("exit", ShellCommand::Quit)]
    fn parses_shell_lines(#[case] line: &str, #[case] expected: ShellCommand) {
        assert_eq!(Ok(expected), line.parse::<ShellCommand>());
    }

    #[test]
    fn select_requires_profile_id() {
        assert_matches!(
            "select".parse::<ShellCommand>(),
            Err(ShellCommandError::MissingArgument { command: "select", .. })
        );
    }

    #[rstest]
    #[case("set colour red", ShellCommandError::UnknownField("colour".into()))]
    #[case("fly away", ShellCommandError::UnknownCommand("fly".into()))]
    fn rejects_unknown_input(#[case] line: &str, #[case] expected: ShellCommandError) {
        assert_eq!(Err(expected), line.parse::<ShellCommand>());
    }

    #[test]
    fn capitalise_uppercases_first_letter() {
        assert_eq!("Disconnected", capitalise("disconnected"));
    }
}
