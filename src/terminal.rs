use std::io::{self, IsTerminal};

/// Answers whether the standard streams are attached to a terminal.
///
/// Colour, tables and progress spinners are only used on terminals.
pub trait TerminalClient {
    fn stdout_is_terminal(&self) -> bool;

    fn stderr_is_terminal(&self) -> bool;
}

/// Terminal detection for the current process.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        io::stderr().is_terminal()
    }
}
