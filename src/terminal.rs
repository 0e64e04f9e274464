use std::io::{self, IsTerminal};

/// Reports whether the standard streams are attached to an interactive terminal.
pub trait TerminalClient {
    /// Colour and tables are only used when this is true.
    fn stdout_is_terminal(&self) -> bool;

    /// Progress spinners are only drawn when this is true.
    fn stderr_is_terminal(&self) -> bool;
}

/// Terminal detection backed by the process's real standard streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        io::stderr().is_terminal()
    }
}
