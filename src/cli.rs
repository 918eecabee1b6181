//! CLI surface.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "pydevc", about = "Console for the pydevd remote debugger protocol")]
pub struct Cli {
    /// Debuggee host to connect to.
    #[arg(short = 's', long, default_value = "localhost")]
    pub server: String,

    /// Debuggee port to connect to.
    #[arg(short = 'p', long)]
    pub port: u16,

    /// Source file the debuggee was launched with, used for `--break-at-start`.
    #[arg(short = 'f', long)]
    pub file: Option<String>,

    /// Send `start` automatically once connected.
    #[arg(long)]
    pub autostart: bool,

    /// With --autostart and --file, plant a temporary breakpoint at the
    /// file's first executable line before starting.
    #[arg(long)]
    pub break_at_start: bool,

    /// Wait for the connection before returning control to the prompt,
    /// instead of racing the handshake against the first typed command.
    #[arg(long)]
    pub sync: bool,
}

impl Cli {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}
