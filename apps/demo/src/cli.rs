use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments of the demo.
#[derive(Debug, Parser)]
#[command(name = "evd-demo")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replays connection events through a two-tier dispatcher")]
pub(crate) struct Cli {
    /// TOML file with `[dispatcher]` and `[log]` sections; `EVD__*` variables override it
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,

    /// Number of simulated connections
    #[arg(short = 'n', long, default_value_t = 4)]
    pub(crate) connections: u32,

    /// Frames sent by each connection
    #[arg(short, long, default_value_t = 3)]
    pub(crate) messages: u32,

    /// Message events the watchdog observes before unregistering itself
    #[arg(short, long, default_value_t = 5)]
    pub(crate) watchdog: u64,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub(crate) json: bool,
}
