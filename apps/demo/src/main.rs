#![allow(clippy::print_stdout)]

mod cli;
mod lifecycle;
mod settings;

use crate::cli::Cli;
use crate::lifecycle::ReplayPlan;
use anyhow::Context;
use clap::Parser;
use evd_logger::{LevelFilter, Logger};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = settings::load_config(cli.config.as_deref())?;

    let level = config
        .log
        .level
        .parse::<LevelFilter>()
        .with_context(|| format!("Invalid log level '{}'", config.log.level))?;

    let mut logger = Logger::builder().name(env!("CARGO_PKG_NAME")).level(level);
    if let Some(filter) = &config.log.filter {
        logger = logger.env_filter(filter.as_str());
    }
    if cli.json || config.log.json {
        logger = logger.json();
    }
    let _logger = logger.init()?;

    let plan = ReplayPlan {
        connections: cli.connections,
        messages: cli.messages,
        watchdog_budget: cli.watchdog,
    };
    info!(?plan, dispatcher = ?config.dispatcher, "Starting replay");

    let report = lifecycle::replay(config.dispatcher, plan);
    info!(
        audited = report.audited,
        rejected = report.rejected,
        remaining = report.remaining_handlers,
        "Replay finished"
    );
    println!("{report}");

    Ok(())
}
