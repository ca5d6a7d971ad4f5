//! LowHum - deep brown noise for focus.
//!
//! Streams a long, pre-generated ambient WAV in a gapless loop through a
//! selectable output device, and stops immediately when the output device
//! set changes (e.g. headphones unplugged). Run without arguments to start
//! playback.

pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod player;
#[cfg(test)]
pub mod test_utils;
pub mod watcher;
pub mod wav;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("lowhum=info".parse().unwrap()))
        .init();

    cli::run_command(&args)
}
