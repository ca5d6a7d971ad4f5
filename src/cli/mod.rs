//! Command-line interface for lowhum.
//!
//! Thin collaborator over the playback engine: parses arguments, resolves
//! the configured device, and wires Ctrl-C to `Player::stop`.

mod commands;

pub use commands::{Cli, Commands, run_command};
