//! CLI command definitions and handlers.
//!
//! Each subcommand is implemented as a function returning `anyhow::Result`.
//! Running with no subcommand behaves like `start`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::player::{self, Player};
use crate::watcher::DeviceWatcher;
use crate::{config, generator};

/// LowHum CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Play brown noise in the terminal until Ctrl+C (the default)
    Start {
        /// Output device index (see `lowhum devices`)
        #[arg(short, long)]
        device: Option<usize>,
        /// WAV file to play instead of the generated noise
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Play the file once instead of looping
        #[arg(long)]
        once: bool,
        /// Disable the output-device change watcher
        #[arg(long)]
        no_watch: bool,
    },
    /// List available audio output devices
    Devices,
    /// Pre-generate the brown noise audio file
    Generate {
        /// Output path (defaults to the cached location)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Duration in minutes
        #[arg(short, long, default_value = "60")]
        minutes: u64,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the selected command; no subcommand starts playback with defaults.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Some(Commands::Start {
            device,
            file,
            once,
            no_watch,
        }) => cmd_start(*device, file.as_deref(), !*once, *no_watch),
        Some(Commands::Devices) => cmd_devices(),
        Some(Commands::Generate {
            output,
            minutes,
            force,
        }) => cmd_generate(output.as_deref(), *minutes, *force),
        None => cmd_start(None, None, true, false),
    }
}

// ============================================================================
// Individual command implementations
// ============================================================================

fn cmd_start(
    device: Option<usize>,
    file: Option<&Path>,
    looped: bool,
    no_watch: bool,
) -> anyhow::Result<()> {
    let cfg = config::load();

    let file: PathBuf = match file {
        Some(f) => f.to_path_buf(),
        None => match &cfg.noise.file {
            Some(f) => f.clone(),
            None => generator::ensure_audio()?,
        },
    };

    let device = resolve_device(device, &cfg);
    let player = Arc::new(Player::new());

    // Keep the watcher handle alive for the duration of playback.
    let _watcher = if no_watch || !cfg.watcher.enabled {
        None
    } else {
        let interval = Duration::from_secs(cfg.watcher.poll_interval_secs.max(1));
        let (watcher, events) = DeviceWatcher::spawn(Arc::clone(&player), interval)?;
        // Surface notifications; ends when the watcher drops the sender.
        std::thread::spawn(move || {
            for event in events {
                if event.stopped_playback {
                    eprintln!("Playback stopped: {}", event.reason);
                }
            }
        });
        Some(watcher)
    };

    // Ctrl-C requests a stop; playback below then unblocks. The thread is
    // left detached when playback ends some other way and the process exits.
    let rt = Runtime::new()?;
    let signal_player = Arc::clone(&player);
    std::thread::spawn(move || {
        rt.block_on(async {
            let _ = tokio::signal::ctrl_c().await;
        });
        eprintln!("\nStopping ...");
        signal_player.stop();
    });

    println!("Playing {} ... (Ctrl+C to stop)", file.display());
    player
        .play_blocking(&file, device, looped)
        .with_context(|| format!("failed to play {}", file.display()))?;
    Ok(())
}

/// Pick the device index: an explicit `--device` wins; otherwise the
/// configured device *name* is re-resolved to a current index, since indices
/// are not stable across OS re-enumeration.
fn resolve_device(device: Option<usize>, cfg: &config::Config) -> Option<usize> {
    if device.is_some() {
        return device;
    }
    if cfg.audio.output_device.is_empty() {
        return None;
    }
    match player::find_by_name(&cfg.audio.output_device) {
        Ok(Some(index)) => Some(index),
        Ok(None) => {
            tracing::warn!(
                device = %cfg.audio.output_device,
                "Configured output device not found, using system default"
            );
            None
        }
        Err(e) => {
            tracing::warn!("Device lookup failed ({e}), using system default");
            None
        }
    }
}

fn cmd_devices() -> anyhow::Result<()> {
    let devices = player::list_output_devices()?;
    if devices.is_empty() {
        println!("No output devices found.");
        return Ok(());
    }
    let default_index = player::default_output_index()?;
    for device in devices {
        let marker = if Some(device.index) == default_index {
            " (default)"
        } else {
            ""
        };
        println!("  [{}] {}{}", device.index, device.name, marker);
    }
    Ok(())
}

fn cmd_generate(output: Option<&Path>, minutes: u64, force: bool) -> anyhow::Result<()> {
    let path = match output {
        Some(p) => p.to_path_buf(),
        None => generator::default_audio_path()
            .context("could not determine user data directory")?,
    };

    if path.exists() && !force {
        println!("Audio file already exists at {}", path.display());
        println!("Use --force to regenerate.");
        return Ok(());
    }

    println!("Generating {minutes} minutes of brown noise ...");
    let spec = generator::NoiseSpec::with_minutes(minutes);
    generator::generate(&path, &spec)?;
    println!("Saved to {}", path.display());
    Ok(())
}
