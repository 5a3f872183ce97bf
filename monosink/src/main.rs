//! monosink - Main entry point
//!
//! Plays a test tone through the mono sink on the default audio server.
//! Type `p` + Enter to toggle play/pause, `q` + Enter to quit.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use monosink::config::{ConfigOverrides, SinkConfig};
use monosink::events::PlayStateEvents;
use monosink::server::CpalServer;
use monosink::source::ToneSource;
use monosink::Sink;

/// Command-line arguments for monosink
#[derive(Parser, Debug)]
#[command(name = "monosink")]
#[command(about = "Mono playback sink for the system audio server")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "MONOSINK_CONFIG")]
    config: Option<PathBuf>,

    /// Output device name (overrides config)
    #[arg(short, long)]
    device: Option<String>,

    /// Frames per block (overrides config)
    #[arg(short, long)]
    block_size: Option<usize>,

    /// List available output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Test tone frequency in Hz
    #[arg(long, default_value = "440")]
    tone_hz: f32,

    /// Start playing immediately
    #[arg(long)]
    autoplay: bool,
}

enum Command {
    TogglePlay,
    Quit,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        SinkConfig::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_overrides(ConfigOverrides {
            device: args.device.clone(),
            block_size: args.block_size,
        })
        .context("Invalid command-line override")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.list_devices {
        let devices = CpalServer::list_devices().context("Failed to list devices")?;
        for device in devices {
            println!("{}", device);
        }
        return Ok(());
    }

    info!(
        "Starting monosink '{}' (block size {})",
        config.sink.name, config.sink.block_size
    );

    let events = Arc::new(PlayStateEvents::new());
    let tone = ToneSource::new(args.tone_hz, config.sink.block_size);
    let sink = Sink::new(&tone, "tone", CpalServer::new(), Arc::clone(&events), &config);

    tone.start().context("Failed to start tone source")?;
    if let Err(e) = sink.start() {
        error!("Sink failed to start: {}", e);
    }
    if args.autoplay {
        events.emit(true);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || read_commands(tx))
        .context("Failed to spawn stdin reader")?;

    let mut playing = args.autoplay;
    let mut report = tokio::time::interval(Duration::from_secs(5));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            command = rx.recv() => match command {
                Some(Command::TogglePlay) => {
                    playing = !playing;
                    info!("{}", if playing { "Play" } else { "Pause" });
                    events.emit(playing);
                }
                Some(Command::Quit) | None => break,
            },
            _ = report.tick() => {
                let stats = sink.stats();
                info!(
                    "state={} callbacks={} delivered={} out_of_buffers={} truncated={}",
                    sink.state(), stats.callbacks, stats.delivered, stats.out_of_buffers, stats.truncated
                );
            }
        }
    }

    sink.stop();
    drop(sink);
    tone.stop();

    info!("Shutdown complete");
    Ok(())
}

fn read_commands(tx: mpsc::UnboundedSender<Command>) {
    for line in std::io::stdin().lock().lines() {
        let command = match line.as_deref().map(str::trim) {
            Ok("p") => Command::TogglePlay,
            Ok("q") => Command::Quit,
            Ok("") => continue,
            Ok(other) => {
                warn!("Unknown command '{}' (p = play/pause, q = quit)", other);
                continue;
            }
            Err(_) => break,
        };
        if tx.send(command).is_err() {
            break;
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
