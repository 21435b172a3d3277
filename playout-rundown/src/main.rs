//! Rundown player (playout-rundown) - Main entry point
//!
//! Plays a rundown built from the command line on a simulated output and logs
//! what goes to air. Exits when the rundown runs out or on Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use playout_common::config::{ChannelConfig, TomlConfig};
use playout_common::events::PlayoutEvent;
use playout_common::time::{format_timecode, millis_to_duration};
use playout_rundown::sim::{SimulatedDevice, DEFAULT_TICK};
use playout_rundown::{ChannelRegistry, MediaFile, PlaybackDevice};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for playout-rundown
#[derive(Parser, Debug)]
#[command(name = "playout-rundown")]
#[command(about = "Broadcast rundown player on a simulated output")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "PLAYOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Channel to play the rundown on
    #[arg(long, default_value = "main")]
    channel: String,

    /// Interval between simulated position reports, in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Wrap to the start of the rundown after the last item
    #[arg(long)]
    looping: bool,

    /// Live inputs to append after the files
    #[arg(long = "live", value_name = "NAME")]
    live: Vec<String>,

    /// Media files as PATH=SECONDS
    #[arg(value_name = "MEDIA", value_parser = parse_media)]
    media: Vec<MediaArg>,
}

#[derive(Debug, Clone, PartialEq)]
struct MediaArg {
    path: PathBuf,
    duration: Duration,
}

fn parse_media(arg: &str) -> std::result::Result<MediaArg, String> {
    let (path, seconds) = arg
        .rsplit_once('=')
        .ok_or_else(|| format!("expected PATH=SECONDS, got '{}'", arg))?;
    if path.is_empty() {
        return Err(format!("missing path in '{}'", arg));
    }
    let seconds: f64 = seconds
        .parse()
        .map_err(|_| format!("invalid duration '{}'", seconds))?;
    let duration = Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err(format!("duration of '{}' must be positive", path));
    }
    Ok(MediaArg {
        path: PathBuf::from(path),
        duration,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "playout-rundown {} ({}, {} build, {})",
        env!("CARGO_PKG_VERSION"),
        env!("PLAYOUT_GIT_HASH"),
        env!("PLAYOUT_BUILD_PROFILE"),
        env!("PLAYOUT_BUILD_TIMESTAMP")
    );

    if args.media.is_empty() && args.live.is_empty() {
        bail!("Nothing to play: give at least one MEDIA or --live input");
    }

    if !config.channels.iter().any(|c| c.name == args.channel) {
        info!("Channel {} not configured, using defaults", args.channel);
        config.channels.push(ChannelConfig::named(args.channel.clone()));
    }

    let tick = args.tick_ms.map(millis_to_duration).unwrap_or(DEFAULT_TICK);
    let device = SimulatedDevice::new(tick);
    for media in &args.media {
        device.register_file(media.path.clone(), media.duration);
    }
    for name in &args.live {
        device.register_live(name.clone());
    }

    let shared = Arc::clone(&device);
    let target = args.channel.clone();
    let mut registry = ChannelRegistry::from_config(&config, move |c: &ChannelConfig| -> Arc<dyn PlaybackDevice> {
        if c.name == target {
            Arc::clone(&shared) as Arc<dyn PlaybackDevice>
        } else {
            SimulatedDevice::new(tick) as Arc<dyn PlaybackDevice>
        }
    })
    .await;
    info!("Channels: {}", registry.channel_names().join(", "));

    let scheduler = registry.channel(&args.channel)?;
    if args.looping {
        scheduler.set_looping(true).await;
    }
    scheduler.set_add_items_with_autoplay(true).await;

    let mut events = scheduler.subscribe();
    for media in &args.media {
        let index = scheduler.len().await;
        scheduler
            .add_file_item(MediaFile::new(media.path.clone(), media.duration), index)
            .await?;
    }
    for name in &args.live {
        let index = scheduler.len().await;
        scheduler.add_live_item(name.clone(), index).await?;
    }

    let first = scheduler
        .item_at(0)
        .await
        .context("Rundown is empty")?;
    scheduler
        .load(first.id())
        .await
        .with_context(|| format!("Failed to load {}", first.name()))?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(PlayoutEvent::ItemLoaded { item: Some(item), .. }) => {
                    info!("On air: {} ({:?})", item.name, item.kind);
                }
                Ok(PlayoutEvent::PlaybackPosition { elapsed_ms, .. }) => {
                    debug!("Position {}", format_timecode(millis_to_duration(elapsed_ms)));
                }
                Ok(PlayoutEvent::PlaybackStopped { .. }) => {
                    info!("Rundown finished");
                    break;
                }
                Ok(other) => debug!("Event: {:?}", other),
                Err(RecvError::Lagged(missed)) => warn!("Event listener lagged, {} events missed", missed),
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => break,
        }
    }

    registry.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
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
