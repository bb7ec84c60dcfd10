//! pcm-play: stream a headerless PCM file to an output device.
//!
//! The file is read in fixed-size buffers that the device hands back as it
//! finishes each one; see the `pcm-stream` crate for the engine.

use anyhow::{Result, bail};
use clap::Parser;
use pcm_play::cli::{Args, Command};
use pcm_play::config::PlayConfig;
use pcm_play::runtime;
use pcm_stream::PlaybackEndReason;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pcm_play=info")),
        )
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    match args.cmd {
        Some(Command::Play {
            path,
            rate,
            channels,
            bits,
        }) => {
            let config = PlayConfig::new(
                path,
                args.device,
                (rate, channels, bits),
                (args.buffers, args.buffer_ms),
                args.events,
            )?;
            let status = runtime::run_play(config)?;
            tracing::info!(
                bytes = status.bytes_submitted,
                end = ?status.end_reason,
                "playback done"
            );
            if status.end_reason == Some(PlaybackEndReason::Error) {
                bail!(
                    "playback failed: {}",
                    status.last_error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Some(Command::Devices) => runtime::list_devices()?,
        None => bail!("nothing to do; try `pcm-play play <file>` or `--list-devices`"),
    }

    Ok(())
}
