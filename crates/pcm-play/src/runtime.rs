//! pcm-play runtime helpers.
//!
//! Provides device enumeration and local file playback with Ctrl-C handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use pcm_stream::device;
use pcm_stream::playback::CpalBackend;
use pcm_stream::player::wait_until_finished_or_cancel;
use pcm_stream::{PlaybackEvent, StatusSnapshot, play_audio};

use crate::cli::EventOutput;
use crate::config::PlayConfig;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Play a raw PCM file to the end, or until Ctrl-C.
///
/// Returns the session status after teardown.
pub fn run_play(config: PlayConfig) -> Result<StatusSnapshot> {
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed))
            .context("install ctrl-c handler")?;
    }

    let backend = CpalBackend {
        device: device_needle(config.device),
        ..CpalBackend::default()
    };
    tracing::info!(
        path = %config.path.display(),
        format = %config.format,
        buffers = config.stream.pool_size,
        buffer_ms = config.stream.buffer_ms,
        "source (local file)"
    );
    let mut session = play_audio(&config.path, config.format, config.stream, &backend)
        .with_context(|| format!("play {}", config.path.display()))?;

    let output = config.events;
    let end = wait_until_finished_or_cancel(&session, &cancel, |event| report(output, event));
    if end.is_none() {
        tracing::info!("interrupted; stopping playback");
    }
    session.destroy();
    Ok(session.status())
}

fn report(output: EventOutput, event: &PlaybackEvent) {
    match output {
        EventOutput::Json => match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("event encode failed: {e}"),
        },
        EventOutput::Log => match event {
            PlaybackEvent::BufferSubmitted { bytes, total_bytes } => {
                tracing::debug!(bytes, total_bytes, "buffer submitted")
            }
            PlaybackEvent::Failed { reason } => tracing::error!(?reason, "playback failed"),
            other => tracing::info!(event = ?other, "playback event"),
        },
    }
}

/// Blank `--device` values fall back to the default output.
fn device_needle(device: Option<String>) -> Option<String> {
    device
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_device_means_default() {
        assert_eq!(device_needle(None), None);
        assert_eq!(device_needle(Some(String::new())), None);
        assert_eq!(device_needle(Some(" \t ".into())), None);
    }

    #[test]
    fn device_needle_is_trimmed() {
        assert_eq!(
            device_needle(Some(" Scarlett 2i2 ".into())).as_deref(),
            Some("Scarlett 2i2")
        );
        assert_eq!(
            device_needle(Some("Built-in  Output".into())).as_deref(),
            Some("Built-in  Output")
        );
    }

    #[test]
    fn json_events_are_single_lines() {
        let line = serde_json::to_string(&PlaybackEvent::Finished { total_bytes: 12 }).unwrap();
        assert_eq!(line, r#"{"event":"finished","total_bytes":12}"#);
    }
}
