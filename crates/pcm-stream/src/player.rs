//! Host-facing entry point: open a file, bring up the output, start playing.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use pcm_stream_types::{PlaybackEvent, PlaybackState};

use crate::config::StreamConfig;
use crate::error::Result;
use crate::format::AudioFormat;
use crate::session::PlaybackSession;
use crate::sink::OutputBackend;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Start playing the raw PCM file at `path` and return immediately.
///
/// Playback continues on the output's thread. Progress and the final outcome
/// are available from the returned session's `events()` and `status()`.
pub fn play_audio(
    path: impl AsRef<Path>,
    format: AudioFormat,
    config: StreamConfig,
    backend: &dyn OutputBackend,
) -> Result<PlaybackSession> {
    let path = path.as_ref();
    tracing::info!(path = %path.display(), format = %format, "play audio");
    let mut session = PlaybackSession::open(path, format, config)?;
    session.create(backend)?;
    session.play()?;
    Ok(session)
}

/// Block until `session` reaches a terminal state or `cancel` becomes true.
///
/// Every event received while waiting is passed to `on_event`. Returns the
/// terminal state, or `None` if cancelled first.
pub fn wait_until_finished_or_cancel(
    session: &PlaybackSession,
    cancel: &AtomicBool,
    mut on_event: impl FnMut(&PlaybackEvent),
) -> Option<PlaybackState> {
    let events = session.events();
    loop {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                on_event(&event);
                if let PlaybackEvent::StateChanged { to, .. } = event {
                    if to.is_terminal() {
                        return Some(to);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // Events can be dropped when the channel is full; the state is authoritative.
                let state = session.state();
                if state.is_terminal() && events.is_empty() {
                    return Some(state);
                }
            }
            Err(RecvTimeoutError::Disconnected) => return Some(session.state()),
        }
    }
}
