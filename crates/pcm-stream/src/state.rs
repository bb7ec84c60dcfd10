//! Playback lifecycle state machine.
//!
//! ```text
//! Idle ──create──▶ Prepared ──play──▶ Playing ──exhausted──▶ Draining ──drained──▶ Stopped
//!   └──────────────── any non-terminal state ──failure──▶ Error
//! any state ──destroy──▶ Stopped
//! ```

pub use pcm_stream_types::PlaybackState;

use crate::error::{Result, StreamError};

/// Whether `from → to` is a legal transition.
pub fn can_transition(from: PlaybackState, to: PlaybackState) -> bool {
    use PlaybackState::*;
    match (from, to) {
        (Idle, Prepared) | (Prepared, Playing) | (Playing, Draining) | (Draining, Stopped) => true,
        (from, Error) => !from.is_terminal(),
        // destroy
        (from, Stopped) => from != Stopped,
        _ => false,
    }
}

/// Current state plus checked transitions.
#[derive(Debug, Default)]
pub struct StateMachine {
    state: PlaybackState,
}

impl StateMachine {
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Fail with `InvalidState` unless the machine is in `expected`.
    pub fn require(&self, op: &'static str, expected: PlaybackState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid(op))
        }
    }

    /// Move to `to`, returning the previous state.
    pub fn advance(&mut self, to: PlaybackState) -> Result<PlaybackState> {
        if !can_transition(self.state, to) {
            return Err(self.invalid(to.as_str()));
        }
        let from = self.state;
        self.state = to;
        tracing::info!(from = %from, to = %to, "playback state");
        Ok(from)
    }

    fn invalid(&self, op: &'static str) -> StreamError {
        StreamError::InvalidState {
            op,
            state: self.state.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlaybackState::*;

    #[test]
    fn happy_path_is_legal() {
        let mut sm = StateMachine::default();
        for to in [Prepared, Playing, Draining, Stopped] {
            sm.advance(to).unwrap();
        }
        assert_eq!(sm.state(), Stopped);
    }

    #[test]
    fn cannot_skip_prepare() {
        let mut sm = StateMachine::default();
        assert!(matches!(
            sm.advance(Playing),
            Err(StreamError::InvalidState { state: "idle", .. })
        ));
        assert_eq!(sm.state(), Idle);
    }

    #[test]
    fn draining_never_returns_to_playing() {
        assert!(!can_transition(Draining, Playing));
        assert!(!can_transition(Stopped, Playing));
        assert!(!can_transition(Error, Playing));
    }

    #[test]
    fn error_reachable_from_live_states_only() {
        for from in [Idle, Prepared, Playing, Draining] {
            assert!(can_transition(from, Error));
        }
        assert!(!can_transition(Stopped, Error));
        assert!(!can_transition(Error, Error));
    }

    #[test]
    fn destroy_reaches_stopped_from_anywhere() {
        for from in [Idle, Prepared, Playing, Draining, Error] {
            assert!(can_transition(from, Stopped));
        }
        assert!(!can_transition(Stopped, Stopped));
    }

    #[test]
    fn require_reports_current_state() {
        let sm = StateMachine::default();
        sm.require("create", Idle).unwrap();
        let err = sm.require("play", Prepared).unwrap_err();
        assert_eq!(err.to_string(), "play is not valid while idle");
    }
}
