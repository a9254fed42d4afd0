//! Conversational turn tracking.
//!
//! The machine only decides transitions; callers perform the returned
//! [`TurnEffect`]s against whatever capture and speech backends they own.

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    Activate,
    AudioAboveThreshold,
    /// Silence timeout or an explicit end of the utterance.
    EndOfInput,
    ResponseReceived { spoken: bool },
    SpeechFinished,
    /// Explicit stop. While listening this ends the utterance and submits
    /// it; while speaking it cuts the utterance short.
    Stop,
    /// Capture could not start or broke off; the utterance is discarded.
    CaptureFailed,
    InitFailed,
    Reinitialize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEffect {
    StartCapture,
    StopCapture,
    SubmitInput,
    BeginSpeaking,
    CancelUtterance,
}

#[derive(Debug, Default)]
pub struct TurnMachine {
    state: TurnState,
    errored: bool,
}

impl TurnMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Set by [`TurnEvent::InitFailed`]; cleared only by
    /// [`TurnEvent::Reinitialize`].
    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Applies `event` and returns the effects the caller must carry out, in
    /// order. Events that do not apply to the current state are ignored.
    pub fn handle(&mut self, event: TurnEvent) -> Vec<TurnEffect> {
        use TurnEffect::*;
        use TurnState::*;

        let (next, effects) = match (self.state, event) {
            (_, TurnEvent::InitFailed) => {
                self.errored = true;
                (Idle, self.teardown())
            }
            (_, TurnEvent::Reinitialize) => {
                self.errored = false;
                (Idle, self.teardown())
            }
            (Idle, TurnEvent::Activate | TurnEvent::AudioAboveThreshold) if !self.errored => {
                (Listening, vec![StartCapture])
            }
            (Speaking, TurnEvent::Activate | TurnEvent::AudioAboveThreshold) if !self.errored => {
                (Listening, vec![CancelUtterance, StartCapture])
            }
            (Listening, TurnEvent::EndOfInput | TurnEvent::Stop) => {
                (Processing, vec![StopCapture, SubmitInput])
            }
            (Listening, TurnEvent::CaptureFailed) => (Idle, vec![StopCapture]),
            (Processing, TurnEvent::ResponseReceived { spoken: true }) => {
                (Speaking, vec![BeginSpeaking])
            }
            (Processing, TurnEvent::ResponseReceived { spoken: false }) => (Idle, Vec::new()),
            (Speaking, TurnEvent::SpeechFinished) => (Idle, Vec::new()),
            (Speaking, TurnEvent::Stop) => (Idle, vec![CancelUtterance]),
            (state, event) => {
                debug!(?state, ?event, errored = self.errored, "ignoring turn event");
                return Vec::new();
            }
        };

        if next != self.state {
            debug!(from = ?self.state, to = ?next, ?event, "turn transition");
        }
        self.state = next;
        effects
    }

    fn teardown(&self) -> Vec<TurnEffect> {
        match self.state {
            TurnState::Listening => vec![TurnEffect::StopCapture],
            TurnState::Speaking => vec![TurnEffect::CancelUtterance],
            TurnState::Idle | TurnState::Processing => Vec::new(),
        }
    }
}

#[cfg(test)]
#[path = "tests/turn_tests.rs"]
mod tests;
