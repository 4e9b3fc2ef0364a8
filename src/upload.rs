// 上传会话状态机：单次上传、超时过期，使用注入时间戳驱动。
use serde::Serialize;

/// Lifecycle of one pending upload. `Awaiting` is the only state that
/// accepts a file; `Expired` and `Cancelled` are terminal until a fresh
/// begin re-enters `Awaiting`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadState {
    Inactive,
    Awaiting { target_path: String, created_at: f64 },
    Expired,
    Cancelled,
}

impl Default for UploadState {
    fn default() -> Self {
        UploadState::Inactive
    }
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    Begin { target_path: String },
    Receive,
    Cancel,
    Tick,
}

/// What a transition produced, beyond the next state.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Awaiting entered (or re-entered with a fresh timer).
    Armed,
    /// A file may be received; carries the remembered target path.
    Accept { target_path: String },
    /// The Awaiting window had already passed when the event arrived.
    RejectedExpired,
    /// Receive/Cancel arrived with no active session.
    RejectedInactive,
    Cancelled,
    /// Nothing changed.
    NoChange,
}

/// Pure transition function over (state, event, now). Re-issuing Begin
/// while Awaiting resets the timer rather than failing; a Receive after
/// the timeout moves to Expired and reports it, never silently accepts.
pub fn transition(
    state: &UploadState,
    event: UploadEvent,
    now: f64,
    timeout_secs: f64,
) -> (UploadState, UploadOutcome) {
    match (state, event) {
        (_, UploadEvent::Begin { target_path }) => (
            UploadState::Awaiting {
                target_path,
                created_at: now,
            },
            UploadOutcome::Armed,
        ),
        (
            UploadState::Awaiting {
                target_path,
                created_at,
            },
            UploadEvent::Receive,
        ) => {
            if now - *created_at > timeout_secs {
                (UploadState::Expired, UploadOutcome::RejectedExpired)
            } else {
                (
                    UploadState::Inactive,
                    UploadOutcome::Accept {
                        target_path: target_path.clone(),
                    },
                )
            }
        }
        (UploadState::Expired, UploadEvent::Receive) => {
            (UploadState::Expired, UploadOutcome::RejectedExpired)
        }
        (_, UploadEvent::Receive) => (state.clone(), UploadOutcome::RejectedInactive),
        (UploadState::Awaiting { .. }, UploadEvent::Cancel) => {
            (UploadState::Cancelled, UploadOutcome::Cancelled)
        }
        (_, UploadEvent::Cancel) => (state.clone(), UploadOutcome::NoChange),
        (UploadState::Awaiting { created_at, .. }, UploadEvent::Tick) => {
            if now - *created_at > timeout_secs {
                (UploadState::Expired, UploadOutcome::RejectedExpired)
            } else {
                (state.clone(), UploadOutcome::NoChange)
            }
        }
        (_, UploadEvent::Tick) => (state.clone(), UploadOutcome::NoChange),
    }
}

/// Per-user session wrapper applying [`transition`] in place.
#[derive(Debug, Clone, Default)]
pub struct UploadSession {
    state: UploadState,
}

impl UploadSession {
    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn apply(&mut self, event: UploadEvent, now: f64, timeout_secs: f64) -> UploadOutcome {
        let (next, outcome) = transition(&self.state, event, now, timeout_secs);
        self.state = next;
        outcome
    }

    /// Lazy expiry check used by status queries and sweeps: an idle
    /// Awaiting session past its deadline reports Expired even when the
    /// user never issued another upload command.
    pub fn tick(&mut self, now: f64, timeout_secs: f64) -> &UploadState {
        self.apply(UploadEvent::Tick, now, timeout_secs);
        &self.state
    }
}
