//! Everything the dispatch loop feeds into the coordinator.

use crate::session::{HintChange, SessionHandle, SessionState};
use std::fmt;

/// Token of a scheduled one-shot timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(pub u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Tag of a polled `Identify` request, echoed back on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "identify#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Every required service is reachable and the session is resolved.
    BusReady {
        session: SessionHandle,
        hints: SessionState,
    },
    /// One `PropertiesChanged` batch, filtered to the hints.
    HintsChanged(Vec<HintChange>),
    /// A polled `Identify` finished: `Ok(0)` is a match.
    IdentifyCompleted {
        request: RequestId,
        outcome: Result<i32, String>,
    },
    /// `Identified(finger_name)` signal.
    Identified(String),
    /// `ErrorInfo(info)` signal.
    ErrorInfo(String),
    /// `StateChanged(state)` signal.
    StateChanged(String),
    /// `UnlockSession` was rejected or could not be delivered.
    UnlockFailed(String),
    TimerFired(TimerToken),
}
