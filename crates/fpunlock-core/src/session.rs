//! Session model: which logind session we act on, and the idle/locked hints
//! it reports.

use crate::config::{SessionCfg, SessionSelect};
use crate::error::{FpUnlockError, FpUnlockResult};
use std::fmt;

/// Session the daemon unlocks. Resolved once per bus connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: String,
    pub path: String,
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.path)
    }
}

/// One row of the session manager's `ListSessions` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub id: String,
    pub uid: u32,
    pub user: String,
    pub seat: String,
    pub path: String,
}

/// Picks the session to act on from a `ListSessions` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatResolver {
    /// First session bound to this seat.
    Seat(String),
    /// First session with exactly this id.
    SessionId(String),
}

impl SeatResolver {
    pub fn from_config(cfg: &SessionCfg) -> FpUnlockResult<Self> {
        match cfg.select {
            SessionSelect::Seat => Ok(SeatResolver::Seat(cfg.seat.clone())),
            SessionSelect::SessionId => cfg
                .session_id
                .clone()
                .map(SeatResolver::SessionId)
                .ok_or_else(|| {
                    FpUnlockError::InvalidConfig("session.session_id missing".to_string())
                }),
        }
    }

    pub fn resolve(&self, sessions: &[SessionEntry]) -> FpUnlockResult<SessionHandle> {
        sessions
            .iter()
            .find(|entry| match self {
                SeatResolver::Seat(seat) => &entry.seat == seat,
                SeatResolver::SessionId(id) => &entry.id == id,
            })
            .map(|entry| SessionHandle {
                id: entry.id.clone(),
                path: entry.path.clone(),
            })
            .ok_or_else(|| FpUnlockError::SessionNotFound(self.to_string()))
    }
}

impl fmt::Display for SeatResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeatResolver::Seat(seat) => write!(f, "seat `{seat}`"),
            SeatResolver::SessionId(id) => write!(f, "session id `{id}`"),
        }
    }
}

/// Last known hints of the tracked session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub idle_hint: bool,
    pub locked_hint: bool,
}

impl SessionState {
    pub fn new(idle_hint: bool, locked_hint: bool) -> Self {
        Self {
            idle_hint,
            locked_hint,
        }
    }

    /// Screen on and still locked: the only state in which we scan.
    pub fn wants_identification(&self) -> bool {
        self.locked_hint && !self.idle_hint
    }
}

/// A single relevant entry of a `PropertiesChanged` batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintChange {
    Idle(bool),
    Locked(bool),
}

impl HintChange {
    /// Map a logind session property to a hint change; other properties are
    /// of no interest.
    pub fn from_property(name: &str, value: bool) -> Option<Self> {
        match name {
            "IdleHint" => Some(HintChange::Idle(value)),
            "LockedHint" => Some(HintChange::Locked(value)),
            _ => None,
        }
    }
}

/// Summary of what one batch did to the hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HintUpdate {
    /// The batch carried at least one hint property, changed or not.
    pub touched: bool,
    pub idle_changed: bool,
    pub locked_changed: bool,
}

/// Mirrors the session's hints from property-change batches.
#[derive(Debug, Clone, Default)]
pub struct SessionHintTracker {
    state: SessionState,
}

impl SessionHintTracker {
    pub fn new(initial: SessionState) -> Self {
        Self { state: initial }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Apply the whole batch before anyone looks at the result, so the
    /// outcome does not depend on the order of entries within it.
    pub fn apply(&mut self, batch: &[HintChange]) -> HintUpdate {
        let before = self.state;
        let mut touched = false;
        for change in batch {
            touched = true;
            match *change {
                HintChange::Idle(value) => self.state.idle_hint = value,
                HintChange::Locked(value) => self.state.locked_hint = value,
            }
        }
        HintUpdate {
            touched,
            idle_changed: before.idle_hint != self.state.idle_hint,
            locked_changed: before.locked_hint != self.state.locked_hint,
        }
    }
}
