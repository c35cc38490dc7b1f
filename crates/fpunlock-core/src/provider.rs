//! Seams between the coordinator and the outside world.
//!
//! Every call here is fire-and-forget from the coordinator's point of view:
//! implementations issue the remote call without blocking the dispatch loop,
//! log failures at their own boundary, and report anything the state machine
//! must react to back through the event channel. This keeps the coordinator
//! synchronous and lets tests drive it with recording mocks.

use crate::event::{RequestId, TimerToken};
use crate::session::SessionHandle;
use std::time::Duration;

/// `Identify` / `Abort` on the fingerprint service.
pub trait FingerprintController {
    /// Polled identify: the result code comes back as
    /// `Event::IdentifyCompleted` tagged with `request`.
    fn request_identify(&mut self, request: RequestId);

    /// Signal-driven identify: no reply is awaited, the outcome arrives as
    /// `Identified` / `ErrorInfo` / `StateChanged`.
    fn start_identify(&mut self);

    /// `Abort`. Safe to call when nothing is outstanding.
    fn stop(&mut self);
}

/// `UnlockSession` on the session manager. A rejected unlock is reported as
/// `Event::UnlockFailed`.
pub trait UnlockActuator {
    fn unlock(&mut self, session: &SessionHandle);
}

/// Best-effort haptic/audio cue.
pub trait FeedbackEmitter {
    fn emit(&mut self, event: &str);
}

/// One-shot timers; an expired timer is delivered as `Event::TimerFired`.
pub trait TimerScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerToken;

    fn cancel(&mut self, token: TimerToken);
}
