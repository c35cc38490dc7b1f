//! The unlock state machine.
//!
//! `UnlockCoordinator` consumes [`Event`]s one at a time and drives the
//! collaborators behind the traits in [`crate::provider`]. It never blocks:
//! a polled `Identify` is tracked by its [`RequestId`] until the completion
//! event arrives, and every delay is a one-shot timer owned through its
//! [`TimerToken`]. At most one of the two exists at any time.

use crate::config::{FpUnlockConfig, IdentifyMode};
use crate::event::{Event, RequestId, TimerToken};
use crate::provider::{FeedbackEmitter, FingerprintController, TimerScheduler, UnlockActuator};
use crate::session::{HintChange, SessionHandle, SessionHintTracker, SessionState};
use log::{debug, info, warn};
use std::time::Duration;

/// Configuration values the state machine reads.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub mode: IdentifyMode,
    pub screen_on_delay: Duration,
    pub retry_interval: Duration,
    pub idle_state: String,
    pub quiet_errors: Vec<String>,
    pub match_event: String,
    pub error_event: String,
}

impl CoordinatorSettings {
    pub fn from_config(cfg: &FpUnlockConfig) -> Self {
        Self {
            mode: cfg.fingerprint.mode,
            screen_on_delay: cfg.screen_on_delay(),
            retry_interval: cfg.retry_interval(),
            idle_state: cfg.fingerprint.idle_state.clone(),
            quiet_errors: cfg.fingerprint.quiet_errors.clone(),
            match_event: cfg.feedback.match_event.clone(),
            error_event: cfg.feedback.error_event.clone(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&FpUnlockConfig::default())
    }
}

/// Externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    AwaitingBus,
    Idle,
    Identifying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// Settle delay or retry interval running.
    Scheduled { token: TimerToken, delay: Duration },
    /// Polled `Identify` outstanding.
    Requested(RequestId),
    /// Due, but an abandoned request has not completed yet.
    Deferred,
    /// Signal-driven `Identify` issued.
    Listening,
    /// Unlock requested; waiting for `LockedHint` to drop.
    Matched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Idle,
    Identifying(Attempt),
}

/// Owns the session state and decides when to scan, abort and unlock.
pub struct UnlockCoordinator<F, U, E, T>
where
    F: FingerprintController,
    U: UnlockActuator,
    E: FeedbackEmitter,
    T: TimerScheduler,
{
    settings: CoordinatorSettings,
    fingerprint: F,
    actuator: U,
    feedback: E,
    timers: T,
    session: Option<SessionHandle>,
    hints: SessionHintTracker,
    activity: Activity,
    outstanding: Option<RequestId>,
    next_request: u64,
}

impl<F, U, E, T> UnlockCoordinator<F, U, E, T>
where
    F: FingerprintController,
    U: UnlockActuator,
    E: FeedbackEmitter,
    T: TimerScheduler,
{
    pub fn new(settings: CoordinatorSettings, fingerprint: F, actuator: U, feedback: E, timers: T) -> Self {
        Self {
            settings,
            fingerprint,
            actuator,
            feedback,
            timers,
            session: None,
            hints: SessionHintTracker::default(),
            activity: Activity::Idle,
            outstanding: None,
            next_request: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        match (&self.session, self.activity) {
            (None, _) => Mode::AwaitingBus,
            (Some(_), Activity::Idle) => Mode::Idle,
            (Some(_), Activity::Identifying(_)) => Mode::Identifying,
        }
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn hints(&self) -> SessionState {
        self.hints.state()
    }

    pub fn pending_timer(&self) -> Option<TimerToken> {
        match self.activity {
            Activity::Identifying(Attempt::Scheduled { token, .. }) => Some(token),
            _ => None,
        }
    }

    pub fn outstanding_request(&self) -> Option<RequestId> {
        self.outstanding
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::BusReady { session, hints } => self.on_bus_ready(session, hints),
            Event::HintsChanged(batch) => self.on_hints_changed(&batch),
            Event::IdentifyCompleted { request, outcome } => {
                self.on_identify_completed(request, outcome)
            }
            Event::Identified(finger) => self.on_identified(&finger),
            Event::ErrorInfo(info) => self.on_error_info(&info),
            Event::StateChanged(state) => self.on_state_changed(&state),
            Event::UnlockFailed(reason) => self.on_unlock_failed(&reason),
            Event::TimerFired(token) => self.on_timer(token),
        }
    }

    fn on_bus_ready(&mut self, session: SessionHandle, hints: SessionState) {
        if let Some(current) = &self.session {
            debug!("already tracking session {current}; ignoring readiness for {session}");
            return;
        }

        info!(
            "tracking session {session} (idle={}, locked={})",
            hints.idle_hint, hints.locked_hint
        );
        self.session = Some(session);
        self.hints = SessionHintTracker::new(hints);
        self.reconcile();
    }

    fn on_hints_changed(&mut self, batch: &[HintChange]) {
        if self.session.is_none() {
            debug!("hint change before the bus is ready; ignoring");
            return;
        }

        let update = self.hints.apply(batch);
        if !update.touched {
            return;
        }

        let state = self.hints.state();
        if update.idle_changed {
            info!("screen {}", if state.idle_hint { "idle" } else { "on" });
        }
        if update.locked_changed {
            info!(
                "session {}",
                if state.locked_hint { "locked" } else { "unlocked" }
            );
        }
        if !update.idle_changed && !update.locked_changed {
            debug!(
                "hints repeated: idle={} locked={}",
                state.idle_hint, state.locked_hint
            );
        }
        self.reconcile();
    }

    /// Bring the activity in line with the current hints. A timer armed under
    /// earlier hints is always replaced, never left to fire.
    fn reconcile(&mut self) {
        let wants = self.hints.state().wants_identification();
        match (wants, self.activity) {
            (false, Activity::Idle) => {}
            (false, Activity::Identifying(attempt)) => self.enter_idle(attempt),
            (true, Activity::Idle) => self.enter_identifying(),
            (true, Activity::Identifying(Attempt::Scheduled { delay, .. })) => self.arm(delay),
            (true, Activity::Identifying(_)) => {}
        }
    }

    fn enter_idle(&mut self, attempt: Attempt) {
        if let Attempt::Scheduled { token, .. } = attempt {
            self.timers.cancel(token);
        }
        self.fingerprint.stop();
        self.activity = Activity::Idle;

        let state = self.hints.state();
        info!(
            "identification stopped (idle={}, locked={})",
            state.idle_hint, state.locked_hint
        );
    }

    fn enter_identifying(&mut self) {
        match self.settings.mode {
            IdentifyMode::Polling => {
                info!(
                    "screen on with session locked; identifying in {:?}",
                    self.settings.screen_on_delay
                );
                self.arm(self.settings.screen_on_delay);
            }
            IdentifyMode::Signals => {
                info!("screen on with session locked; identifying");
                self.fingerprint.start_identify();
                self.activity = Activity::Identifying(Attempt::Listening);
            }
        }
    }

    /// Cancel-before-schedule: the previous timer, if any, is gone before the
    /// new one exists.
    fn arm(&mut self, delay: Duration) {
        if let Activity::Identifying(Attempt::Scheduled { token, .. }) = self.activity {
            self.timers.cancel(token);
        }
        let token = self.timers.schedule(delay);
        self.activity = Activity::Identifying(Attempt::Scheduled { token, delay });
    }

    fn on_timer(&mut self, token: TimerToken) {
        match self.activity {
            Activity::Identifying(Attempt::Scheduled { token: current, .. }) if current == token => {
                self.issue_identify()
            }
            _ => debug!("{token} fired after being superseded; ignoring"),
        }
    }

    fn issue_identify(&mut self) {
        if let Some(pending) = self.outstanding {
            debug!("{pending} still outstanding; waiting for it before identifying again");
            self.activity = Activity::Identifying(Attempt::Deferred);
            return;
        }

        self.next_request += 1;
        let request = RequestId(self.next_request);
        self.outstanding = Some(request);
        self.activity = Activity::Identifying(Attempt::Requested(request));
        self.fingerprint.request_identify(request);
    }

    fn on_identify_completed(&mut self, request: RequestId, outcome: Result<i32, String>) {
        if self.outstanding != Some(request) {
            debug!("completion for unknown {request}; ignoring");
            return;
        }
        self.outstanding = None;

        match self.activity {
            Activity::Identifying(Attempt::Requested(current)) if current == request => {
                match outcome {
                    Ok(0) => self.matched(),
                    Ok(code) => {
                        debug!(
                            "{request}: no match (code {code}); retrying in {:?}",
                            self.settings.retry_interval
                        );
                        self.arm(self.settings.retry_interval);
                    }
                    Err(reason) => {
                        warn!("Identify failed: {reason}");
                        self.arm(self.settings.retry_interval);
                    }
                }
            }
            Activity::Identifying(Attempt::Deferred) => {
                debug!("discarding result of abandoned {request}");
                self.issue_identify();
            }
            _ => debug!("discarding result of abandoned {request}"),
        }
    }

    fn matched(&mut self) {
        let Some(session) = self.session.clone() else {
            return;
        };

        info!("fingerprint matched; unlocking session {session}");
        self.feedback.emit(&self.settings.match_event);
        self.actuator.unlock(&session);

        if let Activity::Identifying(attempt) = self.activity {
            if let Attempt::Scheduled { token, .. } = attempt {
                self.timers.cancel(token);
            }
            self.activity = Activity::Identifying(Attempt::Matched);
        }
    }

    fn on_identified(&mut self, finger: &str) {
        if self.session.is_none() {
            debug!("Identified({finger}) before the bus is ready; ignoring");
            return;
        }
        info!("finger `{finger}` identified");
        self.matched();
    }

    fn on_error_info(&mut self, info: &str) {
        if self.settings.quiet_errors.iter().any(|quiet| quiet == info) {
            debug!("fingerprint service reported {info}");
            return;
        }
        if self.mode() != Mode::Identifying {
            debug!("fingerprint error {info} while not identifying");
            return;
        }

        info!("fingerprint not recognised ({info})");
        self.feedback.emit(&self.settings.error_event);
    }

    fn on_state_changed(&mut self, state: &str) {
        if state != self.settings.idle_state {
            debug!("sensor state {state}");
            return;
        }
        if self.activity == Activity::Identifying(Attempt::Listening) {
            info!("sensor returned to {state} without a match; identifying again");
            self.fingerprint.start_identify();
        }
    }

    fn on_unlock_failed(&mut self, reason: &str) {
        warn!("session stayed locked: {reason}");
        if self.activity != Activity::Identifying(Attempt::Matched) {
            return;
        }

        match self.settings.mode {
            IdentifyMode::Polling => self.arm(self.settings.retry_interval),
            IdentifyMode::Signals => {
                self.fingerprint.start_identify();
                self.activity = Activity::Identifying(Attempt::Listening);
            }
        }
    }
}

impl<F, U, E, T> Drop for UnlockCoordinator<F, U, E, T>
where
    F: FingerprintController,
    U: UnlockActuator,
    E: FeedbackEmitter,
    T: TimerScheduler,
{
    fn drop(&mut self) {
        if let Some(token) = self.pending_timer() {
            self.timers.cancel(token);
        }
    }
}
