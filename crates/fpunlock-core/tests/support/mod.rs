//! Recording collaborators that also track what is live at any moment, so
//! tests can assert the single-attempt invariant after every event.

use fpunlock_core::{
    CoordinatorSettings, FeedbackEmitter, FingerprintController, IdentifyMode, RequestId,
    SessionHandle, TimerScheduler, TimerToken, UnlockActuator, UnlockCoordinator,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RequestIdentify(RequestId),
    StartIdentify,
    Stop,
    Unlock(String),
    Feedback(String),
    Schedule(TimerToken, Duration),
    Cancel(TimerToken),
}

#[derive(Debug, Default)]
pub struct Ledger {
    pub calls: Vec<Call>,
    pub live_timers: BTreeSet<u64>,
    pub live_requests: BTreeSet<u64>,
    pub max_live_timers: usize,
    pub max_live_requests: usize,
    next_timer: u64,
}

#[derive(Clone, Default)]
pub struct Harness {
    pub ledger: Arc<Mutex<Ledger>>,
}

impl Harness {
    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut self.ledger.lock().unwrap().calls)
    }

    pub fn live_timer(&self) -> Option<TimerToken> {
        let ledger = self.ledger.lock().unwrap();
        ledger.live_timers.iter().next().copied().map(TimerToken)
    }

    pub fn live_request(&self) -> Option<RequestId> {
        let ledger = self.ledger.lock().unwrap();
        ledger.live_requests.iter().next().copied().map(RequestId)
    }

    /// The dispatch loop delivers a timer: it stops being live.
    pub fn fire(&self, token: TimerToken) {
        self.ledger.lock().unwrap().live_timers.remove(&token.0);
    }

    /// The fingerprint service answers a request: it stops being live.
    pub fn answer(&self, request: RequestId) {
        self.ledger.lock().unwrap().live_requests.remove(&request.0);
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.ledger.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }
}

impl FingerprintController for Harness {
    fn request_identify(&mut self, request: RequestId) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.calls.push(Call::RequestIdentify(request));
        ledger.live_requests.insert(request.0);
        ledger.max_live_requests = ledger.max_live_requests.max(ledger.live_requests.len());
    }

    fn start_identify(&mut self) {
        self.ledger.lock().unwrap().calls.push(Call::StartIdentify);
    }

    fn stop(&mut self) {
        self.ledger.lock().unwrap().calls.push(Call::Stop);
    }
}

impl UnlockActuator for Harness {
    fn unlock(&mut self, session: &SessionHandle) {
        self.ledger
            .lock()
            .unwrap()
            .calls
            .push(Call::Unlock(session.id.clone()));
    }
}

impl FeedbackEmitter for Harness {
    fn emit(&mut self, event: &str) {
        self.ledger
            .lock()
            .unwrap()
            .calls
            .push(Call::Feedback(event.to_string()));
    }
}

impl TimerScheduler for Harness {
    fn schedule(&mut self, delay: Duration) -> TimerToken {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.next_timer += 1;
        let token = TimerToken(ledger.next_timer);
        ledger.calls.push(Call::Schedule(token, delay));
        ledger.live_timers.insert(token.0);
        ledger.max_live_timers = ledger.max_live_timers.max(ledger.live_timers.len());
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.calls.push(Call::Cancel(token));
        ledger.live_timers.remove(&token.0);
    }
}

pub type TestCoordinator = UnlockCoordinator<Harness, Harness, Harness, Harness>;

pub fn coordinator(mode: IdentifyMode) -> (TestCoordinator, Harness) {
    let harness = Harness::default();
    let settings = CoordinatorSettings {
        mode,
        ..CoordinatorSettings::default()
    };
    let coordinator = UnlockCoordinator::new(
        settings,
        harness.clone(),
        harness.clone(),
        harness.clone(),
        harness.clone(),
    );
    (coordinator, harness)
}

pub fn session() -> SessionHandle {
    SessionHandle {
        id: "3".to_string(),
        path: "/org/freedesktop/login1/session/_33".to_string(),
    }
}
