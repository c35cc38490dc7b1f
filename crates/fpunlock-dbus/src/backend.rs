//! Coordinator collaborators backed by zbus proxies.
//!
//! Each call is spawned on the runtime so the dispatch loop never waits on
//! the bus. Failures are logged here; the ones the coordinator must see come
//! back through the event channel.

use crate::proxies::{FeedbackProxy, FingerprintProxy, LoginManagerProxy};
use fpunlock_core::config::FeedbackCfg;
use fpunlock_core::{
    Event, FeedbackEmitter, FingerprintController, FpUnlockError, RequestId, SessionHandle,
    UnlockActuator,
};
use log::{debug, warn};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

pub struct DbusFingerprint {
    proxy: FingerprintProxy<'static>,
    events: UnboundedSender<Event>,
}

impl DbusFingerprint {
    pub fn new(proxy: FingerprintProxy<'static>, events: UnboundedSender<Event>) -> Self {
        Self { proxy, events }
    }
}

impl FingerprintController for DbusFingerprint {
    fn request_identify(&mut self, request: RequestId) {
        let proxy = self.proxy.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = proxy.identify().await.map_err(|err| err.to_string());
            debug!("{request} finished: {outcome:?}");
            // A closed channel means we are shutting down.
            let _ = events.send(Event::IdentifyCompleted { request, outcome });
        });
    }

    fn start_identify(&mut self) {
        let proxy = self.proxy.clone();
        tokio::spawn(async move {
            if let Err(err) = proxy.identify_no_reply().await {
                warn!("{}", FpUnlockError::call_failed("Identify", err));
            }
        });
    }

    fn stop(&mut self) {
        let proxy = self.proxy.clone();
        tokio::spawn(async move {
            if let Err(err) = proxy.abort().await {
                warn!("{}", FpUnlockError::call_failed("Abort", err));
            }
        });
    }
}

pub struct DbusUnlockActuator {
    manager: LoginManagerProxy<'static>,
    events: UnboundedSender<Event>,
}

impl DbusUnlockActuator {
    pub fn new(manager: LoginManagerProxy<'static>, events: UnboundedSender<Event>) -> Self {
        Self { manager, events }
    }
}

impl UnlockActuator for DbusUnlockActuator {
    fn unlock(&mut self, session: &SessionHandle) {
        let manager = self.manager.clone();
        let events = self.events.clone();
        let id = session.id.clone();
        tokio::spawn(async move {
            match manager.unlock_session(&id).await {
                Ok(()) => debug!("UnlockSession({id}) accepted"),
                Err(err) => {
                    let err = FpUnlockError::call_failed("UnlockSession", err);
                    warn!("{err}");
                    let _ = events.send(Event::UnlockFailed(err.to_string()));
                }
            }
        });
    }
}

/// Arguments of one `TriggerFeedback` call; the hints dictionary is always
/// empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRequest {
    pub app_id: String,
    pub event: String,
    pub priority: i32,
}

/// Feedback through feedbackd. Without a proxy every cue is skipped.
pub struct DbusFeedback {
    proxy: Option<FeedbackProxy<'static>>,
    app_id: String,
    priority: i32,
}

impl DbusFeedback {
    pub fn new(proxy: Option<FeedbackProxy<'static>>, cfg: &FeedbackCfg) -> Self {
        Self {
            proxy,
            app_id: cfg.app_id.clone(),
            priority: cfg.priority,
        }
    }

    pub fn request(&self, event: &str) -> FeedbackRequest {
        FeedbackRequest {
            app_id: self.app_id.clone(),
            event: event.to_string(),
            priority: self.priority,
        }
    }
}

impl FeedbackEmitter for DbusFeedback {
    fn emit(&mut self, event: &str) {
        let Some(proxy) = self.proxy.clone() else {
            debug!("feedback `{event}` skipped");
            return;
        };
        let request = self.request(event);
        tokio::spawn(async move {
            let hints = HashMap::new();
            if let Err(err) = proxy
                .trigger_feedback(&request.app_id, &request.event, &hints, request.priority)
                .await
            {
                warn!("{}", FpUnlockError::call_failed("TriggerFeedback", err));
            }
        });
    }
}
