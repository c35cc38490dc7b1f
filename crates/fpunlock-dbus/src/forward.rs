//! Turns bus signal streams into coordinator events.

use crate::connector::{DbusSubscription, FingerprintSignals};
use crate::proxies::LOGIND_SESSION_INTERFACE;
use fpunlock_core::{Event, HintChange};
use futures_util::{Stream, StreamExt};
use log::{debug, warn};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use zbus::zvariant::Value;

/// Filter one `PropertiesChanged` batch down to the session hints.
///
/// Entries keep their order; non-boolean values and other interfaces are
/// ignored.
pub fn hint_changes(interface: &str, changed: &HashMap<&str, Value<'_>>) -> Vec<HintChange> {
    if interface != LOGIND_SESSION_INTERFACE {
        return Vec::new();
    }

    changed
        .iter()
        .filter_map(|(name, value)| match value {
            Value::Bool(flag) => HintChange::from_property(name, *flag),
            _ => None,
        })
        .collect()
}

/// Background tasks pumping signals into the event channel. Dropping this
/// aborts them, which also drops the underlying match rules.
pub struct SignalForwarders {
    tasks: JoinSet<&'static str>,
}

impl SignalForwarders {
    pub fn spawn(subscription: DbusSubscription, events: UnboundedSender<Event>) -> Self {
        let mut tasks = JoinSet::new();

        let hints = subscription.hints.filter_map(|signal| async move {
            let args = match signal.args() {
                Ok(args) => args,
                Err(err) => {
                    warn!("malformed PropertiesChanged: {err}");
                    return None;
                }
            };
            let batch = hint_changes(args.interface_name().as_str(), args.changed_properties());
            (!batch.is_empty()).then_some(Event::HintsChanged(batch))
        });
        tasks.spawn(pump("PropertiesChanged", hints, events.clone()));

        if let Some(FingerprintSignals {
            identified,
            error_info,
            state_changed,
        }) = subscription.fingerprint
        {
            let identified = identified.filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(Event::Identified(args.finger_name().clone())),
                    Err(err) => {
                        warn!("malformed Identified: {err}");
                        None
                    }
                }
            });
            tasks.spawn(pump("Identified", identified, events.clone()));

            let error_info = error_info.filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(Event::ErrorInfo(args.info().clone())),
                    Err(err) => {
                        warn!("malformed ErrorInfo: {err}");
                        None
                    }
                }
            });
            tasks.spawn(pump("ErrorInfo", error_info, events.clone()));

            let state_changed = state_changed.filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(Event::StateChanged(args.state().clone())),
                    Err(err) => {
                        warn!("malformed StateChanged: {err}");
                        None
                    }
                }
            });
            tasks.spawn(pump("StateChanged", state_changed, events));
        }

        Self { tasks }
    }

    /// Resolves once every stream has ended, i.e. the bus connection is gone.
    /// Pending forever if there is nothing to wait for.
    pub async fn closed(&mut self) {
        if self.tasks.is_empty() {
            return std::future::pending().await;
        }
        while let Some(done) = self.tasks.join_next().await {
            match done {
                Ok(name) => debug!("{name} stream ended"),
                Err(err) if err.is_cancelled() => {}
                Err(err) => warn!("signal forwarder failed: {err}"),
            }
        }
    }
}

/// Forward every item of `stream` until it ends or the receiver is gone.
async fn pump<S>(name: &'static str, stream: S, events: UnboundedSender<Event>) -> &'static str
where
    S: Stream<Item = Event>,
{
    let mut stream = std::pin::pin!(stream);
    while let Some(event) = stream.next().await {
        if events.send(event).is_err() {
            break;
        }
    }
    name
}
