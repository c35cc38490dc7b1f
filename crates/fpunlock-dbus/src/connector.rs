//! D-Bus side of bus readiness: probe the services, resolve the session,
//! subscribe, read the hints.

use crate::backend::{DbusFeedback, DbusFingerprint, DbusUnlockActuator};
use crate::proxies::{
    ErrorInfoStream, FeedbackProxy, FingerprintProxy, IdentifiedStream, LoginManagerProxy,
    LoginSessionProxy, StateChangedStream, FINGERPRINT_SERVICE, LOGIND_SERVICE,
};
use fpunlock_core::config::FeedbackCfg;
use fpunlock_core::{
    Event, FpUnlockError, FpUnlockResult, IdentifyMode, SeatResolver, ServiceConnector,
    SessionEntry, SessionHandle, SessionState,
};
use log::{debug, warn};
use tokio::sync::mpsc::UnboundedSender;
use zbus::fdo::{DBusProxy, PropertiesChangedStream, PropertiesProxy};
use zbus::names::BusName;
use zbus::proxy::CacheProperties;
use zbus::Connection;

/// Live proxies once every required service answered.
#[derive(Clone)]
pub struct DbusServices {
    pub system: Connection,
    pub manager: LoginManagerProxy<'static>,
    pub fingerprint: FingerprintProxy<'static>,
    /// `None` when feedback is disabled or the session bus is unreachable.
    pub feedback: Option<FeedbackProxy<'static>>,
}

impl DbusServices {
    pub fn fingerprint_controller(&self, events: UnboundedSender<Event>) -> DbusFingerprint {
        DbusFingerprint::new(self.fingerprint.clone(), events)
    }

    pub fn unlock_actuator(&self, events: UnboundedSender<Event>) -> DbusUnlockActuator {
        DbusUnlockActuator::new(self.manager.clone(), events)
    }

    pub fn feedback_emitter(&self, cfg: &FeedbackCfg) -> DbusFeedback {
        DbusFeedback::new(self.feedback.clone(), cfg)
    }

    /// Awaited `Abort`, for shutdown when no dispatch loop is left to carry a
    /// fire-and-forget call.
    pub async fn abort_identification(&self) {
        if let Err(err) = self.fingerprint.abort().await {
            warn!("{}", FpUnlockError::call_failed("Abort", err));
        }
    }
}

/// Fingerprint signal streams, only wired in signal mode.
pub struct FingerprintSignals {
    pub identified: IdentifiedStream,
    pub error_info: ErrorInfoStream,
    pub state_changed: StateChangedStream,
}

pub struct DbusSubscription {
    pub hints: PropertiesChangedStream,
    pub fingerprint: Option<FingerprintSignals>,
}

/// [`ServiceConnector`] over the real system and session buses.
pub struct DbusConnector {
    resolver: SeatResolver,
    mode: IdentifyMode,
    feedback: bool,
}

impl DbusConnector {
    pub fn new(resolver: SeatResolver, mode: IdentifyMode, feedback: bool) -> Self {
        Self {
            resolver,
            mode,
            feedback,
        }
    }

    async fn feedback_proxy(&self) -> Option<FeedbackProxy<'static>> {
        if !self.feedback {
            return None;
        }

        let built = async {
            let session = Connection::session().await?;
            FeedbackProxy::new(&session).await
        };
        match built.await {
            Ok(proxy) => Some(proxy),
            Err(err) => {
                warn!("feedback disabled, session bus unreachable: {err}");
                None
            }
        }
    }
}

fn unavailable(what: &str, err: impl std::fmt::Display) -> FpUnlockError {
    FpUnlockError::BusUnavailable(format!("{what}: {err}"))
}

/// Fails unless `name` currently has an owner on the bus.
async fn require_name(dbus: &DBusProxy<'_>, name: &str) -> FpUnlockResult<()> {
    let bus_name = BusName::try_from(name).map_err(|err| unavailable(name, err))?;
    match dbus.name_has_owner(bus_name).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(FpUnlockError::BusUnavailable(format!(
            "{name} is not registered"
        ))),
        Err(err) => Err(unavailable(name, err)),
    }
}

/// Map `ListSessions` rows into the core model.
pub fn session_entries(rows: Vec<crate::proxies::SessionRow>) -> Vec<SessionEntry> {
    rows.into_iter()
        .map(|(id, uid, user, seat, path)| SessionEntry {
            id,
            uid,
            user,
            seat,
            path: path.as_str().to_owned(),
        })
        .collect()
}

impl ServiceConnector for DbusConnector {
    type Services = DbusServices;
    type Subscription = DbusSubscription;

    async fn connect(&mut self) -> FpUnlockResult<Self::Services> {
        let system = Connection::system()
            .await
            .map_err(|err| unavailable("system bus", err))?;
        let dbus = DBusProxy::new(&system)
            .await
            .map_err(|err| unavailable("org.freedesktop.DBus", err))?;

        require_name(&dbus, LOGIND_SERVICE).await?;
        require_name(&dbus, FINGERPRINT_SERVICE).await?;

        let manager = LoginManagerProxy::new(&system)
            .await
            .map_err(|err| unavailable(LOGIND_SERVICE, err))?;
        let fingerprint = FingerprintProxy::new(&system)
            .await
            .map_err(|err| unavailable(FINGERPRINT_SERVICE, err))?;
        let feedback = self.feedback_proxy().await;

        Ok(DbusServices {
            system,
            manager,
            fingerprint,
            feedback,
        })
    }

    async fn resolve_session(&mut self, services: &Self::Services) -> FpUnlockResult<SessionHandle> {
        let rows = services
            .manager
            .list_sessions()
            .await
            .map_err(|err| FpUnlockError::call_failed("ListSessions", err))?;
        debug!("ListSessions returned {} session(s)", rows.len());
        self.resolver.resolve(&session_entries(rows))
    }

    async fn subscribe(
        &mut self,
        services: &Self::Services,
        session: &SessionHandle,
    ) -> FpUnlockResult<Self::Subscription> {
        let subscribe_failed = |err: zbus::Error| FpUnlockError::call_failed("subscribe", err);

        let properties = PropertiesProxy::builder(&services.system)
            .destination(LOGIND_SERVICE)
            .map_err(subscribe_failed)?
            .path(session.path.clone())
            .map_err(subscribe_failed)?
            .build()
            .await
            .map_err(subscribe_failed)?;
        let hints = properties
            .receive_properties_changed()
            .await
            .map_err(subscribe_failed)?;

        let fingerprint = match self.mode {
            IdentifyMode::Polling => None,
            IdentifyMode::Signals => {
                let proxy = &services.fingerprint;
                Some(FingerprintSignals {
                    identified: proxy.receive_identified().await.map_err(subscribe_failed)?,
                    error_info: proxy.receive_error_info().await.map_err(subscribe_failed)?,
                    state_changed: proxy
                        .receive_state_changed()
                        .await
                        .map_err(subscribe_failed)?,
                })
            }
        };

        Ok(DbusSubscription { hints, fingerprint })
    }

    async fn read_hints(
        &mut self,
        services: &Self::Services,
        session: &SessionHandle,
    ) -> FpUnlockResult<SessionState> {
        let proxy = LoginSessionProxy::builder(&services.system)
            .path(session.path.clone())
            .map_err(|err| FpUnlockError::call_failed("Get", err))?
            .cache_properties(CacheProperties::No)
            .build()
            .await
            .map_err(|err| FpUnlockError::call_failed("Get", err))?;

        let idle_hint = proxy
            .idle_hint()
            .await
            .map_err(|err| FpUnlockError::call_failed("Get IdleHint", err))?;
        let locked_hint = proxy
            .locked_hint()
            .await
            .map_err(|err| FpUnlockError::call_failed("Get LockedHint", err))?;

        Ok(SessionState::new(idle_hint, locked_hint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::zvariant::OwnedObjectPath;

    #[test]
    fn list_sessions_rows_map_to_entries() {
        let rows = vec![
            (
                "c1".to_string(),
                0,
                "root".to_string(),
                String::new(),
                OwnedObjectPath::try_from("/org/freedesktop/login1/session/c1").unwrap(),
            ),
            (
                "3".to_string(),
                32011,
                "droidian".to_string(),
                "seat0".to_string(),
                OwnedObjectPath::try_from("/org/freedesktop/login1/session/_33").unwrap(),
            ),
        ];

        let entries = session_entries(rows);
        let handle = SeatResolver::Seat("seat0".into()).resolve(&entries).unwrap();
        assert_eq!(handle.id, "3");
        assert_eq!(handle.path, "/org/freedesktop/login1/session/_33");
        assert_eq!(entries[1].user, "droidian");
    }
}
