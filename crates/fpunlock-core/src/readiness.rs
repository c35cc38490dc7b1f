//! Bus readiness: keep trying to reach every required service, then resolve
//! the session, wire subscriptions and read the initial hints exactly once.

use crate::error::{FpUnlockError, FpUnlockResult};
use crate::session::{SessionHandle, SessionState};
use log::{debug, info, warn};
use std::time::Duration;

/// Bus-specific half of readiness. The daemon implements this on top of
/// zbus; tests script it.
#[allow(async_fn_in_trait)]
pub trait ServiceConnector {
    /// Proxies for every required service.
    type Services;
    /// Live notification streams; dropping it unsubscribes.
    type Subscription;

    /// Build all proxies. Fails with `BusUnavailable` while a service is not
    /// registered yet.
    async fn connect(&mut self) -> FpUnlockResult<Self::Services>;

    async fn resolve_session(&mut self, services: &Self::Services) -> FpUnlockResult<SessionHandle>;

    async fn subscribe(
        &mut self,
        services: &Self::Services,
        session: &SessionHandle,
    ) -> FpUnlockResult<Self::Subscription>;

    async fn read_hints(
        &mut self,
        services: &Self::Services,
        session: &SessionHandle,
    ) -> FpUnlockResult<SessionState>;
}

/// Everything a successful readiness check hands over to the daemon.
#[derive(Debug)]
pub struct BusLink<S, Sub> {
    pub services: S,
    pub session: SessionHandle,
    pub hints: SessionState,
    pub subscription: Sub,
}

#[derive(Debug)]
pub enum Readiness<S, Sub> {
    /// Not there yet; retry after the interval.
    Pending(FpUnlockError),
    /// First success. Handed out exactly once.
    Established(BusLink<S, Sub>),
    /// A previous check already succeeded; nothing was done.
    AlreadyEstablished,
}

pub struct BusReadinessMonitor<C: ServiceConnector> {
    connector: C,
    retry_interval: Duration,
    established: bool,
    attempts: u32,
}

impl<C: ServiceConnector> BusReadinessMonitor<C> {
    pub fn new(connector: C, retry_interval: Duration) -> Self {
        Self {
            connector,
            retry_interval,
            established: false,
            attempts: 0,
        }
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Checks run since construction or the last [`reset`](Self::reset).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Forget the previous link so the next check rebuilds from scratch.
    pub fn reset(&mut self) {
        self.established = false;
        self.attempts = 0;
    }

    /// One readiness attempt. Idempotent after success.
    pub async fn check(&mut self) -> Readiness<C::Services, C::Subscription> {
        if self.established {
            return Readiness::AlreadyEstablished;
        }

        self.attempts += 1;
        match self.establish().await {
            Ok(link) => {
                self.established = true;
                Readiness::Established(link)
            }
            Err(err) => Readiness::Pending(err),
        }
    }

    async fn establish(&mut self) -> FpUnlockResult<BusLink<C::Services, C::Subscription>> {
        let services = self.connector.connect().await?;
        let session = self.connector.resolve_session(&services).await?;
        // Subscribe before the initial read so nothing slips in between.
        let subscription = self.connector.subscribe(&services, &session).await?;
        let hints = self.connector.read_hints(&services, &session).await?;
        Ok(BusLink {
            services,
            session,
            hints,
            subscription,
        })
    }

    /// Retry [`check`](Self::check) on the fixed interval until the bus is
    /// ready. Returns `None` if it already was. Only errors that cannot be
    /// cured by waiting are returned.
    pub async fn wait(&mut self) -> FpUnlockResult<Option<BusLink<C::Services, C::Subscription>>> {
        loop {
            match self.check().await {
                Readiness::Established(link) => {
                    info!(
                        "bus ready after {} attempt(s); session {}",
                        self.attempts, link.session
                    );
                    return Ok(Some(link));
                }
                Readiness::AlreadyEstablished => return Ok(None),
                Readiness::Pending(err) if err.is_transient() => {
                    if self.attempts == 1 {
                        warn!(
                            "bus not ready ({err}); retrying every {:?}",
                            self.retry_interval
                        );
                    } else {
                        debug!("bus still not ready ({err})");
                    }
                    tokio::time::sleep(self.retry_interval).await;
                }
                Readiness::Pending(err) => return Err(err),
            }
        }
    }
}
