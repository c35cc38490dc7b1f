pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod logging;
pub mod provider;
pub mod readiness;
pub mod session;

pub use config::{
    FeedbackCfg, FingerprintCfg, FpUnlockConfig, IdentifyMode, SessionCfg, SessionSelect,
    TimingCfg,
};
pub use coordinator::{CoordinatorSettings, Mode, UnlockCoordinator};
pub use error::{FpUnlockError, FpUnlockResult};
pub use event::{Event, RequestId, TimerToken};
pub use provider::{FeedbackEmitter, FingerprintController, TimerScheduler, UnlockActuator};
pub use readiness::{BusLink, BusReadinessMonitor, Readiness, ServiceConnector};
pub use session::{
    HintChange, HintUpdate, SeatResolver, SessionEntry, SessionHandle, SessionHintTracker,
    SessionState,
};
