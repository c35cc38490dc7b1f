//! zbus glue between the unlock coordinator and the system services. The
//! proxies live in `proxies`, `connector` covers bus readiness, `forward`
//! pumps signals into the event channel and `backend` implements the
//! coordinator's collaborators.

mod backend;
mod connector;
mod forward;
mod proxies;

pub use backend::{DbusFeedback, DbusFingerprint, DbusUnlockActuator, FeedbackRequest};
pub use connector::{DbusConnector, DbusServices, DbusSubscription, FingerprintSignals};
pub use forward::{hint_changes, SignalForwarders};
pub use proxies::{
    FeedbackProxy, FingerprintProxy, LoginManagerProxy, LoginSessionProxy, FEEDBACK_SERVICE,
    FINGERPRINT_SERVICE, LOGIND_SERVICE, LOGIND_SESSION_INTERFACE,
};
