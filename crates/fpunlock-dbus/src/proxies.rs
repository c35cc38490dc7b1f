//! zbus proxies for the three services the daemon talks to.
//!
//! - logind: system bus, `org.freedesktop.login1`
//! - fingerprint: system bus, `org.droidian.fingerprint`
//! - feedbackd: session bus, `org.sigxcpu.Feedback`

use std::collections::HashMap;
use zbus::proxy;
use zbus::zvariant::{OwnedObjectPath, Value};

pub const LOGIND_SERVICE: &str = "org.freedesktop.login1";
pub const LOGIND_SESSION_INTERFACE: &str = "org.freedesktop.login1.Session";
pub const FINGERPRINT_SERVICE: &str = "org.droidian.fingerprint";
pub const FEEDBACK_SERVICE: &str = "org.sigxcpu.Feedback";

/// `(id, uid, user, seat, path)` rows of `ListSessions`.
pub type SessionRow = (String, u32, String, String, OwnedObjectPath);

#[proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
pub trait LoginManager {
    fn list_sessions(&self) -> zbus::Result<Vec<SessionRow>>;

    fn unlock_session(&self, session_id: &str) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.freedesktop.login1.Session",
    default_service = "org.freedesktop.login1"
)]
pub trait LoginSession {
    #[zbus(property)]
    fn idle_hint(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn locked_hint(&self) -> zbus::Result<bool>;
}

#[proxy(
    interface = "org.droidian.fingerprint",
    default_service = "org.droidian.fingerprint",
    default_path = "/org/droidian/fingerprint"
)]
pub trait Fingerprint {
    /// Blocks service-side until a verdict; `0` is a match.
    fn identify(&self) -> zbus::Result<i32>;

    /// Same method, without waiting for the reply.
    #[zbus(name = "Identify", no_reply)]
    fn identify_no_reply(&self) -> zbus::Result<()>;

    fn abort(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    fn identified(&self, finger_name: String) -> zbus::Result<()>;

    #[zbus(signal)]
    fn error_info(&self, info: String) -> zbus::Result<()>;

    #[zbus(signal)]
    fn state_changed(&self, state: String) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.sigxcpu.Feedback",
    default_service = "org.sigxcpu.Feedback",
    default_path = "/org/sigxcpu/Feedback"
)]
pub trait Feedback {
    fn trigger_feedback(
        &self,
        app_id: &str,
        event: &str,
        hints: &HashMap<&str, &Value<'_>>,
        priority: i32,
    ) -> zbus::Result<u32>;
}
