use crate::error::{FpUnlockError, FpUnlockResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the daemon configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fpunlock.toml";

/// How the session to unlock is picked out of `ListSessions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SessionSelect {
    /// First session bound to `session.seat`.
    Seat,
    /// First session whose id equals `session.session_id`.
    SessionId,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionCfg {
    #[serde(default = "default_select")]
    pub select: SessionSelect,

    #[serde(default = "default_seat")]
    pub seat: String,

    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_select() -> SessionSelect {
    SessionSelect::Seat
}

fn default_seat() -> String {
    "seat0".to_string()
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            select: default_select(),
            seat: default_seat(),
            session_id: None,
        }
    }
}

/// How identification outcomes are observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifyMode {
    /// `Identify` returns a result code; no match is retried on a timer.
    Polling,
    /// `Identify` is fire-and-forget; outcomes arrive as signals.
    Signals,
}

impl std::str::FromStr for IdentifyMode {
    type Err = FpUnlockError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "polling" => Ok(IdentifyMode::Polling),
            "signals" => Ok(IdentifyMode::Signals),
            other => Err(FpUnlockError::InvalidConfig(format!(
                "unknown identify mode `{other}` (expected polling or signals)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FingerprintCfg {
    #[serde(default = "default_mode")]
    pub mode: IdentifyMode,

    /// `StateChanged` value reported when the sensor is back at rest.
    #[serde(default = "default_idle_state")]
    pub idle_state: String,

    /// `ErrorInfo` codes that are logged without feedback.
    #[serde(default = "default_quiet_errors")]
    pub quiet_errors: Vec<String>,
}

fn default_mode() -> IdentifyMode {
    IdentifyMode::Polling
}

fn default_idle_state() -> String {
    "FPSTATE_IDLE".to_string()
}

fn default_quiet_errors() -> Vec<String> {
    vec![
        "ERROR_CANCELED".to_string(),
        "ERROR_USER_CANCELED".to_string(),
    ]
}

impl Default for FingerprintCfg {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            idle_state: default_idle_state(),
            quiet_errors: default_quiet_errors(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TimingCfg {
    #[serde(default = "default_bus_retry_ms")]
    pub bus_retry_ms: u64,

    #[serde(default = "default_screen_on_delay_ms")]
    pub screen_on_delay_ms: u64,

    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_bus_retry_ms() -> u64 {
    1000
}

fn default_screen_on_delay_ms() -> u64 {
    750
}

fn default_retry_interval_ms() -> u64 {
    250
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            bus_retry_ms: default_bus_retry_ms(),
            screen_on_delay_ms: default_screen_on_delay_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FeedbackCfg {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_app_id")]
    pub app_id: String,

    #[serde(default = "default_match_event")]
    pub match_event: String,

    #[serde(default = "default_error_event")]
    pub error_event: String,

    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_true() -> bool {
    true
}

fn default_app_id() -> String {
    "fpunlock".to_string()
}

fn default_match_event() -> String {
    "button-pressed".to_string()
}

fn default_error_event() -> String {
    "bell-terminal".to_string()
}

fn default_priority() -> i32 {
    -1
}

impl Default for FeedbackCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            app_id: default_app_id(),
            match_event: default_match_event(),
            error_event: default_error_event(),
            priority: default_priority(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FpUnlockConfig {
    #[serde(default)]
    pub session: SessionCfg,

    #[serde(default)]
    pub fingerprint: FingerprintCfg,

    #[serde(default)]
    pub timing: TimingCfg,

    #[serde(default)]
    pub feedback: FeedbackCfg,

    #[serde(skip)]
    pub path: PathBuf,
}

impl FpUnlockConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> FpUnlockResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut cfg = if matches!(path.extension().and_then(|ext| ext.to_str()), Some(ext) if ext.eq_ignore_ascii_case("toml"))
        {
            toml::from_str::<Self>(&contents)?
        } else {
            serde_yaml::from_str::<Self>(&contents)?
        };

        cfg.path = path.to_path_buf();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`FpUnlockConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> FpUnlockResult<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Err(FpUnlockError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn validate(&self) -> FpUnlockResult<()> {
        match self.session.select {
            SessionSelect::Seat if self.session.seat.trim().is_empty() => {
                return Err(FpUnlockError::InvalidConfig(
                    "session.seat must not be empty".to_string(),
                ));
            }
            SessionSelect::SessionId
                if self
                    .session
                    .session_id
                    .as_deref()
                    .map_or(true, |id| id.trim().is_empty()) =>
            {
                return Err(FpUnlockError::InvalidConfig(
                    "session.session_id is required when session.select = \"session-id\""
                        .to_string(),
                ));
            }
            _ => {}
        }

        let timing = &self.timing;
        for (name, value) in [
            ("timing.bus_retry_ms", timing.bus_retry_ms),
            ("timing.screen_on_delay_ms", timing.screen_on_delay_ms),
            ("timing.retry_interval_ms", timing.retry_interval_ms),
        ] {
            if value == 0 {
                return Err(FpUnlockError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        let feedback = &self.feedback;
        if feedback.enabled
            && (feedback.app_id.is_empty()
                || feedback.match_event.is_empty()
                || feedback.error_event.is_empty())
        {
            return Err(FpUnlockError::InvalidConfig(
                "feedback.app_id, feedback.match_event and feedback.error_event must be set"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn bus_retry_interval(&self) -> Duration {
        Duration::from_millis(self.timing.bus_retry_ms)
    }

    pub fn screen_on_delay(&self) -> Duration {
        Duration::from_millis(self.timing.screen_on_delay_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.timing.retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg = FpUnlockConfig::default();
        assert_eq!(cfg.session.select, SessionSelect::Seat);
        assert_eq!(cfg.session.seat, "seat0");
        assert_eq!(cfg.fingerprint.mode, IdentifyMode::Polling);
        assert_eq!(cfg.screen_on_delay(), Duration::from_millis(750));
        assert_eq!(cfg.retry_interval(), Duration::from_millis(250));
        assert_eq!(cfg.bus_retry_interval(), Duration::from_secs(1));
        assert_eq!(cfg.feedback.priority, -1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn loads_partial_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fpunlock.toml");
        fs::write(
            &path,
            r#"
[session]
select = "session-id"
session_id = "c1"

[fingerprint]
mode = "signals"

[timing]
retry_interval_ms = 400
"#,
        )
        .unwrap();

        let cfg = FpUnlockConfig::load(&path).unwrap();
        assert_eq!(cfg.session.select, SessionSelect::SessionId);
        assert_eq!(cfg.session.session_id.as_deref(), Some("c1"));
        assert_eq!(cfg.fingerprint.mode, IdentifyMode::Signals);
        assert_eq!(cfg.fingerprint.idle_state, "FPSTATE_IDLE");
        assert_eq!(cfg.retry_interval(), Duration::from_millis(400));
        assert_eq!(cfg.screen_on_delay(), Duration::from_millis(750));
        assert_eq!(cfg.path, path);
    }

    #[test]
    fn loads_yaml_for_other_extensions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fpunlock.yaml");
        fs::write(&path, "feedback:\n  enabled: false\n").unwrap();

        let cfg = FpUnlockConfig::load(&path).unwrap();
        assert!(!cfg.feedback.enabled);
        assert_eq!(cfg.session.seat, "seat0");
    }

    #[test]
    fn session_id_selection_requires_an_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fpunlock.toml");
        fs::write(&path, "[session]\nselect = \"session-id\"\n").unwrap();

        let err = FpUnlockConfig::load(&path).unwrap_err();
        assert!(matches!(err, FpUnlockError::InvalidConfig(_)));
        assert_eq!(err.code(), "FU1100");
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut cfg = FpUnlockConfig::default();
        cfg.timing.retry_interval_ms = 0;
        assert!(matches!(
            cfg.validate(),
            Err(FpUnlockError::InvalidConfig(msg)) if msg.contains("retry_interval_ms")
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let cfg = FpUnlockConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.session.seat, "seat0");

        let err = FpUnlockConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, FpUnlockError::Io(_)));
    }

    #[test]
    fn identify_mode_parses_cli_values() {
        assert_eq!("polling".parse::<IdentifyMode>().unwrap(), IdentifyMode::Polling);
        assert_eq!("signals".parse::<IdentifyMode>().unwrap(), IdentifyMode::Signals);
        assert!("events".parse::<IdentifyMode>().is_err());
    }
}
