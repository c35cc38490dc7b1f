//! Logger setup for the daemon.
//!
//! Three line formats, picked with `FPUNLOCK_LOG_FORMAT`:
//! - `json` (default): one object per line
//! - `plain`: timestamp, level, target, message
//! - `journal`: `<N>` syslog priority prefix, for running under systemd
//!   where the journal adds its own timestamps

use env_logger::Env;
use log::Level;
use serde_json::{json, Value};
use std::env;
use std::io::Write;
use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

const FORMAT_ENV: &str = "FPUNLOCK_LOG_FORMAT";
const LEVEL_ENV: &str = "FPUNLOCK_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
    Journal,
}

impl LogFormat {
    /// Unknown or missing values fall back to JSON.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("plain") => LogFormat::Plain,
            Some("journal") => LogFormat::Journal,
            _ => LogFormat::Json,
        }
    }
}

/// `<N>` prefix understood by journald on stderr.
fn syslog_priority(level: Level) -> u8 {
    match level {
        Level::Error => 3,
        Level::Warn => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

fn json_line(timestamp: &str, level: Level, target: &str, message: &str) -> Value {
    json!({
        "timestamp": timestamp,
        "level": level.as_str().to_ascii_lowercase(),
        "target": target,
        "message": message,
    })
}

/// Initialize the global logger.
///
/// The first caller wins. `RUST_LOG` takes precedence; otherwise
/// `FPUNLOCK_LOG_LEVEL`, then `default_level`.
pub fn init(default_level: &str) {
    let _ = INIT.get_or_init(|| configure(default_level));
}

fn configure(default_level: &str) {
    let level = env::var(LEVEL_ENV).unwrap_or_else(|_| default_level.to_string());
    let format = LogFormat::from_setting(env::var(FORMAT_ENV).ok().as_deref());

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(level));
    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                let line = json_line(
                    &buf.timestamp().to_string(),
                    record.level(),
                    record.target(),
                    &record.args().to_string(),
                );
                writeln!(buf, "{line}")
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{} {:<5} {} - {}",
                    buf.timestamp(),
                    record.level(),
                    record.target(),
                    record.args()
                )
            });
        }
        LogFormat::Journal => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "<{}>{}: {}",
                    syslog_priority(record.level()),
                    record.target(),
                    record.args()
                )
            });
        }
    }

    if let Err(err) = builder.try_init() {
        eprintln!("failed to initialize logger: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_setting_is_case_insensitive_and_defaults_to_json() {
        assert_eq!(LogFormat::from_setting(None), LogFormat::Json);
        assert_eq!(LogFormat::from_setting(Some("PLAIN")), LogFormat::Plain);
        assert_eq!(LogFormat::from_setting(Some(" journal ")), LogFormat::Journal);
        assert_eq!(LogFormat::from_setting(Some("xml")), LogFormat::Json);
    }

    #[test]
    fn json_lines_carry_lowercase_levels() {
        let line = json_line(
            "2026-10-19T04:45:00Z",
            Level::Warn,
            "fpunlock_dbus::backend",
            "[FU2100] Abort failed: timeout",
        );
        assert_eq!(line["level"], "warn");
        assert_eq!(line["target"], "fpunlock_dbus::backend");
        assert_eq!(line["message"], "[FU2100] Abort failed: timeout");
    }

    #[test]
    fn journal_priorities_follow_syslog() {
        assert_eq!(syslog_priority(Level::Error), 3);
        assert_eq!(syslog_priority(Level::Warn), 4);
        assert_eq!(syslog_priority(Level::Info), 6);
        assert_eq!(syslog_priority(Level::Trace), 7);
    }
}
