//! Fingerprint unlock daemon: waits for the session manager and fingerprint
//! service, then unlocks the seat session on a fingerprint match.

use anyhow::{Context, Result};
use clap::Parser;
use fpunlock_core::{
    config::DEFAULT_CONFIG_PATH, logging, BusLink, BusReadinessMonitor, CoordinatorSettings,
    Event, FeedbackEmitter, FingerprintController, FpUnlockConfig, IdentifyMode, Mode,
    SeatResolver, ServiceConnector, TimerScheduler, UnlockActuator, UnlockCoordinator,
};
use fpunlock_dbus::{DbusConnector, DbusServices, DbusSubscription, SignalForwarders};
use log::{debug, error, info, warn};
use schemars::schema_for;
use std::path::PathBuf;
use tokio::select;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

mod timer;

use timer::TokioTimers;

/// Command-line options for the unlock daemon.
#[derive(Parser, Debug)]
#[command(
    name = "fpunlock-daemon",
    version,
    about = "Unlocks the seat session when the fingerprint sensor reports a match."
)]
struct Args {
    /// Configuration file. Without it, /etc/fpunlock.toml is used if present.
    #[arg(short, long, env = "FPUNLOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Override `fingerprint.mode` (polling or signals).
    #[arg(short, long)]
    mode: Option<IdentifyMode>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,

    /// Print the configuration JSON schema and exit.
    #[arg(long)]
    print_config_schema: bool,
}

/// Why a dispatch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Shutdown,
    BusLost,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = run().await {
        error!("daemon exit: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    if args.print_config_schema {
        let schema = schema_for!(FpUnlockConfig);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    logging::init("info");
    let config = load_config(&args)?;

    if args.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    info!(
        "fpunlock daemon booting ({:?} mode)",
        config.fingerprint.mode
    );

    let resolver = SeatResolver::from_config(&config.session)?;
    let connector = DbusConnector::new(resolver, config.fingerprint.mode, config.feedback.enabled);
    let mut monitor = BusReadinessMonitor::new(connector, config.bus_retry_interval());
    let mut shutdown = Shutdown::install()?;

    loop {
        let link = select! {
            link = monitor.wait() => link.context("wait for bus services")?,
            name = shutdown.recv() => {
                info!("received {name} before the bus was ready");
                return Ok(());
            }
        };

        let Some(link) = link else {
            monitor.reset();
            continue;
        };

        let exit = serve(&config, link, &mut shutdown).await;
        if !reconnect(&mut monitor, exit) {
            return Ok(());
        }
    }
}

/// Decide what follows a dispatch loop. A lost bus drops the old link so the
/// next readiness cycle rebuilds everything.
fn reconnect<C: ServiceConnector>(monitor: &mut BusReadinessMonitor<C>, exit: Exit) -> bool {
    match exit {
        Exit::Shutdown => false,
        Exit::BusLost => {
            warn!("bus connection lost; reconnecting");
            monitor.reset();
            true
        }
    }
}

/// Drop the coordinator, cancelling its timer. Returns whether the sensor was
/// left scanning and needs an awaited `Abort` before the process exits.
fn wind_down<F, U, E, T>(coordinator: UnlockCoordinator<F, U, E, T>, exit: Exit) -> bool
where
    F: FingerprintController,
    U: UnlockActuator,
    E: FeedbackEmitter,
    T: TimerScheduler,
{
    let identifying = coordinator.mode() == Mode::Identifying;
    drop(coordinator);
    exit == Exit::Shutdown && identifying
}

fn load_config(args: &Args) -> Result<FpUnlockConfig> {
    let mut config = match &args.config {
        Some(path) => FpUnlockConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let config = FpUnlockConfig::load_or_default(DEFAULT_CONFIG_PATH)
                .with_context(|| format!("failed to load config {DEFAULT_CONFIG_PATH}"))?;
            if config.path.as_os_str().is_empty() {
                info!("{DEFAULT_CONFIG_PATH} not found; using built-in defaults");
            }
            config
        }
    };

    if let Some(mode) = args.mode {
        config.fingerprint.mode = mode;
    }
    Ok(config)
}

/// SIGINT / SIGTERM listeners, installed once for the process lifetime.
struct Shutdown {
    interrupt: Signal,
    terminate: Signal,
}

impl Shutdown {
    fn install() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("install SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("install SIGTERM handler")?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

/// Run one coordinator over an established bus link until shutdown or until
/// every signal stream has ended.
async fn serve(
    config: &FpUnlockConfig,
    link: BusLink<DbusServices, DbusSubscription>,
    shutdown: &mut Shutdown,
) -> Exit {
    let BusLink {
        services,
        session,
        hints,
        subscription,
    } = link;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut forwarders = SignalForwarders::spawn(subscription, tx.clone());
    let mut coordinator = UnlockCoordinator::new(
        CoordinatorSettings::from_config(config),
        services.fingerprint_controller(tx.clone()),
        services.unlock_actuator(tx.clone()),
        services.feedback_emitter(&config.feedback),
        TokioTimers::new(tx),
    );
    coordinator.handle(Event::BusReady { session, hints });

    let exit = loop {
        select! {
            Some(event) = rx.recv() => {
                debug!("dispatch {event:?}");
                coordinator.handle(event);
            }
            _ = forwarders.closed() => break Exit::BusLost,
            name = shutdown.recv() => {
                info!("received {name}; shutting down");
                break Exit::Shutdown;
            }
        }
    };

    let abort = wind_down(coordinator, exit);
    drop(forwarders);

    if abort {
        services.abort_identification().await;
    }
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpunlock_core::{FpUnlockResult, RequestId, SessionHandle, SessionState, TimerToken};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn cli_flags_parse() {
        let args = Args::try_parse_from([
            "fpunlock-daemon",
            "--config",
            "/tmp/fpunlock.yaml",
            "--mode",
            "signals",
            "--print-config",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/fpunlock.yaml")));
        assert_eq!(args.mode, Some(IdentifyMode::Signals));
        assert!(args.print_config);
        assert!(!args.print_config_schema);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Args::try_parse_from(["fpunlock-daemon", "--mode", "both"]).is_err());
    }

    #[test]
    fn mode_flag_overrides_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fpunlock.toml");
        std::fs::write(&path, "[fingerprint]\nmode = \"polling\"\n").unwrap();

        let args = Args {
            config: Some(path),
            mode: Some(IdentifyMode::Signals),
            print_config: false,
            print_config_schema: false,
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.fingerprint.mode, IdentifyMode::Signals);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let args = Args {
            config: Some(PathBuf::from("/nonexistent/fpunlock.toml")),
            mode: None,
            print_config: false,
            print_config_schema: false,
        };
        assert!(load_config(&args).is_err());
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl FingerprintController for Recorder {
        fn request_identify(&mut self, request: RequestId) {
            self.push(format!("identify {request}"));
        }

        fn start_identify(&mut self) {
            self.push("identify".to_string());
        }

        fn stop(&mut self) {
            self.push("abort".to_string());
        }
    }

    impl UnlockActuator for Recorder {
        fn unlock(&mut self, session: &SessionHandle) {
            self.push(format!("unlock {}", session.id));
        }
    }

    impl FeedbackEmitter for Recorder {
        fn emit(&mut self, event: &str) {
            self.push(format!("feedback {event}"));
        }
    }

    impl TimerScheduler for Recorder {
        fn schedule(&mut self, delay: Duration) -> TimerToken {
            self.push(format!("schedule {delay:?}"));
            TimerToken(1)
        }

        fn cancel(&mut self, token: TimerToken) {
            self.push(format!("cancel {token}"));
        }
    }

    type TestCoordinator = UnlockCoordinator<Recorder, Recorder, Recorder, Recorder>;

    fn tracking(idle: bool, locked: bool) -> (TestCoordinator, Recorder) {
        let rec = Recorder::default();
        let mut coordinator = UnlockCoordinator::new(
            CoordinatorSettings::default(),
            rec.clone(),
            rec.clone(),
            rec.clone(),
            rec.clone(),
        );
        coordinator.handle(Event::BusReady {
            session: SessionHandle {
                id: "3".to_string(),
                path: "/org/freedesktop/login1/session/_33".to_string(),
            },
            hints: SessionState::new(idle, locked),
        });
        rec.take();
        (coordinator, rec)
    }

    #[test]
    fn shutdown_while_identifying_owes_an_abort() {
        let (coordinator, rec) = tracking(false, true);
        assert!(wind_down(coordinator, Exit::Shutdown));
        // the settle timer goes with the coordinator
        assert_eq!(rec.take(), vec!["cancel timer#1".to_string()]);
    }

    #[test]
    fn no_abort_when_idle_or_when_the_bus_is_gone() {
        let (coordinator, rec) = tracking(true, true);
        assert!(!wind_down(coordinator, Exit::Shutdown));
        assert!(rec.take().is_empty());

        let (coordinator, _) = tracking(false, true);
        assert!(!wind_down(coordinator, Exit::BusLost));
    }

    #[derive(Default)]
    struct CountingConnector {
        subscriptions: u32,
        reads: u32,
    }

    impl ServiceConnector for CountingConnector {
        type Services = ();
        type Subscription = u32;

        async fn connect(&mut self) -> FpUnlockResult<()> {
            Ok(())
        }

        async fn resolve_session(&mut self, _services: &()) -> FpUnlockResult<SessionHandle> {
            Ok(SessionHandle {
                id: "3".to_string(),
                path: "/org/freedesktop/login1/session/_33".to_string(),
            })
        }

        async fn subscribe(&mut self, _services: &(), _session: &SessionHandle) -> FpUnlockResult<u32> {
            self.subscriptions += 1;
            Ok(self.subscriptions)
        }

        async fn read_hints(&mut self, _services: &(), _session: &SessionHandle) -> FpUnlockResult<SessionState> {
            self.reads += 1;
            Ok(SessionState::new(self.reads > 1, true))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lost_bus_rebuilds_the_link_from_scratch() {
        let mut monitor = BusReadinessMonitor::new(CountingConnector::default(), Duration::from_secs(1));
        let first = monitor.wait().await.unwrap().expect("first link");
        assert_eq!(first.subscription, 1);

        assert!(reconnect(&mut monitor, Exit::BusLost));
        assert!(!monitor.is_established());

        let second = monitor.wait().await.unwrap().expect("rebuilt link");
        assert_eq!(second.subscription, 2);
        assert_eq!(second.hints, SessionState::new(true, true));
        assert_eq!(monitor.connector().reads, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_keeps_the_link_and_stops() {
        let mut monitor = BusReadinessMonitor::new(CountingConnector::default(), Duration::from_secs(1));
        monitor.wait().await.unwrap();

        assert!(!reconnect(&mut monitor, Exit::Shutdown));
        assert!(monitor.is_established());
        assert_eq!(monitor.connector().subscriptions, 1);
    }
}
