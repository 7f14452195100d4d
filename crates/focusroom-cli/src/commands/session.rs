use std::io::Write;
use std::sync::Arc;

use clap::{Subcommand, ValueEnum};
use focusroom_core::timer::lifecycle_channel;
use focusroom_core::{
    Collaborators, Config, CoreError, DisciplineMode, EngineState, Event, LifecycleMonitor,
    LifecycleSignal, SessionEngine, SessionPlan, SqliteStore, StartOutcome, TokioClock,
    TracingNotifier,
};
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Casual,
    Hardcore,
}

impl From<ModeArg> for DisciplineMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Casual => DisciplineMode::Casual,
            ModeArg::Hardcore => DisciplineMode::Hardcore,
        }
    }
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Run a focus session in the foreground, printing events as JSON lines.
    ///
    /// Ctrl-C stops the session. On Unix, SIGHUP or SIGUSR1 report the
    /// host losing foreground.
    Start {
        /// Template name (defaults to session.default_template)
        #[arg(long, conflicts_with = "minutes")]
        template: Option<String>,
        /// Run a single bare work phase of this many minutes
        #[arg(long)]
        minutes: Option<u64>,
        /// Discipline mode (defaults to session.default_mode)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Task reference stored with the session
        #[arg(long)]
        task: Option<String>,
    },
    /// Show recent sessions
    History {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SessionAction::Start {
            template,
            minutes,
            mode,
            task,
        } => {
            let config = Config::load()?;
            let plan = build_plan(&config, template, minutes)?;
            let mode = mode.map_or(config.session.default_mode, DisciplineMode::from);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_session(&config, plan, mode, task))
        }
        SessionAction::History { limit } => {
            let store = SqliteStore::open()?;
            let sessions = store.lock()?.recent_sessions(limit)?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
            Ok(())
        }
    }
}

fn build_plan(
    config: &Config,
    template: Option<String>,
    minutes: Option<u64>,
) -> Result<SessionPlan, CoreError> {
    if let Some(minutes) = minutes {
        return Ok(SessionPlan::free_running(minutes.saturating_mul(60)));
    }
    let name = template.unwrap_or_else(|| config.session.default_template.clone());
    Ok(SessionPlan::templated(config.template(&name)?))
}

async fn run_session(
    config: &Config,
    plan: SessionPlan,
    mode: DisciplineMode,
    task: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open()?;
    let engine = SessionEngine::new(
        Arc::new(TokioClock::current()),
        Collaborators {
            store: Arc::new(store.clone()),
            ledger: Arc::new(store.clone()),
            notifier: Arc::new(TracingNotifier),
        },
        config.engine_settings(),
    );
    let mut events = engine.subscribe();

    let (lifecycle_tx, source) = lifecycle_channel(8);
    tokio::spawn(LifecycleMonitor::new(engine.clone()).run(source));
    forward_lifecycle_signals(lifecycle_tx)?;
    forward_interrupts(engine.clone());

    if engine.start_session(plan, mode, task)? == StartOutcome::Ignored {
        return Err("a session is already running".into());
    }
    tracing::debug!(settings = ?engine.settings(), "session running");

    let stdout = std::io::stdout();
    relay_events(&mut events, &mut stdout.lock()).await
}

/// Print events as JSON lines until the engine is idle again after an outcome.
///
/// Outcome events are followed by a final `StateChanged` to idle, sent from
/// whichever thread finalized the session, so the loop keeps receiving until
/// that transition arrives.
async fn relay_events<W: Write>(
    events: &mut broadcast::Receiver<Event>,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut finished = false;
    loop {
        match events.recv().await {
            Ok(event) => {
                writeln!(out, "{}", serde_json::to_string(&event)?)?;
                finished |= event.is_terminal();
                if finished && matches!(event, Event::StateChanged { to: EngineState::Idle, .. }) {
                    return Ok(());
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

/// Ctrl-C stops the running session.
fn forward_interrupts(engine: SessionEngine) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            let outcome = engine.stop_session();
            tracing::info!(?outcome, "stop requested");
        }
    });
}

#[cfg(unix)]
fn forward_lifecycle_signals(tx: mpsc::Sender<LifecycleSignal>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = hangup.recv() => {}
                Some(()) = user1.recv() => {}
                else => break,
            }
            if tx.send(LifecycleSignal::ForegroundLost).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn forward_lifecycle_signals(tx: mpsc::Sender<LifecycleSignal>) -> std::io::Result<()> {
    drop(tx);
    Ok(())
}
