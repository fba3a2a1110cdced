//! Command-line interface for the caplearn capability learning engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use caplearn_engine::{
    DeviceIdentity, LearnedProfile, LearnerConfig, LearningSession, MemoryDevice, Phase,
    ProfileStore, Schedule, TelemetryEvent,
};
use caplearn_storage::{create_backend, SharedBackend};
use clap::{Parser, Subcommand};
use serde_json::json;

/// Environment variable enabling JSON log output.
const LOG_JSON_ENV: &str = "CAPLEARN_LOG_JSON";

/// Spacing between replayed events that carry no timestamp.
const DEFAULT_EVENT_SPACING_MS: i64 = 1_000;

/// caplearn - learn device capabilities from captured telemetry.
#[derive(Parser, Debug)]
#[command(name = "caplearn")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON-lines telemetry capture through a learning session.
    Replay {
        /// File with one telemetry event per line.
        events: PathBuf,
        /// Hardware address of the device.
        #[arg(long)]
        device: String,
        /// Vendor (manufacturer) name.
        #[arg(long)]
        vendor: Option<String>,
        /// Model identifier.
        #[arg(long)]
        model: Option<String>,
        /// Profile database. Without it profiles are kept in memory only.
        #[arg(long)]
        db: Option<PathBuf>,
        /// Active learning window in seconds.
        #[arg(long)]
        active_secs: Option<u64>,
        /// Passive refinement interval in seconds.
        #[arg(long)]
        passive_secs: Option<u64>,
        /// Close a still-open active window and commit pending capabilities
        /// after the last event.
        #[arg(long)]
        finish: bool,
    },
    /// Print the stored profile of a device.
    Show {
        /// Profile database.
        #[arg(long)]
        db: PathBuf,
        /// Hardware address of the device.
        #[arg(long)]
        device: String,
    },
    /// List devices with a stored profile.
    List {
        /// Profile database.
        #[arg(long)]
        db: PathBuf,
    },
    /// Delete the stored profile of a device.
    Clear {
        /// Profile database.
        #[arg(long)]
        db: PathBuf,
        /// Hardware address of the device.
        #[arg(long)]
        device: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Replay {
            events,
            device,
            vendor,
            model,
            db,
            active_secs,
            passive_secs,
            finish,
        } => {
            let mut identity = DeviceIdentity::new(device);
            identity.vendor = vendor;
            identity.model = model;

            let mut config = LearnerConfig::from_env();
            if let Some(secs) = active_secs {
                config = config.with_active_learning_secs(secs);
            }
            if let Some(secs) = passive_secs {
                config = config.with_passive_check_secs(secs);
            }

            run_replay(&events, identity, db.as_deref(), config, finish)
        }
        Command::Show { db, device } => show_profile(&db, &device),
        Command::List { db } => list_profiles(&db),
        Command::Clear { db, device } => clear_profile(&db, &device),
    }
}

fn init_logging(verbose: bool) {
    let json_logging = std::env::var(LOG_JSON_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_directive = if verbose { "caplearn=debug" } else { "caplearn=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    // Logs go to stderr so stdout stays machine-readable
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn open_backend(db: Option<&Path>) -> Result<SharedBackend> {
    let backend = match db {
        Some(path) => create_backend("redb", &json!({ "path": path.to_string_lossy() })),
        None => create_backend("memory", &json!({})),
    };
    backend.context("Failed to open profile database")
}

fn read_events(path: &Path) -> Result<Vec<TelemetryEvent>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut events = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: TelemetryEvent = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid telemetry event", path.display(), index + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// Timers of a replayed session on the simulated clock.
#[derive(Debug, Default)]
struct SimulatedTimers {
    timeout_at: Option<i64>,
    /// Next tick and period.
    ticker: Option<(i64, i64)>,
}

impl SimulatedTimers {
    fn apply(&mut self, schedule: Schedule, now: i64) {
        match schedule {
            Schedule::Unchanged => {}
            Schedule::ActiveTimeout(delay) => {
                self.timeout_at = Some(now + delay.as_millis() as i64);
                self.ticker = None;
            }
            Schedule::PassiveTicks(period) => {
                let period = (period.as_millis() as i64).max(1);
                self.timeout_at = None;
                self.ticker = Some((now + period, period));
            }
            Schedule::Cancel => *self = Self::default(),
        }
    }

    /// Fire every timer due at or before `until`, in time order.
    fn advance(&mut self, session: &mut LearningSession, until: i64) {
        loop {
            let next_tick = self.ticker.map(|(at, _)| at);
            match (self.timeout_at, next_tick) {
                (Some(at), _) if at <= until && next_tick.map_or(true, |t| at <= t) => {
                    self.timeout_at = None;
                    let schedule = session.on_active_timeout(at);
                    self.apply(schedule, at);
                }
                (_, Some(at)) if at <= until => {
                    if let Some((_, period)) = self.ticker {
                        self.ticker = Some((at + period, period));
                    }
                    let report = session.on_passive_tick(at);
                    if !report.committed.is_empty() {
                        tracing::debug!(at, committed = report.committed.len(), "Simulated passive tick");
                    }
                }
                _ => break,
            }
        }
    }
}

fn run_replay(
    events_path: &Path,
    identity: DeviceIdentity,
    db: Option<&Path>,
    config: LearnerConfig,
    finish: bool,
) -> Result<()> {
    let events = read_events(events_path)?;
    let backend = open_backend(db)?;
    let device = Arc::new(MemoryDevice::new(identity));
    let mut session = LearningSession::new(device.clone(), backend, config);

    let start = events
        .first()
        .and_then(TelemetryEvent::timestamp)
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

    let mut timers = SimulatedTimers::default();
    let schedule = session.initialize(start);
    timers.apply(schedule, start);

    let mut clock = start;
    for (i, event) in events.into_iter().enumerate() {
        let at = match event.timestamp() {
            Some(ts) => ts.max(clock),
            None if i == 0 => clock,
            None => clock + DEFAULT_EVENT_SPACING_MS,
        };
        timers.advance(&mut session, at);
        clock = at;
        session.ingest(event, at);
    }

    if finish {
        match session.phase() {
            Phase::ActiveLearning { .. } => {
                let schedule = session.on_active_timeout(clock);
                timers.apply(schedule, clock);
            }
            Phase::PassiveMode => {
                session.on_passive_tick(clock);
            }
            _ => {}
        }
    }

    tracing::info!(
        phase = %session.phase(),
        dps = session.observations().dp_count(),
        clusters = session.observations().cluster_count(),
        applied = device.capabilities().len(),
        "Replay complete"
    );

    print_profile(session.profile())
}

fn print_profile(profile: Option<&LearnedProfile>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

fn show_profile(db: &Path, device: &str) -> Result<()> {
    let store = ProfileStore::new(open_backend(Some(db))?);
    match store.load(device)? {
        Some(profile) => print_profile(Some(&profile)),
        None => anyhow::bail!("No profile stored for {}", device),
    }
}

fn list_profiles(db: &Path) -> Result<()> {
    let store = ProfileStore::new(open_backend(Some(db))?);
    for address in store.list_devices()? {
        match store.load(&address) {
            Ok(Some(profile)) => {
                let updated = chrono::DateTime::from_timestamp_millis(profile.last_updated)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| profile.last_updated.to_string());
                let capabilities: Vec<&str> =
                    profile.capabilities.iter().map(|c| c.as_str()).collect();
                println!("{}\t{}\t{}", address, updated, capabilities.join(","));
            }
            Ok(None) => {}
            Err(e) => println!("{}\t<unreadable: {}>", address, e),
        }
    }
    Ok(())
}

fn clear_profile(db: &Path, device: &str) -> Result<()> {
    let store = ProfileStore::new(open_backend(Some(db))?);
    if store.clear(device)? {
        println!("Cleared profile for {}", device);
    } else {
        println!("No profile stored for {}", device);
    }
    Ok(())
}
