//! Timer-driven learning controller.
//!
//! Wraps a [`LearningSession`] for a live device and turns its [`Schedule`]
//! instructions into tokio tasks. Telemetry and timer callbacks are
//! serialized through one mutex around the session; the lock is never held
//! across an `.await`.
//!
//! Timer tasks only hold a [`Weak`] reference to the shared state, and every
//! armed timer carries the epoch it was armed in. Re-arming or cancelling
//! bumps the epoch, so a timer that already woke up but lost the race for the
//! lock does nothing.

use std::sync::{Arc, Weak};

use caplearn_storage::SharedBackend;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::LearnerConfig;
use crate::host::DeviceHost;
use crate::knowledge::KnowledgeBase;
use crate::profile::LearnedProfile;
use crate::session::{LearningSession, Phase, Schedule};
use crate::signal::SampleValue;
use crate::telemetry::TelemetryEvent;

/// Timer currently owned by the controller.
enum TimerSlot {
    Idle,
    ActiveTimeout(JoinHandle<()>),
    PassiveTicker(JoinHandle<()>),
}

impl TimerSlot {
    fn cancel(&mut self) {
        match std::mem::replace(self, TimerSlot::Idle) {
            TimerSlot::Idle => {}
            TimerSlot::ActiveTimeout(handle) | TimerSlot::PassiveTicker(handle) => handle.abort(),
        }
    }

    fn is_armed(&self) -> bool {
        !matches!(self, TimerSlot::Idle)
    }
}

struct Shared {
    session: LearningSession,
    timer: TimerSlot,
    epoch: u64,
}

type SharedState = Arc<Mutex<Shared>>;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Learning controller for one device.
///
/// All methods are synchronous and cheap; timers need a tokio runtime to be
/// current when they are armed.
pub struct LearningController {
    shared: SharedState,
}

impl LearningController {
    pub fn new(device: Arc<dyn DeviceHost>, backend: SharedBackend, config: LearnerConfig) -> Self {
        Self::from_session(LearningSession::new(device, backend, config))
    }

    /// Wrap a session built by the caller, e.g. with custom knowledge tables.
    pub fn from_session(session: LearningSession) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                session,
                timer: TimerSlot::Idle,
                epoch: 0,
            })),
        }
    }

    pub fn with_knowledge(
        device: Arc<dyn DeviceHost>,
        backend: SharedBackend,
        config: LearnerConfig,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        Self::from_session(LearningSession::new(device, backend, config).with_knowledge(knowledge))
    }

    /// Load the stored profile and start either active learning or passive
    /// refinement. Only the first call has an effect.
    pub fn initialize(&self) {
        let mut shared = self.shared.lock();
        let schedule = shared.session.initialize(now_ms());
        apply_schedule(&Arc::downgrade(&self.shared), &mut shared, schedule);
    }

    pub fn record_dp(&self, dp_id: u8, value: impl Into<SampleValue>, raw: serde_json::Value) -> bool {
        self.shared
            .lock()
            .session
            .record_dp(dp_id, value.into(), raw, now_ms())
    }

    pub fn record_zcl(
        &self,
        cluster_id: u16,
        cluster_name: &str,
        attribute: &str,
        value: impl Into<SampleValue>,
    ) -> bool {
        self.shared
            .lock()
            .session
            .record_zcl(cluster_id, cluster_name, attribute, value.into(), now_ms())
    }

    pub fn ingest(&self, event: TelemetryEvent) -> bool {
        self.shared.lock().session.ingest(event, now_ms())
    }

    pub fn is_learning(&self) -> bool {
        self.shared.lock().session.is_learning()
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().session.phase()
    }

    /// Snapshot of the last committed profile.
    pub fn get_profile(&self) -> Option<LearnedProfile> {
        self.shared.lock().session.profile().cloned()
    }

    /// Whether a timer task is currently armed.
    pub fn has_timer(&self) -> bool {
        self.shared.lock().timer.is_armed()
    }

    /// Forget everything and restart the active window.
    pub fn force_relearn(&self) {
        let mut shared = self.shared.lock();
        let schedule = shared.session.force_relearn(now_ms());
        apply_schedule(&Arc::downgrade(&self.shared), &mut shared, schedule);
    }

    /// Cancel timers and make the controller inert. Idempotent.
    pub fn destroy(&self) {
        let mut shared = self.shared.lock();
        let schedule = shared.session.destroy();
        apply_schedule(&Arc::downgrade(&self.shared), &mut shared, schedule);
    }
}

impl Drop for LearningController {
    fn drop(&mut self) {
        let mut shared = self.shared.lock();
        shared.epoch += 1;
        shared.timer.cancel();
    }
}

impl std::fmt::Debug for LearningController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("LearningController")
            .field("session", &shared.session)
            .field("timer_armed", &shared.timer.is_armed())
            .finish()
    }
}

fn apply_schedule(weak: &Weak<Mutex<Shared>>, shared: &mut Shared, schedule: Schedule) {
    match schedule {
        Schedule::Unchanged => {}
        Schedule::Cancel => {
            shared.epoch += 1;
            shared.timer.cancel();
        }
        Schedule::ActiveTimeout(delay) => {
            shared.epoch += 1;
            shared.timer.cancel();
            let epoch = shared.epoch;
            let weak = weak.clone();
            if let Some(handle) = spawn_timer(async move {
                tokio::time::sleep(delay).await;
                fire_active_timeout(&weak, epoch);
            }) {
                shared.timer = TimerSlot::ActiveTimeout(handle);
            }
        }
        Schedule::PassiveTicks(period) => {
            shared.epoch += 1;
            shared.timer.cancel();
            let epoch = shared.epoch;
            let weak = weak.clone();
            if let Some(handle) = spawn_timer(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if !fire_passive_tick(&weak, epoch) {
                        break;
                    }
                }
            }) {
                shared.timer = TimerSlot::PassiveTicker(handle);
            }
        }
    }
}

fn spawn_timer<F>(task: F) -> Option<JoinHandle<()>>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(task)),
        Err(_) => {
            tracing::warn!("No tokio runtime available, learning timer not armed");
            None
        }
    }
}

fn fire_active_timeout(weak: &Weak<Mutex<Shared>>, epoch: u64) {
    let Some(state) = weak.upgrade() else {
        return;
    };
    let mut shared = state.lock();
    if shared.epoch != epoch {
        return;
    }

    // This task is the slot's owner; release it without aborting ourselves.
    shared.timer = TimerSlot::Idle;
    let schedule = shared.session.on_active_timeout(now_ms());
    apply_schedule(weak, &mut shared, schedule);
}

/// Returns false once the ticker should stop.
fn fire_passive_tick(weak: &Weak<Mutex<Shared>>, epoch: u64) -> bool {
    let Some(state) = weak.upgrade() else {
        return false;
    };
    let mut shared = state.lock();
    if shared.epoch != epoch {
        return false;
    }

    let report = shared.session.on_passive_tick(now_ms());
    if !report.committed.is_empty() {
        tracing::debug!(
            committed = report.committed.len(),
            saved = report.saved,
            "Passive refinement pass"
        );
    }
    true
}
