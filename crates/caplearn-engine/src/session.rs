//! Learning session state machine.
//!
//! [`LearningSession`] owns everything one device's learning needs: the
//! observation records, the in-memory profile and the phase. It has no clock
//! and no timers of its own. Every operation takes the current time in unix
//! milliseconds and returns a [`Schedule`] telling the driver which timer to
//! run next, so the whole lifecycle can be stepped deterministically.
//!
//! ```text
//! Idle ──initialize──→ ActiveLearning ──timeout──→ Inferring ──→ PassiveMode
//!   │                        ↑                                      │
//!   └──(usable profile)──────┼──────────────────────────────────────┘
//!                      force_relearn                       passive ticks
//! ```
//!
//! `Destroyed` is reachable from every phase and is terminal.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use caplearn_storage::SharedBackend;
use tracing::{debug, info, trace, warn};

use crate::capability::Capability;
use crate::config::LearnerConfig;
use crate::host::{apply_capability, ApplyOutcome, DeviceHost};
use crate::knowledge::KnowledgeBase;
use crate::observation::{ClusterObservation, ObservationRecord, ObservationStore};
use crate::profile::{learning_reason, DeviceIdentity, LearnedProfile, ProfileStore};
use crate::signal::SampleValue;
use crate::telemetry::TelemetryEvent;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ActiveLearning { started_at: i64 },
    /// Final sweep after the active window. Only observable while the sweep runs.
    Inferring,
    PassiveMode,
    Destroyed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::ActiveLearning { .. } => "active_learning",
            Phase::Inferring => "inferring",
            Phase::PassiveMode => "passive",
            Phase::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Timer instruction for the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Keep whatever timer is running.
    Unchanged,
    /// Cancel running timers and fire [`LearningSession::on_active_timeout`] once after this delay.
    ActiveTimeout(Duration),
    /// Cancel running timers and call [`LearningSession::on_passive_tick`] at this interval.
    PassiveTicks(Duration),
    /// Cancel every timer.
    Cancel,
}

/// Outcome of one passive refinement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefineReport {
    /// Capabilities newly written to the profile.
    pub committed: Vec<Capability>,
    /// Whether the profile was persisted.
    pub saved: bool,
}

/// Learning state for one device.
pub struct LearningSession {
    device: Arc<dyn DeviceHost>,
    store: ProfileStore,
    knowledge: Arc<KnowledgeBase>,
    config: LearnerConfig,
    identity: DeviceIdentity,
    phase: Phase,
    observations: ObservationStore,
    profile: Option<LearnedProfile>,
    /// Samples already accounted for in a resumed profile.
    baseline_samples: u64,
}

impl LearningSession {
    pub fn new(device: Arc<dyn DeviceHost>, backend: SharedBackend, config: LearnerConfig) -> Self {
        let config = config.normalized();
        let identity = device.identity();
        Self {
            device,
            store: ProfileStore::new(backend),
            knowledge: Arc::new(KnowledgeBase::builtin()),
            observations: ObservationStore::new(config.max_samples_per_source),
            config,
            identity,
            phase: Phase::Idle,
            profile: None,
            baseline_samples: 0,
        }
    }

    /// Replace the built-in knowledge tables.
    pub fn with_knowledge(mut self, knowledge: Arc<KnowledgeBase>) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True only during the active learning window.
    pub fn is_learning(&self) -> bool {
        matches!(self.phase, Phase::ActiveLearning { .. })
    }

    /// Last committed profile.
    pub fn profile(&self) -> Option<&LearnedProfile> {
        self.profile.as_ref()
    }

    pub fn observations(&self) -> &ObservationStore {
        &self.observations
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Decide between fresh learning and resuming from the stored profile.
    ///
    /// Only acts from [`Phase::Idle`].
    pub fn initialize(&mut self, now: i64) -> Schedule {
        if self.phase != Phase::Idle {
            debug!(device = %self.identity.address, phase = %self.phase, "Already initialized");
            return Schedule::Unchanged;
        }

        self.identity = self.device.identity();
        let stored = match self.store.load(&self.identity.address) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(device = %self.identity.address, error = %e, "Ignoring unreadable profile");
                None
            }
        };

        let reason = learning_reason(
            stored.as_ref(),
            &self.identity,
            now,
            self.config.max_profile_age_ms(),
        );

        match reason {
            Some(reason) => {
                info!(device = %self.identity.address, %reason, "Starting active learning");
                self.start_active(now)
            }
            None => {
                let profile = stored.unwrap_or_else(|| LearnedProfile::new(self.identity.clone(), now));
                info!(
                    device = %self.identity.address,
                    capabilities = profile.capabilities.len(),
                    "Using stored profile, entering passive mode"
                );
                self.baseline_samples = profile.total_sample_count;
                self.profile = Some(profile);
                self.phase = Phase::PassiveMode;
                Schedule::PassiveTicks(self.config.passive_interval())
            }
        }
    }

    fn start_active(&mut self, now: i64) -> Schedule {
        self.profile = None;
        self.baseline_samples = 0;
        self.phase = Phase::ActiveLearning { started_at: now };
        Schedule::ActiveTimeout(self.config.active_duration())
    }

    /// Record one data point report. Returns whether it was recorded.
    pub fn record_dp(&mut self, dp_id: u8, value: SampleValue, raw: serde_json::Value, now: i64) -> bool {
        let retain = match self.phase {
            Phase::ActiveLearning { .. } => true,
            Phase::Inferring | Phase::PassiveMode => false,
            Phase::Idle | Phase::Destroyed => {
                trace!(device = %self.identity.address, dp = dp_id, phase = %self.phase, "Ignoring DP report");
                return false;
            }
        };

        let record = self.observations.record_dp(dp_id, value, raw, now, retain);
        debug!(
            device = %self.identity.address,
            dp = dp_id,
            semantic_type = %record.semantic_type,
            samples = record.sample_count,
            "DP report"
        );
        infer_dp(&self.knowledge, record, self.config.min_samples);
        true
    }

    /// Record one cluster attribute report. Returns whether it was recorded.
    pub fn record_zcl(
        &mut self,
        cluster_id: u16,
        cluster_name: &str,
        attribute: &str,
        value: SampleValue,
        now: i64,
    ) -> bool {
        let retain = match self.phase {
            Phase::ActiveLearning { .. } => true,
            Phase::Inferring | Phase::PassiveMode => false,
            Phase::Idle | Phase::Destroyed => {
                trace!(device = %self.identity.address, cluster = cluster_id, phase = %self.phase, "Ignoring ZCL report");
                return false;
            }
        };

        let record = self
            .observations
            .record_zcl(cluster_id, cluster_name, attribute, value, now, retain);
        debug!(
            device = %self.identity.address,
            cluster = cluster_id,
            attribute,
            samples = record.sample_count,
            "ZCL report"
        );
        infer_cluster(&self.knowledge, record);
        true
    }

    /// Record a telemetry event, stamped with its own timestamp when present.
    pub fn ingest(&mut self, event: TelemetryEvent, now: i64) -> bool {
        let ts = event.timestamp().unwrap_or(now);
        match event {
            TelemetryEvent::Dp(r) => self.record_dp(r.dp, r.value, r.raw, ts),
            TelemetryEvent::Zcl(r) => self.record_zcl(r.cluster, &r.name, &r.attribute, r.value, ts),
        }
    }

    /// Close the active window: final sweep, apply, save, go passive.
    pub fn on_active_timeout(&mut self, now: i64) -> Schedule {
        let started_at = match self.phase {
            Phase::ActiveLearning { started_at } => started_at,
            _ => return Schedule::Unchanged,
        };

        self.phase = Phase::Inferring;
        info!(
            device = %self.identity.address,
            dps = self.observations.dp_count(),
            clusters = self.observations.cluster_count(),
            elapsed_secs = (now - started_at) / 1000,
            "Active learning complete"
        );

        let min_samples = self.config.min_samples;
        for record in self.observations.dps_mut() {
            infer_dp(&self.knowledge, record, min_samples);
        }
        for record in self.observations.clusters_mut() {
            infer_cluster(&self.knowledge, record);
        }

        let capabilities = self.observations.inferred_capabilities();
        self.apply(&capabilities);
        self.commit(now, Some(now - started_at));
        self.observations.discard_history();

        self.phase = Phase::PassiveMode;
        info!(device = %self.identity.address, "Entering passive mode");
        Schedule::PassiveTicks(self.config.passive_interval())
    }

    /// Commit capabilities inferred since the last save.
    ///
    /// A pass that finds nothing new writes nothing.
    pub fn on_passive_tick(&mut self, now: i64) -> RefineReport {
        if self.phase != Phase::PassiveMode {
            return RefineReport::default();
        }

        let pending = self.observations.uncommitted(self.profile.as_ref());
        if pending.is_empty() {
            trace!(device = %self.identity.address, "Passive refinement found nothing new");
            return RefineReport::default();
        }

        let capabilities: BTreeSet<Capability> = pending.iter().map(|(_, c)| *c).collect();
        for (source, capability) in &pending {
            info!(device = %self.identity.address, %source, %capability, "Passive refinement discovered capability");
        }

        self.apply(&capabilities);
        let saved = self.commit(now, None);
        RefineReport {
            committed: capabilities.into_iter().collect(),
            saved,
        }
    }

    /// Drop everything learned and start a fresh active window.
    pub fn force_relearn(&mut self, now: i64) -> Schedule {
        if self.phase == Phase::Destroyed {
            return Schedule::Unchanged;
        }

        info!(device = %self.identity.address, "Forced re-learning");
        self.observations.clear();
        self.identity = self.device.identity();
        if let Err(e) = self.store.clear(&self.identity.address) {
            warn!(device = %self.identity.address, error = %e, "Failed to clear stored profile");
        }
        self.start_active(now)
    }

    /// Stop for good. Safe to call more than once.
    pub fn destroy(&mut self) -> Schedule {
        if self.phase != Phase::Destroyed {
            info!(device = %self.identity.address, "Learner destroyed");
        }
        self.phase = Phase::Destroyed;
        self.observations.clear();
        Schedule::Cancel
    }

    fn apply(&self, capabilities: &BTreeSet<Capability>) {
        let mut added = 0;
        for capability in capabilities {
            if apply_capability(self.device.as_ref(), *capability) == ApplyOutcome::Added {
                added += 1;
            }
        }
        debug!(device = %self.identity.address, added, total = capabilities.len(), "Applied capabilities");
    }

    /// Merge observations into the profile and persist it.
    ///
    /// The in-memory profile is updated even when the save fails.
    fn commit(&mut self, now: i64, learning_duration_ms: Option<i64>) -> bool {
        self.identity = self.device.identity();

        let mut profile = self
            .profile
            .take()
            .unwrap_or_else(|| LearnedProfile::new(self.identity.clone(), now));
        profile.device_identity = self.identity.clone();
        profile.merge_observations(&self.observations);
        profile.last_updated = now;
        profile.total_sample_count = self.baseline_samples + self.observations.total_samples();
        if let Some(duration) = learning_duration_ms {
            profile.learning_duration_ms = duration;
        }

        let saved = match self.store.save(&self.identity.address, &profile) {
            Ok(()) => {
                info!(
                    device = %self.identity.address,
                    capabilities = profile.capabilities.len(),
                    samples = profile.total_sample_count,
                    "Saved learned profile"
                );
                true
            }
            Err(e) => {
                warn!(device = %self.identity.address, error = %e, "Failed to save learned profile");
                false
            }
        };

        self.profile = Some(profile);
        saved
    }
}

impl std::fmt::Debug for LearningSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningSession")
            .field("device", &self.identity.address)
            .field("phase", &self.phase)
            .field("dps", &self.observations.dp_count())
            .field("clusters", &self.observations.cluster_count())
            .finish()
    }
}

/// Attempt inference for a data point that has enough samples and no
/// capability yet. Unrecognized candidates are rejected and logged once.
fn infer_dp(knowledge: &KnowledgeBase, record: &mut ObservationRecord, min_samples: usize) {
    if record.inferred.is_some() || record.sample_count < min_samples {
        return;
    }

    let Some(candidate) =
        knowledge.infer_from_dp(record.dp_id, record.semantic_type, &record.summary.range)
    else {
        return;
    };

    match candidate.capability() {
        Some(capability) => {
            if record.set_inferred(capability) {
                info!(
                    dp = record.dp_id,
                    %capability,
                    semantic_type = %record.semantic_type,
                    "Inferred capability"
                );
            }
        }
        None => {
            if record.rejected != Some(candidate.name()) {
                warn!(dp = record.dp_id, candidate = candidate.name(), "Rejected unrecognized capability");
                record.rejected = Some(candidate.name());
            }
        }
    }
}

fn infer_cluster(knowledge: &KnowledgeBase, record: &mut ClusterObservation) {
    if record.inferred.is_some() {
        return;
    }
    if let Some(capability) = knowledge.infer_from_cluster(record.cluster_id) {
        record.set_inferred(capability);
        info!(cluster = record.cluster_id, %capability, "Inferred capability");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryDevice;
    use crate::knowledge::{DpContext, DpPattern};
    use crate::profile::PROFILE_TABLE;
    use crate::signal::SemanticType;
    use caplearn_storage::{MemoryBackend, StorageBackend};
    use serde_json::json;

    const ADDR: &str = "a4:c1:38:aa:bb:cc";
    const T0: i64 = 1_700_000_000_000;
    const ACTIVE_MS: i64 = 15 * 60 * 1000;

    struct Fixture {
        device: Arc<MemoryDevice>,
        backend: Arc<MemoryBackend>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                device: Arc::new(MemoryDevice::new(DeviceIdentity::new(ADDR).with_model("TS0601"))),
                backend: Arc::new(MemoryBackend::default()),
            }
        }

        fn session(&self) -> LearningSession {
            LearningSession::new(
                self.device.clone(),
                self.backend.clone(),
                LearnerConfig::default(),
            )
        }
    }

    fn dp(session: &mut LearningSession, id: u8, values: &[f64], now: i64) {
        for v in values {
            session.record_dp(id, (*v).into(), json!(v), now);
        }
    }

    #[test]
    fn test_fresh_device_starts_active() {
        let fx = Fixture::new();
        let mut session = fx.session();
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.is_learning());

        assert_eq!(
            session.initialize(T0),
            Schedule::ActiveTimeout(Duration::from_secs(900))
        );
        assert!(session.is_learning());
        assert_eq!(session.phase(), Phase::ActiveLearning { started_at: T0 });

        // Second call is a no-op
        assert_eq!(session.initialize(T0 + 5), Schedule::Unchanged);
        assert_eq!(session.phase(), Phase::ActiveLearning { started_at: T0 });
    }

    #[test]
    fn test_events_before_initialize_are_ignored() {
        let fx = Fixture::new();
        let mut session = fx.session();
        assert!(!session.record_dp(1, 1.0.into(), json!(1), T0));
        assert!(!session.record_zcl(6, "onOff", "onOff", true.into(), T0));
        assert!(session.observations().is_empty());
    }

    #[test]
    fn test_realtime_inference_needs_min_samples() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.initialize(T0);

        dp(&mut session, 1, &[0.0], T0 + 1);
        assert_eq!(session.observations().dp(1).unwrap().inferred, None);

        dp(&mut session, 1, &[1.0], T0 + 2);
        assert_eq!(
            session.observations().dp(1).unwrap().inferred,
            Some(Capability::Onoff)
        );

        // Clusters infer on the first report
        session.record_zcl(0x0402, "temperatureMeasurement", "measuredValue", 2150.0.into(), T0 + 3);
        assert_eq!(
            session.observations().cluster(0x0402).unwrap().inferred,
            Some(Capability::MeasureTemperature)
        );
    }

    #[test]
    fn test_boolean_dp_end_to_end() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.initialize(T0);
        dp(&mut session, 1, &[0.0, 1.0, 0.0], T0 + 1_000);

        assert_eq!(
            session.on_active_timeout(T0 + ACTIVE_MS),
            Schedule::PassiveTicks(Duration::from_secs(300))
        );
        assert_eq!(session.phase(), Phase::PassiveMode);
        assert!(!session.is_learning());

        let profile = session.profile().unwrap();
        assert!(profile.capabilities.contains(&Capability::Onoff));
        assert_eq!(profile.dp_mappings[&1].semantic_type, SemanticType::Boolean);
        assert_eq!(profile.learning_duration_ms, ACTIVE_MS);
        assert_eq!(profile.total_sample_count, 3);
        assert!(fx.device.has_capability(Capability::Onoff));

        // Persisted and identical
        let stored = ProfileStore::new(fx.backend.clone()).load(ADDR).unwrap().unwrap();
        assert_eq!(&stored, profile);

        // Histories are gone, summaries stay
        let record = session.observations().dp(1).unwrap();
        assert!(record.samples.is_empty());
        assert_eq!(record.sample_count, 3);
    }

    #[test]
    fn test_temperature_raw_end_to_end() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.initialize(T0);
        dp(&mut session, 5, &[215.0, 218.0, 221.0], T0 + 1_000);
        session.on_active_timeout(T0 + ACTIVE_MS);

        let mapping = &session.profile().unwrap().dp_mappings[&5];
        assert_eq!(mapping.semantic_type, SemanticType::TemperatureRaw);
        assert_eq!(mapping.capability, Capability::MeasureTemperature);
        assert_eq!(mapping.min, Some(215.0));
        assert_eq!(mapping.max, Some(221.0));
    }

    #[test]
    fn test_battery_dp_percentage() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.initialize(T0);

        dp(&mut session, 15, &[87.0, 86.0], T0 + 1);
        session.on_active_timeout(T0 + ACTIVE_MS);
        assert_eq!(
            session.profile().unwrap().dp_mappings[&15].capability,
            Capability::MeasureBattery
        );
    }

    #[test]
    fn test_single_sample_never_infers() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.initialize(T0);
        dp(&mut session, 15, &[87.0], T0 + 1);
        session.on_active_timeout(T0 + ACTIVE_MS);

        let profile = session.profile().unwrap();
        assert!(profile.capabilities.is_empty());
        assert!(profile.dp_mappings.is_empty());
    }

    #[test]
    fn test_unrecognized_candidate_rejected() {
        let fx = Fixture::new();
        let knowledge = KnowledgeBase::builtin()
            .with_dp_pattern(9, DpPattern::new(&["alarm_foo_bar"], DpContext::Alarm));
        let mut session = fx.session().with_knowledge(Arc::new(knowledge));
        session.initialize(T0);

        dp(&mut session, 9, &[0.0, 1.0, 0.0], T0 + 1);
        assert_eq!(session.observations().dp(9).unwrap().inferred, None);
        assert_eq!(
            session.observations().dp(9).unwrap().rejected,
            Some("alarm_foo_bar")
        );

        // Presence time on DP 101 is a setting, not a capability
        dp(&mut session, 101, &[0.0, 30.0, 60.0], T0 + 2);
        session.on_active_timeout(T0 + ACTIVE_MS);

        let profile = session.profile().unwrap();
        assert!(profile.dp_mappings.is_empty());
        assert!(profile.capabilities.is_empty());
        assert_eq!(
            session.observations().dp(101).unwrap().rejected,
            Some("measure_presence_time")
        );
        let json = serde_json::to_string(profile).unwrap();
        assert!(!json.contains("foo_bar"));
        assert!(!json.contains("measure_presence_time"));
        assert!(fx.device.capabilities().is_empty());
    }

    #[test]
    fn test_resume_from_stored_profile() {
        let fx = Fixture::new();
        let mut first = fx.session();
        first.initialize(T0);
        dp(&mut first, 1, &[0.0, 1.0], T0 + 1);
        first.on_active_timeout(T0 + ACTIVE_MS);
        first.destroy();

        let mut second = fx.session();
        let later = T0 + 24 * 3_600_000;
        assert_eq!(
            second.initialize(later),
            Schedule::PassiveTicks(Duration::from_secs(300))
        );
        assert_eq!(second.phase(), Phase::PassiveMode);
        assert!(second.profile().unwrap().capabilities.contains(&Capability::Onoff));
    }

    #[test]
    fn test_stale_profile_relearns() {
        let fx = Fixture::new();
        let mut first = fx.session();
        first.initialize(T0);
        dp(&mut first, 1, &[0.0, 1.0], T0 + 1);
        first.on_active_timeout(T0 + ACTIVE_MS);

        let mut second = fx.session();
        let eight_days = 8 * 24 * 3_600_000;
        assert!(matches!(
            second.initialize(T0 + ACTIVE_MS + eight_days),
            Schedule::ActiveTimeout(_)
        ));
        assert!(second.profile().is_none());
    }

    #[test]
    fn test_identity_change_relearns() {
        let fx = Fixture::new();
        let mut first = fx.session();
        first.initialize(T0);
        dp(&mut first, 1, &[0.0, 1.0], T0 + 1);
        first.on_active_timeout(T0 + ACTIVE_MS);

        fx.device
            .set_identity(DeviceIdentity::new(ADDR).with_model("TS0207"));
        let mut second = fx.session();
        assert!(matches!(
            second.initialize(T0 + ACTIVE_MS + 1),
            Schedule::ActiveTimeout(_)
        ));
    }

    #[test]
    fn test_malformed_profile_relearns() {
        let fx = Fixture::new();
        fx.backend.write(PROFILE_TABLE, ADDR, b"{]").unwrap();

        let mut session = fx.session();
        assert!(matches!(session.initialize(T0), Schedule::ActiveTimeout(_)));
        assert!(session.is_learning());
    }

    #[test]
    fn test_passive_tick_commits_new_sources_once() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.initialize(T0);
        dp(&mut session, 1, &[0.0, 1.0], T0 + 1);
        session.on_active_timeout(T0 + ACTIVE_MS);

        // Nothing new
        let t1 = T0 + ACTIVE_MS + 300_000;
        assert_eq!(session.on_passive_tick(t1), RefineReport::default());
        assert_eq!(session.profile().unwrap().last_updated, T0 + ACTIVE_MS);

        // Humidity shows up after the window
        dp(&mut session, 3, &[45.0, 47.0], t1 + 10);
        assert!(session.observations().dp(3).unwrap().samples.is_empty());
        assert!(!fx.device.has_capability(Capability::MeasureHumidity));

        let t2 = t1 + 300_000;
        let report = session.on_passive_tick(t2);
        assert_eq!(report.committed, vec![Capability::MeasureHumidity]);
        assert!(report.saved);
        assert!(fx.device.has_capability(Capability::MeasureHumidity));

        let profile = session.profile().unwrap().clone();
        assert_eq!(profile.last_updated, t2);
        assert_eq!(profile.dp_mappings.len(), 2);
        assert_eq!(profile.learning_duration_ms, ACTIVE_MS);
        assert_eq!(profile.total_sample_count, 4);

        // Second pass is a no-op
        assert_eq!(session.on_passive_tick(t2 + 300_000), RefineReport::default());
        assert_eq!(session.profile().unwrap(), &profile);
    }

    #[test]
    fn test_resumed_sample_count_accumulates() {
        let fx = Fixture::new();
        let mut first = fx.session();
        first.initialize(T0);
        dp(&mut first, 1, &[0.0, 1.0, 1.0], T0 + 1);
        first.on_active_timeout(T0 + ACTIVE_MS);

        let mut second = fx.session();
        let t = T0 + ACTIVE_MS + 60_000;
        second.initialize(t);
        dp(&mut second, 15, &[50.0, 51.0], t + 1);
        second.on_passive_tick(t + 300_000);

        let profile = second.profile().unwrap();
        assert_eq!(profile.total_sample_count, 5);
        assert!(profile.capabilities.contains(&Capability::Onoff));
        assert!(profile.capabilities.contains(&Capability::MeasureBattery));
    }

    #[test]
    fn test_force_relearn() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.initialize(T0);
        dp(&mut session, 1, &[0.0, 1.0], T0 + 1);
        session.on_active_timeout(T0 + ACTIVE_MS);

        let t = T0 + ACTIVE_MS + 5_000;
        assert_eq!(
            session.force_relearn(t),
            Schedule::ActiveTimeout(Duration::from_secs(900))
        );
        assert_eq!(session.phase(), Phase::ActiveLearning { started_at: t });
        assert!(session.profile().is_none());
        assert!(session.observations().is_empty());
        assert!(ProfileStore::new(fx.backend.clone()).load(ADDR).unwrap().is_none());
    }

    #[test]
    fn test_destroy_is_terminal() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.initialize(T0);
        dp(&mut session, 1, &[0.0], T0 + 1);

        assert_eq!(session.destroy(), Schedule::Cancel);
        assert_eq!(session.destroy(), Schedule::Cancel);
        assert_eq!(session.phase(), Phase::Destroyed);
        assert!(session.observations().is_empty());

        assert!(!session.record_dp(1, 1.0.into(), json!(1), T0 + 2));
        assert_eq!(session.initialize(T0 + 3), Schedule::Unchanged);
        assert_eq!(session.force_relearn(T0 + 4), Schedule::Unchanged);
        assert_eq!(session.on_active_timeout(T0 + ACTIVE_MS), Schedule::Unchanged);
        assert_eq!(session.on_passive_tick(T0 + ACTIVE_MS), RefineReport::default());
        assert_eq!(session.phase(), Phase::Destroyed);
    }

    #[test]
    fn test_stale_timeout_ignored_in_passive() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.initialize(T0);
        session.on_active_timeout(T0 + ACTIVE_MS);
        assert_eq!(session.on_active_timeout(T0 + ACTIVE_MS + 1), Schedule::Unchanged);
    }

    #[test]
    fn test_ingest_uses_event_timestamp() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.initialize(T0);

        assert!(session.ingest(TelemetryEvent::dp(5, 215.0).at(T0 + 42), T0 + 1_000));
        assert!(session.ingest(TelemetryEvent::zcl(6, "onOff", "onOff", true), T0 + 2_000));

        assert_eq!(session.observations().dp(5).unwrap().last_seen, T0 + 42);
        assert_eq!(session.observations().cluster(6).unwrap().last_seen, T0 + 2_000);
    }
}
