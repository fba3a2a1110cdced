//! Per-session observation records.
//!
//! One record per data point id and one per cluster id, owned by the session
//! and indexed by source id. Sample histories are only kept while the active
//! window is open; the running summaries outlive it for passive refinement.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use crate::capability::Capability;
use crate::profile::LearnedProfile;
use crate::signal::{classify, SampleValue, SemanticType, SignalSummary};

/// One retained report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub value: SampleValue,
    pub raw: serde_json::Value,
    pub timestamp: i64,
}

/// Observation record for one data point.
#[derive(Debug, Clone, Serialize)]
pub struct ObservationRecord {
    pub dp_id: u8,
    /// Retained history, oldest first.
    pub samples: VecDeque<Sample>,
    /// Samples seen this session, including ones no longer retained.
    pub sample_count: usize,
    pub summary: SignalSummary,
    pub semantic_type: SemanticType,
    /// Set at most once per session.
    pub inferred: Option<Capability>,
    /// Last unrecognized candidate rejected for this source.
    #[serde(skip)]
    pub rejected: Option<&'static str>,
    pub first_seen: i64,
    pub last_seen: i64,
}

impl ObservationRecord {
    fn new(dp_id: u8, now: i64) -> Self {
        Self {
            dp_id,
            samples: VecDeque::new(),
            sample_count: 0,
            summary: SignalSummary::default(),
            semantic_type: SemanticType::Unknown,
            inferred: None,
            rejected: None,
            first_seen: now,
            last_seen: now,
        }
    }

    fn push(&mut self, sample: Sample, retain: bool, max_samples: usize) {
        self.summary.update(&sample.value);
        self.semantic_type = classify(&sample.value, &self.summary);
        self.sample_count += 1;
        self.last_seen = sample.timestamp;

        if retain {
            if self.samples.len() >= max_samples {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }

    /// Record the inferred capability unless one is already set.
    /// Returns whether it was set.
    pub fn set_inferred(&mut self, capability: Capability) -> bool {
        if self.inferred.is_some() {
            return false;
        }
        self.inferred = Some(capability);
        true
    }
}

/// One retained attribute report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeSample {
    pub value: SampleValue,
    pub timestamp: i64,
}

/// Observation record for one standard cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterObservation {
    pub cluster_id: u16,
    pub name: String,
    /// Attribute name to retained history. Names persist after the history
    /// is discarded.
    pub attributes: BTreeMap<String, Vec<AttributeSample>>,
    pub sample_count: usize,
    pub inferred: Option<Capability>,
    pub first_seen: i64,
    pub last_seen: i64,
}

impl ClusterObservation {
    fn new(cluster_id: u16, name: &str, now: i64) -> Self {
        Self {
            cluster_id,
            name: name.to_string(),
            attributes: BTreeMap::new(),
            sample_count: 0,
            inferred: None,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn set_inferred(&mut self, capability: Capability) -> bool {
        if self.inferred.is_some() {
            return false;
        }
        self.inferred = Some(capability);
        true
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }
}

/// Identifies a telemetry source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    Dp(u8),
    Cluster(u16),
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceId::Dp(id) => write!(f, "DP{}", id),
            SourceId::Cluster(id) => write!(f, "cluster 0x{:04x}", id),
        }
    }
}

/// All records of one learning session.
#[derive(Debug, Clone)]
pub struct ObservationStore {
    dps: BTreeMap<u8, ObservationRecord>,
    clusters: BTreeMap<u16, ClusterObservation>,
    max_samples: usize,
}

impl ObservationStore {
    pub fn new(max_samples_per_source: usize) -> Self {
        Self {
            dps: BTreeMap::new(),
            clusters: BTreeMap::new(),
            max_samples: max_samples_per_source.max(1),
        }
    }

    /// Append a data point report and reclassify its record.
    pub fn record_dp(
        &mut self,
        dp_id: u8,
        value: SampleValue,
        raw: serde_json::Value,
        timestamp: i64,
        retain: bool,
    ) -> &mut ObservationRecord {
        let max_samples = self.max_samples;
        let record = self
            .dps
            .entry(dp_id)
            .or_insert_with(|| ObservationRecord::new(dp_id, timestamp));
        record.push(
            Sample {
                value,
                raw,
                timestamp,
            },
            retain,
            max_samples,
        );
        record
    }

    /// Append a cluster attribute report.
    pub fn record_zcl(
        &mut self,
        cluster_id: u16,
        cluster_name: &str,
        attribute: &str,
        value: SampleValue,
        timestamp: i64,
        retain: bool,
    ) -> &mut ClusterObservation {
        let max_samples = self.max_samples;
        let record = self
            .clusters
            .entry(cluster_id)
            .or_insert_with(|| ClusterObservation::new(cluster_id, cluster_name, timestamp));

        if record.name.is_empty() && !cluster_name.is_empty() {
            record.name = cluster_name.to_string();
        }

        let history = record.attributes.entry(attribute.to_string()).or_default();
        if retain {
            if history.len() >= max_samples {
                history.remove(0);
            }
            history.push(AttributeSample { value, timestamp });
        }
        record.sample_count += 1;
        record.last_seen = timestamp;
        record
    }

    pub fn dp(&self, dp_id: u8) -> Option<&ObservationRecord> {
        self.dps.get(&dp_id)
    }

    pub fn cluster(&self, cluster_id: u16) -> Option<&ClusterObservation> {
        self.clusters.get(&cluster_id)
    }

    pub fn dps(&self) -> impl Iterator<Item = &ObservationRecord> {
        self.dps.values()
    }

    pub fn clusters(&self) -> impl Iterator<Item = &ClusterObservation> {
        self.clusters.values()
    }

    pub fn dps_mut(&mut self) -> impl Iterator<Item = &mut ObservationRecord> {
        self.dps.values_mut()
    }

    pub fn clusters_mut(&mut self) -> impl Iterator<Item = &mut ClusterObservation> {
        self.clusters.values_mut()
    }

    pub fn dp_count(&self) -> usize {
        self.dps.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dps.is_empty() && self.clusters.is_empty()
    }

    /// Samples seen this session across every source.
    pub fn total_samples(&self) -> u64 {
        let dp: usize = self.dps.values().map(|r| r.sample_count).sum();
        let zcl: usize = self.clusters.values().map(|r| r.sample_count).sum();
        (dp + zcl) as u64
    }

    /// Distinct capabilities inferred so far.
    pub fn inferred_capabilities(&self) -> BTreeSet<Capability> {
        self.dps
            .values()
            .filter_map(|r| r.inferred)
            .chain(self.clusters.values().filter_map(|r| r.inferred))
            .collect()
    }

    /// Sources whose inferred capability is not what the profile has on
    /// record for them.
    pub fn uncommitted(&self, profile: Option<&LearnedProfile>) -> Vec<(SourceId, Capability)> {
        let mut pending = Vec::new();

        for record in self.dps.values() {
            let Some(capability) = record.inferred else { continue };
            let stored = profile
                .and_then(|p| p.dp_mappings.get(&record.dp_id))
                .map(|m| m.capability);
            if stored != Some(capability) {
                pending.push((SourceId::Dp(record.dp_id), capability));
            }
        }

        for record in self.clusters.values() {
            let Some(capability) = record.inferred else { continue };
            let stored = profile
                .and_then(|p| p.cluster_mappings.get(&record.cluster_id))
                .map(|m| m.capability);
            if stored != Some(capability) {
                pending.push((SourceId::Cluster(record.cluster_id), capability));
            }
        }

        pending
    }

    /// Drop retained sample histories, keeping summaries and attribute names.
    pub fn discard_history(&mut self) {
        for record in self.dps.values_mut() {
            record.samples.clear();
            record.samples.shrink_to_fit();
        }
        for record in self.clusters.values_mut() {
            for history in record.attributes.values_mut() {
                history.clear();
                history.shrink_to_fit();
            }
        }
    }

    pub fn clear(&mut self) {
        self.dps.clear();
        self.clusters.clear();
    }
}

impl Default for ObservationStore {
    fn default() -> Self {
        Self::new(crate::config::defaults::MAX_SAMPLES_PER_SOURCE)
    }
}
