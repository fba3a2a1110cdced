//! Learned profiles and their persistence.
//!
//! A [`LearnedProfile`] is the only state that survives a restart. It is
//! stored as one JSON document per device in the [`PROFILE_TABLE`] table,
//! keyed by hardware address.

use std::collections::{BTreeMap, BTreeSet};

use caplearn_storage::{SharedBackend, StorageBackend};
use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::error::{Error, Result};
use crate::observation::ObservationStore;
use crate::signal::SemanticType;

/// Current profile document format.
pub const PROFILE_FORMAT_VERSION: u32 = 1;

/// Storage table holding profiles.
pub const PROFILE_TABLE: &str = "learned_profiles";

/// Who a profile belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    /// Hardware address, the storage key.
    pub address: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl DeviceIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            vendor: None,
            model: None,
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Same address, and vendor/model agree wherever both sides know them.
    pub fn same_device(&self, other: &DeviceIdentity) -> bool {
        fn agree(a: &Option<String>, b: &Option<String>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        self.address == other.address
            && agree(&self.vendor, &other.vendor)
            && agree(&self.model, &other.model)
    }
}

/// What was learned about one data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DpMapping {
    pub capability: Capability,
    pub semantic_type: SemanticType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sample_count: usize,
}

/// What was learned about one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMapping {
    pub name: String,
    pub capability: Capability,
    #[serde(default)]
    pub attributes: Vec<String>,
}

/// Persisted result of learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedProfile {
    pub version: u32,
    pub device_identity: DeviceIdentity,
    /// Unix milliseconds of the last save.
    pub last_updated: i64,
    pub capabilities: BTreeSet<Capability>,
    #[serde(default)]
    pub dp_mappings: BTreeMap<u8, DpMapping>,
    #[serde(default)]
    pub cluster_mappings: BTreeMap<u16, ClusterMapping>,
    #[serde(default)]
    pub learning_duration_ms: i64,
    #[serde(default)]
    pub total_sample_count: u64,
}

impl LearnedProfile {
    /// Empty profile for a device.
    pub fn new(device_identity: DeviceIdentity, now: i64) -> Self {
        Self {
            version: PROFILE_FORMAT_VERSION,
            device_identity,
            last_updated: now,
            capabilities: BTreeSet::new(),
            dp_mappings: BTreeMap::new(),
            cluster_mappings: BTreeMap::new(),
            learning_duration_ms: 0,
            total_sample_count: 0,
        }
    }

    /// Milliseconds since the last save.
    pub fn age_ms(&self, now: i64) -> i64 {
        now.saturating_sub(self.last_updated)
    }

    /// Fold every inferred source into the mappings.
    ///
    /// Only new sources and sources whose capability changed are written;
    /// settled mappings keep the statistics they were learned with. The
    /// capability set only grows: a remapped source adds its new capability
    /// and the one it was learned with stays.
    pub fn merge_observations(&mut self, observations: &ObservationStore) {
        for record in observations.dps() {
            let Some(capability) = record.inferred else {
                continue;
            };
            if self.dp_mappings.get(&record.dp_id).map(|m| m.capability) == Some(capability) {
                continue;
            }
            self.dp_mappings.insert(
                record.dp_id,
                DpMapping {
                    capability,
                    semantic_type: record.semantic_type,
                    min: record.summary.range.min,
                    max: record.summary.range.max,
                    sample_count: record.sample_count,
                },
            );
        }

        for record in observations.clusters() {
            let Some(capability) = record.inferred else {
                continue;
            };
            let settled = self.cluster_mappings.get(&record.cluster_id).map(|m| m.capability);
            if settled == Some(capability) {
                continue;
            }
            self.cluster_mappings.insert(
                record.cluster_id,
                ClusterMapping {
                    name: record.name.clone(),
                    capability,
                    attributes: record.attribute_names(),
                },
            );
        }

        let mapped = self
            .dp_mappings
            .values()
            .map(|m| m.capability)
            .chain(self.cluster_mappings.values().map(|m| m.capability));
        self.capabilities.extend(mapped);
    }
}

/// Why a device has to (re-)enter active learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningReason {
    NoProfile,
    Expired { age_ms: i64 },
    IdentityChanged,
}

impl std::fmt::Display for LearningReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LearningReason::NoProfile => write!(f, "no stored profile"),
            LearningReason::Expired { age_ms } => {
                write!(f, "profile expired ({}h old)", age_ms / 3_600_000)
            }
            LearningReason::IdentityChanged => write!(f, "device identity changed"),
        }
    }
}

/// Reason the profile cannot be reused, or `None` when it can.
pub fn learning_reason(
    profile: Option<&LearnedProfile>,
    identity: &DeviceIdentity,
    now: i64,
    max_age_ms: i64,
) -> Option<LearningReason> {
    let profile = match profile {
        Some(p) => p,
        None => return Some(LearningReason::NoProfile),
    };

    let age_ms = profile.age_ms(now);
    if age_ms > max_age_ms {
        return Some(LearningReason::Expired { age_ms });
    }
    if !profile.device_identity.same_device(identity) {
        return Some(LearningReason::IdentityChanged);
    }
    None
}

pub fn needs_learning(
    profile: Option<&LearnedProfile>,
    identity: &DeviceIdentity,
    now: i64,
    max_age_ms: i64,
) -> bool {
    learning_reason(profile, identity, now, max_age_ms).is_some()
}

/// Profile persistence over any storage backend.
#[derive(Clone)]
pub struct ProfileStore {
    backend: SharedBackend,
}

impl ProfileStore {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// Load a device's profile.
    ///
    /// `Ok(None)` when nothing is stored. Undecodable documents are
    /// [`Error::MalformedProfile`]; documents from a newer format are
    /// [`Error::UnsupportedProfileVersion`].
    pub fn load(&self, address: &str) -> Result<Option<LearnedProfile>> {
        let bytes = match self.backend.read(PROFILE_TABLE, address)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let malformed = |e: serde_json::Error| Error::MalformedProfile {
            device: address.to_string(),
            reason: e.to_string(),
        };

        let document: serde_json::Value = serde_json::from_slice(&bytes).map_err(malformed)?;
        if let Some(found) = document.get("version").and_then(|v| v.as_u64()) {
            if found > PROFILE_FORMAT_VERSION as u64 {
                return Err(Error::UnsupportedProfileVersion {
                    found: u32::try_from(found).unwrap_or(u32::MAX),
                    supported: PROFILE_FORMAT_VERSION,
                });
            }
        }

        let profile = serde_json::from_value(document).map_err(malformed)?;
        Ok(Some(profile))
    }

    pub fn save(&self, address: &str, profile: &LearnedProfile) -> Result<()> {
        caplearn_storage::write_json(self.backend.as_ref(), PROFILE_TABLE, address, profile)?;
        Ok(())
    }

    /// Delete a device's profile. Returns whether one existed.
    pub fn clear(&self, address: &str) -> Result<bool> {
        Ok(self.backend.delete(PROFILE_TABLE, address)?)
    }

    /// Addresses with a stored profile.
    pub fn list_devices(&self) -> Result<Vec<String>> {
        Ok(self
            .backend
            .scan(PROFILE_TABLE, "")?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }
}

impl std::fmt::Debug for ProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStore")
            .field("persistent", &self.backend.is_persistent())
            .finish()
    }
}
