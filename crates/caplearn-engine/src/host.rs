//! The live device the engine learns for.

use std::collections::BTreeSet;

use parking_lot::RwLock;

use crate::capability::Capability;
use crate::profile::DeviceIdentity;

/// Host-side view of a paired device.
///
/// The engine only ever adds capabilities; removal stays with the host.
///
/// Every method runs while the owning [`LearningController`] holds its
/// session lock. Implementations must not call back into that controller,
/// or the call deadlocks.
///
/// [`LearningController`]: crate::LearningController
pub trait DeviceHost: Send + Sync {
    /// Current identity (address plus whatever vendor/model is known).
    fn identity(&self) -> DeviceIdentity;

    fn has_capability(&self, capability: Capability) -> bool;

    fn add_capability(&self, capability: Capability) -> anyhow::Result<()>;
}

/// Result of applying one capability to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Added,
    AlreadyPresent,
    Failed,
}

/// Add a capability unless the device already has it.
///
/// Host failures are logged and reported as [`ApplyOutcome::Failed`] so a
/// sweep over many capabilities keeps going.
pub fn apply_capability(host: &dyn DeviceHost, capability: Capability) -> ApplyOutcome {
    if host.has_capability(capability) {
        return ApplyOutcome::AlreadyPresent;
    }

    match host.add_capability(capability) {
        Ok(()) => {
            tracing::info!(capability = %capability, "Added learned capability");
            ApplyOutcome::Added
        }
        Err(e) => {
            tracing::warn!(capability = %capability, error = %e, "Failed to add capability");
            ApplyOutcome::Failed
        }
    }
}

/// In-memory device, used by the CLI and in tests.
#[derive(Debug)]
pub struct MemoryDevice {
    identity: RwLock<DeviceIdentity>,
    capabilities: RwLock<BTreeSet<Capability>>,
    rejects: BTreeSet<Capability>,
}

impl MemoryDevice {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity: RwLock::new(identity),
            capabilities: RwLock::new(BTreeSet::new()),
            rejects: BTreeSet::new(),
        }
    }

    /// Start with capabilities already present.
    pub fn with_capabilities(self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.write().extend(capabilities);
        self
    }

    /// Make `add_capability` fail for these capabilities.
    pub fn rejecting(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.rejects.extend(capabilities);
        self
    }

    pub fn capabilities(&self) -> BTreeSet<Capability> {
        self.capabilities.read().clone()
    }

    /// Simulate a re-pair reporting a different identity.
    pub fn set_identity(&self, identity: DeviceIdentity) {
        *self.identity.write() = identity;
    }
}

impl DeviceHost for MemoryDevice {
    fn identity(&self) -> DeviceIdentity {
        self.identity.read().clone()
    }

    fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.read().contains(&capability)
    }

    fn add_capability(&self, capability: Capability) -> anyhow::Result<()> {
        if self.rejects.contains(&capability) {
            anyhow::bail!("capability {} not supported by this device", capability);
        }
        self.capabilities.write().insert(capability);
        Ok(())
    }
}
