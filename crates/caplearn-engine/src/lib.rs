//! Autonomous device capability learning.
//!
//! Watches the telemetry a freshly paired device emits (vendor data-point
//! reports and standard cluster attribute reports), classifies each signal,
//! infers the capabilities behind those signals and persists a reusable
//! profile so the work is not repeated after a restart.
//!
//! ## Architecture
//!
//! - **signal**: semantic type classification of a sample stream
//! - **knowledge**: DP and cluster tables used for capability inference
//! - **observation**: per-source sample records for one learning session
//! - **profile**: the persisted learned profile and its store
//! - **session**: the clock-free learning state machine
//! - **controller**: tokio timers driving a session for a live device
//!
//! ```text
//! telemetry ──→ LearningController ──→ ObservationStore ──→ classify
//!                     │                                        │
//!               active timeout                          KnowledgeBase
//!                     ↓                                        │
//!               final sweep ──→ DeviceHost + ProfileStore ←────┘
//!                     ↓
//!               passive ticks (refinement)
//! ```

pub mod capability;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod knowledge;
pub mod observation;
pub mod profile;
pub mod session;
pub mod signal;
pub mod telemetry;

pub use capability::{Candidate, Capability};
pub use config::LearnerConfig;
pub use controller::LearningController;
pub use error::{Error, Result};
pub use host::{apply_capability, ApplyOutcome, DeviceHost, MemoryDevice};
pub use knowledge::{DpContext, DpPattern, KnowledgeBase};
pub use observation::{ClusterObservation, ObservationRecord, ObservationStore, SourceId};
pub use profile::{
    learning_reason, needs_learning, ClusterMapping, DeviceIdentity, DpMapping, LearnedProfile,
    LearningReason, ProfileStore,
};
pub use session::{LearningSession, Phase, RefineReport, Schedule};
pub use signal::{classify, ObservedRange, SampleValue, SemanticType, SignalSummary};
pub use telemetry::{DpReport, TelemetryEvent, ZclReport};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
