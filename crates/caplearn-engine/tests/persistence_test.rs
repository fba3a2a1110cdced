//! Restart Persistence Tests
//!
//! Learning against a redb file, then resuming from it with a fresh
//! session or controller, as a gateway would after a reboot.

use std::sync::Arc;
use std::time::Duration;

use caplearn_engine::{
    Capability, DeviceIdentity, LearnerConfig, LearningController, LearningSession,
    MemoryDevice, Phase, ProfileStore, Schedule, TelemetryEvent,
};
use caplearn_storage::{RedbBackend, RedbBackendConfig, SharedBackend};
use tempfile::TempDir;

const ADDR: &str = "00:12:4b:00:22:c8:91:0f";
const T0: i64 = 1_700_000_000_000;

fn open(dir: &TempDir) -> SharedBackend {
    let path = dir.path().join("profiles.redb");
    Arc::new(RedbBackend::new(RedbBackendConfig::new(path.to_string_lossy())).unwrap())
}

fn device() -> Arc<MemoryDevice> {
    Arc::new(MemoryDevice::new(DeviceIdentity::new(ADDR).with_model("TS0201")))
}

#[test]
fn test_profile_survives_restart() {
    let dir = TempDir::new().unwrap();

    {
        let backend = open(&dir);
        let mut session = LearningSession::new(device(), backend, LearnerConfig::default());
        session.initialize(T0);
        for (i, v) in [221.0, 223.0, 226.0].into_iter().enumerate() {
            session.ingest(TelemetryEvent::dp(103, v), T0 + i as i64 * 60_000);
        }
        for (i, v) in [48.0, 51.0].into_iter().enumerate() {
            session.ingest(TelemetryEvent::dp(104, v), T0 + i as i64 * 60_000);
        }
        session.on_active_timeout(T0 + 15 * 60_000);
        session.destroy();
    }

    let backend = open(&dir);
    let stored = ProfileStore::new(backend.clone()).load(ADDR).unwrap().unwrap();
    assert!(stored.capabilities.contains(&Capability::MeasureTemperature));
    assert!(stored.capabilities.contains(&Capability::MeasureHumidity));
    assert_eq!(stored.total_sample_count, 5);

    let device = device();
    let mut resumed = LearningSession::new(device.clone(), backend, LearnerConfig::default());
    assert!(matches!(
        resumed.initialize(T0 + 3_600_000),
        Schedule::PassiveTicks(_)
    ));
    assert_eq!(resumed.profile(), Some(&stored));
    // Nothing learned since, so nothing is committed
    assert!(resumed.on_passive_tick(T0 + 4_000_000).committed.is_empty());
}

#[test]
fn test_refinement_after_restart_keeps_learned_capabilities() {
    let dir = TempDir::new().unwrap();

    {
        let mut session = LearningSession::new(device(), open(&dir), LearnerConfig::default());
        session.initialize(T0);
        session.ingest(TelemetryEvent::dp(2, 80.0), T0);
        session.ingest(TelemetryEvent::dp(2, 79.0), T0 + 60_000);
        session.on_active_timeout(T0 + 15 * 60_000);
        session.destroy();
    }

    let device = Arc::new(
        MemoryDevice::new(DeviceIdentity::new(ADDR).with_model("TS0201"))
            .with_capabilities([Capability::MeasureBattery]),
    );
    let backend = open(&dir);
    let mut resumed = LearningSession::new(device.clone(), backend.clone(), LearnerConfig::default());
    assert!(matches!(resumed.initialize(T0 + 3_600_000), Schedule::PassiveTicks(_)));

    // Same data point now reports like a switch
    resumed.ingest(TelemetryEvent::dp(2, 0.0), T0 + 3_610_000);
    resumed.ingest(TelemetryEvent::dp(2, 1.0), T0 + 3_620_000);
    resumed.on_passive_tick(T0 + 3_900_000);

    let stored = ProfileStore::new(backend).load(ADDR).unwrap().unwrap();
    assert!(stored.capabilities.contains(&Capability::MeasureBattery));
    assert!(stored.capabilities.contains(&Capability::Onoff));
    assert_eq!(resumed.profile().unwrap().capabilities, stored.capabilities);
    assert!(device.capabilities().contains(&Capability::MeasureBattery));
}

#[test]
fn test_force_relearn_removes_stored_profile() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);

    let mut session = LearningSession::new(device(), backend.clone(), LearnerConfig::default());
    session.initialize(T0);
    session.ingest(TelemetryEvent::zcl(6, "onOff", "onOff", true), T0);
    session.on_active_timeout(T0 + 15 * 60_000);

    let store = ProfileStore::new(backend);
    assert_eq!(store.list_devices().unwrap(), vec![ADDR.to_string()]);

    session.force_relearn(T0 + 20 * 60_000);
    assert!(store.load(ADDR).unwrap().is_none());
    assert!(store.list_devices().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_controller_resumes_in_passive_mode() {
    let dir = TempDir::new().unwrap();
    let config = LearnerConfig::default()
        .with_active_learning_secs(30)
        .with_passive_check_secs(5);

    {
        let controller = LearningController::new(device(), open(&dir), config.clone());
        controller.initialize();
        controller.record_dp(2, 1.0, serde_json::json!(true));
        controller.record_dp(2, 0.0, serde_json::json!(false));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(controller.phase(), Phase::PassiveMode);
        controller.destroy();
    }

    let device = device();
    let controller = LearningController::new(device.clone(), open(&dir), config);
    controller.initialize();
    assert_eq!(controller.phase(), Phase::PassiveMode);
    assert!(!controller.is_learning());
    assert!(controller
        .get_profile()
        .unwrap()
        .capabilities
        .contains(&Capability::Onoff));

    // A cluster seen for the first time after the restart
    controller.ingest(TelemetryEvent::zcl(
        0x0001,
        "powerConfiguration",
        "batteryPercentageRemaining",
        180.0,
    ));
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(controller
        .get_profile()
        .unwrap()
        .capabilities
        .contains(&Capability::MeasureBattery));
    assert!(device.capabilities().contains(&Capability::MeasureBattery));
}
