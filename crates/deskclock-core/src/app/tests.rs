use core::cell::Cell;

use super::*;
use crate::settings::{MemoryBackend, NAMESPACE, Namespace};

// 2024-07-15T12:00:00Z
const SUMMER_NOON_UTC_MS: i64 = 1_721_044_800_000;

struct FakeEnv {
    updating: bool,
    synced: bool,
    sync_queries: Cell<u32>,
}

impl FakeEnv {
    fn new(updating: bool, synced: bool) -> Self {
        Self {
            updating,
            synced,
            sync_queries: Cell::new(0),
        }
    }
}

impl ClockEnv for FakeEnv {
    fn update_in_progress(&self) -> bool {
        self.updating
    }

    fn network_time_synced(&self) -> bool {
        self.sync_queries.set(self.sync_queries.get() + 1);
        self.synced
    }
}

fn settings(zone: &str) -> ClockSettings {
    ClockSettings {
        device_name: DeviceName::try_from("clock-010203").unwrap(),
        zone_name: ZoneName::try_from(zone).unwrap(),
        wifi: None,
    }
}

fn booted_app(zone: &str) -> ClockApp {
    let mut app = ClockApp::new(ClockConfig::default(), settings(zone));
    assert!(app.finish_boot());
    app
}

fn store() -> Namespace<MemoryBackend> {
    Namespace::open(MemoryBackend::new(), NAMESPACE).unwrap()
}

fn zone_event(name: &str) -> ConfigEvent {
    ConfigEvent::SetTimeZone(ZoneName::try_from(name).unwrap())
}

#[test]
fn update_in_progress_suspends_lifecycle_and_display() {
    let mut app = booted_app("Europe/Berlin");
    let env = FakeEnv::new(true, true);

    for now in (0..10_000).step_by(7) {
        assert_eq!(app.poll(now, &env), LoopStep::Suspended);
    }
    assert_eq!(env.sync_queries.get(), 0);
    assert_eq!(app.state(), LifecycleState::BootComplete);
}

#[test]
fn display_refreshes_every_250ms() {
    let mut app = booted_app("Europe/Berlin");
    let env = FakeEnv::new(false, false);

    let mut refreshes = heapless::Vec::<u64, 16>::new();
    for now in (0..=1_000).step_by(50) {
        if let LoopStep::Active {
            refresh_display: true,
            ..
        } = app.poll(now, &env)
        {
            refreshes.push(now).unwrap();
        }
    }
    assert_eq!(&refreshes[..], &[50, 350, 650, 950]);
}

#[test]
fn valid_zone_reaches_has_time_zone() {
    let mut app = booted_app("Europe/Berlin");
    let env = FakeEnv::new(false, true);

    app.poll(1, &env);
    assert_eq!(app.state(), LifecycleState::HasNetworkTime);
    app.poll(2, &env);
    assert_eq!(app.state(), LifecycleState::HasTimeZone);
    assert_eq!(app.applied_zone().map(|zone| zone.name()), Some("Europe/Berlin"));
}

#[test]
fn unknown_zone_reaches_no_time_zone() {
    let mut app = booted_app("Not/AZone");
    let env = FakeEnv::new(false, true);

    app.poll(1, &env);
    app.poll(2, &env);
    assert_eq!(app.state(), LifecycleState::NoTimeZone);
    assert!(app.applied_zone().is_none());
}

#[test]
fn new_zone_forces_reevaluation_regardless_of_validity() {
    for (initial, submitted) in [
        ("Europe/Berlin", "Not/AZone"),
        ("Not/AZone", "Europe/Berlin"),
        ("Europe/Berlin", "Asia/Tokyo"),
    ] {
        let mut app = booted_app(initial);
        let mut store = store();
        let env = FakeEnv::new(false, true);
        app.poll(1, &env);
        app.poll(2, &env);

        let outcome = app.apply_config(zone_event(submitted), &mut store);
        let ConfigOutcome::TimeZoneChanged {
            transition,
            persisted,
        } = outcome
        else {
            panic!("unexpected outcome {:?}", outcome);
        };
        assert!(persisted);
        assert_eq!(transition.map(|t| t.to), Some(LifecycleState::HasNetworkTime));
        assert_eq!(app.state(), LifecycleState::HasNetworkTime);
        assert_eq!(app.zone_name(), submitted);
    }
}

#[test]
fn corrected_zone_is_applied_on_next_iteration() {
    let mut app = booted_app("Not/AZone");
    let mut store = store();
    let env = FakeEnv::new(false, true);
    app.poll(1, &env);
    app.poll(2, &env);
    assert_eq!(app.state(), LifecycleState::NoTimeZone);

    app.apply_config(zone_event("America/New_York"), &mut store);
    app.poll(3, &env);
    assert_eq!(app.state(), LifecycleState::HasTimeZone);
    assert_eq!(
        store.read(KEY_TIME_ZONE).unwrap().as_deref(),
        Some("America/New_York")
    );
}

#[test]
fn zone_change_before_network_time_only_updates_name() {
    let mut app = booted_app("Europe/Berlin");
    let mut store = store();

    let outcome = app.apply_config(zone_event("Asia/Tokyo"), &mut store);
    assert_eq!(
        outcome,
        ConfigOutcome::TimeZoneChanged {
            transition: None,
            persisted: true,
        }
    );
    assert_eq!(app.state(), LifecycleState::BootComplete);

    let env = FakeEnv::new(false, true);
    app.poll(1, &env);
    app.poll(2, &env);
    assert_eq!(app.applied_zone().map(|zone| zone.name()), Some("Asia/Tokyo"));
}

#[test]
fn failed_persistence_keeps_session_value() {
    let mut app = booted_app("Europe/Berlin");
    let mut backend = MemoryBackend::new();
    backend.fail_writes = true;
    let mut store = Namespace::open(backend, NAMESPACE).unwrap();

    let outcome = app.apply_config(
        ConfigEvent::SetDeviceName(DeviceName::try_from("kitchen").unwrap()),
        &mut store,
    );
    assert_eq!(outcome, ConfigOutcome::DeviceNameChanged { persisted: false });
    assert_eq!(app.device_name(), "kitchen");
}

#[test]
fn wifi_credentials_are_stored_together() {
    let mut app = booted_app("Europe/Berlin");
    let mut store = store();
    let credentials = WifiCredentials::new("home", "secret").unwrap();

    let outcome = app.apply_config(ConfigEvent::SetWifiCredentials(credentials.clone()), &mut store);
    assert_eq!(
        outcome,
        ConfigOutcome::WifiCredentialsChanged {
            credentials: credentials.clone(),
            persisted: true,
        }
    );
    assert_eq!(store.backend().writes, 1);
    assert_eq!(app.settings().wifi, Some(credentials));
}

#[test]
fn factory_reset_is_handed_back_to_the_board() {
    let mut app = booted_app("Europe/Berlin");
    let mut store = store();
    assert_eq!(
        app.apply_config(ConfigEvent::FactoryReset, &mut store),
        ConfigOutcome::FactoryResetRequested
    );
}

#[test]
fn clock_face_follows_lifecycle() {
    let mut app = booted_app("Europe/Berlin");
    let label = NetworkLabel::Address([10, 0, 0, 7]);

    let face = app.clock_face(Some(SUMMER_NOON_UTC_MS), label);
    assert_eq!(face.time, None);

    let env = FakeEnv::new(false, true);
    app.poll(1, &env);
    app.poll(2, &env);
    let face = app.clock_face(Some(SUMMER_NOON_UTC_MS), label);
    assert_eq!(face.time_text().as_str(), "14:00");
    assert_eq!(face.network, label);
}

#[test]
fn clock_face_falls_back_to_utc_without_zone() {
    let mut app = booted_app("Not/AZone");
    let env = FakeEnv::new(false, true);
    app.poll(1, &env);
    app.poll(2, &env);

    let face = app.clock_face(Some(SUMMER_NOON_UTC_MS), NetworkLabel::Disconnected);
    assert_eq!(face.time_text().as_str(), "12:00");
    assert_eq!(face.date_text().as_str(), "15.07.2024");
}
