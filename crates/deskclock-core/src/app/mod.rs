//! Application context driven by the board main loop.

use log::{error, info, warn};

use crate::{
    config::ClockConfig,
    device_id::DeviceName,
    lifecycle::{Lifecycle, LifecycleChecks, LifecycleState, Transition},
    render::{ClockFace, NetworkLabel},
    settings::{
        ClockSettings, KEY_DEVICE_NAME, KEY_TIME_ZONE, KEY_WIFI_PASSWORD, KEY_WIFI_SSID,
        KeyValueStore, SettingsError, WifiCredentials, ZoneName,
    },
    zone::{LocalTime, ZoneError, ZoneRules},
};

/// Runtime facts owned by other futures, read once per iteration.
pub trait ClockEnv {
    fn update_in_progress(&self) -> bool;
    fn network_time_synced(&self) -> bool;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoopStep {
    /// An update is running; nothing else was touched.
    Suspended,
    Active {
        transition: Option<Transition>,
        refresh_display: bool,
    },
}

/// Accepted changes from the configuration web server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigEvent {
    SetDeviceName(DeviceName),
    SetTimeZone(ZoneName),
    SetWifiCredentials(WifiCredentials),
    FactoryReset,
}

/// What the board loop still has to do after a config event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigOutcome {
    DeviceNameChanged {
        persisted: bool,
    },
    TimeZoneChanged {
        transition: Option<Transition>,
        persisted: bool,
    },
    WifiCredentialsChanged {
        credentials: WifiCredentials,
        persisted: bool,
    },
    FactoryResetRequested,
}

pub struct ClockApp {
    config: ClockConfig,
    lifecycle: Lifecycle,
    settings: ClockSettings,
    zone: Option<ZoneRules>,
    next_display_ms: u64,
}

impl ClockApp {
    pub fn new(config: ClockConfig, settings: ClockSettings) -> Self {
        Self {
            config,
            lifecycle: Lifecycle::new(),
            settings,
            zone: None,
            next_display_ms: 0,
        }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn settings(&self) -> &ClockSettings {
        &self.settings
    }

    pub fn device_name(&self) -> &str {
        &self.settings.device_name
    }

    pub fn zone_name(&self) -> &str {
        &self.settings.zone_name
    }

    pub fn applied_zone(&self) -> Option<&ZoneRules> {
        self.zone.as_ref()
    }

    /// Marks the end of the boot sequence.
    pub fn finish_boot(&mut self) -> bool {
        self.lifecycle.finish_boot()
    }

    /// One main-loop iteration. Skips everything while an update is running.
    pub fn poll<E: ClockEnv>(&mut self, now_ms: u64, env: &E) -> LoopStep {
        if env.update_in_progress() {
            return LoopStep::Suspended;
        }

        let mut checks = ZoneChecks {
            env,
            zone_name: &self.settings.zone_name,
            zone: &mut self.zone,
        };
        let transition = self.lifecycle.evaluate(&mut checks);

        let refresh_display = now_ms > self.next_display_ms;
        if refresh_display {
            self.next_display_ms = now_ms + self.config.display_refresh_ms;
        }

        LoopStep::Active {
            transition,
            refresh_display,
        }
    }

    pub fn apply_config<S: KeyValueStore>(
        &mut self,
        event: ConfigEvent,
        store: &mut S,
    ) -> ConfigOutcome {
        match event {
            ConfigEvent::SetDeviceName(name) => {
                info!("devicename set to '{}'", name);
                let persisted = persist(store.write(KEY_DEVICE_NAME, &name, true), KEY_DEVICE_NAME);
                self.settings.device_name = name;
                ConfigOutcome::DeviceNameChanged { persisted }
            }
            ConfigEvent::SetTimeZone(zone) => {
                info!("timezone set to '{}'", zone);
                let persisted = persist(store.write(KEY_TIME_ZONE, &zone, true), KEY_TIME_ZONE);
                self.settings.zone_name = zone;
                let transition = self.lifecycle.invalidate_zone();
                ConfigOutcome::TimeZoneChanged {
                    transition,
                    persisted,
                }
            }
            ConfigEvent::SetWifiCredentials(credentials) => {
                info!("wifi credentials set for '{}'", credentials.ssid);
                let persisted = persist(
                    store
                        .write(KEY_WIFI_SSID, &credentials.ssid, false)
                        .and_then(|()| store.write(KEY_WIFI_PASSWORD, &credentials.password, true)),
                    KEY_WIFI_SSID,
                );
                self.settings.wifi = Some(credentials.clone());
                ConfigOutcome::WifiCredentialsChanged {
                    credentials,
                    persisted,
                }
            }
            ConfigEvent::FactoryReset => {
                warn!("perform factory reset");
                ConfigOutcome::FactoryResetRequested
            }
        }
    }

    /// View model for the clock screen.
    ///
    /// Local time once a zone is applied, UTC while it is not, and
    /// placeholders until network time exists.
    pub fn clock_face(&self, now_unix_ms: Option<i64>, network: NetworkLabel) -> ClockFace {
        let time = match now_unix_ms {
            Some(now) if self.lifecycle.state().has_network_time() => {
                let local = match &self.zone {
                    Some(zone) => zone.local_time(now),
                    None => LocalTime::utc(now),
                };
                local.ok()
            }
            _ => None,
        };

        ClockFace { time, network }
    }
}

struct ZoneChecks<'a, E> {
    env: &'a E,
    zone_name: &'a str,
    zone: &'a mut Option<ZoneRules>,
}

impl<E: ClockEnv> LifecycleChecks for ZoneChecks<'_, E> {
    type ZoneError = ZoneError;

    fn network_time_synced(&mut self) -> bool {
        self.env.network_time_synced()
    }

    fn apply_zone(&mut self) -> Result<(), ZoneError> {
        match ZoneRules::resolve(self.zone_name) {
            Ok(rules) => {
                info!("timezone set to {}", rules.name());
                *self.zone = Some(rules);
                Ok(())
            }
            Err(err) => {
                *self.zone = None;
                Err(err)
            }
        }
    }
}

fn persist(result: Result<(), SettingsError>, key: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            error!("could not write {} to settings: {:?}", key, err);
            false
        }
    }
}

#[cfg(test)]
mod tests;
