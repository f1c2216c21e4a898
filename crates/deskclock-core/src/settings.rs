//! Persisted text settings in a named flash namespace.

pub mod record;

use core::fmt::Debug;

use heapless::String;
use log::{error, info, warn};

use crate::device_id::{self, DeviceName};
use record::{Entries, RECORD_CAPACITY, RecordError};

pub const KEY_MAX_LEN: usize = 15;
pub const VALUE_MAX_LEN: usize = 64;
pub const MAX_ENTRIES: usize = 8;

pub const NAMESPACE: &str = "storage";
pub const KEY_DEVICE_NAME: &str = "devicename";
pub const KEY_TIME_ZONE: &str = "timezone";
pub const KEY_WIFI_SSID: &str = "wifi_ssid";
pub const KEY_WIFI_PASSWORD: &str = "wifi_pass";

pub type Key = String<KEY_MAX_LEN>;
pub type Value = String<VALUE_MAX_LEN>;
pub type ZoneName = String<VALUE_MAX_LEN>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SettingsError {
    KeyTooLong,
    ValueTooLong,
    TooManyEntries,
    RecordFull,
    Backend,
    Corrupted,
}

/// Contract of the flash key/value store.
pub trait KeyValueStore {
    fn read(&mut self, key: &str) -> Result<Option<Value>, SettingsError>;
    fn write(&mut self, key: &str, value: &str, commit: bool) -> Result<(), SettingsError>;
    fn commit(&mut self) -> Result<(), SettingsError>;
}

/// One erasable flash sector that holds a serialized namespace record.
pub trait SectorBackend {
    type Error: Debug;

    fn read_record(&mut self, out: &mut [u8]) -> Result<(), Self::Error>;
    fn write_record(&mut self, record: &[u8]) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadStatus {
    Empty,
    Loaded,
    Corrupted,
    Unavailable,
}

/// RAM cache of one namespace, written back as a whole record on commit.
#[derive(Debug)]
pub struct Namespace<B> {
    backend: B,
    name: Key,
    entries: Entries,
    dirty: bool,
    status: LoadStatus,
}

impl<B: SectorBackend> Namespace<B> {
    pub fn open(mut backend: B, name: &str) -> Result<Self, SettingsError> {
        let name = Key::try_from(name).map_err(|_| SettingsError::KeyTooLong)?;

        let mut raw = [0u8; RECORD_CAPACITY];
        let (entries, status) = match backend.read_record(&mut raw) {
            Ok(()) => match record::decode(&name, &raw) {
                Ok(Some(entries)) => (entries, LoadStatus::Loaded),
                Ok(None) => (Entries::new(), LoadStatus::Empty),
                Err(RecordError::Checksum) => {
                    warn!("settings[{}]: checksum mismatch, starting empty", name);
                    (Entries::new(), LoadStatus::Corrupted)
                }
                Err(err) => {
                    warn!("settings[{}]: unreadable record {:?}", name, err);
                    (Entries::new(), LoadStatus::Corrupted)
                }
            },
            Err(err) => {
                error!("settings[{}]: backend read failed: {:?}", name, err);
                (Entries::new(), LoadStatus::Unavailable)
            }
        };

        info!(
            "settings[{}]: opened with {} entries ({:?})",
            name,
            entries.len(),
            status
        );

        Ok(Self {
            backend,
            name,
            entries,
            dirty: false,
            status,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

impl<B: SectorBackend> KeyValueStore for Namespace<B> {
    fn read(&mut self, key: &str) -> Result<Option<Value>, SettingsError> {
        if key.len() > KEY_MAX_LEN {
            return Err(SettingsError::KeyTooLong);
        }
        Ok(self.position(key).map(|index| self.entries[index].1.clone()))
    }

    fn write(&mut self, key: &str, value: &str, commit: bool) -> Result<(), SettingsError> {
        let key = Key::try_from(key).map_err(|_| SettingsError::KeyTooLong)?;
        let value = Value::try_from(value).map_err(|_| SettingsError::ValueTooLong)?;

        match self.position(&key) {
            Some(index) if self.entries[index].1 == value => {}
            Some(index) => {
                self.entries[index].1 = value;
                self.dirty = true;
            }
            None => {
                self.entries
                    .push((key, value))
                    .map_err(|_| SettingsError::TooManyEntries)?;
                self.dirty = true;
            }
        }

        if commit { self.commit() } else { Ok(()) }
    }

    fn commit(&mut self) -> Result<(), SettingsError> {
        if !self.dirty {
            return Ok(());
        }

        let mut raw = [0xFFu8; RECORD_CAPACITY];
        record::encode(&self.name, &self.entries, &mut raw)?;
        self.backend.write_record(&raw).map_err(|err| {
            error!("settings[{}]: backend write failed: {:?}", self.name, err);
            SettingsError::Backend
        })?;

        self.dirty = false;
        Ok(())
    }
}

/// Sector image kept in RAM.
///
/// Used by tests and as the session-only store when flash is unavailable.
#[derive(Debug)]
pub struct MemoryBackend {
    sector: [u8; RECORD_CAPACITY],
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub writes: u32,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub const fn new() -> Self {
        Self {
            sector: [0xFF; RECORD_CAPACITY],
            fail_reads: false,
            fail_writes: false,
            writes: 0,
        }
    }

    pub fn sector_mut(&mut self) -> &mut [u8] {
        &mut self.sector
    }
}

impl SectorBackend for MemoryBackend {
    type Error = ();

    fn read_record(&mut self, out: &mut [u8]) -> Result<(), Self::Error> {
        if self.fail_reads {
            return Err(());
        }
        let len = out.len().min(self.sector.len());
        out[..len].copy_from_slice(&self.sector[..len]);
        out[len..].fill(0xFF);
        Ok(())
    }

    fn write_record(&mut self, record: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(());
        }
        let len = record.len().min(self.sector.len());
        self.sector.fill(0xFF);
        self.sector[..len].copy_from_slice(&record[..len]);
        self.writes += 1;
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WifiCredentials {
    pub ssid: String<32>,
    pub password: String<64>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Option<Self> {
        if ssid.is_empty() {
            return None;
        }
        Some(Self {
            ssid: String::try_from(ssid).ok()?,
            password: String::try_from(password).ok()?,
        })
    }
}

/// Values read at boot; the running copy stays authoritative for the session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClockSettings {
    pub device_name: DeviceName,
    pub zone_name: ZoneName,
    pub wifi: Option<WifiCredentials>,
}

impl ClockSettings {
    pub fn load<S: KeyValueStore>(store: &mut S, mac: [u8; 6], default_zone: &str) -> Self {
        let device_name = match read_logged(store, KEY_DEVICE_NAME)
            .and_then(|value| DeviceName::try_from(value.as_str()).ok())
        {
            Some(name) => {
                info!("got devicename from settings");
                name
            }
            None => {
                warn!("could not read devicename from settings, using generated");
                device_id::generate(mac)
            }
        };
        info!("ID: '{}'", device_name);

        let zone_name = match read_logged(store, KEY_TIME_ZONE) {
            Some(zone) => {
                info!("got timezone from settings");
                zone
            }
            None => {
                warn!("could not read timezone from settings, using default");
                ZoneName::try_from(default_zone).unwrap_or_else(|()| {
                    error!("default timezone '{}' does not fit, using UTC", default_zone);
                    ZoneName::new()
                })
            }
        };
        info!("TIMEZONE: '{}'", zone_name);

        let wifi = match (
            read_logged(store, KEY_WIFI_SSID),
            read_logged(store, KEY_WIFI_PASSWORD),
        ) {
            (Some(ssid), password) => {
                WifiCredentials::new(&ssid, password.as_deref().unwrap_or(""))
            }
            (None, _) => None,
        };

        Self {
            device_name,
            zone_name,
            wifi,
        }
    }
}

fn read_logged<S: KeyValueStore>(store: &mut S, key: &str) -> Option<Value> {
    match store.read(key) {
        Ok(value) => value,
        Err(err) => {
            warn!("settings read '{}' failed: {:?}", key, err);
            None
        }
    }
}
