pub mod flash_settings;

use deskclock_core::settings::{MemoryBackend, SectorBackend};
use log::error;

use flash_settings::{FlashSettingsBackend, FlashSettingsError};

/// Flash-backed settings, or a RAM sector when the partition is unusable.
#[derive(Debug)]
pub enum SettingsBackend {
    Flash(FlashSettingsBackend),
    Volatile(MemoryBackend),
}

impl SettingsBackend {
    pub fn open() -> Self {
        match FlashSettingsBackend::new() {
            Ok(backend) => Self::Flash(backend),
            Err(err) => {
                error!(
                    "settings: flash unavailable ({:?}); changes last until restart",
                    err
                );
                Self::Volatile(MemoryBackend::new())
            }
        }
    }
}

impl SectorBackend for SettingsBackend {
    type Error = FlashSettingsError;

    fn read_record(&mut self, out: &mut [u8]) -> Result<(), Self::Error> {
        match self {
            Self::Flash(backend) => backend.read_record(out),
            Self::Volatile(backend) => backend
                .read_record(out)
                .map_err(|()| FlashSettingsError::Unsupported),
        }
    }

    fn write_record(&mut self, record: &[u8]) -> Result<(), Self::Error> {
        match self {
            Self::Flash(backend) => backend.write_record(record),
            Self::Volatile(backend) => backend
                .write_record(record)
                .map_err(|()| FlashSettingsError::Unsupported),
        }
    }
}
