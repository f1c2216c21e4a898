use deskclock_core::{
    factory_reset::{EraseError, EraseReport},
    settings::SectorBackend,
};
use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::partitions::{
    DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table,
};
use esp_rom_sys::rom::spiflash::{
    ESP_ROM_SPIFLASH_RESULT_OK, esp_rom_spiflash_erase_sector, esp_rom_spiflash_read,
    esp_rom_spiflash_unlock, esp_rom_spiflash_write,
};
use log::{debug, info};

const FLASH_SECTOR_SIZE: u32 = 4096;
const FLASH_WORD: usize = 4;
const FLASH_CAPACITY_BYTES: usize = 16 * 1024 * 1024;

/// Label of the data partition holding the settings namespace.
pub const SETTINGS_PARTITION_LABEL: &str = "nvs";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashSettingsError {
    PartitionTable,
    SettingsPartitionMissing,
    PartitionTooSmall,
    FlashOpFailed(i32),
    Unsupported,
}

impl From<FlashSettingsError> for EraseError {
    fn from(err: FlashSettingsError) -> Self {
        match err {
            FlashSettingsError::PartitionTable => EraseError::PartitionTable,
            FlashSettingsError::SettingsPartitionMissing => EraseError::RegionNotFound,
            FlashSettingsError::FlashOpFailed(rc) => EraseError::Flash(rc),
            FlashSettingsError::PartitionTooSmall | FlashSettingsError::Unsupported => {
                EraseError::Flash(-1)
            }
        }
    }
}

fn rom_result(rc: i32) -> Result<(), FlashSettingsError> {
    if rc == ESP_ROM_SPIFLASH_RESULT_OK {
        Ok(())
    } else {
        Err(FlashSettingsError::FlashOpFailed(rc))
    }
}

/// ROM SPI flash routines, word by word.
///
/// Needs no peripheral handle, so the settings store stays usable while the
/// OTA path owns `FLASH`.
#[derive(Debug)]
struct RomFlash;

impl RomFlash {
    fn unlocked() -> Result<Self, FlashSettingsError> {
        rom_result(unsafe { esp_rom_spiflash_unlock() })?;
        Ok(Self)
    }

    fn erase(&mut self, sector_addr: u32) -> Result<(), FlashSettingsError> {
        if !sector_addr.is_multiple_of(FLASH_SECTOR_SIZE) {
            return Err(FlashSettingsError::Unsupported);
        }
        rom_result(unsafe { esp_rom_spiflash_erase_sector(sector_addr / FLASH_SECTOR_SIZE) })
    }

    /// Copies flash at `addr` into `out`; `addr` may be unaligned.
    fn copy_out(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashSettingsError> {
        let mut skip = addr as usize % FLASH_WORD;
        let mut word_addr = addr - skip as u32;
        let mut filled = 0;

        while filled < out.len() {
            let mut word = 0u32;
            rom_result(unsafe {
                esp_rom_spiflash_read(word_addr, &mut word as *mut u32 as *const u32, 4)
            })?;
            let bytes = word.to_le_bytes();
            let take = (FLASH_WORD - skip).min(out.len() - filled);
            out[filled..filled + take].copy_from_slice(&bytes[skip..skip + take]);

            filled += take;
            skip = 0;
            word_addr += FLASH_WORD as u32;
        }
        Ok(())
    }

    /// Programs `data` into an erased, word-aligned area. All-ones words are
    /// left untouched.
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashSettingsError> {
        if !addr.is_multiple_of(FLASH_WORD as u32) {
            return Err(FlashSettingsError::Unsupported);
        }

        for (word_addr, chunk) in (addr..).step_by(FLASH_WORD).zip(data.chunks(FLASH_WORD)) {
            let mut bytes = [0xFF; FLASH_WORD];
            bytes[..chunk.len()].copy_from_slice(chunk);
            let word = u32::from_le_bytes(bytes);
            if word != u32::MAX {
                rom_result(unsafe { esp_rom_spiflash_write(word_addr, &word as *const u32, 4) })?;
            }
        }
        Ok(())
    }
}

impl ReadStorage for RomFlash {
    type Error = FlashSettingsError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.copy_out(offset, bytes)
    }

    fn capacity(&self) -> usize {
        FLASH_CAPACITY_BYTES
    }
}

// Partition table parsing only reads.
impl Storage for RomFlash {
    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Err(FlashSettingsError::Unsupported)
    }
}

/// `(offset, len)` of the writable NVS data partition labelled
/// [`SETTINGS_PARTITION_LABEL`].
fn settings_partition(flash: &mut RomFlash) -> Result<(u32, u32), FlashSettingsError> {
    let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
    let table =
        read_partition_table(flash, &mut table_buf).map_err(|_| FlashSettingsError::PartitionTable)?;

    let entry = table
        .iter()
        .find(|entry| {
            !entry.is_read_only()
                && entry.label_as_str() == SETTINGS_PARTITION_LABEL
                && matches!(
                    entry.partition_type(),
                    PartitionType::Data(DataPartitionSubType::Nvs)
                )
        })
        .ok_or(FlashSettingsError::SettingsPartitionMissing)?;

    if entry.len() < FLASH_SECTOR_SIZE {
        return Err(FlashSettingsError::PartitionTooSmall);
    }
    Ok((entry.offset(), entry.len()))
}

/// Settings record stored in the last sector of the `nvs` data partition.
#[derive(Debug)]
pub struct FlashSettingsBackend {
    flash: RomFlash,
    settings_sector_addr: u32,
}

impl FlashSettingsBackend {
    pub fn new() -> Result<Self, FlashSettingsError> {
        let mut flash = RomFlash::unlocked()?;
        let (offset, len) = settings_partition(&mut flash)?;

        let settings_sector_addr = offset + len - FLASH_SECTOR_SIZE;
        info!(
            "settings: partition '{}' at 0x{:x} (0x{:x} bytes), record sector 0x{:x}",
            SETTINGS_PARTITION_LABEL, offset, len, settings_sector_addr
        );

        Ok(Self {
            flash,
            settings_sector_addr,
        })
    }
}

impl SectorBackend for FlashSettingsBackend {
    type Error = FlashSettingsError;

    fn read_record(&mut self, out: &mut [u8]) -> Result<(), Self::Error> {
        self.flash.copy_out(self.settings_sector_addr, out)
    }

    fn write_record(&mut self, record: &[u8]) -> Result<(), Self::Error> {
        if record.len() > FLASH_SECTOR_SIZE as usize {
            return Err(FlashSettingsError::Unsupported);
        }

        self.flash.erase(self.settings_sector_addr)?;
        self.flash.program(self.settings_sector_addr, record)?;
        debug!(
            "settings: wrote {} bytes at 0x{:x}",
            record.len(),
            self.settings_sector_addr
        );
        Ok(())
    }
}

/// Erases the whole `nvs` data partition, sector by sector.
pub fn erase_settings_partition() -> Result<EraseReport, EraseError> {
    let mut flash = RomFlash::unlocked()?;
    let (offset, len) = settings_partition(&mut flash)?;

    for sector_addr in (offset..offset + len).step_by(FLASH_SECTOR_SIZE as usize) {
        flash.erase(sector_addr)?;
    }

    Ok(EraseReport { offset, len })
}
