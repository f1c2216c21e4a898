//! Firmware images written into the inactive OTA app slot.

use deskclock_core::update::ImageSink;
use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::{
    ota::OtaImageState,
    ota_updater::OtaUpdater,
    partitions::PARTITION_TABLE_MAX_LEN,
};
use log::{info, warn};

/// Bytes collected before a flash write; one flash sector.
pub const OTA_PAGE_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OtaError {
    PartitionTable,
    NoTargetSlot,
    Flash,
    Activate,
    NonSequentialWrite,
}

/// `ImageSink` over the next OTA partition.
///
/// Data is staged in `page` and written one sector at a time. `finish`
/// flushes the tail, switches the boot slot and marks the image `New`.
pub struct OtaImageSink<'a, F: Storage> {
    ota: OtaUpdater<'a, F>,
    page: &'a mut [u8; OTA_PAGE_SIZE],
    page_offset: u32,
    page_len: usize,
    capacity: u32,
}

impl<'a, F: Storage> OtaImageSink<'a, F> {
    pub fn new(
        flash: &'a mut F,
        table_buf: &'a mut [u8; PARTITION_TABLE_MAX_LEN],
        page: &'a mut [u8; OTA_PAGE_SIZE],
    ) -> Result<Self, OtaError> {
        let mut ota = OtaUpdater::new(flash, table_buf).map_err(|_| OtaError::PartitionTable)?;
        let (region, subtype) = ota.next_partition().map_err(|_| OtaError::NoTargetSlot)?;
        let capacity = region.capacity() as u32;
        info!(
            "ota: target slot {:?} with capacity 0x{:x}",
            subtype, capacity
        );

        Ok(Self {
            ota,
            page,
            page_offset: 0,
            page_len: 0,
            capacity,
        })
    }

    fn flush_page(&mut self) -> Result<(), OtaError> {
        if self.page_len == 0 {
            return Ok(());
        }

        let (mut region, _) = self
            .ota
            .next_partition()
            .map_err(|_| OtaError::NoTargetSlot)?;
        region
            .write(self.page_offset, &self.page[..self.page_len])
            .map_err(|_| OtaError::Flash)?;

        self.page_offset += self.page_len as u32;
        self.page_len = 0;
        Ok(())
    }
}

impl<F: Storage> ImageSink for OtaImageSink<'_, F> {
    type Error = OtaError;

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn write(&mut self, offset: u32, mut chunk: &[u8]) -> Result<(), Self::Error> {
        if offset != self.page_offset + self.page_len as u32 {
            return Err(OtaError::NonSequentialWrite);
        }

        while !chunk.is_empty() {
            let take = chunk.len().min(OTA_PAGE_SIZE - self.page_len);
            self.page[self.page_len..self.page_len + take].copy_from_slice(&chunk[..take]);
            self.page_len += take;
            chunk = &chunk[take..];

            if self.page_len == OTA_PAGE_SIZE {
                self.flush_page()?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        self.flush_page()?;
        self.ota
            .activate_next_partition()
            .map_err(|_| OtaError::Activate)?;
        self.ota
            .set_current_ota_state(OtaImageState::New)
            .map_err(|_| OtaError::Activate)?;
        info!("ota: {} bytes written, next boot uses the new image", self.page_offset);
        Ok(())
    }
}

/// Marks the running image valid so the bootloader keeps it.
pub fn confirm_running_image<F: Storage>(
    flash: &mut F,
    table_buf: &mut [u8; PARTITION_TABLE_MAX_LEN],
) -> Result<(), OtaError> {
    let mut ota = OtaUpdater::new(flash, table_buf).map_err(|_| OtaError::PartitionTable)?;

    match ota.current_ota_state() {
        Ok(OtaImageState::New) | Ok(OtaImageState::PendingVerify) => {
            ota.set_current_ota_state(OtaImageState::Valid)
                .map_err(|_| OtaError::Activate)?;
            info!("ota: running image confirmed");
        }
        Ok(state) => info!("ota: running image state {:?}", state),
        Err(_) => warn!("ota: no OTA data, running from factory slot"),
    }
    Ok(())
}
