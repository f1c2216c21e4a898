use embedded_hal::i2c::I2c;
use log::{info, warn};
use ssd1306::{Config, Error as DriverError, FrameBuffer, Ssd1306};

pub type DisplayError<I2cErr> = DriverError<I2cErr>;

/// Board-level adapter for the SSD1306 panel.
///
/// Keeps the panel usable when it is missing or flaky: only the first
/// failure is logged.
#[derive(Debug)]
pub struct OledDisplay<I2C> {
    driver: Ssd1306<I2C>,
    fault_logged: bool,
    first_flush_logged: bool,
}

impl<I2C: I2c> OledDisplay<I2C> {
    pub fn new(i2c: I2C, config: Config) -> Self {
        Self {
            driver: Ssd1306::new(i2c, config),
            fault_logged: false,
            first_flush_logged: false,
        }
    }

    /// Runs the panel init sequence and switches the panel on.
    pub fn initialize(&mut self) -> Result<(), DisplayError<I2C::Error>> {
        let config = self.driver.config();
        match self.driver.initialize() {
            Ok(()) => {
                info!(
                    "display: ssd1306 ready at 0x{:02x} (flip={})",
                    config.address, config.flip
                );
                Ok(())
            }
            Err(err) => {
                self.note_fault("initialize");
                Err(err)
            }
        }
    }

    /// Pushes a full frame. Failures are logged once and otherwise ignored.
    pub fn flush(&mut self, frame: &FrameBuffer) -> bool {
        match self.driver.flush_frame(frame.bytes()) {
            Ok(()) => {
                if !self.first_flush_logged {
                    info!("display: first flush ok");
                    self.first_flush_logged = true;
                }
                true
            }
            Err(_) => {
                self.note_fault("flush");
                false
            }
        }
    }

    fn note_fault(&mut self, operation: &str) {
        if !self.fault_logged {
            warn!("display: {} failed", operation);
            self.fault_logged = true;
        }
    }
}
