#![cfg_attr(not(test), no_std)]

//! SSD1306 (128x64 monochrome OLED, I2C) driver primitives.

mod framebuffer;
pub mod protocol;

#[cfg(feature = "embedded-graphics")]
mod graphics;

pub use framebuffer::FrameBuffer;

use embedded_hal::i2c::I2c;

/// Driver configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// 7-bit bus address.
    pub address: u8,
    /// Contrast written after the init sequence.
    pub contrast: u8,
    /// Rotate the picture by 180 degrees.
    pub flip: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: protocol::DEFAULT_ADDRESS,
            contrast: 0xCF,
            flip: false,
        }
    }
}

/// Driver errors.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Error<I2cErr> {
    /// I2C transaction failed.
    I2c(I2cErr),
    /// Input parameters are outside supported bounds.
    InvalidInput,
}

pub type DriverResult<I2cErr> = Result<(), Error<I2cErr>>;

/// SSD1306 driver.
#[derive(Debug)]
pub struct Ssd1306<I2C> {
    i2c: I2C,
    config: Config,
}

impl<I2C: I2c> Ssd1306<I2C> {
    pub fn new(i2c: I2C, config: Config) -> Self {
        Self { i2c, config }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Releases the owned bus.
    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Runs the power-on sequence, clears RAM and turns the panel on.
    pub fn initialize(&mut self) -> DriverResult<I2C::Error> {
        for command in protocol::INIT_SEQUENCE {
            self.command(&[command])?;
        }
        self.command(&[protocol::SET_CONTRAST, self.config.contrast])?;
        if self.config.flip {
            // undo the segment and COM remap of the init sequence
            self.command(&[0xA0])?;
            self.command(&[0xC0])?;
        }
        self.flush_frame(FrameBuffer::new().bytes())?;
        self.set_display_on(true)
    }

    pub fn set_display_on(&mut self, on: bool) -> DriverResult<I2C::Error> {
        self.command(&[if on {
            protocol::DISPLAY_ON
        } else {
            protocol::DISPLAY_OFF
        }])
    }

    /// Sends one command with its arguments.
    pub fn command(&mut self, command: &[u8]) -> DriverResult<I2C::Error> {
        let (packet, len) = protocol::build_command_packet(command).ok_or(Error::InvalidInput)?;
        self.i2c
            .write(self.config.address, &packet[..len])
            .map_err(Error::I2c)
    }

    /// Writes the whole display RAM.
    pub fn flush_frame(&mut self, buffer: &[u8; protocol::BUFFER_SIZE]) -> DriverResult<I2C::Error> {
        let (window, len) =
            protocol::build_command_packet(&protocol::FULL_WINDOW).ok_or(Error::InvalidInput)?;
        self.i2c
            .write(self.config.address, &window[..len])
            .map_err(Error::I2c)?;

        for chunk in buffer.chunks(protocol::DATA_CHUNK) {
            let (packet, len) = protocol::build_data_packet(chunk).ok_or(Error::InvalidInput)?;
            self.i2c
                .write(self.config.address, &packet[..len])
                .map_err(Error::I2c)?;
        }

        Ok(())
    }
}
