//! Command and data framing for SSD1306 over I2C.

/// Panel width in pixels.
pub const WIDTH: usize = 128;
/// Panel height in pixels.
pub const HEIGHT: usize = 64;
/// Eight rows per page; one byte covers one column of a page.
pub const PAGES: usize = HEIGHT / 8;
/// Total framebuffer size in bytes.
pub const BUFFER_SIZE: usize = WIDTH * PAGES;

/// Default 7-bit I2C address (SA0 low).
pub const DEFAULT_ADDRESS: u8 = 0x3C;

/// Control byte: every following byte is a command.
pub const CONTROL_COMMANDS: u8 = 0x00;
/// Control byte: every following byte is display RAM data.
pub const CONTROL_DATA: u8 = 0x40;

/// Data bytes sent per I2C write while flushing.
pub const DATA_CHUNK: usize = 32;

pub const DISPLAY_OFF: u8 = 0xAE;
pub const DISPLAY_ON: u8 = 0xAF;
pub const SET_CONTRAST: u8 = 0x81;
pub const SET_COLUMN_ADDRESS: u8 = 0x21;
pub const SET_PAGE_ADDRESS: u8 = 0x22;
pub const NORMAL_DISPLAY: u8 = 0xA6;

/// Power-on sequence for a 128x64 module with the internal charge pump.
#[rustfmt::skip]
pub const INIT_SEQUENCE: [u8; 25] = [
    DISPLAY_OFF,
    0xD5, 0x80, // clock divide ratio / oscillator
    0xA8, (HEIGHT - 1) as u8, // multiplex ratio
    0xD3, 0x00, // display offset
    0x40, // start line 0
    0x8D, 0x14, // charge pump on
    0x20, 0x00, // horizontal addressing
    0xA1, // segment remap
    0xC8, // COM scan descending
    0xDA, 0x12, // COM pins alternative
    SET_CONTRAST, 0xCF,
    0xD9, 0xF1, // pre-charge
    0xDB, 0x40, // VCOMH deselect
    0xA4, // resume from RAM
    NORMAL_DISPLAY,
    0x2E, // deactivate scroll
];

/// Selects the whole panel as the RAM write window.
pub const FULL_WINDOW: [u8; 6] = [
    SET_COLUMN_ADDRESS,
    0,
    (WIDTH - 1) as u8,
    SET_PAGE_ADDRESS,
    0,
    (PAGES - 1) as u8,
];

/// Prefixes `data` with the data control byte.
///
/// Returns the packet and its used length, or `None` when `data` is longer
/// than [`DATA_CHUNK`].
pub fn build_data_packet(data: &[u8]) -> Option<([u8; DATA_CHUNK + 1], usize)> {
    if data.len() > DATA_CHUNK {
        return None;
    }

    let mut packet = [0u8; DATA_CHUNK + 1];
    packet[0] = CONTROL_DATA;
    packet[1..1 + data.len()].copy_from_slice(data);
    Some((packet, data.len() + 1))
}

/// Prefixes one command (with its arguments) with the command control byte.
pub fn build_command_packet(command: &[u8]) -> Option<([u8; 8], usize)> {
    if command.is_empty() || command.len() > 7 {
        return None;
    }

    let mut packet = [0u8; 8];
    packet[0] = CONTROL_COMMANDS;
    packet[1..1 + command.len()].copy_from_slice(command);
    Some((packet, command.len() + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_is_consistent() {
        assert_eq!(BUFFER_SIZE, 1024);
        assert_eq!(BUFFER_SIZE % DATA_CHUNK, 0);
    }

    #[test]
    fn init_starts_dark_and_enables_pump() {
        assert_eq!(INIT_SEQUENCE[0], DISPLAY_OFF);
        assert!(INIT_SEQUENCE.windows(2).any(|pair| pair == [0x8D, 0x14]));
        assert!(!INIT_SEQUENCE.contains(&DISPLAY_ON));
    }

    #[test]
    fn data_packet_has_control_prefix() {
        let (packet, len) = build_data_packet(&[0xAA, 0x55]).unwrap();
        assert_eq!(len, 3);
        assert_eq!(&packet[..len], &[CONTROL_DATA, 0xAA, 0x55]);
        assert!(build_data_packet(&[0; DATA_CHUNK + 1]).is_none());
    }

    #[test]
    fn command_packet_bounds() {
        let (packet, len) = build_command_packet(&FULL_WINDOW[..3]).unwrap();
        assert_eq!(&packet[..len], &[CONTROL_COMMANDS, SET_COLUMN_ADDRESS, 0, 127]);
        assert!(build_command_packet(&[]).is_none());
        assert!(build_command_packet(&[0; 8]).is_none());
    }
}
