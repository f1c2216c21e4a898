//! In-memory framebuffer in SSD1306 page layout.

use crate::protocol::{BUFFER_SIZE, HEIGHT, PAGES, WIDTH};

/// 1bpp framebuffer.
///
/// Byte `page * WIDTH + x` holds rows `page * 8 ..= page * 8 + 7` of column
/// `x`, least significant bit on top.
#[derive(Clone)]
pub struct FrameBuffer {
    bytes: [u8; BUFFER_SIZE],
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// Creates a dark framebuffer.
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; BUFFER_SIZE],
        }
    }

    pub fn bytes(&self) -> &[u8; BUFFER_SIZE] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; BUFFER_SIZE] {
        &mut self.bytes
    }

    pub fn clear(&mut self, on: bool) {
        self.bytes.fill(if on { 0xFF } else { 0x00 });
    }

    /// Sets a pixel state. Returns `false` when out of bounds.
    pub fn set_pixel(&mut self, x: usize, y: usize, on: bool) -> bool {
        let Some((index, mask)) = locate(x, y) else {
            return false;
        };

        if on {
            self.bytes[index] |= mask;
        } else {
            self.bytes[index] &= !mask;
        }
        true
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<bool> {
        let (index, mask) = locate(x, y)?;
        Some((self.bytes[index] & mask) != 0)
    }

    /// Column bytes of one page (0..8).
    pub fn page(&self, page: usize) -> Option<&[u8]> {
        if page >= PAGES {
            return None;
        }
        let start = page * WIDTH;
        Some(&self.bytes[start..start + WIDTH])
    }
}

fn locate(x: usize, y: usize) -> Option<(usize, u8)> {
    if x >= WIDTH || y >= HEIGHT {
        return None;
    }
    Some(((y / 8) * WIDTH + x, 1u8 << (y % 8)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_map_to_bits_of_a_column_byte() {
        let mut fb = FrameBuffer::new();

        assert!(fb.set_pixel(0, 0, true));
        assert!(fb.set_pixel(0, 7, true));
        assert!(fb.set_pixel(3, 8, true));

        assert_eq!(fb.bytes()[0], 0b1000_0001);
        assert_eq!(fb.page(1).unwrap()[3], 0b0000_0001);
    }

    #[test]
    fn out_of_bounds_pixel_is_ignored() {
        let mut fb = FrameBuffer::new();

        assert!(!fb.set_pixel(WIDTH, 0, true));
        assert!(!fb.set_pixel(0, HEIGHT, true));
        assert!(fb.bytes().iter().all(|b| *b == 0));
        assert!(fb.page(PAGES).is_none());
    }

    #[test]
    fn set_and_clear_last_pixel() {
        let mut fb = FrameBuffer::new();

        assert!(fb.set_pixel(WIDTH - 1, HEIGHT - 1, true));
        assert_eq!(fb.pixel(WIDTH - 1, HEIGHT - 1), Some(true));
        assert_eq!(fb.bytes()[BUFFER_SIZE - 1], 0x80);

        fb.set_pixel(WIDTH - 1, HEIGHT - 1, false);
        assert_eq!(fb.pixel(WIDTH - 1, HEIGHT - 1), Some(false));
    }
}
