pub mod clock;

use deskclock_core::render::Screen;
use ssd1306::FrameBuffer;

pub trait FrameRenderer {
    fn render(&mut self, screen: Screen, frame: &mut FrameBuffer);
}
