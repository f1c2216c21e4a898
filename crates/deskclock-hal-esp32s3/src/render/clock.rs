//! Clock face, boot and WiFi failure screens drawn with embedded-graphics.

use core::fmt::Write;

use deskclock_core::render::{
    ClockFace, DISPLAY_HEIGHT, DISPLAY_WIDTH, SECOND_MARKER_WIDTH, Screen,
};
use embedded_graphics::{
    mono_font::{
        MonoFont, MonoTextStyle,
        ascii::{FONT_5X8, FONT_6X10, FONT_7X13, FONT_9X15, FONT_10X20},
    },
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyle, TextStyleBuilder},
};
use heapless::String;
use ssd1306::FrameBuffer;

use super::FrameRenderer;

const LABEL_FONT: &MonoFont<'static> = &FONT_9X15;
const DETAIL_FONT: &MonoFont<'static> = &FONT_6X10;
const TIME_FONT: &MonoFont<'static> = &FONT_10X20;
const DATE_FONT: &MonoFont<'static> = &FONT_7X13;
const ADDRESS_FONT: &MonoFont<'static> = &FONT_5X8;

const TIME_BASELINE_Y: i32 = 32;
const DATE_BASELINE_Y: i32 = 46;
const ADDRESS_BASELINE_Y: i32 = DISPLAY_HEIGHT - 1;
const SECOND_MARKER_ROWS: u32 = 2;

/// Stateless renderer for the 128x64 panel.
#[derive(Debug, Default)]
pub struct ClockRenderer;

impl ClockRenderer {
    pub const fn new() -> Self {
        Self
    }

    fn draw_text(
        &self,
        frame: &mut FrameBuffer,
        text: &str,
        position: Point,
        font: &MonoFont<'_>,
        alignment: Alignment,
    ) {
        let style = MonoTextStyle::new(font, BinaryColor::On);
        let _ = Text::with_text_style(text, position, style, text_style(alignment)).draw(frame);
    }

    fn render_boot(&self, frame: &mut FrameBuffer) {
        self.draw_text(
            frame,
            "Booting...",
            Point::new(0, 20),
            LABEL_FONT,
            Alignment::Left,
        );
    }

    fn render_wifi_failed(&self, frame: &mut FrameBuffer, code: u8, reason: &str) {
        self.draw_text(
            frame,
            "WiFi failed",
            Point::new(0, 20),
            LABEL_FONT,
            Alignment::Left,
        );

        let mut label = String::<16>::new();
        let _ = write!(label, "reason: {}", code);
        self.draw_text(frame, &label, Point::new(0, 40), LABEL_FONT, Alignment::Left);
        self.draw_text(frame, reason, Point::new(0, 60), DETAIL_FONT, Alignment::Left);
    }

    fn render_clock(&self, frame: &mut FrameBuffer, face: &ClockFace) {
        if let Some(x) = face.second_marker_x() {
            let _ = Rectangle::new(
                Point::new(x, 0),
                Size::new(SECOND_MARKER_WIDTH, SECOND_MARKER_ROWS),
            )
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(frame);
        }

        let centre_x = DISPLAY_WIDTH / 2;
        self.draw_text(
            frame,
            &face.time_text(),
            Point::new(centre_x, TIME_BASELINE_Y),
            TIME_FONT,
            Alignment::Center,
        );
        self.draw_text(
            frame,
            &face.date_text(),
            Point::new(centre_x, DATE_BASELINE_Y),
            DATE_FONT,
            Alignment::Center,
        );
        self.draw_text(
            frame,
            &face.network.text(),
            Point::new(DISPLAY_WIDTH - 1, ADDRESS_BASELINE_Y),
            ADDRESS_FONT,
            Alignment::Right,
        );
    }
}

impl FrameRenderer for ClockRenderer {
    fn render(&mut self, screen: Screen, frame: &mut FrameBuffer) {
        frame.clear(false);

        match screen {
            Screen::Boot => self.render_boot(frame),
            Screen::WifiFailed { code, reason } => self.render_wifi_failed(frame, code, reason),
            Screen::Clock(face) => self.render_clock(frame, &face),
        }
    }
}

fn text_style(alignment: Alignment) -> TextStyle {
    TextStyleBuilder::new()
        .alignment(alignment)
        .baseline(Baseline::Alphabetic)
        .build()
}
