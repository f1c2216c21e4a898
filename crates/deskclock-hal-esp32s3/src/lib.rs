#![no_std]

//! ESP32-S3 adapters for the desk clock: flash, OTA, radio state, OLED.

pub mod network;
pub mod platform;
pub mod render;
pub mod storage;
pub mod system;
pub mod update;
