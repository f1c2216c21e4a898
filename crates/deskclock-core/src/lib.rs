#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait, reason = "single-threaded firmware")]

//! Board-independent logic for the WiFi desk clock.
//!
//! Everything here runs on the host in tests; the ESP32-S3 crate only plugs
//! flash, radio and display adapters into these types.

pub mod app;
pub mod config;
pub mod device_id;
pub mod diagnostics;
pub mod factory_reset;
pub mod http;
pub mod lifecycle;
pub mod mdns;
pub mod render;
pub mod settings;
pub mod statistics;
pub mod time_sync;
pub mod update;
pub mod zone;
