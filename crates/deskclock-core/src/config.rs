//! Runtime policy knobs shared by the board loop.

use crate::zone::DEFAULT_ZONE;

/// Driver-specific workarounds for station disconnects.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WifiQuirks {
    /// Disconnect reason that forces a short deep-sleep restart cycle.
    pub sleep_on_disconnect_reason: Option<u8>,
}

impl WifiQuirks {
    pub const NONE: Self = Self {
        sleep_on_disconnect_reason: None,
    };

    pub fn requires_sleep(&self, reason: u8) -> bool {
        self.sleep_on_disconnect_reason == Some(reason)
    }
}

impl Default for WifiQuirks {
    fn default() -> Self {
        // AUTH_FAIL leaves the ESP32 radio unable to reconnect until reset.
        Self {
            sleep_on_disconnect_reason: Some(202),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClockConfig {
    pub display_refresh_ms: u64,
    pub statistics_period_ms: u64,
    pub default_zone: &'static str,
    pub wifi_quirks: WifiQuirks,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            display_refresh_ms: 250,
            statistics_period_ms: 10_000,
            default_zone: DEFAULT_ZONE,
            wifi_quirks: WifiQuirks::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quirk_targets_reason_202_only() {
        let quirks = WifiQuirks::default();
        assert!(quirks.requires_sleep(202));
        assert!(!quirks.requires_sleep(201));
        assert!(!WifiQuirks::NONE.requires_sleep(202));
    }

    #[test]
    fn clock_config_carries_the_disconnect_quirk() {
        let config = ClockConfig::default();
        assert_eq!(config.wifi_quirks.sleep_on_disconnect_reason, Some(202));
        assert!(config.wifi_quirks.requires_sleep(202));
    }
}
