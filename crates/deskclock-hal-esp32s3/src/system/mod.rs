//! Chip-level helpers: reset causes, restart and the deep-sleep workaround.

use core::time::Duration;

use deskclock_core::diagnostics::{self, ResetReason};
use esp_hal::{
    efuse::Efuse,
    peripherals::LPWR,
    rtc_cntl::{Rtc, reset_reason, sleep::TimerWakeupSource},
    system::Cpu,
};
use log::{info, warn};

/// Sleep length of the disconnect workaround; the wake-up is a clean boot.
const QUIRK_SLEEP: Duration = Duration::from_micros(10);

pub fn core_reset_reason(cpu: Cpu) -> ResetReason {
    let code = reset_reason(cpu).map_or(0, |reason| reason as u32);
    diagnostics::reset_reason(code)
}

/// Logs `short -> verbose` for both cores.
pub fn log_reset_reasons() -> [ResetReason; 2] {
    let reasons = [
        core_reset_reason(Cpu::ProCpu),
        core_reset_reason(Cpu::AppCpu),
    ];
    for (core, reason) in reasons.iter().enumerate() {
        info!(
            "CPU{} reset reason: {} -> {}",
            core, reason.short, reason.verbose
        );
    }
    reasons
}

/// Factory MAC of the station interface.
pub fn station_mac() -> [u8; 6] {
    Efuse::mac_address()
}

pub fn restart() -> ! {
    info!("system: software reset");
    esp_hal::system::software_reset()
}

/// Leaves a wedged radio state through a near-immediate deep sleep.
pub fn sleep_after_wifi_bug() -> ! {
    warn!("WiFi Bug, REBOOT/SLEEP!");
    let mut rtc = Rtc::new(unsafe { LPWR::steal() });
    let timer = TimerWakeupSource::new(QUIRK_SLEEP);
    rtc.sleep_deep(&[&timer]);
}
