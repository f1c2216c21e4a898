//! Lookup tables for boot and radio diagnostics.

/// Short and verbose description of a core's last reset cause.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResetReason {
    pub code: u32,
    pub short: &'static str,
    pub verbose: &'static str,
}

const NO_MEAN: &str = "NO_MEAN";

pub fn reset_reason(code: u32) -> ResetReason {
    let (short, verbose) = match code {
        1 => ("POWERON_RESET", "Vbat power on reset"),
        3 => ("SW_RESET", "Software reset digital core"),
        4 => ("OWDT_RESET", "Legacy watch dog reset digital core"),
        5 => ("DEEPSLEEP_RESET", "Deep Sleep reset digital core"),
        6 => ("SDIO_RESET", "Reset by SLC module, reset digital core"),
        7 => ("TG0WDT_SYS_RESET", "Timer Group0 Watch dog reset digital core"),
        8 => ("TG1WDT_SYS_RESET", "Timer Group1 Watch dog reset digital core"),
        9 => ("RTCWDT_SYS_RESET", "RTC Watch dog Reset digital core"),
        10 => ("INTRUSION_RESET", "Instrusion tested to reset CPU"),
        11 => ("TGWDT_CPU_RESET", "Time Group reset CPU"),
        12 => ("SW_CPU_RESET", "Software reset CPU"),
        13 => ("RTCWDT_CPU_RESET", "RTC Watch dog Reset CPU"),
        14 => ("EXT_CPU_RESET", "for APP CPU, reseted by PRO CPU"),
        15 => (
            "RTCWDT_BROWN_OUT_RESET",
            "Reset when the vdd voltage is not stable",
        ),
        16 => (
            "RTCWDT_RTC_RESET",
            "RTC Watch dog reset digital core and rtc module",
        ),
        _ => (NO_MEAN, NO_MEAN),
    };

    ResetReason {
        code,
        short,
        verbose,
    }
}

/// Name of a station disconnect reason reported by the WiFi driver.
pub fn wifi_disconnect_reason(code: u8) -> &'static str {
    match code {
        1 => "UNSPECIFIED",
        2 => "AUTH_EXPIRE",
        3 => "AUTH_LEAVE",
        4 => "ASSOC_EXPIRE",
        5 => "ASSOC_TOOMANY",
        6 => "NOT_AUTHED",
        7 => "NOT_ASSOCED",
        8 => "ASSOC_LEAVE",
        9 => "ASSOC_NOT_AUTHED",
        10 => "DISASSOC_PWRCAP_BAD",
        11 => "DISASSOC_SUPCHAN_BAD",
        13 => "IE_INVALID",
        14 => "MIC_FAILURE",
        15 => "4WAY_HANDSHAKE_TIMEOUT",
        16 => "GROUP_KEY_UPDATE_TIMEOUT",
        17 => "IE_IN_4WAY_DIFFERS",
        18 => "GROUP_CIPHER_INVALID",
        19 => "PAIRWISE_CIPHER_INVALID",
        20 => "AKMP_INVALID",
        21 => "UNSUPP_RSN_IE_VERSION",
        22 => "INVALID_RSN_IE_CAP",
        23 => "802_1X_AUTH_FAILED",
        24 => "CIPHER_SUITE_REJECTED",
        200 => "BEACON_TIMEOUT",
        201 => "NO_AP_FOUND",
        202 => "AUTH_FAIL",
        203 => "ASSOC_FAIL",
        204 => "HANDSHAKE_TIMEOUT",
        205 => "CONNECTION_FAIL",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_sleep_reset_is_code_five() {
        let reason = reset_reason(5);
        assert_eq!(reason.short, "DEEPSLEEP_RESET");
        assert_eq!(reason.verbose, "Deep Sleep reset digital core");
    }

    #[test]
    fn unknown_codes_have_no_meaning() {
        for code in [0, 2, 17, 99] {
            let reason = reset_reason(code);
            assert_eq!(reason.short, "NO_MEAN");
            assert_eq!(reason.verbose, "NO_MEAN");
            assert_eq!(reason.code, code);
        }
    }

    #[test]
    fn every_table_entry_is_distinct() {
        let mut codes = [1u32, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16].map(reset_reason);
        codes.sort_by_key(|reason| reason.short);
        assert!(codes.windows(2).all(|pair| pair[0].short != pair[1].short));
        assert!(codes.iter().all(|reason| reason.short != "NO_MEAN"));
    }

    #[test]
    fn disconnect_reason_names() {
        assert_eq!(wifi_disconnect_reason(202), "AUTH_FAIL");
        assert_eq!(wifi_disconnect_reason(201), "NO_AP_FOUND");
        assert_eq!(wifi_disconnect_reason(12), "UNKNOWN");
    }
}
