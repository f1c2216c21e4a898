//! SNTP packet handling and the synced wall-clock base.

use core::cell::Cell;

use critical_section::Mutex;

pub const NTP_SERVER: &str = "pool.ntp.org";
pub const NTP_PORT: u16 = 123;
pub const NTP_PACKET_LEN: usize = 48;
/// Seconds between 1900-01-01 and 1970-01-01.
pub const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;
/// Seconds below this belong to era 1, which starts 2036-02-07T06:28:16Z.
const NTP_ERA_PIVOT: u32 = 0x8000_0000;
pub const RESYNC_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NtpError {
    TooShort,
    NotServerMode,
    Unsynchronized,
    MissingTimestamp,
    BeforeUnixEpoch,
}

/// Client request: LI=0, VN=3, Mode=3.
pub fn ntp_request() -> [u8; NTP_PACKET_LEN] {
    let mut request = [0u8; NTP_PACKET_LEN];
    request[0] = 0x1B;
    request
}

/// Extracts the transmit timestamp of a server reply as Unix milliseconds.
pub fn parse_ntp_response(response: &[u8]) -> Result<i64, NtpError> {
    if response.len() < NTP_PACKET_LEN {
        return Err(NtpError::TooShort);
    }

    let mode = response[0] & 0x07;
    if mode != 4 && mode != 5 {
        return Err(NtpError::NotServerMode);
    }
    // kiss-o'-death or unsynchronized server
    let stratum = response[1];
    if stratum == 0 || stratum > 15 {
        return Err(NtpError::Unsynchronized);
    }

    let seconds = u32::from_be_bytes([response[40], response[41], response[42], response[43]]);
    let fraction = u32::from_be_bytes([response[44], response[45], response[46], response[47]]);

    if seconds == 0 && fraction == 0 {
        return Err(NtpError::MissingTimestamp);
    }

    let seconds = if seconds < NTP_ERA_PIVOT {
        (seconds as u64) + (1u64 << 32)
    } else {
        seconds as u64
    };
    let seconds = seconds
        .checked_sub(NTP_UNIX_OFFSET_SECS)
        .ok_or(NtpError::BeforeUnixEpoch)?;
    let millis = ((fraction as u64) * 1_000) >> 32;

    Ok((seconds * 1_000 + millis) as i64)
}

/// Delay before the next attempt after `attempt` consecutive failures of the
/// first sync.
pub fn initial_retry_delay_secs(attempt: u32) -> u64 {
    match attempt {
        0 | 1 => 10,
        2 => 30,
        3 => 60,
        _ => 300,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct SyncPoint {
    unix_ms: i64,
    monotonic_ms: u64,
}

/// Last successful sync, shared between the SNTP future and the main loop.
pub struct SyncedClock {
    point: Mutex<Cell<Option<SyncPoint>>>,
}

impl Default for SyncedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncedClock {
    pub const fn new() -> Self {
        Self {
            point: Mutex::new(Cell::new(None)),
        }
    }

    pub fn record_sync(&self, unix_ms: i64, monotonic_ms: u64) {
        critical_section::with(|cs| {
            self.point.borrow(cs).set(Some(SyncPoint {
                unix_ms,
                monotonic_ms,
            }))
        });
    }

    pub fn has_synced(&self) -> bool {
        critical_section::with(|cs| self.point.borrow(cs).get().is_some())
    }

    pub fn now_unix_ms(&self, monotonic_ms: u64) -> Option<i64> {
        let point = critical_section::with(|cs| self.point.borrow(cs).get())?;
        let since = monotonic_ms.saturating_sub(point.monotonic_ms) as i64;
        Some(point.unix_ms.saturating_add(since))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(ntp_seconds: u32, fraction: u32) -> [u8; NTP_PACKET_LEN] {
        let mut packet = [0u8; NTP_PACKET_LEN];
        packet[0] = 0x1C; // server
        packet[1] = 2;
        packet[40..44].copy_from_slice(&ntp_seconds.to_be_bytes());
        packet[44..48].copy_from_slice(&fraction.to_be_bytes());
        packet
    }

    #[test]
    fn request_is_client_mode_v3() {
        let request = ntp_request();
        assert_eq!(request[0], 0x1B);
        assert!(request[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn transmit_timestamp_converts_to_unix_millis() {
        // 2024-01-15T12:00:00.5Z
        let ntp_seconds = (1_705_320_000u64 + NTP_UNIX_OFFSET_SECS) as u32;
        let unix_ms = parse_ntp_response(&reply(ntp_seconds, 0x8000_0000)).unwrap();
        assert_eq!(unix_ms, 1_705_320_000_500);
    }

    #[test]
    fn bad_replies_are_rejected() {
        assert_eq!(parse_ntp_response(&[0u8; 12]), Err(NtpError::TooShort));

        let mut client = reply(3_913_056_000, 0);
        client[0] = 0x1B;
        assert_eq!(parse_ntp_response(&client), Err(NtpError::NotServerMode));

        let mut unsynchronized = reply(3_913_056_000, 0);
        unsynchronized[1] = 16;
        assert_eq!(
            parse_ntp_response(&unsynchronized),
            Err(NtpError::Unsynchronized)
        );
    }

    #[test]
    fn kiss_of_death_is_rejected() {
        let mut kiss = reply(3_913_056_000, 0);
        kiss[1] = 0;
        kiss[12..16].copy_from_slice(b"RATE");
        assert_eq!(parse_ntp_response(&kiss), Err(NtpError::Unsynchronized));
    }

    #[test]
    fn zero_transmit_timestamp_is_rejected() {
        assert_eq!(
            parse_ntp_response(&reply(0, 0)),
            Err(NtpError::MissingTimestamp)
        );
    }

    #[test]
    fn timestamps_after_the_2036_wrap_use_era_one() {
        // 2036-03-01T00:00:00Z
        assert_eq!(parse_ntp_response(&reply(1_963_904, 0)), Ok(2_087_942_400_000));
        // 2036-02-07T06:28:16Z, first second of era 1
        assert_eq!(parse_ntp_response(&reply(0, 1 << 31)), Ok(2_085_978_496_500));
    }

    #[test]
    fn last_second_of_era_zero_stays_in_era_zero() {
        // 2036-02-07T06:28:15Z
        assert_eq!(
            parse_ntp_response(&reply(u32::MAX, 0)),
            Ok(2_085_978_495_000)
        );
        // 1968-01-20T03:14:08Z predates the Unix epoch
        assert_eq!(
            parse_ntp_response(&reply(NTP_ERA_PIVOT, 0)),
            Err(NtpError::BeforeUnixEpoch)
        );
    }

    #[test]
    fn retry_backoff_caps_at_five_minutes() {
        let delays: [u64; 6] = [1, 2, 3, 4, 5, 50].map(initial_retry_delay_secs);
        assert_eq!(delays, [10, 30, 60, 300, 300, 300]);
    }

    #[test]
    fn clock_advances_from_sync_point() {
        let clock = SyncedClock::new();
        assert!(!clock.has_synced());
        assert_eq!(clock.now_unix_ms(1_000), None);

        clock.record_sync(1_705_320_000_000, 5_000);
        assert!(clock.has_synced());
        assert_eq!(clock.now_unix_ms(6_250), Some(1_705_320_001_250));
    }
}
