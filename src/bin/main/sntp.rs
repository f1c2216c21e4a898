use deskclock_core::time_sync::{
    NTP_PACKET_LEN, NTP_PORT, NTP_SERVER, NtpError, RESYNC_INTERVAL_SECS, SyncedClock,
    initial_retry_delay_secs, ntp_request, parse_ntp_response,
};
use embassy_net::{
    IpEndpoint, Stack,
    dns::DnsQueryType,
    udp::{PacketMetadata, UdpSocket},
};
use embassy_time::{Duration, Instant, Timer, WithTimeout};
use log::{info, warn};

const SNTP_LOCAL_PORT: u16 = 50_123;
const SNTP_REPLY_TIMEOUT_SECS: u64 = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SntpError {
    Dns,
    Bind,
    Send,
    Timeout,
    Receive,
    Packet(NtpError),
}

struct SntpBuffers {
    rx_meta: [PacketMetadata; 2],
    tx_meta: [PacketMetadata; 2],
    rx: [u8; 128],
    tx: [u8; 128],
}

impl SntpBuffers {
    const fn new() -> Self {
        Self {
            rx_meta: [PacketMetadata::EMPTY; 2],
            tx_meta: [PacketMetadata::EMPTY; 2],
            rx: [0; 128],
            tx: [0; 128],
        }
    }
}

/// One request/response exchange. Returns Unix ms at the receive instant.
async fn query_once(stack: Stack<'_>, buffers: &mut SntpBuffers) -> Result<i64, SntpError> {
    let addresses = stack
        .dns_query(NTP_SERVER, DnsQueryType::A)
        .await
        .map_err(|_| SntpError::Dns)?;
    let server = *addresses.first().ok_or(SntpError::Dns)?;

    let mut socket = UdpSocket::new(
        stack,
        &mut buffers.rx_meta,
        &mut buffers.rx,
        &mut buffers.tx_meta,
        &mut buffers.tx,
    );
    socket.bind(SNTP_LOCAL_PORT).map_err(|_| SntpError::Bind)?;

    let sent_at = Instant::now();
    socket
        .send_to(&ntp_request(), IpEndpoint::new(server, NTP_PORT))
        .await
        .map_err(|_| SntpError::Send)?;

    let mut reply = [0u8; NTP_PACKET_LEN];
    let (len, _) = socket
        .recv_from(&mut reply)
        .with_timeout(Duration::from_secs(SNTP_REPLY_TIMEOUT_SECS))
        .await
        .map_err(|_| SntpError::Timeout)?
        .map_err(|_| SntpError::Receive)?;

    let server_ms = parse_ntp_response(&reply[..len]).map_err(SntpError::Packet)?;
    let half_round_trip_ms = (sent_at.elapsed().as_millis() / 2) as i64;
    Ok(server_ms + half_round_trip_ms)
}

/// Keeps `clock` synced: backoff until the first success, then a fixed
/// resync interval.
pub(super) async fn sntp_loop(stack: Stack<'_>, clock: &'static SyncedClock) -> ! {
    let mut buffers = SntpBuffers::new();
    let mut failures = 0u32;

    loop {
        stack.wait_config_up().await;

        let delay_secs = match query_once(stack, &mut buffers).await {
            Ok(unix_ms) => {
                let first = !clock.has_synced();
                clock.record_sync(unix_ms, Instant::now().as_millis());
                if first {
                    info!("sntp: first sync from {} ({} ms)", NTP_SERVER, unix_ms);
                }
                failures = 0;
                RESYNC_INTERVAL_SECS
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                let delay_secs = if clock.has_synced() {
                    RESYNC_INTERVAL_SECS
                } else {
                    initial_retry_delay_secs(failures)
                };
                warn!(
                    "sntp: sync failed: {:?} (attempt {}), retry in {}s",
                    err, failures, delay_secs
                );
                delay_secs
            }
        };

        Timer::after_secs(delay_secs).await;
    }
}
