use deskclock_core::{
    config::WifiQuirks,
    diagnostics::wifi_disconnect_reason,
    factory_reset::{StationControl, overwrite_station_credentials},
    settings::WifiCredentials,
};
use deskclock_hal_esp32s3::{network::ConnectivityHandle, system};
use embassy_futures::select::{Either, select};
use embassy_net::Stack;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embassy_time::{Duration, Timer, WithTimeout};
use esp_radio::wifi::{
    ClientConfig, ModeConfig, WifiController,
    event::{EventExt, StaDisconnected},
};
use log::{info, warn};

const WIFI_RETRY_BACKOFF_MIN_SECS: u64 = 2;
const WIFI_RETRY_BACKOFF_MAX_SECS: u64 = 120;
const NETWORK_POLL_INTERVAL_MS: u64 = 500;
const DHCP_TIMEOUT_SECS: u64 = 15;
const DUMMY_CONNECT_TIMEOUT_SECS: u64 = 10;

pub(super) enum WifiCommand {
    Reconfigure(WifiCredentials),
    Forget,
}

pub(super) type WifiCommands = Signal<CriticalSectionRawMutex, WifiCommand>;
pub(super) type WifiForgotten = Signal<CriticalSectionRawMutex, ()>;

/// Routes driver disconnect reasons into `connectivity`.
///
/// A reason listed in `quirks` puts the chip into a short deep sleep from
/// inside the handler.
pub(super) fn install_disconnect_handler(
    connectivity: &'static ConnectivityHandle,
    quirks: WifiQuirks,
) {
    StaDisconnected::replace_handler(move |event| {
        let reason = event.reason() as u8;
        warn!(
            "wifi: disconnected, reason {} ({})",
            reason,
            wifi_disconnect_reason(reason)
        );
        if connectivity.record_disconnect(reason, &quirks) {
            system::sleep_after_wifi_bug();
        }
    });
}

fn wifi_retry_backoff_secs(consecutive_failures: u32) -> u64 {
    // 2, 4, 8, 16, 32, 64, 120, 120, ...
    let shift = consecutive_failures.min(6);
    WIFI_RETRY_BACKOFF_MIN_SECS
        .saturating_mul(1u64 << shift)
        .min(WIFI_RETRY_BACKOFF_MAX_SECS)
}

/// Sleeps for the backoff delay unless a command arrives first.
async fn wait_before_wifi_retry(
    consecutive_failures: &mut u32,
    commands: &WifiCommands,
) -> Option<WifiCommand> {
    let delay_secs = wifi_retry_backoff_secs(*consecutive_failures);
    *consecutive_failures = consecutive_failures.saturating_add(1);
    info!(
        "wifi retrying in {}s (consecutive_failures={})",
        delay_secs, *consecutive_failures
    );
    match select(Timer::after_secs(delay_secs), commands.wait()).await {
        Either::First(()) => None,
        Either::Second(command) => Some(command),
    }
}

fn apply_client_config(
    wifi_controller: &mut WifiController<'_>,
    ssid: &str,
    password: &str,
) -> bool {
    let client_config = ClientConfig::default()
        .with_ssid(ssid.into())
        .with_password(password.into());
    match wifi_controller.set_config(&ModeConfig::Client(client_config)) {
        Ok(()) => true,
        Err(err) => {
            warn!("wifi mode config failed: {:?}", err);
            false
        }
    }
}

/// Controller view used while overwriting the stored credentials.
struct Station<'c, 'd> {
    controller: &'c mut WifiController<'d>,
}

impl StationControl for Station<'_, '_> {
    async fn disconnect(&mut self) {
        let _ = self.controller.disconnect_async().await;
    }

    fn configure(&mut self, ssid: &str, password: &str) -> bool {
        apply_client_config(self.controller, ssid, password)
    }

    async fn connect(&mut self) -> bool {
        if !self.controller.is_started().unwrap_or(false) {
            if let Err(err) = self.controller.start_async().await {
                info!("wifi start failed: {:?}", err);
                return false;
            }
        }
        match self
            .controller
            .connect_async()
            .with_timeout(Duration::from_secs(DUMMY_CONNECT_TIMEOUT_SECS))
            .await
        {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                info!("wifi: dummy connect failed: {:?}", err);
                false
            }
            Err(_) => {
                info!("wifi: dummy connect timed out");
                false
            }
        }
    }
}

/// Applies a command; returns the credentials to use from now on.
async fn handle_command(
    wifi_controller: &mut WifiController<'_>,
    connectivity: &ConnectivityHandle,
    forgotten: &WifiForgotten,
    command: WifiCommand,
) -> Option<WifiCredentials> {
    let _ = wifi_controller.disconnect_async().await;
    connectivity.mark_disconnected();

    match command {
        WifiCommand::Reconfigure(credentials) => {
            info!("wifi: switching to '{}'", credentials.ssid);
            Some(credentials)
        }
        WifiCommand::Forget => {
            overwrite_station_credentials(&mut Station {
                controller: wifi_controller,
            })
            .await;
            info!("wifi: credentials forgotten");
            forgotten.signal(());
            None
        }
    }
}

pub(super) async fn wifi_connection_loop(
    wifi_controller: &mut WifiController<'_>,
    stack: Stack<'_>,
    connectivity: &'static ConnectivityHandle,
    commands: &WifiCommands,
    forgotten: &WifiForgotten,
    mut credentials: Option<WifiCredentials>,
) -> ! {
    let mut consecutive_failures = 0u32;
    let mut pending: Option<WifiCommand> = None;
    let mut configured = false;

    loop {
        if let Some(command) = pending.take().or_else(|| commands.try_take()) {
            credentials = handle_command(wifi_controller, connectivity, forgotten, command).await;
            consecutive_failures = 0;
            configured = false;
        }

        let Some(active) = credentials.as_ref() else {
            connectivity.mark_disconnected();
            info!("wifi: no credentials, waiting for /wifi_set");
            pending = Some(commands.wait().await);
            continue;
        };

        if !configured {
            if !apply_client_config(wifi_controller, &active.ssid, &active.password) {
                pending = wait_before_wifi_retry(&mut consecutive_failures, commands).await;
                continue;
            }
            configured = true;
        }

        connectivity.mark_connecting();

        if !wifi_controller.is_started().unwrap_or(false) {
            if let Err(err) = wifi_controller.start_async().await {
                info!("wifi start failed: {:?}", err);
                connectivity.mark_disconnected();
                pending = wait_before_wifi_retry(&mut consecutive_failures, commands).await;
                continue;
            }
        }

        info!("wifi: connecting to '{}'", active.ssid);
        if let Err(err) = wifi_controller.connect_async().await {
            info!("wifi connect failed: {:?}", err);
            connectivity.mark_disconnected();
            let _ = wifi_controller.disconnect_async().await;
            pending = wait_before_wifi_retry(&mut consecutive_failures, commands).await;
            continue;
        }
        connectivity.mark_link_up();

        match stack
            .wait_config_up()
            .with_timeout(Duration::from_secs(DHCP_TIMEOUT_SECS))
            .await
        {
            Ok(()) => match stack.config_v4() {
                Some(config) => {
                    let address = config.address.address();
                    info!("wifi connected, IP {}", address);
                    connectivity.mark_connected(address.octets());
                }
                None => {
                    info!("dhcp reported up without an IPv4 config; reconnecting");
                    let _ = wifi_controller.disconnect_async().await;
                    pending = wait_before_wifi_retry(&mut consecutive_failures, commands).await;
                    continue;
                }
            },
            Err(_) => {
                info!("dhcp timeout; forcing reconnect");
                connectivity.mark_disconnected();
                let _ = wifi_controller.disconnect_async().await;
                pending = wait_before_wifi_retry(&mut consecutive_failures, commands).await;
                continue;
            }
        }

        consecutive_failures = 0;
        let disconnects_seen = connectivity.disconnect_count();

        loop {
            if let Some(command) = commands.try_take() {
                pending = Some(command);
                break;
            }

            let link_up = stack.is_link_up();
            let address = stack.config_v4().map(|config| config.address.address());
            let is_connected = matches!(wifi_controller.is_connected(), Ok(true));
            let dropped = connectivity.disconnect_count() != disconnects_seen;

            match address {
                Some(address) if link_up && is_connected && !dropped => {
                    connectivity.mark_connected(address.octets());
                }
                _ => {
                    info!(
                        "wifi state lost (link_up={} has_ipv4={} connected={}); reconnecting",
                        link_up,
                        address.is_some(),
                        is_connected
                    );
                    break;
                }
            }

            Timer::after_millis(NETWORK_POLL_INTERVAL_MS).await;
        }

        connectivity.mark_disconnected();
        let _ = wifi_controller.disconnect_async().await;
        if pending.is_none() {
            pending = wait_before_wifi_retry(&mut consecutive_failures, commands).await;
        }
    }
}
