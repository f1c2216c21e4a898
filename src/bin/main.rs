#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::cell::RefCell;

use deskclock_core::{
    app::{ClockApp, ClockEnv, ConfigEvent, ConfigOutcome, LoopStep},
    config::ClockConfig,
    device_id::{self, DeviceName},
    diagnostics::wifi_disconnect_reason,
    render::Screen,
    settings::{ClockSettings, NAMESPACE, Namespace, WifiCredentials},
    statistics::LoopStatistics,
    time_sync::SyncedClock,
    update::UpdateTracker,
};
use deskclock_hal_esp32s3::{
    network::{ConnectivityHandle, ConnectivitySnapshot},
    platform::display::OledDisplay,
    render::{FrameRenderer, clock::ClockRenderer},
    storage::SettingsBackend,
    system,
    update::{self as ota, OTA_PAGE_SIZE},
};
use embassy_executor::Spawner;
use embassy_net::{ConfigV4, DhcpConfig, Stack, StackResources};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{Instant, Timer};
use embedded_storage::ReadStorage;
use esp_bootloader_esp_idf::partitions::PARTITION_TABLE_MAX_LEN;
use esp_hal::{
    clock::CpuClock,
    i2c::master::{Config as I2cConfig, I2c},
    rng::Rng,
    time::Rate,
    timer::timg::TimerGroup,
};
use esp_storage::FlashStorage;
use log::{LevelFilter, info, warn};
use ssd1306::FrameBuffer;
use static_cell::StaticCell;

use factory_reset::BoardFactoryReset;
use http_server::ServerContext;
use mdns::HostnameChanges;
use wifi::{WifiCommand, WifiCommands, WifiForgotten};

#[path = "main/factory_reset.rs"]
mod factory_reset;
#[path = "main/http_server.rs"]
mod http_server;
#[path = "main/mdns.rs"]
mod mdns;
#[path = "main/sntp.rs"]
mod sntp;
#[path = "main/wifi.rs"]
mod wifi;

const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
const CHIP: &str = "esp32s3";
const DISPLAY_I2C_KHZ: u32 = 400;
const UI_LOOP_IDLE_MS: u64 = 1;
const CONFIG_EVENT_QUEUE: usize = 4;

const WIFI_SSID: Option<&str> = option_env!("DESKCLOCK_WIFI_SSID");
const WIFI_PASSWORD: Option<&str> = option_env!("DESKCLOCK_WIFI_PASSWORD");

type ConfigEvents = Channel<CriticalSectionRawMutex, ConfigEvent, CONFIG_EVENT_QUEUE>;

static CONNECTIVITY: ConnectivityHandle = ConnectivityHandle::new();
static SYNCED_CLOCK: SyncedClock = SyncedClock::new();
static UPDATE_TRACKER: UpdateTracker = UpdateTracker::new();
static CONFIG_EVENTS: ConfigEvents = Channel::new();
static WIFI_COMMANDS: WifiCommands = WifiCommands::new();
static WIFI_FORGOTTEN: WifiForgotten = WifiForgotten::new();
static HOSTNAME_CHANGES: HostnameChanges = HostnameChanges::new();
static NET_RESOURCES: StaticCell<StackResources<6>> = StaticCell::new();
static PARTITION_TABLE_BUF: StaticCell<[u8; PARTITION_TABLE_MAX_LEN]> = StaticCell::new();
static OTA_PAGE: StaticCell<[u8; OTA_PAGE_SIZE]> = StaticCell::new();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Runtime facts the clock app reads once per iteration.
struct BoardEnv {
    tracker: &'static UpdateTracker,
    clock: &'static SyncedClock,
}

impl ClockEnv for BoardEnv {
    fn update_in_progress(&self) -> bool {
        self.tracker.is_updating()
    }

    fn network_time_synced(&self) -> bool {
        self.clock.has_synced()
    }
}

fn print_boot_banner() {
    esp_println::println!("+-----------------------+");
    esp_println::println!("|        Booting        |");
    esp_println::println!("+-----------------------+");
}

fn build_time_credentials() -> Option<WifiCredentials> {
    WifiCredentials::new(WIFI_SSID?, WIFI_PASSWORD.unwrap_or(""))
}

fn dhcp_config(device_name: &DeviceName) -> DhcpConfig {
    let mut config = DhcpConfig::default();
    match device_id::sanitize_hostname(device_name) {
        Some(hostname) => config.hostname = hostname.as_str().try_into().ok(),
        None => warn!("device name '{}' is not a valid host name", device_name),
    }
    config
}

/// WiFi failure details stay up until the first network time; after that a
/// lost link only changes the address line.
fn select_screen(
    app: &ClockApp,
    connectivity: ConnectivitySnapshot,
    now_unix_ms: Option<i64>,
) -> Screen {
    match connectivity.last_disconnect {
        Some(code) if !connectivity.is_connected() && !app.state().has_network_time() => {
            Screen::WifiFailed {
                code,
                reason: wifi_disconnect_reason(code),
            }
        }
        _ => Screen::Clock(app.clock_face(now_unix_ms, connectivity.network_label())),
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    print_boot_banner();

    let cpu_clock = CpuClock::max();
    let config = esp_hal::Config::default().with_cpu_clock(cpu_clock);
    let peripherals = esp_hal::init(config);

    // esp-radio requires an allocator.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Wiring used by this board: SDA=GPIO8, SCL=GPIO9
    let i2c_config = I2cConfig::default().with_frequency(Rate::from_khz(DISPLAY_I2C_KHZ));
    let i2c = match I2c::new(peripherals.I2C0, i2c_config) {
        Ok(i2c) => i2c.with_sda(peripherals.GPIO8).with_scl(peripherals.GPIO9),
        Err(err) => {
            info!("display i2c config failed: {:?}", err);
            loop {
                Timer::after_secs(1).await;
            }
        }
    };

    let mut display = OledDisplay::new(i2c, ssd1306::Config::default());
    if let Err(err) = display.initialize() {
        warn!("display: init failed: {:?}", err);
    }
    let mut renderer = ClockRenderer::new();
    let mut frame = FrameBuffer::new();
    renderer.render(Screen::Boot, &mut frame);
    display.flush(&frame);

    let mut flash = FlashStorage::new(peripherals.FLASH);
    info!("firmware {} on {}", FIRMWARE_VERSION, CHIP);
    info!("CPU clock {:?}, flash {} bytes", cpu_clock, flash.capacity());
    system::log_reset_reasons();

    let table_buf = PARTITION_TABLE_BUF.init([0; PARTITION_TABLE_MAX_LEN]);
    if let Err(err) = ota::confirm_running_image(&mut flash, table_buf) {
        warn!("ota: could not confirm running image: {:?}", err);
    }

    let mac = system::station_mac();
    let clock_config = ClockConfig::default();
    let mut settings_store = match Namespace::open(SettingsBackend::open(), NAMESPACE) {
        Ok(store) => store,
        Err(err) => {
            info!("settings namespace open failed: {:?}", err);
            loop {
                Timer::after_secs(1).await;
            }
        }
    };
    let mut clock_settings =
        ClockSettings::load(&mut settings_store, mac, clock_config.default_zone);
    if clock_settings.wifi.is_none() {
        clock_settings.wifi = build_time_credentials();
    }
    info!(
        "device '{}', timezone '{}', wifi {}",
        clock_settings.device_name,
        clock_settings.zone_name,
        if clock_settings.wifi.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );

    let initial_credentials = clock_settings.wifi.clone();
    let initial_host = device_id::sanitize_hostname(&clock_settings.device_name)
        .unwrap_or_else(|| device_id::generate(mac));
    let stack_config = embassy_net::Config::dhcpv4(dhcp_config(&clock_settings.device_name));
    let app = RefCell::new(ClockApp::new(clock_config, clock_settings));

    let radio = match esp_radio::init() {
        Ok(radio) => radio,
        Err(err) => {
            info!("esp-radio init failed: {:?}", err);
            loop {
                Timer::after_secs(1).await;
            }
        }
    };

    let (mut wifi_controller, interfaces) =
        match esp_radio::wifi::new(&radio, peripherals.WIFI, esp_radio::wifi::Config::default()) {
            Ok(parts) => parts,
            Err(err) => {
                info!("wifi peripheral init failed: {:?}", err);
                loop {
                    Timer::after_secs(1).await;
                }
            }
        };
    wifi::install_disconnect_handler(&CONNECTIVITY, clock_config.wifi_quirks);

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let (stack, mut net_runner) = embassy_net::new(
        interfaces.sta,
        stack_config,
        NET_RESOURCES.init(StackResources::<6>::new()),
        seed,
    );

    let server_context = ServerContext {
        app: &app,
        events: &CONFIG_EVENTS,
        tracker: &UPDATE_TRACKER,
        connectivity: &CONNECTIVITY,
        flash: &mut flash,
        table_buf,
        ota_page: OTA_PAGE.init([0; OTA_PAGE_SIZE]),
    };

    let statistics_period_ms = app.borrow().config().statistics_period_ms;
    let env = BoardEnv {
        tracker: &UPDATE_TRACKER,
        clock: &SYNCED_CLOCK,
    };

    CONNECTIVITY.mark_connecting();

    let net_future = net_runner.run();
    let wifi_future = wifi::wifi_connection_loop(
        &mut wifi_controller,
        stack,
        &CONNECTIVITY,
        &WIFI_COMMANDS,
        &WIFI_FORGOTTEN,
        initial_credentials,
    );
    let http_future = http_server::config_server_loop(stack, server_context);
    let sntp_future = sntp::sntp_loop(stack, &SYNCED_CLOCK);
    let mdns_future = mdns::mdns_responder_loop(stack, &HOSTNAME_CHANGES, initial_host);
    let ui_future = async {
        let mut statistics = LoopStatistics::begin(statistics_period_ms, Instant::now().as_micros());
        app.borrow_mut().finish_boot();

        loop {
            let now = Instant::now();
            statistics.tick(now.as_micros());

            if !UPDATE_TRACKER.is_updating() {
                while let Ok(event) = CONFIG_EVENTS.try_receive() {
                    let outcome = app.borrow_mut().apply_config(event, &mut settings_store);
                    handle_config_outcome(outcome, stack, &app).await;
                }
            }

            let step = app.borrow_mut().poll(now.as_millis(), &env);
            if let LoopStep::Active {
                refresh_display: true,
                ..
            } = step
            {
                let screen = select_screen(
                    &app.borrow(),
                    CONNECTIVITY.snapshot(),
                    SYNCED_CLOCK.now_unix_ms(now.as_millis()),
                );
                renderer.render(screen, &mut frame);
                display.flush(&frame);
            }

            Timer::after_millis(UI_LOOP_IDLE_MS).await;
        }
    };

    let _ = embassy_futures::join::join5(
        net_future,
        wifi_future,
        http_future,
        embassy_futures::join::join(sntp_future, mdns_future),
        ui_future,
    )
    .await;
    unreachable!()
}

/// Board side effects of an accepted config change.
async fn handle_config_outcome(outcome: ConfigOutcome, stack: Stack<'_>, app: &RefCell<ClockApp>) {
    match outcome {
        ConfigOutcome::DeviceNameChanged { .. } => {
            let device_name = app.borrow().settings().device_name.clone();
            info!("publishing device name as DHCP and mDNS host name");
            stack.set_config_v4(ConfigV4::Dhcp(dhcp_config(&device_name)));
            if let Some(host) = device_id::sanitize_hostname(&device_name) {
                HOSTNAME_CHANGES.signal(host);
            }
        }
        ConfigOutcome::TimeZoneChanged { .. } => {}
        ConfigOutcome::WifiCredentialsChanged { credentials, .. } => {
            WIFI_COMMANDS.signal(WifiCommand::Reconfigure(credentials));
        }
        ConfigOutcome::FactoryResetRequested => {
            let mut port = BoardFactoryReset {
                wifi_commands: &WIFI_COMMANDS,
                wifi_forgotten: &WIFI_FORGOTTEN,
            };
            deskclock_core::factory_reset::factory_reset(&mut port).await;
        }
    }
}
