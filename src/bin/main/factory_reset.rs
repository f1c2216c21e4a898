use deskclock_core::factory_reset::{EraseError, EraseReport, FactoryResetPort};
use deskclock_hal_esp32s3::{storage::flash_settings, system};
use embassy_time::{Duration, WithTimeout};
use log::warn;

use super::wifi::{WifiCommand, WifiCommands, WifiForgotten};

const FORGET_TIMEOUT_SECS: u64 = 20;

pub(super) struct BoardFactoryReset<'a> {
    pub(super) wifi_commands: &'a WifiCommands,
    pub(super) wifi_forgotten: &'a WifiForgotten,
}

impl FactoryResetPort for BoardFactoryReset<'_> {
    async fn forget_network_credentials(&mut self) {
        self.wifi_forgotten.reset();
        self.wifi_commands.signal(WifiCommand::Forget);
        if self
            .wifi_forgotten
            .wait()
            .with_timeout(Duration::from_secs(FORGET_TIMEOUT_SECS))
            .await
            .is_err()
        {
            warn!("wifi did not confirm forgetting its credentials");
        }
    }

    fn erase_settings_region(&mut self) -> Result<EraseReport, EraseError> {
        flash_settings::erase_settings_partition()
    }

    fn restart(&mut self) {
        system::restart()
    }
}
