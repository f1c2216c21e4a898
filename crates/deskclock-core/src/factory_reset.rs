//! Irreversible wipe of network credentials and settings, followed by restart.

use log::{error, info, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EraseReport {
    pub offset: u32,
    pub len: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EraseError {
    PartitionTable,
    RegionNotFound,
    Flash(i32),
}

/// Stored over the real station credentials when forgetting them.
pub const DUMMY_CREDENTIAL: &str = "0";

pub trait FactoryResetPort {
    /// Drop stored credentials, usually via [`overwrite_station_credentials`].
    async fn forget_network_credentials(&mut self);
    fn erase_settings_region(&mut self) -> Result<EraseReport, EraseError>;
    fn restart(&mut self);
}

/// Radio operations used to overwrite the stored station credentials.
pub trait StationControl {
    async fn disconnect(&mut self);
    fn configure(&mut self, ssid: &str, password: &str) -> bool;
    /// Returns `true` if the attempt connected.
    async fn connect(&mut self) -> bool;
}

/// Replaces the stored credentials with dummies.
///
/// The radio only keeps new credentials once a connection attempt was made
/// with them, so the sequence is disconnect, configure, connect, disconnect.
pub async fn overwrite_station_credentials<S: StationControl>(station: &mut S) {
    station.disconnect().await;
    if !station.configure(DUMMY_CREDENTIAL, DUMMY_CREDENTIAL) {
        error!("could not apply dummy wifi credentials");
        return;
    }
    if station.connect().await {
        warn!("dummy wifi credentials connected");
    }
    station.disconnect().await;
}

/// Runs all steps in order. The restart is issued even if the erase failed.
pub async fn factory_reset<P: FactoryResetPort>(port: &mut P) {
    info!("erase wifi data");
    port.forget_network_credentials().await;

    info!("erase settings data");
    match port.erase_settings_region() {
        Ok(report) => info!(
            "settings partition at offset 0x{:x} with size 0x{:x} erased",
            report.offset, report.len
        ),
        Err(EraseError::RegionNotFound) => error!("settings partition not found"),
        Err(err) => error!("could not erase settings partition: {:?}", err),
    }

    info!("restart");
    port.restart();
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    enum Step {
        Forget,
        Erase,
        Restart,
    }

    struct FakePort {
        erase_result: Result<EraseReport, EraseError>,
        steps: heapless::Vec<Step, 4>,
    }

    impl FakePort {
        fn new(erase_result: Result<EraseReport, EraseError>) -> Self {
            Self {
                erase_result,
                steps: heapless::Vec::new(),
            }
        }
    }

    impl FactoryResetPort for FakePort {
        async fn forget_network_credentials(&mut self) {
            self.steps.push(Step::Forget).unwrap();
        }

        fn erase_settings_region(&mut self) -> Result<EraseReport, EraseError> {
            self.steps.push(Step::Erase).unwrap();
            self.erase_result
        }

        fn restart(&mut self) {
            self.steps.push(Step::Restart).unwrap();
        }
    }

    #[test]
    fn steps_run_in_order() {
        let mut port = FakePort::new(Ok(EraseReport {
            offset: 0x9000,
            len: 0x6000,
        }));
        block_on(factory_reset(&mut port));
        assert_eq!(&port.steps[..], &[Step::Forget, Step::Erase, Step::Restart]);
    }

    #[test]
    fn restart_happens_when_partition_is_missing() {
        let mut port = FakePort::new(Err(EraseError::RegionNotFound));
        block_on(factory_reset(&mut port));
        assert_eq!(port.steps.last(), Some(&Step::Restart));
    }

    #[test]
    fn restart_happens_when_erase_fails() {
        for err in [EraseError::PartitionTable, EraseError::Flash(-1)] {
            let mut port = FakePort::new(Err(err));
            block_on(factory_reset(&mut port));
            assert_eq!(port.steps.last(), Some(&Step::Restart));
        }
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    enum StationStep {
        Disconnect,
        Configure,
        Connect,
    }

    struct FakeStation {
        configure_ok: bool,
        configured: Option<(heapless::String<8>, heapless::String<8>)>,
        steps: heapless::Vec<StationStep, 8>,
    }

    impl FakeStation {
        fn new(configure_ok: bool) -> Self {
            Self {
                configure_ok,
                configured: None,
                steps: heapless::Vec::new(),
            }
        }
    }

    impl StationControl for FakeStation {
        async fn disconnect(&mut self) {
            self.steps.push(StationStep::Disconnect).unwrap();
        }

        fn configure(&mut self, ssid: &str, password: &str) -> bool {
            self.steps.push(StationStep::Configure).unwrap();
            if self.configure_ok {
                self.configured = Some((ssid.try_into().unwrap(), password.try_into().unwrap()));
            }
            self.configure_ok
        }

        async fn connect(&mut self) -> bool {
            self.steps.push(StationStep::Connect).unwrap();
            false
        }
    }

    #[test]
    fn dummy_credentials_are_stored_through_a_connect_attempt() {
        let mut station = FakeStation::new(true);
        block_on(overwrite_station_credentials(&mut station));
        assert_eq!(
            &station.steps[..],
            &[
                StationStep::Disconnect,
                StationStep::Configure,
                StationStep::Connect,
                StationStep::Disconnect,
            ]
        );
        let (ssid, password) = station.configured.unwrap();
        assert_eq!((ssid.as_str(), password.as_str()), ("0", "0"));
    }

    #[test]
    fn no_connect_attempt_when_dummy_config_is_rejected() {
        let mut station = FakeStation::new(false);
        block_on(overwrite_station_credentials(&mut station));
        assert_eq!(
            &station.steps[..],
            &[StationStep::Disconnect, StationStep::Configure]
        );
    }
}
