//! Boot, connectivity and time lifecycle of the clock.

use core::fmt::Debug;

use log::{error, info};

/// Where the device is between power-on and a correct local-time display.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    Boot,
    BootComplete,
    HasNetworkTime,
    HasTimeZone,
    NoTimeZone,
}

impl LifecycleState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::BootComplete => "boot_complete",
            Self::HasNetworkTime => "has_network_time",
            Self::HasTimeZone => "has_time_zone",
            Self::NoTimeZone => "no_time_zone",
        }
    }

    /// True once a network time base exists.
    pub const fn has_network_time(self) -> bool {
        matches!(
            self,
            Self::HasNetworkTime | Self::HasTimeZone | Self::NoTimeZone
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// Runtime facts the transition function consults.
pub trait LifecycleChecks {
    type ZoneError: Debug;

    fn network_time_synced(&mut self) -> bool;
    fn apply_zone(&mut self) -> Result<(), Self::ZoneError>;
}

#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            state: LifecycleState::Boot,
        }
    }

    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// `Boot -> BootComplete`. Only the first call has an effect.
    pub fn finish_boot(&mut self) -> bool {
        if self.state != LifecycleState::Boot {
            return false;
        }
        self.move_to(LifecycleState::BootComplete).is_some()
    }

    /// One evaluation of the transition function, run once per loop iteration.
    pub fn evaluate<C: LifecycleChecks>(&mut self, checks: &mut C) -> Option<Transition> {
        match self.state {
            LifecycleState::BootComplete => {
                if checks.network_time_synced() {
                    info!("network time available");
                    self.move_to(LifecycleState::HasNetworkTime)
                } else {
                    None
                }
            }
            LifecycleState::HasNetworkTime => match checks.apply_zone() {
                Ok(()) => self.move_to(LifecycleState::HasTimeZone),
                Err(err) => {
                    error!("time zone apply failed: {:?}", err);
                    self.move_to(LifecycleState::NoTimeZone)
                }
            },
            LifecycleState::Boot | LifecycleState::HasTimeZone | LifecycleState::NoTimeZone => {
                None
            }
        }
    }

    /// Forced re-entry after a new zone name was accepted.
    ///
    /// Before network time exists there is nothing to re-apply; the new name is
    /// used when `HasNetworkTime` is reached normally.
    pub fn invalidate_zone(&mut self) -> Option<Transition> {
        if !self.state.has_network_time() {
            return None;
        }
        self.move_to(LifecycleState::HasNetworkTime)
    }

    fn move_to(&mut self, next: LifecycleState) -> Option<Transition> {
        if self.state == next {
            return None;
        }
        let transition = Transition {
            from: self.state,
            to: next,
        };
        info!(
            "lifecycle {} -> {}",
            transition.from.as_str(),
            transition.to.as_str()
        );
        self.state = next;
        Some(transition)
    }
}
