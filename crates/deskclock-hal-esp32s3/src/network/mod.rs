//! Station connectivity shared between the WiFi future, the radio event
//! handler and the main loop.

use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use deskclock_core::{config::WifiQuirks, render::NetworkLabel};

/// High-level connectivity state for display + logs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ConnectivityState {
    Disconnected = 0,
    Connecting = 1,
    LinkUpNoIp = 2,
    Connected = 3,
}

impl ConnectivityState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::LinkUpNoIp,
            3 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// Immutable connectivity snapshot for renderer and board loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectivitySnapshot {
    pub state: ConnectivityState,
    pub ipv4: Option<[u8; 4]>,
    /// Last station disconnect reason reported by the driver.
    pub last_disconnect: Option<u8>,
}

impl ConnectivitySnapshot {
    pub const fn is_connected(self) -> bool {
        matches!(self.state, ConnectivityState::Connected)
    }

    /// Bottom line of the clock face.
    pub fn network_label(self) -> NetworkLabel {
        match (self.state, self.ipv4) {
            (ConnectivityState::Connected, Some(octets)) => NetworkLabel::Address(octets),
            _ => NetworkLabel::Disconnected,
        }
    }
}

/// Lock-free shared connectivity status.
#[derive(Debug)]
pub struct ConnectivityHandle {
    state: AtomicU8,
    ipv4: AtomicU32,
    last_disconnect: AtomicU8,
    /// Bumped by the event handler; lets the WiFi future notice drops
    /// between two polls.
    disconnects: AtomicU32,
}

impl ConnectivityHandle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectivityState::Disconnected as u8),
            ipv4: AtomicU32::new(0),
            last_disconnect: AtomicU8::new(0),
            disconnects: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> ConnectivitySnapshot {
        let ipv4 = self.ipv4.load(Ordering::Acquire);
        let last_disconnect = self.last_disconnect.load(Ordering::Acquire);
        ConnectivitySnapshot {
            state: ConnectivityState::from_raw(self.state.load(Ordering::Acquire)),
            ipv4: (ipv4 != 0).then(|| ipv4.to_be_bytes()),
            last_disconnect: (last_disconnect != 0).then_some(last_disconnect),
        }
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnects.load(Ordering::Acquire)
    }

    pub fn mark_connecting(&self) {
        self.store(ConnectivityState::Connecting, None);
    }

    pub fn mark_link_up(&self) {
        self.state
            .store(ConnectivityState::LinkUpNoIp as u8, Ordering::Release);
    }

    pub fn mark_connected(&self, ipv4: [u8; 4]) {
        self.store(ConnectivityState::Connected, Some(ipv4));
    }

    pub fn mark_disconnected(&self) {
        self.store(ConnectivityState::Disconnected, None);
    }

    /// Called from the radio event handler with the driver's reason code.
    ///
    /// Returns `true` when `quirks` asks for the deep-sleep workaround.
    pub fn record_disconnect(&self, reason: u8, quirks: &WifiQuirks) -> bool {
        self.last_disconnect.store(reason, Ordering::Release);
        self.disconnects.fetch_add(1, Ordering::AcqRel);
        self.mark_disconnected();
        quirks.requires_sleep(reason)
    }

    fn store(&self, state: ConnectivityState, ipv4: Option<[u8; 4]>) {
        self.ipv4
            .store(ipv4.map_or(0, u32::from_be_bytes), Ordering::Release);
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Default for ConnectivityHandle {
    fn default() -> Self {
        Self::new()
    }
}
