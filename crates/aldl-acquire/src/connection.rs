//! Connection State Machine

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Link health as seen by the acquisition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not yet connected; the first due packet triggers a reconnect
    Connecting,
    /// Exchanging packets
    Connected,
    /// Too many consecutive failures; the next due packet triggers a reconnect
    Desync,
}

impl ConnectionState {
    /// Human readable description
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Desync => "Lost Sync",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Connecting
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current connection state with a wait-for-change facility
#[derive(Debug, Default)]
pub struct ConnectionMonitor {
    state: Mutex<ConnectionState>,
    changed: Condvar,
}

impl ConnectionMonitor {
    /// Create a monitor in the `Connecting` state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn get(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Set the state, returning the previous one
    pub fn set(&self, next: ConnectionState) -> ConnectionState {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut *state, next);
        drop(state);

        if previous != next {
            match next {
                ConnectionState::Desync => warn!("Connection state {} -> {}", previous, next),
                _ => info!("Connection state {} -> {}", previous, next),
            }
            self.changed.notify_all();
        }
        previous
    }

    /// Block until the state is `target`
    pub fn wait_for(&self, target: ConnectionState) {
        let mut state = self.state.lock();
        while *state != target {
            self.changed.wait(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_initial_state() {
        assert_eq!(ConnectionMonitor::new().get(), ConnectionState::Connecting);
    }

    #[test]
    fn test_set_returns_previous() {
        let monitor = ConnectionMonitor::new();
        assert_eq!(monitor.set(ConnectionState::Connected), ConnectionState::Connecting);
        assert_eq!(monitor.set(ConnectionState::Desync), ConnectionState::Connected);
        assert_eq!(monitor.get(), ConnectionState::Desync);
    }

    #[test]
    fn test_wait_for_connected() {
        let monitor = Arc::new(ConnectionMonitor::new());
        let waiter = {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || monitor.wait_for(ConnectionState::Connected))
        };
        thread::sleep(Duration::from_millis(20));
        monitor.set(ConnectionState::Connected);
        waiter.join().unwrap();
    }

    #[test]
    fn test_state_strings() {
        assert_eq!(ConnectionState::Desync.to_string(), "Lost Sync");
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
    }
}
