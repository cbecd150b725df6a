//! Mock Transport
//!
//! Simulated ECM for tests and bench runs without hardware. Clones share
//! state, so a test can keep one handle while the acquisition loop owns
//! another.

use crate::error::AldlError;
use crate::packet::PacketDefinition;
use crate::transport::Transport;
use packet_validator::{calc_msglength, checksum_generate};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Scripted outcome of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Well-formed response
    Valid,
    /// Well-formed response with one payload byte flipped
    Corrupt,
    /// Well-formed response from the wrong address
    BadHeader,
    /// No response
    Timeout,
    /// Exactly these bytes
    Raw(Vec<u8>),
}

#[derive(Debug, Default)]
struct MockState {
    scripts: HashMap<u8, VecDeque<MockReply>>,
    requests: Vec<u8>,
    reconnects: usize,
    failing_reconnects: usize,
    counter: u8,
}

/// In-memory transport answering every request from a script
#[derive(Debug, Clone)]
pub struct MockTransport {
    device_address: u8,
    latency: Option<Duration>,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a mock ECM at `device_address` that answers every request validly
    pub fn new(device_address: u8) -> Self {
        Self {
            device_address,
            latency: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Sleep this long on every request, like a real 8192 baud exchange
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue replies for `packet_id`; once exhausted the packet answers validly
    pub fn script(&self, packet_id: u8, replies: impl IntoIterator<Item = MockReply>) {
        self.state
            .lock()
            .scripts
            .entry(packet_id)
            .or_default()
            .extend(replies);
    }

    /// Make the next `count` reconnects fail
    pub fn fail_reconnects(&self, count: usize) {
        self.state.lock().failing_reconnects = count;
    }

    /// Packet ids requested so far, in order
    pub fn requests(&self) -> Vec<u8> {
        self.state.lock().requests.clone()
    }

    /// Number of reconnects performed
    pub fn reconnects(&self) -> usize {
        self.state.lock().reconnects
    }

    /// Build a valid response frame of `length` bytes
    pub fn frame(address: u8, length: usize, fill: u8) -> Vec<u8> {
        let mut frame = vec![fill; length];
        frame[0] = address;
        if length > 2 {
            frame[1] = calc_msglength((length - 3) as u8);
        }
        let last = length - 1;
        frame[last] = checksum_generate(&frame[..last]);
        frame
    }
}

impl Transport for MockTransport {
    fn reconnect(&mut self) -> Result<(), AldlError> {
        let mut state = self.state.lock();
        state.reconnects += 1;
        if state.failing_reconnects > 0 {
            state.failing_reconnects -= 1;
            debug!("Mock reconnect failing");
            return Err(AldlError::Timeout);
        }
        Ok(())
    }

    fn request_packet(&mut self, packet: &PacketDefinition) -> Result<Vec<u8>, AldlError> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        let mut state = self.state.lock();
        state.requests.push(packet.id());
        state.counter = state.counter.wrapping_add(1);
        let fill = state.counter;
        let reply = state
            .scripts
            .get_mut(&packet.id())
            .and_then(|q| q.pop_front())
            .unwrap_or(MockReply::Valid);
        drop(state);

        let address = self.device_address;
        let length = packet.length();
        match reply {
            MockReply::Valid => Ok(Self::frame(address, length, fill)),
            MockReply::Corrupt => {
                let mut frame = Self::frame(address, length, fill);
                frame[1] ^= 0x01;
                Ok(frame)
            }
            MockReply::BadHeader => Ok(Self::frame(address.wrapping_add(1), length, fill)),
            MockReply::Timeout => Err(AldlError::Timeout),
            MockReply::Raw(bytes) => Ok(bytes),
        }
    }
}
