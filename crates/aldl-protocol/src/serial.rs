//! Serial Transport
//!
//! Blocking access to an 8192 baud ALDL interface. The bus is a single
//! wire, so every request we send is read back before the ECM answers.

use crate::error::AldlError;
use crate::mode;
use crate::packet::PacketDefinition;
use crate::request::{cmp_bytestring, generate_mode, hex_string};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tokio_serial::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, trace, warn};

/// Default ALDL bit rate
pub const DEFAULT_BAUD_RATE: u32 = 8192;

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub device: String,
    /// Bit rate
    pub baud_rate: u32,
    /// Read timeout per response in milliseconds
    pub timeout_ms: u64,
    /// Interface reads back its own transmissions
    pub echo: bool,
    /// Silence requests sent per reconnect before giving up
    pub reconnect_attempts: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: 200,
            echo: true,
            reconnect_attempts: 3,
        }
    }
}

/// ALDL transport over a serial port
pub struct SerialTransport {
    config: SerialConfig,
    device_address: u8,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Open the serial port
    pub fn open(config: SerialConfig, device_address: u8) -> Result<Self, AldlError> {
        let mut transport = Self {
            config,
            device_address,
            port: None,
        };
        transport.init()?;
        Ok(transport)
    }

    fn init(&mut self) -> Result<(), AldlError> {
        info!(
            "Opening serial port {} at {} baud",
            self.config.device, self.config.baud_rate
        );
        let port = tokio_serial::new(self.config.device.as_str(), self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .open()?;
        self.port = Some(port);
        Ok(())
    }

    #[cfg(test)]
    fn with_port(config: SerialConfig, device_address: u8, port: Box<dyn SerialPort>) -> Self {
        Self {
            config,
            device_address,
            port: Some(port),
        }
    }

    /// Close the serial port
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed serial port {}", self.config.device);
        }
    }

    /// Whether the port is open
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn exchange(&mut self, command: &[u8], length: usize) -> Result<Vec<u8>, AldlError> {
        let echo = self.config.echo;
        let address = self.device_address;
        let port = self.port.as_mut().ok_or(AldlError::NotConnected)?;
        // Drop late bytes from an earlier timed out frame
        port.clear(ClearBuffer::Input)?;
        send(&mut **port, command, echo)?;
        read_response(&mut **port, address, length)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl Transport for SerialTransport {
    fn reconnect(&mut self) -> Result<(), AldlError> {
        if !self.is_open() {
            self.init()?;
        }
        let silence = generate_mode(self.device_address, mode::SILENCE);
        let echo = self.config.echo;
        let attempts = self.config.reconnect_attempts;
        let port = self.port.as_mut().ok_or(AldlError::NotConnected)?;

        for attempt in 1..=attempts {
            port.clear(ClearBuffer::Input)?;
            if let Err(e) = send(&mut **port, &silence, echo) {
                debug!("Silence attempt {} failed: {}", attempt, e);
                continue;
            }
            // The ECM answers a mode change by repeating it
            let window = read_window(&mut **port, silence.len() * 2)?;
            if cmp_bytestring(&window, &silence).is_some() {
                info!("ECM silenced on attempt {}", attempt);
                return Ok(());
            }
            debug!("Unexpected silence reply: {}", hex_string(&window));
        }

        warn!("ECM did not acknowledge silence after {} attempts", attempts);
        Err(AldlError::Timeout)
    }

    fn request_packet(&mut self, packet: &PacketDefinition) -> Result<Vec<u8>, AldlError> {
        trace!("Requesting packet {:02X}: {}", packet.id(), hex_string(packet.command()));
        self.exchange(packet.command(), packet.length())
    }
}

fn send(port: &mut dyn SerialPort, command: &[u8], echo: bool) -> Result<(), AldlError> {
    port.write_all(command)?;
    port.flush()?;
    if echo {
        let mut readback = vec![0u8; command.len()];
        port.read_exact(&mut readback)?;
        if readback != command {
            return Err(AldlError::EchoMismatch {
                sent: hex_string(command),
                read: hex_string(&readback),
            });
        }
    }
    Ok(())
}

/// Skip line noise up to the address byte, then read the rest of the frame
fn read_response(
    port: &mut dyn SerialPort,
    address: u8,
    length: usize,
) -> Result<Vec<u8>, AldlError> {
    let mut byte = [0u8; 1];
    let mut skipped = 0;
    loop {
        port.read_exact(&mut byte)?;
        if byte[0] == address {
            break;
        }
        skipped += 1;
        if skipped > length {
            return Err(AldlError::Timeout);
        }
    }
    if skipped > 0 {
        trace!("Skipped {} bytes before header", skipped);
    }

    let mut frame = vec![0u8; length];
    frame[0] = address;
    port.read_exact(&mut frame[1..])?;
    Ok(frame)
}

/// Read whatever arrives before the port times out, up to `max` bytes
fn read_window(port: &mut dyn SerialPort, max: usize) -> Result<Vec<u8>, AldlError> {
    let mut window = vec![0u8; max];
    let mut filled = 0;
    while filled < max {
        match port.read(&mut window[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) => return Err(e.into()),
        }
    }
    window.truncate(filled);
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::generate_request;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    const ADDR: u8 = 0xF4;

    type PortResult<T> = std::result::Result<T, tokio_serial::Error>;

    /// Loopback line: writes come back as echo, followed by the queued reply
    #[derive(Default)]
    struct Line {
        input: VecDeque<u8>,
        reply: Vec<u8>,
        echo: bool,
        clears: usize,
    }

    struct FakePort(Arc<Mutex<Line>>);

    impl io::Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut line = self.0.lock();
            if line.input.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
            }
            let n = buf.len().min(line.input.len());
            for (slot, byte) in buf.iter_mut().zip(line.input.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl io::Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut line = self.0.lock();
            if line.echo {
                line.input.extend(buf.iter().copied());
            }
            let reply = std::mem::take(&mut line.reply);
            line.input.extend(reply);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialPort for FakePort {
        fn name(&self) -> Option<String> {
            Some("fake".to_string())
        }
        fn baud_rate(&self) -> PortResult<u32> {
            Ok(DEFAULT_BAUD_RATE)
        }
        fn data_bits(&self) -> PortResult<DataBits> {
            Ok(DataBits::Eight)
        }
        fn flow_control(&self) -> PortResult<FlowControl> {
            Ok(FlowControl::None)
        }
        fn parity(&self) -> PortResult<Parity> {
            Ok(Parity::None)
        }
        fn stop_bits(&self) -> PortResult<StopBits> {
            Ok(StopBits::One)
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(200)
        }
        fn set_baud_rate(&mut self, _: u32) -> PortResult<()> {
            Ok(())
        }
        fn set_data_bits(&mut self, _: DataBits) -> PortResult<()> {
            Ok(())
        }
        fn set_flow_control(&mut self, _: FlowControl) -> PortResult<()> {
            Ok(())
        }
        fn set_parity(&mut self, _: Parity) -> PortResult<()> {
            Ok(())
        }
        fn set_stop_bits(&mut self, _: StopBits) -> PortResult<()> {
            Ok(())
        }
        fn set_timeout(&mut self, _: Duration) -> PortResult<()> {
            Ok(())
        }
        fn write_request_to_send(&mut self, _: bool) -> PortResult<()> {
            Ok(())
        }
        fn write_data_terminal_ready(&mut self, _: bool) -> PortResult<()> {
            Ok(())
        }
        fn read_clear_to_send(&mut self) -> PortResult<bool> {
            Ok(true)
        }
        fn read_data_set_ready(&mut self) -> PortResult<bool> {
            Ok(true)
        }
        fn read_ring_indicator(&mut self) -> PortResult<bool> {
            Ok(false)
        }
        fn read_carrier_detect(&mut self) -> PortResult<bool> {
            Ok(true)
        }
        fn bytes_to_read(&self) -> PortResult<u32> {
            Ok(self.0.lock().input.len() as u32)
        }
        fn bytes_to_write(&self) -> PortResult<u32> {
            Ok(0)
        }
        fn clear(&self, buffer_to_clear: ClearBuffer) -> PortResult<()> {
            let mut line = self.0.lock();
            line.clears += 1;
            if !matches!(buffer_to_clear, ClearBuffer::Output) {
                line.input.clear();
            }
            Ok(())
        }
        fn try_clone(&self) -> PortResult<Box<dyn SerialPort>> {
            Ok(Box::new(FakePort(Arc::clone(&self.0))))
        }
        fn set_break(&self) -> PortResult<()> {
            Ok(())
        }
        fn clear_break(&self) -> PortResult<()> {
            Ok(())
        }
    }

    fn transport(echo: bool, stale: &[u8], reply: &[u8]) -> (SerialTransport, Arc<Mutex<Line>>) {
        let line = Arc::new(Mutex::new(Line {
            input: stale.iter().copied().collect(),
            reply: reply.to_vec(),
            echo,
            clears: 0,
        }));
        let config = SerialConfig {
            echo,
            ..SerialConfig::default()
        };
        let port = Box::new(FakePort(Arc::clone(&line)));
        (SerialTransport::with_port(config, ADDR, port), line)
    }

    #[test]
    fn test_exchange_discards_stale_input_before_echo() {
        let reply = [ADDR, 0x92, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        // Tail of an earlier frame that arrived after its read timed out
        let (mut transport, line) = transport(true, &[ADDR, 0xAA, 0xBB], &reply);

        let command = generate_request(ADDR, mode::TRANSMIT, 0x00);
        let frame = transport.exchange(&command, reply.len()).unwrap();

        assert_eq!(frame, reply);
        assert_eq!(line.lock().clears, 1);
        assert!(line.lock().input.is_empty());
    }

    #[test]
    fn test_exchange_discards_stale_frame_without_echo() {
        let reply = [ADDR, 0x92, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60];
        let stale = [ADDR, 0x92, 0xEE, 0xEE, 0xEE, 0xEE, 0xEE, 0xEE];
        let (mut transport, line) = transport(false, &stale, &reply);

        let command = generate_request(ADDR, mode::TRANSMIT, 0x00);
        let frame = transport.exchange(&command, reply.len()).unwrap();

        assert_eq!(frame, reply);
        assert_eq!(line.lock().clears, 1);
    }

    #[test]
    fn test_exchange_times_out_on_silent_line() {
        let (mut transport, line) = transport(true, &[0x55, 0x55], &[]);

        let command = generate_request(ADDR, mode::TRANSMIT, 0x00);
        assert!(matches!(transport.exchange(&command, 8), Err(AldlError::Timeout)));
        assert_eq!(line.lock().clears, 1);
    }

    #[test]
    fn test_close_releases_port() {
        let (mut transport, _line) = transport(true, &[], &[]);
        assert!(transport.is_open());
        transport.close();
        assert!(!transport.is_open());
        let command = generate_request(ADDR, mode::TRANSMIT, 0x00);
        assert!(matches!(transport.exchange(&command, 8), Err(AldlError::NotConnected)));
    }
}
