//! ALDL Datalogger
//!
//! Wires the acquisition engine to a serial port (or the simulated ECM),
//! streams every record to stdout and logs statistics until Ctrl-C.

mod output;
mod settings;

pub use output::format_record;
pub use settings::{LoggerConfig, OutputFormat, DEFAULT_CONFIG_NAME};

use aldl_acquire::{AcquireError, AcquisitionLoop, ConnectionState, PacketEvent, Session};
use aldl_protocol::{AldlError, MockTransport, SerialTransport, Transport};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Logger errors
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Transport error: {0}")]
    Transport(#[from] AldlError),
    #[error("Acquisition error: {0}")]
    Acquire(#[from] AcquireError),
    #[error("Logging setup failed: {0}")]
    Logging(String),
    #[error("Metrics setup failed: {0}")]
    Metrics(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Initialize logging
pub fn init_logging(level: &str) -> Result<(), LoggerError> {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggerError::Logging(e.to_string()))
}

/// Install the Prometheus exporter on `addr`
pub fn init_metrics(addr: &str) -> Result<(), LoggerError> {
    let socket: SocketAddr = addr
        .parse()
        .map_err(|e| LoggerError::Metrics(format!("{}: {}", addr, e)))?;
    PrometheusBuilder::new()
        .with_http_listener(socket)
        .install()
        .map_err(|e| LoggerError::Metrics(e.to_string()))?;
    info!("Prometheus exporter listening on {}", socket);
    Ok(())
}

/// Open the configured transport
pub fn open_transport(
    config: &LoggerConfig,
    device_address: u8,
) -> Result<Box<dyn Transport>, LoggerError> {
    if config.mock {
        info!("Using simulated ECM at {:02X}", device_address);
        let latency = Duration::from_millis(config.mock_latency_ms);
        return Ok(Box::new(MockTransport::new(device_address).with_latency(latency)));
    }
    let serial = SerialTransport::open(config.serial.clone(), device_address)?;
    Ok(Box::new(serial))
}

fn connection_gauge(event: &PacketEvent<'_>) {
    let connected = event.state == ConnectionState::Connected;
    metrics::gauge!("aldl_connected").set(if connected { 1.0 } else { 0.0 });
}

fn log_statistics(session: &Session) {
    let stats = session.statistics();
    info!(
        "{} | ok {} | timeouts {} | header {} | checksum {} | {:.1} pkt/s | {} records",
        session.connection_state(),
        stats.packets_ok,
        stats.packet_recv_timeout,
        stats.packet_header_fail,
        stats.packet_checksum_fail,
        stats.packets_per_second,
        session.records().total_appended()
    );
}

/// Print every record as it arrives, pausing through disconnects
fn consume(session: Arc<Session>, format: OutputFormat) {
    let mut cursor = session.cursor();
    let stdout = io::stdout();
    loop {
        let Some(record) = session.read_next(&mut cursor) else {
            session.pause_until_connected();
            continue;
        };
        let line = format_record(&record, session.definition(), format);
        if let Err(e) = writeln!(stdout.lock(), "{}", line) {
            warn!("Stopping output: {}", e);
            return;
        }
    }
}

/// Run the logger until Ctrl-C
pub async fn run(config: LoggerConfig) -> Result<(), LoggerError> {
    if let Some(addr) = config.metrics_addr.as_deref() {
        init_metrics(addr)?;
    }

    let session = Session::from_config(config.comm.clone(), config.retention.clone())?;
    let transport = open_transport(&config, session.definition().device_address())?;
    let mut acquisition =
        AcquisitionLoop::new(Arc::clone(&session), transport, config.acquire.clone())?;
    acquisition.add_observer_fn(connection_gauge);
    let handle = acquisition.spawn()?;

    // Detached: blocked on stdout or the buffer, it goes down with the process
    {
        let session = Arc::clone(&session);
        let format = config.output;
        thread::Builder::new()
            .name("aldl-output".to_string())
            .spawn(move || consume(session, format))?;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(Duration::from_secs(config.stats_interval_secs.max(1)));
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = ticker.tick() => log_statistics(&session),
        }
    }

    info!("Shutting down");
    tokio::task::spawn_blocking(move || handle.stop())
        .await
        .map_err(|_| AcquireError::Panicked)??;
    log_statistics(&session);
    Ok(())
}
