//! Acquisition Loop
//!
//! The single producer. Walks the packet table forever, asks the scheduler
//! which packets are due, exchanges them over the transport, validates the
//! responses and publishes snapshots of every packet buffer to the session's
//! record history.

use crate::config::{AcquireConfig, SnapshotCadence};
use crate::connection::ConnectionState;
use crate::error::AcquireError;
use crate::observer::{AcquisitionObserver, FailureKind, FnObserver, PacketEvent, PacketOutcome};
use crate::scheduler::FrequencyScheduler;
use crate::session::Session;
use crate::stats::Throughput;
use aldl_protocol::{CommDefinition, Transport};
use packet_validator::{PacketValidator, ValidationConfig, ValidationError};
use record_buffer::PacketSnapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// What one call to [`AcquisitionLoop::step`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Packet was not due; no I/O
    Skipped { index: usize },
    /// Packet was exchanged
    Polled {
        index: usize,
        outcome: PacketOutcome,
        /// This exchange was an immediate retry of a failed one
        retried: bool,
    },
}

/// Producer driving one transport into one session
pub struct AcquisitionLoop<T: Transport> {
    session: Arc<Session>,
    transport: T,
    config: AcquireConfig,
    /// Working copy of the packet table; the loop owns every data buffer
    packets: CommDefinition,
    validator: PacketValidator,
    scheduler: FrequencyScheduler,
    observers: Vec<Box<dyn AcquisitionObserver>>,
    throughput: Option<Throughput>,
    next_index: usize,
    retry_pending: bool,
    polled_this_pass: usize,
    polled_since_record: u32,
    passes: u64,
}

impl<T: Transport> AcquisitionLoop<T> {
    /// Attach a producer to `session`
    ///
    /// Fails if another loop is already feeding the session.
    pub fn new(
        session: Arc<Session>,
        transport: T,
        config: AcquireConfig,
    ) -> Result<Self, AcquireError> {
        session.attach_producer()?;

        let packets = session.definition().clone();
        let validator = PacketValidator::new(ValidationConfig {
            device_address: packets.device_address(),
            check_header: config.check_header,
            verify_checksum: packets.checksum_enable(),
        });
        let scheduler = FrequencyScheduler::new(packets.n_packets());
        let throughput = config
            .track_throughput
            .then(|| Throughput::new(Duration::from_millis(config.throughput_window_ms)));

        Ok(Self {
            session,
            transport,
            config,
            packets,
            validator,
            scheduler,
            observers: Vec::new(),
            throughput,
            next_index: 0,
            retry_pending: false,
            polled_this_pass: 0,
            polled_since_record: 0,
            passes: 0,
        })
    }

    /// Register an observer called after every processed packet
    pub fn add_observer<O>(&mut self, observer: O)
    where
        O: AcquisitionObserver + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Register a closure called after every processed packet
    pub fn add_observer_fn<F>(&mut self, f: F)
    where
        F: FnMut(&PacketEvent<'_>) + Send + 'static,
    {
        self.add_observer(FnObserver(f));
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Completed passes over the packet table
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Live packet table, including the latest received bytes
    pub fn packets(&self) -> &CommDefinition {
        &self.packets
    }

    /// Process the packet at the current position
    pub fn step(&mut self) -> StepOutcome {
        let index = self.next_index;
        let retried = self.retry_pending;

        if retried {
            self.retry_pending = false;
        } else {
            let frequency = self.packets.packets()[index].frequency();
            if !self.scheduler.is_due(index, frequency) {
                self.advance();
                return StepOutcome::Skipped { index };
            }
        }

        if !self.session.is_connected() {
            self.reconnect();
        }

        let outcome = self.exchange(index);
        self.polled_this_pass += 1;
        self.polled_since_record += 1;

        match outcome {
            PacketOutcome::Ok => self.on_success(index),
            PacketOutcome::Failed(kind) => self.on_failure(index, kind),
        }

        if let Some(throughput) = self.throughput.as_mut() {
            throughput.tick(self.session.stats());
        }

        if let SnapshotCadence::EveryPackets(n) = self.config.snapshot {
            if self.polled_since_record >= n.max(1) {
                self.publish_record();
            }
        }

        self.notify(index, outcome);

        if !self.retry_pending {
            self.advance();
        }

        StepOutcome::Polled {
            index,
            outcome,
            retried,
        }
    }

    /// Run until `stop` is set
    pub fn run(&mut self, stop: &AtomicBool) {
        info!(
            "Acquisition started: {} packets, disconnect after {} failures",
            self.packets.n_packets(),
            self.config.max_fail_disconnect
        );

        let mut idle = 0usize;
        while !stop.load(Ordering::Acquire) {
            match self.step() {
                StepOutcome::Skipped { .. } => idle += 1,
                StepOutcome::Polled { .. } => idle = 0,
            }
            // Every packet disabled or waiting on its divider
            if idle > self.packets.n_packets() {
                thread::sleep(Duration::from_millis(10));
                idle = 0;
            }
        }

        info!("Acquisition stopped after {} passes", self.passes);
    }

    /// Run until `count` more passes have completed
    pub fn run_passes(&mut self, count: u64) {
        let target = self.passes + count;
        while self.passes < target {
            self.step();
        }
    }

    /// Move the loop onto its own thread
    pub fn spawn(self) -> Result<AcquisitionHandle, AcquireError>
    where
        T: 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("aldl-acquire".to_string())
            .spawn(move || {
                let mut acquisition = self;
                acquisition.run(&flag);
            })?;

        Ok(AcquisitionHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn reconnect(&mut self) {
        match self.transport.reconnect() {
            Ok(()) => debug!("Transport reconnected"),
            // Carry on regardless; a dead link shows up as a new failure streak
            Err(e) => warn!("Reconnect failed: {}", e),
        }
        self.session.stats().record_reconnect();
        self.session.set_connection_state(ConnectionState::Connected);
    }

    fn exchange(&mut self, index: usize) -> PacketOutcome {
        let stats = self.session.stats();
        let response = match self.transport.request_packet(&self.packets.packets()[index]) {
            Ok(bytes) => bytes,
            Err(e) => {
                trace!("Packet {} request failed: {}", index, e);
                stats.record_timeout();
                return PacketOutcome::Failed(FailureKind::TransportTimeout);
            }
        };

        let packet = &mut self.packets.packets_mut()[index];
        if response.len() < packet.length() {
            // A short read is a missing response; the old buffer stays as it was
            trace!(
                "Packet {}: short response, {} of {} bytes",
                index,
                response.len(),
                packet.length()
            );
            stats.record_timeout();
            return PacketOutcome::Failed(FailureKind::TransportTimeout);
        }
        packet.store(&response);

        match self.validator.validate(&response, packet.length()) {
            Ok(()) => PacketOutcome::Ok,
            Err(e @ ValidationError::HeaderMismatch { .. }) => {
                trace!("Packet {}: {}", index, e);
                stats.record_header_fail();
                PacketOutcome::Failed(FailureKind::HeaderMismatch)
            }
            Err(e) => {
                trace!("Packet {}: {}", index, e);
                stats.record_checksum_fail();
                PacketOutcome::Failed(FailureKind::ChecksumMismatch)
            }
        }
    }

    fn on_success(&mut self, index: usize) {
        self.packets.packets_mut()[index].set_clean(true);
        self.session.stats().record_success();
        if let Some(throughput) = self.throughput.as_mut() {
            throughput.count();
        }
    }

    fn on_failure(&mut self, index: usize, kind: FailureKind) {
        let packet = &mut self.packets.packets_mut()[index];
        packet.set_clean(false);
        let retry = packet.retry();

        let streak = self.session.stats().record_failure();
        debug!(
            "Packet {} ({}) failed: {}, streak {}",
            index,
            packet.name(),
            kind.as_str(),
            streak
        );

        if streak > self.config.max_fail_disconnect && self.session.is_connected() {
            warn!(
                "{} consecutive failures, limit {}",
                streak, self.config.max_fail_disconnect
            );
            self.session.set_connection_state(ConnectionState::Desync);
        }

        self.retry_pending = retry;
    }

    fn advance(&mut self) {
        self.next_index += 1;
        if self.next_index < self.packets.n_packets() {
            return;
        }
        self.next_index = 0;
        self.passes += 1;
        if self.config.snapshot == SnapshotCadence::PerPass && self.polled_this_pass > 0 {
            self.publish_record();
        }
        self.polled_this_pass = 0;
    }

    fn publish_record(&mut self) {
        let snapshot = self
            .packets
            .packets()
            .iter()
            .map(|p| PacketSnapshot {
                data: p.data().to_vec(),
                clean: p.is_clean(),
            })
            .collect();
        let record = self.session.records().append(snapshot);
        self.polled_since_record = 0;
        trace!("Published record {}", record.sequence);
    }

    fn notify(&mut self, index: usize, outcome: PacketOutcome) {
        if self.observers.is_empty() {
            return;
        }
        let event = PacketEvent {
            index,
            packet: &self.packets.packets()[index],
            outcome,
            retry_pending: self.retry_pending,
            state: self.session.connection_state(),
            session: &self.session,
        };
        for observer in self.observers.iter_mut() {
            observer.on_packet(&event);
        }
    }
}

impl<T: Transport> Drop for AcquisitionLoop<T> {
    fn drop(&mut self) {
        self.session.detach_producer();
    }
}

/// Control over a spawned acquisition thread
#[derive(Debug)]
pub struct AcquisitionHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AcquisitionHandle {
    /// Ask the loop to stop after its current packet and wait for it
    pub fn stop(mut self) -> Result<(), AcquireError> {
        self.stop.store(true, Ordering::Release);
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| AcquireError::Panicked),
            None => Ok(()),
        }
    }

    /// Whether the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}
