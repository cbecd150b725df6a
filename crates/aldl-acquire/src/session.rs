//! Acquisition Session
//!
//! Everything the producer and its consumers share: the packet table
//! template, connection state, statistics and the record history.

use crate::connection::{ConnectionMonitor, ConnectionState};
use crate::error::AcquireError;
use crate::stats::{Statistics, StatsAggregator};
use aldl_protocol::{CommConfig, CommDefinition};
use record_buffer::{Cursor, RecordBuffer, RecordHandle, RetentionPolicy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared state of one acquisition
pub struct Session {
    definition: CommDefinition,
    connection: ConnectionMonitor,
    stats: StatsAggregator,
    records: RecordBuffer,
    producer: AtomicBool,
}

impl Session {
    /// Create a session for a validated definition
    pub fn new(
        definition: CommDefinition,
        retention: RetentionPolicy,
    ) -> Result<Arc<Self>, AcquireError> {
        let records = RecordBuffer::new(retention)?;
        info!(
            "Session created: {} packets, device {:02X}",
            definition.n_packets(),
            definition.device_address()
        );
        Ok(Arc::new(Self {
            definition,
            connection: ConnectionMonitor::new(),
            stats: StatsAggregator::new(),
            records,
            producer: AtomicBool::new(false),
        }))
    }

    /// Validate `config` and create a session for it
    pub fn from_config(
        config: CommConfig,
        retention: RetentionPolicy,
    ) -> Result<Arc<Self>, AcquireError> {
        Self::new(CommDefinition::new(config)?, retention)
    }

    /// Packet table as configured; live packet buffers belong to the loop
    pub fn definition(&self) -> &CommDefinition {
        &self.definition
    }

    /// Position of the packet called `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.definition.index_of(name)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.get()
    }

    /// Change the connection state, returning the previous one
    ///
    /// Readers blocked on a connected-only wait re-check their condition.
    pub fn set_connection_state(&self, state: ConnectionState) -> ConnectionState {
        let previous = self.connection.set(state);
        if previous != state {
            self.records.wake_all();
        }
        previous
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Consistent copy of the statistics
    pub fn statistics(&self) -> Statistics {
        self.stats.snapshot()
    }

    pub(crate) fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    /// Record history
    pub fn records(&self) -> &RecordBuffer {
        &self.records
    }

    pub fn oldest(&self) -> Option<RecordHandle> {
        self.records.oldest()
    }

    pub fn newest(&self) -> Option<RecordHandle> {
        self.records.newest()
    }

    pub fn next(&self, after: u64) -> Option<RecordHandle> {
        self.records.next(after)
    }

    /// Newest record, waiting while the link stays connected
    pub fn newest_blocking(&self) -> Option<RecordHandle> {
        self.records.newest_blocking_while(|| self.is_connected())
    }

    /// Record after `after`, waiting while the link stays connected
    pub fn next_blocking(&self, after: u64) -> Option<RecordHandle> {
        self.records.next_blocking_while(after, || self.is_connected())
    }

    pub fn newest_blocking_forever(&self) -> RecordHandle {
        self.records.newest_blocking_forever()
    }

    pub fn next_blocking_forever(&self, after: u64) -> RecordHandle {
        self.records.next_blocking_forever(after)
    }

    /// Register a consumer cursor on the history
    pub fn cursor(&self) -> Cursor {
        self.records.cursor()
    }

    /// Advance `cursor`, waiting while the link stays connected
    pub fn read_next(&self, cursor: &mut Cursor) -> Option<RecordHandle> {
        cursor.next_blocking_while(|| self.is_connected())
    }

    /// Block until the link is connected
    pub fn pause_until_connected(&self) {
        self.connection.wait_for(ConnectionState::Connected);
    }

    /// Block until `count` records are held, capped at the retention bound
    pub fn pause_until_buffered(&self, count: usize) {
        self.records.wait_until_buffered(count, || true);
    }

    pub(crate) fn attach_producer(&self) -> Result<(), AcquireError> {
        self.producer
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| AcquireError::ProducerAttached)
    }

    pub(crate) fn detach_producer(&self) {
        self.producer.store(false, Ordering::Release);
    }

    /// Whether an acquisition loop is feeding this session
    pub fn has_producer(&self) -> bool {
        self.producer.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("packets", &self.definition.n_packets())
            .field("state", &self.connection_state())
            .field("records", &self.records)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aldl_protocol::PacketConfig;
    use record_buffer::PacketSnapshot;
    use std::thread;
    use std::time::Duration;

    fn session() -> Arc<Session> {
        Session::from_config(
            CommConfig {
                packets: vec![
                    PacketConfig::new("main", 0x00, 8),
                    PacketConfig::new("aux", 0x01, 5),
                ],
                ..Default::default()
            },
            RetentionPolicy::default(),
        )
        .unwrap()
    }

    fn snapshot() -> Vec<PacketSnapshot> {
        vec![PacketSnapshot::default(); 2]
    }

    #[test]
    fn test_index_of() {
        let session = session();
        assert_eq!(session.index_of("aux"), Some(1));
        assert_eq!(session.index_of("missing"), None);
    }

    #[test]
    fn test_invalid_definition_rejected() {
        let result = Session::from_config(
            CommConfig {
                packets: vec![],
                ..Default::default()
            },
            RetentionPolicy::default(),
        );
        assert!(matches!(result, Err(AcquireError::Definition(_))));
    }

    #[test]
    fn test_invalid_retention_rejected() {
        let result = Session::from_config(CommConfig::default(), RetentionPolicy::count(0));
        assert!(matches!(result, Err(AcquireError::Buffer(_))));
    }

    #[test]
    fn test_blocking_read_returns_when_not_connected() {
        let session = session();
        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        assert!(session.newest_blocking().is_none());
        assert!(session.next_blocking(0).is_none());
    }

    #[test]
    fn test_blocking_read_returns_available_record_regardless_of_state() {
        let session = session();
        session.records().append(snapshot());
        assert!(session.newest_blocking().is_some());
    }

    #[test]
    fn test_blocking_read_wakes_on_append() {
        let session = session();
        session.set_connection_state(ConnectionState::Connected);
        let first = session.records().append(snapshot()).sequence;

        let reader = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.next_blocking(first))
        };
        thread::sleep(Duration::from_millis(20));
        session.records().append(snapshot());

        let record = reader.join().unwrap().unwrap();
        assert_eq!(record.sequence, first + 1);
    }

    #[test]
    fn test_blocking_read_interrupted_by_desync() {
        let session = session();
        session.set_connection_state(ConnectionState::Connected);
        let first = session.records().append(snapshot()).sequence;

        let reader = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.next_blocking(first))
        };
        thread::sleep(Duration::from_millis(20));
        session.set_connection_state(ConnectionState::Desync);

        assert!(reader.join().unwrap().is_none());
    }

    #[test]
    fn test_forever_read_survives_desync() {
        let session = session();
        session.set_connection_state(ConnectionState::Connected);
        let first = session.records().append(snapshot()).sequence;

        let reader = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.next_blocking_forever(first))
        };
        thread::sleep(Duration::from_millis(20));
        session.set_connection_state(ConnectionState::Desync);
        thread::sleep(Duration::from_millis(20));
        session.records().append(snapshot());

        assert_eq!(reader.join().unwrap().sequence, first + 1);
    }

    #[test]
    fn test_pause_until_connected() {
        let session = session();
        let waiter = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                session.pause_until_connected();
                session.connection_state()
            })
        };
        thread::sleep(Duration::from_millis(20));
        session.set_connection_state(ConnectionState::Connected);
        assert_eq!(waiter.join().unwrap(), ConnectionState::Connected);
    }

    #[test]
    fn test_pause_until_buffered() {
        let session = session();
        let waiter = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                session.pause_until_buffered(3);
                session.records().len()
            })
        };
        for _ in 0..3 {
            thread::sleep(Duration::from_millis(5));
            session.records().append(snapshot());
        }
        assert!(waiter.join().unwrap() >= 3);
    }

    #[test]
    fn test_read_next_with_cursor() {
        let session = session();
        session.set_connection_state(ConnectionState::Connected);
        let mut cursor = session.cursor();
        session.records().append(snapshot());
        session.records().append(snapshot());

        assert_eq!(session.read_next(&mut cursor).unwrap().sequence, 1);
        session.set_connection_state(ConnectionState::Desync);
        assert!(session.read_next(&mut cursor).is_none());
    }

    #[test]
    fn test_single_producer() {
        let session = session();
        session.attach_producer().unwrap();
        assert!(matches!(
            session.attach_producer(),
            Err(AcquireError::ProducerAttached)
        ));
        session.detach_producer();
        assert!(session.attach_producer().is_ok());
    }
}
