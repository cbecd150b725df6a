//! Record Buffer Implementation

use crate::cursor::Cursor;
use crate::policy::RetentionPolicy;
use crate::{BufferError, PacketSnapshot, Record};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// Shared, immutable handle to an appended record
pub type RecordHandle = Arc<Record>;

struct BufferState {
    /// Contiguous run of sequence numbers, oldest first
    records: VecDeque<RecordHandle>,
    next_sequence: u64,
    /// Last sequence seen by each live cursor
    cursors: HashMap<u64, Option<u64>>,
    next_cursor_id: u64,
}

impl BufferState {
    fn get(&self, sequence: u64) -> Option<&RecordHandle> {
        let first = self.records.front()?.sequence;
        let offset = sequence.checked_sub(first)?;
        self.records.get(usize::try_from(offset).ok()?)
    }

    /// First record with a sequence greater than `after`
    fn after(&self, after: u64) -> Option<&RecordHandle> {
        let first = self.records.front()?.sequence;
        if after < first {
            // Trimmed past the caller; resume at the oldest we still hold
            return self.records.front();
        }
        self.get(after + 1)
    }

    fn pinned_from(&self) -> Option<u64> {
        self.cursors.values().flatten().min().copied()
    }

    fn trim(&mut self, policy: &RetentionPolicy) -> usize {
        let pin = if policy.respect_cursors {
            self.pinned_from()
        } else {
            None
        };
        let newest_ts = match self.records.back() {
            Some(r) => r.timestamp_ms,
            None => return 0,
        };

        let mut removed = 0;
        while self.records.len() > 1 {
            let Some(front) = self.records.front() else {
                break;
            };
            let over_count = self.records.len() > policy.max_records;
            let over_age = policy
                .max_age_ms
                .is_some_and(|age| newest_ts.saturating_sub(front.timestamp_ms) > age);
            if !over_count && !over_age {
                break;
            }
            if pin.is_some_and(|p| front.sequence >= p) {
                break;
            }
            self.records.pop_front();
            removed += 1;
        }
        removed
    }
}

struct Shared {
    state: Mutex<BufferState>,
    changed: Condvar,
    policy: RetentionPolicy,
}

/// Append-only history of records
///
/// One producer appends; any number of threads read. Clones share the
/// same history.
#[derive(Clone)]
pub struct RecordBuffer {
    shared: Arc<Shared>,
}

impl RecordBuffer {
    /// Create an empty buffer
    pub fn new(policy: RetentionPolicy) -> Result<Self, BufferError> {
        policy.validate()?;
        Ok(Self::from_policy(policy))
    }

    /// Create a buffer with the default policy
    pub fn with_default_policy() -> Self {
        Self::from_policy(RetentionPolicy::default())
    }

    fn from_policy(policy: RetentionPolicy) -> Self {
        debug!("Record buffer created with {:?}", policy);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BufferState {
                    records: VecDeque::new(),
                    next_sequence: 0,
                    cursors: HashMap::new(),
                    next_cursor_id: 0,
                }),
                changed: Condvar::new(),
                policy,
            }),
        }
    }

    /// Retention policy in effect
    pub fn policy(&self) -> &RetentionPolicy {
        &self.shared.policy
    }

    /// Append a snapshot stamped with the current time
    pub fn append(&self, packets: Vec<PacketSnapshot>) -> RecordHandle {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.append_at(packets, now)
    }

    /// Append a snapshot with an explicit timestamp
    pub fn append_at(&self, packets: Vec<PacketSnapshot>, timestamp_ms: u64) -> RecordHandle {
        let mut state = self.shared.state.lock();
        let record = Arc::new(Record {
            sequence: state.next_sequence,
            timestamp_ms,
            packets,
        });
        state.next_sequence += 1;
        state.records.push_back(Arc::clone(&record));

        let removed = state.trim(&self.shared.policy);
        if removed > 0 {
            trace!("Trimmed {} records", removed);
        }
        drop(state);

        self.shared.changed.notify_all();
        record
    }

    /// Oldest record still held
    pub fn oldest(&self) -> Option<RecordHandle> {
        self.shared.state.lock().records.front().cloned()
    }

    /// Newest record
    pub fn newest(&self) -> Option<RecordHandle> {
        self.shared.state.lock().records.back().cloned()
    }

    /// Record following sequence `after`, if one has been appended
    ///
    /// If `after` has been trimmed away, the oldest held record is returned;
    /// the result never has a sequence at or below `after`.
    pub fn next(&self, after: u64) -> Option<RecordHandle> {
        self.shared.state.lock().after(after).cloned()
    }

    /// Record with exactly this sequence number
    pub fn get(&self, sequence: u64) -> Option<RecordHandle> {
        self.shared.state.lock().get(sequence).cloned()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.shared.state.lock().records.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total records ever appended
    pub fn total_appended(&self) -> u64 {
        self.shared.state.lock().next_sequence
    }

    /// Newest record, waiting for the first one while `keep_waiting` holds
    pub fn newest_blocking_while<F>(&self, keep_waiting: F) -> Option<RecordHandle>
    where
        F: Fn() -> bool,
    {
        self.wait_until(|s| s.records.back().cloned(), keep_waiting)
    }

    /// Newest record, waiting as long as it takes
    pub fn newest_blocking_forever(&self) -> RecordHandle {
        loop {
            if let Some(r) = self.newest_blocking_while(|| true) {
                return r;
            }
        }
    }

    /// Record after `after`, waiting for it while `keep_waiting` holds
    pub fn next_blocking_while<F>(&self, after: u64, keep_waiting: F) -> Option<RecordHandle>
    where
        F: Fn() -> bool,
    {
        self.wait_until(|s| s.after(after).cloned(), keep_waiting)
    }

    /// Record after `after`, waiting as long as it takes
    pub fn next_blocking_forever(&self, after: u64) -> RecordHandle {
        loop {
            if let Some(r) = self.next_blocking_while(after, || true) {
                return r;
            }
        }
    }

    /// Wait until at least `count` records are held; `false` if interrupted
    pub fn wait_until_buffered<F>(&self, count: usize, keep_waiting: F) -> bool
    where
        F: Fn() -> bool,
    {
        let count = count.min(self.shared.policy.max_records);
        self.wait_until(|s| (s.records.len() >= count).then_some(()), keep_waiting)
            .is_some()
    }

    /// Wake every blocked reader so it re-checks its wait condition
    pub fn wake_all(&self) {
        // Taking the lock orders this wakeup after any in-progress check
        let _state = self.shared.state.lock();
        self.shared.changed.notify_all();
    }

    /// Register a new consumer cursor
    pub fn cursor(&self) -> Cursor {
        let mut state = self.shared.state.lock();
        let id = state.next_cursor_id;
        state.next_cursor_id += 1;
        state.cursors.insert(id, None);
        drop(state);
        Cursor::new(id, self.clone())
    }

    /// Number of live cursors
    pub fn cursor_count(&self) -> usize {
        self.shared.state.lock().cursors.len()
    }

    pub(crate) fn set_cursor(&self, id: u64, position: Option<u64>) {
        let mut state = self.shared.state.lock();
        if let Some(slot) = state.cursors.get_mut(&id) {
            *slot = position;
        }
    }

    pub(crate) fn release_cursor(&self, id: u64) {
        self.shared.state.lock().cursors.remove(&id);
    }

    fn wait_until<T, G, F>(&self, mut ready: G, keep_waiting: F) -> Option<T>
    where
        G: FnMut(&BufferState) -> Option<T>,
        F: Fn() -> bool,
    {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(found) = ready(&state) {
                return Some(found);
            }
            if !keep_waiting() {
                return None;
            }
            self.shared.changed.wait(&mut state);
        }
    }
}

impl std::fmt::Debug for RecordBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("RecordBuffer")
            .field("len", &state.records.len())
            .field("next_sequence", &state.next_sequence)
            .field("cursors", &state.cursors.len())
            .finish()
    }
}
