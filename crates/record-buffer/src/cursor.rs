//! Consumer Cursors

use crate::buffer::{RecordBuffer, RecordHandle};

/// A consumer's position in the record history
///
/// The buffer tracks every live cursor so that, when its policy respects
/// cursors, records a consumer has not read yet are not trimmed. Dropping
/// the cursor releases that hold.
#[derive(Debug)]
pub struct Cursor {
    id: u64,
    buffer: RecordBuffer,
    position: Option<u64>,
}

impl Cursor {
    pub(crate) fn new(id: u64, buffer: RecordBuffer) -> Self {
        Self {
            id,
            buffer,
            position: None,
        }
    }

    /// Sequence of the last record returned, if any
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    /// Last record returned, if it is still held
    pub fn current(&self) -> Option<RecordHandle> {
        self.buffer.get(self.position?)
    }

    /// Move to `sequence` so the next read returns the record after it
    pub fn seek(&mut self, sequence: u64) {
        self.move_to(Some(sequence));
    }

    /// Next unread record without waiting
    ///
    /// A fresh cursor starts at the newest record.
    pub fn try_next(&mut self) -> Option<RecordHandle> {
        let record = match self.position {
            Some(p) => self.buffer.next(p),
            None => self.buffer.newest(),
        }?;
        self.move_to(Some(record.sequence));
        Some(record)
    }

    /// Next unread record, waiting while `keep_waiting` holds
    pub fn next_blocking_while<F>(&mut self, keep_waiting: F) -> Option<RecordHandle>
    where
        F: Fn() -> bool,
    {
        let record = match self.position {
            Some(p) => self.buffer.next_blocking_while(p, keep_waiting),
            None => self.buffer.newest_blocking_while(keep_waiting),
        }?;
        self.move_to(Some(record.sequence));
        Some(record)
    }

    /// Next unread record, waiting as long as it takes
    pub fn next_blocking_forever(&mut self) -> RecordHandle {
        let record = match self.position {
            Some(p) => self.buffer.next_blocking_forever(p),
            None => self.buffer.newest_blocking_forever(),
        };
        self.move_to(Some(record.sequence));
        record
    }

    fn move_to(&mut self, position: Option<u64>) {
        self.position = position;
        self.buffer.set_cursor(self.id, position);
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.buffer.release_cursor(self.id);
    }
}
