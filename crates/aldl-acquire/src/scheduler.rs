//! Frequency Scheduler
//!
//! Each packet has its own divider. A packet with frequency N is due on
//! every Nth pass over the table; frequency 0 disables it.

/// Per-packet polling dividers
#[derive(Debug, Clone)]
pub struct FrequencyScheduler {
    counters: Vec<u32>,
}

impl FrequencyScheduler {
    /// Create dividers for `n_packets` packets, all counters at 1
    pub fn new(n_packets: usize) -> Self {
        Self {
            counters: vec![1; n_packets],
        }
    }

    /// Decide whether packet `index` is due on this pass
    ///
    /// Called once per packet per pass; advances that packet's counter.
    pub fn is_due(&mut self, index: usize, frequency: u32) -> bool {
        if frequency == 0 {
            return false;
        }
        let counter = &mut self.counters[index];
        if *counter < frequency {
            *counter += 1;
            false
        } else {
            *counter = 1;
            true
        }
    }

    /// Current counter for packet `index`
    pub fn counter(&self, index: usize) -> u32 {
        self.counters[index]
    }
}
