use std::collections::BTreeMap;
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use crate::seq::SequenceCounter;

/// Result from [ReorderBuffer::process]
#[derive(Debug, PartialEq)]
pub enum Arrival<T> {
    /// The message was next in sequence. Contains it followed by every buffered message it released, in order.
    Accepted(Vec<T>),
    /// The message arrived ahead of the expected sequence and is held
    Buffered,
    /// The message has already been accepted
    Duplicate,
}

struct Pending<T> {
    timestamp: Option<u64>,
    arrived: Instant,
    message: T,
}

/// Holds messages that arrive ahead of the expected sequence number and releases them in order.
///
/// A gap that does not fill within the recovery timeout is reported through [ReorderBuffer::take_expired]
/// which also resets the buffer.
pub struct ReorderBuffer<T> {
    expected: SequenceCounter,
    pending: BTreeMap<u8, Pending<T>>,
    last_progress: Instant,
    /// messages accepted since the last reset, capped at half the sequence space
    accepted: u8,
}

impl<T> ReorderBuffer<T> {
    pub fn new(now: Instant) -> Self {
        Self {
            expected: SequenceCounter::new(),
            pending: BTreeMap::new(),
            last_progress: now,
            accepted: 0,
        }
    }

    /// The next sequence number that will be accepted
    pub fn expected(&self) -> u8 {
        self.expected.current()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True if `seq` trails the cursor within the run of messages accepted since the last reset,
    /// looking back at most half the sequence space
    fn is_behind(&self, seq: u8) -> bool {
        let behind = self.expected.current().wrapping_sub(seq);
        (1..=self.accepted).contains(&behind)
    }

    fn record_accepted(&mut self) {
        self.accepted = self.accepted.saturating_add(1).min(128);
    }

    pub fn process(
        &mut self,
        seq: u8,
        timestamp: Option<u64>,
        message: T,
        now: Instant,
    ) -> Arrival<T> {
        if self.expected.validate(seq) {
            self.last_progress = now;
            self.record_accepted();
            let mut accepted = vec![message];
            while let Some(pending) = self.pending.remove(&self.expected.current()) {
                self.expected.next();
                self.record_accepted();
                accepted.push(pending.message);
            }
            return Arrival::Accepted(accepted);
        }

        if self.is_behind(seq) {
            debug!(
                "Ignoring duplicate message. seq = {seq}, expected = {}",
                self.expected.current()
            );
            return Arrival::Duplicate;
        }

        if self.pending.is_empty() {
            self.last_progress = now;
        }
        debug!(
            "Buffering out of order message. seq = {seq}, expected = {}",
            self.expected.current()
        );
        self.pending.insert(
            seq,
            Pending {
                timestamp,
                arrived: now,
                message,
            },
        );
        Arrival::Buffered
    }

    /// Discard everything and expect sequence 0
    pub fn reset(&mut self, now: Instant) {
        self.pending.clear();
        self.expected.reset();
        self.last_progress = now;
        self.accepted = 0;
    }

    /// Restart the sequence for a new birth.
    ///
    /// Held messages timestamped before the birth belong to the previous session and are dropped.
    pub fn restart(&mut self, birth_timestamp: u64, now: Instant) {
        self.expected.reset();
        self.last_progress = now;
        self.accepted = 0;
        self.prune_before(birth_timestamp);
    }

    /// Remove held messages with a timestamp older than `timestamp`. Returns how many were removed.
    pub fn prune_before(&mut self, timestamp: u64) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, pending| pending.timestamp.is_some_and(|ts| ts >= timestamp));
        before - self.pending.len()
    }

    /// If a gap has persisted for longer than `timeout`, remove and return the oldest held message
    /// then reset the buffer.
    pub fn take_expired(&mut self, now: Instant, timeout: Duration) -> Option<T> {
        if self.pending.is_empty() || now.saturating_duration_since(self.last_progress) < timeout {
            return None;
        }
        let key = self
            .pending
            .iter()
            .min_by_key(|(_, pending)| pending.arrived)
            .map(|(key, _)| *key)?;
        let expired = self.pending.remove(&key).map(|pending| pending.message);
        self.reset(now);
        expired
    }
}
