use std::fmt;
use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::transport::RingTransport;

/// Counters accumulated over the lifetime of a [`CmdRing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    /// Number of non-empty batches handed to the transport.
    pub flushes: u64,
    /// Total words across all flushed batches.
    pub words_flushed: u64,
}

/// A fixed-capacity, append-only command buffer.
///
/// Producers check space with [`require_space`](CmdRing::require_space),
/// append words with [`emit`](CmdRing::emit), and hand the accumulated batch
/// to the execution unit with [`flush`](CmdRing::flush), which resets the
/// write offset to zero. [`save_state`](CmdRing::save_state) /
/// [`reset_to_saved`](CmdRing::reset_to_saved) allow speculative emission:
/// a caller that discovers mid-emission that the batch cannot accommodate it
/// rolls back to the save point, leaving no partial packet behind.
///
/// Appending past the reservation the caller checked for is a contract
/// violation, not a runtime error: the ring panics rather than silently
/// growing or wrapping.
pub struct CmdRing {
    words: Vec<u32>,
    capacity: usize,
    saved: Option<usize>,
    no_wrap: u32,
    stats: RingStats,
}

impl CmdRing {
    /// Create a ring that holds at most `capacity` words per batch.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            words: Vec::with_capacity(capacity),
            capacity,
            saved: None,
            no_wrap: 0,
            stats: RingStats::default(),
        }
    }

    /// Total capacity in words.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Words emitted since the last flush.
    pub fn used(&self) -> usize {
        self.words.len()
    }

    /// Words still available in the current batch.
    pub fn remaining(&self) -> usize {
        self.capacity - self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn stats(&self) -> RingStats {
        self.stats
    }

    /// The words accumulated so far, in emission order.
    pub fn pending(&self) -> &[u32] {
        &self.words
    }

    /// Returns true if `words` more words fit in the current batch.
    ///
    /// This never flushes on its own; deciding what to do when the batch is
    /// full belongs to the caller (see the submission controller in
    /// `mica-gpu`).
    #[must_use]
    pub fn require_space(&self, words: usize) -> bool {
        words <= self.remaining()
    }

    /// Append one word.
    pub fn emit(&mut self, word: u32) {
        assert!(
            self.words.len() < self.capacity,
            "emit past ring capacity ({} words); caller skipped require_space",
            self.capacity
        );
        self.words.push(word);
    }

    /// Append a run of words.
    pub fn emit_all(&mut self, words: &[u32]) {
        assert!(
            self.require_space(words.len()),
            "emit of {} words past ring capacity ({} used of {})",
            words.len(),
            self.used(),
            self.capacity
        );
        self.words.extend_from_slice(words);
    }

    /// Record the current write offset as a rollback point.
    ///
    /// A subsequent [`reset_to_saved`](CmdRing::reset_to_saved) discards
    /// everything emitted after this call. Flushing clears the save point.
    pub fn save_state(&mut self) {
        self.saved = Some(self.words.len());
    }

    /// Roll the write offset back to the last save point.
    ///
    /// Panics if no save point is set. The offset never moves forward.
    pub fn reset_to_saved(&mut self) {
        let saved = self
            .saved
            .expect("reset_to_saved without a prior save_state");
        debug_assert!(saved <= self.words.len());
        self.words.truncate(saved);
    }

    /// Enter a no-wrap section: while the returned guard is live, the ring
    /// cannot be flushed, so a multi-packet emission (state setup plus the
    /// primitive that consumes it) is guaranteed to land in one batch.
    pub fn begin_no_wrap(&mut self) -> NoWrapSection<'_> {
        self.no_wrap += 1;
        NoWrapSection { ring: self }
    }

    /// Hand the accumulated batch to `transport` and reset the ring.
    ///
    /// An empty ring is a no-op. The save point does not survive a flush:
    /// offsets recorded against the old batch are meaningless in the new one.
    pub fn flush<T: RingTransport + ?Sized>(&mut self, transport: &mut T) {
        assert!(
            self.no_wrap == 0,
            "flush inside a no-wrap section would split an atomic packet group"
        );
        self.saved = None;
        if self.words.is_empty() {
            return;
        }
        debug!(words = self.words.len(), "flushing command batch");
        self.stats.flushes += 1;
        self.stats.words_flushed += self.words.len() as u64;
        transport.submit_batch(&self.words);
        self.words.clear();
    }
}

impl fmt::Debug for CmdRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmdRing")
            .field("used", &self.used())
            .field("capacity", &self.capacity)
            .field("saved", &self.saved)
            .field("no_wrap", &self.no_wrap)
            .finish()
    }
}

/// RAII guard for an atomic emission section. See
/// [`CmdRing::begin_no_wrap`].
pub struct NoWrapSection<'a> {
    ring: &'a mut CmdRing,
}

impl Deref for NoWrapSection<'_> {
    type Target = CmdRing;

    fn deref(&self) -> &CmdRing {
        self.ring
    }
}

impl DerefMut for NoWrapSection<'_> {
    fn deref_mut(&mut self) -> &mut CmdRing {
        self.ring
    }
}

impl Drop for NoWrapSection<'_> {
    fn drop(&mut self) {
        self.ring.no_wrap -= 1;
    }
}
