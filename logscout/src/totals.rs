use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::events::TotalsSnapshot;

/// Shared run counters, mutated by workers and read by the aggregator.
///
/// Everything here is a plain atomic fetch-and-add; the aggregator only
/// loads, so no lock is ever shared between a worker and the snapshot
/// path. Individual loads are not taken under a common lock, which means
/// a periodic snapshot may mix counter values from slightly different
/// instants. That is fine for progress display; the final snapshot is
/// taken after every worker has been joined and is exact.
#[derive(Debug, Default)]
pub struct ScanTotals {
    files_done: AtomicUsize,
    lines_total: AtomicU64,
    matches_total: AtomicU64,
    seq: AtomicU64,
    // Held across seq allocation + bus send so sequence numbers arrive on
    // the event bus in allocation order. See `scanner::FileScanner`.
    seq_order: Mutex<()>,
}

impl ScanTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a completed file's counts into the run totals. Only called
    /// for files that finished cleanly; failed files contribute nothing.
    pub fn fold_completed(&self, lines: u64, matches: u64) {
        self.lines_total.fetch_add(lines, Ordering::Relaxed);
        self.matches_total.fetch_add(matches, Ordering::Relaxed);
    }

    /// Records one file reaching a terminal state, successful or not.
    pub fn record_file_done(&self) {
        self.files_done.fetch_add(1, Ordering::Relaxed);
    }

    /// Allocates the next match sequence number. Values start at 1.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Guard serializing seq allocation with event emission.
    pub(crate) fn seq_order(&self) -> &Mutex<()> {
        &self.seq_order
    }

    /// Current counter values as an event payload.
    pub fn snapshot(&self, files_total: usize, done: bool) -> TotalsSnapshot {
        TotalsSnapshot {
            files_total,
            files_done: self.files_done.load(Ordering::Relaxed),
            lines_total: self.lines_total.load(Ordering::Relaxed),
            matches_total: self.matches_total.load(Ordering::Relaxed),
            done,
            err: None,
        }
    }
}
