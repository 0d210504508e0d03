use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

/// Process-wide suspend/resume switch shared by every worker.
///
/// This is the Rust rendition of a broadcast condition: .NET code would
/// reach for `ManualResetEventSlim` here, where `Reset()` parks threads
/// and `Set()` releases all of them at once:
/// ```csharp
/// var gate = new ManualResetEventSlim(initialState: true);
/// gate.Reset();   // pause
/// gate.Set();     // resume, wakes every waiter
/// ```
/// In Rust the same shape falls out of `Mutex<bool>` + `Condvar` with
/// `notify_all`. The atomic flag in front is only a fast path so the
/// per-line check in the scan loop costs one relaxed-ish load while
/// running; the mutex-guarded flag is the source of truth for waiting.
/// Waiters re-check that flag after acquiring the lock, so a resume that
/// races with a worker registering to wait cannot be missed.
#[derive(Debug, Default)]
pub struct PauseController {
    paused: AtomicBool,
    state: Mutex<bool>,
    resumed: Condvar,
}

impl PauseController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pauses or resumes the run. Idempotent: redundant transitions are
    /// no-ops. Resuming releases all currently blocked waiters at once.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = paused;
        if !paused {
            self.resumed.notify_all();
        }
    }

    /// Returns immediately when not paused; otherwise blocks the calling
    /// thread until the next resume broadcast. True blocking, no polling.
    pub fn wait_if_paused(&self) {
        if !self.paused.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while *state {
            state = self
                .resumed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}
