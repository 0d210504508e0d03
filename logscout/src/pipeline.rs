/// This module wires the concurrent scanning pipeline together: a
/// dispatcher feeding a bounded job queue, a fixed pool of scan workers,
/// a completion-waiter, and a snapshot aggregator, all multiplexing onto
/// one outbound event bus.
///
/// # .NET vs Rust Pipelines
///
/// In .NET this shape is usually built from `System.Threading.Channels`:
/// ```csharp
/// var jobs = Channel.CreateBounded<string>(capacity);
/// var events = Channel.CreateBounded<ScanEvent>(256);
/// var workers = Enumerable.Range(0, concurrency)
///     .Select(_ => Task.Run(() => WorkerLoop(jobs.Reader, events.Writer)));
/// await Task.WhenAll(workers);
/// events.Writer.Complete();
/// ```
/// The Rust version uses `crossbeam-channel` the same way: bounded MPMC
/// channels for the job queue and the event bus, OS threads instead of
/// tasks, and channel closure (every sender dropped) instead of
/// `Writer.Complete()`. The borrow checker enforces what the .NET version
/// leaves to convention: workers cannot touch each other's file state,
/// because the only shared values are `Arc`ed atomics and channel handles.
///
/// Backpressure is part of the contract, not an accident: every producer
/// blocks on a full event bus, so a slow consumer throttles the scan
/// instead of the process buffering matches without bound.
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver};
use tracing::{debug, info};

use crate::events::{FileUpdate, ScanEvent, TotalsSnapshot};
use crate::notify::Notifier;
use crate::pattern::LinePattern;
use crate::pause::PauseController;
use crate::scanner::FileScanner;
use crate::totals::ScanTotals;

// Event bus depth. Producers block once the consumer falls this far
// behind.
const EVENT_BUS_CAPACITY: usize = 256;

/// Everything the pipeline needs to run.
///
/// `files` must already be deduplicated and sorted (see
/// [`crate::discover::expand_patterns`]); the pipeline takes the list as
/// given and emits exactly one `Wait` and one terminal update per entry.
pub struct ScanOptions {
    pub files: Vec<PathBuf>,
    pub pattern: LinePattern,
    /// Worker count; non-positive values are coerced to 1.
    pub concurrency: usize,
    /// Period between totals snapshots.
    pub tick_interval: Duration,
    /// Longest line the scanner will buffer, in bytes.
    pub max_line_len: usize,
    pub notifier: Option<Arc<dyn Notifier>>,
}

/// Control handle for a running scan.
///
/// The display layer keeps this next to the event receiver: events flow
/// out of the receiver, pause/resume commands flow in through here.
pub struct ScanHandle {
    pause: Arc<PauseController>,
    aggregator: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    /// Pauses or resumes every in-flight worker. Takes effect within one
    /// line of each file currently being scanned.
    pub fn set_paused(&self, paused: bool) {
        self.pause.set_paused(paused);
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// A shared handle to the pause switch, for control-input threads.
    pub fn pause_controller(&self) -> Arc<PauseController> {
        Arc::clone(&self.pause)
    }

    /// Waits for the pipeline to shut down. The event bus is closed by
    /// then; call this after draining the receiver.
    pub fn join(mut self) {
        if let Some(handle) = self.aggregator.take() {
            let _ = handle.join();
        }
    }
}

/// Starts the scanning pipeline and returns the event stream plus its
/// control handle.
///
/// The receiver yields: an initial `Totals` snapshot, one `Wait` and one
/// terminal `FileUpdate` per file, a `MatchLine` per matching line in
/// global sequence order, periodic `Totals` snapshots, and a final
/// `Totals` with `done = true`, after which the channel closes.
pub fn start(options: ScanOptions) -> (Receiver<ScanEvent>, ScanHandle) {
    let ScanOptions {
        files,
        pattern,
        concurrency,
        tick_interval,
        max_line_len,
        notifier,
    } = options;

    let workers = concurrency.max(1);
    let files_total = files.len();
    info!(
        "Starting scan: {} file(s), {} worker(s), pattern '{}'",
        files_total,
        workers,
        pattern.as_str()
    );

    let (bus_tx, bus_rx) = bounded(EVENT_BUS_CAPACITY);
    let pause = Arc::new(PauseController::new());
    let totals = Arc::new(ScanTotals::new());

    // The consumer sees the zeroed snapshot before any other event.
    let _ = bus_tx.send(ScanEvent::Totals(TotalsSnapshot::initial(files_total)));

    // Rendezvous queue: the dispatcher hands each path directly to a
    // worker, so a paused pool stops the dispatcher too.
    let (job_tx, job_rx) = bounded::<PathBuf>(0);

    let scanner = FileScanner::new(
        pattern,
        bus_tx.clone(),
        Arc::clone(&pause),
        Arc::clone(&totals),
        notifier,
        max_line_len,
    );

    let mut worker_handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let job_rx = job_rx.clone();
        let scanner = scanner.clone();
        let bus = bus_tx.clone();
        let pause = Arc::clone(&pause);
        let totals = Arc::clone(&totals);
        worker_handles.push(thread::spawn(move || {
            for path in job_rx.iter() {
                pause.wait_if_paused();

                let update = match scanner.scan_file(&path) {
                    Ok(stats) => {
                        totals.fold_completed(stats.lines, stats.matches);
                        FileUpdate::done(path, stats.lines, stats.matches)
                    }
                    Err(failure) => {
                        debug!("Scan of {} failed: {}", path.display(), failure.error);
                        FileUpdate::failed(
                            path,
                            failure.stats.lines,
                            failure.stats.matches,
                            failure.error.to_string(),
                        )
                    }
                };
                let _ = bus.send(ScanEvent::File(update));
                totals.record_file_done();
            }
        }));
    }
    // Workers hold their own clones; these must go so the queue and bus
    // can actually close.
    drop(job_rx);
    drop(scanner);

    // Dispatcher: a file's Wait event is on the bus before its job can
    // reach any worker. Closes the job queue after the last path.
    let dispatcher = {
        let bus = bus_tx.clone();
        thread::spawn(move || {
            for path in files {
                let _ = bus.send(ScanEvent::File(FileUpdate::queued(path.clone())));
                if job_tx.send(path).is_err() {
                    break;
                }
            }
        })
    };

    // Completion-waiter: the done signal is the channel closing, sent only
    // after every producer thread has returned.
    let (done_tx, done_rx) = bounded::<()>(1);
    let waiter = thread::spawn(move || {
        let _ = dispatcher.join();
        for handle in worker_handles {
            let _ = handle.join();
        }
        drop(done_tx);
    });

    // Aggregator: periodic snapshots from the shared atomics, then exactly
    // one final snapshot with done = true. It owns the last bus sender, so
    // the bus closes immediately after the final snapshot.
    let aggregator = {
        let totals = Arc::clone(&totals);
        thread::spawn(move || {
            let ticker = tick(tick_interval);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        let _ = bus_tx.send(ScanEvent::Totals(totals.snapshot(files_total, false)));
                    }
                    recv(done_rx) -> _ => {
                        let snapshot = totals.snapshot(files_total, true);
                        info!(
                            "Scan complete: {}/{} files, {} lines, {} matches",
                            snapshot.files_done,
                            snapshot.files_total,
                            snapshot.lines_total,
                            snapshot.matches_total
                        );
                        let _ = bus_tx.send(ScanEvent::Totals(snapshot));
                        break;
                    }
                }
            }
            let _ = waiter.join();
        })
    };

    (
        bus_rx,
        ScanHandle {
            pause,
            aggregator: Some(aggregator),
        },
    )
}
