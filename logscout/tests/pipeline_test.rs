use anyhow::Result;
use logscout::events::{FileStatus, FileUpdate, MatchLine, ScanEvent, TotalsSnapshot};
use logscout::notify::Notifier;
use logscout::pattern::LinePattern;
use logscout::pipeline::{start, ScanOptions};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

/// Writes a log file with `lines` lines, of which every line whose index
/// appears in `matching` contains the ERROR marker.
fn write_log(dir: &Path, name: &str, lines: usize, matching: &[usize]) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut file = File::create(&path)?;
    for i in 0..lines {
        if matching.contains(&i) {
            writeln!(file, "ERROR {} line {}", name, i)?;
        } else {
            writeln!(file, "INFO {} line {}", name, i)?;
        }
    }
    Ok(path)
}

fn run_to_completion(options: ScanOptions) -> Vec<ScanEvent> {
    let (rx, handle) = start(options);
    let events: Vec<ScanEvent> = rx.iter().collect();
    handle.join();
    events
}

fn options(files: Vec<PathBuf>, concurrency: usize) -> ScanOptions {
    ScanOptions {
        files,
        pattern: LinePattern::compile("ERROR").unwrap(),
        concurrency,
        tick_interval: Duration::from_millis(50),
        max_line_len: 1024 * 1024,
        notifier: None,
    }
}

fn terminal_updates(events: &[ScanEvent]) -> Vec<&FileUpdate> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::File(u) if u.is_terminal() => Some(u),
            _ => None,
        })
        .collect()
}

fn match_lines(events: &[ScanEvent]) -> Vec<&MatchLine> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Match(m) => Some(m),
            _ => None,
        })
        .collect()
}

fn final_totals(events: &[ScanEvent]) -> &TotalsSnapshot {
    match events.last() {
        Some(ScanEvent::Totals(snap)) if snap.done => snap,
        other => panic!("expected final totals as last event, got {other:?}"),
    }
}

#[test]
fn test_three_files_scenario() -> Result<()> {
    let dir = tempdir()?;
    let a = write_log(dir.path(), "a.log", 40, &(0..10).collect::<Vec<_>>())?;
    let b = write_log(dir.path(), "b.log", 25, &[])?;
    let c = write_log(dir.path(), "c.log", 30, &[3, 7, 11, 15, 19])?;

    let events = run_to_completion(options(vec![a.clone(), b.clone(), c.clone()], 2));

    let totals = final_totals(&events);
    assert_eq!(totals.files_total, 3);
    assert_eq!(totals.files_done, 3);
    assert_eq!(totals.matches_total, 15);
    assert_eq!(totals.lines_total, 95);
    assert!(totals.err.is_none());

    // Exactly 15 matches numbered 1..=15, observed in sequence order.
    let matches = match_lines(&events);
    assert_eq!(matches.len(), 15);
    let seqs: Vec<u64> = matches.iter().map(|m| m.seq).collect();
    assert_eq!(seqs, (1..=15).collect::<Vec<u64>>());

    // Within each file, matches appear in the order they occur in the file.
    for path in [&a, &c] {
        let own: Vec<&str> = matches
            .iter()
            .filter(|m| &m.path == path)
            .map(|m| m.line.as_str())
            .collect();
        let mut sorted = own.clone();
        sorted.sort_by_key(|line| {
            line.rsplit(' ')
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(usize::MAX)
        });
        assert_eq!(own, sorted, "matches of {path:?} out of file order");
    }
    assert!(matches.iter().all(|m| m.path != b));

    Ok(())
}

#[test]
fn test_every_file_gets_one_wait_and_one_terminal() -> Result<()> {
    let dir = tempdir()?;
    let mut files = Vec::new();
    for i in 0..12 {
        files.push(write_log(dir.path(), &format!("f{i}.log"), 20, &[0, 5])?);
    }

    let events = run_to_completion(options(files.clone(), 4));

    let mut waits: HashMap<PathBuf, usize> = HashMap::new();
    let mut terminals: HashMap<PathBuf, usize> = HashMap::new();
    for event in &events {
        if let ScanEvent::File(update) = event {
            let counter = if update.is_terminal() {
                &mut terminals
            } else {
                &mut waits
            };
            *counter.entry(update.path.clone()).or_default() += 1;
        }
    }

    assert_eq!(terminals.len(), files.len());
    for file in &files {
        assert_eq!(waits.get(file), Some(&1), "wait count for {file:?}");
        assert_eq!(terminals.get(file), Some(&1), "terminal count for {file:?}");
    }
    assert_eq!(final_totals(&events).files_done, files.len());

    Ok(())
}

#[test]
fn test_seq_strictly_increasing_for_any_worker_count() -> Result<()> {
    let dir = tempdir()?;
    let mut files = Vec::new();
    for i in 0..8 {
        let matching: Vec<usize> = (0..200).step_by(4).collect();
        files.push(write_log(dir.path(), &format!("f{i}.log"), 200, &matching)?);
    }
    let expected = 8 * 50;

    for concurrency in [1, 2, 8] {
        let events = run_to_completion(options(files.clone(), concurrency));
        let seqs: Vec<u64> = match_lines(&events).iter().map(|m| m.seq).collect();
        assert_eq!(seqs.len(), expected);
        assert!(
            seqs.windows(2).all(|w| w[0] < w[1]),
            "seq not strictly increasing at concurrency {concurrency}"
        );
        assert_eq!(seqs.first(), Some(&1));
        assert_eq!(seqs.last(), Some(&(expected as u64)));
    }

    Ok(())
}

#[test]
fn test_done_matches_sum_equals_final_totals() -> Result<()> {
    let dir = tempdir()?;
    let files = vec![
        write_log(dir.path(), "a.log", 50, &[1, 2, 3])?,
        write_log(dir.path(), "b.log", 60, &(0..60).collect::<Vec<_>>())?,
        write_log(dir.path(), "c.log", 10, &[])?,
        write_log(dir.path(), "d.log", 35, &[34])?,
    ];

    let events = run_to_completion(options(files, 3));

    let done_updates: Vec<&FileUpdate> = terminal_updates(&events)
        .into_iter()
        .filter(|u| u.status == FileStatus::Done)
        .collect();
    let matches_sum: u64 = done_updates.iter().map(|u| u.matches).sum();
    let lines_sum: u64 = done_updates.iter().map(|u| u.lines).sum();

    let totals = final_totals(&events);
    assert_eq!(matches_sum, totals.matches_total);
    assert_eq!(lines_sum, totals.lines_total);
    assert_eq!(matches_sum, 3 + 60 + 0 + 1);

    Ok(())
}

#[test]
fn test_unreadable_file_fails_alone() -> Result<()> {
    let dir = tempdir()?;
    let good_a = write_log(dir.path(), "a.log", 20, &[0, 1])?;
    let good_b = write_log(dir.path(), "b.log", 20, &[5])?;
    // A directory opens but cannot be read line by line, which is the
    // mid-scan failure path regardless of the user the tests run as.
    let bad = dir.path().join("actually_a_dir.log");
    std::fs::create_dir(&bad)?;

    let events = run_to_completion(options(vec![good_a, good_b, bad.clone()], 2));

    let terminals = terminal_updates(&events);
    assert_eq!(terminals.len(), 3);

    let failed: Vec<&&FileUpdate> = terminals
        .iter()
        .filter(|u| u.status == FileStatus::Fail)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].path, bad);
    assert!(failed[0].err.is_some());

    let totals = final_totals(&events);
    assert_eq!(totals.files_done, 3);
    assert_eq!(totals.matches_total, 3);
    assert_eq!(totals.lines_total, 40);

    Ok(())
}

#[test]
fn test_oversize_line_partial_counts_not_folded_into_totals() -> Result<()> {
    let dir = tempdir()?;
    let good = write_log(dir.path(), "good.log", 30, &[2, 4])?;

    let bad = dir.path().join("bad.log");
    let mut file = File::create(&bad)?;
    writeln!(file, "ERROR counted before the failure")?;
    writeln!(file, "INFO also counted")?;
    writeln!(file, "{}", "x".repeat(4096))?;
    writeln!(file, "ERROR never seen")?;
    drop(file);

    let mut opts = options(vec![good, bad.clone()], 2);
    opts.max_line_len = 256;
    let events = run_to_completion(opts);

    let terminals = terminal_updates(&events);
    let bad_update = terminals
        .iter()
        .find(|u| u.path == bad)
        .expect("terminal event for failed file");
    assert_eq!(bad_update.status, FileStatus::Fail);
    assert_eq!(bad_update.lines, 2);
    assert_eq!(bad_update.matches, 1);
    assert!(bad_update
        .err
        .as_deref()
        .is_some_and(|e| e.contains("maximum buffered length")));

    // Only the clean file contributes to the run totals.
    let totals = final_totals(&events);
    assert_eq!(totals.files_done, 2);
    assert_eq!(totals.lines_total, 30);
    assert_eq!(totals.matches_total, 2);

    Ok(())
}

#[test]
fn test_totals_are_monotonic_and_done_exactly_once() -> Result<()> {
    let dir = tempdir()?;
    let mut files = Vec::new();
    for i in 0..6 {
        let matching: Vec<usize> = (0..2000).step_by(50).collect();
        files.push(write_log(dir.path(), &format!("f{i}.log"), 2000, &matching)?);
    }

    let mut opts = options(files, 2);
    opts.tick_interval = Duration::from_millis(10);
    let events = run_to_completion(opts);

    let snapshots: Vec<&TotalsSnapshot> = events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Totals(snap) => Some(snap),
            _ => None,
        })
        .collect();
    assert!(snapshots.len() >= 2, "expected initial + final snapshots");

    let mut prev_done = 0;
    let mut prev_lines = 0;
    for snap in &snapshots {
        assert!(snap.files_done <= snap.files_total);
        assert!(snap.files_done >= prev_done, "files_done went backwards");
        assert!(snap.lines_total >= prev_lines, "lines_total went backwards");
        prev_done = snap.files_done;
        prev_lines = snap.lines_total;
    }

    assert_eq!(snapshots.iter().filter(|s| s.done).count(), 1);
    assert!(snapshots.last().is_some_and(|s| s.done));
    // Nothing follows the final snapshot.
    assert!(matches!(
        events.last(),
        Some(ScanEvent::Totals(snap)) if snap.done
    ));

    Ok(())
}

#[test]
fn test_pause_suspends_scanning_and_resume_completes() -> Result<()> {
    let dir = tempdir()?;
    let mut files = Vec::new();
    for i in 0..2 {
        let matching: Vec<usize> = (0..50_000).step_by(1000).collect();
        files.push(write_log(
            dir.path(),
            &format!("big{i}.log"),
            50_000,
            &matching,
        )?);
    }

    let (rx, handle) = start(options(files, 2));
    handle.set_paused(true);
    assert!(handle.is_paused());

    // Let every worker reach the pause gate, then swallow whatever was
    // emitted before it took effect.
    std::thread::sleep(Duration::from_millis(300));
    let mut events: Vec<ScanEvent> = rx.try_iter().collect();

    // While paused, only totals snapshots may arrive. If the run was fast
    // enough to finish before the pause landed the channel is already
    // closed, which the loop treats as the end of the observation window.
    let window_end = std::time::Instant::now() + Duration::from_millis(300);
    loop {
        let now = std::time::Instant::now();
        if now >= window_end {
            break;
        }
        match rx.recv_timeout(window_end - now) {
            Ok(event) => {
                assert!(
                    matches!(event, ScanEvent::Totals(_)),
                    "non-totals event while paused: {event:?}"
                );
                events.push(event);
            }
            Err(_) => break,
        }
    }

    // Redundant transitions must not wedge anything.
    handle.set_paused(true);
    handle.set_paused(false);
    handle.set_paused(false);

    events.extend(rx.iter());
    handle.join();

    let totals = final_totals(&events);
    assert_eq!(totals.files_done, 2);
    assert_eq!(totals.lines_total, 100_000);
    assert_eq!(totals.matches_total, 100);
    assert_eq!(match_lines(&events).len(), 100);

    Ok(())
}

/// Notifier double collecting every `(path, line)` handed to it.
struct CollectingNotifier {
    calls: Mutex<Vec<(PathBuf, String)>>,
}

impl Notifier for CollectingNotifier {
    fn notify(&self, path: &Path, line: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), line.to_string()));
    }
}

#[test]
fn test_notifier_receives_every_match() -> Result<()> {
    let dir = tempdir()?;
    let files = vec![
        write_log(dir.path(), "a.log", 30, &[1, 2])?,
        write_log(dir.path(), "b.log", 30, &[10])?,
    ];

    let notifier = Arc::new(CollectingNotifier {
        calls: Mutex::new(Vec::new()),
    });
    let mut opts = options(files, 2);
    opts.notifier = Some(Arc::clone(&notifier) as Arc<dyn Notifier>);

    let events = run_to_completion(opts);
    assert_eq!(final_totals(&events).matches_total, 3);

    let calls = notifier.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(_, line)| line.contains("ERROR")));

    Ok(())
}
