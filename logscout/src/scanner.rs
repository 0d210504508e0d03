use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, PoisonError};

use crossbeam_channel::Sender;
use tracing::{debug, trace};

use crate::errors::ScanError;
use crate::events::{MatchLine, ScanEvent};
use crate::notify::Notifier;
use crate::pattern::LinePattern;
use crate::pause::PauseController;
use crate::totals::ScanTotals;

const BUFFER_CAPACITY: usize = 64 * 1024;

/// Line and match counts from a single pass over one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub lines: u64,
    pub matches: u64,
}

/// A failed scan, carrying the counts accumulated before the failure
#[derive(Debug)]
pub struct ScanFailure {
    pub stats: FileStats,
    pub error: ScanError,
}

/// Outcome of reading one line with a byte cap
enum LineRead {
    Line,
    Eof,
    Overflow,
}

/// Reads one line into `line` (newline stripped), refusing to buffer more
/// than `limit` bytes of it. Returns `Overflow` as soon as the cap is hit,
/// without slurping the rest of the oversize line into memory.
fn read_line_capped<R: BufRead>(
    reader: &mut R,
    line: &mut Vec<u8>,
    limit: usize,
) -> io::Result<LineRead> {
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            // EOF; a non-empty buffer is a final line without a newline.
            return Ok(if line.is_empty() {
                LineRead::Eof
            } else {
                LineRead::Line
            });
        }

        let newline = available.iter().position(|&b| b == b'\n');
        let content = newline.unwrap_or(available.len());
        if line.len() + content > limit {
            return Ok(LineRead::Overflow);
        }
        line.extend_from_slice(&available[..content]);

        let used = match newline {
            Some(pos) => pos + 1,
            None => content,
        };
        reader.consume(used);

        if newline.is_some() {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(LineRead::Line);
        }
    }
}

/// Scans individual files against the compiled pattern, emitting match
/// events as they are found.
///
/// One instance is cloned per worker; everything it holds is either
/// shared (`Arc`) or a cheap channel handle. Each file is read exactly
/// once: line counting and pattern matching happen in the same forward
/// pass, and the pause controller is consulted before every line so a
/// pause takes effect within one line of each in-flight file.
#[derive(Clone)]
pub struct FileScanner {
    pattern: LinePattern,
    bus: Sender<ScanEvent>,
    pause: Arc<PauseController>,
    totals: Arc<ScanTotals>,
    notifier: Option<Arc<dyn Notifier>>,
    max_line_len: usize,
}

impl FileScanner {
    pub fn new(
        pattern: LinePattern,
        bus: Sender<ScanEvent>,
        pause: Arc<PauseController>,
        totals: Arc<ScanTotals>,
        notifier: Option<Arc<dyn Notifier>>,
        max_line_len: usize,
    ) -> Self {
        Self {
            pattern,
            bus,
            pause,
            totals,
            notifier,
            max_line_len,
        }
    }

    /// Scans one file, emitting a `MatchLine` for every matching line.
    ///
    /// On failure the returned [`ScanFailure`] carries the counts up to
    /// the failure point; the caller decides what to do with them (the
    /// pipeline reports them on the terminal event and keeps them out of
    /// the run totals).
    pub fn scan_file(&self, path: &Path) -> Result<FileStats, ScanFailure> {
        trace!("Scanning file: {}", path.display());

        let file = File::open(path).map_err(|e| ScanFailure {
            stats: FileStats::default(),
            error: ScanError::from_io(path, e),
        })?;
        let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file);

        let mut stats = FileStats::default();
        let mut raw = Vec::with_capacity(256);

        loop {
            self.pause.wait_if_paused();

            raw.clear();
            match read_line_capped(&mut reader, &mut raw, self.max_line_len) {
                Ok(LineRead::Eof) => break,
                Ok(LineRead::Line) => {}
                Ok(LineRead::Overflow) => {
                    return Err(ScanFailure {
                        stats,
                        error: ScanError::LineTooLong {
                            path: path.to_path_buf(),
                            line: stats.lines + 1,
                            limit: self.max_line_len,
                        },
                    });
                }
                Err(e) => {
                    return Err(ScanFailure {
                        stats,
                        error: ScanError::from_io(path, e),
                    });
                }
            }

            stats.lines += 1;
            // Lines are opaque text; invalid UTF-8 is tolerated, not fatal.
            let text = String::from_utf8_lossy(&raw);
            if self.pattern.is_match(&text) {
                stats.matches += 1;
                self.emit_match(path, &text);
            }
        }

        debug!(
            "Scanned {}: {} lines, {} matches",
            path.display(),
            stats.lines,
            stats.matches
        );
        Ok(stats)
    }

    fn emit_match(&self, path: &Path, line: &str) {
        // Allocation and emission share one guard so sequence numbers
        // arrive on the bus in allocation order. Sending may block on a
        // full bus; that backpressure is intentional and extends to every
        // worker currently emitting a match.
        {
            let _order = self
                .totals
                .seq_order()
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let seq = self.totals.next_seq();
            let _ = self.bus.send(ScanEvent::Match(MatchLine {
                seq,
                path: path.to_path_buf(),
                line: line.to_string(),
            }));
        }

        if let Some(notifier) = &self.notifier {
            notifier.notify(path, line);
        }
    }
}
