use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::{ScanError, ScanResult};

/// Expands glob patterns into a sorted, deduplicated list of file paths.
///
/// This is input preparation for the pipeline, not part of it: the
/// pipeline receives the finished list and never touches the filesystem
/// layout itself. Paths are normalized before deduplication so the same
/// file reached through different spellings (relative vs absolute, UNC
/// prefix on Windows) is scanned once. Unreadable directory entries are
/// logged and skipped; only an invalid glob pattern is an error.
pub fn expand_patterns(patterns: &[String]) -> ScanResult<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        let paths = glob::glob(pattern).map_err(|e| {
            ScanError::config_error(format!("invalid file pattern '{pattern}': {e}"))
        })?;

        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping unreadable path while expanding '{pattern}': {e}");
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }

            let unified = unify_path(&path);
            if seen.insert(dedup_key(&unified)) {
                files.push(unified);
            }
        }
    }

    files.sort();
    debug!("Expanded {} pattern(s) to {} file(s)", patterns.len(), files.len());
    Ok(files)
}

/// Canonicalize the path and strip UNC prefixes so that
/// comparisons on Windows are consistent.
fn unify_path(original: &Path) -> PathBuf {
    let canonical = original
        .canonicalize()
        .unwrap_or_else(|_| original.to_path_buf());
    strip_unc_prefix(&canonical)
}

/// Strips the Windows UNC prefix (\\?\) from a path if present
fn strip_unc_prefix(p: &Path) -> PathBuf {
    let s = p.display().to_string();
    if let Some(stripped) = s.strip_prefix(r"\\?\") {
        PathBuf::from(stripped)
    } else {
        p.to_path_buf()
    }
}

// Windows filesystems are case-insensitive; the same file must not be
// queued twice under two spellings.
fn dedup_key(path: &Path) -> String {
    let key = path.display().to_string();
    if cfg!(windows) {
        key.to_lowercase()
    } else {
        key
    }
}
