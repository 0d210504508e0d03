use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

// Notifications beyond this many in flight are dropped rather than queued;
// the scan loop must never wait on a slow webhook endpoint.
const MAX_IN_FLIGHT: usize = 8;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives matched lines as they are found.
///
/// `notify` must return promptly: it is called from inside the per-line
/// scan loop. Implementations do their real work elsewhere (a detached
/// thread here, an async task in other hosts) and never report failure
/// back to the scanner.
pub trait Notifier: Send + Sync {
    fn notify(&self, path: &Path, line: &str);
}

/// Posts each match as a JSON payload to a webhook endpoint.
///
/// Fire-and-forget: each accepted notification runs on its own detached
/// thread with a request timeout, no retries, and errors logged at debug
/// level only. When `MAX_IN_FLIGHT` posts are already outstanding the
/// notification is dropped instead of queued.
pub struct WebhookNotifier {
    url: String,
    agent: ureq::Agent,
    in_flight: Arc<AtomicUsize>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            agent: ureq::AgentBuilder::new()
                .timeout(REQUEST_TIMEOUT)
                .build(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, path: &Path, line: &str) {
        let previous = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if previous >= MAX_IN_FLIGHT {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            debug!(
                url = %self.url,
                in_flight = previous,
                "Dropping webhook notification, too many in flight"
            );
            return;
        }

        let agent = self.agent.clone();
        let url = self.url.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let payload = serde_json::json!({
            "content": format!("match in `{}`: `{}`", path.display(), line),
        });

        thread::spawn(move || {
            if let Err(e) = agent.post(&url).send_json(payload) {
                debug!(url = %url, error = %e, "Webhook notification failed");
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

/// Test double that records every notification it receives.
#[cfg(test)]
pub(crate) struct RecordingNotifier {
    pub(crate) calls: std::sync::Mutex<Vec<(std::path::PathBuf, String)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub(crate) fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, path: &Path, line: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), line.to_string()));
    }
}
