//! Shared daemon state.

use skiff_core::Config;
use skiff_proto::Outbound;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Monotonic change clock for the preview poller.
///
/// Any writer (command completion, filesystem bridge, the notify
/// watcher) bumps it; only the poll handler reads it.
#[derive(Debug, Default)]
pub struct ChangeClock {
    last: AtomicU64,
    notify: Notify,
}

impl ChangeClock {
    /// Record that project files may have changed.
    pub fn mark(&self) {
        self.last.store(now_ms(), Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// The timestamp of the most recent change.
    #[must_use]
    pub fn last_change(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }

    /// Wait until a change newer than `since` arrives, up to `timeout`.
    ///
    /// Returns whether such a change exists when the wait ends.
    pub async fn wait_change(&self, since: u64, timeout: std::time::Duration) -> bool {
        let mut notified = std::pin::pin!(self.notify.notified());
        notified.as_mut().enable();

        if self.last_change() > since {
            return true;
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.last_change() > since
    }
}

/// State shared by the message loop, router, and preview server.
pub struct DaemonState {
    pub config: Config,
    /// Live tasks by request id; `kill` trips the token.
    tasks: Mutex<HashMap<u64, CancellationToken>>,
    /// Frame writer feeding stdout.
    writer: UnboundedSender<Outbound>,
    /// Preview change detection.
    pub changes: Arc<ChangeClock>,
}

impl DaemonState {
    #[must_use]
    pub fn new(config: Config, writer: UnboundedSender<Outbound>) -> Self {
        Self {
            config,
            tasks: Mutex::new(HashMap::new()),
            writer,
            changes: Arc::new(ChangeClock::default()),
        }
    }

    /// Queue a frame for the single stdout writer.
    pub fn send(&self, frame: Outbound) {
        if self.writer.send(frame).is_err() {
            warn!("frame writer is gone");
        }
    }

    /// Register a task; the returned token is the task's own handle.
    #[must_use]
    pub fn register_task(&self, id: u64) -> CancellationToken {
        let token = CancellationToken::new();
        self.tasks
            .lock()
            .expect("task table poisoned")
            .insert(id, token.clone());
        token
    }

    /// Drop a finished task's record.
    pub fn remove_task(&self, id: u64) {
        self.tasks.lock().expect("task table poisoned").remove(&id);
    }

    /// Cancel a live task. Returns false for unknown ids.
    #[must_use]
    pub fn cancel_task(&self, id: u64) -> bool {
        match self.tasks.lock().expect("task table poisoned").get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything and clear the table (app-level pause or EOF).
    pub fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().expect("task table poisoned");
        for token in tasks.values() {
            token.cancel();
        }
        tasks.clear();
    }

    /// Number of live tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.lock().expect("task table poisoned").len()
    }
}
