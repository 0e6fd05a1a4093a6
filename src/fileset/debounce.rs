//! Per-path edit debouncing.
//!
//! `update_file` is called on every keystroke-level change. Bursts of edits
//! to the same path within the quiescence window collapse into a single
//! persistence call carrying the latest content; edits to distinct paths are
//! independent and persist concurrently. Deleting a file before its window
//! elapses suppresses the pending call silently.
//!
//! A failed persist is logged and surfaced through an observable failure
//! slot; the in-memory file set stays authoritative until the next
//! successful reconcile.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::session::observable::Observable;

/// Quiescence window between the last edit to a path and its persistence.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Destination for debounced file contents. The production sink writes the
/// module row through the store; tests substitute a recording sink.
#[async_trait]
pub trait EditSink: Send + Sync {
    async fn persist(&self, path: &str, content: &str) -> anyhow::Result<()>;
}

/// Persists debounced edits into a step's module rows.
pub struct ModuleSink {
    db: crate::store::DbHandle,
    step_id: i64,
}

impl ModuleSink {
    pub fn new(db: crate::store::DbHandle, step_id: i64) -> Self {
        Self { db, step_id }
    }
}

#[async_trait]
impl EditSink for ModuleSink {
    async fn persist(&self, path: &str, content: &str) -> anyhow::Result<()> {
        let step_id = self.step_id;
        let path = path.to_string();
        let content = content.to_string();
        self.db
            .call(move |db| {
                // The module may have been deleted while the edit waited out
                // its window; absence is not an error.
                let Some(module) = db.get_module_by_name(step_id, &path)? else {
                    return Ok(());
                };
                db.update_module_value(module.id, &content)?;
                Ok(())
            })
            .await
    }
}

struct Pending {
    /// Monotonic per-path counter. A fired timer only persists if its epoch
    /// is still the latest, so an aborted-but-already-fired task cannot
    /// persist stale content.
    epoch: u64,
    content: String,
    handle: JoinHandle<()>,
}

/// A persist that failed after its window elapsed, surfaced so the UI can
/// tell the author their edit has not reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistFailure {
    pub path: String,
    pub message: String,
}

pub struct EditDebouncer {
    window: Duration,
    sink: Arc<dyn EditSink>,
    pending: Arc<Mutex<HashMap<String, Pending>>>,
    failure: Observable<Option<PersistFailure>>,
}

impl EditDebouncer {
    pub fn new(sink: Arc<dyn EditSink>) -> Self {
        Self::with_window(sink, DEBOUNCE_WINDOW)
    }

    pub fn with_window(sink: Arc<dyn EditSink>, window: Duration) -> Self {
        Self {
            window,
            sink,
            failure: Observable::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an edit. Supersedes any pending persistence for the same path.
    pub fn update_file(&self, path: &str, content: &str) {
        let mut pending = self.pending.lock().expect("debouncer lock poisoned");

        let epoch = match pending.remove(path) {
            Some(old) => {
                old.handle.abort();
                old.epoch + 1
            }
            None => 0,
        };

        let sink = self.sink.clone();
        let map = self.pending.clone();
        let failure = self.failure.clone();
        let window = self.window;
        let task_path = path.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;

            // Take the payload only if this timer is still the latest writer
            // for the path.
            let content = {
                let mut map = map.lock().expect("debouncer lock poisoned");
                match map.get(&task_path) {
                    Some(entry) if entry.epoch == epoch => {
                        map.remove(&task_path).map(|entry| entry.content)
                    }
                    _ => None,
                }
            };

            if let Some(content) = content {
                if let Err(e) = sink.persist(&task_path, &content).await {
                    warn!(path = %task_path, error = %e, "failed to persist debounced edit");
                    failure.set(Some(PersistFailure {
                        path: task_path,
                        message: e.to_string(),
                    }));
                }
            }
        });

        pending.insert(
            path.to_string(),
            Pending {
                epoch,
                content: content.to_string(),
                handle,
            },
        );
    }

    /// Drop any pending persistence for a deleted file. No error, no
    /// persistence.
    pub fn cancel(&self, path: &str) {
        let mut pending = self.pending.lock().expect("debouncer lock poisoned");
        if let Some(entry) = pending.remove(path) {
            entry.handle.abort();
        }
    }

    /// Number of paths with an edit waiting out its quiescence window.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("debouncer lock poisoned").len()
    }

    /// The most recent failed persist. A subsequent successful persist does
    /// not clear the slot; the observer does, once surfaced.
    pub fn last_failure(&self) -> &Observable<Option<PersistFailure>> {
        &self.failure
    }
}

impl Drop for EditDebouncer {
    fn drop(&mut self) {
        let pending = self.pending.lock().expect("debouncer lock poisoned");
        for entry in pending.values() {
            entry.handle.abort();
        }
    }
}
