//! Message bridge between the editor and the isolated execution sandbox.
//!
//! The sandbox is a separate context reachable only through asynchronous
//! message passing: dispatch is fire-and-forget and returns immediately,
//! readiness and results arrive later as independent events. The bridge
//! tracks two readiness flags (bundler, worker) that arrive in no
//! guaranteed order and gates "runnable" on their conjunction. It never
//! retries a dispatch; the coordinator decides whether to re-dispatch.

pub mod messages;

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::errors::BridgeError;
use crate::fileset::{self, FileSet};
use crate::session::observable::Observable;
use crate::store::models::CodeModule;
use messages::{
    BUNDLING_FINISHED, DependencyRef, EditorMessage, SandboxMessage, WORKER_STATE_SUCCESS,
};

/// Fallback after a test dispatch: the awaiting flag clears even if the
/// sandbox never replies, so the UI cannot hang on a silent failure.
pub const RESULT_TIMEOUT: Duration = Duration::from_millis(3000);

pub struct SandboxBridge {
    to_sandbox: mpsc::UnboundedSender<EditorMessage>,
    bundler_ready: Observable<bool>,
    worker_ready: Observable<bool>,
    testing: Observable<bool>,
    result_timeout: Duration,
}

impl SandboxBridge {
    /// Create a bridge and the receiving end the sandbox context consumes.
    /// `testing` is shared with the coordinator, which also clears it when a
    /// result lands.
    pub fn new(testing: Observable<bool>) -> (Self, mpsc::UnboundedReceiver<EditorMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                to_sandbox: tx,
                bundler_ready: Observable::new(false),
                worker_ready: Observable::new(false),
                testing,
                result_timeout: RESULT_TIMEOUT,
            },
            rx,
        )
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    pub fn is_bundler_ready(&self) -> bool {
        self.bundler_ready.get()
    }

    pub fn is_worker_ready(&self) -> bool {
        self.worker_ready.get()
    }

    /// Both readiness signals must have arrived before a run can be
    /// dispatched with any expectation of a reply.
    pub fn is_runnable(&self) -> bool {
        self.bundler_ready.get() && self.worker_ready.get()
    }

    pub fn testing(&self) -> &Observable<bool> {
        &self.testing
    }

    /// Fold a bundler lifecycle report into the readiness flags. Test
    /// runner messages are the coordinator's concern and are ignored here.
    pub fn handle_sandbox_message(&self, msg: &SandboxMessage) {
        if let SandboxMessage::Bundler {
            bundling_state,
            worker_state,
        } = msg
        {
            if let Some(state) = bundling_state {
                self.bundler_ready.set(state == BUNDLING_FINISHED);
            }
            if let Some(state) = worker_state {
                self.worker_ready.set(state == WORKER_STATE_SUCCESS);
            }
        }
    }

    /// Push the current (test-stripped) file snapshot for preview
    /// execution. Resets the readiness flags: the sandbox re-reports as the
    /// new bundle comes up, implicitly superseding any in-flight run.
    pub fn dispatch_code(
        &self,
        fileset: &FileSet,
        modules: &[CodeModule],
        dependencies: Vec<DependencyRef>,
    ) -> Result<Uuid, BridgeError> {
        let run_path = fileset::entry_path(modules).ok_or(BridgeError::NoEntryFile)?;
        let run_value = fileset.get(&run_path).unwrap_or_default().to_string();
        let assets = fileset.without_tests().assets(&run_path, &run_value, false);

        let msg = EditorMessage::new(&assets, dependencies, run_path.clone(), false)
            .map_err(BridgeError::AssetEncode)?;

        self.bundler_ready.set(false);
        self.worker_ready.set(false);

        let run_id = Uuid::new_v4();
        debug!(%run_id, %run_path, "dispatching code run");
        self.to_sandbox
            .send(msg)
            .map_err(|_| BridgeError::ChannelClosed)?;
        Ok(run_id)
    }

    /// Dispatch a checkpoint test run and raise the awaiting flag. A
    /// fallback timer clears the flag after [`RESULT_TIMEOUT`] regardless of
    /// whether a result ever arrives; an on-time result supersedes it, and
    /// both writers racing on the flag are safe under last-write-wins.
    pub fn dispatch_test(
        &self,
        fileset: &FileSet,
        test_path: &str,
        dependencies: Vec<DependencyRef>,
    ) -> Result<Uuid, BridgeError> {
        let test_value = fileset.get(test_path).unwrap_or_default().to_string();
        let assets = fileset.assets(test_path, &test_value, true);

        let msg = EditorMessage::new(&assets, dependencies, test_path.to_string(), true)
            .map_err(BridgeError::AssetEncode)?;

        self.testing.set(true);

        let run_id = Uuid::new_v4();
        debug!(%run_id, test_path, "dispatching test run");
        self.to_sandbox
            .send(msg)
            .map_err(|_| BridgeError::ChannelClosed)?;

        let testing = self.testing.clone();
        let timeout = self.result_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            testing.set(false);
        });

        Ok(run_id)
    }
}
