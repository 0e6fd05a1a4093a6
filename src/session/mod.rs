//! Progression coordinator.
//!
//! Ties the sandbox bridge's result signals to the checkpoint state
//! machine. A single [`SessionMode`] value replaces the scattered
//! editing/previewing flags the UI would otherwise thread through every
//! call site: authors never advance real learner state, and previewing
//! (unauthenticated) sessions are prompted to register instead of
//! persisting progress.

pub mod observable;

use tracing::warn;

use crate::checkpoint::CheckpointService;
use crate::errors::SessionError;
use crate::bridge::messages::{AssertionOutcome, SandboxMessage};
use crate::store::models::{Caller, Checkpoint, Step};
use observable::Observable;

/// How the current session relates to the lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Editing the lesson itself; progression mutations are suppressed.
    Authoring,
    /// Unauthenticated trial; progress is not persisted.
    Previewing,
    /// Authenticated learner working through the steps.
    Learning,
}

/// Modal prompt surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiPrompt {
    RegisterToSaveProgress,
}

/// What a sandbox result signal amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Not a test-runner result; nothing to do.
    Ignored,
    /// Authoring session; mutation suppressed.
    Suppressed,
    /// Payload failed to parse or carried no assertions; logged, no state
    /// change.
    NoSignal,
    /// Failing test or no active checkpoint; the learner keeps trying.
    NotAPass,
    /// Previewing session; register prompt surfaced instead of persisting.
    Prompted,
    /// Checkpoint passed. `auto_completed` is set when it was the last
    /// checkpoint and the tested → completed transition was collapsed into
    /// the same event.
    Passed { auto_completed: bool },
}

/// Result of the user-triggered "Next" action.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// The active checkpoint was completed; carries the step's new active
    /// checkpoint id, if any remain.
    Advanced(Option<i64>),
    /// The step has no active checkpoint to advance past.
    NothingActive,
    /// Learning mode requires a passing test before advancing.
    NotYetTested,
    /// Previewing session; register prompt surfaced instead.
    Prompted,
}

/// Read-only, derived view the presentation layer needs to label its action
/// button. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepProgress {
    /// The active checkpoint has a confirmed passing test, or the step has
    /// no active checkpoint at all.
    pub is_tested: bool,
    /// No checkpoint of the step remains uncompleted.
    pub is_step_complete: bool,
}

impl StepProgress {
    pub fn action_label(&self) -> &'static str {
        if self.is_step_complete {
            "Next Step"
        } else if self.is_tested {
            "Next"
        } else {
            "Test"
        }
    }
}

pub struct Coordinator {
    service: CheckpointService,
    mode: SessionMode,
    caller: Caller,
    testing: Observable<bool>,
    prompt: Observable<Option<UiPrompt>>,
}

impl Coordinator {
    pub fn new(service: CheckpointService, mode: SessionMode, caller: Caller) -> Self {
        Self {
            service,
            mode,
            caller,
            testing: Observable::new(false),
            prompt: Observable::new(None),
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// The "awaiting test result" flag, shared with the bridge that raises
    /// it on dispatch.
    pub fn testing(&self) -> &Observable<bool> {
        &self.testing
    }

    pub fn prompt(&self) -> &Observable<Option<UiPrompt>> {
        &self.prompt
    }

    /// Observable lifecycle: both cells reset when the learner moves to a
    /// different step.
    pub fn reset_for_step(&self) {
        self.testing.set(false);
        self.prompt.set(None);
    }

    /// Drive the progression flow from a sandbox message.
    ///
    /// A late result arriving after the fallback timer already cleared the
    /// awaiting flag takes the same path as an on-time one; clearing an
    /// already-clear flag and re-passing an already-tested checkpoint are
    /// both no-ops, so stale signals are harmless.
    pub async fn on_sandbox_message(
        &self,
        step_id: i64,
        msg: &SandboxMessage,
    ) -> Result<SignalOutcome, SessionError> {
        let SandboxMessage::TestRunner { kind, result } = msg else {
            return Ok(SignalOutcome::Ignored);
        };
        if kind != "test" {
            return Ok(SignalOutcome::Ignored);
        }

        if self.mode == SessionMode::Authoring {
            self.testing.set(false);
            return Ok(SignalOutcome::Suppressed);
        }

        let outcomes: Vec<AssertionOutcome> = match serde_json::from_str(result) {
            Ok(outcomes) => outcomes,
            Err(e) => {
                // Malformed payload: no signal either way. The awaiting flag
                // is left for the fallback timer.
                warn!(step_id, error = %e, "unparsable test runner payload");
                return Ok(SignalOutcome::NoSignal);
            }
        };

        // An empty array carries no verdict either way; like a malformed
        // payload, it leaves the awaiting flag for the fallback timer.
        let Some(last) = outcomes.last() else {
            warn!(step_id, "empty test runner result");
            return Ok(SignalOutcome::NoSignal);
        };
        let passed = last.status == "pass";
        let current = self.current_checkpoint_id(step_id).await?;
        let Some(current_id) = current.filter(|_| passed) else {
            self.testing.set(false);
            return Ok(SignalOutcome::NotAPass);
        };

        if self.mode == SessionMode::Previewing {
            self.testing.set(false);
            self.prompt.set(Some(UiPrompt::RegisterToSaveProgress));
            return Ok(SignalOutcome::Prompted);
        }

        self.service.pass_checkpoint(&self.caller, current_id).await?;

        // Collapse tested → completed into the same event when no further
        // manual "Next" would follow anyway.
        let auto_completed = if self.is_last_checkpoint(step_id, current_id).await? {
            self.service
                .complete_checkpoint(&self.caller, current_id)
                .await?;
            true
        } else {
            false
        };

        self.testing.set(false);
        Ok(SignalOutcome::Passed { auto_completed })
    }

    /// The manual "Next" action: complete a checkpoint that already has a
    /// passing test. The untested bypass exists for lesson authors only.
    pub async fn advance(&self, step_id: i64) -> Result<AdvanceOutcome, SessionError> {
        if self.mode == SessionMode::Previewing {
            self.prompt.set(Some(UiPrompt::RegisterToSaveProgress));
            return Ok(AdvanceOutcome::Prompted);
        }

        let Some(current_id) = self.current_checkpoint_id(step_id).await? else {
            return Ok(AdvanceOutcome::NothingActive);
        };

        let checkpoint = self.get_checkpoint(current_id).await?;
        let is_tested = checkpoint.map(|c| c.is_tested).unwrap_or(false);
        if !is_tested && self.mode != SessionMode::Authoring {
            return Ok(AdvanceOutcome::NotYetTested);
        }

        self.service
            .complete_checkpoint(&self.caller, current_id)
            .await?;
        let next = self.current_checkpoint_id(step_id).await?;
        Ok(AdvanceOutcome::Advanced(next))
    }

    /// Derived progression view for a step.
    pub async fn progress(&self, step_id: i64) -> Result<Option<StepProgress>, SessionError> {
        let Some(step) = self.get_step(step_id).await? else {
            return Ok(None);
        };

        let checkpoints = self.list_checkpoints(step_id).await?;
        let is_step_complete = checkpoints.iter().all(|c| c.is_completed);
        let is_tested = match step.current_checkpoint_id {
            Some(id) => checkpoints
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.is_tested)
                .unwrap_or(true),
            None => true,
        };

        Ok(Some(StepProgress {
            is_tested,
            is_step_complete,
        }))
    }

    async fn current_checkpoint_id(&self, step_id: i64) -> Result<Option<i64>, SessionError> {
        Ok(self
            .get_step(step_id)
            .await?
            .and_then(|s| s.current_checkpoint_id))
    }

    async fn is_last_checkpoint(&self, step_id: i64, id: i64) -> Result<bool, SessionError> {
        let checkpoints = self.list_checkpoints(step_id).await?;
        Ok(checkpoints.last().map(|c| c.id == id).unwrap_or(false))
    }

    async fn get_step(&self, step_id: i64) -> Result<Option<Step>, SessionError> {
        self.service
            .db()
            .call(move |db| db.get_step(step_id))
            .await
            .map_err(SessionError::Other)
    }

    async fn get_checkpoint(&self, id: i64) -> Result<Option<Checkpoint>, SessionError> {
        self.service
            .db()
            .call(move |db| db.get_checkpoint(id))
            .await
            .map_err(SessionError::Other)
    }

    async fn list_checkpoints(&self, step_id: i64) -> Result<Vec<Checkpoint>, SessionError> {
        self.service
            .db()
            .call(move |db| db.list_checkpoints(step_id))
            .await
            .map_err(SessionError::Other)
    }
}
