//! Server-resident checkpoint state machine.
//!
//! Each checkpoint moves one way through three states:
//! untested (`is_tested = false`) → tested (`is_tested = true`) →
//! completed (`is_completed = true`). There is no transition back.
//!
//! Every operation on a missing id resolves to `Ok(None)` / `Ok(false)`;
//! callers report absence, they do not retry. Authorization is checked
//! before the store is touched. Each operation runs inside a single
//! `DbHandle::call` closure, so its read-then-write sequence holds the
//! store lock end to end — two sessions completing checkpoints on the same
//! step cannot interleave their recomputation of the active checkpoint.

pub mod templates;

use tracing::debug;

use crate::errors::ServiceError;
use crate::store::DbHandle;
use crate::store::models::{Caller, Checkpoint, CheckpointKind, Role};

#[derive(Clone)]
pub struct CheckpointService {
    db: DbHandle,
}

impl CheckpointService {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    fn require(caller: &Caller, required: Role) -> Result<(), ServiceError> {
        if caller.has_role(required) {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized { required })
        }
    }

    /// Create a checkpoint and its backing test module.
    ///
    /// The module is named `checkpoint-{ordinal}.spec.ts` and seeded from a
    /// template chosen by the step's dependencies. Returns `None` when the
    /// step does not exist. If the step had no active checkpoint, the new
    /// one becomes active.
    pub async fn create_checkpoint(
        &self,
        caller: &Caller,
        step_id: i64,
        ordinal: i64,
    ) -> Result<Option<Checkpoint>, ServiceError> {
        Self::require(caller, Role::Teacher)?;

        let created = self
            .db
            .call(move |db| {
                let Some(step) = db.get_step(step_id)? else {
                    return Ok(None);
                };

                let dependencies = db.list_dependencies(step_id)?;
                let template = templates::select_template(&dependencies);
                let name = templates::test_module_name(ordinal);

                let module = db.create_module(step_id, &name, template, false)?;
                let checkpoint =
                    db.insert_checkpoint(step_id, module.id, &name, CheckpointKind::Spec)?;

                if step.current_checkpoint_id.is_none() {
                    let next = db
                        .list_checkpoints(step_id)?
                        .into_iter()
                        .find(|c| !c.is_completed)
                        .map(|c| c.id);
                    db.set_current_checkpoint(step_id, next)?;
                }

                Ok(Some(checkpoint))
            })
            .await
            .map_err(ServiceError::Database)?;

        if let Some(checkpoint) = &created {
            debug!(checkpoint_id = checkpoint.id, step_id, "created checkpoint");
        }
        Ok(created)
    }

    pub async fn update_checkpoint(
        &self,
        caller: &Caller,
        id: i64,
        description: String,
    ) -> Result<Option<Checkpoint>, ServiceError> {
        Self::require(caller, Role::Teacher)?;
        self.db
            .call(move |db| db.update_checkpoint_description(id, &description))
            .await
            .map_err(ServiceError::Database)
    }

    /// Transition `untested → tested`. Idempotent: passing an already-tested
    /// checkpoint is a no-op success.
    pub async fn pass_checkpoint(
        &self,
        caller: &Caller,
        id: i64,
    ) -> Result<Option<Checkpoint>, ServiceError> {
        Self::require(caller, Role::Learner)?;
        let passed = self
            .db
            .call(move |db| db.mark_checkpoint_tested(id))
            .await
            .map_err(ServiceError::Database)?;
        if passed.is_some() {
            debug!(checkpoint_id = id, "checkpoint passed");
        }
        Ok(passed)
    }

    /// Transition into `completed`, then recompute the owning step's active
    /// checkpoint from a fresh read of the step's full checkpoint set: the
    /// first remaining checkpoint (by creation order) with `is_completed =
    /// false`, or null when none remain.
    pub async fn complete_checkpoint(
        &self,
        caller: &Caller,
        id: i64,
    ) -> Result<Option<Checkpoint>, ServiceError> {
        Self::require(caller, Role::Learner)?;
        let completed = self
            .db
            .call(move |db| {
                let Some(checkpoint) = db.mark_checkpoint_completed(id)? else {
                    return Ok(None);
                };

                let next = db
                    .list_checkpoints(checkpoint.step_id)?
                    .into_iter()
                    .find(|c| !c.is_completed)
                    .map(|c| c.id);
                db.set_current_checkpoint(checkpoint.step_id, next)?;

                Ok(Some(checkpoint))
            })
            .await
            .map_err(ServiceError::Database)?;
        if let Some(checkpoint) = &completed {
            debug!(
                checkpoint_id = checkpoint.id,
                step_id = checkpoint.step_id,
                "checkpoint completed"
            );
        }
        Ok(completed)
    }

    /// Delete a checkpoint and, as dependent cleanup, its backing module.
    /// Returns whether a checkpoint existed to delete.
    pub async fn delete_checkpoint(
        &self,
        caller: &Caller,
        id: i64,
    ) -> Result<bool, ServiceError> {
        Self::require(caller, Role::Teacher)?;
        self.db
            .call(move |db| {
                let Some(checkpoint) = db.get_checkpoint(id)? else {
                    return Ok(false);
                };

                db.delete_checkpoint(id)?;
                db.delete_module(checkpoint.module_id)?;

                // Keep the step invariant: the active checkpoint must exist.
                let Some(step) = db.get_step(checkpoint.step_id)? else {
                    return Ok(true);
                };
                if step.current_checkpoint_id == Some(id) {
                    let next = db
                        .list_checkpoints(checkpoint.step_id)?
                        .into_iter()
                        .find(|c| !c.is_completed)
                        .map(|c| c.id);
                    db.set_current_checkpoint(checkpoint.step_id, next)?;
                }

                Ok(true)
            })
            .await
            .map_err(ServiceError::Database)
    }
}
