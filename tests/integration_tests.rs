//! Integration tests for the dojo progression engine.
//!
//! These wire the real store, checkpoint service, bridge, and coordinator
//! together against a scripted sandbox and verify the end-to-end
//! progression scenarios.

use std::sync::Arc;
use std::time::Duration;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

use dojo::bridge::messages::SandboxMessage;
use dojo::bridge::{RESULT_TIMEOUT, SandboxBridge};
use dojo::checkpoint::CheckpointService;
use dojo::fileset::debounce::DEBOUNCE_WINDOW;
use dojo::fileset::{EditDebouncer, FileSet, ModuleSink};
use dojo::session::observable::Observable;
use dojo::session::{AdvanceOutcome, Coordinator, SessionMode, SignalOutcome, UiPrompt};
use dojo::store::models::{Caller, Checkpoint, Step};
use dojo::store::{DbHandle, LessonDb};

const PASS: &str = r#"[{"status":"pass","name":"runs"}]"#;
const FAIL: &str = r#"[{"status":"fail","name":"runs"}]"#;

struct Harness {
    db: DbHandle,
    service: CheckpointService,
    step: Step,
}

async fn make_harness() -> Harness {
    let db = DbHandle::new(LessonDb::new_in_memory().unwrap());
    let service = CheckpointService::new(db.clone());
    let step = db
        .call(|db| {
            let lesson = db.create_lesson("Intro to React")?;
            let step = db.create_step(lesson.id, 0, "Render a heading")?;
            db.create_module(step.id, "app.tsx", "export default () => <h1/>", false)?;
            db.create_module(step.id, "index.html", "<div id=\"root\"></div>", false)?;
            Ok(step)
        })
        .await
        .unwrap();
    Harness { db, service, step }
}

impl Harness {
    async fn add_checkpoint(&self, ordinal: i64) -> Checkpoint {
        self.service
            .create_checkpoint(&Caller::teacher(), self.step.id, ordinal)
            .await
            .unwrap()
            .unwrap()
    }

    async fn step_row(&self) -> Step {
        let id = self.step.id;
        self.db
            .call(move |db| db.get_step(id))
            .await
            .unwrap()
            .unwrap()
    }

    async fn checkpoint_row(&self, id: i64) -> Checkpoint {
        self.db
            .call(move |db| db.get_checkpoint(id))
            .await
            .unwrap()
            .unwrap()
    }

    fn learner(&self) -> Coordinator {
        Coordinator::new(self.service.clone(), SessionMode::Learning, Caller::learner())
    }
}

// =============================================================================
// Progression scenarios
// =============================================================================

mod progression {
    use super::*;

    /// Two checkpoints A then B: a pass on A marks it tested but does not
    /// auto-complete; the manual advance moves the step to B.
    #[tokio::test]
    async fn pass_then_manual_advance_across_two_checkpoints() {
        let harness = make_harness().await;
        let a = harness.add_checkpoint(1).await;
        let b = harness.add_checkpoint(2).await;
        let coordinator = harness.learner();

        assert_eq!(harness.step_row().await.current_checkpoint_id, Some(a.id));

        let outcome = coordinator
            .on_sandbox_message(harness.step.id, &SandboxMessage::test_result(PASS))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SignalOutcome::Passed {
                auto_completed: false
            }
        );
        assert!(harness.checkpoint_row(a.id).await.is_tested);
        assert!(!harness.checkpoint_row(a.id).await.is_completed);
        assert_eq!(harness.step_row().await.current_checkpoint_id, Some(a.id));

        let advanced = coordinator.advance(harness.step.id).await.unwrap();
        assert_eq!(advanced, AdvanceOutcome::Advanced(Some(b.id)));
        assert!(harness.checkpoint_row(a.id).await.is_completed);
        assert_eq!(harness.step_row().await.current_checkpoint_id, Some(b.id));
    }

    /// A single checkpoint: the pass collapses tested → completed into one
    /// event and the step reads complete.
    #[tokio::test]
    async fn pass_on_only_checkpoint_completes_the_step() {
        let harness = make_harness().await;
        let a = harness.add_checkpoint(1).await;
        let coordinator = harness.learner();

        let outcome = coordinator
            .on_sandbox_message(harness.step.id, &SandboxMessage::test_result(PASS))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SignalOutcome::Passed {
                auto_completed: true
            }
        );

        let row = harness.checkpoint_row(a.id).await;
        assert!(row.is_tested && row.is_completed);
        assert!(harness.step_row().await.current_checkpoint_id.is_none());

        let progress = coordinator.progress(harness.step.id).await.unwrap().unwrap();
        assert!(progress.is_step_complete);
        assert_eq!(progress.action_label(), "Next Step");
    }

    /// The step invariant holds through every transition: the active
    /// checkpoint always belongs to the step and is never completed.
    #[tokio::test]
    async fn active_checkpoint_invariant_holds_throughout() {
        let harness = make_harness().await;
        for ordinal in 1..=3 {
            harness.add_checkpoint(ordinal).await;
        }
        let coordinator = harness.learner();

        loop {
            let step = harness.step_row().await;
            let Some(current) = step.current_checkpoint_id else {
                break;
            };
            let row = harness.checkpoint_row(current).await;
            assert_eq!(row.step_id, step.id);
            assert!(!row.is_completed);

            coordinator
                .on_sandbox_message(step.id, &SandboxMessage::test_result(PASS))
                .await
                .unwrap();
            coordinator.advance(step.id).await.ok();
        }

        let progress = coordinator.progress(harness.step.id).await.unwrap().unwrap();
        assert!(progress.is_step_complete);
    }

    #[tokio::test]
    async fn failing_result_mutates_nothing() {
        let harness = make_harness().await;
        let a = harness.add_checkpoint(1).await;
        let coordinator = harness.learner();

        let outcome = coordinator
            .on_sandbox_message(harness.step.id, &SandboxMessage::test_result(FAIL))
            .await
            .unwrap();
        assert_eq!(outcome, SignalOutcome::NotAPass);
        assert!(!harness.checkpoint_row(a.id).await.is_tested);
        assert_eq!(harness.step_row().await.current_checkpoint_id, Some(a.id));
    }

    #[tokio::test]
    async fn malformed_result_mutates_nothing() {
        let harness = make_harness().await;
        let a = harness.add_checkpoint(1).await;
        let coordinator = harness.learner();

        let before = harness.checkpoint_row(a.id).await;
        let outcome = coordinator
            .on_sandbox_message(harness.step.id, &SandboxMessage::test_result("{broken"))
            .await
            .unwrap();
        assert_eq!(outcome, SignalOutcome::NoSignal);

        let after = harness.checkpoint_row(a.id).await;
        assert_eq!(before.is_tested, after.is_tested);
        assert_eq!(before.is_completed, after.is_completed);
    }

    #[tokio::test]
    async fn previewing_session_is_prompted_not_persisted() {
        let harness = make_harness().await;
        let a = harness.add_checkpoint(1).await;
        let coordinator = Coordinator::new(
            harness.service.clone(),
            SessionMode::Previewing,
            Caller::anonymous(),
        );

        let outcome = coordinator
            .on_sandbox_message(harness.step.id, &SandboxMessage::test_result(PASS))
            .await
            .unwrap();
        assert_eq!(outcome, SignalOutcome::Prompted);
        assert_eq!(
            coordinator.prompt().get(),
            Some(UiPrompt::RegisterToSaveProgress)
        );
        assert!(!harness.checkpoint_row(a.id).await.is_tested);
    }

    #[tokio::test]
    async fn pass_is_idempotent_across_duplicate_signals() {
        let harness = make_harness().await;
        let a = harness.add_checkpoint(1).await;
        harness.add_checkpoint(2).await;
        let coordinator = harness.learner();

        for _ in 0..2 {
            let outcome = coordinator
                .on_sandbox_message(harness.step.id, &SandboxMessage::test_result(PASS))
                .await
                .unwrap();
            assert_eq!(
                outcome,
                SignalOutcome::Passed {
                    auto_completed: false
                }
            );
        }
        assert!(harness.checkpoint_row(a.id).await.is_tested);
    }
}

// =============================================================================
// Bridge round trip
// =============================================================================

mod bridge_roundtrip {
    use super::*;

    /// Full editor → sandbox → coordinator loop with a scripted sandbox
    /// task on the far end of the channel.
    #[tokio::test]
    async fn test_dispatch_reaches_sandbox_and_result_advances_state() {
        let harness = make_harness().await;
        let a = harness.add_checkpoint(1).await;
        let coordinator = Arc::new(Coordinator::new(
            harness.service.clone(),
            SessionMode::Learning,
            Caller::learner(),
        ));

        let (bridge, mut sandbox_rx) = SandboxBridge::new(coordinator.testing().clone());
        bridge.handle_sandbox_message(&SandboxMessage::bundling_finished());
        bridge.handle_sandbox_message(&SandboxMessage::worker_ready());
        assert!(bridge.is_runnable());

        // Scripted sandbox: receive the test dispatch, verify the envelope,
        // reply with a passing result.
        let step_id = harness.step.id;
        let reply_coordinator = coordinator.clone();
        let sandbox = tokio::spawn(async move {
            let msg = sandbox_rx.recv().await.expect("sandbox got no dispatch");
            assert_eq!(msg.origin, "editor");
            assert!(msg.is_test);
            let assets = msg.decode_assets().unwrap();
            assert!(assets.iter().any(|a| a.is_entry && a.name == msg.run_path));
            reply_coordinator
                .on_sandbox_message(step_id, &SandboxMessage::test_result(PASS))
                .await
                .unwrap()
        });

        let modules = harness
            .db
            .call(move |db| db.list_modules(step_id))
            .await
            .unwrap();
        let fileset = FileSet::from_modules(&modules);
        bridge.dispatch_test(&fileset, &a.test, vec![]).unwrap();
        assert!(coordinator.testing().get());

        let outcome = sandbox.await.unwrap();
        assert_eq!(
            outcome,
            SignalOutcome::Passed {
                auto_completed: true
            }
        );
        assert!(!coordinator.testing().get());
        assert!(harness.checkpoint_row(a.id).await.is_completed);
    }

    /// No reply by the 3000 ms fallback: the awaiting flag clears on its
    /// own, and a late result at 3500 ms neither errors nor re-sets it.
    #[tokio::test(start_paused = true)]
    async fn test_silent_sandbox_times_out_and_late_result_is_harmless() {
        let harness = make_harness().await;
        let a = harness.add_checkpoint(1).await;
        let coordinator = harness.learner();
        let (bridge, _sandbox_rx) = SandboxBridge::new(coordinator.testing().clone());

        let mut fileset = FileSet::new();
        fileset.set(a.test.clone(), "// test body");
        bridge.dispatch_test(&fileset, &a.test, vec![]).unwrap();
        assert!(coordinator.testing().get());

        tokio::task::yield_now().await;
        tokio::time::advance(RESULT_TIMEOUT + Duration::from_millis(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!coordinator.testing().get());

        // Out-of-band reply at t=3500ms.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(500)).await;
        let outcome = coordinator
            .on_sandbox_message(harness.step.id, &SandboxMessage::test_result(PASS))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SignalOutcome::Passed {
                auto_completed: true
            }
        );
        assert!(!coordinator.testing().get());
    }
}

// =============================================================================
// Debounced persistence
// =============================================================================

mod debounced_persistence {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_edits_lands_once_in_the_store() {
        let harness = make_harness().await;
        let sink = Arc::new(ModuleSink::new(harness.db.clone(), harness.step.id));
        let debouncer = EditDebouncer::new(sink);

        debouncer.update_file("app.tsx", "v1");
        debouncer.update_file("app.tsx", "v2");
        debouncer.update_file("app.tsx", "final");

        tokio::task::yield_now().await;
        tokio::time::advance(DEBOUNCE_WINDOW + Duration::from_millis(1)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        let step_id = harness.step.id;
        let module = harness
            .db
            .call(move |db| db.get_module_by_name(step_id, "app.tsx"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(module.value, "final");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_file_suppresses_pending_persist() {
        let harness = make_harness().await;
        let sink = Arc::new(ModuleSink::new(harness.db.clone(), harness.step.id));
        let debouncer = EditDebouncer::new(sink);

        debouncer.update_file("app.tsx", "doomed edit");
        debouncer.cancel("app.tsx");

        tokio::task::yield_now().await;
        tokio::time::advance(DEBOUNCE_WINDOW + Duration::from_millis(1)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        let step_id = harness.step.id;
        let module = harness
            .db
            .call(move |db| db.get_module_by_name(step_id, "app.tsx"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(module.value, "export default () => <h1/>");
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_for_missing_module_is_silent() {
        let harness = make_harness().await;
        let sink = Arc::new(ModuleSink::new(harness.db.clone(), harness.step.id));
        let debouncer = EditDebouncer::new(sink);

        debouncer.update_file("ghost.ts", "never stored");
        tokio::task::yield_now().await;
        tokio::time::advance(DEBOUNCE_WINDOW + Duration::from_millis(1)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(debouncer.pending_count(), 0);
    }
}

// =============================================================================
// Observable lifecycle
// =============================================================================

mod observables {
    use super::*;

    #[tokio::test]
    async fn test_testing_flag_is_shared_between_bridge_and_coordinator() {
        let testing = Observable::new(false);
        let (bridge, _rx) = SandboxBridge::new(testing.clone());

        let mut fileset = FileSet::new();
        fileset.set("checkpoint-1.spec.ts", "// body");
        bridge
            .dispatch_test(&fileset, "checkpoint-1.spec.ts", vec![])
            .unwrap();
        assert!(testing.get());

        testing.set(false);
        assert!(!bridge.testing().get());
    }
}

// =============================================================================
// CLI
// =============================================================================

mod cli {
    use super::*;

    fn dojo(dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("dojo");
        cmd.current_dir(dir.path())
            .arg("--db")
            .arg(dir.path().join("dojo.db"));
        cmd
    }

    #[test]
    fn test_help_and_version() {
        cargo_bin_cmd!("dojo").arg("--help").assert().success();
        cargo_bin_cmd!("dojo").arg("--version").assert().success();
    }

    #[test]
    fn test_authoring_flow_end_to_end() {
        let dir = TempDir::new().unwrap();

        dojo(&dir)
            .args(["lesson", "create", "Intro to React"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created lesson"));

        dojo(&dir)
            .args(["step", "add", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Added step"));

        dojo(&dir)
            .args(["checkpoint", "add", "1", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("checkpoint-1.spec.ts"));

        dojo(&dir)
            .args(["checkpoint", "list", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("untested"));

        dojo(&dir)
            .args(["checkpoint", "pass", "1"])
            .assert()
            .success();

        dojo(&dir)
            .args(["checkpoint", "complete", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("active checkpoint recomputed"));

        dojo(&dir)
            .args(["progress", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("step complete: true"));
    }

    #[test]
    fn test_missing_ids_report_not_found() {
        let dir = TempDir::new().unwrap();
        dojo(&dir)
            .args(["checkpoint", "add", "99", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("not found"));
    }
}
