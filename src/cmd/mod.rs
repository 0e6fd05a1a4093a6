//! CLI command implementations.
//!
//! Thin authoring and inspection layer over the same store and checkpoint
//! service the engine uses. All mutations run as a teacher-role caller;
//! this is the lesson author's tool, not the learner path.

use anyhow::Result;
use console::style;

use dojo::checkpoint::CheckpointService;
use dojo::session::{Coordinator, SessionMode};
use dojo::store::DbHandle;
use dojo::store::models::Caller;

pub async fn cmd_lesson_create(db: &DbHandle, title: String) -> Result<()> {
    let lesson = db.call(move |db| db.create_lesson(&title)).await?;
    println!(
        "Created lesson {} {}",
        style(format!("#{}", lesson.id)).cyan(),
        lesson.title
    );
    Ok(())
}

pub async fn cmd_lesson_list(db: &DbHandle) -> Result<()> {
    let lessons = db.call(|db| db.list_lessons()).await?;
    if lessons.is_empty() {
        println!("No lessons yet. Create one with `dojo lesson create <title>`.");
        return Ok(());
    }
    for lesson in lessons {
        println!(
            "#{:<4} {:<10} {}",
            lesson.id,
            lesson.status.as_str(),
            lesson.title
        );
    }
    Ok(())
}

pub async fn cmd_lesson_publish(db: &DbHandle, id: i64) -> Result<()> {
    match db.call(move |db| db.publish_lesson(id)).await? {
        Some(lesson) => println!("Published lesson #{} {}", lesson.id, lesson.title),
        None => println!("{} lesson #{} not found", style("error:").red(), id),
    }
    Ok(())
}

pub async fn cmd_step_add(
    db: &DbHandle,
    lesson_id: i64,
    position: i32,
    instructions: String,
) -> Result<()> {
    let step = db
        .call(move |db| db.create_step(lesson_id, position, &instructions))
        .await?;
    println!(
        "Added step {} to lesson #{} at position {}",
        style(format!("#{}", step.id)).cyan(),
        lesson_id,
        step.position
    );
    Ok(())
}

pub async fn cmd_module_add(
    db: &DbHandle,
    step_id: i64,
    name: String,
    value: String,
    entry: bool,
) -> Result<()> {
    let module = db
        .call(move |db| db.create_module(step_id, &name, &value, entry))
        .await?;
    println!(
        "Added module {} to step #{}{}",
        style(&module.name).cyan(),
        step_id,
        if module.is_entry { " (entry)" } else { "" }
    );
    Ok(())
}

pub async fn cmd_dep_add(
    db: &DbHandle,
    step_id: i64,
    package: String,
    version: String,
) -> Result<()> {
    let dep = db
        .call(move |db| db.add_dependency(step_id, &package, &version))
        .await?;
    println!("Pinned {}@{} on step #{}", dep.package, dep.version, step_id);
    Ok(())
}

pub async fn cmd_checkpoint_add(
    service: &CheckpointService,
    step_id: i64,
    ordinal: i64,
) -> Result<()> {
    match service
        .create_checkpoint(&Caller::teacher(), step_id, ordinal)
        .await?
    {
        Some(checkpoint) => println!(
            "Created checkpoint {} with test module {}",
            style(format!("#{}", checkpoint.id)).cyan(),
            checkpoint.test
        ),
        None => println!("{} step #{} not found", style("error:").red(), step_id),
    }
    Ok(())
}

pub async fn cmd_checkpoint_list(db: &DbHandle, step_id: i64) -> Result<()> {
    let step = db.call(move |db| db.get_step(step_id)).await?;
    let Some(step) = step else {
        println!("{} step #{} not found", style("error:").red(), step_id);
        return Ok(());
    };
    let checkpoints = db.call(move |db| db.list_checkpoints(step_id)).await?;
    if checkpoints.is_empty() {
        println!("Step #{} has no checkpoints.", step_id);
        return Ok(());
    }
    for checkpoint in checkpoints {
        let marker = if Some(checkpoint.id) == step.current_checkpoint_id {
            style("→").green().to_string()
        } else {
            " ".to_string()
        };
        let state = if checkpoint.is_completed {
            "completed"
        } else if checkpoint.is_tested {
            "tested"
        } else {
            "untested"
        };
        println!(
            "{} #{:<4} {:<10} {}  {}",
            marker, checkpoint.id, state, checkpoint.test, checkpoint.description
        );
    }
    Ok(())
}

pub async fn cmd_checkpoint_describe(
    service: &CheckpointService,
    id: i64,
    description: String,
) -> Result<()> {
    match service
        .update_checkpoint(&Caller::teacher(), id, description)
        .await?
    {
        Some(checkpoint) => println!("Updated checkpoint #{}", checkpoint.id),
        None => println!("{} checkpoint #{} not found", style("error:").red(), id),
    }
    Ok(())
}

pub async fn cmd_checkpoint_pass(service: &CheckpointService, id: i64) -> Result<()> {
    match service.pass_checkpoint(&Caller::teacher(), id).await? {
        Some(checkpoint) => println!("Checkpoint #{} marked tested", checkpoint.id),
        None => println!("{} checkpoint #{} not found", style("error:").red(), id),
    }
    Ok(())
}

pub async fn cmd_checkpoint_complete(service: &CheckpointService, id: i64) -> Result<()> {
    match service.complete_checkpoint(&Caller::teacher(), id).await? {
        Some(checkpoint) => println!(
            "Checkpoint #{} completed; step #{} active checkpoint recomputed",
            checkpoint.id, checkpoint.step_id
        ),
        None => println!("{} checkpoint #{} not found", style("error:").red(), id),
    }
    Ok(())
}

pub async fn cmd_checkpoint_delete(service: &CheckpointService, id: i64) -> Result<()> {
    if service.delete_checkpoint(&Caller::teacher(), id).await? {
        println!("Deleted checkpoint #{} and its test module", id);
    } else {
        println!("{} checkpoint #{} not found", style("error:").red(), id);
    }
    Ok(())
}

pub async fn cmd_progress(service: CheckpointService, step_id: i64) -> Result<()> {
    let coordinator = Coordinator::new(service, SessionMode::Authoring, Caller::teacher());
    match coordinator.progress(step_id).await? {
        Some(progress) => {
            println!("Step #{}", step_id);
            println!("  tested:        {}", progress.is_tested);
            println!("  step complete: {}", progress.is_step_complete);
            println!("  action button: {}", style(progress.action_label()).green());
        }
        None => println!("{} step #{} not found", style("error:").red(), step_id),
    }
    Ok(())
}
