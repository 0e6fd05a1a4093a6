use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dojo::checkpoint::CheckpointService;
use dojo::store::{DbHandle, LessonDb};

mod cmd;

#[derive(Parser)]
#[command(name = "dojo")]
#[command(version, about = "Checkpoint progression engine for interactive coding lessons")]
pub struct Cli {
    /// Path to the lesson database. Defaults to ./dojo.db
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage lessons
    Lesson {
        #[command(subcommand)]
        command: LessonCommands,
    },
    /// Manage the steps of a lesson
    Step {
        #[command(subcommand)]
        command: StepCommands,
    },
    /// Manage a step's source modules
    Module {
        #[command(subcommand)]
        command: ModuleCommands,
    },
    /// Manage a step's declared dependencies
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },
    /// Manage a step's checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Show the derived progression state of a step
    Progress { step_id: i64 },
}

#[derive(Subcommand)]
pub enum LessonCommands {
    Create { title: String },
    List,
    Publish { id: i64 },
}

#[derive(Subcommand)]
pub enum StepCommands {
    Add {
        lesson_id: i64,
        #[arg(short, long, default_value = "0")]
        position: i32,
        #[arg(short, long, default_value = "")]
        instructions: String,
    },
}

#[derive(Subcommand)]
pub enum ModuleCommands {
    Add {
        step_id: i64,
        name: String,
        #[arg(short, long, default_value = "")]
        value: String,
        /// Mark this module as the step's execution entry
        #[arg(long)]
        entry: bool,
    },
}

#[derive(Subcommand)]
pub enum DepCommands {
    Add {
        step_id: i64,
        package: String,
        #[arg(short, long, default_value = "latest")]
        version: String,
    },
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Create a checkpoint and its generated test module
    Add { step_id: i64, ordinal: i64 },
    List { step_id: i64 },
    /// Set a checkpoint's description
    Describe { id: i64, description: String },
    /// Mark a checkpoint's test as passed
    Pass { id: i64 },
    /// Complete a checkpoint and recompute the step's active one
    Complete { id: i64 },
    /// Delete a checkpoint and its test module
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.clone().unwrap_or_else(|| PathBuf::from("dojo.db"));
    let db = DbHandle::new(
        LessonDb::new(&db_path)
            .with_context(|| format!("Failed to open lesson database at {}", db_path.display()))?,
    );
    let service = CheckpointService::new(db.clone());

    match cli.command {
        Commands::Lesson { command } => match command {
            LessonCommands::Create { title } => cmd::cmd_lesson_create(&db, title).await?,
            LessonCommands::List => cmd::cmd_lesson_list(&db).await?,
            LessonCommands::Publish { id } => cmd::cmd_lesson_publish(&db, id).await?,
        },
        Commands::Step { command } => match command {
            StepCommands::Add {
                lesson_id,
                position,
                instructions,
            } => cmd::cmd_step_add(&db, lesson_id, position, instructions).await?,
        },
        Commands::Module { command } => match command {
            ModuleCommands::Add {
                step_id,
                name,
                value,
                entry,
            } => cmd::cmd_module_add(&db, step_id, name, value, entry).await?,
        },
        Commands::Dep { command } => match command {
            DepCommands::Add {
                step_id,
                package,
                version,
            } => cmd::cmd_dep_add(&db, step_id, package, version).await?,
        },
        Commands::Checkpoint { command } => match command {
            CheckpointCommands::Add { step_id, ordinal } => {
                cmd::cmd_checkpoint_add(&service, step_id, ordinal).await?
            }
            CheckpointCommands::List { step_id } => cmd::cmd_checkpoint_list(&db, step_id).await?,
            CheckpointCommands::Describe { id, description } => {
                cmd::cmd_checkpoint_describe(&service, id, description).await?
            }
            CheckpointCommands::Pass { id } => cmd::cmd_checkpoint_pass(&service, id).await?,
            CheckpointCommands::Complete { id } => {
                cmd::cmd_checkpoint_complete(&service, id).await?
            }
            CheckpointCommands::Delete { id } => cmd::cmd_checkpoint_delete(&service, id).await?,
        },
        Commands::Progress { step_id } => cmd::cmd_progress(service, step_id).await?,
    }

    Ok(())
}
