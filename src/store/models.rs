use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub title: String,
    pub status: LessonStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    Draft,
    Published,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl FromStr for LessonStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            _ => Err(format!("Invalid lesson status: {}", s)),
        }
    }
}

/// An ordered unit of a lesson, owning source modules and checkpoints.
///
/// Invariant: `current_checkpoint_id`, when non-null, references a checkpoint
/// of this step whose `is_completed` is false. It is recomputed by the
/// checkpoint service, never set by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub lesson_id: i64,
    pub position: i32,
    pub instructions: String,
    pub current_checkpoint_id: Option<i64>,
    pub created_at: String,
}

/// A persisted source file belonging to a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeModule {
    pub id: i64,
    pub step_id: i64,
    pub name: String,
    pub value: String,
    pub is_entry: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// Graded by a generated spec file run inside the sandbox test runner.
    Spec,
    /// Graded by matching program output against an expected value.
    Match,
}

impl CheckpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spec => "spec",
            Self::Match => "match",
        }
    }
}

impl FromStr for CheckpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spec" => Ok(Self::Spec),
            "match" => Ok(Self::Match),
            _ => Err(format!("Invalid checkpoint kind: {}", s)),
        }
    }
}

/// A gradable milestone within a step, backed by a generated test module.
///
/// Lifecycle is one-directional: untested → tested → completed. `is_tested`
/// means the sandbox confirmed the associated test passed at least once;
/// `is_completed` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: i64,
    pub step_id: i64,
    pub module_id: i64,
    pub test: String,
    pub kind: CheckpointKind,
    pub description: String,
    pub is_tested: bool,
    pub is_completed: bool,
    pub created_at: String,
}

/// A package the step's code depends on, forwarded to the sandbox bundler
/// and inspected for test template selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dependency {
    pub id: i64,
    pub step_id: i64,
    pub package: String,
    pub version: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Anonymous,
    Learner,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Learner => "learner",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anonymous" => Ok(Self::Anonymous),
            "learner" => Ok(Self::Learner),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// The identity behind a mutating call. Checked before any state machine
/// operation touches the store.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub role: Role,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            role: Role::Anonymous,
        }
    }

    pub fn learner() -> Self {
        Self { role: Role::Learner }
    }

    pub fn teacher() -> Self {
        Self { role: Role::Teacher }
    }

    pub fn has_role(&self, required: Role) -> bool {
        self.role >= required
    }
}
