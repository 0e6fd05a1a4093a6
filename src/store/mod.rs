pub mod models;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use models::*;

/// Async-safe handle to the lesson database.
///
/// Wraps `LessonDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads. The mutex also serializes every
/// state machine operation: a read-then-write sequence inside one `call`
/// closure cannot interleave with another session's writes.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<LessonDb>>,
}

impl DbHandle {
    pub fn new(db: LessonDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&LessonDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Used where blocking is
    /// acceptable: CLI commands, startup initialization, and tests. Must not
    /// be called from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, LessonDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct LessonDb {
    conn: Connection,
}

impl LessonDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS lessons (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'draft',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS steps (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    lesson_id INTEGER NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
                    position INTEGER NOT NULL DEFAULT 0,
                    instructions TEXT NOT NULL DEFAULT '',
                    current_checkpoint_id INTEGER,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS code_modules (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    step_id INTEGER NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    value TEXT NOT NULL DEFAULT '',
                    is_entry INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(step_id, name)
                );

                CREATE TABLE IF NOT EXISTS checkpoints (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    step_id INTEGER NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
                    module_id INTEGER NOT NULL REFERENCES code_modules(id),
                    test TEXT NOT NULL,
                    kind TEXT NOT NULL DEFAULT 'spec',
                    description TEXT NOT NULL DEFAULT '',
                    is_tested INTEGER NOT NULL DEFAULT 0,
                    is_completed INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS dependencies (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    step_id INTEGER NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
                    package TEXT NOT NULL,
                    version TEXT NOT NULL DEFAULT 'latest',
                    UNIQUE(step_id, package)
                );

                CREATE INDEX IF NOT EXISTS idx_steps_lesson ON steps(lesson_id);
                CREATE INDEX IF NOT EXISTS idx_modules_step ON code_modules(step_id);
                CREATE INDEX IF NOT EXISTS idx_checkpoints_step ON checkpoints(step_id);
                CREATE INDEX IF NOT EXISTS idx_dependencies_step ON dependencies(step_id);
                ",
            )
            .context("Failed to create lesson tables")?;
        Ok(())
    }

    // ── Lesson CRUD ───────────────────────────────────────────────────

    pub fn create_lesson(&self, title: &str) -> Result<Lesson> {
        self.conn
            .execute("INSERT INTO lessons (title) VALUES (?1)", params![title])
            .context("Failed to insert lesson")?;
        let id = self.conn.last_insert_rowid();
        self.get_lesson(id)?
            .context("Lesson not found after insert")
    }

    pub fn get_lesson(&self, id: i64) -> Result<Option<Lesson>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, status, created_at FROM lessons WHERE id = ?1")
            .context("Failed to prepare get_lesson")?;
        let mut rows = stmt
            .query_map(params![id], Self::map_lesson)
            .context("Failed to query lesson")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read lesson row")?)),
            None => Ok(None),
        }
    }

    pub fn list_lessons(&self) -> Result<Vec<Lesson>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, status, created_at FROM lessons ORDER BY id")
            .context("Failed to prepare list_lessons")?;
        let rows = stmt
            .query_map([], Self::map_lesson)
            .context("Failed to query lessons")?;
        let mut lessons = Vec::new();
        for row in rows {
            lessons.push(row.context("Failed to read lesson row")?);
        }
        Ok(lessons)
    }

    pub fn publish_lesson(&self, id: i64) -> Result<Option<Lesson>> {
        self.conn
            .execute(
                "UPDATE lessons SET status = 'published' WHERE id = ?1",
                params![id],
            )
            .context("Failed to publish lesson")?;
        self.get_lesson(id)
    }

    fn map_lesson(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lesson> {
        let status: String = row.get(2)?;
        Ok(Lesson {
            id: row.get(0)?,
            title: row.get(1)?,
            status: LessonStatus::from_str(&status).unwrap_or(LessonStatus::Draft),
            created_at: row.get(3)?,
        })
    }

    // ── Step CRUD ─────────────────────────────────────────────────────

    pub fn create_step(&self, lesson_id: i64, position: i32, instructions: &str) -> Result<Step> {
        self.conn
            .execute(
                "INSERT INTO steps (lesson_id, position, instructions) VALUES (?1, ?2, ?3)",
                params![lesson_id, position, instructions],
            )
            .context("Failed to insert step")?;
        let id = self.conn.last_insert_rowid();
        self.get_step(id)?.context("Step not found after insert")
    }

    pub fn get_step(&self, id: i64) -> Result<Option<Step>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, lesson_id, position, instructions, current_checkpoint_id, created_at
                 FROM steps WHERE id = ?1",
            )
            .context("Failed to prepare get_step")?;
        let mut rows = stmt
            .query_map(params![id], Self::map_step)
            .context("Failed to query step")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read step row")?)),
            None => Ok(None),
        }
    }

    pub fn list_steps(&self, lesson_id: i64) -> Result<Vec<Step>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, lesson_id, position, instructions, current_checkpoint_id, created_at
                 FROM steps WHERE lesson_id = ?1 ORDER BY position, id",
            )
            .context("Failed to prepare list_steps")?;
        let rows = stmt
            .query_map(params![lesson_id], Self::map_step)
            .context("Failed to query steps")?;
        let mut steps = Vec::new();
        for row in rows {
            steps.push(row.context("Failed to read step row")?);
        }
        Ok(steps)
    }

    /// Persist the step's active checkpoint. Only the checkpoint service
    /// calls this; clients never set it directly.
    pub fn set_current_checkpoint(&self, step_id: i64, checkpoint_id: Option<i64>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE steps SET current_checkpoint_id = ?1 WHERE id = ?2",
                params![checkpoint_id, step_id],
            )
            .context("Failed to update current checkpoint")?;
        Ok(())
    }

    fn map_step(row: &rusqlite::Row<'_>) -> rusqlite::Result<Step> {
        Ok(Step {
            id: row.get(0)?,
            lesson_id: row.get(1)?,
            position: row.get(2)?,
            instructions: row.get(3)?,
            current_checkpoint_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // ── CodeModule CRUD ───────────────────────────────────────────────

    pub fn create_module(
        &self,
        step_id: i64,
        name: &str,
        value: &str,
        is_entry: bool,
    ) -> Result<CodeModule> {
        self.conn
            .execute(
                "INSERT INTO code_modules (step_id, name, value, is_entry) VALUES (?1, ?2, ?3, ?4)",
                params![step_id, name, value, is_entry],
            )
            .context("Failed to insert code module")?;
        let id = self.conn.last_insert_rowid();
        self.get_module(id)?
            .context("Code module not found after insert")
    }

    pub fn get_module(&self, id: i64) -> Result<Option<CodeModule>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, step_id, name, value, is_entry, created_at
                 FROM code_modules WHERE id = ?1",
            )
            .context("Failed to prepare get_module")?;
        let mut rows = stmt
            .query_map(params![id], Self::map_module)
            .context("Failed to query module")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read module row")?)),
            None => Ok(None),
        }
    }

    pub fn get_module_by_name(&self, step_id: i64, name: &str) -> Result<Option<CodeModule>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, step_id, name, value, is_entry, created_at
                 FROM code_modules WHERE step_id = ?1 AND name = ?2",
            )
            .context("Failed to prepare get_module_by_name")?;
        let mut rows = stmt
            .query_map(params![step_id, name], Self::map_module)
            .context("Failed to query module by name")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read module row")?)),
            None => Ok(None),
        }
    }

    pub fn list_modules(&self, step_id: i64) -> Result<Vec<CodeModule>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, step_id, name, value, is_entry, created_at
                 FROM code_modules WHERE step_id = ?1 ORDER BY name",
            )
            .context("Failed to prepare list_modules")?;
        let rows = stmt
            .query_map(params![step_id], Self::map_module)
            .context("Failed to query modules")?;
        let mut modules = Vec::new();
        for row in rows {
            modules.push(row.context("Failed to read module row")?);
        }
        Ok(modules)
    }

    pub fn update_module_value(&self, id: i64, value: &str) -> Result<Option<CodeModule>> {
        let changed = self
            .conn
            .execute(
                "UPDATE code_modules SET value = ?1 WHERE id = ?2",
                params![value, id],
            )
            .context("Failed to update module value")?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_module(id)
    }

    pub fn delete_module(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM code_modules WHERE id = ?1", params![id])
            .context("Failed to delete module")?;
        Ok(deleted > 0)
    }

    fn map_module(row: &rusqlite::Row<'_>) -> rusqlite::Result<CodeModule> {
        Ok(CodeModule {
            id: row.get(0)?,
            step_id: row.get(1)?,
            name: row.get(2)?,
            value: row.get(3)?,
            is_entry: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // ── Checkpoint CRUD ───────────────────────────────────────────────

    /// `created_at` is stamped in Rust rather than defaulted in SQL:
    /// progression order sorts on it, and sub-second resolution keeps
    /// checkpoints created in the same second ordered without leaning on the
    /// id tiebreaker.
    pub fn insert_checkpoint(
        &self,
        step_id: i64,
        module_id: i64,
        test: &str,
        kind: CheckpointKind,
    ) -> Result<Checkpoint> {
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO checkpoints (step_id, module_id, test, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![step_id, module_id, test, kind.as_str(), created_at],
            )
            .context("Failed to insert checkpoint")?;
        let id = self.conn.last_insert_rowid();
        self.get_checkpoint(id)?
            .context("Checkpoint not found after insert")
    }

    pub fn get_checkpoint(&self, id: i64) -> Result<Option<Checkpoint>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, step_id, module_id, test, kind, description,
                        is_tested, is_completed, created_at
                 FROM checkpoints WHERE id = ?1",
            )
            .context("Failed to prepare get_checkpoint")?;
        let mut rows = stmt
            .query_map(params![id], Self::map_checkpoint)
            .context("Failed to query checkpoint")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read checkpoint row")?)),
            None => Ok(None),
        }
    }

    /// A step's checkpoints in progression order: `created_at` ascending, id
    /// as the tie-break for rows created within the same second.
    pub fn list_checkpoints(&self, step_id: i64) -> Result<Vec<Checkpoint>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, step_id, module_id, test, kind, description,
                        is_tested, is_completed, created_at
                 FROM checkpoints WHERE step_id = ?1 ORDER BY created_at, id",
            )
            .context("Failed to prepare list_checkpoints")?;
        let rows = stmt
            .query_map(params![step_id], Self::map_checkpoint)
            .context("Failed to query checkpoints")?;
        let mut checkpoints = Vec::new();
        for row in rows {
            checkpoints.push(row.context("Failed to read checkpoint row")?);
        }
        Ok(checkpoints)
    }

    pub fn update_checkpoint_description(
        &self,
        id: i64,
        description: &str,
    ) -> Result<Option<Checkpoint>> {
        let changed = self
            .conn
            .execute(
                "UPDATE checkpoints SET description = ?1 WHERE id = ?2",
                params![description, id],
            )
            .context("Failed to update checkpoint description")?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_checkpoint(id)
    }

    pub fn mark_checkpoint_tested(&self, id: i64) -> Result<Option<Checkpoint>> {
        let changed = self
            .conn
            .execute(
                "UPDATE checkpoints SET is_tested = 1 WHERE id = ?1",
                params![id],
            )
            .context("Failed to mark checkpoint tested")?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_checkpoint(id)
    }

    pub fn mark_checkpoint_completed(&self, id: i64) -> Result<Option<Checkpoint>> {
        let changed = self
            .conn
            .execute(
                "UPDATE checkpoints SET is_completed = 1 WHERE id = ?1",
                params![id],
            )
            .context("Failed to mark checkpoint completed")?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_checkpoint(id)
    }

    pub fn delete_checkpoint(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM checkpoints WHERE id = ?1", params![id])
            .context("Failed to delete checkpoint")?;
        Ok(deleted > 0)
    }

    fn map_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
        let kind: String = row.get(4)?;
        Ok(Checkpoint {
            id: row.get(0)?,
            step_id: row.get(1)?,
            module_id: row.get(2)?,
            test: row.get(3)?,
            kind: CheckpointKind::from_str(&kind).unwrap_or(CheckpointKind::Spec),
            description: row.get(5)?,
            is_tested: row.get(6)?,
            is_completed: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    // ── Dependency CRUD ───────────────────────────────────────────────

    pub fn add_dependency(&self, step_id: i64, package: &str, version: &str) -> Result<Dependency> {
        self.conn
            .execute(
                "INSERT INTO dependencies (step_id, package, version) VALUES (?1, ?2, ?3)
                 ON CONFLICT(step_id, package) DO UPDATE SET version = excluded.version",
                params![step_id, package, version],
            )
            .context("Failed to insert dependency")?;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, step_id, package, version FROM dependencies
                 WHERE step_id = ?1 AND package = ?2",
            )
            .context("Failed to prepare dependency lookup")?;
        let mut rows = stmt
            .query_map(params![step_id, package], Self::map_dependency)
            .context("Failed to query dependency")?;
        rows.next()
            .context("Dependency not found after insert")?
            .context("Failed to read dependency row")
    }

    pub fn list_dependencies(&self, step_id: i64) -> Result<Vec<Dependency>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, step_id, package, version FROM dependencies
                 WHERE step_id = ?1 ORDER BY package",
            )
            .context("Failed to prepare list_dependencies")?;
        let rows = stmt
            .query_map(params![step_id], Self::map_dependency)
            .context("Failed to query dependencies")?;
        let mut deps = Vec::new();
        for row in rows {
            deps.push(row.context("Failed to read dependency row")?);
        }
        Ok(deps)
    }

    fn map_dependency(row: &rusqlite::Row<'_>) -> rusqlite::Result<Dependency> {
        Ok(Dependency {
            id: row.get(0)?,
            step_id: row.get(1)?,
            package: row.get(2)?,
            version: row.get(3)?,
        })
    }
}
