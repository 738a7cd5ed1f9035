// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-backed worker state store.
//!
//! The store is shared by many uncoordinated worker processes, so it keeps
//! no connection or cached state: every operation opens a fresh scoped
//! connection, runs one short transaction, and releases it on every exit
//! path. Mutual exclusion is delegated entirely to SQLite's transactional
//! isolation; transient `SQLITE_BUSY`/`SQLITE_LOCKED` conflicts are retried
//! with bounded backoff before being surfaced.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, warn};

use crate::error::StoreError;

use super::types::{
    phase, status, Completion, Event, Message, NewCompletion, NewWorker, Session, Stage, Worker,
};

/// Database file name inside the worktree base directory.
pub const DB_FILE: &str = "crew.db";

/// Maximum attempts for an operation that keeps hitting lock contention.
const MAX_ATTEMPTS: u32 = 5;

/// Base backoff between retries; grows linearly per attempt.
const RETRY_BASE_MS: u64 = 50;

/// Handle to the shared worker store.
///
/// Holds only the database path. Cloning is cheap and safe across threads;
/// concurrent processes coordinate through the file itself.
#[derive(Debug, Clone)]
pub struct WorkStore {
    path: PathBuf,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked =>
            {
                StoreError::Busy {
                    attempts: 1,
                    message: err.to_string(),
                }
            }
            _ => StoreError::Sqlite(err.to_string()),
        }
    }
}

impl WorkStore {
    /// Open or create the store under a worktree base directory.
    pub fn open(worktree_base: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(worktree_base)?;
        Self::open_at(&worktree_base.join(DB_FILE))
    }

    /// Open or create the store at a specific database path.
    ///
    /// Useful for testing or a custom location.
    pub fn open_at(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// The database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh scoped connection with the standard pragmas.
    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;
             PRAGMA foreign_keys=ON;",
        )?;
        Ok(conn)
    }

    /// Run an operation against a fresh connection, retrying bounded times
    /// on lock contention.
    fn with_retry<T>(
        &self,
        op: &str,
        f: impl Fn(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut last = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            // Opening the connection runs pragmas, so it can hit contention
            // just like the operation itself.
            match self.connect().and_then(|mut conn| f(&mut conn)) {
                Err(StoreError::Busy { message, .. }) => {
                    warn!(op, attempt, "store busy, backing off");
                    last = message;
                    thread::sleep(Duration::from_millis(RETRY_BASE_MS * attempt as u64));
                }
                other => return other,
            }
        }
        Err(StoreError::Busy {
            attempts: MAX_ATTEMPTS,
            message: last,
        })
    }

    /// Create tables and indexes if absent. Idempotent.
    fn init_schema(&self) -> Result<(), StoreError> {
        self.with_retry("init_schema", |conn| {
            conn.execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS workers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repo_path TEXT NOT NULL,
                repo_name TEXT NOT NULL,
                issue_number INTEGER,
                jira_key TEXT,
                issue_source TEXT,
                branch TEXT NOT NULL,
                worktree_path TEXT NOT NULL,
                pid INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'starting',
                phase TEXT NOT NULL DEFAULT 'implementation',
                stage TEXT NOT NULL DEFAULT 'exploring',
                pr_number INTEGER,
                pr_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(repo_path, branch)
            );

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                worker_id INTEGER NOT NULL REFERENCES workers(id),
                event_type TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                worker_id INTEGER NOT NULL REFERENCES workers(id),
                message_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                read_at TEXT
            );

            CREATE TABLE IF NOT EXISTS completions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                worker_id INTEGER NOT NULL REFERENCES workers(id),
                summary TEXT NOT NULL,
                files_changed TEXT NOT NULL DEFAULT '',
                tests_added TEXT NOT NULL DEFAULT '',
                pr_url TEXT,
                merged INTEGER NOT NULL DEFAULT 0,
                follow_up_issues TEXT NOT NULL DEFAULT '',
                lessons_learned TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                worker_id INTEGER NOT NULL REFERENCES workers(id),
                session_number INTEGER NOT NULL,
                session_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                end_reason TEXT,
                context_at_end INTEGER,
                summary TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_workers_issue ON workers(issue_number);
            CREATE INDEX IF NOT EXISTS idx_workers_jira ON workers(jira_key);
            CREATE INDEX IF NOT EXISTS idx_events_worker ON events(worker_id);
            CREATE INDEX IF NOT EXISTS idx_messages_worker ON messages(worker_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_worker ON sessions(worker_id);
            "#,
            )?;
            Ok(())
        })
    }

    /// Register a worker, upserting on the `(repo_path, branch)` pair.
    ///
    /// Re-registering an existing pair replaces the row's fields while
    /// preserving its id, so events, messages, and sessions keyed to the
    /// worker survive a restart. Lifecycle fields reset to their defaults
    /// and PR linkage is cleared.
    pub fn register_worker(&self, new: &NewWorker) -> Result<i64, StoreError> {
        let now = now();
        self.with_retry("register_worker", |conn| {
            let id = conn.query_row(
                r#"
            INSERT INTO workers (
                repo_path, repo_name, issue_number, jira_key, issue_source,
                branch, worktree_path, pid, status, phase, stage,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(repo_path, branch) DO UPDATE SET
                repo_name = excluded.repo_name,
                issue_number = excluded.issue_number,
                jira_key = excluded.jira_key,
                issue_source = excluded.issue_source,
                worktree_path = excluded.worktree_path,
                pid = excluded.pid,
                status = excluded.status,
                phase = excluded.phase,
                stage = excluded.stage,
                pr_number = NULL,
                pr_url = NULL,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
                params![
                    new.repo_path,
                    new.repo_name,
                    new.issue_number,
                    new.jira_key,
                    new.issue_source,
                    new.branch,
                    new.worktree_path,
                    new.pid,
                    status::STARTING,
                    phase::IMPLEMENTATION,
                    Stage::Exploring.as_str(),
                    now,
                    now,
                ],
                |row| row.get(0),
            )?;
            debug!(worker_id = id, branch = %new.branch, "registered worker");
            Ok(id)
        })
    }

    /// Update a worker's status, and optionally its phase.
    pub fn update_status(
        &self,
        worker_id: i64,
        new_status: &str,
        new_phase: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = now();
        self.with_retry("update_status", |conn| {
            let rows = match new_phase {
                Some(p) => conn.execute(
                    "UPDATE workers SET status = ?, phase = ?, updated_at = ? WHERE id = ?",
                    params![new_status, p, now, worker_id],
                )?,
                None => conn.execute(
                    "UPDATE workers SET status = ?, updated_at = ? WHERE id = ?",
                    params![new_status, now, worker_id],
                )?,
            };
            if rows == 0 {
                return Err(StoreError::WorkerNotFound(worker_id));
            }
            debug!(worker_id, status = new_status, "updated status");
            Ok(())
        })
    }

    /// Update a worker's stage, validating it against the closed stage set.
    ///
    /// On success a `stage_change` event is appended in the same
    /// transaction; an invalid value fails without touching the store.
    pub fn update_stage(&self, worker_id: i64, new_stage: &str) -> Result<(), StoreError> {
        let stage = Stage::from_str(new_stage)?;
        let now = now();
        self.with_retry("update_stage", |conn| {
            let tx = conn.transaction()?;
            let rows = tx.execute(
                "UPDATE workers SET stage = ?, updated_at = ? WHERE id = ?",
                params![stage.as_str(), now, worker_id],
            )?;
            if rows == 0 {
                return Err(StoreError::WorkerNotFound(worker_id));
            }
            tx.execute(
                "INSERT INTO events (worker_id, event_type, message, created_at)
                 VALUES (?, 'stage_change', ?, ?)",
                params![worker_id, format!("Stage changed to {}", stage), now],
            )?;
            tx.commit()?;
            debug!(worker_id, stage = %stage, "updated stage");
            Ok(())
        })
    }

    /// Record PR linkage. Opening a PR always implies the CI review phase,
    /// so this also forces `status=pr_open`, `phase=ci_review`.
    pub fn update_pr(&self, worker_id: i64, pr_number: i64, pr_url: &str) -> Result<(), StoreError> {
        let now = now();
        self.with_retry("update_pr", |conn| {
            let rows = conn.execute(
                "UPDATE workers
                 SET pr_number = ?, pr_url = ?, status = ?, phase = ?, updated_at = ?
                 WHERE id = ?",
                params![pr_number, pr_url, status::PR_OPEN, phase::CI_REVIEW, now, worker_id],
            )?;
            if rows == 0 {
                return Err(StoreError::WorkerNotFound(worker_id));
            }
            debug!(worker_id, pr_number, "recorded pull request");
            Ok(())
        })
    }

    /// Find a worker by issue reference: a numeric string matches the
    /// GitHub issue number, anything else the JIRA key. `repo_name` narrows
    /// the match. Absence is `Ok(None)`.
    pub fn find_worker_by_issue(
        &self,
        issue_ref: &str,
        repo_name: Option<&str>,
    ) -> Result<Option<i64>, StoreError> {
        self.with_retry("find_worker_by_issue", |conn| {
            let found = match (issue_ref.parse::<i64>().ok(), repo_name) {
                (Some(number), Some(repo)) => conn
                    .query_row(
                        "SELECT id FROM workers WHERE issue_number = ? AND repo_name = ?
                         ORDER BY id DESC LIMIT 1",
                        params![number, repo],
                        |row| row.get(0),
                    )
                    .optional()?,
                (Some(number), None) => conn
                    .query_row(
                        "SELECT id FROM workers WHERE issue_number = ?
                         ORDER BY id DESC LIMIT 1",
                        params![number],
                        |row| row.get(0),
                    )
                    .optional()?,
                (None, Some(repo)) => conn
                    .query_row(
                        "SELECT id FROM workers WHERE jira_key = ? AND repo_name = ?
                         ORDER BY id DESC LIMIT 1",
                        params![issue_ref, repo],
                        |row| row.get(0),
                    )
                    .optional()?,
                (None, None) => conn
                    .query_row(
                        "SELECT id FROM workers WHERE jira_key = ?
                         ORDER BY id DESC LIMIT 1",
                        params![issue_ref],
                        |row| row.get(0),
                    )
                    .optional()?,
            };
            Ok(found)
        })
    }

    /// Read back a full worker row.
    pub fn get_worker(&self, worker_id: i64) -> Result<Option<Worker>, StoreError> {
        self.with_retry("get_worker", |conn| {
            let worker = conn
                .query_row(
                    "SELECT id, repo_path, repo_name, issue_number, jira_key, issue_source,
                            branch, worktree_path, pid, status, phase, stage,
                            pr_number, pr_url, created_at, updated_at
                     FROM workers WHERE id = ?",
                    params![worker_id],
                    row_to_worker,
                )
                .optional()?;
            Ok(worker)
        })
    }

    /// Append an audit event for a worker.
    pub fn log_event(
        &self,
        worker_id: i64,
        event_type: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let now = now();
        self.with_retry("log_event", |conn| {
            conn.execute(
                "INSERT INTO events (worker_id, event_type, message, created_at)
                 VALUES (?, ?, ?, ?)",
                params![worker_id, event_type, message, now],
            )?;
            Ok(())
        })
    }

    /// All events for a worker, in insertion order.
    pub fn events_for_worker(&self, worker_id: i64) -> Result<Vec<Event>, StoreError> {
        self.with_retry("events_for_worker", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, worker_id, event_type, message, created_at
                 FROM events WHERE worker_id = ? ORDER BY id",
            )?;
            let events = stmt
                .query_map(params![worker_id], |row| {
                    Ok(Event {
                        id: row.get(0)?,
                        worker_id: row.get(1)?,
                        event_type: row.get(2)?,
                        message: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
    }

    /// Queue a message for a worker.
    pub fn send_message(
        &self,
        worker_id: i64,
        message_type: &str,
        payload: &str,
    ) -> Result<(), StoreError> {
        let now = now();
        self.with_retry("send_message", |conn| {
            conn.execute(
                "INSERT INTO messages (worker_id, message_type, payload, created_at)
                 VALUES (?, ?, ?, ?)",
                params![worker_id, message_type, payload, now],
            )?;
            Ok(())
        })
    }

    /// Fetch all unread messages for a worker, in insertion order.
    ///
    /// With `mark_read`, the returned messages are stamped in the same
    /// transaction as the read, so a second call returns nothing. Marking
    /// does not delete; payloads stay inspectable afterwards.
    pub fn receive_messages(
        &self,
        worker_id: i64,
        mark_read: bool,
    ) -> Result<Vec<Message>, StoreError> {
        let now = now();
        self.with_retry("receive_messages", |conn| {
            let tx = conn.transaction()?;
            let mut stmt = tx.prepare(
                "SELECT id, worker_id, message_type, payload, created_at, read_at
                 FROM messages WHERE worker_id = ? AND read_at IS NULL ORDER BY id",
            )?;
            let messages = stmt
                .query_map(params![worker_id], |row| {
                    Ok(Message {
                        id: row.get(0)?,
                        worker_id: row.get(1)?,
                        message_type: row.get(2)?,
                        payload: row.get(3)?,
                        created_at: row.get(4)?,
                        read_at: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);
            if mark_read && !messages.is_empty() {
                tx.execute(
                    "UPDATE messages SET read_at = ? WHERE worker_id = ? AND read_at IS NULL",
                    params![now, worker_id],
                )?;
            }
            tx.commit()?;
            Ok(messages)
        })
    }

    /// Record a worker's terminal completion and flip its status to `done`,
    /// as a single transaction: no reader can observe one without the other.
    pub fn store_completion(
        &self,
        worker_id: i64,
        completion: &NewCompletion,
    ) -> Result<(), StoreError> {
        let now = now();
        self.with_retry("store_completion", |conn| {
            let tx = conn.transaction()?;
            let rows = tx.execute(
                "UPDATE workers SET status = ?, phase = ?, updated_at = ? WHERE id = ?",
                params![status::DONE, phase::DONE, now, worker_id],
            )?;
            if rows == 0 {
                return Err(StoreError::WorkerNotFound(worker_id));
            }
            tx.execute(
                r#"
            INSERT INTO completions (
                worker_id, summary, files_changed, tests_added,
                pr_url, merged, follow_up_issues, lessons_learned, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
                params![
                    worker_id,
                    completion.summary,
                    completion.files_changed,
                    completion.tests_added,
                    completion.pr_url,
                    completion.merged as i64,
                    completion.follow_up_issues,
                    completion.lessons_learned,
                    now,
                ],
            )?;
            tx.commit()?;
            debug!(worker_id, "stored completion, worker done");
            Ok(())
        })
    }

    /// Read back a worker's completion record.
    pub fn get_completion(&self, worker_id: i64) -> Result<Option<Completion>, StoreError> {
        self.with_retry("get_completion", |conn| {
            let completion = conn
                .query_row(
                    "SELECT id, worker_id, summary, files_changed, tests_added,
                            pr_url, merged, follow_up_issues, lessons_learned, created_at
                     FROM completions WHERE worker_id = ? ORDER BY id DESC LIMIT 1",
                    params![worker_id],
                    |row| {
                        Ok(Completion {
                            id: row.get(0)?,
                            worker_id: row.get(1)?,
                            summary: row.get(2)?,
                            files_changed: row.get(3)?,
                            tests_added: row.get(4)?,
                            pr_url: row.get(5)?,
                            merged: row.get::<_, i64>(6)? != 0,
                            follow_up_issues: row.get(7)?,
                            lessons_learned: row.get(8)?,
                            created_at: row.get(9)?,
                        })
                    },
                )
                .optional()?;
            Ok(completion)
        })
    }

    /// Open a new session row for a worker, allocating the next
    /// per-worker session number in the same transaction.
    pub fn start_session(&self, worker_id: i64, session_id: &str) -> Result<i64, StoreError> {
        let now = now();
        self.with_retry("start_session", |conn| {
            let tx = conn.transaction()?;
            let number: i64 = tx.query_row(
                "SELECT COALESCE(MAX(session_number), 0) + 1 FROM sessions WHERE worker_id = ?",
                params![worker_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO sessions (worker_id, session_number, session_id, started_at)
                 VALUES (?, ?, ?, ?)",
                params![worker_id, number, session_id, now],
            )?;
            tx.commit()?;
            debug!(worker_id, session_number = number, "started session");
            Ok(number)
        })
    }

    /// Close an open session, recording why and how full the context was.
    ///
    /// A closed session is terminal; continuity is expressed by starting a
    /// new session row with the next number.
    pub fn end_session(
        &self,
        worker_id: i64,
        session_id: &str,
        end_reason: &str,
        context_at_end: Option<i64>,
        summary: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = now();
        self.with_retry("end_session", |conn| {
            let rows = conn.execute(
                "UPDATE sessions
                 SET ended_at = ?, end_reason = ?, context_at_end = ?, summary = ?
                 WHERE worker_id = ? AND session_id = ? AND ended_at IS NULL",
                params![now, end_reason, context_at_end, summary, worker_id, session_id],
            )?;
            if rows == 0 {
                return Err(StoreError::SessionNotFound {
                    worker_id,
                    session_id: session_id.to_string(),
                });
            }
            debug!(worker_id, session_id, end_reason, "ended session");
            Ok(())
        })
    }

    /// All sessions for a worker, in lineage order.
    pub fn sessions_for_worker(&self, worker_id: i64) -> Result<Vec<Session>, StoreError> {
        self.with_retry("sessions_for_worker", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, worker_id, session_number, session_id, started_at,
                        ended_at, end_reason, context_at_end, summary
                 FROM sessions WHERE worker_id = ? ORDER BY session_number",
            )?;
            let sessions = stmt
                .query_map(params![worker_id], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
    }

    /// The most recent session for a worker, if any.
    pub fn latest_session(&self, worker_id: i64) -> Result<Option<Session>, StoreError> {
        self.with_retry("latest_session", |conn| {
            let session = conn
                .query_row(
                    "SELECT id, worker_id, session_number, session_id, started_at,
                            ended_at, end_reason, context_at_end, summary
                     FROM sessions WHERE worker_id = ?
                     ORDER BY session_number DESC LIMIT 1",
                    params![worker_id],
                    row_to_session,
                )
                .optional()?;
            Ok(session)
        })
    }
}

fn row_to_worker(row: &rusqlite::Row<'_>) -> rusqlite::Result<Worker> {
    Ok(Worker {
        id: row.get(0)?,
        repo_path: row.get(1)?,
        repo_name: row.get(2)?,
        issue_number: row.get(3)?,
        jira_key: row.get(4)?,
        issue_source: row.get(5)?,
        branch: row.get(6)?,
        worktree_path: row.get(7)?,
        pid: row.get(8)?,
        status: row.get(9)?,
        phase: row.get(10)?,
        stage: row.get(11)?,
        pr_number: row.get(12)?,
        pr_url: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        worker_id: row.get(1)?,
        session_number: row.get(2)?,
        session_id: row.get(3)?,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
        end_reason: row.get(6)?,
        context_at_end: row.get(7)?,
        summary: row.get(8)?,
    })
}

/// Current timestamp, RFC 3339.
fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (WorkStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = WorkStore::open_at(&temp.path().join("crew.db")).unwrap();
        (store, temp)
    }

    fn sample_worker(store: &WorkStore) -> i64 {
        store
            .register_worker(&NewWorker {
                repo_path: "/home/user/repos/myrepo".to_string(),
                repo_name: "myrepo".to_string(),
                issue_number: Some(42),
                branch: "issue-42-fix-bug".to_string(),
                worktree_path: "/home/user/.crew/myrepo/issue-42-fix-bug".to_string(),
                pid: 12345,
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_open_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("crew.db");
        WorkStore::open_at(&path).unwrap();
        WorkStore::open_at(&path).unwrap();
        let store = WorkStore::open_at(&path).unwrap();
        assert!(store.get_worker(1).unwrap().is_none());
    }

    #[test]
    fn test_register_worker_defaults() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);

        let worker = store.get_worker(id).unwrap().unwrap();
        assert_eq!(worker.status, "starting");
        assert_eq!(worker.phase, "implementation");
        assert_eq!(worker.stage, "exploring");
        assert_eq!(worker.pid, 12345);
        assert!(worker.pr_number.is_none());
    }

    #[test]
    fn test_register_worker_with_jira() {
        let (store, _temp) = create_test_store();
        let id = store
            .register_worker(&NewWorker {
                repo_path: "/path/to/repo".to_string(),
                repo_name: "myrepo".to_string(),
                branch: "AIE-123-feature".to_string(),
                worktree_path: "/wt".to_string(),
                pid: 1234,
                jira_key: Some("AIE-123".to_string()),
                issue_source: Some("jira".to_string()),
                ..Default::default()
            })
            .unwrap();

        let worker = store.get_worker(id).unwrap().unwrap();
        assert_eq!(worker.jira_key.as_deref(), Some("AIE-123"));
        assert_eq!(worker.issue_source.as_deref(), Some("jira"));
        assert!(worker.issue_number.is_none());
    }

    #[test]
    fn test_register_replaces_existing() {
        let (store, _temp) = create_test_store();
        let new = NewWorker {
            repo_path: "/path/to/repo".to_string(),
            repo_name: "myrepo".to_string(),
            issue_number: Some(42),
            branch: "issue-42".to_string(),
            worktree_path: "/wt".to_string(),
            pid: 1111,
            ..Default::default()
        };
        let first = store.register_worker(&new).unwrap();

        // Intervening mutations should not survive re-registration.
        store.update_pr(first, 9, "https://x/pull/9").unwrap();

        let second = store
            .register_worker(&NewWorker { pid: 2222, ..new })
            .unwrap();

        // Upsert preserves the row id so child rows stay attached.
        assert_eq!(first, second);

        let worker = store.get_worker(second).unwrap().unwrap();
        assert_eq!(worker.pid, 2222);
        assert_eq!(worker.status, "starting");
        assert!(worker.pr_number.is_none());

        // Still exactly one row for the pair.
        let other = store
            .register_worker(&NewWorker {
                repo_path: "/path/to/repo".to_string(),
                repo_name: "myrepo".to_string(),
                branch: "issue-43".to_string(),
                worktree_path: "/wt2".to_string(),
                pid: 3333,
                ..Default::default()
            })
            .unwrap();
        assert_ne!(other, second);
    }

    #[test]
    fn test_update_status_and_phase() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);

        store.update_status(id, "running", None).unwrap();
        let worker = store.get_worker(id).unwrap().unwrap();
        assert_eq!(worker.status, "running");
        assert_eq!(worker.phase, "implementation");

        store.update_status(id, "pr_open", Some("ci_review")).unwrap();
        let worker = store.get_worker(id).unwrap().unwrap();
        assert_eq!(worker.status, "pr_open");
        assert_eq!(worker.phase, "ci_review");
    }

    #[test]
    fn test_update_status_unknown_worker() {
        let (store, _temp) = create_test_store();
        let err = store.update_status(999, "running", None).unwrap_err();
        assert!(matches!(err, StoreError::WorkerNotFound(999)));
    }

    #[test]
    fn test_update_stage_valid() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);

        store.update_stage(id, "implementing").unwrap();
        let worker = store.get_worker(id).unwrap().unwrap();
        assert_eq!(worker.stage, "implementing");
    }

    #[test]
    fn test_update_stage_logs_event() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);

        store.update_stage(id, "testing").unwrap();
        let events = store.events_for_worker(id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "stage_change");
        assert!(events[0].message.contains("testing"));
    }

    #[test]
    fn test_update_stage_invalid_rejected_without_event() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);

        let err = store.update_stage(id, "invalid_stage").unwrap_err();
        assert!(format!("{}", err).contains("invalid_stage"));

        let worker = store.get_worker(id).unwrap().unwrap();
        assert_eq!(worker.stage, "exploring");
        assert!(store.events_for_worker(id).unwrap().is_empty());
    }

    #[test]
    fn test_all_valid_stages_accepted() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);

        for stage in Stage::ALL {
            store.update_stage(id, stage.as_str()).unwrap();
            let worker = store.get_worker(id).unwrap().unwrap();
            assert_eq!(worker.stage, stage.as_str());
        }
    }

    #[test]
    fn test_update_pr_forces_review_phase() {
        let (store, _temp) = create_test_store();
        let id = store
            .register_worker(&NewWorker {
                repo_path: "/r".to_string(),
                repo_name: "r".to_string(),
                issue_number: Some(1),
                branch: "issue-1".to_string(),
                worktree_path: "/wt".to_string(),
                pid: 1,
                ..Default::default()
            })
            .unwrap();

        store.update_pr(id, 7, "https://x/pull/7").unwrap();

        let worker = store.get_worker(id).unwrap().unwrap();
        assert_eq!(worker.status, "pr_open");
        assert_eq!(worker.phase, "ci_review");
        assert_eq!(worker.pr_number, Some(7));
        assert_eq!(worker.pr_url.as_deref(), Some("https://x/pull/7"));
    }

    #[test]
    fn test_event_ordering() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);

        store.log_event(id, "event1", "First").unwrap();
        store.log_event(id, "event2", "Second").unwrap();
        store.log_event(id, "event3", "Third").unwrap();

        let events = store.events_for_worker(id).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, ["event1", "event2", "event3"]);
    }

    #[test]
    fn test_message_queue_read_once() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);

        store.send_message(id, "info", "Message 1").unwrap();
        store.send_message(id, "info", "Message 2").unwrap();

        let unread = store.receive_messages(id, false).unwrap();
        assert_eq!(unread.len(), 2);
        assert_eq!(unread[0].payload, "Message 1");
        assert!(unread[0].read_at.is_none());

        let first = store.receive_messages(id, true).unwrap();
        assert_eq!(first.len(), 2);

        let second = store.receive_messages(id, true).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_completion_flips_status_atomically() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);

        store
            .store_completion(
                id,
                &NewCompletion {
                    summary: "Fixed the bug".to_string(),
                    files_changed: "src/main.rs".to_string(),
                    tests_added: "tests/store.rs".to_string(),
                    pr_url: Some("https://github.com/org/repo/pull/42".to_string()),
                    merged: true,
                    lessons_learned: "Always write tests first".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        let completion = store.get_completion(id).unwrap().unwrap();
        assert_eq!(completion.summary, "Fixed the bug");
        assert!(completion.merged);

        let worker = store.get_worker(id).unwrap().unwrap();
        assert_eq!(worker.status, "done");
    }

    #[test]
    fn test_find_worker_by_issue_number() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);

        let found = store.find_worker_by_issue("42", Some("myrepo")).unwrap();
        assert_eq!(found, Some(id));
    }

    #[test]
    fn test_find_worker_by_jira_key() {
        let (store, _temp) = create_test_store();
        let id = store
            .register_worker(&NewWorker {
                repo_path: "/r".to_string(),
                repo_name: "myrepo".to_string(),
                branch: "AIE-999-feature".to_string(),
                worktree_path: "/wt".to_string(),
                pid: 1234,
                jira_key: Some("AIE-999".to_string()),
                issue_source: Some("jira".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(store.find_worker_by_issue("AIE-999", None).unwrap(), Some(id));
    }

    #[test]
    fn test_find_worker_not_found() {
        let (store, _temp) = create_test_store();
        assert!(store.find_worker_by_issue("99999", None).unwrap().is_none());
    }

    #[test]
    fn test_session_numbering_and_close() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);

        let n1 = store.start_session(id, "sess-a").unwrap();
        assert_eq!(n1, 1);

        store
            .end_session(id, "sess-a", "context_exhausted", Some(92), Some("half done"))
            .unwrap();

        let n2 = store.start_session(id, "sess-b").unwrap();
        assert_eq!(n2, 2);

        let sessions = store.sessions_for_worker(id).unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(!sessions[0].is_open());
        assert_eq!(sessions[0].end_reason.as_deref(), Some("context_exhausted"));
        assert_eq!(sessions[0].context_at_end, Some(92));
        assert!(sessions[1].is_open());

        let latest = store.latest_session(id).unwrap().unwrap();
        assert_eq!(latest.session_id, "sess-b");
    }

    #[test]
    fn test_end_session_unknown() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);
        let err = store
            .end_session(id, "missing", "completed", None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound { .. }));
    }

    #[test]
    fn test_end_session_is_terminal() {
        let (store, _temp) = create_test_store();
        let id = sample_worker(&store);
        store.start_session(id, "sess-a").unwrap();
        store.end_session(id, "sess-a", "completed", None, None).unwrap();

        // Already closed: never reopened or restamped.
        let err = store
            .end_session(id, "sess-a", "completed", None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound { .. }));
    }

    #[test]
    fn test_concurrent_style_reads() {
        // Two handles to the same file, as two processes would hold.
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("crew.db");
        let a = WorkStore::open_at(&path).unwrap();
        let b = WorkStore::open_at(&path).unwrap();

        let id = sample_worker(&a);
        b.update_stage(id, "testing").unwrap();

        let worker = a.get_worker(id).unwrap().unwrap();
        assert_eq!(worker.stage, "testing");
    }

    #[test]
    fn test_write_succeeds_under_contention() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("crew.db");
        let store = WorkStore::open_at(&path).unwrap();
        let id = sample_worker(&store);
        store.send_message(id, "info", "queued before lock").unwrap();

        // Another writer holds the write lock briefly, as a second worker
        // process would mid-transaction.
        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            blocker.execute_batch("COMMIT;").unwrap();
        });

        // Both the connection open and the write itself must outlast the
        // contention window instead of surfacing Busy.
        store.update_status(id, "running", None).unwrap();
        let messages = store.receive_messages(id, true).unwrap();
        handle.join().unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, "queued before lock");
        let worker = store.get_worker(id).unwrap().unwrap();
        assert_eq!(worker.status, "running");
    }
}
