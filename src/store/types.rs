// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Row types for the shared worker store.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Worker lifecycle statuses. The status column is an open string so that
/// operators can record intermediate states; these are the well-known ones.
pub mod status {
    pub const STARTING: &str = "starting";
    pub const RUNNING: &str = "running";
    pub const PR_OPEN: &str = "pr_open";
    pub const DONE: &str = "done";
    pub const FAILED: &str = "failed";
}

/// Coarse workflow phases a worker moves through.
pub mod phase {
    pub const IMPLEMENTATION: &str = "implementation";
    pub const CI_REVIEW: &str = "ci_review";
    pub const MERGE: &str = "merge";
    pub const FOLLOW_UP: &str = "follow_up";
    pub const DONE: &str = "done";
}

/// Fine-grained activity labels within a worker's lifecycle.
///
/// This is a closed set: the store rejects any stage value outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading the issue and surveying the codebase.
    Exploring,
    /// Deciding on an approach.
    Planning,
    /// Writing the change.
    Implementing,
    /// Running or writing tests.
    Testing,
    /// Self-review or addressing review feedback.
    Reviewing,
    /// Fixing CI failures.
    FixingCi,
    /// Waiting on CI or a human.
    Waiting,
    /// Merging the pull request.
    Merging,
    /// Filing follow-up issues.
    FollowUps,
    /// Writing the completion summary.
    Summarizing,
}

impl Stage {
    /// Every valid stage, in lifecycle order.
    pub const ALL: &'static [Stage] = &[
        Stage::Exploring,
        Stage::Planning,
        Stage::Implementing,
        Stage::Testing,
        Stage::Reviewing,
        Stage::FixingCi,
        Stage::Waiting,
        Stage::Merging,
        Stage::FollowUps,
        Stage::Summarizing,
    ];

    /// The stage name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Exploring => "exploring",
            Stage::Planning => "planning",
            Stage::Implementing => "implementing",
            Stage::Testing => "testing",
            Stage::Reviewing => "reviewing",
            Stage::FixingCi => "fixing_ci",
            Stage::Waiting => "waiting",
            Stage::Merging => "merging",
            Stage::FollowUps => "follow_ups",
            Stage::Summarizing => "summarizing",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| StoreError::InvalidStage(s.to_string()))
    }
}

/// A registered worker: one agent process bound to a single worktree/branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    /// Row id. Stable across re-registration of the same repo+branch.
    pub id: i64,
    /// Absolute path to the main repository.
    pub repo_path: String,
    /// Short repository name.
    pub repo_name: String,
    /// GitHub issue number, when the task came from GitHub.
    pub issue_number: Option<i64>,
    /// JIRA issue key, when the task came from JIRA.
    pub jira_key: Option<String>,
    /// Where the issue reference came from ("github", "jira").
    pub issue_source: Option<String>,
    /// Branch the worker owns.
    pub branch: String,
    /// Worktree directory the worker operates in.
    pub worktree_path: String,
    /// OS process id of the worker.
    pub pid: i64,
    /// Lifecycle status (open set, see [`status`]).
    pub status: String,
    /// Workflow phase (see [`phase`]).
    pub phase: String,
    /// Fine-grained activity label (closed set, see [`Stage`]).
    pub stage: String,
    /// Pull request number, once opened.
    pub pr_number: Option<i64>,
    /// Pull request URL, once opened.
    pub pr_url: Option<String>,
    /// Registration timestamp (RFC 3339).
    pub created_at: String,
    /// Last mutation timestamp (RFC 3339).
    pub updated_at: String,
}

/// Fields required to register a worker.
#[derive(Debug, Clone, Default)]
pub struct NewWorker {
    pub repo_path: String,
    pub repo_name: String,
    pub issue_number: Option<i64>,
    pub jira_key: Option<String>,
    pub issue_source: Option<String>,
    pub branch: String,
    pub worktree_path: String,
    pub pid: i64,
}

/// One append-only audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub worker_id: i64,
    pub event_type: String,
    pub message: String,
    pub created_at: String,
}

/// A message queued for a worker. `read_at` stays NULL until consumed;
/// consumption marks rather than deletes, so the payload remains
/// inspectable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub worker_id: i64,
    pub message_type: String,
    pub payload: String,
    pub created_at: String,
    pub read_at: Option<String>,
}

/// Terminal record for a finished worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub id: i64,
    pub worker_id: i64,
    pub summary: String,
    pub files_changed: String,
    pub tests_added: String,
    pub pr_url: Option<String>,
    pub merged: bool,
    pub follow_up_issues: String,
    pub lessons_learned: String,
    pub created_at: String,
}

/// Input for [`crate::store::WorkStore::store_completion`].
#[derive(Debug, Clone, Default)]
pub struct NewCompletion {
    pub summary: String,
    pub files_changed: String,
    pub tests_added: String,
    pub pr_url: Option<String>,
    pub merged: bool,
    pub follow_up_issues: String,
    pub lessons_learned: String,
}

/// One bounded agent run. `session_number` increments per worker, forming
/// the lineage chain used for hand-offs between context-exhausted runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub worker_id: i64,
    pub session_number: i64,
    /// Identifier assigned by the agent runtime.
    pub session_id: String,
    pub started_at: String,
    /// Set exactly once, when the session closes. Never reopened.
    pub ended_at: Option<String>,
    pub end_reason: Option<String>,
    /// Context utilization percentage observed at close.
    pub context_at_end: Option<i64>,
    pub summary: Option<String>,
}

impl Session {
    /// Whether the session is still open.
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}
