// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Crew - coordination for fleets of AI coding workers.
//!
//! Many independent agent processes, one per issue and branch, each in its
//! own git worktree, share a single SQLite database for identity, lifecycle
//! state, messaging, and session history. Crew also manages each worker's
//! conversation-context lifecycle: measuring utilization, trimming bloated
//! transcripts, and handing off to a fresh session when the window fills.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`error`] - Error types and result aliases
//! - [`config`] - Workspace configuration loading and resolution
//! - [`store`] - Shared worker state store (registry, events, messages,
//!   completions, sessions)
//! - [`context`] - Context meter, transcript trimmer, session continuity
//! - [`issue`] - Issue reference parsing (GitHub URLs, JIRA keys, slugs)
//! - [`prompt`] - Worker prompt generation
//!
//! # Example
//!
//! ```rust,ignore
//! use crew::store::{NewWorker, WorkStore};
//!
//! let store = WorkStore::open(&worktree_base)?;
//! let worker_id = store.register_worker(&NewWorker {
//!     repo_path: "/home/me/src/widgets".into(),
//!     repo_name: "widgets".into(),
//!     branch: "fix-42".into(),
//!     worktree_path: "/home/me/.crew/worktrees/widgets-fix-42".into(),
//!     pid: std::process::id() as i64,
//!     ..Default::default()
//! })?;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod issue;
pub mod prompt;
pub mod store;

// Re-export commonly used types at crate root
pub use config::{ResolvedConfig, WorkspaceConfig};
pub use context::{context_percentage, trim_transcript, TrimStats};
pub use error::{ConfigError, ContinuityError, Result, StoreError, TranscriptError};
pub use store::{NewWorker, Stage, WorkStore, Worker};

/// Crew version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
