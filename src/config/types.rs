// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Workspace configuration as written in a config file.
///
/// Every field is optional; unset fields fall back to the defaults in
/// [`ResolvedConfig`]. Files from several locations are merged, later
/// sources overriding earlier ones field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Extra instructions appended to every worker prompt.
    pub worker_guidelines: Option<String>,

    /// Extra instructions for the pre-merge review pass.
    pub review_guidelines: Option<String>,

    /// How picky the review pass should be ("lenient", "normal", "strict").
    pub review_strictness: Option<String>,

    /// Whether a worker must pass review before merging its PR.
    pub require_pre_merge_review: Option<bool>,

    /// Glob patterns excluded from review diffs.
    pub review_exclude_patterns: Option<Vec<String>>,

    /// Directory holding the shared database and worker worktrees.
    pub worktree_base: Option<PathBuf>,

    /// Character threshold for transcript trimming.
    pub trim_threshold: Option<usize>,

    /// Tool names whose outputs the trimmer truncates.
    pub trim_target_tools: Option<Vec<String>>,

    /// GitHub CLI binary workers should invoke.
    pub github_cli: Option<String>,
}

/// Fully-resolved configuration with defaults applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub worker_guidelines: String,
    pub review_guidelines: String,
    pub review_strictness: String,
    pub require_pre_merge_review: bool,
    pub review_exclude_patterns: Vec<String>,
    pub worktree_base: PathBuf,
    pub trim_threshold: usize,
    pub trim_target_tools: Vec<String>,
    pub github_cli: String,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            worker_guidelines: String::new(),
            review_guidelines: String::new(),
            review_strictness: "normal".to_string(),
            require_pre_merge_review: true,
            review_exclude_patterns: vec![
                "*.lock".to_string(),
                "package-lock.json".to_string(),
                "yarn.lock".to_string(),
                "Cargo.lock".to_string(),
            ],
            worktree_base: default_worktree_base(),
            trim_threshold: 500,
            trim_target_tools: vec![
                "Read".to_string(),
                "Bash".to_string(),
                "Grep".to_string(),
                "Glob".to_string(),
            ],
            github_cli: "gh".to_string(),
        }
    }
}

/// Default directory for the shared database and worktrees.
pub fn default_worktree_base() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".crew").join("worktrees"))
        .unwrap_or_else(|| PathBuf::from(".crew/worktrees"))
}
