// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Worker prompt generation.
//!
//! The prompt a freshly-launched worker starts from: six workflow phases
//! covering implementation through completion, parameterized by the issue
//! reference, the GitHub CLI binary, an optional JIRA key, and the
//! workspace's worker guidelines. Resumed sessions start from the
//! continuity builder's hand-off prompt instead.

use crate::config::ResolvedConfig;

/// Build the opening prompt for a new worker session.
pub fn generate_worker_prompt(
    task_ref: &str,
    jira_key: Option<&str>,
    config: &ResolvedConfig,
) -> String {
    let gh = &config.github_cli;
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are an autonomous coding worker. Your task: {}\n\n",
        task_ref
    ));
    prompt.push_str(
        "Read CLAUDE.md in the repository root first if it exists; it holds \
         project conventions you must follow.\n\n",
    );

    if let Some(key) = jira_key {
        prompt.push_str(&format!(
            "This task comes from JIRA issue {key}. Use the Atlassian MCP \
             server to read it: call getJiraIssue with key {key} before \
             starting, and check it for acceptance criteria and linked \
             context.\n\n",
        ));
    }

    prompt.push_str(&format!(
        "## Phase 1: Implementation\n\n\
         Explore the codebase, plan your approach, and implement the change \
         on your branch. Update your progress as you go with `crew stage` \
         and check `crew messages` periodically for coordinator messages. \
         Commit in small, coherent steps.\n\n\
         ## Phase 2: Pull Request\n\n\
         Self-review your diff before opening a PR; this step is REQUIRED. \
         Then open the PR with `{gh} pr create`, referencing the issue in \
         the description, and record it with `crew pr`.\n\n\
         ## Phase 3: CI & Review Loop\n\n\
         Watch CI with `{gh} pr checks` and fix failures as they appear. \
         Address every review comment. Re-request review after pushing \
         fixes.\n\n\
         ## Phase 4: Merge\n\n\
         NEVER merge without an approving review",
    ));
    if config.require_pre_merge_review {
        prompt.push_str(" and a passing --pre-merge review pass");
    }
    prompt.push_str(&format!(
        ". Once approved and green, merge with `{gh} pr merge`.\n\n\
         ## Phase 5: Follow-up Issues (REQUIRED)\n\n\
         File an issue with `{gh} issue create` for every piece of deferred \
         work, tech debt you noticed, or edge case you chose not to handle. \
         An empty list is acceptable only if there genuinely is nothing.\n\n\
         ## Phase 6: Completion Summary\n\n\
         Record the outcome with `crew done`: what changed, tests added, \
         whether the PR merged, follow-up issues filed, and lessons \
         learned.\n",
    ));

    let guidelines = config.worker_guidelines.trim();
    if !guidelines.is_empty() {
        prompt.push_str(&format!("\n## Project guidelines\n\n{}\n", guidelines));
    }

    prompt
}
