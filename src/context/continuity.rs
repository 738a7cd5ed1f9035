// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session continuity across context exhaustion.
//!
//! A worker whose context window fills up cannot keep the conversation; it
//! hands off to a fresh session instead. The hand-off is a structured prompt
//! built from the closing session's summary plus pointers back to the durable
//! state (the store and the parent transcript), and a new session row that
//! extends the worker's lineage chain.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::context::meter::context_percentage;
use crate::error::ContinuityError;
use crate::store::WorkStore;

/// Inputs for one hand-off prompt.
#[derive(Debug, Clone)]
pub struct ContinuationInput {
    pub worker_id: i64,
    /// Number of the session being started, not the one that ended.
    pub session_number: i64,
    /// Human-readable issue reference ("owner/repo#42", "PROJ-123").
    pub issue_ref: Option<String>,
    /// Context utilization observed when the parent session closed.
    pub context_percentage: Option<u8>,
    /// The closing session's hand-off summary.
    pub summary: String,
    /// Transcript file of the exhausted session.
    pub parent_transcript: PathBuf,
}

/// Result of [`rollover`]: the successor session and its opening prompt.
#[derive(Debug, Clone)]
pub struct Rollover {
    pub session_number: i64,
    pub prompt: String,
}

/// Build the hand-off prompt a successor session starts from.
///
/// The prompt has four fixed sections, in order: a continuation header, the
/// hand-off summary, instructions for retrieving durable memory, and the
/// session lineage. An empty summary or parent transcript path is rejected;
/// a hand-off without them would strand the successor.
pub fn build_continuation_prompt(input: &ContinuationInput) -> Result<String, ContinuityError> {
    if input.summary.trim().is_empty() {
        return Err(ContinuityError::MissingInput("summary"));
    }
    if input.parent_transcript.as_os_str().is_empty() {
        return Err(ContinuityError::MissingInput("parent_transcript"));
    }

    let mut prompt = String::new();

    // Section 1: continuation header.
    prompt.push_str(&format!(
        "# Continuing work (session {})\n\n",
        input.session_number
    ));
    match &input.issue_ref {
        Some(issue) => prompt.push_str(&format!(
            "You are resuming work on {}. Your previous session",
            issue
        )),
        None => prompt.push_str("You are resuming work. Your previous session"),
    }
    match input.context_percentage {
        Some(pct) => prompt.push_str(&format!(
            " ended at {}% context utilization and handed off to you.\n\n",
            pct
        )),
        None => prompt.push_str(" ran out of context and handed off to you.\n\n"),
    }

    // Section 2: hand-off summary.
    prompt.push_str("## Hand-off summary\n\n");
    prompt.push_str(input.summary.trim());
    prompt.push_str("\n\n");

    // Section 3: durable memory retrieval.
    prompt.push_str("## Recovering state\n\n");
    prompt.push_str(
        "Before doing anything else, rebuild your picture of the work:\n\
         1. Run `git status` and `git log --oneline -10` in your worktree to \
         see what has already been committed.\n\
         2. Check `crew messages` for unread coordinator messages.\n\
         3. Check `crew sessions` for the full session history of this worker.\n\
         Do not rely on conversational memory; the store and the repository \
         are the source of truth.\n\n",
    );

    // Section 4: lineage.
    prompt.push_str("## Session lineage\n\n");
    prompt.push_str(&format!(
        "Worker id: {}\nParent transcript: {}\n",
        input.worker_id,
        input.parent_transcript.display()
    ));

    Ok(prompt)
}

/// Close an exhausted session and open its successor.
///
/// The exhausted session is stamped `end_reason="context_exhausted"` with the
/// context percentage read from its transcript; the successor row gets the
/// next `session_number` for the worker. Returns the successor's number and
/// hand-off prompt. Closed sessions are never reopened.
pub fn rollover(
    store: &WorkStore,
    worker_id: i64,
    exhausted_session_id: &str,
    new_session_id: &str,
    summary: &str,
    parent_transcript: &Path,
    issue_ref: Option<&str>,
) -> Result<Rollover, ContinuityError> {
    if summary.trim().is_empty() {
        return Err(ContinuityError::MissingInput("summary"));
    }
    if parent_transcript.as_os_str().is_empty() {
        return Err(ContinuityError::MissingInput("parent_transcript"));
    }

    let context_at_end = context_percentage(parent_transcript);

    store.end_session(
        worker_id,
        exhausted_session_id,
        "context_exhausted",
        context_at_end.map(i64::from),
        Some(summary),
    )?;
    let session_number = store.start_session(worker_id, new_session_id)?;

    info!(
        worker_id,
        session_number,
        context_at_end = ?context_at_end,
        "rolled over to new session"
    );

    let prompt = build_continuation_prompt(&ContinuationInput {
        worker_id,
        session_number,
        issue_ref: issue_ref.map(str::to_string),
        context_percentage: context_at_end,
        summary: summary.to_string(),
        parent_transcript: parent_transcript.to_path_buf(),
    })?;

    Ok(Rollover {
        session_number,
        prompt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewWorker;
    use std::io::Write;
    use tempfile::TempDir;

    fn sample_input() -> ContinuationInput {
        ContinuationInput {
            worker_id: 7,
            session_number: 3,
            issue_ref: Some("acme/widgets#42".to_string()),
            context_percentage: Some(92),
            summary: "Implemented the parser; tests failing on edge case X.".to_string(),
            parent_transcript: PathBuf::from("/tmp/transcripts/session-2.jsonl"),
        }
    }

    #[test]
    fn test_prompt_contains_sections_in_order() {
        let prompt = build_continuation_prompt(&sample_input()).unwrap();

        let header = prompt.find("Continuing work (session 3)").unwrap();
        let summary = prompt.find("## Hand-off summary").unwrap();
        let recovery = prompt.find("## Recovering state").unwrap();
        let lineage = prompt.find("## Session lineage").unwrap();
        assert!(header < summary);
        assert!(summary < recovery);
        assert!(recovery < lineage);

        assert!(prompt.contains("acme/widgets#42"));
        assert!(prompt.contains("92% context"));
        assert!(prompt.contains("tests failing on edge case X"));
        assert!(prompt.contains("Worker id: 7"));
        assert!(prompt.contains("/tmp/transcripts/session-2.jsonl"));
    }

    #[test]
    fn test_prompt_without_issue_or_percentage() {
        let mut input = sample_input();
        input.issue_ref = None;
        input.context_percentage = None;

        let prompt = build_continuation_prompt(&input).unwrap();
        assert!(prompt.contains("You are resuming work."));
        assert!(prompt.contains("ran out of context"));
    }

    #[test]
    fn test_prompt_rejects_empty_summary() {
        let mut input = sample_input();
        input.summary = "   ".to_string();

        let err = build_continuation_prompt(&input).unwrap_err();
        assert!(matches!(err, ContinuityError::MissingInput("summary")));
    }

    #[test]
    fn test_prompt_rejects_empty_parent_path() {
        let mut input = sample_input();
        input.parent_transcript = PathBuf::new();

        let err = build_continuation_prompt(&input).unwrap_err();
        assert!(matches!(
            err,
            ContinuityError::MissingInput("parent_transcript")
        ));
    }

    #[test]
    fn test_rollover_closes_and_opens_sessions() {
        let temp = TempDir::new().unwrap();
        let store = WorkStore::open(temp.path()).unwrap();
        let worker_id = store
            .register_worker(&NewWorker {
                repo_path: "/repo".to_string(),
                repo_name: "repo".to_string(),
                branch: "fix-42".to_string(),
                worktree_path: "/worktrees/fix-42".to_string(),
                pid: 1234,
                ..Default::default()
            })
            .unwrap();
        store.start_session(worker_id, "run-1").unwrap();

        let transcript = temp.path().join("run-1.jsonl");
        let mut file = std::fs::File::create(&transcript).unwrap();
        writeln!(
            file,
            r#"{{"type": "metadata", "contextTokens": 92000, "maxContextTokens": 100000}}"#
        )
        .unwrap();

        let result = rollover(
            &store,
            worker_id,
            "run-1",
            "run-2",
            "Half done; see branch fix-42.",
            &transcript,
            Some("repo#42"),
        )
        .unwrap();

        assert_eq!(result.session_number, 2);
        assert!(result.prompt.contains("session 2"));
        assert!(result.prompt.contains("92% context"));

        let sessions = store.sessions_for_worker(worker_id).unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(!sessions[0].is_open());
        assert_eq!(sessions[0].end_reason.as_deref(), Some("context_exhausted"));
        assert_eq!(sessions[0].context_at_end, Some(92));
        assert_eq!(
            sessions[0].summary.as_deref(),
            Some("Half done; see branch fix-42.")
        );
        assert!(sessions[1].is_open());
        assert_eq!(sessions[1].session_id, "run-2");
    }

    #[test]
    fn test_rollover_without_transcript_metadata() {
        let temp = TempDir::new().unwrap();
        let store = WorkStore::open(temp.path()).unwrap();
        let worker_id = store
            .register_worker(&NewWorker {
                repo_path: "/repo".to_string(),
                repo_name: "repo".to_string(),
                branch: "main".to_string(),
                worktree_path: "/wt".to_string(),
                pid: 1,
                ..Default::default()
            })
            .unwrap();
        store.start_session(worker_id, "run-1").unwrap();

        let result = rollover(
            &store,
            worker_id,
            "run-1",
            "run-2",
            "Summary.",
            Path::new("/nonexistent/run-1.jsonl"),
            None,
        )
        .unwrap();

        assert!(result.prompt.contains("ran out of context"));
        let sessions = store.sessions_for_worker(worker_id).unwrap();
        assert_eq!(sessions[0].context_at_end, None);
    }
}
