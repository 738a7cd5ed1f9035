// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end tests for the context engine: meter, trimmer, continuity.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use serde_json::Value;
use tempfile::TempDir;

use crew::context::{context_percentage, rollover, trim_transcript};
use crew::store::{NewWorker, WorkStore};

fn write_transcript(path: &Path, lines: &[String]) {
    let mut file = std::fs::File::create(path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
}

// ============================================================================
// Trim End-to-End
// ============================================================================

#[test]
fn test_trim_oversized_read_output() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("session.jsonl");
    let output = temp.path().join("session.trimmed.jsonl");

    write_transcript(
        &input,
        &[
            serde_json::json!({
                "type": "assistant",
                "message": {"content": [
                    {"type": "text", "text": "Reading the file now."},
                    {"type": "tool_use", "id": "toolu_01", "name": "Read"}
                ]}
            })
            .to_string(),
            serde_json::json!({
                "type": "user",
                "message": {"content": [
                    {"type": "tool_result", "tool_use_id": "toolu_01", "content": "x".repeat(1000)}
                ]}
            })
            .to_string(),
            serde_json::json!({
                "type": "metadata",
                "contextTokens": 40000,
                "maxContextTokens": 100000
            })
            .to_string(),
        ],
    );

    let targets: HashSet<String> = ["Read".to_string()].into();
    let stats = trim_transcript(&input, &output, 500, &targets).unwrap();
    assert!(stats.trimmed_count >= 1);
    assert!(stats.trimmed_chars < stats.original_chars);

    let content = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    // One header plus the three original records, in order
    assert_eq!(lines.len(), 4);

    let header: Value = serde_json::from_str(lines[0]).unwrap();
    let meta = &header["trim_metadata"];
    assert_eq!(meta["threshold"].as_u64(), Some(500));
    assert!(meta["trimmed_count"].as_u64().unwrap() >= 1);
    assert!(meta["parent_file"].as_str().unwrap().ends_with("session.jsonl"));

    // The tool_result shrank; everything else survived
    let user: Value = serde_json::from_str(lines[2]).unwrap();
    let result = user["message"]["content"][0]["content"].as_str().unwrap();
    assert!(result.chars().count() < 1000);
    assert!(result.starts_with(&"x".repeat(500)));

    // The trimmed file still meters correctly
    assert_eq!(context_percentage(&output), Some(40));

    // The input is untouched
    let original = std::fs::read_to_string(&input).unwrap();
    assert!(original.contains(&"x".repeat(1000)));
}

// ============================================================================
// Rollover End-to-End
// ============================================================================

#[test]
fn test_exhaustion_rollover_produces_usable_handoff() {
    let temp = TempDir::new().unwrap();
    let store = WorkStore::open(temp.path()).unwrap();

    let worker_id = store
        .register_worker(&NewWorker {
            repo_path: "/home/dev/src/widgets".to_string(),
            repo_name: "widgets".to_string(),
            issue_number: Some(42),
            branch: "fix-42".to_string(),
            worktree_path: "/home/dev/.crew/worktrees/widgets-fix-42".to_string(),
            pid: 4242,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(store.start_session(worker_id, "run-1").unwrap(), 1);

    let transcript = temp.path().join("run-1.jsonl");
    write_transcript(
        &transcript,
        &[serde_json::json!({
            "type": "metadata",
            "contextTokens": 95000,
            "maxContextTokens": 100000
        })
        .to_string()],
    );

    let result = rollover(
        &store,
        worker_id,
        "run-1",
        "run-2",
        "Parser done, still fixing the CI flake in test_alignment.",
        &transcript,
        Some("widgets#42"),
    )
    .unwrap();

    assert_eq!(result.session_number, 2);
    assert!(result.prompt.contains("widgets#42"));
    assert!(result.prompt.contains("95% context"));
    assert!(result.prompt.contains("test_alignment"));
    assert!(result.prompt.contains(&transcript.display().to_string()));

    let sessions = store.sessions_for_worker(worker_id).unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].end_reason.as_deref(), Some("context_exhausted"));
    assert_eq!(sessions[0].context_at_end, Some(95));
    assert!(sessions[1].is_open());

    let latest = store.latest_session(worker_id).unwrap().unwrap();
    assert_eq!(latest.session_number, 2);
    assert_eq!(latest.session_id, "run-2");
}
