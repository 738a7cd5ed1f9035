// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transcript trimming.
//!
//! Oversized tool outputs dominate a transcript's disk and context cost.
//! The trimmer rewrites a transcript, truncating `tool_result` contents
//! produced by targeted tools while passing every other record through
//! byte-for-byte in order. The rewritten file opens with a synthesized
//! `trim_metadata` record so downstream readers know the file was trimmed
//! and where the untrimmed original lives.
//!
//! Decoding is tolerant: a line that fails to parse, or parses to an
//! unexpected shape, passes through unchanged rather than failing the trim.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::TranscriptError;

/// Accounting for one trim run. `original_chars` and `trimmed_chars` count
/// conversation characters of the truncated items only; markers are
/// excluded, so `trimmed_chars < original_chars` whenever anything was
/// trimmed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrimStats {
    /// Number of tool_result contents truncated.
    pub trimmed_count: u64,
    /// Characters those contents held before truncation.
    pub original_chars: u64,
    /// Characters retained after truncation.
    pub trimmed_chars: u64,
}

/// Provenance header written as the first line of a trimmed transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrimMetadata {
    /// Absolute path of the untrimmed input file.
    pub parent_file: String,
    /// When the trim ran (RFC 3339).
    pub trimmed_at: String,
    /// Character threshold applied.
    pub threshold: usize,
    pub trimmed_count: u64,
    pub original_chars: u64,
    pub trimmed_chars: u64,
}

/// Truncate one tool output to `threshold` characters.
///
/// Content at or under the threshold is returned unchanged. Otherwise the
/// first `threshold` characters are kept and a deterministic marker is
/// appended recording how much was removed and where the untrimmed
/// original can be found. Re-applying with the same threshold never alters
/// the visible prefix.
pub fn truncate_content(
    content: &str,
    threshold: usize,
    tool_name: &str,
    line_number: usize,
    parent_file: &Path,
) -> String {
    let total = content.chars().count();
    if total <= threshold {
        return content.to_string();
    }

    let cut = content
        .char_indices()
        .nth(threshold)
        .map(|(idx, _)| idx)
        .unwrap_or(content.len());
    let removed = total - threshold;

    format!(
        "{}\n\n[... {} chars truncated from {} output; full content at line {} of {}]",
        &content[..cut],
        removed,
        tool_name,
        line_number,
        parent_file.display(),
    )
}

/// Map `tool_use` ids to tool names across a whole transcript.
///
/// `tool_result` records reference the producing tool only by id; this
/// mapping, built from the `assistant` records' `tool_use` items, resolves
/// the name.
pub fn build_tool_name_mapping(
    transcript_path: &Path,
) -> Result<HashMap<String, String>, TranscriptError> {
    let file = File::open(transcript_path)?;
    let reader = BufReader::new(file);

    let mut mapping = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let record: Value = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(_) => continue,
        };
        if record.get("type").and_then(Value::as_str) != Some("assistant") {
            continue;
        }
        let Some(items) = content_items(&record) else {
            continue;
        };
        for item in items {
            if item.get("type").and_then(Value::as_str) != Some("tool_use") {
                continue;
            }
            if let (Some(id), Some(name)) = (
                item.get("id").and_then(Value::as_str),
                item.get("name").and_then(Value::as_str),
            ) {
                mapping.insert(id.to_string(), name.to_string());
            }
        }
    }
    Ok(mapping)
}

/// Rewrite a transcript, truncating oversized outputs of targeted tools.
///
/// Two passes: the first builds the tool-name mapping over the whole input,
/// the second streams every record through, truncating only `tool_result`
/// contents whose producing tool is in `target_tools`. Record count and
/// order are preserved; untouched records pass through byte-for-byte.
///
/// Publication is all-or-nothing: the output is assembled at a temporary
/// sibling path and renamed into place, so a failed trim leaves no partial
/// file and the input remains the authoritative record.
pub fn trim_transcript(
    input_path: &Path,
    output_path: &Path,
    threshold: usize,
    target_tools: &HashSet<String>,
) -> Result<TrimStats, TranscriptError> {
    let mapping = build_tool_name_mapping(input_path)?;
    let parent_file = absolute(input_path);

    let body_path = sibling_tmp(output_path, "body.tmp");
    let final_path = sibling_tmp(output_path, "tmp");

    let result = write_trimmed(
        input_path,
        &parent_file,
        &body_path,
        &final_path,
        output_path,
        threshold,
        target_tools,
        &mapping,
    );

    if result.is_err() {
        let _ = std::fs::remove_file(&body_path);
        let _ = std::fs::remove_file(&final_path);
    } else {
        let _ = std::fs::remove_file(&body_path);
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn write_trimmed(
    input_path: &Path,
    parent_file: &Path,
    body_path: &Path,
    final_path: &Path,
    output_path: &Path,
    threshold: usize,
    target_tools: &HashSet<String>,
    mapping: &HashMap<String, String>,
) -> Result<TrimStats, TranscriptError> {
    let input = File::open(input_path)?;
    let reader = BufReader::new(input);

    let mut stats = TrimStats::default();

    // Pass 2: stream records into the body file, truncating as we go.
    {
        let mut body = BufWriter::new(File::create(body_path)?);
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = idx + 1;
            let written = process_line(
                &line,
                line_number,
                threshold,
                target_tools,
                mapping,
                parent_file,
                &mut stats,
            );
            body.write_all(written.as_bytes())?;
            body.write_all(b"\n")?;
        }
        body.flush()?;
    }

    // Assemble header + body and publish atomically.
    let header = TrimMetadata {
        parent_file: parent_file.display().to_string(),
        trimmed_at: chrono::Utc::now().to_rfc3339(),
        threshold,
        trimmed_count: stats.trimmed_count,
        original_chars: stats.original_chars,
        trimmed_chars: stats.trimmed_chars,
    };
    let header_line = serde_json::to_string(&serde_json::json!({ "trim_metadata": header }))
        .map_err(|e| TranscriptError::WriteFailed {
            path: output_path.display().to_string(),
            message: e.to_string(),
        })?;

    {
        let mut out = BufWriter::new(File::create(final_path)?);
        out.write_all(header_line.as_bytes())?;
        out.write_all(b"\n")?;
        let mut body = File::open(body_path)?;
        std::io::copy(&mut body, &mut out)?;
        out.flush()?;
    }
    std::fs::rename(final_path, output_path).map_err(|e| TranscriptError::WriteFailed {
        path: output_path.display().to_string(),
        message: e.to_string(),
    })?;

    info!(
        input = %input_path.display(),
        output = %output_path.display(),
        trimmed_count = stats.trimmed_count,
        original_chars = stats.original_chars,
        trimmed_chars = stats.trimmed_chars,
        "trimmed transcript"
    );
    Ok(stats)
}

/// Process one input line; returns the line to write (possibly unchanged).
fn process_line(
    line: &str,
    line_number: usize,
    threshold: usize,
    target_tools: &HashSet<String>,
    mapping: &HashMap<String, String>,
    parent_file: &Path,
    stats: &mut TrimStats,
) -> String {
    let Ok(mut record) = serde_json::from_str::<Value>(line) else {
        return line.to_string();
    };
    if record.get("type").and_then(Value::as_str) != Some("user") {
        return line.to_string();
    }

    let mut changed = false;
    if let Some(items) = content_items_mut(&mut record) {
        for item in items.iter_mut() {
            if item.get("type").and_then(Value::as_str) != Some("tool_result") {
                continue;
            }
            let tool_name = item
                .get("tool_use_id")
                .and_then(Value::as_str)
                .and_then(|id| mapping.get(id));
            let Some(tool_name) = tool_name else {
                continue;
            };
            if !target_tools.contains(tool_name) {
                continue;
            }
            let tool_name = tool_name.clone();
            if let Some(content) = item.get_mut("content") {
                if truncate_in_place(content, threshold, &tool_name, line_number, parent_file, stats)
                {
                    changed = true;
                }
            }
        }
    }

    if changed {
        debug!(line_number, "truncated tool_result record");
        // Re-serialize only mutated records; everything else stays verbatim.
        serde_json::to_string(&record).unwrap_or_else(|_| line.to_string())
    } else {
        line.to_string()
    }
}

/// Truncate a tool_result content value in place, updating stats.
///
/// Content is either a plain string or an array of `{type: "text", text}`
/// blocks; anything else passes through untouched.
fn truncate_in_place(
    content: &mut Value,
    threshold: usize,
    tool_name: &str,
    line_number: usize,
    parent_file: &Path,
    stats: &mut TrimStats,
) -> bool {
    match content {
        Value::String(text) => {
            let total = text.chars().count();
            if total <= threshold {
                return false;
            }
            *text = truncate_content(text, threshold, tool_name, line_number, parent_file);
            stats.trimmed_count += 1;
            stats.original_chars += total as u64;
            stats.trimmed_chars += threshold as u64;
            true
        }
        Value::Array(blocks) => {
            let mut changed = false;
            for block in blocks.iter_mut() {
                if block.get("type").and_then(Value::as_str) != Some("text") {
                    continue;
                }
                let Some(Value::String(text)) = block.get_mut("text") else {
                    continue;
                };
                let total = text.chars().count();
                if total <= threshold {
                    continue;
                }
                *text = truncate_content(text, threshold, tool_name, line_number, parent_file);
                stats.trimmed_count += 1;
                stats.original_chars += total as u64;
                stats.trimmed_chars += threshold as u64;
                changed = true;
            }
            changed
        }
        _ => false,
    }
}

/// Content items of a record, found under `message.content` (agent
/// transcripts) or a top-level `content` array.
fn content_items(record: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = record
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
    {
        return Some(items);
    }
    record.get("content").and_then(Value::as_array)
}

fn content_items_mut(record: &mut Value) -> Option<&mut Vec<Value>> {
    let nested = record
        .get("message")
        .and_then(|m| m.get("content"))
        .map_or(false, Value::is_array);
    if nested {
        return record
            .get_mut("message")
            .and_then(|m| m.get_mut("content"))
            .and_then(Value::as_array_mut);
    }
    record.get_mut("content").and_then(Value::as_array_mut)
}

fn sibling_tmp(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "transcript".to_string());
    path.with_file_name(format!(".{}.{}", name, suffix))
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
