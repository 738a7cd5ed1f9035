// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Context utilization measurement.
//!
//! Agent transcripts are newline-delimited JSON records. Records of type
//! `metadata` periodically report `contextTokens` and `maxContextTokens`;
//! the most recent one tells us how full the session's context window is.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::Value;

/// Extract the context utilization percentage from a transcript file.
///
/// Scans for the last `metadata` record carrying both token counters and
/// returns `round(100 * contextTokens / maxContextTokens)`. A missing file,
/// unparseable lines, or the absence of any metadata record all yield
/// `None`: an agent that has not reported usage yet is routine, not an
/// error.
pub fn context_percentage(transcript_path: &Path) -> Option<u8> {
    let file = File::open(transcript_path).ok()?;
    let reader = BufReader::new(file);

    let mut latest: Option<(u64, u64)> = None;
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let record: Value = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(_) => continue,
        };
        if record.get("type").and_then(Value::as_str) != Some("metadata") {
            continue;
        }
        let context = record.get("contextTokens").and_then(Value::as_u64);
        let max = record.get("maxContextTokens").and_then(Value::as_u64);
        if let (Some(context), Some(max)) = (context, max) {
            if max > 0 {
                latest = Some((context, max));
            }
        }
    }

    latest.map(|(context, max)| {
        let pct = (context as f64 / max as f64) * 100.0;
        pct.round().clamp(0.0, 100.0) as u8
    })
}
