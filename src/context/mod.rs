// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Context and session continuity engine.
//!
//! Measures context-window utilization from agent transcripts, trims
//! oversized tool outputs out of them, and builds the hand-off that lets a
//! fresh session continue a context-exhausted one.

pub mod continuity;
pub mod meter;
pub mod trim;

pub use continuity::{build_continuation_prompt, rollover, ContinuationInput, Rollover};
pub use meter::context_percentage;
pub use trim::{build_tool_name_mapping, trim_transcript, truncate_content, TrimMetadata, TrimStats};
