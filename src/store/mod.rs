// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared worker state store.
//!
//! A multi-writer, crash-tolerant registry of worker identity, lifecycle
//! status, messages, and audit events, backed by one SQLite file that every
//! worker process opens independently.

mod db;
mod types;

pub use db::{WorkStore, DB_FILE};
pub use types::{
    phase, status, Completion, Event, Message, NewCompletion, NewWorker, Session, Stage, Worker,
};
