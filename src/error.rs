// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the crew worker coordinator.
//!
//! This module provides strongly-typed errors for different parts of the
//! application, using `thiserror` for ergonomic error definitions and
//! `anyhow` for error propagation.

use thiserror::Error;

/// Errors that can occur against the shared worker store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    #[error("Worker not found: {0}")]
    WorkerNotFound(i64),

    #[error("Session not found for worker {worker_id}: {session_id}")]
    SessionNotFound { worker_id: i64, session_id: String },

    #[error("Store busy after {attempts} attempts: {message}")]
    Busy { attempts: u32, message: String },

    #[error("Store error: {0}")]
    Sqlite(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl StoreError {
    /// Check if this error is a transient lock conflict worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Errors that can occur while rewriting a transcript.
#[derive(Error, Debug)]
pub enum TranscriptError {
    #[error("Transcript not found: {0}")]
    NotFound(String),

    #[error("Failed to write trimmed transcript {path}: {message}")]
    WriteFailed { path: String, message: String },

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for TranscriptError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

/// Errors that can occur while building a session hand-off.
#[derive(Error, Debug)]
pub enum ContinuityError {
    #[error("Missing hand-off input: {0}")]
    MissingInput(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
