// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in various locations.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::ConfigError;

use super::types::{ResolvedConfig, WorkspaceConfig};

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[".crew.json", ".crew/config.json", "crew.config.json"];

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".crew";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration from ~/.crew/config.json.
pub fn load_global_config() -> Result<Option<WorkspaceConfig>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Load workspace configuration from the workspace root.
///
/// Searches for config files in the following order:
/// 1. .crew.json
/// 2. .crew/config.json
/// 3. crew.config.json
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Resolve the effective configuration for a workspace.
///
/// Precedence (highest to lowest):
/// 1. Workspace config (.crew.json and friends)
/// 2. Global config (~/.crew/config.json)
/// 3. Default values
///
/// An unreadable or invalid config file is logged and skipped rather than
/// failing the command; the store must stay reachable even with a broken
/// config on disk.
pub fn resolve_config(workspace_root: &Path) -> ResolvedConfig {
    let mut resolved = ResolvedConfig::default();

    match load_global_config() {
        Ok(Some(config)) => apply_workspace_config(&mut resolved, &config),
        Ok(None) => {}
        Err(err) => warn!(error = %err, "ignoring invalid global config"),
    }

    match load_workspace_config(workspace_root) {
        Ok(Some(config)) => apply_workspace_config(&mut resolved, &config),
        Ok(None) => {}
        Err(err) => warn!(error = %err, "ignoring invalid workspace config"),
    }

    resolved
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: &WorkspaceConfig) {
    if let Some(ref guidelines) = config.worker_guidelines {
        result.worker_guidelines = guidelines.clone();
    }

    if let Some(ref guidelines) = config.review_guidelines {
        result.review_guidelines = guidelines.clone();
    }

    if let Some(ref strictness) = config.review_strictness {
        result.review_strictness = strictness.clone();
    }

    if let Some(required) = config.require_pre_merge_review {
        result.require_pre_merge_review = required;
    }

    if let Some(ref patterns) = config.review_exclude_patterns {
        // Extend rather than replace so the lockfile defaults survive.
        for pattern in patterns {
            if !result.review_exclude_patterns.contains(pattern) {
                result.review_exclude_patterns.push(pattern.clone());
            }
        }
    }

    if let Some(ref base) = config.worktree_base {
        result.worktree_base = base.clone();
    }

    if let Some(threshold) = config.trim_threshold {
        result.trim_threshold = threshold;
    }

    if config.trim_target_tools.is_some() {
        result.trim_target_tools = config.trim_target_tools.clone().unwrap_or_default();
    }

    if let Some(ref cli) = config.github_cli {
        result.github_cli = cli.clone();
    }
}

/// Save workspace configuration to a file.
pub fn save_workspace_config(
    workspace_root: &Path,
    config: &WorkspaceConfig,
    filename: Option<&str>,
) -> Result<PathBuf, ConfigError> {
    let filename = filename.unwrap_or(".crew.json");
    let path = workspace_root.join(filename);

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;

    Ok(path)
}

/// Initialize a new config file with default or provided configuration.
pub fn init_config(
    workspace_root: &Path,
    config: Option<WorkspaceConfig>,
) -> Result<PathBuf, ConfigError> {
    let config = config.unwrap_or_default();
    save_workspace_config(workspace_root, &config, None)
}
