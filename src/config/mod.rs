// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workspace configuration.
//!
//! Config files live at the workspace root (`.crew.json`, `.crew/config.json`,
//! `crew.config.json`; JSON or YAML) with a global fallback at
//! `~/.crew/config.json`. A broken config never blocks a command; it is
//! logged and the defaults apply.

mod loader;
mod types;

pub use loader::{
    get_global_config_dir, get_global_config_path, init_config, load_config_file,
    load_global_config, load_workspace_config, resolve_config, save_workspace_config,
    CONFIG_FILES,
};
pub use types::{default_worktree_base, ResolvedConfig, WorkspaceConfig};
