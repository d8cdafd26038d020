// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Environment variable overriding the config location.
pub const CONFIG_ENV: &str = "MSC_CONFIG";
pub const DEFAULT_CONFIG: &str = "config.yaml";

/// Config location: first CLI argument, then `$MSC_CONFIG`, then
/// `config.yaml` in the working directory.
pub fn config_arg() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
}

/// Make `rel` absolute against the working directory and canonicalize it,
/// so errors name the file that was actually looked up.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    abs.canonicalize()
        .with_context(|| format!("config file {abs:?} not found"))
}
