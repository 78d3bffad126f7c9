//! Config file discovery and layered loading.
//!
//! 1. Parse `defaults.toml` → base
//! 2. Merge `~/.keygate/config.toml` (or `KEYGATE_HOME/config.toml`)
//! 3. Merge `{workspace}/.keygate/config.toml`
//! 4. Apply env var fallbacks for fields no file set
//! 5. Resolve `${VAR}` references
//! 6. Deserialize and validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::env::{apply_env_fallbacks, collect_env_vars, resolve_env_references};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MiB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A loaded configuration together with where each value came from.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// The final configuration.
    pub config: Config,
    /// Dotted field path → layer that set it.
    #[serde(skip)]
    pub field_sources: FieldSources,
    /// Files that contributed, lowest precedence first.
    pub loaded_files: Vec<String>,
}

impl ResolvedConfig {
    /// The layer that set `field` (dotted path), if known.
    #[must_use]
    pub fn source_of(&self, field: &str) -> Option<&ConfigLayer> {
        self.field_sources.get(field)
    }
}

/// Load the configuration with layered file precedence.
///
/// `workspace_root` enables the workspace layer. `home_override` is treated
/// as the `.keygate` directory itself, bypassing `~/.keygate` and
/// `KEYGATE_HOME`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is unreadable, oversized, or
/// malformed, or if the merged configuration fails validation.
pub fn load(
    workspace_root: Option<&Path>,
    home_override: Option<&Path>,
) -> ConfigResult<ResolvedConfig> {
    load_with_env(workspace_root, home_override, &collect_env_vars())
}

pub(crate) fn load_with_env(
    workspace_root: Option<&Path>,
    home_override: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    let user_config = if let Some(dir) = home_override {
        let path = dir.join("config.toml");
        try_load_file(&path)?.map(|overlay| (overlay, path))
    } else {
        discover_user_config(env_vars)?
    };

    if let Some((overlay, path)) = user_config {
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::User,
            &mut field_sources,
        );
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded user config");
    }

    if let Some(ws_root) = workspace_root {
        let ws_path = ws_root.join(".keygate").join("config.toml");
        if let Some(overlay) = try_load_file(&ws_path)? {
            deep_merge_tracking(
                &mut merged,
                &overlay,
                "",
                &ConfigLayer::Workspace,
                &mut field_sources,
            );
            loaded_files.push(ws_path.display().to_string());
            info!(path = %ws_path.display(), "loaded workspace config");
        }
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    resolve_env_references(&mut merged, env_vars);
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// `~/.keygate/config.toml`, falling back to `KEYGATE_HOME/config.toml`.
fn discover_user_config(
    env_vars: &HashMap<String, String>,
) -> ConfigResult<Option<(toml::Value, PathBuf)>> {
    let home_dir = home_directory()?;
    let user_path = home_dir.join(".keygate").join("config.toml");
    if let Some(overlay) = try_load_file(&user_path)? {
        return Ok(Some((overlay, user_path)));
    }

    let Some(keygate_home) = env_vars.get("KEYGATE_HOME") else {
        return Ok(None);
    };
    let Some(canonical) = validate_keygate_home(keygate_home, &home_dir) else {
        warn!(
            path = keygate_home,
            "KEYGATE_HOME is not a valid directory owned by current user; ignoring"
        );
        return Ok(None);
    };
    let alt_path = canonical.join("config.toml");
    Ok(try_load_file(&alt_path)?.map(|overlay| (overlay, alt_path)))
}

/// Load a config from a single file (no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, exceeds the size
/// limit, fails to parse, or fails validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    check_size(path, metadata.len())?;

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Read and parse a file, returning `None` if it does not exist.
///
/// Reads once and checks the size afterwards so there is no gap between a
/// stat and the read.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    check_size(path, u64::try_from(content.len()).unwrap_or(u64::MAX))?;

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

fn check_size(path: &Path, len: u64) -> ConfigResult<()> {
    if len > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {len} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit"
            ),
        });
    }
    Ok(())
}

/// Accept `KEYGATE_HOME` only if it is a directory owned by the owner of
/// `home_dir`. Returns the canonical path.
fn validate_keygate_home(raw_path: &str, home_dir: &Path) -> Option<PathBuf> {
    let canonical = PathBuf::from(raw_path).canonicalize().ok()?;

    if !canonical.is_dir() {
        return None;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let dir_uid = canonical.metadata().ok()?.uid();
        let home_uid = home_dir.metadata().ok()?.uid();
        if dir_uid != home_uid {
            return None;
        }
    }

    #[cfg(not(unix))]
    let _ = home_dir;

    Some(canonical)
}

fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
