use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::BerthConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["berth.toml", "berth.yaml", "berth.yml", "berth.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<BerthConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./berth.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/berth/berth.{toml,yaml,yml,json}` (user-global)
///
/// Returns `BerthConfig::default()` if no config file is found or the file
/// fails to parse.
pub fn discover_and_load() -> BerthConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return BerthConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            BerthConfig::default()
        },
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(path) = first_existing(Path::new(".")) {
        return Some(path);
    }

    home_dir().and_then(|h| first_existing(&h.join(".config").join("berth")))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the data directory: `~/.berth/`.
pub fn data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".berth"))
        .unwrap_or_else(|| PathBuf::from(".berth"))
}

/// Directory holding the container and browser registries.
pub fn sandbox_state_dir() -> PathBuf {
    data_dir().join("sandbox")
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<BerthConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
