//! Reading and writing the configuration document on disk.

use std::path::Path;

use eyre::WrapErr as _;
use tokio::fs;

use crate::config::ConfigSnapshot;

/// Reads and parses the configuration from a TOML file.
///
/// A missing file yields the default document (first run); a present but
/// malformed file is an error and aborts startup.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn load_or_default(path: &Path) -> eyre::Result<ConfigSnapshot> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ConfigSnapshot::default());
        }
        Err(e) => {
            return Err(e)
                .wrap_err_with(|| format!("failed to read config file at {}", path.display()));
        }
    };
    toml::from_str(&content)
        .wrap_err_with(|| format!("failed to parse config as TOML at {}", path.display()))
}

/// Persists the configuration as TOML.
///
/// Writes a temporary file next to the target and renames it into place so a
/// crash mid-write never leaves a truncated document behind.
///
/// # Errors
///
/// Returns an error when serialization or any filesystem step fails.
pub async fn save(path: &Path, config: &ConfigSnapshot) -> eyre::Result<()> {
    let content = toml::to_string_pretty(config).wrap_err("failed to serialize config")?;

    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &content)
        .await
        .wrap_err_with(|| format!("failed to write config to {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .wrap_err_with(|| format!("failed to move config into place at {}", path.display()))?;
    Ok(())
}
