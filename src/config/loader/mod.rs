use crate::config::Config;
use crate::utils::{ensure_dir, get_hookrelay_home};
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Overrides `webhook.url`.
pub const WEBHOOK_URL_ENV: &str = "HOOKRELAY_WEBHOOK_URL";
/// Hosting platforms inject the listen port here.
pub const PORT_ENV: &str = "PORT";

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_hookrelay_home()?.join("config.json"))
}

/// Load, override from the environment, and validate the configuration.
///
/// A missing file yields the defaults. Validation failures are returned
/// immediately so a bad webhook URL stops the process at startup instead of
/// failing on every message.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = read_config(config_path)?;
    config
        .validate()
        .with_context(|| "Configuration validation failed")?;
    Ok(config)
}

/// Load the configuration with environment overrides but without validation.
///
/// For commands that only need the session path and must work even when the
/// webhook settings are broken.
pub fn read_config(config_path: Option<&Path>) -> Result<Config> {
    let mut config = read_config_file(config_path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn read_config_file(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    if !path.exists() {
        debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    // Shared lock on the sibling lock file; blocks while `save_config` writes
    let lock_path = lock_path_for(path);
    let _lock = match fs::File::open(&lock_path) {
        Ok(file) => {
            file.lock_shared()
                .with_context(|| "Failed to acquire shared lock on config lock file")?;
            Some(file)
        }
        Err(_) => None,
    };

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let config: Config = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?;

    check_file_permissions(path);
    Ok(config)
}

/// Apply environment overrides. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(WEBHOOK_URL_ENV).filter(|v| !v.trim().is_empty()) {
        config.webhook.url = url.trim().to_string();
    }
    if let Some(port) = lookup(PORT_ENV).filter(|v| !v.trim().is_empty()) {
        config.liveness.port = port
            .trim()
            .parse()
            .with_context(|| format!("{} must be a port number, got '{}'", PORT_ENV, port))?;
    }
    Ok(())
}

#[cfg(unix)]
fn check_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                "config file {} has permissions {:o}, recommend 0600",
                path.display(),
                mode & 0o777
            );
        }
    }
}

#[cfg(not(unix))]
fn check_file_permissions(_path: &Path) {}

fn lock_path_for(path: &Path) -> PathBuf {
    path.with_extension("json.lock")
}

pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<()> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    ensure_dir(path.parent().context("Config path has no parent")?)?;

    // atomic_write() renames over the target, which would drop a lock held on
    // the original inode; lock a sibling file instead.
    let lock_path = lock_path_for(path);
    let lock_file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to create lock file at {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .with_context(|| "Failed to acquire exclusive lock on config lock file")?;

    let content = serde_json::to_string_pretty(config)?;
    crate::utils::atomic_write(path, &content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }

    Ok(())
}
