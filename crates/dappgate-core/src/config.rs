//! Configuration resolution for dappgate.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/dappgate/settings.json)
//! 3. Project config (.dappgate/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete dappgate configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub approval: ApprovalSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub broadcast: BroadcastSettings,
}

/// Background host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

/// Connection approval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSettings {
    /// Seconds an approval prompt stays open before it counts as rejected.
    pub timeout_secs: u64,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

impl ApprovalSettings {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Page-side provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Timeout for ordinary calls (seconds).
    pub request_timeout_secs: u64,
    /// Timeout for `eth_requestAccounts` (seconds). Must exceed the approval
    /// window so the background's own timeout is what the page observes.
    pub account_request_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            account_request_timeout_secs: 130,
        }
    }
}

/// Notification fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSettings {
    /// Per-tab delivery timeout (milliseconds).
    pub delivery_timeout_ms: u64,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: 2_000,
        }
    }
}

impl BroadcastSettings {
    pub const fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        let global = load_config_file(&global_path)?;
        merge_config(&mut config, global);
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".dappgate").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    // Apply environment overrides
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("dappgate").join("settings.json"))
}

/// Get the default database path for the background host.
pub fn database_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("dappgate").join("wallet.db"))
}

pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    if overlay.host.database_path.is_some() {
        base.host.database_path = overlay.host.database_path;
    }
    base.host.log_level = overlay.host.log_level;
    base.host.log_json = overlay.host.log_json;

    base.approval = overlay.approval;
    base.provider = overlay.provider;
    base.broadcast = overlay.broadcast;
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("DAPPGATE_DB_PATH") {
        config.host.database_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("DAPPGATE_LOG_LEVEL") {
        config.host.log_level = val;
    }
    if let Ok(val) = std::env::var("DAPPGATE_APPROVAL_TIMEOUT")
        && let Ok(n) = val.parse()
    {
        config.approval.timeout_secs = n;
    }
    if let Ok(val) = std::env::var("DAPPGATE_REQUEST_TIMEOUT")
        && let Ok(n) = val.parse()
    {
        config.provider.request_timeout_secs = n;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_approval_window_is_two_minutes() {
        let config = Config::default();
        assert_eq!(config.approval.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn account_request_outlives_approval_window() {
        let config = Config::default();
        assert!(config.provider.account_request_timeout_secs > config.approval.timeout_secs);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"approval":{"timeout_secs":45}}"#).unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.approval.timeout_secs, 45);
        assert_eq!(config.provider.request_timeout_secs, 30);
        assert_eq!(config.host.log_level, "info");
    }

    #[test]
    fn project_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join(".dappgate");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(
            project.join("settings.json"),
            r#"{"broadcast":{"delivery_timeout_ms":500}}"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path())).unwrap();
        assert_eq!(config.broadcast.delivery_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_config_file(&path), Err(Error::Config(_))));
    }
}
