//! Configuration management for mend
//!
//! Stores settings in ~/.config/mend/config.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Endpoint of the remote fixing service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Language tag sent with fix requests.
    #[serde(default = "default_language")]
    pub language: String,
    /// Maximum build-fix cycles per loop run.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
    /// Attempts per RPC call before the last error is surfaced.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-attempt RPC timeout in seconds.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// Build time budget in seconds; the build is killed when exceeded.
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
    /// Rebuild after each applied fix before counting the cycle done.
    #[serde(default = "default_reverify")]
    pub reverify_after_apply: bool,
    /// Include warning-severity diagnostics in fix requests.
    #[serde(default)]
    pub include_warnings: bool,
    /// Reject fixes whose reported confidence falls below this. Zero
    /// accepts everything, including services that omit the score.
    #[serde(default)]
    pub min_confidence: f64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8765/rpc".to_string()
}

fn default_language() -> String {
    "swift".to_string()
}

fn default_max_cycles() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_build_timeout_secs() -> u64 {
    300
}

fn default_reverify() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            language: default_language(),
            max_cycles: default_max_cycles(),
            max_retries: default_max_retries(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            build_timeout_secs: default_build_timeout_secs(),
            reverify_after_apply: default_reverify(),
            include_warnings: false,
            min_confidence: 0.0,
        }
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mend"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(err) => {
                        preserve_corrupt_config(&path, &content);
                        eprintln!(
                            "  Warning: Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                            err
                        );
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        fs::create_dir_all(&dir)?;

        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/mend/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
