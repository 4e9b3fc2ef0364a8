// 配置模型：全局设置与每用户连接记录。
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::warn;

use crate::error::{AlistError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Server used when a user has no connection of their own, and by
    /// everyone when `require_user_auth` is off.
    #[serde(default)]
    pub default_alist_url: String,
    #[serde(default)]
    pub default_username: String,
    #[serde(default)]
    pub default_password: String,
    #[serde(default)]
    pub default_token: String,
    /// When true each user configures their own connection; global
    /// parameters only fill unset fields.
    #[serde(default = "default_true")]
    pub require_user_auth: bool,
    #[serde(default = "default_true")]
    pub enable_cache: bool,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: f64,
    /// Cap on the index table: entries beyond this never receive a number.
    #[serde(default = "default_max_display")]
    pub max_display_files: usize,
    #[serde(default = "default_max_download_mb")]
    pub max_download_size_mb: u64,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_size_mb: u64,
    /// Files at or below this are streamed to temp storage for inline
    /// delivery; larger ones get a direct link instead.
    #[serde(default = "default_inline_mb")]
    pub inline_delivery_threshold_mb: u64,
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: f64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("empty config must deserialize")
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> f64 {
    300.0
}

fn default_max_display() -> usize {
    20
}

fn default_max_download_mb() -> u64 {
    50
}

fn default_max_upload_mb() -> u64 {
    100
}

fn default_inline_mb() -> u64 {
    10
}

fn default_upload_timeout() -> f64 {
    600.0
}

fn default_data_dir() -> String {
    "data/alistfile".to_string()
}

impl GlobalConfig {
    pub fn max_download_bytes(&self) -> u64 {
        self.max_download_size_mb * 1024 * 1024
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }

    pub fn inline_threshold_bytes(&self) -> u64 {
        self.inline_delivery_threshold_mb * 1024 * 1024
    }

    pub fn download_dir(&self) -> String {
        format!("{}/downloads", self.data_dir.trim_end_matches('/'))
    }

    pub fn users_dir(&self) -> String {
        format!("{}/users", self.data_dir.trim_end_matches('/'))
    }
}

/// One user's stored connection. Persisted as JSON, one file per user.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConnection {
    #[serde(default)]
    pub alist_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub setup_completed: bool,
}

impl UserConnection {
    pub fn is_configured(&self) -> bool {
        self.setup_completed && !self.alist_url.is_empty()
    }
}

/// Basic scheme validation applied to every stored or global URL before a
/// ServerIdentity is built from it.
pub fn validate_base_url(raw: &str) -> Result<()> {
    let raw = raw.trim();
    let parsed = url::Url::parse(raw).map_err(|_| AlistError::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(AlistError::InvalidUrl(raw.to_string())),
    }
}

/// Where the global YAML config lives. The path comes from the
/// environment so deployments can relocate data without code changes.
pub fn config_path() -> String {
    env::var("ALISTFILE_CONFIG_PATH").unwrap_or_else(|_| "config/alistfile.yaml".to_string())
}

/// Read the global config from YAML, falling back to defaults on any
/// parse problem.
pub fn load_global_config() -> GlobalConfig {
    let path = config_path();
    if !Path::new(&path).exists() {
        return GlobalConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(text) => serde_yaml::from_str(&text).unwrap_or_else(|err| {
            warn!("config parse failed, using defaults: {err}");
            GlobalConfig::default()
        }),
        Err(err) => {
            warn!("config read failed, using defaults: {path}: {err}");
            GlobalConfig::default()
        }
    }
}
