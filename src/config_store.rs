// 配置存储：全局配置读写与每用户连接解析。
use dashmap::DashMap;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{load_global_config, validate_base_url, GlobalConfig, UserConnection};
use crate::error::{AlistError, Result};
use crate::types::{AuthCredentials, ServerIdentity};

pub const USER_CONNECTION_KEYS: [&str; 4] = ["alist_url", "username", "password", "token"];

/// Owns the global config plus the per-user connection records. Connection
/// records live as one JSON file per user under the data dir and are cached
/// in memory after first load.
#[derive(Clone)]
pub struct ConfigStore {
    global: Arc<RwLock<GlobalConfig>>,
    users: Arc<DashMap<String, UserConnection>>,
    users_dir: PathBuf,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::with_config(load_global_config())
    }

    pub fn with_config(config: GlobalConfig) -> Self {
        let users_dir = PathBuf::from(config.users_dir());
        Self {
            global: Arc::new(RwLock::new(config)),
            users: Arc::new(DashMap::new()),
            users_dir,
        }
    }

    pub async fn get(&self) -> GlobalConfig {
        self.global.read().await.clone()
    }

    /// Apply a mutation to the global config and write it back to the
    /// YAML file so it survives a restart. Persist failures are logged,
    /// never fatal; the in-memory config is updated either way.
    pub async fn update<F>(&self, updater: F) -> GlobalConfig
    where
        F: FnOnce(&mut GlobalConfig),
    {
        let updated = {
            let mut guard = self.global.write().await;
            updater(&mut guard);
            guard.clone()
        };
        persist_global_config(&updated).await;
        updated
    }

    /// The stored connection for a user, loading it from disk on first
    /// access. Missing or unreadable files yield the empty record.
    pub async fn user_connection(&self, user_id: &str) -> UserConnection {
        if let Some(found) = self.users.get(user_id) {
            return found.clone();
        }
        let loaded = self.load_user_file(user_id).await.unwrap_or_default();
        self.users.insert(user_id.to_string(), loaded.clone());
        loaded
    }

    /// Update one field of a user's connection. Setting `alist_url` marks
    /// the record as configured; the URL is validated before it is stored.
    pub async fn set_user_connection_field(
        &self,
        user_id: &str,
        key: &str,
        value: &str,
    ) -> Result<UserConnection> {
        if !USER_CONNECTION_KEYS.contains(&key) {
            return Err(AlistError::NotFound(format!("unknown config key: {key}")));
        }
        let mut conn = self.user_connection(user_id).await;
        match key {
            "alist_url" => {
                validate_base_url(value)?;
                conn.alist_url = value.trim_end_matches('/').to_string();
                conn.setup_completed = true;
            }
            "username" => conn.username = value.to_string(),
            "password" => conn.password = value.to_string(),
            "token" => conn.token = value.to_string(),
            _ => unreachable!(),
        }
        self.users.insert(user_id.to_string(), conn.clone());
        self.persist_user_file(user_id, &conn).await;
        Ok(conn)
    }

    /// Resolve which server and credentials apply to a user. Per-user
    /// records win when `require_user_auth` is on, with global defaults
    /// filling unset fields; otherwise everyone shares the global
    /// connection. Session and cache partitioning stay per-user either way.
    pub async fn resolve(&self, user_id: &str) -> Result<(ServerIdentity, AuthCredentials)> {
        let config = self.get().await;
        let (url, creds) = if config.require_user_auth {
            let conn = self.user_connection(user_id).await;
            let url = if conn.alist_url.is_empty() {
                config.default_alist_url.clone()
            } else {
                conn.alist_url.clone()
            };
            let creds = AuthCredentials {
                username: first_non_empty(&conn.username, &config.default_username),
                password: first_non_empty(&conn.password, &config.default_password),
                token: first_non_empty(&conn.token, &config.default_token),
            };
            (url, creds)
        } else {
            (
                config.default_alist_url.clone(),
                AuthCredentials {
                    username: config.default_username.clone(),
                    password: config.default_password.clone(),
                    token: config.default_token.clone(),
                },
            )
        };
        if url.trim().is_empty() {
            return Err(AlistError::Unconfigured);
        }
        validate_base_url(&url)?;
        Ok((ServerIdentity::new(&url, &creds), creds))
    }

    /// Resolved view for display: secrets masked, never the raw values.
    pub async fn masked_view(&self, user_id: &str) -> serde_json::Value {
        let config = self.get().await;
        let conn = self.user_connection(user_id).await;
        json!({
            "require_user_auth": config.require_user_auth,
            "alist_url": if conn.alist_url.is_empty() { config.default_alist_url.clone() } else { conn.alist_url.clone() },
            "username": first_non_empty(&conn.username, &config.default_username),
            "password": mask(&first_non_empty(&conn.password, &config.default_password)),
            "token": mask(&first_non_empty(&conn.token, &config.default_token)),
            "max_display_files": config.max_display_files,
            "max_download_size_mb": config.max_download_size_mb,
            "max_upload_size_mb": config.max_upload_size_mb,
            "cache_ttl_secs": config.cache_ttl_secs,
            "setup_completed": conn.is_configured(),
        })
    }

    async fn load_user_file(&self, user_id: &str) -> Option<UserConnection> {
        let path = self.user_file(user_id);
        if !Path::new(&path).exists() {
            return None;
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(conn) => Some(conn),
                Err(err) => {
                    warn!("user connection parse failed: {}: {err}", path.display());
                    None
                }
            },
            Err(err) => {
                warn!("user connection read failed: {}: {err}", path.display());
                None
            }
        }
    }

    async fn persist_user_file(&self, user_id: &str, conn: &UserConnection) {
        let path = self.user_file(user_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let text = serde_json::to_string_pretty(conn).unwrap_or_default();
        if let Err(err) = tokio::fs::write(&path, text).await {
            warn!("user connection write failed: {}: {err}", path.display());
        } else {
            debug!("persisted connection for user {user_id}");
        }
    }

    fn user_file(&self, user_id: &str) -> PathBuf {
        let safe = crate::path_utils::sanitize_filename(user_id);
        self.users_dir.join(format!("{safe}.json"))
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn persist_global_config(config: &GlobalConfig) {
    let path = PathBuf::from(crate::config::config_path());
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    match serde_yaml::to_string(config) {
        Ok(text) => {
            if let Err(err) = tokio::fs::write(&path, text).await {
                warn!("global config write failed: {}: {err}", path.display());
            }
        }
        Err(err) => warn!("global config serialize failed: {err}"),
    }
}

fn first_non_empty(primary: &str, fallback: &str) -> String {
    if primary.is_empty() {
        fallback.to_string()
    } else {
        primary.to_string()
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "***".to_string()
    }
}
