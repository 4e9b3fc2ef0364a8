// Alist 后端客户端：登录、列目录、搜索、直链与上传。
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Value};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{AlistError, Result};
use crate::types::{AuthCredentials, Entry, ServerIdentity};

/// Everything except '/' and a few unreserved characters gets escaped in
/// remote paths embedded in URLs and the `File-Path` upload header.
const REMOTE_PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

pub fn encode_remote_path(path: &str) -> String {
    utf8_percent_encode(path, REMOTE_PATH_SET).to_string()
}

/// File metadata from `/api/fs/get`, richer than a listing entry.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileInfo {
    pub entry: Entry,
    pub provider: String,
    pub raw_url: Option<String>,
}

/// The remote file-listing capability the core consumes. Implemented by
/// [`AlistClient`] in production and by in-memory mocks in tests.
#[async_trait]
pub trait FsBackend: Send + Sync {
    async fn list_dir(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        path: &str,
    ) -> Result<Vec<Entry>>;

    async fn file_info(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        path: &str,
    ) -> Result<FileInfo>;

    async fn search(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        keyword: &str,
        path: &str,
    ) -> Result<Vec<Entry>>;

    async fn download_url(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        path: &str,
    ) -> Result<String>;

    async fn fetch_to_file(
        &self,
        identity: &ServerIdentity,
        url: &str,
        dest: &Path,
    ) -> Result<u64>;

    async fn upload(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        path: &str,
        bytes: Bytes,
    ) -> Result<()>;
}

/// Reqwest client for the Alist v3 API. Tokens obtained through
/// username/password login are cached per credential fingerprint so repeat
/// commands do not re-login.
pub struct AlistClient {
    http: reqwest::Client,
    tokens: DashMap<String, String>,
}

impl AlistClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens: DashMap::new(),
        }
    }

    async fn auth_token(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
    ) -> Result<Option<String>> {
        if !creds.token.is_empty() {
            return Ok(Some(creds.token.clone()));
        }
        if creds.username.is_empty() {
            return Ok(None);
        }
        if let Some(cached) = self.tokens.get(&identity.auth_fingerprint) {
            return Ok(Some(cached.clone()));
        }
        let token = self.login(identity, creds).await?;
        self.tokens
            .insert(identity.auth_fingerprint.clone(), token.clone());
        Ok(Some(token))
    }

    async fn login(&self, identity: &ServerIdentity, creds: &AuthCredentials) -> Result<String> {
        let url = format!("{}/api/auth/login", identity.base_url);
        let body = json!({ "username": creds.username, "password": creds.password });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        let data = read_alist_body(resp).await?;
        data.get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AlistError::PermissionDenied("login returned no token".to_string()))
    }

    async fn fs_post(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        api: &str,
        body: Value,
    ) -> Result<Value> {
        let url = format!("{}{api}", identity.base_url);
        let mut req = self.http.post(&url).json(&body);
        if let Some(token) = self.auth_token(identity, creds).await? {
            req = req.header("Authorization", token);
        }
        let resp = req.send().await.map_err(map_reqwest_err)?;
        read_alist_body(resp).await
    }
}

impl Default for AlistClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FsBackend for AlistClient {
    async fn list_dir(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        path: &str,
    ) -> Result<Vec<Entry>> {
        let body = json!({
            "path": path,
            "password": "",
            "page": 1,
            "per_page": 0,
            "refresh": false,
        });
        let data = self.fs_post(identity, creds, "/api/fs/list", body).await?;
        let content = data.get("content").and_then(Value::as_array);
        let entries = content
            .map(|items| {
                items
                    .iter()
                    .map(|item| parse_entry(item, path))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        debug!(
            server = %identity.auth_fingerprint,
            path, count = entries.len(), "listed directory"
        );
        Ok(entries)
    }

    async fn file_info(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        path: &str,
    ) -> Result<FileInfo> {
        let body = json!({ "path": path, "password": "" });
        let data = self.fs_post(identity, creds, "/api/fs/get", body).await?;
        let parent = parent_of(path);
        Ok(FileInfo {
            entry: parse_entry(&data, &parent),
            provider: data
                .get("provider")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            raw_url: data
                .get("raw_url")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    async fn search(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        keyword: &str,
        path: &str,
    ) -> Result<Vec<Entry>> {
        let body = json!({
            "parent": path,
            "keywords": keyword,
            // 0: current directory and below.
            "scope": 0,
            "page": 1,
            "per_page": 100,
        });
        let data = self.fs_post(identity, creds, "/api/fs/search", body).await?;
        let content = data.get("content").and_then(Value::as_array);
        Ok(content
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        let parent = item
                            .get("parent")
                            .and_then(Value::as_str)
                            .unwrap_or(path)
                            .to_string();
                        parse_entry(item, &parent)
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn download_url(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        path: &str,
    ) -> Result<String> {
        let info = self.file_info(identity, creds, path).await?;
        if info.entry.is_dir {
            return Err(AlistError::IsDirectory(info.entry.name));
        }
        if let Some(raw) = info.raw_url {
            return Ok(raw);
        }
        Ok(format!(
            "{}/d{}",
            identity.base_url,
            encode_remote_path(path)
        ))
    }

    async fn fetch_to_file(
        &self,
        identity: &ServerIdentity,
        url: &str,
        dest: &Path,
    ) -> Result<u64> {
        let resp = self.http.get(url).send().await.map_err(map_reqwest_err)?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status(), url));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| AlistError::Unreachable(err.to_string()))?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|err| AlistError::Unreachable(err.to_string()))?;
        let mut stream = resp.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_err)?;
            file.write_all(&chunk)
                .await
                .map_err(|err| AlistError::Unreachable(err.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|err| AlistError::Unreachable(err.to_string()))?;
        debug!(server = %identity.auth_fingerprint, written, "streamed download");
        Ok(written)
    }

    async fn upload(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        path: &str,
        bytes: Bytes,
    ) -> Result<()> {
        let url = format!("{}/api/fs/put", identity.base_url);
        let mut req = self
            .http
            .put(&url)
            .header("Content-Type", "application/octet-stream")
            .header("File-Path", encode_remote_path(path))
            .body(bytes);
        if let Some(token) = self.auth_token(identity, creds).await? {
            req = req.header("Authorization", token);
        }
        let resp = req.send().await.map_err(map_reqwest_err)?;
        read_alist_body(resp).await?;
        Ok(())
    }
}

fn parse_entry(item: &Value, parent: &str) -> Entry {
    let name = item
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let raw_path = crate::path_utils::join_remote(parent, &name);
    Entry {
        is_dir: item.get("is_dir").and_then(Value::as_bool).unwrap_or(false),
        size_bytes: item.get("size").and_then(Value::as_u64).unwrap_or(0),
        modified_at: item
            .get("modified")
            .and_then(Value::as_str)
            .and_then(parse_modified),
        name,
        raw_path,
    }
}

fn parse_modified(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn parent_of(path: &str) -> String {
    let normalized = crate::path_utils::normalize_remote(path);
    match normalized.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => normalized[..pos].to_string(),
    }
}

/// Unwrap the Alist `{code, message, data}` envelope into `data`.
async fn read_alist_body(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        return Err(status_error(status, resp.url().as_str()));
    }
    let body: Value = resp.json().await.map_err(map_reqwest_err)?;
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match code {
        200 => Ok(body.get("data").cloned().unwrap_or(Value::Null)),
        401 | 403 => Err(AlistError::PermissionDenied(message)),
        404 => Err(AlistError::NotFound(message)),
        other => {
            warn!(code = other, "alist api error: {message}");
            if message.to_lowercase().contains("not found") {
                Err(AlistError::NotFound(message))
            } else {
                Err(AlistError::Unreachable(format!("alist code {other}: {message}")))
            }
        }
    }
}

fn status_error(status: reqwest::StatusCode, context: &str) -> AlistError {
    match status.as_u16() {
        401 | 403 => AlistError::PermissionDenied(format!("HTTP {status}: {context}")),
        404 => AlistError::NotFound(format!("HTTP {status}: {context}")),
        _ => AlistError::Unreachable(format!("HTTP {status}: {context}")),
    }
}

fn map_reqwest_err(err: reqwest::Error) -> AlistError {
    if let Some(status) = err.status() {
        status_error(status, "request")
    } else {
        AlistError::Unreachable(err.to_string())
    }
}
