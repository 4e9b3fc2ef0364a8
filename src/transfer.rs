// 传输协调：大小闸门、临时文件托管与孤儿清理。
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::FsBackend;
use crate::error::{AlistError, Result};
use crate::path_utils::{join_remote, sanitize_filename};
use crate::types::{AuthCredentials, Entry, ServerIdentity};

/// A downloaded temp file scoped to one request. Deleting is guaranteed:
/// the file goes away when the guard drops, delivered or not.
#[derive(Debug)]
pub struct TempDownload {
    path: PathBuf,
}

impl TempDownload {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDownload {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("temp download cleanup failed: {}: {err}", self.path.display());
            }
        }
    }
}

/// How a download request was satisfied.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// Small file streamed locally, ready for inline delivery. The guard
    /// removes the file once the presentation layer is done with it.
    Inline {
        name: String,
        size_bytes: u64,
        file: TempDownload,
    },
    /// Large file: hand the user a direct link instead of moving bytes.
    DirectLink {
        name: String,
        size_bytes: u64,
        url: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub remote_path: String,
    pub size_bytes: u64,
}

/// Executes downloads and uploads against the backend. Session state
/// (upload mode, index resolution) lives with the caller; this type only
/// moves bytes and enforces size limits.
pub struct TransferCoordinator {
    backend: Arc<dyn FsBackend>,
    download_dir: PathBuf,
}

impl TransferCoordinator {
    pub fn new(backend: Arc<dyn FsBackend>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            download_dir: download_dir.into(),
        }
    }

    /// Download a file entry. The size gate fires before any network call;
    /// files at or below `inline_threshold` are streamed to a user-scoped
    /// temp file, larger ones become a direct link.
    pub async fn download(
        &self,
        user_id: &str,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        entry: &Entry,
        max_bytes: u64,
        inline_threshold: u64,
    ) -> Result<DownloadOutcome> {
        if entry.is_dir {
            return Err(AlistError::IsDirectory(entry.name.clone()));
        }
        if entry.size_bytes > max_bytes {
            return Err(AlistError::TooLarge {
                what: "download",
                size_bytes: entry.size_bytes,
                limit_bytes: max_bytes,
            });
        }
        let url = self
            .backend
            .download_url(identity, creds, &entry.raw_path)
            .await?;
        if entry.size_bytes > inline_threshold {
            debug!(user = user_id, name = %entry.name, "download served as direct link");
            return Ok(DownloadOutcome::DirectLink {
                name: entry.name.clone(),
                size_bytes: entry.size_bytes,
                url,
            });
        }
        let file_name = format!(
            "{}_{}_{}",
            sanitize_filename(user_id),
            Uuid::new_v4().simple(),
            sanitize_filename(&entry.name)
        );
        let dest = self.download_dir.join(file_name);
        // Guard created before the fetch so a failed or partial stream is
        // still removed when it drops on the error path.
        let guard = TempDownload { path: dest.clone() };
        let written = self.backend.fetch_to_file(identity, &url, &dest).await?;
        info!(user = user_id, name = %entry.name, written, "download staged for delivery");
        Ok(DownloadOutcome::Inline {
            name: entry.name.clone(),
            size_bytes: written,
            file: guard,
        })
    }

    /// Push received bytes to the remote target directory. Size-gated;
    /// the file name is sanitized before joining the remote path.
    pub async fn upload(
        &self,
        identity: &ServerIdentity,
        creds: &AuthCredentials,
        target_dir: &str,
        file_name: &str,
        bytes: Bytes,
        max_bytes: u64,
    ) -> Result<UploadReceipt> {
        let size = bytes.len() as u64;
        if size > max_bytes {
            return Err(AlistError::TooLarge {
                what: "upload",
                size_bytes: size,
                limit_bytes: max_bytes,
            });
        }
        let remote_path = join_remote(target_dir, &sanitize_filename(file_name));
        self.backend
            .upload(identity, creds, &remote_path, bytes)
            .await?;
        info!(path = %remote_path, size, "upload completed");
        Ok(UploadReceipt {
            remote_path,
            size_bytes: size,
        })
    }

    /// Crash-recovery sweep: delete temp downloads older than `max_age`.
    /// Files currently guarded are younger than any sane threshold.
    pub async fn sweep_orphans(&self, max_age: Duration) -> usize {
        let mut removed = 0;
        let mut dir = match tokio::fs::read_dir(&self.download_dir).await {
            Ok(dir) => dir,
            Err(_) => return 0,
        };
        let now = SystemTime::now();
        while let Ok(Some(item)) = dir.next_entry().await {
            let Ok(meta) = item.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok());
            if matches!(age, Some(age) if age > max_age)
                && tokio::fs::remove_file(item.path()).await.is_ok()
            {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "orphaned temp downloads removed");
        }
        removed
    }
}
