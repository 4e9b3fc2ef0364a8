// 测试夹具：内存目录树模拟 Alist 后端。
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use alistfile::client::FileInfo;
use alistfile::{
    AlistError, AppState, AuthCredentials, Entry, FsBackend, GlobalConfig, Result, ServerIdentity,
};

pub struct MockBackend {
    dirs: Mutex<HashMap<String, Vec<Entry>>>,
    pub list_calls: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    pub uploaded: Mutex<Vec<(String, usize)>>,
    pub list_latency: Duration,
    fail_uploads: AtomicBool,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            dirs: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            uploaded: Mutex::new(Vec::new()),
            list_latency: Duration::ZERO,
            fail_uploads: AtomicBool::new(false),
        })
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            dirs: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            uploaded: Mutex::new(Vec::new()),
            list_latency: latency,
            fail_uploads: AtomicBool::new(false),
        })
    }

    /// Make every subsequent upload fail with a transport error.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn dir(self: &Arc<Self>, path: &str, entries: &[(&str, bool, u64)]) -> Arc<Self> {
        let entries = entries
            .iter()
            .map(|(name, is_dir, size)| Entry {
                name: name.to_string(),
                is_dir: *is_dir,
                size_bytes: *size,
                modified_at: None,
                raw_path: alistfile::path_utils::join_remote(path, name),
            })
            .collect();
        self.dirs
            .lock()
            .unwrap()
            .insert(alistfile::path_utils::normalize_remote(path), entries);
        self.clone()
    }

    /// A standard little tree shared by most tests.
    pub fn seeded() -> Arc<Self> {
        let backend = Self::new();
        backend
            .dir(
                "/",
                &[
                    ("movies", true, 0),
                    ("docs", true, 0),
                    ("readme.txt", false, 64),
                ],
            )
            .dir(
                "/movies",
                &[("hd", true, 0), ("clip.mp4", false, 2048)],
            )
            .dir("/movies/hd", &[("feature.mkv", false, 4096)])
            .dir("/docs", &[("notes.md", false, 128)]);
        backend
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn transfer_count(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    fn find_entry(&self, path: &str) -> Option<Entry> {
        let normalized = alistfile::path_utils::normalize_remote(path);
        if normalized == "/" {
            return Some(Entry {
                name: "/".to_string(),
                is_dir: true,
                size_bytes: 0,
                modified_at: None,
                raw_path: "/".to_string(),
            });
        }
        let dirs = self.dirs.lock().unwrap();
        dirs.values()
            .flatten()
            .find(|entry| entry.raw_path == normalized)
            .cloned()
    }
}

#[async_trait]
impl FsBackend for MockBackend {
    async fn list_dir(
        &self,
        _identity: &ServerIdentity,
        _creds: &AuthCredentials,
        path: &str,
    ) -> Result<Vec<Entry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.list_latency.is_zero() {
            tokio::time::sleep(self.list_latency).await;
        }
        let normalized = alistfile::path_utils::normalize_remote(path);
        self.dirs
            .lock()
            .unwrap()
            .get(&normalized)
            .cloned()
            .ok_or_else(|| AlistError::NotFound(normalized))
    }

    async fn file_info(
        &self,
        _identity: &ServerIdentity,
        _creds: &AuthCredentials,
        path: &str,
    ) -> Result<FileInfo> {
        let entry = self
            .find_entry(path)
            .ok_or_else(|| AlistError::NotFound(path.to_string()))?;
        Ok(FileInfo {
            entry,
            provider: "mock".to_string(),
            raw_url: None,
        })
    }

    async fn search(
        &self,
        _identity: &ServerIdentity,
        _creds: &AuthCredentials,
        keyword: &str,
        path: &str,
    ) -> Result<Vec<Entry>> {
        let base = alistfile::path_utils::normalize_remote(path);
        let keyword = keyword.to_lowercase();
        let dirs = self.dirs.lock().unwrap();
        Ok(dirs
            .values()
            .flatten()
            .filter(|entry| {
                entry.name.to_lowercase().contains(&keyword)
                    && (base == "/" || entry.raw_path.starts_with(&base))
            })
            .cloned()
            .collect())
    }

    async fn download_url(
        &self,
        identity: &ServerIdentity,
        _creds: &AuthCredentials,
        path: &str,
    ) -> Result<String> {
        let entry = self
            .find_entry(path)
            .ok_or_else(|| AlistError::NotFound(path.to_string()))?;
        if entry.is_dir {
            return Err(AlistError::IsDirectory(entry.name));
        }
        Ok(format!("{}/d{path}", identity.base_url))
    }

    async fn fetch_to_file(
        &self,
        _identity: &ServerIdentity,
        _url: &str,
        dest: &Path,
    ) -> Result<u64> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        std::fs::write(dest, b"mock-bytes").map_err(|e| AlistError::Unreachable(e.to_string()))?;
        Ok(10)
    }

    async fn upload(
        &self,
        _identity: &ServerIdentity,
        _creds: &AuthCredentials,
        path: &str,
        bytes: Bytes,
    ) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AlistError::Unreachable("mock upload failure".to_string()));
        }
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        self.uploaded
            .lock()
            .unwrap()
            .push((path.to_string(), bytes.len()));
        // Make the uploaded file visible to a later re-list.
        let normalized = alistfile::path_utils::normalize_remote(path);
        let (parent, name) = match normalized.rfind('/') {
            Some(0) => ("/".to_string(), normalized[1..].to_string()),
            Some(pos) => (normalized[..pos].to_string(), normalized[pos + 1..].to_string()),
            None => ("/".to_string(), normalized.clone()),
        };
        let entry = Entry {
            name,
            is_dir: false,
            size_bytes: bytes.len() as u64,
            modified_at: None,
            raw_path: normalized,
        };
        self.dirs.lock().unwrap().entry(parent).or_default().push(entry);
        Ok(())
    }
}

/// Shared-server state: every user resolves to the same mock identity.
#[allow(dead_code)]
pub fn shared_state(backend: Arc<MockBackend>) -> AppState {
    let mut config = GlobalConfig::default();
    config.require_user_auth = false;
    config.default_alist_url = "http://mock:5244".to_string();
    config.data_dir = tempfile::tempdir()
        .unwrap()
        .keep()
        .to_string_lossy()
        .to_string();
    AppState::new(config, backend)
}

#[allow(dead_code)]
pub fn shared_state_with(backend: Arc<MockBackend>, tweak: impl FnOnce(&mut GlobalConfig)) -> AppState {
    let mut config = GlobalConfig::default();
    config.require_user_auth = false;
    config.default_alist_url = "http://mock:5244".to_string();
    config.data_dir = tempfile::tempdir()
        .unwrap()
        .keep()
        .to_string_lossy()
        .to_string();
    tweak(&mut config);
    AppState::new(config, backend)
}
