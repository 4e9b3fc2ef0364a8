// 命令面：上层聊天解析器调用这里，返回结构化结果交给展示层渲染。
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::client::FileInfo;
use crate::config::GlobalConfig;
use crate::error::{AlistError, Result};
use crate::navigator::{ListingView, NavigatorState, TableStatus};
use crate::state::{now_ts, AppState};
use crate::transfer::{DownloadOutcome, UploadReceipt};
use crate::types::{AuthCredentials, Entry};
use crate::upload::{UploadEvent, UploadOutcome, UploadState};

/// What a `list` command refers to: the current directory, an explicit
/// path, or a numbered item from the last shown listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListTarget {
    Current,
    Path(String),
    Index(usize),
}

impl ListTarget {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return ListTarget::Current;
        }
        match raw.parse::<usize>() {
            Ok(index) if !raw.starts_with('/') => ListTarget::Index(index),
            _ => ListTarget::Path(raw.to_string()),
        }
    }
}

/// `list` either shows a directory or, when the index points at a file,
/// starts a download directly (mirrors the chat shortcut).
#[derive(Debug)]
pub enum ListResponse {
    Listing(ListingView),
    Download(DownloadOutcome),
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub keyword: String,
    pub base_path: String,
    pub results: Vec<Entry>,
    pub total_matches: usize,
}

#[derive(Debug, Serialize)]
pub struct InfoOutcome {
    pub info: FileInfo,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadBegun {
    pub target_path: String,
    pub timeout_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionOk {
    pub base_url: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// Entries for the caller's resolved server.
    Mine,
    /// Everything; administrative use.
    All,
}

/// List a directory, descend by index, or download a file by index.
pub async fn list(state: &AppState, user_id: &str, target: &str) -> Result<ListResponse> {
    let (identity, creds) = state.config_store.resolve(user_id).await?;
    let config = state.config_store.get().await;
    let now = now_ts();
    let handle = state.sessions.session(user_id);
    let mut session = handle.lock().await;
    let nav = session.navigator_for(&identity);

    match ListTarget::parse(target) {
        ListTarget::Current => {}
        ListTarget::Path(path) => nav.set_path(&path),
        ListTarget::Index(index) => {
            let entry = resolve_index_refreshing(state, nav, &creds, &config, index, now).await?;
            if entry.is_dir {
                nav.descend_into(&entry)?;
            } else {
                info!(user = user_id, name = %entry.name, "list index hit a file, downloading");
                let outcome = state
                    .transfer
                    .download(
                        user_id,
                        &identity,
                        &creds,
                        &entry,
                        config.max_download_bytes(),
                        config.inline_threshold_bytes(),
                    )
                    .await?;
                return Ok(ListResponse::Download(outcome));
            }
        }
    }
    let view = refresh_listing(state, nav, &creds, &config, now).await?;
    Ok(ListResponse::Listing(view))
}

/// "quit": pop the navigation stack and show the parent directory.
pub async fn ascend(state: &AppState, user_id: &str) -> Result<ListingView> {
    let (identity, creds) = state.config_store.resolve(user_id).await?;
    let config = state.config_store.get().await;
    let now = now_ts();
    let handle = state.sessions.session(user_id);
    let mut session = handle.lock().await;
    let nav = session.navigator_for(&identity);
    nav.ascend()?;
    refresh_listing(state, nav, &creds, &config, now).await
}

/// Search under a path (or the root when none given). Results are capped
/// for display but never replace the numbered index table.
pub async fn search(
    state: &AppState,
    user_id: &str,
    keyword: &str,
    path: Option<&str>,
) -> Result<SearchOutcome> {
    let (identity, creds) = state.config_store.resolve(user_id).await?;
    let config = state.config_store.get().await;
    let base_path = crate::path_utils::normalize_remote(path.unwrap_or("/"));
    let matches = state
        .backend
        .search(&identity, &creds, keyword, &base_path)
        .await?;
    let total_matches = matches.len();
    let results = matches
        .into_iter()
        .take(config.max_display_files)
        .collect();
    Ok(SearchOutcome {
        keyword: keyword.to_string(),
        base_path,
        results,
        total_matches,
    })
}

/// Detailed file info by path or by index, with a download link for files.
pub async fn info(state: &AppState, user_id: &str, target: &str) -> Result<InfoOutcome> {
    let (identity, creds) = state.config_store.resolve(user_id).await?;
    let config = state.config_store.get().await;
    let now = now_ts();
    let path = match ListTarget::parse(target) {
        ListTarget::Current => {
            let handle = state.sessions.session(user_id);
            let mut session = handle.lock().await;
            session.navigator_for(&identity).current_path().to_string()
        }
        ListTarget::Path(path) => crate::path_utils::normalize_remote(&path),
        ListTarget::Index(index) => {
            let handle = state.sessions.session(user_id);
            let mut session = handle.lock().await;
            let nav = session.navigator_for(&identity);
            resolve_index_refreshing(state, nav, &creds, &config, index, now)
                .await?
                .raw_path
        }
    };
    let file_info = state.backend.file_info(&identity, &creds, &path).await?;
    let download_url = if file_info.entry.is_dir {
        None
    } else {
        Some(state.backend.download_url(&identity, &creds, &path).await?)
    };
    Ok(InfoOutcome {
        info: file_info,
        download_url,
    })
}

/// Download by index (against the last shown listing) or by path.
pub async fn download(state: &AppState, user_id: &str, target: &str) -> Result<DownloadOutcome> {
    let (identity, creds) = state.config_store.resolve(user_id).await?;
    let config = state.config_store.get().await;
    let now = now_ts();
    let entry = match ListTarget::parse(target) {
        ListTarget::Current => return Err(AlistError::NotFound("empty download target".into())),
        ListTarget::Index(index) => {
            let handle = state.sessions.session(user_id);
            let mut session = handle.lock().await;
            let nav = session.navigator_for(&identity);
            resolve_index_refreshing(state, nav, &creds, &config, index, now).await?
        }
        ListTarget::Path(path) => {
            let path = crate::path_utils::normalize_remote(&path);
            state
                .backend
                .file_info(&identity, &creds, &path)
                .await?
                .entry
        }
    };
    state
        .transfer
        .download(
            user_id,
            &identity,
            &creds,
            &entry,
            config.max_download_bytes(),
            config.inline_threshold_bytes(),
        )
        .await
}

/// Arm upload mode for the user's current directory. Re-issuing while
/// already Awaiting resets the timer instead of failing.
pub async fn begin_upload(state: &AppState, user_id: &str) -> Result<UploadBegun> {
    let (identity, _creds) = state.config_store.resolve(user_id).await?;
    let config = state.config_store.get().await;
    let now = now_ts();
    let handle = state.sessions.session(user_id);
    let mut session = handle.lock().await;
    let target_path = session.navigator_for(&identity).current_path().to_string();
    session.upload.apply(
        UploadEvent::Begin {
            target_path: target_path.clone(),
        },
        now,
        config.upload_timeout_secs,
    );
    info!(user = user_id, target = %target_path, "upload mode armed");
    Ok(UploadBegun {
        target_path,
        timeout_secs: config.upload_timeout_secs,
    })
}

/// A file arrived while (hopefully) in upload mode. Single-shot: success
/// disarms the session; the next file needs a fresh `begin_upload`.
pub async fn receive_upload(
    state: &AppState,
    user_id: &str,
    file_name: &str,
    bytes: Bytes,
) -> Result<UploadReceipt> {
    let (identity, creds) = state.config_store.resolve(user_id).await?;
    let config = state.config_store.get().await;
    let now = now_ts();
    let handle = state.sessions.session(user_id);
    let mut session = handle.lock().await;

    // Lazy expiry check first: a late file against an idle session must be
    // rejected, not silently accepted.
    session.upload.tick(now, config.upload_timeout_secs);
    let target_path = match session.upload.state() {
        UploadState::Awaiting { target_path, .. } => target_path.clone(),
        UploadState::Expired => return Err(AlistError::UploadExpired),
        _ => return Err(AlistError::NoActiveUpload),
    };
    // Size gate leaves the session armed so the user can retry with a
    // smaller file inside the same window.
    let size = bytes.len() as u64;
    if size > config.max_upload_bytes() {
        return Err(AlistError::TooLarge {
            what: "upload",
            size_bytes: size,
            limit_bytes: config.max_upload_bytes(),
        });
    }
    // The session disarms only once the bytes actually landed; a transport
    // failure leaves it Awaiting so the user can resend in the same window.
    let receipt = state
        .transfer
        .upload(
            &identity,
            &creds,
            &target_path,
            file_name,
            bytes,
            config.max_upload_bytes(),
        )
        .await?;
    session
        .upload
        .apply(UploadEvent::Receive, now, config.upload_timeout_secs);
    // The target directory changed remotely; cached listing is no longer
    // trustworthy.
    state.cache.invalidate(&identity, &target_path);
    Ok(receipt)
}

/// Disarm upload mode. Not an error when nothing was armed.
pub async fn cancel_upload(state: &AppState, user_id: &str) -> Result<bool> {
    let config = state.config_store.get().await;
    let now = now_ts();
    let handle = state.sessions.session(user_id);
    let mut session = handle.lock().await;
    let outcome = session
        .upload
        .apply(UploadEvent::Cancel, now, config.upload_timeout_secs);
    Ok(outcome == UploadOutcome::Cancelled)
}

/// Current upload-session state for status displays; applies the lazy
/// expiry check so an idle overdue session reports Expired.
pub async fn upload_status(state: &AppState, user_id: &str) -> UploadState {
    let config = state.config_store.get().await;
    let now = now_ts();
    let handle = state.sessions.session(user_id);
    let mut session = handle.lock().await;
    session
        .upload
        .tick(now, config.upload_timeout_secs)
        .clone()
}

/// Clear cached listings. `Mine` also invalidates the caller's index
/// table: the numbers they saw may not match a refetch anymore.
pub async fn clear_cache(state: &AppState, user_id: &str, scope: CacheScope) -> Result<CacheScope> {
    match scope {
        CacheScope::Mine => {
            let (identity, _) = state.config_store.resolve(user_id).await?;
            state.cache.invalidate_server(&identity);
            let handle = state.sessions.session(user_id);
            let mut session = handle.lock().await;
            session.navigator_for(&identity).invalidate_table();
        }
        CacheScope::All => state.cache.invalidate_all(),
    }
    info!(user = user_id, ?scope, "listing cache cleared");
    Ok(scope)
}

/// Resolve credentials and list the root, bypassing the cache.
pub async fn test_connection(state: &AppState, user_id: &str) -> Result<ConnectionOk> {
    let (identity, creds) = state.config_store.resolve(user_id).await?;
    let entries = state.backend.list_dir(&identity, &creds, "/").await?;
    Ok(ConnectionOk {
        base_url: identity.base_url,
        entry_count: entries.len(),
    })
}

/// Masked configuration view for `config show`.
pub async fn show_config(state: &AppState, user_id: &str) -> Value {
    state.config_store.masked_view(user_id).await
}

/// `config set <key> <value>` for the caller's connection record.
pub async fn set_config(state: &AppState, user_id: &str, key: &str, value: &str) -> Result<()> {
    state
        .config_store
        .set_user_connection_field(user_id, key, value)
        .await?;
    Ok(())
}

/// Fetch (cache or network) the navigator's current directory and rebuild
/// its index table.
async fn refresh_listing(
    state: &AppState,
    nav: &mut NavigatorState,
    creds: &AuthCredentials,
    config: &GlobalConfig,
    now: f64,
) -> Result<ListingView> {
    let identity = nav.server().clone();
    let path = nav.current_path().to_string();
    let ttl = if config.enable_cache {
        config.cache_ttl_secs
    } else {
        0.0
    };
    let backend = state.backend.clone();
    let fetch_identity = identity.clone();
    let fetch_creds = creds.clone();
    let fetch_path = path.clone();
    let (listing, from_cache) = state
        .cache
        .get_or_fetch(&identity, &path, ttl, now, move || async move {
            backend
                .list_dir(&fetch_identity, &fetch_creds, &fetch_path)
                .await
        })
        .await?;
    nav.apply_listing(&listing, now, config.max_display_files);
    Ok(ListingView {
        path: listing.normalized_path.clone(),
        entries: nav.indexed_entries().to_vec(),
        total_entries: listing.entries.len(),
        dir_count: listing.dir_count(),
        file_count: listing.file_count(),
        stack_depth: nav.stack_depth(),
        epoch: nav.epoch(),
        from_cache,
    })
}

/// Resolve a 1-based index. Absent or TTL-stale tables are refreshed
/// implicitly; an explicitly invalidated table surfaces `StaleIndex` and
/// is never guessed against new data.
async fn resolve_index_refreshing(
    state: &AppState,
    nav: &mut NavigatorState,
    creds: &AuthCredentials,
    config: &GlobalConfig,
    index: usize,
    now: f64,
) -> Result<Entry> {
    match nav.table_status(now) {
        TableStatus::Fresh => nav.resolve_index(index),
        TableStatus::Invalidated => Err(AlistError::StaleIndex),
        TableStatus::Absent | TableStatus::Expired => {
            refresh_listing(state, nav, creds, config, now).await?;
            nav.resolve_index(index)
        }
    }
}
