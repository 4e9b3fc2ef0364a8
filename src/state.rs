// 全局状态：配置、缓存、会话与传输协调器的装配。
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::cache::ListingCache;
use crate::client::FsBackend;
use crate::config::GlobalConfig;
use crate::config_store::ConfigStore;
use crate::session::SessionRegistry;
use crate::transfer::TransferCoordinator;

/// Shared handle threaded through every command. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config_store: ConfigStore,
    pub cache: Arc<ListingCache>,
    pub sessions: Arc<SessionRegistry>,
    pub transfer: Arc<TransferCoordinator>,
    pub backend: Arc<dyn FsBackend>,
}

impl AppState {
    pub fn new(config: GlobalConfig, backend: Arc<dyn FsBackend>) -> Self {
        let download_dir = config.download_dir();
        Self {
            config_store: ConfigStore::with_config(config),
            cache: Arc::new(ListingCache::new()),
            sessions: Arc::new(SessionRegistry::new()),
            transfer: Arc::new(TransferCoordinator::new(backend.clone(), download_dir)),
            backend,
        }
    }

    /// One maintenance pass: expire idle upload sessions, drop expired
    /// cache entries, remove orphaned temp downloads left by a crash.
    pub async fn maintenance_tick(&self, now: f64) {
        let config = self.config_store.get().await;
        let expired = self
            .sessions
            .sweep_uploads(now, config.upload_timeout_secs);
        self.cache.sweep(now);
        let orphans = self
            .transfer
            .sweep_orphans(Duration::from_secs(24 * 3600))
            .await;
        debug!(expired, orphans, "maintenance tick");
    }
}

/// Periodic maintenance loop; the host keeps or aborts the handle.
pub fn spawn_maintenance(state: AppState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            state.maintenance_tick(now_ts()).await;
        }
    })
}

/// Wall-clock seconds since the epoch. Commands sample it once at entry
/// and pass it down, so inner components never read the clock themselves.
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or(0.0)
}
