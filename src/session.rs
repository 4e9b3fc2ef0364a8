// 会话注册表：按用户懒创建，同一用户操作串行，不同用户互不阻塞。
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::navigator::NavigatorState;
use crate::types::ServerIdentity;
use crate::upload::{UploadSession, UploadState};

/// Everything the core tracks for one user: navigation plus the pending
/// upload. The navigator is created on the first resolved command because
/// it needs a server identity.
#[derive(Debug, Default)]
pub struct UserSession {
    pub navigator: Option<NavigatorState>,
    pub upload: UploadSession,
}

impl UserSession {
    /// The navigator for this user, (re)bound to the given server. A
    /// credential change resets navigation; indices never cross servers.
    pub fn navigator_for(&mut self, server: &ServerIdentity) -> &mut NavigatorState {
        match &mut self.navigator {
            Some(nav) => {
                nav.ensure_server(server);
            }
            None => {
                self.navigator = Some(NavigatorState::new(server.clone()));
            }
        }
        self.navigator.as_mut().expect("navigator just ensured")
    }
}

/// Process-wide map from user id to session state. Sessions are created
/// lazily and owned exclusively here; callers get the per-user lock and
/// nothing else, so users can never observe each other's state.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<UserSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// The session handle for a user, created on first use. Operations for
    /// one user serialize on the returned mutex; different users hold
    /// different mutexes.
    pub fn session(&self, user_id: &str) -> Arc<Mutex<UserSession>> {
        self.sessions.entry(user_id.to_string()).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Expiry sweep: move idle Awaiting uploads past their deadline to
    /// Expired even if the user never issues another command. Sessions
    /// currently locked by a command are skipped; the lazy check in the
    /// upload path covers them.
    pub fn sweep_uploads(&self, now: f64, timeout_secs: f64) -> usize {
        let mut expired = 0;
        for entry in self.sessions.iter() {
            if let Ok(mut session) = entry.value().try_lock() {
                let was_awaiting = matches!(session.upload.state(), UploadState::Awaiting { .. });
                if was_awaiting
                    && matches!(session.upload.tick(now, timeout_secs), UploadState::Expired)
                {
                    expired += 1;
                    info!(user = %entry.key(), "upload session expired by sweep");
                }
            }
        }
        expired
    }
}
