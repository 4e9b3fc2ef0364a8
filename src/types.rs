// 核心数据模型：服务器身份、目录项与目录快照。
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::path_utils::normalize_remote;

/// Which backend server and account a request targets. The fingerprint is
/// derived from the credential material; raw secrets never leave the
/// resolver, so identities are safe to use in cache keys and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ServerIdentity {
    pub base_url: String,
    pub auth_fingerprint: String,
}

impl ServerIdentity {
    pub fn new(base_url: &str, creds: &AuthCredentials) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(base_url.as_bytes());
        hasher.update(b"\x00");
        hasher.update(creds.username.as_bytes());
        hasher.update(b"\x00");
        hasher.update(creds.password.as_bytes());
        hasher.update(b"\x00");
        hasher.update(creds.token.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_fingerprint: digest[..16].to_string(),
        }
    }
}

/// Credential material resolved for one request. Token wins over
/// username/password; both may be empty for anonymous servers.
#[derive(Debug, Clone, Default)]
pub struct AuthCredentials {
    pub username: String,
    pub password: String,
    pub token: String,
}

impl AuthCredentials {
    pub fn is_anonymous(&self) -> bool {
        self.token.is_empty() && self.username.is_empty()
    }
}

/// One file or directory as reported by the backend. Never mutated after
/// creation; directories report a size of zero.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub raw_path: String,
}

/// An ordered directory snapshot: directories first, then files, each group
/// alphabetical (case-insensitive). Entry order is stable for the lifetime
/// of the listing; numeric indices are assigned against this order.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub server: ServerIdentity,
    pub normalized_path: String,
    pub entries: Vec<Entry>,
    pub fetched_at: f64,
    pub ttl_secs: f64,
}

impl Listing {
    pub fn new(
        server: ServerIdentity,
        path: &str,
        mut entries: Vec<Entry>,
        fetched_at: f64,
        ttl_secs: f64,
    ) -> Self {
        entries.sort_by(|a, b| {
            b.is_dir
                .cmp(&a.is_dir)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Self {
            server,
            normalized_path: normalize_remote(path),
            entries,
            fetched_at,
            ttl_secs,
        }
    }

    pub fn is_expired(&self, now: f64) -> bool {
        now - self.fetched_at > self.ttl_secs
    }

    pub fn dir_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_dir).count()
    }

    pub fn file_count(&self) -> usize {
        self.entries.len() - self.dir_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_dir: bool) -> Entry {
        Entry {
            name: name.to_string(),
            is_dir,
            size_bytes: if is_dir { 0 } else { 1 },
            modified_at: None,
            raw_path: format!("/{name}"),
        }
    }

    fn identity() -> ServerIdentity {
        ServerIdentity::new("http://localhost:5244", &AuthCredentials::default())
    }

    #[test]
    fn fingerprint_changes_with_credentials() {
        let anon = ServerIdentity::new("http://a", &AuthCredentials::default());
        let user = ServerIdentity::new(
            "http://a",
            &AuthCredentials {
                username: "bob".into(),
                password: "pw".into(),
                token: String::new(),
            },
        );
        assert_ne!(anon.auth_fingerprint, user.auth_fingerprint);
        assert!(!user.auth_fingerprint.contains("pw"));
    }

    #[test]
    fn fingerprint_strips_trailing_slash() {
        let id = ServerIdentity::new("http://a/", &AuthCredentials::default());
        assert_eq!(id.base_url, "http://a");
    }

    #[test]
    fn listing_orders_dirs_first_then_alpha() {
        let listing = Listing::new(
            identity(),
            "/x//",
            vec![
                entry("zeta.txt", false),
                entry("Beta", true),
                entry("alpha.txt", false),
                entry("anna", true),
            ],
            0.0,
            300.0,
        );
        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["anna", "Beta", "alpha.txt", "zeta.txt"]);
        assert_eq!(listing.normalized_path, "/x");
        assert_eq!(listing.dir_count(), 2);
        assert_eq!(listing.file_count(), 2);
    }

    #[test]
    fn listing_expiry_uses_ttl() {
        let listing = Listing::new(identity(), "/", vec![], 100.0, 300.0);
        assert!(!listing.is_expired(400.0));
        assert!(listing.is_expired(400.1));
    }
}
