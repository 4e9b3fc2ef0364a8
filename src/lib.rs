// Library entrypoint: the navigation/session core behind the chat
// command parser. The parser and renderer live upstream; they call `ops`
// and format the structured outcomes.
pub mod cache;
pub mod client;
pub mod config;
pub mod config_store;
pub mod error;
pub mod navigator;
pub mod ops;
pub mod path_utils;
pub mod session;
pub mod state;
pub mod transfer;
pub mod types;
pub mod upload;

pub use cache::ListingCache;
pub use client::{AlistClient, FileInfo, FsBackend};
pub use config::{GlobalConfig, UserConnection};
pub use config_store::ConfigStore;
pub use error::{AlistError, Result};
pub use navigator::{ListingView, NavigatorState};
pub use session::{SessionRegistry, UserSession};
pub use state::{now_ts, spawn_maintenance, AppState};
pub use transfer::{DownloadOutcome, TransferCoordinator, UploadReceipt};
pub use types::{AuthCredentials, Entry, Listing, ServerIdentity};
pub use upload::{UploadSession, UploadState};
