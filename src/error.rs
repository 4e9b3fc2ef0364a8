// 错误分类：所有命令以结构化结果返回，错误不会终止进程。
use thiserror::Error;

/// Per-request error taxonomy surfaced to the presentation layer.
///
/// Transport failures (`Unreachable`, `NotFound`, `PermissionDenied`) come
/// from the backend collaborator and propagate unchanged; the core never
/// retries them. State-consistency failures (`StaleIndex`, `AtRoot`,
/// `NoActiveListing`) describe the user's session, not the remote service.
#[derive(Debug, Error)]
pub enum AlistError {
    #[error("no Alist connection configured for this user")]
    Unconfigured,
    #[error("invalid Alist URL: {0}")]
    InvalidUrl(String),
    #[error("Alist server unreachable: {0}")]
    Unreachable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("index {index} out of range 1..={count}")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("listing changed since that index was shown, list again")]
    StaleIndex,
    #[error("no directory listed yet")]
    NoActiveListing,
    #[error("already at the top of the navigation stack")]
    AtRoot,
    #[error("'{0}' is a directory")]
    IsDirectory(String),
    #[error("{what} too large: {size_bytes} bytes exceeds limit {limit_bytes}")]
    TooLarge {
        what: &'static str,
        size_bytes: u64,
        limit_bytes: u64,
    },
    #[error("no upload in progress")]
    NoActiveUpload,
    #[error("upload window expired, start again")]
    UploadExpired,
    /// Reserved for hosts that forbid re-arming an active upload; the core
    /// itself resets the timer on a repeated begin instead.
    #[error("an upload is already awaiting a file")]
    UploadAlreadyActive,
}

impl AlistError {
    /// Stable machine code for renderers and logs.
    pub fn code(&self) -> &'static str {
        match self {
            AlistError::Unconfigured => "UNCONFIGURED",
            AlistError::InvalidUrl(_) => "INVALID_URL",
            AlistError::Unreachable(_) => "UNREACHABLE",
            AlistError::NotFound(_) => "NOT_FOUND",
            AlistError::PermissionDenied(_) => "PERMISSION_DENIED",
            AlistError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            AlistError::StaleIndex => "STALE_INDEX",
            AlistError::NoActiveListing => "NO_ACTIVE_LISTING",
            AlistError::AtRoot => "AT_ROOT",
            AlistError::IsDirectory(_) => "IS_DIRECTORY",
            AlistError::TooLarge { .. } => "TOO_LARGE",
            AlistError::NoActiveUpload => "NO_ACTIVE_UPLOAD",
            AlistError::UploadExpired => "UPLOAD_EXPIRED",
            AlistError::UploadAlreadyActive => "UPLOAD_ALREADY_ACTIVE",
        }
    }

    /// Whether the failure came from the remote service rather than
    /// session state. Transport errors are never recovered implicitly.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AlistError::Unreachable(_)
                | AlistError::NotFound(_)
                | AlistError::PermissionDenied(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AlistError>;
