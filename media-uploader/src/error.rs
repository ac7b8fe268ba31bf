//! Error taxonomy for uploads.
//!
//! Everything that crosses the public API surfaces as one of three kinds:
//!
//! - [`Error::Auth`]: credentials are missing, malformed, denied or can no longer be refreshed.
//!   These are never retried automatically; the user has to re-consent.
//! - [`Error::Validation`]: a caller-supplied parameter violates a platform constraint. These
//!   are always detected locally, before any HTTP request is made.
//! - [`Error::Upload`]: the transfer itself failed, either in transport or because the platform
//!   rejected it.

use reqwest::StatusCode;
use serde::Deserialize;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("authentication failed: {0:#}")]
    Auth(eyre::Report),
    #[error("invalid upload parameter: {0}")]
    Validation(#[from] ValidationError),
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),
}

impl Error {
    pub(crate) fn auth<M>(msg: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        Self::Auth(eyre::eyre!(msg))
    }

    /// Also true for a thumbnail that failed on credentials after its video was uploaded.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Auth(_) => true,
            Self::Upload(UploadError::Thumbnail { source, .. }) => source.is_auth(),
            _ => false,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, Self::Upload(_))
    }
}

/// A parameter that the platform would reject.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("media file {0} does not exist or is not readable")]
    UnreadableFile(PathBuf),
    #[error("{0} is not a regular file")]
    NotAFile(PathBuf),
    #[error("media file {0} is empty")]
    EmptyFile(PathBuf),
    #[error("{0} is neither a file nor a directory")]
    NotFileOrDirectory(PathBuf),
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("title is {len} characters long, at most {max} are allowed")]
    TitleTooLong { len: usize, max: usize },
    #[error("description is {len} bytes long, at most {max} are allowed")]
    DescriptionTooLong { len: usize, max: usize },
    #[error("{field} must not contain '<' or '>'")]
    AngleBrackets { field: &'static str },
    #[error("tags must not be empty strings")]
    EmptyTag,
    #[error("tags add up to {len} characters, at most {max} are allowed")]
    TagsTooLong { len: usize, max: usize },
    #[error("{0:?} is not a valid language tag")]
    InvalidLanguage(String),
    #[error("scheduled publishing requires privacy status \"private\"")]
    PublishAtRequiresPrivate,
    #[error("{0:?} is not a YouTube video category")]
    UnknownCategory(String),
    #[error("{0:?} is not a YouTube privacy status")]
    UnknownPrivacyStatus(String),
    #[error("{0:?} is not a YouTube license")]
    UnknownLicense(String),
    #[error("thumbnail {path} must be a .jpg or .png image")]
    ThumbnailFormat { path: PathBuf },
    #[error("thumbnail is {len} bytes, at most {max} are allowed")]
    ThumbnailTooLarge { len: u64, max: u64 },
    #[error("a thumbnail can only be set on a video that was uploaded successfully")]
    MissingVideoId,
    #[error("chunk size {0} is not a positive multiple of 256 KiB")]
    ChunkSize(usize),
}

/// A failed transfer.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error(
        "platform returned {status}{}: {message}",
        reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default()
    )]
    Api {
        status: StatusCode,
        reason: Option<String>,
        message: String,
    },
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected response from upload endpoint: {0}")]
    Protocol(String),
    #[error("upload session expired after {acknowledged} of {total} bytes")]
    SessionExpired { acknowledged: u64, total: u64 },
    #[error(
        "gave up after {attempts} consecutive failures at byte {acknowledged} of {total}: {last}"
    )]
    RetriesExhausted {
        attempts: u32,
        acknowledged: u64,
        total: u64,
        #[source]
        last: Box<UploadError>,
    },
    #[error("video {video_id} was uploaded but setting its thumbnail failed: {source}")]
    Thumbnail {
        video_id: String,
        #[source]
        source: Box<Error>,
    },
}

impl UploadError {
    /// Whether the failure is worth resuming from, per the resumable upload protocol.
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Transport { source, .. } => {
                source.is_timeout()
                    || source.is_connect()
                    || source.is_request()
                    || source.is_body()
            }
            UploadError::Api { status, .. } => {
                matches!(
                    *status,
                    StatusCode::INTERNAL_SERVER_ERROR
                        | StatusCode::BAD_GATEWAY
                        | StatusCode::SERVICE_UNAVAILABLE
                        | StatusCode::GATEWAY_TIMEOUT
                        | StatusCode::TOO_MANY_REQUESTS
                )
            }
            _ => false,
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            UploadError::Api { reason, .. } => matches!(
                reason.as_deref(),
                Some(
                    "quotaExceeded"
                        | "uploadLimitExceeded"
                        | "dailyLimitExceeded"
                        | "rateLimitExceeded"
                )
            ),
            UploadError::RetriesExhausted { last, .. } => last.is_quota_exceeded(),
            UploadError::Thumbnail { source, .. } => {
                matches!(source.as_ref(), Error::Upload(e) if e.is_quota_exceeded())
            }
            _ => false,
        }
    }

    /// Builds an [`UploadError::Api`] from a non-success response body.
    ///
    /// Google APIs report errors as
    /// `{"error": {"code": 403, "message": "...", "errors": [{"reason": "quotaExceeded"}]}}`;
    /// anything that doesn't parse that way is kept verbatim as the message.
    pub(crate) fn from_response_body(status: StatusCode, body: &str) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            error: ErrorBody,
        }
        #[derive(Deserialize)]
        struct ErrorBody {
            message: Option<String>,
            #[serde(default)]
            errors: Vec<ErrorItem>,
        }
        #[derive(Deserialize)]
        struct ErrorItem {
            reason: Option<String>,
        }

        match serde_json::from_str::<Envelope>(body) {
            Ok(Envelope { error }) => UploadError::Api {
                status,
                reason: error.errors.into_iter().find_map(|e| e.reason),
                message: error.message.unwrap_or_else(|| body.to_string()),
            },
            Err(_) => UploadError::Api {
                status,
                reason: None,
                message: if body.is_empty() {
                    "no response body".to_string()
                } else {
                    body.to_string()
                },
            },
        }
    }
}
