//! Settings shared by the uploaders.

use crate::error::ValidationError;
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

/// Uploads must be sent in multiples of this many bytes (except for the final chunk).
pub const CHUNK_GRANULARITY: usize = 256 * 1024;

const GOOGLE_APIS: &str = "https://www.googleapis.com/";

/// Where to send API and upload requests.
///
/// Both point at `https://www.googleapis.com/` unless overridden, which is mostly useful for
/// pointing the uploaders at a mock server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Base URL for metadata calls, e.g. `{api_base}drive/v3/files`.
    pub api_base: Url,
    /// Base URL for media calls, e.g. `{upload_base}upload/youtube/v3/videos`.
    pub upload_base: Url,
}

impl Endpoints {
    /// Uses the same base URL for both metadata and media calls.
    pub fn with_base(base: Url) -> Self {
        Self {
            api_base: base.clone(),
            upload_base: base,
        }
    }

    pub(crate) fn api(&self, path: &str) -> eyre::Result<Url> {
        join(&self.api_base, path)
    }

    pub(crate) fn upload(&self, path: &str) -> eyre::Result<Url> {
        join(&self.upload_base, path)
    }
}

fn join(base: &Url, path: &str) -> eyre::Result<Url> {
    use eyre::Context;
    // Url::join drops the last path segment of a base without a trailing slash.
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .with_context(|| format!("join {path} onto {base}"))
}

impl Default for Endpoints {
    fn default() -> Self {
        let base = Url::parse(GOOGLE_APIS).expect("static URL is valid");
        Self::with_base(base)
    }
}

/// How to obtain and persist credentials.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// The OAuth client secrets JSON downloaded from the Google Cloud console.
    pub client_secrets_file: PathBuf,
    /// Where access and refresh tokens are cached between runs.
    pub token_cache: PathBuf,
    /// Local port for the OAuth redirect. `0` picks any free port.
    pub redirect_port: u16,
    /// OAuth scopes to request.
    pub scopes: Vec<String>,
}

impl AuthConfig {
    pub fn new(client_secrets_file: impl Into<PathBuf>, scopes: &[&str]) -> Self {
        Self {
            client_secrets_file: client_secrets_file.into(),
            token_cache: PathBuf::from("token.json"),
            redirect_port: 8081,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn token_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_cache = path.into();
        self
    }

    pub fn redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = port;
        self
    }
}

/// Tuning for resumable transfers.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Bytes sent per chunk; a multiple of [`CHUNK_GRANULARITY`].
    pub chunk_size: usize,
    /// Consecutive failed attempts tolerated before the upload is abandoned.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Per-request timeout. `None` leaves it to the HTTP client.
    pub timeout: Option<Duration>,
}

impl UploadOptions {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.chunk_size == 0 || self.chunk_size % CHUNK_GRANULARITY != 0 {
            return Err(ValidationError::ChunkSize(self.chunk_size));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based).
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: 32 * CHUNK_GRANULARITY,
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(32),
            timeout: None,
        }
    }
}
