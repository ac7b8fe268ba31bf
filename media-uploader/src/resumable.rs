//! The resumable upload protocol shared by YouTube and Drive.
//!
//! An upload goes through these states:
//!
//! ```text
//! Initiated ──chunk acked──▶ Uploading { acknowledged } ──last chunk──▶ Completed
//!     │                           │   ▲
//!     │                           │   └── transient failure: query status, resume at offset
//!     └───────────────────────────┴──────▶ Failed
//! ```
//!
//! 1. [`ResumableUpload::initiate`] posts the resource metadata and receives a session URI.
//! 2. [`ResumableUpload::send_next_chunk`] sends the next unacknowledged byte range. The server
//!    answers `308 Resume Incomplete` with a `Range: bytes=0-n` header naming the last byte it
//!    has, or `200`/`201` with the finished resource.
//! 3. After a transient failure, [`ResumableUpload::query_status`] asks the server how far it
//!    got, and the next chunk starts right after that. Acknowledged bytes are never sent again.
//!
//! [`ResumableUpload::finish`] drives these steps with bounded retries.
//!
//! See: <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol>

use crate::client::{GoogleClient, check_status};
use crate::config::UploadOptions;
use crate::error::{Error, UploadError};
use bytes::Bytes;
use http::Method;
use http::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::instrument;

/// Where an upload session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// The session exists but the server has not acknowledged any bytes yet.
    Initiated,
    /// The server holds the first `acknowledged` bytes.
    Uploading { acknowledged: u64 },
    Completed,
    Failed,
}

/// The server's answer to a chunk or a status query.
#[derive(Debug)]
pub enum Progress {
    /// The server holds this many leading bytes and wants the rest.
    Acknowledged(u64),
    /// All bytes arrived; this is the created resource.
    Complete(serde_json::Value),
}

/// A local file being uploaded.
///
/// The file handle lives as long as the upload and is closed when this is dropped.
#[derive(Debug)]
pub struct MediaFile {
    path: PathBuf,
    file: tokio::fs::File,
    len: u64,
    content_type: String,
}

impl MediaFile {
    pub async fn open(path: &Path, content_type: impl Into<String>) -> Result<Self, UploadError> {
        let io_error = |source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(io_error)?;
        let len = file.metadata().await.map_err(io_error)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            content_type: content_type.into(),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    async fn read_range(&mut self, start: u64, len: usize) -> Result<Bytes, UploadError> {
        let io_error = |source| UploadError::Io {
            path: self.path.clone(),
            source,
        };
        self.file
            .seek(SeekFrom::Start(start))
            .await
            .map_err(io_error)?;
        let mut buf = vec![0; len];
        self.file.read_exact(&mut buf).await.map_err(io_error)?;
        Ok(Bytes::from(buf))
    }
}

/// One resumable upload session.
#[derive(Debug)]
pub struct ResumableUpload<'a> {
    client: &'a GoogleClient,
    options: &'a UploadOptions,
    session_uri: Url,
    media: MediaFile,
    state: UploadState,
}

impl<'a> ResumableUpload<'a> {
    /// Opens an upload session by posting `metadata` to `url` with `uploadType=resumable`.
    #[instrument(skip(client, options, metadata, media), fields(len = media.len()))]
    pub async fn initiate(
        client: &'a GoogleClient,
        options: &'a UploadOptions,
        url: Url,
        query_params: &[(&str, &str)],
        metadata: &(impl Serialize + Sync),
        media: MediaFile,
    ) -> Result<Self, Error> {
        let mut failures = 0;
        let response = loop {
            let attempt = async {
                let response = client
                    .authorized(Method::POST, url.clone())
                    .await?
                    .query(&[("uploadType", "resumable")])
                    .query(query_params)
                    .header("X-Upload-Content-Type", media.content_type())
                    .header("X-Upload-Content-Length", media.len())
                    .json(metadata)
                    .send()
                    .await
                    .map_err(|source| UploadError::Transport {
                        url: url.to_string(),
                        source,
                    })?;
                check_status(response).await
            };
            match attempt.await {
                Ok(response) => break response,
                Err(Error::Upload(e)) if e.is_transient() && failures < options.max_retries => {
                    failures += 1;
                    let delay = options.backoff(failures);
                    tracing::warn!(error = %e, ?delay, "could not open upload session, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| UploadError::Protocol("no Location header in session response".into()))?;
        let session_uri = response
            .url()
            .join(location)
            .map_err(|e| UploadError::Protocol(format!("bad session URI {location:?}: {e}")))?;
        tracing::debug!(%session_uri, "opened upload session");

        Ok(Self {
            client,
            options,
            session_uri,
            media,
            state: UploadState::Initiated,
        })
    }

    /// Picks up a session opened earlier, e.g. by a previous process.
    ///
    /// The server is asked how much it already has before anything is sent.
    pub async fn resume(
        client: &'a GoogleClient,
        options: &'a UploadOptions,
        session_uri: Url,
        media: MediaFile,
    ) -> Result<(Self, Progress), Error> {
        let mut upload = Self {
            client,
            options,
            session_uri,
            media,
            state: UploadState::Initiated,
        };
        let progress = upload.query_status().await?;
        Ok((upload, progress))
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn session_uri(&self) -> &Url {
        &self.session_uri
    }

    /// Number of leading bytes the server has confirmed.
    pub fn acknowledged(&self) -> u64 {
        match self.state {
            UploadState::Uploading { acknowledged } => acknowledged,
            UploadState::Completed => self.media.len(),
            UploadState::Initiated | UploadState::Failed => 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.media.len()
    }

    /// Sends the chunk following the last acknowledged byte.
    #[instrument(skip(self), fields(offset = self.acknowledged(), total = self.total()))]
    pub async fn send_next_chunk(&mut self) -> Result<Progress, Error> {
        let total = self.media.len();
        let start = self.acknowledged();
        if total == 0 || start >= total {
            // Nothing left to send; the server only needs to confirm.
            return self.query_status().await;
        }
        let len = (total - start).min(self.options.chunk_size as u64);
        let chunk = self.media.read_range(start, len as usize).await?;
        let content_range = format!("bytes {}-{}/{}", start, start + len - 1, total);
        tracing::trace!(%content_range, "sending chunk");

        let response = self
            .client
            .authorized(Method::PUT, self.session_uri.clone())
            .await?
            .header(CONTENT_TYPE, self.media.content_type())
            .header(CONTENT_LENGTH, len)
            .header(CONTENT_RANGE, content_range)
            .body(chunk)
            .send()
            .await;
        self.interpret(response).await
    }

    /// Asks the server how many bytes of this session it holds.
    #[instrument(skip(self))]
    pub async fn query_status(&mut self) -> Result<Progress, Error> {
        let response = self
            .client
            .authorized(Method::PUT, self.session_uri.clone())
            .await?
            .header(CONTENT_LENGTH, 0u64)
            .header(CONTENT_RANGE, format!("bytes */{}", self.media.len()))
            .send()
            .await;
        self.interpret(response).await
    }

    async fn interpret(
        &mut self,
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<Progress, Error> {
        let response = response.map_err(|source| UploadError::Transport {
            url: self.session_uri.to_string(),
            source,
        })?;
        match response.status() {
            StatusCode::PERMANENT_REDIRECT => {
                let acknowledged = response
                    .headers()
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok())
                    .map(parse_range)
                    .transpose()?
                    .unwrap_or(0);
                if acknowledged > self.media.len() {
                    return Err(UploadError::Protocol(format!(
                        "server claims {acknowledged} bytes of a {} byte upload",
                        self.media.len()
                    ))
                    .into());
                }
                self.state = UploadState::Uploading { acknowledged };
                tracing::debug!(acknowledged, total = self.media.len(), "chunk acknowledged");
                Ok(Progress::Acknowledged(acknowledged))
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(UploadError::SessionExpired {
                acknowledged: self.acknowledged(),
                total: self.media.len(),
            }
            .into()),
            _ => {
                let response = check_status(response).await?;
                let resource = response.json().await.map_err(|source| UploadError::Transport {
                    url: self.session_uri.to_string(),
                    source,
                })?;
                self.state = UploadState::Completed;
                Ok(Progress::Complete(resource))
            }
        }
    }

    /// Sends every remaining byte and returns the created resource.
    ///
    /// Transient failures are retried with exponential backoff: the server is asked for its
    /// offset and the transfer continues from there. At most `max_retries` consecutive attempts
    /// may fail; any chunk that moves the offset forward resets the count. Other failures end
    /// the upload immediately.
    pub async fn finish(mut self) -> Result<serde_json::Value, Error> {
        tracing::info!(total = self.media.len(), "uploading");
        let mut failures = 0;
        let mut needs_status = false;
        loop {
            let before = self.acknowledged();
            let attempt = if needs_status {
                self.query_status().await
            } else {
                self.send_next_chunk().await
            };
            match attempt {
                Ok(Progress::Complete(resource)) => {
                    tracing::info!(total = self.media.len(), "upload complete");
                    return Ok(resource);
                }
                Ok(Progress::Acknowledged(acknowledged)) => {
                    if acknowledged > before {
                        failures = 0;
                    } else if !needs_status {
                        // The server took the chunk but kept none of it.
                        failures += 1;
                        if failures > self.options.max_retries {
                            self.state = UploadState::Failed;
                            return Err(UploadError::Protocol(format!(
                                "no progress past byte {acknowledged} after {failures} chunks"
                            ))
                            .into());
                        }
                    }
                    needs_status = false;
                }
                Err(Error::Upload(e)) if e.is_transient() => {
                    failures += 1;
                    if failures > self.options.max_retries {
                        self.state = UploadState::Failed;
                        return Err(UploadError::RetriesExhausted {
                            attempts: failures,
                            acknowledged: before,
                            total: self.media.len(),
                            last: Box::new(e),
                        }
                        .into());
                    }
                    let delay = self.options.backoff(failures);
                    tracing::warn!(
                        error = %e,
                        acknowledged = before,
                        ?delay,
                        "chunk failed, resuming after delay"
                    );
                    tokio::time::sleep(delay).await;
                    needs_status = true;
                }
                Err(e) => {
                    self.state = UploadState::Failed;
                    return Err(e);
                }
            }
        }
    }
}

/// Guesses a MIME type from the file extension.
///
/// Unknown extensions fall back to `application/octet-stream`, which both platforms accept.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "mpg" | "mpeg" => "video/mpeg",
        "3gp" => "video/3gpp",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "zip" => "application/zip",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

/// Parses a `Range: bytes=0-n` header into the number of bytes held (`n + 1`).
fn parse_range(value: &str) -> Result<u64, UploadError> {
    let bad = || UploadError::Protocol(format!("malformed Range header {value:?}"));
    let range = value.trim().strip_prefix("bytes=").ok_or_else(bad)?;
    let (start, end) = range.split_once('-').ok_or_else(bad)?;
    if start.trim() != "0" {
        return Err(bad());
    }
    let end: u64 = end.trim().parse().map_err(|_| bad())?;
    Ok(end + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_header() {
        assert_eq!(parse_range("bytes=0-262143").unwrap(), 262144);
        assert_eq!(parse_range("bytes=0-0").unwrap(), 1);
        assert!(parse_range("bytes=5-10").is_err());
        assert!(parse_range("0-10").is_err());
        assert!(parse_range("bytes=0-").is_err());
    }

    #[test]
    fn content_types() {
        assert_eq!(guess_content_type(Path::new("a/clip.MP4")), "video/mp4");
        assert_eq!(guess_content_type(Path::new("thumb.jpeg")), "image/jpeg");
        assert_eq!(guess_content_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(guess_content_type(Path::new("README")), "application/octet-stream");
    }

    #[tokio::test]
    async fn media_reads_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"0123456789").unwrap();
        let mut media = MediaFile::open(&path, "video/mp4").await.unwrap();
        assert_eq!(media.len(), 10);
        assert_eq!(&media.read_range(3, 4).await.unwrap()[..], b"3456");
        assert_eq!(&media.read_range(0, 2).await.unwrap()[..], b"01");
    }

    #[tokio::test]
    async fn missing_media_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MediaFile::open(&dir.path().join("nope.mp4"), "video/*")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Io { .. }));
    }
}
