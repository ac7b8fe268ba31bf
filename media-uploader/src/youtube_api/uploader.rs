//! Uploading videos to a YouTube channel.

use crate::client::{GoogleClient, check_status, parse_json};
use crate::config::{AuthConfig, Endpoints, UploadOptions};
use crate::credentials::Credentials;
use crate::error::{Error, UploadError, ValidationError};
use crate::oauth::{BrowserConsent, Consent};
use crate::resumable::{MediaFile, ResumableUpload, guess_content_type};
use crate::youtube_api::enums::{Category, License, PrivacyStatus};
use crate::youtube_api::videos::{
    RecordingDetails, ThumbnailSetResponse, UploadedVideo, Video, VideoInsert, VideoInsertSnippet,
    VideoInsertStatus,
};
use http::Method;
use http::header::CONTENT_TYPE;
use jiff::Timestamp;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Scope needed to upload videos and set their thumbnails.
pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_BYTES: usize = 5000;
pub const MAX_TAGS_CHARS: usize = 500;
pub const MAX_THUMBNAIL_BYTES: u64 = 2 * 1024 * 1024;

/// Everything about a video except its bytes.
///
/// Defaults follow YouTube's: embeddable, public statistics, standard license, not made for
/// kids.
#[derive(Debug, Clone)]
pub struct VideoDetails {
    /// Up to 100 characters.
    pub title: String,
    /// Up to 5000 bytes.
    pub description: String,
    pub category: Category,
    pub privacy_status: PrivacyStatus,
    /// Up to 500 characters in total.
    pub tags: Vec<String>,
    /// Language of the title and description, e.g. `en`.
    pub default_language: Option<String>,
    pub embeddable: bool,
    pub license: License,
    pub public_stats_viewable: bool,
    pub made_for_kids: bool,
    /// When a private video should become public.
    pub publish_at: Option<Timestamp>,
    pub recording_date: Option<Timestamp>,
    /// A `.jpg` or `.png` of at most 2 MiB, set once the upload completes.
    pub thumbnail: Option<PathBuf>,
}

impl VideoDetails {
    pub fn new(
        title: impl Into<String>,
        category: Category,
        privacy_status: PrivacyStatus,
    ) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category,
            privacy_status,
            tags: Vec::new(),
            default_language: None,
            embeddable: true,
            license: License::default(),
            public_stats_viewable: true,
            made_for_kids: false,
            publish_at: None,
            recording_date: None,
            thumbnail: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = Some(language.into());
        self
    }

    pub fn embeddable(mut self, embeddable: bool) -> Self {
        self.embeddable = embeddable;
        self
    }

    pub fn license(mut self, license: License) -> Self {
        self.license = license;
        self
    }

    pub fn public_stats_viewable(mut self, viewable: bool) -> Self {
        self.public_stats_viewable = viewable;
        self
    }

    pub fn made_for_kids(mut self, made_for_kids: bool) -> Self {
        self.made_for_kids = made_for_kids;
        self
    }

    pub fn publish_at(mut self, at: Timestamp) -> Self {
        self.publish_at = Some(at);
        self
    }

    pub fn recording_date(mut self, at: Timestamp) -> Self {
        self.recording_date = Some(at);
        self
    }

    pub fn thumbnail(mut self, path: impl Into<PathBuf>) -> Self {
        self.thumbnail = Some(path.into());
        self
    }

    /// Checks the metadata against YouTube's limits.
    ///
    /// Files are checked separately since that needs the filesystem.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let title_len = self.title.chars().count();
        if title_len > MAX_TITLE_CHARS {
            return Err(ValidationError::TitleTooLong {
                len: title_len,
                max: MAX_TITLE_CHARS,
            });
        }
        if self.title.contains(['<', '>']) {
            return Err(ValidationError::AngleBrackets { field: "title" });
        }
        if self.description.len() > MAX_DESCRIPTION_BYTES {
            return Err(ValidationError::DescriptionTooLong {
                len: self.description.len(),
                max: MAX_DESCRIPTION_BYTES,
            });
        }
        if self.description.contains(['<', '>']) {
            return Err(ValidationError::AngleBrackets {
                field: "description",
            });
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(ValidationError::EmptyTag);
        }
        let tags_len = tags_length(&self.tags);
        if tags_len > MAX_TAGS_CHARS {
            return Err(ValidationError::TagsTooLong {
                len: tags_len,
                max: MAX_TAGS_CHARS,
            });
        }
        if let Some(language) = &self.default_language {
            if !is_language_tag(language) {
                return Err(ValidationError::InvalidLanguage(language.clone()));
            }
        }
        if self.publish_at.is_some() && self.privacy_status != PrivacyStatus::Private {
            return Err(ValidationError::PublishAtRequiresPrivate);
        }
        Ok(())
    }

    fn insert_body(&self) -> VideoInsert<'_> {
        VideoInsert {
            snippet: VideoInsertSnippet {
                title: &self.title,
                description: &self.description,
                category_id: self.category,
                tags: &self.tags,
                default_language: self.default_language.as_deref(),
            },
            status: VideoInsertStatus {
                privacy_status: self.privacy_status,
                embeddable: self.embeddable,
                license: self.license,
                public_stats_viewable: self.public_stats_viewable,
                publish_at: self.publish_at,
                self_declared_made_for_kids: self.made_for_kids,
            },
            recording_details: self.recording_date.map(|at| RecordingDetails {
                recording_date: Some(at),
            }),
        }
    }
}

/// Length of the tag list the way YouTube counts it: tags are joined with commas, and tags
/// containing spaces are wrapped in quotes.
fn tags_length(tags: &[String]) -> usize {
    let chars: usize = tags
        .iter()
        .map(|t| t.chars().count() + if t.contains(' ') { 2 } else { 0 })
        .sum();
    chars + tags.len().saturating_sub(1)
}

fn is_language_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 35
        && tag
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Checks that `path` is a non-empty regular file we can open.
pub(crate) async fn check_media_file(path: &Path) -> Result<u64, ValidationError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| ValidationError::UnreadableFile(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(ValidationError::NotAFile(path.to_path_buf()));
    }
    tokio::fs::File::open(path)
        .await
        .map_err(|_| ValidationError::UnreadableFile(path.to_path_buf()))?;
    if metadata.len() == 0 {
        return Err(ValidationError::EmptyFile(path.to_path_buf()));
    }
    Ok(metadata.len())
}

async fn check_thumbnail(path: &Path) -> Result<&'static str, ValidationError> {
    let content_type = match guess_content_type(path) {
        ct @ ("image/jpeg" | "image/png") => ct,
        _ => {
            return Err(ValidationError::ThumbnailFormat {
                path: path.to_path_buf(),
            });
        }
    };
    let len = check_media_file(path).await?;
    if len > MAX_THUMBNAIL_BYTES {
        return Err(ValidationError::ThumbnailTooLarge {
            len,
            max: MAX_THUMBNAIL_BYTES,
        });
    }
    Ok(content_type)
}

/// Uploads videos to the authenticated user's YouTube channel.
///
/// The uploader starts out unauthenticated; call [`Self::authenticate`] (or build it from an
/// existing client with [`Self::from_client`]) before uploading.
#[derive(Debug, Clone)]
pub struct YoutubeUploader {
    auth: AuthConfig,
    endpoints: Endpoints,
    options: UploadOptions,
    client: Option<GoogleClient>,
}

impl YoutubeUploader {
    /// An uploader using `client_secrets_file`, caching tokens in `token.json`.
    pub fn new(client_secrets_file: impl Into<PathBuf>) -> Self {
        Self::with_config(
            AuthConfig::new(client_secrets_file, &[UPLOAD_SCOPE]),
            Endpoints::default(),
            UploadOptions::default(),
        )
    }

    pub fn with_config(auth: AuthConfig, endpoints: Endpoints, options: UploadOptions) -> Self {
        Self {
            auth,
            endpoints,
            options,
            client: None,
        }
    }

    /// An uploader that shares the credentials of an already authenticated client.
    pub fn from_client(client: GoogleClient, options: UploadOptions) -> Self {
        Self {
            auth: AuthConfig::new(PathBuf::new(), &[UPLOAD_SCOPE]),
            endpoints: client.endpoints().clone(),
            options,
            client: Some(client),
        }
    }

    pub fn client(&self) -> Option<&GoogleClient> {
        self.client.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.is_some()
    }

    /// Authenticates, opening the user's browser if there is no usable cached token.
    pub async fn authenticate(&mut self) -> Result<Credentials, Error> {
        self.authenticate_with(&mut BrowserConsent).await
    }

    /// Authenticates, presenting the consent URL through `consent` if it is needed.
    pub async fn authenticate_with(
        &mut self,
        consent: &mut dyn Consent,
    ) -> Result<Credentials, Error> {
        let client = GoogleClient::authenticate(
            &self.auth,
            self.endpoints.clone(),
            self.options.timeout,
            consent,
        )
        .await?;
        let credentials = client.credentials().await;
        self.client = Some(client);
        Ok(credentials)
    }

    fn authenticated(&self) -> Result<&GoogleClient, Error> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::auth("not authenticated; call authenticate first"))
    }

    /// Uploads the video at `file_path` with the given metadata.
    ///
    /// Every parameter is validated before the first request goes out. The file is sent with
    /// the resumable protocol, and if [`VideoDetails::thumbnail`] is set, the thumbnail is
    /// applied once the video exists.
    #[instrument(skip(self, details), fields(title = %details.title))]
    pub async fn upload_video(
        &self,
        file_path: impl AsRef<Path> + std::fmt::Debug,
        details: &VideoDetails,
    ) -> Result<UploadedVideo, Error> {
        let file_path = file_path.as_ref();
        details.validate()?;
        self.options.validate()?;
        check_media_file(file_path).await?;
        if let Some(thumbnail) = &details.thumbnail {
            check_thumbnail(thumbnail).await?;
        }
        let client = self.authenticated()?;

        let media = MediaFile::open(file_path, guess_content_type(file_path)).await?;
        let body = details.insert_body();
        let url = self
            .endpoints
            .upload("upload/youtube/v3/videos")
            .map_err(|e| UploadError::Protocol(format!("{e:#}")))?;
        let upload = ResumableUpload::initiate(
            client,
            &self.options,
            url,
            &[("part", body.parts())],
            &body,
            media,
        )
        .await?;
        let resource = upload.finish().await?;
        let video: Video = serde_json::from_value(resource)
            .map_err(|e| UploadError::Protocol(format!("parse uploaded video resource: {e}")))?;
        let mut uploaded = UploadedVideo::from_response(video, details.privacy_status);
        tracing::info!(
            video_id = %uploaded.id,
            privacy = %uploaded.privacy_status,
            "video uploaded"
        );

        if let Some(thumbnail) = &details.thumbnail {
            match self.set_thumbnail(&uploaded.id, thumbnail).await {
                Ok(response) => {
                    uploaded.thumbnail_url = response.best_url().map(str::to_string);
                }
                Err(e) => {
                    tracing::error!(
                        video_id = %uploaded.id,
                        error = %e,
                        "video uploaded but thumbnail was not set"
                    );
                    return Err(UploadError::Thumbnail {
                        video_id: uploaded.id,
                        source: Box::new(e),
                    }
                    .into());
                }
            }
        }

        Ok(uploaded)
    }

    /// Sets a custom thumbnail on an uploaded video.
    ///
    /// `video_id` is the id returned by [`Self::upload_video`]. An empty id means there is no
    /// uploaded video to attach the thumbnail to.
    #[instrument(skip(self))]
    pub async fn set_thumbnail(
        &self,
        video_id: &str,
        thumbnail_path: impl AsRef<Path> + std::fmt::Debug,
    ) -> Result<ThumbnailSetResponse, Error> {
        let thumbnail_path = thumbnail_path.as_ref();
        if video_id.trim().is_empty() {
            return Err(ValidationError::MissingVideoId.into());
        }
        let content_type = check_thumbnail(thumbnail_path).await?;
        let client = self.authenticated()?;

        let image = tokio::fs::read(thumbnail_path)
            .await
            .map_err(|source| UploadError::Io {
                path: thumbnail_path.to_path_buf(),
                source,
            })?;
        let url = self
            .endpoints
            .upload("upload/youtube/v3/thumbnails/set")
            .map_err(|e| UploadError::Protocol(format!("{e:#}")))?;
        let response = client
            .authorized(Method::POST, url.clone())
            .await?
            .query(&[("videoId", video_id), ("uploadType", "media")])
            .header(CONTENT_TYPE, content_type)
            .body(image)
            .send()
            .await
            .map_err(|source| UploadError::Transport {
                url: url.to_string(),
                source,
            })?;
        let response: ThumbnailSetResponse = parse_json(check_status(response).await?).await?;
        tracing::info!(video_id, "thumbnail set");
        Ok(response)
    }

    /// Revokes the grant and deletes the token cache.
    pub async fn revoke(&mut self) -> Result<(), Error> {
        self.authenticated()?.revoke().await?;
        self.client = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn details() -> VideoDetails {
        VideoDetails::new("T", Category::Entertainment, PrivacyStatus::Public).tags(["a", "b"])
    }

    #[test]
    fn defaults() {
        let d = details();
        assert!(d.embeddable);
        assert!(d.public_stats_viewable);
        assert!(!d.made_for_kids);
        assert_eq!(d.license, License::Youtube);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn title_limits() {
        assert_eq!(
            details().clone_with_title("").validate(),
            Err(ValidationError::EmptyTitle)
        );
        assert_eq!(
            details().clone_with_title(&"x".repeat(101)).validate(),
            Err(ValidationError::TitleTooLong { len: 101, max: 100 })
        );
        // characters, not bytes
        assert!(details().clone_with_title(&"é".repeat(100)).validate().is_ok());
        assert_eq!(
            details().clone_with_title("a <b>").validate(),
            Err(ValidationError::AngleBrackets { field: "title" })
        );
    }

    #[test]
    fn description_limits() {
        assert!(details().description("x".repeat(5000)).validate().is_ok());
        assert_eq!(
            details().description("x".repeat(5001)).validate(),
            Err(ValidationError::DescriptionTooLong {
                len: 5001,
                max: 5000
            })
        );
    }

    #[test]
    fn tag_length_counts_separators_and_quotes() {
        assert_eq!(tags_length(&[]), 0);
        assert_eq!(tags_length(&["abc".into()]), 3);
        assert_eq!(tags_length(&["abc".into(), "de".into()]), 6);
        assert_eq!(tags_length(&["a b".into()]), 5);

        let fifty = vec!["x".repeat(9); 50];
        assert_eq!(tags_length(&fifty), 499);
        assert!(details().tags(fifty.clone()).validate().is_ok());
        let mut too_many = fifty;
        too_many.push("y".into());
        assert!(matches!(
            details().tags(too_many).validate(),
            Err(ValidationError::TagsTooLong { len: 501, .. })
        ));
        assert_eq!(
            details().tags(["ok", " "]).validate(),
            Err(ValidationError::EmptyTag)
        );
    }

    #[test]
    fn language_tags() {
        assert!(is_language_tag("en"));
        assert!(is_language_tag("pt-BR"));
        assert!(is_language_tag("zh-Hant-TW"));
        assert!(!is_language_tag(""));
        assert!(!is_language_tag("en_US"));
        assert!(!is_language_tag("-en"));
        assert_eq!(
            details().default_language("en US").validate(),
            Err(ValidationError::InvalidLanguage("en US".into()))
        );
    }

    #[test]
    fn scheduled_publishing_needs_private() {
        let at: Timestamp = "2030-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(
            details().publish_at(at).validate(),
            Err(ValidationError::PublishAtRequiresPrivate)
        );
        let mut private = details().publish_at(at);
        private.privacy_status = PrivacyStatus::Private;
        assert!(private.validate().is_ok());
    }

    #[test]
    fn recording_date_adds_part() {
        let at: Timestamp = "2024-05-01T12:00:00Z".parse().unwrap();
        assert_eq!(details().insert_body().parts(), "snippet,status");
        assert_eq!(
            details().recording_date(at).insert_body().parts(),
            "snippet,status,recordingDetails"
        );
    }

    #[tokio::test]
    async fn media_file_checks() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.mp4");
        assert_eq!(
            check_media_file(&missing).await,
            Err(ValidationError::UnreadableFile(missing.clone()))
        );
        assert_eq!(
            check_media_file(dir.path()).await,
            Err(ValidationError::NotAFile(dir.path().to_path_buf()))
        );
        let empty = dir.path().join("empty.mp4");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(
            check_media_file(&empty).await,
            Err(ValidationError::EmptyFile(empty.clone()))
        );
        let video = dir.path().join("video.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        assert_eq!(check_media_file(&video).await, Ok(18));
    }

    #[tokio::test]
    async fn thumbnail_checks() {
        let dir = tempfile::tempdir().unwrap();
        let gif = dir.path().join("thumb.gif");
        std::fs::write(&gif, b"GIF89a").unwrap();
        assert!(matches!(
            check_thumbnail(&gif).await,
            Err(ValidationError::ThumbnailFormat { .. })
        ));
        let big = dir.path().join("thumb.png");
        std::fs::write(&big, vec![0u8; MAX_THUMBNAIL_BYTES as usize + 1]).unwrap();
        assert!(matches!(
            check_thumbnail(&big).await,
            Err(ValidationError::ThumbnailTooLarge { .. })
        ));
        let ok = dir.path().join("thumb.JPG");
        std::fs::write(&ok, b"\xff\xd8\xff").unwrap();
        assert_eq!(check_thumbnail(&ok).await, Ok("image/jpeg"));
    }

    impl VideoDetails {
        fn clone_with_title(&self, title: &str) -> Self {
            let mut d = self.clone();
            d.title = title.to_string();
            d
        }
    }
}
