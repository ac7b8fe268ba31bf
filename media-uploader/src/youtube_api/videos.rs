//! YouTube Videos API types.

use crate::youtube_api::enums::{Category, License, PrivacyStatus};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request body for `videos.insert`.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/insert>
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoInsert<'a> {
    pub snippet: VideoInsertSnippet<'a>,
    pub status: VideoInsertStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_details: Option<RecordingDetails>,
}

impl VideoInsert<'_> {
    /// The `part` parameter naming every resource part present in this body.
    pub fn parts(&self) -> &'static str {
        if self.recording_details.is_some() {
            "snippet,status,recordingDetails"
        } else {
            "snippet,status"
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoInsertSnippet<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub category_id: Category,
    pub tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_language: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoInsertStatus {
    pub privacy_status: PrivacyStatus,
    pub embeddable: bool,
    pub license: License,
    pub public_stats_viewable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_at: Option<Timestamp>,
    pub self_declared_made_for_kids: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingDetails {
    /// The date and time when the video was recorded.
    pub recording_date: Option<Timestamp>,
}

/// A `video` resource as returned after an upload.
///
/// Contains the subset of the resource that echoes what was uploaded.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#resource>
#[derive(Debug, Deserialize)]
pub struct Video {
    /// The ID that YouTube uses to uniquely identify the video.
    pub id: String,
    pub snippet: Option<VideoSnippet>,
    pub status: Option<VideoStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Option<Category>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    /// `uploaded`, `processed`, `failed`, `rejected` or `deleted`.
    pub upload_status: Option<String>,
    pub privacy_status: PrivacyStatus,
    pub license: Option<License>,
    pub embeddable: Option<bool>,
    pub public_stats_viewable: Option<bool>,
    pub publish_at: Option<Timestamp>,
    pub made_for_kids: Option<bool>,
    pub self_declared_made_for_kids: Option<bool>,
}

/// Response of `thumbnails.set`.
///
/// See: <https://developers.google.com/youtube/v3/docs/thumbnails/set>
#[derive(Debug, Deserialize)]
pub struct ThumbnailSetResponse {
    #[serde(default)]
    pub items: Vec<BTreeMap<String, ThumbnailImage>>,
}

impl ThumbnailSetResponse {
    /// The URL of the largest rendition YouTube reported.
    pub fn best_url(&self) -> Option<&str> {
        self.items
            .iter()
            .flat_map(|sizes| sizes.values())
            .max_by_key(|image| image.width.unwrap_or(0))
            .map(|image| image.url.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// What the platform reports back once a video is uploaded.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedVideo {
    /// Platform-assigned video id.
    pub id: String,
    pub title: Option<String>,
    pub privacy_status: PrivacyStatus,
    pub license: Option<License>,
    pub made_for_kids: Option<bool>,
    pub publish_at: Option<Timestamp>,
    pub upload_status: Option<String>,
    /// Set when a custom thumbnail was applied as part of the upload.
    pub thumbnail_url: Option<String>,
}

impl UploadedVideo {
    /// Combines the returned resource with what was requested, for fields the response omits.
    pub(crate) fn from_response(video: Video, requested: PrivacyStatus) -> Self {
        let (privacy_status, license, made_for_kids, publish_at, upload_status) = match video.status
        {
            Some(status) => (
                status.privacy_status,
                status.license,
                status.made_for_kids.or(status.self_declared_made_for_kids),
                status.publish_at,
                status.upload_status,
            ),
            None => (requested, None, None, None, None),
        };
        Self {
            id: video.id,
            title: video.snippet.map(|s| s.title),
            privacy_status,
            license,
            made_for_kids,
            publish_at,
            upload_status,
            thumbnail_url: None,
        }
    }

    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }
}
