//! Drive v3 `files` resource types and query helpers.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// MIME type Drive uses to mark folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Partial-response selector for the fields of [`DriveFile`].
pub(crate) const FILE_FIELDS: &str = "id,name,mimeType,parents";
pub(crate) const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,parents)";

/// A file or folder in Drive.
///
/// See: <https://developers.google.com/drive/api/reference/rest/v3/files>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileList {
    #[serde(default)]
    pub files: VecDeque<DriveFile>,
    pub next_page_token: Option<String>,
}

/// Request body for `files.create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewFile<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'a str>,
    pub parents: [&'a str; 1],
}

/// Quotes `value` for use inside a `'...'` literal of a Drive search query.
pub(crate) fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Search query for non-trashed folders called `name` directly inside `parent_id`.
pub(crate) fn folder_query(name: &str, parent_id: &str) -> String {
    format!(
        "name = '{}' and mimeType = '{FOLDER_MIME_TYPE}' and '{}' in parents and trashed = false",
        escape_query_value(name),
        escape_query_value(parent_id),
    )
}
