//! Uploading to Google Drive through the Drive API v3.
//!
//! Files are created with resumable `files.create` uploads. Folder paths such as
//! `Backups/2024/May` are resolved one segment at a time with `files.list` searches, creating
//! the segments that are missing.

pub mod files;
pub mod uploader;

pub use files::{DriveFile, FOLDER_MIME_TYPE};
pub use uploader::{DRIVE_SCOPE, DriveUploader, ROOT_FOLDER};
