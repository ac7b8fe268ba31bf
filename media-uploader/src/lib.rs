//! Upload videos to YouTube and files to Google Drive.
//!
//! Each platform has an uploader ([`YoutubeUploader`], [`DriveUploader`]) that authenticates
//! with OAuth 2.0 and sends media through Google's resumable upload protocol. Credentials are
//! cached on disk and refreshed transparently, so the browser consent step only happens on
//! first use or after the grant is revoked.
//!
//! Errors fall into three kinds, see [`Error`].

pub mod client;
pub mod config;
pub mod credentials;
pub mod drive_api;
pub mod error;
pub mod oauth;
mod paging;
pub mod resumable;
pub mod youtube_api;

pub use client::GoogleClient;
pub use config::{AuthConfig, Endpoints, UploadOptions};
pub use credentials::{Credentials, TokenCache};
pub use drive_api::{DriveFile, DriveUploader};
pub use error::{Error, Result, UploadError, ValidationError};
pub use oauth::{BrowserConsent, Consent};
pub use youtube_api::{
    Category, License, PrivacyStatus, UploadedVideo, VideoDetails, YoutubeUploader,
};
