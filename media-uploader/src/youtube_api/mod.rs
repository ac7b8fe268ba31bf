//! Uploading to YouTube through the Data API v3.
//!
//! A video is created with a single resumable `videos.insert` call carrying the metadata
//! (`snippet`, `status` and optionally `recordingDetails`), followed by the media bytes in
//! chunks. A custom thumbnail is a separate `thumbnails.set` call once the video has an id.
//!
//! ```rust,no_run
//! use media_uploader::youtube_api::{Category, PrivacyStatus, VideoDetails, YoutubeUploader};
//!
//! # async fn example() -> Result<(), media_uploader::Error> {
//! let mut uploader = YoutubeUploader::new("client_secrets.json");
//! uploader.authenticate().await?;
//!
//! let details = VideoDetails::new("My Trip", Category::Entertainment, PrivacyStatus::Private)
//!     .description("This is a great video")
//!     .tags(["awesome", "video"])
//!     .thumbnail("thumbnail.jpg");
//! let video = uploader.upload_video("video.mp4", &details).await?;
//! println!("{}", video.watch_url());
//! # Ok(())
//! # }
//! ```

pub mod enums;
pub mod uploader;
pub mod videos;

pub use enums::{Category, License, PrivacyStatus};
pub use uploader::{UPLOAD_SCOPE, VideoDetails, YoutubeUploader};
pub use videos::{ThumbnailSetResponse, UploadedVideo};
