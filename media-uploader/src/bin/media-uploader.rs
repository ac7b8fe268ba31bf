//! Command-line front end for the YouTube and Drive uploaders.
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use clap::{Args, Parser, Subcommand};
use eyre::Context;
use jiff::Timestamp;
use media_uploader::config::{AuthConfig, Endpoints, UploadOptions};
use media_uploader::drive_api::{DRIVE_SCOPE, DriveUploader};
use media_uploader::youtube_api::{
    Category, License, PrivacyStatus, UPLOAD_SCOPE, VideoDetails, YoutubeUploader,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Upload videos to YouTube and files to Google Drive.
#[derive(Parser, Debug)]
#[command(name = "media-uploader", author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// OAuth client secrets downloaded from the Google Cloud console.
    #[arg(
        long,
        global = true,
        env = "MEDIA_UPLOADER_CLIENT_SECRETS",
        default_value = "client_secrets.json"
    )]
    client_secrets: PathBuf,

    /// Token cache file [default: token.json for YouTube, drive_token.json for Drive]
    #[arg(long, global = true, env = "MEDIA_UPLOADER_TOKEN_CACHE")]
    token_cache: Option<PathBuf>,

    /// Local port for the OAuth redirect; 0 picks a free one.
    #[arg(long, global = true, env = "MEDIA_UPLOADER_PORT", default_value_t = 8081)]
    port: u16,

    /// Bytes per upload request; must be a multiple of 262144.
    #[arg(long, global = true, env = "MEDIA_UPLOADER_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Consecutive failed requests tolerated before giving up.
    #[arg(long, global = true, env = "MEDIA_UPLOADER_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "MEDIA_UPLOADER_TIMEOUT")]
    timeout: Option<u64>,
}

impl GlobalArgs {
    fn auth(&self, scope: &str, default_cache: &str) -> AuthConfig {
        AuthConfig::new(&self.client_secrets, &[scope])
            .token_cache(
                self.token_cache
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(default_cache)),
            )
            .redirect_port(self.port)
    }

    fn options(&self) -> UploadOptions {
        let mut options = UploadOptions::default();
        if let Some(chunk_size) = self.chunk_size {
            options.chunk_size = chunk_size;
        }
        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries;
        }
        options.timeout = self.timeout.map(Duration::from_secs);
        options
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a video to YouTube.
    Youtube(YoutubeArgs),
    /// Upload a file or directory to Google Drive.
    Drive {
        /// Local file or directory.
        src: PathBuf,
        /// Destination folder path in Drive, e.g. `Backups/2024`.
        dst: String,
    },
    /// Revoke the cached grant and delete the token cache.
    Revoke {
        /// Which platform's grant to revoke.
        #[arg(value_enum, default_value = "youtube")]
        platform: Platform,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Platform {
    Youtube,
    Drive,
}

#[derive(Args, Debug)]
struct YoutubeArgs {
    /// The video file.
    file: PathBuf,

    #[arg(long)]
    title: String,

    #[arg(long, default_value = "")]
    description: String,

    /// Category name (e.g. `ENTERTAINMENT`) or numeric id.
    #[arg(long, default_value = "PEOPLE_BLOGS")]
    category: Category,

    /// public, private or unlisted.
    #[arg(long, default_value = "private")]
    privacy: PrivacyStatus,

    /// May be given several times.
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Language of the title and description, e.g. `en`.
    #[arg(long)]
    language: Option<String>,

    /// youtube or creativeCommon.
    #[arg(long, default_value = "youtube")]
    license: License,

    #[arg(long)]
    not_embeddable: bool,

    #[arg(long)]
    hide_stats: bool,

    #[arg(long)]
    made_for_kids: bool,

    /// When a private video should go public, e.g. `2030-01-01T12:00:00Z`.
    #[arg(long)]
    publish_at: Option<Timestamp>,

    #[arg(long)]
    recording_date: Option<Timestamp>,

    /// A .jpg or .png image of at most 2 MiB.
    #[arg(long)]
    thumbnail: Option<PathBuf>,
}

impl YoutubeArgs {
    fn details(&self) -> VideoDetails {
        let mut details = VideoDetails::new(&self.title, self.category, self.privacy)
            .description(&self.description)
            .tags(self.tags.iter().cloned())
            .license(self.license)
            .embeddable(!self.not_embeddable)
            .public_stats_viewable(!self.hide_stats)
            .made_for_kids(self.made_for_kids);
        details.default_language = self.language.clone();
        details.publish_at = self.publish_at;
        details.recording_date = self.recording_date;
        details.thumbnail = self.thumbnail.clone();
        details
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let options = cli.global.options();
    options.validate()?;

    let output = match &cli.command {
        Command::Youtube(args) => {
            let details = args.details();
            details.validate()?;
            let mut uploader = YoutubeUploader::with_config(
                cli.global.auth(UPLOAD_SCOPE, "token.json"),
                Endpoints::default(),
                options,
            );
            uploader.authenticate().await?;
            let video = uploader
                .upload_video(&args.file, &details)
                .await
                .with_context(|| format!("upload {}", args.file.display()))?;
            tracing::info!(url = %video.watch_url(), "done");
            serde_json::to_value(&video)?
        }
        Command::Drive { src, dst } => {
            let mut uploader = DriveUploader::with_config(
                cli.global.auth(DRIVE_SCOPE, "drive_token.json"),
                Endpoints::default(),
                options,
            );
            uploader.authenticate().await?;
            let folder_id = uploader
                .upload(src, dst)
                .await
                .with_context(|| format!("upload {} to Drive", src.display()))?;
            serde_json::json!({ "folder_id": folder_id })
        }
        Command::Revoke { platform } => {
            match platform {
                Platform::Youtube => {
                    let mut uploader = YoutubeUploader::with_config(
                        cli.global.auth(UPLOAD_SCOPE, "token.json"),
                        Endpoints::default(),
                        options,
                    );
                    uploader.authenticate().await?;
                    uploader.revoke().await?;
                }
                Platform::Drive => {
                    let mut uploader = DriveUploader::with_config(
                        cli.global.auth(DRIVE_SCOPE, "drive_token.json"),
                        Endpoints::default(),
                        options,
                    );
                    uploader.authenticate().await?;
                    uploader.revoke().await?;
                }
            }
            serde_json::json!({ "revoked": true })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
