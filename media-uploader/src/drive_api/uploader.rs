//! Uploading files and folder trees to Google Drive.

use crate::client::{GoogleClient, parse_json};
use crate::config::{AuthConfig, Endpoints, UploadOptions};
use crate::credentials::Credentials;
use crate::drive_api::files::{
    DriveFile, FILE_FIELDS, FOLDER_MIME_TYPE, FileList, LIST_FIELDS, NewFile, folder_query,
};
use crate::error::{Error, UploadError, ValidationError};
use crate::oauth::{BrowserConsent, Consent};
use crate::paging::Pages;
use crate::resumable::{MediaFile, ResumableUpload, guess_content_type};
use http::Method;
use std::path::{Path, PathBuf};
use tokio_stream::{Stream, StreamExt};
use tracing::instrument;

/// Full Drive access; needed to find folders the app did not create itself.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Drive's alias for the user's "My Drive" folder.
pub const ROOT_FOLDER: &str = "root";

/// Uploads local files and directories into Drive folders.
#[derive(Debug, Clone)]
pub struct DriveUploader {
    auth: AuthConfig,
    endpoints: Endpoints,
    options: UploadOptions,
    client: Option<GoogleClient>,
}

impl DriveUploader {
    /// An uploader using `client_secrets_file`, caching tokens in `drive_token.json`.
    pub fn new(client_secrets_file: impl Into<PathBuf>) -> Self {
        Self::with_config(
            AuthConfig::new(client_secrets_file, &[DRIVE_SCOPE]).token_cache("drive_token.json"),
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

    pub fn from_client(client: GoogleClient, options: UploadOptions) -> Self {
        Self {
            auth: AuthConfig::new(PathBuf::new(), &[DRIVE_SCOPE]),
            endpoints: client.endpoints().clone(),
            options,
            client: Some(client),
        }
    }

    pub fn client(&self) -> Option<&GoogleClient> {
        self.client.as_ref()
    }

    pub async fn authenticate(&mut self) -> Result<Credentials, Error> {
        self.authenticate_with(&mut BrowserConsent).await
    }

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

    fn files_url(&self) -> Result<reqwest::Url, Error> {
        self.endpoints
            .api("drive/v3/files")
            .map_err(|e| UploadError::Protocol(format!("{e:#}")).into())
    }

    /// Every file matching the Drive search `query`, across all result pages.
    pub fn search(&self, query: String) -> impl Stream<Item = Result<DriveFile, Error>> + use<'_> {
        Pages::new(move |page_token: Option<String>| {
            let query = query.clone();
            async move {
                let client = self.authenticated()?;
                let mut params = vec![
                    ("q", query.as_str()),
                    ("spaces", "drive"),
                    ("fields", LIST_FIELDS),
                    ("pageSize", "100"),
                ];
                if let Some(token) = page_token.as_deref() {
                    params.push(("pageToken", token));
                }
                let response = client
                    .make_authenticated_request(
                        Method::GET,
                        self.files_url()?,
                        &params,
                        None::<&()>,
                    )
                    .await?;
                let list: FileList = parse_json(response).await?;
                Ok((list.files, list.next_page_token))
            }
        })
    }

    /// Creates a folder called `name` inside `parent_id`.
    #[instrument(skip(self))]
    pub async fn create_folder(&self, name: &str, parent_id: &str) -> Result<DriveFile, Error> {
        let client = self.authenticated()?;
        let body = NewFile {
            name,
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: [parent_id],
        };
        let response = client
            .make_authenticated_request(
                Method::POST,
                self.files_url()?,
                &[("fields", FILE_FIELDS)],
                Some(&body),
            )
            .await?;
        let folder: DriveFile = parse_json(response).await?;
        tracing::info!(name, id = %folder.id, "created folder");
        Ok(folder)
    }

    /// Resolves a `/`-separated folder path, creating the folders that don't exist yet.
    ///
    /// The path is taken relative to `parent_id`, or to the root of My Drive if that is `None`.
    /// Returns the id of the last folder. If several folders share a name, the first one
    /// Drive lists is used.
    #[instrument(skip(self))]
    pub async fn find_or_create_folder(
        &self,
        folder_path: &str,
        parent_id: Option<&str>,
    ) -> Result<String, Error> {
        let mut current = parent_id.unwrap_or(ROOT_FOLDER).to_string();
        for name in folder_path.split('/').filter(|s| !s.is_empty()) {
            let existing = {
                let matches = self.search(folder_query(name, &current));
                let mut matches = std::pin::pin!(matches);
                matches.next().await.transpose()?
            };
            current = match existing {
                Some(folder) => {
                    tracing::debug!(name, id = %folder.id, "found folder");
                    folder.id
                }
                None => self.create_folder(name, &current).await?.id,
            };
        }
        Ok(current)
    }

    /// Uploads one file into `parent_id`, named after its basename.
    #[instrument(skip(self))]
    pub async fn upload_file(&self, file_path: &Path, parent_id: &str) -> Result<DriveFile, Error> {
        let metadata = tokio::fs::metadata(file_path)
            .await
            .map_err(|_| ValidationError::UnreadableFile(file_path.to_path_buf()))?;
        if !metadata.is_file() {
            return Err(ValidationError::NotAFile(file_path.to_path_buf()).into());
        }
        self.options.validate()?;
        let client = self.authenticated()?;

        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ValidationError::NotAFile(file_path.to_path_buf()))?;
        let body = NewFile {
            name: &name,
            mime_type: None,
            parents: [parent_id],
        };
        let media = MediaFile::open(file_path, guess_content_type(file_path)).await?;
        let url = self
            .endpoints
            .upload("upload/drive/v3/files")
            .map_err(|e| UploadError::Protocol(format!("{e:#}")))?;
        let upload = ResumableUpload::initiate(
            client,
            &self.options,
            url,
            &[("fields", FILE_FIELDS)],
            &body,
            media,
        )
        .await?;
        let resource = upload.finish().await?;
        let file: DriveFile = serde_json::from_value(resource)
            .map_err(|e| UploadError::Protocol(format!("parse uploaded file resource: {e}")))?;
        tracing::info!(name = %file.name, id = %file.id, "uploaded file");
        Ok(file)
    }

    /// Uploads the contents of `local_folder` into `parent_id`.
    ///
    /// Sub-directories become Drive folders of the same name, reusing ones that already
    /// exist. Entries of each directory are handled in name order. Symlinked files are
    /// uploaded, symlinked directories are skipped. Returns the uploaded files.
    #[instrument(skip(self))]
    pub async fn upload_folder(
        &self,
        local_folder: &Path,
        parent_id: &str,
    ) -> Result<Vec<DriveFile>, Error> {
        let mut uploaded = Vec::new();
        let mut pending = vec![(local_folder.to_path_buf(), parent_id.to_string())];
        while let Some((dir, drive_id)) = pending.pop() {
            let mut subdirs = Vec::new();
            for entry in sorted_entries(&dir).await? {
                let io_error = |source| UploadError::Io {
                    path: entry.clone(),
                    source,
                };
                let metadata = tokio::fs::symlink_metadata(&entry)
                    .await
                    .map_err(io_error)?;
                let is_link = metadata.file_type().is_symlink();
                let target = if is_link {
                    tokio::fs::metadata(&entry).await.ok()
                } else {
                    Some(metadata)
                };
                match target {
                    Some(m) if m.is_file() => {
                        uploaded.push(self.upload_file(&entry, &drive_id).await?);
                    }
                    // a link may point back up the tree
                    Some(m) if m.is_dir() && is_link => {
                        tracing::warn!(path = %entry.display(), "skipping symlinked directory");
                    }
                    Some(m) if m.is_dir() => {
                        let name = entry
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        let folder_id = self.find_or_create_folder(&name, Some(&drive_id)).await?;
                        subdirs.push((entry, folder_id));
                    }
                    _ => {
                        tracing::warn!(
                            path = %entry.display(),
                            "skipping entry that is neither file nor directory"
                        );
                    }
                }
            }
            // stack: reverse so the first sub-directory is visited first
            pending.extend(subdirs.into_iter().rev());
        }
        Ok(uploaded)
    }

    /// Uploads a file or a directory tree to the Drive folder path `dst_path`.
    ///
    /// Returns the id of the destination folder.
    #[instrument(skip(self))]
    pub async fn upload(&self, src_path: &Path, dst_path: &str) -> Result<String, Error> {
        let metadata = tokio::fs::metadata(src_path).await.ok();
        let is_file = metadata.as_ref().is_some_and(|m| m.is_file());
        let is_dir = metadata.as_ref().is_some_and(|m| m.is_dir());
        if !is_file && !is_dir {
            tracing::error!(
                path = %src_path.display(),
                "source is neither a file nor a directory"
            );
            return Err(ValidationError::NotFileOrDirectory(src_path.to_path_buf()).into());
        }

        tracing::info!(src = %src_path.display(), dst = dst_path, "starting upload to Drive");
        let folder_id = self.find_or_create_folder(dst_path, None).await?;
        if is_file {
            self.upload_file(src_path, &folder_id).await?;
        } else {
            self.upload_folder(src_path, &folder_id).await?;
        }
        tracing::info!(%folder_id, "finished upload to Drive");
        Ok(folder_id)
    }

    /// Revokes the grant and deletes the token cache.
    pub async fn revoke(&mut self) -> Result<(), Error> {
        self.authenticated()?.revoke().await?;
        self.client = None;
        Ok(())
    }
}

async fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let io_error = |source| UploadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(io_error)? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}
