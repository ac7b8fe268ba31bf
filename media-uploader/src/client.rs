//! Authenticated access to Google APIs.

use crate::config::{AuthConfig, Endpoints};
use crate::credentials::{Credentials, TokenCache};
use crate::error::{Error, UploadError};
use crate::oauth::{ApplicationSecrets, Consent, OAuthManager};
use eyre::Context;
use http::Method;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::instrument;

/// Client for calling Google APIs on behalf of a user.
///
/// This client wraps [`Credentials`] and refreshes expired access tokens before API calls using
/// the stored refresh token and the OAuth manager. Refreshed tokens are written back to the
/// token cache, if one is attached.
///
/// Clones share the same credentials, so several uploaders can be built from one client.
#[derive(Debug, Clone)]
pub struct GoogleClient {
    /// The current OAuth2 credentials, protected by a mutex for refresh.
    credentials: Arc<Mutex<Credentials>>,
    /// OAuth manager for refreshing tokens (shared across clones)
    oauth_manager: Arc<OAuthManager>,
    cache: Option<TokenCache>,
    /// HTTP client for API requests
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl GoogleClient {
    /// Creates a new client with the provided credentials and OAuth manager.
    ///
    /// `timeout`, if given, bounds every individual HTTP request.
    pub fn new(
        credentials: Credentials,
        oauth_manager: Arc<OAuthManager>,
        endpoints: Endpoints,
        timeout: Option<Duration>,
    ) -> Self {
        let mut builder = reqwest::ClientBuilder::new()
            // A 308 from the upload endpoint means "resume incomplete", not "go elsewhere".
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            credentials: Arc::new(Mutex::new(credentials)),
            oauth_manager,
            cache: None,
            client: builder
                .build()
                .expect("building reqwest client should not fail"),
            endpoints,
        }
    }

    /// Obtains credentials as described by `auth` and builds a client around them.
    ///
    /// Cached tokens are reused without asking the user; see [`credentials::obtain`].
    ///
    /// [`credentials::obtain`]: crate::credentials::obtain
    pub async fn authenticate(
        auth: &AuthConfig,
        endpoints: Endpoints,
        timeout: Option<Duration>,
        consent: &mut dyn Consent,
    ) -> Result<Self, Error> {
        let secrets =
            ApplicationSecrets::from_file(&auth.client_secrets_file).map_err(Error::Auth)?;
        let oauth_manager = Arc::new(OAuthManager::new(
            secrets,
            auth.scopes.clone(),
            auth.redirect_port,
        ));
        let cache = TokenCache::new(&auth.token_cache);
        let credentials = crate::credentials::obtain(&oauth_manager, &cache, consent)
            .await
            .map_err(Error::Auth)?;
        Ok(Self::new(credentials, oauth_manager, endpoints, timeout).with_token_cache(cache))
    }

    /// Persist refreshed credentials to `cache`.
    pub fn with_token_cache(mut self, cache: TokenCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Returns a snapshot of the current credentials.
    pub async fn credentials(&self) -> Credentials {
        self.credentials.lock().await.clone()
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Gets a guaranteed-fresh access token, refreshing if necessary.
    ///
    /// This method is called before each API request. Failing to refresh is an
    /// [`Error::Auth`]: the user has to go through consent again.
    #[instrument(skip(self))]
    pub(crate) async fn fresh_access_token(&self) -> Result<String, Error> {
        let mut credentials = self.credentials.lock().await;

        if credentials.is_expired() {
            tracing::debug!("access token expired, attempting refresh");

            if credentials
                .refresh(&self.oauth_manager)
                .await
                .map_err(Error::Auth)?
            {
                tracing::debug!("access token successfully refreshed");
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.save(&credentials).await {
                        tracing::warn!(error = %e, "could not persist refreshed token");
                    }
                }
            } else {
                tracing::error!("access token refresh failed, client is unusable");
                return Err(Error::auth(
                    "access token expired and cannot be refreshed; authenticate again",
                ));
            }
        }

        Ok(credentials.access_token().to_string())
    }

    /// Starts a request to `url` carrying a fresh bearer token.
    pub(crate) async fn authorized(
        &self,
        method: Method,
        url: Url,
    ) -> Result<RequestBuilder, Error> {
        let access_token = self.fresh_access_token().await?;
        Ok(self.client.request(method, url).bearer_auth(access_token))
    }

    /// Makes an authenticated HTTP request with common error handling.
    ///
    /// This method consolidates the shared logic across metadata requests:
    /// - Token freshness validation and refresh
    /// - Authorization header setup
    /// - Query parameters
    /// - JSON body, if any
    /// - Status code validation and error handling
    ///
    /// The raw [`reqwest::Response`] is returned for method-specific JSON parsing.
    #[instrument(skip(self, json_body), level = tracing::Level::TRACE)]
    pub(crate) async fn make_authenticated_request(
        &self,
        method: Method,
        url: Url,
        query_params: &[(&str, &str)],
        json_body: Option<&(impl Serialize + Sync)>,
    ) -> Result<reqwest::Response, Error> {
        let mut request = self
            .authorized(method, url.clone())
            .await?
            .query(query_params);

        if let Some(body) = json_body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| UploadError::Transport {
                url: url.to_string(),
                source,
            })?;

        check_status(response).await
    }

    /// Revokes the grant behind this client's credentials and forgets the token cache.
    pub async fn revoke(&self) -> Result<(), Error> {
        let credentials = self.credentials.lock().await;
        self.oauth_manager
            .revoke(credentials.raw_token())
            .await
            .map_err(Error::Auth)?;
        if let Some(cache) = &self.cache {
            cache
                .remove()
                .await
                .context("forget revoked token")
                .map_err(Error::Auth)?;
        }
        Ok(())
    }
}

/// Reads a successful response body as JSON.
pub(crate) async fn parse_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, Error> {
    let url = response.url().to_string();
    let body = response
        .bytes()
        .await
        .map_err(|source| UploadError::Transport { url: url.clone(), source })?;
    serde_json::from_slice(&body)
        .map_err(|e| UploadError::Protocol(format!("unexpected response from {url}: {e}")).into())
}

/// Turns non-success responses into errors.
///
/// A `401` means the platform no longer accepts the token, which is an authentication problem
/// rather than an upload one.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::auth(format!("access token was rejected: {body}")));
    }
    Err(UploadError::from_response_body(status, &body).into())
}
