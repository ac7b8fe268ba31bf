//! OAuth 2.0 management for Google API authentication.
//!
//! This module encapsulates all OAuth-related operations for authenticating with Google APIs,
//! including reading the client secrets file, initial user authorization, token refresh, and
//! revocation.

use eyre::{Context, OptionExt};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RedirectUrl,
    Scope, TokenResponse, TokenUrl,
};
use reqwest::Url;
use serde::Deserialize;
use std::future::Future;
use std::path::Path;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google OAuth2 token endpoint URL used for both initial authentication and token refresh
const TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v3/token";
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

const OAUTH_DONE: &str = include_str!("../oauth_success.html");
const OAUTH_DENIED: &str = include_str!("../oauth_denied.html");

/// The `installed` (or `web`) section of a Google client secrets file.
///
/// Only `client_id` is mandatory; the endpoints default to Google's.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSecrets {
    pub client_id: ClientId,
    #[serde(default)]
    pub client_secret: Option<ClientSecret>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_revoke_uri")]
    pub revoke_uri: String,
}

fn default_auth_uri() -> String {
    AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    TOKEN_URL.to_string()
}

fn default_revoke_uri() -> String {
    REVOKE_URL.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ClientSecretsFile {
    Installed(ApplicationSecrets),
    Web(ApplicationSecrets),
}

impl ApplicationSecrets {
    /// Reads a client secrets JSON file as downloaded from the Google Cloud console.
    pub fn from_file(path: &Path) -> eyre::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read client secrets file {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("parse client secrets file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> eyre::Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(raw).context("expected an \"installed\" or \"web\" section")?;
        let (ClientSecretsFile::Installed(secrets) | ClientSecretsFile::Web(secrets)) = file;
        Url::parse(&secrets.auth_uri).context("auth_uri is not a URL")?;
        Url::parse(&secrets.token_uri).context("token_uri is not a URL")?;
        Url::parse(&secrets.revoke_uri).context("revoke_uri is not a URL")?;
        Ok(secrets)
    }
}

/// Presents the authorization URL to the user.
///
/// After `request` returns, the flow waits for the user's browser to hit the local redirect
/// endpoint with either an authorization code or an error.
pub trait Consent: Send {
    fn request(&mut self, auth_url: &Url) -> eyre::Result<()>;
}

/// Opens the authorization URL in the user's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserConsent;

impl Consent for BrowserConsent {
    fn request(&mut self, auth_url: &Url) -> eyre::Result<()> {
        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        webbrowser::open(auth_url.as_str()).context("open user's browser")
    }
}

/// Manages OAuth 2.0 authentication flows for Google API access.
///
/// The OAuthManager encapsulates all OAuth operations, providing a consistent interface
/// for initial user authentication, token refresh, and revocation.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    secrets: ApplicationSecrets,
    scopes: Vec<String>,
    redirect_port: u16,
    http: reqwest::Client,
}

impl OAuthManager {
    pub fn new(secrets: ApplicationSecrets, scopes: Vec<String>, redirect_port: u16) -> Self {
        let http = reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("building reqwest client should not fail");
        Self {
            secrets,
            scopes,
            redirect_port,
            http,
        }
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Performs a complete OAuth 2.0 authorization flow to obtain a new access token.
    ///
    /// This method initiates the full OAuth flow, including:
    /// 1. Handing the authorization URL to `consent` (usually: opening the user's browser)
    /// 2. Setting up a local HTTP server to receive the authorization callback
    /// 3. Exchanging the authorization code for an access token
    ///
    /// Fails if the user denies consent or the callback does not carry our CSRF state.
    pub async fn authenticate(
        &self,
        consent: &mut dyn Consent,
    ) -> eyre::Result<BasicTokenResponse> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_authorization_code) = self
            .setup_redirect(csrf.clone())
            .await
            .context("set up redirect endpoint")?;

        let auth_url = AuthUrl::new(self.secrets.auth_uri.clone()).context("parse auth_uri")?;
        let token_url = TokenUrl::new(self.secrets.token_uri.clone()).context("parse token_uri")?;
        let mut client = BasicClient::new(self.secrets.client_id.clone())
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);
        if let Some(secret) = &self.secrets.client_secret {
            client = client.set_client_secret(secret.clone());
        }

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _csrf_token) = client
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(move || csrf.clone())
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            // Google only hands out a refresh token for offline access.
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        consent
            .request(&auth_url)
            .context("present authorization URL to user")?;
        let authorization_code = eventually_authorization_code
            .await
            .context("await user authorization code")?;

        let token_result = client
            .exchange_code(authorization_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .context("exchange authorization code with access token")?;

        Ok(token_result)
    }

    /// Attempts to refresh an existing OAuth token using its refresh token.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(new_token))` - Refresh succeeded, new token is available
    /// * `Ok(None)` - No refresh token available, or the grant is no longer valid
    /// * `Err(_)` - Network or other error occurred during refresh attempt
    ///
    /// When refresh yields `None`, the token should be considered invalid and the user
    /// should be prompted to re-authenticate using [`Self::authenticate`].
    pub async fn refresh_token(
        &self,
        token: &BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        tracing::debug!("attempting to refresh OAuth token");

        let token_url = TokenUrl::new(self.secrets.token_uri.clone()).context("parse token_uri")?;
        let mut client = BasicClient::new(self.secrets.client_id.clone()).set_token_uri(token_url);
        if let Some(secret) = &self.secrets.client_secret {
            client = client.set_client_secret(secret.clone());
        }

        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&self.http)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("successfully refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(
                    sr.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }

    /// Revokes the grant behind `token` at the provider.
    ///
    /// The refresh token is revoked if there is one, since that invalidates the access tokens
    /// derived from it as well.
    pub async fn revoke(&self, token: &BasicTokenResponse) -> eyre::Result<()> {
        let secret = match token.refresh_token() {
            Some(refresh) => refresh.secret(),
            None => token.access_token().secret(),
        };
        let response = self
            .http
            .post(&self.secrets.revoke_uri)
            .form(&[("token", secret.as_str())])
            .send()
            .await
            .context("send revocation request")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            eyre::bail!("revocation endpoint returned {status}: {body}");
        }
        tracing::info!("revoked OAuth grant");
        Ok(())
    }

    /// Sets up a local HTTP server to receive the OAuth authorization callback.
    ///
    /// Creates a temporary HTTP server on the configured local port to handle the OAuth
    /// redirect after user authorization. The server validates the CSRF token and
    /// extracts the authorization code (or the provider's error) from the callback.
    ///
    /// # Returns
    ///
    /// A tuple containing:
    /// - The redirect URL to use in the OAuth flow
    /// - A future that resolves to the authorization code when the callback is received
    async fn setup_redirect(
        &self,
        csrf: CsrfToken,
    ) -> eyre::Result<(
        RedirectUrl,
        impl Future<Output = eyre::Result<AuthorizationCode>>,
    )> {
        let socket = tokio::net::TcpListener::bind(("127.0.0.1", self.redirect_port))
            .await
            .with_context(|| format!("bind to localhost:{}", self.redirect_port))?;
        let addr = socket.local_addr().context("get local address")?;
        let url = RedirectUrl::new(format!("http://{}:{}", addr.ip(), addr.port()))
            .context("construct redirect url")?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let r = async move {
                let (conn, _) = socket.accept().await.context("accept")?;
                let conn = hyper_util::rt::TokioIo::new(conn);
                let (got, mut gotten) = tokio::sync::mpsc::channel(1);
                let service = service_fn(move |req: Request<body::Incoming>| {
                    let csrf = csrf.clone();
                    let got = got.clone();
                    async move {
                        let mut presented_state = None;
                        let mut presented_code = None;
                        let mut presented_error = None;
                        for (k, v) in
                            form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                        {
                            match &*k {
                                "state" => presented_state = Some(v),
                                "code" => presented_code = Some(v),
                                "error" => presented_error = Some(v),
                                _ => {}
                            }
                        }
                        if presented_state.as_deref() != Some(csrf.secret().as_str()) {
                            return Err("invalid csrf token");
                        }
                        let (outcome, page) = match (presented_code, presented_error) {
                            (_, Some(error)) => (Err(error.into_owned()), OAUTH_DENIED),
                            (Some(code), None) => {
                                (Ok(AuthorizationCode::new(code.into_owned())), OAUTH_DONE)
                            }
                            (None, None) => return Err("no authorization code found"),
                        };
                        got.send(outcome)
                            .await
                            .expect("channel won't be closed until server exit");
                        Ok(Response::new(Full::<Bytes>::from(page)))
                    }
                });
                let mut serve = std::pin::pin!(
                    hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
                );

                tokio::select! {
                    exit = &mut serve => {
                        if let Err(e) = exit {
                            Err(e).context("redirect server got bad request")
                        } else {
                            eyre::bail!("redirect server exit prematurely");
                        }
                    }
                    outcome = gotten.recv() => {
                        serve.as_mut().graceful_shutdown();
                        // Let the browser receive the page before the connection goes away.
                        let _ = serve.await;
                        match outcome.ok_or_eyre("redirect handler went away")? {
                            Ok(code) => Ok(code),
                            Err(error) => eyre::bail!("user did not grant access: {error}"),
                        }
                    }
                }
            };
            let _ = tx.send(r.await);
        });
        Ok((url, async move {
            rx.await.context("redirect future dropped prematurely")?
        }))
    }
}
