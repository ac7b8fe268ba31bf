//! Fixtures shared by the integration tests: client secrets and token caches pointing at a
//! mock server, and stand-ins for the user's browser.
#![allow(dead_code)]

use media_uploader::config::{AuthConfig, Endpoints, UploadOptions};
use media_uploader::oauth::Consent;
use media_uploader::{Credentials, TokenCache};
use oauth2::basic::{BasicTokenResponse, BasicTokenType};
use oauth2::{AccessToken, EmptyExtraTokenFields, RefreshToken};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::MockServer;

pub const CHUNK: usize = 256 * 1024;

/// Writes an "installed" client secrets file whose endpoints live on `server`.
pub fn secrets_file(dir: &Path, server: &MockServer) -> PathBuf {
    let path = dir.join("client_secrets.json");
    let uri = server.uri();
    let json = serde_json::json!({
        "installed": {
            "client_id": "test-client.apps.googleusercontent.com",
            "client_secret": "shh",
            "auth_uri": format!("{uri}/o/oauth2/auth"),
            "token_uri": format!("{uri}/token"),
            "revoke_uri": format!("{uri}/revoke"),
        }
    });
    std::fs::write(&path, json.to_string()).unwrap();
    path
}

pub fn token(access: &str, refresh: Option<&str>) -> BasicTokenResponse {
    let mut token = BasicTokenResponse::new(
        AccessToken::new(access.to_string()),
        BasicTokenType::Bearer,
        EmptyExtraTokenFields {},
    );
    token.set_expires_in(Some(&Duration::from_secs(3600)));
    token.set_refresh_token(refresh.map(|r| RefreshToken::new(r.to_string())));
    token
}

/// Writes a token cache holding a valid (or already expired) token for `scope`.
pub async fn cached_token(dir: &Path, name: &str, scope: &str, expired: bool) -> TokenCache {
    let cache = TokenCache::new(dir.join(name));
    let scopes = vec![scope.to_string()];
    let credentials = if expired {
        Credentials::expired(token("ya29.stale", Some("1//refresh")), scopes)
    } else {
        Credentials::new(token("ya29.cached", Some("1//refresh")), scopes)
    };
    cache.save(&credentials).await.unwrap();
    cache
}

pub fn auth_config(dir: &Path, server: &MockServer, scope: &str, cache: &str) -> AuthConfig {
    AuthConfig::new(secrets_file(dir, server), &[scope])
        .token_cache(dir.join(cache))
        .redirect_port(0)
}

pub fn endpoints(server: &MockServer) -> Endpoints {
    Endpoints::with_base(Url::parse(&server.uri()).unwrap())
}

/// Small chunks and near-instant backoff.
pub fn options() -> UploadOptions {
    UploadOptions {
        chunk_size: CHUNK,
        max_retries: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        timeout: Some(Duration::from_secs(10)),
    }
}

/// Writes `len` bytes of a recognizable pattern.
pub fn media(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Fails the test if the consent step is reached.
pub struct NoConsent;

impl Consent for NoConsent {
    fn request(&mut self, auth_url: &Url) -> eyre::Result<()> {
        panic!("user was asked for consent: {auth_url}");
    }
}

/// Plays the user's browser: follows the consent URL straight to the redirect endpoint,
/// either granting or denying access.
#[derive(Clone, Default)]
pub struct SimulatedBrowser {
    pub deny: bool,
    pub visited: Arc<Mutex<Vec<Url>>>,
}

impl SimulatedBrowser {
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn visits(&self) -> Vec<Url> {
        self.visited.lock().unwrap().clone()
    }
}

impl Consent for SimulatedBrowser {
    fn request(&mut self, auth_url: &Url) -> eyre::Result<()> {
        self.visited.lock().unwrap().push(auth_url.clone());
        let param = |name: &str| {
            auth_url
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .unwrap()
        };
        let redirect_uri = param("redirect_uri");
        let state = param("state");
        let outcome = if self.deny {
            ("error", "access_denied")
        } else {
            ("code", "4/auth-code")
        };
        let callback =
            Url::parse_with_params(&redirect_uri, &[("state", state.as_str()), outcome]).unwrap();
        tokio::spawn(async move {
            let _ = reqwest::get(callback).await;
        });
        Ok(())
    }
}
