//! OAuth credentials with explicit expiry, and their on-disk cache.

use crate::oauth::{Consent, OAuthManager};
use eyre::Context;
use jiff::{SignedDuration, Timestamp};
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tokens are treated as expired this long before the provider says they are.
const EXPIRY_BUFFER: Duration = Duration::from_secs(300);

/// Assumed lifetime (already minus the buffer) when the provider doesn't say.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3300);

/// An OAuth token bundle together with the moment it stops being usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    token: BasicTokenResponse,
    /// When the current access token expires (with safety buffer)
    expires_at: Timestamp,
    /// Scopes the provider granted.
    #[serde(default)]
    scopes: Vec<String>,
}

impl Credentials {
    /// Wraps a token fresh from the provider, computing its expiry from `expires_in`.
    ///
    /// `requested` is recorded as granted only when the response doesn't list scopes itself.
    pub fn new(token: BasicTokenResponse, requested: Vec<String>) -> Self {
        let scopes = match token.scopes() {
            Some(granted) if !granted.is_empty() => {
                granted.iter().map(|s| s.as_str().to_string()).collect()
            }
            _ => requested,
        };
        Self {
            expires_at: Self::calculate_token_expiry(&token),
            token,
            scopes,
        }
    }

    /// Wraps a token that must be refreshed before its first use.
    pub fn expired(token: BasicTokenResponse, scopes: Vec<String>) -> Self {
        Self {
            expires_at: Timestamp::UNIX_EPOCH,
            token,
            scopes,
        }
    }

    pub fn raw_token(&self) -> &BasicTokenResponse {
        &self.token
    }

    pub fn access_token(&self) -> &str {
        self.token.access_token().secret()
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn has_refresh_token(&self) -> bool {
        self.token.refresh_token().is_some()
    }

    pub fn is_expired(&self) -> bool {
        Timestamp::now() >= self.expires_at
    }

    /// Whether these credentials were granted every scope in `required`.
    pub fn covers(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.scopes.contains(s))
    }

    /// Refreshes this token using the provided OAuth manager, preserving the refresh token.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Token was successfully refreshed
    /// * `Ok(false)` - Refresh failed (invalid grant, no refresh token, etc.)
    /// * `Err(_)` - Network or other error occurred
    pub async fn refresh(&mut self, oauth_manager: &OAuthManager) -> eyre::Result<bool> {
        tracing::trace!("refreshing token");
        match oauth_manager
            .refresh_token(&self.token)
            .await
            .context("refresh OAuth token")?
        {
            Some(new_token) => {
                let old_token = std::mem::replace(&mut self.token, new_token);

                // Google usually leaves the refresh token out of refresh responses.
                if self.token.refresh_token().is_none() {
                    tracing::trace!("new token lacks refresh token, preserving original");
                    self.token
                        .set_refresh_token(old_token.refresh_token().cloned());
                } else {
                    tracing::debug!("new token includes refresh token");
                }

                self.expires_at = Self::calculate_token_expiry(&self.token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Calculates when a token should be considered expired based on its expires_in field.
    ///
    /// Uses the current time + expires_in duration - 5 minute safety buffer.
    /// If no expires_in is provided, assumes a conservative 55-minute lifetime.
    fn calculate_token_expiry(token: &BasicTokenResponse) -> Timestamp {
        let lifetime = match token.expires_in() {
            Some(expires_in) => expires_in.saturating_sub(EXPIRY_BUFFER),
            None => DEFAULT_LIFETIME,
        };
        let lifetime = SignedDuration::try_from(lifetime).unwrap_or(SignedDuration::MAX);
        Timestamp::now()
            .checked_add(lifetime)
            .unwrap_or(Timestamp::MAX)
    }
}

/// A JSON file holding [`Credentials`] between runs.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads cached credentials.
    ///
    /// A missing file yields `None`. So does a file that can't be parsed, since the only
    /// remedy is to go through consent again and overwrite it.
    pub async fn load(&self) -> eyre::Result<Option<Credentials>> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .with_context(|| format!("check for token cache {}", self.path.display()))?
        {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("read token cache {}", self.path.display()))?;
        match serde_json::from_str(&raw) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "ignoring unreadable token cache"
                );
                Ok(None)
            }
        }
    }

    /// Writes `credentials`, replacing the previous cache atomically.
    pub async fn save(&self, credentials: &Credentials) -> eyre::Result<()> {
        let json = serde_json::to_vec_pretty(credentials).context("serialize credentials")?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options
            .open(&tmp)
            .await
            .with_context(|| format!("create {}", tmp.display()))?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &json)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        file.sync_all().await.context("flush token cache")?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("move token cache into place at {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "saved credentials");
        Ok(())
    }

    pub async fn remove(&self) -> eyre::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove token cache {}", self.path.display())),
        }
    }
}

/// Produces usable credentials, asking the user only when there is no other way.
///
/// In order:
/// 1. cached credentials that cover the scopes and have not expired are used as-is;
/// 2. expired cached credentials with a refresh token are refreshed;
/// 3. otherwise the interactive flow runs through `consent`.
///
/// Whenever new tokens are obtained they are written back to `cache`.
pub async fn obtain(
    oauth_manager: &OAuthManager,
    cache: &TokenCache,
    consent: &mut dyn Consent,
) -> eyre::Result<Credentials> {
    let scopes = oauth_manager.scopes();
    let cached = cache
        .load()
        .await?
        .filter(|credentials| {
            let covers = credentials.covers(scopes);
            if !covers {
                tracing::info!("cached token lacks required scopes, ignoring it");
            }
            covers
        });

    if let Some(mut credentials) = cached {
        if !credentials.is_expired() {
            tracing::debug!(path = %cache.path().display(), "reusing cached credentials");
            return Ok(credentials);
        }
        if credentials.has_refresh_token() {
            tracing::info!("cached access token expired, refreshing");
            if credentials
                .refresh(oauth_manager)
                .await
                .context("refresh cached token")?
            {
                cache.save(&credentials).await.context("persist refreshed token")?;
                return Ok(credentials);
            }
            tracing::warn!("token refresh failed, getting new token via full OAuth");
        }
    }

    tracing::info!("fetching new credentials using OAuth flow");
    let token = oauth_manager
        .authenticate(consent)
        .await
        .context("authorize user")?;
    let credentials = Credentials::new(token, scopes.to_vec());
    if !credentials.covers(scopes) {
        tracing::warn!(granted = ?credentials.scopes(), "not every requested scope was granted");
    }
    cache.save(&credentials).await.context("persist new token")?;
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oauth2::basic::BasicTokenType;
    use oauth2::{AccessToken, EmptyExtraTokenFields, RefreshToken, Scope};

    fn token(expires_in: Option<u64>, refresh: Option<&str>) -> BasicTokenResponse {
        let mut token = BasicTokenResponse::new(
            AccessToken::new("ya29.access".to_string()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        token.set_expires_in(expires_in.map(Duration::from_secs).as_ref());
        token.set_refresh_token(refresh.map(|r| RefreshToken::new(r.to_string())));
        token
    }

    fn scopes() -> Vec<String> {
        vec!["https://www.googleapis.com/auth/youtube.upload".to_string()]
    }

    #[test]
    fn expiry_keeps_safety_buffer() {
        let before = Timestamp::now();
        let credentials = Credentials::new(token(Some(3600), None), scopes());
        let after = Timestamp::now();
        let buffered = SignedDuration::from_secs(3300);
        assert!(credentials.expires_at().duration_since(before) >= buffered);
        assert!(credentials.expires_at().duration_since(after) <= buffered);
        assert!(!credentials.is_expired());
    }

    #[test]
    fn granted_scopes_win_over_requested() {
        let mut granted = token(Some(3600), None);
        granted.set_scopes(Some(vec![Scope::new(
            "https://www.googleapis.com/auth/youtube.readonly".to_string(),
        )]));
        let credentials = Credentials::new(granted, scopes());
        assert_eq!(
            credentials.scopes(),
            ["https://www.googleapis.com/auth/youtube.readonly".to_string()]
        );
        assert!(!credentials.covers(&scopes()));

        // nothing listed, so the request stands
        let credentials = Credentials::new(token(Some(3600), None), scopes());
        assert_eq!(credentials.scopes(), scopes().as_slice());
    }

    #[test]
    fn short_lived_token_is_immediately_expired() {
        let credentials = Credentials::new(token(Some(60), None), scopes());
        assert!(credentials.is_expired());
    }

    #[test]
    fn missing_expires_in_assumes_default() {
        let credentials = Credentials::new(token(None, None), scopes());
        assert!(!credentials.is_expired());
        assert!(credentials.expires_at() > Timestamp::now() + SignedDuration::from_secs(3000));
    }

    #[test]
    fn scope_coverage() {
        let credentials = Credentials::expired(token(None, Some("1//r")), scopes());
        assert!(credentials.is_expired());
        assert!(credentials.has_refresh_token());
        assert!(credentials.covers(&scopes()));
        assert!(!credentials.covers(&["https://www.googleapis.com/auth/drive".to_string()]));
    }

    #[tokio::test]
    async fn cache_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("token.json"));
        assert!(cache.load().await.unwrap().is_none());

        let credentials = Credentials::new(token(Some(3600), Some("1//r")), scopes());
        cache.save(&credentials).await.unwrap();
        let loaded = cache.load().await.unwrap().expect("cache was just written");
        assert_eq!(loaded.access_token(), "ya29.access");
        assert_eq!(loaded.expires_at(), credentials.expires_at());
        assert_eq!(loaded.scopes(), credentials.scopes());
        assert!(loaded.has_refresh_token());

        cache.remove().await.unwrap();
        assert!(cache.load().await.unwrap().is_none());
        // removing twice is fine
        cache.remove().await.unwrap();
    }

    #[tokio::test]
    async fn garbage_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(TokenCache::new(path).load().await.unwrap().is_none());
    }
}
