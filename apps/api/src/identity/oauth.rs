//! Delegated authorization against Microsoft identity (authorization code + PKCE).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::MicrosoftConfig;
use crate::identity::pkce;

/// Provider name recorded on linked identities.
pub const PROVIDER: &str = "azure";

pub const SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "offline_access",
    "User.Read",
    "Mail.Read",
    "Mail.ReadWrite",
    "Mail.Send",
];

const VERIFIER_TTL_SECS: u64 = 600;
const LOGIN_BASE: &str = "https://login.microsoftonline.com";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected request (status {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Could not build authorization URL: {0}")]
    NoRedirectUrl(String),

    #[error("Unknown or expired OAuth state")]
    UnknownState,

    #[error("Verifier store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Corrupt pending link: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Tokens issued by the provider, with the expiry made absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_token_set(self, now: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now + Duration::seconds(self.expires_in),
        }
    }
}

#[derive(Clone)]
pub struct MicrosoftOAuth {
    client: Client,
    config: MicrosoftConfig,
    login_base: String,
}

impl MicrosoftOAuth {
    pub fn new(config: MicrosoftConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            config,
            login_base: LOGIN_BASE.to_string(),
        }
    }

    fn endpoint(&self, leaf: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/{leaf}",
            self.login_base, self.config.tenant
        )
    }

    pub fn authorize_url(&self, state: &str, challenge: &str) -> Result<String, OAuthError> {
        if self.config.client_id.trim().is_empty() {
            return Err(OAuthError::NoRedirectUrl("client id is not configured".into()));
        }
        let scope = SCOPES.join(" ");
        let url = url::Url::parse_with_params(
            &self.endpoint("authorize"),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_mode", "query"),
                ("scope", scope.as_str()),
                ("state", state),
                ("code_challenge", challenge),
                ("code_challenge_method", pkce::CHALLENGE_METHOD),
            ],
        )
        .map_err(|e| OAuthError::NoRedirectUrl(e.to_string()))?;
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenSet, OAuthError> {
        let scope = SCOPES.join(" ");
        self.token_request(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", verifier),
            ("scope", scope.as_str()),
        ])
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, OAuthError> {
        let scope = SCOPES.join(" ");
        self.token_request(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, OAuthError> {
        let response = self
            .client
            .post(self.endpoint("token"))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderError>(&body)
                .map(|e| e.error_description.unwrap_or(e.error))
                .unwrap_or(body);
            warn!("Token endpoint returned {status}: {message}");
            return Err(OAuthError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let tokens: TokenResponse = response.json().await?;
        Ok(tokens.into_token_set(Utc::now()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pending links (verifier storage)
// ────────────────────────────────────────────────────────────────────────────

/// What the callback needs to finish a link started by `begin_link`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLink {
    pub user_id: Uuid,
    pub verifier: String,
}

/// Short-lived storage for PKCE verifiers, keyed by OAuth state.
#[async_trait]
pub trait VerifierStore: Send + Sync {
    async fn put(&self, state: &str, pending: &PendingLink) -> Result<(), OAuthError>;
    /// Reads and deletes. A state can be redeemed once.
    async fn take(&self, state: &str) -> Result<Option<PendingLink>, OAuthError>;
}

pub struct RedisVerifierStore {
    client: redis::Client,
}

impl RedisVerifierStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn key(state: &str) -> String {
        format!("luna:pkce:{state}")
    }
}

#[async_trait]
impl VerifierStore for RedisVerifierStore {
    async fn put(&self, state: &str, pending: &PendingLink) -> Result<(), OAuthError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let value = serde_json::to_string(pending)?;
        redis::cmd("SET")
            .arg(Self::key(state))
            .arg(value)
            .arg("EX")
            .arg(VERIFIER_TTL_SECS)
            .query_async::<_, ()>(&mut con)
            .await?;
        Ok(())
    }

    async fn take(&self, state: &str) -> Result<Option<PendingLink>, OAuthError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(Self::key(state))
            .query_async(&mut con)
            .await?;
        value
            .map(|v| serde_json::from_str(&v).map_err(OAuthError::from))
            .transpose()
    }
}

/// Process-local store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryVerifierStore {
    entries: parking_lot::Mutex<std::collections::HashMap<String, PendingLink>>,
}

#[cfg(test)]
#[async_trait]
impl VerifierStore for MemoryVerifierStore {
    async fn put(&self, state: &str, pending: &PendingLink) -> Result<(), OAuthError> {
        self.entries.lock().insert(state.to_string(), pending.clone());
        Ok(())
    }

    async fn take(&self, state: &str) -> Result<Option<PendingLink>, OAuthError> {
        Ok(self.entries.lock().remove(state))
    }
}

/// Starts linking a mailbox: persists a fresh verifier and returns the
/// provider URL the browser must visit.
pub async fn begin_link(
    oauth: &MicrosoftOAuth,
    store: &dyn VerifierStore,
    user_id: Uuid,
) -> Result<String, OAuthError> {
    let verifier = pkce::generate_verifier();
    let challenge = pkce::challenge_for(&verifier);
    let state = pkce::generate_state();

    let url = oauth.authorize_url(&state, &challenge)?;
    store.put(&state, &PendingLink { user_id, verifier }).await?;

    info!(%user_id, "Started Microsoft mailbox link");
    Ok(url)
}

/// Redeems the callback's `state` and exchanges the code for tokens.
pub async fn complete_link(
    oauth: &MicrosoftOAuth,
    store: &dyn VerifierStore,
    state: &str,
    code: &str,
) -> Result<(Uuid, TokenSet), OAuthError> {
    let pending = store.take(state).await?.ok_or(OAuthError::UnknownState)?;
    let tokens = oauth.exchange_code(code, &pending.verifier).await?;
    info!(user_id = %pending.user_id, "Linked Microsoft mailbox");
    Ok((pending.user_id, tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth(client_id: &str) -> MicrosoftOAuth {
        MicrosoftOAuth::new(MicrosoftConfig {
            client_id: client_id.to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:8080/api/v1/identity/microsoft/callback".to_string(),
            tenant: "common".to_string(),
        })
    }

    fn query_param(url: &str, name: &str) -> Option<String> {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[tokio::test]
    async fn test_begin_link_stores_verifier_matching_challenge() {
        let store = MemoryVerifierStore::default();
        let user_id = Uuid::new_v4();

        let url = begin_link(&oauth("app-id"), &store, user_id).await.unwrap();

        assert!(url.starts_with("https://login.microsoftonline.com/common/oauth2/v2.0/authorize"));
        let state = query_param(&url, "state").unwrap();
        let challenge = query_param(&url, "code_challenge").unwrap();
        assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
        assert!(query_param(&url, "scope").unwrap().contains("Mail.Send"));

        let pending = store.take(&state).await.unwrap().unwrap();
        assert_eq!(pending.user_id, user_id);
        assert_eq!(pkce::challenge_for(&pending.verifier), challenge);
    }

    #[tokio::test]
    async fn test_begin_link_without_client_id_is_an_error() {
        let store = MemoryVerifierStore::default();
        let err = begin_link(&oauth(""), &store, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::NoRedirectUrl(_)));
        assert!(store.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_complete_link_rejects_unknown_state() {
        let store = MemoryVerifierStore::default();
        let err = complete_link(&oauth("app-id"), &store, "nope", "code")
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::UnknownState));
    }

    #[test]
    fn test_token_response_expiry_is_absolute() {
        let now = Utc::now();
        let tokens = TokenResponse {
            access_token: "a".into(),
            refresh_token: None,
            expires_in: 3600,
        }
        .into_token_set(now);
        assert_eq!(tokens.expires_at, now + Duration::seconds(3600));
    }
}
