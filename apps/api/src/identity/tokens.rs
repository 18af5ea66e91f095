//! Persisted provider tokens and their refresh lifecycle.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::identity::oauth::{MicrosoftOAuth, TokenSet, PROVIDER};
use crate::identity::session::SessionHub;

/// Tokens expiring within this window are refreshed before use.
const REFRESH_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProviderTokenRow {
    pub user_id: Uuid,
    pub provider: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub account_email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at - now < Duration::seconds(REFRESH_SKEW_SECS)
}

/// Upserts the user's tokens. A refresh response without a new refresh token
/// keeps the stored one.
pub async fn save_tokens(pool: &PgPool, user_id: Uuid, tokens: &TokenSet) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO provider_tokens (user_id, provider, access_token, refresh_token, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id, provider) DO UPDATE SET
            access_token  = EXCLUDED.access_token,
            refresh_token = COALESCE(EXCLUDED.refresh_token, provider_tokens.refresh_token),
            expires_at    = EXCLUDED.expires_at,
            updated_at    = now()
        "#,
    )
    .bind(user_id)
    .bind(PROVIDER)
    .bind(&tokens.access_token)
    .bind(&tokens.refresh_token)
    .bind(tokens.expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_tokens(pool: &PgPool, user_id: Uuid) -> Result<Option<ProviderTokenRow>, sqlx::Error> {
    sqlx::query_as::<_, ProviderTokenRow>(
        "SELECT * FROM provider_tokens WHERE user_id = $1 AND provider = $2",
    )
    .bind(user_id)
    .bind(PROVIDER)
    .fetch_optional(pool)
    .await
}

pub async fn delete_tokens(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM provider_tokens WHERE user_id = $1 AND provider = $2")
        .bind(user_id)
        .bind(PROVIDER)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns a usable access token for the user's mailbox, refreshing it if it
/// is about to expire. `None` means the mailbox is not (or no longer)
/// connected; a failed refresh is logged, not raised.
pub async fn resolve_access_token(
    pool: &PgPool,
    oauth: &MicrosoftOAuth,
    sessions: &SessionHub,
    user_id: Uuid,
) -> Result<Option<String>, sqlx::Error> {
    let Some(row) = load_tokens(pool, user_id).await? else {
        return Ok(None);
    };

    if !needs_refresh(row.expires_at, Utc::now()) {
        return Ok(Some(row.access_token));
    }

    let Some(refresh_token) = row.refresh_token.as_deref() else {
        warn!(%user_id, "Provider token expired and no refresh token is stored");
        return Ok(None);
    };

    match oauth.refresh(refresh_token).await {
        Ok(tokens) => {
            save_tokens(pool, user_id, &tokens).await?;
            sessions.record_provider_token(user_id, tokens.access_token.clone());
            info!(%user_id, "Refreshed provider token");
            Ok(Some(tokens.access_token))
        }
        Err(e) => {
            warn!(%user_id, "Provider token refresh failed: {e}");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_well_before_expiry_is_used_as_is() {
        let now = Utc::now();
        assert!(!needs_refresh(now + Duration::minutes(30), now));
    }

    #[test]
    fn test_token_inside_skew_window_is_refreshed() {
        let now = Utc::now();
        assert!(needs_refresh(now + Duration::seconds(30), now));
        assert!(needs_refresh(now - Duration::minutes(5), now));
    }
}
