//! User profile with typed preferences.
//!
//! The three JSONB columns are read through `Preferences`. Missing keys take
//! defaults; a column that fails to parse is logged and replaced by its
//! default so a bad blob never breaks the settings page.

pub mod handlers;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::models::profile::ProfileRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub email: bool,
    pub push: bool,
    pub task_reminders: bool,
    pub weekly_summary: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            push: true,
            task_reminders: true,
            weekly_summary: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemePreferences {
    pub mode: ThemeMode,
    pub compact: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionalPreferences {
    pub language: String,
    pub timezone: String,
    pub date_format: String,
}

impl Default for RegionalPreferences {
    fn default() -> Self {
        Self {
            language: "sv".into(),
            timezone: "Europe/Stockholm".into(),
            date_format: "YYYY-MM-DD".into(),
        }
    }
}

impl RegionalPreferences {
    fn validate(&self) -> Result<(), String> {
        let lang_ok = self.language.len() == 2 && self.language.chars().all(|c| c.is_ascii_lowercase());
        if !lang_ok {
            return Err(format!("invalid language code '{}'", self.language));
        }
        if self.timezone.trim().is_empty() {
            return Err("timezone must not be empty".into());
        }
        if self.date_format.trim().is_empty() {
            return Err("date_format must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Preferences {
    pub notifications: NotificationPreferences,
    pub theme: ThemePreferences,
    pub regional: RegionalPreferences,
}

impl Preferences {
    pub fn from_row(row: &ProfileRow) -> Self {
        Self {
            notifications: parse_category(&row.notification_preferences, "notification_preferences"),
            theme: parse_category(&row.theme_preferences, "theme_preferences"),
            regional: parse_category(&row.regional_preferences, "regional_preferences"),
        }
    }
}

fn parse_category<T: DeserializeOwned + Default>(value: &Value, column: &str) -> T {
    if value.is_null() {
        return T::default();
    }
    serde_json::from_value(value.clone()).unwrap_or_else(|e| {
        warn!("Stored {column} is invalid, using defaults: {e}");
        T::default()
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        let preferences = Preferences::from_row(&row);
        Self {
            user_id: row.user_id,
            first_name: row.first_name,
            last_name: row.last_name,
            preferences,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Each present category replaces the stored one wholesale.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub user_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub notifications: Option<NotificationPreferences>,
    pub theme: Option<ThemePreferences>,
    pub regional: Option<RegionalPreferences>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(regional) = &self.regional {
            regional.validate()?;
        }
        Ok(())
    }
}

fn to_json<T: Serialize>(value: &Option<T>) -> Result<Option<Value>, serde_json::Error> {
    value.as_ref().map(serde_json::to_value).transpose()
}

/// Returns the user's profile, creating it with default preferences first if
/// it does not exist yet.
pub async fn get_or_create_profile(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Profile> {
    let defaults = Preferences::default();
    sqlx::query(
        r#"
        INSERT INTO profiles (user_id, notification_preferences, theme_preferences, regional_preferences)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(serde_json::to_value(&defaults.notifications)?)
    .bind(serde_json::to_value(&defaults.theme)?)
    .bind(serde_json::to_value(&defaults.regional)?)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(row.into())
}

pub async fn update_profile(pool: &PgPool, update: &ProfileUpdate) -> anyhow::Result<Profile> {
    get_or_create_profile(pool, update.user_id).await?;

    let row = sqlx::query_as::<_, ProfileRow>(
        r#"
        UPDATE profiles SET
            first_name               = COALESCE($2, first_name),
            last_name                = COALESCE($3, last_name),
            notification_preferences = COALESCE($4, notification_preferences),
            theme_preferences        = COALESCE($5, theme_preferences),
            regional_preferences     = COALESCE($6, regional_preferences),
            updated_at               = now()
        WHERE user_id = $1
        RETURNING *
        "#,
    )
    .bind(update.user_id)
    .bind(&update.first_name)
    .bind(&update.last_name)
    .bind(to_json(&update.notifications)?)
    .bind(to_json(&update.theme)?)
    .bind(to_json(&update.regional)?)
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(notifications: Value, theme: Value, regional: Value) -> ProfileRow {
        ProfileRow {
            user_id: Uuid::new_v4(),
            first_name: Some("Lina".into()),
            last_name: None,
            notification_preferences: notifications,
            theme_preferences: theme,
            regional_preferences: regional,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_blobs_yield_defaults() {
        let prefs = Preferences::from_row(&row(json!({}), json!({}), json!({})));
        assert_eq!(prefs, Preferences::default());
        assert_eq!(prefs.regional.language, "sv");
        assert_eq!(prefs.theme.mode, ThemeMode::System);
    }

    #[test]
    fn test_missing_keys_are_defaulted_individually() {
        let prefs = Preferences::from_row(&row(
            json!({"email": false}),
            json!({"mode": "dark"}),
            json!({"timezone": "Europe/Oslo"}),
        ));
        assert!(!prefs.notifications.email);
        assert!(prefs.notifications.push);
        assert_eq!(prefs.theme.mode, ThemeMode::Dark);
        assert_eq!(prefs.regional.timezone, "Europe/Oslo");
        assert_eq!(prefs.regional.language, "sv");
    }

    #[test]
    fn test_invalid_category_falls_back_without_touching_others() {
        let prefs = Preferences::from_row(&row(
            json!({"email": "yes please"}),
            json!({"mode": "neon"}),
            json!({"language": "en"}),
        ));
        assert_eq!(prefs.notifications, NotificationPreferences::default());
        assert_eq!(prefs.theme, ThemePreferences::default());
        assert_eq!(prefs.regional.language, "en");
    }

    #[test]
    fn test_null_column_is_default() {
        let prefs = Preferences::from_row(&row(Value::Null, json!([]), json!({})));
        assert_eq!(prefs.notifications, NotificationPreferences::default());
        assert_eq!(prefs.theme, ThemePreferences::default());
    }

    #[test]
    fn test_update_validates_regional() {
        let bad = ProfileUpdate {
            user_id: Uuid::new_v4(),
            regional: Some(RegionalPreferences {
                language: "Svenska".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let ok = ProfileUpdate {
            user_id: Uuid::new_v4(),
            regional: Some(RegionalPreferences::default()),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }
}
