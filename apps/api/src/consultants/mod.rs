//! Consultant registry.
//!
//! Rows hold only what the user entered. Contact details shown in lists are
//! synthesized per request into `ConsultantView::derived` and never written
//! back.

pub mod handlers;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::consultant::Consultant;

const EMAIL_DOMAIN: &str = "luna-konsult.se";
const AVATAR_BASE: &str = "https://ui-avatars.com/api/";
/// Assignment status that marks a consultant as booked.
const ACTIVE_ASSIGNMENT_STATUS: &str = "pågående";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    OnAssignment,
}

/// Presentation-only fields. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedContact {
    pub email: String,
    pub phone: String,
    pub avatar_url: String,
    pub status: Availability,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsultantView {
    #[serde(flatten)]
    pub consultant: Consultant,
    pub derived: DerivedContact,
}

impl ConsultantView {
    pub fn new(consultant: Consultant, on_assignment: bool) -> Self {
        let derived = derive_contact(&consultant, on_assignment);
        Self { consultant, derived }
    }
}

pub fn derive_contact(consultant: &Consultant, on_assignment: bool) -> DerivedContact {
    DerivedContact {
        email: synthesized_email(&consultant.name, consultant.id),
        phone: synthesized_phone(consultant.id),
        avatar_url: avatar_url(&consultant.name),
        status: if on_assignment {
            Availability::OnAssignment
        } else {
            Availability::Available
        },
    }
}

/// `anna.svensson.1a2b3c@luna-konsult.se`. The id suffix keeps same-name
/// consultants apart.
pub fn synthesized_email(name: &str, id: Uuid) -> String {
    let slug = slugify(name);
    let suffix = &id.simple().to_string()[..6];
    if slug.is_empty() {
        format!("konsult.{suffix}@{EMAIL_DOMAIN}")
    } else {
        format!("{slug}.{suffix}@{EMAIL_DOMAIN}")
    }
}

fn synthesized_phone(id: Uuid) -> String {
    let b = id.as_bytes();
    let digits: Vec<u32> = b.iter().take(7).map(|x| u32::from(*x) % 10).collect();
    format!(
        "+46 70 {}{}{} {}{} {}{}",
        digits[0], digits[1], digits[2], digits[3], digits[4], digits[5], digits[6]
    )
}

fn avatar_url(name: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(name.trim().as_bytes()).collect();
    format!("{AVATAR_BASE}?name={encoded}&background=random")
}

fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        let mapped = match c {
            'å' | 'ä' | 'á' | 'à' => Some('a'),
            'ö' | 'ø' | 'ó' => Some('o'),
            'é' | 'è' | 'ë' => Some('e'),
            'ü' => Some('u'),
            c if c.is_ascii_alphanumeric() => Some(c),
            _ => None,
        };
        match mapped {
            Some(c) => out.push(c),
            None if !out.is_empty() && !out.ends_with('.') => out.push('.'),
            None => {}
        }
    }
    out.trim_end_matches('.').to_string()
}

#[derive(Debug, Deserialize)]
pub struct NewConsultant {
    pub user_id: Uuid,
    pub name: String,
    pub specialty: Option<String>,
    pub personal_id: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsultantUpdate {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub personal_id: Option<String>,
    pub location: Option<String>,
}

impl NewConsultant {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        Ok(())
    }
}

impl ConsultantUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err("name must not be empty".into());
        }
        Ok(())
    }
}

pub async fn list_consultants(pool: &PgPool, user_id: Uuid) -> Result<Vec<Consultant>, sqlx::Error> {
    sqlx::query_as::<_, Consultant>(
        "SELECT * FROM consultants WHERE user_id = $1 ORDER BY name ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn get_consultant(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> Result<Option<Consultant>, sqlx::Error> {
    sqlx::query_as::<_, Consultant>("SELECT * FROM consultants WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Ids of the user's consultants currently out on an assignment.
pub async fn consultants_on_assignment(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<HashSet<Uuid>, sqlx::Error> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT consultant_id FROM assignments
        WHERE user_id = $1 AND status = $2 AND consultant_id IS NOT NULL
        "#,
    )
    .bind(user_id)
    .bind(ACTIVE_ASSIGNMENT_STATUS)
    .fetch_all(pool)
    .await?;
    Ok(ids.into_iter().collect())
}

pub async fn create_consultant(pool: &PgPool, new: &NewConsultant) -> Result<Consultant, sqlx::Error> {
    sqlx::query_as::<_, Consultant>(
        r#"
        INSERT INTO consultants (user_id, name, specialty, personal_id, location)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(new.user_id)
    .bind(new.name.trim())
    .bind(&new.specialty)
    .bind(&new.personal_id)
    .bind(&new.location)
    .fetch_one(pool)
    .await
}

pub async fn update_consultant(
    pool: &PgPool,
    id: Uuid,
    update: &ConsultantUpdate,
) -> Result<Option<Consultant>, sqlx::Error> {
    sqlx::query_as::<_, Consultant>(
        r#"
        UPDATE consultants SET
            name        = COALESCE($3, name),
            specialty   = COALESCE($4, specialty),
            personal_id = COALESCE($5, personal_id),
            location    = COALESCE($6, location),
            updated_at  = now()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(update.user_id)
    .bind(update.name.as_deref().map(str::trim))
    .bind(&update.specialty)
    .bind(&update.personal_id)
    .bind(&update.location)
    .fetch_optional(pool)
    .await
}

pub async fn delete_consultant(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM consultants WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn consultant(name: &str) -> Consultant {
        Consultant {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: name.to_string(),
            specialty: Some("Sjuksköterska".into()),
            personal_id: None,
            location: Some("Umeå".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_same_name_consultants_get_distinct_emails() {
        let a = consultant("Anna Svensson");
        let b = consultant("Anna Svensson");
        let ea = derive_contact(&a, false).email;
        let eb = derive_contact(&b, false).email;
        assert_ne!(ea, eb);
        assert!(ea.starts_with("anna.svensson."));
        assert!(ea.ends_with("@luna-konsult.se"));
    }

    #[test]
    fn test_slugify_folds_swedish_letters() {
        assert_eq!(slugify("Åsa Öberg-Ström"), "asa.oberg.strom");
        assert_eq!(slugify("  Per  "), "per");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_email_for_unsluggable_name() {
        let id = Uuid::new_v4();
        assert!(synthesized_email("???", id).starts_with("konsult."));
    }

    #[test]
    fn test_phone_is_stable_per_id() {
        let c = consultant("Karl");
        assert_eq!(derive_contact(&c, false).phone, derive_contact(&c, true).phone);
        assert!(derive_contact(&c, false).phone.starts_with("+46 70 "));
    }

    #[test]
    fn test_avatar_url_encodes_name() {
        let url = avatar_url("Åsa Berg");
        assert!(url.starts_with(AVATAR_BASE));
        assert!(!url.contains(' '));
    }

    #[test]
    fn test_view_serializes_row_and_derived_separately() {
        let view = ConsultantView::new(consultant("Eva Lind"), true);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["name"], "Eva Lind");
        assert!(json.get("email").is_none());
        assert_eq!(json["derived"]["status"], "on_assignment");
    }
}
