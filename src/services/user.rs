//! User service — profile reads and mutations.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{GeoPoint, User, UserRole};

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("user not found: {0}")]
    NotFound(Uuid),
    #[error("operation not allowed for role")]
    Forbidden,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Partial profile update. Absent fields are left untouched.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub categories: Option<Vec<String>>,
    pub is_online: Option<bool>,
}

const USER_COLUMNS: &str =
    "id, email, name, role, phone, avatar, categories, rating, is_online, latitude, longitude, created_at, updated_at";

pub(crate) fn map_user(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        role: row.get("role"),
        phone: row.get("phone"),
        avatar: row.get("avatar"),
        categories: row.get("categories"),
        rating: row.get("rating"),
        is_online: row.get("is_online"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Fetch a user by id.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn fetch_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(map_user))
}

/// Fetch a user by (normalized) email.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn fetch_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(map_user))
}

/// Apply a partial profile update and return the fresh record.
///
/// # Errors
///
/// `NotFound` if the user vanished, or a database error.
pub async fn update_profile(pool: &PgPool, user_id: Uuid, update: ProfileUpdate) -> Result<User, UserError> {
    sqlx::query(
        "UPDATE users SET
             name = COALESCE($2, name),
             phone = COALESCE($3, phone),
             avatar = COALESCE($4, avatar),
             categories = COALESCE($5, categories),
             is_online = COALESCE($6, is_online),
             updated_at = now()
         WHERE id = $1",
    )
    .bind(user_id)
    .bind(&update.name)
    .bind(&update.phone)
    .bind(&update.avatar)
    .bind(&update.categories)
    .bind(update.is_online)
    .execute(pool)
    .await?;

    fetch_by_id(pool, user_id).await?.ok_or(UserError::NotFound(user_id))
}

/// Persist a user's last reported location.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn update_location(pool: &PgPool, user_id: Uuid, location: GeoPoint) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET latitude = $2, longitude = $3, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(location.latitude)
        .bind(location.longitude)
        .execute(pool)
        .await?;
    Ok(())
}

/// Flip a user's role between client and provider.
///
/// Unconditional: in-flight requests/offers under the old role are left
/// as they are. The switch is logged so operators can audit it.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn switch_role(pool: &PgPool, user: &User) -> Result<UserRole, UserError> {
    let new_role = user.role.flipped();
    sqlx::query("UPDATE users SET role = $2, updated_at = now() WHERE id = $1")
        .bind(user.id)
        .bind(new_role)
        .execute(pool)
        .await?;

    info!(user_id = %user.id, from = user.role.as_str(), to = new_role.as_str(), "role switched");
    Ok(new_role)
}

/// Toggle a provider's online flag and return the new value.
///
/// # Errors
///
/// `Forbidden` for non-providers, or a database error.
pub async fn toggle_provider_status(pool: &PgPool, user: &User) -> Result<bool, UserError> {
    if user.role != UserRole::Provider {
        return Err(UserError::Forbidden);
    }

    let is_online: bool =
        sqlx::query_scalar("UPDATE users SET is_online = NOT is_online, updated_at = now() WHERE id = $1 RETURNING is_online")
            .bind(user.id)
            .fetch_one(pool)
            .await?;

    Ok(is_online)
}

/// Persist a provider's online flag as reported over the duplex channel.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn set_online(pool: &PgPool, user_id: Uuid, is_online: bool) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET is_online = $2, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(is_online)
        .execute(pool)
        .await?;
    Ok(())
}
