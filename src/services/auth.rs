//! Auth service — registration, login, bearer-token verification.
//!
//! DESIGN
//! ======
//! Passwords are bcrypt-hashed at rest. Bearer tokens are HS256 JWTs whose
//! subject is the user's email and whose expiry is 30 days from issuance.
//! There is no revocation list: a token is valid until it expires or the
//! referenced user disappears.
//!
//! Login and token failures collapse into single generic errors so callers
//! cannot distinguish a missing account from a wrong password.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::models::{User, UserRole};
use crate::services::user;

/// Token lifetime: 30 days.
const TOKEN_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("email already registered")]
    EmailTaken,
    #[error("incorrect credentials")]
    IncorrectCredentials,
    #[error("invalid credentials")]
    InvalidToken,
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Signing and verification keys derived from the token secret.
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthKeys {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// JWT payload. `sub` is the user's email.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub password: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
}

/// Body returned by register and login.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: User,
}

// =============================================================================
// PASSWORDS & TOKENS
// =============================================================================

/// Normalize an email address: trim, lowercase, minimal shape check.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let parts = normalized.split('@').collect::<Vec<_>>();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return None;
    }
    Some(normalized)
}

/// Hash a password for storage.
///
/// # Errors
///
/// Returns an error if bcrypt fails (effectively never for valid input).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// Constant-time-ish verification against a stored hash. A malformed hash
/// counts as a mismatch rather than an error, matching the generic
/// login failure contract.
#[must_use]
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}

/// Issue a signed bearer token for `email`, expiring in 30 days.
///
/// # Errors
///
/// Returns `InvalidToken` if encoding fails.
pub fn issue_token(keys: &AuthKeys, email: &str) -> Result<String, AuthError> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = Claims { sub: email.to_owned(), exp: now + TOKEN_TTL_SECONDS, iat: now };
    jsonwebtoken::encode(&Header::default(), &claims, &keys.encoding).map_err(|_| AuthError::InvalidToken)
}

/// Decode and verify a bearer token, returning the subject email.
///
/// # Errors
///
/// Returns `InvalidToken` on any signature, shape, or expiry failure.
pub fn decode_token(keys: &AuthKeys, token: &str) -> Result<String, AuthError> {
    let data = jsonwebtoken::decode::<Claims>(token, &keys.decoding, &Validation::default())
        .map_err(|_| AuthError::InvalidToken)?;
    Ok(data.claims.sub)
}

// =============================================================================
// OPERATIONS
// =============================================================================

fn registration_error(e: sqlx::Error) -> AuthError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AuthError::EmailTaken,
        _ => AuthError::Db(e),
    }
}

/// Register a new user and return a token plus profile.
///
/// Uniqueness is enforced by the `users.email` constraint, so two racing
/// registrations for the same address cannot both land: the loser's INSERT
/// reports `EmailTaken`.
///
/// # Errors
///
/// `EmailTaken` if the email is already registered, `InvalidEmail` on a
/// malformed address, or a database error.
pub async fn register(pool: &PgPool, keys: &AuthKeys, input: RegisterInput) -> Result<TokenResponse, AuthError> {
    let email = normalize_email(&input.email).ok_or(AuthError::InvalidEmail)?;

    let password_hash = hash_password(&input.password)?;
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, email, name, password_hash, role, phone, avatar)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(&email)
    .bind(&input.name)
    .bind(&password_hash)
    .bind(input.role)
    .bind(&input.phone)
    .bind(&input.avatar)
    .execute(pool)
    .await
    .map_err(registration_error)?;

    info!(user_id = %id, role = input.role.as_str(), "user registered");

    let user = user::fetch_by_id(pool, id)
        .await?
        .ok_or(AuthError::Db(sqlx::Error::RowNotFound))?;
    let access_token = issue_token(keys, &email)?;
    Ok(TokenResponse { access_token, token_type: "bearer", user })
}

/// Verify credentials and return a fresh token plus profile.
///
/// # Errors
///
/// `IncorrectCredentials` whether the email is unknown or the password is
/// wrong — deliberately indistinguishable.
pub async fn login(pool: &PgPool, keys: &AuthKeys, email: &str, password: &str) -> Result<TokenResponse, AuthError> {
    let email = normalize_email(email).ok_or(AuthError::IncorrectCredentials)?;

    let row: Option<(Uuid, String)> = sqlx::query_as("SELECT id, password_hash FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(pool)
        .await?;

    let Some((user_id, password_hash)) = row else {
        return Err(AuthError::IncorrectCredentials);
    };
    if !verify_password(password, &password_hash) {
        return Err(AuthError::IncorrectCredentials);
    }

    let user = user::fetch_by_id(pool, user_id).await?.ok_or(AuthError::IncorrectCredentials)?;
    let access_token = issue_token(keys, &email)?;
    Ok(TokenResponse { access_token, token_type: "bearer", user })
}

/// Resolve a bearer token to its user. Precondition for every protected
/// operation.
///
/// # Errors
///
/// `InvalidToken` on any decode failure or if the user no longer exists.
pub async fn authenticate(pool: &PgPool, keys: &AuthKeys, token: &str) -> Result<User, AuthError> {
    let email = decode_token(keys, token)?;
    user::fetch_by_email(pool, &email).await?.ok_or(AuthError::InvalidToken)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
