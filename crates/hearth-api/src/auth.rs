use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::info;
use uuid::Uuid;

use hearth_db::Database;
use hearth_ledger::SplitPolicy;
use hearth_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::error::ApiError;
use crate::extract::Json;
use crate::storage::Storage;
use crate::with_db;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub storage: Storage,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub split_policy: SplitPolicy,
    /// How many fresh invite codes to try before giving up on a new house.
    pub invite_attempts: u32,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    let username = validate_username(&req.username)?;
    if req.password.len() < 8 {
        return Err(ApiError::validation("Password must be at least 8 characters"));
    }

    let password_hash = hash_password(&req.password)?;

    let user_id = Uuid::new_v4();
    let (uid, em, un) = (user_id.to_string(), email.clone(), username.clone());
    let created = with_db(&state, move |db| db.create_user(&uid, &em, &password_hash, &un)).await?;
    if !created {
        return Err(ApiError::Conflict("An account with this email already exists".into()));
    }

    info!("Registered user {} ({})", user_id, email);
    let token = create_token(&state, user_id, &email)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id,
            username,
            token,
        }),
    ))
}

/// Hash a password with Argon2id and a fresh random salt.
fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid email or password".into());

    let email = req.email.trim().to_lowercase();
    let lookup = email.clone();
    let user = with_db(&state, move |db| db.get_user_by_email(&lookup))
        .await?
        .ok_or_else(invalid)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("corrupt password hash for {}: {}", user.id, e))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    let user_id: Uuid = crate::convert::parse_uuid("user id", &user.id)?;
    let uid = user.id.clone();
    let profile = with_db(&state, move |db| db.get_profile(&uid))
        .await?
        .ok_or_else(|| anyhow::anyhow!("user {} has no profile", user_id))?;

    let token = create_token(&state, user_id, &email)?;

    Ok(Json(AuthResponse {
        user_id,
        username: profile.username,
        token,
    }))
}

pub(crate) fn create_token(state: &AppStateInner, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(state.token_ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}

fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(ApiError::validation("Please enter a valid email address"));
    }
    Ok(email)
}

pub(crate) fn validate_username(raw: &str) -> Result<String, ApiError> {
    let username = raw.trim();
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ApiError::validation("Username must be between 3 and 32 characters"));
    }
    Ok(username.to_string())
}
