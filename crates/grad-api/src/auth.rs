use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::{error, info};
use uuid::Uuid;

use grad_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, RegisteredUser,
    SessionResponse, SessionUser,
};

use crate::convert::{non_empty, parse_uuid};
use crate::error::ApiError;
use crate::state::AppState;

/// Sessions last 30 days.
const TOKEN_TTL_DAYS: i64 = 30;

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();

    // Check if email is taken
    let lookup = email.clone();
    if state.db(move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(duplicate_email());
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let (id, n, e) = (user_id.to_string(), name.clone(), email.clone());
    state
        .db(move |db| db.create_user(&id, &n, &e, &password_hash))
        .await
        .map_err(|err| match err {
            // Lost a race with a concurrent registration
            ApiError::Conflict(_) => duplicate_email(),
            other => other,
        })?;

    info!("Registered user {} ({})", user_id, email);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".into(),
            user: RegisteredUser {
                id: user_id,
                name,
                email,
            },
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    let user = state
        .db(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
        error!("Stored password hash for {} is unreadable: {}", user.id, e);
        ApiError::Internal(anyhow::anyhow!("corrupt password hash"))
    })?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id = parse_uuid(&user.id, "user id");
    let (token, _) = create_token(&state.jwt_secret, user_id, &user.name, &user.email)?;

    info!("User {} signed in", user_id);

    Ok(Json(LoginResponse {
        message: "Signed in successfully".into(),
        token,
        user: SessionUser {
            id: user_id,
            name: user.name,
            email: user.email,
            image: non_empty(user.image),
        },
    }))
}

pub async fn session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub.to_string();
    let user = state
        .db(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let expires = DateTime::<Utc>::from_timestamp(claims.exp as i64, 0).unwrap_or_default();

    Ok(Json(SessionResponse {
        user: SessionUser {
            id: claims.sub,
            name: user.name,
            email: user.email,
            image: non_empty(user.image),
        },
        expires,
    }))
}

/// Issue a session token. Returns the token and its expiry.
pub fn create_token(
    secret: &str,
    user_id: Uuid,
    name: &str,
    email: &str,
) -> Result<(String, DateTime<Utc>), ApiError> {
    let expires = Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS);
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        email: email.to_string(),
        exp: expires.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))?;

    Ok((token, expires))
}

fn duplicate_email() -> ApiError {
    ApiError::Conflict("User with this email already exists".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_token;

    #[test]
    fn test_token_round_trip() {
        let user_id = Uuid::new_v4();
        let (token, expires) = create_token("secret", user_id, "Ada", "ada@example.com").unwrap();
        assert!(expires > Utc::now());

        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.name, "Ada");
        assert!(decode_token("other-secret", &token).is_none());
        assert!(decode_token("secret", "not-a-token").is_none());
    }
}
