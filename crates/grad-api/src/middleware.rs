use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::warn;

use grad_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Extract and validate the JWT, check that its user still exists, then
/// expose its claims to the handler.
///
/// The token comes from `Authorization: Bearer`, or from a `token` query
/// parameter for EventSource and WebSocket clients that cannot set headers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .or_else(|| {
            Query::<TokenQuery>::try_from_uri(req.uri())
                .ok()
                .and_then(|Query(q)| q.token)
        })
        .ok_or(ApiError::Unauthorized)?;

    let claims = decode_token(&state.jwt_secret, &token).ok_or(ApiError::Unauthorized)?;

    // Tokens outlive accounts; a signed token for a missing user is no session
    let user_id = claims.sub.to_string();
    if !state.db(move |db| db.user_exists(&user_id)).await? {
        warn!("Token for unknown user {} rejected", claims.sub);
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
