//! Authentication Middleware
//!
//! Verifies bearer JWTs on protected routes and exposes the caller's user ID
//! through a request extension. Tokens are issued by the platform's identity
//! service; this subsystem only verifies signatures and expiry.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, errors::ErrorKind, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;
use crate::startup::AppState;

/// Claims this service reads from a platform token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User ID as a decimal string
    pub sub: String,
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
}

/// The authenticated caller, available to handlers via `Extension<AuthUser>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
}

fn bearer_token(request: &Request) -> Result<&str, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Expected a bearer token".into()))
}

/// Decode a platform token into the caller's user ID.
pub fn decode_user_id(token: &str, secret: &str) -> Result<i64, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::Unauthorized("Token expired".into()),
        _ => AppError::Unauthorized("Invalid token".into()),
    })?;

    data.claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid token claims".into()))
}

/// Rejects the request unless it carries a valid bearer token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;
    let user_id = decode_user_id(token, &state.settings.jwt.secret)?;

    request.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(sub: &str, exp_offset: i64, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_valid_token() {
        let t = token("42", 3600, "test-secret");
        assert_eq!(decode_user_id(&t, "test-secret").unwrap(), 42);
    }

    #[test]
    fn test_decode_expired_token() {
        let t = token("42", -3600, "test-secret");
        let err = decode_user_id(&t, "test-secret").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(msg) if msg.contains("expired")));
    }

    #[test]
    fn test_decode_wrong_secret() {
        let t = token("42", 3600, "test-secret");
        assert!(decode_user_id(&t, "another-secret").is_err());
    }

    #[test]
    fn test_decode_non_numeric_subject() {
        let t = token("someone", 3600, "test-secret");
        assert!(decode_user_id(&t, "test-secret").is_err());
    }
}
