//! Mock authentication. Any non-empty credentials are accepted and every
//! caller receives the same demo profile.

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use shared::{
    domain::UserId,
    error::{ApiError, ErrorCode},
    protocol::{AuthResponse, AuthStatus, Credentials, LogoutResponse, UserProfile},
};
use tracing::info;

use crate::ApiContext;

const TOKEN_ISSUER: &str = "robbie-mock-auth";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token_secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    sub: String,
    email: String,
    iat: i64,
    exp: i64,
}

pub fn demo_profile() -> UserProfile {
    UserProfile {
        id: UserId("demo-user".to_string()),
        email: "demo@robbie.dev".to_string(),
        name: "Demo Buyer".to_string(),
        company: "Robbie Manufacturing".to_string(),
        role: "procurement_manager".to_string(),
    }
}

pub fn mint_token(
    cfg: &AuthConfig,
    profile: &UserProfile,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        iss: TOKEN_ISSUER.to_string(),
        sub: format!("user:{}", profile.id.0),
        email: profile.email.clone(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.token_secret.as_bytes()),
    )
}

pub fn login(ctx: &ApiContext, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
    ensure_credentials(credentials)?;
    info!(email = %credentials.email, "mock login accepted");
    issue(ctx)
}

pub fn register(ctx: &ApiContext, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
    ensure_credentials(credentials)?;
    info!(email = %credentials.email, "mock registration accepted");
    issue(ctx)
}

/// Any bearer token is accepted; only its presence is checked.
pub fn current_user(bearer_token: Option<&str>) -> Result<UserProfile, ApiError> {
    match bearer_token.map(str::trim) {
        Some(token) if !token.is_empty() => Ok(demo_profile()),
        _ => Err(ApiError::new(
            ErrorCode::Unauthorized,
            "missing bearer token",
        )),
    }
}

pub fn auth_status(bearer_token: Option<&str>) -> AuthStatus {
    match current_user(bearer_token) {
        Ok(user) => AuthStatus {
            authenticated: true,
            user: Some(user),
        },
        Err(_) => AuthStatus {
            authenticated: false,
            user: None,
        },
    }
}

pub fn logout() -> LogoutResponse {
    LogoutResponse { success: true }
}

fn ensure_credentials(credentials: &Credentials) -> Result<(), ApiError> {
    if credentials.email.trim().is_empty() {
        return Err(ApiError::validation("email is required"));
    }
    if credentials.password.is_empty() {
        return Err(ApiError::validation("password is required"));
    }
    Ok(())
}

fn issue(ctx: &ApiContext) -> Result<AuthResponse, ApiError> {
    let user = demo_profile();
    let token = mint_token(&ctx.auth, &user)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("token mint failed: {e}")))?;
    Ok(AuthResponse { token, user })
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
