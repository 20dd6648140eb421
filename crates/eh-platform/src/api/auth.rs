//! Account API
//!
//! Sign-up, email verification, login and password reset.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::common::MessageResponse;
use crate::api::middleware::Authenticated;
use crate::domain::User;
use crate::error::PlatformError;
use crate::service::AccountService;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

/// Profile of the calling user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub is_verified: bool,
    pub is_blocked: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            role: u.role.as_str().to_string(),
            is_verified: u.is_verified,
            is_blocked: u.is_blocked,
            created_at: u.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct AccountsState {
    pub accounts: Arc<AccountService>,
}

/// Create an account and send the verification email
pub async fn register(
    State(state): State<AccountsState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<MessageResponse>, PlatformError> {
    state.accounts.register(&req.username, &req.email, &req.password).await?;
    Ok(Json(MessageResponse::new(
        "Registration successful. Please check your email to verify your account.",
    )))
}

pub async fn login(
    State(state): State<AccountsState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, PlatformError> {
    let token = state.accounts.login(&req.email, &req.password).await?;
    Ok(Json(TokenResponse { token, msg: None }))
}

pub async fn verify_email(
    State(state): State<AccountsState>,
    Path(token): Path<String>,
) -> Result<Json<TokenResponse>, PlatformError> {
    let token = state.accounts.verify_email(&token).await?;
    Ok(Json(TokenResponse {
        token,
        msg: Some("Email verified successfully".to_string()),
    }))
}

pub async fn resend_verification(
    State(state): State<AccountsState>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, PlatformError> {
    state.accounts.resend_verification(&req.email).await?;
    Ok(Json(MessageResponse::new("Verification email sent")))
}

pub async fn forgot_password(
    State(state): State<AccountsState>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, PlatformError> {
    state.accounts.forgot_password(&req.email).await?;
    Ok(Json(MessageResponse::new("Password reset email sent")))
}

pub async fn reset_password(
    State(state): State<AccountsState>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, PlatformError> {
    state.accounts.reset_password(&token, &req.password).await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

pub async fn me(
    State(state): State<AccountsState>,
    auth: Authenticated,
) -> Result<Json<UserResponse>, PlatformError> {
    let user = state.accounts.profile(&auth.0.user_id).await?;
    Ok(Json(user.into()))
}

/// Create accounts router
pub fn accounts_router(state: AccountsState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify-email/:token", get(verify_email))
        .route("/resend-verification", post(resend_verification))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password/:token", post(reset_password))
        .route("/me", get(me))
        .with_state(state)
}
