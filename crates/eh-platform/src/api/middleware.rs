//! API Middleware
//!
//! Authentication extractors for Axum. The credential is read from
//! `Authorization: Bearer <jwt>` or, failing that, `x-auth-token`.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};

use crate::error::PlatformError;
use crate::service::{checks, AuthContext, AuthService, AuthorizationService};

const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub authz_service: Arc<AuthorizationService>,
}

fn token_from_parts(parts: &Parts) -> Option<String> {
    if let Some(header) = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        return crate::service::extract_bearer_token(header).map(str::to_string);
    }
    parts
        .headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

async fn resolve_context(parts: &Parts) -> Result<AuthContext, PlatformError> {
    let token = token_from_parts(parts)
        .ok_or_else(|| PlatformError::unauthorized("No token, authorization denied"))?;

    let app_state = parts
        .extensions
        .get::<AppState>()
        .ok_or_else(|| PlatformError::internal("AppState not found"))?;

    let claims = app_state.auth_service.validate_token(&token)?;
    app_state.authz_service.build_context(&claims).await
}

/// Extractor for authenticated requests
pub struct Authenticated(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        resolve_context(parts)
            .await
            .map(Authenticated)
            .map_err(IntoResponse::into_response)
    }
}

/// Extractor for admin-only requests
pub struct AdminOnly(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminOnly
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = resolve_context(parts).await.map_err(IntoResponse::into_response)?;
        checks::require_admin(&ctx).map_err(IntoResponse::into_response)?;
        Ok(AdminOnly(ctx))
    }
}

/// Extractor for optionally authenticated requests
pub struct OptionalAuth(pub Option<AuthContext>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if token_from_parts(parts).is_none() {
            return Ok(OptionalAuth(None));
        }
        Ok(OptionalAuth(resolve_context(parts).await.ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_token_sources() {
        assert_eq!(
            token_from_parts(&parts_with(&[("authorization", "Bearer abc")])).as_deref(),
            Some("abc")
        );
        assert_eq!(
            token_from_parts(&parts_with(&[("x-auth-token", "xyz")])).as_deref(),
            Some("xyz")
        );
        assert_eq!(token_from_parts(&parts_with(&[])), None);
        assert_eq!(
            token_from_parts(&parts_with(&[("authorization", "Basic abc")])),
            None
        );
    }
}
