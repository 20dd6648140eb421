//! Access token issuing and validation (HS256)

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::{User, UserRole};
use crate::error::{PlatformError, Result};

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub issuer: String,
    pub access_token_expiry_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User id
    pub sub: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

pub struct AuthService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret_key.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret_key.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn issue_token(&self, user: &User) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            sub: user.id.clone(),
            role: user.role,
            iat: now,
            exp: now + self.config.access_token_expiry_secs,
            iss: self.config.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| PlatformError::internal(format!("Failed to sign token: {}", e)))
    }

    pub fn validate_token(&self, token: &str) -> Result<AccessTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);

        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => PlatformError::TokenExpired,
                _ => PlatformError::InvalidToken { message: e.to_string() },
            })
    }
}

/// Token from an `Authorization: Bearer <token>` value
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(expiry: i64) -> AuthService {
        AuthService::new(AuthConfig {
            secret_key: "test-secret".to_string(),
            issuer: "eventhub".to_string(),
            access_token_expiry_secs: expiry,
        })
    }

    #[test]
    fn test_issue_and_validate() {
        let auth = service(3600);
        let user = User::new("alice", "alice@example.com", "h").with_role(UserRole::Admin);
        let token = auth.issue_token(&user).unwrap();

        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.iss, "eventhub");
    }

    #[test]
    fn test_expired_token() {
        let auth = service(-3600);
        let user = User::new("bob", "bob@example.com", "h");
        let token = auth.issue_token(&user).unwrap();
        assert!(matches!(auth.validate_token(&token), Err(PlatformError::TokenExpired)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let user = User::new("carol", "carol@example.com", "h");
        let token = service(3600).issue_token(&user).unwrap();

        let other = AuthService::new(AuthConfig {
            secret_key: "other".to_string(),
            issuer: "eventhub".to_string(),
            access_token_expiry_secs: 3600,
        });
        assert!(matches!(other.validate_token(&token), Err(PlatformError::InvalidToken { .. })));
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("bearer xyz"), Some("xyz"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("token"), None);
    }
}
