//! User Entity

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::optional_bson_datetime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,

    pub username: String,

    /// Always stored lowercased
    pub email: String,

    pub password_hash: String,

    #[serde(default)]
    pub role: UserRole,

    #[serde(default)]
    pub is_verified: bool,

    #[serde(default)]
    pub is_blocked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,

    /// SHA-256 hex digest of the raw reset token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_password_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_bson_datetime")]
    pub reset_password_expire: Option<DateTime<Utc>>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>, email: &str, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: crate::TsidGenerator::generate(),
            username: username.into(),
            email: normalize_email(email),
            password_hash: password_hash.into(),
            role: UserRole::User,
            is_verified: false,
            is_blocked: false,
            verification_token: None,
            reset_password_token: None,
            reset_password_expire: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_verification_token(mut self, token: impl Into<String>) -> Self {
        self.verification_token = Some(token.into());
        self
    }

    pub fn verified(mut self) -> Self {
        self.is_verified = true;
        self.verification_token = None;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn mark_verified(&mut self) {
        self.is_verified = true;
        self.verification_token = None;
        self.updated_at = Utc::now();
    }

    pub fn set_reset_token(&mut self, token_hash: String, expires_at: DateTime<Utc>) {
        self.reset_password_token = Some(token_hash);
        self.reset_password_expire = Some(expires_at);
        self.updated_at = Utc::now();
    }

    pub fn set_password(&mut self, password_hash: String) {
        self.password_hash = password_hash;
        self.reset_password_token = None;
        self.reset_password_expire = None;
        self.updated_at = Utc::now();
    }

    /// Flip the blocked flag, returning the new value
    pub fn toggle_blocked(&mut self) -> bool {
        self.is_blocked = !self.is_blocked;
        self.updated_at = Utc::now();
        self.is_blocked
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
