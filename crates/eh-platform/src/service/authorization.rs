//! Authorization context and capability checks

use std::sync::Arc;

use crate::domain::UserRole;
use crate::error::{PlatformError, Result};
use crate::repository::UserRepository;
use crate::service::auth::AccessTokenClaims;

/// The caller, resolved from the store on every request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub role: UserRole,
    pub username: String,
    pub email: String,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

pub struct AuthorizationService {
    user_repo: Arc<dyn UserRepository>,
}

impl AuthorizationService {
    pub fn new(user_repo: Arc<dyn UserRepository>) -> Self {
        Self { user_repo }
    }

    /// Blocked and unverified accounts are rejected here, before any handler runs
    pub async fn build_context(&self, claims: &AccessTokenClaims) -> Result<AuthContext> {
        let user = self
            .user_repo
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| PlatformError::unauthorized("User no longer exists"))?;

        if user.is_blocked {
            return Err(PlatformError::forbidden("Your account has been blocked"));
        }
        if !user.is_verified {
            return Err(PlatformError::forbidden("Please verify your email first"));
        }

        Ok(AuthContext {
            user_id: user.id,
            role: user.role,
            username: user.username,
            email: user.email,
        })
    }
}

/// Capability predicates evaluated before a workflow entry point
pub mod checks {
    use super::*;

    pub fn require_admin(ctx: &AuthContext) -> Result<()> {
        if !ctx.is_admin() {
            return Err(PlatformError::forbidden("Admin access required"));
        }
        Ok(())
    }

    pub fn require_owner_or_admin(ctx: &AuthContext, owner_id: &str) -> Result<()> {
        if ctx.user_id != owner_id && !ctx.is_admin() {
            return Err(PlatformError::forbidden("Not authorized to modify this resource"));
        }
        Ok(())
    }
}
