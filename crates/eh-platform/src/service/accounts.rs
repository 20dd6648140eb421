//! Account lifecycle: sign-up, email verification, login and password reset

use std::sync::Arc;

use chrono::{Duration, Utc};
use regex::Regex;
use tracing::{info, warn};

use crate::domain::{User, UserRole};
use crate::error::{PlatformError, Result};
use crate::repository::UserRepository;
use crate::service::auth::AuthService;
use crate::service::mailer::{templates, Mailer};
use crate::service::password::{digest_token, generate_token, PasswordService, MIN_PASSWORD_LENGTH};
use crate::service::tasks::BackgroundTasks;

pub const MIN_USERNAME_LENGTH: usize = 3;
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

#[derive(Debug, Clone)]
pub struct AccountSettings {
    /// Front-end base URL used in email links
    pub client_url: String,
    pub reset_token_ttl_secs: i64,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            client_url: "http://localhost:3000".to_string(),
            reset_token_ttl_secs: 600,
        }
    }
}

pub struct AccountService {
    user_repo: Arc<dyn UserRepository>,
    auth: Arc<AuthService>,
    passwords: Arc<PasswordService>,
    mailer: Arc<dyn Mailer>,
    tasks: BackgroundTasks,
    settings: AccountSettings,
    email_regex: Regex,
}

impl AccountService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        auth: Arc<AuthService>,
        passwords: Arc<PasswordService>,
        mailer: Arc<dyn Mailer>,
        tasks: BackgroundTasks,
        settings: AccountSettings,
    ) -> Result<Self> {
        let email_regex = Regex::new(EMAIL_PATTERN)
            .map_err(|e| PlatformError::internal(format!("Invalid email pattern: {}", e)))?;
        Ok(Self {
            user_repo,
            auth,
            passwords,
            mailer,
            tasks,
            settings,
            email_regex,
        })
    }

    fn link(&self, path: &str, token: &str) -> String {
        format!("{}/{}/{}", self.settings.client_url.trim_end_matches('/'), path, token)
    }

    fn send_in_background(&self, name: &'static str, to: String, (subject, body): (String, String)) {
        let mailer = self.mailer.clone();
        self.tasks.submit(name, async move { mailer.send(&to, &subject, &body).await });
    }

    fn validate_sign_up(&self, username: &str, email: &str, password: &str) -> Result<()> {
        let mut errors = Vec::new();
        if username.trim().chars().count() < MIN_USERNAME_LENGTH {
            errors.push(format!("Username must be at least {} characters", MIN_USERNAME_LENGTH));
        }
        if !self.email_regex.is_match(email.trim()) {
            errors.push("Please provide a valid email".to_string());
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.push(format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PlatformError::InvalidFields { errors })
        }
    }

    /// New accounts are plain users and start unverified
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        self.validate_sign_up(username, email, password)?;

        let token = generate_token();
        let user = User::new(username.trim(), email, self.passwords.hash(password)?)
            .with_verification_token(&token);
        self.user_repo.insert(&user).await?;
        info!(user_id = %user.id, "User registered");

        self.send_in_background(
            "account.verification_email",
            user.email.clone(),
            templates::verification(&user.username, &self.link("verify-email", &token)),
        );
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let user = self
            .user_repo
            .find_by_email(email)
            .await?
            .ok_or(PlatformError::InvalidCredentials)?;

        if !self.passwords.verify(password, &user.password_hash) {
            return Err(PlatformError::InvalidCredentials);
        }
        if !user.is_verified {
            return Err(PlatformError::forbidden("Please verify your email before logging in"));
        }
        if user.is_blocked {
            return Err(PlatformError::forbidden("Your account has been blocked"));
        }

        info!(user_id = %user.id, "User logged in");
        self.auth.issue_token(&user)
    }

    /// Returns an access token for the now-verified user
    pub async fn verify_email(&self, token: &str) -> Result<String> {
        let mut user = self
            .user_repo
            .find_by_verification_token(token)
            .await?
            .ok_or_else(|| PlatformError::validation("Invalid or expired verification token"))?;

        user.mark_verified();
        self.user_repo.update(&user).await?;
        info!(user_id = %user.id, "Email verified");

        self.auth.issue_token(&user)
    }

    pub async fn resend_verification(&self, email: &str) -> Result<()> {
        let mut user = self
            .user_repo
            .find_by_email(email)
            .await?
            .ok_or_else(|| PlatformError::not_found("User", email))?;
        if user.is_verified {
            return Err(PlatformError::validation("Email is already verified"));
        }

        let token = generate_token();
        user.verification_token = Some(token.clone());
        user.updated_at = Utc::now();
        self.user_repo.update(&user).await?;

        self.send_in_background(
            "account.verification_email",
            user.email.clone(),
            templates::verification(&user.username, &self.link("verify-email", &token)),
        );
        Ok(())
    }

    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let mut user = self
            .user_repo
            .find_by_email(email)
            .await?
            .ok_or_else(|| PlatformError::not_found("User", email))?;

        let raw = generate_token();
        let ttl = Duration::seconds(self.settings.reset_token_ttl_secs);
        user.set_reset_token(digest_token(&raw), Utc::now() + ttl);
        self.user_repo.update(&user).await?;
        info!(user_id = %user.id, "Password reset requested");

        self.send_in_background(
            "account.reset_email",
            user.email.clone(),
            templates::password_reset(&self.link("reset-password", &raw), ttl.num_minutes()),
        );
        Ok(())
    }

    pub async fn reset_password(&self, raw_token: &str, new_password: &str) -> Result<()> {
        self.passwords.validate_policy(new_password)?;

        let mut user = self
            .user_repo
            .find_by_reset_token(&digest_token(raw_token), Utc::now())
            .await?
            .ok_or_else(|| PlatformError::validation("Invalid or expired reset token"))?;

        user.set_password(self.passwords.hash(new_password)?);
        self.user_repo.update(&user).await?;
        info!(user_id = %user.id, "Password reset");

        self.send_in_background(
            "account.password_changed_email",
            user.email.clone(),
            templates::password_changed(&user.username),
        );
        Ok(())
    }

    pub async fn profile(&self, user_id: &str) -> Result<User> {
        self.user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("User", user_id))
    }

    /// Create a verified admin unless the email is already taken
    pub async fn seed_admin(&self, email: &str, username: &str, password: &str) -> Result<bool> {
        if let Some(existing) = self.user_repo.find_by_email(email).await? {
            if !existing.is_admin() {
                warn!(email, "Admin seed skipped: email belongs to a non-admin account");
            }
            return Ok(false);
        }

        let admin = User::new(username, email, self.passwords.hash(password)?)
            .with_role(UserRole::Admin)
            .verified();
        self.user_repo.insert(&admin).await?;
        info!(user_id = %admin.id, "Admin account seeded");
        Ok(true)
    }
}
