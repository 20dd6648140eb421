//! Outgoing email
//!
//! Mail is always sent from background tasks; callers log failures and
//! never propagate them into the request that triggered the mail.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::error::{PlatformError, Result};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}

/// SMTP settings for [`SmtpMailer`]
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    /// Implicit TLS on connect
    pub secure: bool,
    pub username: String,
    pub password: String,
    pub from: String,
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| PlatformError::Mail { message: format!("Invalid sender address: {}", e) })?;

        let has_credentials = !settings.username.is_empty();
        let builder = if settings.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .map_err(|e| PlatformError::Mail { message: format!("SMTP relay error: {}", e) })?
        } else if has_credentials {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| PlatformError::Mail { message: format!("SMTP relay error: {}", e) })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        };

        let builder = builder.port(settings.port);
        let builder = if has_credentials {
            builder.credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
        } else {
            builder
        };

        info!(host = %settings.host, port = settings.port, "SMTP mailer configured");
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| PlatformError::Mail { message: format!("Invalid recipient {}: {}", to, e) })?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| PlatformError::Mail { message: format!("Failed to build email: {}", e) })?;

        self.transport
            .send(email)
            .await
            .map_err(|e| PlatformError::Mail { message: format!("SMTP send failed: {}", e) })?;

        debug!(subject, "Email sent");
        Ok(())
    }
}

/// Logs instead of sending; used when email delivery is disabled
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<()> {
        info!(to, subject, "Email delivery disabled, message not sent");
        Ok(())
    }
}

/// Rendered email bodies
pub mod templates {
    fn layout(heading: &str, body: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{heading}</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #2563eb;">{heading}</h2>
    {body}
    <p style="color: #666; font-size: 12px; margin-top: 40px;">EventHub</p>
  </div>
</body>
</html>"#
        )
    }

    /// Escape text for inclusion in HTML element content or attribute values
    pub fn escape_html(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#39;"),
                _ => out.push(c),
            }
        }
        out
    }

    fn button(href: &str, label: &str) -> String {
        let href = escape_html(href);
        format!(
            r#"<p style="margin: 30px 0;"><a href="{href}" style="display: inline-block; background-color: #2563eb; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px;">{label}</a></p>
    <p style="color: #666; font-size: 12px;">Or copy this link into your browser:<br>{href}</p>"#
        )
    }

    pub fn verification(username: &str, link: &str) -> (String, String) {
        let username = escape_html(username);
        let body = format!(
            "<p>Hi {username},</p><p>Thanks for signing up. Please confirm your email address to activate your account.</p>{}",
            button(link, "Verify Email")
        );
        ("Verify your EventHub account".to_string(), layout("Welcome to EventHub", &body))
    }

    pub fn password_reset(link: &str, ttl_minutes: i64) -> (String, String) {
        let body = format!(
            "<p>We received a request to reset your password. This link expires in {ttl_minutes} minutes.</p>{}<p>If you did not request this, you can ignore this email.</p>",
            button(link, "Reset Password")
        );
        ("Password reset request".to_string(), layout("Reset your password", &body))
    }

    pub fn password_changed(username: &str) -> (String, String) {
        let username = escape_html(username);
        let body = format!(
            "<p>Hi {username},</p><p>Your password was changed. If this was not you, contact support immediately.</p>"
        );
        ("Your password was changed".to_string(), layout("Password changed", &body))
    }

    pub fn registration_confirmation(username: &str, event_title: &str, event_date: &str, location: &str) -> (String, String) {
        let body = format!(
            "<p>Hi {},</p><p>You are registered for <strong>{}</strong>.</p><p>When: {}<br>Where: {}</p>",
            escape_html(username),
            escape_html(event_title),
            escape_html(event_date),
            escape_html(location),
        );
        (
            format!("Registration confirmed: {}", event_title),
            layout("You're in!", &body),
        )
    }

    pub fn creator_registration_summary(
        creator_name: &str,
        attendee_name: &str,
        event_title: &str,
        attendees: usize,
        capacity: u32,
    ) -> (String, String) {
        let body = format!(
            "<p>Hi {},</p><p><strong>{}</strong> registered for <strong>{}</strong>.</p><p>Attendance: {attendees} / {capacity}</p>",
            escape_html(creator_name),
            escape_html(attendee_name),
            escape_html(event_title),
        );
        (
            format!("New registration for {}", event_title),
            layout("New attendee", &body),
        )
    }

}
