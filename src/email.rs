use axum::async_trait;
use lettre::{
    message::header::ContentType, message::Mailbox,
    transport::smtp::authentication::Credentials, Message, SmtpTransport, Transport,
};
use std::time::Duration;
use tracing::{error, info};

use crate::config::SmtpConfig;

/// Outbound notification gateway. The auth workflows only build the reset
/// link; delivery is behind this seam so it can be swapped out in tests and
/// in environments without SMTP access.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to: &str, name: &str, link: &str) -> anyhow::Result<()>;
}

/// Reset link the client app turns into its change-password screen.
pub fn reset_link(client_url: &str, token: &str, user_id: i64) -> String {
    format!(
        "{}/change-password?token={}&id={}",
        client_url.trim_end_matches('/'),
        token,
        user_id
    )
}

#[derive(Clone)]
pub struct SmtpMailer {
    mailer: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();
        let from = config
            .from
            .parse()
            .map_err(|e: lettre::address::AddressError| anyhow::anyhow!(e.to_string()))?;
        info!(host = %config.host, "smtp mailer initialized");
        Ok(Self { mailer, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_password_reset(&self, to: &str, name: &str, link: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse()
                .map_err(|e: lettre::address::AddressError| anyhow::anyhow!(e.to_string()))?)
            .subject("Password Reset Request")
            .header(ContentType::TEXT_PLAIN)
            .body(format!(
                "Hi {name},\n\n\
                 Use the link below to set a new password:\n{link}\n\n\
                 If you did not request this, you can ignore this message.\n"
            ))?;

        // SmtpTransport is blocking; keep it off the request-handling runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email)).await?;
        match result {
            Ok(_) => {
                info!(to = %to, "password reset email sent");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, to = %to, "failed to send password reset email");
                Err(anyhow::anyhow!(e.to_string()))
            }
        }
    }
}

/// Logs the reset link instead of delivering it. Used when no SMTP settings
/// are configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, to: &str, _name: &str, link: &str) -> anyhow::Result<()> {
        info!(to = %to, link = %link, "email delivery disabled; reset link logged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_link_embeds_token_and_user_id() {
        let link = reset_link("https://app.example.com", "abc123", 42);
        assert_eq!(link, "https://app.example.com/change-password?token=abc123&id=42");
    }

    #[test]
    fn reset_link_tolerates_trailing_slash() {
        let link = reset_link("https://app.example.com/", "abc123", 42);
        assert_eq!(link, "https://app.example.com/change-password?token=abc123&id=42");
    }
}
