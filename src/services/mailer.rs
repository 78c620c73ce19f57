//! Outbound email delivery through an HTTP mail relay

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Error)]
pub enum MailError {
    #[error("Mail relay is not configured")]
    NotConfigured,

    #[error("Mail request failed: {message}")]
    Request { message: String },

    #[error("Mail relay rejected the message: {message}")]
    Rejected { message: String },
}

impl From<MailError> for crate::error::AppError {
    fn from(err: MailError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError};

        AppError::new(AppErrorKind::External(ExternalError::Mail {
            message: err.to_string(),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Relay endpoint accepting a JSON message envelope.
    pub api_url: String,
    /// Empty means mail is not configured; sends fail fast without a network
    /// call and callers treat delivery as best-effort.
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
    pub timeout_secs: u64,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.mailrelay.local/v1/send".to_string(),
            api_key: String::new(),
            from_email: "noreply@yip.org.my".to_string(),
            from_name: "Yayasan Ihsan Prihatin".to_string(),
            timeout_secs: 15,
        }
    }
}

impl MailerConfig {
    /// Missing credentials are tolerated; the server boots with mail disabled
    /// and reports `is_configured() == false`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("MAIL_API_URL").unwrap_or(defaults.api_url),
            api_key: std::env::var("MAIL_API_KEY").unwrap_or_default(),
            from_email: std::env::var("MAIL_FROM_EMAIL").unwrap_or(defaults.from_email),
            from_name: std::env::var("MAIL_FROM_NAME").unwrap_or(defaults.from_name),
            timeout_secs: std::env::var("MAIL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError>;
}

pub struct HttpMailer {
    config: MailerConfig,
    http: reqwest::Client,
}

impl HttpMailer {
    pub fn new(config: MailerConfig) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MailError::Request {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> Result<Self, MailError> {
        Self::new(MailerConfig::from_env())
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    fn is_configured(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        if !self.is_configured() {
            return Err(MailError::NotConfigured);
        }

        let payload = json!({
            "from": {
                "email": self.config.from_email,
                "name": self.config.from_name,
            },
            "to": [{
                "email": email.to,
                "name": email.to_name,
            }],
            "subject": email.subject,
            "html": email.html_body,
        });

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailError::Request {
                message: format!("mail relay request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                message: format!(
                    "HTTP {}: {}",
                    status,
                    crate::gateway::types::truncate_chars(&text, 200)
                ),
            });
        }

        info!(to = %email.to, subject = %email.subject, "email dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_flag_follows_api_key() {
        let mailer = HttpMailer::new(MailerConfig::default()).expect("mailer init should succeed");
        assert!(!mailer.is_configured());

        let mailer = HttpMailer::new(MailerConfig {
            api_key: "mk_test".to_string(),
            ..MailerConfig::default()
        })
        .expect("mailer init should succeed");
        assert!(mailer.is_configured());
    }

    #[tokio::test]
    async fn unconfigured_mailer_fails_before_any_network_call() {
        let mailer = HttpMailer::new(MailerConfig::default()).expect("mailer init should succeed");
        let result = mailer
            .send(&OutboundEmail {
                to: "donor@example.com".to_string(),
                to_name: None,
                subject: "Receipt".to_string(),
                html_body: "<p>Thank you</p>".to_string(),
            })
            .await;
        assert!(matches!(result, Err(MailError::NotConfigured)));
    }
}
