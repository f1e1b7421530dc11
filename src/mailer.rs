//! OTP email delivery via the Resend HTTP API.
//!
//! Without `RESEND_API_KEY` the service uses [`Mailer::Outbox`], which keeps
//! messages in memory instead of sending them.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::MailConfig;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

pub const OTP_SUBJECT: &str = "Your Portfolio Admin Login Code";

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mail provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

/// Messages captured instead of sent.
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl Outbox {
    pub async fn messages(&self) -> Vec<OutgoingMail> {
        self.sent.lock().await.clone()
    }
}

#[derive(Debug, Clone)]
pub enum Mailer {
    Resend { api_key: String, from: String },
    Outbox { from: String, outbox: Arc<Outbox> },
}

impl Mailer {
    pub fn from_config(config: &MailConfig) -> Self {
        match &config.resend_api_key {
            Some(api_key) => Mailer::Resend {
                api_key: api_key.clone(),
                from: config.from.clone(),
            },
            None => Mailer::outbox(&config.from),
        }
    }

    pub fn outbox(from: &str) -> Self {
        Mailer::Outbox {
            from: from.to_string(),
            outbox: Arc::new(Outbox::default()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Mailer::Resend { .. } => "resend",
            Mailer::Outbox { .. } => "outbox",
        }
    }

    fn from_address(&self) -> &str {
        match self {
            Mailer::Resend { from, .. } | Mailer::Outbox { from, .. } => from,
        }
    }

    pub async fn send_otp(&self, to: &str, code: &str) -> Result<(), MailError> {
        let mail = OutgoingMail {
            from: self.from_address().to_string(),
            to: vec![to.to_string()],
            subject: OTP_SUBJECT.to_string(),
            html: otp_email_html(code),
        };
        self.send(mail).await
    }

    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        match self {
            Mailer::Resend { api_key, .. } => {
                let response = HTTP_CLIENT
                    .post(RESEND_ENDPOINT)
                    .bearer_auth(api_key)
                    .json(&mail)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(MailError::Rejected {
                        status: status.as_u16(),
                        body,
                    });
                }
                tracing::info!(subject = %mail.subject, "email sent via resend");
            }
            Mailer::Outbox { outbox, .. } => {
                tracing::info!(subject = %mail.subject, "email captured in outbox");
                outbox.sent.lock().await.push(mail);
            }
        }
        Ok(())
    }
}

fn otp_email_html(code: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #333;">Portfolio Admin Access</h1>
  <p>Your one-time password is:</p>
  <div style="background: #f0f7ff; padding: 20px; text-align: center; border-radius: 8px; margin: 20px 0;">
    <h2 style="font-size: 32px; letter-spacing: 5px; margin: 0; color: #1e40af;">{}</h2>
  </div>
  <p>This code will expire in 5 minutes.</p>
  <p style="color: #666; font-size: 14px;">If you didn't request this code, please ignore this email.</p>
</div>"#,
        code
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outbox_captures_otp_mail() {
        let mailer = Mailer::outbox("Admin <noreply@example.com>");
        mailer.send_otp("admin@example.com", "004213").await.unwrap();

        let Mailer::Outbox { outbox, .. } = &mailer else {
            panic!("expected outbox mailer");
        };
        let messages = outbox.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to, vec!["admin@example.com".to_string()]);
        assert_eq!(messages[0].subject, OTP_SUBJECT);
        assert!(messages[0].html.contains("004213"));
    }

    #[test]
    fn test_from_config_selects_backend() {
        let mut config = MailConfig {
            resend_api_key: None,
            from: "a@b.c".to_string(),
        };
        assert_eq!(Mailer::from_config(&config).kind(), "outbox");
        config.resend_api_key = Some("re_123".to_string());
        assert_eq!(Mailer::from_config(&config).kind(), "resend");
    }
}
