//! Email delivery providers used by the send-mail task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

use crate::config::{EmailConfig, EmailProviderKind};
use crate::error::{Error, Result};

/// A message ready for delivery. Recipient lists are already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

/// What the provider answered.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub status_code: u16,
    pub body: String,
}

impl DeliveryReceipt {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Pluggable email transport.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Short provider name reported in task output.
    fn name(&self) -> &str;

    /// Deliver a message. Transport failures are errors; a rejected message
    /// is a receipt with a non-2xx status.
    async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt>;
}

/// SendGrid v3 mail API.
pub struct SendGridProvider {
    client: Client,
    api_key: String,
    from_email: String,
    base_url: String,
}

impl SendGridProvider {
    pub fn new(
        api_key: impl Into<String>,
        from_email: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.into(),
            from_email: from_email.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn payload(&self, message: &EmailMessage) -> Value {
        let addresses =
            |list: &[String]| -> Vec<Value> { list.iter().map(|e| json!({"email": e})).collect() };

        let mut personalization = json!({ "to": addresses(&message.to) });
        if !message.cc.is_empty() {
            personalization["cc"] = json!(addresses(&message.cc));
        }
        if !message.bcc.is_empty() {
            personalization["bcc"] = json!(addresses(&message.bcc));
        }

        json!({
            "personalizations": [personalization],
            "from": { "email": self.from_email },
            "subject": message.subject,
            "content": [{ "type": "text/html", "value": message.body }],
        })
    }
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    fn name(&self) -> &str {
        "sendgrid"
    }

    async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt> {
        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(DeliveryReceipt { status_code, body })
    }
}

/// Writes the message to the log instead of sending it.
pub struct ConsoleProvider;

impl ConsoleProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailProvider for ConsoleProvider {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt> {
        info!(
            to = %message.to.join(", "),
            cc = %message.cc.join(", "),
            bcc = %message.bcc.join(", "),
            subject = %message.subject,
            "Email (console provider):\n{}",
            message.body
        );
        Ok(DeliveryReceipt {
            status_code: 200,
            body: "Rendered to console".to_string(),
        })
    }
}

/// Select the provider once at startup.
pub fn build_email_provider(config: &EmailConfig) -> Result<Arc<dyn EmailProvider>> {
    match config.provider {
        EmailProviderKind::Console => Ok(Arc::new(ConsoleProvider::new())),
        EmailProviderKind::SendGrid => {
            let api_key = config
                .sendgrid_api_key
                .as_deref()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    Error::Config(
                        "email provider 'sendgrid' requires SENDGRID_API_KEY".to_string(),
                    )
                })?;
            Ok(Arc::new(SendGridProvider::new(
                api_key,
                &config.from_email,
                &config.sendgrid_base_url,
            )))
        }
    }
}
