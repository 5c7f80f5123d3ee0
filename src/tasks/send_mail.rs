//! Send-mail task - deliver an email through the configured provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::email_provider::{EmailMessage, EmailProvider};
use super::types::{parse_input, TaskHandler, TaskKind};
use crate::dsl::{ResultStatus, TaskResult};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Recipients {
    Single(String),
    Multiple(Vec<String>),
}

impl Recipients {
    /// Blank addresses are dropped.
    fn into_vec(self) -> Vec<String> {
        let all = match self {
            Recipients::Single(s) => vec![s],
            Recipients::Multiple(v) => v,
        };
        all.into_iter()
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawSendMailInput {
    task_ref_name: String,
    to: Recipients,
    subject: String,
    body: String,
    #[serde(default)]
    cc: Option<Recipients>,
    #[serde(default)]
    bcc: Option<Recipients>,
}

/// Validated send-mail input with normalized recipient lists.
#[derive(Debug, Clone)]
pub struct SendMailInput {
    pub task_ref_name: String,
    pub message: EmailMessage,
}

/// Send-mail task handler.
pub struct SendMailHandler {
    provider: Arc<dyn EmailProvider>,
}

impl SendMailHandler {
    pub fn new(provider: Arc<dyn EmailProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TaskHandler for SendMailHandler {
    type Input = SendMailInput;

    fn kind(&self) -> TaskKind {
        TaskKind::SendMail
    }

    fn description(&self) -> &str {
        "Send an email through the configured provider"
    }

    fn validate(&self, raw: &Value) -> Result<SendMailInput> {
        let raw: RawSendMailInput = parse_input(&TaskKind::SendMail, raw)?;
        let to = raw.to.into_vec();
        if to.is_empty() {
            return Err(Error::Validation(
                "SEND_MAIL task needs at least one 'to' recipient".into(),
            ));
        }
        Ok(SendMailInput {
            task_ref_name: raw.task_ref_name,
            message: EmailMessage {
                to,
                subject: raw.subject,
                body: raw.body,
                cc: raw.cc.map(Recipients::into_vec).unwrap_or_default(),
                bcc: raw.bcc.map(Recipients::into_vec).unwrap_or_default(),
            },
        })
    }

    async fn execute(&self, input: SendMailInput) -> TaskResult {
        let receipt = match self.provider.send(&input.message).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(task = %input.task_ref_name, provider = self.provider.name(), "Email delivery failed: {}", e);
                return TaskResult::failed(&input.task_ref_name, e.to_string());
            }
        };

        info!(
            task = %input.task_ref_name,
            provider = self.provider.name(),
            status = receipt.status_code,
            "Email sent to {}",
            input.message.to.join(", ")
        );

        let mut output = Map::new();
        output.insert("to".to_string(), json!(input.message.to));
        output.insert("subject".to_string(), json!(input.message.subject));
        output.insert("provider".to_string(), json!(self.provider.name()));
        output.insert("status_code".to_string(), json!(receipt.status_code));

        if receipt.is_success() {
            TaskResult::completed(input.task_ref_name, output)
        } else {
            TaskResult {
                task_ref_name: input.task_ref_name,
                status: ResultStatus::Failed,
                output,
                reason: Some(format!(
                    "Email provider returned status {}: {}",
                    receipt.status_code, receipt.body
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::tasks::email_provider::DeliveryReceipt;
    use std::sync::Mutex;

    struct RecordingProvider {
        status_code: u16,
        sent: Mutex<Vec<EmailMessage>>,
    }

    impl RecordingProvider {
        fn new(status_code: u16) -> Arc<Self> {
            Arc::new(Self {
                status_code,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EmailProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(DeliveryReceipt {
                status_code: self.status_code,
                body: String::new(),
            })
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl EmailProvider for BrokenProvider {
        fn name(&self) -> &str {
            "broken"
        }

        async fn send(&self, _message: &EmailMessage) -> Result<DeliveryReceipt> {
            Err(Error::Execution("connection refused".into()))
        }
    }

    fn raw_input() -> Value {
        json!({
            "task_ref_name": "notify",
            "to": "ops@example.com",
            "subject": "Order 17",
            "body": "Approved",
            "cc": ["a@example.com", "b@example.com"]
        })
    }

    #[tokio::test]
    async fn test_recipients_normalized_and_completed() {
        let provider = RecordingProvider::new(202);
        let handler = SendMailHandler::new(provider.clone());
        let input = handler.validate(&raw_input()).unwrap();
        let result = handler.execute(input).await;

        assert!(result.is_completed());
        assert_eq!(
            Value::Object(result.output),
            json!({
                "to": ["ops@example.com"],
                "subject": "Order 17",
                "provider": "recording",
                "status_code": 202
            })
        );

        let sent = provider.sent.lock().unwrap();
        assert_eq!(sent[0].cc, vec!["a@example.com", "b@example.com"]);
        assert!(sent[0].bcc.is_empty());
    }

    #[tokio::test]
    async fn test_non_2xx_is_failed() {
        let handler = SendMailHandler::new(RecordingProvider::new(400));
        let input = handler.validate(&raw_input()).unwrap();
        let result = handler.execute(input).await;

        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.output["status_code"], 400);
    }

    #[tokio::test]
    async fn test_provider_error_is_failed_with_reason() {
        let handler = SendMailHandler::new(Arc::new(BrokenProvider));
        let input = handler.validate(&raw_input()).unwrap();
        let result = handler.execute(input).await;

        assert_eq!(result.status, ResultStatus::Failed);
        assert!(result.reason.unwrap().contains("connection refused"));
        assert!(result.output["error"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[test]
    fn test_missing_subject_rejected() {
        let handler = SendMailHandler::new(RecordingProvider::new(200));
        let err = handler
            .validate(&json!({"task_ref_name": "n", "to": "a@example.com", "body": "x"}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_blank_recipients_dropped() {
        let handler = SendMailHandler::new(RecordingProvider::new(200));
        let input = handler
            .validate(&json!({
                "task_ref_name": "n",
                "to": ["ops@example.com", "  "],
                "subject": "s",
                "body": "b",
                "cc": "",
                "bcc": [""]
            }))
            .unwrap();
        assert_eq!(input.message.to, vec!["ops@example.com"]);
        assert!(input.message.cc.is_empty());
        assert!(input.message.bcc.is_empty());

        let err = handler
            .validate(&json!({"task_ref_name": "n", "to": "", "subject": "s", "body": "b"}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
