//! HTTP task - call an external endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::types::{parse_input, TaskHandler, TaskKind};
use crate::dsl::TaskResult;
use crate::error::{Error, Result};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct RawHttpInput {
    task_ref_name: String,
    url: String,
    method: String,
    #[serde(default)]
    headers: Option<Map<String, Value>>,
    #[serde(default)]
    body: Option<Value>,
}

/// Validated HTTP request.
#[derive(Debug, Clone)]
pub struct HttpInput {
    pub task_ref_name: String,
    pub url: Url,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// HTTP task handler.
pub struct HttpHandler {
    client: Client,
}

impl HttpHandler {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_HTTP_CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout defaults: {}", e);
                Client::new()
            });
        Self { client }
    }
}

impl Default for HttpHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_method(method: &str) -> Result<Method> {
    match method.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        _ => Err(Error::Validation(format!(
            "Unsupported HTTP method '{}'. Use GET, POST, PUT or DELETE",
            method
        ))),
    }
}

#[async_trait]
impl TaskHandler for HttpHandler {
    type Input = HttpInput;

    fn kind(&self) -> TaskKind {
        TaskKind::Http
    }

    fn description(&self) -> &str {
        "Make HTTP requests (GET, POST, PUT, DELETE)"
    }

    fn validate(&self, raw: &Value) -> Result<HttpInput> {
        let raw: RawHttpInput = parse_input(&TaskKind::Http, raw)?;

        let url = Url::parse(&raw.url)
            .map_err(|e| Error::Validation(format!("Invalid URL '{}': {}", raw.url, e)))?;
        let method = parse_method(&raw.method)?;

        let headers = raw
            .headers
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(s) => Ok((key, s)),
                other => Err(Error::Validation(format!(
                    "Header '{}' must be a string, got {}",
                    key, other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(HttpInput {
            task_ref_name: raw.task_ref_name,
            url,
            method,
            headers,
            body: raw.body,
        })
    }

    async fn execute(&self, input: HttpInput) -> TaskResult {
        let mut request = self.client.request(input.method.clone(), input.url.clone());
        for (key, value) in &input.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &input.body {
            request = request.json(body);
        }

        let start = std::time::Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(task = %input.task_ref_name, "HTTP {} {} failed: {}", input.method, input.url, e);
                return TaskResult::failed(&input.task_ref_name, e.to_string());
            }
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return TaskResult::failed(
                    &input.task_ref_name,
                    format!("Failed to read HTTP response body from {}: {}", input.url, e),
                )
            }
        };

        info!(
            "HTTP {} {} -> {} ({}ms)",
            input.method,
            input.url,
            status,
            start.elapsed().as_millis()
        );

        let mut output = Map::new();
        output.insert("status".to_string(), json!(status));
        output.insert("url".to_string(), json!(input.url.as_str()));
        output.insert("method".to_string(), json!(input.method.as_str()));
        output.insert("body".to_string(), input.body.unwrap_or(Value::Null));
        output.insert("response".to_string(), Value::String(text));

        TaskResult::completed(input.task_ref_name, output)
    }
}
