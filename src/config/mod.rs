//! Configuration management.
//!
//! dslflow configuration can come from:
//! - Config file (~/.config/dslflow/config.toml, or an explicit path)
//! - Environment variables (DSLFLOW_*, plus the EMAIL_PROVIDER / SENDGRID_*
//!   names used by existing deployments)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, Result};

/// dslflow configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// In-process activity substrate
    #[serde(default)]
    pub substrate: SubstrateConfig,

    /// Email delivery for the send-mail task
    #[serde(default)]
    pub email: EmailConfig,

    /// Instance bookkeeping
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum concurrent API requests
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_concurrency() -> usize {
    64
}

/// Activity dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstrateConfig {
    /// Per-attempt activity timeout (seconds)
    #[serde(default = "default_activity_timeout")]
    pub activity_timeout_seconds: u64,

    /// Attempts per activity, counting the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts (milliseconds)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            activity_timeout_seconds: default_activity_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

fn default_activity_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_delay() -> u64 {
    500
}

/// Retention of finished workflow instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Finished instances kept for status queries; the oldest go first
    #[serde(default = "default_max_finished_instances")]
    pub max_finished_instances: usize,

    /// Seconds a finished instance stays queryable
    #[serde(default = "default_finished_instance_ttl")]
    pub finished_instance_ttl_seconds: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_finished_instances: default_max_finished_instances(),
            finished_instance_ttl_seconds: default_finished_instance_ttl(),
        }
    }
}

fn default_max_finished_instances() -> usize {
    1000
}

fn default_finished_instance_ttl() -> u64 {
    3600
}

/// Which email provider the send-mail task uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailProviderKind {
    SendGrid,
    #[default]
    Console,
}

impl EmailProviderKind {
    /// Parse a provider name. Unknown names fall back to the console.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "sendgrid" => EmailProviderKind::SendGrid,
            "console" => EmailProviderKind::Console,
            other => {
                warn!("Unknown email provider '{}', using console", other);
                EmailProviderKind::Console
            }
        }
    }
}

/// Email configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub provider: EmailProviderKind,

    #[serde(default, skip_serializing)]
    pub sendgrid_api_key: Option<String>,

    /// Sender address
    #[serde(default = "default_from_email")]
    pub from_email: String,

    #[serde(default = "default_sendgrid_base_url")]
    pub sendgrid_base_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: EmailProviderKind::default(),
            sendgrid_api_key: None,
            from_email: default_from_email(),
            sendgrid_base_url: default_sendgrid_base_url(),
        }
    }
}

fn default_from_email() -> String {
    "no-reply@example.com".to_string()
}

fn default_sendgrid_base_url() -> String {
    "https://api.sendgrid.com".to_string()
}

impl Config {
    /// Load configuration from the default location plus the environment.
    ///
    /// A missing or unreadable default file is ignored.
    pub fn load() -> Self {
        let mut config = Self::default();

        let primary_path = Self::config_dir().join("config.toml");
        match Self::load_partial_from_path(&primary_path) {
            Ok(partial) => config.apply_partial(partial),
            Err(Error::Io(_)) => {}
            Err(e) => warn!("Ignoring {}: {}", primary_path.display(), e),
        }

        config.apply_env_overrides();
        config
    }

    /// Load configuration from an explicit file plus the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.apply_partial(Self::load_partial_from_path(path)?);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Get the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("dslflow"))
            .unwrap_or_else(|| PathBuf::from(".dslflow"))
    }

    /// Check settings that would only fail later at run time.
    pub fn validate(&self) -> Result<()> {
        if self.substrate.activity_timeout_seconds == 0 {
            return Err(Error::Config(
                "substrate.activity_timeout_seconds must be at least 1".into(),
            ));
        }
        if self.substrate.max_attempts == 0 {
            return Err(Error::Config(
                "substrate.max_attempts must be at least 1".into(),
            ));
        }
        if self.runtime.max_finished_instances == 0 {
            return Err(Error::Config(
                "runtime.max_finished_instances must be at least 1".into(),
            ));
        }
        if self.email.provider == EmailProviderKind::SendGrid
            && self
                .email
                .sendgrid_api_key
                .as_deref()
                .map_or(true, |k| k.trim().is_empty())
        {
            return Err(Error::Config(
                "email provider 'sendgrid' requires SENDGRID_API_KEY".into(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("DSLFLOW_SERVER_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                self.server.port = parsed;
            }
        }
        if let Some(host) = lookup("DSLFLOW_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(timeout) = lookup("DSLFLOW_ACTIVITY_TIMEOUT_SECONDS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.substrate.activity_timeout_seconds = parsed;
            }
        }
        if let Some(attempts) = lookup("DSLFLOW_ACTIVITY_MAX_ATTEMPTS") {
            if let Ok(parsed) = attempts.parse::<u32>() {
                self.substrate.max_attempts = parsed;
            }
        }
        if let Some(max) = lookup("DSLFLOW_MAX_FINISHED_INSTANCES") {
            if let Ok(parsed) = max.parse::<usize>() {
                self.runtime.max_finished_instances = parsed;
            }
        }
        if let Some(ttl) = lookup("DSLFLOW_FINISHED_INSTANCE_TTL_SECONDS") {
            if let Ok(parsed) = ttl.parse::<u64>() {
                self.runtime.finished_instance_ttl_seconds = parsed;
            }
        }
        if let Some(provider) = lookup("EMAIL_PROVIDER") {
            self.email.provider = EmailProviderKind::parse(&provider);
        }
        if let Some(key) = lookup("SENDGRID_API_KEY") {
            self.email.sendgrid_api_key = Some(key);
        }
        if let Some(from) = lookup("SENDGRID_FROM_EMAIL") {
            self.email.from_email = from;
        }
    }

    fn load_partial_from_path(path: &Path) -> Result<PartialConfig> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(server) = partial.server {
            self.server = server;
        }
        if let Some(substrate) = partial.substrate {
            self.substrate = substrate;
        }
        if let Some(email) = partial.email {
            self.email = email;
        }
        if let Some(runtime) = partial.runtime {
            self.runtime = runtime;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    server: Option<ServerConfig>,
    substrate: Option<SubstrateConfig>,
    email: Option<EmailConfig>,
    runtime: Option<RuntimeConfig>,
}
