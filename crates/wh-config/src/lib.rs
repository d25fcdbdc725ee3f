//! Webhooks Configuration
//!
//! Layered configuration for the webhook service:
//! - Built-in defaults
//! - Optional TOML file
//! - `WH_*` environment overrides
//!
//! Route naming (`namespace`, `rest_base`) is read once, when the HTTP router
//! is built. Changing it afterwards has no effect on a running server.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_NAMESPACE: &str = "webhooks/v1";
pub const DEFAULT_REST_BASE: &str = "list";
pub const DEFAULT_INIT_EVENT: &str = "init";

/// Largest `dispatch.max_in_flight` accepted; matches the permit ceiling of
/// the tokio semaphore bounding deliveries
pub const MAX_IN_FLIGHT_LIMIT: usize = usize::MAX >> 3;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Route naming for the inbound surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Prefix all routes are nested under, e.g. `webhooks/v1`
    pub namespace: String,
    /// Path segment of the listing route
    pub rest_base: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            rest_base: DEFAULT_REST_BASE.to_string(),
        }
    }
}

/// Outbound delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Deliveries allowed in flight at once; extra deliveries are dropped
    pub max_in_flight: usize,
    pub user_agent: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 2,
            request_timeout_secs: 5,
            max_in_flight: 256,
            user_agent: format!("wh-webhooks/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl DispatchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Host event that triggers the register-events phase
    pub init_event: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            init_event: DEFAULT_INIT_EVENT.to_string(),
        }
    }
}

/// A registration declared in the config file (always uses the default body)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticWebhook {
    pub event: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhooksConfig {
    pub server: ServerConfig,
    pub routes: RouteConfig,
    pub dispatch: DispatchConfig,
    pub lifecycle: LifecycleConfig,
    pub webhooks: Vec<StaticWebhook>,
}

impl WebhooksConfig {
    /// Load from an optional TOML file, apply `WH_*` overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), webhooks = config.webhooks.len(), "Loaded configuration file");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (the process environment in production)
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("WH_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("WH_PORT") {
            self.server.port = parse_number("WH_PORT", &port)?;
        }
        if let Some(namespace) = lookup("WH_NAMESPACE") {
            self.routes.namespace = namespace;
        }
        if let Some(rest_base) = lookup("WH_REST_BASE") {
            self.routes.rest_base = rest_base;
        }
        if let Some(timeout) = lookup("WH_DISPATCH_TIMEOUT_SECS") {
            self.dispatch.request_timeout_secs = parse_number("WH_DISPATCH_TIMEOUT_SECS", &timeout)?;
        }
        if let Some(max) = lookup("WH_MAX_IN_FLIGHT") {
            self.dispatch.max_in_flight = parse_number("WH_MAX_IN_FLIGHT", &max)?;
        }
        if let Some(init_event) = lookup("WH_INIT_EVENT") {
            self.lifecycle.init_event = init_event;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.routes.namespace.trim_matches('/').is_empty() {
            return Err(ConfigError::invalid("routes.namespace must not be empty"));
        }
        if self.routes.rest_base.trim_matches('/').is_empty() {
            return Err(ConfigError::invalid("routes.rest_base must not be empty"));
        }
        if self.dispatch.connect_timeout_secs == 0 {
            return Err(ConfigError::invalid("dispatch.connect_timeout_secs must be greater than zero"));
        }
        if self.dispatch.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("dispatch.request_timeout_secs must be greater than zero"));
        }
        if self.dispatch.max_in_flight == 0 {
            return Err(ConfigError::invalid("dispatch.max_in_flight must be greater than zero"));
        }
        if self.dispatch.max_in_flight > MAX_IN_FLIGHT_LIMIT {
            return Err(ConfigError::invalid(format!(
                "dispatch.max_in_flight must be at most {}",
                MAX_IN_FLIGHT_LIMIT
            )));
        }
        if self.lifecycle.init_event.trim().is_empty() {
            return Err(ConfigError::invalid("lifecycle.init_event must not be empty"));
        }
        for (index, hook) in self.webhooks.iter().enumerate() {
            if hook.event.trim().is_empty() || hook.target.trim().is_empty() {
                return Err(ConfigError::invalid(format!(
                    "webhooks[{}] needs both an event and a target",
                    index
                )));
            }
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(format!("{} must be a number, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WebhooksConfig::default();
        assert_eq!(config.routes.namespace, "webhooks/v1");
        assert_eq!(config.routes.rest_base, "list");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.dispatch.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.lifecycle.init_event, "init");
        assert!(config.webhooks.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = WebhooksConfig::from_toml_str(
            r#"
            [routes]
            namespace = "hooks/v2"

            [[webhooks]]
            event = "order.created"
            target = "https://a.test/hook"
            "#,
        )
        .unwrap();

        assert_eq!(config.routes.namespace, "hooks/v2");
        assert_eq!(config.routes.rest_base, "list");
        assert_eq!(config.dispatch.max_in_flight, 256);
        assert_eq!(
            config.webhooks,
            vec![StaticWebhook {
                event: "order.created".to_string(),
                target: "https://a.test/hook".to_string(),
            }]
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = WebhooksConfig::default();
        config
            .apply_overrides_from(lookup(&[
                ("WH_PORT", "9001"),
                ("WH_NAMESPACE", "custom/v3"),
                ("WH_MAX_IN_FLIGHT", "8"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 9001);
        assert_eq!(config.routes.namespace, "custom/v3");
        assert_eq!(config.dispatch.max_in_flight, 8);
        assert_eq!(config.routes.rest_base, "list");
    }

    #[test]
    fn test_env_override_rejects_garbage_number() {
        let mut config = WebhooksConfig::default();
        let err = config
            .apply_overrides_from(lookup(&[("WH_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_static_webhook() {
        let mut config = WebhooksConfig::default();
        config.webhooks.push(StaticWebhook {
            event: "".to_string(),
            target: "https://a.test".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = WebhooksConfig::default();
        config.dispatch.max_in_flight = 0;
        assert!(config.validate().is_err());

        let mut config = WebhooksConfig::default();
        config.routes.namespace = "/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_connect_timeout() {
        let mut config = WebhooksConfig::default();
        config.dispatch.connect_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connect_timeout_secs"));
    }

    #[test]
    fn test_validate_rejects_oversized_max_in_flight() {
        let oversized = usize::MAX.to_string();
        let mut config = WebhooksConfig::default();
        config
            .apply_overrides_from(lookup(&[("WH_MAX_IN_FLIGHT", oversized.as_str())]))
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        config.dispatch.max_in_flight = MAX_IN_FLIGHT_LIMIT;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 7070\n\n[dispatch]\nrequest_timeout_secs = 3").unwrap();

        let config = WebhooksConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.dispatch.request_timeout_secs, 3);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WebhooksConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = WebhooksConfig::from_toml_str("[server\nport = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
