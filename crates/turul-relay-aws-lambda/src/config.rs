//! Relay configuration
//!
//! [`RelayConfig`] holds everything that shapes a single invocation. It is
//! usually filled in through [`LambdaRelayBuilder`](crate::LambdaRelayBuilder),
//! or read from the function environment with [`RelayConfig::from_env`]:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RELAY_LIFESPAN` | `lifespan` (`auto`, `on`, `off`) |
//! | `RELAY_DSN` | `dsn` |
//! | `RELAY_TEXT_MIME_TYPES` | extra entries for `text_mime_types` (comma separated) |
//! | `RELAY_API_GATEWAY_BASE_PATH` | `api_gateway_base_path` |
//! | `RELAY_API_GATEWAY_ENDPOINT_URL` | `api_gateway_endpoint_url` |
//! | `AWS_REGION` | `api_gateway_region` |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Content types whose bodies are returned as plain text rather than base64
pub const DEFAULT_TEXT_MIME_TYPES: &[&str] = &[
    "text/",
    "application/json",
    "application/javascript",
    "application/xml",
    "application/vnd.api+json",
];

/// Default bound on each lifespan handshake
pub const DEFAULT_LIFESPAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on each HTTP/WebSocket exchange step (API Gateway's integration limit)
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(29);

/// How the lifespan protocol is run around each invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifespanMode {
    /// Run lifespan, but carry on when the application fails or does not support it
    #[default]
    Auto,
    /// Run lifespan; a failed or unsupported startup fails the invocation
    On,
    /// Never send lifespan events
    Off,
}

impl FromStr for LifespanMode {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(LifespanMode::Auto),
            "on" => Ok(LifespanMode::On),
            "off" => Ok(LifespanMode::Off),
            _ => Err(RelayError::Configuration(format!(
                "Invalid lifespan mode '{}'. Choices are: auto|on|off",
                s
            ))),
        }
    }
}

impl fmt::Display for LifespanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifespanMode::Auto => "auto",
            LifespanMode::On => "on",
            LifespanMode::Off => "off",
        })
    }
}

/// Configuration for a [`LambdaRelay`](crate::LambdaRelay)
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Lifespan handling
    pub lifespan: LifespanMode,
    /// Content type prefixes treated as text (defaults plus any extras)
    pub text_mime_types: Vec<String>,
    /// Connection storage DSN, required for WebSocket triggers unless storage is injected
    pub dsn: Option<String>,
    /// Path prefix removed from incoming request paths (e.g. a stage name)
    pub api_gateway_base_path: String,
    /// Override for the API Gateway Management API endpoint
    pub api_gateway_endpoint_url: Option<String>,
    /// Override for the API Gateway Management API region
    pub api_gateway_region: Option<String>,
    /// Bound on each lifespan handshake
    pub lifespan_timeout: Duration,
    /// Bound on each wait for the application during HTTP/WebSocket cycles
    pub exchange_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            lifespan: LifespanMode::Auto,
            text_mime_types: DEFAULT_TEXT_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            dsn: None,
            api_gateway_base_path: "/".to_string(),
            api_gateway_endpoint_url: None,
            api_gateway_region: None,
            lifespan_timeout: DEFAULT_LIFESPAN_TIMEOUT,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }
}

impl RelayConfig {
    /// Build a configuration from `RELAY_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(lifespan) = std::env::var("RELAY_LIFESPAN") {
            config.lifespan = lifespan.parse()?;
        }
        if let Ok(dsn) = std::env::var("RELAY_DSN")
            && !dsn.trim().is_empty()
        {
            config.dsn = Some(dsn);
        }
        if let Ok(extra) = std::env::var("RELAY_TEXT_MIME_TYPES") {
            config.add_text_mime_types(extra.split(','));
        }
        if let Ok(base_path) = std::env::var("RELAY_API_GATEWAY_BASE_PATH") {
            config.api_gateway_base_path = base_path;
        }
        if let Ok(endpoint_url) = std::env::var("RELAY_API_GATEWAY_ENDPOINT_URL")
            && !endpoint_url.trim().is_empty()
        {
            config.api_gateway_endpoint_url = Some(endpoint_url);
        }
        if let Ok(region) = std::env::var("AWS_REGION") {
            config.api_gateway_region = Some(region);
        }

        Ok(config)
    }

    /// Extend the text MIME allow-list, skipping blanks and duplicates
    pub fn add_text_mime_types<I, S>(&mut self, mime_types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for mime_type in mime_types {
            let mime_type = mime_type.as_ref().trim().to_ascii_lowercase();
            if !mime_type.is_empty() && !self.text_mime_types.contains(&mime_type) {
                self.text_mime_types.push(mime_type);
            }
        }
    }

    /// Whether a content type falls under the text allow-list (case-insensitive prefix match)
    pub fn is_text_mime_type(&self, content_type: &str) -> bool {
        let content_type = content_type.trim().to_ascii_lowercase();
        self.text_mime_types
            .iter()
            .any(|prefix| content_type.starts_with(&prefix.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_lifespan_mode_parse() {
        assert_eq!("auto".parse::<LifespanMode>().unwrap(), LifespanMode::Auto);
        assert_eq!("ON".parse::<LifespanMode>().unwrap(), LifespanMode::On);
        assert_eq!(" off ".parse::<LifespanMode>().unwrap(), LifespanMode::Off);

        let err = "sometimes".parse::<LifespanMode>().unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn test_text_mime_matching() {
        let mut config = RelayConfig::default();
        assert!(config.is_text_mime_type("text/html; charset=utf-8"));
        assert!(config.is_text_mime_type("Application/JSON"));
        assert!(config.is_text_mime_type("application/vnd.api+json"));
        assert!(!config.is_text_mime_type("image/png"));
        assert!(!config.is_text_mime_type("application/octet-stream"));

        config.add_text_mime_types(["application/vnd.custom", "  ", "text/"]);
        assert!(config.is_text_mime_type("application/vnd.custom+xml"));
        assert_eq!(
            config.text_mime_types.len(),
            DEFAULT_TEXT_MIME_TYPES.len() + 1
        );
    }

    #[test]
    #[serial]
    fn test_from_env() {
        // SAFETY: env mutation is serialized across tests with #[serial]
        unsafe {
            std::env::set_var("RELAY_LIFESPAN", "off");
            std::env::set_var("RELAY_DSN", "memory://");
            std::env::set_var("RELAY_TEXT_MIME_TYPES", "application/wasm, image/svg+xml");
            std::env::set_var("RELAY_API_GATEWAY_BASE_PATH", "/prod");
            std::env::remove_var("RELAY_API_GATEWAY_ENDPOINT_URL");
        }

        let config = RelayConfig::from_env().unwrap();
        assert_eq!(config.lifespan, LifespanMode::Off);
        assert_eq!(config.dsn.as_deref(), Some("memory://"));
        assert!(config.is_text_mime_type("image/svg+xml"));
        assert!(config.is_text_mime_type("application/wasm"));
        assert_eq!(config.api_gateway_base_path, "/prod");
        assert!(config.api_gateway_endpoint_url.is_none());

        unsafe {
            std::env::set_var("RELAY_LIFESPAN", "maybe");
        }
        assert!(matches!(
            RelayConfig::from_env(),
            Err(RelayError::Configuration(_))
        ));

        unsafe {
            std::env::remove_var("RELAY_LIFESPAN");
            std::env::remove_var("RELAY_DSN");
            std::env::remove_var("RELAY_TEXT_MIME_TYPES");
            std::env::remove_var("RELAY_API_GATEWAY_BASE_PATH");
        }
    }
}
