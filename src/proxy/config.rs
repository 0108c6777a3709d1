use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::proxy::error::{ProxyError, Result};

/// Default payload ceiling, checked against the declared `Content-Length`.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 200_000;

/// How the internal credential is attached to the outbound request.
///
/// Exactly one strategy applies per request; the two never fire together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    /// Send the credential in a dedicated header (default)
    #[default]
    Header,
    /// Append the credential as a query parameter
    #[serde(alias = "query")]
    QueryParam,
}

impl CredentialMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "header" => Some(Self::Header),
            "query" | "query_param" | "queryparam" => Some(Self::QueryParam),
            _ => None,
        }
    }
}

/// Proxy configuration.
///
/// Loaded once at startup and shared read-only for the process lifetime.
/// A missing upstream URL or secret does not stop the server from starting;
/// [`ProxyConfig::validate`] rejects every gated request instead.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Upstream automation endpoint every request is forwarded to
    #[serde(default)]
    pub upstream_url: String,

    /// Shared secret the web client must present
    #[serde(default)]
    pub secret: String,

    /// Internal credential attached to outbound calls, if any
    #[serde(default)]
    pub credential: Option<String>,

    #[serde(default)]
    pub credential_mode: CredentialMode,

    /// Header name used in `header` mode
    #[serde(default = "default_credential_header")]
    pub credential_header: String,

    /// Query parameter name used in `query_param` mode
    #[serde(default = "default_credential_param")]
    pub credential_param: String,

    /// Requests allowed per client within one window
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,

    /// Fixed window length (milliseconds)
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,

    /// Upper bound on a single upstream call (milliseconds)
    #[serde(default = "default_forward_timeout_ms")]
    pub forward_timeout_ms: u64,

    /// Origins allowed by the CORS policy; `*` allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Listen port (0 = OS-assigned)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Mount the debug echo route. Never enable in production.
    #[serde(default)]
    pub debug_echo: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream_url: String::new(),
            secret: String::new(),
            credential: None,
            credential_mode: CredentialMode::default(),
            credential_header: default_credential_header(),
            credential_param: default_credential_param(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            forward_timeout_ms: default_forward_timeout_ms(),
            allowed_origins: default_allowed_origins(),
            max_payload_bytes: default_max_payload_bytes(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            debug_echo: false,
        }
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("upstream_url", &self.upstream_url)
            .field("secret", &redacted(&self.secret))
            .field("credential", &self.credential.as_deref().map(redacted))
            .field("credential_mode", &self.credential_mode)
            .field("credential_header", &self.credential_header)
            .field("credential_param", &self.credential_param)
            .field("rate_limit_max", &self.rate_limit_max)
            .field("rate_limit_window_ms", &self.rate_limit_window_ms)
            .field("forward_timeout_ms", &self.forward_timeout_ms)
            .field("allowed_origins", &self.allowed_origins)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("bind_addr", &self.bind_addr)
            .field("port", &self.port)
            .field("debug_echo", &self.debug_echo)
            .finish()
    }
}

fn redacted(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

fn default_credential_header() -> String {
    "x-api-key".to_string()
}

fn default_credential_param() -> String {
    "token".to_string()
}

fn default_rate_limit_max() -> u32 {
    20
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

fn default_forward_timeout_ms() -> u64 {
    30_000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_max_payload_bytes() -> u64 {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8787
}

impl ProxyConfig {
    /// Fails when the upstream URL or the shared secret is missing.
    ///
    /// Checked on every gated request before authentication, so a
    /// misconfigured deployment answers every caller identically.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.upstream_url.trim().is_empty() {
            missing.push("upstream URL");
        }
        if self.secret.trim().is_empty() {
            missing.push("shared secret");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProxyError::Configuration(format!(
                "missing {}",
                missing.join(" and ")
            )))
        }
    }

    /// The credential to attach, ignoring an empty value.
    pub fn active_credential(&self) -> Option<&str> {
        self.credential.as_deref().filter(|c| !c.is_empty())
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> ProxyConfig {
        ProxyConfig {
            upstream_url: "https://automation.example.com/webhook/abc".to_string(),
            secret: "s3cret".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.rate_limit_max, 20);
        assert_eq!(config.rate_limit_window(), Duration::from_millis(60_000));
        assert_eq!(config.forward_timeout(), Duration::from_millis(30_000));
        assert_eq!(config.allowed_origins, vec!["*"]);
        assert_eq!(config.max_payload_bytes, 200_000);
        assert_eq!(config.credential_mode, CredentialMode::Header);
        assert!(!config.debug_echo);
    }

    #[test]
    fn test_validate_requires_upstream_and_secret() {
        assert!(configured().validate().is_ok());

        let no_upstream = ProxyConfig {
            upstream_url: "  ".to_string(),
            ..configured()
        };
        assert!(matches!(
            no_upstream.validate(),
            Err(ProxyError::Configuration(_))
        ));

        let no_secret = ProxyConfig {
            secret: String::new(),
            ..configured()
        };
        assert!(matches!(
            no_secret.validate(),
            Err(ProxyError::Configuration(_))
        ));

        match ProxyConfig::default().validate() {
            Err(ProxyError::Configuration(msg)) => {
                assert!(msg.contains("upstream URL"));
                assert!(msg.contains("shared secret"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ProxyConfig {
            credential: Some("internal-key".to_string()),
            ..configured()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("internal-key"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_credential_mode_parse() {
        assert_eq!(CredentialMode::parse("header"), Some(CredentialMode::Header));
        assert_eq!(CredentialMode::parse("Query"), Some(CredentialMode::QueryParam));
        assert_eq!(
            CredentialMode::parse("query_param"),
            Some(CredentialMode::QueryParam)
        );
        assert_eq!(CredentialMode::parse("cookie"), None);
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let json = r#"{"upstream_url":"https://u.example","secret":"x","credential_mode":"query"}"#;
        let config: ProxyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.credential_mode, CredentialMode::QueryParam);
        assert_eq!(config.rate_limit_max, 20);
        assert_eq!(config.credential_param, "token");
    }

    #[test]
    fn test_empty_credential_is_inactive() {
        let config = ProxyConfig {
            credential: Some(String::new()),
            ..configured()
        };
        assert!(config.active_credential().is_none());
    }
}
