use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::proxy::{CredentialMode, ProxyConfig};

/// Names a JSON file holding a full or partial `ProxyConfig`.
pub const CONFIG_FILE_ENV: &str = "HOOK_GATE_CONFIG";

/// Directory for the rolling log file; console only when unset.
pub const LOG_DIR_ENV: &str = "HOOK_GATE_LOG_DIR";

/// Log directory from the process environment.
///
/// Read before the logger exists, so it stays separate from `load_proxy_config`.
pub fn load_log_dir() -> Option<PathBuf> {
    log_dir_from_lookup(|key| std::env::var(key).ok())
}

pub fn log_dir_from_lookup<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(LOG_DIR_ENV)
        .map(|dir| dir.trim().to_string())
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

/// Load proxy configuration from the optional config file and the process environment
pub fn load_proxy_config() -> Result<ProxyConfig, String> {
    load_from_lookup(|key| std::env::var(key).ok())
}

/// Build the configuration from `lookup`, which resolves variable names.
///
/// File values come first, environment variables override them.
pub fn load_from_lookup<F>(lookup: F) -> Result<ProxyConfig, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match lookup(CONFIG_FILE_ENV).filter(|p| !p.trim().is_empty()) {
        Some(path) => load_config_file(&path)?,
        None => ProxyConfig::default(),
    };
    apply_env_overrides(&mut config, &lookup);
    Ok(config)
}

fn load_config_file(path: &str) -> Result<ProxyConfig, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

    serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse config file {}: {}", path, e))
}

fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("HOOK_GATE_UPSTREAM_URL") {
        config.upstream_url = value.trim().to_string();
    }
    if let Some(value) = lookup("HOOK_GATE_SECRET") {
        config.secret = value;
    }
    if let Some(value) = lookup("HOOK_GATE_CREDENTIAL") {
        config.credential = Some(value).filter(|v| !v.is_empty());
    }
    if let Some(value) = lookup("HOOK_GATE_CREDENTIAL_MODE") {
        match CredentialMode::parse(&value) {
            Some(mode) => config.credential_mode = mode,
            None => tracing::warn!(
                "Ignoring HOOK_GATE_CREDENTIAL_MODE={:?}: expected header or query",
                value
            ),
        }
    }
    if let Some(value) = lookup("HOOK_GATE_CREDENTIAL_HEADER").filter(|v| !v.trim().is_empty()) {
        config.credential_header = value.trim().to_string();
    }
    if let Some(value) = lookup("HOOK_GATE_CREDENTIAL_PARAM").filter(|v| !v.trim().is_empty()) {
        config.credential_param = value.trim().to_string();
    }

    override_parsed(lookup, "HOOK_GATE_RATE_LIMIT_MAX", &mut config.rate_limit_max);
    override_parsed(lookup, "HOOK_GATE_RATE_LIMIT_WINDOW_MS", &mut config.rate_limit_window_ms);
    override_parsed(lookup, "HOOK_GATE_TIMEOUT_MS", &mut config.forward_timeout_ms);
    override_parsed(lookup, "HOOK_GATE_MAX_PAYLOAD_BYTES", &mut config.max_payload_bytes);
    override_parsed::<IpAddr, _>(lookup, "HOOK_GATE_BIND", &mut config.bind_addr);
    override_parsed(lookup, "HOOK_GATE_PORT", &mut config.port);

    if let Some(value) = lookup("HOOK_GATE_ALLOWED_ORIGINS") {
        let origins: Vec<String> = value
            .split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if !origins.is_empty() {
            config.allowed_origins = origins;
        }
    }

    if let Some(value) = lookup("HOOK_GATE_DEBUG_ECHO") {
        config.debug_echo = matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );
    }
}

/// Replace `target` with the parsed value, keeping the current one on parse failure.
fn override_parsed<T, F>(lookup: &F, key: &str, target: &mut T)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!("Ignoring {}={:?}: not a valid value", key, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = load_from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.rate_limit_max, 20);
        assert_eq!(config.rate_limit_window_ms, 60_000);
        assert_eq!(config.forward_timeout_ms, 30_000);
        assert_eq!(config.max_payload_bytes, 200_000);
        assert_eq!(config.allowed_origins, vec!["*".to_string()]);
        assert_eq!(config.port, 8787);
        assert!(!config.debug_echo);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let config = load_from_lookup(lookup_from(&[
            ("HOOK_GATE_UPSTREAM_URL", " https://automation.example.com/webhook/abc "),
            ("HOOK_GATE_SECRET", "s3cret"),
            ("HOOK_GATE_CREDENTIAL", "internal-key"),
            ("HOOK_GATE_CREDENTIAL_MODE", "query"),
            ("HOOK_GATE_CREDENTIAL_PARAM", "apiKey"),
            ("HOOK_GATE_RATE_LIMIT_MAX", "5"),
            ("HOOK_GATE_RATE_LIMIT_WINDOW_MS", "1000"),
            ("HOOK_GATE_TIMEOUT_MS", "250"),
            ("HOOK_GATE_ALLOWED_ORIGINS", "https://a.example.com/, https://b.example.com,"),
            ("HOOK_GATE_BIND", "0.0.0.0"),
            ("HOOK_GATE_PORT", "0"),
            ("HOOK_GATE_DEBUG_ECHO", "Yes"),
        ]))
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.upstream_url, "https://automation.example.com/webhook/abc");
        assert_eq!(config.active_credential(), Some("internal-key"));
        assert_eq!(config.credential_mode, CredentialMode::QueryParam);
        assert_eq!(config.credential_param, "apiKey");
        assert_eq!(config.rate_limit_max, 5);
        assert_eq!(config.rate_limit_window_ms, 1000);
        assert_eq!(config.forward_timeout_ms, 250);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example.com".to_string(), "https://b.example.com".to_string()]
        );
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.port, 0);
        assert!(config.debug_echo);
    }

    #[test]
    fn test_unparsable_values_keep_defaults() {
        let config = load_from_lookup(lookup_from(&[
            ("HOOK_GATE_RATE_LIMIT_MAX", "twenty"),
            ("HOOK_GATE_PORT", "99999"),
            ("HOOK_GATE_BIND", "localhost:80"),
            ("HOOK_GATE_CREDENTIAL_MODE", "cookie"),
        ]))
        .unwrap();
        assert_eq!(config.rate_limit_max, 20);
        assert_eq!(config.port, 8787);
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.credential_mode, CredentialMode::Header);
    }

    #[test]
    fn test_empty_credential_is_absent() {
        let config = load_from_lookup(lookup_from(&[("HOOK_GATE_CREDENTIAL", "")])).unwrap();
        assert!(config.credential.is_none());
    }

    #[test]
    fn test_config_file_then_environment() {
        let path = std::env::temp_dir().join(format!("hook-gate-{}.json", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            r#"{"upstream_url":"https://file.example.com/hook","secret":"from-file","rate_limit_max":3}"#,
        )
        .unwrap();
        let path_str = path.to_string_lossy().to_string();

        let config = load_from_lookup(lookup_from(&[
            (CONFIG_FILE_ENV, &path_str),
            ("HOOK_GATE_SECRET", "from-env"),
        ]))
        .unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(config.upstream_url, "https://file.example.com/hook");
        assert_eq!(config.secret, "from-env");
        assert_eq!(config.rate_limit_max, 3);
        assert_eq!(config.forward_timeout_ms, 30_000);
    }

    #[test]
    fn test_log_dir_lookup() {
        assert_eq!(log_dir_from_lookup(lookup_from(&[])), None);
        assert_eq!(log_dir_from_lookup(lookup_from(&[(LOG_DIR_ENV, "  ")])), None);
        assert_eq!(
            log_dir_from_lookup(lookup_from(&[(LOG_DIR_ENV, " /var/log/hook-gate ")])),
            Some(PathBuf::from("/var/log/hook-gate"))
        );
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = load_from_lookup(lookup_from(&[(CONFIG_FILE_ENV, "/nonexistent/hook-gate.json")]))
            .unwrap_err();
        assert!(err.contains("Failed to read config file"));
    }
}
