use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::client::ClientOptions;
use crate::endpoint::Endpoint;
use crate::fingerprint::{FingerprintOptions, DEFAULT_CONCURRENCY};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            dial_timeout_secs: default_dial_timeout_secs(),
            token_env: default_token_env(),
            client_name: default_client_name(),
        }
    }
}

fn default_dial_timeout_secs() -> u64 {
    5
}
fn default_token_env() -> String {
    "KVF_ACCESS_TOKEN".to_string()
}
fn default_client_name() -> String {
    "kv".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FingerprintConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl RemoteConfig {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            dial_timeout: Duration::from_secs(self.dial_timeout_secs),
            client_name: self.client_name.clone(),
        }
    }
}

impl FingerprintConfig {
    pub fn options(&self) -> FingerprintOptions {
        FingerprintOptions {
            concurrency: self.concurrency,
            exclude_globs: self.exclude_globs.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Loads `path` if given, otherwise returns defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => Ok(Config::default()),
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.remote.dial_timeout_secs == 0 {
        bail!("remote.dial_timeout_secs must be > 0");
    }
    if config.remote.token_env.trim().is_empty() {
        bail!("remote.token_env must not be empty");
    }
    if let Some(endpoint) = &config.remote.endpoint {
        Endpoint::parse(endpoint).with_context(|| "remote.endpoint is invalid")?;
    }

    if config.fingerprint.concurrency == 0 {
        bail!("fingerprint.concurrency must be > 0");
    }
    for pattern in &config.fingerprint.exclude_globs {
        globset::Glob::new(pattern)
            .with_context(|| format!("fingerprint.exclude_globs: bad pattern '{}'", pattern))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults_when_empty() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.remote.dial_timeout_secs, 5);
        assert_eq!(cfg.remote.token_env, "KVF_ACCESS_TOKEN");
        assert!(cfg.remote.endpoint.is_none());
        assert_eq!(cfg.fingerprint.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(cfg.remote.client_options().dial_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_full_config() {
        let cfg = parse(
            r#"
[remote]
endpoint = "grpcs://cache.example.com:443"
dial_timeout_secs = 2
token_env = "MY_TOKEN"
client_name = "xcode"

[fingerprint]
concurrency = 2
exclude_globs = ["**/*.log"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.remote.endpoint.as_deref(), Some("grpcs://cache.example.com:443"));
        assert_eq!(cfg.remote.client_options().client_name, "xcode");
        assert_eq!(cfg.fingerprint.options().exclude_globs, vec!["**/*.log"]);
    }

    #[test]
    fn test_zero_dial_timeout_rejected() {
        assert!(parse("[remote]\ndial_timeout_secs = 0\n").is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(parse("[fingerprint]\nconcurrency = 0\n").is_err());
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        assert!(parse("[remote]\nendpoint = \"cache.example.com:443\"\n").is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/kvf.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
