//! Process-scoped configuration, loaded once and passed down explicitly.
//!
//! Secrets (OAuth client credentials, webhook secret) come from
//! `<store>/config.toml` with environment-variable overrides; they are never
//! read from ambient state deeper in the call graph.

use crate::core::store::Store;
use serde::Deserialize;
use std::path::PathBuf;

pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_OAUTH_BASE: &str = "https://github.com";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GitHubConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    /// REST API base; overridable so tests can point at a stub server.
    pub api_base: String,
    /// OAuth host for the code-for-token exchange.
    pub oauth_base: String,
    /// Shared secret for webhook signatures. Accepted but not yet verified;
    /// see the ingest path.
    pub webhook_secret: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            oauth_base: DEFAULT_OAUTH_BASE.to_string(),
            webhook_secret: String::new(),
        }
    }
}

pub fn config_path(store: &Store) -> PathBuf {
    store.root.join(CONFIG_FILE_NAME)
}

/// Load config from the store root, falling back to defaults when the file
/// is absent or unparseable, then apply environment overrides.
pub fn load(store: &Store) -> AppConfig {
    let path = config_path(store);
    let mut config = match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            eprintln!("Warning: ignoring malformed {}: {}", path.display(), e);
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    };

    if let Ok(v) = std::env::var("DEVHABIT_GITHUB_CLIENT_ID") {
        config.github.client_id = v;
    }
    if let Ok(v) = std::env::var("DEVHABIT_GITHUB_CLIENT_SECRET") {
        config.github.client_secret = v;
    }
    if let Ok(v) = std::env::var("DEVHABIT_WEBHOOK_SECRET") {
        config.github.webhook_secret = v;
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_github() {
        let cfg = GitHubConfig::default();
        assert_eq!(cfg.api_base, DEFAULT_API_BASE);
        assert_eq!(cfg.oauth_base, DEFAULT_OAUTH_BASE);
        assert!(cfg.client_id.is_empty());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: AppConfig =
            toml::from_str("[github]\nclient_id = \"abc\"\n").expect("parse partial config");
        assert_eq!(cfg.github.client_id, "abc");
        assert_eq!(cfg.github.api_base, DEFAULT_API_BASE);
    }
}
