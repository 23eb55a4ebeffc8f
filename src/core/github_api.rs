//! Outbound GitHub capability seam.
//!
//! The engine consumes GitHub through this trait only; the blocking HTTP
//! implementation lives here, and tests substitute their own. Base URLs are
//! injected from config, never hardcoded at call sites.

use crate::core::config::GitHubConfig;
use crate::core::error::HabitError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Bounded first page, matching the upstream sync behavior.
pub const REPO_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAccount {
    pub id: i64,
    pub login: String,
    pub email: Option<String>,
    #[serde(rename = "avatar_url")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRepository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    #[serde(default, rename = "private")]
    pub is_private: bool,
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: i64,
}

pub trait GitHubApi {
    /// Exchange an OAuth authorization code for an access token.
    fn exchange_code(&self, code: &str) -> Result<String, HabitError>;
    /// Fetch the account that owns `token`.
    fn fetch_current_user(&self, token: &str) -> Result<GitHubAccount, HabitError>;
    /// List the first page of the account's repositories.
    fn list_repositories(&self, token: &str) -> Result<Vec<RemoteRepository>, HabitError>;
}

pub struct HttpGitHubApi {
    client: reqwest::blocking::Client,
    config: GitHubConfig,
}

impl HttpGitHubApi {
    pub fn new(config: GitHubConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("devhabit/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }
}

impl GitHubApi for HttpGitHubApi {
    fn exchange_code(&self, code: &str) -> Result<String, HabitError> {
        let url = format!("{}/login/oauth/access_token", self.config.oauth_base);
        let body = serde_json::json!({
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "code": code,
        });
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .map_err(|e| HabitError::ExternalServiceError(format!("token exchange: {}", e)))?;
        if !response.status().is_success() {
            return Err(HabitError::ExternalServiceError(format!(
                "token exchange returned {}",
                response.status()
            )));
        }
        let payload: HashMap<String, serde_json::Value> = response
            .json()
            .map_err(|e| HabitError::ExternalServiceError(format!("token exchange body: {}", e)))?;
        payload
            .get("access_token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                HabitError::ExternalServiceError(
                    "token exchange response had no access_token".to_string(),
                )
            })
    }

    fn fetch_current_user(&self, token: &str) -> Result<GitHubAccount, HabitError> {
        let url = format!("{}/user", self.config.api_base);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .map_err(|e| HabitError::ExternalServiceError(format!("user fetch: {}", e)))?;
        if !response.status().is_success() {
            return Err(HabitError::ExternalServiceError(format!(
                "user fetch returned {}",
                response.status()
            )));
        }
        response
            .json::<GitHubAccount>()
            .map_err(|e| HabitError::ExternalServiceError(format!("user fetch body: {}", e)))
    }

    fn list_repositories(&self, token: &str) -> Result<Vec<RemoteRepository>, HabitError> {
        let url = format!(
            "{}/user/repos?per_page={}&sort=updated",
            self.config.api_base, REPO_PAGE_SIZE
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .map_err(|e| HabitError::ExternalServiceError(format!("repo list: {}", e)))?;
        if !response.status().is_success() {
            return Err(HabitError::ExternalServiceError(format!(
                "repo list returned {}",
                response.status()
            )));
        }
        response
            .json::<Vec<RemoteRepository>>()
            .map_err(|e| HabitError::ExternalServiceError(format!("repo list body: {}", e)))
    }
}
