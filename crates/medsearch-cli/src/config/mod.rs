//! Configuration loading for medsearch.
//! Reads medsearch.toml from the current directory or the path in MEDSEARCH_CONFIG.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use medsearch_api::{ApiEndpoints, ApiKeys, HttpApi, IdentityProvider, StaticIdentity};
use medsearch_session::PollConfig;
use medsearch_sources::SourceType;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub search_url: String,
    pub threads_url: String,
    pub library_url: String,
    pub chat_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub extra_allowed_hosts: Vec<String>,
    #[serde(default)]
    pub keys: ApiKeysConfig,
}

fn default_timeout_secs() -> u64 { 30 }

/// Plain strings here; they become `SecretString`s in [`ApiKeysConfig::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiKeysConfig {
    pub search: Option<String>,
    pub threads: Option<String>,
    pub library: Option<String>,
    pub chat: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    #[serde(default)]
    pub user_uid: String,
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval_secs() -> u64 { 10 }
fn default_max_attempts()  -> u32 { 30 }

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_secs: default_interval_secs(), max_attempts: default_max_attempts() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub default_source_type: SourceType,
    #[serde(default = "default_max_sources")]
    pub max_sources: u32,
}

fn default_max_sources() -> u32 { 10 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_source_type: SourceType::default(), max_sources: default_max_sources() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub path: String,
}

fn default_session_path() -> String { "./workspace/session.json".to_string() }

impl Default for SessionConfig {
    fn default() -> Self {
        Self { path: default_session_path() }
    }
}


impl Config {
    /// Load configuration from medsearch.toml.
    /// Checks MEDSEARCH_CONFIG env var first, then current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("MEDSEARCH_CONFIG")
            .unwrap_or_else(|_| "medsearch.toml".to_string());
        if !Path::new(&path).exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy medsearch.example.toml to medsearch.toml and edit it.",
                path
            );
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Identity values may come from the environment instead of the file.
    fn apply_env_overrides(&mut self) {
        if self.identity.user_uid.trim().is_empty() {
            if let Ok(uid) = std::env::var("MEDSEARCH_USER_UID") {
                self.identity.user_uid = uid;
            }
        }
        if self.identity.id_token.is_none() {
            self.identity.id_token = std::env::var("MEDSEARCH_ID_TOKEN").ok().filter(|t| !t.is_empty());
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.polling.interval_secs),
            max_attempts: self.polling.max_attempts,
        }
    }

    pub fn endpoints(&self) -> ApiEndpoints {
        ApiEndpoints {
            search_url: self.api.search_url.clone(),
            threads_url: self.api.threads_url.clone(),
            library_url: self.api.library_url.clone(),
            chat_url: self.api.chat_url.clone(),
        }
    }

    pub fn identity(&self) -> Arc<dyn IdentityProvider> {
        Arc::new(StaticIdentity::new(
            self.identity.user_uid.clone(),
            self.identity.id_token.clone(),
        ))
    }

    /// Build the gateway client with the configured hosts allowlisted.
    pub fn build_api(&self, identity: Arc<dyn IdentityProvider>) -> anyhow::Result<HttpApi> {
        let mut api = HttpApi::new(
            self.endpoints(),
            self.api.keys.resolve(),
            identity,
            Duration::from_secs(self.api.timeout_secs),
        )?;
        for host in &self.api.extra_allowed_hosts {
            api.sandbox_mut().allow_domain(host);
        }
        Ok(api)
    }
}

impl ApiKeysConfig {
    /// Each key falls back to MEDSEARCH_<NAME>_API_KEY when not set in the file.
    pub fn resolve(&self) -> ApiKeys {
        ApiKeys {
            search: resolve_key(&self.search, "SEARCH"),
            threads: resolve_key(&self.threads, "THREADS"),
            library: resolve_key(&self.library, "LIBRARY"),
            chat: resolve_key(&self.chat, "CHAT"),
        }
    }
}

fn resolve_key(configured: &Option<String>, name: &str) -> SecretString {
    let var = format!("MEDSEARCH_{name}_API_KEY");
    let key = configured
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var(&var).ok())
        .unwrap_or_default();
    if key.is_empty() {
        tracing::warn!("No API key found for the {} gateway (set api.keys or {})", name.to_lowercase(), var);
    }
    SecretString::from(key)
}
