use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::TraceTiming;

pub const DEFAULT_GREETING: &str =
    "Hello. I am MindMoney. I am here to optimize your financial life. How can I help you today?";

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_step_delay_ms() -> u64 {
    400
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl AnimationConfig {
    pub fn timing(&self) -> TraceTiming {
        TraceTiming::new(
            Duration::from_millis(self.step_delay_ms),
            Duration::from_millis(self.settle_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Seeded as the first assistant turn. Empty disables it.
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MindMoneyConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl MindMoneyConfig {
    /// Relative data dirs are resolved against the config root.
    pub fn data_dir(&self, root: &Path) -> PathBuf {
        if self.storage.data_dir.is_absolute() {
            self.storage.data_dir.clone()
        } else {
            root.join(&self.storage.data_dir)
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.auth.user_id.as_deref()
    }
}

/// Expands every `${VAR}` in `raw` from the environment. Unset variables
/// expand to nothing; an unterminated `${` is kept as written.
pub fn expand_env_placeholders(raw: &str) -> String {
    let mut expanded = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some((literal, tail)) = rest.split_once("${") {
        expanded.push_str(literal);
        match tail.split_once('}') {
            Some((name, after)) => {
                if let Ok(value) = std::env::var(name) {
                    expanded.push_str(&value);
                }
                rest = after;
            }
            None => {
                expanded.push_str("${");
                rest = tail;
                break;
            }
        }
    }
    expanded.push_str(rest);
    expanded
}

/// Loads `<root>/config/main.yaml`. A missing file yields the defaults.
pub fn load_config(root: &Path) -> Result<MindMoneyConfig> {
    let path = root.join("config").join("main.yaml");
    let mut config: MindMoneyConfig = if path.exists() {
        read_yaml_file(&path)?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        MindMoneyConfig::default()
    };

    resolve_config_env(&mut config);
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &MindMoneyConfig) -> Result<()> {
    let base_url = config.backend.base_url.trim();
    if base_url.is_empty() {
        return Err(anyhow!("backend.base_url must not be empty"));
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(anyhow!(
            "backend.base_url must use http or https: {base_url}"
        ));
    }
    if config.backend.request_timeout_secs == 0 {
        return Err(anyhow!("backend.request_timeout_secs must be greater than 0"));
    }
    Ok(())
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

fn resolve_config_env(config: &mut MindMoneyConfig) {
    config.backend.base_url = expand_env_placeholders(&config.backend.base_url);
    config.chat.greeting = expand_env_placeholders(&config.chat.greeting);

    // An unset `${VAR}` leaves an empty string, which means "signed out".
    config.auth.user_id = config
        .auth
        .user_id
        .take()
        .map(|raw| expand_env_placeholders(&raw).trim().to_string())
        .filter(|id| !id.is_empty());
}
