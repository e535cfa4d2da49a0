//! Cockpit configuration.
//!
//! Loaded in priority order: `COCKPIT_*` environment variables > JSON config
//! file > built-in defaults. A missing file is not an error; a malformed one
//! is.

use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{CockpitError, Result};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:7788/api";
pub const DEFAULT_BROWSER_PREVIEW_URL: &str = "http://localhost:6080";
pub const DEFAULT_GREETING: &str = "Hello! I am your autonomous AI agent. I can help with browsing, creating documents, writing code, executing commands and much more. What would you like me to do?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CockpitConfig {
    /// Base URL of the agent service API, without a trailing slash.
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Live browser view shown while a run is active.
    pub browser_preview_url: String,
    /// Forwarded to the service with every sandbox command when set.
    pub sandbox_timeout_secs: Option<u64>,
    /// Assistant message seeded into a fresh conversation.
    pub greeting: Option<String>,
    /// Run a throwaway command on activation so the sandbox is ready.
    pub warm_sandbox: bool,
}

impl Default for CockpitConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 300,
            poll_interval_ms: 3_000,
            browser_preview_url: DEFAULT_BROWSER_PREVIEW_URL.to_string(),
            sandbox_timeout_secs: None,
            greeting: Some(DEFAULT_GREETING.to_string()),
            warm_sandbox: true,
        }
    }
}

impl CockpitConfig {
    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` (when given and present), then applies environment
    /// overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => read_json_file(path).await?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("COCKPIT_API_URL") {
            self.api_base_url = url;
        }
        if let Some(raw) = var("COCKPIT_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("COCKPIT_REQUEST_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = var("COCKPIT_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_number("COCKPIT_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(url) = var("COCKPIT_BROWSER_PREVIEW_URL") {
            self.browser_preview_url = url;
        }
        if let Some(raw) = var("COCKPIT_SANDBOX_TIMEOUT_SECS") {
            self.sandbox_timeout_secs =
                Some(parse_number("COCKPIT_SANDBOX_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = var("COCKPIT_WARM_SANDBOX") {
            self.warm_sandbox = parse_bool_like(&raw).ok_or_else(|| {
                CockpitError::Config(format!("COCKPIT_WARM_SANDBOX is not a boolean: {raw}"))
            })?;
        }
        Ok(())
    }

    /// Checks URLs and intervals and normalises the base URL.
    pub fn validate(&mut self) -> Result<()> {
        self.api_base_url = normalize_http_url("api_base_url", &self.api_base_url)?;
        self.browser_preview_url =
            normalize_http_url("browser_preview_url", &self.browser_preview_url)?;
        if self.request_timeout_secs == 0 {
            return Err(CockpitError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(CockpitError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

async fn read_json_file(path: &Path) -> Result<CockpitConfig> {
    if !path.exists() {
        return Ok(CockpitConfig::default());
    }
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        CockpitError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| CockpitError::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

fn normalize_http_url(field: &str, raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|e| CockpitError::Config(format!("{field} is not a valid URL ({raw}): {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CockpitError::Config(format!(
            "{field} must use http or https, got {}",
            url.scheme()
        )));
    }
    Ok(trimmed.to_string())
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| CockpitError::Config(format!("{key} is not a number: {raw}")))
}

fn parse_bool_like(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
