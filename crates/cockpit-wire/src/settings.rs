use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSection {
    Llm,
    Browser,
    Sandbox,
}

impl SettingsSection {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingsSection::Llm => "llm",
            SettingsSection::Browser => "browser",
            SettingsSection::Sandbox => "sandbox",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSettings {
    pub enabled: bool,
    pub user: String,
    /// Seconds
    pub timeout: u64,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            user: "sandbox".to_string(),
            timeout: 300,
        }
    }
}

/// GET bodies come back either wrapped as `{"settings": …}` or bare.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SettingsEnvelope<T> {
    Wrapped { settings: T },
    Bare(T),
}

impl<T> SettingsEnvelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            SettingsEnvelope::Wrapped { settings } | SettingsEnvelope::Bare(settings) => settings,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SettingsAck {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}
