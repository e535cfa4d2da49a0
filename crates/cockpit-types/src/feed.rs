use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One browser-automation step reported by a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AgentAction {
    pub fn summary(&self) -> String {
        if self.success {
            format!("Browser Action: {} - Success", self.name)
        } else {
            format!(
                "Browser Action: {} - Failed: {}",
                self.name,
                self.error.as_deref().unwrap_or("Unknown error")
            )
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AgentThought {
    pub text: String,
}

impl AgentThought {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
