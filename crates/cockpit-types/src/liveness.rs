use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time readiness of the remote subsystems. Always replaced as a
/// whole, never patched field by field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LivenessSnapshot {
    pub status: String,
    pub agent_status: String,
    pub browser_available: bool,
    pub sandbox_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl LivenessSnapshot {
    /// State shown before the first successful poll.
    pub fn unknown() -> Self {
        Self {
            status: "idle".to_string(),
            agent_status: "idle".to_string(),
            browser_available: false,
            sandbox_available: false,
            fetched_at: None,
        }
    }

    pub fn agent_running(&self) -> bool {
        self.status == "running"
    }
}

impl Default for LivenessSnapshot {
    fn default() -> Self {
        Self::unknown()
    }
}
