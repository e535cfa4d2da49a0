use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cockpit_types::{AgentAction, AgentThought, LivenessSnapshot};

use crate::value_text;

pub const DEFAULT_RUN_OUTPUT: &str = "I've completed the task.";
pub const UNKNOWN_ERROR: &str = "Unknown error occurred";

#[derive(Debug, Clone, Serialize)]
pub struct RunAgentRequest {
    pub task: String,
    #[serde(rename = "additionalInfo", skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

/// Raw `/run-agent` body. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunAgentResponse {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub output: Option<Value>,
    pub result: Option<Value>,
    pub actions: Option<Value>,
    pub thoughts: Option<Value>,
    pub error: Option<Value>,
    pub success: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Success,
    BrowserAutomation,
    Sandbox,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPayload {
    pub output: String,
    /// `None` when the response carried no action list at all.
    pub actions: Option<Vec<ReportedAction>>,
    /// `None` when the response carried no thoughts at all.
    pub thoughts: Option<Vec<AgentThought>>,
}

/// A run response, classified once at the gateway so consumers never have to
/// re-interpret the raw shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Success(RunPayload),
    BrowserAutomation(RunPayload),
    Sandbox(RunPayload),
    Error { message: String, payload: RunPayload },
}

impl RunOutcome {
    pub fn kind(&self) -> RunKind {
        match self {
            RunOutcome::Success(_) => RunKind::Success,
            RunOutcome::BrowserAutomation(_) => RunKind::BrowserAutomation,
            RunOutcome::Sandbox(_) => RunKind::Sandbox,
            RunOutcome::Error { .. } => RunKind::Error,
        }
    }

    pub fn payload(&self) -> &RunPayload {
        match self {
            RunOutcome::Success(payload)
            | RunOutcome::BrowserAutomation(payload)
            | RunOutcome::Sandbox(payload)
            | RunOutcome::Error { payload, .. } => payload,
        }
    }

    pub fn into_payload(self) -> RunPayload {
        match self {
            RunOutcome::Success(payload)
            | RunOutcome::BrowserAutomation(payload)
            | RunOutcome::Sandbox(payload)
            | RunOutcome::Error { payload, .. } => payload,
        }
    }
}

impl RunAgentResponse {
    pub fn resolve(self) -> RunOutcome {
        let error = self
            .error
            .as_ref()
            .and_then(value_text)
            .filter(|e| !e.trim().is_empty());

        let output = self
            .output
            .as_ref()
            .and_then(value_text)
            .filter(|o| !o.is_empty())
            .or_else(|| {
                self.result
                    .as_ref()
                    .and_then(value_text)
                    .filter(|r| !r.is_empty())
            })
            .unwrap_or_else(|| DEFAULT_RUN_OUTPUT.to_string());

        let actions = self.actions.as_ref().map(|raw| match raw {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| ReportedAction::from_value(index, item))
                .collect(),
            _ => Vec::new(),
        });

        let thoughts = self.thoughts.as_ref().map(|raw| match raw {
            Value::Array(items) => items
                .iter()
                .filter_map(value_text)
                .map(AgentThought::new)
                .collect(),
            single => value_text(single)
                .map(AgentThought::new)
                .into_iter()
                .collect(),
        });

        let payload = RunPayload {
            output,
            actions,
            thoughts,
        };

        if error.is_some() || self.success == Some(false) {
            return RunOutcome::Error {
                message: error.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
                payload,
            };
        }

        match self.kind.as_deref() {
            Some("browser_automation") => RunOutcome::BrowserAutomation(payload),
            Some("sandbox") => RunOutcome::Sandbox(payload),
            _ => RunOutcome::Success(payload),
        }
    }
}

/// An action as reported inline by a run, before its status is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedAction {
    /// Position in the submitted batch.
    pub index: usize,
    pub id: Option<String>,
    pub name: String,
    pub params: Value,
    pub success: Option<bool>,
    pub error: Option<String>,
}

impl ReportedAction {
    pub fn from_value(index: usize, value: &Value) -> Self {
        if let Value::String(name) = value {
            return Self {
                index,
                id: None,
                name: name.clone(),
                params: Value::Null,
                success: None,
                error: None,
            };
        }

        let name = value
            .get("action")
            .or_else(|| value.get("name"))
            .and_then(value_text)
            .unwrap_or_else(|| "Unknown action".to_string());

        Self {
            index,
            id: value.get("id").and_then(value_text),
            name,
            params: value
                .get("params")
                .cloned()
                .unwrap_or_else(|| value.clone()),
            success: value.get("success").and_then(Value::as_bool),
            error: value
                .get("error")
                .and_then(value_text)
                .filter(|e| !e.trim().is_empty()),
        }
    }

    /// Terminal form using only what the run reported inline.
    pub fn inline(self) -> AgentAction {
        let success = self.success.unwrap_or(self.error.is_none());
        let error = self.error.clone();
        self.resolve(success, error)
    }

    pub fn resolve(self, success: bool, error: Option<String>) -> AgentAction {
        AgentAction {
            id: self.id,
            name: self.name,
            params: self.params,
            success,
            error: if success { None } else { error },
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionStatusResponse {
    #[serde(default)]
    pub success: bool,
    pub error: Option<Value>,
}

impl ActionStatusResponse {
    pub fn error_text(&self) -> Option<String> {
        self.error
            .as_ref()
            .and_then(value_text)
            .filter(|e| !e.trim().is_empty())
    }
}

/// Raw `/agent/status` body. The service reports `status` either as a plain
/// string or as its state object `{stop_requested, last_valid_state}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentStatusResponse {
    pub status: Option<Value>,
    pub agent_status: Option<Value>,
    #[serde(default)]
    pub browser_status: bool,
    #[serde(default)]
    pub sandbox_status: bool,
}

const IDLE: &str = "idle";

/// Status word for a liveness field. A state object contributes its
/// `last_valid_state` when that is a string.
fn status_text(value: Option<&Value>) -> String {
    let text = match value {
        Some(Value::Object(state)) => state
            .get("last_valid_state")
            .and_then(Value::as_str)
            .map(str::to_string),
        Some(other) => value_text(other),
        None => None,
    };
    text.filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| IDLE.to_string())
}

impl AgentStatusResponse {
    pub fn into_snapshot(self) -> LivenessSnapshot {
        LivenessSnapshot {
            status: status_text(self.status.as_ref()),
            agent_status: status_text(self.agent_status.as_ref()),
            browser_available: self.browser_status,
            sandbox_available: self.sandbox_status,
            fetched_at: Some(Utc::now()),
        }
    }
}
