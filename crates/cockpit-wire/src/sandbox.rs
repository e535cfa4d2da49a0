use chrono::Utc;
use serde::{Deserialize, Serialize};

use cockpit_types::SandboxInvocation;

#[derive(Debug, Clone, Serialize)]
pub struct SandboxExecuteRequest {
    pub command: String,
    /// Seconds; forwarded to the service untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SandboxExecuteResponse {
    pub success: Option<bool>,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Older services report stdout under `output`.
    pub output: Option<String>,
}

impl SandboxExecuteResponse {
    pub fn into_invocation(self, command: &str) -> SandboxInvocation {
        let success = self.success.unwrap_or(self.exit_code == 0);
        let stdout = if self.stdout.is_empty() {
            self.output.unwrap_or_default()
        } else {
            self.stdout
        };
        SandboxInvocation {
            command: command.to_string(),
            exit_code: self.exit_code,
            stdout,
            stderr: self.stderr,
            success,
            timestamp: Utc::now(),
        }
    }
}
