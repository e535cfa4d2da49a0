use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SandboxInvocation {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl SandboxInvocation {
    /// Text shown in the terminal pane for this result.
    pub fn terminal_text(&self) -> String {
        if self.success {
            format!("{}\n{}", self.stdout, self.stderr)
        } else {
            format!("Error (exit code {}):\n{}", self.exit_code, self.stderr)
        }
    }

    /// Permanent log line recorded for this result.
    pub fn log_text(&self) -> String {
        if self.success {
            format!("Command executed successfully:\n{}", self.stdout)
        } else {
            format!(
                "Command failed (exit code {}):\n{}",
                self.exit_code, self.stderr
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(success: bool, exit_code: i32) -> SandboxInvocation {
        SandboxInvocation {
            command: "ls".to_string(),
            exit_code,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            success,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn success_texts() {
        let ok = invocation(true, 0);
        assert_eq!(ok.terminal_text(), "out\nerr");
        assert_eq!(ok.log_text(), "Command executed successfully:\nout");
    }

    #[test]
    fn failure_texts_carry_exit_code() {
        let failed = invocation(false, 2);
        assert_eq!(failed.terminal_text(), "Error (exit code 2):\nerr");
        assert_eq!(failed.log_text(), "Command failed (exit code 2):\nerr");
    }
}
