use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Level;

use cockpit_observability::{emit_event, ObservabilityEvent, ProcessKind};
use cockpit_types::{AgentAction, RunId};
use cockpit_wire::ReportedAction;

use crate::error::{CockpitError, Result};
use crate::gateway::AgentBackend;

const UNKNOWN_ACTION_ERROR: &str = "Unknown error";

/// Confirms the terminal status of each browser action a run reported.
///
/// Lookups are strictly sequential in submission order. The first failure
/// ends correlation and later actions are never looked up.
#[derive(Clone)]
pub struct ActionCorrelator {
    backend: Arc<dyn AgentBackend>,
}

impl ActionCorrelator {
    pub fn new(backend: Arc<dyn AgentBackend>) -> Self {
        Self { backend }
    }

    pub async fn correlate(
        &self,
        run_id: RunId,
        actions: Vec<ReportedAction>,
        cancel: &CancellationToken,
    ) -> Result<Vec<AgentAction>> {
        let run_ref = run_id.to_string();
        let mut resolved = Vec::with_capacity(actions.len());

        for action in actions {
            if cancel.is_cancelled() {
                return Err(CockpitError::Cancelled);
            }

            let Some(action_id) = action.id.clone() else {
                // Nothing to poll; trust what the run reported.
                let inline = action.clone().inline();
                if !inline.success {
                    return Err(browser_failure(
                        &run_ref,
                        &action,
                        inline.error.as_deref().unwrap_or(UNKNOWN_ACTION_ERROR),
                    ));
                }
                resolved.push(inline);
                continue;
            };

            let lookup = tokio::select! {
                _ = cancel.cancelled() => return Err(CockpitError::Cancelled),
                lookup = self.backend.action_status(&action_id) => lookup,
            };

            let status = match lookup {
                Ok(status) => status,
                Err(err) => return Err(browser_failure(&run_ref, &action, &err.to_string())),
            };

            if !status.success {
                let message = status
                    .error_text()
                    .unwrap_or_else(|| UNKNOWN_ACTION_ERROR.to_string());
                return Err(browser_failure(&run_ref, &action, &message));
            }

            tracing::debug!(run_id = %run_id, action_id = %action_id, "browser action confirmed");
            resolved.push(action.resolve(true, None));
        }

        Ok(resolved)
    }
}

/// Feed shown after correlation failed at `failed_index`: earlier actions
/// were confirmed, the failing one carries the error, later ones keep what the
/// run reported inline.
pub fn failed_feed(
    actions: Vec<ReportedAction>,
    failed_index: usize,
    message: &str,
) -> Vec<AgentAction> {
    actions
        .into_iter()
        .map(|action| {
            if action.index < failed_index {
                action.resolve(true, None)
            } else if action.index == failed_index {
                action.resolve(false, Some(message.to_string()))
            } else {
                action.inline()
            }
        })
        .collect()
}

fn browser_failure(run_ref: &str, action: &ReportedAction, message: &str) -> CockpitError {
    emit_event(
        Level::WARN,
        ProcessKind::Core,
        ObservabilityEvent {
            event: "correlation.action.failed",
            component: "correlator",
            run_id: Some(run_ref),
            action_id: action.id.as_deref(),
            status: Some("failed"),
            error_code: Some("browser_automation"),
            detail: Some(message),
            ..Default::default()
        },
    );
    CockpitError::BrowserAutomation {
        index: action.index,
        action: action.name.clone(),
        message: message.to_string(),
    }
}
