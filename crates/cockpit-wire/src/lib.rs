//! JSON models for the agent service's HTTP API.
//!
//! | Operation        | Path                              |
//! |------------------|-----------------------------------|
//! | Submit run       | `POST /run-agent`                 |
//! | Action status    | `GET  /browser/action-status/{id}`|
//! | Stop run         | `POST /agent/stop`                |
//! | Liveness         | `GET  /agent/status`              |
//! | Sandbox execute  | `POST /sandbox/execute`           |
//! | Settings         | `GET/POST /settings/{section}`    |
//!
//! Responses are loosely shaped on the wire; the `resolve`/`into_*` helpers
//! turn them into the typed values the coordinator works with.

pub mod agent;
pub mod sandbox;
pub mod settings;

pub use agent::*;
pub use sandbox::*;
pub use settings::*;

/// Text form of a loosely typed JSON field. Strings are taken verbatim,
/// `null` is absent, anything else is rendered as JSON.
pub(crate) fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
