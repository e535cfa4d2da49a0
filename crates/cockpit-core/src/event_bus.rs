use tokio::sync::broadcast;

use cockpit_types::{
    ActivePanel, AgentAction, AgentThought, Message, Notification, PanelVisibility, RunId,
    RunStatus, SandboxInvocation,
};

use crate::sandbox::SandboxSlot;

/// Changes published by the agent session, in the order they were applied.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged {
        run_id: Option<RunId>,
        status: RunStatus,
    },
    MessageAppended(Message),
    PlaceholderRemoved,
    ActionsReplaced(Vec<AgentAction>),
    ThoughtsReplaced(Vec<AgentThought>),
    PanelSwitched(ActivePanel),
    VisibilityChanged(PanelVisibility),
    CommandOutput(String),
    Notification(Notification),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SandboxEvent {
    Started {
        slot: SandboxSlot,
        seq: u64,
        command: String,
    },
    Finished {
        slot: SandboxSlot,
        seq: u64,
        invocation: SandboxInvocation,
    },
    Failed {
        slot: SandboxSlot,
        seq: u64,
        error: String,
    },
    OutputChanged {
        slot: SandboxSlot,
        output: String,
    },
    /// `slot` is `None` for cockpit-wide sandbox notices such as warm-up.
    Notification {
        slot: Option<SandboxSlot>,
        notification: Notification,
    },
}

#[derive(Clone)]
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: E) {
        let _ = self.tx.send(event);
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
