use cockpit_core::{SandboxEvent, SessionEvent};
use cockpit_types::{LivenessSnapshot, Message, Notification, NotificationLevel, Role};

pub fn session_event(event: &SessionEvent) {
    match event {
        SessionEvent::MessageAppended(message) => print_message(message),
        SessionEvent::ActionsReplaced(actions) => {
            for (index, action) in actions.iter().enumerate() {
                println!("  action {}: {}", index + 1, action.summary());
            }
        }
        SessionEvent::ThoughtsReplaced(thoughts) => {
            for thought in thoughts {
                println!("  thought: {}", thought.text);
            }
        }
        SessionEvent::CommandOutput(output) => {
            println!("--- command output ---");
            println!("{}", output.trim_end());
        }
        SessionEvent::Notification(notification) => print_notification(notification),
        SessionEvent::StatusChanged { status, .. } => {
            tracing::debug!(status = status.as_str(), "session status changed");
        }
        SessionEvent::PanelSwitched(panel) => {
            tracing::debug!(?panel, "active panel switched");
        }
        SessionEvent::PlaceholderRemoved | SessionEvent::VisibilityChanged(_) => {}
    }
}

pub fn sandbox_event(event: &SandboxEvent) {
    if let SandboxEvent::Notification { notification, .. } = event {
        print_notification(notification);
    }
}

pub fn print_message(message: &Message) {
    if message.placeholder {
        println!("... {}", message.content);
        return;
    }
    let role = match message.role {
        Role::User => "you",
        Role::Assistant => "agent",
        Role::System => "system",
    };
    println!("[{role}] {}", message.content);
}

pub fn print_notification(notification: &Notification) {
    let marker = match notification.level {
        NotificationLevel::Info => "info",
        NotificationLevel::Success => "ok",
        NotificationLevel::Error => "error",
    };
    eprintln!(
        "({marker}) {}: {}",
        notification.title, notification.description
    );
}

pub fn liveness(snapshot: &LivenessSnapshot) {
    let flag = |up: bool| if up { "available" } else { "unavailable" };
    println!(
        "agent: {} ({})  browser: {}  sandbox: {}",
        snapshot.status,
        snapshot.agent_status,
        flag(snapshot.browser_available),
        flag(snapshot.sandbox_available)
    );
}
