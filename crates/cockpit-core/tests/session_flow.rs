mod support;

use serde_json::json;
use tokio::sync::broadcast;

use cockpit_core::{AgentSession, CockpitError, SessionEvent, BLANK_PREVIEW_URL, STOPPED_MESSAGE};
use cockpit_types::{ActivePanel, Role, RunStatus, PROCESSING_PLACEHOLDER};
use support::backend::{liveness, outcome, remote_error, ScriptedBackend};

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn placeholders_appended(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::MessageAppended(m) if m.placeholder))
        .count()
}

fn placeholders_removed(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::PlaceholderRemoved))
        .count()
}

fn statuses(events: &[SessionEvent]) -> Vec<RunStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StatusChanged { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

fn notification_titles(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Notification(n) => Some(n.title.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn successful_run_shows_and_clears_placeholder_once() {
    let backend = ScriptedBackend::new();
    backend.push_run(Ok(outcome(json!({ "output": "The first link is openai.com" }))));
    let session = AgentSession::new(backend.clone(), None);
    let mut rx = session.subscribe();

    let ticket = session.submit("find the first link", None).await.unwrap();
    ticket.finished().await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.status, RunStatus::Completed);
    let messages: Vec<_> = snapshot
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        messages,
        vec![
            (Role::User, "find the first link"),
            (Role::Assistant, "The first link is openai.com"),
        ]
    );

    let events = drain(&mut rx);
    assert_eq!(placeholders_appended(&events), 1);
    assert_eq!(placeholders_removed(&events), 1);
    let removed_at = events
        .iter()
        .position(|e| matches!(e, SessionEvent::PlaceholderRemoved))
        .unwrap();
    let reply_at = events
        .iter()
        .position(|e| matches!(e, SessionEvent::MessageAppended(m) if m.role == Role::Assistant))
        .unwrap();
    assert!(removed_at < reply_at);
    assert_eq!(
        statuses(&events),
        vec![RunStatus::Starting, RunStatus::Running, RunStatus::Completed]
    );
    assert_eq!(
        notification_titles(&events),
        vec!["Agent Starting".to_string(), "Task Completed".to_string()]
    );
}

#[tokio::test]
async fn conversation_starts_with_greeting() {
    let backend = ScriptedBackend::new();
    let session = AgentSession::new(backend, Some("Hello! What would you like me to do?"));

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.status, RunStatus::Idle);
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].role, Role::Assistant);
}

#[tokio::test]
async fn gateway_failure_appends_single_error_message() {
    let backend = ScriptedBackend::new();
    backend.push_run(Err(remote_error("run agent")));
    let session = AgentSession::new(backend.clone(), None);
    let mut rx = session.subscribe();

    session.submit("do something", None).await.unwrap().finished().await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.status, RunStatus::Failed);
    assert_eq!(snapshot.messages.len(), 2);
    let last = snapshot.messages.last().unwrap();
    assert_eq!(last.role, Role::System);
    assert_eq!(last.content, "Error: Failed to run agent: Internal Server Error");
    assert!(snapshot
        .messages
        .iter()
        .all(|m| m.content != PROCESSING_PLACEHOLDER));

    let events = drain(&mut rx);
    assert_eq!(placeholders_appended(&events), 1);
    assert_eq!(placeholders_removed(&events), 1);
    assert_eq!(
        notification_titles(&events),
        vec!["Agent Starting".to_string(), "Error".to_string()]
    );
}

#[tokio::test]
async fn reported_run_error_fails_the_run() {
    let backend = ScriptedBackend::new();
    backend.push_run(Ok(outcome(json!({
        "error": "LLM provider unavailable",
        "thoughts": ["tried the default provider"]
    }))));
    let session = AgentSession::new(backend.clone(), None);
    let mut rx = session.subscribe();

    session.submit("summarise the news", None).await.unwrap().finished().await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.status, RunStatus::Failed);
    assert_eq!(
        snapshot.messages.last().unwrap().content,
        "Error: LLM provider unavailable"
    );
    assert_eq!(snapshot.thoughts.len(), 1);
    assert!(notification_titles(&drain(&mut rx)).contains(&"Task Failed".to_string()));
}

#[tokio::test]
async fn blank_task_is_rejected_without_side_effects() {
    let backend = ScriptedBackend::new();
    let session = AgentSession::new(backend.clone(), None);
    let mut rx = session.subscribe();

    for task in ["", "   "] {
        let err = session.submit(task, None).await.unwrap_err();
        assert!(matches!(err, CockpitError::Validation(_)));
    }

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.status, RunStatus::Idle);
    assert!(snapshot.messages.is_empty());
    assert!(backend.calls().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn submit_while_running_is_rejected() {
    let backend = ScriptedBackend::new();
    let release = backend.push_gated_run(Ok(outcome(json!({ "output": "done" }))));
    let session = AgentSession::new(backend.clone(), None);

    let ticket = session.submit("long task", None).await.unwrap();
    assert_eq!(session.status().await, RunStatus::Running);

    let err = session.submit("another task", None).await.unwrap_err();
    assert_eq!(err, CockpitError::RunInProgress);

    release.send(()).unwrap();
    ticket.finished().await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.status, RunStatus::Completed);
    assert_eq!(backend.count("run_agent"), 1);
    assert!(snapshot.messages.iter().all(|m| m.content != "another task"));

    // Terminal states accept the next submission.
    backend.push_run(Ok(outcome(json!({ "output": "again" }))));
    session.submit("another task", None).await.unwrap().finished().await;
    assert_eq!(backend.count("run_agent"), 2);
}

#[tokio::test]
async fn stop_wins_over_late_response() {
    let backend = ScriptedBackend::new();
    let release = backend.push_gated_run(Ok(outcome(json!({
        "type": "browser_automation",
        "output": "late answer",
        "actions": [{ "action": "click" }]
    }))));
    let session = AgentSession::new(backend.clone(), None);
    let mut rx = session.subscribe();

    let ticket = session.submit("browse forever", None).await.unwrap();
    session.stop().await.unwrap();

    let stopped = session.snapshot().await;
    assert_eq!(stopped.status, RunStatus::Stopped);
    let messages: Vec<_> = stopped
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        messages,
        vec![(Role::User, "browse forever"), (Role::System, STOPPED_MESSAGE)]
    );

    let _ = release.send(());
    ticket.finished().await;

    assert_eq!(session.snapshot().await, stopped);
    assert_eq!(backend.count("stop_agent"), 1);

    let events = drain(&mut rx);
    assert_eq!(placeholders_appended(&events), 1);
    assert_eq!(placeholders_removed(&events), 1);
    assert_eq!(
        statuses(&events),
        vec![RunStatus::Starting, RunStatus::Running, RunStatus::Stopped]
    );
    assert!(notification_titles(&events).contains(&"Agent stopped".to_string()));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::ActionsReplaced(_))));
}

#[tokio::test]
async fn failed_remote_stop_still_stops_locally() {
    let backend = ScriptedBackend::new();
    let _release = backend.push_gated_run(Ok(outcome(json!({ "output": "never shown" }))));
    backend.fail_stop(remote_error("stop agent"));
    let session = AgentSession::new(backend.clone(), None);
    let mut rx = session.subscribe();

    let ticket = session.submit("task", None).await.unwrap();
    let err = session.stop().await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to stop agent: Internal Server Error");
    ticket.finished().await;

    assert_eq!(session.status().await, RunStatus::Stopped);
    let events = drain(&mut rx);
    let last_notification = events
        .iter()
        .rev()
        .find_map(|e| match e {
            SessionEvent::Notification(n) => Some(n.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_notification.title, "Error");

    let contents: Vec<_> = session
        .snapshot()
        .await
        .messages
        .into_iter()
        .map(|m| (m.role, m.content))
        .collect();
    assert_eq!(
        contents,
        vec![
            (Role::User, "task".to_string()),
            (Role::System, STOPPED_MESSAGE.to_string()),
            (
                Role::System,
                "Error: Failed to stop agent: Internal Server Error".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn stop_during_correlation_halts_lookups_and_discards_result() {
    let backend = ScriptedBackend::new();
    backend.push_run(Ok(outcome(json!({
        "type": "browser_automation",
        "output": "clicked",
        "actions": [
            { "id": "a1", "action": "navigate" },
            { "id": "a2", "action": "click" }
        ]
    }))));
    backend.set_action_status("a1", true, None);
    backend.set_action_status("a2", true, None);
    let release = backend.gate_action_status("a1");
    let session = AgentSession::new(backend.clone(), None);
    session.set_active_panel(ActivePanel::Sandbox).await;

    let ticket = session.submit("click it", None).await.unwrap();
    while backend.count("action_status:a1") == 0 {
        tokio::task::yield_now().await;
    }

    session.stop().await.unwrap();
    let stopped = session.snapshot().await;
    assert_eq!(stopped.status, RunStatus::Stopped);

    // The pending lookup was abandoned on stop, so its gate may already be gone.
    let _ = release.send(());
    ticket.finished().await;

    assert_eq!(backend.count("action_status:a2"), 0);
    let after = session.snapshot().await;
    assert_eq!(after, stopped);
    assert!(after.actions.is_empty());
    assert_eq!(after.active_panel, ActivePanel::Sandbox);
    assert_eq!(after.messages.last().unwrap().content, STOPPED_MESSAGE);
}

#[tokio::test]
async fn stop_without_active_run_only_calls_service() {
    let backend = ScriptedBackend::new();
    let session = AgentSession::new(backend.clone(), None);

    session.stop().await.unwrap();

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.status, RunStatus::Idle);
    assert!(snapshot.messages.is_empty());
    assert_eq!(backend.calls(), vec!["stop_agent".to_string()]);
}

#[tokio::test]
async fn browser_automation_run_fills_feeds_and_shows_browser() {
    let backend = ScriptedBackend::new();
    backend.push_run(Ok(outcome(json!({
        "type": "browser_automation",
        "output": "Searched for rust",
        "actions": [
            { "id": "a1", "action": "navigate", "params": { "url": "https://google.com" } },
            { "id": "a2", "action": "type", "params": { "text": "rust" } }
        ],
        "thoughts": ["open the search page", "type the query"]
    }))));
    backend.set_action_status("a1", true, None);
    backend.set_action_status("a2", true, None);
    let session = AgentSession::new(backend.clone(), None);
    session.set_active_panel(ActivePanel::Sandbox).await;
    session.set_browser_visible(false).await;

    session.submit("search for rust", None).await.unwrap().finished().await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.status, RunStatus::Completed);
    assert_eq!(
        backend.calls(),
        vec![
            "run_agent".to_string(),
            "action_status:a1".to_string(),
            "action_status:a2".to_string(),
        ]
    );
    let names: Vec<_> = snapshot.actions.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["navigate", "type"]);
    assert!(snapshot.actions.iter().all(|a| a.success));
    assert_eq!(snapshot.actions[0].params, json!({ "url": "https://google.com" }));
    assert_eq!(snapshot.thoughts.len(), 2);
    assert_eq!(snapshot.active_panel, ActivePanel::Browser);
    assert!(snapshot.visibility.browser);
}

#[tokio::test]
async fn failed_action_fails_run_and_skips_later_lookups() {
    let backend = ScriptedBackend::new();
    backend.push_run(Ok(outcome(json!({
        "type": "browser_automation",
        "output": "partially done",
        "actions": [
            { "id": "a1", "action": "navigate" },
            { "id": "a2", "action": "click" },
            { "id": "a3", "action": "type" }
        ]
    }))));
    backend.set_action_status("a1", true, None);
    backend.set_action_status("a2", false, Some("element not found"));
    backend.set_action_status("a3", true, None);
    let session = AgentSession::new(backend.clone(), None);
    session.set_active_panel(ActivePanel::Sandbox).await;

    session.submit("click the button", None).await.unwrap().finished().await;

    assert_eq!(backend.count("action_status:a3"), 0);
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.status, RunStatus::Failed);
    let last = snapshot.messages.last().unwrap();
    assert_eq!(last.role, Role::System);
    assert_eq!(last.content, "Error: Browser automation failed at click: element not found");

    let outcomes: Vec<_> = snapshot.actions.iter().map(|a| a.success).collect();
    assert_eq!(outcomes, vec![true, false, true]);
    assert_eq!(snapshot.actions[1].error.as_deref(), Some("element not found"));
    assert_eq!(snapshot.active_panel, ActivePanel::Sandbox);
}

#[tokio::test]
async fn sandbox_run_switches_to_terminal() {
    let backend = ScriptedBackend::new();
    backend.push_run(Ok(outcome(json!({
        "type": "sandbox",
        "output": "README.md\nsrc"
    }))));
    let session = AgentSession::new(backend.clone(), None);

    session.submit("list the files", None).await.unwrap().finished().await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.active_panel, ActivePanel::Sandbox);
    assert_eq!(snapshot.command_output, "README.md\nsrc");
    assert_eq!(snapshot.messages.last().unwrap().content, "README.md\nsrc");
}

#[tokio::test]
async fn feeds_are_replaced_only_when_a_result_carries_them() {
    let backend = ScriptedBackend::new();
    backend.push_run(Ok(outcome(json!({
        "output": "first",
        "actions": [{ "action": "scroll" }, { "action": "click" }],
        "thoughts": "look around"
    }))));
    backend.push_run(Ok(outcome(json!({ "output": "second" }))));
    backend.push_run(Ok(outcome(json!({
        "output": "third",
        "actions": [{ "action": "navigate" }]
    }))));
    let session = AgentSession::new(backend.clone(), None);

    session.submit("one", None).await.unwrap().finished().await;
    let first = session.snapshot().await;
    assert_eq!(first.actions.len(), 2);
    assert_eq!(first.thoughts.len(), 1);

    session.submit("two", None).await.unwrap().finished().await;
    let second = session.snapshot().await;
    assert_eq!(second.actions, first.actions);
    assert_eq!(second.thoughts, first.thoughts);

    session.submit("three", None).await.unwrap().finished().await;
    let third = session.snapshot().await;
    assert_eq!(third.actions.len(), 1);
    assert_eq!(third.actions[0].name, "navigate");
    assert_eq!(third.thoughts, first.thoughts);
}

#[tokio::test]
async fn additional_info_is_forwarded_when_present() {
    let backend = ScriptedBackend::new();
    backend.push_run(Ok(outcome(json!({}))));
    backend.push_run(Ok(outcome(json!({}))));
    let session = AgentSession::new(backend.clone(), None);

    session
        .submit("  book a table  ", Some("for two people".to_string()))
        .await
        .unwrap()
        .finished()
        .await;
    session
        .submit("check the weather", Some("  ".to_string()))
        .await
        .unwrap()
        .finished()
        .await;

    let requests = backend.run_requests();
    assert_eq!(requests[0].task, "book a table");
    assert_eq!(requests[0].additional_info.as_deref(), Some("for two people"));
    assert!(requests[1].additional_info.is_none());
    assert_eq!(
        session.snapshot().await.messages.last().unwrap().content,
        "I've completed the task."
    );
}

#[tokio::test]
async fn preview_is_live_only_while_running_with_browser() {
    let backend = ScriptedBackend::new();
    let release = backend.push_gated_run(Ok(outcome(json!({ "output": "done" }))));
    let session = AgentSession::new(backend.clone(), None);
    let live = liveness("running", true, true);
    let no_browser = liveness("running", false, true);

    let ticket = session.submit("watch the page", None).await.unwrap();
    let running = session.snapshot().await;
    assert!(running.browser_is_live(&live));
    assert_eq!(
        running.preview_url(&live, "http://localhost:6080"),
        "http://localhost:6080"
    );
    assert_eq!(
        running.preview_url(&no_browser, "http://localhost:6080"),
        BLANK_PREVIEW_URL
    );

    release.send(()).unwrap();
    ticket.finished().await;

    let done = session.snapshot().await;
    assert!(!done.browser_is_live(&live));
    assert_eq!(done.preview_url(&live, "http://localhost:6080"), BLANK_PREVIEW_URL);
}
