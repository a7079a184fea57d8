//! Cross-session behavior: invoked children, routing and spawned sessions.

use serde_json::json;
use statecharts::builder::{
    done_invoke, final_state, invoke_machine, invoke_service, state, transition, Document,
};
use statecharts::content::{assign, log, script, send, Hooks, Lens, LogEntry, SendAction};
use statecharts::core::{Event, ERROR_EXECUTION};
use statecharts::session::{
    EventSender, ExternalService, InvokeError, InvokeStatus, Registry, ServiceRequest, Session,
    SessionConfig, SessionStatus,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout};

#[derive(Default, Debug, Clone, PartialEq)]
struct Data {
    count: i64,
}

fn count() -> Lens<Data, i64> {
    Lens::new(|d: &Data| d.count, |d: &mut Data, v| d.count = v)
}

/// Process external events until `done` holds.
async fn drive_until<F>(session: &mut Session<Data>, done: F)
where
    F: Fn(&Session<Data>) -> bool,
{
    let result = timeout(Duration::from_secs(5), async {
        while !done(session) {
            assert!(session.is_running(), "session stopped: {:?}", session.status());
            session.process_next().await.unwrap();
        }
    })
    .await;
    assert!(result.is_ok(), "timed out in {:?}", session.configuration());
}

async fn eventually<F: Fn() -> bool>(check: F) {
    let result = timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition never held");
}

/// Child that moves to `next` on NEXT and tells its parent about it.
fn stepping_child() -> Arc<Document<Data>> {
    Arc::new(
        Document::from_states(vec![
            state("childInit").transition(transition("NEXT").to("next")),
            state("next").on_entry([send(SendAction::new("CHILD_MOVED").to("_parent"))]),
        ])
        .unwrap(),
    )
}

/// Child that finishes on NEXT.
fn finishing_child() -> Arc<Document<Data>> {
    Arc::new(
        Document::from_states(vec![
            state("childInit").transition(transition("NEXT").to("done")),
            final_state("done").done_data(json!({ "result": 5 })),
        ])
        .unwrap(),
    )
}

fn started(doc: Document<Data>, registry: Registry<Data>) -> Session<Data> {
    let mut session =
        Session::with_config(doc, SessionConfig::new("parent"), registry).unwrap();
    session.start(Data::default()).unwrap();
    session
}

#[tokio::test]
async fn invokes_child_on_entry() {
    let doc = Document::from_states(vec![state("init")
        .invoke(invoke_machine("child", stepping_child()))])
    .unwrap();

    let session = started(doc, Registry::new());

    assert_eq!(session.configuration(), vec!["init"]);
    assert_eq!(session.invoke_status("child"), Some(InvokeStatus::Invoked));
}

#[tokio::test]
async fn invoke_has_no_status_until_owning_state_is_entered() {
    let doc = Document::from_states(vec![
        state("init").transition(transition("GO").to("owner")),
        state("owner").invoke(invoke_machine("child", stepping_child())),
    ])
    .unwrap();
    let mut session = started(doc, Registry::new());

    assert_eq!(session.invoke_status("child"), None);

    session.send(Event::new("GO")).unwrap();
    session.run_pending().unwrap();
    assert_eq!(session.invoke_status("child"), Some(InvokeStatus::Invoked));
}

#[tokio::test]
async fn sends_event_to_invoked_child() {
    let doc = Document::from_states(vec![
        state("init")
            .invoke(invoke_machine("child", stepping_child()))
            .transition(transition("NEXT").to("next"))
            .transition(transition("CHILD_MOVED").to("observed")),
        state("next"),
        state("observed"),
    ])
    .unwrap();
    let mut session = started(doc, Registry::new());

    session.send_to(Event::new("NEXT"), "child").unwrap();
    drive_until(&mut session, |s| s.is_active("observed")).await;

    assert_eq!(session.configuration(), vec!["observed"]);
}

#[tokio::test]
async fn cancels_child_when_owning_state_exits() {
    let exits = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorder = Arc::clone(&exits);
    let hooks = Hooks::new().script("record-exit", move |_: &Data, _: &Event| {
        recorder.lock().unwrap().push("childInit".to_string());
        Ok(())
    });
    let child = Arc::new(
        Document::from_states(vec![state("childInit").on_exit([script("record-exit")])]).unwrap(),
    );
    let doc = Document::from_states(vec![
        state("init")
            .invoke(invoke_machine("child", child))
            .transition(transition("NEXT").to("next")),
        state("next"),
    ])
    .unwrap();
    let mut session = started(doc, Registry::new().with_hooks(hooks));

    session.send(Event::new("NEXT")).unwrap();
    session.run_pending().unwrap();

    assert_eq!(session.configuration(), vec!["next"]);
    assert_eq!(session.invoke_status("child"), None);
    eventually(|| exits.lock().unwrap().len() == 1).await;
}

#[tokio::test]
async fn child_completion_arrives_as_done_invoke() {
    let doc = Document::from_states(vec![
        state("init")
            .invoke(invoke_machine("child", finishing_child()))
            .transition(done_invoke("child").to("next").action([assign(
                "count",
                count(),
                |_, e: &Event| e.data["result"].as_i64().unwrap_or_default(),
            )])),
        state("next"),
    ])
    .unwrap();
    let mut session = started(doc, Registry::new());

    session.send_to(Event::new("NEXT"), "child").unwrap();
    drive_until(&mut session, |s| s.is_active("next")).await;

    assert_eq!(session.configuration(), vec!["next"]);
    assert_eq!(session.with_data(|d| d.count), 5);
}

#[tokio::test]
async fn autoforwards_external_events() {
    let doc = Document::from_states(vec![
        state("init")
            .invoke(invoke_machine("child", stepping_child()).autoforward())
            .transition(transition("CHILD_MOVED").to("observed")),
        state("observed"),
    ])
    .unwrap();
    let mut session = started(doc, Registry::new());

    session.send(Event::new("NEXT")).unwrap();
    drive_until(&mut session, |s| s.is_active("observed")).await;

    assert_eq!(session.configuration(), vec!["observed"]);
}

#[tokio::test]
async fn finalize_runs_before_parent_selects() {
    let output = Arc::new(Mutex::new(Vec::<LogEntry>::new()));
    let sink = Arc::clone(&output);
    let hooks =
        Hooks::new().log_sink(move |entry: &LogEntry| sink.lock().unwrap().push(entry.clone()));
    let doc = Document::from_states(vec![
        state("init")
            .invoke(
                invoke_machine("child", finishing_child())
                    .finalize([log("finalizing invoke child")]),
            )
            .transition(done_invoke("child").to("next")),
        state("next"),
    ])
    .unwrap();
    let mut session = started(doc, Registry::new().with_hooks(hooks));

    session.send_to(Event::new("NEXT"), "child").unwrap();
    drive_until(&mut session, |s| s.is_active("next")).await;

    let output = output.lock().unwrap();
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].label.as_deref(), Some("finalizing invoke child"));
}

#[tokio::test]
async fn finalize_updates_child_data_and_leaves_parent_alone() {
    let worker = Arc::new(
        Document::from_states(vec![state("working")
            .transition(
                transition("REPORT").action([send(SendAction::new("RESULT").to("_parent"))]),
            )
            .transition(
                transition("CHECK")
                    .when(|d: &Data, _| d.count >= 100)
                    .action([send(SendAction::new("BIG").to("_parent"))]),
            )])
        .unwrap(),
    );
    let doc = Document::from_states(vec![
        state("init")
            .invoke(
                invoke_machine("worker", worker)
                    .finalize([assign("count", count(), |v, _| v + 100)])
                    .with_data(|parent: &Data| Data {
                        count: parent.count + 1,
                    }),
            )
            .transition(transition("RESULT").action([
                assign("count", count(), |v, _| v + 1),
                send(SendAction::new("CHECK").to("worker")),
            ]))
            .transition(transition("BIG").to("big")),
        state("big"),
    ])
    .unwrap();
    let mut session =
        Session::with_config(doc, SessionConfig::new("parent"), Registry::new()).unwrap();
    session.start(Data { count: 10 }).unwrap();

    session.send_to(Event::new("REPORT"), "worker").unwrap();
    drive_until(&mut session, |s| s.is_active("big")).await;

    assert_eq!(session.configuration(), vec!["big"]);
    assert_eq!(session.with_data(|d| d.count), 11);
}

#[tokio::test]
async fn finalize_without_child_session_raises_execution_error() {
    let doc = Document::from_states(vec![
        state("init")
            .invoke(
                invoke_service("greeter", "greeter")
                    .finalize([assign("count", count(), |v, _| v + 1)]),
            )
            .transition(transition(ERROR_EXECUTION).to("failed").action([assign(
                "count",
                count(),
                |_, e: &Event| i64::from(e.invoke_id.as_deref() == Some("greeter")) * 7,
            )])),
        state("failed"),
    ])
    .unwrap();
    let mut session = started(doc, Registry::new().service("greeter", Greeter));

    session.send_to(Event::new("world"), "greeter").unwrap();
    drive_until(&mut session, |s| s.is_active("failed")).await;

    assert_eq!(session.configuration(), vec!["failed"]);
    assert_eq!(session.with_data(|d| d.count), 7);
}

#[tokio::test]
async fn child_sends_to_parent_on_entry() {
    let child = Arc::new(
        Document::from_states(vec![
            state("childInit").on_entry([send(SendAction::new("NEXT").to("_parent"))])
        ])
        .unwrap(),
    );
    let doc = Document::from_states(vec![
        state("init")
            .invoke(invoke_machine("child", child))
            .transition(transition("NEXT").to("next")),
        state("next"),
    ])
    .unwrap();
    let mut session = started(doc, Registry::new());

    drive_until(&mut session, |s| s.is_active("next")).await;

    assert_eq!(session.configuration(), vec!["next"]);
}

#[tokio::test]
async fn failing_child_reports_execution_error() {
    let hooks = Hooks::new().script("explode", |_: &Data, _: &Event| Err("boom".to_string()));
    let child = Arc::new(
        Document::from_states(vec![state("childInit").on_entry([script("explode")])]).unwrap(),
    );
    let doc = Document::from_states(vec![
        state("init")
            .invoke(invoke_machine("child", child))
            .transition(transition(ERROR_EXECUTION).to("failed")),
        state("failed"),
    ])
    .unwrap();
    let mut session = started(doc, Registry::new().with_hooks(hooks));

    drive_until(&mut session, |s| s.is_active("failed")).await;

    assert_eq!(session.configuration(), vec!["failed"]);
}

#[tokio::test]
async fn registered_machine_is_invoked_by_name() {
    let doc = Document::from_states(vec![
        state("init")
            .invoke(invoke_service("child", "stepper"))
            .transition(transition("CHILD_MOVED").to("observed")),
        state("observed"),
    ])
    .unwrap();
    let mut session = started(doc, Registry::new().machine("stepper", stepping_child()));

    session.send_to(Event::new("NEXT"), "child").unwrap();
    drive_until(&mut session, |s| s.is_active("observed")).await;

    assert_eq!(session.configuration(), vec!["observed"]);
}

struct Greeter;

impl ExternalService for Greeter {
    fn start(&self, request: ServiceRequest) -> Result<EventSender, InvokeError> {
        let (sender, mut rx) = EventSender::channel();
        let parent = request.parent;
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if let statecharts::core::Envelope::Event(event) = envelope {
                    let _ = parent.send(Event::new(format!("hello.{}", event.name)));
                }
            }
        });
        Ok(sender)
    }
}

#[tokio::test]
async fn external_service_replies_through_parent_link() {
    let doc = Document::from_states(vec![
        state("init")
            .invoke(invoke_service("greeter", "greeter"))
            .transition(transition("hello.*").to("greeted").action([assign(
                "count",
                count(),
                |_, e: &Event| i64::from(e.invoke_id.as_deref() == Some("greeter")),
            )])),
        state("greeted"),
    ])
    .unwrap();
    let mut session = started(doc, Registry::new().service("greeter", Greeter));

    session.send_to(Event::new("world"), "greeter").unwrap();
    drive_until(&mut session, |s| s.is_active("greeted")).await;

    assert_eq!(session.with_data(|d| d.count), 1);
}

#[tokio::test]
async fn spawned_session_reports_outcome() {
    let doc = Document::from_states(vec![
        state("init").transition(transition("FINISH").to("done")),
        final_state("done").done_data(json!("ok")),
    ])
    .unwrap();
    let session: Session<Data> =
        Session::with_config(doc, SessionConfig::new("spawned"), Registry::new()).unwrap();

    let handle = session.spawn(Data::default()).unwrap();
    assert_eq!(handle.name(), "spawned");
    assert_eq!(handle.configuration(), vec!["init"]);

    handle.send(Event::new("FINISH")).unwrap();
    let outcome = timeout(Duration::from_secs(5), handle.join())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.status, SessionStatus::Done);
    assert_eq!(outcome.done_data, Some(json!("ok")));
    assert!(outcome.configuration.is_empty());
}

#[tokio::test]
async fn spawned_session_publishes_each_macrostep() {
    let doc = Document::from_states(vec![
        state("a").transition(transition("GO").to("b")),
        state("b"),
    ])
    .unwrap();
    let session: Session<Data> = Session::new(doc).unwrap();
    let mut handle = session.spawn(Data::default()).unwrap();

    handle.send(Event::new("GO")).unwrap();
    let configuration = timeout(Duration::from_secs(5), handle.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(configuration, vec!["b"]);

    handle.cancel().unwrap();
    let outcome = handle.join().await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Cancelled);
}
