//! End-to-end scenarios driven synchronously through `run_pending`.

use serde_json::json;
use statecharts::builder::{
    eventless, final_state, history, history_deep, on, parallel, state, transition, BuildError,
    Document, DocumentIssue, StateSchema,
};
use statecharts::content::{assign, log, raise, Hooks, Lens, LogEntry};
use statecharts::core::{Event, Guard, GuardError};
use statecharts::session::{Registry, Session, SessionConfig, SessionError, SessionStatus};
use std::sync::{Arc, Mutex};

#[derive(Default, Debug, Clone, PartialEq)]
struct Counter {
    count: i64,
}

fn count() -> Lens<Counter, i64> {
    Lens::new(|c: &Counter| c.count, |c: &mut Counter, v| c.count = v)
}

fn run(states: Vec<StateSchema<Counter>>, events: &[&str]) -> Session<Counter> {
    let doc = Document::from_states(states).unwrap();
    let mut session = Session::new(doc).unwrap();
    session.start(Counter::default()).unwrap();
    for name in events {
        session.send(Event::new(*name)).unwrap();
    }
    session.run_pending().unwrap();
    session
}

fn history_chart(target: StateSchema<Counter>) -> Vec<StateSchema<Counter>> {
    vec![
        state("parent")
            .child(
                state("deep")
                    .child(state("first").transition(transition("SECOND").to("second")))
                    .child(state("second").transition(transition("NEXT").to("next"))),
            )
            .child(target),
        state("next").transition(transition("RETURN").to("return")),
    ]
}

#[test]
fn enters_single_initial_state() {
    let session = run(vec![state("init")], &[]);

    assert_eq!(session.configuration(), vec!["init"]);
}

#[test]
fn transitions_to_next_state() {
    let session = run(
        vec![
            state("init").transition(transition("NEXT").to("next")),
            state("next"),
        ],
        &["NEXT"],
    );

    assert_eq!(session.configuration(), vec!["next"]);
}

#[test]
fn enters_compound_state_through_first_child() {
    let session = run(vec![state("parent").child(state("child"))], &[]);

    assert_eq!(session.configuration(), vec!["parent", "child"]);
}

#[test]
fn enters_every_region_of_parallel_state() {
    let session = run(
        vec![parallel("parent").child(state("first")).child(state("second"))],
        &[],
    );

    assert_eq!(session.configuration(), vec!["parent", "first", "second"]);
}

#[test]
fn shallow_history_restores_region_but_not_leaf() {
    let session = run(history_chart(history("return")), &["SECOND", "NEXT", "RETURN"]);

    assert_eq!(session.configuration(), vec!["parent", "deep", "first"]);
}

#[test]
fn deep_history_restores_exact_leaf() {
    let session = run(
        history_chart(history_deep("return")),
        &["SECOND", "NEXT", "RETURN"],
    );

    assert_eq!(session.configuration(), vec!["parent", "deep", "second"]);
}

#[test]
fn history_without_record_uses_default_entry() {
    let session = run(
        vec![
            state("start").transition(transition("JUMP").to("return")),
            state("parent")
                .child(state("a"))
                .child(state("b").initial())
                .child(history("return")),
        ],
        &["JUMP"],
    );

    assert_eq!(session.configuration(), vec!["parent", "b"]);
}

#[test]
fn cancel_empties_configuration_and_stops_processing() {
    let doc = Document::from_states(vec![
        state("init").transition(transition("NEXT").to("next")),
        state("next"),
    ])
    .unwrap();
    let mut session: Session<Counter> = Session::new(doc).unwrap();
    session.start(Counter::default()).unwrap();

    session.cancel().unwrap();
    session.send(Event::new("NEXT")).unwrap();
    session.run_pending().unwrap();

    assert!(session.configuration().is_empty());
    assert_eq!(session.status(), SessionStatus::Cancelled);
}

#[test]
fn conditional_wildcard_picks_first_passing_transition() {
    let below = |_: &Counter, e: &Event| e.data["value"].as_f64().is_some_and(|v| v < 0.5);
    let doc = Document::from_states(vec![
        state("parent")
            .transition(transition("*").when(below).to("first"))
            .transition(transition("*").when(below).to("second")),
        state("first"),
        state("second"),
    ])
    .unwrap();
    let mut session: Session<Counter> = Session::new(doc).unwrap();
    session.start(Counter::default()).unwrap();

    session
        .send(Event::new("MEASURE").with_data(json!({ "value": 0.4 })))
        .unwrap();
    session.run_pending().unwrap();

    assert_eq!(session.configuration(), vec!["first"]);
}

#[test]
fn top_level_final_ignores_later_events() {
    let session = run(
        vec![
            state("init").transition(transition("NEXT").to("final")),
            final_state("final").transition(transition("NEXT").to("init")),
        ],
        &["NEXT", "NEXT"],
    );

    assert!(session.configuration().is_empty());
    assert_eq!(session.status(), SessionStatus::Done);
}

#[test]
fn targetless_transition_keeps_configuration() {
    let session = run(
        vec![state("init").transition(transition("*").action([log("noted")]))],
        &["NEXT"],
    );

    assert_eq!(session.configuration(), vec!["init"]);
}

#[test]
fn raised_event_drives_transition() {
    let session = run(
        vec![
            state("init")
                .transition(transition("NEXT").action([raise("DONE")]))
                .transition(transition("DONE").to("next")),
            state("next"),
        ],
        &["NEXT"],
    );

    assert_eq!(session.configuration(), vec!["next"]);
}

#[test]
fn assign_updates_data_on_transition() {
    let session = run(
        vec![
            state("init").transition(
                transition("NEXT")
                    .to("next")
                    .action([assign("count", count(), |v, _| v + 1)]),
            ),
            state("next"),
        ],
        &["NEXT"],
    );

    assert_eq!(session.configuration(), vec!["next"]);
    assert_eq!(session.with_data(Clone::clone), Counter { count: 1 });
}

#[test]
fn log_on_transition_reaches_sink() {
    let output = Arc::new(Mutex::new(Vec::<LogEntry>::new()));
    let sink = Arc::clone(&output);
    let doc = Document::from_states(vec![
        state("init").transition(transition("LOG").action([log("during transmission")]))
    ])
    .unwrap();
    let registry = Registry::new()
        .with_hooks(Hooks::new().log_sink(move |entry: &LogEntry| sink.lock().unwrap().push(entry.clone())));
    let mut session: Session<Counter> =
        Session::with_config(doc, SessionConfig::default(), registry).unwrap();
    session.start(Counter::default()).unwrap();

    session.send(Event::new("LOG")).unwrap();
    session.run_pending().unwrap();

    let output = output.lock().unwrap();
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].label.as_deref(), Some("during transmission"));
    assert_eq!(output[0].event, "LOG");
}

#[test]
fn deeper_source_preempts_ancestor_transition() {
    let session = run(
        vec![
            state("outer")
                .child(state("inner").transition(transition("GO").to("inner_target")))
                .child(state("inner_target"))
                .transition(transition("GO").to("outer_target")),
            state("outer_target"),
        ],
        &["GO"],
    );

    assert_eq!(session.configuration(), vec!["outer", "inner_target"]);
}

#[test]
fn orthogonal_regions_transition_together() {
    let session = run(
        vec![parallel("p")
            .child(
                state("left")
                    .child(state("l1").transition(transition("GO").to("l2")))
                    .child(state("l2")),
            )
            .child(
                state("right")
                    .child(state("r1").transition(transition("GO").to("r2")))
                    .child(state("r2")),
            )],
        &["GO"],
    );

    assert_eq!(session.configuration(), vec!["p", "left", "right", "l2", "r2"]);
}

#[test]
fn internal_transition_does_not_exit_source() {
    let doc = Document::from_states(vec![state("parent")
        .on_entry([assign("count", count(), |v, _| v + 1)])
        .child(state("a"))
        .child(state("b"))
        .transition(transition("INSIDE").to("b").internal())
        .transition(transition("OUTSIDE").to("b"))])
    .unwrap();
    let mut session: Session<Counter> = Session::new(doc).unwrap();
    session.start(Counter::default()).unwrap();

    session.send(Event::new("INSIDE")).unwrap();
    session.run_pending().unwrap();
    assert_eq!(session.with_data(|c| c.count), 1);

    session.send(Event::new("OUTSIDE")).unwrap();
    session.run_pending().unwrap();
    assert_eq!(session.with_data(|c| c.count), 2);
    assert_eq!(session.configuration(), vec!["parent", "b"]);
}

#[test]
fn explicit_parallel_initial_targets() {
    let doc = Document::builder()
        .state(
            parallel("p")
                .child(state("left").child(state("l1")).child(state("l2")))
                .child(state("right").child(state("r1")).child(state("r2"))),
        )
        .initial(["l2", "r2"])
        .build()
        .unwrap();
    let mut session: Session<Counter> = Session::new(doc).unwrap();
    session.start(Counter::default()).unwrap();

    assert_eq!(session.configuration(), vec!["p", "left", "right", "l2", "r2"]);
}

#[test]
fn default_entry_content_runs_after_on_entry() {
    let seen = Lens::new(|c: &Counter| c.count, |c: &mut Counter, v| c.count = v);
    let doc = Document::from_states(vec![state("parent")
        .on_entry([assign("count", count(), |_, _| 10)])
        .on_initial([assign("count", seen, |v, _| v * 2)])
        .child(state("child"))])
    .unwrap();
    let mut session: Session<Counter> = Session::new(doc).unwrap();
    session.start(Counter::default()).unwrap();

    assert_eq!(session.with_data(|c| c.count), 20);
}

#[test]
fn done_state_carries_done_data() {
    let session = run(
        vec![
            state("job")
                .child(state("working").transition(transition("FINISH").to("finished")))
                .child(final_state("finished").done_data(json!(7)))
                .transition(transition("done.state.job").to("after").action([assign(
                    "count",
                    count(),
                    |_, e: &Event| e.data.as_i64().unwrap_or_default(),
                )])),
            state("after"),
        ],
        &["FINISH"],
    );

    assert_eq!(session.configuration(), vec!["after"]);
    assert_eq!(session.with_data(|c| c.count), 7);
}

#[test]
fn prefix_patterns_match_event_families() {
    let session = run(
        vec![
            state("idle").transition(on(["job.*"]).to("busy")),
            state("busy"),
        ],
        &["other", "job.started"],
    );

    assert_eq!(session.configuration(), vec!["busy"]);
}

#[test]
fn eventless_loop_is_fatal() {
    let doc = Document::from_states(vec![
        state("ping").transition(eventless().to("pong")),
        state("pong").transition(eventless().to("ping")),
    ])
    .unwrap();
    let mut session: Session<Counter> =
        Session::with_config(doc, SessionConfig::new("loop").with_max_microsteps(50), Registry::new())
            .unwrap();

    let err = session.start(Counter::default()).unwrap_err();

    assert!(matches!(err, SessionError::MicrostepLimit { limit: 50 }));
    assert_eq!(session.status(), SessionStatus::Failed);
}

#[test]
fn failing_guard_is_fatal() {
    let doc = Document::from_states(vec![
        state("init").transition(
            transition("GO")
                .guard(Guard::fallible(|_: &Counter, _: &Event| {
                    Err(GuardError("sensor offline".into()))
                }))
                .to("next"),
        ),
        state("next"),
    ])
    .unwrap();
    let mut session: Session<Counter> = Session::new(doc).unwrap();
    session.start(Counter::default()).unwrap();

    session.send(Event::new("GO")).unwrap();
    let err = session.run_pending().unwrap_err();

    assert!(matches!(err, SessionError::Guard { ref state, .. } if state == "init"));
    assert_eq!(session.status(), SessionStatus::Failed);
}

#[test]
fn unresolved_target_refuses_to_build() {
    let result: Result<Document<Counter>, BuildError> = Document::from_states(vec![
        state("init").transition(transition("NEXT").to("nowhere"))
    ]);

    let err = result.unwrap_err();
    assert_eq!(
        err.issues(),
        &[DocumentIssue::UnresolvedTarget {
            state: "init".into(),
            target: "nowhere".into(),
        }]
    );
}

#[test]
fn history_is_queryable_after_exit() {
    let session = run(history_chart(history_deep("return")), &["SECOND", "NEXT"]);

    assert_eq!(session.configuration(), vec!["next"]);
    assert_eq!(session.history("return"), Some(vec!["second".to_string()]));
}

#[test]
fn host_internal_event_runs_before_next_external() {
    let doc = Document::from_states(vec![
        state("a").transition(transition("I").to("b")),
        state("b").transition(transition("X").to("c")),
        state("c"),
    ])
    .unwrap();
    let mut session: Session<Counter> = Session::new(doc).unwrap();
    session.start(Counter::default()).unwrap();

    session.send_to(Event::new("I"), "_internal").unwrap();
    assert_eq!(session.configuration(), vec!["b"]);

    session.send(Event::new("X")).unwrap();
    session.run_pending().unwrap();
    assert_eq!(session.configuration(), vec!["c"]);
}

#[test]
fn initial_on_parallel_state_refuses_to_build() {
    let result: Result<Document<Counter>, BuildError> = Document::from_states(vec![parallel("p")
        .initial_targets(["nowhere"])
        .child(state("left"))
        .child(state("right"))]);

    let err = result.unwrap_err();
    assert_eq!(
        err.issues(),
        &[DocumentIssue::InitialOnNonCompound { id: "p".into() }]
    );
}
