use dartdbg_frame::{ChildGroup, ExpansionError, Materializer};
use dartdbg_vmservice::{mock::MockVmService, Sentinel};
use serde_json::json;

use super::support::*;

#[tokio::test]
async fn exception_arrives_before_the_final_list() {
    let mock = MockVmService::new();
    mock.insert_class(counter_class());
    let materializer = Materializer::new(mock, context());
    let frame = pause_with(
        materializer.context(),
        descriptor("code/bump", BUMP_TOKEN, json!([receiver_var(COUNTER_CLASS)])),
        Some(exception()),
    );

    let mut sink = RecordingSink::default();
    materializer.expand(&frame, &mut sink).await.unwrap();

    assert_eq!(sink.events.len(), 2);
    let SinkEvent::Children { children, is_final: false } = &sink.events[0] else {
        panic!("expected a partial list first: {:?}", sink.events);
    };
    assert_eq!(children.groups().len(), 1);
    assert!(children.exception().is_some());

    let SinkEvent::Children { children, is_final: true } = &sink.events[1] else {
        panic!("expected the final list second: {:?}", sink.events);
    };
    assert!(children.exception().is_none());
    assert!(matches!(children.groups()[0], ChildGroup::StaticFields(_)));
    assert_eq!(children.variable_names(), ["this"]);
}

#[tokio::test]
async fn frame_without_exception_gets_a_single_final_delivery() {
    let materializer = Materializer::new(MockVmService::new(), context());
    let frame = pause_at(
        materializer.context(),
        descriptor("code/bump", BUMP_TOKEN, json!([int_var("x", 5, 10)])),
    );

    let mut sink = RecordingSink::default();
    materializer.expand(&frame, &mut sink).await.unwrap();
    assert!(matches!(
        sink.events.as_slice(),
        [SinkEvent::Children { is_final: true, .. }]
    ));
}

#[tokio::test]
async fn sentinel_puts_the_node_in_error_state() {
    let mock = MockVmService::new();
    mock.set_sentinel(COUNTER_CLASS, Sentinel::new("Collected", "<collected>"));
    let materializer = Materializer::new(mock.clone(), context());
    let frame = pause_at(
        materializer.context(),
        descriptor("code/bump", BUMP_TOKEN, json!([receiver_var(COUNTER_CLASS)])),
    );

    let mut sink = RecordingSink::default();
    let result = materializer.expand(&frame, &mut sink).await;
    assert!(matches!(result, Err(ExpansionError::ObjectUnavailable(_))));
    assert_eq!(sink.events, [SinkEvent::Error("<collected>".to_string())]);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn inactive_frame_is_not_expanded() {
    let mock = MockVmService::new();
    let materializer = Materializer::new(mock.clone(), context());
    let frame = pause_at(
        materializer.context(),
        descriptor("code/bump", BUMP_TOKEN, json!([receiver_var(COUNTER_CLASS)])),
    );
    materializer.context().on_resumed(ISOLATE);

    let mut sink = RecordingSink::default();
    let result = materializer.expand(&frame, &mut sink).await;
    assert_eq!(result, Err(ExpansionError::Stale));
    assert!(sink.events.is_empty());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn resume_during_lookup_drops_the_result() {
    let mock = MockVmService::new();
    mock.insert_class(counter_class());
    let gate = mock.gate(COUNTER_CLASS);
    let materializer = Materializer::new(mock.clone(), context());
    let frame = pause_at(
        materializer.context(),
        descriptor("code/bump", BUMP_TOKEN, json!([receiver_var(COUNTER_CLASS)])),
    );

    let task = tokio::spawn({
        let materializer = materializer.clone();
        async move {
            let mut sink = RecordingSink::default();
            let result = materializer.expand(&frame, &mut sink).await;
            (result, sink)
        }
    });
    mock.wait_for_calls(1).await;
    materializer.context().on_resumed(ISOLATE);
    gate.release();

    let (result, sink) = task.await.unwrap();
    assert_eq!(result, Err(ExpansionError::Stale));
    assert!(sink.events.is_empty());
}

#[tokio::test]
async fn new_pause_at_the_same_location_invalidates_old_expansions() {
    let mock = MockVmService::new();
    mock.insert_class(counter_class());
    let _gate = mock.gate(COUNTER_CLASS);
    let materializer = Materializer::new(mock.clone(), context());
    let stale = pause_at(
        materializer.context(),
        descriptor("code/bump", BUMP_TOKEN, json!([receiver_var(COUNTER_CLASS)])),
    );

    let task = tokio::spawn({
        let materializer = materializer.clone();
        async move {
            let mut sink = RecordingSink::default();
            let result = materializer.expand(&stale, &mut sink).await;
            (result, sink)
        }
    });
    mock.wait_for_calls(1).await;

    let fresh = pause_at(
        materializer.context(),
        descriptor("code/bump", BUMP_TOKEN, json!([receiver_var(COUNTER_CLASS)])),
    );
    let (result, sink) = task.await.unwrap();
    assert_eq!(result, Err(ExpansionError::Stale));
    assert!(sink.events.is_empty());

    // The new pause's frame is live and expands normally once the reply is let through.
    mock.gate(COUNTER_CLASS).release();
    let mut sink = RecordingSink::default();
    materializer.expand(&fresh, &mut sink).await.unwrap();
    assert_eq!(sink.events.len(), 1);
}

#[tokio::test]
async fn concurrent_expansions_resolve_independently() {
    let mock = MockVmService::new();
    mock.insert_class(counter_class());
    let mut other = counter_class();
    other.id = "classes/other".to_string();
    other.name = "Other".to_string();
    mock.insert_class(other);
    let first_gate = mock.gate(COUNTER_CLASS);
    let second_gate = mock.gate("classes/other");

    let materializer = Materializer::new(mock.clone(), context());
    let paused = materializer.context().on_paused(
        ISOLATE,
        &[
            descriptor("code/bump", BUMP_TOKEN, json!([receiver_var(COUNTER_CLASS)])),
            descriptor("code/other", BUMP_TOKEN, json!([receiver_var("classes/other")])),
        ],
        None,
    );
    let frames: Vec<_> = paused.into_iter().map(|p| p.unwrap().frame).collect();

    let tasks: Vec<_> = frames
        .into_iter()
        .map(|frame| {
            let materializer = materializer.clone();
            tokio::spawn(async move {
                let mut sink = RecordingSink::default();
                materializer.expand(&frame, &mut sink).await.unwrap();
                sink
            })
        })
        .collect();
    mock.wait_for_calls(2).await;

    second_gate.release();
    first_gate.release();

    let mut names = Vec::new();
    for task in tasks {
        let sink = task.await.unwrap();
        let [SinkEvent::Children { children, is_final: true }] = sink.events.as_slice() else {
            panic!("unexpected deliveries: {:?}", sink.events);
        };
        names.push(children.static_group().unwrap().class_name.clone());
    }
    assert_eq!(names, ["Counter", "Other"]);
}

#[tokio::test]
async fn other_isolate_pausing_leaves_frames_expandable() {
    let mock = MockVmService::new();
    mock.insert_class(counter_class());
    let gate = mock.gate(COUNTER_CLASS);
    let materializer = Materializer::new(mock.clone(), context());
    let frame = pause_at(
        materializer.context(),
        descriptor("code/bump", BUMP_TOKEN, json!([receiver_var(COUNTER_CLASS)])),
    );

    let task = tokio::spawn({
        let materializer = materializer.clone();
        async move {
            let mut sink = RecordingSink::default();
            let result = materializer.expand(&frame, &mut sink).await;
            (result, sink)
        }
    });
    mock.wait_for_calls(1).await;

    let other = materializer.context().on_paused(
        "isolates/2",
        &[descriptor("code/bump", BUMP_TOKEN, json!([]))],
        None,
    );
    assert!(other[0].is_ok());
    materializer.context().on_resumed("isolates/2");
    gate.release();

    let (result, sink) = task.await.unwrap();
    assert_eq!(result, Ok(()));
    let [SinkEvent::Children { children, is_final: true }] = sink.events.as_slice() else {
        panic!("unexpected deliveries: {:?}", sink.events);
    };
    assert_eq!(children.static_group().unwrap().class_name, "Counter");
}
