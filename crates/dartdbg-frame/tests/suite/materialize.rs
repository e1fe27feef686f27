use std::sync::Arc;

use dartdbg_config::AutoExpressionStrategy;
use dartdbg_frame::{
    AutoExpressionScanner, ChildGroup, ExpansionError, Materializer, Plan, SessionContext,
};
use dartdbg_vmservice::{mock::MockVmService, RpcError, Sentinel, VmServiceError};
use serde_json::{json, Value};

use super::support::*;

fn counter_frame(context: &SessionContext, vars: Vec<Value>) -> Arc<dartdbg_frame::StackFrame> {
    pause_at(context, descriptor("code/bump", BUMP_TOKEN, Value::Array(vars)))
}

#[tokio::test]
async fn frame_without_receiver_is_ready_without_a_round_trip() {
    let mock = MockVmService::new();
    let materializer = Materializer::new(mock.clone(), context());
    let frame = counter_frame(
        materializer.context(),
        vec![
            int_var("x", 5, 10),
            json!({"type": "BoundVariable", "name": "y", "value": null, "declarationTokenPos": 12}),
        ],
    );

    let Plan::Ready(planned) = materializer.plan(&frame).unwrap() else {
        panic!("expected a synchronous plan");
    };
    assert_eq!(planned.variable_names(), ["x"]);
    assert_eq!(planned.groups().len(), 1);

    let children = materializer.materialize(&frame).await.unwrap();
    assert_eq!(children, planned);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn receiver_statics_come_before_variables() {
    let mock = MockVmService::new();
    mock.insert_class(counter_class());
    let materializer = Materializer::new(mock.clone(), context());
    let frame = counter_frame(
        materializer.context(),
        vec![receiver_var(COUNTER_CLASS), int_var("value", 3, 40)],
    );

    let children = materializer.materialize(&frame).await.unwrap();

    let groups = children.groups();
    assert_eq!(groups.len(), 2);
    let ChildGroup::StaticFields(statics) = &groups[0] else {
        panic!("expected static fields first, got {groups:?}");
    };
    assert_eq!(statics.class_name, "Counter");
    assert_eq!(statics.field_names(), ["COUNT", "NAME"]);
    assert_eq!(children.variable_names(), ["this", "value"]);

    let rows = children.variables();
    assert_eq!(rows[0].declaration, None);
    let declared = rows[1].declaration.as_ref().unwrap();
    assert_eq!(declared.script_id, SCRIPT);
    assert_eq!(declared.token_pos, 40);

    assert_eq!(mock.calls(), [(ISOLATE.to_string(), COUNTER_CLASS.to_string())]);
}

#[tokio::test]
async fn class_without_statics_yields_variables_only() {
    let mock = MockVmService::new();
    let mut class = counter_class();
    class.fields.retain(|f| !f.is_static);
    mock.insert_class(class);
    let materializer = Materializer::new(mock, context());
    let frame = counter_frame(materializer.context(), vec![receiver_var(COUNTER_CLASS)]);

    let children = materializer.materialize(&frame).await.unwrap();
    assert!(children.static_group().is_none());
    assert_eq!(children.variable_names(), ["this"]);
}

#[tokio::test]
async fn sentinel_class_is_an_error_and_is_not_retried() {
    let mock = MockVmService::new();
    mock.set_sentinel(COUNTER_CLASS, Sentinel::new("Collected", "<collected>"));
    let materializer = Materializer::new(mock.clone(), context());
    let frame = counter_frame(materializer.context(), vec![receiver_var(COUNTER_CLASS)]);

    let err = materializer.materialize(&frame).await.unwrap_err();
    assert_eq!(err, ExpansionError::ObjectUnavailable("<collected>".to_string()));
    assert_eq!(err.to_string(), "<collected>");
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn failure_text_is_surfaced_verbatim() {
    let mock = MockVmService::new();
    mock.set_error(
        COUNTER_CLASS,
        VmServiceError::Rpc(RpcError {
            code: 106,
            message: "Isolate must be paused".to_string(),
            details: None,
        }),
    );
    let materializer = Materializer::new(mock.clone(), context());
    let frame = counter_frame(materializer.context(), vec![receiver_var(COUNTER_CLASS)]);

    let err = materializer.materialize(&frame).await.unwrap_err();
    assert_eq!(err.to_string(), "Isolate must be paused");
    assert!(matches!(err, ExpansionError::ProtocolFailure(_)));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn one_request_regardless_of_variable_count() {
    let mock = MockVmService::new();
    mock.insert_class(counter_class());
    let materializer = Materializer::new(mock.clone(), context());

    let mut vars: Vec<Value> = (0..20).map(|i| int_var(&format!("v{i}"), i, i)).collect();
    vars.insert(7, receiver_var(COUNTER_CLASS));
    let frame = counter_frame(materializer.context(), vars);

    let children = materializer.materialize(&frame).await.unwrap();
    assert_eq!(children.variables().len(), 21);
    assert_eq!(children.variable_names()[7], "this");
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn first_receiver_wins_and_each_expansion_asks_again() {
    let mock = MockVmService::new();
    mock.insert_class(counter_class());
    let materializer = Materializer::new(mock.clone(), context());
    let frame = counter_frame(
        materializer.context(),
        vec![receiver_var(COUNTER_CLASS), receiver_var("classes/other")],
    );

    let first = materializer.materialize(&frame).await.unwrap();
    let second = materializer.materialize(&frame).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        mock.calls(),
        [
            (ISOLATE.to_string(), COUNTER_CLASS.to_string()),
            (ISOLATE.to_string(), COUNTER_CLASS.to_string()),
        ]
    );
}

#[tokio::test]
async fn exception_marker_leads_the_list() {
    let mock = MockVmService::new();
    mock.insert_class(counter_class());
    let materializer = Materializer::new(mock, context());
    let frame = pause_with(
        materializer.context(),
        descriptor("code/bump", BUMP_TOKEN, json!([receiver_var(COUNTER_CLASS)])),
        Some(exception()),
    );

    let children = materializer.materialize(&frame).await.unwrap();
    let groups = children.groups();
    assert!(matches!(&groups[0], ChildGroup::ExceptionMarker(row) if row.name == "exception"));
    assert!(matches!(&groups[1], ChildGroup::StaticFields(_)));
    assert!(matches!(&groups[2], ChildGroup::InstanceVariables(_)));
    assert_eq!(children.exception().map(|row| row.value.id.as_str()), Some("objects/err"));
}

#[tokio::test]
async fn receiver_without_class_fails_only_its_own_frame() {
    let mock = MockVmService::new();
    let materializer = Materializer::new(mock.clone(), context());
    let broken = counter_frame(
        materializer.context(),
        vec![json!({"name": "this", "value": {"id": "objects/this", "kind": "PlainInstance"}})],
    );
    let err = materializer.plan(&broken).unwrap_err();
    assert!(matches!(err, ExpansionError::MalformedFrame(_)));

    let healthy = counter_frame(materializer.context(), vec![int_var("x", 1, 3)]);
    assert!(materializer.materialize(&healthy).await.is_ok());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn auto_watch_group_follows_variables_when_enabled() {
    let mock = MockVmService::new();
    mock.insert_class(counter_class());
    let context = context()
        .with_auto_expressions(true)
        .with_scanner(AutoExpressionScanner::for_strategy(AutoExpressionStrategy::MemberAccess));
    let materializer = Materializer::new(mock, context);
    let frame = counter_frame(
        materializer.context(),
        vec![receiver_var(COUNTER_CLASS), int_var("p", 0, 20), int_var("step", 1, 30)],
    );

    let children = materializer.materialize(&frame).await.unwrap();
    assert!(matches!(children.groups().last(), Some(ChildGroup::AutoWatch(_))));
    let watches: Vec<&str> = children
        .watches()
        .unwrap()
        .iter()
        .map(|row| row.expression.as_str())
        .collect();
    assert_eq!(watches, ["p.x", "this.value", "p.y"]);
}

#[tokio::test]
async fn default_collector_keeps_the_watch_group_empty() {
    let materializer = Materializer::new(MockVmService::new(), context().with_auto_expressions(true));
    let frame = counter_frame(materializer.context(), vec![int_var("p", 0, 20)]);

    let children = materializer.materialize(&frame).await.unwrap();
    assert_eq!(children.watches(), Some(&[][..]));

    let disabled = Materializer::new(MockVmService::new(), context());
    let frame = counter_frame(disabled.context(), vec![int_var("p", 0, 20)]);
    assert_eq!(disabled.materialize(&frame).await.unwrap().watches(), None);
}
