mod common;

use std::sync::{Arc, Mutex};

use common::{fire, node, path, summary, Recorder, RecordingListens};
use json_sync::view::{EventRegistration, EventType};
use json_sync::{Index, Node, NoopListenProvider, Path, Query, QueryParams, SyncError, SyncTree};
use serde_json::json;

use EventType::*;

fn key(k: &str) -> Option<String> {
    Some(k.to_owned())
}

fn tree() -> (SyncTree, RecordingListens) {
    let listens = RecordingListens::default();
    (SyncTree::new(listens.clone()), listens)
}

// ── Optimistic writes ───────────────────────────────────────────────────

#[test]
fn local_write_raises_value_immediately() {
    let (mut tree, _) = tree();
    let rec = Recorder::default();
    let events = tree.add_event_registration(&Query::new(path("x")), rec.value_registration());
    assert!(events.is_empty(), "nothing is known at /x yet");

    let applied = tree.apply_user_overwrite(&path("x"), &json!({"a": 1})).unwrap();
    assert_eq!(applied.write_id, 1);
    fire(&applied.events);
    let seen = rec.take();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].event_type, Value);
    assert_eq!(seen[0].key.as_deref(), Some("x"));
    assert_eq!(seen[0].value, json!({"a": 1}));
}

#[test]
fn confirmed_write_surfaces_extra_server_children() {
    let (mut tree, _) = tree();
    let query = Query::new(path("x"));
    let rec = Recorder::default();
    tree.add_event_registration(&query, rec.child_registration(&[ChildAdded]));
    tree.add_event_registration(&query, rec.value_registration());

    let write = tree.apply_user_overwrite(&path("x"), &json!({"a": 1})).unwrap();
    assert_eq!(summary(&write.events), vec![(ChildAdded, key("a")), (Value, key("x"))]);

    // shadowed by the pending write
    let events = tree.apply_server_overwrite(&path("x"), node(json!({"a": 1, "b": 2})));
    assert!(events.is_empty());

    let events = tree.ack_user_write(write.write_id, false).unwrap();
    assert_eq!(summary(&events), vec![(ChildAdded, key("b")), (Value, key("x"))]);
    fire(&events);
    let seen = rec.take();
    assert_eq!(seen[0].prev_name.as_deref(), Some("a"));
    assert_eq!(seen[1].value, json!({"a": 1, "b": 2}));
    assert!(tree.pending_writes().is_empty());
}

#[test]
fn rejected_write_is_rolled_back_without_duplicates() {
    let (mut tree, _) = tree();
    let query = Query::new(path("x"));
    let rec = Recorder::default();
    tree.add_event_registration(&query, rec.child_registration(&[ChildAdded, ChildChanged, ChildRemoved]));
    tree.add_event_registration(&query, rec.value_registration());
    tree.apply_server_overwrite(&path("x"), node(json!({"a": 1})));

    let write = tree.apply_user_overwrite(&path("x/c"), &json!(3)).unwrap();
    assert_eq!(summary(&write.events), vec![(ChildAdded, key("c")), (Value, key("x"))]);

    let mut events = tree.apply_server_overwrite(&path("x"), node(json!({"a": 9})));
    assert_eq!(summary(&events), vec![(ChildChanged, key("a")), (Value, key("x"))]);

    let reverted = tree.ack_user_write(write.write_id, true).unwrap();
    assert_eq!(summary(&reverted), vec![(ChildRemoved, key("c")), (Value, key("x"))]);
    events.extend(reverted);

    let changed_a = summary(&events).iter().filter(|e| **e == (ChildChanged, key("a"))).count();
    assert_eq!(changed_a, 1);
    let last = events.last().and_then(|e| e.snapshot()).map(|s| s.val());
    assert_eq!(last, Some(json!({"a": 9})));
}

#[test]
fn removing_value_listener_keeps_child_listener() {
    let (mut tree, listens) = tree();
    let query = Query::new(path("x"));
    let values = Recorder::default();
    let children = Recorder::default();
    let value_reg = values.value_registration();
    tree.add_event_registration(&query, Arc::clone(&value_reg));
    tree.add_event_registration(&query, children.child_registration(&[ChildAdded]));
    fire(&tree.apply_server_overwrite(&path("x"), node(json!({"a": 1}))));
    assert_eq!(values.take().len(), 1);
    assert_eq!(children.take().len(), 1);
    listens.take();

    let events = tree.remove_event_registration(&query, Some(&*value_reg));
    assert!(events.is_empty());
    assert!(listens.take().is_empty(), "the view still has a listener");

    let events = tree.apply_server_overwrite(&path("x/b"), node(json!(2)));
    assert_eq!(summary(&events), vec![(ChildAdded, key("b"))]);
    fire(&events);
    assert!(values.take().is_empty());
    assert_eq!(children.take()[0].value, json!(2));
}

#[test]
fn merge_updates_several_children() {
    let mut tree = SyncTree::new(NoopListenProvider);
    let query = Query::new(path("m"));
    let rec = Recorder::default();
    tree.add_event_registration(&query, rec.child_registration(&[ChildAdded, ChildChanged]));
    tree.add_event_registration(&query, rec.value_registration());
    tree.apply_server_overwrite(&path("m"), node(json!({"a": 1, "b": 2})));

    let update = json!({"a": 5, "c/d": 1});
    let merge = tree.apply_user_merge(&path("m"), update.as_object().unwrap()).unwrap();
    assert_eq!(
        summary(&merge.events),
        vec![(ChildAdded, key("c")), (ChildChanged, key("a")), (Value, key("m"))]
    );
    let value = merge.events.last().and_then(|e| e.snapshot()).map(|s| s.val());
    assert_eq!(value, Some(json!({"a": 5, "b": 2, "c": {"d": 1}})));

    let events = tree.ack_user_write(merge.write_id, true).unwrap();
    let value = events.last().and_then(|e| e.snapshot()).map(|s| s.val());
    assert_eq!(value, Some(json!({"a": 1, "b": 2})));
}

#[test]
fn priority_update_raises_value() {
    let mut tree = SyncTree::new(NoopListenProvider);
    let rec = Recorder::default();
    tree.add_event_registration(&Query::new(path("p")), rec.value_registration());
    tree.apply_server_overwrite(&path("p"), node(json!({"x": 1})));

    let applied = tree.apply_user_priority_update(&path("p"), &json!(5)).unwrap();
    assert_eq!(summary(&applied.events), vec![(Value, key("p"))]);
    let snap = applied.events[0].snapshot().unwrap();
    assert_eq!(snap.export_val(), json!({".priority": 5, "x": 1}));
}

// ── Filtered views ──────────────────────────────────────────────────────

#[test]
fn limit_window_backfills_and_restores_on_revert() {
    let mut tree = SyncTree::new(NoopListenProvider);
    let window = Query::with_params(path("q"), QueryParams::new().limit_to_first(2).unwrap());
    let values = Recorder::default();
    let children = Recorder::default();
    tree.add_event_registration(&Query::new(path("q")), values.value_registration());
    tree.add_event_registration(&window, children.child_registration(&[ChildAdded, ChildRemoved]));
    tree.apply_server_overwrite(&path("q"), node(json!({"a": 1, "b": 2, "c": 3})));

    let delete = tree.apply_user_overwrite(&path("q/a"), &serde_json::Value::Null).unwrap();
    assert_eq!(
        summary(&delete.events),
        vec![(Value, key("q")), (ChildRemoved, key("a")), (ChildAdded, key("c"))]
    );
    children.take();
    fire(&delete.events);
    assert_eq!(children.take()[1].prev_name.as_deref(), Some("b"));

    let reverted = tree.ack_user_write(delete.write_id, true).unwrap();
    assert_eq!(
        summary(&reverted),
        vec![(Value, key("q")), (ChildRemoved, key("c")), (ChildAdded, key("a"))]
    );
    let value = reverted[0].snapshot().map(|s| s.val());
    assert_eq!(value, Some(json!({"a": 1, "b": 2, "c": 3})));
}

fn ranged(params: QueryParams, data: serde_json::Value) -> (SyncTree, Recorder) {
    let mut tree = SyncTree::new(NoopListenProvider);
    let rec = Recorder::default();
    tree.add_event_registration(&Query::with_params(path("r"), params), rec.value_registration());
    fire(&tree.apply_server_overwrite(&path("r"), node(data)));
    (tree, rec)
}

#[test]
fn exclusive_key_bounds_leave_out_the_bounds() {
    let params = QueryParams::new()
        .order_by(Index::Key)
        .and_then(|p| p.start_after(json!("a"), None))
        .and_then(|p| p.end_before(json!("d"), None))
        .unwrap();
    let (mut tree, rec) = ranged(params, json!({"a": 1, "b": 2, "c": 3, "d": 4}));
    assert_eq!(rec.take().last().map(|s| s.value.clone()), Some(json!({"b": 2, "c": 3})));

    // the bound children stay outside the window
    assert!(tree.apply_user_overwrite(&path("r/d"), &json!(40)).unwrap().events.is_empty());
    assert!(tree.apply_user_overwrite(&path("r/a"), &json!(10)).unwrap().events.is_empty());

    let events = tree.apply_user_overwrite(&path("r/bb"), &json!(5)).unwrap().events;
    assert_eq!(summary(&events), vec![(Value, key("r"))]);
    fire(&events);
    assert_eq!(rec.take()[0].value, json!({"b": 2, "bb": 5, "c": 3}));
}

#[test]
fn exclusive_value_bounds_skip_equal_values() {
    let data = json!({"a": 1, "b": 2, "c": 3, "d": 1});
    let after = QueryParams::new().order_by(Index::Value).and_then(|p| p.start_after(json!(1), None)).unwrap();
    let (_, rec) = ranged(after, data.clone());
    assert_eq!(rec.take().last().map(|s| s.value.clone()), Some(json!({"b": 2, "c": 3})));

    let before = QueryParams::new().order_by(Index::Value).and_then(|p| p.end_before(json!(3), None)).unwrap();
    let (_, rec) = ranged(before, data.clone());
    assert_eq!(rec.take().last().map(|s| s.value.clone()), Some(json!({"a": 1, "b": 2, "d": 1})));

    let inclusive = QueryParams::new().order_by(Index::Value).and_then(|p| p.start_at(json!(1), None)).unwrap();
    let (_, rec) = ranged(inclusive, data);
    assert_eq!(rec.take().last().map(|s| s.value.clone()), Some(json!({"a": 1, "b": 2, "c": 3, "d": 1})));
}

// ── Acks and errors ─────────────────────────────────────────────────────

#[test]
fn ack_of_unknown_write_is_an_error() {
    let mut tree = SyncTree::new(NoopListenProvider);
    assert_eq!(tree.ack_user_write(42, false).unwrap_err(), SyncError::UnknownWrite(42));
}

#[test]
fn info_paths_are_read_only() {
    let mut tree = SyncTree::new(NoopListenProvider);
    let err = tree.apply_user_overwrite(&path(".info/connected"), &json!(true)).unwrap_err();
    assert!(matches!(err, SyncError::ReadOnlyPath(_)));
    assert!(tree.pending_writes().is_empty());
}

#[test]
fn invalid_data_is_rejected_before_recording() {
    let mut tree = SyncTree::new(NoopListenProvider);
    assert!(tree.apply_user_overwrite(&path("x"), &json!({"a.b": 1})).is_err());
    assert!(tree.apply_user_priority_update(&path("x"), &json!({"nested": true})).is_err());
    assert!(tree.is_empty());
}

#[test]
fn shadowed_ack_raises_nothing() {
    let mut tree = SyncTree::new(NoopListenProvider);
    let rec = Recorder::default();
    tree.add_event_registration(&Query::new(path("x")), rec.value_registration());
    let first = tree.apply_user_overwrite(&path("x/a"), &json!(1)).unwrap();
    let second = tree.apply_user_overwrite(&path("x"), &json!({"a": 2})).unwrap();
    assert!(tree.ack_user_write(first.write_id, false).unwrap().is_empty());
    assert_eq!(tree.pending_writes().writes().len(), 1);
    assert!(tree.ack_user_write(second.write_id, false).is_ok());
}

// ── Reads ───────────────────────────────────────────────────────────────

#[test]
fn complete_event_cache_includes_hidden_writes() {
    let mut tree = SyncTree::new(NoopListenProvider);
    let hidden = tree.apply_user_overwrite_node(&path("h"), node(json!({"k": 1})), false);
    assert!(hidden.events.is_empty());
    assert_eq!(tree.calc_complete_event_cache(&path("h"), &[]), node(json!({"k": 1})));
    assert_eq!(tree.calc_complete_event_cache(&path("h/k"), &[]), node(json!(1)));
    assert_eq!(tree.calc_complete_event_cache(&path("h"), &[hidden.write_id]), Node::empty());
}

#[test]
fn server_value_reads_without_registering() {
    let (mut tree, listens) = tree();
    let query = Query::new(path("s"));
    tree.add_event_registration(&query, Recorder::default().value_registration());
    tree.apply_server_overwrite(&path("s"), node(json!({"a": 1, "b": {"c": 2}})));
    listens.take();

    assert_eq!(tree.get_server_value(&Query::new(path("s/b"))), Some(node(json!({"c": 2}))));
    assert_eq!(tree.get_server_value(&Query::new(path("elsewhere"))), None);
    assert!(listens.take().is_empty());

    tree.apply_user_overwrite(&path("s/a"), &json!(7)).unwrap();
    assert_eq!(tree.get_server_value(&query), Some(node(json!({"a": 7, "b": {"c": 2}}))));
}

#[test]
fn listen_complete_on_empty_location_reports_null() {
    let mut tree = SyncTree::new(NoopListenProvider);
    let rec = Recorder::default();
    let query = Query::new(path("empty"));
    tree.add_event_registration(&query, rec.value_registration());
    fire(&tree.listen_complete(&query));
    let seen = rec.take();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].value, serde_json::Value::Null);
}

#[test]
fn late_registration_replays_known_data() {
    let mut tree = SyncTree::new(NoopListenProvider);
    tree.add_event_registration(&Query::new(path("r")), Recorder::default().value_registration());
    tree.apply_server_overwrite(&path("r"), node(json!({"b": 2, "a": 1})));

    let rec = Recorder::default();
    let events = tree.add_event_registration(&Query::new(path("r")), rec.child_registration(&[ChildAdded]));
    assert_eq!(summary(&events), vec![(ChildAdded, key("a")), (ChildAdded, key("b"))]);

    // a deeper location reads the ancestor's server cache
    let events = tree.add_event_registration(&Query::new(path("r/b")), rec.value_registration());
    fire(&events);
    assert_eq!(rec.take().last().map(|s| s.value.clone()), Some(json!(2)));
}

// ── Cancellation ────────────────────────────────────────────────────────

#[test]
fn cancelled_listen_notifies_and_clears() {
    let (mut tree, listens) = tree();
    let query = Query::new(path("secret"));
    let errors: Arc<Mutex<Vec<SyncError>>> = Arc::default();
    let sink = Arc::clone(&errors);
    let registration = EventRegistration::value(Arc::new(|_, _| {}))
        .with_cancel(Arc::new(move |err: &SyncError| sink.lock().unwrap().push(err.clone())));
    tree.add_event_registration(&query, Arc::new(registration));
    listens.take();

    let error = SyncError::ListenFailed { path: "/secret".into(), status: "permission_denied".into() };
    let events = tree.cancel_listen(&query, error.clone());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type(), None);
    assert_eq!(events[0].path(), Path::new("secret"));
    fire(&events);
    assert_eq!(*errors.lock().unwrap(), vec![error]);
    assert!(listens.take().is_empty(), "the server already dropped the listen");
    assert!(tree.is_empty());
}
