mod common;

use std::collections::BTreeMap;

use common::{node, path, summary, ListenCall, Recorder, RecordingListens};
use json_sync::view::EventType;
use json_sync::{Query, QueryParams, SyncTree, SyncTreeConfig};
use serde_json::json;

fn start(path: &str, query_id: &str, tag: Option<u64>) -> ListenCall {
    ListenCall::Start { path: path.to_owned(), query_id: query_id.to_owned(), tag }
}

fn stop(path: &str, query_id: &str, tag: Option<u64>) -> ListenCall {
    ListenCall::Stop { path: path.to_owned(), query_id: query_id.to_owned(), tag }
}

fn limited(at: &str, n: u32) -> Query {
    Query::with_params(path(at), QueryParams::new().limit_to_first(n).unwrap())
}

#[test]
fn default_listen_is_started_once_per_location() {
    let listens = RecordingListens::default();
    let mut tree = SyncTree::new(listens.clone());
    let query = Query::new(path("a"));
    tree.add_event_registration(&query, Recorder::default().value_registration());
    tree.add_event_registration(&query, Recorder::default().value_registration());
    assert_eq!(listens.take(), vec![start("/a", "default", None)]);

    tree.remove_event_registration(&query, None);
    assert_eq!(listens.take(), vec![stop("/a", "default", None)]);
    assert!(tree.is_empty());
}

#[test]
fn ancestor_listen_shadows_descendants() {
    let listens = RecordingListens::default();
    let mut tree = SyncTree::new(listens.clone());
    tree.add_event_registration(&Query::new(path("a/b")), Recorder::default().value_registration());
    assert_eq!(listens.take(), vec![start("/a/b", "default", None)]);

    tree.add_event_registration(&Query::new(path("a")), Recorder::default().value_registration());
    assert_eq!(listens.take(), vec![start("/a", "default", None), stop("/a/b", "default", None)]);

    // covered by /a
    tree.add_event_registration(&Query::new(path("a/c")), Recorder::default().value_registration());
    assert!(listens.take().is_empty());

    tree.remove_event_registration(&Query::new(path("a")), None);
    assert_eq!(
        listens.take(),
        vec![start("/a/b", "default", None), start("/a/c", "default", None), stop("/a", "default", None)]
    );
}

#[test]
fn descendant_removal_under_covering_listen_is_silent() {
    let listens = RecordingListens::default();
    let mut tree = SyncTree::new(listens.clone());
    tree.add_event_registration(&Query::new(path("a")), Recorder::default().value_registration());
    tree.add_event_registration(&Query::new(path("a/b")), Recorder::default().value_registration());
    listens.take();
    tree.remove_event_registration(&Query::new(path("a/b")), None);
    assert!(listens.take().is_empty());
}

#[test]
fn filtered_query_gets_a_tag() {
    let listens = RecordingListens::default();
    let mut tree = SyncTree::new(listens.clone());
    let query = limited("q", 2);
    let query_id = query.query_identifier();
    let rec = Recorder::default();
    tree.add_event_registration(&query, rec.child_registration(&[EventType::ChildAdded]));
    tree.add_event_registration(&query, rec.value_registration());
    assert_eq!(tree.tag_for_query(&query), Some(1));
    assert_eq!(listens.take(), vec![start("/q", &query_id, Some(1))]);

    let events = tree.apply_tagged_query_overwrite(&path("q"), node(json!({"a": 1, "b": 2})), 1);
    assert_eq!(
        summary(&events),
        vec![
            (EventType::ChildAdded, Some("a".to_owned())),
            (EventType::ChildAdded, Some("b".to_owned())),
            (EventType::Value, Some("q".to_owned())),
        ]
    );

    tree.remove_event_registration(&query, None);
    assert_eq!(listens.take(), vec![stop("/q", &query_id, Some(1))]);
    assert_eq!(tree.tag_for_query(&query), None);
}

#[test]
fn tagged_update_for_unknown_tag_is_dropped() {
    let mut tree = SyncTree::new(RecordingListens::default());
    tree.add_event_registration(&limited("q", 1), Recorder::default().value_registration());
    assert!(tree.apply_tagged_query_overwrite(&path("q"), node(json!({"a": 1})), 99).is_empty());
    assert!(tree.apply_tagged_listen_complete(&path("q"), 99).is_empty());
}

#[test]
fn tagged_merge_updates_filtered_view() {
    let mut tree = SyncTree::new(RecordingListens::default());
    let query = limited("q", 2);
    let rec = Recorder::default();
    tree.add_event_registration(&query, rec.child_registration(&[EventType::ChildChanged]));
    tree.add_event_registration(&query, rec.value_registration());
    let tag = tree.tag_for_query(&query).unwrap();
    tree.apply_tagged_query_overwrite(&path("q"), node(json!({"a": 1, "b": 2})), tag);
    rec.take();

    let changed = BTreeMap::from([(path("a"), node(json!(5)))]);
    assert!(tree.apply_tagged_query_merge(&path("q"), &changed, tag + 1).is_empty());

    let events = tree.apply_tagged_query_merge(&path("q"), &changed, tag);
    assert_eq!(
        summary(&events),
        vec![(EventType::ChildChanged, Some("a".to_owned())), (EventType::Value, Some("q".to_owned()))]
    );
    let value = events.last().and_then(|e| e.snapshot()).map(|s| s.val());
    assert_eq!(value, Some(json!({"a": 5, "b": 2})));
}

#[test]
fn untagged_server_data_reaches_filtered_views() {
    let mut tree = SyncTree::new(RecordingListens::default());
    let rec = Recorder::default();
    let query = limited("q", 1);
    tree.add_event_registration(&query, rec.child_registration(&[EventType::ChildAdded]));
    let events = tree.apply_server_overwrite(&path("q"), node(json!({"b": 2, "a": 1})));
    assert_eq!(summary(&events), vec![(EventType::ChildAdded, Some("a".to_owned()))]);
}

#[test]
fn listen_complete_routes_by_tag() {
    let mut tree = SyncTree::new(RecordingListens::default());
    let rec = Recorder::default();
    let query = limited("q", 5);
    tree.add_event_registration(&query, rec.value_registration());
    let events = tree.listen_complete(&query);
    assert_eq!(summary(&events), vec![(EventType::Value, Some("q".to_owned()))]);
}

#[test]
fn configured_counters_seed_ids_and_tags() {
    let config = SyncTreeConfig::from_toml_str("first_write_id = 10\nfirst_query_tag = 100").unwrap();
    let listens = RecordingListens::default();
    let mut tree = SyncTree::with_config(listens.clone(), config);
    let query = limited("q", 1);
    tree.add_event_registration(&query, Recorder::default().value_registration());
    assert_eq!(tree.tag_for_query(&query), Some(100));
    let write = tree.apply_user_overwrite(&path("w"), &json!(1)).unwrap();
    assert_eq!(write.write_id, 10);
    assert_eq!(tree.config().first_query_tag, 100);
}

#[test]
fn readding_default_listen_stops_filtered_listen_at_same_location() {
    let listens = RecordingListens::default();
    let mut tree = SyncTree::new(listens.clone());
    let query = limited("q", 1);
    let query_id = query.query_identifier();
    tree.add_event_registration(&query, Recorder::default().value_registration());
    listens.take();
    tree.add_event_registration(&Query::new(path("q")), Recorder::default().value_registration());
    assert_eq!(listens.take(), vec![start("/q", "default", None), stop("/q", &query_id, Some(1))]);
}
