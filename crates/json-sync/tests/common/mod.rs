#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use json_sync::view::{DataCallback, EventRegistration, EventType};
use json_sync::{Event, ListenProvider, Node, Path, Query};
use serde_json::Value;

pub fn node(value: Value) -> Node {
    Node::from_json(&value)
}

pub fn path(s: &str) -> Path {
    Path::new(s)
}

// ── Listen provider ─────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenCall {
    Start { path: String, query_id: String, tag: Option<u64> },
    Stop { path: String, query_id: String, tag: Option<u64> },
}

/// Records every start/stop so tests can assert on the listen traffic.
#[derive(Clone, Default)]
pub struct RecordingListens {
    pub calls: Arc<Mutex<Vec<ListenCall>>>,
}

impl RecordingListens {
    pub fn take(&self) -> Vec<ListenCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

impl ListenProvider for RecordingListens {
    fn start_listening(&mut self, query: &Query, tag: Option<u64>, _hash: &str) {
        self.calls.lock().unwrap().push(ListenCall::Start {
            path: query.path().to_string(),
            query_id: query.query_identifier(),
            tag,
        });
    }

    fn stop_listening(&mut self, query: &Query, tag: Option<u64>) {
        self.calls.lock().unwrap().push(ListenCall::Stop {
            path: query.path().to_string(),
            query_id: query.query_identifier(),
            tag,
        });
    }
}

// ── Callback recorders ──────────────────────────────────────────────────

/// What a fired callback saw.
#[derive(Clone, Debug, PartialEq)]
pub struct Seen {
    pub event_type: EventType,
    pub key: Option<String>,
    pub value: Value,
    pub prev_name: Option<String>,
}

#[derive(Clone, Default)]
pub struct Recorder {
    pub seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    pub fn callback(&self, event_type: EventType) -> DataCallback {
        let seen = Arc::clone(&self.seen);
        Arc::new(move |snap, prev| {
            seen.lock().unwrap().push(Seen {
                event_type,
                key: snap.key().map(str::to_owned),
                value: snap.val(),
                prev_name: prev.map(str::to_owned),
            });
        })
    }

    pub fn value_registration(&self) -> Arc<EventRegistration> {
        Arc::new(EventRegistration::value(self.callback(EventType::Value)))
    }

    pub fn child_registration(&self, types: &[EventType]) -> Arc<EventRegistration> {
        Arc::new(EventRegistration::child(types.iter().map(|t| (*t, self.callback(*t)))))
    }

    pub fn take(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }
}

pub fn fire(events: &[Event]) {
    for event in events {
        event.fire();
    }
}

/// `(event type, key)` pairs, for compact assertions.
pub fn summary(events: &[Event]) -> Vec<(EventType, Option<String>)> {
    events
        .iter()
        .filter_map(|e| {
            let snap = e.snapshot()?;
            Some((e.event_type()?, snap.key().map(str::to_owned)))
        })
        .collect()
}
