//! Diffs between successive event caches of a view.

use std::fmt;

use indexmap::IndexMap;

use crate::snap::Node;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    ChildAdded,
    ChildRemoved,
    ChildChanged,
    ChildMoved,
    Value,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ChildAdded => "child_added",
            EventType::ChildRemoved => "child_removed",
            EventType::ChildChanged => "child_changed",
            EventType::ChildMoved => "child_moved",
            EventType::Value => "value",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub event_type: EventType,
    pub snapshot: Node,
    pub child_name: Option<String>,
    /// The previous value, for `child_changed`.
    pub old_snap: Option<Node>,
    /// Name of the preceding sibling, filled in when events are generated.
    pub prev_name: Option<String>,
}

impl Change {
    fn child(event_type: EventType, name: &str, snapshot: Node, old_snap: Option<Node>) -> Self {
        Change { event_type, snapshot, child_name: Some(name.to_owned()), old_snap, prev_name: None }
    }

    pub fn value(snapshot: Node) -> Self {
        Change { event_type: EventType::Value, snapshot, child_name: None, old_snap: None, prev_name: None }
    }

    pub fn child_added(name: &str, snapshot: Node) -> Self {
        Self::child(EventType::ChildAdded, name, snapshot, None)
    }

    pub fn child_removed(name: &str, snapshot: Node) -> Self {
        Self::child(EventType::ChildRemoved, name, snapshot, None)
    }

    pub fn child_changed(name: &str, snapshot: Node, old_snap: Node) -> Self {
        Self::child(EventType::ChildChanged, name, snapshot, Some(old_snap))
    }

    pub fn child_moved(name: &str, snapshot: Node) -> Self {
        Self::child(EventType::ChildMoved, name, snapshot, None)
    }
}

/// Collapses successive child changes into one net change per child,
/// keeping the order in which children were first touched.
#[derive(Debug, Default)]
pub struct ChildChangeAccumulator {
    changes: IndexMap<String, Change>,
}

impl ChildChangeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// On anything but added/removed/changed, on `.priority`, and on
    /// combinations that cannot follow each other.
    pub fn track_child_change(&mut self, change: Change) {
        use EventType::*;
        let Some(name) = change.child_name.clone() else {
            panic!("only child changes can be tracked");
        };
        assert!(
            matches!(change.event_type, ChildAdded | ChildChanged | ChildRemoved),
            "only added, changed and removed child changes can be tracked"
        );
        assert!(name != ".priority", "priority changes cannot be tracked");
        let Some(old) = self.changes.get(&name) else {
            self.changes.insert(name, change);
            return;
        };
        let merged = match (change.event_type, old.event_type) {
            (ChildAdded, ChildRemoved) => Some(Change::child_changed(&name, change.snapshot, old.snapshot.clone())),
            (ChildRemoved, ChildAdded) => None,
            (ChildRemoved, ChildChanged) => {
                Some(Change::child_removed(&name, old.old_snap.clone().unwrap_or_else(Node::empty)))
            }
            (ChildChanged, ChildAdded) => Some(Change::child_added(&name, change.snapshot)),
            (ChildChanged, ChildChanged) => Some(Change::child_changed(
                &name,
                change.snapshot,
                old.old_snap.clone().unwrap_or_else(Node::empty),
            )),
            (new, old) => panic!("illegal combination of changes: {new} occurred after {old}"),
        };
        match merged {
            Some(merged) => {
                self.changes.insert(name, merged);
            }
            None => {
                self.changes.shift_remove(&name);
            }
        }
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes.into_values().collect()
    }
}
