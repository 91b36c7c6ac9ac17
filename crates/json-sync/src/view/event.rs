//! Events handed to user callbacks and the snapshots they carry.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::SyncError;
use crate::path::Path;
use crate::snap::{Index, Node};

use super::change::EventType;
use super::registration::EventRegistration;

// ── DataSnapshot ────────────────────────────────────────────────────────

/// Read-only view of a node at a location, ordered by the index of the
/// query it was produced for.
#[derive(Clone, Debug, PartialEq)]
pub struct DataSnapshot {
    node: Node,
    path: Path,
    index: Index,
}

impl DataSnapshot {
    pub fn new(node: Node, path: Path, index: Index) -> Self {
        DataSnapshot { node, path, index }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last path segment; `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.path.back()
    }

    pub fn val(&self) -> Value {
        self.node.val(false)
    }

    /// Like [`val`](Self::val) but keeps priorities as `.priority` and
    /// `.value` entries.
    pub fn export_val(&self) -> Value {
        self.node.val(true)
    }

    pub fn exists(&self) -> bool {
        !self.node.is_empty()
    }

    pub fn priority(&self) -> Value {
        self.node.priority().val(false)
    }

    /// Snapshot of a descendant. Children are ordered by priority.
    pub fn child(&self, path: &Path) -> DataSnapshot {
        DataSnapshot::new(self.node.get_child(path), self.path.join(path), Index::Priority)
    }

    pub fn has_child(&self, path: &Path) -> bool {
        !self.node.get_child(path).is_empty()
    }

    pub fn num_children(&self) -> usize {
        self.node.num_children()
    }

    /// Immediate children in the order of the snapshot's index.
    pub fn children(&self) -> impl Iterator<Item = DataSnapshot> + '_ {
        self.node
            .children(&self.index)
            .map(move |child| DataSnapshot::new(child.node, self.path.child(&child.name), Index::Priority))
    }
}

// ── Events ──────────────────────────────────────────────────────────────

/// A data event for one registration.
#[derive(Clone)]
pub struct DataEvent {
    pub event_type: EventType,
    pub registration: Arc<EventRegistration>,
    pub snapshot: DataSnapshot,
    /// Name of the preceding child, for `child_*` events other than
    /// `child_removed`.
    pub prev_name: Option<String>,
}

/// A listen revoked by the server.
#[derive(Clone)]
pub struct CancelEvent {
    pub registration: Arc<EventRegistration>,
    pub error: SyncError,
    pub path: Path,
}

#[derive(Clone)]
pub enum Event {
    Data(DataEvent),
    Cancel(CancelEvent),
}

impl Event {
    /// `None` for cancel events.
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            Event::Data(e) => Some(e.event_type),
            Event::Cancel(_) => None,
        }
    }

    /// Location the event is raised at: the snapshot itself for `value`,
    /// the parent of the child for `child_*` events.
    pub fn path(&self) -> Path {
        match self {
            Event::Data(e) if e.event_type == EventType::Value => e.snapshot.path().clone(),
            Event::Data(e) => e.snapshot.path().parent().unwrap_or_default(),
            Event::Cancel(e) => e.path.clone(),
        }
    }

    pub fn registration(&self) -> &Arc<EventRegistration> {
        match self {
            Event::Data(e) => &e.registration,
            Event::Cancel(e) => &e.registration,
        }
    }

    pub fn snapshot(&self) -> Option<&DataSnapshot> {
        match self {
            Event::Data(e) => Some(&e.snapshot),
            Event::Cancel(_) => None,
        }
    }

    /// Invokes the registration's callback for this event, if it has one.
    pub fn fire(&self) {
        match self {
            Event::Data(e) => {
                if let Some(callback) = e.registration.callback_for(e.event_type) {
                    callback(&e.snapshot, e.prev_name.as_deref());
                }
            }
            Event::Cancel(e) => {
                if let Some(cancel) = e.registration.cancel_callback() {
                    cancel(&e.error);
                }
            }
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Data(e) => f
                .debug_struct("DataEvent")
                .field("event_type", &e.event_type)
                .field("path", e.snapshot.path())
                .field("snapshot", e.snapshot.node())
                .field("prev_name", &e.prev_name)
                .finish(),
            Event::Cancel(e) => f
                .debug_struct("CancelEvent")
                .field("path", &e.path)
                .field("error", &e.error)
                .finish(),
        }
    }
}

// ── Dispatch ────────────────────────────────────────────────────────────

/// Delivers events produced by the sync tree to user code.
///
/// The tree only returns events; callers hand them to a dispatcher once
/// the tree call has returned, so callbacks never run inside the engine.
pub trait EventDispatcher {
    fn dispatch(&mut self, events: Vec<Event>);
}

/// Fires every event in order on the calling thread.
#[derive(Debug, Default)]
pub struct CallbackDispatcher;

impl EventDispatcher for CallbackDispatcher {
    fn dispatch(&mut self, events: Vec<Event>) {
        for event in &events {
            event.fire();
        }
    }
}
