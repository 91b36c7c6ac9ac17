//! Turns the changes of one view operation into per-registration events.

use std::sync::Arc;

use crate::query::Query;
use crate::snap::{NamedNode, Node};

use super::change::{Change, EventType};
use super::event::Event;
use super::registration::EventRegistration;

/// Emission order within one batch.
const ORDER: [EventType; 5] = [
    EventType::ChildRemoved,
    EventType::ChildAdded,
    EventType::ChildMoved,
    EventType::ChildChanged,
    EventType::Value,
];

#[derive(Clone, Debug)]
pub struct EventGenerator {
    query: Query,
}

impl EventGenerator {
    pub fn new(query: Query) -> Self {
        EventGenerator { query }
    }

    /// Events grouped by type (removed, added, moved, changed, value) and
    /// sorted by index within each group. A `child_changed` that changes
    /// the indexed value also yields a `child_moved`.
    pub fn generate_events_for_changes(
        &self,
        changes: &[Change],
        event_cache: &Node,
        registrations: &[Arc<EventRegistration>],
    ) -> Vec<Event> {
        let index = self.query.index();
        let moves: Vec<Change> = changes
            .iter()
            .filter(|c| c.event_type == EventType::ChildChanged)
            .filter(|c| c.old_snap.as_ref().is_some_and(|old| index.indexed_value_changed(old, &c.snapshot)))
            .filter_map(|c| c.child_name.as_deref().map(|name| Change::child_moved(name, c.snapshot.clone())))
            .collect();

        let mut events = Vec::new();
        for event_type in ORDER {
            let source = if event_type == EventType::ChildMoved { &moves[..] } else { changes };
            let mut of_type: Vec<&Change> = source.iter().filter(|c| c.event_type == event_type).collect();
            of_type.sort_by(|a, b| match (&a.child_name, &b.child_name) {
                (Some(an), Some(bn)) => index.compare(
                    &NamedNode::new(an.as_str(), a.snapshot.clone()),
                    &NamedNode::new(bn.as_str(), b.snapshot.clone()),
                ),
                _ => std::cmp::Ordering::Equal,
            });
            for change in of_type {
                let materialized = self.materialize(change, event_cache);
                for registration in registrations {
                    if registration.responds_to(event_type) {
                        events.push(registration.create_event(&materialized, &self.query));
                    }
                }
            }
        }
        events
    }

    fn materialize(&self, change: &Change, event_cache: &Node) -> Change {
        let mut change = change.clone();
        if let (EventType::ChildAdded | EventType::ChildChanged | EventType::ChildMoved, Some(name)) =
            (change.event_type, change.child_name.as_deref())
        {
            change.prev_name = event_cache.predecessor_child_name(name, &change.snapshot, self.query.index());
        }
        change
    }
}
