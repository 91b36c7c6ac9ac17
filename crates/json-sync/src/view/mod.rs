//! Per-query views: cached state, change computation and event generation.
//!
//! | Module | Contents |
//! |--------|----------|
//! [`cache`] | [`CacheNode`], [`ViewCache`] |
//! [`change`] | [`Change`]s and their accumulator |
//! [`filter`] | index, range and limit filters |
//! [`child_source`] | where limit filters find children outside the window |
//! [`processor`] | [`ViewProcessor`]: operation → new cache + changes |
//! [`event_generator`] | changes → ordered events |
//! [`registration`] | listeners and their callbacks |
//! [`event`] | [`Event`], [`DataSnapshot`], dispatch |

pub mod cache;
pub mod change;
pub mod child_source;
pub mod event;
pub mod event_generator;
pub mod filter;
pub mod processor;
pub mod registration;

use std::sync::Arc;

pub use cache::{CacheNode, ViewCache};
pub use change::{Change, ChildChangeAccumulator, EventType};
pub use event::{CallbackDispatcher, CancelEvent, DataEvent, DataSnapshot, Event, EventDispatcher};
pub use event_generator::EventGenerator;
pub use filter::NodeFilter;
pub use processor::{ProcessorResult, ViewProcessor};
pub use registration::{CancelCallback, DataCallback, EventRegistration};

use crate::error::SyncError;
use crate::operation::Operation;
use crate::path::Path;
use crate::query::Query;
use crate::snap::{Index, Node};
use crate::write::WriteTreeRef;

use filter::IndexedFilter;

/// The registrations of one query at one location together with the
/// cached data they observe.
#[derive(Clone, Debug)]
pub struct View {
    query: Query,
    processor: ViewProcessor,
    view_cache: ViewCache,
    registrations: Vec<Arc<EventRegistration>>,
    event_generator: EventGenerator,
}

impl View {
    pub fn new(query: Query, initial: ViewCache) -> Self {
        let index_filter = IndexedFilter::new(query.index().clone());
        let filter = query.params().node_filter();
        let server = initial.server_cache();
        let event = initial.event_cache();
        let server_snap = index_filter.update_full_node(&Node::empty(), server.node().clone(), None);
        let event_snap = filter.update_full_node(&Node::empty(), event.node().clone(), None);
        let view_cache = ViewCache::new(
            CacheNode::new(event_snap, event.is_fully_initialized(), filter.filters_nodes()),
            CacheNode::new(server_snap, server.is_fully_initialized(), false),
        );
        View {
            event_generator: EventGenerator::new(query.clone()),
            processor: ViewProcessor::new(filter),
            query,
            view_cache,
            registrations: Vec::new(),
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn view_cache(&self) -> &ViewCache {
        &self.view_cache
    }

    pub fn server_cache(&self) -> &Node {
        self.view_cache.server_cache().node()
    }

    /// The event cache, if complete.
    pub fn complete_node(&self) -> Option<&Node> {
        self.view_cache.complete_event_snap()
    }

    /// Complete server data at `path` below the view, if this view has it.
    /// A filtered view only vouches for children it currently holds.
    pub fn complete_server_cache(&self, path: &Path) -> Option<Node> {
        let cache = self.view_cache.complete_server_snap()?;
        let held = path.front().is_some_and(|front| !cache.get_immediate_child(front).is_empty());
        if self.query.loads_all_data() || held {
            Some(cache.get_child(path))
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn registrations(&self) -> &[Arc<EventRegistration>] {
        &self.registrations
    }

    pub fn add_event_registration(&mut self, registration: Arc<EventRegistration>) {
        self.registrations.push(registration);
    }

    /// Removes the first registration matching `registration` (every match
    /// for a wildcard), or all of them when `None`. With `cancel_error`
    /// every registration is dropped and the cancel events of those that
    /// asked for them are returned.
    pub fn remove_event_registration(
        &mut self,
        registration: Option<&EventRegistration>,
        cancel_error: Option<&SyncError>,
    ) -> Vec<Event> {
        let mut cancel_events = Vec::new();
        if let Some(error) = cancel_error {
            assert!(registration.is_none(), "a cancel should cancel all event registrations");
            let path = self.query.path();
            cancel_events.extend(self.registrations.iter().filter_map(|r| r.create_cancel_event(error, path)));
        }
        match registration {
            Some(target) => {
                let mut remaining = Vec::with_capacity(self.registrations.len());
                let mut registrations = std::mem::take(&mut self.registrations).into_iter();
                while let Some(existing) = registrations.next() {
                    if !existing.matches(target) {
                        remaining.push(existing);
                    } else if target.has_any_callback() {
                        remaining.extend(registrations.by_ref());
                        break;
                    }
                }
                self.registrations = remaining;
            }
            None => self.registrations.clear(),
        }
        cancel_events
    }

    /// # Panics
    ///
    /// If the server cache goes from complete to incomplete, or (with
    /// `verify_indexed`) if a cache loses the view's index.
    pub fn apply_operation(
        &mut self,
        operation: &Operation,
        writes: &WriteTreeRef<'_>,
        complete_server_cache: Option<&Node>,
        verify_indexed: bool,
    ) -> Vec<Event> {
        if let Operation::Merge { source, .. } = operation {
            if source.is_tagged() {
                assert!(
                    self.view_cache.complete_server_snap().is_some(),
                    "we should always have a full cache before handling merges"
                );
                assert!(
                    self.view_cache.complete_event_snap().is_some(),
                    "missing event cache, even though we have a server cache"
                );
            }
        }
        let result = self.processor.apply_operation(&self.view_cache, operation, writes, complete_server_cache);
        if verify_indexed {
            self.processor.assert_indexed(&result.view_cache);
        }
        assert!(
            result.view_cache.server_cache().is_fully_initialized()
                || !self.view_cache.server_cache().is_fully_initialized(),
            "once a server snap is complete, it should never go back"
        );
        self.view_cache = result.view_cache;
        self.generate_events(&result.changes, None)
    }

    /// Replays the current state to a new registration: one `child_added`
    /// per child in index order, then `value` if the view is complete.
    pub fn initial_events(&self, registration: &Arc<EventRegistration>) -> Vec<Event> {
        let event_snap = self.view_cache.event_cache();
        let node = event_snap.node();
        let mut changes: Vec<Change> =
            node.children(&Index::Priority).map(|child| Change::child_added(&child.name, child.node)).collect();
        if event_snap.is_fully_initialized() {
            changes.push(Change::value(node.clone()));
        }
        self.generate_events(&changes, Some(registration))
    }

    fn generate_events(&self, changes: &[Change], only: Option<&Arc<EventRegistration>>) -> Vec<Event> {
        let event_cache = self.view_cache.event_cache().node();
        match only {
            Some(registration) => self.event_generator.generate_events_for_changes(
                changes,
                event_cache,
                std::slice::from_ref(registration),
            ),
            None => self.event_generator.generate_events_for_changes(changes, event_cache, &self.registrations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationSource;
    use crate::query::QueryParams;
    use crate::write::WriteTree;
    use serde_json::json;

    fn noop() -> DataCallback {
        Arc::new(|_, _| {})
    }

    fn complete(json: serde_json::Value) -> ViewCache {
        let node = Node::from_json(&json);
        ViewCache::new(CacheNode::new(node.clone(), true, false), CacheNode::new(node, true, false))
    }

    #[test]
    fn initial_events_replay_children_then_value() {
        let view = View::new(Query::new(Path::new("x")), complete(json!({"b": 2, "a": 1})));
        let reg = Arc::new(EventRegistration::child([(EventType::ChildAdded, noop())]));
        let events = view.initial_events(&reg);
        let keys: Vec<_> = events.iter().filter_map(|e| e.snapshot()?.key().map(str::to_owned)).collect();
        assert_eq!(keys, vec!["a", "b"]);

        let value = Arc::new(EventRegistration::value(noop()));
        let events = view.initial_events(&value);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].snapshot().map(DataSnapshot::val), Some(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn limited_view_filters_initial_cache() {
        let params = QueryParams::new().limit_to_last(1).unwrap();
        let view = View::new(Query::with_params(Path::root(), params), complete(json!({"a": 1, "b": 2})));
        assert_eq!(view.complete_node(), Some(&Node::from_json(&json!({"b": 2}))));
        assert!(view.complete_server_cache(&Path::new("a")).is_some());
        assert!(view.complete_server_cache(&Path::new("zz")).is_none());
    }

    #[test]
    fn remove_stops_after_first_match() {
        let cb = noop();
        let mut view = View::new(Query::new(Path::root()), complete(json!({})));
        view.add_event_registration(Arc::new(EventRegistration::value(cb.clone())));
        view.add_event_registration(Arc::new(EventRegistration::value(cb.clone())));
        view.remove_event_registration(Some(&EventRegistration::value(cb)), None);
        assert_eq!(view.registrations().len(), 1);
        view.remove_event_registration(Some(&EventRegistration::any_value()), None);
        assert!(view.is_empty());
    }

    #[test]
    fn apply_operation_emits_to_registrations() {
        let mut view = View::new(Query::new(Path::root()), complete(json!({"a": 1})));
        view.add_event_registration(Arc::new(EventRegistration::value(noop())));
        let writes = WriteTree::new();
        let op = Operation::Overwrite { source: OperationSource::Server, path: Path::new("b"), snap: Node::from(2i64) };
        let events = view.apply_operation(&op, &writes.child_writes(&Path::root()), None, true);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), Some(EventType::Value));
    }
}
