//! All views at one location.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::SyncError;
use crate::operation::Operation;
use crate::path::Path;
use crate::query::Query;
use crate::snap::Node;
use crate::view::{CacheNode, Event, EventRegistration, View, ViewCache};
use crate::write::WriteTreeRef;

/// Views keyed by query identifier; `"default"` is the unfiltered one.
///
/// At most one default view is kept per location. Filtered views, and views
/// that load all data under another ordering, sit next to it.
#[derive(Clone, Debug, Default)]
pub struct SyncPoint {
    views: IndexMap<String, View>,
}

/// What [`SyncPoint::remove_event_registration`] took down.
#[derive(Debug, Default)]
pub struct Removal {
    /// Queries whose views were dropped, as they need to stop listening. A
    /// lost complete view shows up as the default query at the location.
    pub removed: Vec<Query>,
    pub events: Vec<Event>,
}

impl SyncPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Tagged operations go to their query's view only.
    ///
    /// # Panics
    ///
    /// If a tagged operation names a query without a view here.
    pub fn apply_operation(
        &mut self,
        operation: &Operation,
        writes: &WriteTreeRef<'_>,
        complete_server_cache: Option<&Node>,
        verify_indexed: bool,
    ) -> Vec<Event> {
        match operation.source().query_id() {
            Some(query_id) => {
                let Some(view) = self.views.get_mut(query_id) else {
                    panic!("operation for unknown query {query_id}");
                };
                view.apply_operation(operation, writes, complete_server_cache, verify_indexed)
            }
            None => self
                .views
                .values_mut()
                .flat_map(|view| view.apply_operation(operation, writes, complete_server_cache, verify_indexed))
                .collect(),
        }
    }

    /// The existing view for `query`, or a detached new one seeded from
    /// the writes over `server_cache`: complete data if derivable, else
    /// whatever children are known.
    pub fn get_view(
        &self,
        query: &Query,
        writes: &WriteTreeRef<'_>,
        server_cache: &Node,
        server_cache_complete: bool,
    ) -> View {
        if let Some(view) = self.views.get(&query.query_identifier()) {
            return view.clone();
        }
        Self::new_view(query, writes, server_cache, server_cache_complete)
    }

    fn new_view(query: &Query, writes: &WriteTreeRef<'_>, server_cache: &Node, server_cache_complete: bool) -> View {
        let complete = writes.calc_complete_event_cache(server_cache_complete.then_some(server_cache));
        let (event_cache, event_cache_complete) = match complete {
            Some(node) => (node, true),
            None if !server_cache.is_leaf() => (writes.calc_complete_event_children(Some(server_cache)), false),
            None => (Node::empty(), false),
        };
        let view_cache = ViewCache::new(
            CacheNode::new(event_cache, event_cache_complete, false),
            CacheNode::new(server_cache.clone(), server_cache_complete, false),
        );
        View::new(query.clone(), view_cache)
    }

    /// Adds `registration` to the view for `query`, creating the view if
    /// needed, and returns the events replaying its current state.
    pub fn add_event_registration(
        &mut self,
        query: &Query,
        registration: Arc<EventRegistration>,
        writes: &WriteTreeRef<'_>,
        server_cache: &Node,
        server_cache_complete: bool,
    ) -> Vec<Event> {
        let view = self
            .views
            .entry(query.query_identifier())
            .or_insert_with(|| Self::new_view(query, writes, server_cache, server_cache_complete));
        view.add_event_registration(Arc::clone(&registration));
        view.initial_events(&registration)
    }

    /// Removes matching registrations from the view for `query`, or from
    /// every view for the default query. `None` removes all of them.
    pub fn remove_event_registration(
        &mut self,
        query: &Query,
        registration: Option<&EventRegistration>,
        cancel_error: Option<&SyncError>,
    ) -> Removal {
        let mut removal = Removal::default();
        let had_complete_view = self.has_complete_view();
        let query_id = query.query_identifier();
        let targets: Vec<String> = if query.is_default() {
            self.views.keys().cloned().collect()
        } else {
            self.views.contains_key(&query_id).then_some(query_id).into_iter().collect()
        };
        for id in targets {
            let Some(view) = self.views.get_mut(&id) else { continue };
            removal.events.extend(view.remove_event_registration(registration, cancel_error));
            if view.is_empty() {
                if let Some(view) = self.views.shift_remove(&id) {
                    if !view.query().loads_all_data() {
                        removal.removed.push(view.query().clone());
                    }
                }
            }
        }
        if had_complete_view && !self.has_complete_view() {
            removal.removed.push(Query::new(query.path().clone()));
        }
        removal
    }

    /// Views of filtered queries.
    pub fn query_views(&self) -> impl Iterator<Item = &View> {
        self.views.values().filter(|view| !view.query().loads_all_data())
    }

    /// Complete server data at `path` below this location, from any view.
    pub fn complete_server_cache(&self, path: &Path) -> Option<Node> {
        self.views.values().find_map(|view| view.complete_server_cache(path))
    }

    /// The view serving `query`: the complete view for queries loading all
    /// data, else the one with the same identifier.
    pub fn view_for_query(&self, query: &Query) -> Option<&View> {
        if query.loads_all_data() {
            self.complete_view()
        } else {
            self.views.get(&query.query_identifier())
        }
    }

    pub fn view_exists_for_query(&self, query: &Query) -> bool {
        self.view_for_query(query).is_some()
    }

    pub fn has_complete_view(&self) -> bool {
        self.complete_view().is_some()
    }

    pub fn complete_view(&self) -> Option<&View> {
        self.views.values().find(|view| view.query().loads_all_data())
    }
}
