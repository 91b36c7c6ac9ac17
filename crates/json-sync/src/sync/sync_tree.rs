//! The coordinator: sync points by location, the pending writes, and the
//! listens held upstream.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::config::SyncTreeConfig;
use crate::error::SyncError;
use crate::operation::{Operation, OperationSource};
use crate::path::Path;
use crate::query::{Query, QueryKey};
use crate::snap::Node;
use crate::util::ImmutableTree;
use crate::validation;
use crate::view::{Event, EventRegistration};
use crate::write::{WriteData, WriteTree, WriteTreeRef};

use super::listen::ListenProvider;
use super::sync_point::{Removal, SyncPoint};

/// A user write recorded in the tree and the events it raised locally.
#[derive(Debug)]
pub struct AppliedWrite {
    pub write_id: u64,
    pub events: Vec<Event>,
}

/// Owns every [`SyncPoint`] and the pending user writes.
///
/// All methods run synchronously and return the events they raised; hand
/// those to an [`EventDispatcher`](crate::view::EventDispatcher) once the
/// call returns. Sync points exist only where a listener is registered.
pub struct SyncTree {
    sync_point_tree: ImmutableTree<SyncPoint>,
    pending_write_tree: WriteTree,
    tag_to_query: HashMap<u64, QueryKey>,
    query_to_tag: HashMap<QueryKey, u64>,
    next_query_tag: u64,
    next_write_id: u64,
    listen_provider: Box<dyn ListenProvider>,
    config: SyncTreeConfig,
}

impl SyncTree {
    pub fn new(listen_provider: impl ListenProvider + 'static) -> Self {
        Self::with_config(listen_provider, SyncTreeConfig::default())
    }

    pub fn with_config(listen_provider: impl ListenProvider + 'static, config: SyncTreeConfig) -> Self {
        SyncTree {
            sync_point_tree: ImmutableTree::default(),
            pending_write_tree: WriteTree::new(),
            tag_to_query: HashMap::new(),
            query_to_tag: HashMap::new(),
            next_query_tag: config.first_query_tag,
            next_write_id: config.first_write_id,
            listen_provider: Box::new(listen_provider),
            config,
        }
    }

    pub fn config(&self) -> &SyncTreeConfig {
        &self.config
    }

    pub fn pending_writes(&self) -> &WriteTree {
        &self.pending_write_tree
    }

    /// No listeners and no pending writes.
    pub fn is_empty(&self) -> bool {
        self.sync_point_tree.is_empty() && self.pending_write_tree.is_empty()
    }

    pub fn tag_for_query(&self, query: &Query) -> Option<u64> {
        self.query_to_tag.get(&query.key()).copied()
    }

    fn allocate_write_id(&mut self) -> u64 {
        let id = self.next_write_id;
        self.next_write_id += 1;
        id
    }

    // ── User writes ─────────────────────────────────────────────────────

    /// Sets `data` at `path` optimistically.
    pub fn apply_user_overwrite(&mut self, path: &Path, data: &Value) -> Result<AppliedWrite, SyncError> {
        validation::validate_writable_path(path)?;
        validation::validate_data(path, data)?;
        Ok(self.apply_user_overwrite_node(path, Node::from_json(data), true))
    }

    /// Records an already validated overwrite. Hidden writes are kept for
    /// [`calc_complete_event_cache`](Self::calc_complete_event_cache) but
    /// raise no events.
    pub fn apply_user_overwrite_node(&mut self, path: &Path, node: Node, visible: bool) -> AppliedWrite {
        let write_id = self.allocate_write_id();
        debug!(write_id, %path, visible, "user overwrite");
        self.pending_write_tree.add_overwrite(path.clone(), node.clone(), write_id, visible);
        let events = if visible {
            self.apply_operation_to_sync_points(Operation::Overwrite {
                source: OperationSource::User,
                path: path.clone(),
                snap: node,
            })
        } else {
            Vec::new()
        };
        AppliedWrite { write_id, events }
    }

    /// Updates several locations below `path` at once. Keys are relative
    /// paths.
    pub fn apply_user_merge(&mut self, path: &Path, children: &Map<String, Value>) -> Result<AppliedWrite, SyncError> {
        validation::validate_writable_path(path)?;
        let relative = validation::validate_merge(path, children)?;
        let changed: BTreeMap<Path, Node> =
            relative.into_iter().zip(children.values()).map(|(rel, value)| (rel, Node::from_json(value))).collect();
        Ok(self.apply_user_merge_nodes(path, changed))
    }

    pub fn apply_user_merge_nodes(&mut self, path: &Path, changed: BTreeMap<Path, Node>) -> AppliedWrite {
        let write_id = self.allocate_write_id();
        debug!(write_id, %path, children = changed.len(), "user merge");
        let children = merge_tree(&changed);
        self.pending_write_tree.add_merge(path.clone(), changed, write_id);
        let events = self.apply_operation_to_sync_points(Operation::Merge {
            source: OperationSource::User,
            path: path.clone(),
            children,
        });
        AppliedWrite { write_id, events }
    }

    pub fn apply_user_priority_update(&mut self, path: &Path, priority: &Value) -> Result<AppliedWrite, SyncError> {
        validation::validate_writable_path(path)?;
        validation::validate_priority(priority)?;
        Ok(self.apply_user_overwrite_node(&path.child(".priority"), Node::from_json(priority), true))
    }

    /// Drops pending write `write_id`, confirmed by the server or, with
    /// `revert`, rejected. Views it touched are recomputed from the data
    /// that remains.
    pub fn ack_user_write(&mut self, write_id: u64, revert: bool) -> Result<Vec<Event>, SyncError> {
        let write = self.pending_write_tree.get_write(write_id).cloned().ok_or(SyncError::UnknownWrite(write_id))?;
        debug!(write_id, path = %write.path, revert, "user write acknowledged");
        if !self.pending_write_tree.remove_write(write_id) {
            return Ok(Vec::new());
        }
        let affected_tree = match &write.data {
            WriteData::Overwrite(_) => ImmutableTree::leaf(true),
            WriteData::Merge(children) => children
                .keys()
                .fold(ImmutableTree::default(), |tree, child| tree.set(child, true)),
        };
        Ok(self.apply_operation_to_sync_points(Operation::AckUserWrite { path: write.path, affected_tree, revert }))
    }

    // ── Server updates ──────────────────────────────────────────────────

    pub fn apply_server_overwrite(&mut self, path: &Path, node: Node) -> Vec<Event> {
        self.apply_operation_to_sync_points(Operation::Overwrite {
            source: OperationSource::Server,
            path: path.clone(),
            snap: node,
        })
    }

    pub fn apply_server_merge(&mut self, path: &Path, changed: &BTreeMap<Path, Node>) -> Vec<Event> {
        self.apply_operation_to_sync_points(Operation::Merge {
            source: OperationSource::Server,
            path: path.clone(),
            children: merge_tree(changed),
        })
    }

    /// The server finished sending the initial data for `path`.
    pub fn apply_listen_complete(&mut self, path: &Path) -> Vec<Event> {
        self.apply_operation_to_sync_points(Operation::ListenComplete {
            source: OperationSource::Server,
            path: path.clone(),
        })
    }

    /// Overwrite addressed to the filtered query listening under `tag`.
    /// Updates for tags no longer tracked are dropped.
    pub fn apply_tagged_query_overwrite(&mut self, path: &Path, node: Node, tag: u64) -> Vec<Event> {
        self.apply_tagged(tag, path, |source, relative| Operation::Overwrite { source, path: relative, snap: node })
    }

    pub fn apply_tagged_query_merge(&mut self, path: &Path, changed: &BTreeMap<Path, Node>, tag: u64) -> Vec<Event> {
        let children = merge_tree(changed);
        self.apply_tagged(tag, path, |source, relative| Operation::Merge { source, path: relative, children })
    }

    pub fn apply_tagged_listen_complete(&mut self, path: &Path, tag: u64) -> Vec<Event> {
        self.apply_tagged(tag, path, |source, relative| Operation::ListenComplete { source, path: relative })
    }

    fn apply_tagged(
        &mut self,
        tag: u64,
        path: &Path,
        operation: impl FnOnce(OperationSource, Path) -> Operation,
    ) -> Vec<Event> {
        let Some(key) = self.tag_to_query.get(&tag).cloned() else {
            warn!(tag, %path, "dropping server update for unknown query tag");
            return Vec::new();
        };
        let operation = operation(OperationSource::ServerTaggedQuery(key.query_id), Path::relative(&key.path, path));
        let writes = self.pending_write_tree.child_writes(&key.path);
        let verify_indexed = self.config.verify_indexed;
        let Some(sync_point) = self.sync_point_tree.get_mut(&key.path) else {
            panic!("missing sync point for query tag {tag}");
        };
        let events = sync_point.apply_operation(&operation, &writes, None, verify_indexed);
        trace!(tag, path = %key.path, events = events.len(), "applied tagged operation");
        events
    }

    /// The listen for `query` was answered: tagged or not, its data is now
    /// complete.
    pub fn listen_complete(&mut self, query: &Query) -> Vec<Event> {
        match self.tag_for_query(query) {
            Some(tag) => self.apply_tagged_listen_complete(query.path(), tag),
            None => self.apply_listen_complete(query.path()),
        }
    }

    fn apply_operation_to_sync_points(&mut self, operation: Operation) -> Vec<Event> {
        let writes = self.pending_write_tree.child_writes(&Path::root());
        let events = apply_operation_helper(
            &operation,
            &mut self.sync_point_tree,
            None,
            &writes,
            self.config.verify_indexed,
        );
        trace!(path = %operation.path(), events = events.len(), "applied operation");
        events
    }

    // ── Registrations ───────────────────────────────────────────────────

    /// Attaches `registration` to `query` and returns the events replaying
    /// what is already known there. Starts a server listen unless the
    /// query's view already exists or a default listen above covers it.
    pub fn add_event_registration(&mut self, query: &Query, registration: Arc<EventRegistration>) -> Vec<Event> {
        let path = query.path();
        let mut server_cache: Option<Node> = None;
        let mut found_ancestor_default_view = false;
        self.sync_point_tree.foreach_on_path(path, |at, sync_point| {
            if server_cache.is_none() {
                server_cache = sync_point.complete_server_cache(&Path::relative(at, path));
            }
            found_ancestor_default_view |= sync_point.has_complete_view();
        });
        match self.sync_point_tree.get(path) {
            Some(sync_point) => {
                found_ancestor_default_view |= sync_point.has_complete_view();
                if server_cache.is_none() {
                    server_cache = sync_point.complete_server_cache(&Path::root());
                }
            }
            None => debug!(%path, "creating sync point"),
        }
        let server_cache_complete = server_cache.is_some();
        let server_cache = server_cache.unwrap_or_else(|| self.complete_children_below(path));

        let view_already_exists = self.sync_point_tree.get(path).is_some_and(|sp| sp.view_exists_for_query(query));
        if !view_already_exists && !query.loads_all_data() {
            let key = query.key();
            assert!(!self.query_to_tag.contains_key(&key), "view does not exist, but we have a tag");
            let tag = self.next_query_tag;
            self.next_query_tag += 1;
            self.query_to_tag.insert(key.clone(), tag);
            self.tag_to_query.insert(tag, key);
        }

        let writes = self.pending_write_tree.child_writes(path);
        let sync_point = self.sync_point_tree.get_or_insert_with(path, SyncPoint::new);
        let events =
            sync_point.add_event_registration(query, registration, &writes, &server_cache, server_cache_complete);
        if !view_already_exists && !found_ancestor_default_view {
            self.setup_listener(query);
        }
        events
    }

    /// Removes matching registrations (all of them with `None`) and stops
    /// listens nothing needs any more. Listens below a removed default
    /// listen are re-established.
    pub fn remove_event_registration(
        &mut self,
        query: &Query,
        registration: Option<&EventRegistration>,
    ) -> Vec<Event> {
        self.remove_registrations(query, registration, None)
    }

    /// The server revoked the listen for `query`: every registration there
    /// is removed, and those with a cancel callback get a cancel event.
    pub fn cancel_listen(&mut self, query: &Query, error: SyncError) -> Vec<Event> {
        debug!(path = %query.path(), %error, "listen cancelled");
        self.remove_registrations(query, None, Some(&error))
    }

    fn remove_registrations(
        &mut self,
        query: &Query,
        registration: Option<&EventRegistration>,
        cancel_error: Option<&SyncError>,
    ) -> Vec<Event> {
        let path = query.path();
        let Some(sync_point) = self.sync_point_tree.get_mut(path) else {
            return Vec::new();
        };
        // removing a default query touches every query here; any other
        // query only its own view
        if !query.is_default() && !sync_point.view_exists_for_query(query) {
            return Vec::new();
        }
        let Removal { removed, events } = sync_point.remove_event_registration(query, registration, cancel_error);
        if sync_point.is_empty() {
            debug!(%path, "pruning sync point");
            self.sync_point_tree = self.sync_point_tree.remove(path);
        }

        let removing_default = removed.iter().any(Query::loads_all_data);
        let covered = self
            .sync_point_tree
            .find_on_path(path, |_, sync_point| sync_point.has_complete_view().then_some(()))
            .is_some();

        if removing_default && !covered {
            // listens below were shadowed by the one going away
            let views_to_listen = self
                .sync_point_tree
                .subtree(path)
                .map(collect_distinct_view_queries)
                .unwrap_or_default();
            for view_query in views_to_listen {
                self.start_listen(&view_query);
            }
        }

        // a cancelled listen is already gone upstream
        if !covered && !removed.is_empty() && cancel_error.is_none() {
            if removing_default {
                debug!(%path, "stop listening");
                self.listen_provider.stop_listening(&query.for_listening(), None);
            } else {
                for removed_query in &removed {
                    let tag = self.tag_for_query(removed_query);
                    debug!(path = %removed_query.path(), ?tag, "stop listening");
                    self.listen_provider.stop_listening(&removed_query.for_listening(), tag);
                }
            }
        }
        self.remove_tags(&removed);
        events
    }

    fn remove_tags(&mut self, queries: &[Query]) {
        for query in queries.iter().filter(|q| !q.loads_all_data()) {
            if let Some(tag) = self.query_to_tag.remove(&query.key()) {
                self.tag_to_query.remove(&tag);
            }
        }
    }

    // ── Listens ─────────────────────────────────────────────────────────

    fn start_listen(&mut self, query: &Query) {
        let tag = self.tag_for_query(query);
        let hash = self
            .sync_point_tree
            .get(query.path())
            .and_then(|sp| sp.view_for_query(query))
            .map(|view| view.server_cache().hash().to_owned())
            .unwrap_or_default();
        debug!(path = %query.path(), query_id = %query.query_identifier(), ?tag, "start listening");
        self.listen_provider.start_listening(&query.for_listening(), tag, &hash);
    }

    fn setup_listener(&mut self, query: &Query) {
        self.start_listen(query);
        let Some(subtree) = self.sync_point_tree.subtree(query.path()) else {
            return;
        };
        if self.tag_for_query(query).is_some() {
            assert!(
                !subtree.value().is_some_and(SyncPoint::has_complete_view),
                "a filtered query being added should not be shadowed"
            );
            return;
        }
        // a default listen shadows every listen at or below it
        let queries_to_stop = subtree.fold(|relative, sync_point, children: Vec<(String, Vec<Query>)>| {
            match sync_point.and_then(SyncPoint::complete_view) {
                Some(view) if !relative.is_empty() => vec![view.query().clone()],
                _ => {
                    let mut queries: Vec<Query> = sync_point
                        .map(|sp| sp.query_views().map(|view| view.query().clone()).collect())
                        .unwrap_or_default();
                    queries.extend(children.into_iter().flat_map(|(_, child)| child));
                    queries
                }
            }
        });
        for query_to_stop in queries_to_stop {
            let tag = self.tag_for_query(&query_to_stop);
            debug!(path = %query_to_stop.path(), ?tag, "stop listening, shadowed");
            self.listen_provider.stop_listening(&query_to_stop.for_listening(), tag);
        }
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Server data cached by sync points directly below `path`.
    fn complete_children_below(&self, path: &Path) -> Node {
        let mut cache = Node::empty();
        if let Some(subtree) = self.sync_point_tree.subtree(path) {
            subtree.foreach_child(|name, sync_point| {
                if let Some(complete) = sync_point.complete_server_cache(&Path::root()) {
                    cache = cache.update_immediate_child(name, complete);
                }
            });
        }
        cache
    }

    /// What the user sees at `path`, hidden writes included, ignoring the
    /// writes in `exclude`. Unknown data reads as empty.
    pub fn calc_complete_event_cache(&self, path: &Path, exclude: &[u64]) -> Node {
        let server_cache = self
            .sync_point_tree
            .find_on_path(path, |at, sync_point| sync_point.complete_server_cache(&Path::relative(at, path)));
        self.pending_write_tree
            .calc_complete_event_cache(path, server_cache.as_ref(), exclude, true)
            .unwrap_or_else(Node::empty)
    }

    /// The complete value `query` would show from cached server data and
    /// pending writes, without registering anything.
    pub fn get_server_value(&self, query: &Query) -> Option<Node> {
        let path = query.path();
        let mut server_cache: Option<Node> = None;
        self.sync_point_tree.foreach_on_path(path, |at, sync_point| {
            if server_cache.is_none() {
                server_cache = sync_point.complete_server_cache(&Path::relative(at, path));
            }
        });
        let existing = self.sync_point_tree.get(path);
        if server_cache.is_none() {
            server_cache = existing.and_then(|sp| sp.complete_server_cache(&Path::root()));
        }
        let complete = server_cache.is_some();
        let server_cache = server_cache.unwrap_or_else(Node::empty);
        let writes = self.pending_write_tree.child_writes(path);
        let view = existing.cloned().unwrap_or_default().get_view(query, &writes, &server_cache, complete);
        view.complete_node().cloned()
    }
}

impl fmt::Debug for SyncTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTree")
            .field("sync_point_tree", &self.sync_point_tree)
            .field("pending_write_tree", &self.pending_write_tree)
            .field("tag_to_query", &self.tag_to_query)
            .field("next_query_tag", &self.next_query_tag)
            .field("next_write_id", &self.next_write_id)
            .finish_non_exhaustive()
    }
}

// ── Operation fan-out ───────────────────────────────────────────────────

fn merge_tree(changed: &BTreeMap<Path, Node>) -> ImmutableTree<Node> {
    changed.iter().fold(ImmutableTree::default(), |tree, (path, node)| tree.set(path, node.clone()))
}

/// Walks down to the operation's location, then hands it to every sync
/// point on the way back up, deepest first.
fn apply_operation_helper(
    operation: &Operation,
    tree: &mut ImmutableTree<SyncPoint>,
    server_cache: Option<Node>,
    writes: &WriteTreeRef<'_>,
    verify_indexed: bool,
) -> Vec<Event> {
    let Some(child_name) = operation.path().front().map(str::to_owned) else {
        return apply_operation_descendants_helper(operation, tree, server_cache, writes, verify_indexed);
    };
    let server_cache =
        server_cache.or_else(|| tree.value().and_then(|sp| sp.complete_server_cache(&Path::root())));
    let mut events = Vec::new();
    if let Some(child_operation) = operation.operation_for_child(&child_name) {
        if let Some(child_tree) = tree.child_mut(&child_name) {
            let child_server_cache = server_cache.as_ref().map(|node| node.get_immediate_child(&child_name));
            events.extend(apply_operation_helper(
                &child_operation,
                child_tree,
                child_server_cache,
                &writes.child(&child_name),
                verify_indexed,
            ));
        }
    }
    if let Some(sync_point) = tree.value_mut() {
        events.extend(sync_point.apply_operation(operation, writes, server_cache.as_ref(), verify_indexed));
    }
    events
}

/// Applies an operation rooted at this location to every sync point at
/// or below it.
fn apply_operation_descendants_helper(
    operation: &Operation,
    tree: &mut ImmutableTree<SyncPoint>,
    server_cache: Option<Node>,
    writes: &WriteTreeRef<'_>,
    verify_indexed: bool,
) -> Vec<Event> {
    let server_cache =
        server_cache.or_else(|| tree.value().and_then(|sp| sp.complete_server_cache(&Path::root())));
    let mut events = Vec::new();
    for (child_name, child_tree) in tree.children_mut() {
        let Some(child_operation) = operation.operation_for_child(child_name) else {
            continue;
        };
        let child_server_cache = server_cache.as_ref().map(|node| node.get_immediate_child(child_name));
        events.extend(apply_operation_descendants_helper(
            &child_operation,
            child_tree,
            child_server_cache,
            &writes.child(child_name),
            verify_indexed,
        ));
    }
    if let Some(sync_point) = tree.value_mut() {
        events.extend(sync_point.apply_operation(operation, writes, server_cache.as_ref(), verify_indexed));
    }
    events
}

/// Queries that need their own listen once nothing above covers them: the
/// complete view where a location has one, otherwise its filtered views and
/// whatever lies deeper.
fn collect_distinct_view_queries(subtree: &ImmutableTree<SyncPoint>) -> Vec<Query> {
    subtree.fold(|_, sync_point, children: Vec<(String, Vec<Query>)>| {
        if let Some(view) = sync_point.and_then(SyncPoint::complete_view) {
            return vec![view.query().clone()];
        }
        let mut queries: Vec<Query> =
            sync_point.map(|sp| sp.query_views().map(|view| view.query().clone()).collect()).unwrap_or_default();
        queries.extend(children.into_iter().flat_map(|(_, child)| child));
        queries
    })
}
