//! Applies operations to a view cache and collects the resulting changes.
//!
//! The processor is pure: it takes the old [`ViewCache`], an [`Operation`]
//! and the pending writes visible at the view's location, and returns the
//! new cache together with the child and value changes an observer of the
//! event cache would see.

use crate::operation::Operation;
use crate::path::Path;
use crate::snap::{Index, Node};
use crate::util::ImmutableTree;
use crate::write::WriteTreeRef;

use super::cache::ViewCache;
use super::change::{Change, ChildChangeAccumulator};
use super::child_source::{CompleteChildSource, NoCompleteChildSource, WriteTreeCompleteChildSource};
use super::filter::NodeFilter;

#[derive(Debug)]
pub struct ProcessorResult {
    pub view_cache: ViewCache,
    pub changes: Vec<Change>,
}

#[derive(Clone, Debug)]
pub struct ViewProcessor {
    filter: NodeFilter,
}

impl ViewProcessor {
    pub fn new(filter: NodeFilter) -> Self {
        ViewProcessor { filter }
    }

    pub fn filter(&self) -> &NodeFilter {
        &self.filter
    }

    /// # Panics
    ///
    /// If either cache lost the view's index.
    pub fn assert_indexed(&self, view_cache: &ViewCache) {
        let index = self.filter.index();
        let event = view_cache.event_cache().node();
        let server = view_cache.server_cache().node();
        assert!(event.is_empty() || event.is_indexed(index), "event snap not indexed by {index}");
        assert!(server.is_empty() || server.is_indexed(index), "server snap not indexed by {index}");
    }

    pub fn apply_operation(
        &self,
        old: &ViewCache,
        operation: &Operation,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
    ) -> ProcessorResult {
        let mut acc = ChildChangeAccumulator::new();
        let view_cache = match operation {
            Operation::Overwrite { source, path, snap } => {
                if source.from_user() {
                    self.apply_user_overwrite(old, path, snap.clone(), writes, complete_cache, &mut acc)
                } else {
                    // a filtered server cache becomes unfiltered again only
                    // through an overwrite at its root
                    let filter_server_node =
                        source.is_tagged() || (old.server_cache().is_filtered() && !path.is_empty());
                    self.apply_server_overwrite(
                        old,
                        path,
                        snap.clone(),
                        writes,
                        complete_cache,
                        filter_server_node,
                        &mut acc,
                    )
                }
            }
            Operation::Merge { source, path, children } => {
                if source.from_user() {
                    self.apply_user_merge(old, path, children, writes, complete_cache, &mut acc)
                } else {
                    let filter_server_node = source.is_tagged() || old.server_cache().is_filtered();
                    self.apply_server_merge(old, path, children, writes, complete_cache, filter_server_node, &mut acc)
                }
            }
            Operation::AckUserWrite { path, affected_tree, revert } => {
                if *revert {
                    self.revert_user_write(old, path, writes, complete_cache, &mut acc)
                } else {
                    self.ack_user_write(old, path, affected_tree, writes, complete_cache, &mut acc)
                }
            }
            Operation::ListenComplete { path, .. } => self.listen_complete(old, path, writes, &mut acc),
        };
        let mut changes = acc.into_changes();
        maybe_add_value_event(old, &view_cache, &mut changes);
        ProcessorResult { view_cache, changes }
    }

    fn generate_event_cache_after_server_event(
        &self,
        view_cache: &ViewCache,
        change_path: &Path,
        writes: &WriteTreeRef<'_>,
        source: &dyn CompleteChildSource,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        if writes.shadowing_write(change_path).is_some() {
            return view_cache.clone();
        }
        let old_event_snap = view_cache.event_cache();
        let server_cache = view_cache.server_cache();
        let new_event_cache = match change_path.front() {
            None => {
                assert!(
                    server_cache.is_fully_initialized(),
                    "if change path is empty, we must have complete server data"
                );
                if server_cache.is_filtered() {
                    // only complete children may be layered on a filtered
                    // server cache; deep writes below it cannot be trusted
                    let server = server_cache.node();
                    let complete_children = if server.is_leaf() { Node::empty() } else { server.clone() };
                    let children = writes.calc_complete_event_children(Some(&complete_children));
                    self.filter.update_full_node(old_event_snap.node(), children, Some(&mut *acc))
                } else {
                    let complete = writes
                        .calc_complete_event_cache(Some(server_cache.node()))
                        .unwrap_or_else(Node::empty);
                    self.filter.update_full_node(old_event_snap.node(), complete, Some(&mut *acc))
                }
            }
            Some(".priority") => {
                assert_eq!(change_path.len(), 1, "can't have a priority with additional path components");
                let old_event_node = old_event_snap.node();
                match writes.calc_event_cache_after_server_overwrite(
                    change_path,
                    Some(old_event_node),
                    Some(server_cache.node()),
                ) {
                    Some(priority) => self.filter.update_priority(old_event_node, priority),
                    None => old_event_node.clone(),
                }
            }
            Some(child_key) => {
                let child_change_path = change_path.pop_front();
                let new_event_child = if old_event_snap.is_complete_for_child(child_key) {
                    let old_child = old_event_snap.node().get_immediate_child(child_key);
                    match writes.calc_event_cache_after_server_overwrite(
                        change_path,
                        Some(old_event_snap.node()),
                        Some(server_cache.node()),
                    ) {
                        Some(update) => Some(old_child.update_child(&child_change_path, update)),
                        None => Some(old_child),
                    }
                } else {
                    writes.calc_complete_child(child_key, server_cache)
                };
                match new_event_child {
                    Some(child) => self.filter.update_child(
                        old_event_snap.node(),
                        child_key,
                        child,
                        &child_change_path,
                        source,
                        Some(&mut *acc),
                    ),
                    None => old_event_snap.node().clone(),
                }
            }
        };
        view_cache.update_event_snap(
            new_event_cache,
            old_event_snap.is_fully_initialized() || change_path.is_empty(),
            self.filter.filters_nodes(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_server_overwrite(
        &self,
        old: &ViewCache,
        change_path: &Path,
        changed_snap: Node,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        filter_server_node: bool,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let old_server_snap = old.server_cache();
        let server_filter = if filter_server_node { self.filter.clone() } else { self.filter.indexed_filter() };
        let new_server_cache = match change_path.front() {
            None => server_filter.update_full_node(old_server_snap.node(), changed_snap, None),
            Some(_) if server_filter.filters_nodes() && !old_server_snap.is_filtered() => {
                // not filtered yet: run the whole node through the filter
                let new_server_node = old_server_snap.node().update_child(change_path, changed_snap);
                server_filter.update_full_node(old_server_snap.node(), new_server_node, None)
            }
            Some(child_key) => {
                if !old_server_snap.is_complete_for_path(change_path) && change_path.len() > 1 {
                    // a deep update meant for another listener
                    return old.clone();
                }
                let child_change_path = change_path.pop_front();
                let new_child = old_server_snap
                    .node()
                    .get_immediate_child(child_key)
                    .update_child(&child_change_path, changed_snap);
                if child_key == ".priority" {
                    server_filter.update_priority(old_server_snap.node(), new_child)
                } else {
                    server_filter.update_child(
                        old_server_snap.node(),
                        child_key,
                        new_child,
                        &child_change_path,
                        &NoCompleteChildSource,
                        None,
                    )
                }
            }
        };
        let new_view_cache = old.update_server_snap(
            new_server_cache,
            old_server_snap.is_fully_initialized() || change_path.is_empty(),
            server_filter.filters_nodes(),
        );
        let source = WriteTreeCompleteChildSource::new(writes.clone(), &new_view_cache, complete_cache);
        self.generate_event_cache_after_server_event(&new_view_cache, change_path, writes, &source, acc)
    }

    fn apply_user_overwrite(
        &self,
        old: &ViewCache,
        change_path: &Path,
        changed_snap: Node,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let old_event_snap = old.event_cache();
        let source = WriteTreeCompleteChildSource::new(writes.clone(), old, complete_cache);
        match change_path.front() {
            None => {
                let new_event = self.filter.update_full_node(old_event_snap.node(), changed_snap, Some(acc));
                old.update_event_snap(new_event, true, self.filter.filters_nodes())
            }
            Some(".priority") => {
                let new_event = self.filter.update_priority(old_event_snap.node(), changed_snap);
                old.update_event_snap(new_event, old_event_snap.is_fully_initialized(), old_event_snap.is_filtered())
            }
            Some(child_key) => {
                let child_change_path = change_path.pop_front();
                let old_child = old_event_snap.node().get_immediate_child(child_key);
                let new_child = if child_change_path.is_empty() {
                    changed_snap
                } else {
                    match source.complete_child(child_key) {
                        // the server sends the priority along once the
                        // node itself exists
                        Some(child)
                            if child_change_path.back() == Some(".priority")
                                && child
                                    .get_child(&child_change_path.parent().unwrap_or_default())
                                    .is_empty() =>
                        {
                            child
                        }
                        Some(child) => child.update_child(&child_change_path, changed_snap),
                        None => Node::empty(),
                    }
                };
                if old_child == new_child {
                    return old.clone();
                }
                let new_event = self.filter.update_child(
                    old_event_snap.node(),
                    child_key,
                    new_child,
                    &child_change_path,
                    &source,
                    Some(acc),
                );
                old.update_event_snap(new_event, old_event_snap.is_fully_initialized(), self.filter.filters_nodes())
            }
        }
    }

    fn apply_user_merge(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        changed: &ImmutableTree<Node>,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let mut entries = Vec::new();
        changed.foreach(|relative, node| entries.push((path.join(relative), node.clone())));
        // children already in view go first so that a limited window makes
        // room before new children compete for it
        let in_view = |write_path: &Path| {
            write_path
                .front()
                .is_some_and(|front| view_cache.event_cache().is_complete_for_child(front))
        };
        let mut current = view_cache.clone();
        for pass_in_view in [true, false] {
            for (write_path, node) in &entries {
                if in_view(write_path) == pass_in_view {
                    current =
                        self.apply_user_overwrite(&current, write_path, node.clone(), writes, complete_cache, acc);
                }
            }
        }
        current
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_server_merge(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        changed: &ImmutableTree<Node>,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        filter_server_node: bool,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let server_cache = view_cache.server_cache();
        // merges for a location without any data yet were meant for an
        // earlier listen; the full data follows
        if server_cache.node().is_empty() && !server_cache.is_fully_initialized() {
            return view_cache.clone();
        }
        let merge_tree = if path.is_empty() {
            changed.clone()
        } else {
            ImmutableTree::default().set_tree(path, changed.clone())
        };
        let server_node = server_cache.node();
        let mut current = view_cache.clone();
        for (child_key, child_tree) in merge_tree.children() {
            if server_node.has_child(child_key) {
                let new_child = apply_merge(server_node.get_immediate_child(child_key), child_tree);
                current = self.apply_server_overwrite(
                    &current,
                    &Path::from_segments([child_key.as_str()]),
                    new_child,
                    writes,
                    complete_cache,
                    filter_server_node,
                    acc,
                );
            }
        }
        for (child_key, child_tree) in merge_tree.children() {
            let unknown_deep_merge = !server_cache.is_complete_for_child(child_key) && child_tree.value().is_none();
            if !server_node.has_child(child_key) && !unknown_deep_merge {
                let new_child = apply_merge(server_node.get_immediate_child(child_key), child_tree);
                current = self.apply_server_overwrite(
                    &current,
                    &Path::from_segments([child_key.as_str()]),
                    new_child,
                    writes,
                    complete_cache,
                    filter_server_node,
                    acc,
                );
            }
        }
        current
    }

    fn ack_user_write(
        &self,
        view_cache: &ViewCache,
        ack_path: &Path,
        affected_tree: &ImmutableTree<bool>,
        writes: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        if writes.shadowing_write(ack_path).is_some() {
            return view_cache.clone();
        }
        // re-apply the server data under the acked write now that nothing
        // shadows it any more
        let filter_server_node = view_cache.server_cache().is_filtered();
        let server_cache = view_cache.server_cache();
        if affected_tree.value().is_some() {
            if (ack_path.is_empty() && server_cache.is_fully_initialized())
                || server_cache.is_complete_for_path(ack_path)
            {
                return self.apply_server_overwrite(
                    view_cache,
                    ack_path,
                    server_cache.node().get_child(ack_path),
                    writes,
                    complete_cache,
                    filter_server_node,
                    acc,
                );
            }
            if ack_path.is_empty() {
                // acked at a root we only partly know: replay what we have
                let mut changed = ImmutableTree::default();
                for child in server_cache.node().children(&Index::Key) {
                    changed = changed.set(&Path::from_segments([child.name]), child.node);
                }
                return self.apply_server_merge(
                    view_cache,
                    ack_path,
                    &changed,
                    writes,
                    complete_cache,
                    filter_server_node,
                    acc,
                );
            }
            return view_cache.clone();
        }
        let mut changed = ImmutableTree::default();
        affected_tree.foreach(|merge_path, _| {
            let server_cache_path = ack_path.join(merge_path);
            if server_cache.is_complete_for_path(&server_cache_path) {
                changed = changed.set(merge_path, server_cache.node().get_child(&server_cache_path));
            }
        });
        self.apply_server_merge(view_cache, ack_path, &changed, writes, complete_cache, filter_server_node, acc)
    }

    fn listen_complete(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        writes: &WriteTreeRef<'_>,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let old_server = view_cache.server_cache();
        let new_view_cache = view_cache.update_server_snap(
            old_server.node().clone(),
            old_server.is_fully_initialized() || path.is_empty(),
            old_server.is_filtered(),
        );
        self.generate_event_cache_after_server_event(&new_view_cache, path, writes, &NoCompleteChildSource, acc)
    }

    fn revert_user_write(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        writes: &WriteTreeRef<'_>,
        complete_server_cache: Option<&Node>,
        acc: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        if writes.shadowing_write(path).is_some() {
            return view_cache.clone();
        }
        let source = WriteTreeCompleteChildSource::new(writes.clone(), view_cache, complete_server_cache);
        let old_event_cache = view_cache.event_cache().node();
        let server_cache = view_cache.server_cache();
        let new_event_cache = match path.front() {
            None | Some(".priority") => {
                let new_node = if server_cache.is_fully_initialized() {
                    writes
                        .calc_complete_event_cache(view_cache.complete_server_snap())
                        .unwrap_or_else(Node::empty)
                } else {
                    assert!(!server_cache.node().is_leaf(), "server children would be complete if leaf node");
                    writes.calc_complete_event_children(Some(server_cache.node()))
                };
                self.filter.update_full_node(old_event_cache, new_node, Some(&mut *acc))
            }
            Some(child_key) => {
                let child_path = path.pop_front();
                let mut new_child = writes.calc_complete_child(child_key, server_cache);
                if new_child.is_none() && server_cache.is_complete_for_child(child_key) {
                    new_child = Some(old_event_cache.get_immediate_child(child_key));
                }
                let mut new_event_cache = match new_child {
                    Some(child) => self.filter.update_child(
                        old_event_cache,
                        child_key,
                        child,
                        &child_path,
                        &source,
                        Some(&mut *acc),
                    ),
                    // nothing complete to restore: drop what is there
                    None if old_event_cache.has_child(child_key) => self.filter.update_child(
                        old_event_cache,
                        child_key,
                        Node::empty(),
                        &child_path,
                        &source,
                        Some(&mut *acc),
                    ),
                    None => old_event_cache.clone(),
                };
                if new_event_cache.is_empty() && server_cache.is_fully_initialized() {
                    // every child write was reverted; the location may
                    // have been a leaf all along
                    let complete = writes.calc_complete_event_cache(view_cache.complete_server_snap());
                    if let Some(complete) = complete.filter(Node::is_leaf) {
                        new_event_cache = self.filter.update_full_node(&new_event_cache, complete, Some(&mut *acc));
                    }
                }
                new_event_cache
            }
        };
        let complete = server_cache.is_fully_initialized() || writes.shadowing_write(&Path::root()).is_some();
        view_cache.update_event_snap(new_event_cache, complete, self.filter.filters_nodes())
    }
}

fn apply_merge(node: Node, merge: &ImmutableTree<Node>) -> Node {
    let mut node = node;
    merge.foreach(|relative, child| node = node.update_child(relative, child.clone()));
    node
}

/// Appends a `value` change when the event cache is complete and any child
/// changed, it just became complete, or its scalar value or priority moved.
fn maybe_add_value_event(old: &ViewCache, new: &ViewCache, changes: &mut Vec<Change>) {
    let event_snap = new.event_cache();
    if !event_snap.is_fully_initialized() {
        return;
    }
    let node = event_snap.node();
    let leaf_or_empty = node.is_leaf() || node.is_empty();
    let needs_value = match old.complete_event_snap() {
        None => true,
        Some(old_node) => {
            !changes.is_empty() || (leaf_or_empty && node != old_node) || node.priority() != old_node.priority()
        }
    };
    if needs_value {
        changes.push(Change::value(node.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationSource;
    use crate::view::cache::CacheNode;
    use crate::view::change::EventType;
    use crate::write::WriteTree;
    use serde_json::json;

    fn n(v: serde_json::Value) -> Node {
        Node::from_json(&v)
    }

    fn empty_cache() -> ViewCache {
        ViewCache::new(CacheNode::new(Node::empty(), false, false), CacheNode::new(Node::empty(), false, false))
    }

    fn kinds(changes: &[Change]) -> Vec<(EventType, Option<&str>)> {
        changes.iter().map(|c| (c.event_type, c.child_name.as_deref())).collect()
    }

    #[test]
    fn server_overwrite_initializes() {
        let processor = ViewProcessor::new(NodeFilter::indexed(Index::Priority));
        let writes = WriteTree::new();
        let op = Operation::Overwrite { source: OperationSource::Server, path: Path::root(), snap: n(json!({"a": 1})) };
        let result = processor.apply_operation(&empty_cache(), &op, &writes.child_writes(&Path::root()), None);
        assert_eq!(kinds(&result.changes), vec![(EventType::ChildAdded, Some("a")), (EventType::Value, None)]);
        assert!(result.view_cache.server_cache().is_fully_initialized());
        processor.assert_indexed(&result.view_cache);
    }

    #[test]
    fn user_write_on_empty_view_is_partial() {
        let processor = ViewProcessor::new(NodeFilter::indexed(Index::Priority));
        let mut writes = WriteTree::new();
        writes.add_overwrite(Path::new("a"), n(json!(1)), 1, true);
        let op = Operation::Overwrite { source: OperationSource::User, path: Path::new("a"), snap: n(json!(1)) };
        let result = processor.apply_operation(&empty_cache(), &op, &writes.child_writes(&Path::root()), None);
        assert_eq!(kinds(&result.changes), vec![(EventType::ChildAdded, Some("a"))]);
        assert!(!result.view_cache.event_cache().is_fully_initialized());
    }

    #[test]
    fn shadowed_server_update_is_ignored() {
        let processor = ViewProcessor::new(NodeFilter::indexed(Index::Priority));
        let mut writes = WriteTree::new();
        writes.add_overwrite(Path::new("a"), n(json!(5)), 1, true);
        let start = ViewCache::new(
            CacheNode::new(n(json!({"a": 5})), true, false),
            CacheNode::new(n(json!({"a": 1})), true, false),
        );
        let op = Operation::Overwrite { source: OperationSource::Server, path: Path::new("a"), snap: n(json!(2)) };
        let result = processor.apply_operation(&start, &op, &writes.child_writes(&Path::root()), None);
        assert!(result.changes.is_empty());
        assert_eq!(result.view_cache.event_cache().node(), &n(json!({"a": 5})));
        assert_eq!(result.view_cache.server_cache().node(), &n(json!({"a": 2})));
    }

    #[test]
    fn listen_complete_on_empty_location_fires_value() {
        let processor = ViewProcessor::new(NodeFilter::indexed(Index::Priority));
        let writes = WriteTree::new();
        let op = Operation::ListenComplete { source: OperationSource::Server, path: Path::root() };
        let result = processor.apply_operation(&empty_cache(), &op, &writes.child_writes(&Path::root()), None);
        assert_eq!(kinds(&result.changes), vec![(EventType::Value, None)]);
    }
}
