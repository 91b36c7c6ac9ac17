use crate::path::Path;
use crate::snap::{Index, Node};
use crate::view::change::{Change, ChildChangeAccumulator};
use crate::view::child_source::CompleteChildSource;

/// Keeps every child; only maintains the index and reports changes.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexedFilter {
    index: Index,
}

impl IndexedFilter {
    pub fn new(index: Index) -> Self {
        IndexedFilter { index }
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn update_child(
        &self,
        snap: &Node,
        key: &str,
        new_child: Node,
        affected_path: &Path,
        _source: &dyn CompleteChildSource,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        assert!(snap.is_indexed(&self.index), "a node must be indexed if only a child is updated");
        let old_child = snap.get_immediate_child(key);
        // a child entering or leaving through a deleted affected path looks
        // the same at that path in both snapshots
        if old_child.get_child(affected_path) == new_child.get_child(affected_path)
            && old_child.is_empty() == new_child.is_empty()
        {
            return snap.clone();
        }
        if let Some(acc) = acc {
            if new_child.is_empty() {
                if snap.has_child(key) {
                    acc.track_child_change(Change::child_removed(key, old_child));
                } else {
                    assert!(snap.is_leaf(), "a child remove without an old child only makes sense on a leaf node");
                }
            } else if old_child.is_empty() {
                acc.track_child_change(Change::child_added(key, new_child.clone()));
            } else {
                acc.track_child_change(Change::child_changed(key, new_child.clone(), old_child));
            }
        }
        if snap.is_leaf() && new_child.is_empty() {
            snap.clone()
        } else {
            snap.update_immediate_child(key, new_child).with_index(&self.index)
        }
    }

    pub fn update_full_node(&self, old_snap: &Node, new_snap: Node, acc: Option<&mut ChildChangeAccumulator>) -> Node {
        if let Some(acc) = acc {
            for old in old_snap.children(&Index::Priority) {
                if !new_snap.has_child(&old.name) {
                    acc.track_child_change(Change::child_removed(&old.name, old.node));
                }
            }
            for new in new_snap.children(&Index::Priority) {
                if old_snap.has_child(&new.name) {
                    let old_child = old_snap.get_immediate_child(&new.name);
                    if old_child != new.node {
                        acc.track_child_change(Change::child_changed(&new.name, new.node, old_child));
                    }
                } else {
                    acc.track_child_change(Change::child_added(&new.name, new.node));
                }
            }
        }
        new_snap.with_index(&self.index)
    }

    pub fn update_priority(&self, old_snap: &Node, priority: Node) -> Node {
        if old_snap.is_empty() {
            Node::empty()
        } else {
            old_snap.update_priority(priority)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::child_source::NoCompleteChildSource;
    use crate::view::change::EventType;
    use serde_json::json;

    #[test]
    fn full_update_reports_diff() {
        let filter = IndexedFilter::new(Index::Priority);
        let old = Node::from_json(&json!({"a": 1, "b": 2}));
        let new = Node::from_json(&json!({"b": 3, "c": 4}));
        let mut acc = ChildChangeAccumulator::new();
        filter.update_full_node(&old, new, Some(&mut acc));
        let kinds: Vec<_> = acc
            .into_changes()
            .into_iter()
            .map(|c| (c.event_type, c.child_name.unwrap_or_default()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (EventType::ChildRemoved, "a".to_string()),
                (EventType::ChildChanged, "b".to_string()),
                (EventType::ChildAdded, "c".to_string()),
            ]
        );
    }

    #[test]
    fn unchanged_child_is_noop() {
        let filter = IndexedFilter::new(Index::Priority);
        let snap = Node::from_json(&json!({"a": 1})).with_index(&Index::Priority);
        let mut acc = ChildChangeAccumulator::new();
        let out = filter.update_child(&snap, "a", Node::from(1i64), &Path::root(), &NoCompleteChildSource, Some(&mut acc));
        assert_eq!(out, snap);
        assert!(acc.into_changes().is_empty());
    }
}
