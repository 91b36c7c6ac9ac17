use std::cmp::Ordering;

use crate::path::Path;
use crate::query::QueryParams;
use crate::snap::{Index, NamedNode, Node};
use crate::view::change::{Change, ChildChangeAccumulator};
use crate::view::child_source::CompleteChildSource;

use super::{IndexedFilter, RangedFilter};

/// Keeps at most `limit` children of a range, counted from the start
/// (or from the end when viewing from the right).
///
/// When a child leaves a full window the next one outside it is pulled in
/// through the [`CompleteChildSource`].
#[derive(Clone, Debug, PartialEq)]
pub struct LimitedFilter {
    ranged: RangedFilter,
    index: Index,
    limit: usize,
    reverse: bool,
}

impl LimitedFilter {
    pub fn new(params: &QueryParams) -> Self {
        LimitedFilter {
            ranged: RangedFilter::new(params),
            index: params.index().clone(),
            limit: params.limit().unwrap_or(u32::MAX) as usize,
            reverse: !params.is_view_from_left(),
        }
    }

    pub fn indexed_filter(&self) -> &IndexedFilter {
        self.ranged.indexed_filter()
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    fn within_directional_start(&self, node: &NamedNode) -> bool {
        if self.reverse {
            self.ranged.within_end(node)
        } else {
            self.ranged.within_start(node)
        }
    }

    fn within_directional_end(&self, node: &NamedNode) -> bool {
        if self.reverse {
            self.ranged.within_start(node)
        } else {
            self.ranged.within_end(node)
        }
    }

    /// Index order in the window's direction.
    fn cmp(&self, a: &NamedNode, b: &NamedNode) -> Ordering {
        if self.reverse {
            self.index.compare(b, a)
        } else {
            self.index.compare(a, b)
        }
    }

    pub fn update_child(
        &self,
        snap: &Node,
        key: &str,
        new_child: Node,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        let new_child = if self.ranged.matches(&NamedNode::new(key, new_child.clone())) {
            new_child
        } else {
            Node::empty()
        };
        if snap.get_immediate_child(key) == new_child {
            snap.clone()
        } else if snap.num_children() < self.limit {
            self.indexed_filter().update_child(snap, key, new_child, affected_path, source, acc)
        } else {
            self.full_limit_update_child(snap, key, new_child, source, acc)
        }
    }

    pub fn update_full_node(&self, old_snap: &Node, new_snap: Node, acc: Option<&mut ChildChangeAccumulator>) -> Node {
        let filtered = if new_snap.is_leaf() || new_snap.is_empty() {
            Node::empty().with_index(&self.index)
        } else if self.limit.saturating_mul(2) < new_snap.num_children() && new_snap.is_indexed(&self.index) {
            // much larger than the window: build up instead of deleting
            let mut filtered = Node::empty().with_index(&self.index);
            let iter = if self.reverse {
                new_snap.children_rev_from(self.ranged.end_post(), &self.index)
            } else {
                new_snap.children_from(self.ranged.start_post(), &self.index)
            };
            let mut count = 0;
            for next in iter {
                if count >= self.limit {
                    break;
                }
                if !self.within_directional_start(&next) {
                    continue;
                }
                if !self.within_directional_end(&next) {
                    break;
                }
                filtered = filtered.update_immediate_child(&next.name, next.node);
                count += 1;
            }
            filtered
        } else {
            // queries do not carry priorities
            let mut filtered = new_snap.with_index(&self.index).update_priority(Node::empty());
            let ordered: Vec<NamedNode> = if self.reverse {
                filtered.children_rev(&self.index).collect()
            } else {
                filtered.children(&self.index).collect()
            };
            let mut count = 0;
            for next in ordered {
                let in_range =
                    count < self.limit && self.within_directional_start(&next) && self.within_directional_end(&next);
                if in_range {
                    count += 1;
                } else {
                    filtered = filtered.update_immediate_child(&next.name, Node::empty());
                }
            }
            filtered
        };
        self.indexed_filter().update_full_node(old_snap, filtered, acc)
    }

    pub fn update_priority(&self, old_snap: &Node, _priority: Node) -> Node {
        old_snap.clone()
    }

    fn full_limit_update_child(
        &self,
        snap: &Node,
        key: &str,
        child_snap: Node,
        source: &dyn CompleteChildSource,
        mut acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        assert_eq!(snap.num_children(), self.limit, "limited update on a window that is not full");
        let boundary = if self.reverse { snap.first_child(&self.index) } else { snap.last_child(&self.index) };
        let Some(boundary) = boundary else {
            return snap.clone();
        };
        let new_named = NamedNode::new(key, child_snap.clone());
        let in_range = self.ranged.matches(&new_named);

        if snap.has_child(key) {
            let old_child = snap.get_immediate_child(key);
            let mut next = source.child_after_child(&self.index, &boundary, self.reverse);
            // skip children already in the window or being replaced; a merge
            // may not have reached them yet
            while let Some(candidate) = &next {
                if candidate.name == key || snap.has_child(&candidate.name) {
                    next = source.child_after_child(&self.index, candidate, self.reverse);
                } else {
                    break;
                }
            }
            let compare_next = next.as_ref().map_or(Ordering::Greater, |n| self.cmp(n, &new_named));
            let remains_in_window = in_range && !child_snap.is_empty() && compare_next != Ordering::Less;
            if remains_in_window {
                if let Some(acc) = acc.as_deref_mut() {
                    acc.track_child_change(Change::child_changed(key, child_snap.clone(), old_child));
                }
                return snap.update_immediate_child(key, child_snap);
            }
            if let Some(acc) = acc.as_deref_mut() {
                acc.track_child_change(Change::child_removed(key, old_child));
            }
            let without = snap.update_immediate_child(key, Node::empty());
            match next.filter(|n| self.ranged.matches(n)) {
                Some(next) => {
                    if let Some(acc) = acc.as_deref_mut() {
                        acc.track_child_change(Change::child_added(&next.name, next.node.clone()));
                    }
                    without.update_immediate_child(&next.name, next.node)
                }
                None => without,
            }
        } else if child_snap.is_empty() {
            // deleting something outside the window
            snap.clone()
        } else if in_range && self.cmp(&boundary, &new_named) != Ordering::Less {
            if let Some(acc) = acc.as_deref_mut() {
                acc.track_child_change(Change::child_removed(&boundary.name, boundary.node.clone()));
                acc.track_child_change(Change::child_added(key, child_snap.clone()));
            }
            snap.update_immediate_child(key, child_snap)
                .update_immediate_child(&boundary.name, Node::empty())
        } else {
            snap.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::change::EventType;
    use crate::view::child_source::NoCompleteChildSource;
    use serde_json::json;

    fn first_two_by_value() -> LimitedFilter {
        let params = QueryParams::new().order_by(Index::Value).unwrap().limit_to_first(2).unwrap();
        LimitedFilter::new(&params)
    }

    #[test]
    fn full_node_keeps_window() {
        let filter = first_two_by_value();
        let out = filter.update_full_node(&Node::empty(), Node::from_json(&json!({"a": 3, "b": 1, "c": 2, "d": 4})), None);
        assert_eq!(out, Node::from_json(&json!({"b": 1, "c": 2})));
    }

    #[test]
    fn last_n_keeps_tail() {
        let params = QueryParams::new().order_by(Index::Key).unwrap().limit_to_last(1).unwrap();
        let filter = LimitedFilter::new(&params);
        let big = Node::from_json(&json!({"a": 1, "b": 1, "c": 1})).with_index(&Index::Key);
        let out = filter.update_full_node(&Node::empty(), big, None);
        assert_eq!(out, Node::from_json(&json!({"c": 1})));
    }

    #[test]
    fn smaller_child_evicts_boundary() {
        let filter = first_two_by_value();
        let window = filter.update_full_node(&Node::empty(), Node::from_json(&json!({"b": 1, "c": 2})), None);
        let mut acc = ChildChangeAccumulator::new();
        let out = filter.update_child(&window, "a", Node::from(0i64), &Path::root(), &NoCompleteChildSource, Some(&mut acc));
        assert_eq!(out, Node::from_json(&json!({"a": 0, "b": 1})));
        let changes: Vec<_> = acc.into_changes().into_iter().map(|c| c.event_type).collect();
        assert_eq!(changes, vec![EventType::ChildRemoved, EventType::ChildAdded]);
    }

    #[test]
    fn larger_child_is_ignored() {
        let filter = first_two_by_value();
        let window = filter.update_full_node(&Node::empty(), Node::from_json(&json!({"b": 1, "c": 2})), None);
        let out = filter.update_child(&window, "z", Node::from(9i64), &Path::root(), &NoCompleteChildSource, None);
        assert_eq!(out, window);
    }
}
