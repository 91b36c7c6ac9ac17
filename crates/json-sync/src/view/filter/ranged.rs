use std::cmp::Ordering;

use crate::path::Path;
use crate::query::QueryParams;
use crate::snap::{Index, NamedNode, Node, Post};
use crate::view::change::ChildChangeAccumulator;
use crate::view::child_source::CompleteChildSource;

use super::IndexedFilter;

/// Keeps the children between a start and an end post.
#[derive(Clone, Debug, PartialEq)]
pub struct RangedFilter {
    indexed: IndexedFilter,
    index: Index,
    start_post: Post,
    end_post: Post,
    start_inclusive: bool,
    end_inclusive: bool,
}

impl RangedFilter {
    pub fn new(params: &QueryParams) -> Self {
        RangedFilter {
            indexed: IndexedFilter::new(params.index().clone()),
            index: params.index().clone(),
            start_post: params.start_post(),
            end_post: params.end_post(),
            start_inclusive: params.start_inclusive(),
            end_inclusive: params.end_inclusive(),
        }
    }

    pub fn indexed_filter(&self) -> &IndexedFilter {
        &self.indexed
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn start_post(&self) -> &Post {
        &self.start_post
    }

    pub fn end_post(&self) -> &Post {
        &self.end_post
    }

    pub(crate) fn within_start(&self, node: &NamedNode) -> bool {
        let ord = self.index.compare_post(&self.start_post, node);
        if self.start_inclusive {
            ord != Ordering::Greater
        } else {
            ord == Ordering::Less
        }
    }

    pub(crate) fn within_end(&self, node: &NamedNode) -> bool {
        let ord = self.index.compare_post(&self.end_post, node).reverse();
        if self.end_inclusive {
            ord != Ordering::Greater
        } else {
            ord == Ordering::Less
        }
    }

    pub fn matches(&self, node: &NamedNode) -> bool {
        self.within_start(node) && self.within_end(node)
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
        let new_child = if self.matches(&NamedNode::new(key, new_child.clone())) {
            new_child
        } else {
            Node::empty()
        };
        self.indexed.update_child(snap, key, new_child, affected_path, source, acc)
    }

    pub fn update_full_node(&self, old_snap: &Node, new_snap: Node, acc: Option<&mut ChildChangeAccumulator>) -> Node {
        let new_snap = if new_snap.is_leaf() { Node::empty() } else { new_snap };
        // queries do not carry priorities
        let mut filtered = new_snap.with_index(&self.index).update_priority(Node::empty());
        for child in new_snap.children(&Index::Priority) {
            if !self.matches(&child) {
                filtered = filtered.update_immediate_child(&child.name, Node::empty());
            }
        }
        self.indexed.update_full_node(old_snap, filtered, acc)
    }

    pub fn update_priority(&self, old_snap: &Node, _priority: Node) -> Node {
        old_snap.clone()
    }
}
