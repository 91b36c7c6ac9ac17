//! Node filters decide which children of a location a query keeps.
//!
//! | Filter           | Used when                               |
//! |------------------|-----------------------------------------|
//! | [`IndexedFilter`] | the query loads all data               |
//! | [`RangedFilter`]  | start/end bounds without a limit       |
//! | [`LimitedFilter`] | a limit, with or without bounds        |

mod indexed;
mod limited;
mod ranged;

pub use indexed::IndexedFilter;
pub use limited::LimitedFilter;
pub use ranged::RangedFilter;

use crate::path::Path;
use crate::query::QueryParams;
use crate::snap::{Index, Node};

use super::change::ChildChangeAccumulator;
use super::child_source::CompleteChildSource;

#[derive(Clone, Debug, PartialEq)]
pub enum NodeFilter {
    Indexed(IndexedFilter),
    Ranged(RangedFilter),
    Limited(LimitedFilter),
}

impl NodeFilter {
    pub fn indexed(index: Index) -> Self {
        NodeFilter::Indexed(IndexedFilter::new(index))
    }

    pub fn ranged(params: &QueryParams) -> Self {
        NodeFilter::Ranged(RangedFilter::new(params))
    }

    pub fn limited(params: &QueryParams) -> Self {
        NodeFilter::Limited(LimitedFilter::new(params))
    }

    /// Applies a change to child `key`. `affected_path` is where below the
    /// child the change happened.
    pub fn update_child(
        &self,
        snap: &Node,
        key: &str,
        new_child: Node,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        acc: Option<&mut ChildChangeAccumulator>,
    ) -> Node {
        match self {
            NodeFilter::Indexed(f) => f.update_child(snap, key, new_child, affected_path, source, acc),
            NodeFilter::Ranged(f) => f.update_child(snap, key, new_child, affected_path, source, acc),
            NodeFilter::Limited(f) => f.update_child(snap, key, new_child, affected_path, source, acc),
        }
    }

    pub fn update_full_node(&self, old_snap: &Node, new_snap: Node, acc: Option<&mut ChildChangeAccumulator>) -> Node {
        match self {
            NodeFilter::Indexed(f) => f.update_full_node(old_snap, new_snap, acc),
            NodeFilter::Ranged(f) => f.update_full_node(old_snap, new_snap, acc),
            NodeFilter::Limited(f) => f.update_full_node(old_snap, new_snap, acc),
        }
    }

    pub fn update_priority(&self, old_snap: &Node, priority: Node) -> Node {
        match self {
            NodeFilter::Indexed(f) => f.update_priority(old_snap, priority),
            NodeFilter::Ranged(f) => f.update_priority(old_snap, priority),
            NodeFilter::Limited(f) => f.update_priority(old_snap, priority),
        }
    }

    /// Whether the filter may drop children.
    pub fn filters_nodes(&self) -> bool {
        !matches!(self, NodeFilter::Indexed(_))
    }

    /// The index-only filter underlying this one.
    pub fn indexed_filter(&self) -> NodeFilter {
        match self {
            NodeFilter::Indexed(_) => self.clone(),
            NodeFilter::Ranged(f) => NodeFilter::Indexed(f.indexed_filter().clone()),
            NodeFilter::Limited(f) => NodeFilter::Indexed(f.indexed_filter().clone()),
        }
    }

    pub fn index(&self) -> &Index {
        match self {
            NodeFilter::Indexed(f) => f.index(),
            NodeFilter::Ranged(f) => f.index(),
            NodeFilter::Limited(f) => f.index(),
        }
    }
}
