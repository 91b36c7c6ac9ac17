//! Orderings over a node's children.
//!
//! Every index orders children by an indexed value first and by child name
//! second. The indexed value of a child is its priority, its name, the
//! child itself, or the node found at a sub-path of the child.

use std::cmp::Ordering;
use std::fmt;

use crate::path::Path;
use crate::util::{name_compare, Comparator};

use super::leaf::{LeafNode, LeafValue};
use super::node::{NamedNode, Node};

/// Name of the leaf a priority range post is stored in.
const PRIORITY_POST: &str = "[PRIORITY-POST]";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Index {
    #[default]
    Priority,
    Key,
    Value,
    Path(Path),
}

/// A range bound under some index: below everything, above everything, or
/// at a concrete (name, node) position.
#[derive(Clone, Debug, PartialEq)]
pub enum Post {
    Min,
    At(NamedNode),
    Max,
}

impl Index {
    /// Child-path index. An empty path orders by value.
    pub fn path(path: Path) -> Self {
        if path.is_empty() {
            Index::Value
        } else {
            Index::Path(path)
        }
    }

    pub fn compare(&self, a: &NamedNode, b: &NamedNode) -> Ordering {
        let by_value = match self {
            Index::Priority => a.node.priority().compare_to(&b.node.priority()),
            Index::Key => Ordering::Equal,
            Index::Value => a.node.compare_indexed(&b.node),
            Index::Path(path) => a.node.get_child(path).compare_indexed(&b.node.get_child(path)),
        };
        by_value.then_with(|| name_compare(&a.name, &b.name))
    }

    /// Ordering of a bound against a concrete child.
    pub fn compare_post(&self, post: &Post, node: &NamedNode) -> Ordering {
        match post {
            Post::Min => Ordering::Less,
            Post::Max => Ordering::Greater,
            Post::At(at) => self.compare(at, node),
        }
    }

    /// Whether `node` carries a value for this index at all.
    pub fn is_defined_on(&self, node: &Node) -> bool {
        match self {
            Index::Priority => !node.priority().is_empty(),
            Index::Key | Index::Value => true,
            Index::Path(path) => !node.get_child(path).is_empty(),
        }
    }

    /// Cheap check whether a change from `old` to `new` can move the child
    /// under this index.
    pub fn indexed_value_changed(&self, old: &Node, new: &Node) -> bool {
        match self {
            Index::Priority => old.priority() != new.priority(),
            Index::Key => false,
            Index::Value => old != new,
            Index::Path(path) => {
                old.get_child(path).compare_indexed(&new.get_child(path)) != Ordering::Equal
            }
        }
    }

    /// Builds a range position for an indexed `value` and a tie-breaking
    /// child `name`.
    pub fn make_post(&self, value: &Node, name: &str) -> NamedNode {
        match self {
            Index::Priority => {
                let priority = value.without_priority();
                let post = LeafNode::new(LeafValue::from(PRIORITY_POST), priority);
                NamedNode::new(name, Node::from(post))
            }
            Index::Key => {
                let key = match value.leaf_value() {
                    Some(LeafValue::String(s)) => s.clone(),
                    _ => value.val(false).to_string(),
                };
                NamedNode::new(key, Node::empty())
            }
            Index::Value => NamedNode::new(name, value.clone()),
            Index::Path(path) => NamedNode::new(name, Node::empty().update_child(path, value.clone())),
        }
    }

    pub fn is_key(&self) -> bool {
        matches!(self, Index::Key)
    }
}

impl Comparator<NamedNode> for Index {
    fn compare(&self, a: &NamedNode, b: &NamedNode) -> Ordering {
        Index::compare(self, a, b)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Priority => f.write_str(".priority"),
            Index::Key => f.write_str(".key"),
            Index::Value => f.write_str(".value"),
            Index::Path(path) => f.write_str(&path.segments().join("/")),
        }
    }
}

