use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::path::Path;

use super::children::ChildrenNode;
use super::index::{Index, Post};
use super::leaf::{LeafNode, LeafValue};

/// Immutable snapshot of a subtree.
///
/// `null` is represented by the empty children node; writing it anywhere
/// deletes that location. All mutators return a new node and share
/// untouched structure with `self`.
#[derive(Clone)]
pub enum Node {
    Leaf(Arc<LeafNode>),
    Children(Arc<ChildrenNode>),
}

/// A child together with its name.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedNode {
    pub name: String,
    pub node: Node,
}

impl NamedNode {
    pub fn new(name: impl Into<String>, node: Node) -> Self {
        NamedNode { name: name.into(), node }
    }
}

/// Boxed iterator over children in some index order.
pub type ChildIter<'a> = Box<dyn Iterator<Item = NamedNode> + 'a>;

impl Node {
    /// The canonical empty node.
    pub fn empty() -> Node {
        static EMPTY: OnceLock<Node> = OnceLock::new();
        EMPTY
            .get_or_init(|| Node::Children(Arc::new(ChildrenNode::empty())))
            .clone()
    }

    pub fn leaf(value: impl Into<LeafValue>) -> Node {
        Node::Leaf(Arc::new(LeafNode::new(value.into(), Node::empty())))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Node::Leaf(_) => false,
            Node::Children(c) => c.is_empty(),
        }
    }

    pub fn leaf_value(&self) -> Option<&LeafValue> {
        match self {
            Node::Leaf(leaf) => Some(leaf.value()),
            Node::Children(_) => None,
        }
    }

    /// A node usable as a priority: empty, or a number or string leaf
    /// that has no priority of its own.
    pub fn is_valid_priority(&self) -> bool {
        match self {
            Node::Children(c) => c.is_empty(),
            Node::Leaf(leaf) => {
                leaf.priority().is_empty() && !matches!(leaf.value(), LeafValue::Bool(_))
            }
        }
    }

    pub fn priority(&self) -> Node {
        match self {
            Node::Leaf(leaf) => leaf.priority().clone(),
            Node::Children(c) => c.priority(),
        }
    }

    /// This node with its priority cleared.
    pub fn without_priority(&self) -> Node {
        self.update_priority(Node::empty())
    }

    pub fn update_priority(&self, priority: Node) -> Node {
        match self {
            Node::Leaf(leaf) => Node::Leaf(Arc::new(LeafNode::new(leaf.value().clone(), priority))),
            Node::Children(c) => {
                if c.is_empty() {
                    self.clone()
                } else {
                    Node::Children(Arc::new(c.with_priority(priority)))
                }
            }
        }
    }

    /// Never fails: a missing child is the empty node. `.priority` yields
    /// the priority.
    pub fn get_immediate_child(&self, name: &str) -> Node {
        if name == ".priority" {
            return self.priority();
        }
        match self {
            Node::Leaf(_) => Node::empty(),
            Node::Children(c) => c.get(name).cloned().unwrap_or_else(Node::empty),
        }
    }

    pub fn get_child(&self, path: &Path) -> Node {
        let mut node = self.clone();
        for seg in path.segments() {
            node = node.get_immediate_child(seg);
            if node.is_empty() && seg != ".priority" {
                return node;
            }
        }
        node
    }

    pub fn has_child(&self, name: &str) -> bool {
        !self.get_immediate_child(name).is_empty()
    }

    pub fn update_immediate_child(&self, name: &str, child: Node) -> Node {
        if name == ".priority" {
            return self.update_priority(child);
        }
        match self {
            Node::Leaf(leaf) => {
                if child.is_empty() {
                    self.clone()
                } else {
                    Node::empty()
                        .update_immediate_child(name, child)
                        .update_priority(leaf.priority().clone())
                }
            }
            Node::Children(c) => {
                if child.is_empty() && !c.contains(name) {
                    self.clone()
                } else {
                    Node::Children(Arc::new(c.with_child(name, child)))
                }
            }
        }
    }

    /// Writes `node` at `path` below this node. Writing the empty node
    /// deletes the subtree there.
    ///
    /// # Panics
    ///
    /// If `.priority` appears anywhere but as the last path segment.
    pub fn update_child(&self, path: &Path, node: Node) -> Node {
        let Some(front) = path.front() else {
            return node;
        };
        if front == ".priority" {
            assert!(path.len() == 1, ".priority must be the last segment of a path");
            return self.update_priority(node);
        }
        if self.is_leaf() && node.is_empty() {
            return self.clone();
        }
        let child = self.get_immediate_child(front).update_child(&path.pop_front(), node);
        self.update_immediate_child(front, child)
    }

    pub fn num_children(&self) -> usize {
        match self {
            Node::Leaf(_) => 0,
            Node::Children(c) => c.len(),
        }
    }

    /// Memoized content digest. The empty node digests to `""`.
    pub fn hash(&self) -> &str {
        match self {
            Node::Leaf(leaf) => leaf.hash(),
            Node::Children(c) => c.hash(),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Node::Leaf(leaf) => leaf.value().type_rank(),
            Node::Children(c) if c.is_empty() => 0,
            Node::Children(_) => 4,
        }
    }

    /// Strict total order: empty < boolean < number < string < children.
    /// Equal leaves and equal child lists fall back to priority.
    pub fn compare_to(&self, other: &Node) -> Ordering {
        match (self, other) {
            (Node::Leaf(a), Node::Leaf(b)) => a
                .value()
                .compare(b.value())
                .then_with(|| a.priority().compare_to(b.priority())),
            (Node::Children(a), Node::Children(b)) if !a.is_empty() && !b.is_empty() => {
                let mut left = a.iter_keys();
                let mut right = b.iter_keys();
                loop {
                    match (left.next(), right.next()) {
                        (None, None) => break,
                        (None, Some(_)) => return Ordering::Less,
                        (Some(_), None) => return Ordering::Greater,
                        (Some((an, av)), Some((bn, bv))) => {
                            let ord = crate::util::name_compare(an, bn)
                                .then_with(|| av.compare_to(bv));
                            if ord != Ordering::Equal {
                                return ord;
                            }
                        }
                    }
                }
                a.priority().compare_to(&b.priority())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Order used by value and child-path indexes: by type, then scalar
    /// value. Priorities are ignored and non-empty collections all tie.
    pub fn compare_indexed(&self, other: &Node) -> Ordering {
        match (self, other) {
            (Node::Leaf(a), Node::Leaf(b)) => a.value().compare(b.value()),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    // ── Index support ────────────────────────────────────────────────────

    /// A copy that maintains a sorted view of its children for `index`.
    pub fn with_index(&self, index: &Index) -> Node {
        match self {
            Node::Children(c) if !c.is_indexed(index) => Node::Children(Arc::new(c.with_index(index))),
            _ => self.clone(),
        }
    }

    pub fn is_indexed(&self, index: &Index) -> bool {
        match self {
            Node::Leaf(_) => true,
            Node::Children(c) => c.is_indexed(index),
        }
    }

    /// Name of the child sorting just before `name` under `index`.
    /// `child` must be the current value of that child.
    pub fn predecessor_child_name(&self, name: &str, child: &Node, index: &Index) -> Option<String> {
        match self {
            Node::Leaf(_) => None,
            Node::Children(c) => c.predecessor_name(name, child, index),
        }
    }

    pub fn first_child(&self, index: &Index) -> Option<NamedNode> {
        self.children(index).next()
    }

    pub fn last_child(&self, index: &Index) -> Option<NamedNode> {
        self.children_rev(index).next()
    }

    pub fn first_child_name(&self, index: &Index) -> Option<String> {
        self.first_child(index).map(|n| n.name)
    }

    pub fn last_child_name(&self, index: &Index) -> Option<String> {
        self.last_child(index).map(|n| n.name)
    }

    /// Children in ascending `index` order.
    pub fn children(&self, index: &Index) -> ChildIter<'_> {
        match self {
            Node::Leaf(_) => Box::new(std::iter::empty()),
            Node::Children(c) => c.iter_by(index, false, None),
        }
    }

    /// Children in descending `index` order.
    pub fn children_rev(&self, index: &Index) -> ChildIter<'_> {
        match self {
            Node::Leaf(_) => Box::new(std::iter::empty()),
            Node::Children(c) => c.iter_by(index, true, None),
        }
    }

    /// Ascending from the first child not sorting before `start`.
    pub fn children_from(&self, start: &Post, index: &Index) -> ChildIter<'_> {
        match (self, start) {
            (Node::Leaf(_), _) | (_, Post::Max) => Box::new(std::iter::empty()),
            (Node::Children(c), Post::Min) => c.iter_by(index, false, None),
            (Node::Children(c), Post::At(at)) => c.iter_by(index, false, Some(at)),
        }
    }

    /// Descending from the last child not sorting after `start`.
    pub fn children_rev_from(&self, start: &Post, index: &Index) -> ChildIter<'_> {
        match (self, start) {
            (Node::Leaf(_), _) | (_, Post::Min) => Box::new(std::iter::empty()),
            (Node::Children(c), Post::Max) => c.iter_by(index, true, None),
            (Node::Children(c), Post::At(at)) => c.iter_by(index, true, Some(at)),
        }
    }
}

impl From<LeafNode> for Node {
    fn from(leaf: LeafNode) -> Self {
        Node::Leaf(Arc::new(leaf))
    }
}

impl From<ChildrenNode> for Node {
    fn from(children: ChildrenNode) -> Self {
        Node::Children(Arc::new(children))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Leaf(a), Node::Leaf(b)) => {
                Arc::ptr_eq(a, b) || (a.value() == b.value() && a.priority() == b.priority())
            }
            (Node::Children(a), Node::Children(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a.priority() == b.priority()
                        && a.iter_keys().zip(b.iter_keys()).all(|((an, av), (bn, bv))| an == bn && av == bv))
            }
            _ => false,
        }
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_to(other)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.val(true))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.val(true))
    }
}
