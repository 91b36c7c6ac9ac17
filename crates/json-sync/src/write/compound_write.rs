//! Path-keyed overlay of complete overwrites.
//!
//! A location holds at most one governing write: a write landing below an
//! existing one is folded into it with [`Node::update_child`], and a write
//! landing above existing ones replaces their whole subtree.

use std::collections::BTreeMap;

use crate::path::Path;
use crate::snap::{Index, NamedNode, Node};
use crate::util::ImmutableTree;

#[derive(Clone, Debug, Default)]
pub struct CompoundWrite {
    tree: ImmutableTree<Node>,
}

impl CompoundWrite {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A write of `node` at the root.
    pub fn from_node(node: Node) -> Self {
        CompoundWrite { tree: ImmutableTree::leaf(node) }
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn add_write(&self, path: &Path, node: Node) -> Self {
        if path.is_empty() {
            return Self::from_node(node);
        }
        if let Some((root_most, value)) = self.tree.find_root_most_value_and_path(path) {
            let relative = Path::relative(&root_most, path);
            let folded = value.update_child(&relative, node);
            return CompoundWrite { tree: self.tree.set(&root_most, folded) };
        }
        CompoundWrite { tree: self.tree.set_tree(path, ImmutableTree::leaf(node)) }
    }

    /// Adds one write per entry, each at `path` joined with the entry's
    /// relative path.
    pub fn add_writes(&self, path: &Path, updates: &BTreeMap<Path, Node>) -> Self {
        updates
            .iter()
            .fold(self.clone(), |acc, (child, node)| acc.add_write(&path.join(child), node.clone()))
    }

    /// Removes every write at or below `path`. A write at an ancestor of
    /// `path` is left alone.
    pub fn remove_write(&self, path: &Path) -> Self {
        if path.is_empty() {
            return Self::empty();
        }
        CompoundWrite { tree: self.tree.set_tree(path, ImmutableTree::default()) }
    }

    pub fn has_complete_write(&self, path: &Path) -> bool {
        self.get_complete_node(path).is_some()
    }

    /// The value at `path` when a write at it or an ancestor determines it.
    pub fn get_complete_node(&self, path: &Path) -> Option<Node> {
        self.tree
            .find_root_most_value_and_path(path)
            .map(|(root_most, value)| value.get_child(&Path::relative(&root_most, path)))
    }

    /// Immediate children that are each fully determined by the writes.
    pub fn get_complete_children(&self) -> Vec<NamedNode> {
        match self.tree.value() {
            Some(root) => root.children(&Index::Priority).collect(),
            None => {
                let mut children = Vec::new();
                self.tree.foreach_child(|name, node| {
                    children.push(NamedNode::new(name, node.clone()));
                });
                children
            }
        }
    }

    /// Re-roots the overlay at `path`, keeping a shadowing ancestor write.
    pub fn child_compound_write(&self, path: &Path) -> Self {
        if path.is_empty() {
            return self.clone();
        }
        match self.get_complete_node(path) {
            Some(shadowing) => Self::from_node(shadowing),
            None => CompoundWrite { tree: self.tree.subtree_or_empty(path) },
        }
    }

    /// The write governing the root, if any.
    pub fn root_write(&self) -> Option<&Node> {
        self.tree.value()
    }

    /// Folds every write into `node`.
    pub fn apply(&self, node: Node) -> Node {
        apply_subtree_write(&Path::root(), &self.tree, node)
    }
}

fn apply_subtree_write(relative: &Path, tree: &ImmutableTree<Node>, mut node: Node) -> Node {
    if let Some(value) = tree.value() {
        return node.update_child(relative, value.clone());
    }
    let mut priority_write = None;
    for (name, child) in tree.children() {
        if name == ".priority" {
            assert!(child.value().is_some(), "priority writes must always be leaf nodes");
            priority_write = child.value().cloned();
        } else {
            node = apply_subtree_write(&relative.child(name), child, node);
        }
    }
    // a priority only sticks once the value it belongs to exists
    if let Some(priority) = priority_write {
        if !node.get_child(relative).is_empty() {
            node = node.update_child(&relative.child(".priority"), priority);
        }
    }
    node
}
