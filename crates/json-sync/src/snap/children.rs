//! Children collections with lazily built per-index orderings.
//!
//! Key order is the children map itself. Every other index a collection has
//! been asked for (`with_index`) gets its own sorted map of [`NamedNode`]s,
//! built on first use and then carried forward incrementally by each
//! `with_child` call.

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use crate::util::{name_compare, NameOrder, SortedMap};

use super::hash;
use super::index::Index;
use super::node::{ChildIter, NamedNode, Node};

type ChildMap = SortedMap<String, Node, NameOrder>;
type IndexedMap = SortedMap<NamedNode, (), Index>;

struct IndexedChildren {
    index: Index,
    /// Resolves to `None` when no child is defined on the index, in which
    /// case key order already is index order.
    map: OnceLock<Option<IndexedMap>>,
}

impl IndexedChildren {
    fn lazy(index: Index) -> Self {
        IndexedChildren { index, map: OnceLock::new() }
    }

    fn resolve(&self, children: &ChildMap) -> Option<&IndexedMap> {
        self.map
            .get_or_init(|| build_index(children, &self.index))
            .as_ref()
    }

    /// Carries a built ordering across a single child change.
    fn updated(&self, name: &str, old: Option<&Node>, new: Option<&Node>) -> Self {
        let map = OnceLock::new();
        match self.map.get() {
            Some(Some(sorted)) => {
                let mut sorted = sorted.clone();
                if let Some(old) = old {
                    sorted = sorted.remove(&NamedNode::new(name, old.clone()));
                }
                if let Some(new) = new {
                    sorted = sorted.insert(NamedNode::new(name, new.clone()), ());
                }
                let _ = map.set(if sorted.is_empty() { None } else { Some(sorted) });
            }
            Some(None) => {
                if new.map_or(true, |n| !self.index.is_defined_on(n)) {
                    let _ = map.set(None);
                }
            }
            None => {}
        }
        IndexedChildren { index: self.index.clone(), map }
    }
}

impl Clone for IndexedChildren {
    fn clone(&self) -> Self {
        IndexedChildren { index: self.index.clone(), map: self.map.clone() }
    }
}

fn build_index(children: &ChildMap, index: &Index) -> Option<IndexedMap> {
    if !children.iter().any(|(_, child)| index.is_defined_on(child)) {
        return None;
    }
    let map = children.iter().fold(SortedMap::new(index.clone()), |map, (name, child)| {
        map.insert(NamedNode::new(name.clone(), child.clone()), ())
    });
    Some(map)
}

enum Order<'a> {
    Keys,
    Indexed(&'a IndexedMap),
    Detached(Vec<NamedNode>),
}

pub struct ChildrenNode {
    children: ChildMap,
    /// `None` is the empty priority.
    priority: Option<Node>,
    indexes: Arc<Vec<IndexedChildren>>,
    hash: OnceLock<String>,
}

impl ChildrenNode {
    pub(crate) fn empty() -> Self {
        ChildrenNode {
            children: SortedMap::new(NameOrder),
            priority: None,
            indexes: Arc::new(vec![IndexedChildren::lazy(Index::Priority)]),
            hash: OnceLock::new(),
        }
    }

    fn build(children: ChildMap, priority: Option<Node>, indexes: Arc<Vec<IndexedChildren>>) -> Self {
        let priority = priority.filter(|p| !children.is_empty() && !p.is_empty());
        ChildrenNode { children, priority, indexes, hash: OnceLock::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn priority(&self) -> Node {
        self.priority.clone().unwrap_or_else(Node::empty)
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.children.find(name, |a: &str, b: &String| name_compare(a, b))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Children in key order.
    pub fn iter_keys(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.children.iter()
    }

    pub(crate) fn with_priority(&self, priority: Node) -> Self {
        Self::build(self.children.clone(), Some(priority), Arc::clone(&self.indexes))
    }

    /// Sets or, when `child` is empty, removes the child `name`.
    pub(crate) fn with_child(&self, name: &str, child: Node) -> Self {
        let old = self.get(name);
        let (children, new) = if child.is_empty() {
            (self.children.remove(&name.to_owned()), None)
        } else {
            (self.children.insert(name.to_owned(), child.clone()), Some(&child))
        };
        let indexes = self.indexes.iter().map(|entry| entry.updated(name, old, new)).collect();
        Self::build(children, self.priority.clone(), Arc::new(indexes))
    }

    pub(crate) fn is_indexed(&self, index: &Index) -> bool {
        index.is_key() || self.indexes.iter().any(|e| &e.index == index)
    }

    pub(crate) fn with_index(&self, index: &Index) -> Self {
        let mut indexes: Vec<IndexedChildren> = self.indexes.iter().cloned().collect();
        indexes.push(IndexedChildren::lazy(index.clone()));
        Self::build(self.children.clone(), self.priority.clone(), Arc::new(indexes))
    }

    fn order(&self, index: &Index) -> Order<'_> {
        if index.is_key() {
            return Order::Keys;
        }
        match self.indexes.iter().find(|e| &e.index == index) {
            Some(entry) => match entry.resolve(&self.children) {
                Some(map) => Order::Indexed(map),
                None => Order::Keys,
            },
            None => match build_index(&self.children, index) {
                Some(map) => Order::Detached(map.keys().cloned().collect()),
                None => Order::Keys,
            },
        }
    }

    pub(crate) fn iter_by(&self, index: &Index, reverse: bool, start: Option<&NamedNode>) -> ChildIter<'_> {
        let wrap = |(name, node): (&String, &Node)| NamedNode::new(name.clone(), node.clone());
        let before = if reverse { Ordering::Greater } else { Ordering::Less };
        match self.order(index) {
            Order::Keys => {
                let all: ChildIter<'_> = match (reverse, start) {
                    (false, Some(at)) if index.is_key() => Box::new(self.children.iter_from(&at.name).map(wrap)),
                    (true, Some(at)) if index.is_key() => Box::new(self.children.iter_rev_from(&at.name).map(wrap)),
                    (false, _) => Box::new(self.children.iter().map(wrap)),
                    (true, _) => Box::new(self.children.iter_rev().map(wrap)),
                };
                match start {
                    Some(at) if !index.is_key() => {
                        let at = at.clone();
                        let index = index.clone();
                        Box::new(all.skip_while(move |n| index.compare(n, &at) == before))
                    }
                    _ => all,
                }
            }
            Order::Indexed(map) => match (reverse, start) {
                (false, None) => Box::new(map.keys().cloned()),
                (true, None) => Box::new(map.iter_rev().map(|(k, _)| k.clone())),
                (false, Some(at)) => Box::new(map.iter_from(at).map(|(k, _)| k.clone())),
                (true, Some(at)) => Box::new(map.iter_rev_from(at).map(|(k, _)| k.clone())),
            },
            Order::Detached(mut list) => {
                if reverse {
                    list.reverse();
                }
                let index = index.clone();
                let at = start.cloned();
                Box::new(list.into_iter().skip_while(move |n| {
                    at.as_ref().is_some_and(|at| index.compare(n, at) == before)
                }))
            }
        }
    }

    pub(crate) fn predecessor_name(&self, name: &str, child: &Node, index: &Index) -> Option<String> {
        match self.order(index) {
            Order::Keys => self.children.predecessor_key(&name.to_owned()).cloned(),
            Order::Indexed(map) => map
                .predecessor_key(&NamedNode::new(name, child.clone()))
                .map(|n| n.name.clone()),
            Order::Detached(list) => {
                let pos = list.iter().position(|n| n.name == name)?;
                pos.checked_sub(1).map(|i| list[i].name.clone())
            }
        }
    }

    pub fn hash(&self) -> &str {
        self.hash.get_or_init(|| {
            let priority = self.priority.as_ref().and_then(Node::leaf_value);
            let hashes: Vec<(&str, &str)> =
                self.children.iter().map(|(name, child)| (name.as_str(), child.hash())).collect();
            hash::children_hash(priority, hashes.into_iter())
        })
    }
}

impl std::fmt::Debug for ChildrenNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildrenNode")
            .field("children", &self.children)
            .field("priority", &self.priority)
            .finish()
    }
}
