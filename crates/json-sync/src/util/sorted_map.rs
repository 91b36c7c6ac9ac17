//! Persistent left-leaning red-black tree.
//!
//! Every mutation returns a new map that shares untouched subtrees with the
//! old one through [`Arc`], so snapshots of a node's children are cheap to
//! keep around. Ordering is supplied by a [`Comparator`] value stored in the
//! map rather than by `Ord` on the key, which lets the same key type be
//! sorted differently per index.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::name::name_compare;

/// Ordering strategy for [`SortedMap`] keys.
pub trait Comparator<K>: Clone {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Orders `String` keys with [`name_compare`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NameOrder;

impl Comparator<String> for NameOrder {
    fn compare(&self, a: &String, b: &String) -> Ordering {
        name_compare(a, b)
    }
}

type Link<K, V> = Option<Arc<LlrbNode<K, V>>>;

#[derive(Clone)]
struct LlrbNode<K, V> {
    key: K,
    value: V,
    red: bool,
    left: Link<K, V>,
    right: Link<K, V>,
    count: usize,
}

fn is_red<K, V>(link: &Link<K, V>) -> bool {
    link.as_ref().is_some_and(|n| n.red)
}

fn left_left_red<K, V>(link: &Link<K, V>) -> bool {
    link.as_ref().is_some_and(|n| is_red(&n.left))
}

fn count<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |n| n.count)
}

impl<K: Clone, V: Clone> LlrbNode<K, V> {
    fn build(key: K, value: V, red: bool, left: Link<K, V>, right: Link<K, V>) -> Self {
        let count = 1 + count(&left) + count(&right);
        LlrbNode { key, value, red, left, right, count }
    }

    fn with_left(self, left: Link<K, V>) -> Self {
        Self::build(self.key, self.value, self.red, left, self.right)
    }

    fn with_right(self, right: Link<K, V>) -> Self {
        Self::build(self.key, self.value, self.red, self.left, right)
    }

    fn recolored(&self, red: bool) -> Self {
        LlrbNode { red, ..self.clone() }
    }

    fn min_node(&self) -> &Self {
        let mut node = self;
        while let Some(left) = node.left.as_deref() {
            node = left;
        }
        node
    }

    fn max_node(&self) -> &Self {
        let mut node = self;
        while let Some(right) = node.right.as_deref() {
            node = right;
        }
        node
    }
}

// ── Balancing ────────────────────────────────────────────────────────────

fn rotate_left<K: Clone, V: Clone>(n: LlrbNode<K, V>) -> LlrbNode<K, V> {
    let Some(r) = n.right.clone() else {
        return n;
    };
    let lowered = LlrbNode::build(n.key, n.value, true, n.left, r.left.clone());
    LlrbNode::build(
        r.key.clone(),
        r.value.clone(),
        n.red,
        Some(Arc::new(lowered)),
        r.right.clone(),
    )
}

fn rotate_right<K: Clone, V: Clone>(n: LlrbNode<K, V>) -> LlrbNode<K, V> {
    let Some(l) = n.left.clone() else {
        return n;
    };
    let lowered = LlrbNode::build(n.key, n.value, true, l.right.clone(), n.right);
    LlrbNode::build(
        l.key.clone(),
        l.value.clone(),
        n.red,
        l.left.clone(),
        Some(Arc::new(lowered)),
    )
}

fn color_flip<K: Clone, V: Clone>(n: LlrbNode<K, V>) -> LlrbNode<K, V> {
    let left = n.left.as_ref().map(|l| Arc::new(l.recolored(!l.red)));
    let right = n.right.as_ref().map(|r| Arc::new(r.recolored(!r.red)));
    LlrbNode::build(n.key, n.value, !n.red, left, right)
}

fn fix_up<K: Clone, V: Clone>(mut n: LlrbNode<K, V>) -> LlrbNode<K, V> {
    if is_red(&n.right) && !is_red(&n.left) {
        n = rotate_left(n);
    }
    if is_red(&n.left) && left_left_red(&n.left) {
        n = rotate_right(n);
    }
    if is_red(&n.left) && is_red(&n.right) {
        n = color_flip(n);
    }
    n
}

fn move_red_left<K: Clone, V: Clone>(n: LlrbNode<K, V>) -> LlrbNode<K, V> {
    let mut n = color_flip(n);
    if left_left_red(&n.right) {
        let right = n.right.as_deref().map(|r| Arc::new(rotate_right(r.clone())));
        n = n.with_right(right);
        n = rotate_left(n);
        n = color_flip(n);
    }
    n
}

fn move_red_right<K: Clone, V: Clone>(n: LlrbNode<K, V>) -> LlrbNode<K, V> {
    let mut n = color_flip(n);
    if left_left_red(&n.left) {
        n = rotate_right(n);
        n = color_flip(n);
    }
    n
}

// ── Insert / remove ─────────────────────────────────────────────────────

fn insert<K: Clone, V: Clone, C: Comparator<K>>(
    link: &Link<K, V>,
    key: K,
    value: V,
    cmp: &C,
) -> LlrbNode<K, V> {
    let Some(n) = link else {
        return LlrbNode::build(key, value, true, None, None);
    };
    let fresh = match cmp.compare(&key, &n.key) {
        Ordering::Less => {
            let left = Some(Arc::new(insert(&n.left, key, value, cmp)));
            LlrbNode::build(n.key.clone(), n.value.clone(), n.red, left, n.right.clone())
        }
        Ordering::Equal => {
            LlrbNode::build(n.key.clone(), value, n.red, n.left.clone(), n.right.clone())
        }
        Ordering::Greater => {
            let right = Some(Arc::new(insert(&n.right, key, value, cmp)));
            LlrbNode::build(n.key.clone(), n.value.clone(), n.red, n.left.clone(), right)
        }
    };
    fix_up(fresh)
}

fn remove_min<K: Clone, V: Clone>(n: LlrbNode<K, V>) -> Link<K, V> {
    if n.left.is_none() {
        return None;
    }
    let mut n = n;
    if !is_red(&n.left) && !left_left_red(&n.left) {
        n = move_red_left(n);
    }
    let left = n.left.as_deref().cloned().and_then(remove_min);
    n = n.with_left(left);
    Some(Arc::new(fix_up(n)))
}

fn remove<K: Clone, V: Clone, C: Comparator<K>>(
    n: LlrbNode<K, V>,
    key: &K,
    cmp: &C,
) -> Link<K, V> {
    let mut n = n;
    if cmp.compare(key, &n.key) == Ordering::Less {
        if n.left.is_some() && !is_red(&n.left) && !left_left_red(&n.left) {
            n = move_red_left(n);
        }
        let left = n.left.as_deref().cloned().and_then(|l| remove(l, key, cmp));
        n = n.with_left(left);
    } else {
        if is_red(&n.left) {
            n = rotate_right(n);
        }
        if n.right.is_some() && !is_red(&n.right) && !left_left_red(&n.right) {
            n = move_red_right(n);
        }
        if cmp.compare(key, &n.key) == Ordering::Equal {
            let Some(right) = n.right.clone() else {
                return None;
            };
            let smallest = right.min_node();
            n = LlrbNode::build(
                smallest.key.clone(),
                smallest.value.clone(),
                n.red,
                n.left.clone(),
                remove_min((*right).clone()),
            );
        }
        let right = n.right.as_deref().cloned().and_then(|r| remove(r, key, cmp));
        n = n.with_right(right);
    }
    Some(Arc::new(fix_up(n)))
}

fn blacken<K: Clone, V: Clone>(n: LlrbNode<K, V>) -> Link<K, V> {
    Some(Arc::new(if n.red { n.recolored(false) } else { n }))
}

// ── SortedMap ────────────────────────────────────────────────────────────

/// Immutable ordered map backed by a persistent LLRB tree.
#[derive(Clone)]
pub struct SortedMap<K, V, C> {
    comparator: C,
    root: Link<K, V>,
}

impl<K: Clone, V: Clone, C: Comparator<K>> SortedMap<K, V, C> {
    pub fn new(comparator: C) -> Self {
        SortedMap { comparator, root: None }
    }

    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    pub fn len(&self) -> usize {
        count(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            match self.comparator.compare(key, &n.key) {
                Ordering::Equal => return Some(&n.value),
                Ordering::Less => node = n.left.as_deref(),
                Ordering::Greater => node = n.right.as_deref(),
            }
        }
        None
    }

    /// Lookup by a borrowed probe ordered against keys by `cmp`.
    pub fn find<Q: ?Sized>(&self, probe: &Q, cmp: impl Fn(&Q, &K) -> Ordering) -> Option<&V> {
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            match cmp(probe, &n.key) {
                Ordering::Equal => return Some(&n.value),
                Ordering::Less => node = n.left.as_deref(),
                Ordering::Greater => node = n.right.as_deref(),
            }
        }
        None
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns a copy of the map with `key` set to `value`.
    pub fn insert(&self, key: K, value: V) -> Self {
        let root = insert(&self.root, key, value, &self.comparator);
        SortedMap { comparator: self.comparator.clone(), root: blacken(root) }
    }

    /// Returns a copy of the map without `key`.
    pub fn remove(&self, key: &K) -> Self {
        if !self.contains_key(key) {
            return self.clone();
        }
        let root = self
            .root
            .as_deref()
            .cloned()
            .and_then(|r| remove(r, key, &self.comparator))
            .and_then(|r| blacken((*r).clone()));
        SortedMap { comparator: self.comparator.clone(), root }
    }

    pub fn first(&self) -> Option<(&K, &V)> {
        self.root.as_deref().map(|r| {
            let n = r.min_node();
            (&n.key, &n.value)
        })
    }

    pub fn last(&self) -> Option<(&K, &V)> {
        self.root.as_deref().map(|r| {
            let n = r.max_node();
            (&n.key, &n.value)
        })
    }

    /// Key immediately before `key`, which must be present in the map.
    ///
    /// Returns `None` when `key` is the first key or is absent.
    pub fn predecessor_key(&self, key: &K) -> Option<&K> {
        let mut node = self.root.as_deref();
        let mut right_parent: Option<&LlrbNode<K, V>> = None;
        while let Some(n) = node {
            match self.comparator.compare(key, &n.key) {
                Ordering::Equal => {
                    return match n.left.as_deref() {
                        Some(left) => Some(&left.max_node().key),
                        None => right_parent.map(|p| &p.key),
                    };
                }
                Ordering::Less => node = n.left.as_deref(),
                Ordering::Greater => {
                    right_parent = Some(n);
                    node = n.right.as_deref();
                }
            }
        }
        None
    }

    /// Ascending iteration.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.root.as_deref(), false)
    }

    /// Descending iteration.
    pub fn iter_rev(&self) -> Iter<'_, K, V> {
        Iter::new(self.root.as_deref(), true)
    }

    /// Ascending iteration starting at the first key `>= start`.
    pub fn iter_from(&self, start: &K) -> Iter<'_, K, V> {
        let mut stack = Vec::new();
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            if self.comparator.compare(&n.key, start) == Ordering::Less {
                node = n.right.as_deref();
            } else {
                stack.push(n);
                node = n.left.as_deref();
            }
        }
        Iter { stack, reverse: false }
    }

    /// Descending iteration starting at the last key `<= start`.
    pub fn iter_rev_from(&self, start: &K) -> Iter<'_, K, V> {
        let mut stack = Vec::new();
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            if self.comparator.compare(&n.key, start) == Ordering::Greater {
                node = n.left.as_deref();
            } else {
                stack.push(n);
                node = n.right.as_deref();
            }
        }
        Iter { stack, reverse: true }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }
}

impl<K: Clone + fmt::Debug, V: Clone + fmt::Debug, C: Comparator<K>> fmt::Debug
    for SortedMap<K, V, C>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// In-order iterator over a [`SortedMap`].
pub struct Iter<'a, K, V> {
    stack: Vec<&'a LlrbNode<K, V>>,
    reverse: bool,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn new(root: Option<&'a LlrbNode<K, V>>, reverse: bool) -> Self {
        let mut iter = Iter { stack: Vec::new(), reverse };
        iter.push_spine(root);
        iter
    }

    fn push_spine(&mut self, mut node: Option<&'a LlrbNode<K, V>>) {
        while let Some(n) = node {
            self.stack.push(n);
            node = if self.reverse { n.right.as_deref() } else { n.left.as_deref() };
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.stack.pop()?;
        let next = if self.reverse { n.left.as_deref() } else { n.right.as_deref() };
        self.push_spine(next);
        Some((&n.key, &n.value))
    }
}
