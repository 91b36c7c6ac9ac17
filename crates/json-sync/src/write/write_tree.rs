//! Ordered record of pending user writes.
//!
//! Writes are kept in id order. The visible ones are also folded into one
//! [`CompoundWrite`] so that "what does the user currently see at this
//! path" is a tree lookup instead of a replay.

use std::collections::BTreeMap;

use crate::path::Path;
use crate::snap::{Index, NamedNode, Node, Post};
use crate::view::CacheNode;

use super::CompoundWrite;

#[derive(Clone, Debug, PartialEq)]
pub enum WriteData {
    Overwrite(Node),
    /// Children keyed by path relative to the record's path.
    Merge(BTreeMap<Path, Node>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    Set,
    Merge,
    Priority,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WriteRecord {
    pub write_id: u64,
    pub path: Path,
    pub data: WriteData,
    /// Hidden writes (transactions in flight) only show up when asked for.
    pub visible: bool,
}

impl WriteRecord {
    pub fn kind(&self) -> WriteKind {
        match &self.data {
            WriteData::Merge(_) => WriteKind::Merge,
            WriteData::Overwrite(_) if self.path.back() == Some(".priority") => WriteKind::Priority,
            WriteData::Overwrite(_) => WriteKind::Set,
        }
    }

    /// Whether this write touches `path` or anything below it.
    fn contains_path(&self, path: &Path) -> bool {
        match &self.data {
            WriteData::Overwrite(_) => self.path.contains(path),
            WriteData::Merge(children) => children.keys().any(|child| self.path.join(child).contains(path)),
        }
    }

    fn overlaps(&self, path: &Path) -> bool {
        self.path.contains(path) || path.contains(&self.path)
    }
}

#[derive(Clone, Debug, Default)]
pub struct WriteTree {
    visible_writes: CompoundWrite,
    all_writes: Vec<WriteRecord>,
    last_write_id: Option<u64>,
}

impl WriteTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A view of this tree rooted at `path`.
    pub fn child_writes(&self, path: &Path) -> WriteTreeRef<'_> {
        WriteTreeRef { tree_path: path.clone(), writes: self }
    }

    fn check_write_id(&self, write_id: u64) {
        if let Some(last) = self.last_write_id {
            assert!(write_id > last, "stacking an older write on top of newer ones");
        }
    }

    pub fn add_overwrite(&mut self, path: Path, snap: Node, write_id: u64, visible: bool) {
        self.check_write_id(write_id);
        if visible {
            self.visible_writes = self.visible_writes.add_write(&path, snap.clone());
        }
        self.all_writes.push(WriteRecord { write_id, path, data: WriteData::Overwrite(snap), visible });
        self.last_write_id = Some(write_id);
    }

    pub fn add_merge(&mut self, path: Path, children: BTreeMap<Path, Node>, write_id: u64) {
        self.check_write_id(write_id);
        self.visible_writes = self.visible_writes.add_writes(&path, &children);
        self.all_writes.push(WriteRecord { write_id, path, data: WriteData::Merge(children), visible: true });
        self.last_write_id = Some(write_id);
    }

    pub fn get_write(&self, write_id: u64) -> Option<&WriteRecord> {
        self.all_writes.iter().find(|w| w.write_id == write_id)
    }

    pub fn writes(&self) -> &[WriteRecord] {
        &self.all_writes
    }

    pub fn is_empty(&self) -> bool {
        self.all_writes.is_empty()
    }

    /// Removes the write and reports whether any visible data changed, in
    /// which case views overlapping it must be recomputed.
    ///
    /// # Panics
    ///
    /// If no write with `write_id` is pending.
    pub fn remove_write(&mut self, write_id: u64) -> bool {
        let idx = self
            .all_writes
            .iter()
            .position(|w| w.write_id == write_id)
            .unwrap_or_else(|| panic!("remove_write called with nonexistent write id {write_id}"));
        let removed = self.all_writes.remove(idx);

        let mut was_visible = removed.visible;
        let mut overlaps_others = false;
        for (i, current) in self.all_writes.iter().enumerate().rev() {
            if !was_visible {
                break;
            }
            if !current.visible {
                continue;
            }
            if i >= idx && current.contains_path(&removed.path) {
                // a later write fully shadows the removed one
                was_visible = false;
            } else if removed.path.contains(&current.path) {
                overlaps_others = true;
            }
        }

        if !was_visible {
            return false;
        }
        if overlaps_others {
            self.reset_tree();
            return true;
        }
        match &removed.data {
            WriteData::Overwrite(_) => {
                self.visible_writes = self.visible_writes.remove_write(&removed.path);
            }
            WriteData::Merge(children) => {
                for child in children.keys() {
                    self.visible_writes = self.visible_writes.remove_write(&removed.path.join(child));
                }
            }
        }
        true
    }

    fn reset_tree(&mut self) {
        self.visible_writes = layer_tree(&self.all_writes, |w| w.visible, &Path::root());
        self.last_write_id = self.all_writes.last().map(|w| w.write_id);
    }

    /// Complete value of the visible writes at `path`, if they determine it.
    pub fn get_complete_write_data(&self, path: &Path) -> Option<Node> {
        self.visible_writes.get_complete_node(path)
    }

    /// Layers writes over `complete_server_cache` at `tree_path`.
    ///
    /// Returns `None` when neither the writes alone nor the writes over the
    /// server data fully determine the location.
    pub fn calc_complete_event_cache(
        &self,
        tree_path: &Path,
        complete_server_cache: Option<&Node>,
        write_ids_to_exclude: &[u64],
        include_hidden_writes: bool,
    ) -> Option<Node> {
        if write_ids_to_exclude.is_empty() && !include_hidden_writes {
            if let Some(shadowing) = self.visible_writes.get_complete_node(tree_path) {
                return Some(shadowing);
            }
            let sub_merge = self.visible_writes.child_compound_write(tree_path);
            if sub_merge.is_empty() {
                return complete_server_cache.cloned();
            }
            if complete_server_cache.is_none() && !sub_merge.has_complete_write(&Path::root()) {
                return None;
            }
            let layered = complete_server_cache.cloned().unwrap_or_else(Node::empty);
            return Some(sub_merge.apply(layered));
        }

        let merge = self.visible_writes.child_compound_write(tree_path);
        if !include_hidden_writes && merge.is_empty() {
            return complete_server_cache.cloned();
        }
        if !include_hidden_writes && complete_server_cache.is_none() && !merge.has_complete_write(&Path::root()) {
            return None;
        }
        let filter = |w: &WriteRecord| {
            (w.visible || include_hidden_writes)
                && !write_ids_to_exclude.contains(&w.write_id)
                && w.overlaps(tree_path)
        };
        let merge_at_path = layer_tree(&self.all_writes, filter, tree_path);
        let layered = complete_server_cache.cloned().unwrap_or_else(Node::empty);
        Some(merge_at_path.apply(layered))
    }

    /// Best-effort children at `tree_path`: every child the writes fully
    /// determine, plus the server's children with writes layered on.
    pub fn calc_complete_event_children(&self, tree_path: &Path, complete_server_children: Option<&Node>) -> Node {
        let mut complete = Node::empty();
        if let Some(top_level_set) = self.visible_writes.get_complete_node(tree_path) {
            for child in top_level_set.children(&Index::Priority) {
                complete = complete.update_immediate_child(&child.name, child.node);
            }
            return complete;
        }
        let merge = self.visible_writes.child_compound_write(tree_path);
        if let Some(server_children) = complete_server_children {
            for child in server_children.children(&Index::Priority) {
                let node = merge.child_compound_write(&Path::new(&child.name)).apply(child.node);
                complete = complete.update_immediate_child(&child.name, node);
            }
        }
        for child in merge.get_complete_children() {
            complete = complete.update_immediate_child(&child.name, child.node);
        }
        complete
    }

    /// Event cache at `tree_path/child_path` after a server overwrite there,
    /// or `None` if a user write shadows that location.
    ///
    /// # Panics
    ///
    /// If neither snapshot is given.
    pub fn calc_event_cache_after_server_overwrite(
        &self,
        tree_path: &Path,
        child_path: &Path,
        existing_event_snap: Option<&Node>,
        existing_server_snap: Option<&Node>,
    ) -> Option<Node> {
        assert!(
            existing_event_snap.is_some() || existing_server_snap.is_some(),
            "either an event or a server snapshot must exist"
        );
        let path = tree_path.join(child_path);
        if self.visible_writes.has_complete_write(&path) {
            return None;
        }
        let server_child = existing_server_snap
            .map(|s| s.get_child(child_path))
            .unwrap_or_else(Node::empty);
        let child_merge = self.visible_writes.child_compound_write(&path);
        if child_merge.is_empty() {
            Some(server_child)
        } else {
            Some(child_merge.apply(server_child))
        }
    }

    /// Complete value of one child if the writes or the server cache
    /// (with writes layered on) determine it.
    pub fn calc_complete_child(&self, tree_path: &Path, child_key: &str, existing_server_snap: &CacheNode) -> Option<Node> {
        let path = tree_path.child(child_key);
        if let Some(shadowing) = self.visible_writes.get_complete_node(&path) {
            return Some(shadowing);
        }
        if existing_server_snap.is_complete_for_child(child_key) {
            let child_merge = self.visible_writes.child_compound_write(&path);
            return Some(child_merge.apply(existing_server_snap.node().get_immediate_child(child_key)));
        }
        None
    }

    pub fn shadowing_write(&self, path: &Path) -> Option<Node> {
        self.visible_writes.get_complete_node(path)
    }

    /// Up to `count` children after `start` in `index` order, taken from the
    /// writes layered over `complete_server_data`.
    pub fn calc_indexed_slice(
        &self,
        tree_path: &Path,
        complete_server_data: Option<&Node>,
        start: &NamedNode,
        count: usize,
        reverse: bool,
        index: &Index,
    ) -> Vec<NamedNode> {
        let merge = self.visible_writes.child_compound_write(tree_path);
        let to_iterate = match (merge.get_complete_node(&Path::root()), complete_server_data) {
            (Some(shadowing), _) => shadowing,
            (None, Some(server)) => merge.apply(server.clone()),
            (None, None) => return Vec::new(),
        };
        let to_iterate = to_iterate.with_index(index);
        if to_iterate.is_empty() || to_iterate.is_leaf() {
            return Vec::new();
        }
        let post = Post::At(start.clone());
        let iter = if reverse {
            to_iterate.children_rev_from(&post, index)
        } else {
            to_iterate.children_from(&post, index)
        };
        iter.filter(|n| index.compare(n, start) != std::cmp::Ordering::Equal)
            .take(count)
            .collect()
    }
}

/// Folds the writes accepted by `filter` into one overlay rooted at
/// `tree_root`.
fn layer_tree(writes: &[WriteRecord], filter: impl Fn(&WriteRecord) -> bool, tree_root: &Path) -> CompoundWrite {
    let mut compound = CompoundWrite::empty();
    for write in writes.iter().filter(|w| filter(w)) {
        match &write.data {
            WriteData::Overwrite(snap) => {
                if tree_root.contains(&write.path) {
                    compound = compound.add_write(&Path::relative(tree_root, &write.path), snap.clone());
                } else if write.path.contains(tree_root) {
                    let below = snap.get_child(&Path::relative(&write.path, tree_root));
                    compound = compound.add_write(&Path::root(), below);
                }
            }
            WriteData::Merge(children) => {
                for (child, node) in children {
                    let full = write.path.join(child);
                    if tree_root.contains(&full) {
                        compound = compound.add_write(&Path::relative(tree_root, &full), node.clone());
                    } else if full.contains(tree_root) {
                        let below = node.get_child(&Path::relative(&full, tree_root));
                        compound = compound.add_write(&Path::root(), below);
                    }
                }
            }
        }
    }
    compound
}

/// A [`WriteTree`] seen from one location; what a view consults when it
/// needs the user's pending writes layered over its cached data.
#[derive(Clone, Debug)]
pub struct WriteTreeRef<'a> {
    tree_path: Path,
    writes: &'a WriteTree,
}

impl<'a> WriteTreeRef<'a> {
    pub fn path(&self) -> &Path {
        &self.tree_path
    }

    pub fn child(&self, name: &str) -> WriteTreeRef<'a> {
        WriteTreeRef { tree_path: self.tree_path.child(name), writes: self.writes }
    }

    pub fn calc_complete_event_cache(&self, complete_server_cache: Option<&Node>) -> Option<Node> {
        self.writes.calc_complete_event_cache(&self.tree_path, complete_server_cache, &[], false)
    }

    pub fn calc_complete_event_children(&self, complete_server_children: Option<&Node>) -> Node {
        self.writes.calc_complete_event_children(&self.tree_path, complete_server_children)
    }

    pub fn calc_event_cache_after_server_overwrite(
        &self,
        path: &Path,
        existing_event_snap: Option<&Node>,
        existing_server_snap: Option<&Node>,
    ) -> Option<Node> {
        self.writes.calc_event_cache_after_server_overwrite(
            &self.tree_path,
            path,
            existing_event_snap,
            existing_server_snap,
        )
    }

    pub fn shadowing_write(&self, path: &Path) -> Option<Node> {
        self.writes.shadowing_write(&self.tree_path.join(path))
    }

    pub fn calc_indexed_slice(
        &self,
        complete_server_data: Option<&Node>,
        start: &NamedNode,
        count: usize,
        reverse: bool,
        index: &Index,
    ) -> Vec<NamedNode> {
        self.writes
            .calc_indexed_slice(&self.tree_path, complete_server_data, start, count, reverse, index)
    }

    pub fn calc_complete_child(&self, child_key: &str, existing_server_cache: &CacheNode) -> Option<Node> {
        self.writes.calc_complete_child(&self.tree_path, child_key, existing_server_cache)
    }
}
