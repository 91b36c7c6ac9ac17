//! Where a limited filter looks for children outside its current window.

use crate::snap::{Index, NamedNode, Node};
use crate::write::WriteTreeRef;

use super::cache::{CacheNode, ViewCache};

pub trait CompleteChildSource {
    /// The complete value of child `key`, if known.
    fn complete_child(&self, key: &str) -> Option<Node>;

    /// The child following `child` in `index` order (preceding it when
    /// `reverse`), if known.
    fn child_after_child(&self, index: &Index, child: &NamedNode, reverse: bool) -> Option<NamedNode>;
}

/// Knows nothing beyond the node being filtered.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCompleteChildSource;

impl CompleteChildSource for NoCompleteChildSource {
    fn complete_child(&self, _key: &str) -> Option<Node> {
        None
    }

    fn child_after_child(&self, _index: &Index, _child: &NamedNode, _reverse: bool) -> Option<NamedNode> {
        None
    }
}

/// Answers from the view's event cache first, then from server data with
/// the pending writes layered on top.
pub struct WriteTreeCompleteChildSource<'a> {
    writes: WriteTreeRef<'a>,
    view_cache: &'a ViewCache,
    complete_server_cache: Option<&'a Node>,
}

impl<'a> WriteTreeCompleteChildSource<'a> {
    pub fn new(writes: WriteTreeRef<'a>, view_cache: &'a ViewCache, complete_server_cache: Option<&'a Node>) -> Self {
        WriteTreeCompleteChildSource { writes, view_cache, complete_server_cache }
    }
}

impl CompleteChildSource for WriteTreeCompleteChildSource<'_> {
    fn complete_child(&self, key: &str) -> Option<Node> {
        let event_cache = self.view_cache.event_cache();
        if event_cache.is_complete_for_child(key) {
            return Some(event_cache.node().get_immediate_child(key));
        }
        match self.complete_server_cache {
            Some(server) => self.writes.calc_complete_child(key, &CacheNode::new(server.clone(), true, false)),
            None => self.writes.calc_complete_child(key, self.view_cache.server_cache()),
        }
    }

    fn child_after_child(&self, index: &Index, child: &NamedNode, reverse: bool) -> Option<NamedNode> {
        let server = self.complete_server_cache.or_else(|| self.view_cache.complete_server_snap());
        self.writes
            .calc_indexed_slice(server, child, 1, reverse, index)
            .into_iter()
            .next()
    }
}
