use crate::path::Path;
use crate::snap::Node;

/// A cached node with its completeness flags.
///
/// `fully_initialized` means the whole location is known; `filtered` means
/// the node holds only the part of it a query selects.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheNode {
    node: Node,
    fully_initialized: bool,
    filtered: bool,
}

impl CacheNode {
    pub fn new(node: Node, fully_initialized: bool, filtered: bool) -> Self {
        CacheNode { node, fully_initialized, filtered }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn is_fully_initialized(&self) -> bool {
        self.fully_initialized
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub fn is_complete_for_path(&self, path: &Path) -> bool {
        match path.front() {
            None => self.fully_initialized && !self.filtered,
            Some(front) => self.is_complete_for_child(front),
        }
    }

    pub fn is_complete_for_child(&self, key: &str) -> bool {
        (self.fully_initialized && !self.filtered) || self.node.has_child(key)
    }
}

/// The event-facing and server-facing caches of one view.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewCache {
    event_cache: CacheNode,
    server_cache: CacheNode,
}

impl ViewCache {
    pub fn new(event_cache: CacheNode, server_cache: CacheNode) -> Self {
        ViewCache { event_cache, server_cache }
    }

    pub fn event_cache(&self) -> &CacheNode {
        &self.event_cache
    }

    pub fn server_cache(&self) -> &CacheNode {
        &self.server_cache
    }

    pub fn update_event_snap(&self, node: Node, complete: bool, filtered: bool) -> ViewCache {
        ViewCache {
            event_cache: CacheNode::new(node, complete, filtered),
            server_cache: self.server_cache.clone(),
        }
    }

    pub fn update_server_snap(&self, node: Node, complete: bool, filtered: bool) -> ViewCache {
        ViewCache {
            event_cache: self.event_cache.clone(),
            server_cache: CacheNode::new(node, complete, filtered),
        }
    }

    pub fn complete_event_snap(&self) -> Option<&Node> {
        self.event_cache.fully_initialized.then_some(&self.event_cache.node)
    }

    pub fn complete_server_snap(&self) -> Option<&Node> {
        self.server_cache.fully_initialized.then_some(&self.server_cache.node)
    }
}
