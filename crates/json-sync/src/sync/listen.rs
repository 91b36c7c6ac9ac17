//! The boundary towards the transport that holds server listens.

use crate::query::Query;

/// Starts and stops server listens on behalf of a [`SyncTree`](super::SyncTree).
///
/// `tag` is set for filtered queries; updates the server sends for them
/// come back through the tree's `apply_tagged_*` methods. When the server
/// answers a listen the transport reports it with
/// [`SyncTree::listen_complete`](super::SyncTree::listen_complete) or
/// [`SyncTree::cancel_listen`](super::SyncTree::cancel_listen).
pub trait ListenProvider {
    /// `hash` digests the server data already cached for the query, so
    /// the server may skip resending it.
    fn start_listening(&mut self, query: &Query, tag: Option<u64>, hash: &str);

    fn stop_listening(&mut self, query: &Query, tag: Option<u64>);
}

/// Listens nowhere. For trees fed only by local writes.
#[derive(Debug, Default)]
pub struct NoopListenProvider;

impl ListenProvider for NoopListenProvider {
    fn start_listening(&mut self, _query: &Query, _tag: Option<u64>, _hash: &str) {}

    fn stop_listening(&mut self, _query: &Query, _tag: Option<u64>) {}
}
