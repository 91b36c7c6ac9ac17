//! Coordination across locations: sync points, the sync tree and the
//! listen boundary.

pub mod listen;
pub mod sync_point;
pub mod sync_tree;

pub use listen::{ListenProvider, NoopListenProvider};
pub use sync_point::{Removal, SyncPoint};
pub use sync_tree::{AppliedWrite, SyncTree};
