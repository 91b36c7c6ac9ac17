//! json-sync: client-side synchronization engine for a JSON tree.
//!
//! Keeps an optimistic local replica of a remote JSON database: user writes
//! apply immediately as pending writes layered over cached server data,
//! server updates are merged underneath them, and every attached query gets
//! ordered `child_*`/`value` events describing what changed in its view.
//!
//! Entry point is [`SyncTree`]. The engine is synchronous; it returns
//! [`Event`]s for an [`EventDispatcher`] to deliver and talks to the
//! transport through a [`ListenProvider`].

pub mod config;
pub mod error;
pub mod operation;
pub mod path;
pub mod query;
pub mod snap;
pub mod sync;
pub mod util;
pub mod validation;
pub mod view;
pub mod write;

pub use config::SyncTreeConfig;
pub use error::SyncError;
pub use operation::{Operation, OperationSource};
pub use path::Path;
pub use query::{Query, QueryParams};
pub use snap::{Index, Node};
pub use sync::{AppliedWrite, ListenProvider, NoopListenProvider, SyncTree};
pub use view::{
    CallbackDispatcher, DataCallback, DataSnapshot, Event, EventDispatcher, EventRegistration, EventType,
};
