//! Pending local writes and the overlay they form over server data.

pub mod compound_write;
pub mod write_tree;

pub use compound_write::CompoundWrite;
pub use write_tree::{WriteData, WriteKind, WriteRecord, WriteTree, WriteTreeRef};
