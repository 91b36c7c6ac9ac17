//! The immutable node model.
//!
//! | Module | Contents |
//! |--------|----------|
//! [`node`] | [`Node`], [`NamedNode`], mutation and ordered traversal |
//! [`leaf`] | [`LeafValue`], [`LeafNode`] |
//! [`children`] | [`ChildrenNode`] and its per-index sorted views |
//! [`index`] | [`Index`] strategies and range [`Post`]s |
//! [`json`] | JSON import/export |
//! [`hash`] | content digests |

pub mod children;
pub mod hash;
pub mod index;
pub mod json;
pub mod leaf;
pub mod node;

pub use children::ChildrenNode;
pub use index::{Index, Post};
pub use leaf::{LeafNode, LeafValue};
pub use node::{ChildIter, NamedNode, Node};
