//! Small shared utilities: child-name ordering, the persistent sorted map
//! used for node children, and the path-keyed [`ImmutableTree`].

pub mod immutable_tree;
pub mod name;
pub mod sorted_map;

pub use immutable_tree::ImmutableTree;
pub use name::{name_compare, try_parse_int, MAX_NAME, MIN_NAME};
pub use sorted_map::{Comparator, NameOrder, SortedMap};
