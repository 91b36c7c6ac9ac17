//! Units of change flowing from the sync tree into views.

use crate::path::Path;
use crate::snap::Node;
use crate::util::ImmutableTree;

/// Who produced an operation. Tagged server operations address exactly one
/// filtered query, named by its query identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationSource {
    User,
    Server,
    ServerTaggedQuery(String),
}

impl OperationSource {
    pub fn from_user(&self) -> bool {
        matches!(self, OperationSource::User)
    }

    pub fn from_server(&self) -> bool {
        !self.from_user()
    }

    pub fn is_tagged(&self) -> bool {
        matches!(self, OperationSource::ServerTaggedQuery(_))
    }

    pub fn query_id(&self) -> Option<&str> {
        match self {
            OperationSource::ServerTaggedQuery(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Operation {
    Overwrite {
        source: OperationSource,
        path: Path,
        snap: Node,
    },
    Merge {
        source: OperationSource,
        path: Path,
        children: ImmutableTree<Node>,
    },
    /// A user write left the pending set. `affected_tree` marks the
    /// locations it covered (relative to `path`); `revert` is set when the
    /// server rejected it.
    AckUserWrite {
        path: Path,
        affected_tree: ImmutableTree<bool>,
        revert: bool,
    },
    ListenComplete {
        source: OperationSource,
        path: Path,
    },
}

impl Operation {
    pub fn source(&self) -> &OperationSource {
        const USER: &OperationSource = &OperationSource::User;
        match self {
            Operation::Overwrite { source, .. }
            | Operation::Merge { source, .. }
            | Operation::ListenComplete { source, .. } => source,
            Operation::AckUserWrite { .. } => USER,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Operation::Overwrite { path, .. }
            | Operation::Merge { path, .. }
            | Operation::AckUserWrite { path, .. }
            | Operation::ListenComplete { path, .. } => path,
        }
    }

    /// The same operation as seen from child `name` of its path, or `None`
    /// if it does not reach that child.
    pub fn operation_for_child(&self, name: &str) -> Option<Operation> {
        match self {
            Operation::Overwrite { source, path, snap } => {
                if path.is_empty() {
                    Some(Operation::Overwrite {
                        source: source.clone(),
                        path: Path::root(),
                        snap: snap.get_immediate_child(name),
                    })
                } else {
                    Some(Operation::Overwrite {
                        source: source.clone(),
                        path: path.pop_front(),
                        snap: snap.clone(),
                    })
                }
            }
            Operation::Merge { source, path, children } => {
                if path.is_empty() {
                    let child = children.subtree(&Path::new(name))?;
                    if child.is_empty() {
                        None
                    } else if let Some(value) = child.value() {
                        Some(Operation::Overwrite {
                            source: source.clone(),
                            path: Path::root(),
                            snap: value.clone(),
                        })
                    } else {
                        Some(Operation::Merge {
                            source: source.clone(),
                            path: Path::root(),
                            children: child.clone(),
                        })
                    }
                } else {
                    assert_eq!(path.front(), Some(name), "merge path does not lead to child {name}");
                    Some(Operation::Merge {
                        source: source.clone(),
                        path: path.pop_front(),
                        children: children.clone(),
                    })
                }
            }
            Operation::AckUserWrite { path, affected_tree, revert } => {
                if !path.is_empty() {
                    assert_eq!(path.front(), Some(name), "ack path does not lead to child {name}");
                    Some(Operation::AckUserWrite {
                        path: path.pop_front(),
                        affected_tree: affected_tree.clone(),
                        revert: *revert,
                    })
                } else if affected_tree.value().is_some() {
                    assert!(
                        affected_tree.children().next().is_none(),
                        "affected tree should not have overlapping affected paths"
                    );
                    Some(self.clone())
                } else {
                    Some(Operation::AckUserWrite {
                        path: Path::root(),
                        affected_tree: affected_tree.subtree_or_empty(&Path::new(name)),
                        revert: *revert,
                    })
                }
            }
            Operation::ListenComplete { source, path } => Some(Operation::ListenComplete {
                source: source.clone(),
                path: path.pop_front(),
            }),
        }
    }
}
