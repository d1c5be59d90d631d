use crate::node::NodeId;

/// Errors raised by tree, traversal and layout operations.
///
/// Everything except [`TreeError::InvalidColumnWidth`] is a consistency
/// violation: the operation in progress is aborted and nothing is retried.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// A node with this key is already registered.
    #[error("duplicate node key '{key}'")]
    DuplicateKey { key: String },

    /// The id is stale or belongs to another tree.
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    /// The node was not found among the children of its reported parent.
    #[error("node {node:?} is not a child of {parent:?}")]
    NotAChild { node: NodeId, parent: NodeId },

    /// The operation is not allowed on the invisible root node.
    #[error("operation not allowed on the root node")]
    RootNode,

    /// A node cannot be moved into its own subtree.
    #[error("cannot move {node:?} relative to its descendant {target:?}")]
    InvalidMove { node: NodeId, target: NodeId },

    /// The node is not waiting for lazy children.
    #[error("node {0:?} is not an unloaded lazy node")]
    NotLazy(NodeId),

    /// Registry size and the set of reachable nodes disagree.
    #[error("registry holds {registered} keys but {reachable} nodes are reachable")]
    Inconsistent { registered: usize, reachable: usize },

    /// A column width could not be parsed.
    #[error("invalid width '{width}' for column '{column}'")]
    InvalidColumnWidth { column: String, width: String },
}

impl TreeError {
    /// Creates a duplicate key error.
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    /// Creates an invalid column width error.
    pub fn invalid_width(column: impl Into<String>, width: impl Into<String>) -> Self {
        Self::InvalidColumnWidth {
            column: column.into(),
            width: width.into(),
        }
    }
}
