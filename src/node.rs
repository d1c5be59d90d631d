use rustc_hash::FxHashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identity of a [`Tree`](crate::Tree), handed out by a
/// [`TreeRegistry`](crate::TreeRegistry).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(pub(crate) u32);

/// Handle of a node inside a [`Tree`](crate::Tree).
///
/// Handles are generational: once a node is destroyed its handle never resolves again,
/// even if the slot is reused for a new node. A handle only resolves in the tree that
/// created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) tree: TreeId,
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub(crate) const fn new(tree: TreeId, index: u32, generation: u32) -> Self {
        Self {
            tree,
            index,
            generation,
        }
    }

    /// Returns the tree this handle belongs to.
    pub const fn tree(self) -> TreeId {
        self.tree
    }
}

/// Child list of a node.
///
/// `Unloaded` and an empty `Loaded` list are different things: the former is a lazy node
/// that can still be expanded (and must be loaded first), the latter is a leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Children {
    Unloaded,
    Loaded(Vec<NodeId>),
}

impl Children {
    /// Returns the loaded child ids, or an empty slice when unloaded.
    pub fn as_slice(&self) -> &[NodeId] {
        match self {
            Self::Unloaded => &[],
            Self::Loaded(children) => children,
        }
    }

    pub const fn is_unloaded(&self) -> bool {
        matches!(self, Self::Unloaded)
    }
}

/// Load status of a node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum NodeStatus {
    #[default]
    Ok,
    /// Children were requested from the external loader.
    Loading,
    /// The last load attempt failed; the node stays unloaded so it can be retried.
    Error(String),
}

/// Where a new or moved node goes relative to the target node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddMode {
    /// Last child of the target.
    #[default]
    AppendChild,
    /// First child of the target.
    PrependChild,
    /// Previous sibling of the target.
    Before,
    /// Next sibling of the target.
    After,
}

/// Input data for creating nodes (what a loader hands to the tree).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeData {
    /// Unique key; generated from the tree's key sequence when absent.
    pub key: Option<String>,
    pub ref_key: Option<String>,
    pub title: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub node_type: Option<String>,
    pub icon: Option<String>,
    pub checkbox: Option<bool>,
    pub tooltip: Option<String>,
    pub expanded: bool,
    pub selected: bool,
    /// Creates the node in the unloaded state (ignored if `children` is non-empty).
    pub lazy: bool,
    /// Cell text keyed by column id.
    pub cells: Vec<(String, String)>,
    pub children: Vec<NodeData>,
}

impl NodeData {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn ref_key(mut self, ref_key: impl Into<String>) -> Self {
        self.ref_key = Some(ref_key.into());
        self
    }

    #[must_use]
    pub fn node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    #[must_use]
    pub const fn expanded(mut self, expanded: bool) -> Self {
        self.expanded = expanded;
        self
    }

    #[must_use]
    pub const fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    #[must_use]
    pub fn cell(mut self, column: impl Into<String>, text: impl Into<String>) -> Self {
        self.cells.push((column.into(), text.into()));
        self
    }

    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children.extend(children);
        self
    }
}

/// A tree node.
///
/// Structural fields (`key`, `parent`, `children`, flags) are changed only through
/// [`Tree`](crate::Tree) operations so the registry and filter counts stay consistent.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) key: String,
    pub(crate) ref_key: Option<String>,
    pub title: String,
    pub node_type: Option<String>,
    pub icon: Option<String>,
    pub checkbox: Option<bool>,
    pub tooltip: Option<String>,
    pub(crate) cells: FxHashMap<String, String>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Children,
    pub(crate) expanded: bool,
    pub(crate) selected: bool,
    pub(crate) is_match: bool,
    pub(crate) sub_match_count: usize,
    pub(crate) status: NodeStatus,
}

impl Node {
    pub(crate) fn root() -> Self {
        Self {
            key: "__root__".to_string(),
            ref_key: None,
            title: "__root__".to_string(),
            node_type: None,
            icon: None,
            checkbox: None,
            tooltip: None,
            cells: FxHashMap::default(),
            parent: None,
            children: Children::Loaded(Vec::new()),
            expanded: true,
            selected: false,
            is_match: false,
            sub_match_count: 0,
            status: NodeStatus::Ok,
        }
    }

    /// Builds a detached node from data; children are attached by the tree.
    pub(crate) fn from_data(key: String, data: &NodeData, parent: NodeId) -> Self {
        let children = if data.lazy && data.children.is_empty() {
            Children::Unloaded
        } else {
            Children::Loaded(Vec::with_capacity(data.children.len()))
        };
        Self {
            key,
            ref_key: data.ref_key.clone(),
            title: data.title.clone(),
            node_type: data.node_type.clone(),
            icon: data.icon.clone(),
            checkbox: data.checkbox,
            tooltip: data.tooltip.clone(),
            cells: data.cells.iter().cloned().collect(),
            parent: Some(parent),
            children,
            expanded: data.expanded,
            selected: data.selected,
            is_match: false,
            sub_match_count: 0,
            status: NodeStatus::Ok,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ref_key(&self) -> Option<&str> {
        self.ref_key.as_deref()
    }

    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub const fn children(&self) -> &Children {
        &self.children
    }

    /// Returns the loaded child ids (empty for leaves and unloaded nodes).
    pub fn child_ids(&self) -> &[NodeId] {
        self.children.as_slice()
    }

    /// Returns `true` if the node has loaded children.
    pub fn has_children(&self) -> bool {
        !self.children.as_slice().is_empty()
    }

    pub const fn is_lazy_unloaded(&self) -> bool {
        self.children.is_unloaded()
    }

    /// Returns `true` if the node can be expanded (has children or still needs loading).
    pub fn is_expandable(&self) -> bool {
        self.children.is_unloaded() || self.has_children()
    }

    pub const fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub const fn is_selected(&self) -> bool {
        self.selected
    }

    /// Returns `true` if the node itself matched the last filter.
    pub const fn is_match(&self) -> bool {
        self.is_match
    }

    /// Number of matching descendants from the last filter.
    pub const fn sub_match_count(&self) -> usize {
        self.sub_match_count
    }

    /// Returns `true` if an active filter lets this node through.
    #[inline]
    pub const fn passes_filter(&self) -> bool {
        self.is_match || self.sub_match_count > 0
    }

    pub const fn status(&self) -> &NodeStatus {
        &self.status
    }

    /// Returns the cell text for a column id.
    pub fn cell(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn set_cell(&mut self, column: impl Into<String>, text: impl Into<String>) {
        self.cells.insert(column.into(), text.into());
    }

    /// Returns `true` if descending into this node's children is allowed.
    #[inline]
    pub(crate) fn descends(&self, include_hidden: bool) -> bool {
        self.has_children() && (include_hidden || self.expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_data_creates_unloaded_node() {
        let root = NodeId::new(TreeId(1), 0, 0);
        let node = Node::from_data("a".into(), &NodeData::new("A").lazy(), root);

        assert!(node.is_lazy_unloaded());
        assert!(node.is_expandable());
        assert!(!node.has_children());
    }

    #[test]
    fn leaf_is_not_expandable() {
        let root = NodeId::new(TreeId(1), 0, 0);
        let node = Node::from_data("a".into(), &NodeData::new("A"), root);

        assert_eq!(node.children(), &Children::Loaded(Vec::new()));
        assert!(!node.is_expandable());
    }

    #[test]
    fn lazy_flag_ignored_when_children_given() {
        let root = NodeId::new(TreeId(1), 0, 0);
        let data = NodeData::new("A").lazy().children([NodeData::new("B")]);
        let node = Node::from_data("a".into(), &data, root);

        assert!(!node.is_lazy_unloaded());
    }
}
