use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::columns::MIN_COLUMN_WIDTH;
use crate::filter::FilterConfig;
use crate::node::Node;
use crate::viewport::{RENDER_PREFETCH, ROW_HEIGHT};

/// Per-node callback used as a tree-level option.
pub type NodeCallback<T> = Arc<dyn Fn(&Node) -> Option<T> + Send + Sync>;

/// Tree-level source of an option: an optional callback evaluated per node and an
/// optional plain value used when the callback is missing or returns `None`.
#[derive(Clone)]
pub struct OptionSource<T> {
    pub callback: Option<NodeCallback<T>>,
    pub value: Option<T>,
}

impl<T> Default for OptionSource<T> {
    fn default() -> Self {
        Self {
            callback: None,
            value: None,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for OptionSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionSource")
            .field("callback", &self.callback.as_ref().map(|_| ".."))
            .field("value", &self.value)
            .finish()
    }
}

impl<T> OptionSource<T> {
    pub const fn value(value: T) -> Self {
        Self {
            callback: None,
            value: Some(value),
        }
    }

    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&Node) -> Option<T> + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
            value: None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Node) -> Option<T> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }
}

/// Option values shared by all nodes of one `node_type`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeTypeDefaults {
    pub checkbox: Option<bool>,
    pub icon: Option<String>,
    pub tooltip: Option<String>,
}

/// Resolves a per-node option.
///
/// Precedence: node value, then the node type's value, then the tree-level
/// callback, then the tree-level value. `None` means the caller's default applies.
pub fn resolve_option<T: Clone>(
    node: &Node,
    node_value: Option<&T>,
    type_value: Option<&T>,
    tree: &OptionSource<T>,
) -> Option<T> {
    if let Some(value) = node_value.or(type_value) {
        return Some(value.clone());
    }
    tree.callback
        .as_ref()
        .and_then(|callback| callback(node))
        .or_else(|| tree.value.clone())
}

/// Grid configuration.
#[derive(Clone, Debug)]
pub struct TreeGridOptions {
    /// Name used in log messages.
    pub name: String,
    /// Row height in pixels.
    pub row_height: u32,
    /// Rows rendered above and below the visible area.
    pub prefetch_rows: usize,
    pub min_column_width: f64,
    /// Filter configuration applied by [`crate::TreeGridState::filter_nodes`].
    pub filter: FilterConfig,
    pub checkbox: OptionSource<bool>,
    pub icon: OptionSource<String>,
    pub tooltip: OptionSource<String>,
    pub types: FxHashMap<String, NodeTypeDefaults>,
}

impl Default for TreeGridOptions {
    fn default() -> Self {
        Self {
            name: "tree".to_string(),
            row_height: ROW_HEIGHT,
            prefetch_rows: RENDER_PREFETCH,
            min_column_width: MIN_COLUMN_WIDTH,
            filter: FilterConfig::default(),
            checkbox: OptionSource::default(),
            icon: OptionSource::default(),
            tooltip: OptionSource::default(),
            types: FxHashMap::default(),
        }
    }
}

impl TreeGridOptions {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub const fn row_height(mut self, row_height: u32) -> Self {
        self.row_height = row_height;
        self
    }

    #[must_use]
    pub const fn prefetch_rows(mut self, prefetch_rows: usize) -> Self {
        self.prefetch_rows = prefetch_rows;
        self
    }

    #[must_use]
    pub const fn min_column_width(mut self, min_column_width: f64) -> Self {
        self.min_column_width = min_column_width;
        self
    }

    #[must_use]
    pub const fn filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn checkbox(mut self, checkbox: OptionSource<bool>) -> Self {
        self.checkbox = checkbox;
        self
    }

    #[must_use]
    pub fn icon(mut self, icon: OptionSource<String>) -> Self {
        self.icon = icon;
        self
    }

    #[must_use]
    pub fn tooltip(mut self, tooltip: OptionSource<String>) -> Self {
        self.tooltip = tooltip;
        self
    }

    /// Registers defaults for nodes of the given type.
    #[must_use]
    pub fn node_type(mut self, node_type: impl Into<String>, defaults: NodeTypeDefaults) -> Self {
        self.types.insert(node_type.into(), defaults);
        self
    }

    fn type_defaults(&self, node: &Node) -> Option<&NodeTypeDefaults> {
        node.node_type
            .as_deref()
            .and_then(|node_type| self.types.get(node_type))
    }

    /// Returns `true` if a checkbox is shown for the node (default: no).
    pub fn checkbox_for(&self, node: &Node) -> bool {
        let type_value = self.type_defaults(node).and_then(|t| t.checkbox.as_ref());
        resolve_option(node, node.checkbox.as_ref(), type_value, &self.checkbox)
            .unwrap_or(false)
    }

    /// Returns the icon for the node, if any.
    pub fn icon_for(&self, node: &Node) -> Option<String> {
        let type_value = self.type_defaults(node).and_then(|t| t.icon.as_ref());
        resolve_option(node, node.icon.as_ref(), type_value, &self.icon)
    }

    /// Returns the tooltip for the node, if any.
    pub fn tooltip_for(&self, node: &Node) -> Option<String> {
        let type_value = self.type_defaults(node).and_then(|t| t.tooltip.as_ref());
        resolve_option(node, node.tooltip.as_ref(), type_value, &self.tooltip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeData;
    use crate::tree::Tree;
    use crate::tree::tests::new_tree;

    fn tree_with(data: NodeData) -> (Tree, crate::node::NodeId) {
        let mut tree = new_tree();
        let root = tree.root();
        let ids = tree.add_children(root, &[data]).unwrap();
        (tree, ids[0])
    }

    fn folder_options() -> TreeGridOptions {
        TreeGridOptions::default().node_type(
            "folder",
            NodeTypeDefaults {
                checkbox: Some(true),
                icon: Some("dir".to_string()),
                tooltip: None,
            },
        )
    }

    #[test]
    fn node_value_wins_over_type_and_tree() {
        let mut data = NodeData::new("n").node_type("folder");
        data.icon = Some("own".to_string());
        let (tree, id) = tree_with(data);
        let options = folder_options().icon(OptionSource::value("tree".to_string()));

        let icon = options.icon_for(tree.node(id).unwrap());

        assert_eq!(icon.as_deref(), Some("own"));
    }

    #[test]
    fn type_value_wins_over_tree_callback() {
        let (tree, id) = tree_with(NodeData::new("n").node_type("folder"));
        let options = folder_options().checkbox(OptionSource::callback(|_| Some(false)));

        assert!(options.checkbox_for(tree.node(id).unwrap()));
    }

    #[test]
    fn tree_callback_sees_node() {
        let (tree, id) = tree_with(NodeData::new("report.txt"));
        let options = TreeGridOptions::default().tooltip(OptionSource::callback(|node: &Node| {
            Some(format!("file {}", node.title))
        }));

        let tooltip = options.tooltip_for(tree.node(id).unwrap());

        assert_eq!(tooltip.as_deref(), Some("file report.txt"));
    }

    #[test]
    fn callback_returning_none_falls_back_to_default() {
        let (tree, id) = tree_with(NodeData::new("n"));
        let options = TreeGridOptions::default().checkbox(OptionSource::callback(|_| None));

        assert!(!options.checkbox_for(tree.node(id).unwrap()));
        assert_eq!(options.icon_for(tree.node(id).unwrap()), None);
    }

    #[test]
    fn tree_callback_returning_none_falls_through_to_tree_value() {
        let (tree, id) = tree_with(NodeData::new("notes").node_type("file"));
        let icon = OptionSource::value("doc".to_string()).with_callback(|node: &Node| {
            (node.node_type.as_deref() == Some("folder")).then(|| "dir".to_string())
        });
        let options = TreeGridOptions::default().icon(icon);

        assert_eq!(options.icon_for(tree.node(id).unwrap()).as_deref(), Some("doc"));
    }

    #[test]
    fn tree_callback_wins_over_tree_value() {
        let (tree, id) = tree_with(NodeData::new("n"));
        let source = OptionSource::callback(|_| Some(true)).with_value(false);

        let resolved = resolve_option(tree.node(id).unwrap(), None, None, &source);

        assert_eq!(resolved, Some(true));
    }

    #[test]
    fn defaults_match_viewport_constants() {
        let options = TreeGridOptions::default();

        assert_eq!(options.row_height, 22);
        assert_eq!(options.prefetch_rows, 5);
        assert!((options.min_column_width - 4.0).abs() < f64::EPSILON);
    }
}
