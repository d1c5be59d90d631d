//! Visible-row traversal.
//!
//! Rows are the nodes reachable from the root through expanded ancestors (or all
//! nodes with `include_hidden`), narrowed by a hiding filter, in depth-first
//! pre-order. The forward and reverse walks are separate algorithms: forward scans
//! siblings top-down and dives into children, reverse steps to the previous sibling
//! and sinks to its last visible descendant.

use crate::error::TreeError;
use crate::node::{Node, NodeId};
use crate::tree::Tree;

/// What the traversal should do after a callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VisitAction {
    #[default]
    Continue,
    /// Do not descend into this node's children (forward traversal only).
    Skip,
    /// Abort the traversal.
    Stop,
}

/// Options for [`visit_rows`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisitRowsOptions {
    /// First node of the walk; defaults to the first top-level node.
    pub start: Option<NodeId>,
    /// Walk bottom-up.
    pub reverse: bool,
    /// Yield the start node itself.
    pub include_self: bool,
    /// Ignore expansion and filter state.
    pub include_hidden: bool,
    /// Continue from the other end of the tree until the start node comes around again.
    pub wrap: bool,
}

impl Default for VisitRowsOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitRowsOptions {
    pub const fn new() -> Self {
        Self {
            start: None,
            reverse: false,
            include_self: true,
            include_hidden: false,
            wrap: false,
        }
    }

    #[must_use]
    pub const fn start(mut self, start: NodeId) -> Self {
        self.start = Some(start);
        self
    }

    #[must_use]
    pub const fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    #[must_use]
    pub const fn include_self(mut self, include_self: bool) -> Self {
        self.include_self = include_self;
        self
    }

    #[must_use]
    pub const fn include_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    #[must_use]
    pub const fn wrap(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }
}

/// Calls `callback` for every visible row in display order (or reverse order).
///
/// Returns `Ok(false)` if the callback returned [`VisitAction::Stop`], `Ok(true)` if the
/// rows were exhausted (or, with `wrap`, the start node came around again).
pub fn visit_rows<F>(tree: &Tree, options: &VisitRowsOptions, mut callback: F) -> Result<bool, TreeError>
where
    F: FnMut(NodeId, &Node) -> VisitAction,
{
    let Some(first) = tree.first_child(tree.root()) else {
        return Ok(true);
    };
    let start = options.start.unwrap_or(first);
    if start == tree.root() {
        return Err(TreeError::RootNode);
    }
    tree.node(start)?;
    if options.reverse {
        visit_rows_up(tree, start, options, &mut callback)
    } else {
        visit_rows_down(tree, start, options, &mut callback)
    }
}

/// Outcome of walking a subtree.
enum Walk {
    Exhausted,
    Stopped,
    ReachedStop,
}

struct Down<'a, F> {
    tree: &'a Tree,
    callback: &'a mut F,
    include_hidden: bool,
    check_filter: bool,
    // Set once wrapped: the start node and the first row yielded before wrapping
    // (the latter ends the cycle when the start node itself is not a visible row).
    stop_nodes: [Option<NodeId>; 2],
    first_yielded: Option<NodeId>,
}

impl<F> Down<'_, F>
where
    F: FnMut(NodeId, &Node) -> VisitAction,
{
    fn is_stop(&self, id: NodeId) -> bool {
        self.stop_nodes.contains(&Some(id))
    }

    fn emit(&mut self, id: NodeId, node: &Node) -> VisitAction {
        self.first_yielded.get_or_insert(id);
        (self.callback)(id, node)
    }

    /// Pre-order over the descendants of `parent`.
    fn walk_children(&mut self, parent: &Node) -> Result<Walk, TreeError> {
        let tree = self.tree;
        for &id in parent.child_ids() {
            if self.is_stop(id) {
                return Ok(Walk::ReachedStop);
            }
            let node = tree.node(id)?;
            if self.check_filter && !node.passes_filter() {
                continue;
            }
            match self.emit(id, node) {
                VisitAction::Stop => return Ok(Walk::Stopped),
                VisitAction::Skip => continue,
                VisitAction::Continue => {}
            }
            if node.descends(self.include_hidden) {
                match self.walk_children(node)? {
                    Walk::Exhausted => {}
                    walk => return Ok(walk),
                }
            }
        }
        Ok(Walk::Exhausted)
    }
}

fn visit_rows_down<F>(
    tree: &Tree,
    start: NodeId,
    options: &VisitRowsOptions,
    callback: &mut F,
) -> Result<bool, TreeError>
where
    F: FnMut(NodeId, &Node) -> VisitAction,
{
    let mut down = Down {
        tree,
        callback,
        include_hidden: options.include_hidden,
        check_filter: !options.include_hidden && tree.filter_hides(),
        stop_nodes: [None; 2],
        first_yielded: None,
    };
    let mut skip_first = !options.include_self;
    let mut wrap = options.wrap;
    let mut node = start;
    let mut parent = tree.node(start)?.parent();
    // 0 at the start level (scan from the start node), 1 after ascending (scan after it).
    let mut sibling_ofs = 0;

    while let Some(parent_id) = parent {
        let siblings = tree.children(parent_id);
        let index = siblings
            .iter()
            .position(|id| *id == node)
            .ok_or(TreeError::NotAChild {
                node,
                parent: parent_id,
            })?;

        for &id in &siblings[index + sibling_ofs..] {
            if down.is_stop(id) {
                return Ok(true);
            }
            let current = tree.node(id)?;
            if down.check_filter && !current.passes_filter() {
                continue;
            }
            if !(skip_first && id == start) {
                match down.emit(id, current) {
                    VisitAction::Stop => return Ok(false),
                    VisitAction::Skip => continue,
                    VisitAction::Continue => {}
                }
            }
            skip_first = false;
            if current.descends(down.include_hidden) {
                match down.walk_children(current)? {
                    Walk::Exhausted => {}
                    Walk::Stopped => return Ok(false),
                    Walk::ReachedStop => return Ok(true),
                }
            }
        }

        node = parent_id;
        parent = tree.node(parent_id)?.parent();
        sibling_ofs = 1;

        if parent.is_none() && wrap {
            log::trace!("visit_rows: wrap around");
            wrap = false;
            down.stop_nodes = [Some(start), down.first_yielded];
            let Some(first) = tree.first_child(tree.root()) else {
                break;
            };
            node = first;
            parent = Some(tree.root());
            sibling_ofs = 0;
        }
    }
    Ok(true)
}

/// Returns the last row of the tree: the deepest last descendant along descending nodes.
pub(crate) fn last_row(tree: &Tree, include_hidden: bool) -> Option<NodeId> {
    let mut node = tree.last_child(tree.root())?;
    loop {
        let current = tree.get(node)?;
        if !current.descends(include_hidden) {
            return Some(node);
        }
        node = tree.last_child(node)?;
    }
}

fn visit_rows_up<F>(
    tree: &Tree,
    start: NodeId,
    options: &VisitRowsOptions,
    callback: &mut F,
) -> Result<bool, TreeError>
where
    F: FnMut(NodeId, &Node) -> VisitAction,
{
    let include_hidden = options.include_hidden;
    let root = tree.root();
    let mut wrap = options.wrap;
    let mut wrapped = false;
    let mut first_yielded = None;
    let mut node = start;

    if options.include_self {
        first_yielded = Some(node);
        if callback(node, tree.node(node)?) == VisitAction::Stop {
            return Ok(false);
        }
    }

    loop {
        let parent = tree.node(node)?.parent().ok_or(TreeError::RootNode)?;
        let siblings = tree.children(parent);

        if siblings.first() == Some(&node) {
            // First sibling: the previous row is the parent.
            node = parent;
            if node == root {
                if !wrap {
                    break;
                }
                log::trace!("visit_rows: reverse wrap around");
                wrap = false;
                wrapped = true;
                let Some(last) = last_row(tree, include_hidden) else {
                    break;
                };
                node = last;
            }
        } else {
            let index = siblings
                .iter()
                .position(|id| *id == node)
                .ok_or(TreeError::NotAChild { node, parent })?;
            node = siblings[index - 1];
            // Sink to the last visible descendant of the previous sibling.
            while let Some(current) = tree.get(node)
                && current.descends(include_hidden)
                && let Some(last) = current.child_ids().last()
            {
                node = *last;
            }
        }

        if wrapped && (node == start || first_yielded == Some(node)) {
            return Ok(true);
        }
        if !include_hidden && !tree.is_row_visible(node) {
            continue;
        }
        first_yielded.get_or_insert(node);
        if callback(node, tree.node(node)?) == VisitAction::Stop {
            return Ok(false);
        }
    }
    Ok(true)
}
