use crate::node::{Node, NodeId};
use crate::rows::VisitAction;
use crate::tree::Tree;

/// Decides whether a node matches a filter.
pub trait NodeMatcher {
    /// Returns `true` if the node matches the filter criteria.
    fn is_match(&self, node: &Node) -> bool;
}

impl<F> NodeMatcher for F
where
    F: Fn(&Node) -> bool,
{
    #[inline]
    fn is_match(&self, node: &Node) -> bool {
        self(node)
    }
}

/// How non-matching rows are treated while a filter is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    /// Non-matching rows are removed from traversal.
    #[default]
    Hide,
    /// Rows stay visible; only the match flags are set (for dimmed rendering).
    Dim,
}

/// Configuration for filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterConfig {
    pub mode: FilterMode,
    /// Expands the ancestors of every match.
    pub auto_expand: bool,
    /// Only nodes without children can match.
    pub leaves_only: bool,
}

impl FilterConfig {
    /// Hides non-matching rows without touching expansion.
    pub const fn hide() -> Self {
        Self {
            mode: FilterMode::Hide,
            auto_expand: false,
            leaves_only: false,
        }
    }

    /// Keeps all rows and only flags matches.
    pub const fn dim() -> Self {
        Self {
            mode: FilterMode::Dim,
            auto_expand: false,
            leaves_only: false,
        }
    }

    #[must_use]
    pub const fn auto_expand(mut self, auto_expand: bool) -> Self {
        self.auto_expand = auto_expand;
        self
    }

    #[must_use]
    pub const fn leaves_only(mut self, leaves_only: bool) -> Self {
        self.leaves_only = leaves_only;
        self
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::hide()
    }
}

impl Tree {
    /// Applies a filter: each node's `is_match` is set from the matcher and ancestors
    /// count their matching descendants.
    ///
    /// Returns the number of matching nodes.
    pub fn filter_nodes<M: NodeMatcher>(&mut self, matcher: &M, config: FilterConfig) -> usize {
        self.apply_filter(matcher, config, false)
    }

    /// Like [`Tree::filter_nodes`], but a matching node also matches its whole subtree.
    pub fn filter_branches<M: NodeMatcher>(&mut self, matcher: &M, config: FilterConfig) -> usize {
        self.apply_filter(matcher, config, true)
    }

    /// Removes the filter and resets all match flags.
    pub fn clear_filter(&mut self) {
        self.reset_matches();
        self.filter = None;
    }

    /// Returns the active filter configuration, if any.
    pub const fn filter_config(&self) -> Option<FilterConfig> {
        self.filter
    }

    pub const fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    fn reset_matches(&mut self) {
        let mut ids = Vec::with_capacity(self.count() + 1);
        ids.push(self.root());
        let _ = self.visit(self.root(), false, |id, _| {
            ids.push(id);
            VisitAction::Continue
        });
        for id in ids {
            if let Some(node) = self.node_mut_unchecked(id) {
                node.is_match = false;
                node.sub_match_count = 0;
            }
        }
    }

    fn apply_filter<M: NodeMatcher>(&mut self, matcher: &M, config: FilterConfig, branch_mode: bool) -> usize {
        self.reset_matches();

        // Pre-order walk carrying "an ancestor matched" for branch mode.
        let mut matches: Vec<NodeId> = Vec::new();
        let mut stack: Vec<(NodeId, bool)> = self
            .top_nodes()
            .iter()
            .rev()
            .map(|id| (*id, false))
            .collect();
        while let Some((id, inherited)) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            let eligible = !config.leaves_only || !node.has_children();
            let matched = eligible && (inherited || matcher.is_match(node));
            if matched {
                matches.push(id);
            }
            let pass_down = branch_mode && (inherited || matched);
            stack.extend(node.child_ids().iter().rev().map(|child| (*child, pass_down)));
        }

        let root = self.root();
        for id in &matches {
            let mut parent = self.node_mut_unchecked(*id).and_then(|node| {
                node.is_match = true;
                node.parent
            });
            while let Some(parent_id) = parent {
                let Some(node) = self.node_mut_unchecked(parent_id) else {
                    break;
                };
                node.sub_match_count += 1;
                if config.auto_expand && parent_id != root {
                    node.expanded = true;
                }
                parent = node.parent;
            }
        }

        self.filter = Some(config);
        log::debug!("filter applied: {} matches", matches.len());
        matches.len()
    }
}
