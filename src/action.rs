/// Navigation and expansion actions applied to the active node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeAction<Custom = ()> {
    /// Activate the previous visible row.
    SelectPrev,
    /// Activate the next visible row.
    SelectNext,
    /// Activate the topmost row in the viewport, or scroll one page up.
    PageUp,
    /// Activate the lowest row in the viewport, or scroll one page down.
    PageDown,
    /// Activate the first visible row.
    SelectFirst,
    /// Activate the last visible row.
    SelectLast,
    /// Collapse the active node; if already collapsed, activate its parent.
    SelectParent,
    /// Expand the active node; if already expanded, activate its first child.
    SelectChild,
    /// Toggle expansion of the active node.
    ToggleNode,
    /// Expand all loaded nodes.
    ExpandAll,
    /// Collapse all nodes.
    CollapseAll,
    /// Toggle the selection flag of the active node.
    ToggleSelected,
    /// Application-defined action; returned as [`TreeEvent::Action`].
    Custom(Custom),
}

/// Result of handling an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeEvent<Custom = ()> {
    /// The state changed.
    Handled,
    /// Nothing changed: no active node, or no row in that direction.
    Unhandled,
    /// A custom action returned to the caller untouched.
    Action(TreeAction<Custom>),
}
