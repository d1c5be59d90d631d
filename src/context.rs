use crate::node::NodeStatus;

/// Per-row facts the label renderer needs.
#[derive(Clone, Copy, Debug)]
pub struct RowContext<'a> {
    /// Depth below the invisible root (top-level nodes are level 0).
    pub level: u16,
    pub is_expanded: bool,
    /// Has children or still needs loading.
    pub is_expandable: bool,
    pub status: &'a NodeStatus,
    pub is_active: bool,
    pub is_selected: bool,
    /// Row kept visible by a dimming filter although it does not match.
    pub is_dimmed: bool,
    /// `Some(checked)` if a checkbox is shown.
    pub checkbox: Option<bool>,
}
