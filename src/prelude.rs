pub use crate::{
    AddMode, ChangeKind, ColumnDef, Direction, ExpandOutcome, FilterConfig, FilterMode, Node,
    NodeData, NodeId, NodeMatcher, NodeStatus, RowCache, RowPlacement, RowRenderer, Tree,
    TreeAction, TreeError, TreeEvent, TreeGlyphs, TreeGrid, TreeGridOptions, TreeGridState,
    TreeGridStyle, TreeRegistry, VisitAction, VisitRowsOptions, visit_rows,
};
