//! Virtualized tree/treegrid engine with a ratatui widget.
//!
//! The core keeps a keyed node tree ([`Tree`]), walks its visible rows
//! ([`visit_rows`]), renders only the rows inside the scrolled window plus a
//! prefetch margin ([`Viewport`]) and lays out grid columns ([`layout_columns`]).
//! [`TreeGridState`] ties these together with coalesced viewport updates, a
//! scoped suspension guard, the lazy-load boundary and keyboard-style navigation.
//! [`TreeGrid`] draws a [`TreeGridState`] in a terminal.
//!
//! Feature flags:
//! - `serde`: serde support for [`NodeData`] and [`ColumnDef`].

mod action;
mod columns;
mod context;
mod error;
mod filter;
mod glyphs;
mod node;
mod options;
pub mod prelude;
mod registry;
mod rows;
mod state;
mod style;
mod tree;
mod viewport;
mod widget;

pub use action::{TreeAction, TreeEvent};
pub use columns::{Column, ColumnDef, ColumnLayout, ColumnWidth, MIN_COLUMN_WIDTH, layout_columns};
pub use context::RowContext;
pub use error::TreeError;
pub use filter::{FilterConfig, FilterMode, NodeMatcher};
pub use glyphs::{TreeGlyphs, tree_label_line};
pub use node::{AddMode, Children, Node, NodeData, NodeId, NodeStatus, TreeId};
pub use options::{NodeCallback, NodeTypeDefaults, OptionSource, TreeGridOptions, resolve_option};
pub use registry::{NodeRegistry, TreeRegistry};
pub use rows::{VisitAction, VisitRowsOptions, visit_rows};
pub use state::{ChangeKind, Direction, TreeGridState, UpdateGuard};
pub use style::TreeGridStyle;
pub use tree::{ExpandOutcome, Tree};
pub use viewport::{
    RENDER_PREFETCH, ROW_HEIGHT, RowPlacement, RowRenderer, RowWindow, Viewport, ViewportUpdate,
};
pub use widget::{RowCache, TREE_COLUMN, TreeGrid};
