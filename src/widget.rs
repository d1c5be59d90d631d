use ratatui::layout::Rect;
use ratatui::prelude::Buffer;
use ratatui::style::Style;
use ratatui::widgets::{
    Block, Borders, Scrollbar, ScrollbarOrientation, ScrollbarState, StatefulWidget, Widget,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::context::RowContext;
use crate::glyphs::{TreeGlyphs, tree_label_line};
use crate::node::NodeId;
use crate::state::TreeGridState;
use crate::style::TreeGridStyle;
use crate::tree::Tree;
use crate::viewport::{RowPlacement, RowRenderer, ViewportUpdate};

/// Id of the column that shows the tree label.
pub const TREE_COLUMN: &str = "*";

/// [`RowRenderer`] that remembers the placement of every rendered row.
#[derive(Debug, Default)]
pub struct RowCache {
    rows: FxHashMap<NodeId, RowPlacement>,
    last_update: Option<ViewportUpdate>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placement(&self, id: NodeId) -> Option<RowPlacement> {
        self.rows.get(&id).copied()
    }

    /// Rendered rows with their placements, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, RowPlacement)> + '_ {
        self.rows.iter().map(|(id, placement)| (*id, *placement))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Summary of the last completed pass.
    pub const fn last_update(&self) -> Option<&ViewportUpdate> {
        self.last_update.as_ref()
    }
}

impl RowRenderer for RowCache {
    fn render_row(&mut self, _tree: &Tree, id: NodeId, placement: RowPlacement) {
        self.rows.insert(id, placement);
    }

    fn remove_markup(&mut self, id: NodeId) {
        self.rows.remove(&id);
    }

    fn viewport_updated(&mut self, update: &ViewportUpdate) {
        self.last_update = Some(update.clone());
    }
}

/// Tree grid widget drawing the rows of a [`TreeGridState`].
///
/// Rendering sizes the viewport from the area, runs any pending viewport pass and
/// draws the rendered rows that fall into the area.
#[derive(Clone, Debug, Default)]
pub struct TreeGrid<'a> {
    style: TreeGridStyle<'a>,
    glyphs: TreeGlyphs<'a>,
}

impl<'a> TreeGrid<'a> {
    pub const fn new(style: TreeGridStyle<'a>) -> Self {
        Self {
            style,
            glyphs: TreeGlyphs::unicode(),
        }
    }

    #[must_use]
    pub const fn glyphs(mut self, glyphs: TreeGlyphs<'a>) -> Self {
        self.glyphs = glyphs;
        self
    }

    fn block(&self) -> Block<'a> {
        let mut block = Block::default().borders(self.style.borders);
        if let Some(title) = self.style.title.clone() {
            block = block.title(title);
        }
        block
            .style(self.style.block_style)
            .border_style(self.style.border_style)
    }

    /// Sizes the viewport and runs the pending pass; reserves a scrollbar column
    /// while the content does not fit.
    fn update_state(state: &mut TreeGridState<RowCache>, body: Rect) -> bool {
        let height = u32::from(body.height) * state.viewport().row_height();
        let mut scrollable = state.viewport().content_height() > u64::from(height);
        for _ in 0..2 {
            let width = if scrollable {
                body.width.saturating_sub(1)
            } else {
                body.width
            };
            state.set_viewport_size(u32::from(width), height);
            Self::flush(state);
            let needed = state.viewport().content_height() > u64::from(height);
            if needed == scrollable {
                break;
            }
            scrollable = needed;
        }
        scrollable
    }

    fn flush(state: &mut TreeGridState<RowCache>) {
        if let Err(err) = state.flush() {
            log::error!("{}: viewport update failed: {err}", state.options().name);
        }
    }

    fn column_bounds(state: &TreeGridState<RowCache>, width: u16) -> SmallVec<[(u16, u16); 8]> {
        if state.columns().is_empty() {
            let mut bounds = SmallVec::new();
            bounds.push((0, width));
            return bounds;
        }
        state
            .columns()
            .iter()
            .map(|column| {
                let (x, w) = column.cell_bounds();
                (x.min(width), w.min(width.saturating_sub(x)))
            })
            .collect()
    }

    fn render_header(
        &self,
        state: &TreeGridState<RowCache>,
        area: Rect,
        buf: &mut Buffer,
        bounds: &[(u16, u16)],
    ) {
        buf.set_style(area, self.style.header_style);
        for (column, (x, width)) in state.columns().iter().zip(bounds) {
            buf.set_stringn(
                area.x + x,
                area.y,
                column.def().title.as_str(),
                usize::from(*width),
                self.style.header_style,
            );
        }
    }

    fn render_row(
        &self,
        state: &TreeGridState<RowCache>,
        id: NodeId,
        area: Rect,
        buf: &mut Buffer,
        bounds: &[(u16, u16)],
    ) {
        let tree = state.tree();
        let Some(node) = tree.get(id) else {
            return;
        };
        let options = state.options();
        let level = tree.level(id).unwrap_or_default();
        let ctx = RowContext {
            level: u16::try_from(level).unwrap_or(u16::MAX),
            is_expanded: node.is_expanded(),
            is_expandable: node.is_expandable(),
            status: node.status(),
            is_active: state.active() == Some(id),
            is_selected: node.is_selected(),
            is_dimmed: tree.is_filtered() && !tree.filter_hides() && !node.passes_filter(),
            checkbox: options.checkbox_for(node).then_some(node.is_selected()),
        };

        let mut row_style = Style::default();
        if ctx.is_dimmed {
            row_style = row_style.patch(self.style.dimmed_style);
        }
        if ctx.is_selected {
            row_style = row_style.patch(self.style.selected_style);
        }
        if ctx.is_active {
            row_style = row_style.patch(self.style.active_style);
        }
        buf.set_style(area, row_style);

        let icon = options.icon_for(node);
        let tree_column = state
            .columns()
            .iter()
            .position(|column| column.id() == TREE_COLUMN)
            .unwrap_or(0);
        for (idx, (x, width)) in bounds.iter().enumerate() {
            if *width == 0 {
                continue;
            }
            if idx == tree_column {
                let line = tree_label_line(
                    &ctx,
                    node.title.as_str(),
                    icon.as_deref(),
                    &self.glyphs,
                    self.style.line_style,
                );
                buf.set_line(area.x + x, area.y, &line, *width);
            } else if let Some(text) = state.columns().get(idx).and_then(|col| node.cell(col.id())) {
                buf.set_stringn(area.x + x, area.y, text, usize::from(*width), Style::default());
            }
        }
    }

    /// Writes the active node's tooltip into the bottom border.
    fn render_tooltip(&self, state: &TreeGridState<RowCache>, area: Rect, buf: &mut Buffer) {
        if !self.style.borders.contains(Borders::BOTTOM) || area.height < 2 || area.width < 3 {
            return;
        }
        let Some(tooltip) = state
            .active()
            .and_then(|id| state.tree().get(id))
            .and_then(|node| state.options().tooltip_for(node))
        else {
            return;
        };
        buf.set_stringn(
            area.x + 1,
            area.bottom() - 1,
            tooltip,
            usize::from(area.width - 2),
            self.style.tooltip_style,
        );
    }

    fn render_scrollbar(state: &TreeGridState<RowCache>, area: Rect, buf: &mut Buffer, first_row: usize) {
        let total_rows = state.viewport().row_count();
        let mut scrollbar_state = ScrollbarState::new(total_rows)
            .position(first_row)
            .viewport_content_length(usize::from(area.height));
        Scrollbar::default()
            .orientation(ScrollbarOrientation::VerticalRight)
            .render(area, buf, &mut scrollbar_state);
    }
}

impl StatefulWidget for TreeGrid<'_> {
    type State = TreeGridState<RowCache>;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let block = self.block();
        let inner = block.inner(area);
        block.render(area, buf);

        let header_height = u16::from(self.style.show_header && !state.columns().is_empty());
        let body = Rect {
            y: inner.y + header_height.min(inner.height),
            height: inner.height.saturating_sub(header_height),
            ..inner
        };
        let scrollable = Self::update_state(state, body);
        let state = &*state;
        let content_width = if scrollable {
            body.width.saturating_sub(1)
        } else {
            body.width
        };
        let bounds = Self::column_bounds(state, content_width);

        if header_height > 0 && inner.height > 0 {
            let header = Rect {
                height: 1,
                width: content_width,
                ..inner
            };
            self.render_header(state, header, buf, &bounds);
        }

        let viewport = state.viewport();
        let row_height = u64::from(viewport.row_height());
        let first_row = usize::try_from(viewport.scroll_top() / row_height).unwrap_or(usize::MAX);
        for (id, placement) in state.renderer().iter() {
            let Some(line) = placement
                .row_index
                .checked_sub(first_row)
                .and_then(|line| u16::try_from(line).ok())
                .filter(|line| *line < body.height)
            else {
                continue;
            };
            let row_area = Rect {
                y: body.y + line,
                height: 1,
                width: content_width,
                ..body
            };
            self.render_row(state, id, row_area, buf, &bounds);
        }

        if scrollable && body.width > 0 {
            let scrollbar_area = Rect {
                x: body.x + body.width - 1,
                width: 1,
                ..body
            };
            Self::render_scrollbar(state, scrollbar_area, buf, first_row);
        }
        self.render_tooltip(state, area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnDef;
    use crate::node::{Node, NodeData};
    use crate::options::{OptionSource, TreeGridOptions};
    use crate::registry::TreeRegistry;
    use ratatui::style::Modifier;

    fn grid_state(count: usize) -> TreeGridState<RowCache> {
        let mut state = TreeGridState::new(&mut TreeRegistry::new(), RowCache::new());
        let root = state.tree().root();
        let data: Vec<NodeData> = (1..=count)
            .map(|i| {
                NodeData::new(format!("node-{i}"))
                    .key(format!("n{i}"))
                    .cell("size", format!("{i}k"))
            })
            .collect();
        state.add_children(root, &data).unwrap();
        state
    }

    fn row_text(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width).map(|x| buf[(x, y)].symbol()).collect()
    }

    #[test]
    fn render_smoke_with_scrollbar() {
        let mut state = grid_state(12);
        let area = Rect::new(0, 0, 20, 6);
        let mut buffer = Buffer::empty(area);

        TreeGrid::default().render(area, &mut buffer, &mut state);

        assert!(row_text(&buffer, 1).contains("node-1"));
        assert!(row_text(&buffer, 4).contains("node-4"));
        assert_eq!(state.viewport().width(), 17);
        assert_eq!(state.viewport().height(), 4 * 22);
        assert!(state.renderer().last_update().is_some());
    }

    #[test]
    fn scrolled_grid_starts_at_scroll_row() {
        let mut state = grid_state(12);
        let area = Rect::new(0, 0, 20, 6);
        let mut buffer = Buffer::empty(area);
        TreeGrid::default().render(area, &mut buffer, &mut state);

        state.set_scroll_top(3 * 22);
        TreeGrid::default().render(area, &mut buffer, &mut state);

        assert!(row_text(&buffer, 1).contains("node-4"));
    }

    #[test]
    fn active_row_is_highlighted() {
        let mut state = grid_state(3);
        let n2 = state.tree().find_key("n2").unwrap();
        state.set_active(Some(n2)).unwrap();
        let area = Rect::new(0, 0, 20, 6);
        let mut buffer = Buffer::empty(area);

        TreeGrid::default().render(area, &mut buffer, &mut state);

        assert!(buffer[(2, 2)].modifier.contains(Modifier::REVERSED));
        assert!(!buffer[(2, 1)].modifier.contains(Modifier::REVERSED));
    }

    #[test]
    fn columns_draw_header_and_cells() {
        let mut state = grid_state(2);
        state.set_columns([
            ColumnDef::new(TREE_COLUMN, "Name"),
            ColumnDef::new("size", "Size").fixed(6),
        ]);
        let area = Rect::new(0, 0, 30, 6);
        let mut buffer = Buffer::empty(area);

        TreeGrid::default().render(area, &mut buffer, &mut state);

        let header = row_text(&buffer, 1);
        assert!(header.contains("Name"));
        assert!(header.contains("Size"));
        assert!(row_text(&buffer, 2).contains("1k"));
    }

    #[test]
    fn rows_removed_past_scroll_offset_still_draw_from_top() {
        let mut state = grid_state(12);
        let area = Rect::new(0, 0, 20, 6);
        let mut buffer = Buffer::empty(area);
        TreeGrid::default().render(area, &mut buffer, &mut state);
        state.set_scroll_top(8 * 22);
        TreeGrid::default().render(area, &mut buffer, &mut state);
        assert!(row_text(&buffer, 1).contains("node-9"));

        for i in 3..=12 {
            let id = state.tree().find_key(&format!("n{i}")).unwrap();
            state.remove(id).unwrap();
        }
        let mut buffer = Buffer::empty(area);
        TreeGrid::default().render(area, &mut buffer, &mut state);

        assert_eq!(state.viewport().scroll_top(), 0);
        assert!(row_text(&buffer, 1).contains("node-1"));
        assert!(row_text(&buffer, 2).contains("node-2"));
    }

    #[test]
    fn active_tooltip_is_drawn_on_bottom_border() {
        let options = TreeGridOptions::default().tooltip(OptionSource::callback(|node: &Node| {
            Some(format!("tip:{}", node.key()))
        }));
        let mut state =
            TreeGridState::with_options(&mut TreeRegistry::new(), options, RowCache::new());
        let root = state.tree().root();
        state
            .add_children(root, &[NodeData::new("a").key("a"), NodeData::new("b").key("b")])
            .unwrap();
        let area = Rect::new(0, 0, 20, 6);

        let mut buffer = Buffer::empty(area);
        TreeGrid::default().render(area, &mut buffer, &mut state);
        assert!(!row_text(&buffer, 5).contains("tip:"));

        let b = state.tree().find_key("b").unwrap();
        state.set_active(Some(b)).unwrap();
        let mut buffer = Buffer::empty(area);
        TreeGrid::default().render(area, &mut buffer, &mut state);
        assert!(row_text(&buffer, 5).contains("tip:b"));
        assert!(buffer[(1, 5)].modifier.contains(Modifier::ITALIC));
    }
}
