use ratatui::style::{Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::Borders;

/// Visual settings of the grid widget.
#[derive(Clone, Debug)]
pub struct TreeGridStyle<'a> {
    pub title: Option<Line<'a>>,
    pub block_style: Style,
    pub border_style: Style,
    pub header_style: Style,
    /// Row of the active node.
    pub active_style: Style,
    pub selected_style: Style,
    /// Rows that do not match a dimming filter.
    pub dimmed_style: Style,
    /// Indentation glyphs.
    pub line_style: Style,
    /// Tooltip of the active node, drawn on the bottom border.
    pub tooltip_style: Style,
    pub borders: Borders,
    /// Draws a header row with the column titles (only if columns are set).
    pub show_header: bool,
}

impl Default for TreeGridStyle<'_> {
    fn default() -> Self {
        Self {
            title: None,
            block_style: Style::default(),
            border_style: Style::default(),
            header_style: Style::new().add_modifier(Modifier::BOLD),
            active_style: Style::new().add_modifier(Modifier::REVERSED),
            selected_style: Style::new().add_modifier(Modifier::BOLD),
            dimmed_style: Style::new().add_modifier(Modifier::DIM),
            line_style: Style::default(),
            tooltip_style: Style::new().add_modifier(Modifier::ITALIC),
            borders: Borders::ALL,
            show_header: true,
        }
    }
}
