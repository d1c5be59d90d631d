use ratatui::style::Style;
use ratatui::text::{Line, Span};

use crate::context::RowContext;
use crate::node::NodeStatus;

#[derive(Clone, Copy, Debug)]
pub struct TreeGlyphs<'a> {
    pub indent: &'a str,
    pub leaf: &'a str,
    pub expanded: &'a str,
    pub collapsed: &'a str,
    pub loading: &'a str,
    pub error: &'a str,
    pub checked: &'a str,
    pub unchecked: &'a str,
}

impl TreeGlyphs<'static> {
    pub const fn unicode() -> Self {
        Self {
            indent: "  ",
            leaf: "•",
            expanded: "▼",
            collapsed: "▶",
            loading: "⟳",
            error: "!",
            checked: "☑",
            unchecked: "☐",
        }
    }

    pub const fn ascii() -> Self {
        Self {
            indent: "  ",
            leaf: "*",
            expanded: "v",
            collapsed: ">",
            loading: "~",
            error: "!",
            checked: "[x]",
            unchecked: "[ ]",
        }
    }
}

impl Default for TreeGlyphs<'_> {
    fn default() -> Self {
        TreeGlyphs::unicode()
    }
}

impl<'a> TreeGlyphs<'a> {
    /// Expander glyph for a row: status first, then expansion state.
    pub const fn expander(&self, ctx: &RowContext<'_>) -> &'a str {
        match ctx.status {
            NodeStatus::Loading => self.loading,
            NodeStatus::Error(_) => self.error,
            NodeStatus::Ok if !ctx.is_expandable => self.leaf,
            NodeStatus::Ok if ctx.is_expanded => self.expanded,
            NodeStatus::Ok => self.collapsed,
        }
    }
}

/// Builds the tree-column label: indentation, expander, checkbox, icon and title.
pub fn tree_label_line<'a>(
    ctx: &RowContext<'_>,
    title: &'a str,
    icon: Option<&'a str>,
    glyphs: &TreeGlyphs<'a>,
    line_style: Style,
) -> Line<'a> {
    let mut spans = Vec::with_capacity(usize::from(ctx.level) + 8);
    for _ in 0..ctx.level {
        spans.push(Span::styled(glyphs.indent, line_style));
    }
    spans.push(Span::raw(glyphs.expander(ctx)));
    spans.push(Span::raw(" "));
    if let Some(checked) = ctx.checkbox {
        spans.push(Span::raw(if checked {
            glyphs.checked
        } else {
            glyphs.unchecked
        }));
        spans.push(Span::raw(" "));
    }
    if let Some(icon) = icon.filter(|icon| !icon.is_empty()) {
        spans.push(Span::raw(icon));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::raw(title));
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(status: &NodeStatus) -> RowContext<'_> {
        RowContext {
            level: 0,
            is_expanded: false,
            is_expandable: false,
            status,
            is_active: false,
            is_selected: false,
            is_dimmed: false,
            checkbox: None,
        }
    }

    #[test]
    fn label_indents_by_level() {
        let status = NodeStatus::Ok;
        let ctx = RowContext {
            level: 2,
            is_expanded: true,
            is_expandable: true,
            ..ctx(&status)
        };

        let line = tree_label_line(&ctx, "docs", None, &TreeGlyphs::ascii(), Style::default());

        assert_eq!(line.to_string(), "    v docs");
    }

    #[test]
    fn label_shows_checkbox_and_icon() {
        let status = NodeStatus::Ok;
        let ctx = RowContext {
            checkbox: Some(true),
            ..ctx(&status)
        };

        let line = tree_label_line(&ctx, "a", Some("#"), &TreeGlyphs::ascii(), Style::default());

        assert_eq!(line.to_string(), "* [x] # a");
    }

    #[test]
    fn status_overrides_expander() {
        let glyphs = TreeGlyphs::unicode();
        let loading = NodeStatus::Loading;
        let failed = NodeStatus::Error("boom".to_string());
        let ok = NodeStatus::Ok;

        assert_eq!(glyphs.expander(&ctx(&loading)), "⟳");
        assert_eq!(glyphs.expander(&ctx(&failed)), "!");
        assert_eq!(
            glyphs.expander(&RowContext {
                is_expandable: true,
                ..ctx(&ok)
            }),
            "▶"
        );
    }
}
