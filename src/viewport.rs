use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};

use crate::error::TreeError;
use crate::node::{NodeId, NodeStatus};
use crate::rows::{VisitAction, VisitRowsOptions, visit_rows};
use crate::tree::Tree;

/// Row height in pixels used by default.
pub const ROW_HEIGHT: u32 = 22;
/// Extra rows rendered above and below the visible area.
pub const RENDER_PREFETCH: usize = 5;

/// Where a rendered row goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowPlacement {
    pub row_index: usize,
    /// Vertical offset inside the scroll content: `row_index * row_height`.
    pub top_px: u64,
}

/// Closed row-index interval rendered by a pass (prefetch margin included).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RowWindow {
    pub start: usize,
    pub end: usize,
}

impl RowWindow {
    #[inline]
    pub const fn contains(&self, row_index: usize) -> bool {
        self.start <= row_index && row_index <= self.end
    }
}

/// Summary of a completed viewport pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewportUpdate {
    pub window: RowWindow,
    /// Number of visible rows (all of them, not just the rendered window).
    pub row_count: usize,
    /// Height of the scroll content: `row_count * row_height`.
    pub content_height: u64,
    pub rendered: usize,
    pub removed: usize,
    /// `true` if any row index differs from the previous pass.
    pub reindexed: bool,
    /// `true` if the column layout changed during this pass.
    pub columns_modified: bool,
}

/// Markup side of the viewport: creates and releases row representations.
///
/// Called by the viewport pass only; implementations must not mutate the tree.
pub trait RowRenderer {
    /// Creates or refreshes the representation of a row inside the window.
    fn render_row(&mut self, tree: &Tree, id: NodeId, placement: RowPlacement);
    /// Releases the representation of a row (the node may already be destroyed).
    fn remove_markup(&mut self, id: NodeId);
    /// Called once after every completed pass.
    fn viewport_updated(&mut self, _update: &ViewportUpdate) {}
}

/// Renderer that keeps no markup (headless use).
impl RowRenderer for () {
    fn render_row(&mut self, _tree: &Tree, _id: NodeId, _placement: RowPlacement) {}

    fn remove_markup(&mut self, _id: NodeId) {}
}

/// Maps a scroll position onto row indices and drives render passes.
///
/// Row indices and the rendered set are owned here and rebuilt on each pass. Rows are
/// never collected into a list; only their count and index assignment are kept.
#[derive(Debug)]
pub struct Viewport {
    row_height: u32,
    prefetch: usize,
    scroll_top: u64,
    height: u32,
    width: u32,
    row_indices: FxHashMap<NodeId, usize>,
    row_count: usize,
    rendered: FxHashSet<NodeId>,
    window: RowWindow,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(ROW_HEIGHT, RENDER_PREFETCH)
    }
}

impl Viewport {
    pub fn new(row_height: u32, prefetch: usize) -> Self {
        Self {
            row_height: row_height.max(1),
            prefetch,
            scroll_top: 0,
            height: 0,
            width: 0,
            row_indices: FxHashMap::default(),
            row_count: 0,
            rendered: FxHashSet::default(),
            window: RowWindow::default(),
        }
    }

    pub const fn row_height(&self) -> u32 {
        self.row_height
    }

    pub const fn prefetch(&self) -> usize {
        self.prefetch
    }

    pub const fn scroll_top(&self) -> u64 {
        self.scroll_top
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of visible rows counted by the last pass.
    pub const fn row_count(&self) -> usize {
        self.row_count
    }

    /// Window rendered by the last pass.
    pub const fn window(&self) -> RowWindow {
        self.window
    }

    /// Height of the scroll content after the last pass.
    pub fn content_height(&self) -> u64 {
        self.row_count as u64 * u64::from(self.row_height)
    }

    /// Row index assigned by the last pass; `None` for nodes that are not visible rows.
    pub fn row_index(&self, id: NodeId) -> Option<usize> {
        self.row_indices.get(&id).copied()
    }

    /// Returns `true` if the node currently has markup.
    pub fn is_rendered(&self, id: NodeId) -> bool {
        self.rendered.contains(&id)
    }

    pub fn rendered_len(&self) -> usize {
        self.rendered.len()
    }

    /// Largest scroll offset that still fills the viewport.
    pub fn max_scroll_top(&self) -> u64 {
        self.content_height().saturating_sub(u64::from(self.height))
    }

    /// Sets the viewport size; returns `(width_changed, height_changed)`.
    pub const fn set_size(&mut self, width: u32, height: u32) -> (bool, bool) {
        let changed = (self.width != width, self.height != height);
        self.width = width;
        self.height = height;
        changed
    }

    /// Sets the scroll offset; returns `true` if it changed.
    ///
    /// The offset is not clamped here: the next pass pulls it back to
    /// [`Self::max_scroll_top`] once the content height is known.
    pub const fn set_scroll_top(&mut self, scroll_top: u64) -> bool {
        let changed = self.scroll_top != scroll_top;
        self.scroll_top = scroll_top;
        changed
    }

    /// Computes the padded row window for a scroll offset and viewport height.
    #[allow(clippy::cast_possible_truncation, reason = "row indices fit in usize")]
    pub const fn window_for(&self, scroll_top: u64, height: u32) -> RowWindow {
        let row_height = self.row_height as u64;
        let first = (scroll_top / row_height) as usize;
        let last = (scroll_top + height as u64).div_ceil(row_height) as usize;
        RowWindow {
            start: first.saturating_sub(self.prefetch),
            end: last.saturating_add(self.prefetch),
        }
    }

    /// Runs one render pass.
    ///
    /// Assigns contiguous row indices in visible-row order, renders rows inside the
    /// window, removes markup from rows that left it, and collects expanded nodes whose
    /// children are still unloaded into `needs_load`.
    ///
    /// If the content ended up shorter than the scroll offset, the offset is clamped and
    /// the window rendered again within the same pass.
    pub fn run_pass<R: RowRenderer + ?Sized>(
        &mut self,
        tree: &Tree,
        renderer: &mut R,
        needs_load: &mut Vec<NodeId>,
    ) -> Result<ViewportUpdate, TreeError> {
        let update = self.render_window(tree, renderer, needs_load)?;
        let max_scroll_top = self.max_scroll_top();
        if self.scroll_top <= max_scroll_top {
            return Ok(update);
        }
        log::trace!(
            "viewport: scroll_top {} past content, clamped to {max_scroll_top}",
            self.scroll_top
        );
        self.scroll_top = max_scroll_top;
        let collected = needs_load.len();
        let mut clamped = self.render_window(tree, renderer, needs_load)?;
        needs_load.truncate(collected);
        clamped.removed += update.removed;
        clamped.reindexed |= update.reindexed;
        Ok(clamped)
    }

    fn render_window<R: RowRenderer + ?Sized>(
        &mut self,
        tree: &Tree,
        renderer: &mut R,
        needs_load: &mut Vec<NodeId>,
    ) -> Result<ViewportUpdate, TreeError> {
        let window = self.window_for(self.scroll_top, self.height);
        let row_height = u64::from(self.row_height);
        let mut obsolete = std::mem::take(&mut self.rendered);
        let previous_indices = std::mem::take(&mut self.row_indices);
        let mut row_indices =
            FxHashMap::with_capacity_and_hasher(previous_indices.len(), FxBuildHasher);
        let mut rendered = FxHashSet::with_capacity_and_hasher(obsolete.len(), FxBuildHasher);
        let mut row_count = 0;
        let mut reindexed = false;
        let mut removed = 0;

        let result = visit_rows(tree, &VisitRowsOptions::new(), |id, node| {
            let idx = row_count;
            if previous_indices.get(&id) != Some(&idx) {
                reindexed = true;
            }
            row_indices.insert(id, idx);
            if window.contains(idx) {
                renderer.render_row(
                    tree,
                    id,
                    RowPlacement {
                        row_index: idx,
                        top_px: idx as u64 * row_height,
                    },
                );
                rendered.insert(id);
                obsolete.remove(&id);
            } else if obsolete.remove(&id) {
                renderer.remove_markup(id);
                removed += 1;
            }
            if node.expanded && node.is_lazy_unloaded() && node.status() != &NodeStatus::Loading {
                needs_load.push(id);
            }
            row_count += 1;
            VisitAction::Continue
        });

        // Rows that are no longer visible at all (collapsed, filtered, removed).
        for id in obsolete {
            renderer.remove_markup(id);
            removed += 1;
        }
        reindexed |= row_count != previous_indices.len();

        self.rendered = rendered;
        self.row_indices = row_indices;
        self.row_count = row_count;
        self.window = window;
        result?;

        Ok(ViewportUpdate {
            window,
            row_count,
            content_height: self.content_height(),
            rendered: self.rendered.len(),
            removed,
            reindexed,
            columns_modified: false,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::node::NodeData;
    use crate::tree::tests::{key, new_tree, sample_tree};

    /// Records renderer calls.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub(crate) rendered: FxHashMap<NodeId, RowPlacement>,
        pub(crate) removed: Vec<NodeId>,
        pub(crate) updates: usize,
    }

    impl RowRenderer for Recorder {
        fn render_row(&mut self, _tree: &Tree, id: NodeId, placement: RowPlacement) {
            self.rendered.insert(id, placement);
        }

        fn remove_markup(&mut self, id: NodeId) {
            self.rendered.remove(&id);
            self.removed.push(id);
        }

        fn viewport_updated(&mut self, _update: &ViewportUpdate) {
            self.updates += 1;
        }
    }

    fn wide_tree(count: usize) -> Tree {
        let mut tree = new_tree();
        let root = tree.root();
        let data: Vec<NodeData> = (0..count)
            .map(|i| NodeData::new(format!("row {i}")).key(format!("r{i}")))
            .collect();
        tree.add_children(root, &data).unwrap();
        tree
    }

    #[test]
    fn window_includes_prefetch_margin() {
        let viewport = Viewport::new(20, 5);

        assert_eq!(viewport.window_for(0, 100), RowWindow { start: 0, end: 10 });
        assert_eq!(viewport.window_for(400, 100), RowWindow { start: 15, end: 30 });
        assert_eq!(viewport.window_for(410, 100), RowWindow { start: 15, end: 31 });
    }

    #[test]
    fn row_indices_are_contiguous_in_visible_order() {
        let mut tree = sample_tree();
        let a = key(&tree, "a");
        tree.set_expanded(a, true).unwrap();
        let mut viewport = Viewport::new(20, 5);
        viewport.set_size(100, 200);

        let update = viewport
            .run_pass(&tree, &mut (), &mut Vec::new())
            .unwrap();

        let indices: Vec<_> = ["a", "b", "c", "e", "f"]
            .iter()
            .map(|k| viewport.row_index(key(&tree, k)))
            .collect();
        assert_eq!(indices, [Some(0), Some(1), Some(2), Some(3), Some(4)]);
        assert_eq!(viewport.row_index(key(&tree, "d")), None);
        assert_eq!(update.row_count, 5);
        assert_eq!(update.content_height, 100);
    }

    #[test]
    fn renders_only_window_and_cleans_up_by_difference() {
        let tree = wide_tree(100);
        let mut viewport = Viewport::new(10, 2);
        viewport.set_size(100, 50);
        let mut recorder = Recorder::default();

        viewport
            .run_pass(&tree, &mut recorder, &mut Vec::new())
            .unwrap();
        assert_eq!(recorder.rendered.len(), 8);
        let r3 = recorder.rendered[&key(&tree, "r3")];
        assert_eq!(r3, RowPlacement { row_index: 3, top_px: 30 });

        viewport.set_scroll_top(500);
        let update = viewport
            .run_pass(&tree, &mut recorder, &mut Vec::new())
            .unwrap();

        assert_eq!(update.window, RowWindow { start: 48, end: 57 });
        assert_eq!(update.removed, 8);
        assert_eq!(recorder.rendered.len(), 10);
        assert!(!viewport.is_rendered(key(&tree, "r3")));
        assert!(viewport.is_rendered(key(&tree, "r50")));
    }

    #[test]
    fn pass_after_shrink_clamps_scroll_and_renders_new_window() {
        let mut tree = wide_tree(100);
        let mut viewport = Viewport::new(10, 2);
        viewport.set_size(100, 50);
        viewport.set_scroll_top(900);
        let mut recorder = Recorder::default();
        viewport
            .run_pass(&tree, &mut recorder, &mut Vec::new())
            .unwrap();
        assert_eq!(recorder.rendered.len(), 10);

        for i in 5..100 {
            let id = key(&tree, &format!("r{i}"));
            tree.remove(id).unwrap();
        }
        let update = viewport
            .run_pass(&tree, &mut recorder, &mut Vec::new())
            .unwrap();

        assert_eq!(viewport.scroll_top(), 0);
        assert_eq!(update.window, RowWindow { start: 0, end: 7 });
        assert_eq!(update.row_count, 5);
        assert_eq!(update.rendered, 5);
        assert_eq!(update.removed, 10);
        assert!(viewport.is_rendered(key(&tree, "r0")));
    }

    #[test]
    fn collapsed_rows_lose_markup_and_index() {
        let mut tree = sample_tree();
        let a = key(&tree, "a");
        tree.set_expanded(a, true).unwrap();
        let mut viewport = Viewport::new(20, 5);
        viewport.set_size(100, 200);
        let mut recorder = Recorder::default();
        viewport
            .run_pass(&tree, &mut recorder, &mut Vec::new())
            .unwrap();

        tree.set_expanded(a, false).unwrap();
        let update = viewport
            .run_pass(&tree, &mut recorder, &mut Vec::new())
            .unwrap();

        let b = key(&tree, "b");
        assert!(recorder.removed.contains(&b));
        assert_eq!(viewport.row_index(b), None);
        assert_eq!(viewport.row_index(key(&tree, "e")), Some(1));
        assert!(update.reindexed);
    }

    #[test]
    fn removed_nodes_are_cleaned_up() {
        let mut tree = wide_tree(3);
        let mut viewport = Viewport::new(20, 5);
        viewport.set_size(100, 200);
        let mut recorder = Recorder::default();
        viewport
            .run_pass(&tree, &mut recorder, &mut Vec::new())
            .unwrap();

        let r1 = key(&tree, "r1");
        tree.remove(r1).unwrap();
        viewport
            .run_pass(&tree, &mut recorder, &mut Vec::new())
            .unwrap();

        assert_eq!(recorder.removed, vec![r1]);
        assert_eq!(viewport.row_count(), 2);
    }

    #[test]
    fn expanded_unloaded_nodes_request_load() {
        let mut tree = new_tree();
        let root = tree.root();
        tree.add_children(root, &[NodeData::new("L").key("l").lazy().expanded(true)])
            .unwrap();
        let mut viewport = Viewport::default();
        let mut needs_load = Vec::new();

        viewport
            .run_pass(&tree, &mut (), &mut needs_load)
            .unwrap();

        assert_eq!(needs_load, vec![key(&tree, "l")]);
    }

    #[test]
    fn unchanged_tree_is_not_reindexed() {
        let tree = wide_tree(5);
        let mut viewport = Viewport::default();
        viewport
            .run_pass(&tree, &mut (), &mut Vec::new())
            .unwrap();

        let update = viewport
            .run_pass(&tree, &mut (), &mut Vec::new())
            .unwrap();

        assert!(!update.reindexed);
    }
}
