use std::ops::{Deref, DerefMut};

use crate::action::{TreeAction, TreeEvent};
use crate::columns::{Column, ColumnDef, ColumnLayout, layout_columns};
use crate::error::TreeError;
use crate::filter::NodeMatcher;
use crate::node::{AddMode, NodeData, NodeId, NodeStatus};
use crate::options::TreeGridOptions;
use crate::registry::TreeRegistry;
use crate::rows::{VisitAction, VisitRowsOptions, last_row, visit_rows};
use crate::tree::{ExpandOutcome, Tree};
use crate::viewport::{RowRenderer, Viewport, ViewportUpdate};

/// Pixels kept between a row scrolled into view and the viewport edge.
const SCROLL_MARGIN: u64 = 1;

/// Kind of tree mutation reported to [`TreeGridState::on_structural_change`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Remove,
    Move,
    Expand,
    Collapse,
    Filter,
    Load,
    /// Title, cell or flag change; row order is unaffected.
    Data,
}

/// Relation used by [`TreeGridState::find_related`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    PageUp,
    PageDown,
    First,
    Last,
    Parent,
    Left,
    Right,
}

/// Tree, viewport and columns of one grid, plus update scheduling.
///
/// Tree mutations go through the wrapper methods here so that every change is
/// reported to [`Self::on_structural_change`]. Viewport passes are deferred and
/// coalesced: any number of changes results in one pass at the next [`Self::flush`].
pub struct TreeGridState<R: RowRenderer = ()> {
    tree: Tree,
    options: TreeGridOptions,
    viewport: Viewport,
    columns: Vec<Column>,
    columns_stale: bool,
    renderer: R,
    active: Option<NodeId>,
    suspend_count: usize,
    pending: bool,
    update_count: u64,
    load_requests: Vec<NodeId>,
}

impl<R: RowRenderer> TreeGridState<R> {
    /// Creates an empty grid with default options; the tree identity comes from `trees`.
    pub fn new(trees: &mut TreeRegistry, renderer: R) -> Self {
        Self::with_options(trees, TreeGridOptions::default(), renderer)
    }

    pub fn with_options(trees: &mut TreeRegistry, options: TreeGridOptions, renderer: R) -> Self {
        Self {
            tree: Tree::new(trees),
            viewport: Viewport::new(options.row_height, options.prefetch_rows),
            options,
            columns: Vec::new(),
            columns_stale: false,
            renderer,
            active: None,
            suspend_count: 0,
            pending: false,
            update_count: 0,
            load_requests: Vec::new(),
        }
    }

    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Direct tree access. Changes made here must be reported through
    /// [`Self::on_structural_change`].
    pub const fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub const fn options(&self) -> &TreeGridOptions {
        &self.options
    }

    pub const fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub const fn renderer(&self) -> &R {
        &self.renderer
    }

    pub const fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Number of completed viewport passes.
    pub const fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Returns `true` if a viewport pass has been requested but not run yet.
    pub const fn is_update_pending(&self) -> bool {
        self.pending
    }

    pub const fn is_suspended(&self) -> bool {
        self.suspend_count > 0
    }

    /// Requests a viewport pass.
    ///
    /// Non-immediate requests only mark the viewport stale; they coalesce into the
    /// next [`Self::flush`]. Immediate requests run the pass now unless updates are
    /// suspended.
    pub fn request_viewport_update(
        &mut self,
        immediate: bool,
    ) -> Result<Option<ViewportUpdate>, TreeError> {
        self.pending = true;
        if immediate && self.suspend_count == 0 {
            return self.update_viewport().map(Some);
        }
        Ok(None)
    }

    /// Runs the pending viewport pass, if any.
    pub fn flush(&mut self) -> Result<Option<ViewportUpdate>, TreeError> {
        if !self.pending || self.suspend_count > 0 {
            return Ok(None);
        }
        self.update_viewport().map(Some)
    }

    /// Runs a viewport pass unconditionally.
    pub fn update_viewport(&mut self) -> Result<ViewportUpdate, TreeError> {
        self.pending = false;
        let columns_modified = self.columns_stale && self.layout_columns().modified;
        let mut needs_load = Vec::new();
        let mut update = self
            .viewport
            .run_pass(&self.tree, &mut self.renderer, &mut needs_load)?;
        update.columns_modified = columns_modified;
        for id in needs_load {
            self.request_load(id);
        }
        self.update_count += 1;
        log::debug!(
            "{}: viewport pass {} rendered rows {}..={} of {}, removed {}",
            self.options.name,
            self.update_count,
            update.window.start,
            update.window.end,
            update.row_count,
            update.removed
        );
        self.renderer.viewport_updated(&update);
        Ok(update)
    }

    /// Reports a tree mutation; schedules a viewport pass.
    pub fn on_structural_change(&mut self, kind: ChangeKind, node: Option<NodeId>) {
        log::trace!("{}: {kind:?} {node:?}", self.options.name);
        if self.active.is_some_and(|id| !self.tree.contains(id)) {
            self.active = None;
        }
        if kind == ChangeKind::Remove {
            let tree = &self.tree;
            self.load_requests.retain(|id| tree.contains(*id));
        }
        self.pending = true;
    }

    /// Suspends viewport passes until the returned guard (and every nested guard) is
    /// dropped. The last guard runs one pass if anything was requested meanwhile.
    pub fn suspend_updates(&mut self) -> UpdateGuard<'_, R> {
        self.suspend_count += 1;
        UpdateGuard { state: self }
    }

    /// Runs `f` with updates suspended; at most one pass runs afterwards, also when
    /// `f` returns an error.
    pub fn run_without_update<T, F>(&mut self, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        let mut guard = self.suspend_updates();
        f(&mut *guard)
    }

    pub fn add_node(
        &mut self,
        target: NodeId,
        data: NodeData,
        mode: AddMode,
    ) -> Result<NodeId, TreeError> {
        let id = self.tree.add_node(target, data, mode)?;
        self.on_structural_change(ChangeKind::Add, Some(id));
        Ok(id)
    }

    pub fn add_children(
        &mut self,
        parent: NodeId,
        batch: &[NodeData],
    ) -> Result<Vec<NodeId>, TreeError> {
        let added = self.tree.add_children(parent, batch)?;
        self.on_structural_change(ChangeKind::Add, Some(parent));
        Ok(added)
    }

    pub fn remove(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let removed = self.tree.remove(id)?;
        self.on_structural_change(ChangeKind::Remove, Some(id));
        Ok(removed)
    }

    pub fn remove_children(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let removed = self.tree.remove_children(id)?;
        self.on_structural_change(ChangeKind::Remove, Some(id));
        Ok(removed)
    }

    /// Drops the children of a node so they are requested again on the next expand.
    pub fn reset_lazy(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let removed = self.tree.reset_lazy(id)?;
        self.on_structural_change(ChangeKind::Remove, Some(id));
        Ok(removed)
    }

    pub fn move_to(&mut self, id: NodeId, target: NodeId, mode: AddMode) -> Result<(), TreeError> {
        self.tree.move_to(id, target, mode)?;
        self.on_structural_change(ChangeKind::Move, Some(id));
        Ok(())
    }

    /// Expands or collapses a node. An unloaded lazy node is queued for loading
    /// (see [`Self::take_load_requests`]) and expands once its children arrive.
    pub fn set_expanded(&mut self, id: NodeId, flag: bool) -> Result<ExpandOutcome, TreeError> {
        let outcome = self.tree.set_expanded(id, flag)?;
        match outcome {
            ExpandOutcome::Changed => {
                let kind = if flag {
                    ChangeKind::Expand
                } else {
                    ChangeKind::Collapse
                };
                self.on_structural_change(kind, Some(id));
            }
            ExpandOutcome::NeedsLoad => self.request_load(id),
            ExpandOutcome::Unchanged => {}
        }
        Ok(outcome)
    }

    pub fn toggle_expanded(&mut self, id: NodeId) -> Result<ExpandOutcome, TreeError> {
        let expanded = self.tree.node(id)?.is_expanded();
        self.set_expanded(id, !expanded)
    }

    /// Expands or collapses every loaded node; returns the unloaded lazy nodes.
    pub fn expand_all(&mut self, flag: bool) -> Vec<NodeId> {
        let unloaded = self.run_without_update(|state| {
            let unloaded = state.tree.expand_all(flag);
            let kind = if flag {
                ChangeKind::Expand
            } else {
                ChangeKind::Collapse
            };
            state.on_structural_change(kind, None);
            unloaded
        });
        log::debug!(
            "{}: expand_all({flag}), {} unloaded",
            self.options.name,
            unloaded.len()
        );
        unloaded
    }

    /// Filters with the configured [`TreeGridOptions::filter`]; returns the match count.
    pub fn filter_nodes<M: NodeMatcher>(&mut self, matcher: &M) -> usize {
        let count = self.tree.filter_nodes(matcher, self.options.filter);
        self.on_structural_change(ChangeKind::Filter, None);
        count
    }

    /// Like [`Self::filter_nodes`], matching whole branches.
    pub fn filter_branches<M: NodeMatcher>(&mut self, matcher: &M) -> usize {
        let count = self.tree.filter_branches(matcher, self.options.filter);
        self.on_structural_change(ChangeKind::Filter, None);
        count
    }

    pub fn clear_filter(&mut self) {
        self.tree.clear_filter();
        self.on_structural_change(ChangeKind::Filter, None);
    }

    pub fn set_selected(&mut self, id: NodeId, flag: bool) -> Result<bool, TreeError> {
        let changed = self.tree.set_selected(id, flag)?;
        if changed {
            self.on_structural_change(ChangeKind::Data, Some(id));
        }
        Ok(changed)
    }

    /// Removes all nodes.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.active = None;
        self.load_requests.clear();
        self.on_structural_change(ChangeKind::Remove, None);
    }

    /// Returns and clears the nodes waiting for children from the loader.
    pub fn take_load_requests(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.load_requests)
    }

    /// Supplies the children of a lazy node requested earlier.
    pub fn finish_load(&mut self, id: NodeId, batch: &[NodeData]) -> Result<Vec<NodeId>, TreeError> {
        self.load_requests.retain(|request| *request != id);
        let result = self.tree.finish_load(id, batch);
        // A rejected batch still changes the node status.
        self.on_structural_change(ChangeKind::Load, Some(id));
        result
    }

    /// Records a failed load; the node stays unloaded so the load can be retried.
    pub fn fail_load(&mut self, id: NodeId, message: impl Into<String>) -> Result<(), TreeError> {
        self.load_requests.retain(|request| *request != id);
        let message = message.into();
        log::debug!("{}: load failed for {id:?}: {message}", self.options.name);
        self.tree.fail_load(id, message)?;
        self.on_structural_change(ChangeKind::Load, Some(id));
        Ok(())
    }

    fn request_load(&mut self, id: NodeId) {
        if let Ok(node) = self.tree.node_mut(id) {
            node.status = NodeStatus::Loading;
        }
        if !self.load_requests.contains(&id) {
            log::trace!("{}: load requested for {id:?}", self.options.name);
            self.load_requests.push(id);
        }
    }

    /// Sets the viewport size in pixels; a width change re-runs the column layout.
    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        let (width_changed, height_changed) = self.viewport.set_size(width, height);
        if width_changed {
            self.columns_stale = true;
        }
        if width_changed || height_changed {
            self.pending = true;
        }
    }

    /// Sets the scroll offset. The next pass clamps it to the content height.
    pub fn set_scroll_top(&mut self, scroll_top: u64) -> bool {
        let changed = self.viewport.set_scroll_top(scroll_top);
        if changed {
            self.pending = true;
        }
        changed
    }

    /// Replaces the column definitions.
    pub fn set_columns(&mut self, defs: impl IntoIterator<Item = ColumnDef>) {
        self.columns = defs.into_iter().map(Column::from).collect();
        self.columns_stale = true;
        self.pending = true;
    }

    /// Distributes the viewport width across the columns.
    pub fn layout_columns(&mut self) -> ColumnLayout {
        self.columns_stale = false;
        layout_columns(
            f64::from(self.viewport.width()),
            &mut self.columns,
            self.options.min_column_width,
        )
    }

    /// Number of nodes; with `visible`, the rows of the last pass.
    pub fn count(&self, visible: bool) -> usize {
        if visible {
            self.viewport.row_count()
        } else {
            self.tree.count()
        }
    }

    /// First row completely inside the viewport.
    pub fn topmost_viewport_row(&self) -> Option<NodeId> {
        let row_height = u64::from(self.viewport.row_height());
        let index = self.viewport.scroll_top().div_ceil(row_height);
        self.row_or_last(index)
    }

    /// Last row completely inside the viewport.
    pub fn lowest_viewport_row(&self) -> Option<NodeId> {
        let row_height = u64::from(self.viewport.row_height());
        let bottom = self.viewport.scroll_top() + u64::from(self.viewport.height());
        let index = (bottom / row_height).saturating_sub(1);
        self.row_or_last(index)
    }

    /// Walks the visible rows up to `index`; a shorter tree yields its last row.
    fn row_or_last(&self, index: u64) -> Option<NodeId> {
        let mut found = None;
        let mut row = 0;
        visit_rows(&self.tree, &VisitRowsOptions::new(), |id, _| {
            found = Some(id);
            if row == index {
                return VisitAction::Stop;
            }
            row += 1;
            VisitAction::Continue
        })
        .ok()?;
        found
    }

    /// Rows per page, at least one.
    fn page_size(&self) -> usize {
        (self.viewport.height() / self.viewport.row_height()).max(1) as usize
    }

    pub const fn active(&self) -> Option<NodeId> {
        self.active
    }

    pub fn set_active(&mut self, id: Option<NodeId>) -> Result<(), TreeError> {
        if let Some(id) = id {
            if id == self.tree.root() {
                return Err(TreeError::RootNode);
            }
            self.tree.node(id)?;
        }
        if self.active != id {
            self.active = id;
            self.pending = true;
        }
        Ok(())
    }

    /// Scrolls the minimum amount needed to show a row, keeping a one pixel margin.
    ///
    /// Returns `Ok(false)` if the row is already in view or not a visible row.
    pub fn scroll_to(&mut self, id: NodeId) -> Result<bool, TreeError> {
        self.tree.node(id)?;
        self.flush()?;
        let Some(row_index) = self.viewport.row_index(id) else {
            return Ok(false);
        };
        let row_height = u64::from(self.viewport.row_height());
        let row_top = row_index as u64 * row_height;
        let row_bottom = row_top + row_height;
        let current = self.viewport.scroll_top();
        let height = u64::from(self.viewport.height());

        let scroll_top = if row_top < current {
            row_top.saturating_sub(SCROLL_MARGIN)
        } else if row_bottom > current + height {
            (row_bottom + SCROLL_MARGIN).saturating_sub(height)
        } else {
            return Ok(false);
        };
        let scroll_top = scroll_top.min(self.viewport.max_scroll_top());
        log::trace!("{}: scroll_to({row_top}): {current} => {scroll_top}", self.options.name);
        if !self.viewport.set_scroll_top(scroll_top) {
            return Ok(false);
        }
        self.request_viewport_update(true)?;
        Ok(true)
    }

    /// Expands all ancestors of a node and scrolls it into view.
    pub fn make_visible(&mut self, id: NodeId) -> Result<bool, TreeError> {
        let mut ancestors = Vec::new();
        self.tree.visit_parents(id, false, |parent, _| {
            ancestors.push(parent);
            true
        })?;
        for parent in ancestors.into_iter().rev() {
            self.set_expanded(parent, true)?;
        }
        self.scroll_to(id)
    }

    /// Finds a node relative to `id`.
    ///
    /// Page moves first jump to the edge of the viewport, then by one page.
    /// Returns `Ok(None)` if there is no such node.
    pub fn find_related(&self, id: NodeId, direction: Direction) -> Result<Option<NodeId>, TreeError> {
        let node = self.tree.node(id)?;
        let root = self.tree.root();
        Ok(match direction {
            Direction::Parent | Direction::Left => node.parent().filter(|parent| *parent != root),
            Direction::Right => node.child_ids().first().copied(),
            Direction::First => self.first_visible_row()?,
            Direction::Last => self.last_visible_row()?,
            Direction::Up => self.step_rows(id, 1, true)?,
            Direction::Down => self.step_rows(id, 1, false)?,
            Direction::PageDown => match self.lowest_viewport_row() {
                Some(bottom) if bottom != id => Some(bottom),
                _ => self.step_rows(id, self.page_size(), false)?,
            },
            Direction::PageUp => {
                if self.viewport.row_index(id) == Some(0) {
                    Some(id)
                } else {
                    match self.topmost_viewport_row() {
                        Some(top) if top != id => Some(top),
                        _ => self.step_rows(id, self.page_size(), true)?,
                    }
                }
            }
        })
    }

    /// Finds the next visible row matching `matcher` after `start` (default: the
    /// active node), wrapping around at the end. `start` itself never matches.
    pub fn find_next_node<M: NodeMatcher>(
        &self,
        matcher: &M,
        start: Option<NodeId>,
    ) -> Result<Option<NodeId>, TreeError> {
        let options = match start.or(self.active) {
            Some(start) => VisitRowsOptions::new()
                .start(start)
                .include_self(false)
                .wrap(true),
            None => VisitRowsOptions::new(),
        };
        let mut found = None;
        visit_rows(&self.tree, &options, |id, node| {
            if matcher.is_match(node) {
                found = Some(id);
                VisitAction::Stop
            } else {
                VisitAction::Continue
            }
        })?;
        Ok(found)
    }

    fn first_visible_row(&self) -> Result<Option<NodeId>, TreeError> {
        let mut first = None;
        visit_rows(&self.tree, &VisitRowsOptions::new(), |id, _| {
            first = Some(id);
            VisitAction::Stop
        })?;
        Ok(first)
    }

    fn last_visible_row(&self) -> Result<Option<NodeId>, TreeError> {
        let Some(last) = last_row(&self.tree, false) else {
            return Ok(None);
        };
        let mut found = None;
        let options = VisitRowsOptions::new().start(last).reverse(true);
        visit_rows(&self.tree, &options, |id, _| {
            found = Some(id);
            VisitAction::Stop
        })?;
        Ok(found)
    }

    /// Walks up to `count` rows away from `id`; returns the last row reached.
    fn step_rows(&self, id: NodeId, count: usize, reverse: bool) -> Result<Option<NodeId>, TreeError> {
        let mut reached = None;
        let mut remaining = count;
        let options = VisitRowsOptions::new()
            .start(id)
            .include_self(false)
            .reverse(reverse);
        visit_rows(&self.tree, &options, |row, _| {
            reached = Some(row);
            remaining -= 1;
            if remaining == 0 {
                VisitAction::Stop
            } else {
                VisitAction::Continue
            }
        })?;
        Ok(reached)
    }

    /// Handles a tree action and returns the resulting event.
    pub fn handle_action<C>(&mut self, action: TreeAction<C>) -> Result<TreeEvent<C>, TreeError> {
        if matches!(&action, TreeAction::Custom(_)) {
            return Ok(TreeEvent::Action(action));
        }
        self.flush()?;

        let handled = match action {
            TreeAction::SelectPrev => self.navigate(Direction::Up)?,
            TreeAction::SelectNext => self.navigate(Direction::Down)?,
            TreeAction::PageUp => self.navigate(Direction::PageUp)?,
            TreeAction::PageDown => self.navigate(Direction::PageDown)?,
            TreeAction::SelectFirst => self.navigate(Direction::First)?,
            TreeAction::SelectLast => self.navigate(Direction::Last)?,
            TreeAction::SelectParent => match self.active {
                Some(active) if self.tree.node(active)?.is_expanded() => {
                    self.set_expanded(active, false)? != ExpandOutcome::Unchanged
                }
                _ => self.navigate(Direction::Parent)?,
            },
            TreeAction::SelectChild => match self.active {
                Some(active) if !self.tree.node(active)?.is_expanded() => {
                    self.set_expanded(active, true)? != ExpandOutcome::Unchanged
                }
                _ => self.navigate(Direction::Right)?,
            },
            TreeAction::ToggleNode => match self.active {
                Some(active) => self.toggle_expanded(active)? != ExpandOutcome::Unchanged,
                None => false,
            },
            TreeAction::ToggleSelected => match self.active {
                Some(active) => {
                    let selected = self.tree.node(active)?.is_selected();
                    self.set_selected(active, !selected)?
                }
                None => false,
            },
            TreeAction::ExpandAll => {
                self.expand_all(true);
                true
            }
            TreeAction::CollapseAll => {
                self.expand_all(false);
                true
            }
            TreeAction::Custom(_) => false,
        };
        Ok(if handled {
            TreeEvent::Handled
        } else {
            TreeEvent::Unhandled
        })
    }

    /// Activates the node in `direction` from the active node and scrolls to it.
    /// Without an active node, starts at the first (or last) row.
    fn navigate(&mut self, direction: Direction) -> Result<bool, TreeError> {
        let target = match self.active {
            Some(active) => self.find_related(active, direction)?,
            None if direction == Direction::Last => self.last_visible_row()?,
            None => self.first_visible_row()?,
        };
        let Some(target) = target else {
            return Ok(false);
        };
        if self.active == Some(target) {
            return Ok(false);
        }
        self.set_active(Some(target))?;
        self.scroll_to(target)?;
        Ok(true)
    }
}

/// Keeps viewport updates suspended while alive.
///
/// Dereferences to the state, so mutations (and nested guards) go through it.
pub struct UpdateGuard<'a, R: RowRenderer> {
    state: &'a mut TreeGridState<R>,
}

impl<R: RowRenderer> Deref for UpdateGuard<'_, R> {
    type Target = TreeGridState<R>;

    fn deref(&self) -> &Self::Target {
        self.state
    }
}

impl<R: RowRenderer> DerefMut for UpdateGuard<'_, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.state
    }
}

impl<R: RowRenderer> Drop for UpdateGuard<'_, R> {
    fn drop(&mut self) {
        let state = &mut *self.state;
        state.suspend_count = state.suspend_count.saturating_sub(1);
        if state.suspend_count == 0
            && state.pending
            && let Err(err) = state.update_viewport()
        {
            log::error!("{}: deferred viewport update failed: {err}", state.options.name);
        }
    }
}
