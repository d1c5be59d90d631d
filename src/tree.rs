use rustc_hash::{FxBuildHasher, FxHashSet};

use crate::error::TreeError;
use crate::filter::{FilterConfig, FilterMode, NodeMatcher};
use crate::node::{AddMode, Children, Node, NodeData, NodeId, NodeStatus, TreeId};
use crate::registry::{NodeRegistry, TreeRegistry};
use crate::rows::VisitAction;

/// Result of an expand/collapse request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// The expansion state changed.
    Changed,
    /// Nothing to do (already in that state, or a leaf).
    Unchanged,
    /// The node is lazy and unloaded; children must be supplied via [`Tree::finish_load`].
    NeedsLoad,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Hierarchical node store.
///
/// Owns one invisible root node (never rendered, never found by key) and the
/// [`NodeRegistry`]. All nodes live in a slot arena addressed by [`NodeId`].
pub struct Tree {
    id: TreeId,
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    registry: NodeRegistry,
    // Source of generated keys; per tree, never shared.
    key_sequence: u64,
    pub(crate) filter: Option<FilterConfig>,
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("id", &self.id)
            .field("count", &self.count())
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl Tree {
    /// Creates an empty tree containing only the invisible root.
    ///
    /// The tree's identity comes from `trees`; hand the tree back to
    /// [`TreeRegistry::destroy`] when it is torn down.
    pub fn new(trees: &mut TreeRegistry) -> Self {
        let id = trees.create();
        let root = NodeId::new(id, 0, 0);
        Self {
            id,
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::root()),
            }],
            free: Vec::new(),
            root,
            registry: NodeRegistry::new(),
            key_sequence: 0,
            filter: None,
        }
    }

    pub const fn id(&self) -> TreeId {
        self.id
    }

    /// Returns the invisible root node id.
    pub const fn root(&self) -> NodeId {
        self.root
    }

    pub const fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Returns the node if the id is live and belongs to this tree.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.tree != self.id {
            return None;
        }
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    /// Returns the node or an [`TreeError::UnknownNode`] error.
    pub fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.get(id).ok_or(TreeError::UnknownNode(id))
    }

    /// Mutable access to display fields (title, icon, cells, ...).
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        if id.tree != self.id {
            return Err(TreeError::UnknownNode(id));
        }
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(TreeError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of nodes, not counting the root.
    pub fn count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Returns the loaded children of a node (empty for unknown ids).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[], Node::child_ids)
    }

    /// Returns the top-level nodes.
    pub fn top_nodes(&self) -> &[NodeId] {
        self.children(self.root)
    }

    /// Returns the parent; top-level nodes report the root.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::parent)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    /// Depth below the root: top-level nodes are level 0.
    pub fn level(&self, id: NodeId) -> Result<usize, TreeError> {
        let mut level = 0;
        let mut parent = self.node(id)?.parent;
        while let Some(parent_id) = parent {
            if parent_id == self.root {
                return Ok(level);
            }
            level += 1;
            parent = self.node(parent_id)?.parent;
        }
        Err(TreeError::RootNode)
    }

    pub fn find_key(&self, key: &str) -> Option<NodeId> {
        self.registry.get(key)
    }

    /// Returns all nodes sharing a ref key.
    pub fn find_ref(&self, ref_key: &str) -> Vec<NodeId> {
        self.registry.ref_nodes(ref_key).collect()
    }

    /// Returns the other nodes sharing this node's ref key.
    pub fn clones(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let node = self.node(id)?;
        Ok(node.ref_key().map_or_else(Vec::new, |ref_key| {
            self.registry
                .ref_nodes(ref_key)
                .filter(|other| *other != id)
                .collect()
        }))
    }

    /// Returns all nodes accepted by the matcher, in pre-order.
    pub fn find_all<M: NodeMatcher>(&self, matcher: &M) -> Vec<NodeId> {
        let mut found = Vec::new();
        let _ = self.visit(self.root, false, |id, node| {
            if matcher.is_match(node) {
                found.push(id);
            }
            VisitAction::Continue
        });
        found
    }

    /// Returns the first node (pre-order) accepted by the matcher.
    pub fn find_first<M: NodeMatcher>(&self, matcher: &M) -> Option<NodeId> {
        let mut found = None;
        let _ = self.visit(self.root, false, |id, node| {
            if matcher.is_match(node) {
                found = Some(id);
                return VisitAction::Stop;
            }
            VisitAction::Continue
        });
        found
    }

    /// Calls `callback` for the subtree of `from` in depth-first pre-order,
    /// ignoring expansion and filter state.
    ///
    /// Returns `Ok(false)` if the callback stopped the iteration.
    pub fn visit<F>(&self, from: NodeId, include_self: bool, mut callback: F) -> Result<bool, TreeError>
    where
        F: FnMut(NodeId, &Node) -> VisitAction,
    {
        let start = self.node(from)?;
        let mut stack: Vec<NodeId> = Vec::with_capacity(16);
        if include_self && from != self.root {
            match callback(from, start) {
                VisitAction::Stop => return Ok(false),
                VisitAction::Skip => return Ok(true),
                VisitAction::Continue => {}
            }
        }
        stack.extend(start.child_ids().iter().rev().copied());
        while let Some(id) = stack.pop() {
            let node = self.node(id)?;
            match callback(id, node) {
                VisitAction::Stop => return Ok(false),
                VisitAction::Skip => continue,
                VisitAction::Continue => {}
            }
            stack.extend(node.child_ids().iter().rev().copied());
        }
        Ok(true)
    }

    /// Calls `callback` for the ancestors of `id`, bottom-up, excluding the root.
    ///
    /// Returns `Ok(false)` if the callback returned `false`.
    pub fn visit_parents<F>(&self, id: NodeId, include_self: bool, mut callback: F) -> Result<bool, TreeError>
    where
        F: FnMut(NodeId, &Node) -> bool,
    {
        let node = self.node(id)?;
        if include_self && id != self.root && !callback(id, node) {
            return Ok(false);
        }
        let mut parent = node.parent;
        while let Some(parent_id) = parent {
            if parent_id == self.root {
                break;
            }
            let parent_node = self.node(parent_id)?;
            if !callback(parent_id, parent_node) {
                return Ok(false);
            }
            parent = parent_node.parent;
        }
        Ok(true)
    }

    /// Returns `true` if `id` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut parent = self.parent(id);
        while let Some(parent_id) = parent {
            if parent_id == ancestor {
                return true;
            }
            parent = self.parent(parent_id);
        }
        false
    }

    /// Returns `true` if the node is currently a visible row: all ancestors expanded
    /// and, with a hiding filter active, the node passes it.
    pub fn is_row_visible(&self, id: NodeId) -> bool {
        if id == self.root {
            return false;
        }
        let Some(node) = self.get(id) else {
            return false;
        };
        if self.filter_hides() && !node.passes_filter() {
            return false;
        }
        let mut parent = node.parent;
        while let Some(parent_id) = parent {
            if parent_id == self.root {
                return true;
            }
            match self.get(parent_id) {
                Some(parent_node) if parent_node.expanded => parent = parent_node.parent,
                _ => return false,
            }
        }
        false
    }

    /// Returns `true` if an active filter removes non-matching rows from traversal.
    #[inline]
    pub fn filter_hides(&self) -> bool {
        self.filter
            .is_some_and(|config| config.mode == FilterMode::Hide)
    }

    /// Verifies that the registry and the reachable node set agree.
    pub fn check(&self) -> Result<(), TreeError> {
        let mut reachable = 0;
        let mut linked = true;
        self.visit(self.root, false, |id, node| {
            reachable += 1;
            if let Some(parent) = node.parent
                && !self.children(parent).contains(&id)
            {
                linked = false;
            }
            if self.registry.get(node.key()) != Some(id) {
                linked = false;
            }
            VisitAction::Continue
        })?;
        let registered = self.registry.len();
        if !linked || registered != reachable {
            return Err(TreeError::Inconsistent {
                registered,
                reachable,
            });
        }
        Ok(())
    }

    /// Adds a node (with its nested children) relative to `target`.
    pub fn add_node(
        &mut self,
        target: NodeId,
        data: NodeData,
        mode: AddMode,
    ) -> Result<NodeId, TreeError> {
        let (parent, index) = self.insert_position(target, mode)?;
        let batch_keys = self.validate_batch(std::slice::from_ref(&data))?;
        self.insert_subtree(parent, index, &data, &batch_keys)
    }

    /// Appends a batch of nodes to `parent`.
    ///
    /// The whole batch is validated first; a duplicate key leaves the tree unchanged.
    pub fn add_children(
        &mut self,
        parent: NodeId,
        batch: &[NodeData],
    ) -> Result<Vec<NodeId>, TreeError> {
        let (parent, mut index) = self.insert_position(parent, AddMode::AppendChild)?;
        let batch_keys = self.validate_batch(batch)?;
        let mut added = Vec::with_capacity(batch.len());
        for data in batch {
            added.push(self.insert_subtree(parent, index, data, &batch_keys)?);
            index += 1;
        }
        Ok(added)
    }

    /// Detaches and destroys a node and its whole subtree.
    ///
    /// Returns the number of destroyed nodes.
    pub fn remove(&mut self, id: NodeId) -> Result<usize, TreeError> {
        if id == self.root {
            return Err(TreeError::RootNode);
        }
        self.detach(id)?;
        Ok(self.destroy_subtree(id))
    }

    /// Destroys all children of a node, leaving it a leaf.
    pub fn remove_children(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let is_root = id == self.root;
        let removed = self.drop_children(id)?;
        let node = self.node_mut(id)?;
        node.children = Children::Loaded(Vec::new());
        if !is_root {
            node.expanded = false;
        }
        Ok(removed)
    }

    /// Destroys all children and marks the node as unloaded again.
    pub fn reset_lazy(&mut self, id: NodeId) -> Result<usize, TreeError> {
        if id == self.root {
            return Err(TreeError::RootNode);
        }
        let removed = self.drop_children(id)?;
        let node = self.node_mut(id)?;
        node.children = Children::Unloaded;
        node.expanded = false;
        node.status = NodeStatus::Ok;
        Ok(removed)
    }

    /// Moves a node (with its subtree) relative to `target`. The registry is untouched.
    pub fn move_to(&mut self, id: NodeId, target: NodeId, mode: AddMode) -> Result<(), TreeError> {
        if id == self.root {
            return Err(TreeError::RootNode);
        }
        self.node(id)?;
        self.node(target)?;
        if target == id || self.is_descendant_of(target, id) {
            return Err(TreeError::InvalidMove { node: id, target });
        }
        if target == self.root && matches!(mode, AddMode::Before | AddMode::After) {
            return Err(TreeError::RootNode);
        }
        // Position is resolved after detaching so sibling indices are current.
        self.detach(id)?;
        let (parent, index) = self.insert_position(target, mode)?;
        self.attach(id, parent, index)
    }

    /// Expands or collapses a node.
    ///
    /// Expanding an unloaded lazy node switches it to [`NodeStatus::Loading`] and reports
    /// [`ExpandOutcome::NeedsLoad`]; it is expanded once [`Tree::finish_load`] supplies children.
    pub fn set_expanded(&mut self, id: NodeId, flag: bool) -> Result<ExpandOutcome, TreeError> {
        if id == self.root {
            return Err(TreeError::RootNode);
        }
        let node = self.node_mut(id)?;
        if !flag {
            if !node.expanded {
                return Ok(ExpandOutcome::Unchanged);
            }
            node.expanded = false;
            return Ok(ExpandOutcome::Changed);
        }
        if node.children.is_unloaded() {
            if node.status == NodeStatus::Loading {
                return Ok(ExpandOutcome::Unchanged);
            }
            node.status = NodeStatus::Loading;
            return Ok(ExpandOutcome::NeedsLoad);
        }
        if node.expanded || !node.has_children() {
            return Ok(ExpandOutcome::Unchanged);
        }
        node.expanded = true;
        Ok(ExpandOutcome::Changed)
    }

    /// Toggles the expansion state of a node.
    pub fn toggle_expanded(&mut self, id: NodeId) -> Result<ExpandOutcome, TreeError> {
        let expanded = self.node(id)?.expanded;
        self.set_expanded(id, !expanded)
    }

    /// Expands or collapses every loaded node.
    ///
    /// Unloaded lazy nodes are not touched; their ids are returned so the caller can
    /// decide whether to load them.
    pub fn expand_all(&mut self, flag: bool) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(self.count());
        let _ = self.visit(self.root, false, |id, _| {
            ids.push(id);
            VisitAction::Continue
        });
        let mut unloaded = Vec::new();
        for id in ids {
            let Ok(node) = self.node_mut(id) else {
                continue;
            };
            if flag {
                if node.children.is_unloaded() {
                    unloaded.push(id);
                } else if node.has_children() {
                    node.expanded = true;
                }
            } else {
                node.expanded = false;
            }
        }
        unloaded
    }

    /// Supplies the children of an unloaded lazy node.
    ///
    /// If the node was waiting for the load after an expand request it ends up expanded.
    pub fn finish_load(&mut self, id: NodeId, batch: &[NodeData]) -> Result<Vec<NodeId>, TreeError> {
        let node = self.node(id)?;
        if !node.children.is_unloaded() {
            return Err(TreeError::NotLazy(id));
        }
        let expand = node.status == NodeStatus::Loading;
        let batch_keys = match self.validate_batch(batch) {
            Ok(keys) => keys,
            Err(err) => {
                self.node_mut(id)?.status = NodeStatus::Error(err.to_string());
                return Err(err);
            }
        };
        {
            let node = self.node_mut(id)?;
            node.children = Children::Loaded(Vec::with_capacity(batch.len()));
            node.status = NodeStatus::Ok;
        }
        let mut added = Vec::with_capacity(batch.len());
        for (index, data) in batch.iter().enumerate() {
            added.push(self.insert_subtree(id, index, data, &batch_keys)?);
        }
        let node = self.node_mut(id)?;
        node.expanded = expand && node.has_children();
        Ok(added)
    }

    /// Records a failed lazy load; the node stays unloaded and collapsed so it can be retried.
    pub fn fail_load(&mut self, id: NodeId, message: impl Into<String>) -> Result<(), TreeError> {
        let node = self.node_mut(id)?;
        if !node.children.is_unloaded() {
            return Err(TreeError::NotLazy(id));
        }
        node.expanded = false;
        node.status = NodeStatus::Error(message.into());
        Ok(())
    }

    /// Sets the selection flag; returns whether it changed.
    pub fn set_selected(&mut self, id: NodeId, flag: bool) -> Result<bool, TreeError> {
        if id == self.root {
            return Err(TreeError::RootNode);
        }
        let node = self.node_mut(id)?;
        let changed = node.selected != flag;
        node.selected = flag;
        Ok(changed)
    }

    /// Sets the selection flag on every node.
    pub fn select_all(&mut self, flag: bool) {
        for slot in self.slots.iter_mut().skip(1) {
            if let Some(node) = slot.node.as_mut() {
                node.selected = flag;
            }
        }
    }

    /// Changes a node's key and/or ref key, keeping the registry consistent.
    ///
    /// `None` keeps the current key; for the ref key `None` removes it. On a key
    /// collision nothing changes.
    pub fn set_key(
        &mut self,
        id: NodeId,
        key: Option<String>,
        ref_key: Option<String>,
    ) -> Result<(), TreeError> {
        if id == self.root {
            return Err(TreeError::RootNode);
        }
        let node = self.node(id)?;
        let old_key = node.key.clone();
        let old_ref = node.ref_key.clone();
        let new_key = key.unwrap_or_else(|| old_key.clone());

        self.registry
            .unregister(id, &old_key, old_ref.as_deref());
        if let Err(err) = self
            .registry
            .register(id, &new_key, ref_key.as_deref())
        {
            self.registry
                .register(id, &old_key, old_ref.as_deref())?;
            return Err(err);
        }
        let node = self.node_mut(id)?;
        node.key = new_key;
        node.ref_key = ref_key;
        Ok(())
    }

    /// Removes every node; all keys are unregistered.
    pub fn clear(&mut self) {
        let top: Vec<NodeId> = self.top_nodes().to_vec();
        for id in top {
            self.destroy_subtree(id);
        }
        if let Ok(root) = self.node_mut(self.root) {
            root.children = Children::Loaded(Vec::new());
            root.sub_match_count = 0;
        }
        self.filter = None;
        debug_assert!(self.registry.is_empty());
        self.registry.clear();
    }

    pub(crate) fn node_mut_unchecked(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.tree != self.id {
            return None;
        }
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn next_key(&mut self, reserved: &FxHashSet<String>) -> String {
        loop {
            self.key_sequence += 1;
            let key = format!("_{}", self.key_sequence);
            if !self.registry.contains_key(&key) && !reserved.contains(&key) {
                return key;
            }
        }
    }

    /// Checks all explicit keys of a batch (recursively) for collisions.
    fn validate_batch(&self, batch: &[NodeData]) -> Result<FxHashSet<String>, TreeError> {
        let mut keys = FxHashSet::with_capacity_and_hasher(batch.len(), FxBuildHasher);
        let mut stack: Vec<&NodeData> = batch.iter().collect();
        while let Some(data) = stack.pop() {
            if let Some(key) = &data.key
                && (self.registry.contains_key(key) || !keys.insert(key.clone()))
            {
                return Err(TreeError::duplicate_key(key.as_str()));
            }
            stack.extend(data.children.iter());
        }
        Ok(keys)
    }

    fn insert_position(&self, target: NodeId, mode: AddMode) -> Result<(NodeId, usize), TreeError> {
        let node = self.node(target)?;
        match mode {
            AddMode::AppendChild => Ok((target, node.child_ids().len())),
            AddMode::PrependChild => Ok((target, 0)),
            AddMode::Before | AddMode::After => {
                let parent = node.parent.ok_or(TreeError::RootNode)?;
                let index = self
                    .children(parent)
                    .iter()
                    .position(|id| *id == target)
                    .ok_or(TreeError::NotAChild {
                        node: target,
                        parent,
                    })?;
                Ok((parent, if mode == AddMode::After { index + 1 } else { index }))
            }
        }
    }

    fn insert_subtree(
        &mut self,
        parent: NodeId,
        index: usize,
        data: &NodeData,
        reserved: &FxHashSet<String>,
    ) -> Result<NodeId, TreeError> {
        let key = match &data.key {
            Some(key) => key.clone(),
            None => self.next_key(reserved),
        };
        let node = Node::from_data(key, data, parent);
        let id = self.alloc(node);
        {
            let node = self.node(id)?;
            let (key, ref_key) = (node.key.clone(), node.ref_key.clone());
            if let Err(err) = self.registry.register(id, &key, ref_key.as_deref()) {
                self.release(id);
                return Err(err);
            }
        }
        self.children_mut(parent)?.insert(index, id);
        for (child_index, child) in data.children.iter().enumerate() {
            self.insert_subtree(id, child_index, child, reserved)?;
        }
        Ok(id)
    }

    fn children_mut(&mut self, id: NodeId) -> Result<&mut Vec<NodeId>, TreeError> {
        let node = self.node_mut(id)?;
        if node.children.is_unloaded() {
            node.children = Children::Loaded(Vec::new());
            node.status = NodeStatus::Ok;
        }
        match &mut node.children {
            Children::Loaded(children) => Ok(children),
            Children::Unloaded => Err(TreeError::NotLazy(id)),
        }
    }

    /// Unlinks a node from its parent, keeping filter counts on the old ancestors right.
    fn detach(&mut self, id: NodeId) -> Result<(), TreeError> {
        let parent = self.node(id)?.parent.ok_or(TreeError::RootNode)?;
        let matches = self.subtree_matches(id);
        let siblings = self.children_mut(parent)?;
        let index = siblings
            .iter()
            .position(|child| *child == id)
            .ok_or(TreeError::NotAChild { node: id, parent })?;
        siblings.remove(index);
        self.adjust_sub_matches(parent, matches, false);
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    fn attach(&mut self, id: NodeId, parent: NodeId, index: usize) -> Result<(), TreeError> {
        let siblings = self.children_mut(parent)?;
        let index = index.min(siblings.len());
        siblings.insert(index, id);
        self.node_mut(id)?.parent = Some(parent);
        let matches = self.subtree_matches(id);
        self.adjust_sub_matches(parent, matches, true);
        Ok(())
    }

    fn subtree_matches(&self, id: NodeId) -> usize {
        if self.filter.is_none() {
            return 0;
        }
        let mut count = 0;
        let _ = self.visit(id, true, |_, node| {
            count += usize::from(node.is_match);
            VisitAction::Continue
        });
        count
    }

    fn adjust_sub_matches(&mut self, from: NodeId, count: usize, add: bool) {
        if count == 0 {
            return;
        }
        let mut current = Some(from);
        while let Some(id) = current {
            let Some(node) = self.node_mut_unchecked(id) else {
                break;
            };
            node.sub_match_count = if add {
                node.sub_match_count + count
            } else {
                node.sub_match_count.saturating_sub(count)
            };
            current = node.parent;
        }
    }

    fn drop_children(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let children: Vec<NodeId> = self.node(id)?.child_ids().to_vec();
        let matches: usize = children.iter().map(|child| self.subtree_matches(*child)).sum();
        self.adjust_sub_matches(id, matches, false);
        Ok(children
            .into_iter()
            .map(|child| self.destroy_subtree(child))
            .sum())
    }

    /// Destroys a detached subtree, descendants before their ancestors.
    fn destroy_subtree(&mut self, id: NodeId) -> usize {
        let mut order = Vec::new();
        let _ = self.visit(id, true, |child, _| {
            order.push(child);
            VisitAction::Continue
        });
        for child in order.iter().rev() {
            if let Some(node) = self.get(*child) {
                let (key, ref_key) = (node.key.clone(), node.ref_key.clone());
                self.registry
                    .unregister(*child, &key, ref_key.as_deref());
            }
            self.release(*child);
        }
        order.len()
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::new(self.id, index, slot.generation);
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(self.id, index, 0)
    }

    fn release(&mut self, id: NodeId) {
        if id.tree == self.id
            && let Some(slot) = self.slots.get_mut(id.index as usize)
            && slot.generation == id.generation
            && slot.node.take().is_some()
        {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Tree with an identity of its own.
    pub(crate) fn new_tree() -> Tree {
        Tree::new(&mut TreeRegistry::new())
    }

    /// a(b, c(d)), e, f(lazy)
    pub(crate) fn sample_tree() -> Tree {
        let mut tree = new_tree();
        let root = tree.root();
        tree.add_children(
            root,
            &[
                NodeData::new("A").key("a").children([
                    NodeData::new("B").key("b"),
                    NodeData::new("C")
                        .key("c")
                        .children([NodeData::new("D").key("d")]),
                ]),
                NodeData::new("E").key("e"),
                NodeData::new("F").key("f").lazy(),
            ],
        )
        .unwrap();
        tree
    }

    pub(crate) fn key(tree: &Tree, key: &str) -> NodeId {
        tree.find_key(key).unwrap()
    }

    fn keys(tree: &Tree, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| tree.node(*id).unwrap().key().to_string())
            .collect()
    }

    #[test]
    fn builds_and_registers_nested_data() {
        let tree = sample_tree();

        assert_eq!(tree.count(), 6);
        assert_eq!(keys(&tree, tree.top_nodes()), ["a", "e", "f"]);
        assert_eq!(tree.level(key(&tree, "d")).unwrap(), 2);
        tree.check().unwrap();
    }

    #[test]
    fn duplicate_key_in_batch_leaves_tree_unchanged() {
        let mut tree = sample_tree();
        let root = tree.root();

        let err = tree
            .add_children(root, &[NodeData::new("X").key("x"), NodeData::new("B").key("b")])
            .unwrap_err();

        assert_eq!(err, TreeError::duplicate_key("b"));
        assert_eq!(tree.count(), 6);
        assert!(tree.find_key("x").is_none());
        tree.check().unwrap();
    }

    #[test]
    fn generated_keys_use_tree_sequence() {
        let mut tree = new_tree();
        let root = tree.root();
        let ids = tree
            .add_children(root, &[NodeData::new("one"), NodeData::new("two")])
            .unwrap();

        assert_eq!(keys(&tree, &ids), ["_1", "_2"]);
    }

    #[test]
    fn remove_cascades_and_unregisters() {
        let mut tree = sample_tree();
        let a = key(&tree, "a");
        let d = key(&tree, "d");

        assert_eq!(tree.remove(a).unwrap(), 4);

        assert_eq!(tree.count(), 2);
        assert!(tree.find_key("d").is_none());
        assert!(tree.get(d).is_none());
        assert_eq!(tree.node(a).unwrap_err(), TreeError::UnknownNode(a));
        tree.check().unwrap();
    }

    #[test]
    fn stale_id_is_rejected_after_slot_reuse() {
        let mut tree = sample_tree();
        let e = key(&tree, "e");
        tree.remove(e).unwrap();
        let root = tree.root();
        let new_id = tree
            .add_node(root, NodeData::new("G").key("g"), AddMode::AppendChild)
            .unwrap();

        assert_eq!(new_id.index, e.index);
        assert!(tree.get(e).is_none());
    }

    #[test]
    fn ref_key_entry_dropped_with_last_clone() {
        let mut tree = new_tree();
        let root = tree.root();
        let ids = tree
            .add_children(
                root,
                &[
                    NodeData::new("x1").ref_key("x"),
                    NodeData::new("x2").ref_key("x"),
                ],
            )
            .unwrap();

        assert_eq!(tree.clones(ids[0]).unwrap(), vec![ids[1]]);
        tree.remove(ids[0]).unwrap();
        assert_eq!(tree.find_ref("x"), vec![ids[1]]);
        tree.remove(ids[1]).unwrap();
        assert!(!tree.registry().has_ref_key("x"));
    }

    #[test]
    fn add_before_and_after_sibling() {
        let mut tree = sample_tree();
        let e = key(&tree, "e");
        tree.add_node(e, NodeData::new("X").key("x"), AddMode::Before)
            .unwrap();
        tree.add_node(e, NodeData::new("Y").key("y"), AddMode::After)
            .unwrap();

        assert_eq!(keys(&tree, tree.top_nodes()), ["a", "x", "e", "y", "f"]);
    }

    #[test]
    fn move_into_own_subtree_is_rejected() {
        let mut tree = sample_tree();
        let a = key(&tree, "a");
        let d = key(&tree, "d");

        assert_eq!(
            tree.move_to(a, d, AddMode::AppendChild),
            Err(TreeError::InvalidMove { node: a, target: d })
        );
        assert_eq!(keys(&tree, tree.top_nodes()), ["a", "e", "f"]);
    }

    #[test]
    fn move_keeps_registry_and_reorders() {
        let mut tree = sample_tree();
        let d = key(&tree, "d");
        let a = key(&tree, "a");
        tree.move_to(d, a, AddMode::Before).unwrap();

        assert_eq!(keys(&tree, tree.top_nodes()), ["d", "a", "e", "f"]);
        assert_eq!(tree.parent(d), Some(tree.root()));
        tree.check().unwrap();
    }

    #[test]
    fn lazy_expand_requests_load_then_expands() {
        let mut tree = sample_tree();
        let f = key(&tree, "f");

        assert_eq!(tree.set_expanded(f, true).unwrap(), ExpandOutcome::NeedsLoad);
        assert_eq!(tree.set_expanded(f, true).unwrap(), ExpandOutcome::Unchanged);
        assert!(!tree.node(f).unwrap().is_expanded());

        tree.finish_load(f, &[NodeData::new("F1")]).unwrap();

        let node = tree.node(f).unwrap();
        assert!(node.is_expanded());
        assert_eq!(node.child_ids().len(), 1);
        assert_eq!(node.status(), &NodeStatus::Ok);
    }

    #[test]
    fn failed_load_can_be_retried() {
        let mut tree = sample_tree();
        let f = key(&tree, "f");
        tree.set_expanded(f, true).unwrap();
        tree.fail_load(f, "timeout").unwrap();

        let node = tree.node(f).unwrap();
        assert!(node.is_lazy_unloaded());
        assert!(!node.is_expanded());
        assert_eq!(node.status(), &NodeStatus::Error("timeout".into()));
        assert_eq!(tree.set_expanded(f, true).unwrap(), ExpandOutcome::NeedsLoad);
    }

    #[test]
    fn finish_load_on_loaded_node_fails() {
        let mut tree = sample_tree();
        let a = key(&tree, "a");

        assert_eq!(tree.finish_load(a, &[]), Err(TreeError::NotLazy(a)));
    }

    #[test]
    fn set_key_collision_rolls_back() {
        let mut tree = sample_tree();
        let b = key(&tree, "b");

        assert!(tree.set_key(b, Some("e".into()), None).is_err());
        assert_eq!(tree.find_key("b"), Some(b));

        tree.set_key(b, Some("bb".into()), Some("r".into())).unwrap();
        assert_eq!(tree.find_key("bb"), Some(b));
        assert!(tree.find_key("b").is_none());
        assert_eq!(tree.find_ref("r"), vec![b]);
    }

    #[test]
    fn expand_all_reports_unloaded_nodes() {
        let mut tree = sample_tree();

        let unloaded = tree.expand_all(true);

        assert_eq!(unloaded, vec![key(&tree, "f")]);
        assert!(tree.node(key(&tree, "c")).unwrap().is_expanded());
        assert!(!tree.node(key(&tree, "e")).unwrap().is_expanded());
    }

    #[test]
    fn clear_unregisters_everything() {
        let mut tree = sample_tree();
        tree.clear();

        assert!(tree.is_empty());
        assert!(tree.top_nodes().is_empty());
        tree.check().unwrap();
    }

    #[test]
    fn visit_skip_prunes_subtree() {
        let tree = sample_tree();
        let mut seen = Vec::new();
        tree.visit(tree.root(), false, |_, node| {
            seen.push(node.key().to_string());
            if node.key() == "a" {
                VisitAction::Skip
            } else {
                VisitAction::Continue
            }
        })
        .unwrap();

        assert_eq!(seen, ["a", "e", "f"]);
    }

    #[test]
    fn find_first_returns_earliest_match_in_pre_order() {
        let tree = sample_tree();

        let found = tree.find_first(&|node: &Node| matches!(node.key(), "e" | "d"));
        assert_eq!(found, Some(key(&tree, "d")));
        assert_eq!(tree.find_first(&|node: &Node| node.key() == "missing"), None);
    }

    #[test]
    fn remove_children_collapses_node_but_not_root() {
        let mut tree = sample_tree();
        let a = key(&tree, "a");
        tree.set_expanded(a, true).unwrap();

        assert_eq!(tree.remove_children(a).unwrap(), 3);
        assert!(!tree.node(a).unwrap().expanded);
        assert!(tree.children(a).is_empty());
        assert_eq!(tree.find_key("d"), None);

        let root = tree.root();
        assert_eq!(tree.remove_children(root).unwrap(), 3);
        assert!(tree.node(root).unwrap().expanded);
        assert!(tree.is_empty());
        tree.check().unwrap();
    }
}
