use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::TreeError;
use crate::node::{NodeId, TreeId};
use crate::tree::Tree;

/// Key bookkeeping for a tree: unique keys and shared reference keys.
///
/// Mutated only as a side effect of tree mutations; every attached node is registered
/// exactly once and unregistered exactly once when it is destroyed.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    keys: FxHashMap<String, NodeId>,
    // Clones sharing a ref key; an entry exists only while its set is non-empty.
    ref_keys: FxHashMap<String, FxHashSet<NodeId>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node under `key` and, if given, to the set of `ref_key`.
    ///
    /// Fails without modifying anything if `key` is already taken.
    pub fn register(
        &mut self,
        id: NodeId,
        key: &str,
        ref_key: Option<&str>,
    ) -> Result<(), TreeError> {
        if self.keys.contains_key(key) {
            return Err(TreeError::duplicate_key(key));
        }
        self.keys.insert(key.to_owned(), id);
        if let Some(ref_key) = ref_key {
            self.ref_keys
                .entry(ref_key.to_owned())
                .or_default()
                .insert(id);
        }
        Ok(())
    }

    /// Removes a node from both maps, dropping the ref key entry once it is empty.
    pub fn unregister(&mut self, id: NodeId, key: &str, ref_key: Option<&str>) {
        if self.keys.get(key) == Some(&id) {
            self.keys.remove(key);
        }
        if let Some(ref_key) = ref_key
            && let Some(clones) = self.ref_keys.get_mut(ref_key)
            && clones.remove(&id)
            && clones.is_empty()
        {
            self.ref_keys.remove(ref_key);
        }
    }

    /// Returns the node registered under `key`.
    pub fn get(&self, key: &str) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Returns all nodes sharing `ref_key` (in no particular order).
    pub fn ref_nodes(&self, ref_key: &str) -> impl Iterator<Item = NodeId> + '_ {
        self.ref_keys
            .get(ref_key)
            .into_iter()
            .flat_map(|clones| clones.iter().copied())
    }

    /// Returns the number of nodes sharing `ref_key`.
    pub fn ref_count(&self, ref_key: &str) -> usize {
        self.ref_keys.get(ref_key).map_or(0, FxHashSet::len)
    }

    pub fn has_ref_key(&self, ref_key: &str) -> bool {
        self.ref_keys.contains_key(ref_key)
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.keys.clear();
        self.ref_keys.clear();
    }
}

/// Hands out tree identities and tracks which trees are alive.
///
/// One registry is shared by every tree whose node handles may meet, so a handle
/// from one tree is never accepted by another.
#[derive(Debug, Default)]
pub struct TreeRegistry {
    next: u32,
    live: FxHashSet<TreeId>,
}

impl TreeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the identity of a new tree.
    pub(crate) fn create(&mut self) -> TreeId {
        self.next += 1;
        let id = TreeId(self.next);
        self.live.insert(id);
        log::trace!("tree {id:?} created");
        id
    }

    /// Tears a tree down and retires its identity.
    pub fn destroy(&mut self, tree: Tree) -> bool {
        let id = tree.id();
        drop(tree);
        log::trace!("tree {id:?} destroyed");
        self.live.remove(&id)
    }

    pub fn is_live(&self, id: TreeId) -> bool {
        self.live.contains(&id)
    }

    /// Number of live trees.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn id(index: u32) -> NodeId {
        NodeId::new(TreeId(1), index, 0)
    }

    #[test]
    fn duplicate_key_leaves_registry_unchanged() {
        let mut registry = NodeRegistry::new();
        registry.register(id(1), "a", Some("r")).unwrap();

        let err = registry.register(id(2), "a", Some("r")).unwrap_err();

        assert_eq!(err, TreeError::duplicate_key("a"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a"), Some(id(1)));
        assert_eq!(registry.ref_count("r"), 1);
    }

    #[test]
    fn first_ref_key_member_is_tracked() {
        let mut registry = NodeRegistry::new();
        registry.register(id(1), "a", Some("r")).unwrap();

        assert_eq!(registry.ref_nodes("r").collect::<Vec<_>>(), vec![id(1)]);
    }

    #[test]
    fn unregister_last_clone_drops_ref_entry() {
        let mut registry = NodeRegistry::new();
        registry.register(id(1), "a", Some("r")).unwrap();
        registry.register(id(2), "b", Some("r")).unwrap();

        registry.unregister(id(1), "a", Some("r"));
        assert!(registry.has_ref_key("r"));
        assert_eq!(registry.ref_count("r"), 1);

        registry.unregister(id(2), "b", Some("r"));
        assert!(!registry.has_ref_key("r"));
        assert!(registry.is_empty());
    }

    #[test]
    fn tree_ids_are_unique_and_retired() {
        let mut trees = TreeRegistry::new();
        let first = Tree::new(&mut trees);
        let second = Tree::new(&mut trees);
        let first_id = first.id();

        assert_ne!(first_id, second.id());
        assert_eq!(trees.len(), 2);

        assert!(trees.destroy(first));
        assert!(!trees.is_live(first_id));
        assert!(trees.is_live(second.id()));
        assert_eq!(trees.len(), 1);
    }
}
