//! Lazily fetched tree index over taxonomy items.
//!
//! # Responsibility
//! - Mirror the store as Root plus nested category children for display.
//! - Apply move outcomes without re-reading the whole tree.
//!
//! # Invariants
//! - Root children are fetched on load; category children only on first
//!   `expand`. `None` children means "never fetched", not "empty".
//! - Fetched children lists stay sorted by `order::compare_items`.
//! - A node's `parent` is a plain id link; the parent's children list is the
//!   only thing that lists the node.

use crate::model::taxonomy::{CategoryId, ItemRef, Parent, TaxonomyItem};
use crate::repo::taxonomy_repo::{RecordStore, StoreError};
use crate::service::reparent::MoveOutcome;
use crate::tree::order::compare_items;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from tree index navigation.
#[derive(Debug)]
pub enum TreeIndexError {
    /// Item has never been loaded into the index.
    UnknownNode(ItemRef),
    /// Fetching children from the store failed.
    Store(StoreError),
}

impl Display for TreeIndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNode(item) => write!(f, "tree node not loaded: {item}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TreeIndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::UnknownNode(_) => None,
        }
    }
}

impl From<StoreError> for TreeIndexError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// One displayed tag or category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    item: TaxonomyItem,
    parent: Parent,
    children: Option<Vec<ItemRef>>,
    expanded: bool,
}

impl TreeNode {
    fn new(item: TaxonomyItem, parent: Parent) -> Self {
        Self {
            item,
            parent,
            children: None,
            expanded: false,
        }
    }

    /// Latest persisted snapshot seen for this node.
    pub fn item(&self) -> &TaxonomyItem {
        &self.item
    }

    pub fn parent(&self) -> Parent {
        self.parent
    }

    /// Fetched children, `None` until the category is first expanded.
    pub fn fetched_children(&self) -> Option<&[ItemRef]> {
        self.children.as_deref()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }
}

/// Display tree: Root children plus every node fetched so far.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    root_children: Vec<ItemRef>,
    nodes: HashMap<ItemRef, TreeNode>,
}

impl TreeIndex {
    /// Builds an index holding Root's children only.
    pub fn load<S: RecordStore>(store: &S) -> Result<Self, TreeIndexError> {
        let mut index = Self::default();
        for item in store.list_root_items()? {
            let key = index.upsert_node(item, Parent::Root);
            index.root_children.push(key);
        }
        index.sort_children(Parent::Root);
        Ok(index)
    }

    pub fn node(&self, item: ItemRef) -> Option<&TreeNode> {
        self.nodes.get(&item)
    }

    /// Fetched children of `parent`; Root is always fetched.
    pub fn children(&self, parent: Parent) -> Option<&[ItemRef]> {
        match parent {
            Parent::Root => Some(self.root_children.as_slice()),
            Parent::Category(id) => self
                .nodes
                .get(&ItemRef::Category(id))
                .and_then(TreeNode::fetched_children),
        }
    }

    /// Child categories already fetched under `id`.
    pub fn loaded_child_categories(&self, id: CategoryId) -> Vec<CategoryId> {
        self.children(Parent::Category(id))
            .unwrap_or_default()
            .iter()
            .filter_map(|child| match child {
                ItemRef::Category(child_id) => Some(*child_id),
                ItemRef::Tag(_) => None,
            })
            .collect()
    }

    /// Categories currently marked expanded.
    pub fn expanded_categories(&self) -> BTreeSet<CategoryId> {
        self.nodes
            .values()
            .filter(|node| node.expanded)
            .filter_map(|node| node.item.as_category().map(|category| category.id))
            .collect()
    }

    /// Fetches children of `id` on first use and marks it expanded.
    pub fn expand<S: RecordStore>(
        &mut self,
        store: &S,
        id: CategoryId,
    ) -> Result<(), TreeIndexError> {
        let key = ItemRef::Category(id);
        let fetched = self
            .nodes
            .get(&key)
            .ok_or(TreeIndexError::UnknownNode(key))?
            .children
            .is_some();

        if !fetched {
            let mut keys = Vec::new();
            for child in store.list_children(id)? {
                keys.push(self.upsert_node(child, Parent::Category(id)));
            }
            if let Some(node) = self.nodes.get_mut(&key) {
                node.children = Some(keys);
            }
            self.sort_children(Parent::Category(id));
        }

        if let Some(node) = self.nodes.get_mut(&key) {
            node.expanded = true;
        }
        Ok(())
    }

    /// Hides children of `id`; fetched children are kept.
    pub fn collapse(&mut self, id: CategoryId) -> bool {
        match self.nodes.get_mut(&ItemRef::Category(id)) {
            Some(node) => {
                node.expanded = false;
                true
            }
            None => false,
        }
    }

    /// Adds `item` under `parent`.
    ///
    /// Returns `false` when the parent's children were never fetched; the node
    /// is still recorded with its new parent and shows up on next expansion.
    pub fn attach(&mut self, parent: Parent, item: TaxonomyItem) -> bool {
        let key = self.upsert_node(item, parent);
        let Some(children) = self.children_mut(parent) else {
            return false;
        };
        if !children.contains(&key) {
            children.push(key);
        }
        self.sort_children(parent);
        true
    }

    /// Removes `item` from `parent`'s fetched children.
    pub fn detach(&mut self, parent: Parent, item: ItemRef) -> bool {
        match self.children_mut(parent) {
            Some(children) => {
                let before = children.len();
                children.retain(|child| *child != item);
                before != children.len()
            }
            None => false,
        }
    }

    /// Expands every ancestor of `item` from the top down.
    ///
    /// Returns the ancestor chain, outermost first. Calling it again changes
    /// nothing further.
    pub fn reveal<S: RecordStore>(
        &mut self,
        store: &S,
        item: ItemRef,
    ) -> Result<Vec<CategoryId>, TreeIndexError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self
            .nodes
            .get(&item)
            .ok_or(TreeIndexError::UnknownNode(item))?
            .parent;
        while let Parent::Category(id) = cursor {
            if !seen.insert(id) {
                break;
            }
            chain.push(id);
            let key = ItemRef::Category(id);
            cursor = self
                .nodes
                .get(&key)
                .ok_or(TreeIndexError::UnknownNode(key))?
                .parent;
        }
        chain.reverse();

        for id in &chain {
            self.expand(store, *id)?;
        }
        Ok(chain)
    }

    /// Swaps in a newer snapshot and re-sorts its siblings.
    pub fn replace_snapshot(&mut self, item: TaxonomyItem) -> bool {
        let key = item.item_ref();
        let Some(node) = self.nodes.get_mut(&key) else {
            return false;
        };
        node.item = item;
        let parent = node.parent;
        self.sort_children(parent);
        true
    }

    /// Mirrors a completed move: detach, refresh both parents, attach.
    pub fn apply_move(&mut self, outcome: &MoveOutcome) {
        self.detach(outcome.from, outcome.item.item_ref());
        if let Some(old_parent) = &outcome.old_parent {
            self.replace_snapshot(TaxonomyItem::Category(old_parent.clone()));
        }
        if let Some(new_parent) = &outcome.new_parent {
            self.replace_snapshot(TaxonomyItem::Category(new_parent.clone()));
        }
        self.attach(outcome.to, outcome.item.clone());
    }

    fn upsert_node(&mut self, item: TaxonomyItem, parent: Parent) -> ItemRef {
        let key = item.item_ref();
        match self.nodes.get_mut(&key) {
            Some(node) => {
                node.item = item;
                node.parent = parent;
            }
            None => {
                self.nodes.insert(key, TreeNode::new(item, parent));
            }
        }
        key
    }

    fn children_mut(&mut self, parent: Parent) -> Option<&mut Vec<ItemRef>> {
        match parent {
            Parent::Root => Some(&mut self.root_children),
            Parent::Category(id) => self
                .nodes
                .get_mut(&ItemRef::Category(id))
                .and_then(|node| node.children.as_mut()),
        }
    }

    fn sort_children(&mut self, parent: Parent) {
        let Some(children) = self.children_mut(parent) else {
            return;
        };
        let mut keys = std::mem::take(children);
        let nodes = &self.nodes;
        keys.sort_by(|left, right| match (nodes.get(left), nodes.get(right)) {
            (Some(left_node), Some(right_node)) => compare_items(&left_node.item, &right_node.item),
            _ => left.cmp(right),
        });
        if let Some(children) = self.children_mut(parent) {
            *children = keys;
        }
    }
}
