//! Descendant checks that keep the child-category relation acyclic.
//!
//! Both walks are iterative with an explicit stack and a visited set, so deep
//! or (corrupted) cyclic data cannot overflow or loop.

use crate::model::taxonomy::CategoryId;
use crate::repo::taxonomy_repo::{RecordStore, StoreResult};
use crate::tree::index::TreeIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which subtree a descendant check walks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleCheckScope {
    /// Walk the store's child-category relation. Never misses a descendant.
    #[default]
    FullSubtree,
    /// Walk only children already fetched into the tree index. Descendants
    /// under never-expanded categories are invisible to this walk.
    LoadedOnly,
}

impl CycleCheckScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullSubtree => "full_subtree",
            Self::LoadedOnly => "loaded_only",
        }
    }
}

/// Returns whether `target` is a strict descendant of `ancestor` within the
/// fetched part of the tree index.
pub fn is_descendant_loaded(index: &TreeIndex, ancestor: CategoryId, target: CategoryId) -> bool {
    walk(ancestor, target, |id| Ok::<_, ()>(index.loaded_child_categories(id))).unwrap_or(false)
}

/// Returns whether `target` is a strict descendant of `ancestor` in the store.
pub fn is_descendant_stored<S: RecordStore>(
    store: &S,
    ancestor: CategoryId,
    target: CategoryId,
) -> StoreResult<bool> {
    walk(ancestor, target, |id| store.child_category_ids(id))
}

/// Dispatches to the walk selected by `scope`.
pub fn is_descendant<S: RecordStore>(
    scope: CycleCheckScope,
    index: &TreeIndex,
    store: &S,
    ancestor: CategoryId,
    target: CategoryId,
) -> StoreResult<bool> {
    match scope {
        CycleCheckScope::FullSubtree => is_descendant_stored(store, ancestor, target),
        CycleCheckScope::LoadedOnly => Ok(is_descendant_loaded(index, ancestor, target)),
    }
}

fn walk<E, F>(ancestor: CategoryId, target: CategoryId, mut children: F) -> Result<bool, E>
where
    F: FnMut(CategoryId) -> Result<Vec<CategoryId>, E>,
{
    let mut visited = HashSet::from([ancestor]);
    let mut stack = children(ancestor)?;
    while let Some(current) = stack.pop() {
        if current == target {
            return Ok(true);
        }
        if !visited.insert(current) {
            continue;
        }
        stack.extend(children(current)?);
    }
    Ok(false)
}
