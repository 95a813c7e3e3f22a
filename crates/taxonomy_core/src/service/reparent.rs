//! Reparent engine: validates and executes tag/category moves.
//!
//! # Responsibility
//! - Reject drops that would put a category under itself, onto a tag, or
//!   nowhere new, before touching the store.
//! - Detach from the old parent and attach to the new one against freshly
//!   fetched canonical copies, inside one store transaction.
//! - Refuse to move an item whose stored parent no longer matches the tree
//!   index it was dragged from.
//!
//! # Invariants
//! - No cached snapshot is ever mutated; each membership change starts from
//!   `find_*` and hands ownership to `save_*`.
//! - A failed move leaves both parents and the item exactly as before.
//! - Both parents' counters equal their child set sizes after a move.
//! - Validation reads and move writes share one transaction.

use crate::model::taxonomy::{Category, CategoryId, DropTarget, ItemRef, Parent, TagId, TaxonomyItem};
use crate::repo::taxonomy_repo::{RecordStore, StoreError, StoreResult};
use crate::tree::guard::{is_descendant, CycleCheckScope};
use crate::tree::index::TreeIndex;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Why a proposed move was refused. Refusals are normal outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Dropped onto itself.
    SelfDrop,
    /// Category dropped onto a tag; tags hold no children.
    CategoryOntoTag,
    /// Tag dropped onto a tag; tags hold no children.
    TagOntoTag,
    /// Target category lies inside the dragged category's subtree.
    CycleWouldForm,
    /// Target is the item's current parent.
    UnchangedParent,
    /// Drop does not belong to the active drag session.
    ForeignSession,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelfDrop => "self_drop",
            Self::CategoryOntoTag => "category_onto_tag",
            Self::TagOntoTag => "tag_onto_tag",
            Self::CycleWouldForm => "cycle_would_form",
            Self::UnchangedParent => "unchanged_parent",
            Self::ForeignSession => "foreign_session",
        }
    }
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refreshed records produced by one completed move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Moved item as persisted, memberships included.
    pub item: TaxonomyItem,
    pub from: Parent,
    pub to: Parent,
    /// Old parent after detachment; `None` when the item came from Root.
    pub old_parent: Option<Category>,
    /// New parent after attachment; `None` when the item went to Root.
    pub new_parent: Option<Category>,
}

/// Result of a move request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveDecision {
    Moved(MoveOutcome),
    Rejected(RejectReason),
}

impl MoveDecision {
    pub fn outcome(&self) -> Option<&MoveOutcome> {
        match self {
            Self::Moved(outcome) => Some(outcome),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            Self::Moved(_) => None,
            Self::Rejected(reason) => Some(*reason),
        }
    }
}

/// Errors that abort a move.
#[derive(Debug)]
pub enum ReparentError {
    /// Dragged item or target category is not loaded in the tree index.
    UnknownItem(ItemRef),
    /// Store no longer places `item` under `expected`; the index is stale.
    StaleParent { item: ItemRef, expected: Parent },
    /// Store failure; the move was rolled back.
    Store(StoreError),
}

impl Display for ReparentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownItem(item) => write!(f, "taxonomy item not loaded: {item}"),
            Self::StaleParent { item, expected } => {
                write!(f, "{item} is no longer stored under {expected}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReparentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::UnknownItem(_) | Self::StaleParent { .. } => None,
        }
    }
}

impl From<StoreError> for ReparentError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Validates and executes moves against a record store.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReparentEngine {
    cycle_check: CycleCheckScope,
}

impl ReparentEngine {
    pub fn new(cycle_check: CycleCheckScope) -> Self {
        Self { cycle_check }
    }

    pub fn cycle_check(&self) -> CycleCheckScope {
        self.cycle_check
    }

    /// Moves one tag under `target`.
    pub fn move_tag<S: RecordStore>(
        &self,
        store: &S,
        index: &TreeIndex,
        tag_id: TagId,
        target: DropTarget,
    ) -> Result<MoveDecision, ReparentError> {
        self.move_item(store, index, ItemRef::Tag(tag_id), target)
    }

    /// Moves one category (with its subtree) under `target`.
    pub fn move_category<S: RecordStore>(
        &self,
        store: &S,
        index: &TreeIndex,
        category_id: CategoryId,
        target: DropTarget,
    ) -> Result<MoveDecision, ReparentError> {
        self.move_item(store, index, ItemRef::Category(category_id), target)
    }

    /// Moves `item` from its current display parent to `target`.
    ///
    /// The item's current parent is read from `index` and re-checked against
    /// the store before anything is written. The target category must be
    /// loaded in `index`. The index itself is not modified; feed the outcome
    /// to `TreeIndex::apply_move`.
    pub fn move_item<S: RecordStore>(
        &self,
        store: &S,
        index: &TreeIndex,
        item: ItemRef,
        target: DropTarget,
    ) -> Result<MoveDecision, ReparentError> {
        let started_at = Instant::now();
        let from = current_parent(index, item)?;
        if let DropTarget::Category(id) = target {
            if index.node(ItemRef::Category(id)).is_none() {
                return Err(ReparentError::UnknownItem(ItemRef::Category(id)));
            }
        }

        let result = store.atomically(|store| -> Result<MoveDecision, ReparentError> {
            let to = match self.check(store, index, item, from, target)? {
                Ok(to) => to,
                Err(reason) => return Ok(MoveDecision::Rejected(reason)),
            };
            execute_move(store, item, from, to).map(MoveDecision::Moved)
        });

        match &result {
            Ok(MoveDecision::Moved(_)) => info!(
                "event=taxonomy_move module=reparent status=ok item={} from={} to={} duration_ms={}",
                item,
                from,
                target,
                started_at.elapsed().as_millis()
            ),
            Ok(MoveDecision::Rejected(reason)) => info!(
                "event=taxonomy_move module=reparent status=rejected item={} from={} to={} reason={}",
                item, from, target, reason
            ),
            Err(err) => error!(
                "event=taxonomy_move module=reparent status=error item={} from={} to={} duration_ms={} error={}",
                item,
                from,
                target,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Returns the reason `item` may not be dropped onto `target`, if any.
    ///
    /// With `CycleCheckScope::FullSubtree` this reads the store but never
    /// writes to it.
    pub fn validate<S: RecordStore>(
        &self,
        store: &S,
        index: &TreeIndex,
        item: ItemRef,
        target: DropTarget,
    ) -> Result<Option<RejectReason>, ReparentError> {
        let from = current_parent(index, item)?;
        Ok(self.check(store, index, item, from, target)?.err())
    }

    fn check<S: RecordStore>(
        &self,
        store: &S,
        index: &TreeIndex,
        item: ItemRef,
        from: Parent,
        target: DropTarget,
    ) -> StoreResult<Result<Parent, RejectReason>> {
        if target.as_item() == Some(item) {
            return Ok(Err(RejectReason::SelfDrop));
        }

        let to = match (item, target.as_parent()) {
            (_, Some(to)) => to,
            (ItemRef::Category(_), None) => return Ok(Err(RejectReason::CategoryOntoTag)),
            (ItemRef::Tag(_), None) => return Ok(Err(RejectReason::TagOntoTag)),
        };

        if to == from {
            return Ok(Err(RejectReason::UnchangedParent));
        }

        if let (ItemRef::Category(dragged), Parent::Category(target_id)) = (item, to) {
            if is_descendant(self.cycle_check, index, store, dragged, target_id)? {
                return Ok(Err(RejectReason::CycleWouldForm));
            }
        }

        Ok(Ok(to))
    }
}

fn current_parent(index: &TreeIndex, item: ItemRef) -> Result<Parent, ReparentError> {
    index
        .node(item)
        .map(|node| node.parent())
        .ok_or(ReparentError::UnknownItem(item))
}

/// Checks that the store still places `item` where the index says it is.
fn ensure_stored_parent<S: RecordStore>(
    store: &S,
    item: ItemRef,
    from: Parent,
) -> Result<(), ReparentError> {
    let in_place = match from {
        Parent::Category(id) => store.find_category(id)?.contains(item),
        Parent::Root => match store.find_item(item)? {
            TaxonomyItem::Tag(tag) => tag.is_root && tag.category_ids.is_empty(),
            TaxonomyItem::Category(category) => category.is_root,
        },
    };
    if in_place {
        Ok(())
    } else {
        Err(ReparentError::StaleParent {
            item,
            expected: from,
        })
    }
}

fn execute_move<S: RecordStore>(
    store: &S,
    item: ItemRef,
    from: Parent,
    to: Parent,
) -> Result<MoveOutcome, ReparentError> {
    ensure_stored_parent(store, item, from)?;

    let old_parent = match from {
        Parent::Root => None,
        Parent::Category(id) => {
            let mut parent = store.find_category(id)?;
            parent.remove_child(item);
            Some(store.save_category(parent)?)
        }
    };

    let mut current = store.find_item(item)?;
    let new_parent = match to {
        Parent::Root => {
            current.set_root(true);
            store.save_item(current)?;
            None
        }
        Parent::Category(id) => {
            if current.is_root() {
                current.set_root(false);
                store.save_item(current)?;
            }
            let mut parent = store.find_category(id)?;
            parent.add_child(item);
            Some(store.save_category(parent)?)
        }
    };

    Ok(MoveOutcome {
        item: store.find_item(item)?,
        from,
        to,
        old_parent,
        new_parent,
    })
}
