//! Taxonomy editor use-case service.
//!
//! # Responsibility
//! - Own the record store, the tree index and the active drag session.
//! - Route moves through the reparent engine and mirror outcomes in the tree.
//! - Provide create/rename/reset operations that keep counters consistent.
//!
//! # Invariants
//! - A move is only attempted for the item and token of the active drag;
//!   every attempt ends the session.
//! - Creating under a category updates that category's child set and counter
//!   in the same transaction as the insert.

use crate::model::taxonomy::{
    normalize_name, CategoryId, DropTarget, ItemRef, Parent, TagId, TaxonomyItem,
    TaxonomyValidationError,
};
use crate::repo::taxonomy_repo::{RecordStore, ResetSummary, StoreError, StoreResult};
use crate::service::reparent::{MoveDecision, RejectReason, ReparentEngine, ReparentError};
use crate::tree::guard::CycleCheckScope;
use crate::tree::index::{TreeIndex, TreeIndexError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Opaque id correlating a drop with the drag that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(Uuid);

impl Display for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DragSession {
    token: SessionToken,
    item: ItemRef,
}

/// Errors from taxonomy service operations.
#[derive(Debug)]
pub enum TaxonomyServiceError {
    /// Name is blank after normalization.
    InvalidName,
    /// Parent category for a create does not exist.
    ParentNotFound(CategoryId),
    /// Target item does not exist or is not loaded.
    ItemNotFound(ItemRef),
    Reparent(ReparentError),
    Index(TreeIndexError),
    Store(StoreError),
}

impl Display for TaxonomyServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "name must not be blank"),
            Self::ParentNotFound(id) => write!(f, "parent category not found: {id}"),
            Self::ItemNotFound(item) => write!(f, "taxonomy item not found: {item}"),
            Self::Reparent(err) => write!(f, "{err}"),
            Self::Index(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaxonomyServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Reparent(err) => Some(err),
            Self::Index(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for TaxonomyServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::TagNotFound(id) => Self::ItemNotFound(ItemRef::Tag(id)),
            StoreError::CategoryNotFound(id) => Self::ItemNotFound(ItemRef::Category(id)),
            StoreError::Validation(TaxonomyValidationError::BlankName) => Self::InvalidName,
            other => Self::Store(other),
        }
    }
}

impl From<TaxonomyValidationError> for TaxonomyServiceError {
    fn from(value: TaxonomyValidationError) -> Self {
        StoreError::Validation(value).into()
    }
}

impl From<ReparentError> for TaxonomyServiceError {
    fn from(value: ReparentError) -> Self {
        match value {
            ReparentError::UnknownItem(item) => Self::ItemNotFound(item),
            other => Self::Reparent(other),
        }
    }
}

impl From<TreeIndexError> for TaxonomyServiceError {
    fn from(value: TreeIndexError) -> Self {
        match value {
            TreeIndexError::UnknownNode(item) => Self::ItemNotFound(item),
            other => Self::Index(other),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum NewItemKind {
    Tag,
    Category,
}

/// Taxonomy editor facade over one record store.
pub struct TaxonomyService<S: RecordStore> {
    store: S,
    engine: ReparentEngine,
    index: TreeIndex,
    active_drag: Option<DragSession>,
}

impl<S: RecordStore> TaxonomyService<S> {
    /// Creates service and loads the root level of the tree.
    pub fn new(store: S, cycle_check: CycleCheckScope) -> Result<Self, TaxonomyServiceError> {
        let index = TreeIndex::load(&store)?;
        Ok(Self {
            store,
            engine: ReparentEngine::new(cycle_check),
            index,
            active_drag: None,
        })
    }

    pub fn tree(&self) -> &TreeIndex {
        &self.index
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn expand(&mut self, category_id: CategoryId) -> Result<(), TaxonomyServiceError> {
        self.index
            .expand(&self.store, category_id)
            .map_err(Into::into)
    }

    pub fn collapse(&mut self, category_id: CategoryId) -> bool {
        self.index.collapse(category_id)
    }

    /// Expands all ancestors of `item`; returns them outermost first.
    pub fn reveal(&mut self, item: ItemRef) -> Result<Vec<CategoryId>, TaxonomyServiceError> {
        self.index.reveal(&self.store, item).map_err(Into::into)
    }

    /// Starts a drag of `item`, replacing any previous session.
    pub fn begin_drag(&mut self, item: ItemRef) -> Result<SessionToken, TaxonomyServiceError> {
        if self.index.node(item).is_none() {
            return Err(TaxonomyServiceError::ItemNotFound(item));
        }
        let token = SessionToken(Uuid::new_v4());
        self.active_drag = Some(DragSession { token, item });
        Ok(token)
    }

    pub fn cancel_drag(&mut self) {
        self.active_drag = None;
    }

    /// Drops the dragged tag onto `target`.
    pub fn move_tag(
        &mut self,
        token: SessionToken,
        tag_id: TagId,
        target: DropTarget,
    ) -> Result<MoveDecision, TaxonomyServiceError> {
        self.move_item(token, ItemRef::Tag(tag_id), target)
    }

    /// Drops the dragged category onto `target`.
    pub fn move_category(
        &mut self,
        token: SessionToken,
        category_id: CategoryId,
        target: DropTarget,
    ) -> Result<MoveDecision, TaxonomyServiceError> {
        self.move_item(token, ItemRef::Category(category_id), target)
    }

    fn move_item(
        &mut self,
        token: SessionToken,
        item: ItemRef,
        target: DropTarget,
    ) -> Result<MoveDecision, TaxonomyServiceError> {
        let session = self.active_drag.take();
        if session != Some(DragSession { token, item }) {
            warn!(
                "event=taxonomy_move module=service status=rejected item={} token={} reason={}",
                item,
                token,
                RejectReason::ForeignSession
            );
            return Ok(MoveDecision::Rejected(RejectReason::ForeignSession));
        }

        let decision = self
            .engine
            .move_item(&self.store, &self.index, item, target)?;
        if let MoveDecision::Moved(outcome) = &decision {
            self.index.apply_move(outcome);
        }
        Ok(decision)
    }

    /// Creates a tag at Root or inside a category and reveals it.
    pub fn create_tag(
        &mut self,
        parent: Parent,
        name: &str,
    ) -> Result<TaxonomyItem, TaxonomyServiceError> {
        self.create_item(parent, name, NewItemKind::Tag)
    }

    /// Creates an empty category at Root or inside a category and reveals it.
    pub fn create_category(
        &mut self,
        parent: Parent,
        name: &str,
    ) -> Result<TaxonomyItem, TaxonomyServiceError> {
        self.create_item(parent, name, NewItemKind::Category)
    }

    fn create_item(
        &mut self,
        parent: Parent,
        name: &str,
        kind: NewItemKind,
    ) -> Result<TaxonomyItem, TaxonomyServiceError> {
        let name = normalize_name(name)?;
        if let Parent::Category(parent_id) = parent {
            if self.index.node(ItemRef::Category(parent_id)).is_none() {
                return Err(TaxonomyServiceError::ParentNotFound(parent_id));
            }
        }
        let is_root = parent == Parent::Root;

        let (created, refreshed_parent) =
            self.store
                .atomically(|store| -> Result<_, TaxonomyServiceError> {
                    let created = match kind {
                        NewItemKind::Tag => TaxonomyItem::Tag(store.insert_tag(&name, is_root)?),
                        NewItemKind::Category => {
                            TaxonomyItem::Category(store.insert_category(&name, is_root)?)
                        }
                    };
                    let Parent::Category(parent_id) = parent else {
                        return Ok((created, None));
                    };

                    let mut parent_category =
                        store.find_category(parent_id).map_err(|err| match err {
                            StoreError::CategoryNotFound(id) => {
                                TaxonomyServiceError::ParentNotFound(id)
                            }
                            other => other.into(),
                        })?;
                    parent_category.add_child(created.item_ref());
                    let saved_parent = store.save_category(parent_category)?;
                    let created = store.find_item(created.item_ref())?;
                    Ok((created, Some(saved_parent)))
                })?;

        if let Some(saved_parent) = refreshed_parent {
            self.index
                .replace_snapshot(TaxonomyItem::Category(saved_parent));
        }
        self.index.attach(parent, created.clone());
        self.index.reveal(&self.store, created.item_ref())?;

        info!(
            "event=taxonomy_create module=service status=ok item={} parent={}",
            created.item_ref(),
            parent
        );
        Ok(created)
    }

    /// Renames an item and re-sorts its siblings.
    pub fn rename(
        &mut self,
        item: ItemRef,
        name: &str,
    ) -> Result<TaxonomyItem, TaxonomyServiceError> {
        let name = normalize_name(name)?;
        let saved = self
            .store
            .atomically(|store| -> StoreResult<TaxonomyItem> {
                let mut current = store.find_item(item)?;
                current.set_name(name);
                store.save_item(current)
            })?;
        self.index.replace_snapshot(saved.clone());

        info!("event=taxonomy_rename module=service status=ok item={item}");
        Ok(saved)
    }

    /// Moves every item to Root and rebuilds the tree from scratch.
    pub fn reset_structure(&mut self) -> Result<ResetSummary, TaxonomyServiceError> {
        let summary = self.store.bulk_reset()?;
        self.index = TreeIndex::load(&self.store)?;
        self.active_drag = None;

        warn!(
            "event=taxonomy_reset module=service status=ok tag_links_removed={} category_links_removed={} tags_rooted={} categories_rooted={}",
            summary.tag_links_removed,
            summary.category_links_removed,
            summary.tags_rooted,
            summary.categories_rooted
        );
        Ok(summary)
    }
}
