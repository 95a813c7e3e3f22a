//! Tag and category records.
//!
//! # Invariants
//! - `tag_counter == tag_ids.len()` and `category_counter == category_ids.len()`
//!   for every category accepted by the store (see `Category::validate`).
//! - A snapshot's `version` is the store generation it was read at; saving an
//!   older generation is rejected by the store.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Stable identifier of a tag (leaf item).
pub type TagId = Uuid;

/// Stable identifier of a category (container item).
pub type CategoryId = Uuid;

/// Validation failures raised before a record is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxonomyValidationError {
    /// Name is blank after normalization.
    BlankName,
    /// Cached counter disagrees with the child set it mirrors.
    CounterMismatch {
        category_id: CategoryId,
        counter: &'static str,
        cached: u32,
        actual: usize,
    },
    /// Category lists itself as a child category.
    SelfContainment(CategoryId),
}

impl Display for TaxonomyValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "name must not be blank"),
            Self::CounterMismatch {
                category_id,
                counter,
                cached,
                actual,
            } => write!(
                f,
                "category {category_id} has {counter}={cached} but {actual} children"
            ),
            Self::SelfContainment(id) => write!(f, "category {id} cannot contain itself"),
        }
    }
}

impl Error for TaxonomyValidationError {}

/// Trims a user supplied name and collapses inner whitespace runs.
pub fn normalize_name(value: &str) -> Result<String, TaxonomyValidationError> {
    let collapsed = WHITESPACE_RE.replace_all(value.trim(), " ");
    if collapsed.is_empty() {
        return Err(TaxonomyValidationError::BlankName);
    }
    Ok(collapsed.into_owned())
}

/// Leaf taxonomy item that can be attached to domain records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    /// Placed at the virtual root level.
    pub is_root: bool,
    /// Categories whose child-tag set contains this tag. Derived from the
    /// membership relation; saving a tag never writes it.
    pub category_ids: BTreeSet<CategoryId>,
    pub version: i64,
}

/// Container taxonomy item holding tags and/or other categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub is_root: bool,
    pub tag_ids: BTreeSet<TagId>,
    pub category_ids: BTreeSet<CategoryId>,
    pub tag_counter: u32,
    pub category_counter: u32,
    pub version: i64,
}

impl Category {
    /// Adds a child tag and refreshes the cached counters.
    pub fn add_tag(&mut self, tag_id: TagId) -> bool {
        let inserted = self.tag_ids.insert(tag_id);
        self.recount_children();
        inserted
    }

    /// Removes a child tag and refreshes the cached counters.
    pub fn remove_tag(&mut self, tag_id: TagId) -> bool {
        let removed = self.tag_ids.remove(&tag_id);
        self.recount_children();
        removed
    }

    pub fn add_category(&mut self, category_id: CategoryId) -> bool {
        let inserted = self.category_ids.insert(category_id);
        self.recount_children();
        inserted
    }

    pub fn remove_category(&mut self, category_id: CategoryId) -> bool {
        let removed = self.category_ids.remove(&category_id);
        self.recount_children();
        removed
    }

    /// Adds `item` to the matching child set.
    pub fn add_child(&mut self, item: ItemRef) -> bool {
        match item {
            ItemRef::Tag(id) => self.add_tag(id),
            ItemRef::Category(id) => self.add_category(id),
        }
    }

    /// Removes `item` from the matching child set.
    pub fn remove_child(&mut self, item: ItemRef) -> bool {
        match item {
            ItemRef::Tag(id) => self.remove_tag(id),
            ItemRef::Category(id) => self.remove_category(id),
        }
    }

    pub fn contains(&self, item: ItemRef) -> bool {
        match item {
            ItemRef::Tag(id) => self.tag_ids.contains(&id),
            ItemRef::Category(id) => self.category_ids.contains(&id),
        }
    }

    pub fn recount_children(&mut self) {
        self.tag_counter = count_u32(self.tag_ids.len());
        self.category_counter = count_u32(self.category_ids.len());
    }

    /// Checks the record before it is written.
    pub fn validate(&self) -> Result<(), TaxonomyValidationError> {
        if self.name.trim().is_empty() {
            return Err(TaxonomyValidationError::BlankName);
        }
        if self.category_ids.contains(&self.id) {
            return Err(TaxonomyValidationError::SelfContainment(self.id));
        }
        if self.tag_counter as usize != self.tag_ids.len() {
            return Err(TaxonomyValidationError::CounterMismatch {
                category_id: self.id,
                counter: "tag_counter",
                cached: self.tag_counter,
                actual: self.tag_ids.len(),
            });
        }
        if self.category_counter as usize != self.category_ids.len() {
            return Err(TaxonomyValidationError::CounterMismatch {
                category_id: self.id,
                counter: "category_counter",
                cached: self.category_counter,
                actual: self.category_ids.len(),
            });
        }
        Ok(())
    }
}

impl Tag {
    pub fn validate(&self) -> Result<(), TaxonomyValidationError> {
        if self.name.trim().is_empty() {
            return Err(TaxonomyValidationError::BlankName);
        }
        Ok(())
    }
}

fn count_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Kind-tagged reference to one taxonomy item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    Tag(TagId),
    Category(CategoryId),
}

impl ItemRef {
    pub fn kind_str(self) -> &'static str {
        match self {
            Self::Tag(_) => "tag",
            Self::Category(_) => "category",
        }
    }

    pub fn uuid(self) -> Uuid {
        match self {
            Self::Tag(id) | Self::Category(id) => id,
        }
    }
}

impl Display for ItemRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind_str(), self.uuid())
    }
}

/// Current display parent of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Parent {
    /// Virtual top-level container; never persisted as a row.
    Root,
    Category(CategoryId),
}

impl Display for Parent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Category(id) => write!(f, "category:{id}"),
        }
    }
}

/// Node an item was dropped onto.
///
/// Tags are valid drop targets only so the engine can reject them with a
/// reason; they never become parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropTarget {
    Root,
    Tag(TagId),
    Category(CategoryId),
}

impl DropTarget {
    /// Parent this target designates, `None` for tags.
    pub fn as_parent(self) -> Option<Parent> {
        match self {
            Self::Root => Some(Parent::Root),
            Self::Category(id) => Some(Parent::Category(id)),
            Self::Tag(_) => None,
        }
    }

    pub fn as_item(self) -> Option<ItemRef> {
        match self {
            Self::Root => None,
            Self::Tag(id) => Some(ItemRef::Tag(id)),
            Self::Category(id) => Some(ItemRef::Category(id)),
        }
    }
}

impl From<Parent> for DropTarget {
    fn from(value: Parent) -> Self {
        match value {
            Parent::Root => Self::Root,
            Parent::Category(id) => Self::Category(id),
        }
    }
}

impl Display for DropTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Tag(id) => write!(f, "tag:{id}"),
            Self::Category(id) => write!(f, "category:{id}"),
        }
    }
}

/// Owned snapshot of either item kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaxonomyItem {
    Tag(Tag),
    Category(Category),
}

impl TaxonomyItem {
    pub fn item_ref(&self) -> ItemRef {
        match self {
            Self::Tag(tag) => ItemRef::Tag(tag.id),
            Self::Category(category) => ItemRef::Category(category.id),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Tag(tag) => tag.name.as_str(),
            Self::Category(category) => category.name.as_str(),
        }
    }

    pub fn set_name(&mut self, name: String) {
        match self {
            Self::Tag(tag) => tag.name = name,
            Self::Category(category) => category.name = name,
        }
    }

    pub fn is_root(&self) -> bool {
        match self {
            Self::Tag(tag) => tag.is_root,
            Self::Category(category) => category.is_root,
        }
    }

    pub fn set_root(&mut self, is_root: bool) {
        match self {
            Self::Tag(tag) => tag.is_root = is_root,
            Self::Category(category) => category.is_root = is_root,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            Self::Tag(tag) => tag.version,
            Self::Category(category) => category.version,
        }
    }

    pub fn as_category(&self) -> Option<&Category> {
        match self {
            Self::Category(category) => Some(category),
            Self::Tag(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_root: true,
            tag_ids: BTreeSet::new(),
            category_ids: BTreeSet::new(),
            tag_counter: 0,
            category_counter: 0,
            version: 1,
        }
    }

    #[test]
    fn normalize_name_trims_and_collapses_whitespace() {
        assert_eq!(normalize_name("  Alps \t  West ").unwrap(), "Alps West");
        assert_eq!(
            normalize_name(" \n ").unwrap_err(),
            TaxonomyValidationError::BlankName
        );
    }

    #[test]
    fn child_mutations_keep_counters_in_sync() {
        let mut mountains = category("Mountains");
        let tag_id = Uuid::new_v4();
        let alps = Uuid::new_v4();

        assert!(mountains.add_tag(tag_id));
        assert!(!mountains.add_tag(tag_id));
        assert!(mountains.add_child(ItemRef::Category(alps)));
        assert_eq!((mountains.tag_counter, mountains.category_counter), (1, 1));

        assert!(mountains.remove_child(ItemRef::Tag(tag_id)));
        assert_eq!((mountains.tag_counter, mountains.category_counter), (0, 1));
        assert!(mountains.validate().is_ok());
    }

    #[test]
    fn validate_rejects_stale_counters_and_self_containment() {
        let mut mountains = category("Mountains");
        mountains.tag_ids.insert(Uuid::new_v4());
        assert!(matches!(
            mountains.validate(),
            Err(TaxonomyValidationError::CounterMismatch {
                counter: "tag_counter",
                cached: 0,
                actual: 1,
                ..
            })
        ));

        let mut looped = category("Loop");
        looped.add_category(looped.id);
        assert_eq!(
            looped.validate(),
            Err(TaxonomyValidationError::SelfContainment(looped.id))
        );
    }

    #[test]
    fn drop_target_maps_to_parent() {
        let id = Uuid::new_v4();
        assert_eq!(DropTarget::Root.as_parent(), Some(Parent::Root));
        assert_eq!(
            DropTarget::Category(id).as_parent(),
            Some(Parent::Category(id))
        );
        assert_eq!(DropTarget::Tag(id).as_parent(), None);
        assert_eq!(DropTarget::from(Parent::Category(id)), DropTarget::Category(id));
    }
}
