//! Taxonomy record store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist tags, categories and both membership relations.
//! - Hand out owned, versioned snapshots and accept them back for saving.
//!
//! # Invariants
//! - Saves are compare-and-save on `version`; an older snapshot is rejected
//!   with `StoreError::StaleSnapshot` and nothing is written.
//! - `save_category` replaces the category's membership rows in full and
//!   refuses counters that disagree with its child sets.
//! - Root listing: `is_root = 1` and not a member of any category.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::taxonomy::{
    Category, CategoryId, ItemRef, Tag, TagId, TaxonomyItem, TaxonomyValidationError,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const TAG_SELECT_SQL: &str = "SELECT tag_uuid, name, is_root, version FROM tags";
const CATEGORY_SELECT_SQL: &str = "SELECT
    category_uuid,
    name,
    is_root,
    tag_counter,
    category_counter,
    version
FROM categories";

/// Result type used by record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from record store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    TagNotFound(TagId),
    CategoryNotFound(CategoryId),
    /// Snapshot generation is older than the stored row.
    StaleSnapshot { item: ItemRef, version: i64 },
    /// Record failed pre-write validation.
    Validation(TaxonomyValidationError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::TagNotFound(id) => write!(f, "tag not found: {id}"),
            Self::CategoryNotFound(id) => write!(f, "category not found: {id}"),
            Self::StaleSnapshot { item, version } => write!(
                f,
                "stale snapshot for {item}: version {version} is no longer current"
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "taxonomy store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "taxonomy store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "taxonomy store requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid taxonomy data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<TaxonomyValidationError> for StoreError {
    fn from(value: TaxonomyValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Row counts touched by `bulk_reset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub tag_links_removed: usize,
    pub category_links_removed: usize,
    pub tags_rooted: usize,
    pub categories_rooted: usize,
}

/// Authoritative persistence for the taxonomy.
pub trait RecordStore {
    /// Returns the canonical current copy of one tag.
    fn find_tag(&self, id: TagId) -> StoreResult<Tag>;
    /// Returns the canonical current copy of one category.
    fn find_category(&self, id: CategoryId) -> StoreResult<Category>;
    /// Persists name/root flag of the snapshot and returns the saved copy.
    fn save_tag(&self, tag: Tag) -> StoreResult<Tag>;
    /// Persists the snapshot including both child sets.
    fn save_category(&self, category: Category) -> StoreResult<Category>;
    /// Inserts a new tag without memberships.
    fn insert_tag(&self, name: &str, is_root: bool) -> StoreResult<Tag>;
    /// Inserts a new empty category.
    fn insert_category(&self, name: &str, is_root: bool) -> StoreResult<Category>;
    /// Lists items displayed at the virtual root.
    fn list_root_items(&self) -> StoreResult<Vec<TaxonomyItem>>;
    /// Lists direct children of one category.
    fn list_children(&self, id: CategoryId) -> StoreResult<Vec<TaxonomyItem>>;
    /// Lists direct child category ids without loading full records.
    fn child_category_ids(&self, id: CategoryId) -> StoreResult<Vec<CategoryId>>;
    /// Drops every membership row and moves every item to root.
    fn bulk_reset(&self) -> StoreResult<ResetSummary>;
    /// Runs `op` inside one transaction; any error rolls back all its writes.
    fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>;

    /// Loads the canonical copy of either item kind.
    fn find_item(&self, item: ItemRef) -> StoreResult<TaxonomyItem> {
        match item {
            ItemRef::Tag(id) => self.find_tag(id).map(TaxonomyItem::Tag),
            ItemRef::Category(id) => self.find_category(id).map(TaxonomyItem::Category),
        }
    }

    /// Saves a snapshot of either item kind.
    fn save_item(&self, item: TaxonomyItem) -> StoreResult<TaxonomyItem> {
        match item {
            TaxonomyItem::Tag(tag) => self.save_tag(tag).map(TaxonomyItem::Tag),
            TaxonomyItem::Category(category) => {
                self.save_category(category).map(TaxonomyItem::Category)
            }
        }
    }
}

/// SQLite-backed record store.
pub struct SqliteTaxonomyStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaxonomyStore<'conn> {
    /// Creates store from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_taxonomy_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl RecordStore for SqliteTaxonomyStore<'_> {
    fn find_tag(&self, id: TagId) -> StoreResult<Tag> {
        let mut tag = self
            .conn
            .query_row(
                &format!("{TAG_SELECT_SQL} WHERE tag_uuid = ?1;"),
                [id.to_string()],
                |row| Ok(parse_tag_row(row)),
            )
            .optional()?
            .ok_or(StoreError::TagNotFound(id))??;
        tag.category_ids = load_id_set(
            self.conn,
            "SELECT category_uuid FROM category_tags WHERE tag_uuid = ?1;",
            id,
            "category_tags.category_uuid",
        )?;
        Ok(tag)
    }

    fn find_category(&self, id: CategoryId) -> StoreResult<Category> {
        let mut category = self
            .conn
            .query_row(
                &format!("{CATEGORY_SELECT_SQL} WHERE category_uuid = ?1;"),
                [id.to_string()],
                |row| Ok(parse_category_row(row)),
            )
            .optional()?
            .ok_or(StoreError::CategoryNotFound(id))??;
        category.tag_ids = load_id_set(
            self.conn,
            "SELECT tag_uuid FROM category_tags WHERE category_uuid = ?1;",
            id,
            "category_tags.tag_uuid",
        )?;
        category.category_ids = load_id_set(
            self.conn,
            "SELECT child_uuid FROM category_categories WHERE parent_uuid = ?1;",
            id,
            "category_categories.child_uuid",
        )?;
        Ok(category)
    }

    fn save_tag(&self, tag: Tag) -> StoreResult<Tag> {
        tag.validate()?;

        let changed = self.conn.execute(
            "UPDATE tags
             SET name = ?2,
                 is_root = ?3,
                 version = version + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE tag_uuid = ?1
               AND version = ?4;",
            params![
                tag.id.to_string(),
                tag.name.as_str(),
                bool_to_int(tag.is_root),
                tag.version,
            ],
        )?;
        if changed == 0 {
            return Err(self.missing_or_stale(ItemRef::Tag(tag.id), tag.version)?);
        }
        self.find_tag(tag.id)
    }

    fn save_category(&self, category: Category) -> StoreResult<Category> {
        category.validate()?;

        self.atomically(|store| -> StoreResult<Category> {
            let changed = store.conn.execute(
                "UPDATE categories
                 SET name = ?2,
                     is_root = ?3,
                     tag_counter = ?4,
                     category_counter = ?5,
                     version = version + 1,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE category_uuid = ?1
                   AND version = ?6;",
                params![
                    category.id.to_string(),
                    category.name.as_str(),
                    bool_to_int(category.is_root),
                    category.tag_counter,
                    category.category_counter,
                    category.version,
                ],
            )?;
            if changed == 0 {
                return Err(
                    store.missing_or_stale(ItemRef::Category(category.id), category.version)?
                );
            }

            let id_text = category.id.to_string();
            store.conn.execute(
                "DELETE FROM category_tags WHERE category_uuid = ?1;",
                [id_text.as_str()],
            )?;
            for tag_id in &category.tag_ids {
                store.conn.execute(
                    "INSERT INTO category_tags (category_uuid, tag_uuid) VALUES (?1, ?2);",
                    params![id_text, tag_id.to_string()],
                )?;
            }

            store.conn.execute(
                "DELETE FROM category_categories WHERE parent_uuid = ?1;",
                [id_text.as_str()],
            )?;
            for child_id in &category.category_ids {
                store.conn.execute(
                    "INSERT INTO category_categories (parent_uuid, child_uuid) VALUES (?1, ?2);",
                    params![id_text, child_id.to_string()],
                )?;
            }

            store.find_category(category.id)
        })
    }

    fn insert_tag(&self, name: &str, is_root: bool) -> StoreResult<Tag> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO tags (tag_uuid, name, is_root) VALUES (?1, ?2, ?3);",
            params![id.to_string(), name, bool_to_int(is_root)],
        )?;
        self.find_tag(id)
    }

    fn insert_category(&self, name: &str, is_root: bool) -> StoreResult<Category> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO categories (category_uuid, name, is_root) VALUES (?1, ?2, ?3);",
            params![id.to_string(), name, bool_to_int(is_root)],
        )?;
        self.find_category(id)
    }

    fn list_root_items(&self) -> StoreResult<Vec<TaxonomyItem>> {
        let category_ids = query_ids(
            self.conn,
            "SELECT c.category_uuid
             FROM categories c
             WHERE c.is_root = 1
               AND NOT EXISTS (
                 SELECT 1 FROM category_categories cc WHERE cc.child_uuid = c.category_uuid
               )
             ORDER BY c.category_uuid ASC;",
            None,
            "categories.category_uuid",
        )?;
        let tag_ids = query_ids(
            self.conn,
            "SELECT t.tag_uuid
             FROM tags t
             WHERE t.is_root = 1
               AND NOT EXISTS (
                 SELECT 1 FROM category_tags ct WHERE ct.tag_uuid = t.tag_uuid
               )
             ORDER BY t.tag_uuid ASC;",
            None,
            "tags.tag_uuid",
        )?;
        self.load_items(category_ids, tag_ids)
    }

    fn list_children(&self, id: CategoryId) -> StoreResult<Vec<TaxonomyItem>> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE category_uuid = ?1);",
            [id.to_string()],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(StoreError::CategoryNotFound(id));
        }

        let category_ids = self.child_category_ids(id)?;
        let tag_ids = query_ids(
            self.conn,
            "SELECT tag_uuid
             FROM category_tags
             WHERE category_uuid = ?1
             ORDER BY tag_uuid ASC;",
            Some(id),
            "category_tags.tag_uuid",
        )?;
        self.load_items(category_ids, tag_ids)
    }

    fn child_category_ids(&self, id: CategoryId) -> StoreResult<Vec<CategoryId>> {
        query_ids(
            self.conn,
            "SELECT child_uuid
             FROM category_categories
             WHERE parent_uuid = ?1
             ORDER BY child_uuid ASC;",
            Some(id),
            "category_categories.child_uuid",
        )
    }

    fn bulk_reset(&self) -> StoreResult<ResetSummary> {
        self.atomically(|store| -> StoreResult<ResetSummary> {
            let tag_links_removed = store.conn.execute("DELETE FROM category_tags;", [])?;
            let category_links_removed =
                store.conn.execute("DELETE FROM category_categories;", [])?;
            let tags_rooted = store.conn.execute(
                "UPDATE tags
                 SET is_root = 1,
                     version = version + 1,
                     updated_at = (strftime('%s', 'now') * 1000);",
                [],
            )?;
            let categories_rooted = store.conn.execute(
                "UPDATE categories
                 SET is_root = 1,
                     tag_counter = 0,
                     category_counter = 0,
                     version = version + 1,
                     updated_at = (strftime('%s', 'now') * 1000);",
                [],
            )?;
            Ok(ResetSummary {
                tag_links_removed,
                category_links_removed,
                tags_rooted,
                categories_rooted,
            })
        })
    }

    fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        if !self.conn.is_autocommit() {
            // Already inside an enclosing transaction; its outcome decides.
            return op(self);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = op(self)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

impl SqliteTaxonomyStore<'_> {
    fn load_items(
        &self,
        category_ids: Vec<CategoryId>,
        tag_ids: Vec<TagId>,
    ) -> StoreResult<Vec<TaxonomyItem>> {
        let mut items = Vec::with_capacity(category_ids.len() + tag_ids.len());
        for id in category_ids {
            items.push(TaxonomyItem::Category(self.find_category(id)?));
        }
        for id in tag_ids {
            items.push(TaxonomyItem::Tag(self.find_tag(id)?));
        }
        Ok(items)
    }

    /// Tells a vanished row apart from a version conflict after a 0-row update.
    fn missing_or_stale(&self, item: ItemRef, version: i64) -> StoreResult<StoreError> {
        let sql = match item {
            ItemRef::Tag(_) => "SELECT EXISTS(SELECT 1 FROM tags WHERE tag_uuid = ?1);",
            ItemRef::Category(_) => {
                "SELECT EXISTS(SELECT 1 FROM categories WHERE category_uuid = ?1);"
            }
        };
        let exists: i64 = self
            .conn
            .query_row(sql, [item.uuid().to_string()], |row| row.get(0))?;
        Ok(match (exists, item) {
            (1, _) => StoreError::StaleSnapshot { item, version },
            (_, ItemRef::Tag(id)) => StoreError::TagNotFound(id),
            (_, ItemRef::Category(id)) => StoreError::CategoryNotFound(id),
        })
    }
}

fn query_ids(
    conn: &Connection,
    sql: &str,
    param: Option<Uuid>,
    column: &'static str,
) -> StoreResult<Vec<Uuid>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = match param {
        Some(id) => stmt.query([id.to_string()])?,
        None => stmt.query([])?,
    };
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, column)?);
    }
    Ok(ids)
}

fn load_id_set(
    conn: &Connection,
    sql: &str,
    id: Uuid,
    column: &'static str,
) -> StoreResult<BTreeSet<Uuid>> {
    Ok(query_ids(conn, sql, Some(id), column)?.into_iter().collect())
}

fn parse_tag_row(row: &Row<'_>) -> StoreResult<Tag> {
    let id_text: String = row.get("tag_uuid")?;
    Ok(Tag {
        id: parse_uuid(&id_text, "tags.tag_uuid")?,
        name: row.get("name")?,
        is_root: parse_bool(row.get("is_root")?, "tags.is_root")?,
        category_ids: BTreeSet::new(),
        version: row.get("version")?,
    })
}

fn parse_category_row(row: &Row<'_>) -> StoreResult<Category> {
    let id_text: String = row.get("category_uuid")?;
    Ok(Category {
        id: parse_uuid(&id_text, "categories.category_uuid")?,
        name: row.get("name")?,
        is_root: parse_bool(row.get("is_root")?, "categories.is_root")?,
        tag_ids: BTreeSet::new(),
        category_ids: BTreeSet::new(),
        tag_counter: row.get("tag_counter")?,
        category_counter: row.get("category_counter")?,
        version: row.get("version")?,
    })
}

fn parse_bool(value: i64, column: &'static str) -> StoreResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("tags", &["tag_uuid", "name", "is_root", "version"]),
    (
        "categories",
        &[
            "category_uuid",
            "name",
            "is_root",
            "tag_counter",
            "category_counter",
            "version",
        ],
    ),
    ("category_tags", &["category_uuid", "tag_uuid"]),
    ("category_categories", &["parent_uuid", "child_uuid"]),
];

fn ensure_taxonomy_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for (table, columns) in REQUIRED_COLUMNS {
        if !table_exists(conn, table)? {
            return Err(StoreError::MissingRequiredTable(*table));
        }
        for column in *columns {
            if !table_has_column(conn, table, column)? {
                return Err(StoreError::MissingRequiredColumn {
                    table: *table,
                    column: *column,
                });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
