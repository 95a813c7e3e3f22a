//! Sibling ordering for display.

use crate::model::taxonomy::TaxonomyItem;
use std::cmp::Ordering;

/// Categories first, then case-sensitive name order; id breaks ties so the
/// order stays deterministic for duplicate names.
pub fn compare_items(left: &TaxonomyItem, right: &TaxonomyItem) -> Ordering {
    kind_rank(left)
        .cmp(&kind_rank(right))
        .then_with(|| left.name().cmp(right.name()))
        .then_with(|| left.item_ref().cmp(&right.item_ref()))
}

fn kind_rank(item: &TaxonomyItem) -> u8 {
    match item {
        TaxonomyItem::Category(_) => 0,
        TaxonomyItem::Tag(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::compare_items;
    use crate::model::taxonomy::{Category, Tag, TaxonomyItem};
    use std::cmp::Ordering;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn tag(name: &str) -> TaxonomyItem {
        TaxonomyItem::Tag(Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_root: true,
            category_ids: BTreeSet::new(),
            version: 1,
        })
    }

    fn category(name: &str) -> TaxonomyItem {
        TaxonomyItem::Category(Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_root: true,
            tag_ids: BTreeSet::new(),
            category_ids: BTreeSet::new(),
            tag_counter: 0,
            category_counter: 0,
            version: 1,
        })
    }

    #[test]
    fn categories_sort_before_tags_regardless_of_name() {
        assert_eq!(compare_items(&category("zz"), &tag("aa")), Ordering::Less);
        assert_eq!(compare_items(&tag("aa"), &category("zz")), Ordering::Greater);
    }

    #[test]
    fn same_kind_sorts_by_case_sensitive_name() {
        let mut items = vec![tag("beta"), tag("Gamma"), tag("alpha")];
        items.sort_by(compare_items);
        let names: Vec<_> = items.iter().map(|item| item.name().to_string()).collect();
        assert_eq!(names, vec!["Gamma", "alpha", "beta"]);
    }
}
