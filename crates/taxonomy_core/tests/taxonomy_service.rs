use rusqlite::Connection;
use taxonomy_core::db::open_db_in_memory;
use taxonomy_core::{
    CategoryId, CycleCheckScope, DropTarget, ItemRef, Parent, RecordStore, RejectReason,
    SqliteTaxonomyStore, TaxonomyItem, TaxonomyService, TaxonomyServiceError,
};
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn service(conn: &Connection) -> TaxonomyService<SqliteTaxonomyStore<'_>> {
    let store = SqliteTaxonomyStore::try_new(conn).unwrap();
    TaxonomyService::new(store, CycleCheckScope::FullSubtree).unwrap()
}

fn category_id(item: &TaxonomyItem) -> CategoryId {
    match item {
        TaxonomyItem::Category(category) => category.id,
        other => panic!("expected category, got {other:?}"),
    }
}

fn names(service: &TaxonomyService<SqliteTaxonomyStore<'_>>, parent: Parent) -> Vec<String> {
    let tree = service.tree();
    tree.children(parent)
        .unwrap()
        .iter()
        .map(|item| tree.node(*item).unwrap().item().name().to_string())
        .collect()
}

#[test]
fn create_under_category_updates_counters_and_reveals_item() {
    let conn = setup();
    let mut service = service(&conn);

    let mountains = service.create_category(Parent::Root, "Mountains").unwrap();
    let mountains_id = category_id(&mountains);
    let alps = service
        .create_category(Parent::Category(mountains_id), "Alps")
        .unwrap();
    let alps_id = category_id(&alps);
    let summit = service
        .create_tag(Parent::Category(alps_id), "  Summit ")
        .unwrap();

    assert_eq!(summit.name(), "Summit");
    assert!(!summit.is_root());
    assert!(!alps.is_root());

    let stored_mountains = service.store().find_category(mountains_id).unwrap();
    assert_eq!(
        (stored_mountains.tag_counter, stored_mountains.category_counter),
        (0, 1)
    );
    let stored_alps = service.store().find_category(alps_id).unwrap();
    assert_eq!((stored_alps.tag_counter, stored_alps.category_counter), (1, 0));

    let expanded = service.tree().expanded_categories();
    assert!(expanded.contains(&mountains_id));
    assert!(expanded.contains(&alps_id));
    assert_eq!(
        service
            .tree()
            .node(summit.item_ref())
            .unwrap()
            .parent(),
        Parent::Category(alps_id)
    );
    assert_eq!(names(&service, Parent::Category(alps_id)), vec!["Summit"]);

    let cached_alps = service.tree().node(ItemRef::Category(alps_id)).unwrap();
    assert_eq!(cached_alps.item().as_category().unwrap().tag_counter, 1);
}

#[test]
fn create_rejects_blank_name_and_unknown_parent() {
    let conn = setup();
    let mut service = service(&conn);

    assert!(matches!(
        service.create_tag(Parent::Root, " \t "),
        Err(TaxonomyServiceError::InvalidName)
    ));

    let missing = Uuid::new_v4();
    assert!(matches!(
        service.create_category(Parent::Category(missing), "Alps"),
        Err(TaxonomyServiceError::ParentNotFound(id)) if id == missing
    ));
    assert!(service.store().list_root_items().unwrap().is_empty());
}

#[test]
fn siblings_sort_categories_first_and_resort_on_rename() {
    let conn = setup();
    let mut service = service(&conn);

    let beta = service.create_tag(Parent::Root, "beta").unwrap();
    service.create_tag(Parent::Root, "alpha").unwrap();
    service.create_category(Parent::Root, "zeta").unwrap();
    service.create_tag(Parent::Root, "Gamma").unwrap();
    assert_eq!(
        names(&service, Parent::Root),
        vec!["zeta", "Gamma", "alpha", "beta"]
    );

    let renamed = service.rename(beta.item_ref(), "  Aardvark ").unwrap();
    assert_eq!(renamed.name(), "Aardvark");
    assert_eq!(renamed.version(), beta.version() + 1);
    assert_eq!(
        names(&service, Parent::Root),
        vec!["zeta", "Aardvark", "Gamma", "alpha"]
    );
}

#[test]
fn rename_reports_blank_and_missing_items() {
    let conn = setup();
    let mut service = service(&conn);
    let tag = service.create_tag(Parent::Root, "Summit").unwrap();

    assert!(matches!(
        service.rename(tag.item_ref(), ""),
        Err(TaxonomyServiceError::InvalidName)
    ));

    let missing = ItemRef::Tag(Uuid::new_v4());
    assert!(matches!(
        service.rename(missing, "Ghost"),
        Err(TaxonomyServiceError::ItemNotFound(item)) if item == missing
    ));
}

#[test]
fn drop_with_foreign_token_is_rejected_and_ends_session() {
    let conn = setup();
    let mut service = service(&conn);
    let mountains = service.create_category(Parent::Root, "Mountains").unwrap();
    let mountains_id = category_id(&mountains);
    let summit = service.create_tag(Parent::Root, "Summit").unwrap();
    let summit_id = summit.item_ref().uuid();

    let stale_token = service.begin_drag(summit.item_ref()).unwrap();
    let token = service.begin_drag(summit.item_ref()).unwrap();
    assert_ne!(stale_token, token);

    let decision = service
        .move_tag(stale_token, summit_id, DropTarget::Category(mountains_id))
        .unwrap();
    assert_eq!(decision.rejection(), Some(RejectReason::ForeignSession));

    // The failed drop consumed the session.
    let decision = service
        .move_tag(token, summit_id, DropTarget::Category(mountains_id))
        .unwrap();
    assert_eq!(decision.rejection(), Some(RejectReason::ForeignSession));

    let stored = service.store().find_category(mountains_id).unwrap();
    assert!(stored.tag_ids.is_empty());
}

#[test]
fn drop_for_different_item_is_foreign() {
    let conn = setup();
    let mut service = service(&conn);
    let mountains = service.create_category(Parent::Root, "Mountains").unwrap();
    let alps = service.create_category(Parent::Root, "Alps").unwrap();

    let token = service.begin_drag(alps.item_ref()).unwrap();
    let decision = service
        .move_category(token, category_id(&mountains), DropTarget::Category(category_id(&alps)))
        .unwrap();
    assert_eq!(decision.rejection(), Some(RejectReason::ForeignSession));
}

#[test]
fn begin_drag_requires_loaded_item() {
    let conn = setup();
    let mut service = service(&conn);
    let missing = ItemRef::Category(Uuid::new_v4());

    assert!(matches!(
        service.begin_drag(missing),
        Err(TaxonomyServiceError::ItemNotFound(item)) if item == missing
    ));
}

#[test]
fn move_into_unexpanded_category_shows_up_on_expand() {
    let conn = setup();
    let mut service = service(&conn);
    let mountains = service.create_category(Parent::Root, "Mountains").unwrap();
    let mountains_id = category_id(&mountains);
    let loose = service.create_tag(Parent::Root, "Loose").unwrap();

    let token = service.begin_drag(loose.item_ref()).unwrap();
    let decision = service
        .move_tag(token, loose.item_ref().uuid(), DropTarget::Category(mountains_id))
        .unwrap();
    assert!(decision.outcome().is_some());

    let tree = service.tree();
    assert!(tree
        .node(ItemRef::Category(mountains_id))
        .unwrap()
        .fetched_children()
        .is_none());
    assert_eq!(
        tree.node(loose.item_ref()).unwrap().parent(),
        Parent::Category(mountains_id)
    );
    assert_eq!(names(&service, Parent::Root), vec!["Mountains"]);

    service.expand(mountains_id).unwrap();
    assert_eq!(names(&service, Parent::Category(mountains_id)), vec!["Loose"]);
    let cached = service.tree().node(ItemRef::Category(mountains_id)).unwrap();
    assert_eq!(cached.item().as_category().unwrap().tag_counter, 1);
}

#[test]
fn reveal_is_idempotent() {
    let conn = setup();
    let mut service = service(&conn);
    let mountains = service.create_category(Parent::Root, "Mountains").unwrap();
    let mountains_id = category_id(&mountains);
    let alps = service
        .create_category(Parent::Category(mountains_id), "Alps")
        .unwrap();
    let alps_id = category_id(&alps);
    let summit = service.create_tag(Parent::Category(alps_id), "Summit").unwrap();

    service.collapse(alps_id);
    service.collapse(mountains_id);
    assert!(service.tree().expanded_categories().is_empty());

    let first = service.reveal(summit.item_ref()).unwrap();
    let expanded_after_first = service.tree().expanded_categories();
    let second = service.reveal(summit.item_ref()).unwrap();

    assert_eq!(first, vec![mountains_id, alps_id]);
    assert_eq!(first, second);
    assert_eq!(service.tree().expanded_categories(), expanded_after_first);
}

#[test]
fn service_move_keeps_tree_and_store_in_step() {
    let conn = setup();
    let mut service = service(&conn);
    let mountains = service.create_category(Parent::Root, "Mountains").unwrap();
    let mountains_id = category_id(&mountains);
    let alps = service
        .create_category(Parent::Category(mountains_id), "Alps")
        .unwrap();
    let alps_id = category_id(&alps);

    let token = service.begin_drag(alps.item_ref()).unwrap();
    let decision = service
        .move_category(token, alps_id, DropTarget::Root)
        .unwrap();
    assert!(decision.outcome().is_some());

    assert_eq!(names(&service, Parent::Root), vec!["Alps", "Mountains"]);
    assert!(service
        .tree()
        .children(Parent::Category(mountains_id))
        .unwrap()
        .is_empty());
    let cached = service.tree().node(ItemRef::Category(mountains_id)).unwrap();
    assert_eq!(cached.item().as_category().unwrap().category_counter, 0);

    let token = service.begin_drag(ItemRef::Category(mountains_id)).unwrap();
    let decision = service
        .move_category(token, mountains_id, DropTarget::Category(mountains_id))
        .unwrap();
    assert_eq!(decision.rejection(), Some(RejectReason::SelfDrop));
}

#[test]
fn reset_structure_moves_everything_to_root() {
    let conn = setup();
    let mut service = service(&conn);
    let mountains = service.create_category(Parent::Root, "Mountains").unwrap();
    let mountains_id = category_id(&mountains);
    let alps = service
        .create_category(Parent::Category(mountains_id), "Alps")
        .unwrap();
    service
        .create_tag(Parent::Category(category_id(&alps)), "Summit")
        .unwrap();
    let token = service.begin_drag(alps.item_ref()).unwrap();

    let summary = service.reset_structure().unwrap();
    assert_eq!(summary.tag_links_removed, 1);
    assert_eq!(summary.category_links_removed, 1);

    assert_eq!(
        names(&service, Parent::Root),
        vec!["Alps", "Mountains", "Summit"]
    );
    assert!(service.tree().expanded_categories().is_empty());
    for item in service.store().list_root_items().unwrap() {
        if let TaxonomyItem::Category(category) = item {
            assert_eq!((category.tag_counter, category.category_counter), (0, 0));
        }
    }

    let decision = service
        .move_category(token, category_id(&alps), DropTarget::Category(mountains_id))
        .unwrap();
    assert_eq!(decision.rejection(), Some(RejectReason::ForeignSession));
}

#[test]
fn move_onto_unloaded_category_requires_expansion_first() {
    let conn = setup();
    let (mountains_id, alps_id) = {
        let store = SqliteTaxonomyStore::try_new(&conn).unwrap();
        let alps = store.insert_category("Alps", false).unwrap();
        let mut mountains = store.insert_category("Mountains", true).unwrap();
        mountains.add_category(alps.id);
        let mountains = store.save_category(mountains).unwrap();
        store.insert_tag("Summit", true).unwrap();
        (mountains.id, alps.id)
    };
    let mut service = service(&conn);
    let summit = service
        .store()
        .list_root_items()
        .unwrap()
        .into_iter()
        .find(|item| item.name() == "Summit")
        .unwrap();

    let token = service.begin_drag(summit.item_ref()).unwrap();
    let err = service
        .move_tag(token, summit.item_ref().uuid(), DropTarget::Category(alps_id))
        .unwrap_err();
    assert!(matches!(
        err,
        TaxonomyServiceError::ItemNotFound(ItemRef::Category(id)) if id == alps_id
    ));
    assert!(service.store().find_category(alps_id).unwrap().tag_ids.is_empty());

    service.expand(mountains_id).unwrap();
    let token = service.begin_drag(summit.item_ref()).unwrap();
    let decision = service
        .move_tag(token, summit.item_ref().uuid(), DropTarget::Category(alps_id))
        .unwrap();
    assert!(decision.outcome().is_some());

    let chain = service.reveal(summit.item_ref()).unwrap();
    assert_eq!(chain, vec![mountains_id, alps_id]);
    assert!(service
        .tree()
        .node(ItemRef::Category(alps_id))
        .unwrap()
        .is_expanded());
    assert_eq!(names(&service, Parent::Category(alps_id)), vec!["Summit"]);
}
