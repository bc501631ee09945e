//! End-to-end finalization scenarios over both store backends.

use std::sync::Arc;

use lovepage::draft_store::{DraftStatus, DraftStore, InMemoryDraftStore, SqliteDraftStore};
use lovepage::finalize::Finalizer;
use lovepage::object_store::{InMemoryObjectStore, ObjectStore};
use lovepage::page_store::{InMemoryPageStore, PageStore, SqlitePageStore};
use lovepage::profile::InMemoryProfileStore;
use serde_json::json;

struct World {
    drafts: Arc<dyn DraftStore>,
    pages: Arc<dyn PageStore>,
    objects: Arc<InMemoryObjectStore>,
    finalizer: Finalizer,
    _dir: Option<tempfile::TempDir>,
}

fn in_memory_world() -> World {
    let drafts: Arc<dyn DraftStore> = Arc::new(InMemoryDraftStore::new());
    let pages: Arc<dyn PageStore> = Arc::new(InMemoryPageStore::new());
    let objects = Arc::new(InMemoryObjectStore::new("https://cdn.test"));
    let finalizer = Finalizer::new(
        drafts.clone(),
        pages.clone(),
        objects.clone(),
        Arc::new(InMemoryProfileStore::new()),
    );
    World {
        drafts,
        pages,
        objects,
        finalizer,
        _dir: None,
    }
}

fn sqlite_world() -> World {
    let dir = tempfile::tempdir().unwrap();
    let db = |name: &str| dir.path().join(name).to_str().unwrap().to_string();
    let drafts: Arc<dyn DraftStore> = Arc::new(SqliteDraftStore::open(&db("drafts.db")).unwrap());
    let pages: Arc<dyn PageStore> = Arc::new(SqlitePageStore::open(&db("pages.db")).unwrap());
    let objects = Arc::new(InMemoryObjectStore::new("https://cdn.test"));
    let finalizer = Finalizer::new(
        drafts.clone(),
        pages.clone(),
        objects.clone(),
        Arc::new(InMemoryProfileStore::new()),
    );
    World {
        drafts,
        pages,
        objects,
        finalizer,
        _dir: Some(dir),
    }
}

fn worlds() -> Vec<World> {
    vec![in_memory_world(), sqlite_world()]
}

/// The canonical scenario: a constrained-tier draft with one gallery image
/// finalizes once, promotes the image, and every later call converges.
#[test]
fn paid_draft_becomes_a_page_exactly_once() {
    for world in worlds() {
        world.objects.put("temp/u1/gallery/1700-a.jpg", b"img");
        let draft = world
            .drafts
            .save_content(
                None,
                "u1",
                &json!({
                    "title": "Us",
                    "plan": "basic",
                    "gallery": [{"url": "https://cdn.test/tmp", "path": "temp/u1/gallery/1700-a.jpg"}],
                }),
            )
            .unwrap();

        let first = world.finalizer.finalize(&draft.id, "pay_1").unwrap();
        assert!(first.newly_completed);
        let page_id = first.page_id.clone();

        // The gallery image moved to the permanent area.
        let page = world.pages.get(&page_id).unwrap().unwrap();
        let promoted = format!("perm/{page_id}/gallery/1700-a.jpg");
        assert_eq!(page.content["gallery"][0]["path"], json!(promoted));
        assert!(world.objects.exists(&promoted).unwrap());
        assert!(!world.objects.exists("temp/u1/gallery/1700-a.jpg").unwrap());

        // The draft is completed and bound to the page.
        let reloaded = world.drafts.get(&draft.id).unwrap().unwrap();
        assert_eq!(reloaded.status, DraftStatus::Completed);
        assert_eq!(reloaded.love_page_id.as_deref(), Some(page_id.as_str()));

        // A redundant trigger with a different payment id converges.
        let second = world.finalizer.finalize(&draft.id, "pay_2").unwrap();
        assert!(!second.newly_completed);
        assert_eq!(second.page_id, page_id);
        assert_eq!(world.pages.list_by_owner("u1").unwrap().len(), 1);

        // Owner index points at the page.
        let listing = world.pages.list_by_owner("u1").unwrap();
        assert_eq!(listing[0].id, page_id);
        assert_eq!(listing[0].title.as_deref(), Some("Us"));
    }
}

/// All concurrent triggers observe the same page id and exactly one of
/// them performs the transition.
#[test]
fn concurrent_triggers_converge_on_one_page() {
    for world in worlds() {
        let draft = world
            .drafts
            .save_content(None, "u1", &json!({"plan": "forever"}))
            .unwrap();

        let finalizer = world.finalizer.clone();
        let mut handles = Vec::new();
        for i in 0..6 {
            let finalizer = finalizer.clone();
            let draft_id = draft.id.clone();
            handles.push(std::thread::spawn(move || {
                finalizer.finalize(&draft_id, &format!("pay_{i}")).unwrap()
            }));
        }
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = outcomes.iter().filter(|o| o.newly_completed).count();
        assert_eq!(winners, 1);

        let page_ids: std::collections::HashSet<_> =
            outcomes.iter().map(|o| o.page_id.clone()).collect();
        assert_eq!(page_ids.len(), 1);

        assert_eq!(world.pages.list_by_owner("u1").unwrap().len(), 1);
    }
}

/// A retry after a crashed attempt that already wrote the page and moved
/// the media reuses the page and converges on the moved object.
#[test]
fn retry_after_crash_reuses_page_and_moved_media() {
    use lovepage::page_store::PermanentPage;

    let world = in_memory_world();
    let draft = world
        .drafts
        .save_content(
            None,
            "u1",
            &json!({
                "gallery": [{"url": "https://cdn.test/tmp", "path": "temp/u1/gallery/a.jpg"}],
            }),
        )
        .unwrap();

    // State left by the crashed attempt: page written, object moved,
    // draft still pending.
    world
        .pages
        .put(&PermanentPage {
            id: "P-prior".to_string(),
            draft_id: draft.id.clone(),
            owner_id: "u1".to_string(),
            content: json!({}),
            payment_id: "pay_1".to_string(),
            created_at: 0,
            expire_at: None,
        })
        .unwrap();
    world.objects.put("perm/P-prior/gallery/a.jpg", b"img");

    let retry = world.finalizer.finalize(&draft.id, "pay_1").unwrap();
    assert_eq!(retry.page_id, "P-prior");
    assert!(retry.newly_completed);

    let reloaded = world.drafts.get(&draft.id).unwrap().unwrap();
    assert_eq!(reloaded.love_page_id.as_deref(), Some("P-prior"));
}
