//! Integration tests for the model database.
//!
//! These tests verify:
//! - Placeholders created before connection are bound to the shared document
//! - View addressing and disposal containment
//! - Prepopulation detection
//! - Collaboration between two sessions on one in-memory backend

use colab_backend::{
    CollaborativeMap, Entry, MemoryBackend, MemoryList, MemoryString, UserProfile,
};
use colab_db::{
    Container, ContainerType, DbError, DbEvent, ListChangeKind, ModelDatabase, ModelDbOptions,
    StringChangeKind,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const PATH: &str = "notebook.ipynb";

fn open_as(backend: &MemoryBackend, user: &str) -> ModelDatabase {
    let loader = backend.loader(UserProfile::new(user, user));
    ModelDatabase::new(ModelDbOptions::new(PATH, loader))
}

#[tokio::test]
async fn view_addressing() {
    let db = open_as(&MemoryBackend::new(), "alice");
    let s = db.create_string("base.str1").unwrap();
    s.set_text("hello").unwrap();

    let view = db.view("base");
    let found = view.get("str1").expect("visible through the view");
    assert_eq!(found.as_string().unwrap().text(), "hello");

    let stacked = db.view("one").view("two");
    stacked.create_value("x").unwrap();
    assert!(db.has("one.two.x"));
    assert_eq!(db.view("one").paths(), vec!["two.x".to_string()]);
}

#[tokio::test]
async fn create_returns_existing_container() {
    let db = open_as(&MemoryBackend::new(), "alice");
    let first = db.create_list::<i32>("items").unwrap();
    first.push(&1).unwrap();

    let second = db.create_list::<i32>("items").unwrap();
    assert_eq!(second.to_vec(), vec![1]);
    assert!(matches!(
        db.create_string("items"),
        Err(DbError::TypeMismatch { .. })
    ));
}

#[tokio::test]
async fn disposing_a_view_keeps_base_containers() {
    let db = open_as(&MemoryBackend::new(), "alice");
    let base_string = db.create_string("outer.kept").unwrap();

    let view = db.view("outer");
    let owned = view.create_string("owned").unwrap();
    let nested = view.view("inner").create_map::<i32>("m").unwrap();

    view.dispose();
    view.dispose();

    assert!(owned.is_disposed());
    assert!(nested.is_disposed());
    assert!(!base_string.is_disposed());
    assert!(db.has("outer.kept"));
    assert!(!db.has("outer.owned"));
    assert!(view.is_disposed());
    assert!(!db.is_disposed());
    assert!(matches!(view.create_string("again"), Err(DbError::Disposed(_))));
}

#[tokio::test]
async fn disposing_the_root_disposes_everything() {
    let backend = MemoryBackend::new();
    let db = open_as(&backend, "alice");
    let s = db.create_string("s").unwrap();
    let v = db.view("v").create_value("x").unwrap();
    db.connected().await.unwrap();
    assert_eq!(backend.session_count(PATH), 1);

    db.dispose();
    db.dispose();

    assert!(s.is_disposed());
    assert!(v.is_disposed());
    assert!(db.is_disposed());
    assert!(s.set_text("late").is_err());
    assert_eq!(backend.session_count(PATH), 0);
}

#[tokio::test]
async fn prepopulated_detection() {
    let backend = MemoryBackend::new();
    let fresh = open_as(&backend, "alice");
    fresh.create_string("title").unwrap();
    fresh.connected().await.unwrap();
    assert!(!fresh.is_prepopulated());

    let second = open_as(&backend, "bob");
    second.connected().await.unwrap();
    assert!(second.is_prepopulated());
}

#[tokio::test]
async fn placeholder_content_is_seeded_into_the_document() {
    let backend = MemoryBackend::new().with_latency(Duration::from_millis(20));
    let alice = open_as(&backend, "alice");

    let cells = alice.create_list::<String>("cells").unwrap();
    cells.push(&"a".to_string()).unwrap();
    alice.set_value("meta", json!(1)).unwrap_err();
    alice.create_value("meta").unwrap();
    alice.set_value("meta", json!({"kernel": "python3"})).unwrap();
    assert!(!alice.is_connected());

    alice.connected().await.unwrap();
    assert!(alice.is_connected());

    let bob = open_as(&backend, "bob");
    bob.connected().await.unwrap();
    assert_eq!(
        bob.create_list::<String>("cells").unwrap().to_vec(),
        vec!["a".to_string()]
    );
    bob.create_value("meta").unwrap();
    assert_eq!(bob.get_value("meta"), Some(json!({"kernel": "python3"})));
}

#[tokio::test]
async fn placeholder_rebinds_to_existing_entry() {
    let backend = MemoryBackend::new();
    let alice = open_as(&backend, "alice");
    alice.create_string("doc").unwrap().set_text("shared").unwrap();
    alice.connected().await.unwrap();

    let bob = open_as(&backend, "bob");
    let text = bob.create_string("doc").unwrap();
    let changes = Arc::new(Mutex::new(Vec::new()));
    let c = changes.clone();
    let _sub = text.connect(move |change| c.lock().push(change.clone()));

    bob.connected().await.unwrap();
    assert_eq!(text.text(), "shared");
    let changes = changes.lock();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, StringChangeKind::Set);
}

#[tokio::test]
async fn remote_edits_reach_listeners_but_not_undo() {
    let backend = MemoryBackend::new();
    let alice = open_as(&backend, "alice");
    let bob = open_as(&backend, "bob");
    alice.connected().await.unwrap();
    bob.connected().await.unwrap();

    let mine = alice.create_list::<i32>("numbers").unwrap();
    let theirs = bob.create_list::<i32>("numbers").unwrap();

    let kinds = Arc::new(Mutex::new(Vec::new()));
    let k = kinds.clone();
    let _sub = mine.connect(move |change| k.lock().push(change.kind));

    theirs.push(&7).unwrap();
    assert_eq!(mine.to_vec(), vec![7]);
    assert_eq!(*kinds.lock(), vec![ListChangeKind::Add]);
    assert!(!mine.can_undo());
    assert!(theirs.can_undo());

    mine.push(&8).unwrap();
    mine.undo().unwrap();
    assert_eq!(mine.to_vec(), vec![7]);
    theirs.undo().unwrap();
    assert!(mine.is_empty());
}

#[tokio::test]
async fn remote_replacement_rebinds_container() {
    let backend = MemoryBackend::new();
    let alice = open_as(&backend, "alice");
    let text = alice.create_string("title").unwrap();
    alice.connected().await.unwrap();

    let raw = backend.open(PATH, &UserProfile::new("carol", "Carol")).unwrap();
    raw.root()
        .set("title", Entry::String(Arc::new(MemoryString::new("replaced"))));

    assert_eq!(text.text(), "replaced");
}

#[tokio::test]
async fn failed_load_rejects_connected() {
    let backend = MemoryBackend::new();
    backend.fail_loads(PATH, "permission denied");
    let db = open_as(&backend, "alice");
    let s = db.create_string("s").unwrap();
    let mut events = db.subscribe();

    let err = db.connected().await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionFailed(_)));
    assert!(matches!(
        events.recv().await.unwrap(),
        DbEvent::ConnectionFailed { .. }
    ));

    s.set_text("still usable").unwrap();
    assert_eq!(s.text(), "still usable");
    assert!(db.collaborators().is_none());
}

#[tokio::test]
async fn dispose_before_connection_rejects_connected() {
    let backend = MemoryBackend::new().with_latency(Duration::from_millis(50));
    let db = open_as(&backend, "alice");
    db.dispose();
    assert!(matches!(db.connected().await, Err(DbError::Disposed(_))));
    assert_eq!(backend.session_count(PATH), 0);
}

#[tokio::test]
async fn dispose_while_binding_leaves_no_session_behind() {
    let backend = MemoryBackend::new();
    let bob = open_as(&backend, "bob");
    bob.connected().await.unwrap();
    bob.create_string("title").unwrap().set_text("remote").unwrap();

    let alice = open_as(&backend, "alice");
    let title = alice.create_string("title").unwrap();
    let handle = alice.clone();
    let _sub = title.connect(move |_| handle.dispose());

    assert!(matches!(alice.connected().await, Err(DbError::Disposed(_))));
    assert!(alice.is_disposed());
    assert!(!alice.is_connected());
    assert!(alice.collaborators().is_none());

    let roster = bob.collaborators().unwrap();
    assert_eq!(roster.len(), 1);
    assert!(roster.values().iter().all(|c| c.user_id == "bob"));
}

#[tokio::test]
async fn conflicting_placeholder_fails_connection() {
    let backend = MemoryBackend::new();
    let bob = open_as(&backend, "bob");
    bob.connected().await.unwrap();
    let list = bob.create_list::<i32>("x").unwrap();
    list.push(&1).unwrap();

    let alice = open_as(&backend, "alice");
    let mut events = alice.subscribe();
    let text = alice.create_string("x").unwrap();
    let kept = alice.create_value("y").unwrap();

    let err = alice.connected().await.unwrap_err();
    assert!(matches!(err, DbError::TypeMismatch { ref path, .. } if path == "x"));
    assert!(alice.get("x").is_none());
    assert!(text.is_disposed());
    assert!(text.set_text("lost edit").is_err());
    assert_eq!(list.to_vec(), vec![1]);

    kept.set(json!(3)).unwrap();
    assert_eq!(bob.create_value("y").unwrap().get(), json!(3));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&DbEvent::BindFailed {
        path: "x".to_string(),
        error: err.clone(),
    }));
    assert!(seen.contains(&DbEvent::ConnectionFailed { error: err }));
}

#[tokio::test]
async fn remote_replacement_with_another_kind_drops_container() {
    let backend = MemoryBackend::new();
    let alice = open_as(&backend, "alice");
    let text = alice.create_string("title").unwrap();
    alice.connected().await.unwrap();
    let mut events = alice.subscribe();

    let raw = backend.open(PATH, &UserProfile::new("carol", "Carol")).unwrap();
    raw.root()
        .set("title", Entry::List(Arc::new(MemoryList::new(vec![json!(1)]))));

    assert!(alice.get("title").is_none());
    assert!(text.is_disposed());
    assert!(matches!(
        events.try_recv().unwrap(),
        DbEvent::BindFailed { ref path, .. } if path == "title"
    ));
}

#[tokio::test]
async fn lifecycle_events() {
    let db = open_as(&MemoryBackend::new(), "alice");
    let mut events = db.subscribe();

    db.create_string("s").unwrap();
    db.connected().await.unwrap();
    db.dispose();

    assert_eq!(
        events.recv().await.unwrap(),
        DbEvent::ContainerCreated {
            path: "s".to_string(),
            container_type: ContainerType::String,
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        DbEvent::Connected {
            prepopulated: false
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        DbEvent::ContainerDisposed {
            path: "s".to_string()
        }
    );
    assert_eq!(events.recv().await.unwrap(), DbEvent::Disposed);
}

#[tokio::test]
async fn roster_tracks_both_sessions() {
    let backend = MemoryBackend::new();
    let alice = open_as(&backend, "alice");
    let bob = open_as(&backend, "bob");
    alice.connected().await.unwrap();
    bob.connected().await.unwrap();

    let roster = alice.collaborators().expect("roster after connection");
    assert_eq!(roster.len(), 2);
    assert_eq!(roster.values()[0].user_id, "alice");

    bob.dispose();
    assert_eq!(roster.len(), 1);
}

#[tokio::test]
async fn generic_container_access() {
    let db = open_as(&MemoryBackend::new(), "alice");
    db.create_map::<i32>("m").unwrap().set("a", &1).unwrap();

    match db.get("m") {
        Some(Container::Map(map)) => assert_eq!(map.get("a"), Some(json!(1))),
        other => panic!("unexpected container: {other:?}"),
    }
    assert_eq!(db.get_value("m"), None);
    assert!(db.is_collaborative());
}
