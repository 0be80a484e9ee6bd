//! Integration tests for the in-memory contents provider.

use colab_sdk::{
    ContentsProvider, CreateOptions, FileChangeKind, FileFormat, FileType, MemoryContents,
    SdkError,
};
use serde_json::json;

#[tokio::test]
async fn directory_listing() {
    let contents = MemoryContents::new();
    let dir = contents
        .new_untitled(CreateOptions::new("", FileType::Directory))
        .await
        .unwrap();
    contents
        .save(&format!("{}/a.md", dir.path), json!("a"), FileFormat::Text)
        .await
        .unwrap();
    contents
        .new_untitled(CreateOptions::new(&dir.path, FileType::Notebook))
        .await
        .unwrap();

    let listing = contents.get(&dir.path, true).await.unwrap();
    let children = listing.content.unwrap();
    let names: Vec<&str> = children
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Untitled.ipynb", "a.md"]);
    assert_eq!(children[0]["type"], json!("notebook"));

    let root = contents.get("", true).await.unwrap();
    assert_eq!(root.content.unwrap().as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn rename_moves_children() {
    let contents = MemoryContents::new();
    contents
        .new_untitled(CreateOptions::new("", FileType::Directory))
        .await
        .unwrap();
    contents
        .save("Untitled Folder/x.txt", json!("x"), FileFormat::Text)
        .await
        .unwrap();

    let renamed = contents.rename("Untitled Folder", "docs").await.unwrap();
    assert_eq!(renamed.name, "docs");
    let moved = contents.get("docs/x.txt", true).await.unwrap();
    assert_eq!(moved.content, Some(json!("x")));
    assert!(matches!(
        contents.get("Untitled Folder/x.txt", false).await,
        Err(SdkError::NotFound(_))
    ));

    contents.save("other.txt", json!(""), FileFormat::Text).await.unwrap();
    assert!(matches!(
        contents.rename("other.txt", "docs").await,
        Err(SdkError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn copy_picks_a_free_name() {
    let contents = MemoryContents::new();
    contents.save("data.csv", json!("a,b"), FileFormat::Text).await.unwrap();

    let first = contents.copy("data.csv", "").await.unwrap();
    let second = contents.copy("data.csv", "").await.unwrap();
    assert_eq!(first.path, "data-Copy1.csv");
    assert_eq!(second.path, "data-Copy2.csv");
    assert_eq!(first.mimetype.as_deref(), Some("text/csv"));
    assert_eq!(
        contents.get("data-Copy2.csv", true).await.unwrap().content,
        Some(json!("a,b"))
    );
}

#[tokio::test]
async fn delete_removes_subtree() {
    let contents = MemoryContents::new();
    contents
        .new_untitled(CreateOptions::new("", FileType::Directory))
        .await
        .unwrap();
    contents
        .save("Untitled Folder/y.txt", json!("y"), FileFormat::Text)
        .await
        .unwrap();

    contents.delete("Untitled Folder").await.unwrap();
    assert!(contents.get("Untitled Folder/y.txt", false).await.is_err());
    assert!(matches!(
        contents.delete("Untitled Folder").await,
        Err(SdkError::NotFound(_))
    ));
}

#[tokio::test]
async fn checkpoints_restore_content() {
    let contents = MemoryContents::new();
    contents.save("a.txt", json!("v1"), FileFormat::Text).await.unwrap();
    let checkpoint = contents.create_checkpoint("a.txt").await.unwrap();
    contents.save("a.txt", json!("v2"), FileFormat::Text).await.unwrap();

    assert_eq!(contents.list_checkpoints("a.txt").await.unwrap(), vec![checkpoint.clone()]);
    contents.restore_checkpoint("a.txt", &checkpoint.id).await.unwrap();
    assert_eq!(contents.get("a.txt", true).await.unwrap().content, Some(json!("v1")));

    contents.delete_checkpoint("a.txt", &checkpoint.id).await.unwrap();
    assert!(contents.list_checkpoints("a.txt").await.unwrap().is_empty());
    assert!(matches!(
        contents.delete_checkpoint("a.txt", &checkpoint.id).await,
        Err(SdkError::NotFound(_))
    ));
}

#[tokio::test]
async fn every_mutation_is_announced() {
    let contents = MemoryContents::new();
    let mut changes = contents.subscribe();

    let file = contents
        .new_untitled(CreateOptions::new("", FileType::File).ext(".md"))
        .await
        .unwrap();
    assert_eq!(file.path, "untitled.md");
    contents.save("untitled.md", json!("hi"), FileFormat::Text).await.unwrap();
    contents.rename("untitled.md", "hi.md").await.unwrap();
    contents.copy("hi.md", "").await.unwrap();
    contents.delete("hi.md").await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(change) = changes.try_recv() {
        kinds.push(change.kind);
    }
    assert_eq!(
        kinds,
        vec![
            FileChangeKind::New,
            FileChangeKind::Save,
            FileChangeKind::Rename,
            FileChangeKind::Copy,
            FileChangeKind::Delete,
        ]
    );
}
