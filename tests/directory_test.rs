//! User directory integration tests

mod common;

use chrono::Utc;
use common::{create_test_store, UnavailableStore};
use portal_core::{
    NotificationDispatcher, NotificationKind, NotificationStore, PortalError, UserDirectory,
    UserProfile,
};
use std::sync::Arc;

fn profile(id: &str, display_name: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        email: format!("{}@example.org", id),
        display_name: display_name.to_string(),
        photo_url: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_register_sends_welcome() {
    let (store, _dir) = create_test_store().await;
    let directory = UserDirectory::new(store.clone(), NotificationDispatcher::new(store.clone()), 10);

    directory.register(profile("u1", "Ada Lovelace")).await.unwrap();

    let notifications = store.list_notifications("u1", 10).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Welcome);
    assert!(notifications[0].payload.message.contains("u1@example.org"));
}

#[tokio::test]
async fn test_register_survives_welcome_failure() {
    let (store, _dir) = create_test_store().await;
    let directory = UserDirectory::new(
        store.clone(),
        NotificationDispatcher::new(Arc::new(UnavailableStore)),
        10,
    );

    let registered = directory.register(profile("u2", "Grace Hopper")).await.unwrap();
    assert_eq!(registered.id, "u2");
    assert_eq!(directory.get("u2").await.unwrap().display_name, "Grace Hopper");
}

#[tokio::test]
async fn test_register_validation_and_display_name_fallback() {
    let (store, _dir) = create_test_store().await;
    let directory = UserDirectory::new(store.clone(), NotificationDispatcher::new(store.clone()), 10);

    let mut missing_email = profile("u3", "Nobody");
    missing_email.email = String::new();
    let err = directory.register(missing_email).await.unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));

    let registered = directory.register(profile("u4", "  ")).await.unwrap();
    assert_eq!(registered.display_name, "u4@example.org");
}

#[tokio::test]
async fn test_prefix_search() {
    let (store, _dir) = create_test_store().await;
    let directory = UserDirectory::new(store.clone(), NotificationDispatcher::new(store.clone()), 2);

    for (id, name) in [
        ("u1", "Alice"),
        ("u2", "Alina"),
        ("u3", "Albert"),
        ("u4", "Bob"),
    ] {
        directory.register(profile(id, name)).await.unwrap();
    }

    let names: Vec<String> = directory
        .search("Ali", 10)
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.display_name)
        .collect();
    assert_eq!(names, vec!["Alice".to_string(), "Alina".to_string()]);

    // Limit is clamped to the configured maximum
    assert_eq!(directory.search("Al", 50).await.unwrap().len(), 2);

    assert!(directory.search("   ", 10).await.unwrap().is_empty());
    assert!(directory.search("Zed", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_missing_user() {
    let (store, _dir) = create_test_store().await;
    let directory = UserDirectory::new(store.clone(), NotificationDispatcher::new(store.clone()), 10);

    let err = directory.get("ghost").await.unwrap_err();
    assert!(matches!(err, PortalError::NotFound(_)));
}
