//! Store provisioning tests.

use super::common::seed_store;
use chinook_ask::db::provision::{ensure_store, Provisioned};
use chinook_ask::db::{QueryStore, SqliteStore};
use chinook_ask::error::AskError;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[tokio::test]
async fn test_copied_store_is_queryable() {
    let source_dir = tempdir().unwrap();
    let source = seed_store(source_dir.path()).await;

    let target_dir = tempdir().unwrap();
    let target = target_dir.path().join("data").join("Chinook.db");

    let provisioned = ensure_store(&target, Some(&source)).unwrap();
    assert_eq!(provisioned, Provisioned::CopiedFrom(source.clone()));

    let store = SqliteStore::new(&target);
    let mut conn = store.open().await.unwrap();
    let result = conn.execute_query("SELECT Name FROM Artist").await.unwrap();
    conn.close().await.unwrap();
    assert_eq!(result.row_count, 3);

    assert_eq!(
        ensure_store(&target, Some(&source)).unwrap(),
        Provisioned::AlreadyPresent
    );
}

#[test]
fn test_missing_source_is_fatal() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("Chinook.db");
    let source = dir.path().join("nowhere.db");

    let err = ensure_store(&target, Some(&source)).unwrap_err();

    assert!(matches!(err, AskError::Provision(_)));
    assert!(err.detail().contains("Source database not found"));
    assert!(!target.exists());
}
