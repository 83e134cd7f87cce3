//! Store introspection and schema drift tests.

use super::common::seeded_store;
use chinook_ask::db::{chinook_schema, QueryStore, SchemaDrift};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[tokio::test]
async fn test_introspect_schema_reads_tables_and_keys() {
    let dir = tempdir().unwrap();
    let store = seeded_store(dir.path()).await;

    let schema = store.introspect_schema().await.unwrap();

    let names: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Album", "Artist", "Genre"]);

    let album = schema.table("Album").unwrap();
    assert_eq!(album.primary_key, vec!["AlbumId"]);
    assert!(album.columns.iter().any(|c| c.name == "Title" && !c.is_nullable));

    assert_eq!(schema.foreign_keys.len(), 1);
    assert_eq!(schema.foreign_keys[0].from_table, "Album");
    assert_eq!(schema.foreign_keys[0].to_table, "Artist");
}

#[tokio::test]
async fn test_partial_store_drifts_from_embedded_schema() {
    let dir = tempdir().unwrap();
    let store = seeded_store(dir.path()).await;
    let actual = store.introspect_schema().await.unwrap();

    let drift = chinook_schema().diff(&actual);

    assert!(drift.contains(&SchemaDrift::MissingTable("Track".to_string())));
    assert!(drift.contains(&SchemaDrift::MissingTable("Invoice".to_string())));
    assert!(!drift.contains(&SchemaDrift::MissingTable("Artist".to_string())));
    assert!(!drift
        .iter()
        .any(|d| matches!(d, SchemaDrift::MissingColumn { table, .. } if table == "Artist")));
}

#[tokio::test]
async fn test_every_session_opens_and_closes_its_connection() {
    let dir = tempdir().unwrap();
    let store = seeded_store(dir.path()).await;

    for _ in 0..3 {
        let mut conn = store.open().await.unwrap();
        let result = conn.execute_query("SELECT COUNT(*) FROM Artist").await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(result.row_count, 1);
    }
}
