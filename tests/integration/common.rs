//! Shared fixtures: a small Chinook-shaped SQLite file.

use chinook_ask::db::SqliteStore;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use std::path::{Path, PathBuf};

const SEED: &str = r#"
CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY NOT NULL, Name NVARCHAR(120));
CREATE TABLE Album (
    AlbumId INTEGER PRIMARY KEY NOT NULL,
    Title NVARCHAR(160) NOT NULL,
    ArtistId INTEGER NOT NULL,
    FOREIGN KEY (ArtistId) REFERENCES Artist (ArtistId)
);
CREATE TABLE Genre (GenreId INTEGER PRIMARY KEY NOT NULL, Name NVARCHAR(120));
INSERT INTO Artist VALUES (1, 'AC/DC'), (2, 'Accept'), (3, 'Aerosmith');
INSERT INTO Album VALUES
    (1, 'For Those About To Rock We Salute You', 1),
    (2, 'Balls to the Wall', 2),
    (3, 'Restless and Wild', 2),
    (4, 'Let There Be Rock', 1);
"#;

/// Creates a seeded store file at `dir/Chinook.db`.
pub async fn seed_store(dir: &Path) -> PathBuf {
    let path = dir.join("Chinook.db");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
    sqlx::raw_sql(SEED).execute(&mut conn).await.unwrap();
    conn.close().await.unwrap();
    path
}

/// Seeds a store and wraps it in a `SqliteStore`.
pub async fn seeded_store(dir: &Path) -> SqliteStore {
    SqliteStore::new(seed_store(dir).await)
}
