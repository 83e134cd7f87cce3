//! SQLite store implementation.
//!
//! Provides the `SqliteStore` struct that implements the `QueryStore` trait
//! for a file-backed SQLite database using sqlx.

use crate::db::{
    Column, ColumnInfo, ForeignKey, QueryResult, QueryStore, Row, Schema, StoreConnection, Table,
    Value,
};
use crate::error::{AskError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column as SqlxColumn, Connection, Decode, Executor, Row as SqlxRow, Sqlite};
use sqlx::{TypeInfo, ValueRef};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// SQLite store backed by a database file on disk.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Creates a store for the database file at `path`, opened read-only.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.path)
            .read_only(true)
            .create_if_missing(false)
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        SqliteConnection::connect_with(&self.connect_options())
            .await
            .map_err(|e| {
                AskError::store(format!("Failed to open {}: {e}", self.path.display()))
            })
    }

    async fn fetch_tables(conn: &mut SqliteConnection) -> Result<Vec<Table>> {
        let table_names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AskError::query(format!("Failed to fetch tables: {e}")))?;

        let mut tables = Vec::with_capacity(table_names.len());

        for table_name in table_names {
            let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
                r#"
                SELECT name, type, "notnull", pk
                FROM pragma_table_info(?1)
                ORDER BY cid
                "#,
            )
            .bind(&table_name)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                AskError::query(format!("Failed to fetch columns for {table_name}: {e}"))
            })?;

            let mut pk_columns: Vec<(i64, String)> = rows
                .iter()
                .filter(|(_, _, _, pk)| *pk > 0)
                .map(|(name, _, _, pk)| (*pk, name.clone()))
                .collect();
            pk_columns.sort();

            tables.push(Table {
                name: table_name,
                columns: rows
                    .into_iter()
                    .map(|(name, data_type, not_null, _)| Column {
                        name,
                        data_type,
                        is_nullable: not_null == 0,
                    })
                    .collect(),
                primary_key: pk_columns.into_iter().map(|(_, name)| name).collect(),
            });
        }

        Ok(tables)
    }

    async fn fetch_foreign_keys(
        conn: &mut SqliteConnection,
        tables: &[Table],
    ) -> Result<Vec<ForeignKey>> {
        let mut foreign_keys = Vec::new();

        for table in tables {
            let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
                r#"
                SELECT id, "table", "from", "to"
                FROM pragma_foreign_key_list(?1)
                ORDER BY id, seq
                "#,
            )
            .bind(&table.name)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                AskError::query(format!(
                    "Failed to fetch foreign keys for {}: {e}",
                    table.name
                ))
            })?;

            // Group multi-column constraints by their id.
            let mut grouped: BTreeMap<i64, ForeignKey> = BTreeMap::new();
            for (id, to_table, from_column, to_column) in rows {
                let fk = grouped.entry(id).or_insert_with(|| {
                    ForeignKey::new(table.name.clone(), Vec::new(), to_table, Vec::new())
                });
                fk.from_columns.push(from_column);
                fk.to_columns.push(to_column.unwrap_or_default());
            }
            foreign_keys.extend(grouped.into_values());
        }

        Ok(foreign_keys)
    }
}

#[async_trait]
impl QueryStore for SqliteStore {
    async fn open(&self) -> Result<Box<dyn StoreConnection>> {
        let conn = self.connect().await?;
        debug!(path = %self.path.display(), "Opened store connection");
        Ok(Box::new(SqliteStoreConnection { conn }))
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let mut conn = self.connect().await?;

        let result = async {
            let tables = Self::fetch_tables(&mut conn).await?;
            let foreign_keys = Self::fetch_foreign_keys(&mut conn, &tables).await?;
            Ok::<_, AskError>(Schema {
                tables,
                foreign_keys,
            })
        }
        .await;

        if let Err(e) = conn.close().await {
            debug!("Failed to close introspection connection: {e}");
        }

        result
    }
}

/// A single sqlx connection to the SQLite file.
struct SqliteStoreConnection {
    conn: SqliteConnection,
}

impl SqliteStoreConnection {
    /// Fetches column metadata for a statement that returned no rows.
    async fn describe_columns(&mut self, sql: &str) -> Vec<ColumnInfo> {
        match (&mut self.conn).describe(sql).await {
            Ok(describe) => describe
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            Err(e) => {
                debug!("Could not describe empty result columns: {e}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl StoreConnection for SqliteStoreConnection {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let rows = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| AskError::query(format_query_error(e)))?;

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = match rows.first() {
            Some(first_row) => first_row
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            None => self.describe_columns(sql).await,
        };

        let rows: Vec<Row> = rows.iter().map(convert_row).collect();

        Ok(QueryResult::with_data(columns, rows).with_execution_time(execution_time))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| AskError::store(format!("Failed to close connection: {e}")))
    }
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Converts a single column value using the value's runtime storage class.
///
/// SQLite is dynamically typed, so the declared column type is only a hint;
/// a `NUMERIC(10,2)` column may hold INTEGER or REAL values row by row.
/// Booleans are stored as INTEGER and come back as `Value::Int`.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }

    let storage = raw.type_info().name().to_uppercase();
    match storage.as_str() {
        "INTEGER" => <i64 as Decode<Sqlite>>::decode(raw)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "REAL" => <f64 as Decode<Sqlite>>::decode(raw)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => <Vec<u8> as Decode<Sqlite>>::decode(raw)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => <String as Decode<Sqlite>>::decode(raw)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Extracts the store's own error text from a sqlx error.
///
/// The message is passed through verbatim so users see exactly what SQLite reported.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}
