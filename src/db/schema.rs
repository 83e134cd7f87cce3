//! Database schema types for chinook-ask.
//!
//! Represents the structure of a database (tables, columns, foreign keys),
//! the embedded description of the Chinook music store, and the drift check
//! that compares the description against what the store actually contains.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the complete schema of a database.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    /// All tables in the schema.
    pub tables: Vec<Table>,

    /// Foreign key relationships between tables.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a table by name (case-insensitive, as SQLite resolves identifiers).
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Formats the schema for inclusion in an LLM system prompt.
    ///
    /// Produces a human-readable representation that helps the LLM
    /// understand the database structure.
    pub fn format_for_llm(&self) -> String {
        let tables_text = self
            .tables
            .iter()
            .map(|table| self.format_table_for_llm(table))
            .collect::<Vec<_>>()
            .join("");

        let foreign_keys_text = if self.foreign_keys.is_empty() {
            String::new()
        } else {
            let fk_lines = self
                .foreign_keys
                .iter()
                .map(|fk| {
                    format!(
                        "  - {}.{} -> {}.{}\n",
                        fk.from_table,
                        fk.from_columns.join(", "),
                        fk.to_table,
                        fk.to_columns.join(", ")
                    )
                })
                .collect::<Vec<_>>()
                .join("");
            format!("Foreign Keys:\n{}", fk_lines)
        };

        format!("Database Schema:\n\n{}{}", tables_text, foreign_keys_text)
    }

    fn format_table_for_llm(&self, table: &Table) -> String {
        let column_lines = table
            .columns
            .iter()
            .map(|column| self.format_column_for_llm(table, column))
            .collect::<Vec<_>>()
            .join("");

        format!("Table: {}\n{}\n", table.name, column_lines)
    }

    fn format_column_for_llm(&self, table: &Table, column: &Column) -> String {
        let mut annotations = Vec::new();
        if table.primary_key.contains(&column.name) {
            annotations.push("PK".to_string());
        }
        if !column.is_nullable {
            annotations.push("NOT NULL".to_string());
        }
        annotations.extend(
            self.foreign_keys
                .iter()
                .filter(|fk| fk.from_table == table.name)
                .filter_map(|fk| {
                    let idx = fk.from_columns.iter().position(|c| c == &column.name)?;
                    let target = fk.to_columns.get(idx).map(String::as_str).unwrap_or("");
                    Some(format!("FK -> {}.{}", fk.to_table, target))
                }),
        );

        if annotations.is_empty() {
            format!("  - {}: {}\n", column.name, column.data_type)
        } else {
            format!(
                "  - {}: {} ({})\n",
                column.name,
                column.data_type,
                annotations.join(", ")
            )
        }
    }

    /// Compares this (described) schema against the schema introspected from a store.
    ///
    /// Only structure the description promises is checked: every described table
    /// and column must exist in `actual`. Extra tables or columns in the store are
    /// not drift, and column types are not compared because SQLite is loosely typed.
    pub fn diff(&self, actual: &Schema) -> Vec<SchemaDrift> {
        let mut drift = Vec::new();

        for table in &self.tables {
            let Some(actual_table) = actual.table(&table.name) else {
                drift.push(SchemaDrift::MissingTable(table.name.clone()));
                continue;
            };

            for column in &table.columns {
                let present = actual_table
                    .columns
                    .iter()
                    .any(|c| c.name.eq_ignore_ascii_case(&column.name));
                if !present {
                    drift.push(SchemaDrift::MissingColumn {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    });
                }
            }
        }

        drift
    }
}

/// A difference between the described schema and the store's real structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaDrift {
    /// A described table does not exist in the store.
    MissingTable(String),
    /// A described column does not exist in its table.
    MissingColumn { table: String, column: String },
}

impl fmt::Display for SchemaDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTable(table) => write!(f, "table {table} is missing from the store"),
            Self::MissingColumn { table, column } => {
                write!(f, "column {table}.{column} is missing from the store")
            }
        }
    }
}

/// Represents a database table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Columns in the table.
    pub columns: Vec<Column>,

    /// Column names that form the primary key.
    pub primary_key: Vec<String>,
}

impl Table {
    /// Creates a new table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Appends a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Represents a column in a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared data type (e.g., "INTEGER", "NVARCHAR(120)").
    pub data_type: String,

    /// Whether the column allows NULL values.
    pub is_nullable: bool,
}

impl Column {
    /// Creates a new column with the given name and data type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self {
            is_nullable: nullable,
            ..self
        }
    }
}

/// Represents a foreign key relationship between tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ForeignKey {
    /// Source table name.
    pub from_table: String,

    /// Source column names.
    pub from_columns: Vec<String>,

    /// Target table name.
    pub to_table: String,

    /// Target column names.
    pub to_columns: Vec<String>,
}

impl ForeignKey {
    /// Creates a new foreign key relationship.
    pub fn new(
        from_table: impl Into<String>,
        from_columns: Vec<String>,
        to_table: impl Into<String>,
        to_columns: Vec<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_columns,
            to_table: to_table.into(),
            to_columns,
        }
    }

    fn single(from_table: &str, from_column: &str, to_table: &str, to_column: &str) -> Self {
        Self::new(
            from_table,
            vec![from_column.to_string()],
            to_table,
            vec![to_column.to_string()],
        )
    }
}

fn required(name: &str, data_type: &str) -> Column {
    Column::new(name, data_type).nullable(false)
}

fn optional(name: &str, data_type: &str) -> Column {
    Column::new(name, data_type)
}

/// Returns the embedded description of the Chinook music store.
///
/// Must be kept in step with the store file; `Schema::diff` reports drift at startup.
pub fn chinook_schema() -> Schema {
    let tables = vec![
        Table::new("Customer")
            .primary_key(&["CustomerId"])
            .column(required("CustomerId", "INTEGER"))
            .column(required("FirstName", "NVARCHAR(40)"))
            .column(required("LastName", "NVARCHAR(20)"))
            .column(optional("Company", "NVARCHAR(80)"))
            .column(optional("Address", "NVARCHAR(70)"))
            .column(optional("City", "NVARCHAR(40)"))
            .column(optional("State", "NVARCHAR(40)"))
            .column(optional("Country", "NVARCHAR(40)"))
            .column(optional("PostalCode", "NVARCHAR(10)"))
            .column(optional("Phone", "NVARCHAR(24)"))
            .column(optional("Fax", "NVARCHAR(24)"))
            .column(required("Email", "NVARCHAR(60)"))
            .column(optional("SupportRepId", "INTEGER")),
        Table::new("Employee")
            .primary_key(&["EmployeeId"])
            .column(required("EmployeeId", "INTEGER"))
            .column(required("LastName", "NVARCHAR(20)"))
            .column(required("FirstName", "NVARCHAR(20)"))
            .column(optional("Title", "NVARCHAR(30)"))
            .column(optional("ReportsTo", "INTEGER"))
            .column(optional("BirthDate", "DATETIME"))
            .column(optional("HireDate", "DATETIME"))
            .column(optional("Address", "NVARCHAR(70)"))
            .column(optional("City", "NVARCHAR(40)"))
            .column(optional("State", "NVARCHAR(40)"))
            .column(optional("Country", "NVARCHAR(40)"))
            .column(optional("PostalCode", "NVARCHAR(10)"))
            .column(optional("Phone", "NVARCHAR(24)"))
            .column(optional("Fax", "NVARCHAR(24)"))
            .column(optional("Email", "NVARCHAR(60)")),
        Table::new("Invoice")
            .primary_key(&["InvoiceId"])
            .column(required("InvoiceId", "INTEGER"))
            .column(required("CustomerId", "INTEGER"))
            .column(required("InvoiceDate", "DATETIME"))
            .column(optional("BillingAddress", "NVARCHAR(70)"))
            .column(optional("BillingCity", "NVARCHAR(40)"))
            .column(optional("BillingState", "NVARCHAR(40)"))
            .column(optional("BillingCountry", "NVARCHAR(40)"))
            .column(optional("BillingPostalCode", "NVARCHAR(10)"))
            .column(required("Total", "NUMERIC(10,2)")),
        Table::new("InvoiceLine")
            .primary_key(&["InvoiceLineId"])
            .column(required("InvoiceLineId", "INTEGER"))
            .column(required("InvoiceId", "INTEGER"))
            .column(required("TrackId", "INTEGER"))
            .column(required("UnitPrice", "NUMERIC(10,2)"))
            .column(required("Quantity", "INTEGER")),
        Table::new("Track")
            .primary_key(&["TrackId"])
            .column(required("TrackId", "INTEGER"))
            .column(required("Name", "NVARCHAR(200)"))
            .column(optional("AlbumId", "INTEGER"))
            .column(required("MediaTypeId", "INTEGER"))
            .column(optional("GenreId", "INTEGER"))
            .column(optional("Composer", "NVARCHAR(220)"))
            .column(required("Milliseconds", "INTEGER"))
            .column(optional("Bytes", "INTEGER"))
            .column(required("UnitPrice", "NUMERIC(10,2)")),
        Table::new("Album")
            .primary_key(&["AlbumId"])
            .column(required("AlbumId", "INTEGER"))
            .column(required("Title", "NVARCHAR(160)"))
            .column(required("ArtistId", "INTEGER")),
        Table::new("Artist")
            .primary_key(&["ArtistId"])
            .column(required("ArtistId", "INTEGER"))
            .column(optional("Name", "NVARCHAR(120)")),
        Table::new("Genre")
            .primary_key(&["GenreId"])
            .column(required("GenreId", "INTEGER"))
            .column(optional("Name", "NVARCHAR(120)")),
        Table::new("MediaType")
            .primary_key(&["MediaTypeId"])
            .column(required("MediaTypeId", "INTEGER"))
            .column(optional("Name", "NVARCHAR(120)")),
        Table::new("PlaylistTrack")
            .primary_key(&["PlaylistId", "TrackId"])
            .column(required("PlaylistId", "INTEGER"))
            .column(required("TrackId", "INTEGER")),
        Table::new("Playlist")
            .primary_key(&["PlaylistId"])
            .column(required("PlaylistId", "INTEGER"))
            .column(optional("Name", "NVARCHAR(120)")),
    ];

    let foreign_keys = vec![
        ForeignKey::single("Customer", "SupportRepId", "Employee", "EmployeeId"),
        ForeignKey::single("Employee", "ReportsTo", "Employee", "EmployeeId"),
        ForeignKey::single("Invoice", "CustomerId", "Customer", "CustomerId"),
        ForeignKey::single("InvoiceLine", "InvoiceId", "Invoice", "InvoiceId"),
        ForeignKey::single("InvoiceLine", "TrackId", "Track", "TrackId"),
        ForeignKey::single("Track", "AlbumId", "Album", "AlbumId"),
        ForeignKey::single("Track", "MediaTypeId", "MediaType", "MediaTypeId"),
        ForeignKey::single("Track", "GenreId", "Genre", "GenreId"),
        ForeignKey::single("Album", "ArtistId", "Artist", "ArtistId"),
        ForeignKey::single("PlaylistTrack", "PlaylistId", "Playlist", "PlaylistId"),
        ForeignKey::single("PlaylistTrack", "TrackId", "Track", "TrackId"),
    ];

    Schema {
        tables,
        foreign_keys,
    }
}
