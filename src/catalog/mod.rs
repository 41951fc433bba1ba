// Schema catalog module
// Reads table and column metadata from the source database


use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

use crate::{RagError, Result};

/// One table as described by the database catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    /// Column names in catalog order
    pub columns: Vec<String>,
}

impl TableSchema {
    #[inline]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Render the text that is embedded and handed to the language model
    #[inline]
    pub fn schema_text(&self) -> String {
        format!(
            "Table: {} | Columns: {}",
            self.name,
            self.columns.join(", ")
        )
    }
}

/// Source of table schemas for an index build
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Human-readable identifier, used in error messages
    fn describe(&self) -> String;

    /// Enumerate all user tables in catalog order
    async fn tables(&self) -> Result<Vec<TableSchema>>;
}

/// Reads schemas from a SQLite database through a read-only pool
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: Pool<Sqlite>,
    path: PathBuf,
}

impl SqliteCatalog {
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(RagError::Database(format!(
                "SQLite database file not found at {}",
                path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                RagError::Database(format!("Failed to open {}: {}", path.display(), e))
            })?;

        debug!("Opened catalog for {}", path.display());
        Ok(Self { pool, path })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))
    }

    async fn column_names(&self, table: &str) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                RagError::Database(format!("Failed to read columns of {}: {}", table, e))
            })
    }

    #[inline]
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SchemaSource for SqliteCatalog {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn tables(&self) -> Result<Vec<TableSchema>> {
        let names = self.table_names().await?;
        let mut tables = Vec::with_capacity(names.len());

        for name in names {
            let columns = self.column_names(&name).await?;
            debug!("Table {} has {} columns", name, columns.len());
            tables.push(TableSchema::new(name, columns));
        }

        info!(
            "Read {} tables from {}",
            tables.len(),
            self.path.display()
        );
        Ok(tables)
    }
}

/// Fixed list of schemas, for callers that already know their tables
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaSource {
    tables: Vec<TableSchema>,
}

impl StaticSchemaSource {
    #[inline]
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl SchemaSource for StaticSchemaSource {
    fn describe(&self) -> String {
        format!("static schema list ({} tables)", self.tables.len())
    }

    async fn tables(&self) -> Result<Vec<TableSchema>> {
        Ok(self.tables.clone())
    }
}
