//! Read-only access to the book catalog.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::config::CatalogConfig;

static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Failed to compile identifier regex")
});

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog database not found at {0}")]
    Unavailable(PathBuf),

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// One book as read from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub id: i64,
    pub title: String,
    /// Empty when the catalog has no description
    pub description: String,
}

impl CatalogRow {
    pub fn new(id: i64, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Source of catalog rows for the index builder.
pub trait Catalog: Send + Sync {
    /// All rows with a title, ordered by id ascending.
    fn rows(&self) -> Result<Vec<CatalogRow>, CatalogError>;
}

impl Catalog for Vec<CatalogRow> {
    fn rows(&self) -> Result<Vec<CatalogRow>, CatalogError> {
        let mut rows = self.clone();
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }
}

/// Catalog backed by an SQLite database, opened read-only per call.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    path: PathBuf,
    query: String,
}

impl SqliteCatalog {
    pub fn new(
        path: impl Into<PathBuf>,
        table: &str,
        id_column: &str,
        title_column: &str,
        description_column: &str,
    ) -> Result<Self, CatalogError> {
        let table = quote_identifier(table)?;
        let id = quote_identifier(id_column)?;
        let title = quote_identifier(title_column)?;
        let description = quote_identifier(description_column)?;

        let query = format!(
            "SELECT {id}, {title}, {description} FROM {table} \
             WHERE {title} IS NOT NULL ORDER BY {id} ASC"
        );

        Ok(Self {
            path: path.into(),
            query,
        })
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        Self::new(
            &config.path,
            &config.table,
            &config.id_column,
            &config.title_column,
            &config.description_column,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection, CatalogError> {
        if !self.path.is_file() {
            return Err(CatalogError::Unavailable(self.path.clone()));
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }
}

impl Catalog for SqliteCatalog {
    fn rows(&self) -> Result<Vec<CatalogRow>, CatalogError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&self.query)?;

        let rows = stmt
            .query_map([], |row| {
                let description: Option<String> = row.get(2)?;
                Ok(CatalogRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: description.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("read {} rows from catalog {}", rows.len(), self.path.display());

        Ok(rows)
    }
}

fn quote_identifier(name: &str) -> Result<String, CatalogError> {
    if !IDENTIFIER_REGEX.is_match(name) {
        return Err(CatalogError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}
