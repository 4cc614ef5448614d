//! Table definitions and DDL rendering

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// SQL dialect used when rendering DDL and statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Postgres,
    Sqlite,
}

/// Logical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Text,
    Boolean,
    /// UTC timestamp, carried in rows as an RFC 3339 string
    Timestamp,
}

impl ColumnType {
    /// SQL type name for the given dialect
    pub fn sql_type(&self, dialect: SqlDialect) -> &'static str {
        match (self, dialect) {
            (ColumnType::Integer, SqlDialect::Postgres) => "BIGINT",
            (ColumnType::Integer, SqlDialect::Sqlite) => "INTEGER",
            (ColumnType::Text, _) => "TEXT",
            (ColumnType::Boolean, _) => "BOOLEAN",
            (ColumnType::Timestamp, SqlDialect::Postgres) => "TIMESTAMPTZ",
            (ColumnType::Timestamp, SqlDialect::Sqlite) => "TEXT",
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
}

impl ColumnDef {
    /// A non-null column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            primary_key: false,
            unique: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn render(&self, dialect: SqlDialect) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.column_type.sql_type(dialect));
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else {
            if !self.nullable {
                sql.push_str(" NOT NULL");
            }
            if self.unique {
                sql.push_str(" UNIQUE");
            }
        }
        sql
    }
}

/// Table definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Look up a column by name
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns carrying a uniqueness constraint (primary key included)
    pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.primary_key || c.unique)
    }

    /// Check identifiers before they are interpolated into SQL
    pub fn validate(&self) -> StorageResult<()> {
        validate_identifier(&self.name)?;
        if self.columns.is_empty() {
            return Err(StorageError::ValidationFailed(format!(
                "table '{}' has no columns",
                self.name
            )));
        }
        for column in &self.columns {
            validate_identifier(&column.name)?;
        }
        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table
    pub fn create_table_sql(&self, dialect: SqlDialect) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| c.render(dialect)).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            columns.join(", ")
        )
    }
}

/// Accept only plain `[A-Za-z_][A-Za-z0-9_]*` identifiers
pub fn validate_identifier(name: &str) -> StorageResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StorageError::ValidationFailed(format!(
            "invalid identifier '{}'",
            name
        )))
    }
}

/// Double-quote an identifier (valid in both PostgreSQL and SQLite)
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locks() -> TableSchema {
        TableSchema::new("migration_locks")
            .column(ColumnDef::new("lock_key", ColumnType::Text).primary_key())
            .column(ColumnDef::new("locked", ColumnType::Boolean))
            .column(ColumnDef::new("locked_at", ColumnType::Timestamp).nullable())
            .column(ColumnDef::new("locked_by", ColumnType::Text).nullable())
    }

    #[test]
    fn test_postgres_ddl() {
        assert_eq!(
            locks().create_table_sql(SqlDialect::Postgres),
            "CREATE TABLE IF NOT EXISTS \"migration_locks\" (\"lock_key\" TEXT PRIMARY KEY, \
             \"locked\" BOOLEAN NOT NULL, \"locked_at\" TIMESTAMPTZ, \"locked_by\" TEXT)"
        );
    }

    #[test]
    fn test_sqlite_ddl_stores_timestamps_as_text() {
        let sql = locks().create_table_sql(SqlDialect::Sqlite);
        assert!(sql.contains("\"locked_at\" TEXT"));
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS"));
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("db_app_version_compatibility").is_ok());
        assert!(validate_identifier("_x1").is_ok());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("name; DROP TABLE x").is_err());
        assert!(validate_identifier("").is_err());
        assert!(TableSchema::new("empty").validate().is_err());
        assert!(locks().validate().is_ok());
    }

    #[test]
    fn test_unique_columns() {
        let schema = locks();
        let unique: Vec<&str> = schema.unique_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(unique, vec!["lock_key"]);
        assert!(schema.find_column("locked_by").is_some_and(|c| c.nullable));
    }
}
