//! SQL schema generation with customizable table prefixes.
//!
//! # Table structure
//!
//! - `{prefix}cookbooks`: one row per cookbook name
//! - `{prefix}cookbook_versions`: one row per `(cookbook, major, minor,
//!   patch)`, with the ten sub-documents as BLOB columns
//!
//! Ids use `AUTOINCREMENT` so a deleted row's id is never handed out again.
//! The foreign key from versions to cookbooks has no `ON DELETE CASCADE`:
//! the store deletes version rows itself, so a cookbook delete that would
//! orphan versions fails instead.
//!
//! # Custom prefix
//!
//! Prefixes must contain only alphanumeric characters and underscores.
//! This enables multiple isolated stores (e.g., `prod_`, `test_`) within the
//! same SQLite database.

use cookbook_store_core::Segment;

use crate::error::{Result, StoreError};

/// Validates that a table prefix contains only alphanumeric characters and underscores.
pub(crate) fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(StoreError::InvalidPrefix(prefix.to_string()));
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// Generates the complete SQL schema for both tables with the given prefix.
///
/// # Errors
///
/// Returns [`StoreError::InvalidPrefix`] if the prefix is empty or contains
/// characters other than alphanumerics and underscores.
pub fn generate_schema_sql(prefix: &str) -> Result<String> {
    validate_prefix(prefix)?;

    let blob_columns: String = Segment::ALL
        .iter()
        .map(|segment| format!("    {} BLOB,\n", segment.column()))
        .collect();

    let sql = format!(
        r#"
CREATE TABLE IF NOT EXISTS {prefix}cookbooks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS {prefix}cookbook_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cookbook_id INTEGER NOT NULL,
    major_ver INTEGER NOT NULL CHECK (major_ver >= 0),
    minor_ver INTEGER NOT NULL CHECK (minor_ver >= 0),
    patch_ver INTEGER NOT NULL CHECK (patch_ver >= 0),
    frozen INTEGER NOT NULL DEFAULT 0,
{blob_columns}    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (cookbook_id, major_ver, minor_ver, patch_ver),
    FOREIGN KEY (cookbook_id) REFERENCES {prefix}cookbooks(id)
);

CREATE INDEX IF NOT EXISTS idx_{prefix}cookbook_versions_cookbook ON {prefix}cookbook_versions(cookbook_id);
"#
    );

    Ok(sql)
}

/// Generates SQL to drop both tables, children first.
///
/// # Errors
///
/// Returns [`StoreError::InvalidPrefix`] if the prefix is invalid.
pub fn generate_drop_sql(prefix: &str) -> Result<String> {
    validate_prefix(prefix)?;

    let sql = format!(
        r#"
DROP TABLE IF EXISTS {prefix}cookbook_versions;
DROP TABLE IF EXISTS {prefix}cookbooks;
"#
    );

    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{Connection, params};

    fn schema_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn.execute_batch(&generate_schema_sql("t_").unwrap()).unwrap();
        conn.execute("INSERT INTO t_cookbooks (name) VALUES ('apache2')", [])
            .unwrap();
        conn
    }

    #[test]
    fn test_valid_prefix() {
        assert!(validate_prefix("cb_").is_ok());
        assert!(validate_prefix("test123").is_ok());
        assert!(validate_prefix("A_B_C").is_ok());
    }

    #[test]
    fn test_invalid_prefix() {
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("drop;--").is_err());
        assert!(validate_prefix("hello world").is_err());
        assert!(validate_prefix("test-prefix").is_err());
        assert!(validate_prefix("café_").is_err());
    }

    #[test]
    fn test_generate_schema_sql_contains_columns() {
        let sql = generate_schema_sql("cb_").unwrap();
        assert!(sql.contains("cb_cookbooks"));
        assert!(sql.contains("cb_cookbook_versions"));
        assert!(sql.contains("idx_cb_cookbook_versions_cookbook"));
        for segment in Segment::ALL {
            assert!(sql.contains(&format!("{} BLOB", segment.column())), "{segment}");
        }
    }

    #[test]
    fn test_generate_drop_sql() {
        let sql = generate_drop_sql("cb_").unwrap();
        let versions = sql.find("DROP TABLE IF EXISTS cb_cookbook_versions").unwrap();
        let cookbooks = sql.find("DROP TABLE IF EXISTS cb_cookbooks").unwrap();
        assert!(versions < cookbooks);
        assert!(generate_drop_sql("").is_err());
    }

    #[test]
    fn test_version_triple_is_unique_per_cookbook() {
        let conn = schema_conn();
        let insert = "INSERT INTO t_cookbook_versions (cookbook_id, major_ver, minor_ver, patch_ver) \
                      VALUES (1, ?1, ?2, ?3)";
        conn.execute(insert, params![1, 0, 0]).unwrap();
        conn.execute(insert, params![1, 0, 1]).unwrap();
        assert!(conn.execute(insert, params![1, 0, 0]).is_err());
    }

    #[test]
    fn test_negative_components_rejected() {
        let conn = schema_conn();
        let result = conn.execute(
            "INSERT INTO t_cookbook_versions (cookbook_id, major_ver, minor_ver, patch_ver) \
             VALUES (1, -1, 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cookbook_with_versions_cannot_be_deleted_directly() {
        let conn = schema_conn();
        conn.execute(
            "INSERT INTO t_cookbook_versions (cookbook_id, major_ver, minor_ver, patch_ver) \
             VALUES (1, 1, 0, 0)",
            [],
        )
        .unwrap();
        assert!(conn.execute("DELETE FROM t_cookbooks WHERE id = 1", []).is_err());
    }
}
