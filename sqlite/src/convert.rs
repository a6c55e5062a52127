//! Conversion between cookbook types and SQLite rows.
//!
//! Every function takes a plain `&Connection` (a `&Transaction` derefs to
//! one) and the table prefix, so the same statements serve the store's
//! transactions and migration seeding.
//!
//! The ten sub-documents travel as a unit: [`encode_bundle`] encodes all of
//! them before any statement runs, and [`VersionRow::decode`] fails the
//! whole row if any one of them is corrupt.

use cookbook_store_core::{Cookbook, CookbookVersion, DocumentBundle, Segment, Version};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::codec::BlobCodec;
use crate::error::{Result, StoreError};
use crate::policy::{ExistingVersion, SavePolicy};

/// The ten encoded sub-documents, in [`Segment::ALL`] order.
pub(crate) struct EncodedBundle {
    blobs: Vec<Vec<u8>>,
}

/// Encodes every sub-document of `bundle`, stopping at the first failure.
pub(crate) fn encode_bundle(codec: &dyn BlobCodec, bundle: &DocumentBundle) -> Result<EncodedBundle> {
    let mut blobs = Vec::with_capacity(Segment::ALL.len());
    for (segment, value) in bundle.iter() {
        let blob = codec
            .encode(value)
            .map_err(|source| StoreError::EncodeFailure { segment, source })?;
        blobs.push(blob);
    }
    Ok(EncodedBundle { blobs })
}

/// Comma-separated blob column names, in [`Segment::ALL`] order.
fn blob_columns(table_alias: &str) -> String {
    Segment::ALL
        .iter()
        .map(|segment| format!("{table_alias}{}", segment.column()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT ... FROM versions JOIN cookbooks` with the columns [`VersionRow`] reads.
fn select_versions(prefix: &str) -> String {
    format!(
        "SELECT v.id, v.cookbook_id, c.name, v.major_ver, v.minor_ver, v.patch_ver, v.frozen, {} \
         FROM {prefix}cookbook_versions v JOIN {prefix}cookbooks c ON c.id = v.cookbook_id",
        blob_columns("v.")
    )
}

const NEWEST_FIRST: &str = "ORDER BY v.major_ver DESC, v.minor_ver DESC, v.patch_ver DESC";

/// A raw version row, before the triple is checked and the blobs decoded.
pub(crate) struct VersionRow {
    id: i64,
    cookbook_id: i64,
    cookbook_name: String,
    triple: (i64, i64, i64),
    frozen: bool,
    blobs: Vec<Option<Vec<u8>>>,
}

impl VersionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut blobs = Vec::with_capacity(Segment::ALL.len());
        for i in 0..Segment::ALL.len() {
            blobs.push(row.get(7 + i)?);
        }
        Ok(Self {
            id: row.get(0)?,
            cookbook_id: row.get(1)?,
            cookbook_name: row.get(2)?,
            triple: (row.get(3)?, row.get(4)?, row.get(5)?),
            frozen: row.get(6)?,
            blobs,
        })
    }

    fn record(&self) -> String {
        let (major, minor, patch) = self.triple;
        format!("{}-{major}.{minor}.{patch}", self.cookbook_name)
    }

    fn version(&self) -> Result<Version> {
        let (major, minor, patch) = self.triple;
        let component = |n: i64| {
            u32::try_from(n).map_err(|_| StoreError::DecodeFailure {
                record: self.record(),
                reason: format!("version component {n} is out of range"),
            })
        };
        Ok(Version::new(component(major)?, component(minor)?, component(patch)?))
    }

    /// Decodes the row into a cookbook version.
    ///
    /// A `NULL` blob, or one that decodes to `null`, becomes the segment's
    /// empty value.
    pub(crate) fn decode(self, codec: &dyn BlobCodec) -> Result<CookbookVersion> {
        let version = self.version()?;
        let record = self.record();

        let mut cbv = CookbookVersion::new(self.cookbook_name, version).with_frozen(self.frozen);
        cbv.id = Some(self.id);
        cbv.cookbook_id = Some(self.cookbook_id);

        for (segment, blob) in Segment::ALL.into_iter().zip(self.blobs) {
            let value = match blob {
                Some(bytes) => codec.decode(&bytes).map_err(|err| StoreError::DecodeFailure {
                    record: record.clone(),
                    reason: format!("{segment}: {err}"),
                })?,
                None => segment.empty_value(),
            };
            cbv.bundle.set(segment, value);
        }

        Ok(cbv)
    }
}

fn decode_all(rows: Vec<VersionRow>, codec: &dyn BlobCodec) -> Result<Vec<CookbookVersion>> {
    rows.into_iter().map(|row| row.decode(codec)).collect()
}

// ---------------------------------------------------------------------------
// Cookbook rows
// ---------------------------------------------------------------------------

/// Looks up a cookbook's id by name.
pub(crate) fn cookbook_id(conn: &Connection, prefix: &str, name: &str) -> Result<Option<i64>> {
    conn.query_row(
        &format!("SELECT id FROM {prefix}cookbooks WHERE name = ?1"),
        params![name],
        |row| row.get(0),
    )
    .optional()
    .map_err(StoreError::backend("look up cookbook"))
}

pub(crate) fn cookbook_exists(conn: &Connection, prefix: &str, name: &str) -> Result<bool> {
    conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {prefix}cookbooks WHERE name = ?1)"),
        params![name],
        |row| row.get(0),
    )
    .map_err(StoreError::backend("probe cookbook"))
}

/// Inserts a cookbook row and returns its id.
pub(crate) fn insert_cookbook(conn: &Connection, prefix: &str, name: &str) -> Result<i64> {
    conn.execute(
        &format!("INSERT INTO {prefix}cookbooks (name) VALUES (?1)"),
        params![name],
    )
    .map_err(StoreError::backend("insert cookbook"))?;
    Ok(conn.last_insert_rowid())
}

/// Refreshes a cookbook row's mutable fields.
pub(crate) fn update_cookbook(conn: &Connection, prefix: &str, id: i64, name: &str) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE {prefix}cookbooks SET name = ?1, updated_at = datetime('now') WHERE id = ?2"
        ),
        params![name, id],
    )
    .map_err(StoreError::backend("update cookbook"))?;
    Ok(())
}

pub(crate) fn delete_cookbook_row(conn: &Connection, prefix: &str, id: i64) -> Result<usize> {
    conn.execute(
        &format!("DELETE FROM {prefix}cookbooks WHERE id = ?1"),
        params![id],
    )
    .map_err(StoreError::backend("delete cookbook"))
}

/// Loads a cookbook row without its versions.
pub(crate) fn load_cookbook(conn: &Connection, prefix: &str, name: &str) -> Result<Option<Cookbook>> {
    let id = cookbook_id(conn, prefix, name)?;
    Ok(id.map(|id| Cookbook {
        id: Some(id),
        ..Cookbook::new(name)
    }))
}

/// All cookbook rows, by name, without versions.
pub(crate) fn load_cookbooks(conn: &Connection, prefix: &str) -> Result<Vec<Cookbook>> {
    let mut stmt = conn
        .prepare(&format!("SELECT id, name FROM {prefix}cookbooks ORDER BY name"))
        .map_err(StoreError::backend("list cookbooks"))?;
    let cookbooks = stmt
        .query_map([], |row| {
            Ok(Cookbook {
                id: Some(row.get(0)?),
                ..Cookbook::new(row.get::<_, String>(1)?)
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::backend("list cookbooks"))?;
    Ok(cookbooks)
}

/// Counts the version rows of a cookbook, or `None` if the cookbook is absent.
pub(crate) fn count_versions(conn: &Connection, prefix: &str, name: &str) -> Result<Option<usize>> {
    let count: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT COUNT(v.id) FROM {prefix}cookbooks c \
                 LEFT JOIN {prefix}cookbook_versions v ON v.cookbook_id = c.id \
                 WHERE c.name = ?1 GROUP BY c.id"
            ),
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::backend("count versions"))?;
    Ok(count.map(|n| n as usize))
}

// ---------------------------------------------------------------------------
// Version rows
// ---------------------------------------------------------------------------

/// Probes for the row holding `(cookbook_id, version)`.
pub(crate) fn find_version(
    conn: &Connection,
    prefix: &str,
    cookbook_id: i64,
    version: Version,
) -> Result<Option<ExistingVersion>> {
    conn.query_row(
        &format!(
            "SELECT id, frozen FROM {prefix}cookbook_versions \
             WHERE cookbook_id = ?1 AND major_ver = ?2 AND minor_ver = ?3 AND patch_ver = ?4"
        ),
        params![cookbook_id, version.major, version.minor, version.patch],
        |row| {
            Ok(ExistingVersion {
                id: row.get(0)?,
                frozen: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(StoreError::backend("probe cookbook version"))
}

/// Inserts a version row and returns its id.
pub(crate) fn insert_version(
    conn: &Connection,
    prefix: &str,
    cookbook_id: i64,
    version: &CookbookVersion,
    encoded: &EncodedBundle,
) -> Result<i64> {
    let placeholders: Vec<String> = (1..=5 + encoded.blobs.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {prefix}cookbook_versions \
         (cookbook_id, major_ver, minor_ver, patch_ver, frozen, {}) VALUES ({})",
        blob_columns(""),
        placeholders.join(", ")
    );

    let v = &version.version;
    let mut values: Vec<&dyn ToSql> = Vec::with_capacity(5 + encoded.blobs.len());
    values.push(&cookbook_id);
    values.push(&v.major);
    values.push(&v.minor);
    values.push(&v.patch);
    values.push(&version.frozen);
    values.extend(encoded.blobs.iter().map(|blob| blob as &dyn ToSql));

    conn.execute(&sql, values.as_slice())
        .map_err(StoreError::backend("insert cookbook version"))?;
    Ok(conn.last_insert_rowid())
}

/// Overwrites a version row's flag and sub-documents.
pub(crate) fn update_version(
    conn: &Connection,
    prefix: &str,
    id: i64,
    version: &CookbookVersion,
    encoded: &EncodedBundle,
) -> Result<()> {
    let assignments: Vec<String> = Segment::ALL
        .iter()
        .enumerate()
        .map(|(i, segment)| format!("{} = ?{}", segment.column(), i + 2))
        .collect();
    let id_param = Segment::ALL.len() + 2;
    let sql = format!(
        "UPDATE {prefix}cookbook_versions SET frozen = ?1, {}, updated_at = datetime('now') \
         WHERE id = ?{id_param}",
        assignments.join(", ")
    );

    let mut values: Vec<&dyn ToSql> = Vec::with_capacity(id_param);
    values.push(&version.frozen);
    values.extend(encoded.blobs.iter().map(|blob| blob as &dyn ToSql));
    values.push(&id);

    conn.execute(&sql, values.as_slice())
        .map_err(StoreError::backend("update cookbook version"))?;
    Ok(())
}

/// Ids assigned by an [`upsert_version`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Upserted {
    pub id: i64,
    pub cookbook_id: i64,
    pub cookbook_created: bool,
    pub version_created: bool,
}

/// Probe-then-branch write of one version; the caller owns the transaction.
///
/// Resolves the owning cookbook by name, probes for the version row, asks
/// `policy`, and only then writes: the cookbook row if it is missing, then
/// an update or an insert of the version row.
pub(crate) fn upsert_version(
    conn: &Connection,
    prefix: &str,
    version: &CookbookVersion,
    encoded: &EncodedBundle,
    policy: &dyn SavePolicy,
) -> Result<Upserted> {
    let cookbook = cookbook_id(conn, prefix, &version.cookbook_name)?;
    let existing = match cookbook {
        Some(id) => find_version(conn, prefix, id, version.version)?,
        None => None,
    };

    policy.check(version, existing.as_ref())?;

    let cookbook_id = match cookbook {
        Some(id) => id,
        None => insert_cookbook(conn, prefix, &version.cookbook_name)?,
    };
    let id = match existing {
        Some(row) => {
            update_version(conn, prefix, row.id, version, encoded)?;
            row.id
        }
        None => insert_version(conn, prefix, cookbook_id, version, encoded)?,
    };

    Ok(Upserted {
        id,
        cookbook_id,
        cookbook_created: cookbook.is_none(),
        version_created: existing.is_none(),
    })
}

fn query_versions(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
    codec: &dyn BlobCodec,
) -> Result<Vec<CookbookVersion>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(StoreError::backend("query cookbook versions"))?;
    let rows = stmt
        .query_map(params, VersionRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::backend("query cookbook versions"))?;
    decode_all(rows, codec)
}

/// Every version of a cookbook, newest first.
pub(crate) fn load_versions(
    conn: &Connection,
    prefix: &str,
    codec: &dyn BlobCodec,
    cookbook: &str,
) -> Result<Vec<CookbookVersion>> {
    let sql = format!("{} WHERE c.name = ?1 {NEWEST_FIRST}", select_versions(prefix));
    query_versions(conn, &sql, &[&cookbook], codec)
}

/// One version of a cookbook.
pub(crate) fn load_version(
    conn: &Connection,
    prefix: &str,
    codec: &dyn BlobCodec,
    cookbook: &str,
    version: Version,
) -> Result<Option<CookbookVersion>> {
    let sql = format!(
        "{} WHERE c.name = ?1 AND v.major_ver = ?2 AND v.minor_ver = ?3 AND v.patch_ver = ?4",
        select_versions(prefix)
    );
    let params: [&dyn ToSql; 4] = [&cookbook, &version.major, &version.minor, &version.patch];
    Ok(query_versions(conn, &sql, &params, codec)?.pop())
}

/// The newest version of a cookbook.
pub(crate) fn load_latest_version(
    conn: &Connection,
    prefix: &str,
    codec: &dyn BlobCodec,
    cookbook: &str,
) -> Result<Option<CookbookVersion>> {
    let sql = format!(
        "{} WHERE c.name = ?1 {NEWEST_FIRST} LIMIT 1",
        select_versions(prefix)
    );
    Ok(query_versions(conn, &sql, &[&cookbook], codec)?.pop())
}

pub(crate) fn delete_version_row(conn: &Connection, prefix: &str, id: i64) -> Result<usize> {
    conn.execute(
        &format!("DELETE FROM {prefix}cookbook_versions WHERE id = ?1"),
        params![id],
    )
    .map_err(StoreError::backend("delete cookbook version"))
}

pub(crate) fn delete_versions_of(conn: &Connection, prefix: &str, cookbook_id: i64) -> Result<usize> {
    conn.execute(
        &format!("DELETE FROM {prefix}cookbook_versions WHERE cookbook_id = ?1"),
        params![cookbook_id],
    )
    .map_err(StoreError::backend("delete cookbook versions"))
}

/// Row counts of both tables.
pub(crate) fn table_counts(conn: &Connection, prefix: &str) -> Result<(usize, usize)> {
    let count = |table: &str| -> Result<usize> {
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {prefix}{table}"), [], |row| row.get(0))
            .map_err(StoreError::backend("count rows"))?;
        Ok(n as usize)
    };
    Ok((count("cookbooks")?, count("cookbook_versions")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::policy::AllowOverwrite;
    use crate::schema::generate_schema_sql;
    use serde_json::json;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn.execute_batch(&generate_schema_sql("t_").unwrap()).unwrap();
        conn
    }

    fn save(conn: &Connection, cbv: &CookbookVersion) -> Upserted {
        let encoded = encode_bundle(&JsonCodec, &cbv.bundle).unwrap();
        upsert_version(conn, "t_", cbv, &encoded, &AllowOverwrite).unwrap()
    }

    #[test]
    fn test_upsert_creates_cookbook_then_updates() {
        let conn = conn();
        let cbv = CookbookVersion::parse("nginx", "1.0").unwrap();

        let first = save(&conn, &cbv);
        assert!(first.cookbook_created);
        assert!(first.version_created);

        let second = save(&conn, &cbv.clone().with_frozen(true));
        assert!(!second.cookbook_created);
        assert!(!second.version_created);
        assert_eq!(second.id, first.id);

        let loaded = load_version(&conn, "t_", &JsonCodec, "nginx", Version::new(1, 0, 0))
            .unwrap()
            .unwrap();
        assert!(loaded.frozen);
        assert_eq!(loaded.id, Some(first.id));
        assert_eq!(loaded.cookbook_id, Some(first.cookbook_id));
    }

    #[test]
    fn test_null_blobs_decode_to_empty_values() {
        let conn = conn();
        insert_cookbook(&conn, "t_", "ntp").unwrap();
        conn.execute(
            "INSERT INTO t_cookbook_versions (cookbook_id, major_ver, minor_ver, patch_ver, recipes) \
             VALUES (1, 1, 2, 3, x'6e756c6c')",
            [],
        )
        .unwrap();

        let cbv = load_latest_version(&conn, "t_", &JsonCodec, "ntp").unwrap().unwrap();
        assert_eq!(cbv.version, Version::new(1, 2, 3));
        assert_eq!(cbv.bundle, DocumentBundle::default());
    }

    #[test]
    fn test_corrupt_blob_names_record_and_segment() {
        let conn = conn();
        save(&conn, &CookbookVersion::parse("ntp", "1.0.0").unwrap());
        conn.execute("UPDATE t_cookbook_versions SET templates = x'7b7b'", [])
            .unwrap();

        let err = load_versions(&conn, "t_", &JsonCodec, "ntp").unwrap_err();
        match err {
            StoreError::DecodeFailure { record, reason } => {
                assert_eq!(record, "ntp-1.0.0");
                assert!(reason.starts_with("templates: "), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_out_of_range_component_is_corrupt() {
        let conn = conn();
        insert_cookbook(&conn, "t_", "ntp").unwrap();
        conn.execute(
            "INSERT INTO t_cookbook_versions (cookbook_id, major_ver, minor_ver, patch_ver) \
             VALUES (1, 4294967296, 0, 0)",
            [],
        )
        .unwrap();
        assert!(matches!(
            load_versions(&conn, "t_", &JsonCodec, "ntp"),
            Err(StoreError::DecodeFailure { .. })
        ));
    }

    #[test]
    fn test_counts() {
        let conn = conn();
        assert_eq!(count_versions(&conn, "t_", "nginx").unwrap(), None);

        insert_cookbook(&conn, "t_", "nginx").unwrap();
        assert_eq!(count_versions(&conn, "t_", "nginx").unwrap(), Some(0));

        let cbv = CookbookVersion::parse("nginx", "2.0")
            .unwrap()
            .with_segment(Segment::Files, json!([{"name": "a", "checksum": "1"}]));
        save(&conn, &cbv);
        assert_eq!(count_versions(&conn, "t_", "nginx").unwrap(), Some(1));
        assert_eq!(table_counts(&conn, "t_").unwrap(), (1, 1));
    }
}
