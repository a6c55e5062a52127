//! Migration lifecycle operations for the SQLite schema.
//!
//! Provides [`Migration`] for creating, dropping, seeding, and refreshing
//! the cookbook tables. All mutation operations use transactions to ensure
//! atomicity.
//!
//! # Example
//!
//! ```no_run
//! use cookbook_store_sqlite::{Database, Migration};
//!
//! let db = Database::open("cookbooks.db", std::time::Duration::from_secs(5)).unwrap();
//! let migration = Migration::new(&db, "cb_").unwrap();
//!
//! // Create tables
//! migration.up().unwrap();
//!
//! // Seed from a directory of cookbook version documents
//! let report = migration.seed("seed/").unwrap();
//! println!("inserted {} versions", report.versions_inserted);
//!
//! // Drop, recreate and seed again
//! migration.refresh("seed/").unwrap();
//! ```

use std::path::Path;

use cookbook_store_core::CookbookVersion;
use cookbook_store_db::VersionDocuments;
use rusqlite::{OptionalExtension, params};
use tracing::info;

use crate::codec::{BlobCodec, JsonCodec};
use crate::convert;
use crate::db::{ConnectionProvider, in_transaction};
use crate::error::{Result, StoreError};
use crate::policy::AllowOverwrite;
use crate::schema::{generate_drop_sql, generate_schema_sql, validate_prefix};

/// Manages the lifecycle of the cookbook tables.
///
/// Provides operations to create tables ([`up`](Self::up)), drop them
/// ([`down`](Self::down)), seed them from documents ([`seed`](Self::seed)),
/// and check the current state ([`status`](Self::status)).
pub struct Migration<P> {
    provider: P,
    prefix: String,
    codec: Box<dyn BlobCodec + Send + Sync>,
}

impl<P: ConnectionProvider> Migration<P> {
    /// Creates a migration manager for the given provider and table prefix.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPrefix`] if the prefix contains invalid characters.
    pub fn new(provider: P, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self {
            provider,
            prefix,
            codec: Box::new(JsonCodec),
        })
    }

    /// Replaces the codec used to encode seeded documents.
    pub fn with_codec(mut self, codec: impl BlobCodec + Send + Sync + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Creates both tables and the index.
    ///
    /// Uses `CREATE TABLE IF NOT EXISTS` so it is safe to call multiple times.
    pub fn up(&self) -> Result<()> {
        let sql = generate_schema_sql(&self.prefix)?;
        self.provider.with_connection(|conn| {
            in_transaction(conn, |tx| {
                tx.execute_batch(&sql)
                    .map_err(|e| StoreError::MigrationError(format!("failed to create tables: {e}")))
            })
        })?;
        info!(prefix = %self.prefix, "created cookbook tables");
        Ok(())
    }

    /// Drops both tables.
    ///
    /// Uses `DROP TABLE IF EXISTS` so it is safe to call even if the tables
    /// do not exist.
    pub fn down(&self) -> Result<()> {
        let sql = generate_drop_sql(&self.prefix)?;
        self.provider.with_connection(|conn| {
            in_transaction(conn, |tx| {
                tx.execute_batch(&sql)
                    .map_err(|e| StoreError::MigrationError(format!("failed to drop tables: {e}")))
            })
        })?;
        info!(prefix = %self.prefix, "dropped cookbook tables");
        Ok(())
    }

    /// Reports whether the tables exist and how many rows they hold.
    pub fn status(&self) -> Result<MigrationStatus> {
        self.provider.with_connection(|conn| {
            let table = format!("{}cookbook_versions", self.prefix);
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::backend("read schema"))?;

            if found.is_none() {
                return Ok(MigrationStatus::default());
            }

            let (cookbook_count, version_count) = convert::table_counts(conn, &self.prefix)?;
            Ok(MigrationStatus {
                tables_exist: true,
                cookbook_count,
                version_count,
            })
        })
    }

    /// Seeds the tables from a directory of documents or a bundle file.
    ///
    /// A directory is read with [`VersionDocuments::from_dir`], anything else
    /// with [`VersionDocuments::from_bundle`]. Every document is encoded first,
    /// then all of them are upserted in a single transaction: either every
    /// document lands or none does.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LoaderError`] if the source cannot be read,
    /// [`StoreError::EncodeFailure`] if a document cannot be encoded, or a
    /// backend error if a write fails.
    pub fn seed(&self, source: impl AsRef<Path>) -> Result<SeedReport> {
        let source = source.as_ref();
        let docs = if source.is_dir() {
            VersionDocuments::from_dir(source)?
        } else {
            VersionDocuments::from_bundle(source)?
        };
        let report = self.seed_versions(docs.into_versions())?;
        info!(
            source = %source.display(),
            versions = report.versions_inserted + report.versions_updated,
            "seeded cookbook tables"
        );
        Ok(report)
    }

    /// Upserts the given versions in a single transaction.
    pub fn seed_versions(&self, versions: Vec<CookbookVersion>) -> Result<SeedReport> {
        let encoded = versions
            .iter()
            .map(|version| convert::encode_bundle(self.codec.as_ref(), &version.bundle))
            .collect::<Result<Vec<_>>>()?;

        self.provider.with_connection(|conn| {
            in_transaction(conn, |tx| {
                let mut report = SeedReport::default();
                for (version, encoded) in versions.iter().zip(&encoded) {
                    let upserted =
                        convert::upsert_version(tx, &self.prefix, version, encoded, &AllowOverwrite)?;
                    report.record(&upserted);
                }
                Ok(report)
            })
        })
    }

    /// Drops the tables, recreates them, and seeds from `source`.
    ///
    /// Equivalent to calling [`down`](Self::down), [`up`](Self::up), then
    /// [`seed`](Self::seed) in sequence.
    pub fn refresh(&self, source: impl AsRef<Path>) -> Result<SeedReport> {
        self.down()?;
        self.up()?;
        self.seed(source)
    }

    /// Consumes the migration and returns the provider.
    pub fn into_provider(self) -> P {
        self.provider
    }
}

/// Snapshot returned by [`Migration::status`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Whether the cookbook tables exist in the database.
    pub tables_exist: bool,
    /// Number of cookbook rows.
    pub cookbook_count: usize,
    /// Number of cookbook version rows.
    pub version_count: usize,
}

/// Counts of what a seed wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub cookbooks_created: usize,
    pub versions_inserted: usize,
    pub versions_updated: usize,
}

impl SeedReport {
    fn record(&mut self, upserted: &convert::Upserted) {
        if upserted.cookbook_created {
            self.cookbooks_created += 1;
        }
        if upserted.version_created {
            self.versions_inserted += 1;
        } else {
            self.versions_updated += 1;
        }
    }
}
