//! The cookbook version store.
//!
//! [`CookbookStore`] performs every read and write against the SQLite tables
//! created by [`Migration`](crate::Migration). Each write is one `IMMEDIATE`
//! transaction, so the probe that decides between update and insert holds
//! the database write lock until the write commits.
//!
//! # Example
//!
//! ```
//! use cookbook_store_core::{CookbookVersion, Segment};
//! use cookbook_store_sqlite::{CookbookStore, Database, Migration};
//! use serde_json::json;
//!
//! let db = Database::open_in_memory().unwrap();
//! Migration::new(&db, "cb_").unwrap().up().unwrap();
//!
//! let store = CookbookStore::new(&db, "cb_").unwrap();
//! let mut cbv = CookbookVersion::parse("apache2", "2.1")
//!     .unwrap()
//!     .with_segment(Segment::Files, json!([{"name": "a.conf", "checksum": "ab12"}]));
//! store.save_version(&mut cbv).unwrap();
//!
//! assert!(store.exists("apache2").unwrap());
//! let loaded = store.get_version("apache2", "2.1.0").unwrap();
//! assert_eq!(loaded.bundle, cbv.bundle);
//!
//! let freed = store.delete_version(&loaded).unwrap();
//! assert_eq!(freed, vec!["ab12"]);
//! ```

use cookbook_store_core::{Cookbook, CookbookVersion, Version, collect_hashes, version_hashes};
use tracing::{debug, info, warn};

use crate::cleanup::{CleanupCandidates, DiscardCleanup, HashCleanup};
use crate::codec::{BlobCodec, JsonCodec};
use crate::convert;
use crate::db::{ConnectionProvider, in_transaction};
use crate::error::{Result, StoreError};
use crate::policy::{AllowOverwrite, SavePolicy};
use crate::schema::validate_prefix;

/// Transactional CRUD over cookbooks and their versions.
///
/// Generic over the [`ConnectionProvider`] so callers choose how the
/// connection is owned: by value, by reference (`&Database`), or shared
/// (`Arc<Database>`).
pub struct CookbookStore<P> {
    provider: P,
    prefix: String,
    codec: Box<dyn BlobCodec + Send + Sync>,
    policy: Box<dyn SavePolicy + Send + Sync>,
    cleanup: Box<dyn HashCleanup + Send + Sync>,
}

impl<P: ConnectionProvider> CookbookStore<P> {
    /// Creates a store over `provider` using tables named with `prefix`.
    ///
    /// Uses [`JsonCodec`], [`AllowOverwrite`] and [`DiscardCleanup`] until
    /// replaced with the `with_*` builders.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPrefix`] if the prefix is invalid.
    pub fn new(provider: P, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self {
            provider,
            prefix,
            codec: Box::new(JsonCodec),
            policy: Box::new(AllowOverwrite),
            cleanup: Box::new(DiscardCleanup),
        })
    }

    /// Replaces the blob codec.
    pub fn with_codec(mut self, codec: impl BlobCodec + Send + Sync + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Replaces the policy consulted by [`save_version`](Self::save_version).
    pub fn with_policy(mut self, policy: impl SavePolicy + Send + Sync + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Replaces the receiver of hashes freed by deletes.
    pub fn with_cleanup(mut self, cleanup: impl HashCleanup + Send + Sync + 'static) -> Self {
        self.cleanup = Box::new(cleanup);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Returns `true` if a cookbook named `name` exists.
    pub fn exists(&self, name: &str) -> Result<bool> {
        self.provider
            .with_connection(|conn| convert::cookbook_exists(conn, &self.prefix, name))
    }

    /// Loads a cookbook with an empty version map.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CookbookNotFound`] if no cookbook has that name.
    pub fn load(&self, name: &str) -> Result<Cookbook> {
        let cookbook = self
            .provider
            .with_connection(|conn| convert::load_cookbook(conn, &self.prefix, name))?;
        cookbook.ok_or_else(|| StoreError::CookbookNotFound(name.to_string()))
    }

    /// Every cookbook name, sorted.
    pub fn list_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = self
            .list_cookbooks()?
            .into_iter()
            .map(|cookbook| cookbook.name)
            .collect();
        Ok(names)
    }

    /// Every cookbook, sorted by name, with empty version maps.
    pub fn list_cookbooks(&self) -> Result<Vec<Cookbook>> {
        let cookbooks = self
            .provider
            .with_connection(|conn| convert::load_cookbooks(conn, &self.prefix))?;
        debug!(count = cookbooks.len(), "listed cookbooks");
        Ok(cookbooks)
    }

    /// Number of stored versions of a cookbook.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CookbookNotFound`] if no cookbook has that name.
    pub fn count_versions(&self, name: &str) -> Result<usize> {
        let count = self
            .provider
            .with_connection(|conn| convert::count_versions(conn, &self.prefix, name))?;
        count.ok_or_else(|| StoreError::CookbookNotFound(name.to_string()))
    }

    /// Every version of a cookbook, newest first.
    ///
    /// An unknown cookbook yields an empty list. A version row that fails to
    /// decode fails the whole listing with [`StoreError::DecodeFailure`].
    pub fn list_versions(&self, name: &str) -> Result<Vec<CookbookVersion>> {
        let versions = self.provider.with_connection(|conn| {
            convert::load_versions(conn, &self.prefix, self.codec.as_ref(), name)
        })?;
        debug!(cookbook = name, count = versions.len(), "listed cookbook versions");
        Ok(versions)
    }

    /// Replaces the cookbook's cached version map with the stored versions.
    pub fn populate_versions(&self, cookbook: &mut Cookbook) -> Result<()> {
        let versions = self.list_versions(&cookbook.name)?;
        cookbook.versions.clear();
        for version in versions {
            cookbook.insert_version(version);
        }
        Ok(())
    }

    /// Fetches one version by its version string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidVersion`] for a malformed version string
    /// and [`StoreError::VersionNotFound`] if no such row exists.
    pub fn get_version(&self, name: &str, version: &str) -> Result<CookbookVersion> {
        let parsed = Version::parse(version)?;
        let found = self.provider.with_connection(|conn| {
            convert::load_version(conn, &self.prefix, self.codec.as_ref(), name, parsed)
        })?;
        debug!(cookbook = name, version = %parsed, found = found.is_some(), "fetched cookbook version");
        found.ok_or_else(|| StoreError::VersionNotFound {
            cookbook: name.to_string(),
            version: parsed.to_string(),
        })
    }

    /// The newest version of a cookbook, if it has any.
    pub fn latest_version(&self, name: &str) -> Result<Option<CookbookVersion>> {
        self.provider.with_connection(|conn| {
            convert::load_latest_version(conn, &self.prefix, self.codec.as_ref(), name)
        })
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Creates the cookbook row, or refreshes it if one with this name exists.
    ///
    /// Sets `cookbook.id` to the stored row's id.
    pub fn save(&self, cookbook: &mut Cookbook) -> Result<()> {
        let (id, created) = self.provider.with_connection(|conn| {
            in_transaction(conn, |tx| {
                match convert::cookbook_id(tx, &self.prefix, &cookbook.name)? {
                    Some(id) => {
                        convert::update_cookbook(tx, &self.prefix, id, &cookbook.name)?;
                        Ok((id, false))
                    }
                    None => Ok((convert::insert_cookbook(tx, &self.prefix, &cookbook.name)?, true)),
                }
            })
        })?;

        cookbook.id = Some(id);
        info!(cookbook = %cookbook.name, id, created, "saved cookbook");
        Ok(())
    }

    /// Inserts or updates one version, creating its cookbook if needed.
    ///
    /// All ten sub-documents are encoded before the transaction opens; an
    /// encode failure leaves the database untouched. On success `version.id`
    /// and `version.cookbook_id` are set.
    ///
    /// # Errors
    ///
    /// [`StoreError::EncodeFailure`] for an unencodable sub-document,
    /// [`StoreError::PolicyViolation`] if the save policy refuses the write,
    /// [`StoreError::ConcurrentConflict`] if a concurrent writer inserted the
    /// same row first.
    pub fn save_version(&self, version: &mut CookbookVersion) -> Result<()> {
        let encoded = convert::encode_bundle(self.codec.as_ref(), &version.bundle)?;

        let upserted = self.provider.with_connection(|conn| {
            in_transaction(conn, |tx| {
                convert::upsert_version(tx, &self.prefix, version, &encoded, self.policy.as_ref())
            })
        })?;

        version.id = Some(upserted.id);
        version.cookbook_id = Some(upserted.cookbook_id);
        info!(
            cookbook = %version.cookbook_name,
            version = %version.version,
            id = upserted.id,
            created = upserted.version_created,
            cookbook_created = upserted.cookbook_created,
            "saved cookbook version"
        );
        Ok(())
    }

    /// Deletes one version and returns the hashes it referenced.
    ///
    /// The row is found by cookbook name and version triple. Its hashes are
    /// read from the stored row and handed to the cleanup collaborator only
    /// after the delete commits. A stored row that no longer decodes is still
    /// deleted; its hashes are then taken from `version`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionNotFound`] if no such row exists.
    pub fn delete_version(&self, version: &CookbookVersion) -> Result<Vec<String>> {
        let name = version.cookbook_name.as_str();
        let not_found = || StoreError::VersionNotFound {
            cookbook: name.to_string(),
            version: version.version.to_string(),
        };

        let hashes = self.provider.with_connection(|conn| {
            in_transaction(conn, |tx| {
                let cookbook_id =
                    convert::cookbook_id(tx, &self.prefix, name)?.ok_or_else(not_found)?;
                let row = convert::find_version(tx, &self.prefix, cookbook_id, version.version)?
                    .ok_or_else(not_found)?;

                let hashes = match convert::load_version(
                    tx,
                    &self.prefix,
                    self.codec.as_ref(),
                    name,
                    version.version,
                ) {
                    Ok(Some(stored)) => version_hashes(&stored),
                    Ok(None) => version_hashes(version),
                    Err(StoreError::DecodeFailure { record, reason }) => {
                        warn!(
                            record = %record,
                            reason = %reason,
                            "stored version is corrupt; releasing hashes from the caller's copy"
                        );
                        version_hashes(version)
                    }
                    Err(err) => return Err(err),
                };

                convert::delete_version_row(tx, &self.prefix, row.id)?;
                Ok(hashes)
            })
        })?;

        info!(cookbook = name, version = %version.version, hashes = hashes.len(), "deleted cookbook version");
        self.release(name, Some(version.version), &hashes);
        Ok(hashes)
    }

    /// Deletes a cookbook and all of its versions.
    ///
    /// In one transaction: reads every stored version to collect the union of
    /// their hashes, deletes the version rows, then the cookbook row. The
    /// sorted hash set goes to the cleanup collaborator only after commit,
    /// and is also returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CookbookNotFound`] if no cookbook has that name.
    /// Any failure rolls back every delete and releases nothing.
    pub fn delete_cookbook(&self, cookbook: &Cookbook) -> Result<Vec<String>> {
        let name = cookbook.name.as_str();
        let (hashes, removed) = self.provider.with_connection(|conn| {
            in_transaction(conn, |tx| {
                let id = convert::cookbook_id(tx, &self.prefix, name)?
                    .ok_or_else(|| StoreError::CookbookNotFound(name.to_string()))?;

                let versions = convert::load_versions(tx, &self.prefix, self.codec.as_ref(), name)?;
                let hashes = collect_hashes(&versions);

                let removed = convert::delete_versions_of(tx, &self.prefix, id)?;
                if convert::delete_cookbook_row(tx, &self.prefix, id)? == 0 {
                    return Err(StoreError::CookbookNotFound(name.to_string()));
                }
                Ok((hashes, removed))
            })
        })?;

        info!(cookbook = name, versions = removed, hashes = hashes.len(), "deleted cookbook");
        self.release(name, None, &hashes);
        Ok(hashes)
    }

    fn release(&self, cookbook: &str, version: Option<Version>, hashes: &[String]) {
        if hashes.is_empty() {
            return;
        }
        self.cleanup.release(CleanupCandidates {
            cookbook: cookbook.to_string(),
            version,
            hashes: hashes.to_vec(),
        });
    }
}
