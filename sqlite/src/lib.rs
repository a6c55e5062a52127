//! SQLite cookbook version store.
//!
//! Durable storage for cookbooks and their versions: transactional
//! create-or-update, newest-first listings, and cascading deletes that hand
//! the content hashes they free to a cleanup collaborator only after commit.
//!
//! # Architecture
//!
//! - **`db`**: [`ConnectionProvider`] and the [`Database`] it is usually backed by
//! - **`codec`**: [`BlobCodec`] for the ten sub-document columns
//! - **`schema`**: SQL generation with customizable table prefixes
//! - **`migration`**: Lifecycle operations (up/down/seed/refresh/status)
//! - **`convert`**: Cookbook types ↔ SQL rows
//! - **`store`**: [`CookbookStore`], the runtime read/write interface
//! - **`policy`** / **`cleanup`**: the collaborators a store consults on
//!   save and notifies on delete
//!
//! # Quick start
//!
//! ```
//! use std::sync::mpsc;
//!
//! use cookbook_store_core::{CookbookVersion, Segment};
//! use cookbook_store_sqlite::{
//!     CleanupCandidates, CookbookStore, Database, Migration, RejectFrozenOverwrite,
//! };
//! use serde_json::json;
//!
//! let db = Database::open_in_memory().unwrap();
//! Migration::new(&db, "cb_").unwrap().up().unwrap();
//!
//! let (tx, rx) = mpsc::channel::<CleanupCandidates>();
//! let store = CookbookStore::new(&db, "cb_")
//!     .unwrap()
//!     .with_policy(RejectFrozenOverwrite)
//!     .with_cleanup(tx);
//!
//! for (version, hash) in [("1.0.0", "aa"), ("1.1.0", "bb")] {
//!     let mut cbv = CookbookVersion::parse("ntp", version)
//!         .unwrap()
//!         .with_segment(Segment::Files, json!([{"name": "ntp.conf", "checksum": hash}]));
//!     store.save_version(&mut cbv).unwrap();
//! }
//!
//! let newest: Vec<String> = store
//!     .list_versions("ntp")
//!     .unwrap()
//!     .iter()
//!     .map(|v| v.version.to_string())
//!     .collect();
//! assert_eq!(newest, ["1.1.0", "1.0.0"]);
//!
//! let cookbook = store.load("ntp").unwrap();
//! store.delete_cookbook(&cookbook).unwrap();
//! assert_eq!(rx.recv().unwrap().hashes, ["aa", "bb"]);
//! assert!(!store.exists("ntp").unwrap());
//! ```
//!
//! # Table prefix customization
//!
//! Both table names and the index name are prefixed with a configurable
//! string, allowing multiple isolated stores within the same SQLite
//! database. Prefixes must contain only alphanumeric characters and
//! underscores.

mod cleanup;
mod codec;
mod convert;
mod db;
mod error;
mod migration;
mod policy;
mod schema;
mod store;

pub use cleanup::{CleanupCandidates, DiscardCleanup, HashCleanup};
pub use codec::{BlobCodec, CodecError, JsonCodec, MAX_NESTING_DEPTH};
pub use db::{ConnectionProvider, DEFAULT_BUSY_TIMEOUT, Database, IN_MEMORY};
pub use error::{Result, StoreError};
pub use migration::{Migration, MigrationStatus, SeedReport};
pub use policy::{AllowOverwrite, ExistingVersion, RejectFrozenOverwrite, SavePolicy};
pub use schema::{generate_drop_sql, generate_schema_sql};
pub use store::CookbookStore;
