//! Core cookbook types, version codec and content-hash tracking.
//!
//! This crate defines the domain model of the cookbook catalog:
//!
//! - [`Cookbook`]: a named artifact with a lazily populated map of versions.
//! - [`CookbookVersion`]: one revision, identified by cookbook name and
//!   [`Version`], carrying ten structured sub-documents in a
//!   [`DocumentBundle`].
//! - [`Version`]: the `(major, minor, patch)` triple, parsed from and
//!   rendered to dotted strings.
//!
//! [`collect_hashes`] and [`version_hashes`] compute the content hashes a set
//! of versions references, which become garbage-collection candidates when
//! those versions are deleted. Validation ([`validate_version`],
//! [`validate_versions`]) catches malformed documents before import.
//!
//! Nothing here performs I/O; persistence lives in `cookbook-store-sqlite`.
//!
//! # Example
//!
//! ```
//! use cookbook_store_core::*;
//! use serde_json::json;
//!
//! let cbv = CookbookVersion::parse("apache2", "2.1")
//!     .unwrap()
//!     .with_segment(Segment::Recipes, json!([
//!         {"name": "default.rb", "path": "recipes/default.rb", "checksum": "9a7e"},
//!     ]));
//!
//! assert_eq!(cbv.name(), "apache2-2.1.0");
//! assert_eq!(version_hashes(&cbv), vec!["9a7e"]);
//! assert!(validate_version(&cbv).is_empty());
//! ```

mod hashes;
mod types;
mod validate;
mod version;

pub use hashes::{CHECKSUM_FIELD, collect_hashes, version_hashes};
pub use types::*;
pub use validate::{ValidationError, is_valid_cookbook_name, validate_version, validate_versions};
pub use version::{Version, VersionError};
