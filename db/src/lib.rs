//! Settings resolution and document loading for the cookbook store.
//!
//! This crate provides the file-facing side of the store: resolving
//! [`Settings`] from defaults, a YAML file, the environment and command-line
//! overrides, and loading Chef cookbook-version documents from directories,
//! explicit file lists and [`VersionBundle`] files.
//!
//! # Quick start
//!
//! ```no_run
//! use cookbook_store_db::{Overrides, Settings, VersionDocuments};
//!
//! let settings = Settings::load(None, &Overrides::default()).unwrap();
//! println!("store at {}", settings.database.display());
//!
//! let docs = VersionDocuments::from_dir("seed/").unwrap();
//! println!("{} cookbook versions across {:?}", docs.len(), docs.cookbooks());
//! ```

mod config;
mod error;
mod loader;

pub use config::{
    ENV_BUSY_TIMEOUT_MS, ENV_DATABASE, ENV_LOG, ENV_PREFIX, LogFormat, Overrides, Settings,
    SettingsFile,
};
pub use error::{DatabaseError, Result};
pub use loader::{DocumentSource, VersionBundle, VersionDocuments, read_document};
