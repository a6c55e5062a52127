//! Cookbook version document loading.
//!
//! Provides [`VersionDocuments`], an ordered in-memory collection of cookbook
//! version documents keyed by `(cookbook, version)`, loaded from a directory
//! of JSON files, a single [`VersionBundle`], or an explicit list of files.
//!
//! # Loading patterns
//!
//! ```no_run
//! use cookbook_store_db::VersionDocuments;
//!
//! // One Chef cookbook-version document per *.json file
//! let docs = VersionDocuments::from_dir("seed/").unwrap();
//! assert!(docs.get("apache2", "2.1.0").is_some());
//!
//! // A bundle written by `cookbook-store export`
//! let docs = VersionDocuments::from_bundle("cookbooks.json").unwrap();
//! for cbv in docs.iter() {
//!     println!("{}", cbv.name());
//! }
//! ```
//!
//! A later document with the same identity replaces an earlier one.

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use cookbook_store_core::{CookbookVersion, Version};
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};

/// Describes where a [`VersionDocuments`] collection was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// A directory of individual JSON documents.
    Directory(PathBuf),
    /// A single [`VersionBundle`] JSON file.
    Bundle(PathBuf),
    /// An explicit list of document files.
    Files(Vec<PathBuf>),
}

/// A set of cookbook versions serialized as one JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionBundle {
    /// RFC 3339 timestamp of when the bundle was written.
    pub generated_at: String,
    #[serde(default)]
    pub versions: Vec<CookbookVersion>,
}

impl VersionBundle {
    pub fn new(generated_at: impl Into<String>) -> Self {
        Self {
            generated_at: generated_at.into(),
            versions: Vec::new(),
        }
    }

    /// Reads a bundle from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::IoError`] if the file cannot be opened, or
    /// [`DatabaseError::InvalidDocument`] if it is not a valid bundle.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| invalid(path, e))
    }

    /// Writes the bundle as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// Reads one cookbook version document from a JSON file.
///
/// # Errors
///
/// Returns [`DatabaseError::IoError`] if the file cannot be opened, or
/// [`DatabaseError::InvalidDocument`] if it is not valid JSON, lacks a
/// required key, or carries an unparsable version.
pub fn read_document(path: impl AsRef<Path>) -> Result<CookbookVersion> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| invalid(path, e))
}

fn invalid(path: &Path, err: serde_json::Error) -> DatabaseError {
    DatabaseError::InvalidDocument {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Ordered collection of cookbook version documents.
#[derive(Debug)]
pub struct VersionDocuments {
    documents: BTreeMap<(String, Version), CookbookVersion>,
    source: DocumentSource,
}

impl VersionDocuments {
    /// Loads every `*.json` file in a directory.
    ///
    /// Files are read in name order, so for duplicate identities the
    /// document in the last file (by name) wins.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::IoError`] if the directory cannot be read or
    /// a file cannot be opened, or [`DatabaseError::InvalidDocument`] if any
    /// file is not a valid document.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.is_file() && file_path.extension().and_then(|e| e.to_str()) == Some("json")
            {
                files.push(file_path);
            }
        }
        files.sort();

        let mut docs = Self::empty(DocumentSource::Directory(path.to_path_buf()));
        for file in &files {
            docs.insert(read_document(file)?);
        }
        Ok(docs)
    }

    /// Loads the versions of a [`VersionBundle`] file.
    pub fn from_bundle(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bundle = VersionBundle::load(path)?;

        let mut docs = Self::empty(DocumentSource::Bundle(path.to_path_buf()));
        for version in bundle.versions {
            docs.insert(version);
        }
        Ok(docs)
    }

    /// Loads an explicit list of document files, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NoSourcesAvailable`] for an empty list, and
    /// otherwise the errors of [`read_document`].
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        if paths.is_empty() {
            return Err(DatabaseError::NoSourcesAvailable);
        }

        let source = DocumentSource::Files(paths.iter().map(|p| p.as_ref().to_path_buf()).collect());
        let mut docs = Self::empty(source);
        for path in paths {
            docs.insert(read_document(path)?);
        }
        Ok(docs)
    }

    fn empty(source: DocumentSource) -> Self {
        Self {
            documents: BTreeMap::new(),
            source,
        }
    }

    /// Inserts a document, replacing any entry with the same identity.
    pub fn insert(&mut self, version: CookbookVersion) {
        let key = (version.cookbook_name.clone(), version.version);
        self.documents.insert(key, version);
    }

    /// Looks up a document by cookbook name and version string.
    pub fn get(&self, cookbook: &str, version: &str) -> Option<&CookbookVersion> {
        let version = Version::parse(version).ok()?;
        self.documents.get(&(cookbook.to_string(), version))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Iterates documents in `(cookbook, version)` order, oldest version first.
    pub fn iter(&self) -> impl Iterator<Item = &CookbookVersion> {
        self.documents.values()
    }

    /// Distinct cookbook names, sorted.
    pub fn cookbooks(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.documents.keys().map(|(name, _)| name.as_str()).collect();
        names.dedup();
        names
    }

    /// Consumes the collection, returning the documents in order.
    pub fn into_versions(self) -> Vec<CookbookVersion> {
        self.documents.into_values().collect()
    }

    /// Returns where the documents were loaded from.
    pub fn source(&self) -> &DocumentSource {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookbook_store_core::Segment;
    use serde_json::json;

    fn write_document(dir: &Path, file: &str, cbv: &CookbookVersion) {
        let f = std::fs::File::create(dir.join(file)).unwrap();
        serde_json::to_writer_pretty(f, cbv).unwrap();
    }

    #[test]
    fn test_from_dir_orders_by_identity() {
        let dir = tempfile::tempdir().unwrap();
        write_document(dir.path(), "b.json", &CookbookVersion::parse("nginx", "2.0").unwrap());
        write_document(dir.path(), "a.json", &CookbookVersion::parse("nginx", "1.0").unwrap());
        write_document(dir.path(), "c.json", &CookbookVersion::parse("apache2", "1.0").unwrap());
        std::fs::write(dir.path().join("README.md"), "not a document").unwrap();

        let docs = VersionDocuments::from_dir(dir.path()).unwrap();
        let names: Vec<String> = docs.iter().map(CookbookVersion::name).collect();
        assert_eq!(names, vec!["apache2-1.0.0", "nginx-1.0.0", "nginx-2.0.0"]);
        assert_eq!(docs.cookbooks(), vec!["apache2", "nginx"]);
        assert_eq!(docs.source(), &DocumentSource::Directory(dir.path().to_path_buf()));
    }

    #[test]
    fn test_later_duplicate_replaces_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let first = CookbookVersion::parse("ntp", "1.0.0").unwrap();
        let second = CookbookVersion::parse("ntp", "1.0")
            .unwrap()
            .with_segment(Segment::Recipes, json!([{"name": "default.rb"}]));
        write_document(dir.path(), "01.json", &first);
        write_document(dir.path(), "02.json", &second);

        let docs = VersionDocuments::from_dir(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs.get("ntp", "1.0.0").unwrap(), &second);
    }

    #[test]
    fn test_invalid_document_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"cookbook_name": "x", "version": "1.x"}"#).unwrap();

        let err = VersionDocuments::from_dir(dir.path()).unwrap_err();
        match err {
            DatabaseError::InvalidDocument { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_files_requires_a_path() {
        let none: [&Path; 0] = [];
        assert!(matches!(
            VersionDocuments::from_files(&none),
            Err(DatabaseError::NoSourcesAvailable)
        ));
    }

    #[test]
    fn test_bundle_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");

        let mut bundle = VersionBundle::new("2024-01-01T00:00:00Z");
        bundle.versions.push(CookbookVersion::parse("git", "3.1").unwrap());
        bundle.save(&path).unwrap();

        let docs = VersionDocuments::from_bundle(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs.get("git", "3.1.0").is_some());
        assert!(docs.get("git", "nonsense").is_none());
    }
}
