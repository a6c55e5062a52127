//! Cookbook and cookbook version type definitions.
//!
//! A [`Cookbook`] is a named artifact; each [`CookbookVersion`] is one
//! revision of it, carrying ten structured sub-documents grouped in a
//! [`DocumentBundle`]. The types serialize to the Chef cookbook-version JSON
//! document so they can round-trip through files, bundles and the SQLite
//! store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::version::{Version, VersionError};

/// Fixed `chef_type` tag carried by every cookbook version document.
pub const CHEF_TYPE: &str = "cookbook_version";

/// Fixed `json_class` tag carried by every cookbook version document.
pub const JSON_CLASS: &str = "Chef::CookbookVersion";

/// One of the ten structured sub-documents of a cookbook version.
///
/// All segments except [`Segment::Metadata`] are file manifests: sequences
/// of entries describing files, each of which may reference a content hash
/// through its `checksum` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Definitions,
    Libraries,
    Attributes,
    Recipes,
    Providers,
    Resources,
    Templates,
    RootFiles,
    Files,
    Metadata,
}

impl Segment {
    /// Every segment, in storage column order.
    pub const ALL: [Segment; 10] = [
        Segment::Definitions,
        Segment::Libraries,
        Segment::Attributes,
        Segment::Recipes,
        Segment::Providers,
        Segment::Resources,
        Segment::Templates,
        Segment::RootFiles,
        Segment::Files,
        Segment::Metadata,
    ];

    /// The file-manifest segments (everything but metadata).
    pub const MANIFESTS: [Segment; 9] = [
        Segment::Definitions,
        Segment::Libraries,
        Segment::Attributes,
        Segment::Recipes,
        Segment::Providers,
        Segment::Resources,
        Segment::Templates,
        Segment::RootFiles,
        Segment::Files,
    ];

    /// Column name used by the relational store; also the document key.
    pub fn column(&self) -> &'static str {
        match self {
            Segment::Definitions => "definitions",
            Segment::Libraries => "libraries",
            Segment::Attributes => "attributes",
            Segment::Recipes => "recipes",
            Segment::Providers => "providers",
            Segment::Resources => "resources",
            Segment::Templates => "templates",
            Segment::RootFiles => "root_files",
            Segment::Files => "files",
            Segment::Metadata => "metadata",
        }
    }

    /// Returns `true` for file-manifest segments.
    pub fn is_manifest(&self) -> bool {
        !matches!(self, Segment::Metadata)
    }

    /// The normalized empty value for this segment.
    pub fn empty_value(&self) -> Value {
        if self.is_manifest() {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// The ten structured sub-documents of a cookbook version.
///
/// Stored as ten separate columns but handled as one value, so that encoding
/// and decoding happen in a single pass over [`Segment::ALL`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBundle {
    #[serde(default = "empty_array")]
    pub definitions: Value,
    #[serde(default = "empty_array")]
    pub libraries: Value,
    #[serde(default = "empty_array")]
    pub attributes: Value,
    #[serde(default = "empty_array")]
    pub recipes: Value,
    #[serde(default = "empty_array")]
    pub providers: Value,
    #[serde(default = "empty_array")]
    pub resources: Value,
    #[serde(default = "empty_array")]
    pub templates: Value,
    #[serde(default = "empty_array")]
    pub root_files: Value,
    #[serde(default = "empty_array")]
    pub files: Value,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Default for DocumentBundle {
    fn default() -> Self {
        Self {
            definitions: empty_array(),
            libraries: empty_array(),
            attributes: empty_array(),
            recipes: empty_array(),
            providers: empty_array(),
            resources: empty_array(),
            templates: empty_array(),
            root_files: empty_array(),
            files: empty_array(),
            metadata: empty_object(),
        }
    }
}

impl DocumentBundle {
    /// Returns the sub-document for `segment`.
    pub fn get(&self, segment: Segment) -> &Value {
        match segment {
            Segment::Definitions => &self.definitions,
            Segment::Libraries => &self.libraries,
            Segment::Attributes => &self.attributes,
            Segment::Recipes => &self.recipes,
            Segment::Providers => &self.providers,
            Segment::Resources => &self.resources,
            Segment::Templates => &self.templates,
            Segment::RootFiles => &self.root_files,
            Segment::Files => &self.files,
            Segment::Metadata => &self.metadata,
        }
    }

    /// Returns a mutable reference to the sub-document for `segment`.
    pub fn get_mut(&mut self, segment: Segment) -> &mut Value {
        match segment {
            Segment::Definitions => &mut self.definitions,
            Segment::Libraries => &mut self.libraries,
            Segment::Attributes => &mut self.attributes,
            Segment::Recipes => &mut self.recipes,
            Segment::Providers => &mut self.providers,
            Segment::Resources => &mut self.resources,
            Segment::Templates => &mut self.templates,
            Segment::RootFiles => &mut self.root_files,
            Segment::Files => &mut self.files,
            Segment::Metadata => &mut self.metadata,
        }
    }

    /// Replaces the sub-document for `segment`, normalizing `null`.
    pub fn set(&mut self, segment: Segment, value: Value) {
        *self.get_mut(segment) = if value.is_null() {
            segment.empty_value()
        } else {
            value
        };
    }

    /// Iterates over `(segment, value)` pairs in storage column order.
    pub fn iter(&self) -> impl Iterator<Item = (Segment, &Value)> {
        Segment::ALL.into_iter().map(move |s| (s, self.get(s)))
    }

    /// Replaces every `null` sub-document with its empty value.
    pub fn normalize(&mut self) {
        for segment in Segment::ALL {
            let value = self.get_mut(segment);
            if value.is_null() {
                *value = segment.empty_value();
            }
        }
    }
}

/// One revision of a cookbook.
///
/// Identity is `(cookbook, version)`; the store never holds two rows for the
/// same pair. `id` and `cookbook_id` are assigned by the store on first
/// persistence and are `None` for versions that have not been saved.
///
/// # Examples
///
/// ```
/// use cookbook_store_core::{CookbookVersion, Version};
///
/// let cbv = CookbookVersion::new("apache2", Version::new(1, 2, 0));
/// assert_eq!(cbv.name(), "apache2-1.2.0");
/// assert!(!cbv.frozen);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VersionDocument", into = "VersionDocument")]
pub struct CookbookVersion {
    pub id: Option<i64>,
    pub cookbook_id: Option<i64>,
    pub cookbook_name: String,
    pub version: Version,
    /// Policy flag; the store records it but does not enforce it.
    pub frozen: bool,
    pub bundle: DocumentBundle,
}

impl CookbookVersion {
    pub fn new(cookbook_name: impl Into<String>, version: Version) -> Self {
        Self {
            id: None,
            cookbook_id: None,
            cookbook_name: cookbook_name.into(),
            version,
            frozen: false,
            bundle: DocumentBundle::default(),
        }
    }

    /// Parses `version` and builds an unsaved cookbook version.
    ///
    /// # Errors
    ///
    /// Returns a [`VersionError`] if `version` is malformed.
    pub fn parse(cookbook_name: impl Into<String>, version: &str) -> Result<Self, VersionError> {
        Ok(Self::new(cookbook_name, Version::parse(version)?))
    }

    /// Composite name, `"<cookbook>-<version>"`.
    pub fn name(&self) -> String {
        format!("{}-{}", self.cookbook_name, self.version)
    }

    /// Sets the frozen flag.
    pub fn with_frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    /// Sets one sub-document.
    pub fn with_segment(mut self, segment: Segment, value: Value) -> Self {
        self.bundle.set(segment, value);
        self
    }
}

/// Wire form of a cookbook version: the Chef cookbook-version document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionDocument {
    cookbook_name: String,
    version: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_chef_type")]
    chef_type: String,
    #[serde(default = "default_json_class")]
    json_class: String,
    #[serde(rename = "frozen?", default)]
    frozen: bool,
    #[serde(flatten)]
    bundle: DocumentBundle,
}

fn default_chef_type() -> String {
    CHEF_TYPE.to_string()
}

fn default_json_class() -> String {
    JSON_CLASS.to_string()
}

impl TryFrom<VersionDocument> for CookbookVersion {
    type Error = VersionError;

    fn try_from(doc: VersionDocument) -> Result<Self, Self::Error> {
        let mut bundle = doc.bundle;
        bundle.normalize();
        Ok(Self {
            id: None,
            cookbook_id: None,
            cookbook_name: doc.cookbook_name,
            version: Version::parse(&doc.version)?,
            frozen: doc.frozen,
            bundle,
        })
    }
}

impl From<CookbookVersion> for VersionDocument {
    fn from(cbv: CookbookVersion) -> Self {
        Self {
            name: Some(cbv.name()),
            cookbook_name: cbv.cookbook_name,
            version: cbv.version.to_string(),
            chef_type: default_chef_type(),
            json_class: default_json_class(),
            frozen: cbv.frozen,
            bundle: cbv.bundle,
        }
    }
}

/// A named cookbook and a lazily populated map of its versions.
///
/// The map is a cache filled on demand; the store's rows are authoritative.
///
/// # Examples
///
/// ```
/// use cookbook_store_core::{Cookbook, CookbookVersion, Version};
///
/// let mut cb = Cookbook::new("nginx");
/// cb.insert_version(CookbookVersion::new("nginx", Version::new(1, 0, 0)));
/// cb.insert_version(CookbookVersion::new("nginx", Version::new(2, 1, 0)));
/// assert_eq!(cb.latest().unwrap().version.to_string(), "2.1.0");
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cookbook {
    pub id: Option<i64>,
    pub name: String,
    pub versions: BTreeMap<Version, CookbookVersion>,
}

impl Cookbook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            versions: BTreeMap::new(),
        }
    }

    /// Caches a version in the in-memory map, replacing any prior entry.
    pub fn insert_version(&mut self, version: CookbookVersion) {
        self.versions.insert(version.version, version);
    }

    /// Looks up a cached version by its version string.
    pub fn version(&self, version: &str) -> Option<&CookbookVersion> {
        let parsed = Version::parse(version).ok()?;
        self.versions.get(&parsed)
    }

    /// Cached versions, newest first.
    pub fn sorted_versions(&self) -> Vec<&CookbookVersion> {
        self.versions.values().rev().collect()
    }

    /// The newest cached version.
    pub fn latest(&self) -> Option<&CookbookVersion> {
        self.versions.values().next_back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_bundle_is_normalized() {
        let bundle = DocumentBundle::default();
        for (segment, value) in bundle.iter() {
            assert_eq!(value, &segment.empty_value(), "{segment}");
        }
    }

    #[test]
    fn test_set_null_normalizes() {
        let mut bundle = DocumentBundle::default();
        bundle.set(Segment::Recipes, Value::Null);
        bundle.set(Segment::Metadata, Value::Null);
        assert_eq!(bundle.recipes, json!([]));
        assert_eq!(bundle.metadata, json!({}));
    }

    #[test]
    fn test_segments_are_distinct_columns() {
        let mut columns: Vec<&str> = Segment::ALL.iter().map(Segment::column).collect();
        columns.sort_unstable();
        columns.dedup();
        assert_eq!(columns.len(), 10);
        assert!(Segment::MANIFESTS.iter().all(Segment::is_manifest));
        assert!(!Segment::Metadata.is_manifest());
    }

    #[test]
    fn test_document_round_trip() {
        let cbv = CookbookVersion::new("apache2", Version::new(1, 2, 0))
            .with_frozen(true)
            .with_segment(
                Segment::Recipes,
                json!([{"name": "default.rb", "path": "recipes/default.rb", "checksum": "abc123"}]),
            )
            .with_segment(Segment::Metadata, json!({"name": "apache2", "dependencies": {}}));

        let doc = serde_json::to_value(&cbv).unwrap();
        assert_eq!(doc["name"], "apache2-1.2.0");
        assert_eq!(doc["chef_type"], CHEF_TYPE);
        assert_eq!(doc["json_class"], JSON_CLASS);
        assert_eq!(doc["frozen?"], true);
        assert_eq!(doc["version"], "1.2.0");

        let back: CookbookVersion = serde_json::from_value(doc).unwrap();
        assert_eq!(back, cbv);
    }

    #[test]
    fn test_document_missing_segments_default() {
        let doc = json!({
            "cookbook_name": "ntp",
            "version": "0.3",
            "recipes": null
        });
        let cbv: CookbookVersion = serde_json::from_value(doc).unwrap();
        assert_eq!(cbv.version, Version::new(0, 3, 0));
        assert_eq!(cbv.bundle, DocumentBundle::default());
        assert!(!cbv.frozen);
    }

    #[test]
    fn test_document_rejects_bad_version() {
        let doc = json!({"cookbook_name": "ntp", "version": "one.two"});
        assert!(serde_json::from_value::<CookbookVersion>(doc).is_err());
    }

    #[test]
    fn test_cookbook_sorted_versions() {
        let mut cb = Cookbook::new("mysql");
        for v in ["1.0.0", "2.1.0", "1.5.3"] {
            cb.insert_version(CookbookVersion::parse("mysql", v).unwrap());
        }
        let order: Vec<String> = cb
            .sorted_versions()
            .iter()
            .map(|v| v.version.to_string())
            .collect();
        assert_eq!(order, vec!["2.1.0", "1.5.3", "1.0.0"]);
        assert!(cb.version("1.5.3").is_some());
        assert!(cb.version("1.5").is_none());
        assert!(cb.version("bogus").is_none());
    }
}
