//! Cookbook version document validation.
//!
//! The store accepts any structure in the ten sub-documents; these checks
//! are for import paths that want to reject malformed Chef documents before
//! they reach the store: bad cookbook names, manifests that are not lists of
//! file entries, unusable checksums, and non-object metadata.
//!
//! # Examples
//!
//! ```
//! use cookbook_store_core::*;
//! use serde_json::json;
//!
//! let cbv = CookbookVersion::new("apache2", Version::new(1, 0, 0))
//!     .with_segment(Segment::Recipes, json!([{"name": "default.rb", "checksum": "0f3c"}]));
//! assert!(validate_version(&cbv).is_empty());
//!
//! // A manifest must be a list
//! let bad = CookbookVersion::new("apache2", Version::new(1, 0, 0))
//!     .with_segment(Segment::Files, json!({"name": "x"}));
//! assert!(!validate_version(&bad).is_empty());
//! ```

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;

use crate::hashes::CHECKSUM_FIELD;
use crate::{CookbookVersion, Segment, Version};

/// Cookbook version validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Cookbook name is empty or whitespace-only.
    #[error("cookbook name cannot be empty")]
    EmptyCookbookName,
    /// Cookbook name contains characters outside `[A-Za-z0-9_.-]`.
    #[error("invalid cookbook name: {0}")]
    InvalidCookbookName(String),
    /// Two documents in one batch share a cookbook name and version.
    #[error("duplicate cookbook version: {0}")]
    DuplicateVersion(String),
    /// A manifest segment is not a list.
    #[error("{0} must be a list of file entries")]
    ManifestNotList(Segment),
    /// A manifest entry is not an object.
    #[error("{segment}[{index}] must be an object")]
    EntryNotObject { segment: Segment, index: usize },
    /// A manifest entry lacks a string `name`.
    #[error("{segment}[{index}] is missing a name")]
    EntryMissingName { segment: Segment, index: usize },
    /// A manifest entry's checksum is not a hex string.
    #[error("{segment}[{index}] has an invalid checksum")]
    InvalidChecksum { segment: Segment, index: usize },
    /// Metadata is not an object.
    #[error("metadata must be an object")]
    MetadataNotObject,
}

/// Validates a batch of cookbook versions.
///
/// Rejects two entries with the same `(cookbook, version)` identity, then
/// validates each version. Stops at the first failing version.
pub fn validate_versions<'a, I>(versions: I) -> Vec<ValidationError>
where
    I: IntoIterator<Item = &'a CookbookVersion>,
{
    let mut errors = Vec::new();
    let mut seen: HashSet<(&str, Version)> = HashSet::new();

    for version in versions {
        if !seen.insert((version.cookbook_name.as_str(), version.version)) {
            errors.push(ValidationError::DuplicateVersion(version.name()));
            return errors;
        }
        errors.extend(validate_version(version));
        if !errors.is_empty() {
            return errors;
        }
    }

    errors
}

/// Validates one cookbook version document.
///
/// Reports every problem found in the manifests rather than stopping at the
/// first, so an import can show the full list.
pub fn validate_version(version: &CookbookVersion) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let name = version.cookbook_name.trim();
    if name.is_empty() {
        errors.push(ValidationError::EmptyCookbookName);
        return errors;
    }
    if !is_valid_cookbook_name(&version.cookbook_name) {
        errors.push(ValidationError::InvalidCookbookName(
            version.cookbook_name.clone(),
        ));
        return errors;
    }

    for segment in Segment::MANIFESTS {
        errors.extend(validate_manifest(segment, version.bundle.get(segment)));
    }

    if !version.bundle.metadata.is_object() {
        errors.push(ValidationError::MetadataNotObject);
    }

    errors
}

/// Returns `true` if `name` only uses ASCII alphanumerics, `_`, `-` and `.`.
pub fn is_valid_cookbook_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn validate_manifest(segment: Segment, manifest: &Value) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let Some(entries) = manifest.as_array() else {
        errors.push(ValidationError::ManifestNotList(segment));
        return errors;
    };

    for (index, entry) in entries.iter().enumerate() {
        let Some(fields) = entry.as_object() else {
            errors.push(ValidationError::EntryNotObject { segment, index });
            continue;
        };
        if !fields.get("name").is_some_and(Value::is_string) {
            errors.push(ValidationError::EntryMissingName { segment, index });
        }
        if let Some(checksum) = fields.get(CHECKSUM_FIELD) {
            let valid = checksum
                .as_str()
                .is_some_and(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit()));
            if !valid {
                errors.push(ValidationError::InvalidChecksum { segment, index });
            }
        }
    }

    errors
}
