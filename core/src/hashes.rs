//! Content-hash reference tracking.
//!
//! File-manifest entries reference externally stored file content by hash
//! (the `checksum` field of each entry). When versions are deleted, the
//! hashes they referenced become candidates for an external
//! reference-counting collector. These helpers compute that candidate set:
//! deduplicated and sorted, without touching any backend.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::types::{CookbookVersion, Segment};

/// Manifest entry field holding the content hash.
pub const CHECKSUM_FIELD: &str = "checksum";

/// Returns the sorted, deduplicated hashes referenced by one version.
///
/// # Examples
///
/// ```
/// use cookbook_store_core::{CookbookVersion, Segment, Version, version_hashes};
/// use serde_json::json;
///
/// let cbv = CookbookVersion::new("ntp", Version::new(1, 0, 0))
///     .with_segment(Segment::Recipes, json!([
///         {"name": "default.rb", "checksum": "bbb"},
///         {"name": "server.rb", "checksum": "aaa"},
///     ]))
///     .with_segment(Segment::Files, json!([{"name": "ntp.conf", "checksum": "aaa"}]));
/// assert_eq!(version_hashes(&cbv), vec!["aaa", "bbb"]);
/// ```
pub fn version_hashes(version: &CookbookVersion) -> Vec<String> {
    collect_hashes(std::iter::once(version))
}

/// Returns the union of hashes referenced by `versions`, sorted and
/// deduplicated.
pub fn collect_hashes<'a, I>(versions: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a CookbookVersion>,
{
    let mut hashes = BTreeSet::new();
    for version in versions {
        for segment in Segment::MANIFESTS {
            extend_from_manifest(&mut hashes, version.bundle.get(segment));
        }
    }
    hashes.into_iter().collect()
}

fn extend_from_manifest(hashes: &mut BTreeSet<String>, manifest: &Value) {
    let Some(entries) = manifest.as_array() else {
        return;
    };
    for entry in entries {
        match entry.get(CHECKSUM_FIELD).and_then(Value::as_str) {
            Some(hash) if !hash.is_empty() => {
                hashes.insert(hash.to_string());
            }
            _ => {}
        }
    }
}
