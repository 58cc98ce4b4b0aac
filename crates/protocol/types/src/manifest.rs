//! Path manifests.

use crate::ManifestError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A path manifest: a JSON document mapping relative paths to transaction ids.
///
/// ```json
/// {
///   "manifest": "arweave/paths",
///   "version": "0.1.0",
///   "index": { "path": "index.html" },
///   "paths": { "index.html": { "id": "cG7Hdi..." } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathManifest {
    /// The manifest kind. Always [`PathManifest::KIND`].
    pub manifest: String,
    /// The manifest version.
    pub version: String,
    /// The path served for the manifest root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<ManifestIndex>,
    /// Relative paths and the transactions they resolve to.
    #[serde(default)]
    pub paths: BTreeMap<String, ManifestPath>,
}

/// The index entry of a [`PathManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestIndex {
    /// A key of [`PathManifest::paths`].
    pub path: String,
}

/// A path entry of a [`PathManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPath {
    /// The transaction the path resolves to.
    pub id: String,
}

impl PathManifest {
    /// The only supported manifest kind.
    pub const KIND: &'static str = "arweave/paths";

    /// Parses and validates a manifest body.
    pub fn parse(body: &[u8]) -> Result<Self, ManifestError> {
        let manifest: Self =
            serde_json::from_slice(body).map_err(|err| ManifestError::Json(err.to_string()))?;
        if manifest.manifest != Self::KIND {
            return Err(ManifestError::UnsupportedKind(manifest.manifest));
        }
        if let Some(index) = &manifest.index {
            if !manifest.paths.contains_key(&index.path) {
                return Err(ManifestError::MissingIndex(index.path.clone()));
            }
        }
        Ok(manifest)
    }

    /// The transaction id served for the manifest root, if an index is set.
    pub fn index_id(&self) -> Option<&str> {
        let index = self.index.as_ref()?;
        self.paths.get(&index.path).map(|path| path.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "manifest": "arweave/paths",
        "version": "0.1.0",
        "index": { "path": "index.html" },
        "paths": {
            "index.html": { "id": "index-id" },
            "css/site.css": { "id": "css-id" }
        }
    }"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = PathManifest::parse(MANIFEST.as_bytes()).unwrap();
        assert_eq!(manifest.paths.len(), 2);
        assert_eq!(manifest.index_id(), Some("index-id"));
    }

    #[test]
    fn test_parse_rejects_bad_manifests() {
        assert!(matches!(PathManifest::parse(b"{not json"), Err(ManifestError::Json(_))));
        assert!(matches!(
            PathManifest::parse(br#"{"manifest":"other","version":"1","paths":{}}"#),
            Err(ManifestError::UnsupportedKind(kind)) if kind == "other"
        ));
        assert!(matches!(
            PathManifest::parse(
                br#"{"manifest":"arweave/paths","version":"0.1.0","index":{"path":"a"},"paths":{}}"#
            ),
            Err(ManifestError::MissingIndex(path)) if path == "a"
        ));
    }
}
