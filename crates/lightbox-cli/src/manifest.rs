//! Write-target manifest.
//!
//! A JSON object mapping each file name to the pre-authorized destination
//! handed out by the storage service:
//!
//! ```json
//! {
//!   "IMG_0001.jpg": {
//!     "uploadUrl": "https://bucket.example/IMG_0001.jpg?X-Signature=...",
//!     "publicUrl": "https://cdn.example/galleries/42/IMG_0001.jpg",
//!     "key": "galleries/42/IMG_0001.jpg"
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use lightbox_upload::WriteTarget;

use crate::error::CliError;

/// Write targets keyed by file name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    targets: HashMap<String, WriteTarget>,
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CliError::Io(format!("Failed to read manifest '{}': {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            CliError::Arguments(format!("Invalid manifest '{}': {e}", path.display()))
        })
    }

    /// Parse manifest JSON.
    pub fn from_json(raw: &str) -> Result<Self, CliError> {
        serde_json::from_str(raw).map_err(|e| CliError::Arguments(format!("Invalid manifest: {e}")))
    }

    /// Target for `file_name`, if the manifest has one.
    pub fn target_for(&self, file_name: &str) -> Option<&WriteTarget> {
        self.targets.get(file_name)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "a.jpg": {
            "uploadUrl": "https://put.example/a.jpg?sig=1",
            "publicUrl": "https://cdn.example/a.jpg",
            "key": "g/a.jpg"
        },
        "b.png": {
            "uploadUrl": "https://put.example/b.png?sig=2",
            "publicUrl": "https://cdn.example/b.png",
            "key": "g/b.png"
        }
    }"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_json(SAMPLE).unwrap();

        assert_eq!(manifest.len(), 2);
        let target = manifest.target_for("a.jpg").unwrap();
        assert_eq!(target.upload_url, "https://put.example/a.jpg?sig=1");
        assert_eq!(target.public_url, "https://cdn.example/a.jpg");
        assert_eq!(target.key, "g/a.jpg");
        assert!(manifest.target_for("c.jpg").is_none());
    }

    #[test]
    fn test_missing_field_is_argument_error() {
        let err = Manifest::from_json(r#"{"a.jpg": {"uploadUrl": "x"}}"#).unwrap_err();
        assert!(matches!(err, CliError::Arguments(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert!(manifest.target_for("b.png").is_some());

        let missing = Manifest::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, CliError::Io(_)));
    }
}
