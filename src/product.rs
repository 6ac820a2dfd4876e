//! Product identity: which editor build this run provisions artifacts for.
//!
//! Identity is read once from the editor's `product.json` at startup and is
//! immutable afterwards. The short name decides which URL templates and remote
//! path conventions apply for the whole run.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reading or interpreting product metadata.
#[derive(Error, Debug)]
pub enum ProductError {
    #[error("failed to read product metadata at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse product metadata at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Known product kinds with distinct download and install conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductKind {
    Code,
    Cursor,
}

impl ProductKind {
    /// Map a product short name to a known kind. Unknown names yield `None`
    /// and surface as an unsupported-product error at resolve time.
    pub fn from_short_name(short_name: &str) -> Option<ProductKind> {
        match short_name {
            "Code" => Some(ProductKind::Code),
            "Cursor" => Some(ProductKind::Cursor),
            _ => None,
        }
    }

    /// Short name as it appears in `product.json` and artifact filenames.
    pub fn short_name(&self) -> &'static str {
        match self {
            ProductKind::Code => "Code",
            ProductKind::Cursor => "Cursor",
        }
    }

    /// Hidden directory under the remote `$HOME` the server installs into.
    pub fn remote_base_dir_name(&self) -> &'static str {
        match self {
            ProductKind::Code => ".vscode-server",
            ProductKind::Cursor => ".cursor-server",
        }
    }

    /// Directory name the CLI archive extracts to, before the commit id is
    /// appended to disambiguate side-by-side installs.
    pub fn cli_name(&self) -> &'static str {
        match self {
            ProductKind::Code => "code",
            ProductKind::Cursor => "cursor",
        }
    }

    /// Whether this product ships a separate CLI bundle next to the server.
    pub fn requires_cli(&self) -> bool {
        match self {
            ProductKind::Code | ProductKind::Cursor => true,
        }
    }
}

/// Identity of the editor build, as read from `product.json`.
///
/// `short_name` stays a raw string here: validation against the known kinds
/// happens in the resolver so an unknown editor fails with a typed error
/// instead of at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductIdentity {
    #[serde(rename = "nameShort")]
    pub short_name: String,
    pub version: String,
    pub commit: String,
}

impl ProductIdentity {
    /// Read product metadata from a `product.json` file. Failure here is
    /// fatal to pipeline startup.
    pub fn load(path: &Path) -> Result<ProductIdentity, ProductError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ProductError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ProductError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// The known product kind, if this identity names one.
    pub fn kind(&self) -> Option<ProductKind> {
        ProductKind::from_short_name(&self.short_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_reads_product_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("product.json");
        std::fs::write(
            &path,
            r#"{"nameShort":"Code","version":"1.96.0","commit":"abc123","extra":"ignored"}"#,
        )
        .unwrap();

        let identity = ProductIdentity::load(&path).unwrap();
        assert_eq!(identity.short_name, "Code");
        assert_eq!(identity.version, "1.96.0");
        assert_eq!(identity.commit, "abc123");
        assert_eq!(identity.kind(), Some(ProductKind::Code));
    }

    #[test]
    fn load_missing_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = ProductIdentity::load(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ProductError::Read { .. }));
    }

    #[test]
    fn load_rejects_malformed_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("product.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = ProductIdentity::load(&path).unwrap_err();
        assert!(matches!(err, ProductError::Parse { .. }));
    }

    #[test]
    fn unknown_short_name_has_no_kind() {
        let identity = ProductIdentity {
            short_name: "Unknown".into(),
            version: "1.0.0".into(),
            commit: "deadbeef".into(),
        };
        assert_eq!(identity.kind(), None);
    }

    #[test]
    fn kind_conventions() {
        assert_eq!(ProductKind::Code.remote_base_dir_name(), ".vscode-server");
        assert_eq!(ProductKind::Cursor.remote_base_dir_name(), ".cursor-server");
        assert_eq!(ProductKind::Code.cli_name(), "code");
        assert_eq!(ProductKind::Cursor.cli_name(), "cursor");
        assert!(ProductKind::Code.requires_cli());
        assert!(ProductKind::Cursor.requires_cli());
    }
}
