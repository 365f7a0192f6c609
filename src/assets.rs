//! Inline image assets.
//!
//! An asset's tag is the file name up to its first `.`; the tag doubles as the
//! content-id that HTML bodies reference (`cid:TAG`).

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::LoadError;

/// A loaded binary asset. Cloning is cheap: the bytes are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    tag: String,
    bytes: Arc<[u8]>,
    content_type: (String, String),
}

impl Asset {
    /// Build an asset from bytes already in memory.
    pub fn new(
        tag: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        content_type: (String, String),
    ) -> Self {
        Self {
            tag: tag.into(),
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `(maintype, subtype)`, e.g. `("image", "png")`.
    pub fn content_type(&self) -> (&str, &str) {
        (&self.content_type.0, &self.content_type.1)
    }

    /// `maintype/subtype` string form.
    pub fn mime(&self) -> String {
        format!("{}/{}", self.content_type.0, self.content_type.1)
    }
}

/// Derive an asset tag from a path: the file name before its first `.`.
pub fn derive_tag(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.split('.').next().filter(|tag| !tag.is_empty())
}

/// Load a single asset from disk.
pub fn load_asset(path: impl AsRef<Path>) -> Result<Asset, LoadError> {
    let path = path.as_ref();

    let tag = derive_tag(path).ok_or_else(|| LoadError::Asset {
        path: path.to_path_buf(),
        reason: "cannot derive a tag from the file name".into(),
    })?;

    let mime = mime_guess::from_path(path)
        .first()
        .ok_or_else(|| LoadError::UnknownAssetType {
            path: path.to_path_buf(),
        })?;

    let bytes = std::fs::read(path).map_err(|e| LoadError::Asset {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    debug!(tag, mime = %mime, size = bytes.len(), "Loaded asset");

    Ok(Asset::new(
        tag,
        bytes,
        (mime.type_().as_str().to_string(), mime.subtype().as_str().to_string()),
    ))
}

/// Load assets in order. Tags must be unique, since they become content-ids.
pub fn load_assets<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Asset>, LoadError> {
    let mut assets: Vec<Asset> = Vec::with_capacity(paths.len());
    for path in paths {
        let asset = load_asset(path)?;
        if assets.iter().any(|a| a.tag == asset.tag) {
            return Err(LoadError::Asset {
                path: path.as_ref().to_path_buf(),
                reason: format!("duplicate tag {:?}", asset.tag),
            });
        }
        assets.push(asset);
    }
    Ok(assets)
}
