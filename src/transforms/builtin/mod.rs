//! Built-in transforms and the side tables they read.

mod code_location;
mod location_image;

pub use code_location::CodeToLocation;
pub use location_image::LocationImage;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::{ConfigError, LoadError};
use crate::record::{Record, RecordSource};

/// Key column shared by every side table.
pub const KEY_COLUMN: &str = "num";

/// A CSV lookup table keyed by the integer `num` column.
#[derive(Debug, Clone)]
pub struct SideTable {
    path: PathBuf,
    rows: BTreeMap<i64, Record>,
}

impl SideTable {
    /// Load a side table, checking that every column in `required` exists.
    pub fn load(path: impl AsRef<Path>, required: &[&str]) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let source = RecordSource::open(path, KEY_COLUMN)?;
        let data_err = |reason: String| LoadError::Data {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(missing) = required
            .iter()
            .find(|col| !source.headers().iter().any(|h| h == *col))
        {
            return Err(data_err(format!("missing column {missing:?}")));
        }

        let mut rows = BTreeMap::new();
        for (index, row) in source.enumerate() {
            let row = row?;
            let key = row.recipient().parse::<i64>().map_err(|_| {
                data_err(format!("row {}: key {:?} is not an integer", index + 1, row.recipient()))
            })?;
            if rows.insert(key, row).is_some() {
                return Err(data_err(format!("duplicate key {key}")));
            }
        }

        tracing::debug!(path = %path.display(), entries = rows.len(), "Loaded side table");
        Ok(Self {
            path: path.to_path_buf(),
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Table name used in lookup errors.
    pub fn label(&self) -> String {
        self.path.display().to_string()
    }

    pub fn get(&self, key: i64) -> Option<&Record> {
        self.rows.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &Record)> {
        self.rows.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Deserialize a transform's JSON arguments.
pub(crate) fn parse_args<T: DeserializeOwned>(
    name: &str,
    args: &serde_json::Value,
) -> Result<T, ConfigError> {
    serde_json::from_value(args.clone()).map_err(|e| ConfigError::InvalidTransformArgs {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
