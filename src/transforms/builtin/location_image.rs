//! `location_image`: resolve a location code and attach its picture.
//!
//! The side table has `num,location,location_img` columns. Images are loaded
//! once when the transform is configured; each record gets the image for its
//! location appended to its own asset list.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::assets::{Asset, load_asset};
use crate::error::{ConfigError, TransformError};
use crate::record::{Presence, Record, normalize_field_name};
use crate::transforms::RowTransform;
use crate::transforms::builtin::{SideTable, parse_args};

fn default_field() -> String {
    "location".to_string()
}

fn default_image_field() -> String {
    "location_img".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Args {
    locations_file: PathBuf,
    #[serde(default = "default_field")]
    field: String,
    #[serde(default = "default_image_field")]
    image_field: String,
    /// Directory the `location_img` paths are relative to. Defaults to the
    /// directory holding the locations file.
    images_dir: Option<PathBuf>,
}

/// A resolved side-table entry.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: String,
    pub image: Asset,
}

#[derive(Debug, Clone)]
pub struct LocationImage {
    table: String,
    field: String,
    image_field: String,
    locations: BTreeMap<i64, Location>,
}

impl LocationImage {
    pub const NAME: &'static str = "location_image";

    pub fn new(table: impl Into<String>, locations: BTreeMap<i64, Location>) -> Self {
        Self {
            table: table.into(),
            field: default_field(),
            image_field: default_image_field(),
            locations,
        }
    }

    /// Override the key field and the field that receives the image tag.
    pub fn with_fields(mut self, field: &str, image_field: &str) -> Self {
        self.field = normalize_field_name(field);
        self.image_field = normalize_field_name(image_field);
        self
    }

    /// Registry constructor.
    pub fn configure(args: &serde_json::Value) -> Result<Box<dyn RowTransform>, ConfigError> {
        let args: Args = parse_args(Self::NAME, args)?;
        let setup_err = |source| ConfigError::TransformSetup {
            name: Self::NAME.to_string(),
            source,
        };

        let table =
            SideTable::load(&args.locations_file, &["location", "location_img"]).map_err(setup_err)?;
        let images_dir = args.images_dir.unwrap_or_else(|| {
            args.locations_file
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_default()
        });

        let mut locations = BTreeMap::new();
        for (code, row) in table.iter() {
            let image_path = images_dir.join(row.get("location_img").unwrap_or_default().trim());
            let image = load_asset(&image_path).map_err(setup_err)?;
            let name = row.get("location").unwrap_or_default().to_string();
            locations.insert(code, Location { name, image });
        }

        Ok(Box::new(
            Self::new(table.label(), locations).with_fields(&args.field, &args.image_field),
        ))
    }
}

impl RowTransform for LocationImage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process_row(
        &self,
        mut record: Record,
        mut assets: Vec<Asset>,
    ) -> Result<(Record, Vec<Asset>), TransformError> {
        let key = match record.presence(&self.field) {
            Presence::Value(value) => value.trim().to_string(),
            Presence::Blank | Presence::Absent => {
                return Err(TransformError::MissingField {
                    field: self.field.clone(),
                });
            }
        };

        let location = key
            .parse::<i64>()
            .ok()
            .and_then(|code| self.locations.get(&code))
            .ok_or_else(|| TransformError::Lookup {
                table: self.table.clone(),
                key: key.clone(),
            })?;

        record.set(&self.field, location.name.clone());
        record.set(&self.image_field, location.image.tag());
        match assets.iter().position(|a| a.tag() == location.image.tag()) {
            Some(index) if assets[index] == location.image => {}
            Some(_) => {
                return Err(TransformError::Failed(format!(
                    "image tag {:?} already used by a different asset",
                    location.image.tag()
                )));
            }
            None => assets.push(location.image.clone()),
        }

        Ok((record, assets))
    }
}
