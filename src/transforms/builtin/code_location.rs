//! `code_to_location`: replace numeric sign-up codes with location names.
//!
//! Every field whose value parses as an integer is looked up in a
//! `num,location` side table. Blank fields become a placeholder string
//! ("Not Signed Up" by default); other values pass through.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::assets::Asset;
use crate::error::{ConfigError, TransformError};
use crate::record::{Presence, Record, normalize_field_name};
use crate::transforms::RowTransform;
use crate::transforms::builtin::{SideTable, parse_args};

/// Default replacement for blank or absent fields.
pub const NOT_SIGNED_UP: &str = "Not Signed Up";

fn default_placeholder() -> String {
    NOT_SIGNED_UP.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Args {
    location_file: PathBuf,
    #[serde(default = "default_placeholder")]
    placeholder: String,
    /// Fields that must exist after the transform; absent ones get the placeholder.
    #[serde(default)]
    fields: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CodeToLocation {
    table: String,
    locations: BTreeMap<i64, String>,
    placeholder: String,
    fields: Vec<String>,
}

impl CodeToLocation {
    pub const NAME: &'static str = "code_to_location";

    pub fn new(table: impl Into<String>, locations: BTreeMap<i64, String>) -> Self {
        Self {
            table: table.into(),
            locations,
            placeholder: default_placeholder(),
            fields: Vec::new(),
        }
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Fields to fill with the placeholder when a record lacks them entirely.
    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fields = fields
            .into_iter()
            .map(|f| normalize_field_name(f.as_ref()))
            .collect();
        self
    }

    /// Registry constructor.
    pub fn configure(args: &serde_json::Value) -> Result<Box<dyn RowTransform>, ConfigError> {
        let args: Args = parse_args(Self::NAME, args)?;
        let table = SideTable::load(&args.location_file, &["location"]).map_err(|source| {
            ConfigError::TransformSetup {
                name: Self::NAME.to_string(),
                source,
            }
        })?;

        let locations = table
            .iter()
            .map(|(code, row)| (code, row.get("location").unwrap_or_default().to_string()))
            .collect();

        Ok(Box::new(
            Self::new(table.label(), locations)
                .with_placeholder(args.placeholder)
                .with_required_fields(args.fields),
        ))
    }

    fn lookup(&self, code: i64, raw: &str) -> Result<String, TransformError> {
        self.locations
            .get(&code)
            .cloned()
            .ok_or_else(|| TransformError::Lookup {
                table: self.table.clone(),
                key: raw.to_string(),
            })
    }
}

/// Optional sign followed by one or more ASCII digits, of any length.
fn is_integer(value: &str) -> bool {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

impl RowTransform for CodeToLocation {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process_row(
        &self,
        mut record: Record,
        assets: Vec<Asset>,
    ) -> Result<(Record, Vec<Asset>), TransformError> {
        let names: Vec<String> = record
            .fields()
            .map(|(name, _)| name.to_string())
            .chain(self.fields.iter().filter(|f| !record.contains(f)).cloned())
            .collect();

        for name in names {
            let replacement = match record.presence(&name) {
                Presence::Value(value) if is_integer(value.trim()) => {
                    let raw = value.trim();
                    // Too large for any table key, so it can only miss.
                    let code = raw.parse::<i64>().map_err(|_| TransformError::Lookup {
                        table: self.table.clone(),
                        key: raw.to_string(),
                    })?;
                    Some(self.lookup(code, raw)?)
                }
                Presence::Value(_) => None,
                Presence::Blank | Presence::Absent => Some(self.placeholder.clone()),
            };
            if let Some(value) = replacement {
                record.set(&name, value);
            }
        }

        Ok((record, assets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> CodeToLocation {
        CodeToLocation::new(
            "locations.csv",
            BTreeMap::from([
                (1, "Chapel Fields".to_string()),
                (2, "Behind Knight Hall".to_string()),
            ]),
        )
    }

    fn run(t: &CodeToLocation, record: Record) -> Result<Record, TransformError> {
        t.process_row(record, vec![]).map(|(r, _)| r)
    }

    #[test]
    fn maps_codes_to_locations() {
        let out = run(&transform(), Record::new("a@b.c").with_field("room", "1")).unwrap();
        assert_eq!(out.get("room"), Some("Chapel Fields"));

        let out = run(&transform(), Record::new("a@b.c").with_field("room", " 2 ")).unwrap();
        assert_eq!(out.get("room"), Some("Behind Knight Hall"));
    }

    #[test]
    fn blank_becomes_not_signed_up() {
        for blank in ["", " ", "\t"] {
            let out = run(&transform(), Record::new("a@b.c").with_field("room", blank)).unwrap();
            assert_eq!(out.get("room"), Some("Not Signed Up"));
        }
    }

    #[test]
    fn unknown_code_is_a_lookup_error() {
        let err = run(&transform(), Record::new("a@b.c").with_field("room", "99")).unwrap_err();
        assert!(matches!(err, TransformError::Lookup { ref key, .. } if key == "99"));
    }

    #[test]
    fn oversized_integer_is_a_lookup_error() {
        let err = run(
            &transform(),
            Record::new("a@b.c").with_field("room", "123456789012345678901234"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TransformError::Lookup { ref key, .. } if key == "123456789012345678901234"
        ));
    }

    #[test]
    fn integer_shape() {
        assert!(is_integer("7"));
        assert!(is_integer("+12"));
        assert!(is_integer("-3"));
        assert!(is_integer("99999999999999999999999"));
        assert!(!is_integer(""));
        assert!(!is_integer("-"));
        assert!(!is_integer("1.5"));
        assert!(!is_integer("12a"));
        assert!(!is_integer("+-1"));
    }

    #[test]
    fn text_values_pass_through() {
        let record = Record::new("a@b.c")
            .with_field("email", "a@b.c")
            .with_field("name", "Dana Levi");
        let out = run(&transform(), record.clone()).unwrap();
        assert_eq!(out, record);
    }

    #[test]
    fn required_fields_fill_absent_values() {
        let t = transform()
            .with_placeholder("TBD")
            .with_required_fields(["Maariv 1", "seat"]);
        let out = run(&t, Record::new("a@b.c").with_field("seat", "2")).unwrap();
        assert_eq!(out.get("maariv_1"), Some("TBD"));
        assert_eq!(out.get("seat"), Some("Behind Knight Hall"));
    }

    #[test]
    fn configure_reads_side_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.csv");
        std::fs::write(&path, "num,location\n1,Chapel Fields\n2,Behind Knight Hall\n").unwrap();

        let unit = CodeToLocation::configure(&serde_json::json!({ "location_file": path }))
            .unwrap();
        assert_eq!(unit.name(), "code_to_location");

        let (out, _) = unit
            .process_row(Record::new("a@b.c").with_field("mincha_1", "2"), vec![])
            .unwrap();
        assert_eq!(out.get("mincha_1"), Some("Behind Knight Hall"));
    }

    #[test]
    fn configure_reports_missing_table() {
        let err = CodeToLocation::configure(&serde_json::json!({
            "location_file": "/nonexistent/locations.csv"
        }))
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::TransformSetup { .. }));
    }
}
