//! Recipient records and the CSV record source.
//!
//! Each CSV row becomes one [`Record`]: header names are normalized with
//! [`normalize_field_name`] and every cell is kept verbatim as a string.
//! Blank header cells are named `unnamed_{index}`; cells missing from the end
//! of a short row are left absent from its record.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::LoadError;

/// Default name of the column holding the destination address.
pub const DEFAULT_ADDRESS_COLUMN: &str = "email";

/// Normalize a column header into a record field name.
///
/// Trims, lower-cases, and replaces each run of whitespace with a single `_`.
/// Idempotent: `normalize_field_name(normalize_field_name(x)) == normalize_field_name(x)`.
pub fn normalize_field_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// How a field is present in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence<'a> {
    /// Present with a non-blank value.
    Value(&'a str),
    /// Present but empty or whitespace-only.
    Blank,
    /// Not in the record at all.
    Absent,
}

/// One recipient's field values, tagged with the destination address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    recipient: String,
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion. The name is normalized.
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Destination address this record is sent to.
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Classify a field as value, blank or absent.
    pub fn presence(&self, name: &str) -> Presence<'_> {
        match self.fields.get(name) {
            Some(v) if v.trim().is_empty() => Presence::Blank,
            Some(v) => Presence::Value(v),
            None => Presence::Absent,
        }
    }

    /// Set a field, normalizing the name. Returns the previous value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        self.fields.insert(normalize_field_name(name), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn fields_mut(&mut self) -> impl Iterator<Item = (&str, &mut String)> {
        self.fields.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ── Record source ───────────────────────────────────────────────────

/// Lazy sequence of records read from a CSV file.
pub struct RecordSource<R: Read = File> {
    path: PathBuf,
    reader: csv::Reader<R>,
    headers: Vec<String>,
    address_index: usize,
    row: usize,
}

impl RecordSource<File> {
    /// Open a CSV file and validate its header row.
    pub fn open(path: impl AsRef<Path>, address_column: &str) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| LoadError::Data {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_reader(file, path, address_column)
    }
}

impl<R: Read> RecordSource<R> {
    /// Build a source over any reader. `path` is only used in error messages.
    pub fn from_reader(
        input: R,
        path: impl Into<PathBuf>,
        address_column: &str,
    ) -> Result<Self, LoadError> {
        let path = path.into();
        let data_err = |reason: String| LoadError::Data {
            path: path.clone(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);
        let raw_headers = reader
            .headers()
            .map_err(|e| data_err(format!("cannot read header row: {e}")))?
            .clone();

        if raw_headers.is_empty() || raw_headers.iter().all(|h| h.trim().is_empty()) {
            return Err(data_err("file has no header row".into()));
        }

        let mut headers: Vec<String> = Vec::with_capacity(raw_headers.len());
        for (index, raw) in raw_headers.iter().enumerate() {
            let mut name = normalize_field_name(raw);
            if name.is_empty() {
                name = format!("unnamed_{index}");
            }
            if headers.contains(&name) {
                return Err(data_err(format!("duplicate column {name:?} after normalization")));
            }
            headers.push(name);
        }

        let address_column = normalize_field_name(address_column);
        let address_index = headers
            .iter()
            .position(|h| *h == address_column)
            .ok_or_else(|| data_err(format!("missing address column {address_column:?}")))?;

        debug!(path = %path.display(), columns = headers.len(), "Opened record source");

        Ok(Self {
            path,
            reader,
            headers,
            address_index,
            row: 0,
        })
    }

    /// Normalized column names, in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for RecordSource<R> {
    type Item = Result<Record, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut raw = csv::StringRecord::new();
        match self.reader.read_record(&mut raw) {
            Ok(false) => None,
            Ok(true) => {
                self.row += 1;
                if raw.len() > self.headers.len() {
                    return Some(Err(LoadError::Data {
                        path: self.path.clone(),
                        reason: format!(
                            "row {}: found {} fields, header has {}",
                            self.row,
                            raw.len(),
                            self.headers.len()
                        ),
                    }));
                }
                // Short rows leave their trailing fields absent.
                let recipient = raw.get(self.address_index).unwrap_or_default().trim();
                let mut record = Record::new(recipient);
                for (name, value) in self.headers.iter().zip(raw.iter()) {
                    record.fields.insert(name.clone(), value.to_string());
                }
                Some(Ok(record))
            }
            Err(e) => {
                self.row += 1;
                Some(Err(LoadError::Data {
                    path: self.path.clone(),
                    reason: format!("row {}: {e}", self.row),
                }))
            }
        }
    }
}
