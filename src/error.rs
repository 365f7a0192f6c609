//! Error types for mailmerge.
//!
//! Configuration and load errors are fatal: they surface before the first
//! record is processed. Everything wrapped in [`RowError`] is row-scoped and
//! carries the recipient and the failing stage.

use std::path::PathBuf;

/// Top-level error type for a merge run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("{0}")]
    Row(#[from] RowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("No template supplied: configure a text template, an HTML template, or both")]
    NoTemplate,

    #[error("Unknown transform: {name}")]
    UnknownTransform { name: String },

    #[error("Invalid arguments for transform {name}: {reason}")]
    InvalidTransformArgs { name: String, reason: String },

    #[error("Transform {name} failed to initialize: {source}")]
    TransformSetup {
        name: String,
        #[source]
        source: LoadError,
    },
}

/// Errors raised while loading records, assets or template files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to load data from {path}: {reason}")]
    Data { path: PathBuf, reason: String },

    #[error("Failed to load asset {path}: {reason}")]
    Asset { path: PathBuf, reason: String },

    #[error("Cannot infer a content type for asset {path}")]
    UnknownAssetType { path: PathBuf },

    #[error("Failed to read template {path}: {source}")]
    TemplateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Template parsing and rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Placeholder ${{{placeholder}}} in {template} template has no matching field")]
    Unresolved {
        template: &'static str,
        placeholder: String,
    },

    #[error(
        "Placeholder ${{{placeholder}}} in {template} template is ambiguous: it names both a field and an image"
    )]
    Ambiguous {
        template: &'static str,
        placeholder: String,
    },

    #[error("Malformed {template} template at byte {offset}: {reason}")]
    Malformed {
        template: &'static str,
        offset: usize,
        reason: String,
    },
}

/// Failures inside a single row transform.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("No entry for key {key:?} in {table}")]
    Lookup { table: String, key: String },

    #[error("Required field {field} is missing or blank")]
    MissingField { field: String },

    #[error("{0}")]
    Failed(String),
}

/// Transport sink failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport {transport} failed to send: {reason}")]
    SendFailed { transport: String, reason: String },
}

/// What went wrong while processing one record.
#[derive(Debug, thiserror::Error)]
pub enum RowErrorKind {
    #[error("transform {unit} failed: {source}")]
    Transform {
        unit: String,
        #[source]
        source: TransformError,
    },

    #[error("render failed: {0}")]
    Render(#[source] TemplateError),

    #[error("delivery failed: {0}")]
    Delivery(#[source] DeliveryError),

    #[error("record has no destination address")]
    MissingRecipient,
}

impl RowErrorKind {
    /// Pipeline stage the failure happened in.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Transform { .. } => "transform",
            Self::Render(_) => "render",
            Self::Delivery(_) => "send",
            Self::MissingRecipient => "load",
        }
    }
}

/// A row-scoped failure with enough context for the caller to decide policy.
#[derive(Debug, thiserror::Error)]
#[error("Row {row} ({recipient}) failed at {stage}: {kind}", stage = .kind.stage())]
pub struct RowError {
    /// 1-based data row number (header excluded).
    pub row: usize,
    /// Destination address of the record, possibly empty.
    pub recipient: String,
    pub kind: RowErrorKind,
}

/// Result type alias for mailmerge.
pub type Result<T> = std::result::Result<T, Error>;
