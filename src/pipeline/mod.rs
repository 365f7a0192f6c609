//! Merge pipeline.
//!
//! Every record flows through:
//! 1. `TransformChain::apply()`: ordered row transforms
//! 2. `render_message()`: subject, text and HTML bodies plus inline images
//! 3. `TransportSink::send()`: SMTP relay or the debug sink
//!
//! The prepared configuration is built once and shared read-only across
//! records; each record gets its own copy of the base asset list.

pub mod driver;
pub mod render;

pub use driver::{FailurePolicy, Pipeline, RunState, RunSummary, run_merge};
pub use render::{RenderedMessage, render_message};

use crate::assets::{Asset, load_assets};
use crate::config::MergeSettings;
use crate::error::{ConfigError, Error};
use crate::template::{Template, TemplateKind, TemplatePair};
use crate::transport::parse_address;

/// The `From:` identity of every message in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub address: String,
    pub display_name: Option<String>,
}

impl Sender {
    /// Validate the address up front so a bad sender fails before any record.
    pub fn new(address: &str, display_name: Option<&str>) -> Result<Self, ConfigError> {
        let address = address.trim();
        parse_address(address).map_err(|e| ConfigError::InvalidValue {
            key: "sender".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            address: address.to_string(),
            display_name: display_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        })
    }
}

/// Immutable configuration shared by every record of a run.
#[derive(Debug, Clone)]
pub struct PreparedMerge {
    pub sender: Sender,
    pub subject: Template,
    pub templates: TemplatePair,
    /// Base asset list, in configuration order.
    pub assets: Vec<Asset>,
}

impl PreparedMerge {
    pub fn new(
        sender: Sender,
        subject: &str,
        templates: TemplatePair,
        assets: Vec<Asset>,
    ) -> Result<Self, Error> {
        Ok(Self {
            sender,
            subject: Template::parse(TemplateKind::Subject, subject)?,
            templates,
            assets,
        })
    }

    /// Load assets and templates named by the settings.
    pub fn from_settings(settings: &MergeSettings) -> Result<Self, Error> {
        let sender = Sender::new(&settings.sender_address, settings.sender_name.as_deref())?;
        let assets = load_assets(&settings.images)?;
        let templates = TemplatePair::load(
            settings.text_template.as_deref(),
            settings.html_template.as_deref(),
            &assets,
        )?;
        Self::new(sender, &settings.subject, templates, assets)
    }
}
