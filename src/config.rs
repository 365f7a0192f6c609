//! Configuration types.
//!
//! Everything is read from environment variables. The `from_lookup`
//! constructors take any key → value function so callers (and tests) can
//! supply settings without touching the process environment.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pipeline::FailurePolicy;
use crate::record::DEFAULT_ADDRESS_COLUMN;
use crate::transforms::TransformSpec;

/// Default SMTP relay when `SMTP_HOST` is unset.
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
/// Implicit-TLS submission port.
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// Settings for one merge run.
#[derive(Debug, Clone)]
pub struct MergeSettings {
    /// Recipient CSV.
    pub data_path: PathBuf,
    pub text_template: Option<PathBuf>,
    pub html_template: Option<PathBuf>,
    /// Inline images, in attachment order.
    pub images: Vec<PathBuf>,
    /// Subject template; may contain placeholders.
    pub subject: String,
    pub sender_address: String,
    pub sender_name: Option<String>,
    /// Column holding each record's destination address.
    pub address_column: String,
    pub transforms: Vec<TransformSpec>,
    pub on_row_error: FailurePolicy,
    /// Use the debug sink instead of SMTP.
    pub debug_transport: bool,
}

impl MergeSettings {
    /// Minimal settings; everything else takes its default.
    pub fn new(
        data_path: impl Into<PathBuf>,
        subject: impl Into<String>,
        sender_address: impl Into<String>,
    ) -> Self {
        Self {
            data_path: data_path.into(),
            text_template: None,
            html_template: None,
            images: Vec::new(),
            subject: subject.into(),
            sender_address: sender_address.into(),
            sender_name: None,
            address_column: DEFAULT_ADDRESS_COLUMN.to_string(),
            transforms: Vec::new(),
            on_row_error: FailurePolicy::default(),
            debug_transport: false,
        }
    }

    /// Load from `MAILMERGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_path = get("MAILMERGE_DATA").ok_or_else(|| ConfigError::MissingRequired {
            key: "MAILMERGE_DATA".into(),
            hint: "Set it to the recipient CSV file.".into(),
        })?;
        let subject = get("MAILMERGE_SUBJECT").ok_or_else(|| ConfigError::MissingRequired {
            key: "MAILMERGE_SUBJECT".into(),
            hint: "Set it to the subject line; placeholders are allowed.".into(),
        })?;
        let sender = get("MAILMERGE_SENDER").ok_or_else(|| ConfigError::MissingRequired {
            key: "MAILMERGE_SENDER".into(),
            hint: "Set it to the From address.".into(),
        })?;

        let text_template = get("MAILMERGE_TEXT_TEMPLATE").map(PathBuf::from);
        let html_template = get("MAILMERGE_HTML_TEMPLATE").map(PathBuf::from);
        if text_template.is_none() && html_template.is_none() {
            return Err(ConfigError::NoTemplate);
        }

        let images: Vec<PathBuf> = get("MAILMERGE_IMAGES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();

        let transforms = match get("MAILMERGE_TRANSFORMS") {
            Some(json) => TransformSpec::parse_list(&json)?,
            None => Vec::new(),
        };

        let on_row_error = match get("MAILMERGE_ON_ROW_ERROR") {
            Some(policy) => policy.parse()?,
            None => FailurePolicy::default(),
        };

        let debug_transport = match get("MAILMERGE_DEBUG") {
            Some(flag) => parse_flag("MAILMERGE_DEBUG", &flag)?,
            None => false,
        };

        let mut settings = Self::new(data_path, subject, sender);
        settings.text_template = text_template;
        settings.html_template = html_template;
        settings.images = images;
        settings.sender_name = get("MAILMERGE_SENDER_NAME");
        if let Some(column) = get("MAILMERGE_ADDRESS_COLUMN") {
            settings.address_column = column;
        }
        settings.transforms = transforms;
        settings.on_row_error = on_row_error;
        settings.debug_transport = debug_transport;
        Ok(settings)
    }
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// TLS from the first byte (port 465).
    #[default]
    Wrapper,
    /// Plaintext upgraded with STARTTLS (port 587).
    StartTls,
    /// No encryption. Local test servers only.
    None,
}

impl std::str::FromStr for TlsMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wrapper" | "tls" | "ssl" => Ok(Self::Wrapper),
            "starttls" => Ok(Self::StartTls),
            "none" | "plain" => Ok(Self::None),
            other => Err(ConfigError::InvalidValue {
                key: "SMTP_TLS".into(),
                message: format!("expected wrapper, starttls or none, got {other:?}"),
            }),
        }
    }
}

/// SMTP connection settings.
#[derive(Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Without a password the connection is unauthenticated.
    pub password: Option<SecretString>,
    pub tls: TlsMode,
}

impl SmtpSettings {
    /// Load from `SMTP_*` environment variables. The login defaults to the
    /// sender address.
    pub fn from_env(sender_address: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(sender_address, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        sender_address: &str,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("SMTP_PORT") {
            Some(port) => port.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "SMTP_PORT".into(),
                message: format!("{port:?}: {e}"),
            })?,
            None => DEFAULT_SMTP_PORT,
        };
        let tls = match get("SMTP_TLS") {
            Some(mode) => mode.parse()?,
            None => TlsMode::default(),
        };

        Ok(Self {
            host: get("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            port,
            username: get("SMTP_USERNAME").unwrap_or_else(|| sender_address.trim().to_string()),
            password: get("SMTP_PASSWORD").map(SecretString::from),
            tls,
        })
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
