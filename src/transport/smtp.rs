//! SMTP sink backed by lettre's blocking transport.

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::{SmtpSettings, TlsMode};
use crate::error::{ConfigError, DeliveryError};
use crate::transport::{TransportSink, parse_address};

/// Relays messages through an SMTP server. One connection pool per run.
pub struct SmtpSink {
    transport: SmtpTransport,
    host: String,
}

impl SmtpSink {
    pub fn new(settings: &SmtpSettings) -> Result<Self, ConfigError> {
        let relay_err = |e: lettre::transport::smtp::Error| ConfigError::InvalidValue {
            key: "SMTP_HOST".into(),
            message: format!("SMTP relay error: {e}"),
        };

        let builder = match settings.tls {
            TlsMode::Wrapper => SmtpTransport::relay(&settings.host).map_err(relay_err)?,
            TlsMode::StartTls => SmtpTransport::starttls_relay(&settings.host).map_err(relay_err)?,
            TlsMode::None => SmtpTransport::builder_dangerous(&settings.host),
        };

        let mut builder = builder.port(settings.port);
        if let Some(password) = &settings.password {
            builder = builder.credentials(Credentials::new(
                settings.username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        tracing::debug!(
            host = %settings.host,
            port = settings.port,
            tls = ?settings.tls,
            "Configured SMTP transport"
        );

        Ok(Self {
            transport: builder.build(),
            host: settings.host.clone(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl TransportSink for SmtpSink {
    fn name(&self) -> &str {
        "smtp"
    }

    fn send(&self, from: &str, to: &str, message: &[u8]) -> Result<(), DeliveryError> {
        let envelope = Envelope::new(Some(parse_address(from)?), vec![parse_address(to)?])
            .map_err(|e| DeliveryError::Build(format!("invalid envelope: {e}")))?;

        self.transport
            .send_raw(&envelope, message)
            .map_err(|e| DeliveryError::SendFailed {
                transport: "smtp".into(),
                reason: format!("SMTP send failed via {}: {e}", self.host),
            })?;
        Ok(())
    }
}
