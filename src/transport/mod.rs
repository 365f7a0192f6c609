//! Transport sinks: where rendered messages go.

mod debug;
mod smtp;

pub use debug::{DebugSink, SentMessage};
pub use smtp::SmtpSink;

use lettre::Address;

use crate::error::DeliveryError;

/// Delivers one serialized message.
///
/// `from` and `to` are the envelope addresses; `message` is the full wire
/// form including headers.
pub trait TransportSink {
    /// Sink name (e.g., "smtp", "debug").
    fn name(&self) -> &str;

    fn send(&self, from: &str, to: &str, message: &[u8]) -> Result<(), DeliveryError>;
}

/// Parse a bare `user@domain` address.
pub fn parse_address(address: &str) -> Result<Address, DeliveryError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|e| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_addresses() {
        let addr = parse_address(" d@x.com ").unwrap();
        assert_eq!(addr.user(), "d");
        assert_eq!(addr.domain(), "x.com");
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "dana", "dana@", "@x.com"] {
            assert!(
                matches!(parse_address(bad), Err(DeliveryError::InvalidAddress { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
