//! Debug sink: keeps every message in memory and optionally prints it.

use std::io::Write;
use std::sync::Mutex;

use crate::error::DeliveryError;
use crate::transport::{TransportSink, parse_address};

/// One captured delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub from: String,
    pub to: String,
    pub raw: Vec<u8>,
}

impl SentMessage {
    /// Wire form as text (lossy for non-UTF-8 bodies).
    pub fn raw_text(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

/// Accepts every well-addressed message without network I/O.
#[derive(Debug, Default)]
pub struct DebugSink {
    sent: Mutex<Vec<SentMessage>>,
    echo: bool,
}

impl DebugSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that also writes each message to stdout.
    pub fn echoing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            echo: true,
        }
    }

    /// Messages captured so far, in send order.
    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Drain captured messages.
    pub fn take(&self) -> Vec<SentMessage> {
        std::mem::take(
            &mut *self
                .sent
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl TransportSink for DebugSink {
    fn name(&self) -> &str {
        "debug"
    }

    fn send(&self, from: &str, to: &str, message: &[u8]) -> Result<(), DeliveryError> {
        parse_address(from)?;
        parse_address(to)?;

        if self.echo {
            let mut out = std::io::stdout().lock();
            writeln!(out, "---------- MESSAGE FOLLOWS ----------")
                .and_then(|()| out.write_all(message))
                .and_then(|()| writeln!(out, "\n------------ END MESSAGE ------------"))
                .map_err(|e| DeliveryError::SendFailed {
                    transport: "debug".into(),
                    reason: e.to_string(),
                })?;
        }

        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(SentMessage {
                from: from.to_string(),
                to: to.to_string(),
                raw: message.to_vec(),
            });
        tracing::debug!(%to, bytes = message.len(), "Debug sink accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_in_order() {
        let sink = DebugSink::new();
        sink.send("a@x.com", "b@x.com", b"first").unwrap();
        sink.send("a@x.com", "c@x.com", b"second").unwrap();

        let sent = sink.messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "b@x.com");
        assert_eq!(sent[1].raw_text(), "second");

        assert_eq!(sink.take().len(), 2);
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn rejects_bad_envelope() {
        let sink = DebugSink::new();
        let err = sink.send("a@x.com", "nobody", b"x").unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { .. }));
        assert!(sink.messages().is_empty());
    }
}
