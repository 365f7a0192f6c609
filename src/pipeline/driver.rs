//! Pipeline driver: runs every record through transform → render → send.
//!
//! State flow for a run:
//!
//! ```text
//! Idle → Loading → PerRecord(1) → PerRecord(2) → … → Done
//!            │            │
//!            ▼            ▼
//!         Aborted     FailedRow(n) → PerRecord(n+1) (skip) | Aborted (abort)
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::{debug, error, info, warn};

use crate::config::MergeSettings;
use crate::error::{ConfigError, Error, LoadError, RowError, RowErrorKind};
use crate::pipeline::PreparedMerge;
use crate::pipeline::render::render_message;
use crate::record::{Record, RecordSource};
use crate::transforms::{TransformChain, TransformRegistry};
use crate::transport::TransportSink;

/// Where the driver currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Loading,
    /// Processing the n-th data row (1-based).
    PerRecord(usize),
    FailedRow(usize),
    Done,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::PerRecord(row) => write!(f, "record {row}"),
            Self::FailedRow(row) => write!(f, "failed row {row}"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// What to do when a single record fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failing record.
    #[default]
    Abort,
    /// Log the failure, record it in the summary and carry on.
    SkipAndLog,
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" | "skip_and_log" => Ok(Self::SkipAndLog),
            other => Err(ConfigError::InvalidValue {
                key: "MAILMERGE_ON_ROW_ERROR".into(),
                message: format!("expected \"abort\" or \"skip\", got {other:?}"),
            }),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub sent: usize,
    /// Skipped records, in row order. Always empty under [`FailurePolicy::Abort`].
    pub failed: Vec<RowError>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A prepared merge: templates, assets and transform chain, ready to run.
pub struct Pipeline {
    prepared: PreparedMerge,
    chain: TransformChain,
    policy: FailurePolicy,
    state: RunState,
}

impl Pipeline {
    pub fn new(prepared: PreparedMerge, chain: TransformChain) -> Self {
        Self {
            prepared,
            chain,
            policy: FailurePolicy::default(),
            state: RunState::Idle,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Loading stage: templates, base assets and the transform chain.
    ///
    /// All-or-nothing; any failure aborts before a record is read.
    pub fn prepare(settings: &MergeSettings, registry: &TransformRegistry) -> Result<Self, Error> {
        debug!(from = %RunState::Idle, to = %RunState::Loading, "Run state");

        let loaded = PreparedMerge::from_settings(settings).and_then(|prepared| {
            let chain = TransformChain::from_specs(registry, &settings.transforms)?;
            Ok((prepared, chain))
        });

        match loaded {
            Ok((prepared, chain)) => {
                info!(
                    assets = prepared.assets.len(),
                    transforms = ?chain.names(),
                    "Merge prepared"
                );
                let mut pipeline = Self::new(prepared, chain).with_policy(settings.on_row_error);
                pipeline.state = RunState::Loading;
                Ok(pipeline)
            }
            Err(e) => {
                error!(error = %e, "Aborting: failed to prepare merge");
                debug!(from = %RunState::Loading, to = %RunState::Aborted, "Run state");
                Err(e)
            }
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn prepared(&self) -> &PreparedMerge {
        &self.prepared
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "Run state");
        self.state = next;
    }

    /// Process records in order, sending one message per record.
    ///
    /// A record that cannot be read is fatal. A record that fails inside the
    /// pipeline is handled according to the failure policy.
    pub fn run<I>(&mut self, records: I, transport: &dyn TransportSink) -> Result<RunSummary, Error>
    where
        I: IntoIterator<Item = Result<Record, LoadError>>,
    {
        let mut summary = RunSummary::default();

        for (index, item) in records.into_iter().enumerate() {
            let row = index + 1;
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    error!(row, error = %e, "Aborting: failed to read record");
                    self.transition(RunState::Aborted);
                    return Err(e.into());
                }
            };

            self.transition(RunState::PerRecord(row));
            let recipient = record.recipient().to_string();

            match self.process_record(record, transport) {
                Ok(()) => {
                    summary.sent += 1;
                    info!(row, to = %recipient, "Sent message");
                }
                Err(kind) => {
                    let failure = RowError {
                        row,
                        recipient,
                        kind,
                    };
                    self.transition(RunState::FailedRow(row));
                    match self.policy {
                        FailurePolicy::Abort => {
                            error!(error = %failure, "Aborting run");
                            self.transition(RunState::Aborted);
                            return Err(failure.into());
                        }
                        FailurePolicy::SkipAndLog => {
                            warn!(error = %failure, "Skipping record");
                            summary.failed.push(failure);
                        }
                    }
                }
            }
        }

        self.transition(RunState::Done);
        info!(
            sent = summary.sent,
            failed = summary.failed.len(),
            "Merge run finished"
        );
        Ok(summary)
    }

    /// Transform, render and send a single record.
    fn process_record(
        &self,
        record: Record,
        transport: &dyn TransportSink,
    ) -> Result<(), RowErrorKind> {
        if record.recipient().is_empty() {
            return Err(RowErrorKind::MissingRecipient);
        }

        let (record, assets) = self.chain.apply(record, self.prepared.assets.clone())?;
        let message =
            render_message(&self.prepared, &record, &assets).map_err(RowErrorKind::Render)?;
        let raw = message.formatted().map_err(RowErrorKind::Delivery)?;

        transport
            .send(&message.from_address, &message.to_address, &raw)
            .map_err(RowErrorKind::Delivery)
    }
}

/// Prepare, open the data file and run: the whole merge in one call.
pub fn run_merge(
    settings: &MergeSettings,
    registry: &TransformRegistry,
    transport: &dyn TransportSink,
) -> Result<RunSummary, Error> {
    let mut pipeline = Pipeline::prepare(settings, registry)?;

    let records = match RecordSource::open(&settings.data_path, &settings.address_column) {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "Aborting: failed to open data file");
            pipeline.transition(RunState::Aborted);
            return Err(e.into());
        }
    };
    info!(
        data = %settings.data_path.display(),
        columns = records.headers().len(),
        transport = transport.name(),
        "Starting merge run"
    );

    pipeline.run(records, transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Asset;
    use crate::error::{DeliveryError, TransformError};
    use crate::pipeline::Sender;
    use crate::template::TemplatePair;
    use crate::transforms::RowTransform;
    use crate::transport::DebugSink;

    struct FailOn(&'static str);

    impl RowTransform for FailOn {
        fn name(&self) -> &str {
            "fail_on"
        }

        fn process_row(
            &self,
            record: Record,
            assets: Vec<Asset>,
        ) -> Result<(Record, Vec<Asset>), TransformError> {
            if record.get("name") == Some(self.0) {
                return Err(TransformError::Failed(format!("refusing {}", self.0)));
            }
            Ok((record, assets))
        }
    }

    fn pipeline(text: &str, chain: TransformChain) -> Pipeline {
        let sender = Sender::new("gabbai@example.org", Some("Gabbai")).unwrap();
        let templates = TemplatePair::from_sources(Some(text), None, &[]).unwrap();
        let prepared = PreparedMerge::new(sender, "Hello ${name}", templates, vec![]).unwrap();
        Pipeline::new(prepared, chain)
    }

    fn records(rows: &[(&str, &str)]) -> Vec<Result<Record, LoadError>> {
        rows.iter()
            .map(|(email, name)| Ok(Record::new(*email).with_field("name", *name)))
            .collect()
    }

    #[test]
    fn sends_one_message_per_record() {
        let sink = DebugSink::new();
        let mut p = pipeline("Hi ${name}", TransformChain::new());

        let summary = p
            .run(records(&[("a@x.com", "Ann"), ("b@x.com", "Ben")]), &sink)
            .unwrap();
        assert_eq!(summary.sent, 2);
        assert!(summary.is_clean());
        assert_eq!(p.state(), RunState::Done);

        let sent = sink.messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(sent[1].to, "b@x.com");
        assert_eq!(sent[0].from, "gabbai@example.org");
    }

    #[test]
    fn abort_stops_at_first_failure() {
        let sink = DebugSink::new();
        let chain = TransformChain::new().with(Box::new(FailOn("Ben")));
        let mut p = pipeline("Hi ${name}", chain);

        let err = p
            .run(
                records(&[("a@x.com", "Ann"), ("b@x.com", "Ben"), ("c@x.com", "Cy")]),
                &sink,
            )
            .unwrap_err();
        let failure = match err {
            Error::Row(failure) => failure,
            other => panic!("expected a row error, got {other:?}"),
        };
        assert_eq!(failure.row, 2);
        assert_eq!(failure.recipient, "b@x.com");
        assert!(
            matches!(failure.kind, RowErrorKind::Transform { ref unit, .. } if unit == "fail_on")
        );
        assert_eq!(p.state(), RunState::Aborted);
        assert_eq!(sink.messages().len(), 1);
    }

    #[test]
    fn skip_and_log_continues() {
        let sink = DebugSink::new();
        let chain = TransformChain::new().with(Box::new(FailOn("Ben")));
        let mut p = pipeline("Hi ${name}", chain).with_policy(FailurePolicy::SkipAndLog);

        let summary = p
            .run(
                records(&[("a@x.com", "Ann"), ("b@x.com", "Ben"), ("c@x.com", "Cy")]),
                &sink,
            )
            .unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].kind.stage(), "transform");
        assert_eq!(p.state(), RunState::Done);

        let to: Vec<String> = sink.messages().into_iter().map(|m| m.to).collect();
        assert_eq!(to, ["a@x.com", "c@x.com"]);
    }

    #[test]
    fn render_failure_names_recipient() {
        let sink = DebugSink::new();
        let mut p = pipeline("Hi ${nickname}", TransformChain::new());

        let err = p.run(records(&[("a@x.com", "Ann")]), &sink).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("a@x.com"), "{msg}");
        assert!(msg.contains("render"), "{msg}");
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn blank_recipient_is_row_scoped() {
        let sink = DebugSink::new();
        let mut p =
            pipeline("Hi ${name}", TransformChain::new()).with_policy(FailurePolicy::SkipAndLog);

        let summary = p
            .run(records(&[("", "Ann"), ("b@x.com", "Ben")]), &sink)
            .unwrap();
        assert_eq!(summary.sent, 1);
        assert!(matches!(
            summary.failed[0].kind,
            RowErrorKind::MissingRecipient
        ));
    }

    #[test]
    fn invalid_recipient_is_a_delivery_failure() {
        let sink = DebugSink::new();
        let mut p = pipeline("Hi ${name}", TransformChain::new());

        let err = p
            .run(records(&[("not-an-address", "Ann")]), &sink)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Row(RowError {
                kind: RowErrorKind::Delivery(DeliveryError::InvalidAddress { .. }),
                ..
            })
        ));
    }

    #[test]
    fn unreadable_record_aborts_regardless_of_policy() {
        let sink = DebugSink::new();
        let mut p =
            pipeline("Hi ${name}", TransformChain::new()).with_policy(FailurePolicy::SkipAndLog);

        let input = vec![
            Ok(Record::new("a@x.com").with_field("name", "Ann")),
            Err(LoadError::Data {
                path: "people.csv".into(),
                reason: "row 2: wrong number of fields".into(),
            }),
        ];
        let err = p.run(input, &sink).unwrap_err();
        assert!(matches!(err, Error::Load(_)));
        assert_eq!(p.state(), RunState::Aborted);
        assert_eq!(sink.messages().len(), 1);
    }

    #[test]
    fn failure_policy_parses() {
        assert_eq!("abort".parse::<FailurePolicy>().unwrap(), FailurePolicy::Abort);
        assert_eq!(" Skip ".parse::<FailurePolicy>().unwrap(), FailurePolicy::SkipAndLog);
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
