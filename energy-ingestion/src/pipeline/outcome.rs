use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    sinks::{WriteError, WriteErrorKind},
    transform::RejectionReason,
};

/// What happened to every record of one batch.
///
/// `accepted + rejected + incomplete == received` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub received: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub incomplete: usize,
    pub alerts_sent: usize,
    pub failures: Vec<RecordFailure>,
    pub alert_failures: Vec<AlertFailure>,
    /// Re-running the whole batch may turn failures into acceptances.
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub index: usize,
    pub site_id: Option<String>,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Rejected {
        rejection: RejectionReason,
    },
    WriteFailed {
        write_error: WriteErrorKind,
        attempts: u32,
        message: String,
    },
    Incomplete,
}

impl FailureReason {
    /// Whether running the record again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Incomplete
                | Self::WriteFailed {
                    write_error: WriteErrorKind::Transient,
                    ..
                }
        )
    }
}

impl From<WriteError> for FailureReason {
    fn from(e: WriteError) -> Self {
        Self::WriteFailed {
            write_error: e.kind,
            attempts: e.attempts,
            message: e.message,
        }
    }
}

/// An accepted reading whose notification could not be delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertFailure {
    pub index: usize,
    pub site_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub error: String,
}

/// Terminal state of one record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RecordResult {
    Accepted { alert: AlertStatus },
    Rejected { reason: FailureReason },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AlertStatus {
    NotNeeded,
    Sent,
    Failed {
        timestamp: OffsetDateTime,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordOutcome {
    pub index: usize,
    pub site_id: Option<String>,
    pub result: RecordResult,
}

/// Single-owner accumulator fed with per-record outcomes.
pub(crate) struct BatchAccumulator {
    reported: Vec<bool>,
    site_hints: Vec<Option<String>>,
    outcome: BatchOutcome,
}

impl BatchAccumulator {
    /// `site_hints[i]` is the raw `site_id` of record `i`, if it had one.
    pub fn new(batch_id: &str, site_hints: Vec<Option<String>>) -> Self {
        let received = site_hints.len();
        Self {
            reported: vec![false; received],
            site_hints,
            outcome: BatchOutcome {
                batch_id: batch_id.to_string(),
                received,
                accepted: 0,
                rejected: 0,
                incomplete: 0,
                alerts_sent: 0,
                failures: Vec::new(),
                alert_failures: Vec::new(),
                retryable: false,
            },
        }
    }

    pub fn record(&mut self, record: RecordOutcome) {
        match self.reported.get_mut(record.index) {
            Some(seen) if !*seen => *seen = true,
            _ => {
                tracing::warn!(index = record.index, "ignoring duplicate or out-of-range record outcome");
                return;
            }
        }

        match record.result {
            RecordResult::Accepted { alert } => {
                self.outcome.accepted += 1;
                match alert {
                    AlertStatus::NotNeeded => {}
                    AlertStatus::Sent => self.outcome.alerts_sent += 1,
                    AlertStatus::Failed { timestamp, error } => {
                        self.outcome.alert_failures.push(AlertFailure {
                            index: record.index,
                            site_id: record.site_id.unwrap_or_default(),
                            timestamp,
                            error,
                        })
                    }
                }
            }
            RecordResult::Rejected { reason } => {
                self.outcome.rejected += 1;
                self.outcome.failures.push(RecordFailure {
                    index: record.index,
                    site_id: record.site_id,
                    reason,
                });
            }
        }
    }

    /// Close the batch; records that never reported are `Incomplete`.
    pub fn finish(mut self) -> BatchOutcome {
        for (index, seen) in self.reported.iter().enumerate() {
            if !*seen {
                self.outcome.incomplete += 1;
                self.outcome.failures.push(RecordFailure {
                    index,
                    site_id: self.site_hints[index].take(),
                    reason: FailureReason::Incomplete,
                });
            }
        }

        self.outcome.failures.sort_by_key(|f| f.index);
        self.outcome.alert_failures.sort_by_key(|f| f.index);

        self.outcome.retryable = self.outcome.failures.iter().any(|f| f.reason.is_retryable());

        self.outcome
    }
}
