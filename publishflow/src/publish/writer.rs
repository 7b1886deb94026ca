//! Bulk writes with per-record fallback.

use crate::context::RunContext;
use crate::ports::{RecordService, RemoteRecord};
use tracing::{debug, warn};

/// One record waiting to be written, tied to its source row.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    /// The source row number.
    pub row_number: u64,
    /// The source id of the record.
    pub source_id: String,
    /// The record to send.
    pub record: RemoteRecord,
}

impl PendingWrite {
    /// Creates a pending write.
    #[must_use]
    pub fn new(row_number: u64, source_id: impl Into<String>, record: RemoteRecord) -> Self {
        Self {
            row_number,
            source_id: source_id.into(),
            record,
        }
    }
}

/// What happened to one pending write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The source row number.
    pub row_number: u64,
    /// The source id of the record.
    pub source_id: String,
    /// The remote id, when the write succeeded.
    pub target_id: Option<String>,
    /// The failure message, when it did not.
    pub error: Option<String>,
}

impl WriteOutcome {
    /// Returns true if the record was written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-record results of one batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Outcomes in input order.
    pub outcomes: Vec<WriteOutcome>,
    /// Whether the bulk call failed and records were written one by one.
    pub used_fallback: bool,
}

impl WriteReport {
    /// Returns the number of records written.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Returns the number of records that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Writes a batch in one round trip, falling back to one call per record.
#[derive(Debug)]
pub struct BulkWriter<'a> {
    ctx: &'a RunContext,
    type_name: &'a str,
    instance_name: &'a str,
}

impl<'a> BulkWriter<'a> {
    /// Creates a writer that logs against `type_name` and `instance_name`.
    #[must_use]
    pub fn new(ctx: &'a RunContext, type_name: &'a str, instance_name: &'a str) -> Self {
        Self {
            ctx,
            type_name,
            instance_name,
        }
    }

    /// Inserts (`is_insert`) or updates every write.
    ///
    /// The bulk call is trusted only when it succeeds with exactly one id
    /// per record; ids are then assigned positionally. Any other result is
    /// logged as a warning and every record is retried individually, with
    /// failures logged against the originating row.
    pub async fn write_batch(
        &self,
        service: &dyn RecordService,
        writes: Vec<PendingWrite>,
        is_insert: bool,
    ) -> WriteReport {
        if writes.is_empty() {
            return WriteReport::default();
        }

        let records: Vec<RemoteRecord> = writes.iter().map(|w| w.record.clone()).collect();
        let bulk = if is_insert {
            service.bulk_add(records).await
        } else {
            service.bulk_update(records).await
        };

        let failure = match bulk {
            Ok(ids) if ids.len() == writes.len() => {
                debug!(
                    type_name = self.type_name,
                    instance = self.instance_name,
                    records = ids.len(),
                    "Bulk write succeeded"
                );
                let outcomes = writes
                    .into_iter()
                    .zip(ids)
                    .map(|(write, id)| WriteOutcome {
                        row_number: write.row_number,
                        source_id: write.source_id,
                        target_id: Some(id),
                        error: None,
                    })
                    .collect();
                return WriteReport {
                    outcomes,
                    used_fallback: false,
                };
            }
            Ok(ids) => format!("returned {} result(s) for {} record(s)", ids.len(), writes.len()),
            Err(e) => e.to_string(),
        };

        warn!(
            type_name = self.type_name,
            instance = self.instance_name,
            records = writes.len(),
            "Bulk write failed, writing records individually"
        );
        self.ctx
            .warning(
                self.type_name,
                self.instance_name,
                0,
                format!("Bulk write to '{}' failed ({failure}); retrying each record individually", service.entity()),
            )
            .await;

        let mut outcomes = Vec::with_capacity(writes.len());
        for write in writes {
            let result = if is_insert {
                service.add(write.record).await
            } else {
                service.update(write.record).await
            };
            let outcome = match result {
                Ok(id) => WriteOutcome {
                    row_number: write.row_number,
                    source_id: write.source_id,
                    target_id: Some(id),
                    error: None,
                },
                Err(e) => {
                    let message = format!("'{}' could not be written: {e}", write.source_id);
                    self.ctx
                        .error(self.type_name, self.instance_name, write.row_number, message.clone())
                        .await;
                    WriteOutcome {
                        row_number: write.row_number,
                        source_id: write.source_id,
                        target_id: None,
                        error: Some(message),
                    }
                }
            };
            outcomes.push(outcome);
        }

        WriteReport {
            outcomes,
            used_fallback: true,
        }
    }
}
