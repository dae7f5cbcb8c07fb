use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;

use crate::batch::UpdateBatch;
use crate::domain::{NormalizedRecord, RawRow};
use crate::error::LineageError;
use crate::input::{parse_tsv, read_input};
use crate::normalize::{normalize, record_warnings};
use crate::sink::{SinkConnector, WriteSummary, apply_batch};

/// Everything computed before touching the database.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub input: String,
    pub rows: usize,
    pub warnings: usize,
    pub batch: UpdateBatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub input: String,
    pub rows: usize,
    pub operations: usize,
    pub warnings: usize,
    pub write: WriteSummary,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.write.is_success()
    }

    pub fn into_outcome(self) -> Result<SyncResult, LineageError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(LineageError::Write {
                failed: self.write.failed,
                total: self.write.requested,
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: SinkConnector> {
    connector: C,
    batch_size: usize,
}

impl<C: SinkConnector> App<C> {
    pub fn new(connector: C, batch_size: usize) -> Self {
        Self {
            connector,
            batch_size,
        }
    }

    /// Reads, parses and normalizes the input and builds the update batch.
    pub fn plan(
        &self,
        input: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<SyncPlan, LineageError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Read; loading {input}"),
            elapsed: None,
        });

        let text = read_input(input)?;
        let rows = parse_tsv(&text, input)?;
        sink.event(ProgressEvent {
            message: format!("phase=Parse; got {} metadata records", rows.len()),
            elapsed: Some(started.elapsed()),
        });

        let records = rows.iter().map(normalize).collect::<Vec<_>>();
        let warnings = report_warnings(&rows, &records);
        let batch = UpdateBatch::build(&records);
        sink.event(ProgressEvent {
            message: format!("phase=Build; {} update operations", batch.len()),
            elapsed: Some(started.elapsed()),
        });

        Ok(SyncPlan {
            input: input.to_string(),
            rows: rows.len(),
            warnings,
            batch,
        })
    }

    /// Runs the whole pipeline. A batch with nothing to send never opens a
    /// connection.
    /// The connection is released before this returns on every path.
    pub fn sync(
        &self,
        input: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<SyncResult, LineageError> {
        let plan = self.plan(input, sink)?;

        if plan.batch.keyed_len() == 0 {
            sink.event(ProgressEvent {
                message: "phase=Write; nothing to update".to_string(),
                elapsed: None,
            });
            if !plan.batch.is_empty() {
                tracing::warn!(
                    skipped = plan.batch.len(),
                    "operations without gisaid_epi_isl were not sent"
                );
            }
            return Ok(SyncResult {
                input: plan.input,
                rows: plan.rows,
                operations: plan.batch.len(),
                warnings: plan.warnings,
                write: WriteSummary {
                    requested: plan.batch.len(),
                    skipped: plan.batch.len(),
                    ..WriteSummary::default()
                },
            });
        }

        let started = Instant::now();
        sink.event(ProgressEvent {
            message: "phase=Connect; opening database connection".to_string(),
            elapsed: None,
        });
        let write = {
            let database = self.connector.connect()?;
            sink.event(ProgressEvent {
                message: format!("phase=Write; sending {} operations", plan.batch.len()),
                elapsed: Some(started.elapsed()),
            });
            apply_batch(&database, &plan.batch, self.batch_size)
        };
        sink.event(ProgressEvent {
            message: format!(
                "phase=Write; matched {} modified {} failed {} skipped {}",
                write.matched, write.modified, write.failed, write.skipped
            ),
            elapsed: Some(started.elapsed()),
        });

        Ok(SyncResult {
            input: plan.input,
            rows: plan.rows,
            operations: plan.batch.len(),
            warnings: plan.warnings,
            write,
        })
    }
}

fn report_warnings(rows: &[RawRow], records: &[NormalizedRecord]) -> usize {
    let mut by_kind = BTreeMap::<String, usize>::new();
    for (index, (row, record)) in rows.iter().zip(records).enumerate() {
        for warning in record_warnings(row, record) {
            tracing::debug!(
                row = index + 1,
                id = record.id.as_deref().unwrap_or("-"),
                "{warning}"
            );
            *by_kind.entry(warning.to_string()).or_default() += 1;
        }
    }
    for (kind, count) in &by_kind {
        tracing::warn!(count, "{kind}");
    }
    by_kind.values().sum()
}
