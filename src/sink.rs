use mongodb::bson::{Bson, Document, doc};
use mongodb::sync::{Client, Database};
use serde::Serialize;

use crate::batch::{UpdateBatch, UpdateOperation};
use crate::config::Settings;
use crate::error::LineageError;

/// An update whose record carried an accession, ready to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyedUpdate<'a> {
    pub id: &'a str,
    pub pangolin_lineage: Option<&'a str>,
}

impl<'a> KeyedUpdate<'a> {
    pub fn from_operation(operation: &'a UpdateOperation) -> Option<Self> {
        Some(Self {
            id: operation.id.as_deref()?,
            pangolin_lineage: operation.pangolin_lineage.as_deref(),
        })
    }
}

/// Server-reported result of one bulk request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub matched: usize,
    pub modified: usize,
    pub failed: usize,
}

pub trait DocumentSink {
    /// Sends `updates` as one unordered request. Each update applies to
    /// every document whose `id` matches; matching nothing is not a failure.
    fn bulk_update(&self, updates: &[KeyedUpdate<'_>]) -> Result<BulkOutcome, LineageError>;
}

pub trait SinkConnector {
    type Sink: DocumentSink;

    fn connect(&self) -> Result<Self::Sink, LineageError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub requested: usize,
    pub matched: usize,
    pub modified: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl WriteSummary {
    pub fn succeeded(&self) -> usize {
        self.requested
            .saturating_sub(self.failed)
            .saturating_sub(self.skipped)
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Sends the batch in chunks of at most `batch_size` updates. A chunk whose
/// request fails outright counts every update in it as failed; later chunks
/// are still sent. Operations without an id are skipped.
pub fn apply_batch<S: DocumentSink>(
    sink: &S,
    batch: &UpdateBatch,
    batch_size: usize,
) -> WriteSummary {
    let keyed = batch
        .operations
        .iter()
        .filter_map(KeyedUpdate::from_operation)
        .collect::<Vec<_>>();

    let mut summary = WriteSummary {
        requested: batch.len(),
        skipped: batch.len() - keyed.len(),
        ..WriteSummary::default()
    };
    if summary.skipped > 0 {
        tracing::warn!(
            skipped = summary.skipped,
            "operations without gisaid_epi_isl were not sent"
        );
    }

    for (index, chunk) in keyed.chunks(batch_size.max(1)).enumerate() {
        match sink.bulk_update(chunk) {
            Ok(outcome) => {
                tracing::debug!(
                    chunk = index,
                    operations = chunk.len(),
                    matched = outcome.matched,
                    modified = outcome.modified,
                    failed = outcome.failed,
                    "bulk update chunk applied"
                );
                summary.matched += outcome.matched;
                summary.modified += outcome.modified;
                summary.failed += outcome.failed.min(chunk.len());
            }
            Err(err) => {
                tracing::error!(
                    chunk = index,
                    operations = chunk.len(),
                    error = %err,
                    "bulk update chunk failed"
                );
                summary.failed += chunk.len();
            }
        }
    }

    summary
}

pub struct MongoConnector {
    settings: Settings,
}

impl MongoConnector {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl SinkConnector for MongoConnector {
    type Sink = MongoSink;

    /// Opens the client and pings the server so an unreachable database is
    /// reported before any update is attempted.
    fn connect(&self) -> Result<MongoSink, LineageError> {
        let client = Client::with_uri_str(&self.settings.uri)
            .map_err(|err| LineageError::Connection(err.to_string()))?;
        let database = client.database(&self.settings.database);
        database
            .run_command(doc! { "ping": 1 })
            .run()
            .map_err(|err| LineageError::Connection(err.to_string()))?;
        tracing::info!(
            database = %self.settings.database,
            collection = %self.settings.collection,
            "database connection established"
        );
        Ok(MongoSink {
            _client: client,
            database,
            collection: self.settings.collection.clone(),
        })
    }
}

/// Holds the client for the duration of one run. Dropping it hands the
/// connection pool back to the driver, which closes it in the background.
pub struct MongoSink {
    _client: Client,
    database: Database,
    collection: String,
}

impl DocumentSink for MongoSink {
    fn bulk_update(&self, updates: &[KeyedUpdate<'_>]) -> Result<BulkOutcome, LineageError> {
        let reply = self
            .database
            .run_command(update_command(&self.collection, updates))
            .run()
            .map_err(|err| LineageError::BulkRequest(err.to_string()))?;
        Ok(outcome_from_reply(&reply, updates.len()))
    }
}

fn update_command(collection: &str, updates: &[KeyedUpdate<'_>]) -> Document {
    let statements = updates
        .iter()
        .map(|update| {
            doc! {
                "q": { "id": update.id },
                "u": { "$set": { "pangolinLineage": update.pangolin_lineage } },
                "multi": true,
            }
        })
        .collect::<Vec<_>>();
    doc! {
        "update": collection,
        "updates": statements,
        "ordered": false,
    }
}

fn outcome_from_reply(reply: &Document, sent: usize) -> BulkOutcome {
    let write_errors = reply
        .get_array("writeErrors")
        .map(|errors| errors.len())
        .unwrap_or(0);
    for error in reply.get_array("writeErrors").into_iter().flatten() {
        if let Bson::Document(error) = error {
            tracing::warn!(
                index = count(error, "index"),
                code = count(error, "code"),
                errmsg = error.get_str("errmsg").unwrap_or_default(),
                "update rejected"
            );
        }
    }

    let failed = if reply.contains_key("writeConcernError") {
        tracing::warn!("write concern not satisfied for bulk update");
        sent
    } else {
        write_errors
    };

    BulkOutcome {
        matched: count(reply, "n"),
        modified: count(reply, "nModified"),
        failed,
    }
}

fn count(document: &Document, key: &str) -> usize {
    match document.get(key) {
        Some(Bson::Int32(value)) => usize::try_from(*value).unwrap_or(0),
        Some(Bson::Int64(value)) => usize::try_from(*value).unwrap_or(0),
        Some(Bson::Double(value)) if *value >= 0.0 => *value as usize,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct RecordingSink {
        chunks: RefCell<Vec<Vec<String>>>,
        fail_chunk: Option<usize>,
    }

    impl DocumentSink for RecordingSink {
        fn bulk_update(&self, updates: &[KeyedUpdate<'_>]) -> Result<BulkOutcome, LineageError> {
            let mut chunks = self.chunks.borrow_mut();
            chunks.push(updates.iter().map(|u| u.id.to_string()).collect());
            if self.fail_chunk == Some(chunks.len() - 1) {
                return Err(LineageError::BulkRequest("reset by peer".to_string()));
            }
            Ok(BulkOutcome {
                matched: updates.len(),
                modified: updates.len(),
                failed: 0,
            })
        }
    }

    fn op(id: Option<&str>) -> UpdateOperation {
        UpdateOperation {
            id: id.map(str::to_string),
            pangolin_lineage: Some("B.1".to_string()),
        }
    }

    #[test]
    fn chunks_and_skips_missing_ids() {
        let sink = RecordingSink {
            chunks: RefCell::new(Vec::new()),
            fail_chunk: None,
        };
        let batch = UpdateBatch {
            operations: vec![op(Some("a")), op(None), op(Some("b")), op(Some("c"))],
        };
        let summary = apply_batch(&sink, &batch, 2);
        assert_eq!(
            *sink.chunks.borrow(),
            vec![vec!["a".to_string(), "b".to_string()], vec!["c".to_string()]]
        );
        assert_eq!(summary.requested, 4);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.matched, 3);
        assert_eq!(summary.succeeded(), 3);
        assert!(summary.is_success());
    }

    #[test]
    fn failed_chunk_counts_every_update() {
        let sink = RecordingSink {
            chunks: RefCell::new(Vec::new()),
            fail_chunk: Some(0),
        };
        let batch = UpdateBatch {
            operations: vec![op(Some("a")), op(Some("b")), op(Some("c"))],
        };
        let summary = apply_batch(&sink, &batch, 2);
        assert_eq!(sink.chunks.borrow().len(), 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.succeeded(), 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn reply_with_write_errors() {
        let reply = doc! {
            "n": 3,
            "nModified": 2,
            "writeErrors": [ { "index": 1, "code": 2, "errmsg": "bad" } ],
            "ok": 1.0,
        };
        let outcome = outcome_from_reply(&reply, 4);
        assert_eq!(
            outcome,
            BulkOutcome {
                matched: 3,
                modified: 2,
                failed: 1,
            }
        );
    }

    #[test]
    fn write_concern_error_fails_whole_request() {
        let reply = doc! { "n": 2, "nModified": 2, "writeConcernError": { "code": 64 }, "ok": 1.0 };
        assert_eq!(outcome_from_reply(&reply, 2).failed, 2);
    }

    #[test]
    fn update_command_shape() {
        let updates = [
            KeyedUpdate {
                id: "epi_isl_999",
                pangolin_lineage: Some("B.1"),
            },
            KeyedUpdate {
                id: "epi_isl_1",
                pangolin_lineage: None,
            },
        ];
        let command = update_command("records", &updates);
        assert_eq!(command.get_str("update").unwrap(), "records");
        assert_eq!(command.get_bool("ordered").unwrap(), false);

        let statements = command.get_array("updates").unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            Bson::Document(doc! {
                "q": { "id": "epi_isl_999" },
                "u": { "$set": { "pangolinLineage": "B.1" } },
                "multi": true,
            })
        );
        assert_eq!(
            statements[1],
            Bson::Document(doc! {
                "q": { "id": "epi_isl_1" },
                "u": { "$set": { "pangolinLineage": Bson::Null } },
                "multi": true,
            })
        );
    }
}
