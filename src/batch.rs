use serde::Serialize;

use crate::domain::NormalizedRecord;

/// Sets `pangolinLineage` on every document whose `id` equals `id`.
///
/// Only the lineage is written even though the record also carries the
/// Nextstrain and GISAID clades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOperation {
    pub id: Option<String>,
    #[serde(rename = "pangolinLineage")]
    pub pangolin_lineage: Option<String>,
}

impl UpdateOperation {
    pub fn from_record(record: &NormalizedRecord) -> Self {
        Self {
            id: record.id.clone(),
            pangolin_lineage: record.pangolin_lineage.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateBatch {
    pub operations: Vec<UpdateOperation>,
}

impl UpdateBatch {
    /// One operation per record, in input order. Records sharing an id are
    /// not merged.
    pub fn build(records: &[NormalizedRecord]) -> Self {
        Self {
            operations: records.iter().map(UpdateOperation::from_record).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations that carry an id and so can be sent.
    pub fn keyed_len(&self) -> usize {
        self.operations.iter().filter(|op| op.id.is_some()).count()
    }
}
