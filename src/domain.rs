use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

/// One data line of the metadata export, keyed by header column name.
///
/// Values are kept exactly as they appeared in the file. A column is absent
/// when the line ended before reaching it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    values: HashMap<String, String>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub subregion: String,
    pub country: String,
    pub state: String,
    pub locality: String,
}

/// Result of reading a leading integer out of a free-text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedInt {
    Value(i64),
    NotANumber,
}

impl ParsedInt {
    pub fn value(&self) -> Option<i64> {
        match self {
            ParsedInt::Value(value) => Some(*value),
            ParsedInt::NotANumber => None,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, ParsedInt::NotANumber)
    }
}

impl fmt::Display for ParsedInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedInt::Value(value) => write!(f, "{value}"),
            ParsedInt::NotANumber => write!(f, "NaN"),
        }
    }
}

/// Parsed form of a date column. `Missing` and `Invalid` are distinct:
/// the first means the column was absent, the second that it held text
/// no accepted format could read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedDate {
    Missing,
    Invalid,
    Valid(DateTime<Utc>),
}

impl ParsedDate {
    pub fn date(&self) -> Option<DateTime<Utc>> {
        match self {
            ParsedDate::Valid(date) => Some(*date),
            ParsedDate::Missing | ParsedDate::Invalid => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ParsedDate::Invalid)
    }
}

/// A metadata row mapped onto the stored document shape.
///
/// Several source values are intentionally carried under more than one key
/// (`address`/`lab`/`originating_lab`, `submitter`/`submitting_lab`,
/// `gender`/`sex`, `length`/`seq_length`) so both historical schema shapes
/// stay populated. `assembly`, `coverage`, `technology` and `kind` have no
/// source column and are always `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub lab: Option<String>,
    pub originating_lab: Option<String>,
    pub submitter: Option<String>,
    pub submitting_lab: Option<String>,
    pub authors: Option<String>,
    pub host: Option<String>,
    pub genbank_accession: Option<String>,
    pub age: ParsedInt,
    pub length: ParsedInt,
    pub seq_length: ParsedInt,
    pub gender: Option<String>,
    pub sex: Option<String>,
    pub collected: ParsedDate,
    pub original_collected: Option<String>,
    pub submitted: ParsedDate,
    pub original_submitted: Option<String>,
    pub location: Location,
    pub nextstrain_clade: Option<String>,
    pub pangolin_lineage: Option<String>,
    pub gisaid_clade: Option<String>,
    pub assembly: Option<String>,
    pub coverage: Option<String>,
    pub technology: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationWarning {
    MissingAccession,
    UnparsableAge,
    UnparsableLength,
    InvalidCollectionDate,
    InvalidSubmissionDate,
}

impl fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationWarning::MissingAccession => write!(f, "missing gisaid_epi_isl"),
            NormalizationWarning::UnparsableAge => write!(f, "age is not a number"),
            NormalizationWarning::UnparsableLength => write!(f, "length is not a number"),
            NormalizationWarning::InvalidCollectionDate => write!(f, "invalid collection date"),
            NormalizationWarning::InvalidSubmissionDate => write!(f, "invalid submission date"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_row_lookup() {
        let row: RawRow = [("strain", "hCoV-19/X/1/2020"), ("age", "")]
            .into_iter()
            .collect();
        assert_eq!(row.get("strain"), Some("hCoV-19/X/1/2020"));
        assert_eq!(row.get("age"), Some(""));
        assert_eq!(row.get("sex"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn sentinels_are_distinct_from_absence() {
        assert_eq!(ParsedInt::NotANumber.value(), None);
        assert_eq!(ParsedInt::NotANumber.to_string(), "NaN");
        assert!(ParsedDate::Invalid.is_invalid());
        assert!(!ParsedDate::Missing.is_invalid());
        assert_ne!(ParsedDate::Invalid, ParsedDate::Missing);
    }
}
