use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;

use crate::domain::{
    Location, NormalizationWarning, NormalizedRecord, ParsedDate, ParsedInt, RawRow,
};

static LEADING_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*([+-]?[0-9]+)").unwrap());

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Maps one metadata row onto the stored record shape. Never fails: values
/// that cannot be read are carried as sentinels.
pub fn normalize(row: &RawRow) -> NormalizedRecord {
    let originating_lab = text(row, "originating_lab");
    let submitting_lab = text(row, "submitting_lab");
    let sex = text(row, "sex");
    let length = parse_leading_int(row.get("length"));
    let original_collected = text(row, "date");
    let original_submitted = text(row, "date_submitted");

    NormalizedRecord {
        id: accession_id(row.get("gisaid_epi_isl")),
        name: text(row, "strain"),
        address: originating_lab.clone(),
        lab: originating_lab.clone(),
        originating_lab,
        submitter: submitting_lab.clone(),
        submitting_lab,
        authors: text(row, "authors"),
        host: text(row, "host"),
        genbank_accession: text(row, "genbank_accession"),
        age: parse_leading_int(row.get("age")),
        length,
        seq_length: length,
        gender: sex.clone(),
        sex,
        collected: parse_date(original_collected.as_deref()),
        original_collected,
        submitted: parse_date(original_submitted.as_deref()),
        original_submitted,
        location: location(row),
        nextstrain_clade: text(row, "Nextstrain_clade"),
        pangolin_lineage: text(row, "pangolin_lineage"),
        gisaid_clade: text(row, "GISAID_clade"),
        assembly: None,
        coverage: None,
        technology: None,
        kind: None,
    }
}

/// Per-record findings that do not stop the run. Numbers only warn when
/// the column was present.
pub fn record_warnings(row: &RawRow, record: &NormalizedRecord) -> Vec<NormalizationWarning> {
    let mut warnings = Vec::new();
    if record.id.is_none() {
        warnings.push(NormalizationWarning::MissingAccession);
    }
    if row.get("age").is_some() && record.age.is_nan() {
        warnings.push(NormalizationWarning::UnparsableAge);
    }
    if row.get("length").is_some() && record.length.is_nan() {
        warnings.push(NormalizationWarning::UnparsableLength);
    }
    if record.collected.is_invalid() {
        warnings.push(NormalizationWarning::InvalidCollectionDate);
    }
    if record.submitted.is_invalid() {
        warnings.push(NormalizationWarning::InvalidSubmissionDate);
    }
    warnings
}

fn text(row: &RawRow, column: &str) -> Option<String> {
    row.get(column).map(str::to_string)
}

/// Join key for stored documents: trimmed and lowercased. Blank values
/// count as missing.
pub fn accession_id(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}

fn location(row: &RawRow) -> Location {
    let trimmed = |column: &str| row.get(column).unwrap_or_default().trim().to_string();
    Location {
        subregion: trimmed("region"),
        country: trimmed("country"),
        state: trimmed("division"),
        locality: trimmed("location"),
    }
}

/// Reads the integer at the start of `value`, ignoring whatever follows it
/// (`"42 years"` is 42). Anything without leading digits is `NotANumber`,
/// and so is a digit run too long for an `i64`.
pub fn parse_leading_int(value: Option<&str>) -> ParsedInt {
    value
        .and_then(|value| LEADING_INT.captures(value))
        .and_then(|captures| captures[1].parse::<i64>().ok())
        .map(ParsedInt::Value)
        .unwrap_or(ParsedInt::NotANumber)
}

/// Accepts `YYYYMMDD`, RFC 3339 timestamps, naive ISO-8601 date-times,
/// `YYYY-MM-DD`, `YYYY-MM` and `YYYY`. Values without an offset are taken
/// as UTC; partial dates resolve to the first day of the period.
pub fn parse_date(value: Option<&str>) -> ParsedDate {
    let Some(value) = value else {
        return ParsedDate::Missing;
    };
    let value = value.trim();

    if let Some(date) = parse_compact_date(value) {
        return ParsedDate::Valid(midnight(date));
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return ParsedDate::Valid(timestamp.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return ParsedDate::Valid(timestamp.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return ParsedDate::Valid(midnight(date));
    }
    if let Some(date) = parse_partial_date(value) {
        return ParsedDate::Valid(midnight(date));
    }
    ParsedDate::Invalid
}

fn parse_compact_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let year = value[0..4].parse().ok()?;
    let month = value[4..6].parse().ok()?;
    let day = value[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_partial_date(value: &str) -> Option<NaiveDate> {
    let digits = |part: &str, width: usize| {
        part.len() == width && part.bytes().all(|byte| byte.is_ascii_digit())
    };
    match value.split_once('-') {
        Some((year, month)) if digits(year, 4) && digits(month, 2) => {
            NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
        }
        None if digits(value, 4) => NaiveDate::from_ymd_opt(value.parse().ok()?, 1, 1),
        _ => None,
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
