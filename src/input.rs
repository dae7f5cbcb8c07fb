use std::fs;
use std::io::Read;

use camino::Utf8Path;
use csv::ReaderBuilder;
use flate2::read::MultiGzDecoder;

use crate::domain::RawRow;
use crate::error::LineageError;

/// Loads the whole metadata file into memory. Paths ending in `.gz` are
/// decompressed first. Invalid UTF-8 sequences are replaced rather than
/// rejected.
pub fn read_input(path: &Utf8Path) -> Result<String, LineageError> {
    let bytes = fs::read(path).map_err(|err| input_error(path, err))?;

    let bytes = if path.extension() == Some("gz") {
        let mut decoded = Vec::new();
        MultiGzDecoder::new(bytes.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|err| input_error(path, err))?;
        decoded
    } else {
        bytes
    };

    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            tracing::warn!(%path, "input is not valid UTF-8; replacing invalid sequences");
            Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
        }
    }
}

fn input_error(path: &Utf8Path, err: std::io::Error) -> LineageError {
    LineageError::InputRead {
        path: path.as_std_path().to_path_buf(),
        reason: err.to_string(),
    }
}

/// Splits tab-separated text into rows keyed by the header line.
///
/// Short lines leave their trailing columns absent and fields beyond the
/// header width are dropped. A header-only input yields no rows.
pub fn parse_tsv(text: &str, source: &Utf8Path) -> Result<Vec<RawRow>, LineageError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|err| LineageError::InputParse(err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    if headers.iter().all(|column| column.trim().is_empty()) {
        return Err(LineageError::MissingHeader(
            source.as_std_path().to_path_buf(),
        ));
    }

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|err| {
            LineageError::InputParse(format!("data line {}: {err}", index + 1))
        })?;
        if record.len() < headers.len() {
            tracing::debug!(
                line = index + 1,
                fields = record.len(),
                columns = headers.len(),
                "short row; trailing columns left absent"
            );
        }
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(column, value)| (column.as_str(), value))
            .collect::<RawRow>();
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn source() -> &'static Utf8Path {
        Utf8Path::new("metadata.tsv")
    }

    #[test]
    fn parses_rows_against_header() {
        let text = "strain\tgisaid_epi_isl\tpangolin_lineage\n\
                    hCoV-19/X/1/2020\tEPI_ISL_1\tB.1\n\
                    hCoV-19/X/2/2020\tEPI_ISL_2\tB.1.1.7\n";
        let rows = parse_tsv(text, source()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("gisaid_epi_isl"), Some("EPI_ISL_1"));
        assert_eq!(rows[1].get("pangolin_lineage"), Some("B.1.1.7"));
    }

    #[test]
    fn short_row_leaves_trailing_columns_absent() {
        let text = "strain\tgisaid_epi_isl\tpangolin_lineage\nhCoV-19/X/1/2020\tEPI_ISL_1\n";
        let rows = parse_tsv(text, source()).unwrap();
        assert_eq!(rows[0].get("gisaid_epi_isl"), Some("EPI_ISL_1"));
        assert_eq!(rows[0].get("pangolin_lineage"), None);
    }

    #[test]
    fn extra_fields_are_dropped() {
        let text = "strain\tage\nA\t5\tsurplus\n";
        let rows = parse_tsv(text, source()).unwrap();
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0].get("age"), Some("5"));
    }

    #[test]
    fn header_only_yields_no_rows() {
        let rows = parse_tsv("strain\tgisaid_epi_isl\n", source()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn empty_input_is_missing_header() {
        let err = parse_tsv("", source()).unwrap_err();
        assert_matches!(err, LineageError::MissingHeader(_));
    }
}
