//! Converter CSV parsing and line-protocol encoding.
//!
//! Column 0 of every converter row is a decimal seconds-since-epoch
//! timestamp; the remaining columns line up with a [`DatumDictionary`].
//! Rows become [`ParsedRow`]s and then one line each in a
//! [`MeasurementBatch`]:
//!
//! ```text
//! sdbfull AZR.POSITION=5,ELR.POSITION=12.5 1552659000000000000
//! ```

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::dictionary::DatumDictionary;

/// Measurement written on every line unless configured otherwise.
pub const DEFAULT_MEASUREMENT: &str = "sdbfull";

/// Database named in the bulk-load header unless configured otherwise.
pub const DEFAULT_DATABASE: &str = "sdbfull";

/// Significant fractional digits in a timestamp.
const NANO_DIGITS: usize = 9;

/// Errors raised while parsing converter output or writing batches.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("row {line} has {actual} columns, expected at least {expected}")]
    MalformedRow {
        line: u64,
        expected: usize,
        actual: usize,
    },

    #[error("row {line} has invalid timestamp '{value}'")]
    InvalidTimestamp { line: u64, value: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One converter row, validated against the dictionary width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub timestamp_nanos: i64,
    /// One value per dictionary column; empty means absent.
    pub values: Vec<String>,
}

/// Convert decimal seconds to integer nanoseconds without going through
/// floating point. Digits past the ninth fractional place are truncated.
pub fn parse_seconds_to_nanos(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (whole, fraction) = match unsigned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (unsigned, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let seconds: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos: i64 = 0;
    for (i, digit) in fraction.bytes().take(NANO_DIGITS).enumerate() {
        nanos += i64::from(digit - b'0') * 10_i64.pow((NANO_DIGITS - 1 - i) as u32);
    }

    let total = seconds.checked_mul(1_000_000_000)?.checked_add(nanos)?;
    Some(if negative { -total } else { total })
}

/// Parse converter CSV rows for a dictionary of `dictionary_len` columns.
///
/// Columns beyond the dictionary width are ignored.
pub fn parse_rows<R: Read>(reader: R, dictionary_len: usize) -> Result<Vec<ParsedRow>, EncodeError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let expected = dictionary_len + 1;
    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        if record.len() < expected {
            return Err(EncodeError::MalformedRow {
                line,
                expected,
                actual: record.len(),
            });
        }

        let raw_time = &record[0];
        let timestamp_nanos =
            parse_seconds_to_nanos(raw_time).ok_or_else(|| EncodeError::InvalidTimestamp {
                line,
                value: raw_time.to_string(),
            })?;

        let values = record
            .iter()
            .skip(1)
            .take(dictionary_len)
            .map(str::to_string)
            .collect();

        rows.push(ParsedRow {
            timestamp_nanos,
            values,
        });
    }

    Ok(rows)
}

/// [`parse_rows`] over a file on disk.
pub fn parse_csv_file(path: &Path, dictionary_len: usize) -> Result<Vec<ParsedRow>, EncodeError> {
    let file = File::open(path).map_err(|source| EncodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rows(BufReader::new(file), dictionary_len)
}

/// Encoded lines for one converter output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementBatch {
    measurement: String,
    lines: Vec<String>,
}

impl MeasurementBatch {
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Header plus one newline-terminated line per measurement.
    pub fn render(&self, database: &str) -> String {
        let mut out = render_header(database);
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Write the rendered batch to `path`.
    pub fn write_to(&self, path: &Path, database: &str) -> Result<(), EncodeError> {
        let io_err = |source| EncodeError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::create(path).map_err(io_err)?;
        file.write_all(self.render(database).as_bytes())
            .map_err(io_err)?;
        file.sync_data().map_err(io_err)
    }
}

/// The bulk-load preamble naming the target database.
pub fn render_header(database: &str) -> String {
    format!(
        "# DDL\nCREATE DATABASE {db}\n\n# DML\n# CONTEXT-DATABASE: {db}\n\n",
        db = database
    )
}

/// Encode rows against `dictionary`. Rows without any non-empty value are
/// dropped.
pub fn encode(rows: &[ParsedRow], dictionary: &DatumDictionary, measurement: &str) -> MeasurementBatch {
    let mut lines = Vec::with_capacity(rows.len());

    for row in rows {
        let fields: Vec<String> = dictionary
            .entries()
            .iter()
            .zip(&row.values)
            .filter(|(_, value)| !value.is_empty())
            .map(|(entry, value)| format!("{}.{}={}", entry.source, entry.datum, value))
            .collect();

        if fields.is_empty() {
            continue;
        }
        lines.push(format!(
            "{} {} {}",
            measurement,
            fields.join(","),
            row.timestamp_nanos
        ));
    }

    MeasurementBatch {
        measurement: measurement.to_string(),
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::DatumEntry;

    fn dictionary(pairs: &[(&str, &str)]) -> DatumDictionary {
        DatumDictionary::new(
            "1",
            pairs
                .iter()
                .map(|(s, d)| DatumEntry {
                    source: s.to_string(),
                    datum: d.to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn seconds_to_nanos_is_exact() {
        assert_eq!(parse_seconds_to_nanos("1552659000.0"), Some(1_552_659_000_000_000_000));
        assert_eq!(parse_seconds_to_nanos("1552659000"), Some(1_552_659_000_000_000_000));
        assert_eq!(parse_seconds_to_nanos("1.000000001"), Some(1_000_000_001));
        assert_eq!(parse_seconds_to_nanos("0.1234567899"), Some(123_456_789));
        assert_eq!(parse_seconds_to_nanos(".5"), Some(500_000_000));
        assert_eq!(parse_seconds_to_nanos(" 2. "), Some(2_000_000_000));
        assert_eq!(parse_seconds_to_nanos("-1.5"), Some(-1_500_000_000));
    }

    #[test]
    fn seconds_to_nanos_rejects_garbage() {
        assert_eq!(parse_seconds_to_nanos(""), None);
        assert_eq!(parse_seconds_to_nanos("."), None);
        assert_eq!(parse_seconds_to_nanos("1e9"), None);
        assert_eq!(parse_seconds_to_nanos("12:00"), None);
        assert_eq!(parse_seconds_to_nanos("99999999999999999999"), None);
    }

    #[test]
    fn single_value_has_no_trailing_comma() {
        let dict = dictionary(&[("AZR", "POSITION")]);
        let rows = parse_rows("1552659000.0,5\n".as_bytes(), dict.len()).unwrap();
        let batch = encode(&rows, &dict, DEFAULT_MEASUREMENT);
        assert_eq!(batch.lines(), &["sdbfull AZR.POSITION=5 1552659000000000000"]);
    }

    #[test]
    fn empty_values_skipped_and_zero_kept() {
        let dict = dictionary(&[("AZR", "POSITION"), ("ELR", "POSITION"), ("CSR", "POSITION")]);
        let rows = parse_rows("10,,0,\n11,,,\n12,1.5,,-3\n".as_bytes(), dict.len()).unwrap();
        let batch = encode(&rows, &dict, "telemetry");

        assert_eq!(
            batch.lines(),
            &[
                "telemetry ELR.POSITION=0 10000000000",
                "telemetry AZR.POSITION=1.5,CSR.POSITION=-3 12000000000",
            ]
        );
    }

    #[test]
    fn narrow_row_is_malformed() {
        let err = parse_rows("1,2\n3\n".as_bytes(), 1).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::MalformedRow {
                line: 2,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn extra_columns_ignored() {
        let rows = parse_rows("1,2,3,4\n".as_bytes(), 1).unwrap();
        assert_eq!(rows[0].values, vec!["2".to_string()]);
    }

    #[test]
    fn bad_timestamp_reports_value() {
        let err = parse_rows("time,AZR\n".as_bytes(), 1).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidTimestamp { line: 1, ref value } if value == "time"));
    }

    #[test]
    fn render_includes_header() {
        let dict = dictionary(&[("AZR", "POSITION")]);
        let rows = parse_rows("1,5\n".as_bytes(), 1).unwrap();
        let rendered = encode(&rows, &dict, DEFAULT_MEASUREMENT).render(DEFAULT_DATABASE);
        assert_eq!(
            rendered,
            "# DDL\nCREATE DATABASE sdbfull\n\n# DML\n# CONTEXT-DATABASE: sdbfull\n\nsdbfull AZR.POSITION=5 1000000000\n"
        );
    }

    #[test]
    fn encoding_is_deterministic() {
        let dict = dictionary(&[("A", "X"), ("B", "Y")]);
        let rows = parse_rows("1,1,2\n2,,3\n".as_bytes(), 2).unwrap();
        assert_eq!(
            encode(&rows, &dict, "m").render("db"),
            encode(&rows, &dict, "m").render("db")
        );
    }
}
