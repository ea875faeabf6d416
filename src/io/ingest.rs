//! Observed-signal CSV ingest.
//!
//! Expected layout: a header row, an `r` column and one signal column. The
//! signal column is the first of `dr`, `gobs`, `g`, `d` present in the header
//! (case-insensitive). Lines starting with `#` are comments.
//!
//! Ingest is strict: any unparsable or non-finite value is an input error with
//! its line number, since silently dropping points would shift the grid the
//! calculator evaluates on.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{N_PARAMS, ObservedData};
use crate::error::{AppError, EXIT_DATA, EXIT_INPUT};

/// Accepted signal column names, in priority order.
pub const SIGNAL_COLUMNS: [&str; 4] = ["dr", "gobs", "g", "d"];

/// Load observed data from a CSV file, keeping points with `rmin ≤ r ≤ rmax`.
pub fn load_observed(path: &Path, rmin: Option<f64>, rmax: Option<f64>) -> Result<ObservedData, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(
            EXIT_INPUT,
            format!("Failed to open data CSV '{}': {e}", path.display()),
        )
    })?;
    parse_observed(file, rmin, rmax)
}

/// Parse observed data from any CSV reader.
pub fn parse_observed<R: Read>(reader: R, rmin: Option<f64>, rmax: Option<f64>) -> Result<ObservedData, AppError> {
    if let (Some(lo), Some(hi)) = (rmin, rmax) {
        if !(lo < hi) {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("Invalid r window: rmin={lo} must be below rmax={hi}."),
            ));
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let r_idx = *header_map
        .get("r")
        .ok_or_else(|| AppError::new(EXIT_INPUT, "Missing required column: `r`"))?;
    let (column, y_idx) = SIGNAL_COLUMNS
        .iter()
        .find_map(|name| header_map.get(*name).map(|&idx| (name.to_string(), idx)))
        .ok_or_else(|| {
            AppError::new(
                EXIT_INPUT,
                format!(
                    "Missing signal column: expected one of {}.",
                    SIGNAL_COLUMNS.join(", ")
                ),
            )
        })?;

    let mut r = Vec::new();
    let mut y = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| AppError::new(EXIT_INPUT, format!("CSV parse error: {e}")))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let rv = parse_field(&record, r_idx, "r", line)?;
        let yv = parse_field(&record, y_idx, &column, line)?;

        if let Some(&prev) = r.last() {
            if rv <= prev {
                return Err(AppError::new(
                    EXIT_INPUT,
                    format!("Line {line}: r must be strictly increasing ({rv} after {prev})."),
                ));
            }
        }
        r.push(rv);
        y.push(yv);
    }

    let (r, y): (Vec<f64>, Vec<f64>) = r
        .into_iter()
        .zip(y)
        .filter(|(rv, _)| rmin.is_none_or(|lo| *rv >= lo) && rmax.is_none_or(|hi| *rv <= hi))
        .unzip();

    if r.len() <= N_PARAMS {
        return Err(AppError::new(
            EXIT_DATA,
            format!(
                "Need at least {} data points inside the r window, found {}.",
                N_PARAMS + 1,
                r.len()
            ),
        ));
    }

    Ok(ObservedData { r, y, column })
}

fn parse_field(record: &StringRecord, idx: usize, name: &str, line: u64) -> Result<f64, AppError> {
    let raw = record
        .get(idx)
        .ok_or_else(|| AppError::new(EXIT_INPUT, format!("Line {line}: missing `{name}` value.")))?;
    let v: f64 = raw.parse().map_err(|_| {
        AppError::new(
            EXIT_INPUT,
            format!("Line {line}: `{name}` value '{raw}' is not a number."),
        )
    })?;
    if !v.is_finite() {
        return Err(AppError::new(
            EXIT_INPUT,
            format!("Line {line}: `{name}` value '{raw}' is not finite."),
        ));
    }
    Ok(v)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may carry a BOM on the first header.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_with(n: usize, header: &str) -> String {
        let mut s = format!("# synthetic\n{header}\n");
        for i in 0..n {
            let r = 1.0 + i as f64 * 0.1;
            s.push_str(&format!("{r},{}\n", -0.5 * r));
        }
        s
    }

    #[test]
    fn reads_r_and_first_signal_column() {
        let data = parse_observed(csv_with(10, "r,Gobs").as_bytes(), None, None).unwrap();
        assert_eq!(data.len(), 10);
        assert_eq!(data.column, "gobs");
        assert!((data.r[1] - 1.1).abs() < 1e-12);
        assert!((data.y[0] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn prefers_dr_over_later_columns() {
        let text = "\u{feff}R,g,dr\n1,9,0.1\n2,9,0.2\n3,9,0.3\n4,9,0.4\n5,9,0.5\n6,9,0.6\n";
        let data = parse_observed(text.as_bytes(), None, None).unwrap();
        assert_eq!(data.column, "dr");
        assert_eq!(data.y, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
    }

    #[test]
    fn applies_the_r_window() {
        let data = parse_observed(csv_with(30, "r,dr").as_bytes(), Some(1.5), Some(3.0)).unwrap();
        assert!(data.r.iter().all(|&r| (1.5..=3.0).contains(&r)));
        assert!(data.len() >= 14);
    }

    #[test]
    fn missing_columns_are_input_errors() {
        let err = parse_observed("x,dr\n1,2\n".as_bytes(), None, None).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INPUT);
        let err = parse_observed("r,intensity\n1,2\n".as_bytes(), None, None).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INPUT);
    }

    #[test]
    fn rejects_non_numeric_and_unsorted_rows() {
        let err = parse_observed("r,dr\n1,0.1\n2,abc\n".as_bytes(), None, None).unwrap_err();
        assert!(err.message().contains("not a number"), "{err}");

        let err = parse_observed("r,dr\n1,0.1\n1,0.2\n".as_bytes(), None, None).unwrap_err();
        assert!(err.message().contains("strictly increasing"), "{err}");

        let err = parse_observed("r,dr\n1,NaN\n".as_bytes(), None, None).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INPUT);
    }

    #[test]
    fn too_few_points_is_a_data_error() {
        let err = parse_observed(csv_with(5, "r,dr").as_bytes(), None, None).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_DATA);
    }
}
