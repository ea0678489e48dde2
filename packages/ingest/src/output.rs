//! CSV writers for output tables.
//!
//! Column order is the field order of the row type, so every table has a
//! stable header.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::IngestError;

/// Writes `rows` as CSV with a header row.
///
/// # Errors
///
/// Returns [`IngestError::Csv`] if a row cannot be serialized or written.
pub fn write_csv<T: Serialize>(
    writer: impl Write,
    rows: &[T],
    name: &str,
) -> Result<(), IngestError> {
    let csv_error = |source| IngestError::Csv {
        source_name: name.to_string(),
        source,
    };

    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row).map_err(csv_error)?;
    }
    csv_writer
        .flush()
        .map_err(|source| IngestError::Io {
            path: name.to_string(),
            source,
        })
}

/// Creates (or truncates) `path` and writes `rows` to it.
///
/// # Errors
///
/// * [`IngestError::Io`] if the file cannot be created
/// * any error of [`write_csv`]
pub fn write_csv_file<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), IngestError> {
    let file = File::create(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    write_csv(file, rows, &path.display().to_string())?;
    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use trauma_desert_area_models::{BivariateClass, Reachability, TimeBand};

    use super::*;

    #[derive(Serialize)]
    struct Row {
        id: &'static str,
        minutes: Reachability,
        band: TimeBand,
        class: BivariateClass,
        income: Option<f64>,
    }

    #[test]
    fn writes_header_and_flat_rows() {
        let rows = [
            Row {
                id: "A",
                minutes: Reachability::Within(10),
                band: Reachability::Within(10).band(),
                class: BivariateClass::HIGHEST,
                income: Some(41_000.5),
            },
            Row {
                id: "B",
                minutes: Reachability::BeyondMaximum,
                band: Reachability::BeyondMaximum.band(),
                class: BivariateClass::HIGHEST,
                income: None,
            },
        ];

        let mut buffer = Vec::new();
        write_csv(&mut buffer, &rows, "test").unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "id,minutes,band,class,income");
        assert!(lines[1].starts_with("A,10,"));
        assert!(lines[1].ends_with(",9,41000.5"));
        assert!(lines[2].starts_with("B,31,"));
        assert!(lines[2].ends_with(",9,"));
    }
}
