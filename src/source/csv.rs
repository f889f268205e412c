//! CSV record source.

use std::path::Path;

use crate::error::SourceResult;
use crate::types::{Record, Value};

/// Read a headed CSV file into records.
pub fn records_from_csv_path(path: impl AsRef<Path>) -> SourceResult<Vec<Record>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    records_from_csv_reader(&mut rdr)
}

/// Read records from an existing CSV reader. The header row names the columns.
///
/// Values are kept as text; empty (or all-whitespace) cells become null.
pub fn records_from_csv_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
) -> SourceResult<Vec<Record>> {
    let headers = rdr.headers()?.clone();

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result?;
        let record = Record::from_pairs(headers.iter().enumerate().map(|(idx, name)| {
            let raw = row.get(idx).unwrap_or("");
            let value = if raw.trim().is_empty() {
                Value::Null
            } else {
                Value::Utf8(raw.to_owned())
            };
            (name, value)
        }));
        records.push(record);
    }
    tracing::debug!(records = records.len(), columns = headers.len(), "csv records read");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::records_from_csv_reader;
    use crate::types::Value;

    #[test]
    fn header_names_columns_and_empty_cells_are_null() {
        let input = "id,name,note\n1,Ada,\n2,,x\n";
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(input.as_bytes());
        let records = records_from_csv_reader(&mut rdr).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].column_names().collect::<Vec<_>>(), vec!["id", "name", "note"]);
        assert_eq!(records[0].get("id"), Some(&Value::from("1")));
        assert_eq!(records[0].get("note"), Some(&Value::Null));
        assert_eq!(records[1].get("name"), Some(&Value::Null));
    }

    #[test]
    fn ragged_rows_are_an_error() {
        let input = "a,b\n1\n";
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(input.as_bytes());
        assert!(records_from_csv_reader(&mut rdr).is_err());
    }
}
