//! JSON record source.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]`
//! - A single object: `{"a":1}`
//! - Newline-delimited JSON (NDJSON): `{"a":1}\n{"a":2}\n`
//!
//! Top-level keys become columns in document order. Nested objects become nested records.

use std::fs;
use std::path::Path;

use crate::error::{SourceError, SourceResult};
use crate::types::{Record, Value};

/// Read JSON records from a file.
pub fn records_from_json_path(path: impl AsRef<Path>) -> SourceResult<Vec<Record>> {
    let text = fs::read_to_string(path)?;
    records_from_json_str(&text)
}

/// Read JSON records from an in-memory string.
pub fn records_from_json_str(input: &str) -> SourceResult<Vec<Record>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    // A single document first (array or object), NDJSON otherwise.
    let values = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(v @ serde_json::Value::Object(_)) => vec![v],
        Ok(_) => {
            return Err(SourceError::Shape {
                message: "json must be an object, an array of objects, or NDJSON".to_string(),
            });
        }
        Err(_) => {
            let mut values = Vec::new();
            for line in trimmed.lines().map(str::trim).filter(|l| !l.is_empty()) {
                values.push(serde_json::from_str::<serde_json::Value>(line)?);
            }
            values
        }
    };

    let records = values
        .iter()
        .enumerate()
        .map(|(idx0, v)| record_from_json(idx0 + 1, v))
        .collect::<SourceResult<Vec<_>>>()?;
    tracing::debug!(records = records.len(), "json records read");
    Ok(records)
}

fn record_from_json(row_num: usize, value: &serde_json::Value) -> SourceResult<Record> {
    let obj = value.as_object().ok_or_else(|| SourceError::Shape {
        message: format!("row {row_num} is not a json object"),
    })?;
    Ok(Record::from_pairs(
        obj.iter().map(|(k, v)| (k.as_str(), Value::from_json(v))),
    ))
}

#[cfg(test)]
mod tests {
    use super::records_from_json_str;
    use crate::error::SourceError;
    use crate::types::Value;

    #[test]
    fn array_object_and_ndjson_inputs() {
        let array = records_from_json_str(r#"[{"b": 1, "a": "x"}, {"b": 2}]"#).unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0].column_names().collect::<Vec<_>>(), vec!["b", "a"]);

        let single = records_from_json_str(r#"{"a": null}"#).unwrap();
        assert_eq!(single[0].get("a"), Some(&Value::Null));

        let ndjson = records_from_json_str("{\"a\": 1}\n\n{\"a\": 2.5}\n").unwrap();
        assert_eq!(ndjson[1].get("a"), Some(&Value::Float64(2.5)));
    }

    #[test]
    fn non_object_rows_are_rejected() {
        let err = records_from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, SourceError::Shape { .. }));
        assert!(records_from_json_str("42").is_err());
        assert!(records_from_json_str("{oops}\n").is_err());
        assert!(records_from_json_str("  ").unwrap().is_empty());
    }
}
