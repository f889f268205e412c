//! Parsers that expand a text column into columns or records, and writers that serialise a
//! whole record into one column.

use crate::error::{StepError, StepResult};
use crate::types::{Record, Value};

use super::{flat_map_records, map_records};

fn text_of<'a>(record: &'a Record, column: &str) -> StepResult<Option<&'a str>> {
    match record.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Utf8(s)) => Ok(Some(s)),
        Some(other) => Err(StepError::TypeMismatch {
            column: column.to_string(),
            expected: "string",
            found: other.type_name(),
        }),
    }
}

/// Parse the text in `column` as delimited rows. Every row yields one record with the fields
/// appended as `column_1..column_n`, or under the header names when `header` is set. The
/// first row of the batch is then the header and produces no output.
///
/// Runs sequentially: the header row must be seen before the rows that use it.
pub(crate) fn parse_as_csv(
    records: Vec<Record>,
    column: &str,
    delimiter: u8,
    header: bool,
) -> StepResult<Vec<Record>> {
    let mut names: Option<Vec<String>> = None;
    let mut out = Vec::with_capacity(records.len());

    for record in records {
        let Some(text) = text_of(&record, column)? else {
            out.push(record);
            continue;
        };
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for row in rdr.records() {
            rows.push(row?);
        }

        for row in rows {
            if header && names.is_none() {
                names = Some(row.iter().map(|h| h.trim().to_string()).collect());
                continue;
            }
            let mut parsed = record.clone();
            for (i, field) in row.iter().enumerate() {
                let name = names
                    .as_ref()
                    .and_then(|n| n.get(i))
                    .filter(|n| !n.is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("{column}_{}", i + 1));
                parsed.set(name, Value::from(field));
            }
            out.push(parsed);
        }
    }
    Ok(out)
}

/// Flatten a JSON object into `prefix_key` columns, recursing while `depth` allows.
fn flatten_object(
    target: &mut Record,
    prefix: &str,
    map: &serde_json::Map<String, serde_json::Value>,
    depth: Option<usize>,
) {
    for (key, value) in map {
        let name = format!("{prefix}_{key}");
        match value {
            serde_json::Value::Object(inner) if depth.is_none_or(|d| d > 1) => {
                flatten_object(target, &name, inner, depth.map(|d| d - 1));
            }
            other => target.set(name, Value::from_json(other)),
        }
    }
}

fn expand_json(
    mut record: Record,
    column: &str,
    value: &serde_json::Value,
    depth: Option<usize>,
) -> Record {
    match value {
        serde_json::Value::Object(map) => {
            record.remove(column);
            flatten_object(&mut record, column, map, depth);
        }
        scalar => record.set(column, Value::from_json(scalar)),
    }
    record
}

/// Parse the text in `column` as JSON.
///
/// Objects are flattened into `column_key` columns up to `depth` levels (all levels when
/// `None`) and the source column is removed. Arrays produce one record per element, each
/// element expanded the same way; scalar elements replace the source value.
pub(crate) fn parse_as_json(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    depth: Option<usize>,
) -> StepResult<Vec<Record>> {
    flat_map_records(records, threshold, |record| {
        let parsed: serde_json::Value = match text_of(&record, column)? {
            Some(text) => serde_json::from_str(text)?,
            None => return Ok(vec![record]),
        };
        Ok(match &parsed {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| expand_json(record.clone(), column, item, depth))
                .collect(),
            other => vec![expand_json(record, column, other, depth)],
        })
    })
}

/// Cut the text in `column` into fields of the given character widths, trimming `padding`
/// from both ends of each field. Short input yields empty fields.
pub(crate) fn parse_as_fixed_length(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    widths: &[usize],
    padding: char,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let fields: Vec<String> = match text_of(&record, column)? {
            Some(text) => {
                let mut chars = text.chars();
                widths
                    .iter()
                    .map(|w| {
                        let field: String = chars.by_ref().take(*w).collect();
                        field.trim_matches(padding).to_string()
                    })
                    .collect()
            }
            None => return Ok(record),
        };
        for (i, field) in fields.into_iter().enumerate() {
            record.set(format!("{column}_{}", i + 1), Value::Utf8(field));
        }
        Ok(record)
    })
}

/// Store the record, as a JSON object, in `column`.
pub(crate) fn write_as_json_map(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let json = serde_json::to_string(&record.to_json())?;
        record.set(column, Value::Utf8(json));
        Ok(record)
    })
}

/// Store the record's values, as one CSV line, in `column`.
pub(crate) fn write_as_csv(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(record.iter().map(|(_, v)| v.to_string()))?;
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        let line = String::from_utf8(bytes).map_err(|e| StepError::InvalidValue {
            column: column.to_string(),
            message: e.to_string(),
        })?;
        record.set(column, Value::Utf8(line.trim_end_matches(['\r', '\n']).to_string()));
        Ok(record)
    })
}
