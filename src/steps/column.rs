//! Steps that change a record's shape: naming, adding and removing columns.

use regex::Regex;
use uuid::Uuid;

use crate::directive::{CharRange, ColumnRelabel};
use crate::error::{StepError, StepResult};
use crate::types::{Record, Value};

use super::map_records;

fn missing(column: &str) -> StepError {
    StepError::MissingColumn {
        column: column.to_string(),
    }
}

/// Rebuild a record from renamed pairs; two columns landing on one name is an error.
fn rebuild(pairs: impl IntoIterator<Item = (String, Value)>) -> StepResult<Record> {
    let mut record = Record::new();
    for (name, value) in pairs {
        if record.find(&name).is_some() {
            return Err(StepError::ColumnExists { column: name });
        }
        record.set(name, value);
    }
    Ok(record)
}

pub(crate) fn rename(
    records: Vec<Record>,
    threshold: usize,
    old: &str,
    new: &str,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let idx = record.find(old).ok_or_else(|| missing(old))?;
        if old != new && record.find(new).is_some() {
            return Err(StepError::ColumnExists {
                column: new.to_string(),
            });
        }
        record.rename_at(idx, new);
        Ok(record)
    })
}

/// Rename columns by position. Extra names and extra columns are left alone.
pub(crate) fn set_columns(
    records: Vec<Record>,
    threshold: usize,
    names: &[String],
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |record| {
        rebuild(
            record
                .into_iter()
                .enumerate()
                .map(|(idx, (name, value))| (names.get(idx).cloned().unwrap_or(name), value)),
        )
    })
}

pub(crate) fn drop(
    records: Vec<Record>,
    threshold: usize,
    columns: &[String],
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        record.retain(|name, _| !columns.iter().any(|c| c == name));
        Ok(record)
    })
}

pub(crate) fn keep(
    records: Vec<Record>,
    threshold: usize,
    columns: &[String],
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        record.retain(|name, _| columns.iter().any(|c| c == name));
        Ok(record)
    })
}

/// `destination = first + separator + second`, only when both inputs exist.
pub(crate) fn merge(
    records: Vec<Record>,
    threshold: usize,
    first: &str,
    second: &str,
    destination: &str,
    separator: &str,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let merged = match (record.get(first), record.get(second)) {
            (Some(a), Some(b)) => format!("{a}{separator}{b}"),
            _ => return Ok(record),
        };
        record.set(destination, Value::Utf8(merged));
        Ok(record)
    })
}

pub(crate) fn swap(
    records: Vec<Record>,
    threshold: usize,
    first: &str,
    second: &str,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let a = record.find(first).ok_or_else(|| missing(first))?;
        let b = record.find(second).ok_or_else(|| missing(second))?;
        record.rename_at(a, second);
        record.rename_at(b, first);
        Ok(record)
    })
}

pub(crate) fn copy(
    records: Vec<Record>,
    threshold: usize,
    source: &str,
    destination: &str,
    force: bool,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let value = record.get(source).cloned().ok_or_else(|| missing(source))?;
        if !force && record.find(destination).is_some() {
            return Err(StepError::ColumnExists {
                column: destination.to_string(),
            });
        }
        record.set(destination, value);
        Ok(record)
    })
}

/// Rename every column through `rule`.
pub(crate) fn relabel(
    records: Vec<Record>,
    threshold: usize,
    rule: &ColumnRelabel,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |record| {
        rebuild(record.into_iter().map(|(name, value)| (rule.apply(&name), value)))
    })
}

/// Split a text column on `pattern` into `column_1..column_n`. The source column is kept.
pub(crate) fn split_to_columns(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    pattern: &Regex,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let parts: Vec<String> = match record.get(column) {
            Some(Value::Utf8(s)) => pattern.split(s).map(str::to_string).collect(),
            _ => return Ok(record),
        };
        for (i, part) in parts.into_iter().enumerate() {
            record.set(format!("{column}_{}", i + 1), Value::Utf8(part));
        }
        Ok(record)
    })
}

/// Adds `column_account` and `column_domain`. Anything that is not `account@domain` yields
/// nulls.
pub(crate) fn split_email(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let (account, domain) = match record.get(column) {
            None => return Ok(record),
            Some(Value::Null) => (Value::Null, Value::Null),
            Some(Value::Utf8(s)) => match s.trim().rsplit_once('@') {
                Some((account, domain)) if !account.is_empty() && !domain.is_empty() => {
                    (Value::from(account), Value::from(domain))
                }
                _ => (Value::Null, Value::Null),
            },
            Some(other) => {
                return Err(StepError::TypeMismatch {
                    column: column.to_string(),
                    expected: "string",
                    found: other.type_name(),
                });
            }
        };
        record.set(format!("{column}_account"), account);
        record.set(format!("{column}_domain"), domain);
        Ok(record)
    })
}

/// Each capture group `g` of match `m` lands in `column_m_g`.
pub(crate) fn extract_regex_groups(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    pattern: &Regex,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let groups: Vec<(String, Value)> = match record.get(column) {
            Some(Value::Utf8(s)) => pattern
                .captures_iter(s)
                .enumerate()
                .flat_map(|(m, captures)| {
                    (1..captures.len()).map(move |g| {
                        let value = captures
                            .get(g)
                            .map(|c| Value::from(c.as_str()))
                            .unwrap_or(Value::Null);
                        (format!("{column}_{}_{g}", m + 1), value)
                    })
                })
                .collect(),
            _ => return Ok(record),
        };
        for (name, value) in groups {
            record.set(name, value);
        }
        Ok(record)
    })
}

pub(crate) fn cut_character(
    records: Vec<Record>,
    threshold: usize,
    source: &str,
    destination: &str,
    ranges: &[CharRange],
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let cut = match record.get(source) {
            Some(Value::Utf8(s)) => {
                let chars: Vec<char> = s.chars().collect();
                let mut out = String::new();
                for range in ranges {
                    range.select(&chars, &mut out);
                }
                out
            }
            _ => return Ok(record),
        };
        record.set(destination, Value::Utf8(cut));
        Ok(record)
    })
}

pub(crate) fn generate_uuid(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        record.set(column, Value::Utf8(Uuid::new_v4().to_string()));
        Ok(record)
    })
}
