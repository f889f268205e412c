//! Row-level steps: filters, error routing, variables and fan-out.

use regex::Regex;

use crate::directive::RowFilter;
use crate::error::{StepError, StepResult};
use crate::execution::{ErrorRecord, PipelineContext};
use crate::expression::Expression;
use crate::types::{Record, Value};

use super::{filter_records, flat_map_records};

/// Drop every record on which `condition` evaluates to `drop_when`.
pub(crate) fn filter_on_condition(
    records: Vec<Record>,
    ctx: &PipelineContext,
    condition: &Expression,
    drop_when: bool,
) -> StepResult<Vec<Record>> {
    let variables = ctx.variables();
    filter_records(records, ctx.parallel_threshold(), |record| {
        Ok(condition.evaluate_condition(record, variables)? != drop_when)
    })
}

/// Drop records whose `column` matches (or does not match) `pattern`. Records without the
/// column are kept.
pub(crate) fn filter_on_regex(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    pattern: &Regex,
    drop_when_matched: bool,
) -> StepResult<Vec<Record>> {
    filter_records(records, threshold, |record| {
        Ok(match record.get(column) {
            None => true,
            Some(Value::Utf8(s)) => pattern.is_match(s) != drop_when_matched,
            Some(other) => pattern.is_match(&other.to_string()) != drop_when_matched,
        })
    })
}

pub(crate) fn filter_rows_on(
    records: Vec<Record>,
    ctx: &PipelineContext,
    filter: &RowFilter,
) -> StepResult<Vec<Record>> {
    let threshold = ctx.parallel_threshold();
    match filter {
        RowFilter::ConditionTrue(condition) => filter_on_condition(records, ctx, condition, true),
        RowFilter::ConditionFalse(condition) => filter_on_condition(records, ctx, condition, false),
        RowFilter::EmptyOrNullColumns(columns) => filter_records(records, threshold, |record| {
            Ok(!columns
                .iter()
                .all(|c| record.get(c).is_none_or(Value::is_null_or_empty)))
        }),
        RowFilter::RegexMatch { column, pattern } => {
            filter_on_regex(records, threshold, column, pattern, true)
        }
        RowFilter::RegexNotMatch { column, pattern } => {
            filter_on_regex(records, threshold, column, pattern, false)
        }
    }
}

/// Move records matching `condition` into the context's error records.
pub(crate) fn send_to_error(
    records: Vec<Record>,
    ctx: &mut PipelineContext,
    line: usize,
    condition: &Expression,
) -> StepResult<Vec<Record>> {
    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        if condition.evaluate_condition(&record, ctx.variables())? {
            tracing::warn!(line, condition = condition.source(), "record sent to error");
            ctx.push_error_record(ErrorRecord {
                record,
                line,
                message: format!("condition '{condition}' evaluated to true"),
            });
        } else {
            kept.push(record);
        }
    }
    Ok(kept)
}

pub(crate) fn fail(
    records: Vec<Record>,
    ctx: &PipelineContext,
    condition: &Expression,
) -> StepResult<Vec<Record>> {
    for record in &records {
        if condition.evaluate_condition(record, ctx.variables())? {
            return Err(StepError::ConditionTriggered {
                condition: condition.source().to_string(),
            });
        }
    }
    Ok(records)
}

/// Evaluate `expression` on every record in order; the variable holds the last value.
pub(crate) fn set_variable(
    records: Vec<Record>,
    ctx: &mut PipelineContext,
    variable: &str,
    expression: &Expression,
) -> StepResult<Vec<Record>> {
    for record in &records {
        let value = expression.evaluate(record, ctx.variables())?;
        ctx.set_variable(variable, value);
    }
    Ok(records)
}

/// Add `by` to the variable once per record on which `condition` holds. An unset variable
/// starts at zero.
pub(crate) fn increment_variable(
    records: Vec<Record>,
    ctx: &mut PipelineContext,
    variable: &str,
    by: i64,
    condition: &Expression,
) -> StepResult<Vec<Record>> {
    for record in &records {
        if !condition.evaluate_condition(record, ctx.variables())? {
            continue;
        }
        let current = match ctx.variable(variable) {
            None | Some(Value::Null) => 0,
            Some(Value::Int64(v)) => *v,
            Some(other) => {
                return Err(StepError::TypeMismatch {
                    column: variable.to_string(),
                    expected: "int64",
                    found: other.type_name(),
                });
            }
        };
        ctx.set_variable(variable, Value::Int64(current.saturating_add(by)));
    }
    Ok(records)
}

/// Emit one record per part of the text in `column`. Other records pass through.
pub(crate) fn split_to_rows<F>(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    split: F,
) -> StepResult<Vec<Record>>
where
    F: Fn(&str) -> Vec<String> + Send + Sync,
{
    flat_map_records(records, threshold, |record| {
        let (idx, parts) = match record.find(column).zip(record.get(column)) {
            Some((idx, Value::Utf8(s))) => (idx, split(s)),
            _ => return Ok(vec![record]),
        };
        Ok(parts
            .into_iter()
            .map(|part| {
                let mut row = record.clone();
                row.set_value_at(idx, Value::Utf8(part));
                row
            })
            .collect())
    })
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use crate::directive::RowFilter;
    use crate::error::StepError;
    use crate::execution::PipelineContext;
    use crate::expression::Expression;
    use crate::types::{Record, Value};

    fn counts() -> Vec<Record> {
        vec![
            Record::new().with("count", 1i64).with("name", "x"),
            Record::new().with("count", 0i64).with("name", "y"),
            Record::new().with("count", 5i64).with("name", ""),
        ]
    }

    fn expr(s: &str) -> Expression {
        Expression::parse(s).unwrap()
    }

    #[test]
    fn condition_filters_drop_on_requested_outcome() {
        let ctx = PipelineContext::new();
        let out = super::filter_on_condition(counts(), &ctx, &expr("count > 0"), true).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("name"), Some(&Value::from("y")));

        let out = super::filter_on_condition(counts(), &ctx, &expr("count > 0"), false).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn regex_filters_use_full_match() {
        let pattern = Regex::new("^(?:x|y)$").unwrap();
        let out = super::filter_on_regex(counts(), 100, "name", &pattern, true).unwrap();
        assert_eq!(out.len(), 1);
        let out = super::filter_on_regex(counts(), 100, "name", &pattern, false).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn empty_or_null_filter_requires_all_columns_empty() {
        let ctx = PipelineContext::new();
        let filter = RowFilter::EmptyOrNullColumns(vec!["name".to_string(), "missing".to_string()]);
        let out = super::filter_rows_on(counts(), &ctx, &filter).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn send_to_error_routes_matching_records() {
        let mut ctx = PipelineContext::new();
        let out = super::send_to_error(counts(), &mut ctx, 4, &expr("count == 0")).unwrap();
        assert_eq!(out.len(), 2);
        let errors = ctx.error_records();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 4);
        assert_eq!(errors[0].record.get("name"), Some(&Value::from("y")));
    }

    #[test]
    fn fail_triggers_on_any_record() {
        let ctx = PipelineContext::new();
        let err = super::fail(counts(), &ctx, &expr("count > 4")).unwrap_err();
        assert!(matches!(
            err,
            StepError::ConditionTriggered { condition } if condition == "count > 4"
        ));
        assert_eq!(super::fail(counts(), &ctx, &expr("count > 10")).unwrap().len(), 3);
    }

    #[test]
    fn variables_accumulate_across_records() {
        let mut ctx = PipelineContext::new();
        super::increment_variable(counts(), &mut ctx, "positive", 2, &expr("count > 0")).unwrap();
        assert_eq!(ctx.variable("positive"), Some(&Value::Int64(4)));

        super::set_variable(counts(), &mut ctx, "last", &expr("count")).unwrap();
        assert_eq!(ctx.variable("last"), Some(&Value::Int64(5)));
    }

    #[test]
    fn split_to_rows_fans_out_in_place() {
        let records = vec![
            Record::new().with("id", 1i64).with("tags", "a;b;c"),
            Record::new().with("id", 2i64),
        ];
        let out = super::split_to_rows(records, 100, "tags", |s| {
            s.split(';').map(str::to_string).collect()
        })
        .unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[1].get("tags"), Some(&Value::from("b")));
        assert_eq!(out[1].get("id"), Some(&Value::Int64(1)));
        assert_eq!(out[3].get("id"), Some(&Value::Int64(2)));
    }
}
