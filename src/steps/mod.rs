//! Executable steps.
//!
//! A [`Step`] wraps one typed [`Directive`] together with its script position. Execution takes
//! the batch by value and returns the next batch; the match in [`Step::execute`] is exhaustive
//! over the directive catalogue.
//!
//! Per-record work runs on the caller's rayon pool once a batch reaches the context's parallel
//! threshold. Output order always follows input order.

mod column;
mod decode;
mod parser;
mod row;
mod transform;

use std::sync::{Arc, OnceLock};

use rayon::prelude::*;

use crate::directive::{Directive, DirectiveConfig, ParsedDirective};
use crate::error::{DirectiveResult, StepResult};
use crate::execution::PipelineContext;
use crate::lineage::StepRef;
use crate::types::Record;

pub use decode::{DecoderFactory, DecoderKind, RecordDecoder, SchemaRegistry};

use decode::DecodeTarget;

/// One configured directive, ready to run.
pub struct Step {
    line: usize,
    text: String,
    directive: Directive,
    decoder: OnceLock<Arc<dyn RecordDecoder>>,
}

impl Step {
    pub fn new(line: usize, text: impl Into<String>, directive: Directive) -> Self {
        Self {
            line,
            text: text.into(),
            directive,
            decoder: OnceLock::new(),
        }
    }

    /// Route `parsed` and wrap the result.
    pub fn from_parsed(
        parsed: &ParsedDirective,
        config: &DirectiveConfig,
    ) -> DirectiveResult<Self> {
        let directive = Directive::from_parsed(parsed, config)?;
        Ok(Self::new(parsed.line, parsed.text.clone(), directive))
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn name(&self) -> &'static str {
        self.directive.name()
    }

    pub fn directive(&self) -> &Directive {
        &self.directive
    }

    pub fn step_ref(&self) -> StepRef {
        StepRef::new(self.line, self.name(), self.text.clone())
    }

    /// Forget the decoder resolved by an earlier run.
    pub(crate) fn begin_run(&mut self) {
        self.decoder.take();
    }

    /// Run the step over a batch.
    pub fn execute(
        &self,
        records: Vec<Record>,
        ctx: &mut PipelineContext,
    ) -> StepResult<Vec<Record>> {
        let threshold = ctx.parallel_threshold();
        match &self.directive {
            Directive::Rename { old, new } => column::rename(records, threshold, old, new),
            Directive::SetColumns { names } => column::set_columns(records, threshold, names),
            Directive::Drop { columns } => column::drop(records, threshold, columns),
            Directive::Keep { columns } => column::keep(records, threshold, columns),
            Directive::Merge {
                first,
                second,
                destination,
                separator,
            } => column::merge(records, threshold, first, second, destination, separator),
            Directive::Swap { first, second } => column::swap(records, threshold, first, second),
            Directive::Copy {
                source,
                destination,
                force,
            } => column::copy(records, threshold, source, destination, *force),
            Directive::ChangeColumnCase { .. }
            | Directive::CleanseColumnNames
            | Directive::ColumnsReplace { .. } => match self.directive.relabel_rule() {
                Some(rule) => column::relabel(records, threshold, &rule),
                None => Ok(records),
            },
            Directive::SplitToColumns { column, pattern } => {
                column::split_to_columns(records, threshold, column, pattern)
            }
            Directive::SplitEmail { column } => column::split_email(records, threshold, column),
            Directive::ExtractRegexGroups { column, pattern } => {
                column::extract_regex_groups(records, threshold, column, pattern)
            }
            Directive::CutCharacter {
                source,
                destination,
                ranges,
            } => column::cut_character(records, threshold, source, destination, ranges),
            Directive::GenerateUuid { column } => column::generate_uuid(records, threshold, column),

            Directive::Uppercase { column } => {
                transform::text(records, threshold, column, |s| Ok(s.to_uppercase()))
            }
            Directive::Lowercase { column } => {
                transform::text(records, threshold, column, |s| Ok(s.to_lowercase()))
            }
            Directive::Titlecase { column } => {
                transform::text(records, threshold, column, |s| Ok(transform::title_case(s)))
            }
            Directive::Trim { column } => {
                transform::text(records, threshold, column, |s| Ok(s.trim().to_string()))
            }
            Directive::LeftTrim { column } => {
                transform::text(records, threshold, column, |s| Ok(s.trim_start().to_string()))
            }
            Directive::RightTrim { column } => {
                transform::text(records, threshold, column, |s| Ok(s.trim_end().to_string()))
            }
            Directive::SetColumn { column, expression } => {
                transform::set_column(records, ctx, column, expression)
            }
            Directive::SetType { column, target } => {
                transform::set_type(records, threshold, column, *target)
            }
            Directive::SetCharset { column, charset } => {
                transform::set_charset(records, threshold, column, *charset)
            }
            Directive::FillNullOrEmpty { column, value } => {
                transform::fill_null_or_empty(records, threshold, column, value)
            }
            Directive::FindAndReplace { column, script } => {
                transform::text(records, threshold, column, |s| Ok(script.apply(s)))
            }
            Directive::MaskNumber { column, pattern } => {
                transform::text(records, threshold, column, |s| {
                    Ok(transform::mask_number(s, pattern))
                })
            }
            Directive::MaskShuffle { column } => {
                transform::text(records, threshold, column, |s| Ok(transform::mask_shuffle(s)))
            }
            Directive::FormatDate { column, format } => {
                transform::format_date(records, threshold, column, format)
            }
            Directive::FormatUnixTimestamp { column, format } => {
                transform::format_unix_timestamp(records, threshold, column, format)
            }
            Directive::ParseAsSimpleDate { column, format } => {
                transform::parse_simple_date(records, threshold, column, format)
            }
            Directive::DiffDate {
                first,
                second,
                destination,
            } => transform::diff_date(records, threshold, first, second, destination),
            Directive::Quantize {
                source,
                destination,
                ranges,
            } => transform::quantize(records, threshold, source, destination, ranges),
            Directive::Hash {
                column,
                algorithm,
                encode,
            } => transform::hash(records, threshold, column, *algorithm, *encode),
            Directive::Encode { encoding, column } => {
                transform::encode(records, threshold, column, *encoding)
            }
            Directive::Decode { encoding, column } => {
                transform::decode(records, threshold, column, *encoding)
            }
            Directive::UrlEncode { column } => transform::text(records, threshold, column, |s| {
                Ok(urlencoding::encode(s).into_owned())
            }),
            Directive::UrlDecode { column } => transform::text(records, threshold, column, |s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .map_err(|e| e.to_string())
            }),

            Directive::FilterRowIfTrue { condition } => {
                row::filter_on_condition(records, ctx, condition, true)
            }
            Directive::FilterRowIfFalse { condition } => {
                row::filter_on_condition(records, ctx, condition, false)
            }
            Directive::FilterRowIfMatched { column, pattern } => {
                row::filter_on_regex(records, threshold, column, pattern, true)
            }
            Directive::FilterRowIfNotMatched { column, pattern } => {
                row::filter_on_regex(records, threshold, column, pattern, false)
            }
            Directive::FilterRowsOn(filter) => row::filter_rows_on(records, ctx, filter),
            Directive::SendToError { condition } => {
                row::send_to_error(records, ctx, self.line, condition)
            }
            Directive::Fail { condition } => row::fail(records, ctx, condition),
            Directive::SetVariable {
                variable,
                expression,
            } => row::set_variable(records, ctx, variable, expression),
            Directive::IncrementVariable {
                variable,
                value,
                condition,
            } => row::increment_variable(records, ctx, variable, *value, condition),
            Directive::SplitToRows { column, pattern } => {
                row::split_to_rows(records, threshold, column, |s| {
                    pattern.split(s).map(str::to_string).collect()
                })
            }
            Directive::SetRecordDelim {
                column,
                delimiter,
                limit,
            } => row::split_to_rows(records, threshold, column, |s| {
                let parts = s.split(delimiter.as_str()).map(str::to_string);
                match limit {
                    Some(n) => parts.take(*n).collect(),
                    None => parts.collect(),
                }
            }),

            Directive::ParseAsCsv {
                column,
                delimiter,
                header,
            } => parser::parse_as_csv(records, column, *delimiter, *header),
            Directive::ParseAsJson { column, depth } => {
                parser::parse_as_json(records, threshold, column, *depth)
            }
            Directive::ParseAsFixedLength {
                column,
                widths,
                padding,
            } => parser::parse_as_fixed_length(records, threshold, column, widths, *padding),
            Directive::WriteAsJsonMap { column } => {
                parser::write_as_json_map(records, threshold, column)
            }
            Directive::WriteAsCsv { column } => parser::write_as_csv(records, threshold, column),
            Directive::ParseAsAvro {
                column,
                schema_id,
                encoding,
                version,
            } => {
                let target = DecodeTarget {
                    column,
                    schema_id,
                    version: *version,
                    kind: DecoderKind::Avro { encoding: *encoding },
                };
                decode::decode_records(records, ctx, &self.decoder, &target)
            }
            Directive::ParseAsProtobuf {
                column,
                schema_id,
                record_name,
                version,
            } => {
                let target = DecodeTarget {
                    column,
                    schema_id,
                    version: *version,
                    kind: DecoderKind::Protobuf {
                        record_name: record_name.clone(),
                    },
                };
                decode::decode_records(records, ctx, &self.decoder, &target)
            }

            Directive::Placeholder(_) => Ok(records),
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("line", &self.line)
            .field("text", &self.text)
            .field("directive", &self.directive.name())
            .field("decoder_resolved", &self.decoder.get().is_some())
            .finish()
    }
}

/// Apply `f` to every record.
pub(crate) fn map_records<F>(
    records: Vec<Record>,
    threshold: usize,
    f: F,
) -> StepResult<Vec<Record>>
where
    F: Fn(Record) -> StepResult<Record> + Send + Sync,
{
    if records.len() >= threshold {
        records.into_par_iter().map(f).collect()
    } else {
        records.into_iter().map(f).collect()
    }
}

/// Replace every record by the records `f` returns for it.
pub(crate) fn flat_map_records<F>(
    records: Vec<Record>,
    threshold: usize,
    f: F,
) -> StepResult<Vec<Record>>
where
    F: Fn(Record) -> StepResult<Vec<Record>> + Send + Sync,
{
    let nested: Vec<Vec<Record>> = if records.len() >= threshold {
        records.into_par_iter().map(f).collect::<StepResult<_>>()?
    } else {
        records.into_iter().map(f).collect::<StepResult<_>>()?
    };
    Ok(nested.into_iter().flatten().collect())
}

/// Keep the records for which `keep` returns `true`.
pub(crate) fn filter_records<F>(
    records: Vec<Record>,
    threshold: usize,
    keep: F,
) -> StepResult<Vec<Record>>
where
    F: Fn(&Record) -> StepResult<bool> + Send + Sync,
{
    let decide = |record: Record| keep(&record).map(|k| k.then_some(record));
    let kept: Vec<Option<Record>> = if records.len() >= threshold {
        records.into_par_iter().map(decide).collect::<StepResult<_>>()?
    } else {
        records.into_iter().map(decide).collect::<StepResult<_>>()?
    };
    Ok(kept.into_iter().flatten().collect())
}
