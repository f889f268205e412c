//! Directives: the instructions of a transformation script.
//!
//! A [`ParsedDirective`] is the untyped `(line, name, args)` triple produced by a front-end
//! such as [`parse_script`]. [`Directive::from_parsed`] routes it into the closed [`Directive`]
//! enum, which carries typed arguments. Both the pipeline (via [`crate::steps::Step`]) and the
//! lineage tracker (via [`Directive::lineage_effect`]) consume the typed form, so a directive
//! is either understood by both or rejected before a run starts.

mod args;
mod config;
mod params;
mod text;

use regex::Regex;

use crate::error::{DirectiveError, DirectiveResult};
use crate::expression::Expression;
use crate::lineage::LineageEffect;

use args::{Args, unescape_delimiter};

pub use config::DirectiveConfig;
pub use params::{
    AvroEncoding, CharRange, Charset, ColumnRelabel, Encoding, HashAlgorithm, Placeholder,
    QuantizeRange, RowFilter, SedScript, TargetType,
};
pub use text::parse_script;

/// A directive as written: its script line, name and raw positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDirective {
    /// 1-based script line.
    pub line: usize,
    pub name: String,
    pub args: Vec<String>,
    /// Original directive text, for diagnostics and lineage.
    pub text: String,
}

impl ParsedDirective {
    pub fn new<I, S>(line: usize, name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let text = std::iter::once(name.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            line,
            name,
            args,
            text,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// Every directive name the router understands, excluding placeholders.
pub const CATALOGUE: &[&str] = &[
    "rename",
    "set-columns",
    "drop",
    "keep",
    "merge",
    "swap",
    "copy",
    "change-column-case",
    "cleanse-column-names",
    "columns-replace",
    "split-to-columns",
    "split-email",
    "extract-regex-groups",
    "cut-character",
    "generate-uuid",
    "uppercase",
    "lowercase",
    "titlecase",
    "trim",
    "ltrim",
    "rtrim",
    "set-column",
    "set-type",
    "set-charset",
    "fill-null-or-empty",
    "find-and-replace",
    "mask-number",
    "mask-shuffle",
    "format-date",
    "format-unix-timestamp",
    "parse-as-simple-date",
    "diff-date",
    "quantize",
    "hash",
    "encode",
    "decode",
    "url-encode",
    "url-decode",
    "filter-row-if-true",
    "filter-row-if-false",
    "filter-row-if-matched",
    "filter-row-if-not-matched",
    "filter-rows-on",
    "send-to-error",
    "fail",
    "set-variable",
    "increment-variable",
    "split-to-rows",
    "set-record-delim",
    "parse-as-csv",
    "parse-as-json",
    "parse-as-fixed-length",
    "write-as-json-map",
    "write-as-csv",
    "parse-as-avro",
    "parse-as-protobuf",
];

/// Resolve a name to its static catalogue spelling, following the built-in aliases.
pub fn canonical_name(name: &str) -> Option<&'static str> {
    let name = match name {
        "setcolumns" => "set-columns",
        "setcolumn" => "set-column",
        other => other,
    };
    CATALOGUE
        .iter()
        .copied()
        .find(|n| *n == name)
        .or_else(|| Placeholder::lookup(name).map(Placeholder::name))
}

/// A directive with typed arguments.
#[derive(Debug, Clone)]
pub enum Directive {
    Rename {
        old: String,
        new: String,
    },
    SetColumns {
        names: Vec<String>,
    },
    Drop {
        columns: Vec<String>,
    },
    Keep {
        columns: Vec<String>,
    },
    Merge {
        first: String,
        second: String,
        destination: String,
        separator: String,
    },
    Swap {
        first: String,
        second: String,
    },
    Copy {
        source: String,
        destination: String,
        force: bool,
    },
    ChangeColumnCase {
        upper: bool,
    },
    CleanseColumnNames,
    ColumnsReplace {
        script: SedScript,
    },
    SplitToColumns {
        column: String,
        pattern: Regex,
    },
    SplitEmail {
        column: String,
    },
    ExtractRegexGroups {
        column: String,
        pattern: Regex,
    },
    CutCharacter {
        source: String,
        destination: String,
        ranges: Vec<CharRange>,
    },
    GenerateUuid {
        column: String,
    },

    Uppercase {
        column: String,
    },
    Lowercase {
        column: String,
    },
    Titlecase {
        column: String,
    },
    Trim {
        column: String,
    },
    LeftTrim {
        column: String,
    },
    RightTrim {
        column: String,
    },
    SetColumn {
        column: String,
        expression: Expression,
    },
    SetType {
        column: String,
        target: TargetType,
    },
    SetCharset {
        column: String,
        charset: Charset,
    },
    FillNullOrEmpty {
        column: String,
        value: String,
    },
    FindAndReplace {
        column: String,
        script: SedScript,
    },
    MaskNumber {
        column: String,
        pattern: String,
    },
    MaskShuffle {
        column: String,
    },
    FormatDate {
        column: String,
        format: String,
    },
    FormatUnixTimestamp {
        column: String,
        format: String,
    },
    ParseAsSimpleDate {
        column: String,
        format: String,
    },
    DiffDate {
        first: String,
        second: String,
        destination: String,
    },
    Quantize {
        source: String,
        destination: String,
        ranges: Vec<QuantizeRange>,
    },
    Hash {
        column: String,
        algorithm: HashAlgorithm,
        encode: bool,
    },
    Encode {
        encoding: Encoding,
        column: String,
    },
    Decode {
        encoding: Encoding,
        column: String,
    },
    UrlEncode {
        column: String,
    },
    UrlDecode {
        column: String,
    },

    FilterRowIfTrue {
        condition: Expression,
    },
    FilterRowIfFalse {
        condition: Expression,
    },
    FilterRowIfMatched {
        column: String,
        pattern: Regex,
    },
    FilterRowIfNotMatched {
        column: String,
        pattern: Regex,
    },
    FilterRowsOn(RowFilter),
    SendToError {
        condition: Expression,
    },
    Fail {
        condition: Expression,
    },
    SetVariable {
        variable: String,
        expression: Expression,
    },
    IncrementVariable {
        variable: String,
        value: i64,
        condition: Expression,
    },
    SplitToRows {
        column: String,
        pattern: Regex,
    },
    SetRecordDelim {
        column: String,
        delimiter: String,
        limit: Option<usize>,
    },

    ParseAsCsv {
        column: String,
        delimiter: u8,
        header: bool,
    },
    ParseAsJson {
        column: String,
        depth: Option<usize>,
    },
    ParseAsFixedLength {
        column: String,
        widths: Vec<usize>,
        padding: char,
    },
    WriteAsJsonMap {
        column: String,
    },
    WriteAsCsv {
        column: String,
    },
    ParseAsAvro {
        column: String,
        schema_id: String,
        encoding: AvroEncoding,
        version: Option<i64>,
    },
    ParseAsProtobuf {
        column: String,
        schema_id: String,
        record_name: String,
        version: Option<i64>,
    },

    /// Accepted but without a record or lineage effect.
    Placeholder(Placeholder),
}

impl Directive {
    /// Route a parsed directive into its typed form.
    pub fn from_parsed(
        parsed: &ParsedDirective,
        config: &DirectiveConfig,
    ) -> DirectiveResult<Self> {
        let line = parsed.line;
        let requested = parsed.name.trim();
        let name = canonical_name(config.resolve(requested)).ok_or_else(|| {
            DirectiveError::Unsupported {
                line,
                name: requested.to_string(),
            }
        })?;
        if config.is_excluded(requested) || config.is_excluded(name) {
            return Err(DirectiveError::Excluded {
                line,
                name: requested.to_string(),
            });
        }

        if let Some(placeholder) = Placeholder::lookup(name) {
            return Ok(Directive::Placeholder(placeholder));
        }
        route(name, &Args::new(line, name, &parsed.args))
    }

    /// Catalogue name of the directive.
    pub fn name(&self) -> &'static str {
        match self {
            Directive::Rename { .. } => "rename",
            Directive::SetColumns { .. } => "set-columns",
            Directive::Drop { .. } => "drop",
            Directive::Keep { .. } => "keep",
            Directive::Merge { .. } => "merge",
            Directive::Swap { .. } => "swap",
            Directive::Copy { .. } => "copy",
            Directive::ChangeColumnCase { .. } => "change-column-case",
            Directive::CleanseColumnNames => "cleanse-column-names",
            Directive::ColumnsReplace { .. } => "columns-replace",
            Directive::SplitToColumns { .. } => "split-to-columns",
            Directive::SplitEmail { .. } => "split-email",
            Directive::ExtractRegexGroups { .. } => "extract-regex-groups",
            Directive::CutCharacter { .. } => "cut-character",
            Directive::GenerateUuid { .. } => "generate-uuid",
            Directive::Uppercase { .. } => "uppercase",
            Directive::Lowercase { .. } => "lowercase",
            Directive::Titlecase { .. } => "titlecase",
            Directive::Trim { .. } => "trim",
            Directive::LeftTrim { .. } => "ltrim",
            Directive::RightTrim { .. } => "rtrim",
            Directive::SetColumn { .. } => "set-column",
            Directive::SetType { .. } => "set-type",
            Directive::SetCharset { .. } => "set-charset",
            Directive::FillNullOrEmpty { .. } => "fill-null-or-empty",
            Directive::FindAndReplace { .. } => "find-and-replace",
            Directive::MaskNumber { .. } => "mask-number",
            Directive::MaskShuffle { .. } => "mask-shuffle",
            Directive::FormatDate { .. } => "format-date",
            Directive::FormatUnixTimestamp { .. } => "format-unix-timestamp",
            Directive::ParseAsSimpleDate { .. } => "parse-as-simple-date",
            Directive::DiffDate { .. } => "diff-date",
            Directive::Quantize { .. } => "quantize",
            Directive::Hash { .. } => "hash",
            Directive::Encode { .. } => "encode",
            Directive::Decode { .. } => "decode",
            Directive::UrlEncode { .. } => "url-encode",
            Directive::UrlDecode { .. } => "url-decode",
            Directive::FilterRowIfTrue { .. } => "filter-row-if-true",
            Directive::FilterRowIfFalse { .. } => "filter-row-if-false",
            Directive::FilterRowIfMatched { .. } => "filter-row-if-matched",
            Directive::FilterRowIfNotMatched { .. } => "filter-row-if-not-matched",
            Directive::FilterRowsOn(_) => "filter-rows-on",
            Directive::SendToError { .. } => "send-to-error",
            Directive::Fail { .. } => "fail",
            Directive::SetVariable { .. } => "set-variable",
            Directive::IncrementVariable { .. } => "increment-variable",
            Directive::SplitToRows { .. } => "split-to-rows",
            Directive::SetRecordDelim { .. } => "set-record-delim",
            Directive::ParseAsCsv { .. } => "parse-as-csv",
            Directive::ParseAsJson { .. } => "parse-as-json",
            Directive::ParseAsFixedLength { .. } => "parse-as-fixed-length",
            Directive::WriteAsJsonMap { .. } => "write-as-json-map",
            Directive::WriteAsCsv { .. } => "write-as-csv",
            Directive::ParseAsAvro { .. } => "parse-as-avro",
            Directive::ParseAsProtobuf { .. } => "parse-as-protobuf",
            Directive::Placeholder(p) => p.name(),
        }
    }

    /// Rule for directives that rename every column.
    pub fn relabel_rule(&self) -> Option<ColumnRelabel> {
        match self {
            Directive::ChangeColumnCase { upper: true } => Some(ColumnRelabel::Upper),
            Directive::ChangeColumnCase { upper: false } => Some(ColumnRelabel::Lower),
            Directive::CleanseColumnNames => Some(ColumnRelabel::Cleanse),
            Directive::ColumnsReplace { script } => Some(ColumnRelabel::Replace(script.clone())),
            _ => None,
        }
    }

    /// Effect of this directive on column lineage.
    ///
    /// Directives whose output columns depend on the data (`split-to-columns`,
    /// `extract-regex-groups`, the `parse-as-*` family) and row-level directives leave lineage
    /// untouched.
    pub fn lineage_effect(&self) -> LineageEffect {
        match self {
            Directive::Rename { old, new } => LineageEffect::Rename {
                old: old.clone(),
                new: new.clone(),
            },
            Directive::SetColumns { names } => LineageEffect::SetColumns {
                names: names.clone(),
            },
            Directive::Drop { columns } => LineageEffect::Drop {
                columns: columns.clone(),
            },
            Directive::Keep { columns } => LineageEffect::Keep {
                columns: columns.clone(),
            },
            Directive::Merge {
                first,
                second,
                destination,
                ..
            } => derive(&[first, second], &[destination]),
            Directive::Swap { first, second } => LineageEffect::Swap {
                first: first.clone(),
                second: second.clone(),
            },
            Directive::Copy {
                source,
                destination,
                ..
            }
            | Directive::CutCharacter {
                source,
                destination,
                ..
            }
            | Directive::Quantize {
                source,
                destination,
                ..
            } => derive(&[source], &[destination]),
            Directive::DiffDate {
                first,
                second,
                destination,
            } => derive(&[first, second], &[destination]),
            Directive::SplitEmail { column } => LineageEffect::Derive {
                sources: vec![column.clone()],
                destinations: vec![format!("{column}_account"), format!("{column}_domain")],
            },
            Directive::ChangeColumnCase { .. }
            | Directive::CleanseColumnNames
            | Directive::ColumnsReplace { .. } => match self.relabel_rule() {
                Some(rule) => LineageEffect::Relabel(rule),
                None => LineageEffect::None,
            },

            Directive::GenerateUuid { column }
            | Directive::Uppercase { column }
            | Directive::Lowercase { column }
            | Directive::Titlecase { column }
            | Directive::Trim { column }
            | Directive::LeftTrim { column }
            | Directive::RightTrim { column }
            | Directive::SetColumn { column, .. }
            | Directive::SetType { column, .. }
            | Directive::SetCharset { column, .. }
            | Directive::FillNullOrEmpty { column, .. }
            | Directive::FindAndReplace { column, .. }
            | Directive::MaskNumber { column, .. }
            | Directive::MaskShuffle { column }
            | Directive::FormatDate { column, .. }
            | Directive::FormatUnixTimestamp { column, .. }
            | Directive::ParseAsSimpleDate { column, .. }
            | Directive::Hash { column, .. }
            | Directive::Encode { column, .. }
            | Directive::Decode { column, .. }
            | Directive::UrlEncode { column }
            | Directive::UrlDecode { column }
            | Directive::FilterRowIfMatched { column, .. }
            | Directive::FilterRowIfNotMatched { column, .. }
            | Directive::SplitToRows { column, .. }
            | Directive::SetRecordDelim { column, .. }
            | Directive::WriteAsJsonMap { column }
            | Directive::WriteAsCsv { column } => mutate(column),
            Directive::SetVariable { variable, .. }
            | Directive::IncrementVariable { variable, .. } => mutate(variable),

            Directive::SplitToColumns { .. }
            | Directive::ExtractRegexGroups { .. }
            | Directive::FilterRowIfTrue { .. }
            | Directive::FilterRowIfFalse { .. }
            | Directive::FilterRowsOn(_)
            | Directive::SendToError { .. }
            | Directive::Fail { .. }
            | Directive::ParseAsCsv { .. }
            | Directive::ParseAsJson { .. }
            | Directive::ParseAsFixedLength { .. }
            | Directive::ParseAsAvro { .. }
            | Directive::ParseAsProtobuf { .. }
            | Directive::Placeholder(_) => LineageEffect::None,
        }
    }
}

fn mutate(column: &str) -> LineageEffect {
    LineageEffect::Mutate {
        column: column.to_string(),
    }
}

fn derive(sources: &[&String], destinations: &[&String]) -> LineageEffect {
    LineageEffect::Derive {
        sources: sources.iter().map(|s| s.to_string()).collect(),
        destinations: destinations.iter().map(|d| d.to_string()).collect(),
    }
}

fn route(name: &'static str, a: &Args<'_>) -> DirectiveResult<Directive> {
    let column = || a.string(0, "column");

    let directive = match name {
        "rename" => Directive::Rename {
            old: a.string(0, "old")?,
            new: a.string(1, "new")?,
        },
        "set-columns" => Directive::SetColumns {
            names: a.columns(0, "names")?,
        },
        "drop" => Directive::Drop {
            columns: a.columns(0, "columns")?,
        },
        "keep" => Directive::Keep {
            columns: a.columns(0, "columns")?,
        },
        "merge" => Directive::Merge {
            first: a.string(0, "first")?,
            second: a.string(1, "second")?,
            destination: a.string(2, "destination")?,
            separator: a.optional(3).map(unescape_delimiter).unwrap_or_default(),
        },
        "swap" => Directive::Swap {
            first: a.string(0, "first")?,
            second: a.string(1, "second")?,
        },
        "copy" => Directive::Copy {
            source: a.string(0, "source")?,
            destination: a.string(1, "destination")?,
            force: a.flag(2, "force", false)?,
        },
        "change-column-case" => {
            let raw = a.required(0, "case")?;
            let upper = match raw.to_ascii_lowercase().as_str() {
                "upper" | "uppercase" => true,
                "lower" | "lowercase" => false,
                _ => return Err(a.invalid("case", raw, "expected upper or lower")),
            };
            Directive::ChangeColumnCase { upper }
        }
        "cleanse-column-names" => Directive::CleanseColumnNames,
        "columns-replace" => {
            let raw = a.rest(0, "sed-expression")?;
            Directive::ColumnsReplace {
                script: raw
                    .parse()
                    .map_err(|e: String| a.invalid("sed-expression", &raw, e))?,
            }
        }
        "split-to-columns" => Directive::SplitToColumns {
            column: column()?,
            pattern: a.regex(&a.rest(1, "regex")?, "regex")?,
        },
        "split-email" => Directive::SplitEmail { column: column()? },
        "extract-regex-groups" => Directive::ExtractRegexGroups {
            column: column()?,
            pattern: a.regex(&a.rest(1, "regex")?, "regex")?,
        },
        "cut-character" => {
            let raw = a.required(2, "range")?;
            Directive::CutCharacter {
                source: a.string(0, "source")?,
                destination: a.string(1, "destination")?,
                ranges: CharRange::parse_list(raw).map_err(|e| a.invalid("range", raw, e))?,
            }
        }
        "generate-uuid" => Directive::GenerateUuid { column: column()? },

        "uppercase" => Directive::Uppercase { column: column()? },
        "lowercase" => Directive::Lowercase { column: column()? },
        "titlecase" => Directive::Titlecase { column: column()? },
        "trim" => Directive::Trim { column: column()? },
        "ltrim" => Directive::LeftTrim { column: column()? },
        "rtrim" => Directive::RightTrim { column: column()? },
        "set-column" => Directive::SetColumn {
            column: column()?,
            expression: a.expression(1, "expression")?,
        },
        "set-type" => Directive::SetType {
            column: column()?,
            target: a.parse(1, "type")?,
        },
        "set-charset" => Directive::SetCharset {
            column: column()?,
            charset: a.parse(1, "charset")?,
        },
        "fill-null-or-empty" => Directive::FillNullOrEmpty {
            column: column()?,
            value: a.rest(1, "value")?,
        },
        "find-and-replace" => {
            let raw = a.rest(1, "sed-expression")?;
            Directive::FindAndReplace {
                column: column()?,
                script: raw
                    .parse()
                    .map_err(|e: String| a.invalid("sed-expression", &raw, e))?,
            }
        }
        "mask-number" => Directive::MaskNumber {
            column: column()?,
            pattern: a.string(1, "pattern")?,
        },
        "mask-shuffle" => Directive::MaskShuffle { column: column()? },
        "format-date" => Directive::FormatDate {
            column: column()?,
            format: a.strftime(1, "format")?,
        },
        "format-unix-timestamp" => Directive::FormatUnixTimestamp {
            column: column()?,
            format: a.strftime(1, "format")?,
        },
        "parse-as-simple-date" => Directive::ParseAsSimpleDate {
            column: column()?,
            format: a.strftime(1, "format")?,
        },
        "diff-date" => Directive::DiffDate {
            first: a.string(0, "first")?,
            second: a.string(1, "second")?,
            destination: a.string(2, "destination")?,
        },
        "quantize" => {
            let raw = a.rest(2, "ranges")?;
            Directive::Quantize {
                source: a.string(0, "source")?,
                destination: a.string(1, "destination")?,
                ranges: QuantizeRange::parse_list(&raw).map_err(|e| a.invalid("ranges", &raw, e))?,
            }
        }
        "hash" => Directive::Hash {
            column: column()?,
            algorithm: a.parse(1, "algorithm")?,
            encode: a.flag(2, "encode", true)?,
        },
        "encode" => Directive::Encode {
            encoding: a.parse(0, "encoding")?,
            column: a.string(1, "column")?,
        },
        "decode" => Directive::Decode {
            encoding: a.parse(0, "encoding")?,
            column: a.string(1, "column")?,
        },
        "url-encode" => Directive::UrlEncode { column: column()? },
        "url-decode" => Directive::UrlDecode { column: column()? },

        "filter-row-if-true" => Directive::FilterRowIfTrue {
            condition: a.expression(0, "condition")?,
        },
        "filter-row-if-false" => Directive::FilterRowIfFalse {
            condition: a.expression(0, "condition")?,
        },
        "filter-row-if-matched" => Directive::FilterRowIfMatched {
            column: column()?,
            pattern: a.full_match_regex(&a.rest(1, "regex")?, "regex")?,
        },
        "filter-row-if-not-matched" => Directive::FilterRowIfNotMatched {
            column: column()?,
            pattern: a.full_match_regex(&a.rest(1, "regex")?, "regex")?,
        },
        "filter-rows-on" => Directive::FilterRowsOn(route_row_filter(a)?),
        "send-to-error" => Directive::SendToError {
            condition: a.expression(0, "condition")?,
        },
        "fail" => Directive::Fail {
            condition: a.expression(0, "condition")?,
        },
        "set-variable" => Directive::SetVariable {
            variable: a.string(0, "variable")?,
            expression: a.expression(1, "expression")?,
        },
        "increment-variable" => Directive::IncrementVariable {
            variable: a.string(0, "variable")?,
            value: a.parse(1, "value")?,
            condition: a.expression(2, "condition")?,
        },
        "split-to-rows" => Directive::SplitToRows {
            column: column()?,
            pattern: a.regex(&a.rest(1, "separator")?, "separator")?,
        },
        "set-record-delim" => Directive::SetRecordDelim {
            column: column()?,
            delimiter: unescape_delimiter(a.required(1, "delimiter")?),
            limit: a.parse_optional(2, "limit")?,
        },

        "parse-as-csv" => {
            let raw = a.required(1, "delimiter")?;
            let delimiter = match unescape_delimiter(raw).as_bytes() {
                [b] => *b,
                _ => return Err(a.invalid("delimiter", raw, "expected a single ASCII character")),
            };
            Directive::ParseAsCsv {
                column: column()?,
                delimiter,
                header: a.flag(2, "header", false)?,
            }
        }
        "parse-as-json" => Directive::ParseAsJson {
            column: column()?,
            depth: a.parse_optional(1, "depth")?,
        },
        "parse-as-fixed-length" => {
            let raw = a.required(1, "widths")?;
            let widths = raw
                .split(',')
                .map(|w| w.trim().parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| a.invalid("widths", raw, e.to_string()))?;
            let padding = match a.optional(2).map(unescape_delimiter) {
                None => ' ',
                Some(p) => {
                    let mut chars = p.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => c,
                        _ => return Err(a.invalid("padding", &p, "expected a single character")),
                    }
                }
            };
            Directive::ParseAsFixedLength {
                column: column()?,
                widths,
                padding,
            }
        }
        "write-as-json-map" => Directive::WriteAsJsonMap { column: column()? },
        "write-as-csv" => Directive::WriteAsCsv { column: column()? },
        "parse-as-avro" => Directive::ParseAsAvro {
            column: column()?,
            schema_id: a.string(1, "schema-id")?,
            encoding: a.parse(2, "encoding")?,
            version: a.parse_optional(3, "version")?,
        },
        "parse-as-protobuf" => Directive::ParseAsProtobuf {
            column: column()?,
            schema_id: a.string(1, "schema-id")?,
            record_name: a.string(2, "record-name")?,
            version: a.parse_optional(3, "version")?,
        },

        other => {
            return Err(a.invalid("directive", other, "no routing for catalogue entry"));
        }
    };
    Ok(directive)
}

fn route_row_filter(a: &Args<'_>) -> DirectiveResult<RowFilter> {
    let command = a.required(0, "command")?;
    let filter = match command {
        "condition-true" => RowFilter::ConditionTrue(a.expression(1, "condition")?),
        "condition-false" => RowFilter::ConditionFalse(a.expression(1, "condition")?),
        "empty-or-null-columns" => RowFilter::EmptyOrNullColumns(a.columns(1, "columns")?),
        "regex-match" => RowFilter::RegexMatch {
            column: a.string(1, "column")?,
            pattern: a.full_match_regex(&a.rest(2, "regex")?, "regex")?,
        },
        "regex-not-match" => RowFilter::RegexNotMatch {
            column: a.string(1, "column")?,
            pattern: a.full_match_regex(&a.rest(2, "regex")?, "regex")?,
        },
        other => {
            return Err(a.invalid(
                "command",
                other,
                "expected condition-true, condition-false, empty-or-null-columns, regex-match or regex-not-match",
            ));
        }
    };
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::{
        CATALOGUE, Directive, DirectiveConfig, ParsedDirective, Placeholder, canonical_name,
    };
    use crate::error::DirectiveError;
    use crate::lineage::LineageEffect;

    fn route(name: &str, args: &[&str]) -> Result<Directive, DirectiveError> {
        let parsed = ParsedDirective::new(1, name, args.iter().copied());
        Directive::from_parsed(&parsed, &DirectiveConfig::default())
    }

    #[test]
    fn catalogue_names_are_canonical() {
        for name in CATALOGUE {
            assert_eq!(canonical_name(name), Some(*name));
        }
        assert_eq!(canonical_name("setcolumns"), Some("set-columns"));
        assert_eq!(canonical_name("setcolumn"), Some("set-column"));
        assert_eq!(canonical_name("flatten"), Some("flatten"));
        assert_eq!(canonical_name("explode"), None);
    }

    #[test]
    fn unknown_directive_is_unsupported() {
        let err = route("explode", &["a"]).unwrap_err();
        assert!(matches!(
            err,
            DirectiveError::Unsupported { line: 1, ref name } if name == "explode"
        ));
    }

    #[test]
    fn placeholders_route_and_have_no_lineage_effect() {
        let d = route("xpath", &["body", "dest", "/a/b"]).unwrap();
        assert!(matches!(d, Directive::Placeholder(Placeholder::Xpath)));
        assert_eq!(d.name(), "xpath");
        assert!(matches!(d.lineage_effect(), LineageEffect::None));
    }

    #[test]
    fn routed_name_matches_requested_name() {
        let cases: &[(&str, &[&str])] = &[
            ("rename", &["a", "b"]),
            ("set-columns", &["a,b"]),
            ("merge", &["a", "b", "c", ","]),
            ("hash", &["a", "SHA-256"]),
            ("encode", &["base64", "a"]),
            ("filter-rows-on", &["empty-or-null-columns", "a,b"]),
            ("parse-as-csv", &["body", ","]),
            ("parse-as-avro", &["body", "schema-1", "binary", "2"]),
            ("increment-variable", &["n", "1", "a > 0"]),
        ];
        for (name, args) in cases {
            let d = route(name, args).unwrap();
            assert_eq!(d.name(), *name);
        }
    }

    #[test]
    fn missing_and_invalid_arguments_are_reported() {
        let err = route("rename", &["a"]).unwrap_err();
        assert!(matches!(
            err,
            DirectiveError::MissingArgument {
                directive: "rename",
                argument: "new",
                ..
            }
        ));

        let err = route("hash", &["a", "md5"]).unwrap_err();
        assert!(matches!(err, DirectiveError::InvalidArgument { argument: "algorithm", .. }));

        let err = route("filter-row-if-true", &["count", ">"]).unwrap_err();
        assert!(matches!(err, DirectiveError::InvalidArgument { argument: "condition", .. }));

        let err = route("parse-as-csv", &["body", "ab"]).unwrap_err();
        assert!(matches!(err, DirectiveError::InvalidArgument { argument: "delimiter", .. }));
    }

    #[test]
    fn column_lists_accept_commas_and_spaces() {
        let Directive::Drop { columns } = route("drop", &["a,b", "c"]).unwrap() else {
            panic!("expected drop");
        };
        assert_eq!(columns, vec!["a", "b", "c"]);
    }

    #[test]
    fn merge_separator_defaults_to_empty_and_unescapes() {
        let Directive::Merge { separator, .. } = route("merge", &["a", "b", "c"]).unwrap() else {
            panic!("expected merge");
        };
        assert_eq!(separator, "");
        let Directive::Merge { separator, .. } = route("merge", &["a", "b", "c", "\\t"]).unwrap()
        else {
            panic!("expected merge");
        };
        assert_eq!(separator, "\t");
    }

    #[test]
    fn lineage_effects_follow_directive_shape() {
        let merge = route("merge", &["a", "b", "c"]).unwrap();
        match merge.lineage_effect() {
            LineageEffect::Derive {
                sources,
                destinations,
            } => {
                assert_eq!(sources, vec!["a", "b"]);
                assert_eq!(destinations, vec!["c"]);
            }
            other => panic!("unexpected effect {other:?}"),
        }
        assert!(matches!(
            route("uppercase", &["a"]).unwrap().lineage_effect(),
            LineageEffect::Mutate { ref column } if column == "a"
        ));
        assert!(matches!(
            route("filter-row-if-true", &["a > 1"]).unwrap().lineage_effect(),
            LineageEffect::None
        ));
        assert!(matches!(
            route("cleanse-column-names", &[]).unwrap().lineage_effect(),
            LineageEffect::Relabel(_)
        ));
    }
}
