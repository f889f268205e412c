//! Typed directive parameters.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::expression::Expression;

/// A `s/pattern/replacement/flags` script as used by `find-and-replace` and
/// `columns-replace`.
///
/// Flags: `g` replaces every match, `i` matches case-insensitively. Back references may be
/// written as `\1` or `$1`; `&` stands for the whole match.
#[derive(Debug, Clone)]
pub struct SedScript {
    source: String,
    pattern: Regex,
    replacement: String,
    global: bool,
}

impl SedScript {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn apply(&self, input: &str) -> String {
        if self.global {
            self.pattern
                .replace_all(input, self.replacement.as_str())
                .into_owned()
        } else {
            self.pattern
                .replace(input, self.replacement.as_str())
                .into_owned()
        }
    }
}

impl FromStr for SedScript {
    type Err = String;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let source = source.trim();
        let mut chars = source.chars();
        if chars.next() != Some('s') {
            return Err("expected s/<pattern>/<replacement>/[flags]".to_string());
        }
        let delimiter = chars
            .next()
            .ok_or_else(|| "missing delimiter after 's'".to_string())?;

        let mut parts = Vec::new();
        let mut current = String::new();
        let mut escaped = false;
        for c in chars {
            if escaped {
                // An escaped delimiter is literal; every other escape is kept for the regex.
                if c != delimiter {
                    current.push('\\');
                }
                current.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == delimiter {
                parts.push(std::mem::take(&mut current));
            } else {
                current.push(c);
            }
        }
        if escaped {
            current.push('\\');
        }
        parts.push(current);
        if parts.len() < 2 || parts.len() > 3 {
            return Err("expected s/<pattern>/<replacement>/[flags]".to_string());
        }

        let flags = parts.get(2).cloned().unwrap_or_default();
        let mut global = false;
        let mut insensitive = false;
        for flag in flags.chars() {
            match flag {
                'g' => global = true,
                'i' | 'I' => insensitive = true,
                other => return Err(format!("unknown flag '{other}'")),
            }
        }

        let pattern = if insensitive {
            format!("(?i){}", parts[0])
        } else {
            parts[0].clone()
        };
        let pattern = Regex::new(&pattern).map_err(|e| e.to_string())?;

        Ok(Self {
            source: source.to_string(),
            pattern,
            replacement: translate_replacement(&parts[1]),
            global,
        })
    }
}

/// Rewrite sed-style back references into the `regex` crate's `${n}` form.
fn translate_replacement(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(d) if d.is_ascii_digit() => {
                    out.push_str("${");
                    out.push(d);
                    out.push('}');
                }
                Some('&') => out.push('&'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            '&' => out.push_str("${0}"),
            '$' if chars.peek().is_some_and(|n| n.is_ascii_digit() || *n == '{') => out.push('$'),
            '$' => out.push_str("$$"),
            other => out.push(other),
        }
    }
    out
}

/// A rule that renames every column of a record.
#[derive(Debug, Clone)]
pub enum ColumnRelabel {
    Upper,
    Lower,
    /// Lower-case, with anything outside `[a-z0-9_]` replaced by `_`.
    Cleanse,
    Replace(SedScript),
}

impl ColumnRelabel {
    pub fn apply(&self, name: &str) -> String {
        match self {
            ColumnRelabel::Upper => name.to_uppercase(),
            ColumnRelabel::Lower => name.to_lowercase(),
            ColumnRelabel::Cleanse => name
                .trim()
                .to_lowercase()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
                .collect(),
            ColumnRelabel::Replace(script) => script.apply(name),
        }
    }
}

/// Digest algorithm for `hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized: String = raw
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "SHA224" => Ok(Self::Sha224),
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            _ => Err("supported algorithms are SHA-224, SHA-256, SHA-384, SHA-512".to_string()),
        }
    }
}

/// Binary-to-text encoding for `encode` and `decode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Base64,
    Base32,
    Hex,
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "base64" => Ok(Self::Base64),
            "base32" => Ok(Self::Base32),
            "hex" => Ok(Self::Hex),
            _ => Err("supported encodings are base64, base32, hex".to_string()),
        }
    }
}

/// Target kind for `set-type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Int,
    Float,
    Text,
    Bool,
    Bytes,
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "int" | "integer" | "long" | "short" => Ok(Self::Int),
            "float" | "double" | "decimal" => Ok(Self::Float),
            "string" | "text" => Ok(Self::Text),
            "bool" | "boolean" => Ok(Self::Bool),
            "bytes" => Ok(Self::Bytes),
            _ => Err("expected int, long, float, double, string, boolean or bytes".to_string()),
        }
    }
}

/// Character set for `set-charset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Ascii,
    Latin1,
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "us-ascii" | "ascii" => Ok(Self::Ascii),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            _ => Err("supported charsets are utf-8, us-ascii, iso-8859-1".to_string()),
        }
    }
}

impl Charset {
    /// Decode `bytes`. Returns `None` when they are not valid in this charset.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            Charset::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|b| char::from(*b)).collect()),
            Charset::Latin1 => Some(bytes.iter().map(|b| char::from(*b)).collect()),
        }
    }
}

/// Character positions for `cut-character`, 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharRange {
    Single(usize),
    Span { start: usize, end: Option<usize> },
}

impl CharRange {
    /// Parse a list such as `1-3,5,7-`.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, String> {
        let mut ranges = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let position = |s: &str| -> Result<usize, String> {
                let n = s
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| format!("'{s}': {e}"))?;
                if n == 0 {
                    return Err("positions start at 1".to_string());
                }
                Ok(n)
            };
            let range = match part.split_once('-') {
                None => Self::Single(position(part)?),
                Some((start, end)) => {
                    let start = if start.trim().is_empty() { 1 } else { position(start)? };
                    let end = if end.trim().is_empty() {
                        None
                    } else {
                        Some(position(end)?)
                    };
                    if end.is_some_and(|e| e < start) {
                        return Err(format!("range '{part}' ends before it starts"));
                    }
                    Self::Span { start, end }
                }
            };
            ranges.push(range);
        }
        if ranges.is_empty() {
            return Err("no character positions given".to_string());
        }
        Ok(ranges)
    }

    pub(crate) fn select(self, chars: &[char], out: &mut String) {
        let (start, end) = match self {
            Self::Single(n) => (n, Some(n)),
            Self::Span { start, end } => (start, end),
        };
        let end = end.unwrap_or(chars.len()).min(chars.len());
        if start <= end {
            out.extend(&chars[start - 1..end]);
        }
    }
}

/// One `[low:high)=label` bucket for `quantize`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizeRange {
    pub low: f64,
    pub high: f64,
    pub label: String,
}

impl QuantizeRange {
    /// Parse a list such as `0:10=low,10:20=high`.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, String> {
        let mut out = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (bounds, label) = part
                .split_once('=')
                .ok_or_else(|| format!("'{part}' should look like low:high=label"))?;
            let (low, high) = bounds
                .split_once(':')
                .ok_or_else(|| format!("'{bounds}' should look like low:high"))?;
            let low = low.trim().parse::<f64>().map_err(|e| format!("'{low}': {e}"))?;
            let high = high.trim().parse::<f64>().map_err(|e| format!("'{high}': {e}"))?;
            if high < low {
                return Err(format!("range '{bounds}' ends before it starts"));
            }
            out.push(Self {
                low,
                high,
                label: label.trim().to_string(),
            });
        }
        if out.is_empty() {
            return Err("no ranges given".to_string());
        }
        Ok(out)
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.low && v < self.high
    }
}

/// Sub-commands of `filter-rows-on`.
#[derive(Debug, Clone)]
pub enum RowFilter {
    /// Drop records for which the condition is true.
    ConditionTrue(Expression),
    /// Drop records for which the condition is false.
    ConditionFalse(Expression),
    /// Drop records in which every listed column is null, empty or missing.
    EmptyOrNullColumns(Vec<String>),
    /// Drop records whose column fully matches the regex.
    RegexMatch { column: String, pattern: Regex },
    /// Drop records whose column does not fully match the regex.
    RegexNotMatch { column: String, pattern: Regex },
}

impl RowFilter {
    pub fn name(&self) -> &'static str {
        match self {
            RowFilter::ConditionTrue(_) => "condition-true",
            RowFilter::ConditionFalse(_) => "condition-false",
            RowFilter::EmptyOrNullColumns(_) => "empty-or-null-columns",
            RowFilter::RegexMatch { .. } => "regex-match",
            RowFilter::RegexNotMatch { .. } => "regex-not-match",
        }
    }
}

/// Wire format for `parse-as-avro`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvroEncoding {
    Json,
    Binary,
}

impl FromStr for AvroEncoding {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "binary" => Ok(Self::Binary),
            _ => Err("unsupported decoder type, expected 'json' or 'binary'".to_string()),
        }
    }
}

/// Catalogue entries that are accepted and routed but have no record effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    SetFormat,
    IndexSplit,
    Split,
    JsonPath,
    InvokeHttp,
    ParseXmlToJson,
    ParseAsXml,
    ParseAsExcel,
    Xpath,
    XpathArray,
    Flatten,
    ParseAsLog,
    ParseAsDate,
    ParseAsHl7,
    ParseAsAvroFile,
    TextDistance,
    TextMetric,
    CatalogLookup,
    TableLookup,
    Stemming,
    SplitUrl,
}

impl Placeholder {
    pub const ALL: [Placeholder; 21] = [
        Placeholder::SetFormat,
        Placeholder::IndexSplit,
        Placeholder::Split,
        Placeholder::JsonPath,
        Placeholder::InvokeHttp,
        Placeholder::ParseXmlToJson,
        Placeholder::ParseAsXml,
        Placeholder::ParseAsExcel,
        Placeholder::Xpath,
        Placeholder::XpathArray,
        Placeholder::Flatten,
        Placeholder::ParseAsLog,
        Placeholder::ParseAsDate,
        Placeholder::ParseAsHl7,
        Placeholder::ParseAsAvroFile,
        Placeholder::TextDistance,
        Placeholder::TextMetric,
        Placeholder::CatalogLookup,
        Placeholder::TableLookup,
        Placeholder::Stemming,
        Placeholder::SplitUrl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Placeholder::SetFormat => "setformat",
            Placeholder::IndexSplit => "indexsplit",
            Placeholder::Split => "split",
            Placeholder::JsonPath => "json-path",
            Placeholder::InvokeHttp => "invoke-http",
            Placeholder::ParseXmlToJson => "parse-xml-to-json",
            Placeholder::ParseAsXml => "parse-as-xml",
            Placeholder::ParseAsExcel => "parse-as-excel",
            Placeholder::Xpath => "xpath",
            Placeholder::XpathArray => "xpath-array",
            Placeholder::Flatten => "flatten",
            Placeholder::ParseAsLog => "parse-as-log",
            Placeholder::ParseAsDate => "parse-as-date",
            Placeholder::ParseAsHl7 => "parse-as-hl7",
            Placeholder::ParseAsAvroFile => "parse-as-avro-file",
            Placeholder::TextDistance => "text-distance",
            Placeholder::TextMetric => "text-metric",
            Placeholder::CatalogLookup => "catalog-lookup",
            Placeholder::TableLookup => "table-lookup",
            Placeholder::Stemming => "stemming",
            Placeholder::SplitUrl => "split-url",
        }
    }

    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
