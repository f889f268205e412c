//! Single-column value transforms.
//!
//! Text transforms only touch `Utf8` values; nulls, other kinds and missing columns pass
//! through. Conversions (`set-type`, `set-charset`, dates, `quantize`, `hash`, `encode`,
//! `decode`) fail the step on a value they cannot interpret.

use std::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::directive::{Charset, Encoding, HashAlgorithm, QuantizeRange, TargetType};
use crate::error::{StepError, StepResult};
use crate::execution::PipelineContext;
use crate::expression::Expression;
use crate::types::{Record, Value};

use super::map_records;

fn type_mismatch(column: &str, expected: &'static str, found: &Value) -> StepError {
    StepError::TypeMismatch {
        column: column.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn invalid(column: &str, message: impl Into<String>) -> StepError {
    StepError::InvalidValue {
        column: column.to_string(),
        message: message.into(),
    }
}

/// Replace the value of `column` with `f(value)` when it exists and `f` returns `Some`.
fn convert<F>(records: Vec<Record>, threshold: usize, column: &str, f: F) -> StepResult<Vec<Record>>
where
    F: Fn(&Value) -> StepResult<Option<Value>> + Send + Sync,
{
    map_records(records, threshold, |mut record| {
        if let Some(idx) = record.find(column) {
            let current = record.value_at(idx).unwrap_or(&Value::Null);
            if let Some(next) = f(current)? {
                record.set_value_at(idx, next);
            }
        }
        Ok(record)
    })
}

/// Apply a string-to-string function to a text column.
pub(crate) fn text<F>(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    f: F,
) -> StepResult<Vec<Record>>
where
    F: Fn(&str) -> Result<String, String> + Send + Sync,
{
    convert(records, threshold, column, |value| match value {
        Value::Utf8(s) => f(s)
            .map(|out| Some(Value::Utf8(out)))
            .map_err(|message| invalid(column, message)),
        _ => Ok(None),
    })
}

pub(crate) fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// `#` copies an input character, `x` masks one; other pattern characters are written as-is
/// and consume the input character they match.
pub(crate) fn mask_number(input: &str, pattern: &str) -> String {
    let mut chars = input.chars().peekable();
    let mut out = String::with_capacity(pattern.len());
    for p in pattern.chars() {
        match p {
            '#' => match chars.next() {
                Some(c) => out.push(c),
                None => break,
            },
            'x' => match chars.next() {
                Some(_) => out.push('x'),
                None => break,
            },
            literal => {
                out.push(literal);
                if chars.peek() == Some(&literal) {
                    chars.next();
                }
            }
        }
    }
    out
}

/// Position-dependent substitution that keeps letters as letters (and their case) and digits
/// as digits.
pub(crate) fn mask_shuffle(input: &str) -> String {
    input
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let shift = (i % 251) as u32 * 7 + 3;
            let rotate = |base: u8, span: u32| {
                let offset = (c as u32 - u32::from(base) + shift) % span;
                char::from_u32(u32::from(base) + offset).unwrap_or(c)
            };
            match c {
                'a'..='z' => rotate(b'a', 26),
                'A'..='Z' => rotate(b'A', 26),
                '0'..='9' => rotate(b'0', 10),
                other => other,
            }
        })
        .collect()
}

pub(crate) fn set_column(
    records: Vec<Record>,
    ctx: &PipelineContext,
    column: &str,
    expression: &Expression,
) -> StepResult<Vec<Record>> {
    let variables = ctx.variables();
    map_records(records, ctx.parallel_threshold(), |mut record| {
        let value = expression.evaluate(&record, variables)?;
        record.set(column, value);
        Ok(record)
    })
}

pub(crate) fn set_type(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    target: TargetType,
) -> StepResult<Vec<Record>> {
    convert(records, threshold, column, |value| {
        if value.is_null() {
            return Ok(None);
        }
        let converted = match (target, value) {
            (TargetType::Int, Value::Int64(_))
            | (TargetType::Float, Value::Float64(_))
            | (TargetType::Text, Value::Utf8(_))
            | (TargetType::Bool, Value::Bool(_))
            | (TargetType::Bytes, Value::Bytes(_)) => return Ok(None),

            (TargetType::Int, Value::Float64(v)) => Value::Int64(v.trunc() as i64),
            (TargetType::Int, Value::Bool(b)) => Value::Int64(i64::from(*b)),
            (TargetType::Int, Value::Utf8(s)) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(v) => Value::Int64(v),
                    Err(_) => s
                        .parse::<f64>()
                        .map(|f| Value::Int64(f.trunc() as i64))
                        .map_err(|_| invalid(column, format!("'{s}' is not an integer")))?,
                }
            }
            (TargetType::Float, Value::Int64(v)) => Value::Float64(*v as f64),
            (TargetType::Float, Value::Bool(b)) => Value::Float64(if *b { 1.0 } else { 0.0 }),
            (TargetType::Float, Value::Utf8(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|_| invalid(column, format!("'{s}' is not a number")))?,
            (TargetType::Bool, Value::Int64(v)) => Value::Bool(*v != 0),
            (TargetType::Bool, Value::Float64(v)) => Value::Bool(*v != 0.0),
            (TargetType::Bool, Value::Utf8(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Value::Bool(true),
                "false" | "f" | "no" | "n" | "0" => Value::Bool(false),
                _ => return Err(invalid(column, format!("'{s}' is not a boolean"))),
            },
            (
                TargetType::Text,
                Value::Int64(_) | Value::Float64(_) | Value::Bool(_) | Value::Record(_),
            ) => {
                Value::Utf8(value.to_string())
            }
            (TargetType::Text, Value::Bytes(b)) => String::from_utf8(b.clone())
                .map(Value::Utf8)
                .map_err(|_| invalid(column, "bytes are not valid UTF-8"))?,
            (TargetType::Bytes, Value::Utf8(s)) => Value::Bytes(s.as_bytes().to_vec()),
            (target, other) => {
                let expected = match target {
                    TargetType::Int | TargetType::Float | TargetType::Bool => "a scalar",
                    TargetType::Text => "a scalar or bytes",
                    TargetType::Bytes => "string or bytes",
                };
                return Err(type_mismatch(column, expected, other));
            }
        };
        Ok(Some(converted))
    })
}

pub(crate) fn set_charset(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    charset: Charset,
) -> StepResult<Vec<Record>> {
    convert(records, threshold, column, |value| match value {
        Value::Bytes(bytes) => charset
            .decode(bytes)
            .map(|s| Some(Value::Utf8(s)))
            .ok_or_else(|| invalid(column, format!("bytes are not valid {charset:?}"))),
        Value::Utf8(_) | Value::Null => Ok(None),
        other => Err(type_mismatch(column, "bytes", other)),
    })
}

/// Replace null, empty or missing values. Missing columns are appended.
pub(crate) fn fill_null_or_empty(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    fill: &str,
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        if record.get(column).is_none_or(Value::is_null_or_empty) {
            record.set(column, Value::Utf8(fill.to_string()));
        }
        Ok(record)
    })
}

fn parse_timestamp(column: &str, value: &str) -> StepResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid(column, format!("'{value}' is not an RFC 3339 timestamp: {e}")))
}

fn render(column: &str, dt: &DateTime<Utc>, format: &str) -> StepResult<String> {
    let mut out = String::new();
    write!(out, "{}", dt.format(format))
        .map_err(|_| invalid(column, format!("cannot format with '{format}'")))?;
    Ok(out)
}

/// RFC 3339 text in `column` becomes text in `format`.
pub(crate) fn format_date(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    format: &str,
) -> StepResult<Vec<Record>> {
    convert(records, threshold, column, |value| match value {
        Value::Null => Ok(None),
        Value::Utf8(s) => {
            let dt = parse_timestamp(column, s)?;
            render(column, &dt, format).map(|s| Some(Value::Utf8(s)))
        }
        other => Err(type_mismatch(column, "string", other)),
    })
}

/// Seconds since the epoch (integer or numeric text) become text in `format`.
pub(crate) fn format_unix_timestamp(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    format: &str,
) -> StepResult<Vec<Record>> {
    convert(records, threshold, column, |value| {
        let seconds = match value {
            Value::Null => return Ok(None),
            Value::Int64(v) => *v,
            Value::Utf8(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| invalid(column, format!("'{s}' is not a unix timestamp")))?,
            other => return Err(type_mismatch(column, "int64 or string", other)),
        };
        let dt = DateTime::<Utc>::from_timestamp(seconds, 0)
            .ok_or_else(|| invalid(column, format!("timestamp {seconds} is out of range")))?;
        render(column, &dt, format).map(|s| Some(Value::Utf8(s)))
    })
}

/// Text in `pattern` becomes an RFC 3339 UTC timestamp. Date-only patterns map to midnight.
pub(crate) fn parse_simple_date(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    pattern: &str,
) -> StepResult<Vec<Record>> {
    convert(records, threshold, column, |value| match value {
        Value::Null => Ok(None),
        Value::Utf8(s) => {
            let s = s.trim();
            let naive = NaiveDateTime::parse_from_str(s, pattern)
                .or_else(|_| {
                    NaiveDate::parse_from_str(s, pattern).map(|d| d.and_time(Default::default()))
                })
                .map_err(|e| invalid(column, format!("'{s}' does not match '{pattern}': {e}")))?;
            Ok(Some(Value::Utf8(naive.and_utc().to_rfc3339())))
        }
        other => Err(type_mismatch(column, "string", other)),
    })
}

/// `destination = first - second` in milliseconds. Null when either side is absent.
pub(crate) fn diff_date(
    records: Vec<Record>,
    threshold: usize,
    first: &str,
    second: &str,
    destination: &str,
) -> StepResult<Vec<Record>> {
    let timestamp = |record: &Record, column: &str| -> StepResult<Option<DateTime<Utc>>> {
        match record.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Utf8(s)) => parse_timestamp(column, s).map(Some),
            Some(other) => Err(type_mismatch(column, "string", other)),
        }
    };
    map_records(records, threshold, |mut record| {
        let diff = match (timestamp(&record, first)?, timestamp(&record, second)?) {
            (Some(a), Some(b)) => Value::Int64((a - b).num_milliseconds()),
            _ => Value::Null,
        };
        record.set(destination, diff);
        Ok(record)
    })
}

pub(crate) fn quantize(
    records: Vec<Record>,
    threshold: usize,
    source: &str,
    destination: &str,
    ranges: &[QuantizeRange],
) -> StepResult<Vec<Record>> {
    map_records(records, threshold, |mut record| {
        let number = match record.get(source) {
            None => return Ok(record),
            Some(Value::Null) => None,
            Some(Value::Int64(v)) => Some(*v as f64),
            Some(Value::Float64(v)) => Some(*v),
            Some(Value::Utf8(s)) => Some(
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| invalid(source, format!("'{s}' is not a number")))?,
            ),
            Some(other) => return Err(type_mismatch(source, "number", other)),
        };
        let label = number
            .and_then(|n| ranges.iter().find(|r| r.contains(n)))
            .map(|r| Value::Utf8(r.label.clone()))
            .unwrap_or(Value::Null);
        record.set(destination, label);
        Ok(record)
    })
}

fn payload<'a>(column: &str, value: &'a Value) -> StepResult<Option<&'a [u8]>> {
    match value {
        Value::Null => Ok(None),
        Value::Utf8(s) => Ok(Some(s.as_bytes())),
        Value::Bytes(b) => Ok(Some(b.as_slice())),
        other => Err(type_mismatch(column, "string or bytes", other)),
    }
}

pub(crate) fn hash(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    algorithm: HashAlgorithm,
    encode: bool,
) -> StepResult<Vec<Record>> {
    convert(records, threshold, column, |value| {
        let Some(bytes) = payload(column, value)? else {
            return Ok(None);
        };
        let digest = match algorithm {
            HashAlgorithm::Sha224 => Sha224::digest(bytes).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(bytes).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        };
        Ok(Some(if encode {
            Value::Utf8(hex::encode(digest))
        } else {
            Value::Bytes(digest)
        }))
    })
}

pub(crate) fn encode(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    encoding: Encoding,
) -> StepResult<Vec<Record>> {
    convert(records, threshold, column, |value| {
        let Some(bytes) = payload(column, value)? else {
            return Ok(None);
        };
        let text = match encoding {
            Encoding::Base64 => BASE64.encode(bytes),
            Encoding::Base32 => base32::encode(bytes),
            Encoding::Hex => hex::encode(bytes),
        };
        Ok(Some(Value::Utf8(text)))
    })
}

/// Decoded payloads that are valid UTF-8 become text, anything else stays bytes.
pub(crate) fn decode(
    records: Vec<Record>,
    threshold: usize,
    column: &str,
    encoding: Encoding,
) -> StepResult<Vec<Record>> {
    convert(records, threshold, column, |value| {
        let Some(bytes) = payload(column, value)? else {
            return Ok(None);
        };
        let decoded = match encoding {
            Encoding::Base64 => BASE64.decode(bytes).map_err(|e| e.to_string()),
            Encoding::Base32 => base32::decode(bytes),
            Encoding::Hex => hex::decode(bytes).map_err(|e| e.to_string()),
        }
        .map_err(|message| invalid(column, message))?;
        Ok(Some(match String::from_utf8(decoded) {
            Ok(s) => Value::Utf8(s),
            Err(e) => Value::Bytes(e.into_bytes()),
        }))
    })
}

/// RFC 4648 base32 with padding.
mod base32 {
    const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    pub(super) fn encode(input: &[u8]) -> String {
        let mut out = String::with_capacity(input.len().div_ceil(5) * 8);
        for chunk in input.chunks(5) {
            let mut block = [0u8; 5];
            block[..chunk.len()].copy_from_slice(chunk);
            let bits = block.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            let emitted = (chunk.len() * 8).div_ceil(5);
            for i in 0..8 {
                if i < emitted {
                    let idx = ((bits >> (35 - i * 5)) & 0x1f) as usize;
                    out.push(char::from(ALPHABET[idx]));
                } else {
                    out.push('=');
                }
            }
        }
        out
    }

    pub(super) fn decode(input: &[u8]) -> Result<Vec<u8>, String> {
        let trimmed: Vec<u8> = input
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let body = trimmed.split(|b| *b == b'=').next().unwrap_or_default();
        let mut out = Vec::with_capacity(body.len() * 5 / 8);
        let mut buffer = 0u64;
        let mut bits = 0u32;
        for b in body {
            let value = ALPHABET
                .iter()
                .position(|a| *a == b.to_ascii_uppercase())
                .ok_or_else(|| format!("invalid base32 character '{}'", char::from(*b)))?;
            buffer = (buffer << 5) | value as u64;
            bits += 5;
            if bits >= 8 {
                bits -= 8;
                out.push((buffer >> bits) as u8);
                buffer &= (1 << bits) - 1;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::{base32, mask_number, mask_shuffle, title_case};
    use crate::directive::{Encoding, HashAlgorithm, QuantizeRange, TargetType};
    use crate::error::StepError;
    use crate::types::{Record, Value};

    fn one(column: &str, value: impl Into<Value>) -> Vec<Record> {
        vec![Record::new().with(column, value)]
    }

    #[test]
    fn title_case_capitalises_each_word() {
        assert_eq!(title_case("hELLO wORLD"), "Hello World");
    }

    #[test]
    fn mask_number_reveals_and_hides() {
        assert_eq!(mask_number("000-00-1234", "xxx-xx-####"), "xxx-xx-1234");
        assert_eq!(mask_number("000001234", "xxx-xx-####"), "xxx-xx-1234");
        assert_eq!(mask_number("12", "####"), "12");
    }

    #[test]
    fn mask_shuffle_keeps_character_classes() {
        let out = mask_shuffle("Ab9-z");
        assert_eq!(out.len(), 5);
        let c: Vec<char> = out.chars().collect();
        assert!(c[0].is_ascii_uppercase());
        assert!(c[1].is_ascii_lowercase());
        assert!(c[2].is_ascii_digit());
        assert_eq!(c[3], '-');
        assert_eq!(mask_shuffle("Ab9-z"), out);
        assert_ne!(out, "Ab9-z");
    }

    #[test]
    fn text_transforms_skip_non_text() {
        let records = vec![
            Record::new().with("a", " x "),
            Record::new().with("a", 5i64),
            Record::new().with("b", " y "),
        ];
        let out = super::text(records, 1, "a", |s| Ok(s.trim().to_string())).unwrap();
        assert_eq!(out[0].get("a"), Some(&Value::from("x")));
        assert_eq!(out[1].get("a"), Some(&Value::Int64(5)));
        assert_eq!(out[2].get("b"), Some(&Value::from(" y ")));
    }

    #[test]
    fn set_type_converts_and_rejects() {
        let out = super::set_type(one("n", " 42 "), 100, "n", TargetType::Int).unwrap();
        assert_eq!(out[0].get("n"), Some(&Value::Int64(42)));
        let out = super::set_type(one("n", 3i64), 100, "n", TargetType::Text).unwrap();
        assert_eq!(out[0].get("n"), Some(&Value::from("3")));
        let err = super::set_type(one("n", "abc"), 100, "n", TargetType::Float).unwrap_err();
        assert!(matches!(err, StepError::InvalidValue { .. }));
    }

    #[test]
    fn fill_null_or_empty_covers_missing_columns() {
        let records = vec![
            Record::new().with("a", ""),
            Record::new().with("a", Value::Null),
            Record::new(),
            Record::new().with("a", "keep"),
        ];
        let out = super::fill_null_or_empty(records, 100, "a", "N/A").unwrap();
        let values: Vec<String> = out.iter().map(|r| r.get("a").unwrap().to_string()).collect();
        assert_eq!(values, vec!["N/A", "N/A", "N/A", "keep"]);
    }

    #[test]
    fn dates_format_parse_and_diff() {
        let records = one("d", "2017-02-03T04:05:06Z");
        let out = super::format_date(records, 100, "d", "%Y/%m/%d").unwrap();
        assert_eq!(out[0].get("d"), Some(&Value::from("2017/02/03")));

        let out = super::format_unix_timestamp(one("t", 86_400i64), 100, "t", "%Y-%m-%d").unwrap();
        assert_eq!(out[0].get("t"), Some(&Value::from("1970-01-02")));

        let out = super::parse_simple_date(one("d", "03/02/2017"), 100, "d", "%d/%m/%Y").unwrap();
        assert_eq!(out[0].get("d"), Some(&Value::from("2017-02-03T00:00:00+00:00")));

        let records = vec![
            Record::new()
                .with("end", "2017-01-01T00:00:01Z")
                .with("start", "2017-01-01T00:00:00Z"),
        ];
        let out = super::diff_date(records, 100, "end", "start", "diff").unwrap();
        assert_eq!(out[0].get("diff"), Some(&Value::Int64(1_000)));

        let err = super::format_date(one("d", "yesterday"), 100, "d", "%Y").unwrap_err();
        assert!(matches!(err, StepError::InvalidValue { .. }));
    }

    #[test]
    fn quantize_labels_half_open_ranges() {
        let ranges = QuantizeRange::parse_list("0:10=low,10:20=high").unwrap();
        let records = vec![
            Record::new().with("v", 10i64),
            Record::new().with("v", 3.5),
            Record::new().with("v", 25i64),
        ];
        let out = super::quantize(records, 100, "v", "bucket", &ranges).unwrap();
        assert_eq!(out[0].get("bucket"), Some(&Value::from("high")));
        assert_eq!(out[1].get("bucket"), Some(&Value::from("low")));
        assert_eq!(out[2].get("bucket"), Some(&Value::Null));
    }

    #[test]
    fn hash_produces_hex_digest() {
        let out = super::hash(one("p", "abc"), 100, "p", HashAlgorithm::Sha256, true).unwrap();
        assert_eq!(
            out[0].get("p"),
            Some(&Value::from(
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
            ))
        );
        let out = super::hash(one("p", "abc"), 100, "p", HashAlgorithm::Sha224, false).unwrap();
        assert!(matches!(out[0].get("p"), Some(Value::Bytes(b)) if b.len() == 28));
        let err = super::hash(one("p", 1i64), 100, "p", HashAlgorithm::Sha256, true).unwrap_err();
        assert!(matches!(err, StepError::TypeMismatch { .. }));
    }

    #[test]
    fn encode_and_decode_in_place() {
        for (encoding, encoded) in [
            (Encoding::Base64, "aGVsbG8="),
            (Encoding::Base32, "NBSWY3DP"),
            (Encoding::Hex, "68656c6c6f"),
        ] {
            let out = super::encode(one("c", "hello"), 100, "c", encoding).unwrap();
            assert_eq!(out[0].get("c"), Some(&Value::from(encoded)));
            let back = super::decode(out, 100, "c", encoding).unwrap();
            assert_eq!(back[0].get("c"), Some(&Value::from("hello")));
        }
        assert!(super::decode(one("c", "!!"), 100, "c", Encoding::Base64).is_err());
    }

    #[test]
    fn base32_pads_partial_blocks() {
        assert_eq!(base32::encode(b"f"), "MY======");
        assert_eq!(base32::encode(b"fooba"), "MZXW6YTB");
        assert_eq!(base32::decode(b"MZXW6===").unwrap(), b"foo");
    }
}
